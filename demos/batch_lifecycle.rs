//! Example: Batch Lifecycle
//!
//! This example walks one inference batch through its whole life against a
//! minimal in-process host: build the batch, pull an input, allocate and fill
//! an output, hand it to the responder, and finalize.
//!
//! Run with:
//!
//! ```bash
//! cargo run --example batch_lifecycle
//! ```

use candle_core::DType;
use rust_ai_batch::{
    init_logging, Batch, CollectedInput, InputCollector, InputMetadata, LogConfig,
    MemoryDescriptor, MemoryTracker, MemoryType, ModelConfig, ModelHost, OutputResponder,
    RegisteredOutput, Result, SessionOptions, Stream,
};
use std::sync::Arc;

/// A request carrying a single f32 row named `x`.
#[derive(Clone)]
struct Request {
    id: usize,
    x: Vec<f32>,
}

#[derive(Debug)]
struct Response {
    id: usize,
    outputs: Vec<(String, Vec<f32>)>,
}

/// Copies every request's row into one contiguous staging area.
struct Collector {
    requests: Vec<Request>,
    staging: Vec<Vec<f32>>,
}

impl InputCollector for Collector {
    fn process_tensor(
        &mut self,
        _name: &str,
        size_bytes: usize,
        allowed: &[MemoryDescriptor],
    ) -> Result<CollectedInput> {
        let gathered: Vec<f32> = self.requests.iter().flat_map(|r| r.x.clone()).collect();
        let data = gathered.as_ptr().cast::<u8>();
        self.staging.push(gathered);
        Ok(CollectedInput {
            data,
            size_bytes,
            location: allowed[0],
        })
    }
}

/// Hands every registered output to every response.
#[derive(Default)]
struct Responder {
    outputs: Vec<RegisteredOutput>,
}

impl OutputResponder for Responder {
    type Response = Response;

    fn process_tensor(&mut self, output: RegisteredOutput) -> Result<()> {
        self.outputs.push(output);
        Ok(())
    }

    fn finalize(&mut self, responses: &mut [Response]) -> Result<bool> {
        for output in self.outputs.drain(..) {
            let name = output.name().to_string();
            let values = output.into_buffer::<f32>()?.to_vec()?;
            for response in responses.iter_mut() {
                response.outputs.push((name.clone(), values.clone()));
            }
        }
        // Outputs were read straight from their buffers, nothing was staged.
        Ok(false)
    }
}

struct Host {
    config: ModelConfig,
    memory: Arc<MemoryTracker>,
}

impl ModelHost for Host {
    type Request = Request;
    type Response = Response;
    type Collector = Collector;
    type Responder = Responder;

    fn model_config(&self) -> &ModelConfig {
        &self.config
    }

    fn memory_manager(&self) -> &Arc<MemoryTracker> {
        &self.memory
    }

    fn input_metadata(&self, request: &Request, name: &str) -> Result<Option<InputMetadata>> {
        #[allow(clippy::cast_possible_wrap)]
        let cols = request.x.len() as i64;
        Ok((name == "x").then(|| InputMetadata::new(DType::F32, [1, cols])))
    }

    fn create_response(&self, request: &Request) -> Result<Response> {
        Ok(Response {
            id: request.id,
            outputs: Vec::new(),
        })
    }

    fn open_collector(&self, requests: &[Request], _options: SessionOptions) -> Collector {
        Collector {
            requests: requests.to_vec(),
            staging: Vec::new(),
        }
    }

    fn open_responder(&self, _requests: &[Request], _options: SessionOptions) -> Responder {
        Responder::default()
    }
}

fn main() -> Result<()> {
    init_logging(&LogConfig::development());
    println!("=== Batch Lifecycle Example ===\n");

    let host = Host {
        config: ModelConfig::new()
            .with_max_batch_size(4)
            .with_output("column_sums", [3]),
        memory: Arc::new(MemoryTracker::with_limit(1024 * 1024)),
    };
    println!("Memory budget: {} KB\n", host.memory.limit_bytes() / 1024);

    let requests = vec![
        Request { id: 0, x: vec![1.0, 2.0, 3.0] },
        Request { id: 1, x: vec![10.0, 20.0, 30.0] },
    ];

    let batch = Batch::new(&host, requests, Stream::new())?;
    println!("Batch of {} requests on stream {}", batch.len(), batch.stream().id());

    let x = batch.get_input::<f32>("x", MemoryType::Host, 0)?;
    println!("Input x: shape {:?}, {} bytes", x.shape(), x.buffer().size_bytes());

    let mut sums = batch.get_output::<f32>("column_sums", MemoryType::Pinned, 0)?;
    let rows = x.buffer().to_vec()?;
    let mut totals = [0.0f32; 3];
    for row in rows.chunks(3) {
        for (total, value) in totals.iter_mut().zip(row) {
            *total += value;
        }
    }
    sums.copy_from_slice(&totals)?;
    drop(x);

    println!(
        "Output column_sums: shape {:?}, {} bytes at {}",
        sums.shape(),
        sums.buffer().size_bytes(),
        sums.location()
    );
    sums.finalize()?;

    for response in batch.finalize()? {
        println!("Response {}: {:?}", response.id, response.outputs);
    }
    println!(
        "\nPeak tracked memory: {} bytes, now {} bytes",
        host.memory.peak_bytes(),
        host.memory.allocated_bytes()
    );

    println!("\n=== Example Complete ===");
    Ok(())
}
