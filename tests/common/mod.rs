// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! Deterministic host doubles for batch tests.
//!
//! `FakeHost` plays the serving host: requests carry named inputs as raw bytes,
//! the collector gathers them into an aligned staging area, and the responder
//! copies registered host outputs into every response. A shared `Script` lets a
//! test make the collector misplace data or misreport sizes, and make the
//! responder claim it staged its writes. Everything the fakes are asked to do
//! is written to a shared `Log`.

#![allow(dead_code)]

use candle_core::DType;
use rust_ai_batch::{
    BatchError, CollectedInput, InputCollector, InputMetadata, MemoryDescriptor, MemoryTracker,
    ModelConfig, ModelHost, OutputResponder, RegisteredOutput, Result, SessionOptions,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
pub struct FakeInput {
    pub dtype: DType,
    pub shape: Vec<i64>,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct FakeRequest {
    pub id: usize,
    pub inputs: HashMap<String, FakeInput>,
}

impl FakeRequest {
    pub fn new(id: usize) -> Self {
        Self {
            id,
            inputs: HashMap::new(),
        }
    }

    pub fn with_f32(mut self, name: &str, shape: &[i64], values: &[f32]) -> Self {
        let bytes = values.iter().flat_map(|v| v.to_ne_bytes()).collect();
        self.inputs.insert(
            name.to_string(),
            FakeInput {
                dtype: DType::F32,
                shape: shape.to_vec(),
                bytes,
            },
        );
        self
    }

    pub fn with_i64(mut self, name: &str, shape: &[i64], values: &[i64]) -> Self {
        let bytes = values.iter().flat_map(|v| v.to_ne_bytes()).collect();
        self.inputs.insert(
            name.to_string(),
            FakeInput {
                dtype: DType::I64,
                shape: shape.to_vec(),
                bytes,
            },
        );
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FakeResponse {
    pub request_id: usize,
    pub outputs: Vec<(String, Vec<u8>)>,
}

/// Knobs a test turns to make the host misbehave.
#[derive(Debug, Default)]
pub struct Script {
    /// Report this placement instead of the requested one.
    pub placement: Option<MemoryDescriptor>,
    /// Report this many bytes instead of the requested count.
    pub reported_bytes: Option<usize>,
    /// Responder claims it wrote through a staging buffer.
    pub staged: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CollectCall {
    pub name: String,
    pub size_bytes: usize,
    pub allowed: Vec<MemoryDescriptor>,
}

#[derive(Debug, Clone)]
pub struct RegisteredInfo {
    pub name: String,
    pub shape: Vec<usize>,
    pub dtype: DType,
    pub location: MemoryDescriptor,
    pub size_bytes: usize,
}

/// What the fakes were asked to do.
#[derive(Debug, Default)]
pub struct Log {
    pub collect_calls: Vec<CollectCall>,
    pub collector_sessions: Vec<SessionOptions>,
    pub responder_sessions: Vec<SessionOptions>,
    pub registered: Vec<RegisteredInfo>,
    pub finalize_calls: usize,
}

pub struct FakeHost {
    config: ModelConfig,
    memory: Arc<MemoryTracker>,
    pub script: Arc<Mutex<Script>>,
    pub log: Arc<Mutex<Log>>,
    /// Overrides the configured maximum batch size when set.
    pub max_batch_size: Option<usize>,
}

impl FakeHost {
    pub fn new(config: ModelConfig) -> Self {
        Self::with_memory(config, MemoryTracker::new())
    }

    pub fn with_memory(config: ModelConfig, memory: MemoryTracker) -> Self {
        Self {
            config,
            memory: Arc::new(memory),
            script: Arc::new(Mutex::new(Script::default())),
            log: Arc::new(Mutex::new(Log::default())),
            max_batch_size: None,
        }
    }

    pub fn script(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().unwrap()
    }

    pub fn log(&self) -> std::sync::MutexGuard<'_, Log> {
        self.log.lock().unwrap()
    }

    /// Bytes currently charged to the host's memory manager.
    pub fn memory_manager_bytes(&self) -> usize {
        self.memory.allocated_bytes()
    }
}

pub struct FakeCollector {
    requests: Vec<FakeRequest>,
    script: Arc<Mutex<Script>>,
    log: Arc<Mutex<Log>>,
    // u64 words keep every staged input 8-byte aligned.
    staging: Vec<Vec<u64>>,
}

impl InputCollector for FakeCollector {
    fn process_tensor(
        &mut self,
        name: &str,
        size_bytes: usize,
        allowed: &[MemoryDescriptor],
    ) -> Result<CollectedInput> {
        self.log.lock().unwrap().collect_calls.push(CollectCall {
            name: name.to_string(),
            size_bytes,
            allowed: allowed.to_vec(),
        });

        let mut gathered = Vec::with_capacity(size_bytes);
        for request in &self.requests {
            let input = request
                .inputs
                .get(name)
                .ok_or_else(|| BatchError::missing_input(name, request.id))?;
            gathered.extend_from_slice(&input.bytes);
        }

        let mut words = vec![0u64; gathered.len().div_ceil(8)];
        // SAFETY: `words` spans at least `gathered.len()` bytes.
        unsafe {
            std::ptr::copy_nonoverlapping(
                gathered.as_ptr(),
                words.as_mut_ptr().cast::<u8>(),
                gathered.len(),
            );
        }
        let data = words.as_ptr().cast::<u8>();
        self.staging.push(words);

        let script = self.script.lock().unwrap();
        Ok(CollectedInput {
            data,
            size_bytes: script.reported_bytes.unwrap_or(gathered.len()),
            location: script.placement.unwrap_or(allowed[0]),
        })
    }
}

pub struct FakeResponder {
    outputs: Vec<RegisteredOutput>,
    script: Arc<Mutex<Script>>,
    log: Arc<Mutex<Log>>,
}

impl std::fmt::Debug for FakeResponder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FakeResponder")
            .field("outputs", &self.outputs.len())
            .finish_non_exhaustive()
    }
}

impl OutputResponder for FakeResponder {
    type Response = FakeResponse;

    fn process_tensor(&mut self, output: RegisteredOutput) -> Result<()> {
        self.log.lock().unwrap().registered.push(RegisteredInfo {
            name: output.name().to_string(),
            shape: output.shape().to_vec(),
            dtype: output.dtype(),
            location: output.location(),
            size_bytes: output.size_bytes(),
        });
        self.outputs.push(output);
        Ok(())
    }

    fn finalize(&mut self, responses: &mut [FakeResponse]) -> Result<bool> {
        self.log.lock().unwrap().finalize_calls += 1;
        for response in responses.iter_mut() {
            for output in &self.outputs {
                let bytes = output.host_bytes().map(<[u8]>::to_vec).unwrap_or_default();
                response.outputs.push((output.name().to_string(), bytes));
            }
        }
        Ok(self.script.lock().unwrap().staged)
    }
}

impl ModelHost for FakeHost {
    type Request = FakeRequest;
    type Response = FakeResponse;
    type Collector = FakeCollector;
    type Responder = FakeResponder;

    fn model_config(&self) -> &ModelConfig {
        &self.config
    }

    fn memory_manager(&self) -> &Arc<MemoryTracker> {
        &self.memory
    }

    fn input_metadata(&self, request: &FakeRequest, name: &str) -> Result<Option<InputMetadata>> {
        Ok(request
            .inputs
            .get(name)
            .map(|input| InputMetadata::new(input.dtype, input.shape.clone())))
    }

    fn create_response(&self, request: &FakeRequest) -> Result<FakeResponse> {
        Ok(FakeResponse {
            request_id: request.id,
            outputs: Vec::new(),
        })
    }

    fn open_collector(&self, requests: &[FakeRequest], options: SessionOptions) -> FakeCollector {
        self.log().collector_sessions.push(options);
        FakeCollector {
            requests: requests.to_vec(),
            script: Arc::clone(&self.script),
            log: Arc::clone(&self.log),
            staging: Vec::new(),
        }
    }

    fn max_batch_size(&self) -> usize {
        self.max_batch_size.unwrap_or(self.config.max_batch_size)
    }

    fn open_responder(&self, _requests: &[FakeRequest], options: SessionOptions) -> FakeResponder {
        self.log().responder_sessions.push(options);
        FakeResponder {
            outputs: Vec::new(),
            script: Arc::clone(&self.script),
            log: Arc::clone(&self.log),
        }
    }
}

/// Three requests, each declaring `x` as f32 `[1, 4]`.
pub fn three_requests() -> Vec<FakeRequest> {
    (0..3)
        .map(|id| {
            #[allow(clippy::cast_precision_loss)]
            let base = (id * 4) as f32;
            FakeRequest::new(id).with_f32("x", &[1, 4], &[base, base + 1.0, base + 2.0, base + 3.0])
        })
        .collect()
}

/// Model with output `y` of shape `[8]` and output `z` of shape `[2, 3]`.
pub fn default_config() -> ModelConfig {
    ModelConfig::new()
        .with_max_batch_size(8)
        .with_output("y", [8])
        .with_output("z", [2, 3])
}
