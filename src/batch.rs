// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! One inference batch: input materialization, output staging, handoff.
//!
//! A [`Batch`] is built from the requests the host hands over for a single
//! inference call. It creates one response placeholder per request and opens
//! an input collection session and an output response session, both ordered on
//! the batch's [`Stream`]. The computation layer then pulls inputs with
//! [`Batch::get_input`], allocates outputs with [`Batch::get_output`], fills and
//! finalizes the outputs, and finally calls [`Batch::finalize`] to hand the
//! responses back.
//!
//! ## Placement contract
//!
//! Inputs are requested in a specific memory space. The collector may choose to
//! place data elsewhere; the batch treats that as an internal error rather than
//! accepting relocated data, because the computation is about to run against
//! the requested location.
//!
//! ## Synchronization
//!
//! Nothing here blocks except [`Batch::finalize`], and only when the responder
//! reports that some output went through an intermediate staging buffer.

use crate::buffer::Buffer;
use crate::dtype::{byte_size_of, DTypeExt};
use crate::error::{BatchError, Result};
use crate::host::{InputCollector, ModelHost, SessionOptions};
use crate::logging::log_memory_usage;
use crate::memory::{MemoryDescriptor, MemoryType};
use crate::responder::SharedResponder;
use crate::shape::{combine_input_shapes, element_count};
use crate::stream::Stream;
use crate::tensor::{InputTensor, OutputTensor, Tensor};
use candle_core::WithDType;
use std::cell::RefCell;
use std::fmt;
use std::sync::Arc;

/// Requests, responses and host sessions for one inference call.
///
/// ```rust,ignore
/// let batch = Batch::new(&host, requests, stream)?;
/// let x = batch.get_input::<f32>("x", MemoryType::Device, 0)?;
/// let mut y = batch.get_output::<f32>("y", MemoryType::Device, 0)?;
/// run_model(&x, &mut y)?;
/// drop(x);
/// y.finalize()?;
/// let responses = batch.finalize()?;
/// ```
pub struct Batch<'h, H: ModelHost> {
    host: &'h H,
    requests: Vec<H::Request>,
    responses: Vec<H::Response>,
    collector: RefCell<H::Collector>,
    responder: SharedResponder<H::Responder>,
    stream: Stream,
}

impl<'h, H: ModelHost> Batch<'h, H> {
    /// Set up a batch over `requests`.
    ///
    /// Creates one response per request, in order, and opens the collector and
    /// responder sessions with the host's pinned-memory policy. No data moves.
    ///
    /// # Errors
    ///
    /// Propagates failures to create a response placeholder.
    pub fn new(host: &'h H, requests: Vec<H::Request>, stream: Stream) -> Result<Self> {
        let responses = requests
            .iter()
            .map(|request| host.create_response(request))
            .collect::<Result<Vec<_>>>()?;

        let session = |pinned: bool| SessionOptions {
            pinned,
            max_batch_size: host.max_batch_size(),
            stream: stream.clone(),
            memory_manager: Arc::clone(host.memory_manager()),
        };
        let collector = host.open_collector(&requests, session(host.pinned_input_enabled()));
        let responder = host.open_responder(&requests, session(host.pinned_output_enabled()));

        tracing::debug!(
            target: "rust_ai::batch",
            requests = requests.len(),
            stream = stream.id(),
            "batch constructed"
        );

        Ok(Self {
            host,
            requests,
            responses,
            collector: RefCell::new(collector),
            responder: SharedResponder::new(responder),
            stream,
        })
    }

    /// Materialize input `name` as a tensor of `T` at the requested location.
    ///
    /// The shape combines every request's declaration (leading dimensions
    /// summed). The collector is asked for exactly `size_of::<T>() * numel`
    /// bytes and may hand back a zero-copy view. An empty batch yields an empty
    /// shape and a zero-length buffer without consulting the collector.
    ///
    /// # Errors
    ///
    /// - shape derivation errors (`MissingInput`, `DTypeMismatch`, `ShapeMismatch`, `InvalidShape`)
    /// - `BatchError::Internal` if the collector places the data anywhere other
    ///   than the requested location or reports an unexpected byte count
    /// - collector failures
    pub fn get_input<T: WithDType>(
        &self,
        name: &str,
        memory_type: MemoryType,
        device_id: usize,
    ) -> Result<InputTensor<'_, T>> {
        let requested = MemoryDescriptor::new(memory_type, device_id);
        if self.requests.is_empty() {
            // SAFETY: a null pointer with zero length is never dereferenced.
            let buffer =
                unsafe { Buffer::<T>::from_raw_parts(std::ptr::null(), 0, requested, self.stream.clone())? };
            return Ok(InputTensor::new(Tensor::empty(buffer)));
        }

        let shape = self.input_shape::<T>(name)?;
        let count = element_count(&shape);
        let size_bytes = byte_size_of::<T>(count)?;

        let collected = self
            .collector
            .try_borrow_mut()
            .map_err(|_| BatchError::internal("input collector already in use"))?
            .process_tensor(name, size_bytes, &[requested])?;
        self.stream.record("collect");

        if collected.location != requested {
            tracing::warn!(
                target: "rust_ai::batch",
                input = name,
                requested = %requested,
                reported = %collected.location,
                "input collected in wrong location"
            );
            return Err(BatchError::internal(format!(
                "data collected in wrong location: input '{name}' requested at {requested}, \
                 collector placed it at {}",
                collected.location
            )));
        }
        if collected.size_bytes != size_bytes {
            return Err(BatchError::internal(format!(
                "collector returned {} bytes for input '{name}', expected {size_bytes}",
                collected.size_bytes
            )));
        }

        // SAFETY: the collector contract keeps `size_bytes` bytes at `data`
        // valid and unmodified while its session, owned by this batch, lives;
        // the returned tensor borrows the batch.
        let buffer = unsafe {
            Buffer::from_raw_parts(
                collected.data.cast::<T>(),
                count,
                collected.location,
                self.stream.clone(),
            )?
        };

        tracing::debug!(
            target: "rust_ai::batch",
            input = name,
            dtype = T::DTYPE.name(),
            shape = ?shape,
            bytes = size_bytes,
            location = %requested,
            "input materialized"
        );
        Ok(InputTensor::new(Tensor::new(shape, buffer)?))
    }

    /// Allocate output `name` as a fresh tensor of `T` at the requested location.
    ///
    /// The shape comes from the model configuration, independent of the
    /// requests. The buffer is newly allocated, charged to the host's memory
    /// manager, and never aliases inputs or other outputs. Its contents are
    /// zeroed placeholders until the computation layer fills them.
    ///
    /// # Errors
    ///
    /// - `BatchError::MissingOutput` / `BatchError::InvalidShape` from the configuration
    /// - `BatchError::OutOfMemory` if the memory manager refuses the allocation
    /// - `BatchError::DeviceNotAvailable` or Candle errors for device memory
    pub fn get_output<T: WithDType>(
        &self,
        name: &str,
        memory_type: MemoryType,
        device_id: usize,
    ) -> Result<OutputTensor<T, H::Responder>> {
        let location = MemoryDescriptor::new(memory_type, device_id);
        let shape = self.host.model_config().output_shape(name)?;
        let count = element_count(&shape);
        let buffer = Buffer::<T>::allocate(
            count,
            location,
            self.stream.clone(),
            self.host.memory_manager(),
        )?;

        tracing::debug!(
            target: "rust_ai::batch",
            output = name,
            dtype = T::DTYPE.name(),
            shape = ?shape,
            bytes = buffer.size_bytes(),
            location = %location,
            "output allocated"
        );
        Ok(OutputTensor::new(
            name,
            Tensor::new(shape, buffer)?,
            self.responder.clone(),
        ))
    }

    /// Flush registered outputs into the responses and hand them back.
    ///
    /// The stream is drained if, and only if, the responder reports that it
    /// staged any output through an intermediate buffer. Consuming the batch
    /// makes this the terminal step; the collector session is closed here too.
    ///
    /// # Errors
    ///
    /// Propagates responder and stream synchronization failures.
    pub fn finalize(self) -> Result<Vec<H::Response>> {
        let Self {
            host,
            mut responses,
            responder,
            stream,
            ..
        } = self;

        let staged = responder.finalize(&mut responses)?;
        if staged {
            stream.synchronize()?;
        }

        let memory = host.memory_manager();
        log_memory_usage(memory.allocated_bytes(), memory.peak_bytes(), "batch finalize");
        tracing::debug!(
            target: "rust_ai::batch",
            responses = responses.len(),
            staged,
            stream = stream.id(),
            "batch finalized"
        );
        Ok(responses)
    }

    /// Stream all work of this batch is ordered on.
    #[must_use]
    pub fn stream(&self) -> &Stream {
        &self.stream
    }

    /// Requests in batch order.
    #[must_use]
    pub fn requests(&self) -> &[H::Request] {
        &self.requests
    }

    /// Response placeholders, index-aligned with [`Batch::requests`].
    #[must_use]
    pub fn responses(&self) -> &[H::Response] {
        &self.responses
    }

    /// Number of requests.
    #[must_use]
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    /// Whether the batch has no requests.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    fn input_shape<T: WithDType>(&self, name: &str) -> Result<Vec<usize>> {
        let declarations = self
            .requests
            .iter()
            .map(|request| self.host.input_metadata(request, name))
            .collect::<Result<Vec<_>>>()?;
        combine_input_shapes(name, T::DTYPE, declarations)
    }
}

impl<H: ModelHost> fmt::Debug for Batch<'_, H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Batch")
            .field("requests", &self.requests.len())
            .field("stream", &self.stream)
            .field("responder", &self.responder)
            .finish_non_exhaustive()
    }
}
