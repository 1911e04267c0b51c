// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! Capability interfaces for the host that loads the backend.
//!
//! The batch adapter never talks to a concrete server runtime. Everything it
//! needs from the host (request metadata, response placeholders, the input
//! collection engine, the output response engine, model configuration and the
//! memory manager) comes through the traits in this module, so tests can swap
//! in deterministic fakes.
//!
//! ## Core Traits
//!
//! - [`ModelHost`] - model and instance state of the host
//! - [`InputCollector`] - locates or copies input bytes into a requested place
//! - [`OutputResponder`] - scatters output buffers into per-request responses
//!
//! Request and response handles are opaque to this crate. They are only valid
//! for the duration of one inference call.

use crate::config::ModelConfig;
use crate::error::Result;
use crate::memory::{MemoryDescriptor, MemoryTracker};
use crate::responder::RegisteredOutput;
use crate::stream::Stream;
use candle_core::DType;
use std::sync::Arc;

/// Element type and dimensions a request declares for one input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputMetadata {
    /// Declared element type.
    pub dtype: DType,
    /// Declared dimensions, signed as the host reports them.
    pub shape: Vec<i64>,
}

impl InputMetadata {
    /// Create input metadata.
    pub fn new(dtype: DType, shape: impl Into<Vec<i64>>) -> Self {
        Self {
            dtype,
            shape: shape.into(),
        }
    }
}

/// What the collection engine reports after materializing an input.
///
/// `data` points at `size_bytes` bytes located at `location`. The memory is
/// owned by the collector (or by the request payload it points into) and stays
/// valid until the collector session is dropped.
#[derive(Debug, Clone, Copy)]
pub struct CollectedInput {
    /// Start of the collected bytes.
    pub data: *const u8,
    /// Number of bytes the collector made available.
    pub size_bytes: usize,
    /// Where the bytes actually live.
    pub location: MemoryDescriptor,
}

/// Settings shared by the collector and responder sessions of one batch.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Whether the session may stage through pinned host memory.
    pub pinned: bool,
    /// Configured maximum batch size (0 = batching disabled).
    pub max_batch_size: usize,
    /// Stream all session work is ordered on.
    pub stream: Stream,
    /// Host memory manager backing staging allocations.
    pub memory_manager: Arc<MemoryTracker>,
}

/// Input collection engine bound to one batch.
pub trait InputCollector {
    /// Materialize `size_bytes` bytes of input `name` in one of `allowed`.
    ///
    /// Implementations should return a zero-copy view when the source data
    /// already lives in an allowed place, and may otherwise copy. They are
    /// free to place the data somewhere not listed in `allowed`; the caller
    /// decides whether that is acceptable.
    ///
    /// # Errors
    ///
    /// Returns an error if the input cannot be gathered.
    fn process_tensor(
        &mut self,
        name: &str,
        size_bytes: usize,
        allowed: &[MemoryDescriptor],
    ) -> Result<CollectedInput>;
}

/// Output response engine bound to one batch.
pub trait OutputResponder {
    /// Response handle type the engine writes into.
    type Response;

    /// Take ownership of a finished output buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if the output cannot be accepted.
    fn process_tensor(&mut self, output: RegisteredOutput) -> Result<()>;

    /// Scatter all registered outputs into `responses`.
    ///
    /// Returns `true` if any output was written through an intermediate
    /// staging buffer, in which case the stream must be drained before the
    /// host reads the responses.
    ///
    /// # Errors
    ///
    /// Returns an error if scattering fails.
    fn finalize(&mut self, responses: &mut [Self::Response]) -> Result<bool>;
}

/// Model- and instance-level host state a batch is built against.
pub trait ModelHost {
    /// Opaque request handle.
    type Request;
    /// Opaque response handle.
    type Response;
    /// Input collection engine.
    type Collector: InputCollector;
    /// Output response engine.
    type Responder: OutputResponder<Response = Self::Response>;

    /// Static model configuration.
    fn model_config(&self) -> &ModelConfig;

    /// Memory manager used for backend allocations.
    fn memory_manager(&self) -> &Arc<MemoryTracker>;

    /// Metadata a request declares for input `name`, `None` if absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be inspected.
    fn input_metadata(&self, request: &Self::Request, name: &str) -> Result<Option<InputMetadata>>;

    /// Create the response placeholder for a request.
    ///
    /// # Errors
    ///
    /// Returns an error if the host cannot create the response.
    fn create_response(&self, request: &Self::Request) -> Result<Self::Response>;

    /// Open an input collection session for these requests.
    fn open_collector(&self, requests: &[Self::Request], options: SessionOptions) -> Self::Collector;

    /// Open an output response session for these requests.
    fn open_responder(&self, requests: &[Self::Request], options: SessionOptions) -> Self::Responder;

    /// Whether inputs may be staged through pinned memory.
    fn pinned_input_enabled(&self) -> bool {
        self.model_config().pinned_input
    }

    /// Whether outputs may be staged through pinned memory.
    fn pinned_output_enabled(&self) -> bool {
        self.model_config().pinned_output
    }

    /// Maximum batch size forwarded to the sessions (0 = batching disabled).
    fn max_batch_size(&self) -> usize {
        self.model_config().max_batch_size
    }
}
