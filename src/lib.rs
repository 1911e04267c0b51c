// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! # rust-ai-batch
//!
//! Per-inference batch adapter for model-serving backends. Given the requests a
//! serving host hands to a backend for one inference call, a [`Batch`] assembles
//! typed, shape-aware input tensors (zero-copy where the host allows it),
//! allocates output tensors in a chosen memory space, and at the end hands the
//! output buffers back to the host's response machinery, draining the compute
//! stream only when the host staged data through an intermediate buffer.
//!
//! ## Modules
//!
//! - [`batch`] - the batch itself: `get_input`, `get_output`, `finalize`
//! - [`host`] - capability traits the host implements (collector, responder, model state)
//! - [`buffer`] / [`tensor`] - typed buffers and shaped tensors over them
//! - [`memory`] - memory spaces, placement descriptors, allocation tracking
//! - [`device`] / [`stream`] - device resolution and stream ordering tokens
//! - [`shape`] - batch shape derivation
//! - [`config`] - model configuration
//! - [`error`] / [`logging`] - error types and tracing setup
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use rust_ai_batch::{Batch, MemoryType, Stream};
//!
//! let batch = Batch::new(&host, requests, Stream::new())?;
//! let x = batch.get_input::<f32>("x", MemoryType::Host, 0)?;
//! let mut y = batch.get_output::<f32>("y", MemoryType::Pinned, 0)?;
//! // ... run the model, writing into `y` ...
//! drop(x);
//! y.finalize()?;
//! let responses = batch.finalize()?;
//! ```
//!
//! ## Feature Flags
//!
//! - `cuda` - Enable device memory via Candle's CUDA backend

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod batch;
pub mod buffer;
pub mod config;
pub mod device;
pub mod dtype;
pub mod error;
pub mod host;
pub mod logging;
pub mod memory;
pub mod responder;
pub mod shape;
pub mod stream;
pub mod tensor;

// Re-exports for convenience
pub use batch::Batch;
pub use buffer::Buffer;
pub use config::{ModelConfig, ValidatableConfig};
pub use device::{compute_device, cuda_available};
pub use dtype::{byte_size_of, bytes_per_element, DTypeExt};
pub use error::{BatchError, Result};
pub use host::{
    CollectedInput, InputCollector, InputMetadata, ModelHost, OutputResponder, SessionOptions,
};
pub use logging::{init_logging, LogConfig, LogLevel};
pub use memory::{Allocation, MemoryDescriptor, MemoryTracker, MemoryType};
pub use responder::{RegisteredOutput, SharedResponder};
pub use shape::{combine_input_shapes, element_count, narrow_dims};
pub use stream::Stream;
pub use tensor::{InputTensor, OutputTensor, Tensor};
