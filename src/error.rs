// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! Error types for batch assembly and output handoff.
//!
//! Every failure in this crate is fatal for the batch that produced it. Nothing
//! is retried here; the orchestration layer above decides whether to rerun the
//! whole inference call.
//!
//! ## Error Hierarchy
//!
//! ```text
//! BatchError
//! ├── Internal            - Host service broke its contract (wrong placement, bad byte count)
//! ├── MissingInput        - A request does not carry a required input
//! ├── MissingOutput       - Output name not present in the model configuration
//! ├── ShapeMismatch       - Requests disagree on trailing dimensions
//! ├── DTypeMismatch       - Declared element type differs from the requested one
//! ├── InvalidShape        - Negative or otherwise unusable dimensions
//! ├── InvalidConfig       - Configuration validation failures
//! ├── DeviceNotAvailable  - Requested device unavailable
//! ├── OutOfMemory         - Allocation would exceed the memory manager's limit
//! └── Candle              - Underlying Candle errors (device allocation, sync)
//! ```

use thiserror::Error;

/// Result type alias for batch operations.
pub type Result<T> = std::result::Result<T, BatchError>;

/// Errors raised while preparing inputs, staging outputs or finalizing a batch.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum BatchError {
    /// A host service violated the contract the batch relies on.
    ///
    /// Raised when the input collector places data somewhere other than the
    /// requested memory descriptor, reports an unexpected byte count, or when
    /// shared state becomes unusable.
    #[error("internal error: {0}")]
    Internal(String),

    /// A request in the batch does not declare the named input.
    #[error("input '{name}' missing from request {request}")]
    MissingInput {
        /// Input name.
        name: String,
        /// Index of the offending request within the batch.
        request: usize,
    },

    /// The model configuration has no output with this name.
    #[error("output '{name}' not found in model configuration")]
    MissingOutput {
        /// Output name.
        name: String,
    },

    /// Tensor shape mismatch.
    #[error("shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        /// Expected shape.
        expected: Vec<usize>,
        /// Actual shape received.
        actual: Vec<usize>,
    },

    /// Element type mismatch.
    #[error("dtype mismatch: expected {expected}, got {actual}")]
    DTypeMismatch {
        /// Expected element type name.
        expected: &'static str,
        /// Actual element type name.
        actual: &'static str,
    },

    /// Dimensions that cannot describe a concrete buffer.
    #[error("invalid shape {dims:?}: {message}")]
    InvalidShape {
        /// The offending dimensions.
        dims: Vec<i64>,
        /// Descriptive error message.
        message: String,
    },

    /// Invalid configuration parameter.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Requested device not available.
    #[error("device not available: {device}")]
    DeviceNotAvailable {
        /// Description of the unavailable device.
        device: String,
    },

    /// Out of memory.
    #[error("out of memory: {message}")]
    OutOfMemory {
        /// Descriptive error message.
        message: String,
    },

    /// Underlying Candle error.
    #[error("candle error: {0}")]
    Candle(#[from] candle_core::Error),
}

impl BatchError {
    /// Create an internal (contract violation) error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Create a missing input error.
    pub fn missing_input(name: impl Into<String>, request: usize) -> Self {
        Self::MissingInput {
            name: name.into(),
            request,
        }
    }

    /// Create a missing output error.
    pub fn missing_output(name: impl Into<String>) -> Self {
        Self::MissingOutput { name: name.into() }
    }

    /// Create a shape mismatch error.
    pub fn shape_mismatch(expected: impl Into<Vec<usize>>, actual: impl Into<Vec<usize>>) -> Self {
        Self::ShapeMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Create a dtype mismatch error.
    pub fn dtype_mismatch(expected: &'static str, actual: &'static str) -> Self {
        Self::DTypeMismatch { expected, actual }
    }

    /// Create an invalid shape error.
    pub fn invalid_shape(dims: impl Into<Vec<i64>>, msg: impl Into<String>) -> Self {
        Self::InvalidShape {
            dims: dims.into(),
            message: msg.into(),
        }
    }

    /// Create an invalid configuration error.
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a device not available error.
    pub fn device_not_available(device: impl Into<String>) -> Self {
        Self::DeviceNotAvailable {
            device: device.into(),
        }
    }

    /// Create an out of memory error.
    pub fn oom(msg: impl Into<String>) -> Self {
        Self::OutOfMemory {
            message: msg.into(),
        }
    }

    /// Whether this error reports a broken host contract.
    #[must_use]
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::Internal(_))
    }
}
