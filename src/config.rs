// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! Model configuration consumed by the batch adapter.
//!
//! Outputs are configuration-defined: their shapes come from this table, never
//! from request contents. The pinned-memory policy flags and the maximum batch
//! size are forwarded to the host's collector and responder sessions.
//!
//! ## Environment Variables
//!
//! - `RUST_AI_BATCH_MAX_BATCH_SIZE` - maximum batch size (integer)
//! - `RUST_AI_BATCH_PINNED_INPUT` - `1`/`true` enables pinned input staging
//! - `RUST_AI_BATCH_PINNED_OUTPUT` - `1`/`true` enables pinned output staging
//!
//! ## Example
//!
//! ```rust
//! use rust_ai_batch::{ModelConfig, ValidatableConfig};
//!
//! let config = ModelConfig::new()
//!     .with_max_batch_size(8)
//!     .with_output("y", [8])
//!     .with_pinned_output(true);
//! config.validate()?;
//! assert_eq!(config.output_shape("y")?, vec![8]);
//! # Ok::<(), rust_ai_batch::BatchError>(())
//! ```

use crate::error::{BatchError, Result};
use crate::shape::narrow_dims;
use std::collections::HashMap;

/// Configuration validation trait.
pub trait ValidatableConfig: Clone + Send + Sync {
    /// Validate the configuration parameters.
    ///
    /// # Errors
    ///
    /// Returns `BatchError::InvalidConfig` if validation fails.
    fn validate(&self) -> Result<()>;
}

/// Static configuration of one served model.
#[derive(Debug, Clone, Default)]
pub struct ModelConfig {
    /// Maximum batch size (0 = batching disabled).
    pub max_batch_size: usize,
    /// Stage inputs through pinned host memory when copying.
    pub pinned_input: bool,
    /// Stage outputs through pinned host memory when copying.
    pub pinned_output: bool,
    outputs: HashMap<String, Vec<i64>>,
}

impl ModelConfig {
    /// Create an empty configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum batch size.
    #[must_use]
    pub fn with_max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.max_batch_size = max_batch_size;
        self
    }

    /// Enable or disable pinned input staging.
    #[must_use]
    pub fn with_pinned_input(mut self, enable: bool) -> Self {
        self.pinned_input = enable;
        self
    }

    /// Enable or disable pinned output staging.
    #[must_use]
    pub fn with_pinned_output(mut self, enable: bool) -> Self {
        self.pinned_output = enable;
        self
    }

    /// Declare an output and its shape.
    #[must_use]
    pub fn with_output(mut self, name: impl Into<String>, shape: impl Into<Vec<i64>>) -> Self {
        self.outputs.insert(name.into(), shape.into());
        self
    }

    /// Apply overrides from the environment on top of this configuration.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(size) = env_var("RUST_AI_BATCH_MAX_BATCH_SIZE").and_then(|v| v.parse().ok()) {
            self.max_batch_size = size;
        }
        if let Some(flag) = env_var("RUST_AI_BATCH_PINNED_INPUT") {
            self.pinned_input = parse_flag(&flag);
        }
        if let Some(flag) = env_var("RUST_AI_BATCH_PINNED_OUTPUT") {
            self.pinned_output = parse_flag(&flag);
        }
        self
    }

    /// Build a configuration from environment variables only.
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Raw configured dimensions of an output.
    #[must_use]
    pub fn output_dims(&self, name: &str) -> Option<&[i64]> {
        self.outputs.get(name).map(Vec::as_slice)
    }

    /// Concrete shape of an output.
    ///
    /// # Errors
    ///
    /// Returns `BatchError::MissingOutput` for unknown names and
    /// `BatchError::InvalidShape` for dynamic (negative) dimensions.
    pub fn output_shape(&self, name: &str) -> Result<Vec<usize>> {
        let dims = self
            .output_dims(name)
            .ok_or_else(|| BatchError::missing_output(name))?;
        narrow_dims(dims)
    }

    /// Names of all configured outputs.
    pub fn output_names(&self) -> impl Iterator<Item = &str> {
        self.outputs.keys().map(String::as_str)
    }
}

impl ValidatableConfig for ModelConfig {
    fn validate(&self) -> Result<()> {
        for (name, dims) in &self.outputs {
            if name.is_empty() {
                return Err(BatchError::invalid_config("output names must not be empty"));
            }
            if let Some(dim) = dims.iter().find(|d| **d < 0) {
                return Err(BatchError::invalid_config(format!(
                    "output '{name}' has non-concrete dimension {dim}"
                )));
            }
        }
        Ok(())
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

fn parse_flag(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}
