// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! Mapping memory descriptors onto compute devices.
//!
//! Device memory is allocated and synchronized through Candle. Host and pinned
//! memory map to the CPU device; device memory maps to the CUDA device with the
//! descriptor's ordinal. Builds without the `cuda` feature have no CUDA devices,
//! so any request for device memory fails with `DeviceNotAvailable`.

use crate::error::{BatchError, Result};
use crate::memory::{MemoryDescriptor, MemoryType};
use candle_core::Device;
use std::sync::Once;

/// Resolve the Candle device that backs the given placement.
///
/// # Errors
///
/// Returns `BatchError::DeviceNotAvailable` if the descriptor names a CUDA
/// device that cannot be opened.
///
/// # Example
///
/// ```rust
/// use rust_ai_batch::{compute_device, MemoryDescriptor};
/// use candle_core::Device;
///
/// let device = compute_device(MemoryDescriptor::pinned())?;
/// assert!(matches!(device, Device::Cpu));
/// # Ok::<(), rust_ai_batch::BatchError>(())
/// ```
pub fn compute_device(location: MemoryDescriptor) -> Result<Device> {
    match location.memory_type {
        MemoryType::Host | MemoryType::Pinned => Ok(Device::Cpu),
        MemoryType::Device => match Device::new_cuda(location.device_id) {
            Ok(device) => {
                log_device_once(location.device_id);
                Ok(device)
            }
            Err(err) => {
                tracing::debug!(
                    target: "rust_ai::batch",
                    device_id = location.device_id,
                    error = %err,
                    "CUDA device unavailable"
                );
                Err(BatchError::device_not_available(format!(
                    "CUDA:{} ({err})",
                    location.device_id
                )))
            }
        },
    }
}

/// Check whether a CUDA device with this ordinal can be opened.
#[must_use]
pub fn cuda_available(device_id: usize) -> bool {
    matches!(Device::cuda_if_available(device_id), Ok(Device::Cuda(_)))
}

fn log_device_once(device_id: usize) {
    static LOG_ONCE: Once = Once::new();

    LOG_ONCE.call_once(|| {
        tracing::info!(
            target: "rust_ai::batch",
            "Using CUDA device {device_id} for device-resident batch buffers"
        );
    });
}
