// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! Memory spaces, placement descriptors and allocation tracking.
//!
//! ## Why This Module Exists
//!
//! Every buffer handed across the host boundary lives somewhere specific: pageable
//! host memory, pinned host memory, or memory on a particular GPU. The batch
//! adapter asks host services for data *in a given place* and refuses data that
//! ends up elsewhere, so placement has to be a first-class value that can be
//! compared, logged and mapped onto a compute device.
//!
//! The host also owns a memory manager that bounds how much the backend may
//! allocate. [`MemoryTracker`] models that manager; [`Allocation`] is the RAII
//! guard a buffer holds so the charge is released when the buffer goes away.
//!
//! ## Design Decisions
//!
//! - **No global state**: trackers are shared explicitly through `Arc`, so
//!   concurrent batches only share what the host chooses to share.
//! - **Check before commit**: a failing allocation never changes tracker state.

use crate::dtype::{byte_size_of, DTypeExt};
use crate::error::{BatchError, Result};
use candle_core::WithDType;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Where the bytes of a buffer physically reside.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MemoryType {
    /// Pageable host memory.
    #[default]
    Host,
    /// Page-locked host memory, directly reachable by device DMA.
    Pinned,
    /// Memory on a compute device.
    Device,
}

impl MemoryType {
    /// Whether the memory is addressable from the CPU.
    #[must_use]
    pub fn is_host_accessible(self) -> bool {
        matches!(self, Self::Host | Self::Pinned)
    }

    /// Short name used in logs and error messages.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Host => "host",
            Self::Pinned => "pinned",
            Self::Device => "device",
        }
    }
}

impl fmt::Display for MemoryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A (memory space, device index) pair identifying where bytes live.
///
/// For host memory types the device index names the device the memory is
/// associated with (usually 0); it still takes part in equality, so a
/// placement reported on a different index counts as a mismatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MemoryDescriptor {
    /// Memory space.
    pub memory_type: MemoryType,
    /// Device ordinal.
    pub device_id: usize,
}

impl MemoryDescriptor {
    /// Create a descriptor.
    #[must_use]
    pub fn new(memory_type: MemoryType, device_id: usize) -> Self {
        Self {
            memory_type,
            device_id,
        }
    }

    /// Pageable host memory on device 0.
    #[must_use]
    pub fn host() -> Self {
        Self::new(MemoryType::Host, 0)
    }

    /// Pinned host memory on device 0.
    #[must_use]
    pub fn pinned() -> Self {
        Self::new(MemoryType::Pinned, 0)
    }

    /// Memory on the given device.
    #[must_use]
    pub fn device(device_id: usize) -> Self {
        Self::new(MemoryType::Device, device_id)
    }
}

impl fmt::Display for MemoryDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.memory_type, self.device_id)
    }
}

/// Memory manager accounting for backend allocations.
///
/// Tracks allocated and peak bytes and enforces an optional limit. Thread-safe via
/// atomics, so one tracker may back any number of concurrent batches.
///
/// ```rust
/// use rust_ai_batch::MemoryTracker;
/// use std::sync::Arc;
///
/// let tracker = Arc::new(MemoryTracker::with_limit(1024));
/// let guard = tracker.reserve(512)?;
/// assert_eq!(tracker.allocated_bytes(), 512);
/// drop(guard);
/// assert_eq!(tracker.allocated_bytes(), 0);
/// # Ok::<(), rust_ai_batch::BatchError>(())
/// ```
#[derive(Debug)]
pub struct MemoryTracker {
    /// Currently allocated bytes.
    allocated: AtomicUsize,
    /// Peak allocation during lifetime.
    peak: AtomicUsize,
    /// Memory limit (0 = unlimited).
    limit: AtomicUsize,
}

impl Default for MemoryTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTracker {
    /// Create a new memory tracker with no limit.
    #[must_use]
    pub fn new() -> Self {
        Self::with_limit(0)
    }

    /// Create a tracker with a memory limit (0 = unlimited).
    #[must_use]
    pub fn with_limit(limit_bytes: usize) -> Self {
        Self {
            allocated: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            limit: AtomicUsize::new(limit_bytes),
        }
    }

    /// Record a memory allocation.
    ///
    /// # Errors
    ///
    /// Returns `BatchError::OutOfMemory` if allocation would exceed the limit.
    pub fn allocate(&self, bytes: usize) -> Result<()> {
        let limit = self.limit.load(Ordering::SeqCst);
        let mut current = self.allocated.load(Ordering::SeqCst);
        loop {
            let new_allocated = current.checked_add(bytes).ok_or_else(|| {
                BatchError::oom(format!("allocation of {bytes} bytes overflows tracker"))
            })?;
            if limit > 0 && new_allocated > limit {
                return Err(BatchError::oom(format!(
                    "allocation of {bytes} bytes would exceed limit of {limit} bytes \
                     (current: {current} bytes)"
                )));
            }
            match self.allocated.compare_exchange_weak(
                current,
                new_allocated,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => {
                    self.peak.fetch_max(new_allocated, Ordering::SeqCst);
                    return Ok(());
                }
                Err(actual) => current = actual,
            }
        }
    }

    /// Record a memory deallocation.
    pub fn deallocate(&self, bytes: usize) {
        self.allocated.fetch_sub(bytes, Ordering::SeqCst);
    }

    /// Charge `bytes` to the tracker and return a guard that releases them on drop.
    ///
    /// # Errors
    ///
    /// Returns `BatchError::OutOfMemory` if allocation would exceed the limit.
    pub fn reserve(self: &Arc<Self>, bytes: usize) -> Result<Allocation> {
        self.allocate(bytes)?;
        Ok(Allocation {
            tracker: Arc::clone(self),
            bytes,
        })
    }

    /// Charge a buffer of `len` elements of `T`.
    ///
    /// # Errors
    ///
    /// Returns `BatchError::OutOfMemory` if the byte size overflows or the
    /// allocation would exceed the limit.
    pub fn reserve_for<T: WithDType>(self: &Arc<Self>, len: usize) -> Result<Allocation> {
        let bytes = byte_size_of::<T>(len)?;
        tracing::trace!(
            target: "rust_ai::memory",
            bytes,
            dtype = T::DTYPE.name(),
            "reserving buffer"
        );
        self.reserve(bytes)
    }

    /// Get currently allocated bytes.
    #[must_use]
    pub fn allocated_bytes(&self) -> usize {
        self.allocated.load(Ordering::SeqCst)
    }

    /// Get peak allocation during tracker lifetime.
    #[must_use]
    pub fn peak_bytes(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Get configured memory limit (0 = unlimited).
    #[must_use]
    pub fn limit_bytes(&self) -> usize {
        self.limit.load(Ordering::SeqCst)
    }

}

/// Bytes charged to a [`MemoryTracker`], released on drop.
#[derive(Debug)]
pub struct Allocation {
    tracker: Arc<MemoryTracker>,
    bytes: usize,
}

impl Allocation {
    /// Number of bytes held by this guard.
    #[must_use]
    pub fn bytes(&self) -> usize {
        self.bytes
    }
}

impl Drop for Allocation {
    fn drop(&mut self) {
        self.tracker.deallocate(self.bytes);
    }
}
