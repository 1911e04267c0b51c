// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! Compute stream ordering token.
//!
//! A [`Stream`] is passed explicitly through every buffer operation of a batch
//! instead of living in global state, so concurrent batches on different
//! streams never observe each other. Operations record themselves on the stream
//! and return immediately; [`Stream::synchronize`] is the only blocking call.
//!
//! Clones share the same underlying stream.

use crate::error::Result;
use candle_core::Device;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

static NEXT_STREAM_ID: AtomicU64 = AtomicU64::new(1);

struct StreamInner {
    id: u64,
    device: Device,
    pending: AtomicUsize,
    synchronizations: AtomicUsize,
}

/// Ordering context shared by all buffer operations of one batch.
#[derive(Clone)]
pub struct Stream {
    inner: Arc<StreamInner>,
}

impl Stream {
    /// Create a stream ordered on the host.
    #[must_use]
    pub fn new() -> Self {
        Self::on_device(Device::Cpu)
    }

    /// Create a stream ordered on the given Candle device.
    #[must_use]
    pub fn on_device(device: Device) -> Self {
        Self {
            inner: Arc::new(StreamInner {
                id: NEXT_STREAM_ID.fetch_add(1, Ordering::Relaxed),
                device,
                pending: AtomicUsize::new(0),
                synchronizations: AtomicUsize::new(0),
            }),
        }
    }

    /// Unique identifier of the stream.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Device whose work queue this stream orders.
    #[must_use]
    pub fn device(&self) -> &Device {
        &self.inner.device
    }

    /// Record an asynchronous operation issued on this stream.
    pub fn record(&self, op: &'static str) {
        let pending = self.inner.pending.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::trace!(target: "rust_ai::batch", stream = self.inner.id, op, pending, "enqueued");
    }

    /// Operations recorded since the last synchronization.
    #[must_use]
    pub fn pending_ops(&self) -> usize {
        self.inner.pending.load(Ordering::SeqCst)
    }

    /// Number of times this stream has been drained.
    #[must_use]
    pub fn sync_count(&self) -> usize {
        self.inner.synchronizations.load(Ordering::SeqCst)
    }

    /// Block until all work issued on the stream has completed.
    ///
    /// # Errors
    ///
    /// Propagates device synchronization failures.
    pub fn synchronize(&self) -> Result<()> {
        self.inner.device.synchronize()?;
        let drained = self.inner.pending.swap(0, Ordering::SeqCst);
        self.inner.synchronizations.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(target: "rust_ai::batch", stream = self.inner.id, drained, "stream synchronized");
        Ok(())
    }

    /// Whether two handles refer to the same stream.
    #[must_use]
    pub fn same_stream(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Default for Stream {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stream")
            .field("id", &self.inner.id)
            .field("device", &self.inner.device)
            .field("pending", &self.pending_ops())
            .finish()
    }
}

impl PartialEq for Stream {
    fn eq(&self, other: &Self) -> bool {
        self.same_stream(other)
    }
}

impl Eq for Stream {}
