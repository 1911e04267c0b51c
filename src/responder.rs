// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! Shared output responder and type-erased registered outputs.
//!
//! All output tensors of a batch feed one responder session. [`SharedResponder`]
//! is the reference-counted handle they share; registering an output moves its
//! buffer into the responder as a [`RegisteredOutput`], after which the
//! responder is the only owner of those bytes.

use crate::buffer::Buffer;
use crate::dtype::DTypeExt;
use crate::error::{BatchError, Result};
use crate::host::OutputResponder;
use crate::memory::MemoryDescriptor;
use crate::stream::Stream;
use candle_core::{DType, Tensor, WithDType};
use std::any::Any;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

trait ErasedBuffer: Send + Sync {
    fn as_bytes(&self) -> Option<&[u8]>;
    fn device_tensor(&self) -> Option<&Tensor>;
    fn size_bytes(&self) -> usize;
    fn stream(&self) -> &Stream;
    fn into_any(self: Box<Self>) -> Box<dyn Any + Send>;
}

impl<T: WithDType> ErasedBuffer for Buffer<T> {
    fn as_bytes(&self) -> Option<&[u8]> {
        Buffer::as_bytes(self)
    }

    fn device_tensor(&self) -> Option<&Tensor> {
        Buffer::device_tensor(self)
    }

    fn size_bytes(&self) -> usize {
        Buffer::size_bytes(self)
    }

    fn stream(&self) -> &Stream {
        Buffer::stream(self)
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send> {
        self
    }
}

/// An output buffer handed over to the responder.
pub struct RegisteredOutput {
    name: String,
    shape: Vec<usize>,
    dtype: DType,
    location: MemoryDescriptor,
    buffer: Box<dyn ErasedBuffer>,
}

impl RegisteredOutput {
    /// Wrap a typed buffer for registration.
    pub fn new<T: WithDType>(name: impl Into<String>, shape: Vec<usize>, buffer: Buffer<T>) -> Self {
        Self {
            name: name.into(),
            shape,
            dtype: T::DTYPE,
            location: buffer.location(),
            buffer: Box::new(buffer),
        }
    }

    /// Output name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Output shape.
    #[must_use]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Element type.
    #[must_use]
    pub fn dtype(&self) -> DType {
        self.dtype
    }

    /// Where the buffer lives.
    #[must_use]
    pub fn location(&self) -> MemoryDescriptor {
        self.location
    }

    /// Size of the buffer in bytes.
    #[must_use]
    pub fn size_bytes(&self) -> usize {
        self.buffer.size_bytes()
    }

    /// Stream the buffer is ordered on.
    #[must_use]
    pub fn stream(&self) -> &Stream {
        self.buffer.stream()
    }

    /// Raw bytes for host-resident outputs.
    #[must_use]
    pub fn host_bytes(&self) -> Option<&[u8]> {
        self.buffer.as_bytes()
    }

    /// Candle tensor for device-resident outputs.
    #[must_use]
    pub fn device_tensor(&self) -> Option<&Tensor> {
        self.buffer.device_tensor()
    }

    /// Recover the typed buffer.
    ///
    /// # Errors
    ///
    /// Returns `BatchError::DTypeMismatch` if `T` is not the registered type.
    pub fn into_buffer<T: WithDType>(self) -> Result<Buffer<T>> {
        let registered = self.dtype;
        self.buffer
            .into_any()
            .downcast::<Buffer<T>>()
            .map(|buffer| *buffer)
            .map_err(|_| BatchError::dtype_mismatch(T::DTYPE.name(), registered.name()))
    }
}

impl fmt::Debug for RegisteredOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredOutput")
            .field("name", &self.name)
            .field("shape", &self.shape)
            .field("dtype", &self.dtype.name())
            .field("location", &self.location)
            .field("size_bytes", &self.size_bytes())
            .finish()
    }
}

/// Reference-counted handle to the responder session of one batch.
pub struct SharedResponder<R> {
    inner: Arc<Mutex<R>>,
}

impl<R> Clone for SharedResponder<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R: OutputResponder> SharedResponder<R> {
    /// Wrap a responder session.
    pub fn new(responder: R) -> Self {
        Self {
            inner: Arc::new(Mutex::new(responder)),
        }
    }

    /// Hand an output to the responder.
    ///
    /// # Errors
    ///
    /// Returns `BatchError::Internal` if the responder lock is poisoned, or
    /// whatever the responder reports.
    pub fn register(&self, output: RegisteredOutput) -> Result<()> {
        tracing::debug!(
            target: "rust_ai::batch",
            output = output.name(),
            bytes = output.size_bytes(),
            location = %output.location(),
            "registering output"
        );
        self.lock()?.process_tensor(output)
    }

    /// Scatter registered outputs into `responses`; `true` if staging was used.
    ///
    /// # Errors
    ///
    /// Returns `BatchError::Internal` if the responder lock is poisoned, or
    /// whatever the responder reports.
    pub fn finalize(&self, responses: &mut [R::Response]) -> Result<bool> {
        self.lock()?.finalize(responses)
    }

    /// Number of live handles, including the batch's own.
    #[must_use]
    pub fn handle_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    fn lock(&self) -> Result<MutexGuard<'_, R>> {
        self.inner
            .lock()
            .map_err(|_| BatchError::internal("output responder lock poisoned"))
    }
}

impl<R> fmt::Debug for SharedResponder<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedResponder")
            .field("handles", &Arc::strong_count(&self.inner))
            .finish()
    }
}
