// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! Shape-aware tensors over [`Buffer`]s.
//!
//! [`Tensor`] pairs a shape with a buffer. [`InputTensor`] is a tensor whose
//! bytes belong to the batch's input collector and so cannot outlive the
//! batch. [`OutputTensor`] owns a fresh buffer and carries the output name plus
//! a handle to the batch's shared responder; once the computation layer has
//! filled it, [`OutputTensor::finalize`] hands the buffer over for scattering
//! into responses.

use crate::buffer::Buffer;
use crate::error::{BatchError, Result};
use crate::host::OutputResponder;
use crate::memory::{MemoryDescriptor, MemoryType};
use crate::responder::{RegisteredOutput, SharedResponder};
use crate::shape::element_count;
use crate::stream::Stream;
use candle_core::{DType, WithDType};
use std::marker::PhantomData;
use std::ops::Deref;

/// A shaped view over a typed buffer.
#[derive(Debug)]
pub struct Tensor<T: WithDType> {
    shape: Vec<usize>,
    buffer: Buffer<T>,
}

impl<T: WithDType> Tensor<T> {
    /// Pair a shape with a buffer.
    ///
    /// # Errors
    ///
    /// Returns `BatchError::ShapeMismatch` if the buffer does not hold exactly
    /// the number of elements the shape describes.
    pub fn new(shape: Vec<usize>, buffer: Buffer<T>) -> Result<Self> {
        let expected = element_count(&shape);
        if buffer.len() != expected {
            return Err(BatchError::shape_mismatch(shape, [buffer.len()]));
        }
        Ok(Self { shape, buffer })
    }

    /// Zero-size tensor with an empty shape, for batches without requests.
    pub(crate) fn empty(buffer: Buffer<T>) -> Self {
        debug_assert!(buffer.is_empty());
        Self {
            shape: Vec::new(),
            buffer,
        }
    }

    /// Tensor dimensions.
    #[must_use]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Number of elements.
    #[must_use]
    pub fn size(&self) -> usize {
        self.buffer.len()
    }

    /// Element type.
    #[must_use]
    pub fn dtype(&self) -> DType {
        T::DTYPE
    }

    /// Underlying buffer.
    #[must_use]
    pub fn buffer(&self) -> &Buffer<T> {
        &self.buffer
    }

    /// Mutable host view of the elements, `None` for device or borrowed memory.
    #[must_use]
    pub fn as_mut_slice(&mut self) -> Option<&mut [T]> {
        self.buffer.as_mut_slice()
    }

    /// Overwrite the elements with `src`, which must match in length.
    ///
    /// # Errors
    ///
    /// See [`Buffer::copy_from_slice`].
    pub fn copy_from_slice(&mut self, src: &[T]) -> Result<()> {
        self.buffer.copy_from_slice(src)
    }

    /// Overwrite the elements with those of a Candle tensor.
    ///
    /// # Errors
    ///
    /// See [`Buffer::write_tensor`].
    pub fn write_tensor(&mut self, src: &candle_core::Tensor) -> Result<()> {
        self.buffer.write_tensor(src)
    }

    /// Where the elements live.
    #[must_use]
    pub fn location(&self) -> MemoryDescriptor {
        self.buffer.location()
    }

    /// Memory space of the elements.
    #[must_use]
    pub fn memory_type(&self) -> MemoryType {
        self.buffer.memory_type()
    }

    /// Device ordinal of the elements.
    #[must_use]
    pub fn device_id(&self) -> usize {
        self.buffer.device_id()
    }

    /// Stream ordering work on this tensor.
    #[must_use]
    pub fn stream(&self) -> &Stream {
        self.buffer.stream()
    }

    /// Split into shape and buffer.
    #[must_use]
    pub fn into_parts(self) -> (Vec<usize>, Buffer<T>) {
        (self.shape, self.buffer)
    }
}

/// An input tensor borrowed from a batch.
///
/// The elements may be a zero-copy view of request payloads or a copy owned by
/// the collector session; either way they are read-only and valid only while
/// the batch is alive.
#[derive(Debug)]
pub struct InputTensor<'b, T: WithDType> {
    tensor: Tensor<T>,
    _batch: PhantomData<&'b ()>,
}

impl<T: WithDType> InputTensor<'_, T> {
    pub(crate) fn new(tensor: Tensor<T>) -> Self {
        Self {
            tensor,
            _batch: PhantomData,
        }
    }

    /// Copy the elements into a tensor that owns its storage.
    ///
    /// # Errors
    ///
    /// Propagates [`Buffer::try_clone`] failures.
    pub fn to_owned_tensor(&self) -> Result<Tensor<T>> {
        Ok(Tensor {
            shape: self.tensor.shape.clone(),
            buffer: self.tensor.buffer.try_clone()?,
        })
    }
}

impl<T: WithDType> Deref for InputTensor<'_, T> {
    type Target = Tensor<T>;

    fn deref(&self) -> &Self::Target {
        &self.tensor
    }
}

/// A freshly allocated output tensor bound to the batch's responder.
#[derive(Debug)]
pub struct OutputTensor<T: WithDType, R> {
    name: String,
    tensor: Tensor<T>,
    responder: SharedResponder<R>,
}

impl<T: WithDType, R: OutputResponder> OutputTensor<T, R> {
    pub(crate) fn new(name: impl Into<String>, tensor: Tensor<T>, responder: SharedResponder<R>) -> Self {
        Self {
            name: name.into(),
            tensor,
            responder,
        }
    }

    /// Output name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Hand the filled buffer to the responder.
    ///
    /// Ownership of the buffer moves to the responder; it is scattered into
    /// the responses when the batch is finalized.
    ///
    /// # Errors
    ///
    /// Propagates responder failures.
    pub fn finalize(self) -> Result<()> {
        let (shape, buffer) = self.tensor.into_parts();
        self.responder
            .register(RegisteredOutput::new(self.name, shape, buffer))
    }
}

impl<T: WithDType, R> Deref for OutputTensor<T, R> {
    type Target = Tensor<T>;

    fn deref(&self) -> &Self::Target {
        &self.tensor
    }
}

// Writes go through element access only, so the buffer always matches the
// configured shape.
impl<T: WithDType, R> OutputTensor<T, R> {
    /// Mutable host view of the elements, `None` for device memory.
    #[must_use]
    pub fn as_mut_slice(&mut self) -> Option<&mut [T]> {
        self.tensor.as_mut_slice()
    }

    /// Overwrite the elements with `src`.
    ///
    /// # Errors
    ///
    /// Returns `BatchError::ShapeMismatch` if `src` has the wrong length.
    pub fn copy_from_slice(&mut self, src: &[T]) -> Result<()> {
        self.tensor.copy_from_slice(src)
    }

    /// Overwrite the elements with those of a Candle tensor.
    ///
    /// # Errors
    ///
    /// Returns `BatchError::DTypeMismatch` or `BatchError::ShapeMismatch` if
    /// the tensor does not fit, or a Candle error.
    pub fn write_tensor(&mut self, src: &candle_core::Tensor) -> Result<()> {
        self.tensor.write_tensor(src)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tensor_checks_element_count() {
        let buffer = Buffer::<f32>::new(12, MemoryDescriptor::host(), Stream::new()).unwrap();
        let tensor = Tensor::new(vec![3, 4], buffer).unwrap();
        assert_eq!(tensor.shape(), &[3, 4]);
        assert_eq!(tensor.size(), 12);
        assert_eq!(tensor.dtype(), DType::F32);
        assert_eq!(tensor.memory_type(), MemoryType::Host);

        let buffer = Buffer::<f32>::new(5, MemoryDescriptor::host(), Stream::new()).unwrap();
        assert!(matches!(
            Tensor::new(vec![3, 4], buffer),
            Err(BatchError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_scalar_shape_holds_one_element() {
        let buffer = Buffer::<f32>::new(1, MemoryDescriptor::host(), Stream::new()).unwrap();
        let tensor = Tensor::new(Vec::new(), buffer).unwrap();
        assert!(tensor.shape().is_empty());
        assert_eq!(tensor.size(), 1);
        assert_eq!(tensor.buffer().size_bytes(), 4);

        assert!(matches!(
            Tensor::new(Vec::new(), Buffer::<f32>::default()),
            Err(BatchError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_empty_tensor_has_no_elements() {
        let tensor = Tensor::empty(Buffer::<u8>::default());
        assert!(tensor.shape().is_empty());
        assert_eq!(tensor.buffer().size_bytes(), 0);
    }

    #[test]
    fn test_element_writes_keep_length() {
        let buffer = Buffer::<f32>::new(4, MemoryDescriptor::host(), Stream::new()).unwrap();
        let mut tensor = Tensor::new(vec![2, 2], buffer).unwrap();

        tensor.copy_from_slice(&[1.0, 2.0, 3.0, 4.0]).unwrap();
        tensor.as_mut_slice().unwrap()[3] = 5.0;
        assert_eq!(tensor.buffer().to_vec().unwrap(), vec![1.0, 2.0, 3.0, 5.0]);

        assert!(matches!(
            tensor.copy_from_slice(&[1.0]),
            Err(BatchError::ShapeMismatch { .. })
        ));
        let wrong = candle_core::Tensor::zeros(3, DType::F32, &candle_core::Device::Cpu).unwrap();
        assert!(tensor.write_tensor(&wrong).is_err());
        assert_eq!(tensor.size(), 4);
    }
}
