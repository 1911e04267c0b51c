// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! Typed, placement-aware buffers.
//!
//! A [`Buffer<T>`] is a run of `T` elements together with where those elements
//! live ([`MemoryDescriptor`]) and the [`Stream`] that orders work on them.
//! Storage comes in three flavours:
//!
//! - **host**: an owned `Vec<T>` in pageable or pinned host memory
//! - **device**: an owned Candle tensor on a CUDA device
//! - **borrowed**: a non-owning view over memory some other engine owns, such
//!   as the original request payload handed over by the host
//!
//! Borrowed buffers are read-only. Their validity is the caller's promise made
//! in [`Buffer::from_raw_parts`].

use crate::device::compute_device;
use crate::dtype::DTypeExt;
use crate::error::{BatchError, Result};
use crate::memory::{Allocation, MemoryDescriptor, MemoryTracker, MemoryType};
use crate::stream::Stream;
use candle_core::{Tensor, WithDType};
use std::fmt;
use std::ptr::NonNull;
use std::sync::Arc;

enum Storage<T> {
    Host(Vec<T>),
    Device(Tensor),
    Borrowed { ptr: NonNull<T>, len: usize },
}

/// A run of `T` elements in a specific memory space, tagged with a stream.
pub struct Buffer<T: WithDType> {
    storage: Storage<T>,
    location: MemoryDescriptor,
    stream: Stream,
    allocation: Option<Allocation>,
}

// SAFETY: owned storage is `Send`/`Sync` for `T: WithDType`; borrowed storage is a
// read-only view whose referent the constructor guarantees outlives the buffer.
unsafe impl<T: WithDType> Send for Buffer<T> {}
// SAFETY: see above; shared access never mutates borrowed memory.
unsafe impl<T: WithDType> Sync for Buffer<T> {}

impl<T: WithDType> Buffer<T> {
    /// Allocate `len` zeroed elements at `location`.
    ///
    /// Host and pinned memory are allocated on the heap; device memory is
    /// allocated through Candle on the descriptor's CUDA ordinal.
    ///
    /// # Errors
    ///
    /// Returns `BatchError::DeviceNotAvailable` if device memory is requested
    /// and the device cannot be opened, or a Candle error if allocation fails.
    pub fn new(len: usize, location: MemoryDescriptor, stream: Stream) -> Result<Self> {
        let storage = match location.memory_type {
            MemoryType::Host | MemoryType::Pinned => {
                Storage::Host(vec![T::from_f64(0.0); len])
            }
            MemoryType::Device => {
                let device = compute_device(location)?;
                Storage::Device(Tensor::zeros(len, T::DTYPE, &device)?)
            }
        };
        stream.record("alloc");
        Ok(Self {
            storage,
            location,
            stream,
            allocation: None,
        })
    }

    /// Allocate `len` elements at `location`, charging the bytes to `tracker`.
    ///
    /// The charge is released when the buffer is dropped.
    ///
    /// # Errors
    ///
    /// Returns `BatchError::OutOfMemory` if the tracker's limit would be
    /// exceeded, plus everything [`Buffer::new`] can return.
    pub fn allocate(
        len: usize,
        location: MemoryDescriptor,
        stream: Stream,
        tracker: &Arc<MemoryTracker>,
    ) -> Result<Self> {
        let allocation = tracker.reserve_for::<T>(len)?;
        let mut buffer = Self::new(len, location, stream)?;
        buffer.allocation = Some(allocation);
        Ok(buffer)
    }

    /// Wrap memory owned elsewhere without copying.
    ///
    /// # Errors
    ///
    /// Returns `BatchError::Internal` if `ptr` is null while `len` is non-zero,
    /// or if `ptr` is not aligned for `T`.
    ///
    /// # Safety
    ///
    /// For the lifetime of the returned buffer, `ptr` must point to `len`
    /// initialized elements of `T` located at `location`, and nothing may
    /// write to them.
    pub unsafe fn from_raw_parts(
        ptr: *const T,
        len: usize,
        location: MemoryDescriptor,
        stream: Stream,
    ) -> Result<Self> {
        let ptr = match NonNull::new(ptr.cast_mut()) {
            Some(ptr) => ptr,
            None if len == 0 => NonNull::dangling(),
            None => {
                return Err(BatchError::internal(format!(
                    "null pointer for {len} elements at {location}"
                )))
            }
        };
        if !ptr.as_ptr().is_aligned() {
            return Err(BatchError::internal(format!(
                "pointer {:p} is not aligned for {}",
                ptr.as_ptr(),
                T::DTYPE.name()
            )));
        }
        Ok(Self {
            storage: Storage::Borrowed { ptr, len },
            location,
            stream,
            allocation: None,
        })
    }

    /// Number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        match &self.storage {
            Storage::Host(data) => data.len(),
            Storage::Device(tensor) => tensor.elem_count(),
            Storage::Borrowed { len, .. } => *len,
        }
    }

    /// Whether the buffer holds no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Size in bytes.
    #[must_use]
    pub fn size_bytes(&self) -> usize {
        std::mem::size_of::<T>() * self.len()
    }

    /// Where the elements live.
    #[must_use]
    pub fn location(&self) -> MemoryDescriptor {
        self.location
    }

    /// Memory space of the elements.
    #[must_use]
    pub fn memory_type(&self) -> MemoryType {
        self.location.memory_type
    }

    /// Device ordinal of the elements.
    #[must_use]
    pub fn device_id(&self) -> usize {
        self.location.device_id
    }

    /// Stream ordering work on this buffer.
    #[must_use]
    pub fn stream(&self) -> &Stream {
        &self.stream
    }

    /// Re-tag the buffer with another stream.
    pub fn set_stream(&mut self, stream: Stream) {
        self.stream = stream;
    }

    /// Whether this buffer owns its storage.
    #[must_use]
    pub fn is_owned(&self) -> bool {
        !matches!(self.storage, Storage::Borrowed { .. })
    }

    /// Host view of the elements, `None` for device memory.
    #[must_use]
    pub fn as_slice(&self) -> Option<&[T]> {
        match &self.storage {
            Storage::Host(data) => Some(data.as_slice()),
            Storage::Borrowed { ptr, len } if self.location.memory_type.is_host_accessible() => {
                // SAFETY: guaranteed by the `from_raw_parts` contract.
                Some(unsafe { std::slice::from_raw_parts(ptr.as_ptr(), *len) })
            }
            _ => None,
        }
    }

    /// Mutable host view, `None` for device or borrowed memory.
    #[must_use]
    pub fn as_mut_slice(&mut self) -> Option<&mut [T]> {
        match &mut self.storage {
            Storage::Host(data) => Some(data.as_mut_slice()),
            _ => None,
        }
    }

    /// Host view of the raw bytes, `None` for device memory.
    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        self.as_slice().map(|data| {
            // SAFETY: `WithDType` types are plain numeric values without padding.
            unsafe {
                std::slice::from_raw_parts(data.as_ptr().cast::<u8>(), std::mem::size_of_val(data))
            }
        })
    }

    /// The Candle tensor backing an owned device buffer.
    #[must_use]
    pub fn device_tensor(&self) -> Option<&Tensor> {
        match &self.storage {
            Storage::Device(tensor) => Some(tensor),
            _ => None,
        }
    }

    /// Copy the elements back to host memory.
    ///
    /// # Errors
    ///
    /// Returns `BatchError::Internal` for borrowed device memory, which the
    /// buffer cannot address, or a Candle error if the device read fails.
    pub fn to_vec(&self) -> Result<Vec<T>> {
        if let Some(data) = self.as_slice() {
            return Ok(data.to_vec());
        }
        match &self.storage {
            Storage::Device(tensor) => Ok(tensor.to_vec1::<T>()?),
            _ => Err(BatchError::internal(format!(
                "cannot read borrowed {} buffer from host",
                self.location
            ))),
        }
    }

    /// Overwrite the contents with `src`.
    ///
    /// # Errors
    ///
    /// Returns `BatchError::ShapeMismatch` if lengths differ and
    /// `BatchError::Internal` for borrowed buffers.
    pub fn copy_from_slice(&mut self, src: &[T]) -> Result<()> {
        let len = self.len();
        if src.len() != len {
            return Err(BatchError::shape_mismatch([len], [src.len()]));
        }
        match &mut self.storage {
            Storage::Host(data) => data.copy_from_slice(src),
            Storage::Device(tensor) => {
                *tensor = Tensor::from_slice(src, len, tensor.device())?;
            }
            Storage::Borrowed { .. } => {
                return Err(BatchError::internal("borrowed buffers are read-only"));
            }
        }
        self.stream.record("copy");
        Ok(())
    }

    /// Overwrite the contents with the elements of a Candle tensor.
    ///
    /// The tensor is flattened; its dtype and element count must match.
    ///
    /// # Errors
    ///
    /// Returns `BatchError::DTypeMismatch`, `BatchError::ShapeMismatch`,
    /// `BatchError::Internal` for borrowed buffers, or a Candle error.
    pub fn write_tensor(&mut self, src: &Tensor) -> Result<()> {
        if src.dtype() != T::DTYPE {
            return Err(BatchError::dtype_mismatch(T::DTYPE.name(), src.dtype().name()));
        }
        let len = self.len();
        if src.elem_count() != len {
            return Err(BatchError::shape_mismatch([len], src.dims()));
        }
        let flat = src.flatten_all()?;
        match &mut self.storage {
            Storage::Host(data) => {
                data.copy_from_slice(&flat.to_vec1::<T>()?);
            }
            Storage::Device(tensor) => {
                *tensor = flat.to_device(tensor.device())?;
            }
            Storage::Borrowed { .. } => {
                return Err(BatchError::internal("borrowed buffers are read-only"));
            }
        }
        self.stream.record("copy");
        Ok(())
    }

    /// Deep copy into a new owned buffer at the same location.
    ///
    /// The copy never aliases the original and is not charged to any tracker.
    ///
    /// # Errors
    ///
    /// Returns `BatchError::Internal` for borrowed device memory, or a Candle
    /// error if the device copy fails.
    pub fn try_clone(&self) -> Result<Self> {
        let storage = match &self.storage {
            Storage::Device(tensor) => Storage::Device(tensor.copy()?),
            _ => Storage::Host(self.to_vec()?),
        };
        self.stream.record("copy");
        Ok(Self {
            storage,
            location: self.location,
            stream: self.stream.clone(),
            allocation: None,
        })
    }
}

impl<T: WithDType> Default for Buffer<T> {
    fn default() -> Self {
        Self {
            storage: Storage::Host(Vec::new()),
            location: MemoryDescriptor::host(),
            stream: Stream::default(),
            allocation: None,
        }
    }
}

impl<T: WithDType> fmt::Debug for Buffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("dtype", &T::DTYPE.name())
            .field("len", &self.len())
            .field("location", &self.location)
            .field("owned", &self.is_owned())
            .field("stream", &self.stream.id())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_buffer() {
        let mut buffer = Buffer::<u32>::default();
        assert_eq!(buffer.memory_type(), MemoryType::Host);
        assert_eq!(buffer.len(), 0);
        assert!(buffer.is_empty());
        assert_eq!(buffer.device_id(), 0);

        let stream = Stream::new();
        buffer.set_stream(stream.clone());
        assert_eq!(buffer.stream(), &stream);
    }

    #[test]
    fn test_host_buffer() {
        let data = vec![1u32, 2, 3];
        let mut buffer = Buffer::<u32>::new(data.len(), MemoryDescriptor::host(), Stream::new()).unwrap();

        assert_eq!(buffer.memory_type(), MemoryType::Host);
        assert_eq!(buffer.len(), data.len());
        assert_eq!(buffer.as_slice().unwrap(), &[0, 0, 0]);

        buffer.copy_from_slice(&data).unwrap();
        assert_eq!(buffer.to_vec().unwrap(), data);
        assert_eq!(buffer.size_bytes(), 12);
    }

    #[test]
    fn test_non_owning_host_buffer() {
        let data = vec![1u32, 2, 3];
        let mut buffer = unsafe {
            Buffer::from_raw_parts(data.as_ptr(), data.len(), MemoryDescriptor::host(), Stream::new())
        }
        .unwrap();

        assert!(!buffer.is_owned());
        assert_eq!(buffer.as_slice().unwrap().as_ptr(), data.as_ptr());
        assert!(buffer.as_mut_slice().is_none());
        assert!(buffer.copy_from_slice(&[4, 5, 6]).unwrap_err().is_internal());
        assert_eq!(data, vec![1, 2, 3]);
    }

    #[test]
    fn test_non_owning_device_buffer_is_not_host_readable() {
        let data = vec![1.0f32, 2.0];
        let buffer = unsafe {
            Buffer::from_raw_parts(data.as_ptr(), data.len(), MemoryDescriptor::device(0), Stream::new())
        }
        .unwrap();
        assert!(buffer.as_slice().is_none());
        assert!(buffer.to_vec().unwrap_err().is_internal());
        assert!(buffer.try_clone().is_err());
    }

    #[test]
    fn test_null_pointer_rules() {
        let empty = unsafe {
            Buffer::<f32>::from_raw_parts(std::ptr::null(), 0, MemoryDescriptor::host(), Stream::new())
        }
        .unwrap();
        assert!(empty.is_empty());
        assert_eq!(empty.as_slice().unwrap(), &[] as &[f32]);

        let err = unsafe {
            Buffer::<f32>::from_raw_parts(std::ptr::null(), 4, MemoryDescriptor::host(), Stream::new())
        }
        .unwrap_err();
        assert!(err.is_internal());
    }

    #[test]
    fn test_copy_buffer_does_not_alias() {
        let data = vec![1i64, 2, 3];
        let original = unsafe {
            Buffer::from_raw_parts(data.as_ptr(), data.len(), MemoryDescriptor::host(), Stream::new())
        }
        .unwrap();
        let copy = original.try_clone().unwrap();

        assert_eq!(copy.memory_type(), MemoryType::Host);
        assert_eq!(copy.len(), data.len());
        assert!(copy.is_owned());
        assert_ne!(copy.as_slice().unwrap().as_ptr(), original.as_slice().unwrap().as_ptr());
        assert_eq!(copy.to_vec().unwrap(), data);
    }

    #[test]
    fn test_move_assignment_buffer() {
        let data = vec![1u32, 2, 3];
        let mut buffer = unsafe {
            Buffer::from_raw_parts(data.as_ptr(), data.len() - 1, MemoryDescriptor::host(), Stream::new())
        }
        .unwrap();
        buffer = Buffer::new(data.len(), MemoryDescriptor::pinned(), Stream::new()).unwrap();

        assert_eq!(buffer.memory_type(), MemoryType::Pinned);
        assert_eq!(buffer.len(), data.len());
    }

    #[test]
    fn test_allocate_charges_tracker() {
        let tracker = Arc::new(MemoryTracker::with_limit(64));
        let buffer = Buffer::<f32>::allocate(8, MemoryDescriptor::host(), Stream::new(), &tracker).unwrap();
        assert_eq!(tracker.allocated_bytes(), 32);

        let err = Buffer::<f32>::allocate(9, MemoryDescriptor::host(), Stream::new(), &tracker).unwrap_err();
        assert!(matches!(err, BatchError::OutOfMemory { .. }));

        drop(buffer);
        assert_eq!(tracker.allocated_bytes(), 0);
    }

    #[test]
    fn test_write_tensor_into_host_buffer() {
        let mut buffer = Buffer::<f32>::new(4, MemoryDescriptor::host(), Stream::new()).unwrap();
        let src = Tensor::new(&[[1.0f32, 2.0], [3.0, 4.0]], &candle_core::Device::Cpu).unwrap();
        buffer.write_tensor(&src).unwrap();
        assert_eq!(buffer.as_slice().unwrap(), &[1.0, 2.0, 3.0, 4.0]);

        let wrong = Tensor::new(&[1u32, 2, 3, 4], &candle_core::Device::Cpu).unwrap();
        assert!(matches!(
            buffer.write_tensor(&wrong),
            Err(BatchError::DTypeMismatch { .. })
        ));
    }

    #[test]
    fn test_as_bytes() {
        let mut buffer = Buffer::<u32>::new(2, MemoryDescriptor::host(), Stream::new()).unwrap();
        buffer.copy_from_slice(&[1, 2]).unwrap();
        let bytes = buffer.as_bytes().unwrap();
        assert_eq!(bytes.len(), 8);
        assert_eq!(&bytes[..4], &1u32.to_ne_bytes());
    }

    #[test]
    fn test_allocation_records_on_stream() {
        let stream = Stream::new();
        let _buffer = Buffer::<u8>::new(16, MemoryDescriptor::host(), stream.clone()).unwrap();
        assert_eq!(stream.pending_ops(), 1);
    }

    #[cfg(not(feature = "cuda"))]
    #[test]
    fn test_device_buffer_without_cuda() {
        let err = Buffer::<u32>::new(3, MemoryDescriptor::device(0), Stream::new()).unwrap_err();
        assert!(matches!(err, BatchError::DeviceNotAvailable { .. }));
    }

    #[cfg(feature = "cuda")]
    #[test]
    fn test_device_buffer() {
        if !crate::device::cuda_available(0) {
            return;
        }
        let data = vec![1u32, 2, 3];
        let mut buffer = Buffer::<u32>::new(data.len(), MemoryDescriptor::device(0), Stream::new()).unwrap();
        assert_eq!(buffer.memory_type(), MemoryType::Device);
        assert!(buffer.as_slice().is_none());
        buffer.copy_from_slice(&data).unwrap();
        assert_eq!(buffer.to_vec().unwrap(), data);
    }
}
