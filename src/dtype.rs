// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! Element type helpers.
//!
//! Buffers and tensors in this crate are generic over `T: candle_core::WithDType`,
//! which ties each Rust element type to a runtime [`DType`]. The helpers here
//! cover the runtime side: sizes, readable names, checked byte arithmetic.

use crate::error::{BatchError, Result};
use candle_core::{DType, WithDType};

/// Get the size in bytes for a single element of the given dtype.
///
/// ## Example
///
/// ```rust
/// use rust_ai_batch::bytes_per_element;
/// use candle_core::DType;
///
/// assert_eq!(bytes_per_element(DType::F32), 4);
/// assert_eq!(bytes_per_element(DType::BF16), 2);
/// ```
#[must_use]
pub fn bytes_per_element(dtype: DType) -> usize {
    dtype.size_in_bytes()
}

/// Byte size of `count` elements of `T`, failing on overflow.
///
/// # Errors
///
/// Returns `BatchError::OutOfMemory` if the size does not fit in `usize`.
pub fn byte_size_of<T: WithDType>(count: usize) -> Result<usize> {
    count
        .checked_mul(bytes_per_element(T::DTYPE))
        .ok_or_else(|| {
            BatchError::oom(format!(
                "{count} elements of {} overflow the address space",
                T::DTYPE.name()
            ))
        })
}

/// Extension trait adding utility methods to `candle_core::DType`.
pub trait DTypeExt {
    /// Get a human-readable name for this dtype.
    ///
    /// Error messages and logs read better with "f32" than "`DType::F32`".
    fn name(&self) -> &'static str;
}

impl DTypeExt for DType {
    fn name(&self) -> &'static str {
        match self {
            DType::U8 => "u8",
            DType::U32 => "u32",
            DType::I64 => "i64",
            DType::BF16 => "bf16",
            DType::F16 => "f16",
            DType::F32 => "f32",
            DType::F64 => "f64",
            _ => "exotic",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytes_per_element() {
        assert_eq!(bytes_per_element(DType::F32), 4);
        assert_eq!(bytes_per_element(DType::F16), 2);
        assert_eq!(bytes_per_element(DType::F64), 8);
        assert_eq!(bytes_per_element(DType::U8), 1);
        assert_eq!(bytes_per_element(DType::I64), 8);
    }

    #[test]
    fn test_byte_size_of() {
        assert_eq!(byte_size_of::<f32>(12).unwrap(), 48);
        assert_eq!(byte_size_of::<u8>(0).unwrap(), 0);
        assert!(matches!(
            byte_size_of::<f64>(usize::MAX),
            Err(BatchError::OutOfMemory { .. })
        ));
    }

    #[test]
    fn test_dtype_ext() {
        assert_eq!(DType::F32.name(), "f32");
        assert_eq!(DType::BF16.name(), "bf16");
        assert_eq!(DType::I64.name(), "i64");
    }
}
