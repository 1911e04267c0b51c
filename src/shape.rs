// SPDX-License-Identifier: MIT
// Copyright 2026 Tyler Zervas

//! Shape derivation helpers.
//!
//! Each request of a batch declares its own shape for an input. The combined
//! batch shape keeps the trailing dimensions (which every request must agree
//! on) and sums the leading dimension across requests. A rank-0 shape is a
//! scalar and holds one element.

use crate::dtype::DTypeExt;
use crate::error::{BatchError, Result};
use crate::host::InputMetadata;
use candle_core::DType;

/// Number of elements described by `shape`.
///
/// ```rust
/// use rust_ai_batch::element_count;
///
/// assert_eq!(element_count(&[3, 4]), 12);
/// assert_eq!(element_count(&[]), 1);
/// ```
#[must_use]
pub fn element_count(shape: &[usize]) -> usize {
    shape.iter().product()
}

/// Convert host-reported signed dimensions into concrete sizes.
///
/// # Errors
///
/// Returns `BatchError::InvalidShape` if any dimension is negative.
pub fn narrow_dims(dims: &[i64]) -> Result<Vec<usize>> {
    dims.iter()
        .map(|&d| {
            usize::try_from(d).map_err(|_| {
                BatchError::invalid_shape(dims, format!("dimension {d} is not a concrete size"))
            })
        })
        .collect()
}

/// Combine per-request input declarations into one batch shape.
///
/// `declarations` yields, per request in batch order, the metadata of the
/// input or `None` if the request does not carry it. Every declaration must
/// use `expected` as its element type. An empty iterator yields an empty shape.
///
/// # Errors
///
/// - `BatchError::MissingInput` if a request lacks the input
/// - `BatchError::DTypeMismatch` if a declared type differs from `expected`
/// - `BatchError::InvalidShape` for negative dims or unbatchable scalars
/// - `BatchError::ShapeMismatch` if ranks or trailing dims disagree
pub fn combine_input_shapes<I>(name: &str, expected: DType, declarations: I) -> Result<Vec<usize>>
where
    I: IntoIterator<Item = Option<InputMetadata>>,
{
    let mut combined: Option<Vec<usize>> = None;
    for (index, declaration) in declarations.into_iter().enumerate() {
        let metadata = declaration.ok_or_else(|| BatchError::missing_input(name, index))?;
        if metadata.dtype != expected {
            return Err(BatchError::dtype_mismatch(expected.name(), metadata.dtype.name()));
        }
        let shape = narrow_dims(&metadata.shape)?;

        combined = Some(match combined {
            None => shape,
            Some(mut acc) => {
                if acc.is_empty() || shape.is_empty() {
                    return Err(BatchError::invalid_shape(
                        metadata.shape,
                        format!("scalar input '{name}' cannot be batched across requests"),
                    ));
                }
                if acc.len() != shape.len() || acc[1..] != shape[1..] {
                    let mut expected_shape = acc.clone();
                    expected_shape[0] = shape[0];
                    return Err(BatchError::shape_mismatch(expected_shape, shape));
                }
                acc[0] += shape[0];
                acc
            }
        });
    }
    Ok(combined.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn f32_input(shape: &[i64]) -> Option<InputMetadata> {
        Some(InputMetadata::new(DType::F32, shape))
    }

    #[test]
    fn test_element_count() {
        assert_eq!(element_count(&[8]), 8);
        assert_eq!(element_count(&[2, 0, 5]), 0);
        assert_eq!(element_count(&[]), 1);
    }

    #[test]
    fn test_narrow_dims() {
        assert_eq!(narrow_dims(&[3, 4]).unwrap(), vec![3, 4]);
        assert!(matches!(
            narrow_dims(&[3, -1]),
            Err(BatchError::InvalidShape { .. })
        ));
    }

    #[test]
    fn test_combine_sums_leading_dimension() {
        let shapes = vec![f32_input(&[1, 4]), f32_input(&[1, 4]), f32_input(&[2, 4])];
        assert_eq!(combine_input_shapes("x", DType::F32, shapes).unwrap(), vec![4, 4]);
    }

    #[test]
    fn test_combine_single_request_keeps_shape() {
        let shapes = vec![f32_input(&[])];
        assert_eq!(combine_input_shapes("x", DType::F32, shapes).unwrap(), Vec::<usize>::new());
    }

    #[test]
    fn test_combine_empty_batch() {
        let shape = combine_input_shapes("x", DType::F32, Vec::<Option<InputMetadata>>::new()).unwrap();
        assert!(shape.is_empty());
    }

    #[test]
    fn test_combine_missing_input_names_request() {
        let shapes = vec![f32_input(&[1, 4]), None];
        let err = combine_input_shapes("x", DType::F32, shapes).unwrap_err();
        assert!(matches!(err, BatchError::MissingInput { request: 1, .. }));
    }

    #[test]
    fn test_combine_rejects_trailing_mismatch() {
        let shapes = vec![f32_input(&[1, 4]), f32_input(&[1, 5])];
        let err = combine_input_shapes("x", DType::F32, shapes).unwrap_err();
        match err {
            BatchError::ShapeMismatch { expected, actual } => {
                assert_eq!(expected, vec![1, 4]);
                assert_eq!(actual, vec![1, 5]);
            }
            other => panic!("unexpected error: {other}"),
        }

        let shapes = vec![f32_input(&[1, 4]), f32_input(&[1, 4, 1])];
        assert!(combine_input_shapes("x", DType::F32, shapes).is_err());
    }

    #[test]
    fn test_combine_rejects_dtype_mismatch() {
        let shapes = vec![f32_input(&[1, 4]), Some(InputMetadata::new(DType::I64, [1, 4]))];
        let err = combine_input_shapes("x", DType::F32, shapes).unwrap_err();
        assert!(matches!(
            err,
            BatchError::DTypeMismatch {
                expected: "f32",
                actual: "i64"
            }
        ));
    }

    #[test]
    fn test_combine_rejects_batched_scalars() {
        let shapes = vec![f32_input(&[]), f32_input(&[])];
        assert!(matches!(
            combine_input_shapes("x", DType::F32, shapes),
            Err(BatchError::InvalidShape { .. })
        ));
    }
}
