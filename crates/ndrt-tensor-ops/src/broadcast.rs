use ndrt_tensor::{Tensor, TensorError};

use crate::error::TensorOpsError;

/// Computes the shape two operands broadcast to.
///
/// Shapes are aligned on their trailing dimensions and the shorter one is
/// padded with ones. Two dimensions are compatible when they are equal or
/// one of them is 1.
///
/// # Errors
///
/// Returns a [`TensorError::Shape`] error ("incompatible shapes") when a pair
/// of dimensions differs and neither is 1.
///
/// # Example
///
/// ```
/// use ndrt_tensor_ops::broadcast::broadcast_shape;
///
/// assert_eq!(broadcast_shape(&[2, 1, 3], &[4, 1])?, vec![2, 4, 3]);
/// assert_eq!(broadcast_shape(&[], &[5])?, vec![5]);
/// assert!(broadcast_shape(&[2, 3], &[4]).is_err());
/// # Ok::<(), ndrt_tensor_ops::TensorOpsError>(())
/// ```
pub fn broadcast_shape(a: &[usize], b: &[usize]) -> Result<Vec<usize>, TensorOpsError> {
    let ndim = a.len().max(b.len());
    let mut out = vec![0; ndim];
    for i in 0..ndim {
        let da = if i < ndim - a.len() { 1 } else { a[i - (ndim - a.len())] };
        let db = if i < ndim - b.len() { 1 } else { b[i - (ndim - b.len())] };
        out[i] = match (da, db) {
            (x, y) if x == y => x,
            (1, y) => y,
            (x, 1) => x,
            _ => return Err(TensorError::incompatible_shapes(a, b).into()),
        };
    }
    Ok(out)
}

/// Computes the strides that read an operand of `shape` as if it had
/// `out_shape`.
///
/// Broadcast dimensions, padded or of size 1, get a stride of zero so the
/// operand is never expanded in memory.
pub fn broadcast_strides(
    shape: &[usize],
    strides: &[usize],
    out_shape: &[usize],
) -> Result<Vec<usize>, TensorOpsError> {
    if shape.len() > out_shape.len() {
        return Err(TensorError::incompatible_shapes(shape, out_shape).into());
    }
    let pad = out_shape.len() - shape.len();
    let mut out = vec![0; out_shape.len()];
    for (i, (&dim, &stride)) in shape.iter().zip(strides).enumerate() {
        let target = out_shape[pad + i];
        out[pad + i] = if dim == target {
            stride
        } else if dim == 1 {
            0
        } else {
            return Err(TensorError::incompatible_shapes(shape, out_shape).into());
        };
    }
    Ok(out)
}

/// Returns an error unless every tensor lives on the same device as the first.
pub fn check_same_device(tensors: &[&Tensor]) -> Result<(), TensorOpsError> {
    if let Some((first, rest)) = tensors.split_first() {
        for t in rest {
            if t.device() != first.device() {
                return Err(TensorError::DeviceMismatch {
                    expected: first.device(),
                    actual: t.device(),
                }
                .into());
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcast_rules() -> Result<(), TensorOpsError> {
        assert_eq!(broadcast_shape(&[3], &[3])?, vec![3]);
        assert_eq!(broadcast_shape(&[2, 3], &[3])?, vec![2, 3]);
        assert_eq!(broadcast_shape(&[2, 1], &[1, 3])?, vec![2, 3]);
        assert_eq!(broadcast_shape(&[0, 1], &[1, 3])?, vec![0, 3]);
        assert_eq!(broadcast_shape(&[], &[])?, Vec::<usize>::new());
        Ok(())
    }

    #[test]
    fn broadcast_is_commutative() -> Result<(), TensorOpsError> {
        let shapes: [&[usize]; 6] = [&[], &[1], &[3], &[2, 1], &[4, 2, 3], &[1, 1, 3]];
        for a in shapes {
            for b in shapes {
                assert_eq!(broadcast_shape(a, b).ok(), broadcast_shape(b, a).ok());
            }
        }
        Ok(())
    }

    #[test]
    fn broadcast_incompatible() {
        let err = broadcast_shape(&[2, 3], &[4]);
        match err {
            Err(TensorOpsError::TensorError(TensorError::Shape(msg))) => {
                assert!(msg.contains("incompatible shapes"))
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn broadcast_strides_zero_fill() -> Result<(), TensorOpsError> {
        assert_eq!(broadcast_strides(&[3], &[4], &[2, 3])?, vec![0, 4]);
        assert_eq!(broadcast_strides(&[2, 1], &[4, 4], &[2, 3])?, vec![4, 0]);
        assert!(broadcast_strides(&[2], &[4], &[3]).is_err());
        Ok(())
    }
}
