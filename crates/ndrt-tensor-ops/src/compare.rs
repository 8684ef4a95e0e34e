use ndrt_tensor::Tensor;

use crate::{
    elementwise::{abs, add_scalar, binary, binary_scalar, maximum, mul_scalar, sub, BinaryOp},
    error::TensorOpsError,
    reduce::min,
};

/// Element-wise `a == b` as 1.0 or 0.0.
pub fn equal(a: &Tensor, b: &Tensor) -> Result<Tensor, TensorOpsError> {
    binary(BinaryOp::Equal, a, b)
}

/// Element-wise `a != b` as 1.0 or 0.0.
pub fn not_equal(a: &Tensor, b: &Tensor) -> Result<Tensor, TensorOpsError> {
    binary(BinaryOp::NotEqual, a, b)
}

/// Element-wise `a > b` as 1.0 or 0.0.
pub fn greater(a: &Tensor, b: &Tensor) -> Result<Tensor, TensorOpsError> {
    binary(BinaryOp::Greater, a, b)
}

/// Element-wise `a >= b` as 1.0 or 0.0.
pub fn greater_equal(a: &Tensor, b: &Tensor) -> Result<Tensor, TensorOpsError> {
    binary(BinaryOp::GreaterEqual, a, b)
}

/// Element-wise `a < b` as 1.0 or 0.0.
pub fn less(a: &Tensor, b: &Tensor) -> Result<Tensor, TensorOpsError> {
    binary(BinaryOp::Less, a, b)
}

/// Element-wise `a <= b` as 1.0 or 0.0.
pub fn less_equal(a: &Tensor, b: &Tensor) -> Result<Tensor, TensorOpsError> {
    binary(BinaryOp::LessEqual, a, b)
}

/// Returns true if every element is non-zero. An empty tensor is true.
///
/// NaN counts as non-zero.
pub fn all(t: &Tensor) -> Result<bool, TensorOpsError> {
    if t.numel() == 0 {
        return Ok(true);
    }
    let nonzero = binary_scalar(BinaryOp::NotEqual, t, 0.0)?;
    Ok(min(&nonzero, None)?.as_scalar()? == 1.0)
}

/// Returns true if `|a - b| <= atol + rtol * |b|` for every broadcast pair.
///
/// Equal infinities compare close; any NaN does not.
///
/// # Example
///
/// ```
/// use ndrt_tensor::Tensor;
/// use ndrt_tensor_ops::all_close;
///
/// let a = Tensor::from_vec(&[2], vec![1.0, 2.0])?;
/// let b = Tensor::from_vec(&[2], vec![1.0, 2.000001])?;
/// assert!(all_close(&a, &b, 1e-5, 1e-8)?);
/// # Ok::<(), ndrt_tensor_ops::TensorOpsError>(())
/// ```
pub fn all_close(a: &Tensor, b: &Tensor, rtol: f32, atol: f32) -> Result<bool, TensorOpsError> {
    if rtol < 0.0 || atol < 0.0 {
        return Err(TensorOpsError::InvalidArgument(format!(
            "tolerances must be non-negative, got rtol={} atol={}",
            rtol, atol
        )));
    }
    let diff = abs(&sub(a, b)?)?;
    let tol = add_scalar(&mul_scalar(&abs(b)?, rtol)?, atol)?;
    let close = maximum(&less_equal(&diff, &tol)?, &equal(a, b)?)?;
    all(&close)
}

#[cfg(test)]
mod tests {
    use ndrt_tensor::Device;

    use super::*;

    #[test]
    fn comparisons() -> Result<(), TensorOpsError> {
        let a = Tensor::from_vec(&[3], vec![1.0, 2.0, 3.0])?;
        let b = Tensor::from_vec(&[3], vec![3.0, 2.0, 1.0])?;
        assert_eq!(equal(&a, &b)?.to_vec()?, vec![0.0, 1.0, 0.0]);
        assert_eq!(not_equal(&a, &b)?.to_vec()?, vec![1.0, 0.0, 1.0]);
        assert_eq!(greater(&a, &b)?.to_vec()?, vec![0.0, 0.0, 1.0]);
        assert_eq!(greater_equal(&a, &b)?.to_vec()?, vec![0.0, 1.0, 1.0]);
        assert_eq!(less(&a, &b)?.to_vec()?, vec![1.0, 0.0, 0.0]);
        assert_eq!(less_equal(&a, &b)?.to_vec()?, vec![1.0, 1.0, 0.0]);
        Ok(())
    }

    #[test]
    fn nan_is_never_equal() -> Result<(), TensorOpsError> {
        let a = Tensor::from_vec(&[1], vec![f32::NAN])?;
        assert_eq!(equal(&a, &a)?.to_vec()?, vec![0.0]);
        assert_eq!(not_equal(&a, &a)?.to_vec()?, vec![1.0]);
        assert!(!all_close(&a, &a, 1e-5, 1e-8)?);
        Ok(())
    }

    #[test]
    fn all_elements() -> Result<(), TensorOpsError> {
        assert!(all(&Tensor::ones(&[2, 2], Device::Cpu)?)?);
        assert!(!all(&Tensor::from_vec(&[3], vec![1.0, 0.0, 2.0])?)?);
        assert!(all(&Tensor::zeros(&[0], Device::Cpu)?)?);
        Ok(())
    }

    #[test]
    fn all_close_reflexive() -> Result<(), TensorOpsError> {
        let a = Tensor::from_vec(
            &[2, 3],
            vec![0.0, -1.5, 1e10, f32::INFINITY, f32::NEG_INFINITY, 3.25],
        )?;
        assert!(all_close(&a, &a, 0.0, 0.0)?);
        assert!(all_close(&a, &a.clone(), 1e-5, 1e-8)?);
        Ok(())
    }

    #[test]
    fn all_close_tolerances() -> Result<(), TensorOpsError> {
        let a = Tensor::from_vec(&[2], vec![100.0, 1.0])?;
        let b = Tensor::from_vec(&[2], vec![101.0, 1.0])?;
        assert!(!all_close(&a, &b, 0.0, 0.5)?);
        assert!(all_close(&a, &b, 0.01, 0.0)?);
        let row = Tensor::from_vec(&[1], vec![1.0])?;
        let ones = Tensor::ones(&[2, 2], Device::Cpu)?;
        assert!(all_close(&ones, &row, 0.0, 0.0)?);
        assert!(all_close(&a, &b, -1.0, 0.0).is_err());
        Ok(())
    }
}
