use std::sync::Arc;

use ndrt_tensor::{DType, Tensor};
use num_traits::{Float, FloatConst};

use crate::{
    broadcast::{broadcast_shape, broadcast_strides, check_same_device},
    error::TensorOpsError,
    kernels::kernels_for,
};

/// Single-operand elementwise operations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UnaryOp {
    /// `-x`
    Negative,
    /// `x`, used as a strided copy
    Positive,
    /// `1 / x`
    Reciprocal,
    /// `|x|`
    Abs,
    /// -1, 0 or 1 with the sign of `x`; NaN stays NaN
    Sign,
    /// Square root
    Sqrt,
    /// `x * x`
    Square,
    /// `e^x`
    Exp,
    /// `2^x`
    Exp2,
    /// `e^x - 1`
    Expm1,
    /// Natural logarithm
    Log,
    /// `ln(1 + x)`
    Log1p,
    /// Base 2 logarithm
    Log2,
    /// Base 10 logarithm
    Log10,
    /// Unbiased binary exponent, `floor(log2(|x|))`
    Logb,
    /// Sine
    Sin,
    /// Cosine
    Cos,
    /// Tangent
    Tan,
    /// Inverse sine
    Arcsin,
    /// Inverse cosine
    Arccos,
    /// Inverse tangent
    Arctan,
    /// Hyperbolic sine
    Sinh,
    /// Hyperbolic cosine
    Cosh,
    /// Hyperbolic tangent
    Tanh,
    /// Inverse hyperbolic sine
    Arcsinh,
    /// Inverse hyperbolic cosine
    Arccosh,
    /// Inverse hyperbolic tangent
    Arctanh,
    /// Normalized sinc, `sin(pi x) / (pi x)` and 1 at 0
    Sinc,
    /// Radians to degrees
    Degrees,
    /// Degrees to radians
    Radians,
    /// Round toward positive infinity
    Ceil,
    /// Round toward negative infinity
    Floor,
    /// Round half away from zero
    Round,
    /// Round half to even
    Rint,
    /// Round toward zero
    Trunc,
    /// Limit to `[min, max]`; NaN stays NaN
    Clip {
        /// Lower bound
        min: f32,
        /// Upper bound
        max: f32,
    },
}

impl UnaryOp {
    /// Applies the operation to one value.
    pub fn apply<T: Float + FloatConst>(self, x: T) -> T {
        match self {
            UnaryOp::Negative => -x,
            UnaryOp::Positive => x,
            UnaryOp::Reciprocal => x.recip(),
            UnaryOp::Abs => x.abs(),
            UnaryOp::Sign => {
                if x > T::zero() {
                    T::one()
                } else if x < T::zero() {
                    -T::one()
                } else {
                    x
                }
            }
            UnaryOp::Sqrt => x.sqrt(),
            UnaryOp::Square => x * x,
            UnaryOp::Exp => x.exp(),
            UnaryOp::Exp2 => x.exp2(),
            UnaryOp::Expm1 => x.exp_m1(),
            UnaryOp::Log => x.ln(),
            UnaryOp::Log1p => x.ln_1p(),
            UnaryOp::Log2 => x.log2(),
            UnaryOp::Log10 => x.log10(),
            UnaryOp::Logb => {
                if x.is_nan() || x.is_infinite() {
                    x.abs()
                } else if x == T::zero() {
                    T::neg_infinity()
                } else {
                    x.abs().log2().floor()
                }
            }
            UnaryOp::Sin => x.sin(),
            UnaryOp::Cos => x.cos(),
            UnaryOp::Tan => x.tan(),
            UnaryOp::Arcsin => x.asin(),
            UnaryOp::Arccos => x.acos(),
            UnaryOp::Arctan => x.atan(),
            UnaryOp::Sinh => x.sinh(),
            UnaryOp::Cosh => x.cosh(),
            UnaryOp::Tanh => x.tanh(),
            UnaryOp::Arcsinh => x.asinh(),
            UnaryOp::Arccosh => x.acosh(),
            UnaryOp::Arctanh => x.atanh(),
            UnaryOp::Sinc => {
                if x == T::zero() {
                    T::one()
                } else {
                    let px = T::PI() * x;
                    px.sin() / px
                }
            }
            UnaryOp::Degrees => x.to_degrees(),
            UnaryOp::Radians => x.to_radians(),
            UnaryOp::Ceil => x.ceil(),
            UnaryOp::Floor => x.floor(),
            UnaryOp::Round => x.round(),
            UnaryOp::Rint => {
                let two = T::one() + T::one();
                let half = T::one() / two;
                if (x - x.trunc()).abs() == half {
                    two * (x / two).round()
                } else {
                    x.round()
                }
            }
            UnaryOp::Trunc => x.trunc(),
            UnaryOp::Clip { min, max } => {
                let (lo, hi) = (T::from(min), T::from(max));
                match (lo, hi) {
                    (Some(lo), Some(hi)) if !x.is_nan() => {
                        if x < lo {
                            lo
                        } else if x > hi {
                            hi
                        } else {
                            x
                        }
                    }
                    _ => x,
                }
            }
        }
    }

    /// Returns the numeric code shared with device kernels.
    pub fn code(self) -> u32 {
        match self {
            UnaryOp::Negative => 0,
            UnaryOp::Positive => 1,
            UnaryOp::Reciprocal => 2,
            UnaryOp::Abs => 3,
            UnaryOp::Sign => 4,
            UnaryOp::Sqrt => 5,
            UnaryOp::Square => 6,
            UnaryOp::Exp => 7,
            UnaryOp::Exp2 => 8,
            UnaryOp::Expm1 => 9,
            UnaryOp::Log => 10,
            UnaryOp::Log1p => 11,
            UnaryOp::Log2 => 12,
            UnaryOp::Log10 => 13,
            UnaryOp::Logb => 14,
            UnaryOp::Sin => 15,
            UnaryOp::Cos => 16,
            UnaryOp::Tan => 17,
            UnaryOp::Arcsin => 18,
            UnaryOp::Arccos => 19,
            UnaryOp::Arctan => 20,
            UnaryOp::Sinh => 21,
            UnaryOp::Cosh => 22,
            UnaryOp::Tanh => 23,
            UnaryOp::Arcsinh => 24,
            UnaryOp::Arccosh => 25,
            UnaryOp::Arctanh => 26,
            UnaryOp::Sinc => 27,
            UnaryOp::Degrees => 28,
            UnaryOp::Radians => 29,
            UnaryOp::Ceil => 30,
            UnaryOp::Floor => 31,
            UnaryOp::Round => 32,
            UnaryOp::Rint => 33,
            UnaryOp::Trunc => 34,
            UnaryOp::Clip { .. } => 35,
        }
    }

    /// Returns the `(min, max)` parameters of parametrized operations.
    pub fn params(self) -> (f32, f32) {
        match self {
            UnaryOp::Clip { min, max } => (min, max),
            _ => (0.0, 0.0),
        }
    }
}

/// Two-operand elementwise operations.
///
/// Comparisons use exact IEEE-754 semantics and produce 1.0 or 0.0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    /// `a + b`
    Add,
    /// `a - b`
    Sub,
    /// `a * b`
    Mul,
    /// `a / b`
    Div,
    /// Floating point remainder with the sign of `a` (C `fmod`)
    Mod,
    /// `a^b`
    Pow,
    /// `a == b`
    Equal,
    /// `a != b`
    NotEqual,
    /// `a > b`
    Greater,
    /// `a >= b`
    GreaterEqual,
    /// `a < b`
    Less,
    /// `a <= b`
    LessEqual,
    /// Smaller operand; NaN propagates
    Minimum,
    /// Larger operand; NaN propagates
    Maximum,
}

impl BinaryOp {
    /// Applies the operation to one pair of values.
    pub fn apply<T: Float>(self, a: T, b: T) -> T {
        let flag = |c: bool| if c { T::one() } else { T::zero() };
        match self {
            BinaryOp::Add => a + b,
            BinaryOp::Sub => a - b,
            BinaryOp::Mul => a * b,
            BinaryOp::Div => a / b,
            BinaryOp::Mod => a % b,
            BinaryOp::Pow => a.powf(b),
            BinaryOp::Equal => flag(a == b),
            BinaryOp::NotEqual => flag(a != b),
            BinaryOp::Greater => flag(a > b),
            BinaryOp::GreaterEqual => flag(a >= b),
            BinaryOp::Less => flag(a < b),
            BinaryOp::LessEqual => flag(a <= b),
            BinaryOp::Minimum => {
                if a.is_nan() || b.is_nan() {
                    T::nan()
                } else {
                    a.min(b)
                }
            }
            BinaryOp::Maximum => {
                if a.is_nan() || b.is_nan() {
                    T::nan()
                } else {
                    a.max(b)
                }
            }
        }
    }

    /// Returns the numeric code shared with device kernels.
    pub fn code(self) -> u32 {
        match self {
            BinaryOp::Add => 0,
            BinaryOp::Sub => 1,
            BinaryOp::Mul => 2,
            BinaryOp::Div => 3,
            BinaryOp::Mod => 4,
            BinaryOp::Pow => 5,
            BinaryOp::Equal => 6,
            BinaryOp::NotEqual => 7,
            BinaryOp::Greater => 8,
            BinaryOp::GreaterEqual => 9,
            BinaryOp::Less => 10,
            BinaryOp::LessEqual => 11,
            BinaryOp::Minimum => 12,
            BinaryOp::Maximum => 13,
        }
    }
}

/// An elementwise operation of either arity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ElementwiseOp {
    /// One operand, output shaped like the input
    Unary(UnaryOp),
    /// Two operands, output shaped like their broadcast
    Binary(BinaryOp),
}

/// Applies `op` to every element of `a`.
///
/// The output is a new contiguous tensor on the device of `a`.
pub fn unary(op: UnaryOp, a: &Tensor) -> Result<Tensor, TensorOpsError> {
    let kernels = kernels_for(a.device())?;
    let mut out = Tensor::create_in(a.shape(), DType::Float32, Arc::clone(a.backend()))?;
    (kernels.unary)(op, a, &mut out)?;
    Ok(out)
}

/// Applies `op` to every pair of elements of `a` and `b` after broadcasting.
///
/// # Errors
///
/// - `DeviceMismatch` if the operands live on different devices
/// - `Shape` if the shapes do not broadcast
pub fn binary(op: BinaryOp, a: &Tensor, b: &Tensor) -> Result<Tensor, TensorOpsError> {
    check_same_device(&[a, b])?;
    let shape = broadcast_shape(a.shape(), b.shape())?;
    let a_strides = broadcast_strides(a.shape(), a.strides(), &shape)?;
    let b_strides = broadcast_strides(b.shape(), b.strides(), &shape)?;
    let kernels = kernels_for(a.device())?;
    let mut out = Tensor::create_in(&shape, DType::Float32, Arc::clone(a.backend()))?;
    (kernels.binary)(op, a, &a_strides, b, &b_strides, &mut out)?;
    Ok(out)
}

/// Dispatches an elementwise operation with an optional second operand.
///
/// # Errors
///
/// Returns [`TensorOpsError::InvalidArgument`] if the number of operands does
/// not match the arity of `op`.
pub fn elementwise(
    op: ElementwiseOp,
    a: &Tensor,
    b: Option<&Tensor>,
) -> Result<Tensor, TensorOpsError> {
    match (op, b) {
        (ElementwiseOp::Unary(op), None) => unary(op, a),
        (ElementwiseOp::Binary(op), Some(b)) => binary(op, a, b),
        (ElementwiseOp::Unary(op), Some(_)) => Err(TensorOpsError::InvalidArgument(format!(
            "{:?} takes one operand",
            op
        ))),
        (ElementwiseOp::Binary(op), None) => Err(TensorOpsError::InvalidArgument(format!(
            "{:?} takes two operands",
            op
        ))),
    }
}

/// Applies `op` between `a` and a scalar broadcast over it.
pub fn binary_scalar(op: BinaryOp, a: &Tensor, value: f32) -> Result<Tensor, TensorOpsError> {
    let b = Tensor::from_slice_in(&[], &[value], Arc::clone(a.backend()))?;
    binary(op, a, &b)
}

/// Copies the elements of `src` into `dst`, honoring both layouts.
///
/// `dst` is usually a strided view into a larger output.
pub fn copy_into(src: &Tensor, dst: &mut Tensor) -> Result<(), TensorOpsError> {
    check_same_device(&[src, &*dst])?;
    if src.shape() != dst.shape() {
        return Err(ndrt_tensor::TensorError::incompatible_shapes(dst.shape(), src.shape()).into());
    }
    let kernels = kernels_for(src.device())?;
    (kernels.unary)(UnaryOp::Positive, src, dst)
}

/// Limits every element to `[min, max]`.
pub fn clip(a: &Tensor, min: f32, max: f32) -> Result<Tensor, TensorOpsError> {
    if min > max {
        return Err(TensorOpsError::InvalidArgument(format!(
            "clip bounds are inverted: {} > {}",
            min, max
        )));
    }
    unary(UnaryOp::Clip { min, max }, a)
}

/// Element-wise addition.
pub fn add(a: &Tensor, b: &Tensor) -> Result<Tensor, TensorOpsError> {
    binary(BinaryOp::Add, a, b)
}

/// Element-wise subtraction.
pub fn sub(a: &Tensor, b: &Tensor) -> Result<Tensor, TensorOpsError> {
    binary(BinaryOp::Sub, a, b)
}

/// Element-wise multiplication.
pub fn mul(a: &Tensor, b: &Tensor) -> Result<Tensor, TensorOpsError> {
    binary(BinaryOp::Mul, a, b)
}

/// Element-wise division.
pub fn div(a: &Tensor, b: &Tensor) -> Result<Tensor, TensorOpsError> {
    binary(BinaryOp::Div, a, b)
}

/// Element-wise floating point remainder.
pub fn modulo(a: &Tensor, b: &Tensor) -> Result<Tensor, TensorOpsError> {
    binary(BinaryOp::Mod, a, b)
}

/// Element-wise power.
pub fn pow(a: &Tensor, b: &Tensor) -> Result<Tensor, TensorOpsError> {
    binary(BinaryOp::Pow, a, b)
}

/// Element-wise minimum.
pub fn minimum(a: &Tensor, b: &Tensor) -> Result<Tensor, TensorOpsError> {
    binary(BinaryOp::Minimum, a, b)
}

/// Element-wise maximum.
pub fn maximum(a: &Tensor, b: &Tensor) -> Result<Tensor, TensorOpsError> {
    binary(BinaryOp::Maximum, a, b)
}

/// Adds a scalar to every element.
pub fn add_scalar(a: &Tensor, value: f32) -> Result<Tensor, TensorOpsError> {
    binary_scalar(BinaryOp::Add, a, value)
}

/// Subtracts a scalar from every element.
pub fn sub_scalar(a: &Tensor, value: f32) -> Result<Tensor, TensorOpsError> {
    binary_scalar(BinaryOp::Sub, a, value)
}

/// Multiplies every element by a scalar.
pub fn mul_scalar(a: &Tensor, value: f32) -> Result<Tensor, TensorOpsError> {
    binary_scalar(BinaryOp::Mul, a, value)
}

/// Divides every element by a scalar.
pub fn div_scalar(a: &Tensor, value: f32) -> Result<Tensor, TensorOpsError> {
    binary_scalar(BinaryOp::Div, a, value)
}

/// Raises every element to a scalar power.
pub fn pow_scalar(a: &Tensor, value: f32) -> Result<Tensor, TensorOpsError> {
    binary_scalar(BinaryOp::Pow, a, value)
}

/// Element-wise negation.
pub fn negative(a: &Tensor) -> Result<Tensor, TensorOpsError> {
    unary(UnaryOp::Negative, a)
}

/// Element-wise absolute value.
pub fn abs(a: &Tensor) -> Result<Tensor, TensorOpsError> {
    unary(UnaryOp::Abs, a)
}

/// Element-wise square root.
pub fn sqrt(a: &Tensor) -> Result<Tensor, TensorOpsError> {
    unary(UnaryOp::Sqrt, a)
}

/// Element-wise exponential.
pub fn exp(a: &Tensor) -> Result<Tensor, TensorOpsError> {
    unary(UnaryOp::Exp, a)
}

/// Element-wise natural logarithm.
pub fn log(a: &Tensor) -> Result<Tensor, TensorOpsError> {
    unary(UnaryOp::Log, a)
}

#[cfg(test)]
mod tests {
    use ndrt_tensor::{Device, TensorError};

    use super::*;

    #[test]
    fn add_row_broadcast() -> Result<(), TensorOpsError> {
        let a = Tensor::from_vec(&[2, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0])?;
        let b = Tensor::from_vec(&[3], vec![10.0, 20.0, 30.0])?;
        let c = add(&a, &b)?;
        assert_eq!(c.shape(), &[2, 3]);
        assert_eq!(c.to_vec()?, vec![11.0, 22.0, 33.0, 14.0, 25.0, 36.0]);
        Ok(())
    }

    #[test]
    fn outer_broadcast() -> Result<(), TensorOpsError> {
        let col = Tensor::from_vec(&[2, 1], vec![1.0, 2.0])?;
        let row = Tensor::from_vec(&[1, 3], vec![1.0, 10.0, 100.0])?;
        let c = mul(&col, &row)?;
        assert_eq!(c.shape(), &[2, 3]);
        assert_eq!(c.to_vec()?, vec![1.0, 10.0, 100.0, 2.0, 20.0, 200.0]);
        Ok(())
    }

    #[test]
    fn strided_operands() -> Result<(), TensorOpsError> {
        let a = Tensor::from_vec(&[2, 2], vec![1.0, 2.0, 3.0, 4.0])?;
        let c = sub(&a.transpose(), &a)?;
        assert_eq!(c.to_vec()?, vec![0.0, 1.0, -1.0, 0.0]);
        Ok(())
    }

    #[test]
    fn sub_recovers_operand() -> Result<(), TensorOpsError> {
        let a = Tensor::from_vec(&[4], vec![0.5, -1.0, 3.25, 8.0])?;
        let b = Tensor::from_vec(&[4], vec![2.0, 0.125, -4.0, 1.0])?;
        let back = sub(&add(&a, &b)?, &b)?;
        assert_eq!(back.to_vec()?, a.to_vec()?);
        Ok(())
    }

    #[test]
    fn incompatible_shapes() -> Result<(), TensorOpsError> {
        let a = Tensor::zeros(&[2, 3], Device::Cpu)?;
        let b = Tensor::zeros(&[4], Device::Cpu)?;
        assert!(matches!(
            add(&a, &b),
            Err(TensorOpsError::TensorError(TensorError::Shape(_)))
        ));
        Ok(())
    }

    #[test]
    fn scalar_operands() -> Result<(), TensorOpsError> {
        let a = Tensor::from_vec(&[3], vec![1.0, 2.0, 3.0])?;
        assert_eq!(mul_scalar(&a, 2.0)?.to_vec()?, vec![2.0, 4.0, 6.0]);
        assert_eq!(pow_scalar(&a, 2.0)?.to_vec()?, vec![1.0, 4.0, 9.0]);
        let s = Tensor::scalar(1.0, Device::Cpu)?;
        let r = add(&s, &s)?;
        assert_eq!(r.ndim(), 0);
        assert_eq!(r.item()?, 2.0);
        Ok(())
    }

    #[test]
    fn modulo_follows_dividend_sign() -> Result<(), TensorOpsError> {
        let a = Tensor::from_vec(&[3], vec![7.0, -7.0, 5.5])?;
        let b = Tensor::from_vec(&[3], vec![3.0, 3.0, 2.0])?;
        assert_eq!(modulo(&a, &b)?.to_vec()?, vec![1.0, -1.0, 1.5]);
        Ok(())
    }

    #[test]
    fn unary_ops() -> Result<(), TensorOpsError> {
        let a = Tensor::from_vec(&[4], vec![-2.5, -0.5, 0.5, 2.5])?;
        assert_eq!(unary(UnaryOp::Rint, &a)?.to_vec()?, vec![-2.0, -0.0, 0.0, 2.0]);
        assert_eq!(unary(UnaryOp::Round, &a)?.to_vec()?, vec![-3.0, -1.0, 1.0, 3.0]);
        assert_eq!(unary(UnaryOp::Trunc, &a)?.to_vec()?, vec![-2.0, -0.0, 0.0, 2.0]);
        assert_eq!(unary(UnaryOp::Sign, &a)?.to_vec()?, vec![-1.0, -1.0, 1.0, 1.0]);
        assert_eq!(abs(&a)?.to_vec()?, vec![2.5, 0.5, 0.5, 2.5]);
        assert_eq!(clip(&a, -1.0, 1.0)?.to_vec()?, vec![-1.0, -0.5, 0.5, 1.0]);
        assert!(clip(&a, 1.0, -1.0).is_err());

        let z = Tensor::from_vec(&[3], vec![0.0, 1.0, 8.0])?;
        let sinc = unary(UnaryOp::Sinc, &z)?.to_vec()?;
        assert_eq!(sinc[0], 1.0);
        approx::assert_abs_diff_eq!(sinc[1], 0.0, epsilon = 1e-6);
        let logb = unary(UnaryOp::Logb, &z)?.to_vec()?;
        assert_eq!(logb, vec![f32::NEG_INFINITY, 0.0, 3.0]);
        Ok(())
    }

    #[test]
    fn nan_propagation() -> Result<(), TensorOpsError> {
        let a = Tensor::from_vec(&[2], vec![f32::NAN, 1.0])?;
        let b = Tensor::from_vec(&[2], vec![0.0, f32::NAN])?;
        assert!(maximum(&a, &b)?.to_vec()?.iter().all(|v| v.is_nan()));
        assert!(minimum(&a, &b)?.to_vec()?.iter().all(|v| v.is_nan()));
        assert!(unary(UnaryOp::Sign, &a)?.to_vec()?[0].is_nan());
        Ok(())
    }

    #[test]
    fn elementwise_arity() -> Result<(), TensorOpsError> {
        let a = Tensor::ones(&[2], Device::Cpu)?;
        let out = elementwise(ElementwiseOp::Binary(BinaryOp::Add), &a, Some(&a))?;
        assert_eq!(out.to_vec()?, vec![2.0, 2.0]);
        let out = elementwise(ElementwiseOp::Unary(UnaryOp::Negative), &a, None)?;
        assert_eq!(out.to_vec()?, vec![-1.0, -1.0]);
        assert!(matches!(
            elementwise(ElementwiseOp::Binary(BinaryOp::Add), &a, None),
            Err(TensorOpsError::InvalidArgument(_))
        ));
        Ok(())
    }

    #[test]
    fn empty_operands() -> Result<(), TensorOpsError> {
        let a = Tensor::zeros(&[0, 3], Device::Cpu)?;
        let b = Tensor::ones(&[3], Device::Cpu)?;
        let c = add(&a, &b)?;
        assert_eq!(c.shape(), &[0, 3]);
        assert!(c.to_vec()?.is_empty());
        Ok(())
    }

    #[test]
    fn copy_into_view() -> Result<(), TensorOpsError> {
        let out = Tensor::zeros(&[2, 2], Device::Cpu)?;
        let mut col = out.view(4, &[2], &[8])?;
        let src = Tensor::from_vec(&[2], vec![7.0, 8.0])?;
        copy_into(&src, &mut col)?;
        assert_eq!(out.to_vec()?, vec![0.0, 7.0, 0.0, 8.0]);
        Ok(())
    }
}
