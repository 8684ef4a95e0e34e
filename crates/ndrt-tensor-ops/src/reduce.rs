use std::sync::Arc;

use ndrt_tensor::{layout, DType, Tensor};

use crate::{
    elementwise::{binary, mul, BinaryOp},
    error::TensorOpsError,
    kernels::kernels_for,
};

/// Reduction operations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReduceOp {
    /// Sum of the lane; 0 when empty
    Sum,
    /// Product of the lane; 1 when empty
    Prod,
    /// Smallest value; NaN propagates
    Min,
    /// Largest value; NaN propagates
    Max,
    /// Arithmetic mean
    Mean,
    /// Population variance
    Var,
    /// Population standard deviation
    Std,
    /// Position of the smallest value within the lane
    ArgMin,
    /// Position of the largest value within the lane
    ArgMax,
    /// Linearly interpolated quantile, `q` in `[0, 1]`
    Quantile(f32),
}

impl ReduceOp {
    /// Returns the lowercase name used in messages.
    pub fn name(self) -> &'static str {
        match self {
            ReduceOp::Sum => "sum",
            ReduceOp::Prod => "prod",
            ReduceOp::Min => "min",
            ReduceOp::Max => "max",
            ReduceOp::Mean => "mean",
            ReduceOp::Var => "var",
            ReduceOp::Std => "std",
            ReduceOp::ArgMin => "argmin",
            ReduceOp::ArgMax => "argmax",
            ReduceOp::Quantile(_) => "quantile",
        }
    }

    /// Returns true if an empty lane has a defined result.
    pub fn accepts_empty(self) -> bool {
        matches!(
            self,
            ReduceOp::Sum | ReduceOp::Prod | ReduceOp::Mean | ReduceOp::Var | ReduceOp::Std
        )
    }

    /// Returns true if the lane has to be materialized and sorted.
    pub fn needs_sort(self) -> bool {
        matches!(self, ReduceOp::Quantile(_))
    }

    /// Returns the numeric code shared with device kernels.
    pub fn code(self) -> u32 {
        match self {
            ReduceOp::Sum => 0,
            ReduceOp::Prod => 1,
            ReduceOp::Min => 2,
            ReduceOp::Max => 3,
            ReduceOp::Mean => 4,
            ReduceOp::Var => 5,
            ReduceOp::Std => 6,
            ReduceOp::ArgMin => 7,
            ReduceOp::ArgMax => 8,
            ReduceOp::Quantile(_) => 9,
        }
    }
}

/// Splits a tensor into outer positions and reduction lanes.
///
/// Every outer position maps to one output element. The lane of that
/// position is traversed with `lane_shape`/`lane_strides` starting at the
/// outer offset. A full reduction has an empty outer shape and the whole
/// tensor as its lane, so it folds in row-major order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReducePlan {
    /// Reduced axis, `None` for a full reduction.
    pub axis: Option<usize>,
    /// Shape of the output before `keepdims` is applied.
    pub outer_shape: Vec<usize>,
    /// Input byte strides of the outer dimensions.
    pub outer_strides: Vec<usize>,
    /// Shape of one lane.
    pub lane_shape: Vec<usize>,
    /// Input byte strides of the lane dimensions.
    pub lane_strides: Vec<usize>,
}

impl ReducePlan {
    /// Builds the plan reducing `t` over `axis`, or over everything.
    ///
    /// # Errors
    ///
    /// Returns [`TensorOpsError::DimOutOfBounds`] if `axis >= t.ndim()`.
    pub fn new(t: &Tensor, axis: Option<usize>) -> Result<Self, TensorOpsError> {
        match axis {
            None => Ok(Self {
                axis,
                outer_shape: vec![],
                outer_strides: vec![],
                lane_shape: t.shape().to_vec(),
                lane_strides: t.strides().to_vec(),
            }),
            Some(axis) if axis >= t.ndim() => Err(TensorOpsError::DimOutOfBounds(axis, t.ndim())),
            Some(axis) => {
                let mut outer_shape = t.shape().to_vec();
                let mut outer_strides = t.strides().to_vec();
                let lane_shape = vec![outer_shape.remove(axis)];
                let lane_strides = vec![outer_strides.remove(axis)];
                Ok(Self {
                    axis: Some(axis),
                    outer_shape,
                    outer_strides,
                    lane_shape,
                    lane_strides,
                })
            }
        }
    }

    /// Number of output elements.
    pub fn outer_len(&self) -> usize {
        layout::numel(&self.outer_shape)
    }

    /// Number of elements in each lane.
    pub fn lane_len(&self) -> usize {
        layout::numel(&self.lane_shape)
    }
}

/// Folds one lane of values into a single result.
///
/// The lane may be reordered by sorting operations.
pub(crate) fn reduce_lane(op: ReduceOp, lane: &mut [f32]) -> f32 {
    let n = lane.len();
    match op {
        ReduceOp::Sum => lane.iter().fold(0.0, |acc, &x| acc + x),
        ReduceOp::Prod => lane.iter().fold(1.0, |acc, &x| acc * x),
        ReduceOp::Min => fold_extreme(lane, |x, best| x < best).1,
        ReduceOp::Max => fold_extreme(lane, |x, best| x > best).1,
        ReduceOp::ArgMin => fold_extreme(lane, |x, best| x < best).0 as f32,
        ReduceOp::ArgMax => fold_extreme(lane, |x, best| x > best).0 as f32,
        ReduceOp::Mean => lane.iter().fold(0.0, |acc, &x| acc + x) / n as f32,
        ReduceOp::Var => variance_of(lane),
        ReduceOp::Std => variance_of(lane).sqrt(),
        ReduceOp::Quantile(q) => quantile_of(lane, q),
    }
}

// (index, value) of the first element preferred by `better`; the first NaN wins
fn fold_extreme(lane: &[f32], better: impl Fn(f32, f32) -> bool) -> (usize, f32) {
    let mut best = (0, f32::NAN);
    for (i, &x) in lane.iter().enumerate() {
        if x.is_nan() {
            return (i, x);
        }
        if i == 0 || better(x, best.1) {
            best = (i, x);
        }
    }
    best
}

fn variance_of(lane: &[f32]) -> f32 {
    let n = lane.len() as f32;
    let mean = lane.iter().fold(0.0, |acc, &x| acc + x) / n;
    lane.iter().fold(0.0, |acc, &x| acc + (x - mean) * (x - mean)) / n
}

fn quantile_of(lane: &mut [f32], q: f32) -> f32 {
    if lane.iter().any(|x| x.is_nan()) {
        return f32::NAN;
    }
    lane.sort_by(|a, b| a.total_cmp(b));
    let pos = q * (lane.len() - 1) as f32;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f32;
    lane[lo] + (lane[hi] - lane[lo]) * frac
}

/// The result of a reduction.
#[derive(Debug, Clone)]
pub enum Reduction {
    /// Result of a reduction over every element.
    Scalar(f32),
    /// Result of a reduction over one axis, or any reduction with `keepdims`.
    Tensor(Tensor),
}

impl Reduction {
    /// Returns the scalar value, reading the single element of a tensor
    /// result if needed.
    pub fn as_scalar(&self) -> Result<f32, TensorOpsError> {
        match self {
            Reduction::Scalar(v) => Ok(*v),
            Reduction::Tensor(t) => Ok(t.item()?),
        }
    }

    /// Converts the result into a tensor on `device`.
    pub fn into_tensor(self, device: ndrt_tensor::Device) -> Result<Tensor, TensorOpsError> {
        match self {
            Reduction::Scalar(v) => Ok(Tensor::scalar(v, device)?),
            Reduction::Tensor(t) => Ok(t),
        }
    }
}

/// Reduces `t` with `op` over `axis`, or over every element.
///
/// A full reduction without `keepdims` returns [`Reduction::Scalar`]. An
/// axis reduction drops that axis, or keeps it with size 1 when `keepdims`.
///
/// # Errors
///
/// - [`TensorOpsError::DimOutOfBounds`] if `axis` is not a dimension of `t`
/// - [`TensorOpsError::InvalidArgument`] if a quantile is outside `[0, 1]`
/// - [`TensorOpsError::EmptyReduction`] if a lane is empty and `op` has no
///   identity
pub fn reduce(
    op: ReduceOp,
    t: &Tensor,
    axis: Option<usize>,
    keepdims: bool,
) -> Result<Reduction, TensorOpsError> {
    if let ReduceOp::Quantile(q) = op {
        if !(0.0..=1.0).contains(&q) {
            return Err(TensorOpsError::InvalidArgument(format!(
                "quantile must be in [0, 1], got {}",
                q
            )));
        }
    }
    let plan = ReducePlan::new(t, axis)?;
    if plan.lane_len() == 0 && plan.outer_len() > 0 && !op.accepts_empty() {
        return Err(TensorOpsError::EmptyReduction(op.name()));
    }

    let kernels = kernels_for(t.device())?;
    let mut out = Tensor::create_in(&plan.outer_shape, DType::Float32, Arc::clone(t.backend()))?;
    (kernels.reduce)(op, t, &plan, &mut out)?;
    log::trace!(
        "{} over {:?} of {:?} on {}",
        op.name(),
        axis,
        t.shape(),
        t.device()
    );

    match (axis, keepdims) {
        (None, false) => Ok(Reduction::Scalar(out.item()?)),
        (None, true) => Ok(Reduction::Tensor(out.reshape(&vec![1; t.ndim()])?)),
        (Some(_), false) => Ok(Reduction::Tensor(out)),
        (Some(axis), true) => {
            let mut shape = t.shape().to_vec();
            shape[axis] = 1;
            Ok(Reduction::Tensor(out.reshape(&shape)?))
        }
    }
}

macro_rules! reduction {
    ($(#[$doc:meta])* $name:ident, $op:expr) => {
        $(#[$doc])*
        pub fn $name(t: &Tensor, axis: Option<usize>) -> Result<Reduction, TensorOpsError> {
            reduce($op, t, axis, false)
        }
    };
}

reduction!(
    /// Sum of the elements.
    sum,
    ReduceOp::Sum
);
reduction!(
    /// Product of the elements.
    prod,
    ReduceOp::Prod
);
reduction!(
    /// Smallest element.
    min,
    ReduceOp::Min
);
reduction!(
    /// Largest element.
    max,
    ReduceOp::Max
);
reduction!(
    /// Arithmetic mean.
    mean,
    ReduceOp::Mean
);
reduction!(
    /// Population variance.
    variance,
    ReduceOp::Var
);
reduction!(
    /// Population standard deviation.
    std,
    ReduceOp::Std
);
reduction!(
    /// Row-major position of the smallest element, or its position along `axis`.
    argmin,
    ReduceOp::ArgMin
);
reduction!(
    /// Row-major position of the largest element, or its position along `axis`.
    argmax,
    ReduceOp::ArgMax
);
reduction!(
    /// Median, the 0.5 quantile.
    median,
    ReduceOp::Quantile(0.5)
);

/// Linearly interpolated `q`-quantile.
pub fn quantile(t: &Tensor, q: f32, axis: Option<usize>) -> Result<Reduction, TensorOpsError> {
    reduce(ReduceOp::Quantile(q), t, axis, false)
}

/// Weighted mean of every element.
///
/// Without weights this is [`mean`]. Weights must have the shape of `t`, or
/// broadcast to it, and must not sum to zero.
pub fn average(t: &Tensor, weights: Option<&Tensor>) -> Result<f32, TensorOpsError> {
    let Some(weights) = weights else {
        return mean(t, None)?.as_scalar();
    };
    let shape = crate::broadcast::broadcast_shape(t.shape(), weights.shape())?;
    if shape != t.shape() {
        return Err(ndrt_tensor::TensorError::incompatible_shapes(t.shape(), weights.shape()).into());
    }
    let zeros = Tensor::create_in(t.shape(), DType::Float32, Arc::clone(t.backend()))?;
    let full_weights = binary(BinaryOp::Add, &zeros, weights)?;
    let total = sum(&full_weights, None)?.as_scalar()?;
    if total == 0.0 {
        return Err(TensorOpsError::InvalidArgument(
            "weights sum to zero".to_string(),
        ));
    }
    let weighted = sum(&mul(t, &full_weights)?, None)?.as_scalar()?;
    Ok(weighted / total)
}

#[cfg(test)]
mod tests {
    use ndrt_tensor::Device;

    use super::*;

    fn sample() -> Result<Tensor, TensorOpsError> {
        Ok(Tensor::from_vec(
            &[2, 3],
            vec![1.0, 5.0, 2.0, 7.0, 3.0, 3.0],
        )?)
    }

    #[test]
    fn sum_of_filled_zeros() -> Result<(), TensorOpsError> {
        let mut t = Tensor::zeros(&[2, 3], Device::Cpu)?;
        t.fill(1.0)?;
        assert_eq!(sum(&t, None)?.as_scalar()?, 6.0);
        Ok(())
    }

    #[test]
    fn axis_reductions() -> Result<(), TensorOpsError> {
        let t = sample()?;
        let Reduction::Tensor(cols) = sum(&t, Some(0))? else {
            panic!("expected a tensor");
        };
        assert_eq!(cols.shape(), &[3]);
        assert_eq!(cols.to_vec()?, vec![8.0, 8.0, 5.0]);

        let Reduction::Tensor(rows) = reduce(ReduceOp::Max, &t, Some(1), true)? else {
            panic!("expected a tensor");
        };
        assert_eq!(rows.shape(), &[2, 1]);
        assert_eq!(rows.to_vec()?, vec![5.0, 7.0]);
        Ok(())
    }

    #[test]
    fn full_reduction_keepdims() -> Result<(), TensorOpsError> {
        let t = sample()?;
        let Reduction::Tensor(r) = reduce(ReduceOp::Prod, &t, None, true)? else {
            panic!("expected a tensor");
        };
        assert_eq!(r.shape(), &[1, 1]);
        assert_eq!(r.item()?, 630.0);
        Ok(())
    }

    #[test]
    fn arg_reductions() -> Result<(), TensorOpsError> {
        let t = Tensor::from_vec(&[6], vec![3.0, 1.0, 4.0, 1.0, 5.0, 9.0])?;
        assert_eq!(argmax(&t, None)?.as_scalar()?, 5.0);
        assert_eq!(argmin(&t, None)?.as_scalar()?, 1.0);

        let t = sample()?;
        let Reduction::Tensor(idx) = argmax(&t, Some(1))? else {
            panic!("expected a tensor");
        };
        assert_eq!(idx.to_vec()?, vec![1.0, 0.0]);
        let Reduction::Tensor(idx) = argmin(&t, Some(1))? else {
            panic!("expected a tensor");
        };
        // ties resolve to the earliest position
        assert_eq!(idx.to_vec()?, vec![0.0, 1.0]);
        Ok(())
    }

    #[test]
    fn strided_input() -> Result<(), TensorOpsError> {
        let t = sample()?.transpose();
        let Reduction::Tensor(r) = sum(&t, Some(1))? else {
            panic!("expected a tensor");
        };
        assert_eq!(r.to_vec()?, vec![8.0, 8.0, 5.0]);
        assert_eq!(argmax(&t, None)?.as_scalar()?, 1.0);
        Ok(())
    }

    #[test]
    fn statistics() -> Result<(), TensorOpsError> {
        let t = Tensor::from_vec(&[4], vec![2.0, 4.0, 4.0, 6.0])?;
        assert_eq!(mean(&t, None)?.as_scalar()?, 4.0);
        assert_eq!(variance(&t, None)?.as_scalar()?, 2.0);
        approx::assert_relative_eq!(std(&t, None)?.as_scalar()?, 2.0f32.sqrt());
        assert_eq!(median(&t, None)?.as_scalar()?, 4.0);
        assert_eq!(quantile(&t, 0.0, None)?.as_scalar()?, 2.0);
        assert_eq!(quantile(&t, 1.0, None)?.as_scalar()?, 6.0);
        assert_eq!(quantile(&t, 0.25, None)?.as_scalar()?, 3.5);
        Ok(())
    }

    #[test]
    fn median_per_axis() -> Result<(), TensorOpsError> {
        let t = sample()?;
        let Reduction::Tensor(r) = median(&t, Some(1))? else {
            panic!("expected a tensor");
        };
        assert_eq!(r.to_vec()?, vec![2.0, 3.0]);
        // the input is left untouched by the sort
        assert_eq!(t.to_vec()?, vec![1.0, 5.0, 2.0, 7.0, 3.0, 3.0]);
        Ok(())
    }

    #[test]
    fn nan_propagates() -> Result<(), TensorOpsError> {
        let t = Tensor::from_vec(&[3], vec![1.0, f32::NAN, 3.0])?;
        assert!(max(&t, None)?.as_scalar()?.is_nan());
        assert!(min(&t, None)?.as_scalar()?.is_nan());
        assert!(median(&t, None)?.as_scalar()?.is_nan());
        assert_eq!(argmax(&t, None)?.as_scalar()?, 1.0);
        Ok(())
    }

    #[test]
    fn empty_inputs() -> Result<(), TensorOpsError> {
        let t = Tensor::zeros(&[0], Device::Cpu)?;
        assert_eq!(sum(&t, None)?.as_scalar()?, 0.0);
        assert_eq!(prod(&t, None)?.as_scalar()?, 1.0);
        assert!(mean(&t, None)?.as_scalar()?.is_nan());
        assert_eq!(max(&t, None).err(), Some(TensorOpsError::EmptyReduction("max")));

        let t = Tensor::zeros(&[0, 3], Device::Cpu)?;
        let Reduction::Tensor(r) = max(&t, Some(1))? else {
            panic!("expected a tensor");
        };
        assert_eq!(r.shape(), &[0]);
        assert_eq!(
            max(&t, Some(0)).err(),
            Some(TensorOpsError::EmptyReduction("max"))
        );
        Ok(())
    }

    #[test]
    fn invalid_arguments() -> Result<(), TensorOpsError> {
        let t = sample()?;
        assert_eq!(
            sum(&t, Some(2)).err(),
            Some(TensorOpsError::DimOutOfBounds(2, 2))
        );
        assert!(matches!(
            quantile(&t, 1.5, None),
            Err(TensorOpsError::InvalidArgument(_))
        ));
        Ok(())
    }

    #[test]
    fn weighted_average() -> Result<(), TensorOpsError> {
        let t = Tensor::from_vec(&[4], vec![1.0, 2.0, 3.0, 4.0])?;
        assert_eq!(average(&t, None)?, 2.5);
        let w = Tensor::from_vec(&[4], vec![4.0, 3.0, 2.0, 1.0])?;
        assert_eq!(average(&t, Some(&w))?, 2.0);
        let zero = Tensor::zeros(&[4], Device::Cpu)?;
        assert!(matches!(
            average(&t, Some(&zero)),
            Err(TensorOpsError::InvalidArgument(_))
        ));
        Ok(())
    }
}
