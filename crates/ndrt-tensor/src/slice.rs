//! Basic indexing: strided sub-views selected per axis.

use std::ops::{Range, RangeFrom, RangeFull, RangeTo};

use crate::{error::TensorError, tensor::Tensor};

/// Selection applied to one axis by [`Tensor::slice`].
///
/// Negative positions count from the end of the axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SliceArg {
    /// Selects one position and drops the axis.
    Index(i64),
    /// Selects `start..stop` every `step` positions and keeps the axis.
    ///
    /// Bounds are clamped to the axis, `None` means the axis edge.
    Range {
        /// First position, inclusive.
        start: Option<i64>,
        /// Last position, exclusive.
        stop: Option<i64>,
        /// Distance between selected positions, at least 1.
        step: usize,
    },
}

impl SliceArg {
    /// Selects the whole axis.
    pub const FULL: SliceArg = SliceArg::Range {
        start: None,
        stop: None,
        step: 1,
    };

    /// Selects `start..stop` with a step.
    pub fn stepped(start: i64, stop: i64, step: usize) -> Self {
        SliceArg::Range {
            start: Some(start),
            stop: Some(stop),
            step,
        }
    }
}

impl From<i64> for SliceArg {
    fn from(index: i64) -> Self {
        SliceArg::Index(index)
    }
}

impl From<Range<i64>> for SliceArg {
    fn from(r: Range<i64>) -> Self {
        SliceArg::stepped(r.start, r.end, 1)
    }
}

impl From<RangeFrom<i64>> for SliceArg {
    fn from(r: RangeFrom<i64>) -> Self {
        SliceArg::Range {
            start: Some(r.start),
            stop: None,
            step: 1,
        }
    }
}

impl From<RangeTo<i64>> for SliceArg {
    fn from(r: RangeTo<i64>) -> Self {
        SliceArg::Range {
            start: None,
            stop: Some(r.end),
            step: 1,
        }
    }
}

impl From<RangeFull> for SliceArg {
    fn from(_: RangeFull) -> Self {
        SliceArg::FULL
    }
}

fn clamp_position(pos: i64, dim: usize) -> usize {
    let dim = dim as i64;
    let pos = if pos < 0 { pos + dim } else { pos };
    pos.clamp(0, dim) as usize
}

impl Tensor {
    /// Selects a strided sub-view, one [`SliceArg`] per leading axis.
    ///
    /// Axes without an argument are kept whole. The result aliases this
    /// tensor's buffer; selecting a single element yields a 0-d view.
    ///
    /// # Errors
    ///
    /// - [`TensorError::Shape`] if there are more arguments than dimensions
    /// - [`TensorError::IndexOutOfBounds`] if an index is outside its axis
    /// - [`TensorError::InvalidArgument`] if a step is zero
    ///
    /// # Example
    ///
    /// ```
    /// use ndrt_tensor::{slice::SliceArg, Tensor};
    ///
    /// let t = Tensor::from_vec(&[3, 4], (0..12).map(|v| v as f32).collect())?;
    /// // rows 1.., every other column
    /// let s = t.slice(&[(1..).into(), SliceArg::stepped(0, 4, 2)])?;
    /// assert_eq!(s.shape(), &[2, 2]);
    /// assert_eq!(s.to_vec()?, vec![4.0, 6.0, 8.0, 10.0]);
    ///
    /// let row = t.slice(&[SliceArg::Index(-1)])?;
    /// assert_eq!(row.to_vec()?, vec![8.0, 9.0, 10.0, 11.0]);
    /// # Ok::<(), ndrt_tensor::TensorError>(())
    /// ```
    pub fn slice(&self, args: &[SliceArg]) -> Result<Tensor, TensorError> {
        if args.len() > self.ndim() {
            return Err(TensorError::Shape(format!(
                "{} indices for tensor of rank {}",
                args.len(),
                self.ndim()
            )));
        }
        let mut offset = 0;
        let mut shape = Vec::with_capacity(self.ndim());
        let mut strides = Vec::with_capacity(self.ndim());
        let mut empty = false;
        for (axis, (&dim, &stride)) in self.shape().iter().zip(self.strides()).enumerate() {
            match args.get(axis).copied().unwrap_or(SliceArg::FULL) {
                SliceArg::Index(index) => {
                    let pos = if index < 0 { index + dim as i64 } else { index };
                    if pos < 0 || pos >= dim as i64 {
                        return Err(TensorError::index_out_of_bounds(index, dim));
                    }
                    offset += pos as usize * stride;
                }
                SliceArg::Range { step: 0, .. } => {
                    return Err(TensorError::InvalidArgument(format!(
                        "slice step of axis {} must be positive",
                        axis
                    )));
                }
                SliceArg::Range { start, stop, step } => {
                    let start = start.map_or(0, |p| clamp_position(p, dim));
                    let stop = stop.map_or(dim, |p| clamp_position(p, dim));
                    let len = if stop > start {
                        (stop - start).div_ceil(step)
                    } else {
                        0
                    };
                    if len > 0 {
                        offset += start * stride;
                    } else {
                        empty = true;
                    }
                    shape.push(len);
                    strides.push(stride * step);
                }
            }
        }
        // an empty selection addresses no element, so it starts at the view origin
        self.view(if empty { 0 } else { offset }, &shape, &strides)
    }
}

#[cfg(test)]
mod tests {
    use super::SliceArg;
    use crate::{Device, Tensor, TensorError};

    fn grid() -> Result<Tensor, TensorError> {
        Tensor::from_vec(&[3, 4], (0..12).map(|v| v as f32).collect())
    }

    #[test]
    fn slice_ranges_and_steps() -> Result<(), TensorError> {
        let t = grid()?;
        let s = t.slice(&[(0..2).into(), (1..).into()])?;
        assert_eq!(s.shape(), &[2, 3]);
        assert_eq!(s.to_vec()?, vec![1.0, 2.0, 3.0, 5.0, 6.0, 7.0]);
        assert!(s.shares_buffer(&t));
        assert!(s.is_view());

        let every_other = t.slice(&[SliceArg::FULL, SliceArg::stepped(1, 4, 2)])?;
        assert_eq!(every_other.to_vec()?, vec![1.0, 3.0, 5.0, 7.0, 9.0, 11.0]);
        assert_eq!(every_other.strides(), &[16, 8]);

        // bounds are clamped, negatives count from the end
        let tail = t.slice(&[(-2..100).into(), (..-2).into()])?;
        assert_eq!(tail.to_vec()?, vec![4.0, 5.0, 8.0, 9.0]);
        Ok(())
    }

    #[test]
    fn slice_indices_drop_axes() -> Result<(), TensorError> {
        let t = grid()?;
        let col = t.slice(&[(..).into(), 2.into()])?;
        assert_eq!(col.shape(), &[3]);
        assert_eq!(col.to_vec()?, vec![2.0, 6.0, 10.0]);

        let elem = t.slice(&[SliceArg::Index(-1), SliceArg::Index(-1)])?;
        assert!(elem.is_scalar());
        assert_eq!(elem.item()?, 11.0);
        Ok(())
    }

    #[test]
    fn slice_empty_selection() -> Result<(), TensorError> {
        let t = grid()?;
        let none = t.slice(&[(2..1).into()])?;
        assert_eq!(none.shape(), &[0, 4]);
        assert!(none.to_vec()?.is_empty());
        let past_end = t.slice(&[(5..).into()])?;
        assert_eq!(past_end.numel(), 0);
        Ok(())
    }

    #[test]
    fn slice_writes_through() -> Result<(), TensorError> {
        let t = Tensor::zeros(&[2, 3], Device::Cpu)?;
        let mut last_col = t.slice(&[SliceArg::FULL, SliceArg::Index(2)])?;
        last_col.fill(1.0)?;
        assert_eq!(t.to_vec()?, vec![0.0, 0.0, 1.0, 0.0, 0.0, 1.0]);
        Ok(())
    }

    #[test]
    fn slice_errors() -> Result<(), TensorError> {
        let t = grid()?;
        assert!(matches!(
            t.slice(&[0.into(), 0.into(), 0.into()]),
            Err(TensorError::Shape(_))
        ));
        assert!(matches!(
            t.slice(&[3.into()]),
            Err(TensorError::IndexOutOfBounds { .. })
        ));
        assert!(matches!(
            t.slice(&[(-4).into()]),
            Err(TensorError::IndexOutOfBounds { .. })
        ));
        assert!(matches!(
            t.slice(&[SliceArg::stepped(0, 3, 0)]),
            Err(TensorError::InvalidArgument(_))
        ));
        Ok(())
    }
}
