//! Deterministic initializers: ranges, identity and diagonals.

use crate::{device::Device, dtype::DType, error::TensorError, tensor::Tensor};

/// Elements generated per host batch by `arange`.
const ARANGE_CHUNK: usize = 1 << 16;

impl Tensor {
    /// Creates a 1-D tensor with values from `start` up to, excluding, `stop`
    /// spaced by `step`.
    ///
    /// # Errors
    ///
    /// Returns [`TensorError::InvalidArgument`] if `step` is zero or not finite,
    /// or if the range would be empty.
    ///
    /// # Example
    ///
    /// ```
    /// use ndrt_tensor::{Device, Tensor};
    ///
    /// let t = Tensor::arange(0.0, 2.0, 0.5, Device::Cpu)?;
    /// assert_eq!(t.to_vec()?, vec![0.0, 0.5, 1.0, 1.5]);
    /// # Ok::<(), ndrt_tensor::TensorError>(())
    /// ```
    pub fn arange(start: f32, stop: f32, step: f32, device: Device) -> Result<Tensor, TensorError> {
        if step == 0.0 || !step.is_finite() || !start.is_finite() || !stop.is_finite() {
            return Err(TensorError::InvalidArgument(format!(
                "invalid range {}..{} with step {}",
                start, stop, step
            )));
        }
        let count = ((f64::from(stop) - f64::from(start)) / f64::from(step)).ceil();
        if count <= 0.0 {
            return Err(TensorError::InvalidArgument(format!(
                "range {}..{} with step {} has zero length",
                start, stop, step
            )));
        }
        if count > usize::MAX as f64 {
            return Err(TensorError::Shape(format!(
                "range {}..{} with step {} has too many elements",
                start, stop, step
            )));
        }
        let count = count as usize;
        let t = Tensor::create(&[count], DType::Float32, device)?;
        let elsize = t.element_size();
        let mut chunk = Vec::with_capacity(count.min(ARANGE_CHUNK));
        for first in (0..count).step_by(ARANGE_CHUNK) {
            let len = ARANGE_CHUNK.min(count - first);
            chunk.clear();
            chunk.extend(
                (first..first + len).map(|i| (f64::from(start) + i as f64 * f64::from(step)) as f32),
            );
            t.view(first * elsize, &[len], &[elsize])?
                .write_elements(&chunk)?;
        }
        Ok(t)
    }

    /// Creates an `n x n` identity matrix.
    ///
    /// # Errors
    ///
    /// Returns [`TensorError::Shape`] if `n * n` elements overflow.
    pub fn identity(n: usize, device: Device) -> Result<Tensor, TensorError> {
        let t = Tensor::zeros(&[n, n], device)?;
        let elsize = t.element_size();
        // n * n did not overflow, so neither does the diagonal stride
        t.view(0, &[n], &[(n + 1) * elsize])?.fill(1.0)?;
        Ok(t)
    }

    /// Builds a diagonal matrix from a 1-D tensor, or extracts the diagonal of
    /// a 2-D tensor.
    ///
    /// The result lives on the same device as `self`.
    ///
    /// # Errors
    ///
    /// Returns [`TensorError::Shape`] for any other rank.
    pub fn diag(&self) -> Result<Tensor, TensorError> {
        let values = self.to_vec()?;
        match *self.shape() {
            [n] => {
                let out = Tensor::zeros(&[n, n], self.device())?;
                let elsize = out.element_size();
                out.view(0, &[n], &[(n + 1) * elsize])?
                    .write_elements(&values)?;
                Ok(out)
            }
            [rows, cols] => {
                let n = rows.min(cols);
                let data: Vec<f32> = (0..n).map(|i| values[i * cols + i]).collect();
                Tensor::from_slice(&[n], &data, self.device())
            }
            _ => Err(TensorError::Shape(format!(
                "diag expects a 1-D or 2-D tensor, got shape {:?}",
                self.shape()
            ))),
        }
    }
}
