//! Random initializers backed by `rand` and `rand_distr`.
//!
//! Every function takes the generator explicitly so that callers can seed it.

use rand::Rng;
use rand_distr::{Distribution, Normal, Poisson, StandardNormal, Uniform};

use crate::{device::Device, error::TensorError, layout, tensor::Tensor};

fn sample<R, D>(shape: &[usize], dist: &D, rng: &mut R) -> Vec<f32>
where
    R: Rng + ?Sized,
    D: Distribution<f32>,
{
    (0..layout::numel(shape)).map(|_| dist.sample(rng)).collect()
}

fn invalid(what: &str, err: impl std::fmt::Display) -> TensorError {
    TensorError::InvalidArgument(format!("{}: {}", what, err))
}

impl Tensor {
    /// Samples from the uniform distribution over `[low, high)`.
    pub fn uniform<R: Rng + ?Sized>(
        shape: &[usize],
        low: f32,
        high: f32,
        rng: &mut R,
        device: Device,
    ) -> Result<Tensor, TensorError> {
        let dist = Uniform::new(low, high).map_err(|e| invalid("uniform", e))?;
        Tensor::from_slice(shape, &sample(shape, &dist, rng), device)
    }

    /// Samples from the normal distribution with the given mean and standard
    /// deviation.
    pub fn normal<R: Rng + ?Sized>(
        shape: &[usize],
        mean: f32,
        std: f32,
        rng: &mut R,
        device: Device,
    ) -> Result<Tensor, TensorError> {
        let dist = Normal::new(mean, std).map_err(|e| invalid("normal", e))?;
        Tensor::from_slice(shape, &sample(shape, &dist, rng), device)
    }

    /// Samples from the standard normal distribution.
    pub fn standard_normal<R: Rng + ?Sized>(
        shape: &[usize],
        rng: &mut R,
        device: Device,
    ) -> Result<Tensor, TensorError> {
        Tensor::from_slice(shape, &sample(shape, &StandardNormal, rng), device)
    }

    /// Samples from a normal distribution, redrawing values further than two
    /// standard deviations from the mean.
    pub fn truncated_normal<R: Rng + ?Sized>(
        shape: &[usize],
        mean: f32,
        std: f32,
        rng: &mut R,
        device: Device,
    ) -> Result<Tensor, TensorError> {
        let dist = Normal::new(mean, std).map_err(|e| invalid("truncated_normal", e))?;
        let bound = 2.0 * std;
        let data: Vec<f32> = (0..layout::numel(shape))
            .map(|_| loop {
                let v: f32 = dist.sample(rng);
                if (v - mean).abs() <= bound {
                    break v;
                }
            })
            .collect();
        Tensor::from_slice(shape, &data, device)
    }

    /// Samples event counts from the Poisson distribution with rate `lambda`.
    pub fn poisson<R: Rng + ?Sized>(
        shape: &[usize],
        lambda: f32,
        rng: &mut R,
        device: Device,
    ) -> Result<Tensor, TensorError> {
        let dist = Poisson::new(lambda).map_err(|e| invalid("poisson", e))?;
        Tensor::from_slice(shape, &sample(shape, &dist, rng), device)
    }
}
