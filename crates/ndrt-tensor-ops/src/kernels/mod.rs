//! Per-device kernel tables.
//!
//! Every device exposes the same three entry points. The operation enum
//! selects the per-element function inside the kernel, so adding an
//! operation never adds a table slot.

use ndrt_tensor::{Device, Tensor, TensorError};

use crate::{
    elementwise::{BinaryOp, UnaryOp},
    error::TensorOpsError,
    reduce::{ReduceOp, ReducePlan},
};

mod cpu;

#[cfg(feature = "cuda")]
mod cuda;

/// Writes `op(a)` into `out`, honoring the strides of both.
pub type UnaryKernel = fn(UnaryOp, &Tensor, &mut Tensor) -> Result<(), TensorOpsError>;

/// Writes `op(a, b)` into a contiguous `out`, reading the operands with the
/// given broadcast strides.
pub type BinaryKernel =
    fn(BinaryOp, &Tensor, &[usize], &Tensor, &[usize], &mut Tensor) -> Result<(), TensorOpsError>;

/// Writes one reduced value per outer position of `plan` into `out`.
pub type ReduceKernel =
    fn(ReduceOp, &Tensor, &ReducePlan, &mut Tensor) -> Result<(), TensorOpsError>;

/// The kernels serving one device kind.
pub struct KernelTable {
    /// Name of the table, used in logs.
    pub name: &'static str,
    /// Elementwise kernel for one operand.
    pub unary: UnaryKernel,
    /// Elementwise kernel for two broadcast operands.
    pub binary: BinaryKernel,
    /// Reduction kernel.
    pub reduce: ReduceKernel,
}

impl std::fmt::Debug for KernelTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KernelTable")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Returns the kernel table serving `device`.
///
/// # Errors
///
/// Returns [`TensorError::DeviceUnavailable`] for GPU devices when the crate
/// is built without the `cuda` feature.
pub fn kernels_for(device: Device) -> Result<&'static KernelTable, TensorOpsError> {
    match device {
        Device::Cpu => Ok(&cpu::CPU_KERNELS),
        #[cfg(feature = "cuda")]
        Device::Gpu { .. } => Ok(&cuda::CUDA_KERNELS),
        #[cfg(not(feature = "cuda"))]
        Device::Gpu { .. } => Err(TensorError::DeviceUnavailable {
            device,
            reason: "built without the `cuda` feature".to_string(),
        }
        .into()),
    }
}

// elements are f32 and strides are multiples of the element size
#[cfg_attr(not(feature = "cuda"), allow(dead_code))]
pub(crate) fn element_strides(strides: &[usize]) -> Vec<u64> {
    strides
        .iter()
        .map(|s| (s / std::mem::size_of::<f32>()) as u64)
        .collect()
}

pub(crate) fn check_output(out: &Tensor, shape: &[usize]) -> Result<(), TensorOpsError> {
    if out.shape() != shape {
        return Err(TensorError::incompatible_shapes(out.shape(), shape).into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cpu_table() -> Result<(), TensorOpsError> {
        assert_eq!(kernels_for(Device::Cpu)?.name, "cpu");
        Ok(())
    }

    #[cfg(not(feature = "cuda"))]
    #[test]
    fn gpu_table_unavailable() {
        assert!(matches!(
            kernels_for(Device::gpu(0)),
            Err(TensorOpsError::TensorError(TensorError::DeviceUnavailable { .. }))
        ));
    }

    #[test]
    fn strides_in_elements() {
        assert_eq!(element_strides(&[12, 4, 0]), vec![3, 1, 0]);
    }
}
