use ndrt_tensor::TensorError;
use thiserror::Error;

/// An error type for tensor operations.
#[derive(Error, Debug, PartialEq)]
pub enum TensorOpsError {
    /// The dimension to perform the operation over is greater than the number of dimensions of the tensor.
    #[error("Dimension out of bounds. The dimension {0} is out of bounds ({1}).")]
    DimOutOfBounds(usize, usize),

    /// An operation parameter is outside its valid domain.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The reduction has no identity and its input is empty.
    #[error("Cannot compute {0} of an empty tensor")]
    EmptyReduction(&'static str),

    /// Tensor error
    #[error("Error with the tensor: {0}")]
    TensorError(#[from] TensorError),
}

impl From<ndrt_tensor::TensorAllocatorError> for TensorOpsError {
    fn from(e: ndrt_tensor::TensorAllocatorError) -> Self {
        TensorOpsError::TensorError(TensorError::Allocation(e))
    }
}
