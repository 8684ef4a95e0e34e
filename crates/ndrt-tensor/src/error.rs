use thiserror::Error;

use crate::{allocator::TensorAllocatorError, device::Device};

/// Error type for tensor operations.
///
/// This enum provides detailed error information for tensor creation,
/// manipulation, device transfer and host value conversion.
#[derive(Error, Debug, PartialEq)]
pub enum TensorError {
    /// Shapes are incompatible for the requested operation.
    ///
    /// Raised by broadcasting, reshaping, stacking and by constructors when
    /// the provided data does not match the shape.
    ///
    /// # Recommended Actions
    /// - Verify tensor shapes with `tensor.shape()`
    /// - Check that the product of shape dimensions equals the data length
    #[error("Shape error: {0}")]
    Shape(String),

    /// Operands live on different devices.
    ///
    /// Operations never transfer data implicitly; move the operands with
    /// `to_device` first.
    #[error("Device mismatch: expected {expected}, got {actual}")]
    DeviceMismatch {
        /// Device required by the operation
        expected: Device,
        /// Device the offending operand lives on
        actual: Device,
    },

    /// A GPU path was requested without accelerator support.
    ///
    /// Either the crate was built without the `cuda` feature or the driver
    /// could not initialize the requested device.
    #[error("Device {device} is unavailable: {reason}")]
    DeviceUnavailable {
        /// The requested device
        device: Device,
        /// Why the device cannot be used
        reason: String,
    },

    /// Underlying buffer allocation or transfer failed.
    ///
    /// This error wraps lower-level memory allocation, deallocation,
    /// or transfer errors. See [`TensorAllocatorError`] for details.
    #[error("Allocation error: {0}")]
    Allocation(#[from] TensorAllocatorError),

    /// Index exceeds tensor bounds.
    #[error("Index {index} out of bounds for dimension of size {size}")]
    IndexOutOfBounds {
        /// The invalid index that was attempted
        index: i64,
        /// The size of the dimension being indexed
        size: usize,
    },

    /// Negative indices are rejected rather than wrapped.
    #[error("Negative indices are not supported (got {0})")]
    NegativeIndex(i64),

    /// A host value leaf is not numeric.
    #[error("Type error: {0}")]
    Type(String),

    /// A parameter is outside its valid domain.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Operation not supported for this tensor configuration.
    #[error("Unsupported operation: {operation} - {reason}")]
    UnsupportedOperation {
        /// Name of the operation that failed
        operation: String,
        /// Reason why the operation is not supported
        reason: String,
    },
}

impl TensorError {
    /// Creates a shape error describing two incompatible shapes.
    pub fn incompatible_shapes(a: &[usize], b: &[usize]) -> Self {
        Self::Shape(format!("incompatible shapes {:?} and {:?}", a, b))
    }

    /// Creates a shape error for a data length that does not match a shape.
    pub fn element_count_mismatch(shape: &[usize], expected: usize, actual: usize) -> Self {
        Self::Shape(format!(
            "shape {:?} expects {} elements, but got {}",
            shape, expected, actual
        ))
    }

    /// Creates an IndexOutOfBounds error with clear context.
    pub fn index_out_of_bounds(index: i64, size: usize) -> Self {
        Self::IndexOutOfBounds { index, size }
    }

    /// Creates an UnsupportedOperation error with context.
    pub fn unsupported_operation(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::UnsupportedOperation {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Returns true for the index error family.
    pub fn is_index_error(&self) -> bool {
        matches!(self, Self::IndexOutOfBounds { .. } | Self::NegativeIndex(_))
    }

    /// Returns true if this error is recoverable by freeing memory.
    pub fn is_out_of_memory(&self) -> bool {
        match self {
            Self::Allocation(e) => e.is_out_of_memory(),
            _ => false,
        }
    }

    /// Returns true if this error indicates a programming error.
    pub fn is_programming_error(&self) -> bool {
        match self {
            Self::Shape(_)
            | Self::DeviceMismatch { .. }
            | Self::IndexOutOfBounds { .. }
            | Self::NegativeIndex(_)
            | Self::Type(_)
            | Self::InvalidArgument(_)
            | Self::UnsupportedOperation { .. } => true,
            Self::DeviceUnavailable { .. } => false,
            Self::Allocation(e) => e.is_programming_error(),
        }
    }

    /// Returns a user-friendly suggestion for resolving the error.
    pub fn suggestion(&self) -> &str {
        match self {
            Self::Shape(_) => {
                "Check tensor shapes are compatible for the operation. Consider reshaping or broadcasting."
            }
            Self::DeviceMismatch { .. } => "Move every operand to the same device with `to_device`",
            Self::DeviceUnavailable { .. } => {
                "Build with the `cuda` feature and check that a GPU is visible, or use the CPU"
            }
            Self::Allocation(e) => e.suggestion(),
            Self::IndexOutOfBounds { .. } | Self::NegativeIndex(_) => {
                "Verify indices are within bounds (0 <= index < dimension_size)"
            }
            Self::Type(_) => "Only numeric leaves can be converted into a tensor",
            Self::InvalidArgument(_) => "Check the parameter ranges documented for the function",
            Self::UnsupportedOperation { .. } => {
                "Check API documentation for operation requirements and supported configurations"
            }
        }
    }
}
