use std::alloc;
use std::alloc::Layout;

use thiserror::Error;

/// Alignment used for every host buffer allocated by the runtime.
pub const BUFFER_ALIGN: usize = 64;

/// An error type for tensor allocator operations.
#[derive(Debug, Error, PartialEq)]
pub enum TensorAllocatorError {
    /// The requested size and alignment do not form a valid layout.
    #[error("Invalid tensor layout {0}")]
    LayoutError(core::alloc::LayoutError),

    /// The allocator returned a null pointer.
    #[error("Null pointer")]
    NullPointer,

    /// The device ran out of memory.
    #[error("Out of memory while allocating {requested} bytes on {device}")]
    OutOfMemory {
        /// Number of bytes requested
        requested: usize,
        /// Device the allocation was requested on
        device: String,
    },

    /// A driver level operation failed.
    #[error("Device operation failed: {0}")]
    DeviceError(String),

    /// A copy direction was requested on a backend that cannot serve it.
    #[error("Backend `{backend}` cannot perform a {direction} copy")]
    InvalidCopyDirection {
        /// Name of the backend that rejected the copy
        backend: &'static str,
        /// Requested direction
        direction: String,
    },
}

impl TensorAllocatorError {
    /// Returns true if the error is recoverable by freeing memory.
    pub fn is_out_of_memory(&self) -> bool {
        matches!(self, Self::OutOfMemory { .. } | Self::NullPointer)
    }

    /// Returns true if the error indicates a programming error.
    pub fn is_programming_error(&self) -> bool {
        matches!(
            self,
            Self::LayoutError(_) | Self::InvalidCopyDirection { .. }
        )
    }

    /// Returns a user-friendly suggestion for resolving the error.
    pub fn suggestion(&self) -> &str {
        match self {
            Self::LayoutError(_) => "Check that the requested buffer size does not overflow",
            Self::NullPointer | Self::OutOfMemory { .. } => {
                "Release unused tensors or reduce tensor sizes"
            }
            Self::DeviceError(_) => "Check the accelerator driver and device availability",
            Self::InvalidCopyDirection { .. } => {
                "Route device copies through the backend that owns the device memory"
            }
        }
    }
}

/// Source of host buffers for the CPU backend.
///
/// Installing a custom allocator with
/// [`CpuBackend::with_allocator`](crate::CpuBackend::with_allocator) lets
/// callers observe every buffer the runtime allocates and releases. A buffer
/// handed out by `alloc` is returned to `dealloc` exactly once, with the same
/// layout.
pub trait TensorAllocator: Send + Sync + 'static {
    /// Allocates a buffer for `layout`.
    fn alloc(&self, layout: Layout) -> Result<*mut u8, TensorAllocatorError>;

    /// Returns a buffer obtained from [`TensorAllocator::alloc`].
    fn dealloc(&self, ptr: *mut u8, layout: Layout);
}

#[derive(Clone, Debug, Default)]
/// A tensor allocator that uses the system allocator.
pub struct CpuAllocator;

/// Implement the `TensorAllocator` trait for the `CpuAllocator` struct.
impl TensorAllocator for CpuAllocator {
    /// Allocates memory for a tensor with the given layout.
    ///
    /// Zero sized layouts never reach the system allocator; a dangling but
    /// well aligned pointer is returned instead.
    ///
    /// # Arguments
    ///
    /// * `layout` - The layout of the tensor.
    ///
    /// # Returns
    ///
    /// A non-null pointer to the allocated memory if successful, otherwise an error.
    fn alloc(&self, layout: Layout) -> Result<*mut u8, TensorAllocatorError> {
        if layout.size() == 0 {
            return Ok(layout.align() as *mut u8);
        }
        let ptr = unsafe { alloc::alloc(layout) };
        if ptr.is_null() {
            Err(TensorAllocatorError::OutOfMemory {
                requested: layout.size(),
                device: "cpu".to_string(),
            })?
        }
        Ok(ptr)
    }

    /// Deallocates memory for a tensor with the given layout.
    ///
    /// # Arguments
    ///
    /// * `ptr` - A non-null pointer to the allocated memory.
    /// * `layout` - The layout of the tensor.
    ///
    /// # Safety
    ///
    /// The pointer must be non-null and the layout must be correct.
    #[allow(clippy::not_unsafe_ptr_arg_deref)]
    fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        if !ptr.is_null() && layout.size() != 0 {
            unsafe { alloc::dealloc(ptr, layout) }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpu_allocator() -> Result<(), TensorAllocatorError> {
        let allocator = CpuAllocator;
        let layout = Layout::from_size_align(1024, BUFFER_ALIGN).unwrap();
        let ptr = allocator.alloc(layout)?;
        assert_eq!(ptr as usize % BUFFER_ALIGN, 0);
        allocator.dealloc(ptr, layout);
        Ok(())
    }

    #[test]
    fn test_cpu_allocator_zero_size() -> Result<(), TensorAllocatorError> {
        let allocator = CpuAllocator;
        let layout = Layout::from_size_align(0, BUFFER_ALIGN).unwrap();
        let ptr = allocator.alloc(layout)?;
        assert!(!ptr.is_null());
        allocator.dealloc(ptr, layout);
        Ok(())
    }

    #[test]
    fn test_error_classification() {
        let oom = TensorAllocatorError::OutOfMemory {
            requested: 16,
            device: "gpu:0".to_string(),
        };
        assert!(oom.is_out_of_memory());
        assert!(!oom.is_programming_error());
        let bad = TensorAllocatorError::InvalidCopyDirection {
            backend: "cpu",
            direction: "host-to-device".to_string(),
        };
        assert!(bad.is_programming_error());
    }
}
