#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]
//!
//! # Overview
//!
//! `ndrt-tensor` holds the data model of the runtime: a [`Tensor`] is a
//! descriptor (shape, byte strides, element type) over a reference-counted
//! buffer that lives on the CPU or on a GPU. Views alias the buffer of the
//! tensor they were derived from and keep it alive; the buffer is released
//! exactly once, when the last tensor referencing it is dropped.
//!
//! # Architecture
//!
//! - **Tensor**: shape and stride aware descriptor with constructors, views,
//!   reshaping, slicing, transfers and element access
//! - **TensorStorage**: `Arc`-shared buffer plus the byte offset of a view
//! - **Backend**: per-device allocation, copy, fill and synchronization
//! - **TensorAllocator**: pluggable host allocator used by the CPU backend
//!
//! # Quick Start
//!
//! ```rust
//! use ndrt_tensor::{Device, Tensor};
//!
//! let t = Tensor::full(&[2, 3], 1.5, Device::Cpu)?;
//! assert_eq!(t.numel(), 6);
//!
//! // a strided view of the second column
//! let col = t.view(4, &[2], &[12])?;
//! assert_eq!(col.to_vec()?, vec![1.5, 1.5]);
//! assert_eq!(t.ref_count(), 2);
//! # Ok::<(), ndrt_tensor::TensorError>(())
//! ```
//!
//! # Features
//!
//! - `cuda`: GPU backend through the CUDA driver API. Without it, any GPU
//!   request fails with [`TensorError::DeviceUnavailable`].
//! - `serde`: serialization derives for [`Device`], [`DType`] and
//!   [`HostValue`].

/// Allocator module containing host memory management utilities.
pub mod allocator;

/// Backend module containing device operation abstractions.
pub mod backend;

/// CUDA backend module.
#[cfg(feature = "cuda")]
pub mod cuda;

mod cursor;

/// Device module containing device abstraction.
pub mod device;

/// Element type descriptors.
pub mod dtype;

/// Error types of the crate.
pub mod error;

mod init;

/// Shape and stride arithmetic plus the strided traversal primitive.
pub mod layout;

/// Conversion between tensors and nested host values.
pub mod nested;

mod random;

/// Strided sub-view selection.
pub mod slice;

/// Storage module containing the shared buffer implementation.
pub mod storage;

/// Tensor module containing the main tensor implementation.
pub mod tensor;

pub use crate::allocator::{CpuAllocator, TensorAllocator, TensorAllocatorError};
pub use crate::backend::{backend_for, cpu_backend, Backend, CopyDirection, CpuBackend};
#[cfg(feature = "cuda")]
pub use crate::cuda::CudaBackend;
pub use crate::device::Device;
pub use crate::dtype::DType;
pub use crate::error::TensorError;
pub use crate::nested::HostValue;
pub use crate::slice::SliceArg;
pub use crate::storage::TensorStorage;
pub use crate::tensor::Tensor;
