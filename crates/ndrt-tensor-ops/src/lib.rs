#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]
//!
//! Every operation walks its operands with one strided traversal over the
//! output index. Broadcast dimensions get a stride of zero, so operands are
//! never expanded in memory and views are read in place.
//!
//! ```rust
//! use ndrt_tensor::Tensor;
//! use ndrt_tensor_ops::{add, sum};
//!
//! let a = Tensor::from_vec(&[2, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0])?;
//! let b = Tensor::from_vec(&[3], vec![10.0, 20.0, 30.0])?;
//! let c = add(&a, &b)?;
//! assert_eq!(c.to_vec()?, vec![11.0, 22.0, 33.0, 14.0, 25.0, 36.0]);
//! assert_eq!(sum(&c, None)?.as_scalar()?, 141.0);
//! # Ok::<(), ndrt_tensor_ops::TensorOpsError>(())
//! ```

/// Broadcast shape and stride computation.
pub mod broadcast;

/// Comparison operations and closeness checks.
pub mod compare;

/// Elementwise operation enums and their dispatch.
pub mod elementwise;

/// Error types for tensor operations.
///
/// Defines [`TensorOpsError`] for handling failures during tensor computations.
pub mod error;

/// Per-device kernel tables.
///
/// The CPU kernels run on the host through the strided traversal. The CUDA
/// kernels, behind the `cuda` feature, are compiled with NVRTC on first use.
pub mod kernels;

/// Reductions over one axis or every element.
pub mod reduce;

/// Joining and rank promotion.
pub mod shape;

pub use broadcast::broadcast_shape;
pub use compare::{all, all_close, equal, greater, greater_equal, less, less_equal, not_equal};
pub use elementwise::{
    abs, add, add_scalar, binary, binary_scalar, clip, div, div_scalar, elementwise, exp, log,
    maximum, minimum, modulo, mul, mul_scalar, negative, pow, pow_scalar, sqrt, sub, sub_scalar,
    unary, BinaryOp, ElementwiseOp, UnaryOp,
};
pub use error::TensorOpsError;
pub use reduce::{
    argmax, argmin, average, max, mean, median, min, prod, quantile, reduce, std, sum, variance,
    ReduceOp, Reduction,
};
pub use shape::{
    append, atleast_1d, atleast_2d, atleast_3d, column_stack, concatenate, dstack, hstack, stack,
    vstack,
};
