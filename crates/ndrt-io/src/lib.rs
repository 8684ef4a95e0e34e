#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]
//!
//! A tensor file is the magic bytes `NDRT`, a `bincode` encoded
//! [`TensorHeader`](tensor_file::TensorHeader) with the shape, element type
//! and device, then the elements as little-endian values in row-major order.

/// Error types for I/O operations.
///
/// Defines [`IoError`] variants for file access, header encoding and decoding
/// failures, and malformed files.
pub mod error;

/// Reading and writing tensor files.
pub mod tensor_file;

pub use error::IoError;
pub use tensor_file::{load, load_on, read_tensor, save, write_tensor};
