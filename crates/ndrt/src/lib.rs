#![doc = include_str!(concat!("../", env!("CARGO_PKG_README")))]

#[doc(inline)]
pub use ndrt_tensor as tensor;

#[doc(inline)]
pub use ndrt_tensor_ops as ops;

#[doc(inline)]
pub use ndrt_registry as registry;

#[doc(inline)]
pub use ndrt_io as io;
