#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]
//!
//! Host objects never hold tensors directly. They hold a [`Handle`] and the
//! [`HandleRegistry`] keeps one reference to the tensor until the handle is
//! released. Every registry operation is serialized by a single lock, so
//! handles may be created on one thread and released on another.
//!
//! ```rust
//! use ndrt_registry::{HandleRegistry, RegistryError};
//! use ndrt_tensor::{Device, Tensor};
//!
//! let registry = HandleRegistry::default();
//! let handle = registry.register(Tensor::zeros(&[2, 3], Device::Cpu)?);
//! assert_eq!(registry.lookup(handle)?.shape(), &[2, 3]);
//!
//! registry.unregister(handle)?;
//! assert_eq!(
//!     registry.unregister(handle),
//!     Err(RegistryError::InvalidHandle(handle))
//! );
//! # Ok::<(), RegistryError>(())
//! ```

/// Registry configuration.
pub mod config;

/// Error types of the registry.
pub mod error;

/// RAII host objects owning handles.
pub mod host;

/// The handle table.
pub mod registry;

pub use config::RegistryConfig;
pub use error::RegistryError;
pub use host::HostRef;
pub use registry::{Exposed, Handle, HandleRegistry, TeardownReport};
