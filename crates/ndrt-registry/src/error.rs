use ndrt_tensor::TensorError;
use thiserror::Error;

use crate::Handle;

/// An error type for the handle registry.
#[derive(Error, Debug, PartialEq)]
pub enum RegistryError {
    /// The handle is unknown or was already released.
    #[error("Invalid handle {0}: unknown or already released")]
    InvalidHandle(Handle),

    /// The global registry was configured after it had been created.
    #[error("The global registry is already initialized")]
    AlreadyInitialized,

    /// A configuration value is outside its valid domain.
    #[error("Invalid registry configuration: {0}")]
    InvalidConfig(String),

    /// Tensor error
    #[error("Error with the tensor: {0}")]
    TensorError(#[from] TensorError),
}

impl RegistryError {
    /// Returns true for handle misuse on the host side, such as a double
    /// release or a use after release.
    pub fn is_stale_handle(&self) -> bool {
        matches!(self, Self::InvalidHandle(_))
    }
}
