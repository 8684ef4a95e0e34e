/// An error type for the io module.
#[derive(thiserror::Error, Debug)]
pub enum IoError {
    /// Error when the file does not exist.
    #[error("File does not exist: {0}")]
    FileDoesNotExist(std::path::PathBuf),

    /// Error to open or manipulate the file.
    #[error("Failed to manipulate the file. {0}")]
    FileError(#[from] std::io::Error),

    /// The file does not start with the tensor magic bytes.
    #[error("Not an ndrt tensor file: bad magic {0:?}")]
    InvalidMagic([u8; 4]),

    /// The header was written by an unknown format version.
    #[error("Unsupported format version {found}, expected {expected}")]
    UnsupportedVersion {
        /// Version found in the header.
        found: u32,
        /// Version this crate writes.
        expected: u32,
    },

    /// Error to encode the header.
    #[error("Failed to encode the tensor header. {0}")]
    Encode(#[from] bincode::error::EncodeError),

    /// Error to decode the header.
    #[error("Failed to decode the tensor header. {0}")]
    Decode(#[from] bincode::error::DecodeError),

    /// The header and the payload disagree.
    #[error("Corrupted tensor file: {0}")]
    Corrupted(String),

    /// Error to create or read the tensor.
    #[error("Failed to create the tensor. {0}")]
    Tensor(#[from] ndrt_tensor::TensorError),
}
