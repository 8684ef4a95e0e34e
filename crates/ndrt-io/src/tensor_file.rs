use std::{
    fs::File,
    io::{BufReader, BufWriter, Read, Write},
    path::Path,
};

use ndrt_tensor::{DType, Device, Tensor};

use crate::error::IoError;

/// Bytes every tensor file starts with.
pub const MAGIC: [u8; 4] = *b"NDRT";

/// Current format version.
pub const FORMAT_VERSION: u32 = 1;

const DEVICE_CPU: u8 = 0;
const DEVICE_GPU: u8 = 1;

/// Header written after the magic bytes.
///
/// The element data follows as little-endian values in row-major order.
#[derive(Debug, Clone, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub struct TensorHeader {
    /// Format version.
    pub version: u32,
    /// Element type code, see [`DType::code`].
    pub dtype: u8,
    /// Device kind the tensor was saved from, 0 for CPU and 1 for GPU.
    pub device: u8,
    /// GPU ordinal, 0 for CPU tensors.
    pub device_id: u32,
    /// Dimensions of the tensor.
    pub shape: Vec<u64>,
}

impl TensorHeader {
    /// Describes `tensor`.
    pub fn of(tensor: &Tensor) -> Self {
        let (device, device_id) = match tensor.device() {
            Device::Cpu => (DEVICE_CPU, 0),
            Device::Gpu { device_id } => (DEVICE_GPU, device_id as u32),
        };
        Self {
            version: FORMAT_VERSION,
            dtype: tensor.dtype().code(),
            device,
            device_id,
            shape: tensor.shape().iter().map(|&d| d as u64).collect(),
        }
    }

    /// Returns the recorded device.
    pub fn device(&self) -> Result<Device, IoError> {
        match self.device {
            DEVICE_CPU => Ok(Device::Cpu),
            DEVICE_GPU => Ok(Device::gpu(self.device_id as usize)),
            other => Err(IoError::Corrupted(format!("unknown device code {}", other))),
        }
    }

    /// Returns the recorded element type.
    pub fn dtype(&self) -> Result<DType, IoError> {
        DType::from_code(self.dtype)
            .ok_or_else(|| IoError::Corrupted(format!("unknown dtype code {}", self.dtype)))
    }

    /// Returns the shape as native sizes.
    pub fn shape(&self) -> Result<Vec<usize>, IoError> {
        self.shape
            .iter()
            .map(|&d| {
                usize::try_from(d)
                    .map_err(|_| IoError::Corrupted(format!("dimension {} overflows", d)))
            })
            .collect()
    }
}

/// Writes `tensor` to `writer`.
///
/// GPU tensors are synchronized and read back before writing.
pub fn write_tensor<W: Write>(tensor: &Tensor, writer: &mut W) -> Result<(), IoError> {
    let header = TensorHeader::of(tensor);
    writer.write_all(&MAGIC)?;
    bincode::encode_into_std_write(&header, writer, bincode::config::standard())?;
    let values = tensor.to_vec()?;
    let mut bytes = Vec::with_capacity(values.len() * std::mem::size_of::<f32>());
    for v in values {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    writer.write_all(&bytes)?;
    Ok(())
}

/// Reads a tensor from `reader`.
///
/// The tensor is created on `device`, or on the device recorded in the
/// header when `None`.
pub fn read_tensor<R: Read>(reader: &mut R, device: Option<Device>) -> Result<Tensor, IoError> {
    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;
    if magic != MAGIC {
        return Err(IoError::InvalidMagic(magic));
    }
    let header: TensorHeader = bincode::decode_from_std_read(reader, bincode::config::standard())?;
    if header.version != FORMAT_VERSION {
        return Err(IoError::UnsupportedVersion {
            found: header.version,
            expected: FORMAT_VERSION,
        });
    }
    let dtype = header.dtype()?;
    let shape = header.shape()?;
    let device = match device {
        Some(device) => device,
        None => header.device()?,
    };

    let expected = shape
        .iter()
        .try_fold(1usize, |acc, &d| acc.checked_mul(d))
        .and_then(|count| count.checked_mul(dtype.size_in_bytes()))
        .ok_or_else(|| IoError::Corrupted(format!("shape {:?} overflows", shape)))?;
    // the buffer grows with the bytes actually present, never with the header's claim
    let mut bytes = Vec::new();
    reader
        .by_ref()
        .take(expected as u64)
        .read_to_end(&mut bytes)?;
    if bytes.len() != expected {
        return Err(IoError::Corrupted(format!(
            "expected {} bytes of data for shape {:?}, found {}",
            expected,
            shape,
            bytes.len()
        )));
    }
    let mut trailing = [0u8; 1];
    if reader.read(&mut trailing)? != 0 {
        return Err(IoError::Corrupted("trailing bytes after tensor data".to_string()));
    }

    let values: Vec<f32> = bytes
        .chunks_exact(dtype.size_in_bytes())
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    Ok(Tensor::from_slice(&shape, &values, device)?)
}

/// Saves a tensor to a file.
///
/// # Arguments
///
/// * `tensor` - The tensor to save. Views are written in row-major order.
/// * `file_path` - The path of the file to create or overwrite.
pub fn save(tensor: &Tensor, file_path: impl AsRef<Path>) -> Result<(), IoError> {
    let file_path = file_path.as_ref();
    let mut writer = BufWriter::new(File::create(file_path)?);
    write_tensor(tensor, &mut writer)?;
    writer.flush()?;
    log::debug!(
        "saved tensor {:?} to {}",
        tensor.shape(),
        file_path.display()
    );
    Ok(())
}

/// Loads a tensor onto the device recorded in the file.
///
/// # Arguments
///
/// * `file_path` - The path of a file written by [`save`].
pub fn load(file_path: impl AsRef<Path>) -> Result<Tensor, IoError> {
    load_impl(file_path.as_ref(), None)
}

/// Loads a tensor onto `device`, whatever device it was saved from.
pub fn load_on(file_path: impl AsRef<Path>, device: Device) -> Result<Tensor, IoError> {
    load_impl(file_path.as_ref(), Some(device))
}

fn load_impl(file_path: &Path, device: Option<Device>) -> Result<Tensor, IoError> {
    if !file_path.exists() {
        return Err(IoError::FileDoesNotExist(file_path.to_path_buf()));
    }
    let mut reader = BufReader::new(File::open(file_path)?);
    let tensor = read_tensor(&mut reader, device)?;
    log::debug!(
        "loaded tensor {:?} from {} onto {}",
        tensor.shape(),
        file_path.display(),
        tensor.device()
    );
    Ok(tensor)
}
