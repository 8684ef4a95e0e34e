/// Element type tag carried by every tensor.
///
/// The runtime is single-precision first: every kernel operates on `f32`
/// values. The tag still travels with each tensor so that the element size is
/// never hard-coded in stride arithmetic and persisted headers can be checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DType {
    /// 32-bit IEEE-754 floating point.
    #[default]
    Float32,
}

impl DType {
    /// Returns the size of a single element in bytes.
    #[inline]
    pub fn size_in_bytes(&self) -> usize {
        match self {
            DType::Float32 => std::mem::size_of::<f32>(),
        }
    }

    /// Returns the type identifier used in descriptors and file headers.
    pub fn name(&self) -> &'static str {
        match self {
            DType::Float32 => "float32",
        }
    }

    /// Parses a type identifier produced by [`DType::name`].
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "float32" => Some(DType::Float32),
            _ => None,
        }
    }

    /// Returns the compact numeric code of the type.
    pub fn code(&self) -> u8 {
        match self {
            DType::Float32 => 0,
        }
    }

    /// Parses a numeric code produced by [`DType::code`].
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(DType::Float32),
            _ => None,
        }
    }
}

impl std::fmt::Display for DType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
