/// Device type enumeration for tensor allocation.
///
/// Represents the memory space a tensor buffer lives in. The GPU variant is
/// always nameable; whether it can actually be used depends on the `cuda`
/// feature and on the hardware present at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Device {
    /// CPU heap memory
    #[default]
    Cpu,
    /// Accelerator memory on the GPU with the given ordinal
    Gpu {
        /// The GPU device ID
        device_id: usize,
    },
}

impl Device {
    /// Returns the device type as a string.
    pub fn device_type(&self) -> &str {
        match self {
            Device::Cpu => "cpu",
            Device::Gpu { .. } => "gpu",
        }
    }

    /// Returns the device ID if applicable.
    pub fn device_id(&self) -> Option<usize> {
        match self {
            Device::Cpu => None,
            Device::Gpu { device_id } => Some(*device_id),
        }
    }

    /// Returns true if the device is CPU.
    pub fn is_cpu(&self) -> bool {
        matches!(self, Device::Cpu)
    }

    /// Returns true if the device is a GPU.
    pub fn is_gpu(&self) -> bool {
        !self.is_cpu()
    }

    /// Creates a GPU device with the specified device ID.
    pub fn gpu(device_id: usize) -> Self {
        Device::Gpu { device_id }
    }
}

impl std::fmt::Display for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Device::Cpu => write!(f, "cpu"),
            Device::Gpu { device_id } => write!(f, "gpu:{}", device_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_cpu() {
        let device = Device::Cpu;
        assert_eq!(device.device_type(), "cpu");
        assert_eq!(device.device_id(), None);
        assert!(device.is_cpu());
        assert!(!device.is_gpu());
        assert_eq!(format!("{}", device), "cpu");
    }

    #[test]
    fn test_device_gpu() {
        let device = Device::gpu(1);
        assert_eq!(device.device_type(), "gpu");
        assert_eq!(device.device_id(), Some(1));
        assert!(!device.is_cpu());
        assert!(device.is_gpu());
        assert_eq!(format!("{}", device), "gpu:1");
    }

    #[test]
    fn test_device_default() {
        let device = Device::default();
        assert_eq!(device, Device::Cpu);
    }
}
