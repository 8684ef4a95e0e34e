//! Backend abstraction for device operations.
//!
//! Every tensor buffer is allocated, copied, filled and freed through a
//! [`Backend`]. The CPU backend is always present; the GPU backend exists only
//! when the crate is built with the `cuda` feature. Requesting a GPU backend
//! without it fails with [`TensorError::DeviceUnavailable`]; there is no silent
//! fallback to the CPU.

use std::alloc::Layout;
use std::sync::{Arc, OnceLock};

use crate::{
    allocator::{CpuAllocator, TensorAllocator, TensorAllocatorError, BUFFER_ALIGN},
    device::Device,
    error::TensorError,
};

/// Direction of a buffer copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CopyDirection {
    /// Host memory to host memory.
    HostToHost,
    /// Host memory to accelerator memory.
    HostToDevice,
    /// Accelerator memory to host memory.
    DeviceToHost,
    /// Accelerator memory to accelerator memory.
    DeviceToDevice,
}

impl CopyDirection {
    /// Returns the direction of a copy from `src` to `dst`.
    pub fn between(src: Device, dst: Device) -> Self {
        match (src.is_cpu(), dst.is_cpu()) {
            (true, true) => CopyDirection::HostToHost,
            (true, false) => CopyDirection::HostToDevice,
            (false, true) => CopyDirection::DeviceToHost,
            (false, false) => CopyDirection::DeviceToDevice,
        }
    }

    /// Returns true if either side of the copy is accelerator memory.
    pub fn touches_device(&self) -> bool {
        !matches!(self, CopyDirection::HostToHost)
    }
}

impl std::fmt::Display for CopyDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CopyDirection::HostToHost => "host-to-host",
            CopyDirection::HostToDevice => "host-to-device",
            CopyDirection::DeviceToHost => "device-to-host",
            CopyDirection::DeviceToDevice => "device-to-device",
        };
        f.write_str(name)
    }
}

/// Backend trait defining core device operations.
///
/// This trait abstracts device-specific operations like memory allocation,
/// copying, filling and synchronization. Each device implements it once.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync` to allow safe usage across threads.
pub trait Backend: Send + Sync + 'static {
    /// Returns the device type for this backend.
    fn device(&self) -> Device;

    /// Returns a short name used in logs and errors.
    fn name(&self) -> &'static str;

    /// Allocates `bytes` bytes of device memory.
    ///
    /// # Errors
    ///
    /// Returns an error if allocation fails.
    fn allocate(&self, bytes: usize) -> Result<*mut u8, TensorAllocatorError>;

    /// Deallocates memory on the device.
    ///
    /// # Safety
    ///
    /// The caller must ensure that:
    /// - `ptr` was allocated by this backend with the same `bytes`
    /// - `ptr` is not used after deallocation
    unsafe fn free(&self, ptr: *mut u8, bytes: usize);

    /// Copies `bytes` bytes from `src` to `dst`.
    ///
    /// # Safety
    ///
    /// The caller must ensure that:
    /// - `src` is valid for reads of `bytes` bytes in the memory space implied by `direction`
    /// - `dst` is valid for writes of `bytes` bytes in the memory space implied by `direction`
    unsafe fn copy(
        &self,
        dst: *mut u8,
        src: *const u8,
        bytes: usize,
        direction: CopyDirection,
    ) -> Result<(), TensorAllocatorError>;

    /// Writes `count` copies of `value` starting at `ptr`.
    ///
    /// # Safety
    ///
    /// `ptr` must be valid for writes of `count` `f32` values and aligned for `f32`.
    unsafe fn fill(&self, ptr: *mut u8, value: f32, count: usize)
        -> Result<(), TensorAllocatorError>;

    /// Zeroes `bytes` bytes starting at `ptr`.
    ///
    /// # Safety
    ///
    /// `ptr` must be valid for writes of `bytes` bytes.
    unsafe fn memset_zero(&self, ptr: *mut u8, bytes: usize) -> Result<(), TensorAllocatorError>;

    /// Synchronizes device operations.
    ///
    /// This ensures all pending operations on the device have completed.
    /// For CPU, this is a no-op since operations are synchronous.
    fn synchronize(&self) -> Result<(), TensorAllocatorError> {
        Ok(())
    }
}

/// CPU backend implementation.
///
/// This backend performs all operations on the CPU through a pluggable
/// [`TensorAllocator`], which lets tests count allocations.
#[derive(Clone)]
pub struct CpuBackend {
    allocator: Arc<dyn TensorAllocator>,
}

impl CpuBackend {
    /// Creates a new CPU backend backed by the system allocator.
    pub fn new() -> Self {
        Self {
            allocator: Arc::new(CpuAllocator),
        }
    }

    /// Creates a CPU backend that allocates through `allocator`.
    pub fn with_allocator(allocator: Arc<dyn TensorAllocator>) -> Self {
        Self { allocator }
    }

    fn layout(bytes: usize) -> Result<Layout, TensorAllocatorError> {
        Layout::from_size_align(bytes, BUFFER_ALIGN).map_err(TensorAllocatorError::LayoutError)
    }
}

impl Default for CpuBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CpuBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CpuBackend").finish_non_exhaustive()
    }
}

impl Backend for CpuBackend {
    fn device(&self) -> Device {
        Device::Cpu
    }

    fn name(&self) -> &'static str {
        "cpu"
    }

    fn allocate(&self, bytes: usize) -> Result<*mut u8, TensorAllocatorError> {
        self.allocator.alloc(Self::layout(bytes)?)
    }

    unsafe fn free(&self, ptr: *mut u8, bytes: usize) {
        if let Ok(layout) = Self::layout(bytes) {
            self.allocator.dealloc(ptr, layout);
        }
    }

    unsafe fn copy(
        &self,
        dst: *mut u8,
        src: *const u8,
        bytes: usize,
        direction: CopyDirection,
    ) -> Result<(), TensorAllocatorError> {
        if direction.touches_device() {
            return Err(TensorAllocatorError::InvalidCopyDirection {
                backend: self.name(),
                direction: direction.to_string(),
            });
        }
        // NOTE: std::ptr::copy tolerates overlap, views may alias the same buffer
        std::ptr::copy(src, dst, bytes);
        Ok(())
    }

    unsafe fn fill(
        &self,
        ptr: *mut u8,
        value: f32,
        count: usize,
    ) -> Result<(), TensorAllocatorError> {
        let data = std::slice::from_raw_parts_mut(ptr as *mut f32, count);
        data.fill(value);
        Ok(())
    }

    unsafe fn memset_zero(&self, ptr: *mut u8, bytes: usize) -> Result<(), TensorAllocatorError> {
        std::ptr::write_bytes(ptr, 0, bytes);
        Ok(())
    }
}

static CPU_BACKEND: OnceLock<Arc<CpuBackend>> = OnceLock::new();

/// Returns the process-wide CPU backend using the system allocator.
pub fn cpu_backend() -> Arc<dyn Backend> {
    CPU_BACKEND.get_or_init(|| Arc::new(CpuBackend::new())).clone()
}

/// Returns the backend serving `device`.
///
/// # Errors
///
/// Returns [`TensorError::DeviceUnavailable`] for GPU devices when the crate
/// was built without the `cuda` feature or the driver cannot open the device.
pub fn backend_for(device: Device) -> Result<Arc<dyn Backend>, TensorError> {
    match device {
        Device::Cpu => Ok(cpu_backend()),
        #[cfg(feature = "cuda")]
        Device::Gpu { device_id } => {
            let backend: Arc<dyn Backend> = crate::cuda::CudaBackend::shared(device_id)?;
            Ok(backend)
        }
        #[cfg(not(feature = "cuda"))]
        Device::Gpu { .. } => Err(TensorError::DeviceUnavailable {
            device,
            reason: "built without the `cuda` feature".to_string(),
        }),
    }
}

/// Returns true if a backend for `device` can be created.
pub fn is_available(device: Device) -> bool {
    backend_for(device).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpu_backend_alloc_free() -> Result<(), TensorAllocatorError> {
        let backend = CpuBackend::new();
        let ptr = backend.allocate(1024)?;
        assert!(!ptr.is_null());
        unsafe { backend.free(ptr, 1024) };
        Ok(())
    }

    #[test]
    fn test_cpu_backend_copy() -> Result<(), TensorAllocatorError> {
        let backend = CpuBackend::new();
        let src = vec![1u8, 2, 3, 4, 5];
        let mut dst = vec![0u8; 5];
        unsafe {
            backend.copy(dst.as_mut_ptr(), src.as_ptr(), 5, CopyDirection::HostToHost)?;
        }
        assert_eq!(dst, src);
        Ok(())
    }

    #[test]
    fn test_cpu_backend_rejects_device_copy() {
        let backend = CpuBackend::new();
        let src = vec![1u8; 4];
        let mut dst = vec![0u8; 4];
        let res = unsafe {
            backend.copy(dst.as_mut_ptr(), src.as_ptr(), 4, CopyDirection::HostToDevice)
        };
        assert!(matches!(
            res,
            Err(TensorAllocatorError::InvalidCopyDirection { .. })
        ));
    }

    #[test]
    fn test_cpu_backend_fill_and_zero() -> Result<(), TensorAllocatorError> {
        let backend = CpuBackend::new();
        let mut data = vec![0.0f32; 4];
        unsafe {
            backend.fill(data.as_mut_ptr() as *mut u8, 2.5, 4)?;
        }
        assert_eq!(data, vec![2.5; 4]);
        unsafe {
            backend.memset_zero(data.as_mut_ptr() as *mut u8, 8)?;
        }
        assert_eq!(data, vec![0.0, 0.0, 2.5, 2.5]);
        Ok(())
    }

    #[test]
    fn test_copy_direction() {
        let gpu = Device::gpu(0);
        assert_eq!(
            CopyDirection::between(Device::Cpu, Device::Cpu),
            CopyDirection::HostToHost
        );
        assert_eq!(
            CopyDirection::between(Device::Cpu, gpu),
            CopyDirection::HostToDevice
        );
        assert_eq!(
            CopyDirection::between(gpu, Device::Cpu),
            CopyDirection::DeviceToHost
        );
        assert_eq!(CopyDirection::between(gpu, gpu), CopyDirection::DeviceToDevice);
        assert!(!CopyDirection::HostToHost.touches_device());
    }

    #[cfg(not(feature = "cuda"))]
    #[test]
    fn test_gpu_unavailable_without_feature() {
        let res = backend_for(Device::gpu(0));
        assert!(matches!(res, Err(TensorError::DeviceUnavailable { .. })));
        assert!(!is_available(Device::gpu(0)));
        assert!(is_available(Device::Cpu));
    }

    #[test]
    fn test_backend_trait_object() {
        let backends: Vec<Arc<dyn Backend>> = vec![cpu_backend(), Arc::new(CpuBackend::new())];
        for backend in backends {
            assert!(backend.synchronize().is_ok());
            assert_eq!(backend.device(), Device::Cpu);
        }
    }
}
