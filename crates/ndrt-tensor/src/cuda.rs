//! CUDA backend built on the `cudarc` driver API and NVRTC.
//!
//! One [`CudaBackend`] exists per GPU ordinal and is cached for the lifetime
//! of the process. Buffers are raw device allocations; kernels are compiled
//! from CUDA C at first use and cached per module.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, OnceLock};

use cudarc::driver::{result, sys, CudaDevice, CudaFunction, DriverError, LaunchAsync, LaunchConfig};
use parking_lot::Mutex;

use crate::{
    allocator::{TensorAllocatorError, BUFFER_ALIGN},
    backend::{Backend, CopyDirection},
    device::Device,
    error::TensorError,
};

/// Threads per block for 1-D launches.
pub const BLOCK_SIZE: usize = 256;

const FILL_MODULE: &str = "ndrt_fill";
const FILL_SOURCE: &str = r#"
extern "C" __global__ void ndrt_fill(float* out, float value, unsigned long long n) {
    unsigned long long i = (unsigned long long)blockIdx.x * blockDim.x + threadIdx.x;
    if (i < n) {
        out[i] = value;
    }
}
"#;

static BACKENDS: OnceLock<Mutex<HashMap<usize, Arc<CudaBackend>>>> = OnceLock::new();

fn backends() -> &'static Mutex<HashMap<usize, Arc<CudaBackend>>> {
    BACKENDS.get_or_init(|| Mutex::new(HashMap::new()))
}

fn driver_error(context: &str, err: DriverError) -> TensorAllocatorError {
    TensorAllocatorError::DeviceError(format!("{}: {}", context, err))
}

/// Computes a 1-D launch configuration covering `n` threads.
pub fn grid_1d(n: usize, block_size: usize) -> LaunchConfig {
    let grid = n.div_ceil(block_size).max(1);
    LaunchConfig {
        grid_dim: (grid as u32, 1, 1),
        block_dim: (block_size as u32, 1, 1),
        shared_mem_bytes: 0,
    }
}

/// Backend serving one CUDA device.
pub struct CudaBackend {
    device_id: usize,
    dev: Arc<CudaDevice>,
    modules: Mutex<HashSet<&'static str>>,
}

impl CudaBackend {
    /// Returns the cached backend for GPU `device_id`, opening it on first use.
    ///
    /// # Errors
    ///
    /// Returns [`TensorError::DeviceUnavailable`] if the driver cannot open
    /// the device.
    pub fn shared(device_id: usize) -> Result<Arc<CudaBackend>, TensorError> {
        let mut map = backends().lock();
        if let Some(backend) = map.get(&device_id) {
            return Ok(Arc::clone(backend));
        }
        let dev = CudaDevice::new(device_id).map_err(|e| TensorError::DeviceUnavailable {
            device: Device::gpu(device_id),
            reason: e.to_string(),
        })?;
        log::info!("opened CUDA device {}", device_id);
        let backend = Arc::new(CudaBackend {
            device_id,
            dev,
            modules: Mutex::new(HashSet::new()),
        });
        map.insert(device_id, Arc::clone(&backend));
        Ok(backend)
    }

    /// Returns the GPU ordinal.
    pub fn device_id(&self) -> usize {
        self.device_id
    }

    /// Returns the underlying driver handle.
    pub fn cuda_device(&self) -> &Arc<CudaDevice> {
        &self.dev
    }

    /// Makes this device's context current on the calling thread.
    pub fn bind_to_thread(&self) -> Result<(), TensorAllocatorError> {
        self.dev
            .bind_to_thread()
            .map_err(|e| driver_error("bind context", e))
    }

    /// Returns kernel `func` of `module`, compiling `source` with NVRTC the
    /// first time the module is requested.
    pub fn load_kernel(
        &self,
        module: &'static str,
        funcs: &[&'static str],
        func: &str,
        source: &str,
    ) -> Result<CudaFunction, TensorAllocatorError> {
        {
            let mut loaded = self.modules.lock();
            if !loaded.contains(module) {
                let ptx = cudarc::nvrtc::compile_ptx(source).map_err(|e| {
                    TensorAllocatorError::DeviceError(format!("compile {}: {}", module, e))
                })?;
                self.dev
                    .load_ptx(ptx, module, funcs)
                    .map_err(|e| driver_error(module, e))?;
                log::debug!("loaded CUDA module {} on gpu:{}", module, self.device_id);
                loaded.insert(module);
            }
        }
        self.dev.get_func(module, func).ok_or_else(|| {
            TensorAllocatorError::DeviceError(format!("kernel {}::{} not found", module, func))
        })
    }
}

impl std::fmt::Debug for CudaBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CudaBackend")
            .field("device_id", &self.device_id)
            .finish_non_exhaustive()
    }
}

impl Backend for CudaBackend {
    fn device(&self) -> Device {
        Device::gpu(self.device_id)
    }

    fn name(&self) -> &'static str {
        "cuda"
    }

    fn allocate(&self, bytes: usize) -> Result<*mut u8, TensorAllocatorError> {
        if bytes == 0 {
            return Ok(BUFFER_ALIGN as *mut u8);
        }
        self.bind_to_thread()?;
        // SAFETY: the context is bound and the size is non-zero
        let ptr = unsafe { result::malloc_sync(bytes) }.map_err(|e| {
            if e.0 == sys::CUresult::CUDA_ERROR_OUT_OF_MEMORY {
                TensorAllocatorError::OutOfMemory {
                    requested: bytes,
                    device: self.device().to_string(),
                }
            } else {
                driver_error("malloc", e)
            }
        })?;
        Ok(ptr as *mut u8)
    }

    unsafe fn free(&self, ptr: *mut u8, bytes: usize) {
        if bytes == 0 {
            return;
        }
        if self.bind_to_thread().is_err() {
            log::error!("cannot bind gpu:{} to free {} bytes", self.device_id, bytes);
            return;
        }
        if let Err(e) = result::free_sync(ptr as sys::CUdeviceptr) {
            log::error!("failed to free {} bytes on gpu:{}: {}", bytes, self.device_id, e);
        }
    }

    unsafe fn copy(
        &self,
        dst: *mut u8,
        src: *const u8,
        bytes: usize,
        direction: CopyDirection,
    ) -> Result<(), TensorAllocatorError> {
        if bytes == 0 {
            return Ok(());
        }
        self.bind_to_thread()?;
        // transfers run on the legacy stream, kernels on the device stream
        self.synchronize()?;
        match direction {
            CopyDirection::HostToDevice => {
                let host = std::slice::from_raw_parts(src, bytes);
                result::memcpy_htod_sync(dst as sys::CUdeviceptr, host)
                    .map_err(|e| driver_error("memcpy htod", e))
            }
            CopyDirection::DeviceToHost => {
                let host = std::slice::from_raw_parts_mut(dst, bytes);
                result::memcpy_dtoh_sync(host, src as sys::CUdeviceptr)
                    .map_err(|e| driver_error("memcpy dtoh", e))
            }
            CopyDirection::DeviceToDevice => result::memcpy_dtod_sync(
                dst as sys::CUdeviceptr,
                src as sys::CUdeviceptr,
                bytes,
            )
            .map_err(|e| driver_error("memcpy dtod", e)),
            CopyDirection::HostToHost => Err(TensorAllocatorError::InvalidCopyDirection {
                backend: self.name(),
                direction: direction.to_string(),
            }),
        }
    }

    unsafe fn fill(
        &self,
        ptr: *mut u8,
        value: f32,
        count: usize,
    ) -> Result<(), TensorAllocatorError> {
        if count == 0 {
            return Ok(());
        }
        self.bind_to_thread()?;
        let func = self.load_kernel(FILL_MODULE, &["ndrt_fill"], "ndrt_fill", FILL_SOURCE)?;
        func.launch(
            grid_1d(count, BLOCK_SIZE),
            (ptr as sys::CUdeviceptr, value, count as u64),
        )
        .map_err(|e| driver_error("launch ndrt_fill", e))
    }

    unsafe fn memset_zero(&self, ptr: *mut u8, bytes: usize) -> Result<(), TensorAllocatorError> {
        if bytes == 0 {
            return Ok(());
        }
        self.bind_to_thread()?;
        self.synchronize()?;
        result::memset_d8_sync(ptr as sys::CUdeviceptr, 0, bytes)
            .map_err(|e| driver_error("memset", e))
    }

    fn synchronize(&self) -> Result<(), TensorAllocatorError> {
        self.dev
            .synchronize()
            .map_err(|e| driver_error("synchronize", e))
    }
}
