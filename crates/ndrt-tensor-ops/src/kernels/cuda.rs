//! CUDA kernels compiled with NVRTC.
//!
//! Each launch runs one thread per output element over the flattened output
//! index. Shapes and element strides travel in a small metadata buffer so
//! strided and broadcast operands are read in place.

use std::sync::Arc;

use cudarc::driver::{DriverError, LaunchAsync};
use ndrt_tensor::{
    cuda::{grid_1d, BLOCK_SIZE},
    CudaBackend, DType, Device, Tensor, TensorAllocatorError, TensorError,
};

use super::{check_output, cpu::CPU_KERNELS, element_strides, KernelTable};
use crate::{
    elementwise::{BinaryOp, UnaryOp},
    error::TensorOpsError,
    reduce::{ReduceOp, ReducePlan},
};

pub(super) static CUDA_KERNELS: KernelTable = KernelTable {
    name: "cuda",
    unary,
    binary,
    reduce,
};

const MODULE: &str = "ndrt_ops";
const FUNCS: &[&str] = &["ndrt_unary", "ndrt_binary", "ndrt_reduce"];

const SOURCE: &str = r#"
typedef unsigned long long u64;

__device__ float ndrt_unary_apply(unsigned int op, float x, float p0, float p1) {
    switch (op) {
    case 0: return -x;
    case 1: return x;
    case 2: return 1.0f / x;
    case 3: return fabsf(x);
    case 4: return x > 0.0f ? 1.0f : (x < 0.0f ? -1.0f : x);
    case 5: return sqrtf(x);
    case 6: return x * x;
    case 7: return expf(x);
    case 8: return exp2f(x);
    case 9: return expm1f(x);
    case 10: return logf(x);
    case 11: return log1pf(x);
    case 12: return log2f(x);
    case 13: return log10f(x);
    case 14:
        if (isnan(x) || isinf(x)) return fabsf(x);
        if (x == 0.0f) return -INFINITY;
        return floorf(log2f(fabsf(x)));
    case 15: return sinf(x);
    case 16: return cosf(x);
    case 17: return tanf(x);
    case 18: return asinf(x);
    case 19: return acosf(x);
    case 20: return atanf(x);
    case 21: return sinhf(x);
    case 22: return coshf(x);
    case 23: return tanhf(x);
    case 24: return asinhf(x);
    case 25: return acoshf(x);
    case 26: return atanhf(x);
    case 27: {
        if (x == 0.0f) return 1.0f;
        float px = 3.14159265358979f * x;
        return sinf(px) / px;
    }
    case 28: return x * 57.2957795130823f;
    case 29: return x * 0.0174532925199433f;
    case 30: return ceilf(x);
    case 31: return floorf(x);
    case 32: return roundf(x);
    case 33: return rintf(x);
    case 34: return truncf(x);
    case 35: return isnan(x) ? x : fminf(fmaxf(x, p0), p1);
    }
    return x;
}

__device__ float ndrt_binary_apply(unsigned int op, float a, float b) {
    switch (op) {
    case 0: return a + b;
    case 1: return a - b;
    case 2: return a * b;
    case 3: return a / b;
    case 4: return fmodf(a, b);
    case 5: return powf(a, b);
    case 6: return a == b ? 1.0f : 0.0f;
    case 7: return a != b ? 1.0f : 0.0f;
    case 8: return a > b ? 1.0f : 0.0f;
    case 9: return a >= b ? 1.0f : 0.0f;
    case 10: return a < b ? 1.0f : 0.0f;
    case 11: return a <= b ? 1.0f : 0.0f;
    case 12: return (isnan(a) || isnan(b)) ? NAN : fminf(a, b);
    case 13: return (isnan(a) || isnan(b)) ? NAN : fmaxf(a, b);
    }
    return a;
}

extern "C" __global__ void ndrt_unary(
    const float* a, float* out, u64 n, unsigned int ndim, const u64* meta,
    unsigned int op, float p0, float p1) {
    u64 i = (u64)blockIdx.x * blockDim.x + threadIdx.x;
    if (i >= n) return;
    u64 rem = i, oa = 0, oo = 0;
    for (int d = (int)ndim - 1; d >= 0; --d) {
        u64 idx = rem % meta[d];
        rem /= meta[d];
        oa += idx * meta[ndim + d];
        oo += idx * meta[2 * ndim + d];
    }
    out[oo] = ndrt_unary_apply(op, a[oa], p0, p1);
}

extern "C" __global__ void ndrt_binary(
    const float* a, const float* b, float* out, u64 n, unsigned int ndim,
    const u64* meta, unsigned int op) {
    u64 i = (u64)blockIdx.x * blockDim.x + threadIdx.x;
    if (i >= n) return;
    u64 rem = i, oa = 0, ob = 0, oo = 0;
    for (int d = (int)ndim - 1; d >= 0; --d) {
        u64 idx = rem % meta[d];
        rem /= meta[d];
        oa += idx * meta[ndim + d];
        ob += idx * meta[2 * ndim + d];
        oo += idx * meta[3 * ndim + d];
    }
    out[oo] = ndrt_binary_apply(op, a[oa], b[ob]);
}

__device__ u64 ndrt_lane_offset(u64 k, unsigned int nl, const u64* shape, const u64* strides) {
    u64 off = 0;
    for (int d = (int)nl - 1; d >= 0; --d) {
        off += (k % shape[d]) * strides[d];
        k /= shape[d];
    }
    return off;
}

extern "C" __global__ void ndrt_reduce(
    const float* in, float* out, u64 outer_n, unsigned int no, u64 lane_n,
    unsigned int nl, const u64* meta, unsigned int op) {
    u64 j = (u64)blockIdx.x * blockDim.x + threadIdx.x;
    if (j >= outer_n) return;
    const u64* outer_shape = meta;
    const u64* outer_strides = meta + no;
    const u64* out_strides = meta + 2 * no;
    const u64* lane_shape = meta + 3 * no;
    const u64* lane_strides = meta + 3 * no + nl;

    u64 rem = j, base = 0, oo = 0;
    for (int d = (int)no - 1; d >= 0; --d) {
        u64 idx = rem % outer_shape[d];
        rem /= outer_shape[d];
        base += idx * outer_strides[d];
        oo += idx * out_strides[d];
    }
    const float* lane = in + base;

    float acc;
    if (op == 1) {
        acc = 1.0f;
        for (u64 k = 0; k < lane_n; ++k) acc *= lane[ndrt_lane_offset(k, nl, lane_shape, lane_strides)];
    } else if (op == 2 || op == 3 || op == 7 || op == 8) {
        bool smaller = op == 2 || op == 7;
        float best = NAN;
        u64 best_k = 0;
        for (u64 k = 0; k < lane_n; ++k) {
            float x = lane[ndrt_lane_offset(k, nl, lane_shape, lane_strides)];
            if (isnan(x)) { best = x; best_k = k; break; }
            if (k == 0 || (smaller ? x < best : x > best)) { best = x; best_k = k; }
        }
        acc = (op == 7 || op == 8) ? (float)best_k : best;
    } else {
        acc = 0.0f;
        for (u64 k = 0; k < lane_n; ++k) acc += lane[ndrt_lane_offset(k, nl, lane_shape, lane_strides)];
        if (op >= 4) {
            float mean = acc / (float)lane_n;
            acc = mean;
            if (op == 5 || op == 6) {
                float sq = 0.0f;
                for (u64 k = 0; k < lane_n; ++k) {
                    float dx = lane[ndrt_lane_offset(k, nl, lane_shape, lane_strides)] - mean;
                    sq += dx * dx;
                }
                acc = sq / (float)lane_n;
                if (op == 6) acc = sqrtf(acc);
            }
        }
    }
    out[oo] = acc;
}
"#;

fn launch_error(name: &str, err: DriverError) -> TensorOpsError {
    TensorAllocatorError::DeviceError(format!("launch {}: {}", name, err)).into()
}

fn backend_of(t: &Tensor) -> Result<Arc<CudaBackend>, TensorOpsError> {
    match t.device() {
        Device::Gpu { device_id } => Ok(CudaBackend::shared(device_id)?),
        device => Err(TensorError::unsupported_operation(
            "cuda kernel",
            format!("tensor is on {}", device),
        )
        .into()),
    }
}

// shape followed by one stride set per operand, never empty
fn metadata(shape: &[usize], strides: &[&[usize]]) -> Vec<u64> {
    let mut meta: Vec<u64> = shape.iter().map(|&d| d as u64).collect();
    for s in strides {
        meta.extend(element_strides(s));
    }
    if meta.is_empty() {
        meta.push(0);
    }
    meta
}

fn unary(op: UnaryOp, a: &Tensor, out: &mut Tensor) -> Result<(), TensorOpsError> {
    check_output(out, a.shape())?;
    let n = a.numel();
    if n == 0 {
        return Ok(());
    }
    let backend = backend_of(a)?;
    backend.bind_to_thread()?;
    let func = backend.load_kernel(MODULE, FUNCS, "ndrt_unary", SOURCE)?;
    let meta = backend
        .cuda_device()
        .htod_copy(metadata(a.shape(), &[a.strides(), out.strides()]))
        .map_err(|e| launch_error("ndrt_unary", e))?;
    let (p0, p1) = op.params();
    let params = (
        a.data_ptr() as u64,
        out.data_mut_ptr() as u64,
        n as u64,
        a.ndim() as u32,
        &meta,
        op.code(),
        p0,
        p1,
    );
    // SAFETY: the pointers are device addresses and the metadata describes their extents
    unsafe { func.launch(grid_1d(n, BLOCK_SIZE), params) }
        .map_err(|e| launch_error("ndrt_unary", e))
}

fn binary(
    op: BinaryOp,
    a: &Tensor,
    a_strides: &[usize],
    b: &Tensor,
    b_strides: &[usize],
    out: &mut Tensor,
) -> Result<(), TensorOpsError> {
    let n = out.numel();
    if n == 0 {
        return Ok(());
    }
    let backend = backend_of(out)?;
    backend.bind_to_thread()?;
    let func = backend.load_kernel(MODULE, FUNCS, "ndrt_binary", SOURCE)?;
    let meta = backend
        .cuda_device()
        .htod_copy(metadata(out.shape(), &[a_strides, b_strides, out.strides()]))
        .map_err(|e| launch_error("ndrt_binary", e))?;
    let params = (
        a.data_ptr() as u64,
        b.data_ptr() as u64,
        out.data_mut_ptr() as u64,
        n as u64,
        out.ndim() as u32,
        &meta,
        op.code(),
    );
    // SAFETY: broadcast strides keep every read inside the operand extents
    unsafe { func.launch(grid_1d(n, BLOCK_SIZE), params) }
        .map_err(|e| launch_error("ndrt_binary", e))
}

fn reduce(
    op: ReduceOp,
    t: &Tensor,
    plan: &ReducePlan,
    out: &mut Tensor,
) -> Result<(), TensorOpsError> {
    check_output(out, &plan.outer_shape)?;
    if op.needs_sort() {
        return reduce_on_host(op, t, plan, out);
    }
    let outer_n = plan.outer_len();
    if outer_n == 0 {
        return Ok(());
    }
    let backend = backend_of(t)?;
    backend.bind_to_thread()?;
    let func = backend.load_kernel(MODULE, FUNCS, "ndrt_reduce", SOURCE)?;
    let mut meta: Vec<u64> = plan.outer_shape.iter().map(|&d| d as u64).collect();
    meta.extend(element_strides(&plan.outer_strides));
    meta.extend(element_strides(out.strides()));
    meta.extend(plan.lane_shape.iter().map(|&d| d as u64));
    meta.extend(element_strides(&plan.lane_strides));
    if meta.is_empty() {
        meta.push(0);
    }
    let meta = backend
        .cuda_device()
        .htod_copy(meta)
        .map_err(|e| launch_error("ndrt_reduce", e))?;
    let params = (
        t.data_ptr() as u64,
        out.data_mut_ptr() as u64,
        outer_n as u64,
        plan.outer_shape.len() as u32,
        plan.lane_len() as u64,
        plan.lane_shape.len() as u32,
        &meta,
        op.code(),
    );
    // SAFETY: the plan was built from `t` and `out` has one element per outer position
    unsafe { func.launch(grid_1d(outer_n, BLOCK_SIZE), params) }
        .map_err(|e| launch_error("ndrt_reduce", e))
}

// sorting reductions stage the input on the host and upload the result
fn reduce_on_host(
    op: ReduceOp,
    t: &Tensor,
    plan: &ReducePlan,
    out: &mut Tensor,
) -> Result<(), TensorOpsError> {
    log::debug!("{} on {} staged through the host", op.name(), t.device());
    let host = t.to_device(Device::Cpu)?;
    let host_plan = ReducePlan::new(&host, plan.axis)?;
    let mut host_out = Tensor::create(&host_plan.outer_shape, DType::Float32, Device::Cpu)?;
    (CPU_KERNELS.reduce)(op, &host, &host_plan, &mut host_out)?;
    out.assign(&host_out)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{add, reduce::argmax, reduce::median, reduce::sum};

    fn gpu() -> Option<Device> {
        CudaBackend::shared(0).ok().map(|_| Device::gpu(0))
    }

    #[test]
    fn metadata_layout() {
        let strides: [&[usize]; 2] = [&[12, 4], &[0, 4]];
        assert_eq!(metadata(&[2, 3], &strides), vec![2, 3, 3, 1, 0, 1]);
        let none: [&[usize]; 1] = [&[]];
        assert_eq!(metadata(&[], &none), vec![0]);
    }

    #[test]
    fn gpu_matches_cpu() -> Result<(), TensorOpsError> {
        let Some(gpu) = gpu() else {
            return Ok(());
        };
        let a = Tensor::from_vec(&[2, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0])?;
        let b = Tensor::from_vec(&[3], vec![10.0, 20.0, 30.0])?;
        let c = add(&a.to_device(gpu)?, &b.to_device(gpu)?)?;
        assert_eq!(c.device(), gpu);
        assert_eq!(c.to_vec()?, vec![11.0, 22.0, 33.0, 14.0, 25.0, 36.0]);

        let g = a.to_device(gpu)?;
        assert_eq!(sum(&g, None)?.as_scalar()?, 21.0);
        assert_eq!(argmax(&g.transpose(), None)?.as_scalar()?, 5.0);
        assert_eq!(median(&g, None)?.as_scalar()?, 3.5);
        Ok(())
    }
}
