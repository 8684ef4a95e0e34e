use ndrt_tensor::{layout::StridedIter, Tensor};

use super::{check_output, KernelTable};
use crate::{
    elementwise::{BinaryOp, UnaryOp},
    error::TensorOpsError,
    reduce::{reduce_lane, ReduceOp, ReducePlan},
};

pub(super) static CPU_KERNELS: KernelTable = KernelTable {
    name: "cpu",
    unary,
    binary,
    reduce,
};

#[inline]
unsafe fn read(base: *const u8, offset: usize) -> f32 {
    (base.add(offset) as *const f32).read()
}

#[inline]
unsafe fn write(base: *mut u8, offset: usize, value: f32) {
    (base.add(offset) as *mut f32).write(value)
}

fn unary(op: UnaryOp, a: &Tensor, out: &mut Tensor) -> Result<(), TensorOpsError> {
    check_output(out, a.shape())?;
    let src = a.host_ptr()?;
    out.host_ptr()?;
    let dst = out.data_mut_ptr();
    let offsets = StridedIter::new(a.shape(), [a.strides().to_vec(), out.strides().to_vec()]);
    for [ia, io] in offsets {
        // SAFETY: both tensors are on the host and the traversal stays within their extents
        unsafe { write(dst, io, op.apply(read(src, ia))) };
    }
    Ok(())
}

fn binary(
    op: BinaryOp,
    a: &Tensor,
    a_strides: &[usize],
    b: &Tensor,
    b_strides: &[usize],
    out: &mut Tensor,
) -> Result<(), TensorOpsError> {
    let pa = a.host_ptr()?;
    let pb = b.host_ptr()?;
    out.host_ptr()?;
    let dst = out.data_mut_ptr();
    let shape = out.shape().to_vec();
    let offsets = StridedIter::new(
        &shape,
        [
            a_strides.to_vec(),
            b_strides.to_vec(),
            out.strides().to_vec(),
        ],
    );
    for [ia, ib, io] in offsets {
        // SAFETY: broadcast strides keep every operand offset inside its extent
        unsafe { write(dst, io, op.apply(read(pa, ia), read(pb, ib))) };
    }
    Ok(())
}

fn reduce(
    op: ReduceOp,
    t: &Tensor,
    plan: &ReducePlan,
    out: &mut Tensor,
) -> Result<(), TensorOpsError> {
    check_output(out, &plan.outer_shape)?;
    let src = t.host_ptr()?;
    out.host_ptr()?;
    let dst = out.data_mut_ptr();
    let outer = StridedIter::new(
        &plan.outer_shape,
        [plan.outer_strides.clone(), out.strides().to_vec()],
    );
    let mut lane = Vec::with_capacity(plan.lane_len());
    for [base, io] in outer {
        lane.clear();
        lane.extend(
            StridedIter::new(&plan.lane_shape, [plan.lane_strides.clone()])
                // SAFETY: lane offsets stay within the input extent
                .map(|[offset]| unsafe { read(src, base + offset) }),
        );
        let value = reduce_lane(op, &mut lane);
        // SAFETY: one output element per outer position
        unsafe { write(dst, io, value) };
    }
    Ok(())
}
