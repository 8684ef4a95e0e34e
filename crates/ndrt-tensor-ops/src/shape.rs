use std::sync::Arc;

use ndrt_tensor::{DType, Tensor, TensorError};

use crate::{broadcast::check_same_device, elementwise::copy_into, error::TensorOpsError};

/// Joins tensors along an existing axis.
///
/// All inputs must have the same rank and agree on every other dimension.
/// The result is a new contiguous tensor on the device of the inputs.
///
/// # Errors
///
/// - [`TensorOpsError::InvalidArgument`] if `tensors` is empty
/// - [`TensorOpsError::DimOutOfBounds`] if `axis` is not a dimension
/// - [`TensorError::Shape`] if the shapes do not line up
pub fn concatenate(tensors: &[&Tensor], axis: usize) -> Result<Tensor, TensorOpsError> {
    let Some(first) = tensors.first() else {
        return Err(TensorOpsError::InvalidArgument(
            "need at least one tensor to concatenate".to_string(),
        ));
    };
    if first.ndim() == 0 {
        return Err(TensorError::Shape("cannot concatenate 0-d tensors".to_string()).into());
    }
    if axis >= first.ndim() {
        return Err(TensorOpsError::DimOutOfBounds(axis, first.ndim()));
    }
    check_same_device(tensors)?;

    let mut shape = first.shape().to_vec();
    shape[axis] = 0;
    for t in tensors {
        let compatible = t.ndim() == first.ndim()
            && t
                .shape()
                .iter()
                .zip(first.shape())
                .enumerate()
                .all(|(d, (a, b))| d == axis || a == b);
        if !compatible {
            return Err(TensorError::Shape(format!(
                "cannot concatenate shapes {:?} and {:?} along axis {}",
                first.shape(),
                t.shape(),
                axis
            ))
            .into());
        }
        shape[axis] += t.shape()[axis];
    }

    let out = Tensor::create_in(&shape, DType::Float32, Arc::clone(first.backend()))?;
    let stride = out.strides()[axis];
    let mut start = 0;
    for t in tensors {
        let len = t.shape()[axis];
        if len > 0 && t.numel() > 0 {
            let mut part = out.view(start * stride, t.shape(), out.strides())?;
            copy_into(t, &mut part)?;
        }
        start += len;
    }
    Ok(out)
}

/// Joins tensors of identical shape along a new axis.
pub fn stack(tensors: &[&Tensor], axis: usize) -> Result<Tensor, TensorOpsError> {
    let Some(first) = tensors.first() else {
        return Err(TensorOpsError::InvalidArgument(
            "need at least one tensor to stack".to_string(),
        ));
    };
    if axis > first.ndim() {
        return Err(TensorOpsError::DimOutOfBounds(axis, first.ndim() + 1));
    }
    if let Some(t) = tensors.iter().find(|t| t.shape() != first.shape()) {
        return Err(TensorError::Shape(format!(
            "cannot stack shapes {:?} and {:?}",
            first.shape(),
            t.shape()
        ))
        .into());
    }
    let expanded = tensors
        .iter()
        .map(|t| t.expand_dims(axis))
        .collect::<Result<Vec<_>, _>>()?;
    concatenate(&expanded.iter().collect::<Vec<_>>(), axis)
}

/// Stacks tensors row-wise, promoting them to at least two dimensions.
pub fn vstack(tensors: &[&Tensor]) -> Result<Tensor, TensorOpsError> {
    let promoted = tensors
        .iter()
        .map(|t| atleast_2d(t))
        .collect::<Result<Vec<_>, _>>()?;
    concatenate(&promoted.iter().collect::<Vec<_>>(), 0)
}

/// Stacks tensors column-wise. One-dimensional inputs are joined end to end.
pub fn hstack(tensors: &[&Tensor]) -> Result<Tensor, TensorOpsError> {
    let promoted = tensors
        .iter()
        .map(|t| atleast_1d(t))
        .collect::<Result<Vec<_>, _>>()?;
    let axis = if promoted.iter().all(|t| t.ndim() == 1) { 0 } else { 1 };
    concatenate(&promoted.iter().collect::<Vec<_>>(), axis)
}

/// Stacks tensors depth-wise along the third axis.
///
/// Inputs are promoted with [`atleast_3d`], so `[n]` joins as `[1, n, 1]` and
/// `[m, n]` as `[m, n, 1]`.
pub fn dstack(tensors: &[&Tensor]) -> Result<Tensor, TensorOpsError> {
    let promoted = tensors
        .iter()
        .map(|t| atleast_3d(t))
        .collect::<Result<Vec<_>, _>>()?;
    concatenate(&promoted.iter().collect::<Vec<_>>(), 2)
}

/// Stacks 1-D tensors as the columns of a 2-D tensor.
///
/// `[n]` inputs become `[n, 1]` columns; 2-D inputs are joined as they are.
pub fn column_stack(tensors: &[&Tensor]) -> Result<Tensor, TensorOpsError> {
    let columns = tensors
        .iter()
        .map(|t| match t.ndim() {
            0 => t.expand_dims(0)?.expand_dims(1),
            1 => t.expand_dims(1),
            _ => Ok((*t).clone()),
        })
        .collect::<Result<Vec<_>, _>>()?;
    concatenate(&columns.iter().collect::<Vec<_>>(), 1)
}

/// Appends `values` to the end of `t`.
///
/// Without an axis both inputs are flattened and the result is 1-D. With an
/// axis this is [`concatenate`] of the two tensors.
pub fn append(t: &Tensor, values: &Tensor, axis: Option<usize>) -> Result<Tensor, TensorOpsError> {
    match axis {
        Some(axis) => concatenate(&[t, values], axis),
        None => concatenate(&[&t.flatten()?, &values.flatten()?], 0),
    }
}

/// Views a 0-d tensor as shape `[1]`; other tensors are returned as is.
pub fn atleast_1d(t: &Tensor) -> Result<Tensor, TensorOpsError> {
    match t.ndim() {
        0 => Ok(t.expand_dims(0)?),
        _ => Ok(t.clone()),
    }
}

/// Views a tensor with at least two dimensions; `[n]` becomes `[1, n]`.
pub fn atleast_2d(t: &Tensor) -> Result<Tensor, TensorOpsError> {
    match t.ndim() {
        0 => Ok(t.expand_dims(0)?.expand_dims(0)?),
        1 => Ok(t.expand_dims(0)?),
        _ => Ok(t.clone()),
    }
}

/// Views a tensor with at least three dimensions.
///
/// `[n]` becomes `[1, n, 1]` and `[m, n]` becomes `[m, n, 1]`.
pub fn atleast_3d(t: &Tensor) -> Result<Tensor, TensorOpsError> {
    match t.ndim() {
        0 => Ok(t.expand_dims(0)?.expand_dims(0)?.expand_dims(0)?),
        1 => Ok(t.expand_dims(0)?.expand_dims(2)?),
        2 => Ok(t.expand_dims(2)?),
        _ => Ok(t.clone()),
    }
}

#[cfg(test)]
mod tests {
    use ndrt_tensor::Device;

    use super::*;

    #[test]
    fn concatenate_rows_and_columns() -> Result<(), TensorOpsError> {
        let a = Tensor::from_vec(&[2, 2], vec![1.0, 2.0, 3.0, 4.0])?;
        let b = Tensor::from_vec(&[1, 2], vec![5.0, 6.0])?;
        let rows = concatenate(&[&a, &b], 0)?;
        assert_eq!(rows.shape(), &[3, 2]);
        assert_eq!(rows.to_vec()?, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);

        let cols = concatenate(&[&a, &b.transpose()], 1)?;
        assert_eq!(cols.shape(), &[2, 3]);
        assert_eq!(cols.to_vec()?, vec![1.0, 2.0, 5.0, 3.0, 4.0, 6.0]);
        Ok(())
    }

    #[test]
    fn concatenate_errors() -> Result<(), TensorOpsError> {
        let a = Tensor::zeros(&[2, 2], Device::Cpu)?;
        let b = Tensor::zeros(&[2, 3], Device::Cpu)?;
        assert!(matches!(
            concatenate(&[&a, &b], 0),
            Err(TensorOpsError::TensorError(TensorError::Shape(_)))
        ));
        assert_eq!(
            concatenate(&[&a], 2).err(),
            Some(TensorOpsError::DimOutOfBounds(2, 2))
        );
        assert!(matches!(
            concatenate(&[], 0),
            Err(TensorOpsError::InvalidArgument(_))
        ));
        Ok(())
    }

    #[test]
    fn concatenate_with_empty_part() -> Result<(), TensorOpsError> {
        let a = Tensor::from_vec(&[2], vec![1.0, 2.0])?;
        let e = Tensor::zeros(&[0], Device::Cpu)?;
        let out = concatenate(&[&a, &e, &a], 0)?;
        assert_eq!(out.to_vec()?, vec![1.0, 2.0, 1.0, 2.0]);
        Ok(())
    }

    #[test]
    fn stack_new_axis() -> Result<(), TensorOpsError> {
        let a = Tensor::from_vec(&[2], vec![1.0, 2.0])?;
        let b = Tensor::from_vec(&[2], vec![3.0, 4.0])?;
        let s0 = stack(&[&a, &b], 0)?;
        assert_eq!(s0.shape(), &[2, 2]);
        assert_eq!(s0.to_vec()?, vec![1.0, 2.0, 3.0, 4.0]);
        let s1 = stack(&[&a, &b], 1)?;
        assert_eq!(s1.to_vec()?, vec![1.0, 3.0, 2.0, 4.0]);
        let c = Tensor::zeros(&[3], Device::Cpu)?;
        assert!(stack(&[&a, &c], 0).is_err());
        Ok(())
    }

    #[test]
    fn vstack_hstack() -> Result<(), TensorOpsError> {
        let a = Tensor::from_vec(&[2], vec![1.0, 2.0])?;
        let b = Tensor::from_vec(&[2], vec![3.0, 4.0])?;
        let v = vstack(&[&a, &b])?;
        assert_eq!(v.shape(), &[2, 2]);
        let h = hstack(&[&a, &b])?;
        assert_eq!(h.shape(), &[4]);
        assert_eq!(h.to_vec()?, vec![1.0, 2.0, 3.0, 4.0]);
        let h2 = hstack(&[&v, &v])?;
        assert_eq!(h2.shape(), &[2, 4]);
        assert_eq!(h2.to_vec()?, vec![1.0, 2.0, 1.0, 2.0, 3.0, 4.0, 3.0, 4.0]);
        Ok(())
    }

    #[test]
    fn dstack_depth() -> Result<(), TensorOpsError> {
        let a = Tensor::from_vec(&[2], vec![1.0, 2.0])?;
        let b = Tensor::from_vec(&[2], vec![3.0, 4.0])?;
        let d = dstack(&[&a, &b])?;
        assert_eq!(d.shape(), &[1, 2, 2]);
        assert_eq!(d.to_vec()?, vec![1.0, 3.0, 2.0, 4.0]);

        let m = Tensor::from_vec(&[2, 2], vec![1.0, 2.0, 3.0, 4.0])?;
        let dm = dstack(&[&m, &m])?;
        assert_eq!(dm.shape(), &[2, 2, 2]);
        assert_eq!(dm.get(&[1, 0, 1])?, 3.0);
        Ok(())
    }

    #[test]
    fn column_stack_vectors() -> Result<(), TensorOpsError> {
        let a = Tensor::from_vec(&[3], vec![1.0, 2.0, 3.0])?;
        let b = Tensor::from_vec(&[3], vec![4.0, 5.0, 6.0])?;
        let c = column_stack(&[&a, &b])?;
        assert_eq!(c.shape(), &[3, 2]);
        assert_eq!(c.to_vec()?, vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);

        let wide = column_stack(&[&c, &a])?;
        assert_eq!(wide.shape(), &[3, 3]);
        assert_eq!(wide.to_vec()?, vec![1.0, 4.0, 1.0, 2.0, 5.0, 2.0, 3.0, 6.0, 3.0]);

        let short = Tensor::zeros(&[2], Device::Cpu)?;
        assert!(column_stack(&[&a, &short]).is_err());
        Ok(())
    }

    #[test]
    fn append_flat_and_along_axis() -> Result<(), TensorOpsError> {
        let m = Tensor::from_vec(&[2, 2], vec![1.0, 2.0, 3.0, 4.0])?;
        let v = Tensor::from_vec(&[2], vec![5.0, 6.0])?;
        let flat = append(&m.transpose(), &v, None)?;
        assert_eq!(flat.shape(), &[6]);
        assert_eq!(flat.to_vec()?, vec![1.0, 3.0, 2.0, 4.0, 5.0, 6.0]);

        let row = v.expand_dims(0)?;
        let rows = append(&m, &row, Some(0))?;
        assert_eq!(rows.shape(), &[3, 2]);
        assert_eq!(rows.to_vec()?, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert!(matches!(
            append(&m, &v, Some(0)),
            Err(TensorOpsError::TensorError(TensorError::Shape(_)))
        ));
        Ok(())
    }

    #[test]
    fn atleast_views() -> Result<(), TensorOpsError> {
        let s = Tensor::scalar(2.0, Device::Cpu)?;
        assert_eq!(atleast_1d(&s)?.shape(), &[1]);
        assert_eq!(atleast_2d(&s)?.shape(), &[1, 1]);
        assert_eq!(atleast_3d(&s)?.shape(), &[1, 1, 1]);
        let v = Tensor::zeros(&[4], Device::Cpu)?;
        assert_eq!(atleast_2d(&v)?.shape(), &[1, 4]);
        assert_eq!(atleast_3d(&v)?.shape(), &[1, 4, 1]);
        let m = Tensor::zeros(&[2, 3], Device::Cpu)?;
        assert_eq!(atleast_3d(&m)?.shape(), &[2, 3, 1]);
        assert!(atleast_3d(&m)?.shares_buffer(&m));
        Ok(())
    }
}
