use std::cell::Cell;
use std::sync::Arc;

use crate::{
    backend::{backend_for, Backend, CopyDirection},
    device::Device,
    dtype::DType,
    error::TensorError,
    layout::{self, StridedIter},
    storage::TensorStorage,
};

/// A strided n-dimensional array living on the CPU or a GPU.
///
/// The tensor is a descriptor over a shared [`TensorStorage`]: its shape, its
/// byte strides and the byte offset of its first element. Several tensors may
/// alias the same buffer; the buffer is released when the last one is dropped.
///
/// Cloning a tensor is cheap and shares the buffer. Use [`Tensor::copy`] for a
/// deep copy.
///
/// # Thread safety
///
/// A tensor is `Send` but not `Sync`, and the iteration cursor is plain
/// per-instance state. Clones and views share one buffer without locking:
/// while a tensor is written, no other thread may read or write a tensor
/// aliasing the same buffer. Call [`Tensor::make_unique`] before moving a
/// tensor to a thread that writes to it.
///
/// # Example
///
/// ```
/// use ndrt_tensor::{Device, Tensor};
///
/// let t = Tensor::from_vec(&[2, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0])?;
/// assert_eq!(t.shape(), &[2, 3]);
/// assert_eq!(t.get(&[1, 2])?, 6.0);
///
/// let r = t.reshape(&[3, 2])?;
/// assert_eq!(r.get(&[2, 0])?, 5.0);
/// assert_eq!(t.ref_count(), 2);
/// assert_eq!(r.device(), Device::Cpu);
/// # Ok::<(), ndrt_tensor::TensorError>(())
/// ```
pub struct Tensor {
    storage: TensorStorage,
    shape: Vec<usize>,
    strides: Vec<usize>,
    dtype: DType,
    is_view: bool,
    pub(crate) cursor: Cell<usize>,
}

impl Tensor {
    fn from_storage(storage: TensorStorage, shape: Vec<usize>, dtype: DType) -> Self {
        let strides = layout::contiguous_strides(&shape, dtype.size_in_bytes());
        Self {
            storage,
            shape,
            strides,
            dtype,
            is_view: false,
            cursor: Cell::new(0),
        }
    }

    fn aliasing(&self, shape: Vec<usize>, strides: Vec<usize>) -> Self {
        Self {
            storage: self.storage.clone(),
            shape,
            strides,
            dtype: self.dtype,
            is_view: true,
            cursor: Cell::new(0),
        }
    }

    fn byte_len(shape: &[usize], dtype: DType) -> Result<usize, TensorError> {
        layout::checked_numel(shape)
            .and_then(|n| n.checked_mul(dtype.size_in_bytes()))
            .ok_or_else(|| TensorError::Shape(format!("shape {:?} overflows", shape)))
    }

    /// Creates a zero-initialized tensor on `device`.
    ///
    /// # Errors
    ///
    /// Returns [`TensorError::DeviceUnavailable`] if `device` has no backend
    /// and [`TensorError::Allocation`] if the backend cannot allocate.
    pub fn create(shape: &[usize], dtype: DType, device: Device) -> Result<Self, TensorError> {
        Self::create_in(shape, dtype, backend_for(device)?)
    }

    /// Creates a zero-initialized tensor allocated by `backend`.
    pub fn create_in(
        shape: &[usize],
        dtype: DType,
        backend: Arc<dyn Backend>,
    ) -> Result<Self, TensorError> {
        let bytes = Self::byte_len(shape, dtype)?;
        let storage = TensorStorage::allocate(backend, bytes)?;
        Ok(Self::from_storage(storage, shape.to_vec(), dtype))
    }

    /// Creates a float32 tensor whose contents are unspecified by contract.
    ///
    /// The buffer is zeroed in practice; callers must not rely on it.
    pub fn empty(shape: &[usize], device: Device) -> Result<Self, TensorError> {
        Self::create(shape, DType::Float32, device)
    }

    /// Creates a float32 tensor filled with zeros.
    pub fn zeros(shape: &[usize], device: Device) -> Result<Self, TensorError> {
        Self::create(shape, DType::Float32, device)
    }

    /// Creates a float32 tensor filled with ones.
    pub fn ones(shape: &[usize], device: Device) -> Result<Self, TensorError> {
        Self::full(shape, 1.0, device)
    }

    /// Creates a float32 tensor filled with `value`.
    pub fn full(shape: &[usize], value: f32, device: Device) -> Result<Self, TensorError> {
        let mut t = Self::empty(shape, device)?;
        t.fill(value)?;
        Ok(t)
    }

    /// Creates a CPU tensor from a row-major vector.
    ///
    /// # Errors
    ///
    /// Returns [`TensorError::Shape`] if `data.len()` is not the product of `shape`.
    pub fn from_vec(shape: &[usize], data: Vec<f32>) -> Result<Self, TensorError> {
        Self::from_slice(shape, &data, Device::Cpu)
    }

    /// Creates a tensor on `device` from a row-major slice.
    pub fn from_slice(shape: &[usize], data: &[f32], device: Device) -> Result<Self, TensorError> {
        Self::from_slice_in(shape, data, backend_for(device)?)
    }

    /// Creates a tensor allocated by `backend` from a row-major slice.
    pub fn from_slice_in(
        shape: &[usize],
        data: &[f32],
        backend: Arc<dyn Backend>,
    ) -> Result<Self, TensorError> {
        let expected = layout::checked_numel(shape)
            .ok_or_else(|| TensorError::Shape(format!("shape {:?} overflows", shape)))?;
        if expected != data.len() {
            return Err(TensorError::element_count_mismatch(
                shape,
                expected,
                data.len(),
            ));
        }
        let storage = TensorStorage::from_host(backend, data)?;
        Ok(Self::from_storage(storage, shape.to_vec(), DType::Float32))
    }

    /// Creates a zero-dimensional tensor holding `value`.
    pub fn scalar(value: f32, device: Device) -> Result<Self, TensorError> {
        Self::from_slice(&[], &[value], device)
    }

    /// Returns the shape of the tensor.
    #[inline]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Returns the byte strides of the tensor.
    #[inline]
    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    /// Returns the element type.
    #[inline]
    pub fn dtype(&self) -> DType {
        self.dtype
    }

    /// Returns the size of one element in bytes.
    #[inline]
    pub fn element_size(&self) -> usize {
        self.dtype.size_in_bytes()
    }

    /// Returns the device the data lives on.
    #[inline]
    pub fn device(&self) -> Device {
        self.storage.device()
    }

    /// Returns the number of dimensions.
    #[inline]
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Returns the number of elements: 1 for scalars, 0 for empty tensors.
    #[inline]
    pub fn numel(&self) -> usize {
        layout::numel(&self.shape)
    }

    /// Returns true for zero-dimensional tensors.
    #[inline]
    pub fn is_scalar(&self) -> bool {
        self.shape.is_empty()
    }

    /// Returns the number of tensors sharing this tensor's buffer.
    #[inline]
    pub fn ref_count(&self) -> usize {
        self.storage.ref_count()
    }

    /// Returns true if this tensor was derived from another tensor's buffer.
    #[inline]
    pub fn is_view(&self) -> bool {
        self.is_view
    }

    /// Returns true if both tensors alias the same buffer.
    #[inline]
    pub fn shares_buffer(&self, other: &Tensor) -> bool {
        self.storage.same_buffer(&other.storage)
    }

    /// Returns the underlying storage.
    #[inline]
    pub fn storage(&self) -> &TensorStorage {
        &self.storage
    }

    /// Returns the backend owning the buffer.
    #[inline]
    pub fn backend(&self) -> &Arc<dyn Backend> {
        self.storage.backend()
    }

    /// Returns the byte offset of the first element within the buffer.
    #[inline]
    pub fn byte_offset(&self) -> usize {
        self.storage.offset()
    }

    /// Returns the raw pointer to the first element.
    ///
    /// For GPU tensors this is a device address and must not be dereferenced
    /// on the host.
    #[inline]
    pub fn data_ptr(&self) -> *const u8 {
        self.storage.as_ptr()
    }

    /// Returns the raw mutable pointer to the first element.
    #[inline]
    pub fn data_mut_ptr(&mut self) -> *mut u8 {
        self.storage.as_mut_ptr()
    }

    /// Returns the host pointer to the first element.
    ///
    /// # Errors
    ///
    /// Returns [`TensorError::DeviceMismatch`] if the tensor is not on the CPU.
    pub fn host_ptr(&self) -> Result<*const u8, TensorError> {
        if !self.device().is_cpu() {
            return Err(TensorError::DeviceMismatch {
                expected: Device::Cpu,
                actual: self.device(),
            });
        }
        Ok(self.storage.as_ptr())
    }

    /// Returns true if the elements are laid out densely in row-major order.
    pub fn is_contiguous(&self) -> bool {
        layout::is_contiguous(&self.shape, &self.strides, self.element_size())
    }

    /// Creates a view aliasing this tensor's buffer.
    ///
    /// `byte_offset` is relative to this tensor's first element and `strides`
    /// are in bytes. The view keeps the buffer alive and increments its ref
    /// count.
    ///
    /// # Errors
    ///
    /// - [`TensorError::Shape`] if `shape` and `strides` differ in length
    /// - [`TensorError::UnsupportedOperation`] if the offset or a stride is not
    ///   a multiple of the element size
    /// - [`TensorError::IndexOutOfBounds`] if the view would reach past the end
    ///   of the allocation
    pub fn view(
        &self,
        byte_offset: usize,
        shape: &[usize],
        strides: &[usize],
    ) -> Result<Tensor, TensorError> {
        if shape.len() != strides.len() {
            return Err(TensorError::Shape(format!(
                "view shape {:?} and strides {:?} differ in length",
                shape, strides
            )));
        }
        let elsize = self.element_size();
        if byte_offset % elsize != 0 || strides.iter().any(|s| s % elsize != 0) {
            return Err(TensorError::unsupported_operation(
                "view",
                format!("offset and strides must be multiples of {} bytes", elsize),
            ));
        }
        let storage = self.storage.view(byte_offset)?;
        if shape.iter().all(|&d| d > 0) {
            let extent = shape
                .iter()
                .zip(strides.iter())
                .try_fold(elsize, |acc, (&d, &s)| {
                    (d - 1).checked_mul(s).and_then(|x| acc.checked_add(x))
                });
            match extent {
                Some(extent) if extent <= storage.len() => {}
                _ => {
                    return Err(TensorError::index_out_of_bounds(
                        extent.map_or(i64::MAX, |e| (storage.offset() + e) as i64),
                        storage.capacity(),
                    ))
                }
            }
        }
        Ok(Tensor {
            storage,
            shape: shape.to_vec(),
            strides: strides.to_vec(),
            dtype: self.dtype,
            is_view: true,
            cursor: Cell::new(0),
        })
    }

    /// Deep copies the tensor onto `device`.
    ///
    /// The result is contiguous and owns its buffer, whatever the layout of
    /// the source.
    pub fn copy(&self, device: Device) -> Result<Tensor, TensorError> {
        self.copy_in(backend_for(device)?)
    }

    /// Deep copies the tensor into a buffer allocated by `target`.
    pub fn copy_in(&self, target: Arc<dyn Backend>) -> Result<Tensor, TensorError> {
        let device = target.device();
        if !self.is_contiguous() {
            let host = self.to_vec()?;
            let storage = TensorStorage::from_host(target, &host)?;
            return Ok(Self::from_storage(storage, self.shape.clone(), self.dtype));
        }
        let bytes = Self::byte_len(&self.shape, self.dtype)?;
        let out = TensorStorage::allocate(Arc::clone(&target), bytes)?;
        if bytes > 0 {
            let direction = CopyDirection::between(self.device(), device);
            let engine = if self.device().is_gpu() {
                Arc::clone(self.storage.backend())
            } else {
                target
            };
            self.storage.backend().synchronize()?;
            // SAFETY: both buffers hold at least `bytes` bytes from their offsets
            unsafe { engine.copy(out.as_mut_ptr(), self.storage.as_ptr(), bytes, direction)? };
        }
        log::debug!(
            "copied {:?} ({} bytes) from {} to {}",
            self.shape,
            bytes,
            self.device(),
            device
        );
        Ok(Self::from_storage(out, self.shape.clone(), self.dtype))
    }

    /// Transfers the tensor to `device`, always producing a new tensor.
    pub fn to_device(&self, device: Device) -> Result<Tensor, TensorError> {
        self.copy(device)
    }

    /// Returns a contiguous tensor with the same elements.
    ///
    /// Contiguous inputs are shared, others are copied on their own device.
    pub fn contiguous(&self) -> Result<Tensor, TensorError> {
        if self.is_contiguous() {
            Ok(self.clone())
        } else {
            self.copy_in(Arc::clone(self.storage.backend()))
        }
    }

    /// Reinterprets the elements with a new shape.
    ///
    /// Contiguous inputs produce a view of the same buffer; others are
    /// materialized first.
    ///
    /// # Errors
    ///
    /// Returns [`TensorError::Shape`] if the element counts differ.
    pub fn reshape(&self, shape: &[usize]) -> Result<Tensor, TensorError> {
        let count = layout::checked_numel(shape)
            .ok_or_else(|| TensorError::Shape(format!("shape {:?} overflows", shape)))?;
        if count != self.numel() {
            return Err(TensorError::Shape(format!(
                "cannot reshape tensor of shape {:?} into {:?}",
                self.shape, shape
            )));
        }
        let source = self.contiguous()?;
        let strides = layout::contiguous_strides(shape, self.element_size());
        let mut out = source.aliasing(shape.to_vec(), strides);
        out.is_view = source.shares_buffer(self);
        Ok(out)
    }

    /// Returns a view with the dimensions reordered by `axes`.
    ///
    /// # Errors
    ///
    /// Returns [`TensorError::Shape`] if `axes` is not a permutation of the
    /// dimensions.
    pub fn permute(&self, axes: &[usize]) -> Result<Tensor, TensorError> {
        let mut seen = vec![false; self.ndim()];
        if axes.len() != self.ndim() {
            return Err(TensorError::Shape(format!(
                "axes {:?} do not match tensor of rank {}",
                axes,
                self.ndim()
            )));
        }
        for &a in axes {
            if a >= self.ndim() || seen[a] {
                return Err(TensorError::Shape(format!(
                    "axes {:?} are not a permutation of 0..{}",
                    axes,
                    self.ndim()
                )));
            }
            seen[a] = true;
        }
        let shape = axes.iter().map(|&a| self.shape[a]).collect();
        let strides = axes.iter().map(|&a| self.strides[a]).collect();
        Ok(self.aliasing(shape, strides))
    }

    /// Returns a view with axes `a` and `b` interchanged.
    ///
    /// # Errors
    ///
    /// Returns [`TensorError::IndexOutOfBounds`] if either axis is not a
    /// dimension.
    pub fn swapaxes(&self, a: usize, b: usize) -> Result<Tensor, TensorError> {
        let mut axes: Vec<usize> = (0..self.ndim()).collect();
        for axis in [a, b] {
            if axis >= self.ndim() {
                return Err(TensorError::index_out_of_bounds(axis as i64, self.ndim()));
            }
        }
        axes.swap(a, b);
        self.permute(&axes)
    }

    /// Returns a view where each axis in `source` is moved to the matching
    /// position in `destination`. The other axes keep their relative order.
    ///
    /// # Errors
    ///
    /// - [`TensorError::Shape`] if the lists differ in length or repeat an axis
    /// - [`TensorError::IndexOutOfBounds`] if an axis is not a dimension
    pub fn moveaxis(&self, source: &[usize], destination: &[usize]) -> Result<Tensor, TensorError> {
        if source.len() != destination.len() {
            return Err(TensorError::Shape(format!(
                "moveaxis source {:?} and destination {:?} differ in length",
                source, destination
            )));
        }
        for list in [source, destination] {
            if let Some(&axis) = list.iter().find(|&&axis| axis >= self.ndim()) {
                return Err(TensorError::index_out_of_bounds(axis as i64, self.ndim()));
            }
            let mut seen = vec![false; self.ndim()];
            for &axis in list {
                if std::mem::replace(&mut seen[axis], true) {
                    return Err(TensorError::Shape(format!(
                        "repeated axis {} in {:?}",
                        axis, list
                    )));
                }
            }
        }
        let mut axes: Vec<usize> = (0..self.ndim()).filter(|a| !source.contains(a)).collect();
        let mut moves: Vec<(usize, usize)> = destination
            .iter()
            .copied()
            .zip(source.iter().copied())
            .collect();
        moves.sort_unstable();
        for (dst, src) in moves {
            axes.insert(dst, src);
        }
        self.permute(&axes)
    }

    /// Returns a view with `axis` rolled backwards until it sits before the
    /// axis currently at position `start`.
    ///
    /// `start` may equal the rank, which moves `axis` to the end.
    ///
    /// # Errors
    ///
    /// Returns [`TensorError::IndexOutOfBounds`] if `axis` is not a dimension
    /// or `start` is greater than the rank.
    pub fn rollaxis(&self, axis: usize, start: usize) -> Result<Tensor, TensorError> {
        if axis >= self.ndim() {
            return Err(TensorError::index_out_of_bounds(axis as i64, self.ndim()));
        }
        if start > self.ndim() {
            return Err(TensorError::index_out_of_bounds(start as i64, self.ndim() + 1));
        }
        let target = if axis < start { start - 1 } else { start };
        let mut axes: Vec<usize> = (0..self.ndim()).filter(|&a| a != axis).collect();
        axes.insert(target, axis);
        self.permute(&axes)
    }

    /// Returns a view with the dimensions reversed.
    pub fn transpose(&self) -> Tensor {
        let shape = self.shape.iter().rev().copied().collect();
        let strides = self.strides.iter().rev().copied().collect();
        self.aliasing(shape, strides)
    }

    /// Returns the elements as a one-dimensional tensor.
    pub fn flatten(&self) -> Result<Tensor, TensorError> {
        self.reshape(&[self.numel()])
    }

    /// Inserts a dimension of size one at `axis`.
    pub fn expand_dims(&self, axis: usize) -> Result<Tensor, TensorError> {
        if axis > self.ndim() {
            return Err(TensorError::index_out_of_bounds(
                axis as i64,
                self.ndim() + 1,
            ));
        }
        let stride = if axis < self.ndim() {
            self.strides[axis] * self.shape[axis]
        } else {
            self.element_size()
        };
        let mut shape = self.shape.clone();
        let mut strides = self.strides.clone();
        shape.insert(axis, 1);
        strides.insert(axis, stride);
        Ok(self.aliasing(shape, strides))
    }

    /// Removes dimensions of size one.
    ///
    /// With `Some(axis)` only that dimension is removed and it must have size
    /// one.
    pub fn squeeze(&self, axis: Option<usize>) -> Result<Tensor, TensorError> {
        let keep: Vec<usize> = match axis {
            Some(a) if a >= self.ndim() => {
                return Err(TensorError::index_out_of_bounds(a as i64, self.ndim()))
            }
            Some(a) if self.shape[a] != 1 => {
                return Err(TensorError::Shape(format!(
                    "cannot squeeze axis {} of size {}",
                    a, self.shape[a]
                )))
            }
            Some(a) => (0..self.ndim()).filter(|&i| i != a).collect(),
            None => (0..self.ndim()).filter(|&i| self.shape[i] != 1).collect(),
        };
        let shape = keep.iter().map(|&i| self.shape[i]).collect();
        let strides = keep.iter().map(|&i| self.strides[i]).collect();
        Ok(self.aliasing(shape, strides))
    }

    fn element_offset(&self, index: &[usize]) -> Result<usize, TensorError> {
        if index.len() != self.ndim() {
            return Err(TensorError::Shape(format!(
                "index of rank {} for tensor of rank {}",
                index.len(),
                self.ndim()
            )));
        }
        let mut offset = 0;
        for ((&i, &dim), &stride) in index.iter().zip(&self.shape).zip(&self.strides) {
            if i >= dim {
                return Err(TensorError::index_out_of_bounds(i as i64, dim));
            }
            offset += i * stride;
        }
        Ok(offset)
    }

    fn read_element(&self, offset: usize) -> Result<f32, TensorError> {
        if self.device().is_cpu() {
            // SAFETY: offset was validated against shape and strides
            return Ok(unsafe { (self.storage.as_ptr().add(offset) as *const f32).read() });
        }
        let backend = self.storage.backend();
        backend.synchronize()?;
        let mut value = 0.0f32;
        // SAFETY: the source element is in bounds, the destination is a local
        unsafe {
            backend.copy(
                &mut value as *mut f32 as *mut u8,
                self.storage.as_ptr().add(offset),
                self.element_size(),
                CopyDirection::DeviceToHost,
            )?
        };
        Ok(value)
    }

    fn write_element(&self, offset: usize, value: f32) -> Result<(), TensorError> {
        if self.device().is_cpu() {
            // SAFETY: offset was validated against shape and strides
            unsafe { (self.storage.as_mut_ptr().add(offset) as *mut f32).write(value) };
            return Ok(());
        }
        // SAFETY: the destination element is in bounds, the source is a local
        unsafe {
            self.storage.backend().copy(
                self.storage.as_mut_ptr().add(offset),
                &value as *const f32 as *const u8,
                self.element_size(),
                CopyDirection::HostToDevice,
            )?
        };
        Ok(())
    }

    /// Returns the element at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`TensorError::Shape`] if the index rank is wrong and
    /// [`TensorError::IndexOutOfBounds`] if a coordinate is out of range.
    pub fn get(&self, index: &[usize]) -> Result<f32, TensorError> {
        let offset = self.element_offset(index)?;
        self.read_element(offset)
    }

    /// Writes `value` at `index`.
    ///
    /// The write is visible through every tensor sharing the buffer, see
    /// [thread safety](Tensor#thread-safety).
    pub fn set(&mut self, index: &[usize], value: f32) -> Result<(), TensorError> {
        let offset = self.element_offset(index)?;
        self.write_element(offset, value)
    }

    /// Returns the single element of a one-element tensor.
    pub fn item(&self) -> Result<f32, TensorError> {
        if self.numel() != 1 {
            return Err(TensorError::Shape(format!(
                "item requires exactly one element, got shape {:?}",
                self.shape
            )));
        }
        self.read_element(0)
    }

    /// Runs `f` with a host pointer positioned at the first element.
    ///
    /// GPU data is synchronized and staged through a host buffer covering the
    /// tensor's byte extent, so the strides stay valid for the staged copy.
    fn with_host_bytes<R>(&self, f: impl FnOnce(*const u8) -> R) -> Result<R, TensorError> {
        let backend = self.storage.backend();
        backend.synchronize()?;
        if self.device().is_cpu() {
            return Ok(f(self.storage.as_ptr()));
        }
        let extent = layout::max_offset(&self.shape, &self.strides)
            .map_or(0, |m| m + self.element_size());
        let mut staging = vec![0.0f32; extent.div_ceil(std::mem::size_of::<f32>())];
        if extent > 0 {
            // SAFETY: the extent lies within the device buffer, staging is large enough
            unsafe {
                backend.copy(
                    staging.as_mut_ptr() as *mut u8,
                    self.storage.as_ptr(),
                    extent,
                    CopyDirection::DeviceToHost,
                )?
            };
        }
        Ok(f(staging.as_ptr() as *const u8))
    }

    /// Gathers the elements in row-major order into a host vector.
    ///
    /// Pending GPU work is synchronized first.
    pub fn to_vec(&self) -> Result<Vec<f32>, TensorError> {
        self.with_host_bytes(|ptr| {
            StridedIter::new(&self.shape, [self.strides.clone()])
                // SAFETY: every offset produced by the traversal is in bounds
                .map(|[offset]| unsafe { (ptr.add(offset) as *const f32).read() })
                .collect()
        })
    }

    /// Overwrites the elements in row-major order from `values`.
    pub fn write_elements(&mut self, values: &[f32]) -> Result<(), TensorError> {
        if values.len() != self.numel() {
            return Err(TensorError::element_count_mismatch(
                &self.shape,
                self.numel(),
                values.len(),
            ));
        }
        if values.is_empty() {
            return Ok(());
        }
        if self.is_contiguous() {
            let direction = CopyDirection::between(Device::Cpu, self.device());
            // SAFETY: a contiguous tensor spans exactly size_of_val(values) bytes
            unsafe {
                self.storage.backend().copy(
                    self.storage.as_mut_ptr(),
                    values.as_ptr() as *const u8,
                    std::mem::size_of_val(values),
                    direction,
                )?
            };
            return Ok(());
        }
        let offsets = StridedIter::new(&self.shape, [self.strides.clone()]);
        for (&value, [offset]) in values.iter().zip(offsets) {
            self.write_element(offset, value)?;
        }
        Ok(())
    }

    /// Sets every element to `value`.
    ///
    /// Views and clones of the same buffer observe the new values, see
    /// [thread safety](Tensor#thread-safety).
    pub fn fill(&mut self, value: f32) -> Result<(), TensorError> {
        if !self.is_contiguous() {
            let values = vec![value; self.numel()];
            return self.write_elements(&values);
        }
        let count = self.numel();
        if count > 0 {
            // SAFETY: a contiguous tensor spans `count` elements from its offset
            unsafe {
                self.storage
                    .backend()
                    .fill(self.storage.as_mut_ptr(), value, count)?
            };
        }
        Ok(())
    }

    /// Moves the tensor onto a buffer nobody else references.
    ///
    /// A shared buffer is copied on the tensor's device into a contiguous
    /// buffer of the same shape; a tensor already holding the only reference
    /// is left as is. Afterwards writes through this tensor cannot be observed
    /// through any other tensor.
    pub fn make_unique(&mut self) -> Result<(), TensorError> {
        if self.storage.is_unique() {
            return Ok(());
        }
        let cursor = self.cursor.get();
        *self = self.copy_in(Arc::clone(self.storage.backend()))?;
        self.cursor.set(cursor);
        Ok(())
    }

    /// Copies the elements of `src` into this tensor.
    ///
    /// A scalar source fills the whole tensor. The source is gathered to the
    /// host first, so `src` may alias `self`.
    ///
    /// # Errors
    ///
    /// Returns [`TensorError::Shape`] if the shapes differ.
    pub fn assign(&mut self, src: &Tensor) -> Result<(), TensorError> {
        if src.is_scalar() {
            return self.fill(src.item()?);
        }
        if src.shape != self.shape {
            return Err(TensorError::incompatible_shapes(&self.shape, &src.shape));
        }
        let values = src.to_vec()?;
        self.write_elements(&values)
    }
}

impl Clone for Tensor {
    /// Shares the buffer; the clone starts with a fresh cursor.
    ///
    /// Writes through the clone or the original are visible through both.
    /// Use [`Tensor::copy`] or [`Tensor::make_unique`] for an independent
    /// buffer.
    fn clone(&self) -> Self {
        Self {
            storage: self.storage.clone(),
            shape: self.shape.clone(),
            strides: self.strides.clone(),
            dtype: self.dtype,
            is_view: self.is_view,
            cursor: Cell::new(0),
        }
    }
}

impl std::fmt::Debug for Tensor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tensor")
            .field("shape", &self.shape)
            .field("strides", &self.strides)
            .field("dtype", &self.dtype)
            .field("device", &self.device())
            .field("is_view", &self.is_view)
            .field("ref_count", &self.ref_count())
            .finish()
    }
}

impl Tensor {
    /// Describes the descriptor of the tensor, one field per line.
    ///
    /// The element data is not read, so this works for tensors on any device.
    pub fn dump(&self) -> String {
        let list = |values: &[usize]| {
            values
                .iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join(" ")
        };
        let rows = [
            ("ndim", self.ndim().to_string()),
            ("shape", format!("[ {} ]", list(&self.shape))),
            ("strides", format!("[ {} ]", list(&self.strides))),
            ("byte_offset", self.byte_offset().to_string()),
            ("device", self.device().to_string()),
            ("ref_count", self.ref_count().to_string()),
            ("is_view", self.is_view.to_string()),
            ("dtype", self.dtype.to_string()),
            ("element_size", self.element_size().to_string()),
            ("numel", self.numel().to_string()),
            ("cursor", self.cursor.get().to_string()),
        ];
        let rule = "=".repeat(40);
        let mut out = format!("{rule}\n");
        for (name, value) in rows {
            out.push_str(&format!("{name:<14}{value}\n"));
        }
        out.push_str(&rule);
        out
    }
}

/// Dimensions longer than this are summarized when printed.
const SUMMARY_THRESHOLD: usize = 8;
/// Entries kept on each side of a summarized dimension.
const SUMMARY_EDGE: usize = 3;

/// Indices of a dimension that get printed; `None` marks the elision.
fn printed_indices(len: usize) -> Vec<Option<usize>> {
    if len <= SUMMARY_THRESHOLD {
        return (0..len).map(Some).collect();
    }
    (0..SUMMARY_EDGE)
        .map(Some)
        .chain(std::iter::once(None))
        .chain((len - SUMMARY_EDGE..len).map(Some))
        .collect()
}

/// Formats `v` as `d.dddde+xx`.
fn scientific(v: f32) -> String {
    let num = format!("{v:.4e}");
    match num.split_once('e') {
        Some((mantissa, exp)) => {
            let (sign, digits) = match exp.strip_prefix('-') {
                Some(digits) => ('-', digits),
                None => ('+', exp),
            };
            format!("{mantissa}e{sign}{digits:0>2}")
        }
        None => num,
    }
}

/// Writes the row-major block `data` of `shape` as nested brackets.
fn write_block(
    f: &mut std::fmt::Formatter<'_>,
    data: &[f32],
    shape: &[usize],
    depth: usize,
    cell: &dyn Fn(f32) -> String,
) -> std::fmt::Result {
    let Some((&len, inner)) = shape.split_first() else {
        return match data.first() {
            Some(&v) => f.write_str(&cell(v)),
            None => Ok(()),
        };
    };
    let block = layout::numel(inner);
    f.write_str("[")?;
    for (k, entry) in printed_indices(len).into_iter().enumerate() {
        if k > 0 {
            if inner.is_empty() {
                f.write_str(", ")?;
            } else {
                write!(f, ",{}{}", "\n".repeat(inner.len()), " ".repeat(depth + 1))?;
            }
        }
        match entry {
            Some(i) => write_block(f, &data[i * block..(i + 1) * block], inner, depth + 1, cell)?,
            None => f.write_str("...")?,
        }
    }
    f.write_str("]")
}

impl std::fmt::Display for Tensor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let data = self.to_vec().map_err(|_| std::fmt::Error)?;
        if data.is_empty() {
            return f.write_str("[]");
        }

        let (lo, hi) = data
            .iter()
            .filter(|v| v.is_finite() && **v != 0.0)
            .map(|v| v.abs())
            .fold((f32::INFINITY, 0.0f32), |(lo, hi), v| (lo.min(v), hi.max(v)));
        let use_scientific = hi >= 1e4 || lo < 1e-4;
        let format_one = |v: f32| {
            if use_scientific {
                scientific(v)
            } else {
                format!("{v:.4}")
            }
        };
        let width = data.iter().map(|&v| format_one(v).len()).max().unwrap_or(0);
        let cell = |v: f32| format!("{:>width$}", format_one(v));
        write_block(f, &data, &self.shape, 0, &cell)
    }
}
