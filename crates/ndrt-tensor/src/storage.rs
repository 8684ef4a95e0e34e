//! Arc-based storage management for zero-copy views and buffer sharing.
//!
//! A buffer is owned by a single [`StorageImpl`] behind an `Arc`. Every tensor
//! referencing the buffer, base or view, holds one strong reference, so the
//! strong count is the buffer's ref count and the buffer is returned to its
//! backend exactly once, when the last reference is dropped.

use std::{ptr::NonNull, sync::Arc};

use crate::{
    allocator::TensorAllocatorError,
    backend::{Backend, CopyDirection},
    device::Device,
    error::TensorError,
};

/// Inner storage implementation that holds the actual memory.
struct StorageImpl {
    /// The pointer to the buffer which must be non-null.
    ptr: NonNull<u8>,
    /// The total length of the allocation in bytes.
    len: usize,
    /// The backend that allocated the buffer and will free it.
    backend: Arc<dyn Backend>,
}

impl Drop for StorageImpl {
    fn drop(&mut self) {
        log::trace!(
            "freeing {} bytes on {} at {:p}",
            self.len,
            self.backend.device(),
            self.ptr
        );
        // SAFETY: ptr and len were produced together by this backend's allocate
        // and this is the last reference to the allocation
        unsafe { self.backend.free(self.ptr.as_ptr(), self.len) }
    }
}

/// Reference-counted tensor buffer with a byte offset for views.
///
/// Clones are cheap and alias the same memory. Data is only reachable through
/// raw pointers; callers go through the shape and stride aware accessors of
/// [`crate::Tensor`].
pub struct TensorStorage {
    inner: Arc<StorageImpl>,
    /// Offset of this view into the buffer, in bytes.
    offset: usize,
}

impl TensorStorage {
    /// Allocates `bytes` bytes on `backend`.
    ///
    /// The memory is zeroed so that no uninitialized bytes can ever be read
    /// back through a tensor.
    ///
    /// # Errors
    ///
    /// Returns [`TensorError::Allocation`] if the backend cannot allocate.
    pub fn allocate(backend: Arc<dyn Backend>, bytes: usize) -> Result<Self, TensorError> {
        let raw = backend.allocate(bytes)?;
        let ptr = NonNull::new(raw).ok_or(TensorAllocatorError::NullPointer)?;
        let storage = Self {
            inner: Arc::new(StorageImpl {
                ptr,
                len: bytes,
                backend,
            }),
            offset: 0,
        };
        if bytes > 0 {
            // SAFETY: the buffer was just allocated with `bytes` bytes
            unsafe { storage.inner.backend.memset_zero(raw, bytes)? };
        }
        log::trace!(
            "allocated {} bytes on {} at {:p}",
            bytes,
            storage.device(),
            ptr
        );
        Ok(storage)
    }

    /// Allocates a buffer on `backend` and uploads `data` into it.
    ///
    /// # Errors
    ///
    /// Returns [`TensorError::Allocation`] if allocation or the upload fails.
    pub fn from_host(backend: Arc<dyn Backend>, data: &[f32]) -> Result<Self, TensorError> {
        let bytes = std::mem::size_of_val(data);
        let raw = backend.allocate(bytes)?;
        let ptr = NonNull::new(raw).ok_or(TensorAllocatorError::NullPointer)?;
        let storage = Self {
            inner: Arc::new(StorageImpl {
                ptr,
                len: bytes,
                backend,
            }),
            offset: 0,
        };
        if bytes > 0 {
            let direction = CopyDirection::between(Device::Cpu, storage.device());
            // SAFETY: dst holds `bytes` freshly allocated bytes, src is a live slice
            unsafe {
                storage.inner.backend.copy(
                    raw,
                    data.as_ptr() as *const u8,
                    bytes,
                    direction,
                )?
            };
        }
        Ok(storage)
    }

    /// Creates a new view sharing this buffer, starting `byte_offset` bytes
    /// after the start of this view.
    ///
    /// # Errors
    ///
    /// Returns [`TensorError::IndexOutOfBounds`] if the offset leaves the
    /// allocation.
    pub fn view(&self, byte_offset: usize) -> Result<Self, TensorError> {
        let offset = self.offset + byte_offset;
        if offset > self.inner.len {
            return Err(TensorError::index_out_of_bounds(
                offset as i64,
                self.inner.len,
            ));
        }
        Ok(Self {
            inner: Arc::clone(&self.inner),
            offset,
        })
    }

    /// Returns the pointer to this view's first byte.
    #[inline]
    pub fn as_ptr(&self) -> *const u8 {
        // SAFETY: offset is validated against len at construction
        unsafe { self.inner.ptr.as_ptr().add(self.offset) }
    }

    /// Returns the mutable pointer to this view's first byte.
    ///
    /// The caller must ensure no other tensor reads the bytes it writes while
    /// the write is in progress.
    #[inline]
    pub fn as_mut_ptr(&self) -> *mut u8 {
        // SAFETY: offset is validated against len at construction
        unsafe { self.inner.ptr.as_ptr().add(self.offset) }
    }

    /// Returns the pointer to the start of the underlying allocation.
    #[inline]
    pub fn base_ptr(&self) -> *const u8 {
        self.inner.ptr.as_ptr()
    }

    /// Returns the byte offset of this view into the allocation.
    #[inline]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Returns the total length of the allocation in bytes.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.inner.len
    }

    /// Returns the number of bytes reachable from this view's offset.
    #[inline]
    pub fn len(&self) -> usize {
        self.inner.len - self.offset
    }

    /// Returns true if no bytes are reachable from this view.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the device the buffer lives on.
    #[inline]
    pub fn device(&self) -> Device {
        self.inner.backend.device()
    }

    /// Returns the backend that owns the buffer.
    #[inline]
    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.inner.backend
    }

    /// Returns the number of live references to the buffer.
    #[inline]
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    /// Returns true if this is the only reference to the buffer.
    #[inline]
    pub fn is_unique(&self) -> bool {
        self.ref_count() == 1
    }

    /// Returns true if both storages alias the same allocation.
    #[inline]
    pub fn same_buffer(&self, other: &TensorStorage) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Clone for TensorStorage {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            offset: self.offset,
        }
    }
}

// SAFETY: the allocation is only freed by the final Arc drop and the backend is
// Send + Sync
unsafe impl Send for TensorStorage {}
// SAFETY: shared access only hands out raw pointers; Tensor documents that
// aliasing tensors must not be accessed from another thread during a write
unsafe impl Sync for TensorStorage {}

impl std::fmt::Debug for TensorStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TensorStorage")
            .field("ptr", &self.inner.ptr)
            .field("len", &self.inner.len)
            .field("offset", &self.offset)
            .field("device", &self.device())
            .field("ref_count", &self.ref_count())
            .finish()
    }
}
