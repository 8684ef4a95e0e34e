//! Axis-0 iteration and indexed access.
//!
//! Every tensor carries its own cursor over the first axis. The cursor is
//! plain per-instance state: it is neither thread-safe nor reentrant, and a
//! clone starts over from zero.

use crate::{error::TensorError, tensor::Tensor};

impl Tensor {
    /// Returns the length of the first axis, 0 for scalars.
    pub fn len(&self) -> usize {
        self.shape().first().copied().unwrap_or(0)
    }

    /// Returns true if the first axis has no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resets the cursor to the first entry.
    pub fn rewind(&self) {
        self.cursor.set(0);
    }

    /// Moves the cursor to the next entry.
    pub fn advance(&self) {
        self.cursor.set(self.cursor.get() + 1);
    }

    /// Returns the position of the cursor.
    pub fn key(&self) -> usize {
        self.cursor.get()
    }

    /// Returns true once the cursor has moved past the last entry.
    pub fn is_done(&self) -> bool {
        self.cursor.get() >= self.len()
    }

    /// Returns the entry under the cursor.
    pub fn current(&self) -> Result<Tensor, TensorError> {
        self.get_at(self.cursor.get() as i64)
    }

    /// Returns true if `index` addresses an entry of the first axis.
    pub fn contains_index(&self, index: i64) -> bool {
        index >= 0 && (index as u64) < self.len() as u64
    }

    fn check_index(&self, index: i64) -> Result<usize, TensorError> {
        if index < 0 {
            return Err(TensorError::NegativeIndex(index));
        }
        if !self.contains_index(index) {
            return Err(TensorError::index_out_of_bounds(index, self.len()));
        }
        Ok(index as usize)
    }

    /// Returns a view of entry `index` along the first axis.
    ///
    /// Indexing a 1-D tensor yields a zero-dimensional view.
    ///
    /// # Errors
    ///
    /// - [`TensorError::NegativeIndex`] for negative indices
    /// - [`TensorError::IndexOutOfBounds`] for `index >= len()`
    pub fn get_at(&self, index: i64) -> Result<Tensor, TensorError> {
        let i = self.check_index(index)?;
        let offset = i * self.strides()[0];
        self.view(offset, &self.shape()[1..], &self.strides()[1..])
    }

    /// Overwrites entry `index` with the elements of `value`.
    ///
    /// `value` must have the entry's shape or be a scalar.
    pub fn set_at(&mut self, index: i64, value: &Tensor) -> Result<(), TensorError> {
        let mut entry = self.get_at(index)?;
        entry.assign(value)
    }

    /// Fills entry `index` with `value`.
    pub fn set_at_scalar(&mut self, index: i64, value: f32) -> Result<(), TensorError> {
        let mut entry = self.get_at(index)?;
        entry.fill(value)
    }
}
