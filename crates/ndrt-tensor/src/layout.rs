//! Shape and stride arithmetic plus the strided traversal primitive.
//!
//! Strides are expressed in bytes. Every elementwise and reduction kernel walks
//! its operands with [`StridedIter`], an odometer over the output index that
//! advances one byte offset per operand. Broadcast dimensions carry a stride
//! of zero, so the same element is revisited instead of being expanded.

/// Returns the number of elements of a tensor with the given shape.
///
/// A scalar (empty shape) has one element; any zero dimension gives zero.
#[inline]
pub fn numel(shape: &[usize]) -> usize {
    shape.iter().product()
}

/// Returns the number of elements of `shape`, or `None` on overflow.
pub fn checked_numel(shape: &[usize]) -> Option<usize> {
    shape.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d))
}

/// Computes row-major byte strides for `shape` with elements of `elsize` bytes.
///
/// # Example
///
/// ```
/// use ndrt_tensor::layout::contiguous_strides;
///
/// assert_eq!(contiguous_strides(&[2, 3, 4], 4), vec![48, 16, 4]);
/// assert!(contiguous_strides(&[], 4).is_empty());
/// ```
pub fn contiguous_strides(shape: &[usize], elsize: usize) -> Vec<usize> {
    let mut strides = vec![0; shape.len()];
    let mut stride = elsize;
    for i in (0..shape.len()).rev() {
        strides[i] = stride;
        stride *= shape[i];
    }
    strides
}

/// Returns true if `strides` describe a dense row-major layout of `shape`.
///
/// Dimensions of size one are ignored since their stride is never used.
pub fn is_contiguous(shape: &[usize], strides: &[usize], elsize: usize) -> bool {
    let mut expected = elsize;
    for (&dim, &stride) in shape.iter().zip(strides.iter()).rev() {
        if dim != 1 && stride != expected {
            return false;
        }
        expected *= dim;
    }
    true
}

/// Returns the byte offset of the last element relative to the first one,
/// or `None` for empty shapes.
pub fn max_offset(shape: &[usize], strides: &[usize]) -> Option<usize> {
    if shape.iter().any(|&d| d == 0) {
        return None;
    }
    Some(
        shape
            .iter()
            .zip(strides.iter())
            .map(|(&d, &s)| (d - 1) * s)
            .sum(),
    )
}

/// Converts a flat row-major element index into a multi-dimensional index.
pub fn unravel_index(mut flat: usize, shape: &[usize]) -> Vec<usize> {
    let mut index = vec![0; shape.len()];
    for i in (0..shape.len()).rev() {
        if shape[i] == 0 {
            continue;
        }
        index[i] = flat % shape[i];
        flat /= shape[i];
    }
    index
}

/// Odometer over an index space yielding one byte offset per operand.
///
/// The traversal is row-major: the last dimension varies fastest. A scalar
/// shape yields exactly once and a shape with any zero dimension yields
/// nothing.
///
/// # Example
///
/// ```
/// use ndrt_tensor::layout::StridedIter;
///
/// // a [2, 2] output, the second operand broadcast along axis 0
/// let offsets: Vec<[usize; 2]> =
///     StridedIter::new(&[2, 2], [vec![8, 4], vec![0, 4]]).collect();
/// assert_eq!(offsets, vec![[0, 0], [4, 4], [8, 0], [12, 4]]);
/// ```
#[derive(Debug, Clone)]
pub struct StridedIter<const K: usize> {
    shape: Vec<usize>,
    strides: [Vec<usize>; K],
    index: Vec<usize>,
    offsets: [usize; K],
    remaining: usize,
}

impl<const K: usize> StridedIter<K> {
    /// Creates a traversal of `shape` with one stride vector per operand.
    ///
    /// Every stride vector must have the same length as `shape`.
    pub fn new(shape: &[usize], strides: [Vec<usize>; K]) -> Self {
        debug_assert!(strides.iter().all(|s| s.len() == shape.len()));
        Self {
            shape: shape.to_vec(),
            strides,
            index: vec![0; shape.len()],
            offsets: [0; K],
            remaining: numel(shape),
        }
    }

    /// Returns the multi-dimensional index of the next element.
    pub fn index(&self) -> &[usize] {
        &self.index
    }

    fn step(&mut self) {
        for d in (0..self.shape.len()).rev() {
            self.index[d] += 1;
            for k in 0..K {
                self.offsets[k] += self.strides[k][d];
            }
            if self.index[d] < self.shape[d] {
                return;
            }
            for k in 0..K {
                self.offsets[k] -= self.strides[k][d] * self.shape[d];
            }
            self.index[d] = 0;
        }
    }
}

impl<const K: usize> Iterator for StridedIter<K> {
    type Item = [usize; K];

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let current = self.offsets;
        self.remaining -= 1;
        if self.remaining > 0 {
            self.step();
        }
        Some(current)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<const K: usize> ExactSizeIterator for StridedIter<K> {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contiguous_strides() {
        assert_eq!(contiguous_strides(&[3], 4), vec![4]);
        assert_eq!(contiguous_strides(&[2, 3], 4), vec![12, 4]);
        assert_eq!(contiguous_strides(&[2, 0, 3], 4), vec![0, 12, 4]);
    }

    #[test]
    fn test_is_contiguous() {
        assert!(is_contiguous(&[2, 3], &[12, 4], 4));
        assert!(!is_contiguous(&[2, 3], &[4, 8], 4));
        assert!(is_contiguous(&[1, 3], &[999, 4], 4));
        assert!(is_contiguous(&[], &[], 4));
    }

    #[test]
    fn test_numel() {
        assert_eq!(numel(&[]), 1);
        assert_eq!(numel(&[2, 3]), 6);
        assert_eq!(numel(&[2, 0]), 0);
        assert_eq!(checked_numel(&[usize::MAX, 2]), None);
    }

    #[test]
    fn test_max_offset() {
        assert_eq!(max_offset(&[2, 3], &[12, 4]), Some(20));
        assert_eq!(max_offset(&[], &[]), Some(0));
        assert_eq!(max_offset(&[0, 3], &[12, 4]), None);
    }

    #[test]
    fn test_unravel_index() {
        assert_eq!(unravel_index(5, &[2, 3]), vec![1, 2]);
        assert_eq!(unravel_index(0, &[]), Vec::<usize>::new());
    }

    #[test]
    fn test_strided_iter_scalar_and_empty() {
        let scalar: Vec<[usize; 1]> = StridedIter::new(&[], [vec![]]).collect();
        assert_eq!(scalar, vec![[0]]);
        let empty: Vec<[usize; 1]> = StridedIter::new(&[2, 0], [vec![0, 4]]).collect();
        assert!(empty.is_empty());
    }

    #[test]
    fn test_strided_iter_transposed() {
        // [2, 3] buffer read as its [3, 2] transpose
        let offsets: Vec<usize> = StridedIter::new(&[3, 2], [vec![4, 12]])
            .map(|[o]| o)
            .collect();
        assert_eq!(offsets, vec![0, 12, 4, 16, 8, 20]);
    }

    #[test]
    fn test_strided_iter_len() {
        let it = StridedIter::new(&[2, 3, 4], [contiguous_strides(&[2, 3, 4], 4)]);
        assert_eq!(it.len(), 24);
        let last = it.last();
        assert_eq!(last, Some([92]));
    }
}
