//! Dense matrix access to rank-1 and rank-2 fields through `ndarray`.

use std::ops::{Deref, DerefMut};

use ndarray::{ArrayViewMut2, s};

use crate::error::{FieldError, Result};
use crate::scalar::Scalar;
use crate::view::FieldView;

/// A field's bytes seen as an `ndarray` matrix.
///
/// Rank-2 fields map to `rows × cols`; rank-1 fields map to an `n × 1`
/// column vector. Writes through the matrix land directly in the segment.
/// Block slicing and elementwise arithmetic come from
/// [`ArrayViewMut2`] via `Deref`.
pub struct MatrixView<'a, T> {
    inner: ArrayViewMut2<'a, T>,
    vector: bool,
}

impl<'a, T: Scalar> MatrixView<'a, T> {
    pub fn rows(&self) -> usize {
        self.inner.nrows()
    }

    pub fn cols(&self) -> usize {
        self.inner.ncols()
    }

    /// Whether this came from a rank-1 field.
    pub fn is_vector(&self) -> bool {
        self.vector
    }

    /// The `height × width` block whose top-left corner is `(row, col)`.
    ///
    /// # Panics
    ///
    /// If the block does not fit inside the matrix.
    pub fn block(
        &mut self,
        row: usize,
        col: usize,
        height: usize,
        width: usize,
    ) -> ArrayViewMut2<'_, T> {
        self.inner.slice_mut(s![row..row + height, col..col + width])
    }

    pub fn into_inner(self) -> ArrayViewMut2<'a, T> {
        self.inner
    }
}

impl<'a, T> Deref for MatrixView<'a, T> {
    type Target = ArrayViewMut2<'a, T>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl<T> DerefMut for MatrixView<'_, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}

impl<T: Scalar> FieldView<T> {
    /// Borrow this view as a dense matrix without copying.
    ///
    /// Fails with [`FieldError::UnsupportedRank`] unless the field has rank
    /// 1 or 2. While the matrix is alive this view cannot be used; other
    /// views of the same field still alias the bytes, exactly as other
    /// processes do.
    pub fn as_matrix(&mut self) -> Result<MatrixView<'_, T>> {
        let (rows, cols, vector) = match *self.shape().dims() {
            [n] => (n, 1, true),
            [rows, cols] => (rows, cols, false),
            ref dims => return Err(FieldError::UnsupportedRank(dims.len())),
        };
        // SAFETY: the pointer addresses rows * cols contiguous, aligned,
        // initialized elements that stay mapped while `self` (and with it the
        // segment) is borrowed; the exclusive borrow of `self` keeps this view
        // from touching them while the matrix exists.
        let inner = unsafe { ArrayViewMut2::from_shape_ptr((rows, cols), self.as_ptr()) };
        Ok(MatrixView { inner, vector })
    }
}
