//! Field shapes and row-major index arithmetic.

use std::fmt;

/// Ordered dimension extents of a field. The empty shape is a scalar.
///
/// Storage is row-major: the last dimension is contiguous.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Shape(Vec<usize>);

impl Shape {
    pub fn new(dims: impl Into<Vec<usize>>) -> Self {
        Self(dims.into())
    }

    /// The rank-0 shape.
    pub fn scalar() -> Self {
        Self(Vec::new())
    }

    #[inline]
    pub fn dims(&self) -> &[usize] {
        &self.0
    }

    #[inline]
    pub fn rank(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_scalar(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of elements; 1 for a scalar.
    #[inline]
    pub fn element_count(&self) -> usize {
        self.0.iter().product()
    }

    /// Number of elements, or `None` on overflow.
    pub fn checked_element_count(&self) -> Option<usize> {
        self.0.iter().try_fold(1usize, |acc, d| acc.checked_mul(*d))
    }

    /// Row-major strides in elements. The last stride is 1.
    pub fn strides(&self) -> Vec<usize> {
        let mut strides = vec![1; self.0.len()];
        for d in (0..self.0.len().saturating_sub(1)).rev() {
            strides[d] = strides[d + 1] * self.0[d + 1];
        }
        strides
    }

    /// Flat offset of a multi-index.
    ///
    /// # Panics
    ///
    /// If `index` has the wrong rank or any component is out of range.
    pub fn flat_index(&self, index: &[usize]) -> usize {
        assert_eq!(
            index.len(),
            self.0.len(),
            "index {index:?} has rank {}, shape {self} has rank {}",
            index.len(),
            self.0.len()
        );
        let mut flat = 0;
        for (i, (&idx, &extent)) in index.iter().zip(&self.0).enumerate() {
            assert!(
                idx < extent,
                "index {idx} out of range for dimension {i} of shape {self}"
            );
            flat = flat * extent + idx;
        }
        flat
    }
}

impl From<Vec<usize>> for Shape {
    fn from(dims: Vec<usize>) -> Self {
        Self(dims)
    }
}

impl From<&[usize]> for Shape {
    fn from(dims: &[usize]) -> Self {
        Self(dims.to_vec())
    }
}

impl<const N: usize> From<[usize; N]> for Shape {
    fn from(dims: [usize; N]) -> Self {
        Self(dims.to_vec())
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_shape_has_one_element() {
        let s = Shape::scalar();
        assert!(s.is_scalar());
        assert_eq!(s.element_count(), 1);
        assert_eq!(s.flat_index(&[]), 0);
        assert!(s.strides().is_empty());
    }

    #[test]
    fn row_major_strides() {
        let s = Shape::from([2, 3, 4]);
        assert_eq!(s.strides(), vec![12, 4, 1]);
        assert_eq!(s.flat_index(&[1, 2, 3]), 23);
        assert_eq!(s.flat_index(&[0, 1, 0]), 4);
    }

    #[test]
    fn overflow_is_detected() {
        let s = Shape::from([usize::MAX, 2]);
        assert_eq!(s.checked_element_count(), None);
        assert_eq!(Shape::from([3, 5]).checked_element_count(), Some(15));
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn out_of_range_index_panics() {
        Shape::from([4, 4]).flat_index(&[4, 0]);
    }

    #[test]
    #[should_panic(expected = "rank")]
    fn wrong_rank_index_panics() {
        Shape::from([4, 4]).flat_index(&[1]);
    }

    #[test]
    fn displays_as_list() {
        assert_eq!(Shape::from([4, 4]).to_string(), "[4, 4]");
        assert_eq!(Shape::scalar().to_string(), "[]");
    }
}
