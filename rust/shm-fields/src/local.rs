//! Process-local copies of field contents.

use std::ops::{Index, IndexMut};

use crate::error::{FieldError, Result};
use crate::scalar::Scalar;
use crate::shape::Shape;

/// An owned, process-local array with a shape.
///
/// Produced by [`FieldView::to_local`](crate::FieldView::to_local) or
/// filled by [`FieldView::copy_into`](crate::FieldView::copy_into). It shares
/// nothing with the segment it was copied from.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalCopy<T: Scalar> {
    data: Vec<T>,
    shape: Shape,
}

impl<T: Scalar> LocalCopy<T> {
    /// Default-initialized (zero) storage of `shape`.
    pub fn zeros(shape: impl Into<Shape>) -> Self {
        let shape = shape.into();
        Self {
            data: vec![T::default(); shape.element_count()],
            shape,
        }
    }

    /// Wrap row-major `data`; its length must match `shape`.
    pub fn from_vec(shape: impl Into<Shape>, data: Vec<T>) -> Result<Self> {
        let shape = shape.into();
        if shape.checked_element_count() != Some(data.len()) {
            return Err(FieldError::ShapeMismatch {
                expected: shape,
                found: Shape::from([data.len()]),
            });
        }
        Ok(Self { data, shape })
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn get(&self, index: &[usize]) -> T {
        self.data[self.shape.flat_index(index)]
    }

    pub fn set(&mut self, index: &[usize], value: T) {
        let k = self.shape.flat_index(index);
        self.data[k] = value;
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn into_vec(self) -> Vec<T> {
        self.data
    }
}

impl<T: Scalar, const N: usize> Index<[usize; N]> for LocalCopy<T> {
    type Output = T;

    fn index(&self, index: [usize; N]) -> &T {
        &self.data[self.shape.flat_index(&index)]
    }
}

impl<T: Scalar, const N: usize> IndexMut<[usize; N]> for LocalCopy<T> {
    fn index_mut(&mut self, index: [usize; N]) -> &mut T {
        let k = self.shape.flat_index(&index);
        &mut self.data[k]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indexing() {
        let mut c = LocalCopy::<f64>::zeros([2, 3]);
        c[[1, 2]] = 4.0;
        c.set(&[0, 1], 1.0);
        assert_eq!(c.get(&[1, 2]), 4.0);
        assert_eq!(c.as_slice(), &[0.0, 1.0, 0.0, 0.0, 0.0, 4.0]);
    }

    #[test]
    fn from_vec_checks_length() {
        let c = LocalCopy::from_vec([2, 2], vec![1u8, 2, 3, 4]).unwrap();
        assert_eq!(c[[1, 0]], 3);
        assert!(LocalCopy::from_vec([2, 2], vec![1u8, 2, 3]).is_err());
    }

    #[test]
    fn scalar_copy() {
        let mut c = LocalCopy::<i32>::zeros(Shape::scalar());
        c.set(&[], 9);
        assert_eq!(c.len(), 1);
        assert_eq!(c.into_vec(), vec![9]);
    }
}
