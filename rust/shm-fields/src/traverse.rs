//! Elementwise traversal over arrays of any rank.
//!
//! Everything here walks the flattened index space once, in row-major
//! order. Where a callback needs the multi-index, it is derived from the flat
//! position with strides computed once per traversal, so no recursion over
//! the rank is needed.

use crate::error::{FieldError, Result};
use crate::local::LocalCopy;
use crate::scalar::Scalar;
use crate::shape::Shape;
use crate::view::FieldView;

/// Row-major readable elements.
pub trait Elements<T: Scalar> {
    fn shape(&self) -> &Shape;

    /// Element at row-major position `k`.
    fn read(&self, k: usize) -> T;

    fn len(&self) -> usize {
        self.shape().element_count()
    }
}

/// Row-major writable elements.
pub trait ElementsMut<T: Scalar>: Elements<T> {
    fn write(&mut self, k: usize, value: T);
}

impl<T: Scalar> Elements<T> for FieldView<T> {
    fn shape(&self) -> &Shape {
        FieldView::shape(self)
    }

    fn read(&self, k: usize) -> T {
        self.get_flat(k)
    }
}

impl<T: Scalar> ElementsMut<T> for FieldView<T> {
    fn write(&mut self, k: usize, value: T) {
        self.set_flat(k, value)
    }
}

impl<T: Scalar> Elements<T> for LocalCopy<T> {
    fn shape(&self) -> &Shape {
        LocalCopy::shape(self)
    }

    fn read(&self, k: usize) -> T {
        self.as_slice()[k]
    }
}

impl<T: Scalar> ElementsMut<T> for LocalCopy<T> {
    fn write(&mut self, k: usize, value: T) {
        self.as_mut_slice()[k] = value;
    }
}

/// Replace every element with `f(element)`, in place.
pub fn apply<T, V>(view: &mut V, mut f: impl FnMut(T) -> T)
where
    T: Scalar,
    V: ElementsMut<T> + ?Sized,
{
    for k in 0..view.len() {
        let value = view.read(k);
        view.write(k, f(value));
    }
}

/// Write `f(src[i])` to `dst[i]` for every position `i`.
///
/// `src` and `dst` must have identical shapes.
pub fn apply_to<T, U, S, D>(src: &S, dst: &mut D, mut f: impl FnMut(T) -> U) -> Result<()>
where
    T: Scalar,
    U: Scalar,
    S: Elements<T> + ?Sized,
    D: ElementsMut<U> + ?Sized,
{
    if src.shape() != dst.shape() {
        return Err(FieldError::ShapeMismatch {
            expected: src.shape().clone(),
            found: dst.shape().clone(),
        });
    }
    for k in 0..src.len() {
        dst.write(k, f(src.read(k)));
    }
    Ok(())
}

/// Like [`apply`], but `f` also receives the element's multi-index.
pub fn apply_indexed<T, V>(view: &mut V, mut f: impl FnMut(&[usize], T) -> T)
where
    T: Scalar,
    V: ElementsMut<T> + ?Sized,
{
    let shape = view.shape().clone();
    let mut k = 0;
    for_each_index(&shape, |index| {
        let value = view.read(k);
        view.write(k, f(index, value));
        k += 1;
    });
}

/// Call `f` with every multi-index of `shape`, in row-major order.
///
/// A scalar shape yields one empty index; a shape with a zero extent yields
/// nothing.
pub fn for_each_index(shape: &Shape, mut f: impl FnMut(&[usize])) {
    let dims = shape.dims();
    if dims.contains(&0) {
        return;
    }
    let strides = shape.strides();
    let mut index = vec![0usize; dims.len()];
    for k in 0..shape.element_count() {
        for ((slot, &stride), &extent) in index.iter_mut().zip(&strides).zip(dims) {
            *slot = k / stride % extent;
        }
        f(&index);
    }
}
