//! Zero-copy typed views over segment bytes.

use std::fmt;
use std::marker::PhantomData;
use std::mem::align_of;
use std::ptr::NonNull;
use std::sync::Arc;

use crate::error::{FieldError, Result};
use crate::layout::{FieldDescriptor, FieldTag};
use crate::local::LocalCopy;
use crate::scalar::Scalar;
use crate::segment::Segment;
use crate::shape::Shape;

/// A typed, shaped window onto one field of a segment.
///
/// The view reads and writes segment bytes directly; nothing is copied.
/// Reads and writes go through raw pointers, never through Rust references,
/// so any number of views may alias the same bytes (as other processes
/// always may). Cloning a view yields another window on the same bytes.
///
/// There is no synchronization: a value written here is visible to every
/// other process mapping the segment, with no ordering guarantee relative to
/// their own writes.
pub struct FieldView<T: Scalar> {
    segment: Arc<Segment>,
    ptr: NonNull<T>,
    shape: Shape,
    tag: FieldTag,
    // raw-pointer access: neither Send nor Sync
    _marker: PhantomData<*mut T>,
}

impl<T: Scalar> FieldView<T> {
    /// Build a view of `descriptor` inside `segment`.
    ///
    /// This is the only place that turns segment bytes into a typed pointer.
    /// It checks the scalar type, that the field lies inside the mapping, and
    /// that its address is aligned for `T`.
    pub(crate) fn from_segment(
        segment: Arc<Segment>,
        descriptor: &FieldDescriptor,
    ) -> Result<Self> {
        if descriptor.scalar_type != T::TYPE {
            return Err(FieldError::TypeMismatch {
                expected: (descriptor.scalar_type, descriptor.shape.clone()),
                found: (T::TYPE, descriptor.shape.clone()),
            });
        }
        debug_assert_eq!(
            descriptor.byte_size,
            descriptor.element_count() * T::TYPE.size()
        );

        let region = segment.region();
        let Some(base) = region.range(descriptor.offset, descriptor.byte_size) else {
            return Err(FieldError::OutOfBoundsField {
                tag: descriptor.tag.clone(),
                offset: descriptor.offset,
                byte_size: descriptor.byte_size,
                segment_size: region.len(),
            });
        };
        if base.as_ptr() as usize % align_of::<T>() != 0 {
            return Err(FieldError::MisalignedField {
                tag: descriptor.tag.clone(),
                offset: descriptor.offset,
                align: align_of::<T>(),
            });
        }

        Ok(Self {
            segment,
            ptr: base.cast::<T>(),
            shape: descriptor.shape.clone(),
            tag: descriptor.tag.clone(),
            _marker: PhantomData,
        })
    }

    /// Same bytes, different shape. Callers guarantee equal element counts.
    fn with_shape(&self, shape: Shape) -> Self {
        debug_assert_eq!(shape.element_count(), self.len());
        Self {
            segment: Arc::clone(&self.segment),
            ptr: self.ptr,
            shape,
            tag: self.tag.clone(),
            _marker: PhantomData,
        }
    }

    pub fn tag(&self) -> &FieldTag {
        &self.tag
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn rank(&self) -> usize {
        self.shape.rank()
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.shape.element_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn byte_size(&self) -> usize {
        self.len() * size_of::<T>()
    }

    /// The segment this view points into.
    pub fn segment(&self) -> &Arc<Segment> {
        &self.segment
    }

    /// Address of the first element, for handing to external kernels.
    pub fn as_ptr(&self) -> *mut T {
        self.ptr.as_ptr()
    }

    /// Element at a multi-index.
    ///
    /// # Panics
    ///
    /// If the index has the wrong rank or is out of range.
    #[inline]
    pub fn get(&self, index: &[usize]) -> T {
        self.get_flat(self.shape.flat_index(index))
    }

    /// Store at a multi-index.
    ///
    /// # Panics
    ///
    /// If the index has the wrong rank or is out of range.
    #[inline]
    pub fn set(&self, index: &[usize], value: T) {
        self.set_flat(self.shape.flat_index(index), value)
    }

    /// Element at row-major position `k`.
    #[inline]
    pub fn get_flat(&self, k: usize) -> T {
        assert!(k < self.len(), "flat index {k} out of range for {}", self.shape);
        // SAFETY: k is in bounds of a validated, aligned, live field, and
        // every bit pattern is a valid `T`.
        unsafe { self.ptr.as_ptr().add(k).read() }
    }

    /// Store at row-major position `k`.
    #[inline]
    pub fn set_flat(&self, k: usize, value: T) {
        assert!(k < self.len(), "flat index {k} out of range for {}", self.shape);
        // SAFETY: as in get_flat.
        unsafe { self.ptr.as_ptr().add(k).write(value) }
    }

    /// Current contents in row-major order.
    pub fn iter(&self) -> impl Iterator<Item = T> + '_ {
        (0..self.len()).map(move |k| self.get_flat(k))
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.iter().collect()
    }

    pub fn fill(&self, value: T) {
        for k in 0..self.len() {
            self.set_flat(k, value);
        }
    }

    /// Overwrite the whole field from row-major `values`.
    ///
    /// `values` may point into the segment, e.g. a slice of a
    /// [`MatrixView`](crate::MatrixView) over another field. It must not
    /// borrow bytes of this field itself: a shared borrow promises those
    /// bytes do not change while it is alive.
    pub fn write_from_slice(&self, values: &[T]) -> Result<()> {
        if values.len() != self.len() {
            return Err(FieldError::ShapeMismatch {
                expected: self.shape.clone(),
                found: Shape::from([values.len()]),
            });
        }
        // SAFETY: the field holds exactly values.len() elements. `values`
        // may live in the same segment, so no disjointness is assumed.
        unsafe {
            std::ptr::copy(values.as_ptr(), self.ptr.as_ptr(), values.len());
        }
        Ok(())
    }

    /// The same bytes as one dimension of `len()` elements.
    pub fn flatten(&self) -> FieldView<T> {
        self.with_shape(Shape::from([self.len()]))
    }

    /// The same bytes under `new_shape`, which must hold as many elements.
    pub fn reshape(&self, new_shape: impl Into<Shape>) -> Result<FieldView<T>> {
        let new_shape = new_shape.into();
        if new_shape.checked_element_count() != Some(self.len()) {
            return Err(FieldError::ShapeMismatch {
                expected: self.shape.clone(),
                found: new_shape,
            });
        }
        Ok(self.flatten().with_shape(new_shape))
    }

    /// Snapshot the current contents into process-local storage.
    pub fn to_local(&self) -> LocalCopy<T> {
        let mut local = LocalCopy::zeros(self.shape.clone());
        self.copy_to_slice(local.as_mut_slice());
        local
    }

    /// Snapshot the current contents into `dst`, whose shape must match.
    pub fn copy_into(&self, dst: &mut LocalCopy<T>) -> Result<()> {
        if dst.shape() != &self.shape {
            return Err(FieldError::TypeMismatch {
                expected: (T::TYPE, self.shape.clone()),
                found: (T::TYPE, dst.shape().clone()),
            });
        }
        self.copy_to_slice(dst.as_mut_slice());
        Ok(())
    }

    fn copy_to_slice(&self, dst: &mut [T]) {
        debug_assert_eq!(dst.len(), self.len());
        // SAFETY: dst is process-local and exactly as long as the field.
        unsafe {
            std::ptr::copy_nonoverlapping(self.ptr.as_ptr(), dst.as_mut_ptr(), dst.len());
        }
    }
}

impl<T: Scalar> Clone for FieldView<T> {
    fn clone(&self) -> Self {
        self.with_shape(self.shape.clone())
    }
}

impl<T: Scalar> fmt::Debug for FieldView<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldView")
            .field("tag", &self.tag)
            .field("type", &T::TYPE)
            .field("shape", &self.shape)
            .field("ptr", &self.ptr)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::LayoutTable;
    use crate::scalar::ScalarType;
    use crate::segment::{SegmentManager, SegmentSource};

    fn segment(size: usize) -> Arc<Segment> {
        SegmentManager::new(SegmentSource::Anonymous(size))
            .attach()
            .unwrap()
    }

    fn grid_view() -> FieldView<f32> {
        let table = LayoutTable::builder("/t")
            .scalar("n", ScalarType::Int32)
            .field("grid", ScalarType::Float32, [4, 4])
            .build()
            .unwrap();
        let segment = segment(table.total_size());
        FieldView::from_segment(segment, table.get("grid").unwrap()).unwrap()
    }

    #[test]
    fn nested_and_flat_access_share_bytes() {
        let v = grid_view();
        v.set(&[2, 3], 3.25);
        assert_eq!(v.get_flat(11), 3.25);
        v.set_flat(5, 1.5);
        assert_eq!(v.get(&[1, 1]), 1.5);
        assert_eq!(v.len(), 16);
        assert_eq!(v.byte_size(), 64);
    }

    #[test]
    fn field_address_is_base_plus_offset() {
        let v = grid_view();
        let base = v.segment().base_address() as usize;
        assert_eq!(v.as_ptr() as usize - base, 4);
    }

    #[test]
    fn wrong_scalar_type_rejected() {
        let table = LayoutTable::builder("/t")
            .field("grid", ScalarType::Float32, [4])
            .build()
            .unwrap();
        let err = FieldView::<f64>::from_segment(segment(64), table.get("grid").unwrap())
            .unwrap_err();
        assert!(matches!(err, FieldError::TypeMismatch { .. }), "{err}");
    }

    #[test]
    fn field_past_segment_end_rejected() {
        let table = LayoutTable::builder("/t")
            .field("grid", ScalarType::Float32, [4, 4])
            .build()
            .unwrap();
        let err = FieldView::<f32>::from_segment(segment(32), table.get("grid").unwrap())
            .unwrap_err();
        match err {
            FieldError::OutOfBoundsField {
                byte_size,
                segment_size,
                ..
            } => assert_eq!((byte_size, segment_size), (64, 32)),
            other => panic!("unexpected: {other}"),
        }
    }

    #[test]
    fn scalar_field() {
        let table = LayoutTable::builder("/t")
            .scalar("myint", ScalarType::Int32)
            .build()
            .unwrap();
        let v = FieldView::<i32>::from_segment(segment(4), table.get("myint").unwrap()).unwrap();
        assert_eq!(v.rank(), 0);
        assert_eq!(v.get(&[]), 0);
        v.set(&[], 42);
        assert_eq!(v.get_flat(0), 42);
    }

    #[test]
    fn reshape_requires_equal_count() {
        let v = grid_view();
        let r = v.reshape([2, 2, 4]).unwrap();
        assert_eq!(r.shape().dims(), &[2, 2, 4]);
        assert!(matches!(
            v.reshape([3, 5]),
            Err(FieldError::ShapeMismatch { .. })
        ));
        assert!(matches!(
            v.reshape([usize::MAX, 2]),
            Err(FieldError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn write_from_slice_checks_length() {
        let v = grid_view();
        let values: Vec<f32> = (0..16).map(|i| i as f32).collect();
        v.write_from_slice(&values).unwrap();
        assert_eq!(v.to_vec(), values);
        assert!(v.write_from_slice(&values[..15]).is_err());
    }

    #[test]
    fn copy_into_checks_shape() {
        let v = grid_view();
        v.fill(2.0);
        let mut dst = LocalCopy::zeros([4, 4]);
        v.copy_into(&mut dst).unwrap();
        assert!(dst.as_slice().iter().all(|x| *x == 2.0));

        let mut wrong = LocalCopy::zeros([2, 8]);
        assert!(matches!(
            v.copy_into(&mut wrong),
            Err(FieldError::TypeMismatch { .. })
        ));
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn flat_index_past_end_panics() {
        grid_view().get_flat(16);
    }
}
