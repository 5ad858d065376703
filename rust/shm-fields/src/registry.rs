//! Resolving tags to views.

use std::sync::Arc;

use crate::error::{FieldError, Result};
use crate::layout::{Field, FieldDescriptor, LayoutTable};
use crate::scalar::Scalar;
use crate::segment::{SegmentManager, SegmentSource};
use crate::sync::{SegmentSync, SyncGuard};
use crate::view::FieldView;

/// A layout table bound to the segment it describes.
///
/// ```no_run
/// use shm_fields::{Field, FieldRegistry, LayoutTable};
///
/// const GRID: Field<f32> = Field::new("grid");
///
/// let registry = FieldRegistry::new(LayoutTable::from_env()?);
/// let grid = registry.field(GRID)?;
/// grid.set(&[2, 3], 3.25);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Clone)]
pub struct FieldRegistry {
    layout: Arc<LayoutTable>,
    segments: Arc<SegmentManager>,
}

impl FieldRegistry {
    /// Bind `layout` to the process-wide manager of the POSIX segment it names.
    pub fn new(layout: LayoutTable) -> Self {
        let segments = SegmentManager::shared(SegmentSource::posix(layout.segment_name()));
        Self::with_manager(layout, segments)
    }

    /// Bind `layout` to an explicit segment manager.
    pub fn with_manager(
        layout: impl Into<Arc<LayoutTable>>,
        segments: Arc<SegmentManager>,
    ) -> Self {
        Self {
            layout: layout.into(),
            segments,
        }
    }

    pub fn layout(&self) -> &LayoutTable {
        &self.layout
    }

    pub fn segments(&self) -> &Arc<SegmentManager> {
        &self.segments
    }

    pub fn descriptor(&self, tag: &str) -> Result<&FieldDescriptor> {
        self.layout.get(tag)
    }

    /// Resolve `tag` to a zero-copy view, attaching to the segment on first
    /// use.
    pub fn resolve<T: Scalar>(&self, tag: &str) -> Result<FieldView<T>> {
        let segment = self.segments.attach()?;
        let descriptor = self.layout.get(tag)?;
        let view = FieldView::from_segment(segment, descriptor)?;
        tracing::debug!(
            tag,
            scalar_type = %descriptor.scalar_type,
            shape = %descriptor.shape,
            offset = descriptor.offset,
            "resolved field"
        );
        Ok(view)
    }

    /// Resolve a typed tag.
    pub fn field<T: Scalar>(&self, field: Field<T>) -> Result<FieldView<T>> {
        self.resolve(field.tag())
    }

    /// Run `f` while holding the caller's coordination handle.
    pub fn coordinated<S, R>(&self, sync: &S, f: impl FnOnce(&Self) -> R) -> Result<R>
    where
        S: SegmentSync + ?Sized,
    {
        let _guard = SyncGuard::acquire(sync).map_err(FieldError::Coordination)?;
        Ok(f(self))
    }
}
