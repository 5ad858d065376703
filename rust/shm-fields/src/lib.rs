//! Typed, tag-addressed views over a shared memory segment.
//!
//! An external generator sizes a shared memory segment and decides where
//! every field lives; it publishes that decision as a layout schema. Every
//! other process loads the same schema into a [`LayoutTable`], binds it to
//! the segment with a [`FieldRegistry`], and resolves fields by tag:
//!
//! ```no_run
//! use shm_fields::{FieldRegistry, LayoutTable, traverse};
//!
//! let registry = FieldRegistry::new(LayoutTable::from_json_path("shm_layout.json")?);
//!
//! let mut grid = registry.resolve::<f32>("grid")?;   // attaches on first use
//! grid.set(&[2, 3], 3.25);                           // straight into shared memory
//!
//! let flat = grid.flatten();                         // same bytes, rank 1
//! assert_eq!(flat.get_flat(2 * 4 + 3), 3.25);
//!
//! let snapshot = grid.to_local();                    // owned, decoupled copy
//! traverse::apply(&mut grid, |x| x * 0.5);
//! assert_eq!(snapshot.get(&[2, 3]), 3.25);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! The segment has no header and no embedded schema. Processes that disagree
//! on the layout read and write the wrong bytes without any error.
//!
//! Nothing here synchronizes access between processes; see [`sync`] for the
//! hook that lets callers bring their own.

#![cfg(unix)]

pub mod error;
pub mod layout;
pub mod local;
pub mod numeric;
pub mod registry;
pub mod scalar;
pub mod schema;
pub mod segment;
pub mod shape;
pub mod sync;
pub mod traverse;
pub mod view;

pub use error::{FieldError, Result, SchemaError};
pub use layout::{Field, FieldDescriptor, FieldTag, LayoutBuilder, LayoutTable};
pub use local::LocalCopy;
pub use numeric::MatrixView;
pub use registry::FieldRegistry;
pub use scalar::{Scalar, ScalarType};
pub use schema::{LAYOUT_ENV, SEGMENT_ENV};
pub use segment::{Segment, SegmentManager, SegmentSource};
pub use shape::Shape;
pub use shm_primitives::ShmObject;
pub use sync::{SegmentSync, SyncGuard, Unsynchronized};
pub use traverse::{Elements, ElementsMut, apply, apply_indexed, apply_to, for_each_index};
pub use view::FieldView;
