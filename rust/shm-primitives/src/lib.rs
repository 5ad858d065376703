//! Low-level building blocks for attaching to shared memory.
//!
//! - [`Region`]: a borrowed span of mapped bytes, addressed by offset
//! - [`HeapRegion`]: a zeroed process-local allocation with the same interface
//! - [`ShmObject`]: a `MAP_SHARED` mapping of a POSIX shm object or a file

#![cfg(unix)]

pub mod region;
pub mod shm;

pub use region::{HeapRegion, Region};
pub use shm::{AttachError, Backing, ShmObject, normalize_name};
