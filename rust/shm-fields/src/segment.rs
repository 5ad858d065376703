//! Segment attachment.
//!
//! A [`SegmentManager`] attaches to its segment at most once: the first
//! [`attach`](SegmentManager::attach) opens and maps the object, later calls
//! hand out the cached [`Segment`]. [`SegmentManager::shared`] returns the
//! process-wide manager for a source so every part of a process shares one
//! mapping per segment.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use shm_primitives::{AttachError, HeapRegion, Region, ShmObject, normalize_name};

use crate::error::{FieldError, Result};

/// Where a segment lives.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SegmentSource {
    /// POSIX shared-memory object name (`shm_open`). Managers key on the
    /// normalized `/name` form.
    Posix(String),
    /// File mapped with `MAP_SHARED`.
    File(PathBuf),
    /// Zeroed process-local memory of the given size. Nothing outside this
    /// process can see it.
    Anonymous(usize),
}

impl SegmentSource {
    /// A POSIX source; `"grid"` and `"/grid"` are the same segment.
    pub fn posix(name: impl Into<String>) -> Self {
        Self::Posix(normalize_name(&name.into()))
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::File(path.into())
    }

    fn normalized(self) -> Self {
        match self {
            Self::Posix(name) => Self::posix(name),
            other => other,
        }
    }
}

impl fmt::Display for SegmentSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Posix(name) => f.write_str(name),
            Self::File(path) => write!(f, "{}", path.display()),
            Self::Anonymous(size) => write!(f, "<anonymous {size} bytes>"),
        }
    }
}

enum Mapping {
    Shared(ShmObject),
    Heap(HeapRegion),
}

/// An attached segment: a base address and a total size.
///
/// The mapping is released when the last `Arc<Segment>` (held by the manager
/// and by every view into it) is dropped.
pub struct Segment {
    source: SegmentSource,
    mapping: Mapping,
}

impl Segment {
    fn open(source: &SegmentSource) -> Result<Self> {
        let mapping = match source {
            SegmentSource::Posix(name) => {
                Mapping::Shared(ShmObject::open(name).map_err(|e| attach_error(source, e))?)
            }
            SegmentSource::File(path) => {
                Mapping::Shared(ShmObject::open_file(path).map_err(|e| attach_error(source, e))?)
            }
            SegmentSource::Anonymous(size) => {
                let heap = HeapRegion::new_zeroed(*size).map_err(|e| FieldError::SegmentMap {
                    segment: source.to_string(),
                    source: std::io::Error::new(std::io::ErrorKind::InvalidInput, e),
                })?;
                Mapping::Heap(heap)
            }
        };
        Ok(Self {
            source: source.clone(),
            mapping,
        })
    }

    pub fn source(&self) -> &SegmentSource {
        &self.source
    }

    /// The mapped bytes.
    #[inline]
    pub fn region(&self) -> Region {
        match &self.mapping {
            Mapping::Shared(object) => object.region(),
            Mapping::Heap(heap) => heap.region(),
        }
    }

    #[inline]
    pub fn base_address(&self) -> *mut u8 {
        self.region().as_ptr()
    }

    #[inline]
    pub fn total_size(&self) -> usize {
        self.region().len()
    }
}

impl fmt::Debug for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Segment")
            .field("source", &self.source)
            .field("base_address", &self.base_address())
            .field("total_size", &self.total_size())
            .finish()
    }
}

fn attach_error(source: &SegmentSource, e: AttachError) -> FieldError {
    let segment = source.to_string();
    match e {
        AttachError::Open(source) => FieldError::SegmentOpen { segment, source },
        AttachError::Map(source) => FieldError::SegmentMap { segment, source },
    }
}

/// Lazily attaches to one segment and caches the mapping.
pub struct SegmentManager {
    source: SegmentSource,
    slot: Mutex<Option<Arc<Segment>>>,
}

impl SegmentManager {
    pub fn new(source: SegmentSource) -> Self {
        Self {
            source: source.normalized(),
            slot: Mutex::new(None),
        }
    }

    /// The process-wide manager for `source`.
    ///
    /// Repeated calls with an equal source return the same manager. POSIX
    /// names are compared after normalization.
    pub fn shared(source: SegmentSource) -> Arc<SegmentManager> {
        static MANAGERS: OnceLock<Mutex<HashMap<SegmentSource, Arc<SegmentManager>>>> =
            OnceLock::new();
        let source = source.normalized();
        let managers = MANAGERS.get_or_init(|| Mutex::new(HashMap::new()));
        let mut managers = managers.lock().unwrap_or_else(PoisonError::into_inner);
        managers
            .entry(source.clone())
            .or_insert_with(|| Arc::new(SegmentManager::new(source)))
            .clone()
    }

    pub fn source(&self) -> &SegmentSource {
        &self.source
    }

    /// Attach on first call; return the cached segment afterwards.
    ///
    /// Failures are returned to the caller and not cached, so a later call
    /// tries again from scratch.
    pub fn attach(&self) -> Result<Arc<Segment>> {
        let mut slot = self.lock();
        if let Some(segment) = slot.as_ref() {
            return Ok(Arc::clone(segment));
        }

        let segment = match Segment::open(&self.source) {
            Ok(segment) => Arc::new(segment),
            Err(e) => {
                tracing::debug!(segment = %self.source, error = %e, "attach failed");
                return Err(e);
            }
        };
        tracing::info!(
            segment = %self.source,
            size = segment.total_size(),
            "attached shared memory segment"
        );
        *slot = Some(Arc::clone(&segment));
        Ok(segment)
    }

    pub fn is_attached(&self) -> bool {
        self.lock().is_some()
    }

    /// Drop the cached mapping. Returns whether one was cached.
    ///
    /// Views resolved earlier keep their segment mapped until they are
    /// dropped; the next [`attach`](Self::attach) maps the object again.
    pub fn detach(&self) -> bool {
        let Some(segment) = self.lock().take() else {
            return false;
        };
        let views = Arc::strong_count(&segment) - 1;
        if views > 0 {
            tracing::warn!(
                segment = %self.source,
                views,
                "detaching segment that is still referenced by views"
            );
        } else {
            tracing::info!(segment = %self.source, "detached shared memory segment");
        }
        true
    }

    fn lock(&self) -> MutexGuard<'_, Option<Arc<Segment>>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for SegmentManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SegmentManager")
            .field("source", &self.source)
            .field("attached", &self.is_attached())
            .finish()
    }
}
