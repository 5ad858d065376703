use std::alloc::{Layout, LayoutError, alloc_zeroed, dealloc, handle_alloc_error};
use std::ptr::NonNull;

/// A contiguous span of mapped bytes addressed by offset.
///
/// A `Region` is a borrowed description of memory owned elsewhere (an
/// [`ShmObject`](crate::ShmObject) or a [`HeapRegion`]). It never frees
/// anything.
#[derive(Clone, Copy, Debug)]
pub struct Region {
    base: NonNull<u8>,
    len: usize,
}

impl Region {
    /// Create a region from a base pointer and length.
    ///
    /// # Safety
    ///
    /// - `base` must be valid for reads and writes of `len` bytes
    /// - the memory must stay mapped for as long as the region (or any
    ///   pointer derived from it) is used
    pub unsafe fn from_raw(base: NonNull<u8>, len: usize) -> Self {
        Self { base, len }
    }

    /// Returns the base pointer of the region.
    #[inline]
    pub fn as_ptr(&self) -> *mut u8 {
        self.base.as_ptr()
    }

    /// Returns the size of the region in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the region has zero length.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns true if `[off, off + len)` lies entirely inside the region.
    #[inline]
    pub fn contains(&self, off: usize, len: usize) -> bool {
        off.checked_add(len).is_some_and(|end| end <= self.len)
    }

    /// Returns a pointer to the start of `[off, off + len)`, or `None` if
    /// the range does not fit inside the region.
    #[inline]
    pub fn range(&self, off: usize, len: usize) -> Option<NonNull<u8>> {
        if !self.contains(off, len) {
            return None;
        }
        // SAFETY: off <= self.len, so the pointer stays within (or one past)
        // the mapping and cannot be null.
        Some(unsafe { NonNull::new_unchecked(self.as_ptr().add(off)) })
    }
}

unsafe impl Send for Region {}
unsafe impl Sync for Region {}

/// Zeroed, 64-byte aligned heap allocation usable as a process-local segment.
pub struct HeapRegion {
    base: NonNull<u8>,
    len: usize,
    layout: Layout,
}

impl HeapRegion {
    /// Allocate a zeroed region of `size` bytes.
    pub fn new_zeroed(size: usize) -> Result<Self, LayoutError> {
        let layout = Layout::from_size_align(size.max(1), 64)?;
        // SAFETY: layout has non-zero size.
        let ptr = unsafe { alloc_zeroed(layout) };
        let Some(base) = NonNull::new(ptr) else {
            handle_alloc_error(layout)
        };
        Ok(Self {
            base,
            len: size,
            layout,
        })
    }

    /// Returns a Region view of this allocation.
    #[inline]
    pub fn region(&self) -> Region {
        // SAFETY: the allocation lives as long as self.
        unsafe { Region::from_raw(self.base, self.len) }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Drop for HeapRegion {
    fn drop(&mut self) {
        unsafe { dealloc(self.base.as_ptr(), self.layout) };
    }
}

unsafe impl Send for HeapRegion {}
unsafe impl Sync for HeapRegion {}
