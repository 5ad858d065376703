//! Hook for caller-supplied cross-process coordination.
//!
//! Nothing in this crate synchronizes access to segment bytes. Processes that
//! need ordering bring their own mechanism (a named semaphore, a turn-taking
//! flag field, a control socket) and wrap it in [`SegmentSync`];
//! [`FieldRegistry::coordinated`](crate::FieldRegistry::coordinated) then
//! brackets a block of field accesses with it.

use std::io;

/// An externally owned lock or semaphore handle.
pub trait SegmentSync {
    /// Block until this process may access the segment.
    fn acquire(&self) -> io::Result<()>;

    /// Give up access obtained by a successful [`acquire`](Self::acquire).
    fn release(&self);
}

/// No coordination at all; the default for a single writer.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unsynchronized;

impl SegmentSync for Unsynchronized {
    fn acquire(&self) -> io::Result<()> {
        Ok(())
    }

    fn release(&self) {}
}

impl<S: SegmentSync + ?Sized> SegmentSync for &S {
    fn acquire(&self) -> io::Result<()> {
        (**self).acquire()
    }

    fn release(&self) {
        (**self).release()
    }
}

/// Releases its handle on drop.
#[must_use = "the handle is released as soon as the guard is dropped"]
pub struct SyncGuard<'a, S: SegmentSync + ?Sized> {
    sync: &'a S,
}

impl<'a, S: SegmentSync + ?Sized> SyncGuard<'a, S> {
    pub fn acquire(sync: &'a S) -> io::Result<Self> {
        sync.acquire()?;
        Ok(Self { sync })
    }
}

impl<S: SegmentSync + ?Sized> Drop for SyncGuard<'_, S> {
    fn drop(&mut self) {
        self.sync.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[derive(Default)]
    struct Counting {
        held: Cell<bool>,
        acquisitions: Cell<u32>,
    }

    impl SegmentSync for Counting {
        fn acquire(&self) -> io::Result<()> {
            assert!(!self.held.get(), "acquired twice");
            self.held.set(true);
            self.acquisitions.set(self.acquisitions.get() + 1);
            Ok(())
        }

        fn release(&self) {
            self.held.set(false);
        }
    }

    #[test]
    fn guard_releases_on_drop() {
        let sync = Counting::default();
        {
            let _guard = SyncGuard::acquire(&sync).unwrap();
            assert!(sync.held.get());
        }
        assert!(!sync.held.get());
        let _again = SyncGuard::acquire(&sync).unwrap();
        assert_eq!(sync.acquisitions.get(), 2);
    }

    #[test]
    fn unsynchronized_is_a_no_op() {
        let _guard = SyncGuard::acquire(&Unsynchronized).unwrap();
    }
}
