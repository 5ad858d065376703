//! Shared mappings of POSIX shared-memory objects and regular files.
//!
//! Both kinds are mapped `MAP_SHARED`, so every process that maps the same
//! object sees the same bytes. Nothing here synchronizes access.

use std::ffi::CString;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::os::unix::io::{AsRawFd, FromRawFd};
use std::path::{Path, PathBuf};
use std::ptr::NonNull;

use crate::Region;

/// What a [`ShmObject`] is mapped from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Backing {
    /// A POSIX shared-memory object, by its normalized `/name`.
    Posix(String),
    /// A regular file (e.g. under `/dev/shm` or a tempdir).
    File(PathBuf),
}

impl fmt::Display for Backing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Posix(name) => write!(f, "shm:{name}"),
            Self::File(path) => write!(f, "file:{}", path.display()),
        }
    }
}

/// Errors from opening and mapping a shared object.
#[derive(Debug)]
pub enum AttachError {
    /// The object does not exist or cannot be opened read/write.
    Open(io::Error),
    /// The object was opened but could not be sized or mapped.
    Map(io::Error),
}

impl fmt::Display for AttachError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open(e) => write!(f, "open failed: {e}"),
            Self::Map(e) => write!(f, "mmap failed: {e}"),
        }
    }
}

impl std::error::Error for AttachError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Open(e) | Self::Map(e) => Some(e),
        }
    }
}

/// A read/write `MAP_SHARED` mapping of a whole shared object.
///
/// An object returned by one of the `create` constructors owns its backing
/// object and removes it (`shm_unlink` / file removal) on drop. Objects
/// returned by the `open` constructors never remove anything.
pub struct ShmObject {
    ptr: NonNull<u8>,
    len: usize,
    /// Kept open for the lifetime of the mapping.
    #[allow(dead_code)]
    file: File,
    backing: Backing,
    owns_backing: bool,
}

impl ShmObject {
    /// Create a new POSIX shared-memory object of `size` bytes and map it.
    ///
    /// Fails if an object with that name already exists. The object is
    /// created with permissions 0600 and zero-filled by the OS.
    pub fn create(name: &str, size: usize) -> Result<Self, AttachError> {
        if size == 0 {
            return Err(AttachError::Map(io::Error::new(
                io::ErrorKind::InvalidInput,
                "size must be > 0",
            )));
        }
        let name = normalize_name(name);
        let file = shm_open(&name, libc::O_RDWR | libc::O_CREAT | libc::O_EXCL)
            .map_err(AttachError::Open)?;
        let backing = Backing::Posix(name);

        if let Err(e) = file.set_len(size as u64) {
            unlink(&backing);
            return Err(AttachError::Map(e));
        }
        match map_shared(&file, size) {
            Ok(ptr) => Ok(Self {
                ptr,
                len: size,
                file,
                backing,
                owns_backing: true,
            }),
            Err(e) => {
                unlink(&backing);
                Err(AttachError::Map(e))
            }
        }
    }

    /// Open an existing POSIX shared-memory object and map all of it.
    ///
    /// The mapping size is the object's current size.
    pub fn open(name: &str) -> Result<Self, AttachError> {
        let name = normalize_name(name);
        let file = shm_open(&name, libc::O_RDWR).map_err(AttachError::Open)?;
        Self::map_existing(file, Backing::Posix(name))
    }

    /// Create a file of `size` bytes at `path` and map it.
    ///
    /// The file is truncated if it exists and gets permissions 0600.
    pub fn create_file(path: &Path, size: usize) -> Result<Self, AttachError> {
        if size == 0 {
            return Err(AttachError::Map(io::Error::new(
                io::ErrorKind::InvalidInput,
                "size must be > 0",
            )));
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .map_err(AttachError::Open)?;
        file.set_permissions(std::fs::Permissions::from_mode(0o600))
            .map_err(AttachError::Open)?;
        file.set_len(size as u64).map_err(AttachError::Map)?;

        let ptr = map_shared(&file, size).map_err(AttachError::Map)?;
        Ok(Self {
            ptr,
            len: size,
            file,
            backing: Backing::File(path.to_path_buf()),
            owns_backing: true,
        })
    }

    /// Open an existing file and map all of it.
    pub fn open_file(path: &Path) -> Result<Self, AttachError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(AttachError::Open)?;
        Self::map_existing(file, Backing::File(path.to_path_buf()))
    }

    fn map_existing(file: File, backing: Backing) -> Result<Self, AttachError> {
        let size = file.metadata().map_err(AttachError::Map)?.len() as usize;
        if size == 0 {
            return Err(AttachError::Map(io::Error::new(
                io::ErrorKind::InvalidData,
                "shared object is empty",
            )));
        }
        let ptr = map_shared(&file, size).map_err(AttachError::Map)?;
        Ok(Self {
            ptr,
            len: size,
            file,
            backing,
            owns_backing: false,
        })
    }

    /// Get a `Region` view of this mapping.
    #[inline]
    pub fn region(&self) -> Region {
        // SAFETY: the mapping is valid for the lifetime of self.
        unsafe { Region::from_raw(self.ptr, self.len) }
    }

    /// Size of the mapping in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn backing(&self) -> &Backing {
        &self.backing
    }

    /// Whether the backing object is removed when this mapping drops.
    #[inline]
    pub fn owns_backing(&self) -> bool {
        self.owns_backing
    }

    /// Keep the backing object alive after this mapping drops.
    pub fn release_ownership(&mut self) {
        self.owns_backing = false;
    }
}

impl Drop for ShmObject {
    fn drop(&mut self) {
        let rc = unsafe { libc::munmap(self.ptr.as_ptr() as *mut libc::c_void, self.len) };
        if rc != 0 {
            tracing::error!(
                error = %io::Error::last_os_error(),
                size = self.len,
                backing = %self.backing,
                "munmap failed"
            );
        } else {
            tracing::trace!(size = self.len, backing = %self.backing, "unmapped shared object");
        }

        if self.owns_backing {
            unlink(&self.backing);
        }
    }
}

// SAFETY: the mapping is valid for the lifetime of ShmObject; concurrent
// access to the bytes is the caller's concern.
unsafe impl Send for ShmObject {}
unsafe impl Sync for ShmObject {}

/// Canonical form of a POSIX shm name: exactly one leading slash.
///
/// `"grid"`, `"/grid"` and `"//grid"` all name the same object.
pub fn normalize_name(name: &str) -> String {
    format!("/{}", name.trim_start_matches('/'))
}

fn c_name(name: &str) -> io::Result<CString> {
    CString::new(name).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            "shared memory name contains a NUL byte",
        )
    })
}

fn shm_open(name: &str, flags: libc::c_int) -> io::Result<File> {
    let c_name = c_name(name)?;
    let fd = unsafe { libc::shm_open(c_name.as_ptr(), flags, 0o600 as libc::c_uint) };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: fd is a freshly opened descriptor that nothing else owns.
    Ok(unsafe { File::from_raw_fd(fd) })
}

fn map_shared(file: &File, len: usize) -> io::Result<NonNull<u8>> {
    let ptr = unsafe {
        libc::mmap(
            std::ptr::null_mut(),
            len,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_SHARED,
            file.as_raw_fd(),
            0,
        )
    };
    if ptr == libc::MAP_FAILED {
        return Err(io::Error::last_os_error());
    }
    NonNull::new(ptr as *mut u8).ok_or_else(|| io::Error::other("mmap returned null"))
}

fn unlink(backing: &Backing) {
    let result = match backing {
        Backing::Posix(name) => c_name(name).and_then(|c| {
            if unsafe { libc::shm_unlink(c.as_ptr()) } == 0 {
                Ok(())
            } else {
                Err(io::Error::last_os_error())
            }
        }),
        Backing::File(path) => std::fs::remove_file(path),
    };
    if let Err(e) = result {
        tracing::warn!(error = %e, backing = %backing, "failed to remove shared object");
    }
}
