//! File identity: the thing a `Region` maps a byte range of.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// A raw, caller-owned file descriptor. The manager never closes these —
/// see [`FileId::Fd`].
pub type RawFd = i32;

/// How a file is identified when registering it with a [`crate::Manager`].
///
/// A path is reopened on every mapping (per the library's external
/// contract); a descriptor is `dup`'d for each mapping and the duplicate
/// closed immediately after — the original, caller-owned descriptor is
/// never touched.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FileId {
    Path(PathBuf),
    Fd(RawFd),
}

impl FileId {
    pub fn as_path(&self) -> Option<&Path> {
        match self {
            FileId::Path(p) => Some(p),
            FileId::Fd(_) => None,
        }
    }

    pub fn as_fd(&self) -> Option<RawFd> {
        match self {
            FileId::Fd(fd) => Some(*fd),
            FileId::Path(_) => None,
        }
    }
}

/// Immutable record of a file's identity and its size at registration time.
///
/// Created lazily on first reference to a file id and cached by the
/// manager's `path_index`; never mutated after construction (a file growing
/// while mapped is an explicit non-goal).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileInfo {
    pub(crate) id: FileId,
    pub(crate) size: u64,
}

impl FileInfo {
    pub(crate) fn new(id: FileId, size: u64) -> Self {
        Self { id, size }
    }

    pub fn id(&self) -> &FileId {
        &self.id
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// The path this file was registered under.
    ///
    /// Fails with [`Error::NotAPath`] if it was registered from a raw
    /// descriptor instead.
    pub fn path(&self) -> Result<&Path> {
        self.id.as_path().ok_or(Error::NotAPath)
    }

    /// The descriptor this file was registered under.
    ///
    /// Fails with [`Error::NotAFd`] if it was registered from a path
    /// instead.
    pub fn fd(&self) -> Result<RawFd> {
        self.id.as_fd().ok_or(Error::NotAFd)
    }
}

/// Queries the current size of `id`, used when registering a `FileInfo`.
pub(crate) fn stat_size(id: &FileId) -> Result<u64> {
    match id {
        FileId::Path(path) => Ok(std::fs::metadata(path)?.len()),
        FileId::Fd(fd) => {
            let mut stat: libc::stat = unsafe { std::mem::zeroed() };
            // SAFETY: `stat` is a valid out-pointer for `fstat`.
            let rc = unsafe { libc::fstat(*fd, &mut stat) };
            if rc != 0 {
                return Err(std::io::Error::last_os_error().into());
            }
            Ok(stat.st_size as u64)
        }
    }
}
