//! Read-only OS mapping creation.
//!
//! Mirrors the teacher crate's "open, map, close the descriptor" sequence,
//! adapted for a read-only `Mmap` instead of a `MmapMut`: the mapping stays
//! alive independent of the file descriptor once created, so the
//! descriptor (or, for [`FileId::Fd`], the `dup`'d copy of the caller's
//! descriptor) is dropped immediately after mapping.

use std::fs::{File, OpenOptions};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::FromRawFd;

use memmap2::{Mmap, MmapOptions};

use crate::file_info::FileId;
use crate::Result;

/// Opens `id` and maps `[offset, offset + size)` of it read-only.
///
/// `open_flags` are OR-ed onto the `open()` call, never onto the mapping
/// itself, per the library's external contract.
pub(crate) fn map_file(id: &FileId, offset: u64, size: u64, open_flags: i32) -> Result<Mmap> {
    let file = open_for_mapping(id, open_flags)?;
    let mmap = unsafe { MmapOptions::new().offset(offset).len(size as usize).map(&file)? };
    Ok(mmap)
}

fn open_for_mapping(id: &FileId, open_flags: i32) -> Result<File> {
    match id {
        FileId::Path(path) => Ok(OpenOptions::new().read(true).custom_flags(open_flags).open(path)?),
        FileId::Fd(fd) => {
            // SAFETY: `dup` returns a new descriptor referring to the same
            // open file description; we take ownership of only the copy.
            let dup = unsafe { libc::dup(*fd) };
            if dup < 0 {
                return Err(std::io::Error::last_os_error().into());
            }
            // SAFETY: `dup` succeeded, so `dup` is a valid, owned descriptor.
            Ok(unsafe { File::from_raw_fd(dup) })
        }
    }
}
