use std::cell::{Ref, RefCell};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use log::trace;
use memmap2::Mmap;

use crate::error::{Error, Result};
use crate::file_info::FileInfo;
use crate::mmap::map_file;

struct RegionData {
    finfo: FileInfo,
    ofs: u64,
    size: u64,
    mmap: RefCell<Option<Mmap>>,
}

/// One live OS memory mapping: a contiguous, aligned byte range of one
/// file. Has no lifetime of its own — it is owned by whichever `Manager`
/// created it and stays alive only as long as that manager's indexes
/// reference it.
///
/// Cheap to clone (an `Rc` bump). Clones name the *same* mapping: equality
/// and hashing are by identity, not by `(finfo, ofs, size)`, so the
/// manager's indexes never conflate two distinct mappings that happen to
/// cover the same bytes.
pub struct Region(Rc<RegionData>);

impl Region {
    pub(crate) fn create(finfo: FileInfo, ofs: u64, size: u64, open_flags: i32) -> Result<Self> {
        let mmap = map_file(finfo.id(), ofs, size, open_flags)?;
        trace!("mapped {:?} [{ofs}, {})", finfo.id(), ofs + size);
        Ok(Self(Rc::new(RegionData { finfo, ofs, size, mmap: RefCell::new(Some(mmap)) })))
    }

    pub fn finfo(&self) -> &FileInfo {
        &self.0.finfo
    }

    pub fn ofs(&self) -> u64 {
        self.0.ofs
    }

    pub fn size(&self) -> u64 {
        self.0.size
    }

    pub fn ofs_end(&self) -> u64 {
        self.0.ofs + self.0.size
    }

    pub fn includes(&self, offset: u64) -> bool {
        self.0.ofs <= offset && offset < self.ofs_end()
    }

    /// Returns a borrowed view of `[start, end)` relative to the region's
    /// own start. Fails with [`Error::AlreadyReleased`] if the mapping has
    /// been dropped (by eviction, close, or a force-release) while this
    /// handle was still held.
    pub(crate) fn try_bytes(&self, start: usize, end: usize) -> Result<Ref<'_, [u8]>> {
        Ref::filter_map(self.0.mmap.borrow(), |m| m.as_deref().and_then(|b| b.get(start..end)))
            .map_err(|_| Error::AlreadyReleased)
    }

    /// Drops the OS mapping without removing this handle from anywhere it
    /// is still referenced. Any cursor still holding this `Region` observes
    /// subsequent reads failing rather than reading freed memory.
    pub(crate) fn unmap(&self) {
        self.0.mmap.borrow_mut().take();
    }

    pub(crate) fn is_mapped(&self) -> bool {
        self.0.mmap.borrow().is_some()
    }

    /// Number of live handles to this region (this one included).
    pub(crate) fn strong_count(&self) -> usize {
        Rc::strong_count(&self.0)
    }
}

impl Clone for Region {
    fn clone(&self) -> Self {
        Self(Rc::clone(&self.0))
    }
}

impl PartialEq for Region {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Region {}

impl Hash for Region {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (Rc::as_ptr(&self.0) as usize).hash(state);
    }
}

impl fmt::Debug for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Region")
            .field("finfo", &self.0.finfo)
            .field("ofs", &self.0.ofs)
            .field("size", &self.0.size)
            .field("mapped", &self.is_mapped())
            .finish()
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}[{}, {})", self.0.finfo.id(), self.0.ofs, self.ofs_end())
    }
}
