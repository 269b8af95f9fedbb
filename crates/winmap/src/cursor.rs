use std::cell::Ref;

use crate::error::{Error, Result};
use crate::file_info::{FileInfo, RawFd};
use crate::manager::Manager;
use crate::region::Region;
use std::path::Path;

/// Identifies one live `FixedCursor` inside a `Manager`'s `cursor_index`.
///
/// Not exported: callers address a cursor through the `FixedCursor` value
/// itself, never through this id directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct CursorId(pub(crate) u64);

/// A read handle bound to exactly one [`Region`] for its entire life.
///
/// Released explicitly via [`FixedCursor::release`]; the owning `Manager`
/// is passed into every operation that needs it rather than referenced
/// from the cursor itself, so a cursor never holds a back-pointer into its
/// manager (see the no-cyclic-references rule the manager's design
/// follows).
#[derive(Debug)]
pub struct FixedCursor {
    pub(crate) id: CursorId,
    finfo: FileInfo,
    ofs: u64,
    size: u64,
    region: Option<Region>,
    closed: bool,
}

impl FixedCursor {
    pub(crate) fn new(id: CursorId, finfo: FileInfo, ofs: u64, size: u64, region: Region) -> Self {
        Self { id, finfo, ofs, size, region: Some(region), closed: false }
    }

    pub fn offset(&self) -> u64 {
        self.ofs
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn closed(&self) -> bool {
        self.closed
    }

    /// The region's absolute `[ofs, ofs_end)`, for introspection.
    ///
    /// Fails with [`Error::AlreadyReleased`] once this cursor has been
    /// released — release drops the cursor's own hold on the region, not
    /// just its binding in the manager's `cursor_index`, so eviction can see
    /// the region as unreferenced the moment `release` returns.
    pub fn region(&self) -> Result<&Region> {
        self.region.as_ref().ok_or(Error::AlreadyReleased)
    }

    pub fn path(&self) -> Result<&Path> {
        self.finfo.path()
    }

    pub fn fd(&self) -> Result<RawFd> {
        self.finfo.fd()
    }

    pub fn includes_offset(&self, o: u64) -> bool {
        o >= self.ofs && o < self.ofs + self.size
    }

    /// A read-only view of this cursor's bytes within its bound region.
    pub fn region_bytes(&self) -> Result<Ref<'_, [u8]>> {
        let region = self.region()?;
        let start = (self.ofs - region.ofs()) as usize;
        let end = start + self.size as usize;
        region.try_bytes(start, end)
    }

    /// Yields a new cursor starting where this one ends (by default),
    /// re-invoking `make_cursor` against `manager`.
    pub fn next_cursor(
        &self,
        manager: &mut Manager,
        offset: Option<u64>,
        size: Option<u64>,
        open_flags: i32,
    ) -> Result<FixedCursor> {
        let offset = offset.unwrap_or(self.ofs + self.size);
        manager.make_cursor(self.finfo.id().clone(), offset, size.unwrap_or(0), open_flags)
    }

    /// Unbinds this cursor from its region. The region itself is retained
    /// by the manager for reuse; it becomes eligible for LRU eviction only
    /// once no cursor references it.
    ///
    /// Drops this cursor's own hold on the `Region` (not just its entry in
    /// the manager's `cursor_index`) — the manager's referenced-check is a
    /// bare `Rc::strong_count`, so a released cursor that kept its `region`
    /// field alive would count as a phantom reference until the whole
    /// `FixedCursor` value went out of scope.
    pub fn release(&mut self, manager: &mut Manager) -> Result<()> {
        if self.closed {
            return Err(Error::AlreadyReleased);
        }
        manager.release_cursor(self.id)?;
        self.region = None;
        self.closed = true;
        Ok(())
    }
}
