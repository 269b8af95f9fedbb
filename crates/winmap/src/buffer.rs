use crate::cursor::FixedCursor;
use crate::error::{Error, Result};
use crate::file_info::FileId;
use crate::manager::Manager;

/// A virtual byte array over `[offset, offset + size)` of a file.
///
/// Holds at most one transient [`FixedCursor`] at a time and transparently
/// re-binds it as indexing crosses the boundary of whatever region the
/// manager currently has mapped there. Returned bytes are always owned
/// copies — a reference into a mapping must never escape a call here,
/// because the next access may evict the backing region.
#[derive(Debug)]
pub struct SlidingBuffer {
    id: FileId,
    offset: u64,
    size: u64,
    open_flags: i32,
    current: Option<FixedCursor>,
    closed: bool,
}

impl SlidingBuffer {
    pub(crate) fn new(manager: &mut Manager, id: FileId, offset: u64, size: u64, open_flags: i32) -> Result<Self> {
        let cursor = manager.make_cursor(id.clone(), offset, size, open_flags)?;
        Ok(Self { id, offset, size, open_flags, current: Some(cursor), closed: false })
    }

    pub fn len(&self) -> u64 {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn closed(&self) -> bool {
        self.closed
    }

    /// Reads the single byte at position `i` relative to this buffer's
    /// `offset`. Negative `i` counts from the end.
    pub fn get(&mut self, manager: &mut Manager, i: i64) -> Result<u8> {
        self.check_open()?;
        let idx = self.normalize_strict(i)?;
        let a = self.offset + idx;
        self.ensure_covers(manager, a, 1)?;
        let region = self.current.as_ref().expect("ensure_covers binds a cursor").region()?;
        let rel = (a - region.ofs()) as usize;
        Ok(region.try_bytes(rel, rel + 1)?[0])
    }

    /// Reads `[i, j)` relative to this buffer's `offset` as an owned copy.
    /// Negative bounds count from the end; `j` is clamped to `len()`.
    pub fn get_range(&mut self, manager: &mut Manager, i: i64, j: i64) -> Result<Vec<u8>> {
        self.check_open()?;
        let start = self.normalize_clamped(i);
        let end = self.normalize_clamped(j).max(start);
        if start == end {
            return Ok(Vec::new());
        }

        let a = self.offset + start;
        let b = self.offset + end;

        if let Some(cursor) = &self.current {
            let region = cursor.region()?;
            if region.includes(a) && region.includes(b.saturating_sub(1)) && b < region.ofs_end() {
                let rel_a = (a - region.ofs()) as usize;
                let rel_b = (b - region.ofs()) as usize;
                return Ok(region.try_bytes(rel_a, rel_b)?.to_vec());
            }
        }

        let mut out = Vec::with_capacity((end - start) as usize);
        let mut pos = a;
        let mut remaining = end - start;
        while remaining > 0 {
            self.ensure_covers(manager, pos, remaining)?;
            let region = self.current.as_ref().expect("ensure_covers binds a cursor").region()?;
            let take = remaining.min(region.ofs_end() - pos);
            let rel = (pos - region.ofs()) as usize;
            out.extend_from_slice(&region.try_bytes(rel, rel + take as usize)?);
            pos += take;
            remaining -= take;
        }
        Ok(out)
    }

    /// Releases the currently bound cursor, if any, unbinding this buffer
    /// from the manager entirely.
    pub fn release(&mut self, manager: &mut Manager) -> Result<()> {
        if self.closed {
            return Err(Error::AlreadyReleased);
        }
        if let Some(mut cursor) = self.current.take() {
            cursor.release(manager)?;
        }
        self.closed = true;
        Ok(())
    }

    fn check_open(&self) -> Result<()> {
        if self.closed { Err(Error::AlreadyReleased) } else { Ok(()) }
    }

    fn normalize_strict(&self, i: i64) -> Result<u64> {
        let i = if i < 0 { i + self.size as i64 } else { i };
        if i < 0 || i as u64 >= self.size {
            return Err(Error::IndexOutOfRange { index: i, size: self.size });
        }
        Ok(i as u64)
    }

    fn normalize_clamped(&self, i: i64) -> u64 {
        let i = if i < 0 { i + self.size as i64 } else { i };
        i.clamp(0, self.size as i64) as u64
    }

    fn ensure_covers(&mut self, manager: &mut Manager, a: u64, remaining: u64) -> Result<()> {
        let needs_new = match &self.current {
            Some(c) => !c.region()?.includes(a),
            None => true,
        };
        if needs_new {
            if let Some(mut old) = self.current.take() {
                old.release(manager)?;
            }
            let cursor = manager.make_cursor(self.id.clone(), a, remaining, self.open_flags)?;
            self.current = Some(cursor);
        }
        Ok(())
    }
}
