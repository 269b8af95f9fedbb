//! The component that owns every `FileInfo`, `Region`, and `Cursor`, and
//! implements region selection, creation, eviction, and the LRU policy.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::fmt;

use log::{debug, trace, warn};

use crate::buffer::SlidingBuffer;
use crate::cursor::{CursorId, FixedCursor};
use crate::error::{Error, Result};
use crate::file_info::{stat_size, FileId, FileInfo};
use crate::geometry::{allocation_granularity, default_max_memory_size, default_window_size, WindowGeometry};
use crate::region::Region;
use crate::relation::{Relation, RelationConfig};

/// Which placement strategy a `Manager` uses for new regions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flavor {
    /// One region per file, covering it entirely.
    Greedy,
    /// Many disjoint, windowed regions per file.
    Tiling,
}

/// Owns all `FileInfo`s, `Region`s, and `Cursor`s for a set of files and
/// implements the sliding-window caching policy described in the crate
/// docs. Not `Send`/`Sync`: this type is single-threaded by design, see the
/// crate-level docs.
pub struct Manager {
    flavor: Flavor,
    window_size: u64,
    max_memory_size: u64,
    max_regions_count: u64,
    path_index: Relation<FileId, FileInfo>,
    region_index: Relation<Region, ()>,
    cursor_index: Relation<CursorId, Region>,
    regions_by_file: HashMap<FileId, Vec<Region>>,
    next_cursor_id: u64,
    closed: bool,
}

impl Manager {
    /// Creates a manager that maps many small, disjoint windows per file.
    ///
    /// `window_size < 0` picks a platform default; `window_size == 0` means
    /// no per-region cap. `max_memory_size == 0` picks a platform default.
    /// `max_regions_count == 0` means no cap.
    pub fn new_tiling(window_size: i64, max_memory_size: u64, max_regions_count: u64) -> Self {
        Self::new(Flavor::Tiling, window_size, max_memory_size, max_regions_count)
    }

    /// Creates a manager that maps each file in a single region covering it
    /// entirely. See [`Manager::new_tiling`] for the sentinel meanings.
    pub fn new_greedy(window_size: i64, max_memory_size: u64, max_regions_count: u64) -> Self {
        Self::new(Flavor::Greedy, window_size, max_memory_size, max_regions_count)
    }

    fn new(flavor: Flavor, window_size: i64, max_memory_size: u64, max_regions_count: u64) -> Self {
        let window_size = if window_size < 0 { default_window_size() } else { window_size as u64 };
        let max_memory_size = if max_memory_size == 0 { default_max_memory_size() } else { max_memory_size };
        let max_regions_count = if max_regions_count == 0 { u64::MAX } else { max_regions_count };
        Self {
            flavor,
            window_size,
            max_memory_size,
            max_regions_count,
            path_index: Relation::new(RelationConfig::one_to_one()),
            region_index: Relation::new(RelationConfig::many_to_one()),
            cursor_index: Relation::new(RelationConfig::many_to_one()),
            regions_by_file: HashMap::new(),
            next_cursor_id: 0,
            closed: false,
        }
    }

    /// Binds a new [`FixedCursor`] to `[offset, offset + size)` of `id`
    /// (`size == 0` means "as much as the manager's geometry will give
    /// you").
    pub fn make_cursor(&mut self, id: FileId, offset: u64, size: u64, open_flags: i32) -> Result<FixedCursor> {
        if self.closed {
            return Err(Error::Unsupported("manager is closed"));
        }
        let finfo = self.resolve_file_info(id)?;
        if offset >= finfo.size() {
            return Err(Error::OutOfRange { offset, file_size: finfo.size() });
        }

        let region = self.select_region(&finfo, offset, size, open_flags)?;

        let mut observable = (finfo.size() - offset).min(region.ofs_end() - offset);
        if size > 0 {
            observable = observable.min(size);
        }

        let cursor_id = CursorId(self.next_cursor_id);
        self.next_cursor_id += 1;
        self.cursor_index.put(cursor_id, region.clone())?;
        self.region_index.hit(&region)?;
        trace!("cursor {} bound to {}", cursor_id.0, region);

        Ok(FixedCursor::new(cursor_id, finfo, offset, observable, region))
    }

    /// Creates a [`SlidingBuffer`] over `[offset, offset + size)` of `id`.
    pub fn make_buffer(&mut self, id: FileId, offset: u64, size: u64, open_flags: i32) -> Result<SlidingBuffer> {
        SlidingBuffer::new(self, id, offset, size, open_flags)
    }

    pub(crate) fn release_cursor(&mut self, id: CursorId) -> Result<()> {
        self.cursor_index.take(&id).map(|_| ()).map_err(|_| Error::AlreadyReleased)
    }

    /// Evicts every currently-unreferenced region. Equivalent to
    /// `evict(0)`. Returns the number of regions freed.
    pub fn collect(&mut self) -> usize {
        self.evict(0)
    }

    /// Attempts to close every mapping. If any region is still referenced
    /// by a live cursor, it cannot be unmapped: the rest are closed, the
    /// manager stays open, and the offending regions are reported.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }

        // Evicting unmaps everything not still held by a live cursor;
        // whatever is left afterward is exactly the set close() cannot
        // close without breaking an outstanding reader.
        self.evict(0);

        let still_mapped: Vec<String> = self.region_index.iter_lru().map(|(r, _)| r.to_string()).collect();
        if !still_mapped.is_empty() {
            warn!("close() left {} region(s) still mapped", still_mapped.len());
            return Err(Error::CloseWithActive { regions: still_mapped });
        }

        self.cursor_index.clear();
        self.path_index.clear();
        self.region_index.clear();
        self.regions_by_file.clear();
        self.closed = true;
        Ok(())
    }

    /// Force-releases every region whose file id is a path starting with
    /// `prefix`, regardless of whether cursors still reference it.
    ///
    /// Intended only for platforms that forbid deleting files with open
    /// mappings. Any cursor still bound to a force-released region will
    /// fail on its next read with [`Error::AlreadyReleased`] rather than
    /// observing undefined behavior.
    pub fn force_release_by_path_prefix(&mut self, prefix: &str) -> usize {
        let victims: Vec<Region> = self
            .region_index
            .iter_lru()
            .map(|(r, _)| r.clone())
            .filter(|r| r.finfo().id().as_path().is_some_and(|p| p.to_string_lossy().starts_with(prefix)))
            .collect();
        let n = victims.len();
        for region in &victims {
            debug!("force-releasing {region}");
            self.remove_region(region);
        }
        n
    }

    pub fn mapped_memory_size(&self) -> u64 {
        self.region_index.iter_lru().map(|(r, _)| r.size()).sum()
    }

    pub fn num_open_regions(&self) -> usize {
        self.region_index.len()
    }

    pub fn num_used_regions(&self) -> usize {
        let referenced: HashSet<&Region> = self.cursor_index.iter_lru().map(|(_, r)| r).collect();
        referenced.len()
    }

    pub fn num_open_files(&self) -> usize {
        self.path_index.len()
    }

    pub fn num_open_cursors(&self) -> usize {
        self.cursor_index.len()
    }

    pub fn closed(&self) -> bool {
        self.closed
    }

    fn resolve_file_info(&mut self, id: FileId) -> Result<FileInfo> {
        if let Some(finfo) = self.path_index.get(&id) {
            return Ok(finfo.clone());
        }
        let size = stat_size(&id)?;
        let finfo = FileInfo::new(id.clone(), size);
        self.path_index.put(id, finfo.clone())?;
        Ok(finfo)
    }

    // --- region selection -------------------------------------------------

    fn select_region(&mut self, finfo: &FileInfo, offset: u64, size: u64, open_flags: i32) -> Result<Region> {
        match self.flavor {
            Flavor::Greedy => self.select_region_greedy(finfo, open_flags),
            Flavor::Tiling => self.select_region_tiling(finfo, offset, size, open_flags),
        }
    }

    fn select_region_greedy(&mut self, finfo: &FileInfo, open_flags: i32) -> Result<Region> {
        if self.window_size > 0 && finfo.size() > self.window_size {
            return Err(Error::Unsupported("file exceeds the greedy manager's window_size"));
        }
        if let Some(region) = self.regions_by_file.get(finfo.id()).and_then(|regions| regions.first()) {
            return Ok(region.clone());
        }
        self.ensure_budget(finfo.size());
        self.create_and_register_region(finfo, 0, finfo.size(), open_flags)
    }

    fn select_region_tiling(&mut self, finfo: &FileInfo, offset: u64, size: u64, open_flags: i32) -> Result<Region> {
        if let Some(hit) = self.find_covering_region(finfo, offset) {
            return Ok(hit);
        }

        let empty = Vec::new();
        let list = self.regions_by_file.get(finfo.id()).unwrap_or(&empty);
        let idx = list.partition_point(|r| r.ofs_end() <= offset);
        let left_ofs_end = if idx > 0 { list[idx - 1].ofs_end() } else { 0 };
        let right_ofs = if idx < list.len() { list[idx].ofs() } else { finfo.size() };

        let remaining = finfo.size() - offset;
        let cap = if self.window_size == 0 { remaining } else { self.window_size.min(remaining) };
        let mut window = WindowGeometry::new(offset, size.clamp(1, cap));
        window.extend_left_to(left_ofs_end, self.window_size);
        window.extend_right_to(right_ofs, self.window_size);
        window.align(allocation_granularity());
        window.clamp_to_left(left_ofs_end);
        window.clamp_to_right(right_ofs);

        self.ensure_budget(window.size);
        self.create_and_register_region(finfo, window.ofs, window.size, open_flags)
    }

    fn find_covering_region(&self, finfo: &FileInfo, offset: u64) -> Option<Region> {
        let list = self.regions_by_file.get(finfo.id())?;
        let idx = list
            .binary_search_by(|r| {
                if offset < r.ofs() {
                    Ordering::Greater
                } else if offset >= r.ofs_end() {
                    Ordering::Less
                } else {
                    Ordering::Equal
                }
            })
            .ok()?;
        Some(list[idx].clone())
    }

    fn ensure_budget(&mut self, incoming_size: u64) {
        let over_memory = self.mapped_memory_size() + incoming_size > self.max_memory_size;
        let over_count = self.num_open_regions() as u64 >= self.max_regions_count;
        if over_memory || over_count {
            self.evict(incoming_size);
        }
    }

    fn create_and_register_region(&mut self, finfo: &FileInfo, ofs: u64, size: u64, open_flags: i32) -> Result<Region> {
        let region = match Region::create(finfo.clone(), ofs, size, open_flags) {
            Ok(region) => region,
            Err(first_err) => {
                warn!("mapping {:?} [{ofs}, {}) failed, evicting and retrying once: {first_err}", finfo.id(), ofs + size);
                self.evict(0);
                Region::create(finfo.clone(), ofs, size, open_flags).map_err(|e| match e {
                    Error::Io(source) => Error::Resource { action: "map", source },
                    other => other,
                })?
            }
        };

        self.region_index.put(region.clone(), ())?;
        let list = self.regions_by_file.entry(finfo.id().clone()).or_default();
        let pos = list.partition_point(|r| r.ofs() < region.ofs());
        list.insert(pos, region.clone());
        Ok(region)
    }

    /// Walks `region_index` in LRU order, unmapping unreferenced regions
    /// until both budgets are satisfied (or, when `need == 0`, until every
    /// unreferenced region is gone). Never fails: it does what it can and
    /// returns the count freed.
    fn evict(&mut self, need: u64) -> usize {
        let mut freed = 0;
        loop {
            if need > 0 {
                let under_budget = self.mapped_memory_size() + need <= self.max_memory_size
                    && (self.num_open_regions() as u64) < self.max_regions_count;
                if under_budget {
                    break;
                }
            }

            let victim = self.region_index.iter_lru().map(|(r, _)| r).find(|r| !is_referenced(r)).cloned();
            let Some(region) = victim else { break };
            debug!("evicting {region}");
            self.remove_region(&region);
            freed += 1;
        }
        freed
    }

    fn remove_region(&mut self, region: &Region) {
        let _ = self.region_index.take(region);
        if let Some(list) = self.regions_by_file.get_mut(region.finfo().id()) {
            list.retain(|r| r != region);
            if list.is_empty() {
                self.regions_by_file.remove(region.finfo().id());
                let _ = self.path_index.take(region.finfo().id());
            }
        }
        region.unmap();
    }
}

/// A region counts as referenced when something beyond the manager's own
/// bookkeeping (`region_index` and `regions_by_file`, one `Rc` clone each)
/// holds it — i.e. a live `Cursor`. `Rc::strong_count` gives this in O(1),
/// as suggested for a systems-language port of this design.
fn is_referenced(region: &Region) -> bool {
    region.strong_count() > 2
}

impl fmt::Debug for Manager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Manager")
            .field("flavor", &self.flavor)
            .field("open_files", &self.num_open_files())
            .field("open_regions", &self.num_open_regions())
            .field("open_cursors", &self.num_open_cursors())
            .field("closed", &self.closed)
            .finish()
    }
}

impl fmt::Display for Manager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Manager({:?}, {} files, {}/{} regions open, {} bytes mapped)",
            self.flavor,
            self.num_open_files(),
            self.num_used_regions(),
            self.num_open_regions(),
            self.mapped_memory_size(),
        )
    }
}
