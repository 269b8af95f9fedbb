//! Window placement arithmetic used by the tiling manager's region
//! selection, plus the platform allocation-granularity lookup both manager
//! flavors use to align new mappings.

use std::sync::OnceLock;

/// Fallback allocation granularity used when `sysconf` is unavailable.
const DEFAULT_GRANULARITY: u64 = 4096;

/// Returns the platform's memory-mapping allocation granularity `G`.
///
/// On Unix this is `sysconf(_SC_PAGESIZE)`, queried once and cached; on
/// platforms where the query fails we fall back to [`DEFAULT_GRANULARITY`]
/// rather than erroring, since every caller treats `G` as advisory
/// alignment, not a correctness requirement enforced by the OS at this call
/// site.
pub fn allocation_granularity() -> u64 {
    static GRANULARITY: OnceLock<u64> = OnceLock::new();
    *GRANULARITY.get_or_init(|| {
        #[cfg(unix)]
        {
            let g = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
            if g > 0 {
                return g as u64;
            }
        }
        DEFAULT_GRANULARITY
    })
}

const fn is_64_bit() -> bool {
    usize::BITS == 64
}

/// Default `window_size` when the caller passes a negative sentinel.
pub fn default_window_size() -> u64 {
    use crate::{GiB, MiB};
    if is_64_bit() { GiB } else { 64 * MiB }
}

/// Default `max_memory_size` when the caller passes `0`.
pub fn default_max_memory_size() -> u64 {
    use crate::GiB;
    if is_64_bit() { 8 * GiB } else { GiB }
}

/// A candidate (or realized) mapping placement: `[ofs, ofs_end)`.
///
/// Used transiently while the tiling manager works out where a new
/// `Region` should land; never stored once a region exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowGeometry {
    pub ofs: u64,
    pub size: u64,
}

impl WindowGeometry {
    pub const fn new(ofs: u64, size: u64) -> Self {
        Self { ofs, size }
    }

    pub const fn ofs_end(&self) -> u64 {
        self.ofs + self.size
    }

    /// Rounds `ofs` down to a multiple of `g`, folding the difference into
    /// `size` so `ofs_end` is unchanged. The end is deliberately left
    /// unrounded: rounding it up would pull in bytes past what the caller's
    /// budget asked for.
    pub fn align(&mut self, g: u64) {
        let aligned = (self.ofs / g) * g;
        self.size += self.ofs - aligned;
        self.ofs = aligned;
    }

    /// Grows the window leftward up to `left_ofs_end`, bounded by whatever
    /// of `window_size` (`0` = uncapped) is not already spent.
    pub fn extend_left_to(&mut self, left_ofs_end: u64, window_size: u64) {
        let available = self.ofs.saturating_sub(left_ofs_end);
        let budget = if window_size == 0 { u64::MAX } else { window_size.saturating_sub(self.size) };
        let delta = available.min(budget);
        self.ofs -= delta;
        self.size += delta;
    }

    /// Grows the window rightward to absorb the gap up to `right_ofs`,
    /// clamped by `window_size` (`0` = uncapped).
    pub fn extend_right_to(&mut self, right_ofs: u64, window_size: u64) {
        let gap = right_ofs.saturating_sub(self.ofs_end());
        let grown = self.size + gap;
        self.size = if window_size == 0 { grown } else { grown.min(window_size) };
    }

    /// Shrinks the window so it never overlaps a neighboring region
    /// starting at `right_ofs`.
    pub fn clamp_to_right(&mut self, right_ofs: u64) {
        if self.ofs_end() > right_ofs {
            self.size = right_ofs - self.ofs;
        }
    }

    /// Shrinks the window from the left so it never overlaps a neighboring
    /// region ending at `left_ofs_end`.
    ///
    /// `align` rounds `ofs` down to a multiple of `G` without regard to the
    /// left neighbor; when `G` is larger than the window itself (only
    /// possible for small windows near the start of a file) that rounding
    /// can pull `ofs` back past `left_ofs_end`. This restores the
    /// disjointness `align` can't see on its own.
    pub fn clamp_to_left(&mut self, left_ofs_end: u64) {
        if self.ofs < left_ofs_end {
            self.size -= left_ofs_end - self.ofs;
            self.ofs = left_ofs_end;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn align_preserves_end() {
        let mut w = WindowGeometry::new(4100, 100);
        let end = w.ofs_end();
        w.align(4096);
        assert_eq!(w.ofs, 4096);
        assert_eq!(w.ofs_end(), end);
    }

    #[test]
    fn extend_left_respects_window_budget() {
        let mut w = WindowGeometry::new(1000, 100);
        w.extend_left_to(0, 150);
        assert_eq!(w.size, 150);
        assert_eq!(w.ofs, 950);
    }

    #[test]
    fn extend_left_stops_at_neighbor() {
        let mut w = WindowGeometry::new(1000, 100);
        w.extend_left_to(980, 1000);
        assert_eq!(w.ofs, 980);
        assert_eq!(w.size, 120);
    }

    #[test]
    fn extend_right_uncapped_when_window_size_zero() {
        let mut w = WindowGeometry::new(0, 100);
        w.extend_right_to(10_000, 0);
        assert_eq!(w.size, 10_000);
    }

    #[test]
    fn clamp_to_right_shrinks_overlap() {
        let mut w = WindowGeometry::new(0, 2000);
        w.clamp_to_right(1500);
        assert_eq!(w.size, 1500);
    }

    #[test]
    fn clamp_to_left_shrinks_overlap_left_by_align() {
        // Simulates a small window near the start of a file whose `align`
        // rounded `ofs` back past an already-registered left neighbor.
        let mut w = WindowGeometry::new(0, 9);
        w.clamp_to_left(4);
        assert_eq!(w.ofs, 4);
        assert_eq!(w.size, 5);
    }

    #[test]
    fn clamp_to_left_is_noop_when_already_clear() {
        let mut w = WindowGeometry::new(10, 5);
        w.clamp_to_left(4);
        assert_eq!(w.ofs, 10);
        assert_eq!(w.size, 5);
    }
}
