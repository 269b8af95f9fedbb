use std::fs;

use tempfile::TempDir;
use winmap::{FileId, Manager, Result};

fn write_temp_file(dir: &TempDir, name: &str, contents: &[u8]) -> FileId {
    let path = dir.path().join(name);
    fs::write(&path, contents).unwrap();
    FileId::Path(path)
}

fn sample_bytes(n: usize) -> Vec<u8> {
    (0..n).map(|i| b"0123456789abcdef"[i % 16]).collect()
}

#[test]
fn sliding_buffer_reads_whole_small_file() -> Result<()> {
    let dir = TempDir::new()?;
    let id = write_temp_file(&dir, "f", b"0123456789abcdef");
    let mut manager = Manager::new_tiling(4, 0, 0);

    let mut buf = manager.make_buffer(id, 0, 16, 0)?;
    let got = buf.get_range(&mut manager, 0, 16)?;
    assert_eq!(got, b"0123456789abcdef");
    buf.release(&mut manager)?;
    Ok(())
}

#[test]
fn sliding_buffer_reads_across_window_boundaries() -> Result<()> {
    let dir = TempDir::new()?;
    let id = write_temp_file(&dir, "f", b"0123456789abcdef");
    let mut manager = Manager::new_tiling(4, 0, 0);

    let mut buf = manager.make_buffer(id, 0, 16, 0)?;
    let got = buf.get_range(&mut manager, 5, 11)?;
    assert_eq!(got, b"56789a");
    assert!(manager.num_open_regions() >= 2);
    buf.release(&mut manager)?;
    Ok(())
}

#[test]
fn greedy_manager_rejects_file_larger_than_window() -> Result<()> {
    let dir = TempDir::new()?;
    let id = write_temp_file(&dir, "f", &sample_bytes(100));
    let mut manager = Manager::new_greedy(50, 0, 0);

    let err = manager.make_cursor(id, 0, 0, 0).unwrap_err();
    assert!(matches!(err, winmap::Error::Unsupported(_)));
    Ok(())
}

#[test]
fn tiling_manager_evicts_under_memory_pressure_and_reuses_later() -> Result<()> {
    let dir = TempDir::new()?;
    let id = write_temp_file(&dir, "f", &sample_bytes(100));
    let mut manager = Manager::new_tiling(8, 16, 0);

    let mut c0 = manager.make_cursor(id.clone(), 0, 1, 0)?;
    c0.release(&mut manager)?;

    let mut c80 = manager.make_cursor(id.clone(), 80, 1, 0)?;
    c80.release(&mut manager)?;

    // Every region created so far has since been released, so a third
    // request must be able to proceed without exceeding the file's maximum
    // possible tiling.
    let mut c0_again = manager.make_cursor(id, 0, 1, 0)?;
    assert!(manager.num_open_regions() as u64 <= 100u64.div_ceil(8));
    c0_again.release(&mut manager)?;
    Ok(())
}

#[test]
fn collect_skips_regions_still_referenced() -> Result<()> {
    let dir = TempDir::new()?;
    let id = write_temp_file(&dir, "f", &sample_bytes(16));
    let mut manager = Manager::new_tiling(16, 0, 0);

    let mut c1 = manager.make_cursor(id.clone(), 0, 4, 0)?;
    let mut c2 = manager.make_cursor(id, 2, 4, 0)?;

    c1.release(&mut manager)?;
    assert_eq!(manager.collect(), 0, "region is still referenced by c2");

    c2.release(&mut manager)?;
    Ok(())
}

#[test]
fn collect_frees_the_sole_unreferenced_region() -> Result<()> {
    let dir = TempDir::new()?;
    let id = write_temp_file(&dir, "f", &sample_bytes(16));
    let mut manager = Manager::new_tiling(16, 0, 0);

    let mut c1 = manager.make_cursor(id, 0, 4, 0)?;
    c1.release(&mut manager)?;

    assert_eq!(manager.collect(), 1);
    assert_eq!(manager.num_open_regions(), 0);
    Ok(())
}

#[test]
fn num_used_regions_never_exceeds_num_open_regions() -> Result<()> {
    let dir = TempDir::new()?;
    let id = write_temp_file(&dir, "f", &sample_bytes(64));
    let mut manager = Manager::new_tiling(8, 0, 0);

    let mut cursors = Vec::new();
    for offset in [0, 10, 20, 30, 40, 50] {
        cursors.push(manager.make_cursor(id.clone(), offset, 1, 0)?);
        assert!(manager.num_used_regions() <= manager.num_open_regions());
    }
    for mut c in cursors {
        c.release(&mut manager)?;
        assert!(manager.num_used_regions() <= manager.num_open_regions());
    }
    manager.collect();
    assert!(manager.num_used_regions() <= manager.num_open_regions());
    Ok(())
}

#[test]
fn tiling_regions_for_one_file_are_pairwise_disjoint() -> Result<()> {
    let dir = TempDir::new()?;
    let id = write_temp_file(&dir, "f", &sample_bytes(200));
    let mut manager = Manager::new_tiling(8, 0, 0);

    let mut cursors = Vec::new();
    for offset in (0..200).step_by(13) {
        cursors.push(manager.make_cursor(id.clone(), offset, 1, 0)?);
    }

    let mut spans: Vec<(u64, u64)> =
        cursors.iter().map(|c| (c.region().unwrap().ofs(), c.region().unwrap().ofs_end())).collect();
    spans.sort_unstable();
    spans.dedup();
    for pair in spans.windows(2) {
        assert!(pair[0].1 <= pair[1].0, "regions {pair:?} overlap");
    }

    for mut c in cursors {
        c.release(&mut manager)?;
    }
    Ok(())
}

#[test]
fn tiling_region_size_never_exceeds_window_plus_one_alignment_unit() -> Result<()> {
    let dir = TempDir::new()?;
    let window = 8u64;
    let id = write_temp_file(&dir, "f", &sample_bytes(500));
    let mut manager = Manager::new_tiling(window as i64, 0, 0);

    let g = winmap::allocation_granularity();
    let mut cursors = Vec::new();
    for offset in (0..500).step_by(3) {
        cursors.push(manager.make_cursor(id.clone(), offset, 1, 0)?);
    }
    for c in &cursors {
        assert!(c.region()?.size() <= window + (g - 1));
    }
    for mut c in cursors {
        c.release(&mut manager)?;
    }
    Ok(())
}

#[test]
fn close_clears_all_counters_on_success() -> Result<()> {
    let dir = TempDir::new()?;
    let id = write_temp_file(&dir, "f", &sample_bytes(32));
    let mut manager = Manager::new_tiling(16, 0, 0);

    let mut c = manager.make_cursor(id, 0, 4, 0)?;
    c.release(&mut manager)?;

    manager.close()?;
    assert_eq!(manager.num_open_regions(), 0);
    assert_eq!(manager.num_open_cursors(), 0);
    assert_eq!(manager.mapped_memory_size(), 0);
    assert!(manager.closed());
    Ok(())
}

#[test]
fn close_reports_regions_still_referenced() -> Result<()> {
    let dir = TempDir::new()?;
    let id = write_temp_file(&dir, "f", &sample_bytes(16));
    let mut manager = Manager::new_tiling(16, 0, 0);

    let _c = manager.make_cursor(id, 0, 4, 0)?;
    let err = manager.close().unwrap_err();
    assert!(matches!(err, winmap::Error::CloseWithActive { .. }));
    assert!(!manager.closed());
    Ok(())
}

#[test]
fn evict_is_idempotent() -> Result<()> {
    let dir = TempDir::new()?;
    let id = write_temp_file(&dir, "f", &sample_bytes(16));
    let mut manager = Manager::new_tiling(16, 0, 0);

    let mut c = manager.make_cursor(id, 0, 4, 0)?;
    c.release(&mut manager)?;

    assert_eq!(manager.collect(), 1);
    assert_eq!(manager.collect(), 0);
    Ok(())
}

#[test]
fn lru_eviction_order_matches_touch_order() -> Result<()> {
    let dir = TempDir::new()?;
    let id = write_temp_file(&dir, "f", &sample_bytes(64));
    // A one-region budget makes the eviction order directly observable:
    // creating a second disjoint window must evict the first.
    let mut manager = Manager::new_tiling(8, 0, 1);

    let mut c1 = manager.make_cursor(id.clone(), 0, 1, 0)?;
    c1.release(&mut manager)?;
    let mut c2 = manager.make_cursor(id, 16, 1, 0)?;
    assert_eq!(manager.num_open_regions(), 1);
    assert!(!c2.region()?.includes(0));
    c2.release(&mut manager)?;
    Ok(())
}

#[test]
fn live_cursor_stays_within_its_bound_region() -> Result<()> {
    let dir = TempDir::new()?;
    let id = write_temp_file(&dir, "f", &sample_bytes(64));
    let mut manager = Manager::new_tiling(8, 0, 0);

    for offset in [0, 10, 20, 30, 40, 50, 60] {
        let mut c = manager.make_cursor(id.clone(), offset, 1, 0)?;
        let region = c.region()?;
        assert!(region.ofs() <= c.offset());
        assert!(c.offset() + c.size() <= region.ofs_end());
        c.release(&mut manager)?;
    }
    Ok(())
}

#[test]
fn force_release_by_path_prefix_invalidates_live_cursors() -> Result<()> {
    let dir = TempDir::new()?;
    let id = write_temp_file(&dir, "target_f", &sample_bytes(16));
    let prefix = dir.path().join("target").to_string_lossy().into_owned();
    let mut manager = Manager::new_tiling(16, 0, 0);

    let cursor = manager.make_cursor(id, 0, 4, 0)?;
    assert_eq!(manager.force_release_by_path_prefix(&prefix), 1);
    assert_eq!(manager.num_open_regions(), 0);

    let err = cursor.region_bytes().unwrap_err();
    assert!(matches!(err, winmap::Error::AlreadyReleased));
    Ok(())
}
