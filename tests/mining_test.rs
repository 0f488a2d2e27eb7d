//! Mining pipeline properties: determinism across runs, distinct-taxi
//! frequency semantics, and store consolidation.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use taxitrace::{Config, PathStore, TrackDir, consolidate, mine_corpus};

const BASE: i64 = 1_201_910_400;

fn write_track(dir: &Path, taxi_id: u64, coords: &[(f64, f64)]) {
    let mut file = File::create(dir.join(format!("{taxi_id}.txt"))).unwrap();
    for (i, &(lon, lat)) in coords.iter().enumerate() {
        writeln!(file, "{taxi_id},{},{lon},{lat}", BASE + i as i64 * 60).unwrap();
    }
}

fn corpus(dir: &Path) {
    std::fs::create_dir_all(dir).unwrap();
    // Two taxis tracing the same eastbound run, one a reverse run, one too
    // short to mine.
    let eastbound: Vec<(f64, f64)> = (0..8).map(|i| (116.201 + i as f64 * 0.002, 39.901)).collect();
    let westbound: Vec<(f64, f64)> = eastbound.iter().rev().copied().collect();
    write_track(dir, 1, &eastbound);
    write_track(dir, 2, &eastbound);
    write_track(dir, 3, &westbound);
    write_track(dir, 4, &eastbound[..3]);
}

fn run_pipeline(root: &Path) -> Vec<(u32, String, String)> {
    let data_dir = root.join("tracks");
    corpus(&data_dir);
    let config = Config::default()
        .with_data_dir(&data_dir)
        .rooted_at(root)
        .with_window_range(5, 8);

    let stats = mine_corpus(&TrackDir::new(&config.data_dir), &config).unwrap();
    assert!(stats.subpaths > 0);
    assert_eq!(stats.blocks_failed, 0);

    consolidate(&config).unwrap();
    dump_store(&config.store_path)
}

/// Logical dump in row order: (frequency, length to the millimeter, points).
fn dump_store(path: &Path) -> Vec<(u32, String, String)> {
    let store = PathStore::open_readonly(path).unwrap();
    let mut rows = Vec::new();
    store
        .for_each_min_length(f64::MIN, |record| {
            rows.push((
                record.frequency,
                format!("{:.3}", record.length_m),
                taxitrace::store::format_points(&record.points),
            ));
        })
        .unwrap();
    rows
}

#[test]
fn double_run_produces_identical_store_contents() {
    let first = tempfile::tempdir().unwrap();
    let second = tempfile::tempdir().unwrap();
    let rows_a = run_pipeline(first.path());
    let rows_b = run_pipeline(second.path());
    assert!(!rows_a.is_empty());
    assert_eq!(rows_a, rows_b);
}

#[test]
fn frequency_is_distinct_taxis_not_occurrences() {
    let tmp = tempfile::tempdir().unwrap();
    let rows = run_pipeline(tmp.path());

    // Taxis 1 and 2 trace identical runs; every one of their keys must have
    // frequency exactly 2. Taxi 3's reversed keys are distinct (frequency 1).
    let max_frequency = rows.iter().map(|(f, _, _)| *f).max().unwrap();
    assert_eq!(max_frequency, 2);
    assert!(rows.iter().any(|(f, _, _)| *f == 1));
}

#[test]
fn window_shorter_tracks_add_nothing() {
    let tmp = tempfile::tempdir().unwrap();
    let data_dir = tmp.path().join("tracks");
    std::fs::create_dir_all(&data_dir).unwrap();
    write_track(&data_dir, 9, &[(116.2, 39.9), (116.21, 39.9)]);

    let config = Config::default()
        .with_data_dir(&data_dir)
        .rooted_at(tmp.path());
    let stats = mine_corpus(&TrackDir::new(&config.data_dir), &config).unwrap();
    assert_eq!(stats.subpaths, 0);
}

#[test]
fn consolidated_lengths_are_geodesic() {
    let tmp = tempfile::tempdir().unwrap();
    let rows = run_pipeline(tmp.path());

    // Eastbound windows of 5 cells span 4 segments of ~171 m at this
    // latitude; every mined window has between 4 and 7 segments.
    for (_, length, _) in &rows {
        let length: f64 = length.parse().unwrap();
        assert!(length > 4.0 * 150.0, "length {length} too short");
        assert!(length < 7.0 * 190.0, "length {length} too long");
    }
}
