//! Consolidated path store.
//!
//! The mined block files are folded into a single SQLite table
//! `paths(id, frequency, length, points)`: one row per distinct sub-path,
//! with the taxi-id sets reduced to their cardinality and the key rendered
//! as a 6-decimal `"lon,lat;lon,lat;…"` text. An index on
//! `(length, frequency DESC)` serves the `length >= L ORDER BY frequency
//! DESC LIMIT K` access path.

use log::{info, warn};
use rusqlite::{Connection, OpenFlags, params};
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::error::{Result, TaxitraceError};
use crate::geo::path_length;
use crate::mining::SubPath;
use crate::mining::blocks::{self, BlockMap};

/// One consolidated row.
#[derive(Debug, Clone, PartialEq)]
pub struct PathRecord {
    /// Number of distinct taxis that traversed this sub-path.
    pub frequency: u32,
    /// Geodesic length in meters.
    pub length_m: f64,
    /// The sub-path's cell centers in traversal order.
    pub points: Vec<(f64, f64)>,
}

/// Statistics from a consolidation run.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsolidateStats {
    pub blocks: u64,
    pub paths: u64,
}

/// Read-only (query time) or exclusive-writer (consolidation) handle to the
/// store file.
#[derive(Debug)]
pub struct PathStore {
    conn: Connection,
    path: PathBuf,
}

impl PathStore {
    /// Open an existing store read-only.
    pub fn open_readonly(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if !path.is_file() {
            return Err(TaxitraceError::StoreMissing(path));
        }
        let conn = Connection::open_with_flags(&path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        Ok(Self { conn, path })
    }

    /// Create a fresh store, replacing any file already at `path`.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(&path)?;
        conn.execute_batch(
            "CREATE TABLE paths (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                frequency INTEGER,
                length REAL,
                points TEXT
            );",
        )?;
        Ok(Self { conn, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn row_count(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM paths", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Top-k rows with `length >= min_length_m`, most frequent first.
    pub fn top_k(&self, min_length_m: f64, k: usize) -> Result<Vec<PathRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT frequency, length, points FROM paths
             WHERE length >= ?1 ORDER BY frequency DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![min_length_m, k as i64], record_from_row)?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    /// Stream every row with `length >= min_length_m` through `f`.
    pub fn for_each_min_length(
        &self,
        min_length_m: f64,
        mut f: impl FnMut(PathRecord),
    ) -> Result<()> {
        let mut stmt = self
            .conn
            .prepare("SELECT frequency, length, points FROM paths WHERE length >= ?1")?;
        let rows = stmt.query_map(params![min_length_m], record_from_row)?;
        for row in rows {
            f(row?);
        }
        Ok(())
    }
}

fn record_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<PathRecord> {
    let frequency: i64 = row.get(0)?;
    let length_m: f64 = row.get(1)?;
    let points_text: String = row.get(2)?;
    Ok(PathRecord {
        frequency: frequency as u32,
        length_m,
        points: parse_points(&points_text),
    })
}

/// Render cell centers as the stored points text.
pub fn format_points(points: &[(f64, f64)]) -> String {
    points
        .iter()
        .map(|(lon, lat)| format!("{lon:.6},{lat:.6}"))
        .collect::<Vec<_>>()
        .join(";")
}

/// Parse the stored points text back into coordinates. Malformed fragments
/// are dropped rather than propagated; the writer controls the format.
pub fn parse_points(text: &str) -> Vec<(f64, f64)> {
    text.split(';')
        .filter_map(|pair| {
            let (lon, lat) = pair.split_once(',')?;
            Some((lon.trim().parse().ok()?, lat.trim().parse().ok()?))
        })
        .collect()
}

/// Fold every block file into a freshly created store.
///
/// Blocks are visited in `(window, file)` order and keys in key order, so a
/// rebuild over identical input produces identical store contents. A block
/// that fails to load is logged and skipped; the pass continues.
pub fn consolidate(config: &Config) -> Result<ConsolidateStats> {
    let mut store = PathStore::create(&config.store_path)?;
    let mut stats = ConsolidateStats::default();

    let block_files = blocks::enumerate_blocks(&config.block_dir, config.window_min, config.window_max)?;
    for (window, path) in block_files {
        let block: BlockMap = match blocks::load_block(&path) {
            Ok(block) => block,
            Err(e) => {
                warn!("skipping unreadable block {} (w={window}): {e}", path.display());
                continue;
            }
        };
        stats.blocks += 1;
        stats.paths += insert_block(&mut store, block, config.grid_size_deg)?;
    }

    store.conn.execute_batch(
        "CREATE INDEX paths_length_frequency ON paths(length, frequency DESC);",
    )?;

    info!(
        "consolidated {} paths from {} blocks into {}",
        stats.paths,
        stats.blocks,
        config.store_path.display()
    );
    Ok(stats)
}

fn insert_block(store: &mut PathStore, block: BlockMap, grid_size: f64) -> Result<u64> {
    let mut keys: Vec<(SubPath, usize)> = block
        .into_iter()
        .map(|(key, taxis)| (key, taxis.len()))
        .collect();
    keys.sort();

    let tx = store.conn.transaction()?;
    {
        let mut stmt =
            tx.prepare("INSERT INTO paths (frequency, length, points) VALUES (?1, ?2, ?3)")?;
        for (key, frequency) in &keys {
            let centers: Vec<(f64, f64)> = key.iter().map(|cell| cell.center(grid_size)).collect();
            let length_m = path_length(&centers);
            stmt.execute(params![*frequency as i64, length_m, format_points(&centers)])?;
        }
    }
    tx.commit()?;
    Ok(keys.len() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn points_text_roundtrips_at_six_decimals() {
        let points = vec![(116.301, 39.901), (116.303, 39.901)];
        let text = format_points(&points);
        assert_eq!(text, "116.301000,39.901000;116.303000,39.901000");
        assert_eq!(parse_points(&text), points);
    }

    #[test]
    fn create_then_query_top_k() {
        let dir = tempfile::tempdir().unwrap();
        let store = PathStore::create(dir.path().join("paths.sqlite")).unwrap();
        for (freq, len, pts) in [
            (10i64, 300.0, "116.1,39.9;116.2,39.9"),
            (7, 1500.0, "116.3,39.9;116.4,39.9"),
            (20, 50.0, "116.5,39.9;116.6,39.9"),
        ] {
            store
                .conn
                .execute(
                    "INSERT INTO paths (frequency, length, points) VALUES (?1, ?2, ?3)",
                    params![freq, len, pts],
                )
                .unwrap();
        }

        let top = store.top_k(100.0, 2).unwrap();
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].frequency, 10);
        assert_eq!(top[1].frequency, 7);
    }

    #[test]
    fn readonly_open_requires_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = PathStore::open_readonly(dir.path().join("absent.sqlite")).unwrap_err();
        assert!(matches!(err, TaxitraceError::StoreMissing(_)));
    }
}
