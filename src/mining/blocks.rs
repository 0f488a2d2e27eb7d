//! Sharded sub-path block files.
//!
//! A block file holds every mined sub-path of one window size that starts in
//! one grid cell, mapped to the set of taxis that produced it. Blocks are
//! bincode-encoded; merges are staged to a temporary sibling and atomically
//! renamed so a crashed merge never leaves a half-written block behind.

use log::debug;
use rustc_hash::{FxHashMap, FxHashSet};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use super::SubPath;
use crate::error::Result;
use taxitrace_types::GridCell;

/// Contents of one block file: sub-path key → taxis that traversed it.
pub type BlockMap = FxHashMap<SubPath, FxHashSet<u64>>;

/// Directory for one window size, e.g. `blocks_w5`.
pub fn window_dir(block_dir: &Path, window: usize) -> PathBuf {
    block_dir.join(format!("blocks_w{window}"))
}

/// Block file for `(window, first_cell)`, named by the cell's 6-decimal
/// center so identical cells shard identically across runs.
pub fn block_path(block_dir: &Path, window: usize, first_cell: GridCell, grid_size: f64) -> PathBuf {
    let (lon, lat) = first_cell.center(grid_size);
    window_dir(block_dir, window).join(format!("{lon:.6}_{lat:.6}.bin"))
}

/// Load a block file; an absent file is an empty block.
pub fn load_block(path: &Path) -> Result<BlockMap> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(BlockMap::default()),
        Err(e) => return Err(e.into()),
    };
    Ok(bincode::deserialize_from(BufReader::new(file))?)
}

/// Replace a block file with `map`, staging through a `.tmp` sibling.
pub fn store_block(path: &Path, map: &BlockMap) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = {
        let mut os = path.as_os_str().to_os_string();
        os.push(".tmp");
        PathBuf::from(os)
    };
    {
        let mut writer = BufWriter::new(File::create(&tmp)?);
        bincode::serialize_into(&mut writer, map)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
    }
    fs::rename(&tmp, path)?;
    debug!("stored block {} ({} keys)", path.display(), map.len());
    Ok(())
}

/// Merge `incoming` into the block at `path`: existing taxi sets are
/// set-unioned with the new ones before the block is rewritten.
pub fn merge_block(path: &Path, incoming: BlockMap) -> Result<()> {
    let mut merged = load_block(path)?;
    for (key, taxis) in incoming {
        merged.entry(key).or_default().extend(taxis);
    }
    store_block(path, &merged)
}

/// Enumerate every block file under `block_dir` for windows in
/// `[window_min, window_max]`, in (window, file name) order. The sorted
/// order makes downstream consolidation deterministic.
pub fn enumerate_blocks(
    block_dir: &Path,
    window_min: usize,
    window_max: usize,
) -> Result<Vec<(usize, PathBuf)>> {
    let mut found = Vec::new();
    for window in window_min..=window_max {
        let dir = window_dir(block_dir, window);
        if !dir.is_dir() {
            continue;
        }
        let mut files: Vec<PathBuf> = fs::read_dir(&dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "bin"))
            .collect();
        files.sort();
        found.extend(files.into_iter().map(|p| (window, p)));
    }
    Ok(found)
}
