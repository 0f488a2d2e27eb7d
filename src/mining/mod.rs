//! Sliding-window sub-path mining.
//!
//! For every trajectory, each window size W in the configured range yields
//! all length-W runs of grid-quantized cell centers. Keys are deduplicated
//! per `(taxi, W)` so the downstream frequency counts distinct taxis, not
//! occurrences, then sharded into block files by `(W, first cell)`.

pub mod blocks;

use log::{info, warn};
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;
use std::path::PathBuf;

use crate::config::Config;
use crate::error::Result;
use crate::reader::TrackDir;
use self::blocks::BlockMap;
use taxitrace_types::{GridCell, TaxiTrack};

/// A mined sub-path key: the window's grid cells in traversal order.
/// Windows never exceed 16 cells, so keys stay inline.
pub type SubPath = SmallVec<[GridCell; 16]>;

/// Statistics from one mining pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct MiningStats {
    pub tracks: u64,
    pub subpaths: u64,
    pub blocks_written: u64,
    pub blocks_failed: u64,
}

/// Accumulates sub-path → taxi-set blocks across a corpus pass, then merges
/// them into the block directory.
///
/// The whole pass is staged in memory and flushed once; on-disk merges with
/// pre-existing blocks happen at flush time through a staged atomic rename.
pub struct PathMiner {
    block_dir: PathBuf,
    grid_size: f64,
    window_min: usize,
    window_max: usize,
    blocks: FxHashMap<(usize, GridCell), BlockMap>,
    stats: MiningStats,
}

impl PathMiner {
    pub fn new(config: &Config) -> Self {
        Self {
            block_dir: config.block_dir.clone(),
            grid_size: config.grid_size_deg,
            window_min: config.window_min,
            window_max: config.window_max,
            blocks: FxHashMap::default(),
            stats: MiningStats::default(),
        }
    }

    /// Mine every window of one trajectory.
    ///
    /// Stationary trajectories produce legitimate repeated-cell keys; a
    /// trajectory shorter than W contributes nothing for that W.
    pub fn mine_track(&mut self, track: &TaxiTrack) {
        if track.is_empty() {
            return;
        }
        self.stats.tracks += 1;

        let cells: Vec<GridCell> = track
            .positions()
            .map(|(lon, lat)| crate::geo::grid_of(lon, lat, self.grid_size))
            .collect();

        for window in self.window_min..=self.window_max {
            if cells.len() < window {
                continue;
            }
            let mut seen: FxHashSet<&[GridCell]> = FxHashSet::default();
            for run in cells.windows(window) {
                if !seen.insert(run) {
                    continue;
                }
                let key: SubPath = SubPath::from_slice(run);
                let shard = self
                    .blocks
                    .entry((window, run[0]))
                    .or_default()
                    .entry(key)
                    .or_default();
                if shard.insert(track.taxi_id) && shard.len() == 1 {
                    self.stats.subpaths += 1;
                }
            }
        }
    }

    /// Merge the accumulated blocks into the block directory.
    ///
    /// Blocks are flushed in `(window, cell)` order for deterministic output.
    /// A failed block is logged and skipped; it does not abort the pass.
    pub fn flush(mut self) -> Result<MiningStats> {
        let mut keys: Vec<(usize, GridCell)> = self.blocks.keys().copied().collect();
        keys.sort();

        for key in keys {
            let (window, first_cell) = key;
            let Some(map) = self.blocks.remove(&key) else {
                continue;
            };
            let path = blocks::block_path(&self.block_dir, window, first_cell, self.grid_size);
            match blocks::merge_block(&path, map) {
                Ok(()) => self.stats.blocks_written += 1,
                Err(e) => {
                    warn!("failed to merge block {}: {e}", path.display());
                    self.stats.blocks_failed += 1;
                }
            }
        }

        info!(
            "mined {} distinct sub-paths from {} tracks into {} blocks ({} failed)",
            self.stats.subpaths, self.stats.tracks, self.stats.blocks_written, self.stats.blocks_failed
        );
        Ok(self.stats)
    }
}

/// Run a full mining pass over a track directory.
pub fn mine_corpus(tracks: &TrackDir, config: &Config) -> Result<MiningStats> {
    let mut miner = PathMiner::new(config);
    for track in tracks.tracks()? {
        let track = match track {
            Ok(track) => track,
            Err(e) => {
                warn!("skipping unreadable track file: {e}");
                continue;
            }
        };
        miner.mine_track(&track);
    }
    miner.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use taxitrace_types::TrackPoint;

    fn track(taxi_id: u64, coords: &[(f64, f64)]) -> TaxiTrack {
        TaxiTrack {
            taxi_id,
            points: coords
                .iter()
                .enumerate()
                .map(|(i, &(lon, lat))| TrackPoint::new(taxi_id, i as f64 * 60.0, lon, lat))
                .collect(),
        }
    }

    fn test_config(dir: &std::path::Path) -> Config {
        Config::default().rooted_at(dir).with_window_range(5, 6)
    }

    /// A 7-point eastbound track: cells 0..7 along the lon axis.
    fn eastbound(taxi_id: u64) -> TaxiTrack {
        let coords: Vec<(f64, f64)> = (0..7).map(|i| (116.001 + i as f64 * 0.002, 39.901)).collect();
        track(taxi_id, &coords)
    }

    #[test]
    fn windows_slide_and_dedup_per_taxi() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let mut miner = PathMiner::new(&config);
        miner.mine_track(&eastbound(1));
        let stats = miner.flush().unwrap();

        // 7 points: three W=5 windows, two W=6 windows.
        assert_eq!(stats.subpaths, 5);
    }

    #[test]
    fn frequency_counts_distinct_taxis() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let mut miner = PathMiner::new(&config);
        miner.mine_track(&eastbound(1));
        miner.mine_track(&eastbound(2));
        miner.flush().unwrap();

        let first_cell = GridCell::of(116.001, 39.901, 0.002);
        let path = blocks::block_path(&config.block_dir, 5, first_cell, 0.002);
        let block = blocks::load_block(&path).unwrap();
        let (_, taxis) = block.iter().next().unwrap();
        assert_eq!(taxis.len(), 2);
    }

    #[test]
    fn stationary_track_produces_repeated_cell_key() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let mut miner = PathMiner::new(&config);
        let coords = vec![(116.001, 39.901); 6];
        miner.mine_track(&track(5, &coords));
        let stats = miner.flush().unwrap();

        // One W=5 key (all windows identical) and one W=6 key.
        assert_eq!(stats.subpaths, 2);
    }

    #[test]
    fn short_track_contributes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let mut miner = PathMiner::new(&config);
        miner.mine_track(&track(3, &[(116.001, 39.901), (116.003, 39.901)]));
        let stats = miner.flush().unwrap();
        assert_eq!(stats.subpaths, 0);
        assert_eq!(stats.blocks_written, 0);
    }
}
