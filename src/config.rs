//! Engine configuration.
//!
//! The configuration is designed to be easily serializable and loadable
//! from JSON while keeping complexity minimal: every field has a default,
//! so a partial document (or none at all) yields a working setup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Configuration for the offline builders and the query engine.
///
/// # Example
///
/// ```rust
/// use taxitrace::Config;
///
/// let config: Config = serde_json::from_str(
///     r#"{ "data_dir": "/data/tracks", "grid_size_deg": 0.002 }"#,
/// ).unwrap();
/// assert_eq!(config.density_max_points, 100_000);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding one `<taxi_id>.txt` trajectory file per taxi.
    #[serde(default = "Config::default_data_dir")]
    pub data_dir: PathBuf,

    /// Basename of the on-disk R-tree; `.idx` / `.dat` are appended.
    #[serde(default = "Config::default_index_basename")]
    pub index_basename: PathBuf,

    /// Directory holding the sharded sub-path block files.
    #[serde(default = "Config::default_block_dir")]
    pub block_dir: PathBuf,

    /// SQLite path store file.
    #[serde(default = "Config::default_store_path")]
    pub store_path: PathBuf,

    /// Root of the per-operator result cache directories.
    #[serde(default = "Config::default_cache_dir")]
    pub cache_dir: PathBuf,

    /// Quantization grid side in degrees (~200 m at the default).
    #[serde(default = "Config::default_grid_size_deg")]
    pub grid_size_deg: f64,

    /// Smallest mined window length, inclusive.
    #[serde(default = "Config::default_window_min")]
    pub window_min: usize,

    /// Largest mined window length, inclusive.
    #[serde(default = "Config::default_window_max")]
    pub window_max: usize,

    /// Node fanout hint for the R-tree build.
    #[serde(default = "Config::default_rtree_fanout")]
    pub rtree_fanout: usize,

    /// Density operators stream R-tree hits in batches of this size.
    #[serde(default = "Config::default_density_batch_size")]
    pub density_batch_size: usize,

    /// Hard cap on points consumed by one density query. Results computed
    /// from a capped stream are reported with `truncated: true`.
    #[serde(default = "Config::default_density_max_points")]
    pub density_max_points: usize,
}

impl Config {
    fn default_data_dir() -> PathBuf {
        PathBuf::from("data/tracks")
    }

    fn default_index_basename() -> PathBuf {
        PathBuf::from("data/taxi_rtree")
    }

    fn default_block_dir() -> PathBuf {
        PathBuf::from("data/path_blocks")
    }

    fn default_store_path() -> PathBuf {
        PathBuf::from("data/paths.sqlite")
    }

    fn default_cache_dir() -> PathBuf {
        PathBuf::from("data/query_cache")
    }

    const fn default_grid_size_deg() -> f64 {
        0.002
    }

    const fn default_window_min() -> usize {
        5
    }

    const fn default_window_max() -> usize {
        16
    }

    const fn default_rtree_fanout() -> usize {
        10
    }

    const fn default_density_batch_size() -> usize {
        10_000
    }

    const fn default_density_max_points() -> usize {
        100_000
    }

    /// Load a configuration from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Root all relative artifact paths under `dir`, leaving `data_dir`
    /// untouched. Convenient for tests and throwaway builds.
    pub fn rooted_at(mut self, dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        self.index_basename = dir.join("taxi_rtree");
        self.block_dir = dir.join("path_blocks");
        self.store_path = dir.join("paths.sqlite");
        self.cache_dir = dir.join("query_cache");
        self
    }

    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    pub fn with_grid_size(mut self, grid_size_deg: f64) -> Self {
        self.grid_size_deg = grid_size_deg;
        self
    }

    /// Inclusive window range for the mining pass.
    pub fn with_window_range(mut self, min: usize, max: usize) -> Self {
        self.window_min = min;
        self.window_max = max;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: Self::default_data_dir(),
            index_basename: Self::default_index_basename(),
            block_dir: Self::default_block_dir(),
            store_path: Self::default_store_path(),
            cache_dir: Self::default_cache_dir(),
            grid_size_deg: Self::default_grid_size_deg(),
            window_min: Self::default_window_min(),
            window_max: Self::default_window_max(),
            rtree_fanout: Self::default_rtree_fanout(),
            density_batch_size: Self::default_density_batch_size(),
            density_max_points: Self::default_density_max_points(),
        }
    }
}
