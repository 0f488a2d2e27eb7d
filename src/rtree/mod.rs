//! Disk-resident 3D R-tree over (lon, lat, t) point entries.
//!
//! The index is bulk-built offline by [`RTreeBuilder`] and queried through
//! read-only [`RTreeIndex`] handles. It is the only structure the
//! region/time operators consult; raw trajectory scans are reserved for the
//! travel-time track replay.

pub mod builder;
pub mod entry;
pub mod format;
pub mod reader;

pub use builder::{BuildStats, DEFAULT_FANOUT, RTreeBuilder, build_index_from_dir};
pub use entry::IndexEntry;
pub use reader::{Intersection, RTreeIndex};

use std::path::{Path, PathBuf};

/// The `<basename>.idx` node file.
pub(crate) fn node_path(basename: &Path) -> PathBuf {
    sibling(basename, ".idx")
}

/// The `<basename>.dat` data file.
pub(crate) fn data_path(basename: &Path) -> PathBuf {
    sibling(basename, ".dat")
}

fn sibling(basename: &Path, suffix: &str) -> PathBuf {
    let mut os = basename.as_os_str().to_os_string();
    os.push(suffix);
    PathBuf::from(os)
}
