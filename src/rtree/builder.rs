//! Bulk construction of the on-disk R-tree.
//!
//! The builder streams fixed-size entry records into the data file as they
//! are inserted, keeping only the envelopes in memory. `finish` packs the
//! envelopes bottom-up with a sort-tile-recursive pass (the same family of
//! bulk load `rstar` uses in memory), writes the node file children-first,
//! and atomically renames both files into place so a partially built index
//! is never observable at the basename.

use log::info;
use rstar::{AABB, Envelope, RTreeObject};
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use super::entry::IndexEntry;
use super::format::{DataHeader, NODE_HEADER_SIZE, NodeHeader, NodeRecord, write_entry};
use super::{data_path, node_path};
use crate::error::Result;
use crate::reader::TrackDir;

/// Default node fanout for bulk builds.
pub const DEFAULT_FANOUT: usize = 10;

/// Single-writer bulk builder for a `<basename>.idx` / `<basename>.dat` pair.
pub struct RTreeBuilder {
    basename: PathBuf,
    fanout: usize,
    data_writer: BufWriter<File>,
    entries: Vec<IndexEntry>,
    next_id: u64,
}

impl RTreeBuilder {
    /// Start a build at `basename`, removing any existing index there first.
    pub fn create(basename: impl Into<PathBuf>, fanout: usize) -> Result<Self> {
        let basename = basename.into();
        // Node child counts are stored as u16.
        let fanout = fanout.clamp(2, u16::MAX as usize);
        if let Some(parent) = basename.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        for path in [
            node_path(&basename),
            data_path(&basename),
            tmp_sibling(&node_path(&basename)),
            tmp_sibling(&data_path(&basename)),
        ] {
            remove_if_present(&path)?;
        }

        let mut data_writer = BufWriter::new(
            OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(tmp_sibling(&data_path(&basename)))?,
        );
        DataHeader { entry_count: 0 }.write_to(&mut data_writer)?;

        Ok(Self {
            basename,
            fanout,
            data_writer,
            entries: Vec::new(),
            next_id: 0,
        })
    }

    /// Insert a point entry; returns its monotone id.
    pub fn insert_point(&mut self, lon: f64, lat: f64, t: f64, payload: u64) -> Result<u64> {
        let id = self.next_id;
        self.push(IndexEntry::point(id, payload, lon, lat, t))?;
        Ok(id)
    }

    /// Insert an arbitrary (possibly degenerate) box entry.
    pub fn insert(&mut self, min: [f64; 3], max: [f64; 3], payload: u64) -> Result<u64> {
        let id = self.next_id;
        self.push(IndexEntry {
            id,
            payload,
            min,
            max,
        })?;
        Ok(id)
    }

    fn push(&mut self, entry: IndexEntry) -> Result<()> {
        write_entry(&mut self.data_writer, &entry)?;
        self.entries.push(entry);
        self.next_id += 1;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Pack the tree, fsync, and publish both files at the basename.
    pub fn finish(self) -> Result<u64> {
        let Self {
            basename,
            fanout,
            data_writer,
            entries,
            next_id,
        } = self;

        // Seal the data file: patch the header with the final entry count.
        let mut data_file = data_writer
            .into_inner()
            .map_err(|e| std::io::Error::other(e.to_string()))?;
        data_file.seek(SeekFrom::Start(0))?;
        DataHeader {
            entry_count: next_id,
        }
        .write_to(&mut data_file)?;
        data_file.sync_all()?;
        drop(data_file);

        // Node file: header placeholder, then the packed levels.
        let node_tmp = tmp_sibling(&node_path(&basename));
        let mut node_writer = BufWriter::new(
            OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&node_tmp)?,
        );
        let placeholder = NodeHeader {
            fanout: fanout as u32,
            node_count: 0,
            root_offset: 0,
        };
        placeholder.write_to(&mut node_writer)?;

        let (root_offset, node_count) = pack_levels(&entries, fanout, &mut node_writer)?;

        let mut node_file = node_writer
            .into_inner()
            .map_err(|e| std::io::Error::other(e.to_string()))?;
        node_file.seek(SeekFrom::Start(0))?;
        NodeHeader {
            fanout: fanout as u32,
            node_count,
            root_offset,
        }
        .write_to(&mut node_file)?;
        node_file.sync_all()?;
        drop(node_file);

        fs::rename(tmp_sibling(&data_path(&basename)), data_path(&basename))?;
        fs::rename(node_tmp, node_path(&basename))?;
        sync_parent_dir(&basename)?;

        info!(
            "built R-tree at {}: {} entries, {} nodes",
            basename.display(),
            next_id,
            node_count
        );
        Ok(next_id)
    }
}

enum ChildRef {
    Entry(u64),
    Node(u64),
}

struct PackItem {
    env: AABB<[f64; 3]>,
    child: ChildRef,
}

impl PackItem {
    fn center(&self, axis: usize) -> f64 {
        (self.env.lower()[axis] + self.env.upper()[axis]) / 2.0
    }
}

/// Write every tree level bottom-up; returns (root offset, node count).
fn pack_levels<W: Write>(
    entries: &[IndexEntry],
    fanout: usize,
    writer: &mut W,
) -> Result<(u64, u64)> {
    let mut offset = NODE_HEADER_SIZE;
    let mut node_count = 0u64;

    let mut items: Vec<PackItem> = entries
        .iter()
        .map(|e| PackItem {
            env: e.envelope(),
            child: ChildRef::Entry(e.id),
        })
        .collect();

    if items.is_empty() {
        let root = NodeRecord {
            min: [0.0; 3],
            max: [0.0; 3],
            entries: Vec::new(),
            children: Vec::new(),
        };
        root.write_to(writer)?;
        return Ok((offset, 1));
    }

    loop {
        str_order(&mut items, fanout);

        let mut next: Vec<PackItem> = Vec::with_capacity(items.len().div_ceil(fanout));
        for group in items.chunks(fanout) {
            let node = node_record_for(group);
            node.write_to(writer)?;
            next.push(PackItem {
                env: AABB::from_corners(node.min, node.max),
                child: ChildRef::Node(offset),
            });
            offset += node.encoded_len();
            node_count += 1;
        }

        if next.len() == 1 {
            let root_offset = match next[0].child {
                ChildRef::Node(off) => off,
                ChildRef::Entry(_) => unreachable!("packed level yields nodes"),
            };
            return Ok((root_offset, node_count));
        }
        items = next;
    }
}

/// Arrange items into sort-tile-recursive order over (lon, lat, t) so that
/// consecutive fanout-sized runs form spatially coherent tiles.
fn str_order(items: &mut [PackItem], fanout: usize) {
    let n = items.len();
    let tiles = n.div_ceil(fanout);
    let lon_slabs = (tiles as f64).cbrt().ceil() as usize;
    let lon_slab_len = n.div_ceil(lon_slabs.max(1));

    items.sort_by(|a, b| a.center(0).total_cmp(&b.center(0)));
    for lon_slab in items.chunks_mut(lon_slab_len.max(1)) {
        let slab_tiles = lon_slab.len().div_ceil(fanout);
        let lat_slabs = (slab_tiles as f64).sqrt().ceil() as usize;
        let lat_slab_len = lon_slab.len().div_ceil(lat_slabs.max(1));

        lon_slab.sort_by(|a, b| a.center(1).total_cmp(&b.center(1)));
        for lat_slab in lon_slab.chunks_mut(lat_slab_len.max(1)) {
            lat_slab.sort_by(|a, b| a.center(2).total_cmp(&b.center(2)));
        }
    }
}

fn node_record_for(group: &[PackItem]) -> NodeRecord {
    let mut env = group[0].env.clone();
    for item in &group[1..] {
        env.merge(&item.env);
    }
    let mut entries = Vec::new();
    let mut children = Vec::new();
    for item in group {
        match item.child {
            ChildRef::Entry(id) => entries.push(id),
            ChildRef::Node(off) => children.push(off),
        }
    }
    NodeRecord {
        min: env.lower(),
        max: env.upper(),
        entries,
        children,
    }
}

fn tmp_sibling(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(".tmp");
    PathBuf::from(os)
}

fn remove_if_present(path: &Path) -> std::io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

#[cfg(not(target_os = "windows"))]
fn sync_parent_dir(basename: &Path) -> std::io::Result<()> {
    if let Some(parent) = basename.parent()
        && !parent.as_os_str().is_empty()
    {
        File::open(parent)?.sync_all()?;
    }
    Ok(())
}

#[cfg(target_os = "windows")]
fn sync_parent_dir(_basename: &Path) -> std::io::Result<()> {
    Ok(())
}

/// Statistics from a corpus-wide index build.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuildStats {
    pub files: u64,
    pub points: u64,
    pub skipped_lines: u64,
}

/// Build the index for a whole track directory: one point entry per valid
/// line, payload = taxi id. Unreadable files are logged and skipped, like
/// the rest of the ingestion path.
pub fn build_index_from_dir(
    tracks: &TrackDir,
    basename: impl Into<PathBuf>,
    fanout: usize,
) -> Result<BuildStats> {
    let mut builder = RTreeBuilder::create(basename, fanout)?;
    let mut stats = BuildStats::default();

    let mut iter = tracks.tracks()?;
    for track in iter.by_ref() {
        let track = match track {
            Ok(track) => track,
            Err(e) => {
                log::warn!("skipping unreadable track file: {e}");
                continue;
            }
        };
        stats.files += 1;
        for point in &track.points {
            builder.insert_point(point.lon(), point.lat(), point.timestamp, track.taxi_id)?;
            stats.points += 1;
        }
    }
    stats.skipped_lines = iter.skipped_lines();

    builder.finish()?;
    info!(
        "indexed {} points from {} files ({} malformed lines skipped)",
        stats.points, stats.files, stats.skipped_lines
    );
    Ok(stats)
}
