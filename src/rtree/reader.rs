//! Read-only access to a built index.
//!
//! Opening validates both file headers; each intersection query holds its
//! own file handles, so any number of concurrent readers can attach to the
//! same basename without coordination.

use rstar::{AABB, Envelope, RTreeObject};
use std::fs::File;
use std::path::{Path, PathBuf};

use super::entry::IndexEntry;
use super::format::{DataHeader, NodeHeader, read_entry_at, read_node_at};
use super::{data_path, node_path};
use crate::error::{Result, TaxitraceError};
use taxitrace_types::TemporalBoundingBox;

/// An immutable handle to an on-disk R-tree.
#[derive(Debug, Clone)]
pub struct RTreeIndex {
    basename: PathBuf,
    node_header: NodeHeader,
    data_header: DataHeader,
}

impl RTreeIndex {
    /// Attach to the pair of files at `basename`.
    ///
    /// Returns [`TaxitraceError::IndexMissing`] when either sibling file is
    /// absent, and an IO error when the headers do not parse.
    pub fn open(basename: impl Into<PathBuf>) -> Result<Self> {
        let basename = basename.into();
        let node = node_path(&basename);
        let data = data_path(&basename);
        if !node.is_file() || !data.is_file() {
            return Err(TaxitraceError::IndexMissing(basename));
        }

        let node_header = NodeHeader::read_from(&mut File::open(&node)?)?;
        let data_header = DataHeader::read_from(&mut File::open(&data)?)?;
        Ok(Self {
            basename,
            node_header,
            data_header,
        })
    }

    pub fn basename(&self) -> &Path {
        &self.basename
    }

    pub fn entry_count(&self) -> u64 {
        self.data_header.entry_count
    }

    pub fn node_count(&self) -> u64 {
        self.node_header.node_count
    }

    pub fn fanout(&self) -> u32 {
        self.node_header.fanout
    }

    /// Enumerate every entry whose box intersects the query volume.
    ///
    /// Containment is inclusive on all three axes; degenerate query boxes
    /// are legal. Order is unspecified; entries are yielded at most once.
    pub fn intersect(&self, query: &TemporalBoundingBox) -> Result<Intersection> {
        let env = AABB::from_corners(
            [query.bbox.min_lon(), query.bbox.min_lat(), query.t_start],
            [query.bbox.max_lon(), query.bbox.max_lat(), query.t_end],
        );
        Ok(Intersection {
            node_file: File::open(node_path(&self.basename))?,
            data_file: File::open(data_path(&self.basename))?,
            query: env,
            nodes: vec![self.node_header.root_offset],
            entries: Vec::new(),
        })
    }
}

/// Streaming result of [`RTreeIndex::intersect`].
///
/// The iterator owns its file handles and performs the tree descent lazily;
/// dropping it mid-stream releases them.
pub struct Intersection {
    node_file: File,
    data_file: File,
    query: AABB<[f64; 3]>,
    nodes: Vec<u64>,
    entries: Vec<u64>,
}

impl Intersection {
    fn step(&mut self) -> Result<Option<IndexEntry>> {
        loop {
            if let Some(index) = self.entries.pop() {
                let entry = read_entry_at(&mut self.data_file, index)?;
                if entry.envelope().intersects(&self.query) {
                    return Ok(Some(entry));
                }
                continue;
            }

            let Some(offset) = self.nodes.pop() else {
                return Ok(None);
            };
            let node = read_node_at(&mut self.node_file, offset)?;
            let env = AABB::from_corners(node.min, node.max);
            if !env.intersects(&self.query) {
                continue;
            }
            self.entries.extend(node.entries);
            self.nodes.extend(node.children);
        }
    }
}

impl Iterator for Intersection {
    type Item = Result<IndexEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        self.step().transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rtree::builder::RTreeBuilder;
    use taxitrace_types::BoundingBox2D;

    fn query(
        min_lon: f64,
        min_lat: f64,
        max_lon: f64,
        max_lat: f64,
        t0: f64,
        t1: f64,
    ) -> TemporalBoundingBox {
        TemporalBoundingBox::new(BoundingBox2D::new(min_lon, min_lat, max_lon, max_lat), t0, t1)
    }

    #[test]
    fn missing_basename_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = RTreeIndex::open(dir.path().join("absent")).unwrap_err();
        assert!(matches!(err, TaxitraceError::IndexMissing(_)));
    }

    #[test]
    fn build_open_intersect_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let basename = dir.path().join("taxi_rtree");

        let mut builder = RTreeBuilder::create(&basename, 4).unwrap();
        for i in 0..100u64 {
            let lon = 116.0 + (i % 10) as f64 * 0.01;
            let lat = 39.0 + (i / 10) as f64 * 0.01;
            builder.insert_point(lon, lat, i as f64, i % 7).unwrap();
        }
        assert_eq!(builder.finish().unwrap(), 100);

        let index = RTreeIndex::open(&basename).unwrap();
        assert_eq!(index.entry_count(), 100);

        // Every entry, a strict subset, and a miss.
        let all: Vec<_> = index
            .intersect(&query(115.0, 38.0, 117.0, 40.0, -1.0, 200.0))
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(all.len(), 100);

        let some: Vec<_> = index
            .intersect(&query(116.0, 39.0, 116.045, 39.0, 0.0, 1000.0))
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(some.len(), 5);

        let none: Vec<_> = index
            .intersect(&query(10.0, 10.0, 11.0, 11.0, 0.0, 1000.0))
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn degenerate_query_box_matches_exact_point() {
        let dir = tempfile::tempdir().unwrap();
        let basename = dir.path().join("pt");
        let mut builder = RTreeBuilder::create(&basename, 10).unwrap();
        builder.insert_point(116.30, 39.90, 50.0, 7).unwrap();
        builder.insert_point(116.31, 39.91, 60.0, 8).unwrap();
        builder.finish().unwrap();

        let index = RTreeIndex::open(&basename).unwrap();
        let hits: Vec<_> = index
            .intersect(&query(116.30, 39.90, 116.30, 39.90, 50.0, 50.0))
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].payload, 7);
    }

    #[test]
    fn rebuild_replaces_previous_index() {
        let dir = tempfile::tempdir().unwrap();
        let basename = dir.path().join("re");
        let mut builder = RTreeBuilder::create(&basename, 10).unwrap();
        for i in 0..20 {
            builder.insert_point(116.0, 39.0, i as f64, 1).unwrap();
        }
        builder.finish().unwrap();

        let mut builder = RTreeBuilder::create(&basename, 10).unwrap();
        builder.insert_point(116.0, 39.0, 0.0, 2).unwrap();
        builder.finish().unwrap();

        let index = RTreeIndex::open(&basename).unwrap();
        assert_eq!(index.entry_count(), 1);
    }

    #[test]
    fn empty_index_yields_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let basename = dir.path().join("empty");
        RTreeBuilder::create(&basename, 10).unwrap().finish().unwrap();

        let index = RTreeIndex::open(&basename).unwrap();
        let hits: Vec<_> = index
            .intersect(&query(-180.0, -90.0, 180.0, 90.0, f64::MIN, f64::MAX))
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert!(hits.is_empty());
    }
}
