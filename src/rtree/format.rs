//! On-disk layout of the R-tree node and data files.
//!
//! An index is a pair of sibling files sharing a basename:
//!
//! - `<basename>.idx`, the node file: a fixed header followed by node
//!   records, written children-first so every child offset is known when its
//!   parent is encoded. The header carries the root node's offset.
//! - `<basename>.dat`, the data file: a fixed header followed by 64-byte
//!   entry records `(id u64, payload u64, bbox 6×f64)` addressed by entry
//!   index.
//!
//! All integers and floats are little-endian. The fourth magic byte is the
//! format version.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Seek, SeekFrom, Write};

use super::entry::IndexEntry;

pub const NODE_MAGIC: [u8; 4] = [b'T', b'T', b'X', 1];
pub const DATA_MAGIC: [u8; 4] = [b'T', b'T', b'D', 1];

/// magic + fanout(u32) + node_count(u64) + root_offset(u64)
pub const NODE_HEADER_SIZE: u64 = 24;

/// magic + entry_count(u64)
pub const DATA_HEADER_SIZE: u64 = 12;

/// id + payload + 6 coordinates
pub const ENTRY_RECORD_SIZE: u64 = 64;

/// Header of the node file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeHeader {
    pub fanout: u32,
    pub node_count: u64,
    pub root_offset: u64,
}

impl NodeHeader {
    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&NODE_MAGIC)?;
        w.write_u32::<LittleEndian>(self.fanout)?;
        w.write_u64::<LittleEndian>(self.node_count)?;
        w.write_u64::<LittleEndian>(self.root_offset)?;
        Ok(())
    }

    pub fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
        let mut magic = [0u8; 4];
        r.read_exact(&mut magic)?;
        if magic != NODE_MAGIC {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("bad node file magic {magic:02x?}"),
            ));
        }
        Ok(Self {
            fanout: r.read_u32::<LittleEndian>()?,
            node_count: r.read_u64::<LittleEndian>()?,
            root_offset: r.read_u64::<LittleEndian>()?,
        })
    }
}

/// Header of the data file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataHeader {
    pub entry_count: u64,
}

impl DataHeader {
    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&DATA_MAGIC)?;
        w.write_u64::<LittleEndian>(self.entry_count)?;
        Ok(())
    }

    pub fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
        let mut magic = [0u8; 4];
        r.read_exact(&mut magic)?;
        if magic != DATA_MAGIC {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("bad data file magic {magic:02x?}"),
            ));
        }
        Ok(Self {
            entry_count: r.read_u64::<LittleEndian>()?,
        })
    }
}

/// One node as stored in the node file: its minimum bounding box, the entry
/// indices it holds (leaf level), and the offsets of its child nodes (inner
/// levels). A node never holds both kinds at once in practice, but the
/// format does not forbid it.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeRecord {
    pub min: [f64; 3],
    pub max: [f64; 3],
    pub entries: Vec<u64>,
    pub children: Vec<u64>,
}

impl NodeRecord {
    pub fn encoded_len(&self) -> u64 {
        48 + 2 + 2 + 8 * (self.entries.len() as u64 + self.children.len() as u64)
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        for v in self.min.iter().chain(self.max.iter()) {
            w.write_f64::<LittleEndian>(*v)?;
        }
        w.write_u16::<LittleEndian>(self.entries.len() as u16)?;
        w.write_u16::<LittleEndian>(self.children.len() as u16)?;
        for idx in &self.entries {
            w.write_u64::<LittleEndian>(*idx)?;
        }
        for off in &self.children {
            w.write_u64::<LittleEndian>(*off)?;
        }
        Ok(())
    }

    pub fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
        let mut min = [0f64; 3];
        let mut max = [0f64; 3];
        for v in min.iter_mut() {
            *v = r.read_f64::<LittleEndian>()?;
        }
        for v in max.iter_mut() {
            *v = r.read_f64::<LittleEndian>()?;
        }
        let entry_count = r.read_u16::<LittleEndian>()? as usize;
        let child_count = r.read_u16::<LittleEndian>()? as usize;
        let mut entries = Vec::with_capacity(entry_count);
        for _ in 0..entry_count {
            entries.push(r.read_u64::<LittleEndian>()?);
        }
        let mut children = Vec::with_capacity(child_count);
        for _ in 0..child_count {
            children.push(r.read_u64::<LittleEndian>()?);
        }
        Ok(Self {
            min,
            max,
            entries,
            children,
        })
    }
}

pub fn write_entry<W: Write>(w: &mut W, entry: &IndexEntry) -> io::Result<()> {
    w.write_u64::<LittleEndian>(entry.id)?;
    w.write_u64::<LittleEndian>(entry.payload)?;
    for v in entry.min.iter().chain(entry.max.iter()) {
        w.write_f64::<LittleEndian>(*v)?;
    }
    Ok(())
}

pub fn read_entry<R: Read>(r: &mut R) -> io::Result<IndexEntry> {
    let id = r.read_u64::<LittleEndian>()?;
    let payload = r.read_u64::<LittleEndian>()?;
    let mut min = [0f64; 3];
    let mut max = [0f64; 3];
    for v in min.iter_mut() {
        *v = r.read_f64::<LittleEndian>()?;
    }
    for v in max.iter_mut() {
        *v = r.read_f64::<LittleEndian>()?;
    }
    Ok(IndexEntry {
        id,
        payload,
        min,
        max,
    })
}

/// Read the entry record at `index` from an open data file.
pub fn read_entry_at<R: Read + Seek>(r: &mut R, index: u64) -> io::Result<IndexEntry> {
    r.seek(SeekFrom::Start(DATA_HEADER_SIZE + index * ENTRY_RECORD_SIZE))?;
    read_entry(r)
}

/// Read the node record at an absolute offset from an open node file.
pub fn read_node_at<R: Read + Seek>(r: &mut R, offset: u64) -> io::Result<NodeRecord> {
    r.seek(SeekFrom::Start(offset))?;
    NodeRecord::read_from(r)
}
