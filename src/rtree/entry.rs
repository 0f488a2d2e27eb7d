//! Index entries: zero-volume 3D boxes over (lon, lat, t) carrying a taxi id.

use rstar::{AABB, RTreeObject};

/// One indexed trajectory point.
///
/// `id` is unique and monotone across a build; `payload` is the taxi id.
/// Entries are stored as boxes so the format also admits true extents, but
/// every entry the builder produces has `min == max` on all axes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndexEntry {
    pub id: u64,
    pub payload: u64,
    pub min: [f64; 3],
    pub max: [f64; 3],
}

impl IndexEntry {
    /// A point entry at (lon, lat, t).
    pub fn point(id: u64, payload: u64, lon: f64, lat: f64, t: f64) -> Self {
        Self {
            id,
            payload,
            min: [lon, lat, t],
            max: [lon, lat, t],
        }
    }

    pub fn lon(&self) -> f64 {
        self.min[0]
    }

    pub fn lat(&self) -> f64 {
        self.min[1]
    }

    pub fn t(&self) -> f64 {
        self.min[2]
    }
}

impl RTreeObject for IndexEntry {
    type Envelope = AABB<[f64; 3]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners(self.min, self.max)
    }
}
