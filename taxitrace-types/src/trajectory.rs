use crate::point::TrackPoint;
use serde::{Deserialize, Serialize};

/// One taxi's trajectory: its samples in file order.
///
/// The reader does not reorder samples; callers that need time order call
/// [`TaxiTrack::sort_by_time`] first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaxiTrack {
    pub taxi_id: u64,
    pub points: Vec<TrackPoint>,
}

impl TaxiTrack {
    pub fn new(taxi_id: u64) -> Self {
        Self {
            taxi_id,
            points: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Stable sort by timestamp; ties keep file order.
    pub fn sort_by_time(&mut self) {
        self.points
            .sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
    }

    /// Iterate over the (lon, lat) positions in sample order.
    pub fn positions(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.points.iter().map(|p| (p.lon(), p.lat()))
    }
}
