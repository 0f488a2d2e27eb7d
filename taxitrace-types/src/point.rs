use geo::Point;
use serde::{Deserialize, Serialize};

/// One trajectory sample: a geographic point with its taxi id and timestamp.
///
/// Timestamps are epoch seconds. Fractional seconds are preserved even though
/// the upstream text format only carries whole seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackPoint {
    pub taxi_id: u64,
    pub timestamp: f64,
    pub point: Point<f64>,
}

impl TrackPoint {
    pub fn new(taxi_id: u64, timestamp: f64, lon: f64, lat: f64) -> Self {
        Self {
            taxi_id,
            timestamp,
            point: Point::new(lon, lat),
        }
    }

    pub fn lon(&self) -> f64 {
        self.point.x()
    }

    pub fn lat(&self) -> f64 {
        self.point.y()
    }

    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }
}
