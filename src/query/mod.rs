//! The analytic query engine.
//!
//! One [`QueryEngine`] serves all operators. Every call opens its own
//! read-only handles to the R-tree and the path store (no cross-request
//! locks), consults the per-operator result cache first, and returns a
//! typed response or a typed error, never a partial result dressed up as
//! success.

pub mod density;
pub mod flow;
pub mod frequent;
pub mod region;
pub mod travel;

use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::cache::ResultCache;
use crate::config::Config;
use crate::error::{Result, TaxitraceError};
use crate::reader::TrackDir;
use crate::rtree::RTreeIndex;
use crate::store::PathStore;
use taxitrace_types::BoundingBox2D;

pub use density::{DensityRequest, DensityResponse, DensitySeriesRequest, DensitySeriesResponse};
pub use flow::{FlowAbRequest, FlowAbResponse, RingFlowRequest, RingFlowResponse};
pub use frequent::{FrequentAbRequest, FrequentRequest, FrequentResponse};
pub use region::{RegionCountRequest, RegionCountResponse};
pub use travel::{TravelTimeRequest, TravelTimeResponse};

/// Accepted request timestamp shapes, tried in order.
const TIME_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S"];

/// Cooperative cancellation flag, checked at streaming batch boundaries.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// An axis-aligned lon/lat box as it appears in requests.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BoxSpec {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl BoxSpec {
    /// Validate `min < max` on both axes and produce the box.
    pub fn validate(&self, name: &str) -> Result<BoundingBox2D> {
        if !(self.min_lon < self.max_lon && self.min_lat < self.max_lat) {
            return Err(TaxitraceError::BadRequest(format!(
                "{name}: coordinate range is empty, expected min < max"
            )));
        }
        Ok(BoundingBox2D::new(
            self.min_lon,
            self.min_lat,
            self.max_lon,
            self.max_lat,
        ))
    }

    pub fn from_bbox(bbox: &BoundingBox2D) -> Self {
        Self {
            min_lon: bbox.min_lon(),
            min_lat: bbox.min_lat(),
            max_lon: bbox.max_lon(),
            max_lat: bbox.max_lat(),
        }
    }
}

/// Parse a request timestamp. Naive datetimes are interpreted as UTC.
pub fn parse_time(text: &str) -> Result<f64> {
    for format in TIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
            return Ok(dt.and_utc().timestamp() as f64);
        }
    }
    Err(TaxitraceError::BadRequest(format!(
        "unparseable time string: {text:?}"
    )))
}

/// Parse and validate a `[start, end)` request window.
pub fn parse_time_window(start: &str, end: &str) -> Result<(f64, f64)> {
    let t_lo = parse_time(start)?;
    let t_hi = parse_time(end)?;
    if t_lo >= t_hi {
        return Err(TaxitraceError::BadRequest(
            "time range is empty, expected start_time < end_time".into(),
        ));
    }
    Ok((t_lo, t_hi))
}

/// Format an epoch second as `YYYY-MM-DD HH:MM:SS` (UTC).
pub fn format_time(t: f64) -> String {
    match DateTime::from_timestamp(t as i64, 0) {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => format!("@{t}"),
    }
}

/// Format an epoch second as `YYYY-MM-DD HH:MM` (UTC), used in slot labels.
pub fn format_time_minutes(t: f64) -> String {
    match DateTime::from_timestamp(t as i64, 0) {
        Some(dt) => dt.format("%Y-%m-%d %H:%M").to_string(),
        None => format!("@{t}"),
    }
}

/// The engine: configuration plus the per-operator result cache.
#[derive(Debug, Clone)]
pub struct QueryEngine {
    config: Config,
    cache: ResultCache,
    cancel: CancelFlag,
}

impl QueryEngine {
    pub fn new(config: Config) -> Self {
        let cache = ResultCache::new(config.cache_dir.clone());
        Self {
            config,
            cache,
            cancel: CancelFlag::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The engine's cancellation flag; callers keep a clone and trip it to
    /// stop streaming operators at the next batch boundary.
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    pub(crate) fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(TaxitraceError::Internal("query cancelled".into()));
        }
        Ok(())
    }

    pub(crate) fn open_index(&self) -> Result<RTreeIndex> {
        RTreeIndex::open(&self.config.index_basename)
    }

    pub(crate) fn open_store(&self) -> Result<PathStore> {
        PathStore::open_readonly(&self.config.store_path)
    }

    pub(crate) fn tracks(&self) -> TrackDir {
        TrackDir::new(&self.config.data_dir)
    }

    /// Distinct taxis and point count inside a 3D box.
    pub fn region_count(&self, request: &RegionCountRequest) -> Result<RegionCountResponse> {
        self.cache
            .get_or_compute("region_count", request, || region::execute(self, request))
    }

    /// Normalized density grid snapshot over the Beijing extent.
    pub fn density(&self, request: &DensityRequest) -> Result<DensityResponse> {
        self.cache
            .get_or_compute("density", request, || density::execute(self, request))
    }

    /// Per-interval density summaries.
    pub fn density_series(&self, request: &DensitySeriesRequest) -> Result<DensitySeriesResponse> {
        self.cache.get_or_compute("density_series", request, || {
            density::execute_series(self, request)
        })
    }

    /// Hourly A↔B transition counts.
    pub fn flow_ab(&self, request: &FlowAbRequest) -> Result<FlowAbResponse> {
        self.cache
            .get_or_compute("flow_ab", request, || flow::execute_ab(self, request))
    }

    /// Inner↔outer transition counts for a derived ring.
    pub fn flow_ring(&self, request: &RingFlowRequest) -> Result<RingFlowResponse> {
        self.cache
            .get_or_compute("flow_ring", request, || flow::execute_ring(self, request))
    }

    /// Shortest observed A→B travel time with the raw track.
    pub fn travel_time(&self, request: &TravelTimeRequest) -> Result<TravelTimeResponse> {
        self.cache
            .get_or_compute("travel_time", request, || travel::execute(self, request))
    }

    /// Top-k most frequent paths of at least a length.
    pub fn frequent(&self, request: &FrequentRequest) -> Result<FrequentResponse> {
        self.cache
            .get_or_compute("frequent", request, || frequent::execute(self, request))
    }

    /// Top-k frequent paths from box A to box B.
    pub fn frequent_ab(&self, request: &FrequentAbRequest) -> Result<FrequentResponse> {
        self.cache
            .get_or_compute("frequent_ab", request, || frequent::execute_ab(self, request))
    }
}
