//! Region point count: how many taxis, and how many samples, fall inside an
//! axis-aligned box during a time window.

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use super::{BoxSpec, QueryEngine, parse_time_window};
use crate::error::Result;
use taxitrace_types::TemporalBoundingBox;

/// Taxi ids returned in the sample list are capped to keep responses small.
const SAMPLE_LIMIT: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionCountRequest {
    #[serde(flatten)]
    pub bbox: BoxSpec,
    pub start_time: String,
    pub end_time: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionCountResponse {
    /// Number of distinct taxis observed in the box.
    pub distinct_taxis: u64,
    /// Total number of trajectory points in the box.
    pub total_points: u64,
    /// Up to 100 of the observed taxi ids, ascending.
    pub sample_taxi_ids: Vec<u64>,
    /// Wall-clock duration of the index scan.
    pub query_seconds: f64,
}

pub(super) fn execute(engine: &QueryEngine, request: &RegionCountRequest) -> Result<RegionCountResponse> {
    let bbox = request.bbox.validate("region")?;
    let (t_lo, t_hi) = parse_time_window(&request.start_time, &request.end_time)?;

    let index = engine.open_index()?;
    let started = Instant::now();

    let mut taxis: FxHashSet<u64> = FxHashSet::default();
    let mut total_points = 0u64;
    for hit in index.intersect(&TemporalBoundingBox::new(bbox, t_lo, t_hi))? {
        let hit = hit?;
        taxis.insert(hit.payload);
        total_points += 1;
    }

    let mut sample_taxi_ids: Vec<u64> = taxis.iter().copied().collect();
    sample_taxi_ids.sort_unstable();
    sample_taxi_ids.truncate(SAMPLE_LIMIT);

    Ok(RegionCountResponse {
        distinct_taxis: taxis.len() as u64,
        total_points,
        sample_taxi_ids,
        query_seconds: started.elapsed().as_secs_f64(),
    })
}
