//! Top-k frequent paths over the consolidated path store, globally or
//! restricted to paths leading from box A to box B.

use serde::{Deserialize, Serialize};

use super::QueryEngine;
use crate::error::{Result, TaxitraceError};
use crate::store::PathRecord;
use taxitrace_types::BoundingBox2D;

/// Minimum path length applied when the A→B request does not set one.
const DEFAULT_MIN_DISTANCE_M: f64 = 100.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrequentRequest {
    pub k: usize,
    /// Minimum geodesic path length in meters.
    pub min_distance: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrequentAbRequest {
    pub k: usize,
    /// `[min_lon, min_lat, max_lon, max_lat]`
    pub rect_a: [f64; 4],
    /// `[min_lon, min_lat, max_lon, max_lat]`
    pub rect_b: [f64; 4],
    #[serde(default = "default_min_distance")]
    pub min_distance: f64,
}

fn default_min_distance() -> f64 {
    DEFAULT_MIN_DISTANCE_M
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrequentPath {
    pub frequency: u32,
    /// Geodesic length in meters.
    pub length: f64,
    pub points: Vec<[f64; 2]>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrequentResponse {
    pub paths: Vec<FrequentPath>,
    pub total_paths_analyzed: usize,
}

fn check_limits(k: usize, min_distance: f64) -> Result<()> {
    if k == 0 {
        return Err(TaxitraceError::BadRequest("k must be greater than 0".into()));
    }
    if min_distance <= 0.0 {
        return Err(TaxitraceError::BadRequest(
            "min_distance must be greater than 0".into(),
        ));
    }
    Ok(())
}

fn to_output(record: PathRecord) -> FrequentPath {
    FrequentPath {
        frequency: record.frequency,
        length: record.length_m,
        points: record.points.iter().map(|&(lon, lat)| [lon, lat]).collect(),
    }
}

fn respond(paths: Vec<FrequentPath>) -> Result<FrequentResponse> {
    if paths.is_empty() {
        return Err(TaxitraceError::NotFound(
            "no stored path satisfies the filter".into(),
        ));
    }
    Ok(FrequentResponse {
        total_paths_analyzed: paths.len(),
        paths,
    })
}

pub(super) fn execute(engine: &QueryEngine, request: &FrequentRequest) -> Result<FrequentResponse> {
    check_limits(request.k, request.min_distance)?;
    let store = engine.open_store()?;
    let paths = store
        .top_k(request.min_distance, request.k)?
        .into_iter()
        .map(to_output)
        .collect();
    respond(paths)
}

fn rect_of(spec: &[f64; 4], name: &str) -> Result<BoundingBox2D> {
    let [min_lon, min_lat, max_lon, max_lat] = *spec;
    if !(min_lon < max_lon && min_lat < max_lat) {
        return Err(TaxitraceError::BadRequest(format!(
            "{name}: coordinate range is empty, expected min < max"
        )));
    }
    Ok(BoundingBox2D::new(min_lon, min_lat, max_lon, max_lat))
}

pub(super) fn execute_ab(engine: &QueryEngine, request: &FrequentAbRequest) -> Result<FrequentResponse> {
    check_limits(request.k, request.min_distance)?;
    let rect_a = rect_of(&request.rect_a, "rect_a")?;
    let rect_b = rect_of(&request.rect_b, "rect_b")?;

    let store = engine.open_store()?;
    let mut matching: Vec<PathRecord> = Vec::new();
    store.for_each_min_length(request.min_distance, |record| {
        let (Some(first), Some(last)) = (record.points.first(), record.points.last()) else {
            return;
        };
        if rect_a.contains(first.0, first.1) && rect_b.contains(last.0, last.1) {
            matching.push(record);
        }
    })?;

    // Stable sort keeps store row order among equal frequencies.
    matching.sort_by(|a, b| b.frequency.cmp(&a.frequency));
    matching.truncate(request.k);

    respond(matching.into_iter().map(to_output).collect())
}
