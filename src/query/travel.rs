//! Shortest observed travel time from region A to region B, with the
//! winning taxi's raw track replayed over the interval.

use serde::{Deserialize, Serialize};

use super::flow::{AreaLabel, hits_by_taxi, merge_events, scan_transitions};
use super::{BoxSpec, QueryEngine, format_time, parse_time_window};
use crate::error::{Result, TaxitraceError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TravelTimeRequest {
    pub area_a: BoxSpec,
    pub area_b: BoxSpec,
    pub start_time: String,
    pub end_time: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackSample {
    pub timestamp: f64,
    pub time: String,
    pub lon: f64,
    pub lat: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TravelTrack {
    pub id: u64,
    pub path: Vec<TrackSample>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TravelTimeResponse {
    pub taxi_id: u64,
    pub travel_time_seconds: f64,
    pub travel_time_minutes: f64,
    pub start_time: String,
    pub end_time: String,
    pub track: TravelTrack,
}

/// The fastest observed A→B traversal: `(duration, taxi, t_a, t_b)`.
/// Tuple order doubles as the deterministic tie-break.
type Candidate = (f64, u64, f64, f64);

pub(super) fn execute(engine: &QueryEngine, request: &TravelTimeRequest) -> Result<TravelTimeResponse> {
    let area_a = request.area_a.validate("area_a")?;
    let area_b = request.area_b.validate("area_b")?;
    let (t_lo, t_hi) = parse_time_window(&request.start_time, &request.end_time)?;

    let index = engine.open_index()?;
    let in_a = hits_by_taxi(&index, &area_a, t_lo, t_hi)?;
    let in_b = hits_by_taxi(&index, &area_b, t_lo, t_hi)?;

    let mut common = false;
    let mut best: Option<Candidate> = None;
    for (taxi, hits_a) in &in_a {
        let Some(hits_b) = in_b.get(taxi) else {
            continue;
        };
        common = true;
        let events = merge_events(hits_a, hits_b);
        scan_transitions(&events, |from, _to, t_from, t_to| {
            if from != AreaLabel::First {
                return;
            }
            let candidate: Candidate = (t_to - t_from, *taxi, t_from, t_to);
            if best.is_none_or(|current| candidate < current) {
                best = Some(candidate);
            }
        });
    }

    if !common {
        return Err(TaxitraceError::NotFound(
            "no taxi appears in both areas during the window".into(),
        ));
    }
    let Some((duration, taxi_id, t_a, t_b)) = best else {
        return Err(TaxitraceError::NotFound(
            "no A to B traversal observed during the window".into(),
        ));
    };

    let path = engine
        .tracks()
        .read_track_window(taxi_id, t_a, t_b)?
        .into_iter()
        .map(|p| TrackSample {
            timestamp: p.timestamp,
            time: format_time(p.timestamp),
            lon: p.lon(),
            lat: p.lat(),
        })
        .collect();

    Ok(TravelTimeResponse {
        taxi_id,
        travel_time_seconds: duration,
        travel_time_minutes: duration / 60.0,
        start_time: format_time(t_a),
        end_time: format_time(t_b),
        track: TravelTrack { id: taxi_id, path },
    })
}
