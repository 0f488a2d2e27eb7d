//! Inter-region flow analysis: A↔B transition counts by hour, and the
//! inner↔outer variant over a derived ring.
//!
//! Both operators reconstruct a per-taxi event stream from two R-tree
//! intersections. Events are keyed by entry id and sorted by
//! `(t ASC, label ASC)`, so equal-timestamp ties resolve the same way on
//! every run: with both labels present at one instant, the later label ends
//! up holding the `last area` slot.

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

use super::{BoxSpec, QueryEngine, format_time_minutes, parse_time_window};
use crate::error::Result;
use crate::geo::beijing_clip_bounds;
use crate::rtree::{IndexEntry, RTreeIndex};
use taxitrace_types::{BoundingBox2D, TemporalBoundingBox};

/// Fixed width of a flow time slot.
const SLOT_SECONDS: f64 = 3600.0;

fn default_travel_window_mins() -> u64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowAbRequest {
    pub area_a: BoxSpec,
    pub area_b: BoxSpec,
    pub start_time: String,
    pub end_time: String,
    /// Maximum minutes between consecutive sightings for a transition to
    /// count as one trip.
    #[serde(default = "default_travel_window_mins")]
    pub travel_window_mins: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowSlot {
    pub start: f64,
    pub end: f64,
    pub label: String,
    pub a_to_b: u64,
    pub b_to_a: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowTotals {
    pub a_to_b: u64,
    pub b_to_a: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowAbResponse {
    pub time_slots: Vec<FlowSlot>,
    pub total: FlowTotals,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RingFlowRequest {
    pub inner_rect: BoxSpec,
    pub start_time: String,
    pub end_time: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RingSlot {
    pub start: f64,
    pub end: f64,
    pub label: String,
    pub inner_to_outer: u64,
    pub outer_to_inner: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RingTotals {
    pub inner_to_outer: u64,
    pub outer_to_inner: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RingFlowResponse {
    pub time_slots: Vec<RingSlot>,
    pub total: RingTotals,
    /// The derived outer box actually used, after clipping.
    pub outer_rect: BoxSpec,
}

/// Which of the two regions an event belongs to. The derived `Ord` gives
/// the first region the smaller label, fixing tie order at equal times.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(super) enum AreaLabel {
    First,
    Second,
}

/// One sighting of a taxi inside a region.
#[derive(Debug, Clone, Copy)]
pub(super) struct AreaEvent {
    pub t: f64,
    pub label: AreaLabel,
}

/// Group the entries of one region/time intersection by taxi.
pub(super) fn hits_by_taxi(
    index: &RTreeIndex,
    bbox: &BoundingBox2D,
    t_lo: f64,
    t_hi: f64,
) -> Result<FxHashMap<u64, Vec<IndexEntry>>> {
    let mut grouped: FxHashMap<u64, Vec<IndexEntry>> = FxHashMap::default();
    for hit in index.intersect(&TemporalBoundingBox::new(*bbox, t_lo, t_hi))? {
        let hit = hit?;
        grouped.entry(hit.payload).or_default().push(hit);
    }
    Ok(grouped)
}

/// Merge one taxi's sightings from both regions into a single stream,
/// sort-stable on `(t, label)`.
pub(super) fn merge_events(first: &[IndexEntry], second: &[IndexEntry]) -> Vec<AreaEvent> {
    let mut events: Vec<AreaEvent> = first
        .iter()
        .map(|e| AreaEvent {
            t: e.t(),
            label: AreaLabel::First,
        })
        .chain(second.iter().map(|e| AreaEvent {
            t: e.t(),
            label: AreaLabel::Second,
        }))
        .collect();
    events.sort_by(|a, b| a.t.total_cmp(&b.t).then(a.label.cmp(&b.label)));
    events
}

/// Walk an event stream and report every region change as
/// `(from, to, t_from, t_to)`.
pub(super) fn scan_transitions(
    events: &[AreaEvent],
    mut on_transition: impl FnMut(AreaLabel, AreaLabel, f64, f64),
) {
    let mut last: Option<AreaEvent> = None;
    for event in events {
        if let Some(prev) = last
            && prev.label != event.label
        {
            on_transition(prev.label, event.label, prev.t, event.t);
        }
        last = Some(*event);
    }
}

/// Fixed-width hourly slots spanning `[t_lo, t_hi]`; the final slot may be
/// short. Returns `(start, end)` pairs.
pub(super) fn hourly_slots(t_lo: f64, t_hi: f64) -> Vec<(f64, f64)> {
    let mut slots = Vec::new();
    let mut current = t_lo;
    while current < t_hi {
        let next = (current + SLOT_SECONDS).min(t_hi);
        slots.push((current, next));
        current = next;
    }
    slots
}

/// The slot containing `t` under `start <= t < end` semantics.
pub(super) fn slot_index(slots: &[(f64, f64)], t_lo: f64, t: f64) -> Option<usize> {
    if t < t_lo {
        return None;
    }
    let idx = ((t - t_lo) / SLOT_SECONDS) as usize;
    (idx < slots.len() && t < slots[idx].1).then_some(idx)
}

fn slot_label(start: f64, end: f64) -> String {
    format!("{} - {}", format_time_minutes(start), format_time_minutes(end))
}

pub(super) fn execute_ab(engine: &QueryEngine, request: &FlowAbRequest) -> Result<FlowAbResponse> {
    let area_a = request.area_a.validate("area_a")?;
    let area_b = request.area_b.validate("area_b")?;
    let (t_lo, t_hi) = parse_time_window(&request.start_time, &request.end_time)?;
    let gate_secs = request.travel_window_mins as f64 * 60.0;

    let index = engine.open_index()?;
    let in_a = hits_by_taxi(&index, &area_a, t_lo, t_hi)?;
    let in_b = hits_by_taxi(&index, &area_b, t_lo, t_hi)?;

    let slots = hourly_slots(t_lo, t_hi);
    let mut a_to_b = vec![0u64; slots.len()];
    let mut b_to_a = vec![0u64; slots.len()];

    for (taxi, hits_a) in &in_a {
        let Some(hits_b) = in_b.get(taxi) else {
            continue;
        };
        let events = merge_events(hits_a, hits_b);
        scan_transitions(&events, |from, _to, t_from, t_to| {
            if t_to - t_from > gate_secs {
                return;
            }
            let Some(slot) = slot_index(&slots, t_lo, t_to) else {
                return;
            };
            match from {
                AreaLabel::First => a_to_b[slot] += 1,
                AreaLabel::Second => b_to_a[slot] += 1,
            }
        });
    }

    let time_slots: Vec<FlowSlot> = slots
        .iter()
        .zip(a_to_b.iter().zip(&b_to_a))
        .map(|(&(start, end), (&ab, &ba))| FlowSlot {
            start,
            end,
            label: slot_label(start, end),
            a_to_b: ab,
            b_to_a: ba,
        })
        .collect();

    Ok(FlowAbResponse {
        total: FlowTotals {
            a_to_b: a_to_b.iter().sum(),
            b_to_a: b_to_a.iter().sum(),
        },
        time_slots,
    })
}

pub(super) fn execute_ring(engine: &QueryEngine, request: &RingFlowRequest) -> Result<RingFlowResponse> {
    let inner = request.inner_rect.validate("inner_rect")?;
    let (t_lo, t_hi) = parse_time_window(&request.start_time, &request.end_time)?;
    let outer = inner.scaled(1.5).clipped_to(&beijing_clip_bounds());

    let index = engine.open_index()?;
    let in_inner = hits_by_taxi(&index, &inner, t_lo, t_hi)?;

    // A point counted as inner must not reappear in the outer stream;
    // exclusion is by entry id, which is unique per point.
    let inner_ids: FxHashSet<u64> = in_inner
        .values()
        .flat_map(|hits| hits.iter().map(|e| e.id))
        .collect();

    let mut in_outer = hits_by_taxi(&index, &outer, t_lo, t_hi)?;
    for hits in in_outer.values_mut() {
        hits.retain(|e| !inner_ids.contains(&e.id));
    }

    let slots = hourly_slots(t_lo, t_hi);
    let mut inner_to_outer = vec![0u64; slots.len()];
    let mut outer_to_inner = vec![0u64; slots.len()];

    for (taxi, inner_hits) in &in_inner {
        let Some(outer_hits) = in_outer.get(taxi) else {
            continue;
        };
        if outer_hits.is_empty() {
            continue;
        }
        let events = merge_events(inner_hits, outer_hits);
        scan_transitions(&events, |from, _to, _t_from, t_to| {
            let Some(slot) = slot_index(&slots, t_lo, t_to) else {
                return;
            };
            match from {
                AreaLabel::First => inner_to_outer[slot] += 1,
                AreaLabel::Second => outer_to_inner[slot] += 1,
            }
        });
    }

    let time_slots: Vec<RingSlot> = slots
        .iter()
        .zip(inner_to_outer.iter().zip(&outer_to_inner))
        .map(|(&(start, end), (&io, &oi))| RingSlot {
            start,
            end,
            label: slot_label(start, end),
            inner_to_outer: io,
            outer_to_inner: oi,
        })
        .collect();

    Ok(RingFlowResponse {
        total: RingTotals {
            inner_to_outer: inner_to_outer.iter().sum(),
            outer_to_inner: outer_to_inner.iter().sum(),
        },
        time_slots,
        outer_rect: BoxSpec::from_bbox(&outer),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: u64, t: f64) -> IndexEntry {
        IndexEntry::point(id, 9, 116.3, 39.9, t)
    }

    #[test]
    fn hourly_slots_cover_the_window_with_a_short_tail() {
        let slots = hourly_slots(0.0, 7500.0);
        assert_eq!(slots, vec![(0.0, 3600.0), (3600.0, 7200.0), (7200.0, 7500.0)]);
        assert_eq!(slot_index(&slots, 0.0, 3599.9), Some(0));
        assert_eq!(slot_index(&slots, 0.0, 3600.0), Some(1));
        assert_eq!(slot_index(&slots, 0.0, 7499.0), Some(2));
        // The window's exclusive upper edge belongs to no slot.
        assert_eq!(slot_index(&slots, 0.0, 7500.0), None);
    }

    #[test]
    fn merged_events_resolve_ties_by_label() {
        let events = merge_events(&[entry(0, 100.0)], &[entry(1, 100.0), entry(2, 50.0)]);
        let labels: Vec<AreaLabel> = events.iter().map(|e| e.label).collect();
        assert_eq!(
            labels,
            vec![AreaLabel::Second, AreaLabel::First, AreaLabel::Second]
        );
    }

    #[test]
    fn transitions_fire_only_on_region_change() {
        let events = merge_events(
            &[entry(0, 100.0), entry(1, 200.0)],
            &[entry(2, 300.0), entry(3, 400.0)],
        );
        let mut seen = Vec::new();
        scan_transitions(&events, |from, to, t_from, t_to| {
            seen.push((from, to, t_from, t_to));
        });
        assert_eq!(
            seen,
            vec![(AreaLabel::First, AreaLabel::Second, 200.0, 300.0)]
        );
    }
}
