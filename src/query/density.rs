//! Density analysis over the fixed Beijing extent: a normalized snapshot
//! grid and a per-interval time series.

use log::warn;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use super::{BoxSpec, QueryEngine, format_time, parse_time_window};
use crate::error::{Result, TaxitraceError};
use crate::geo::{beijing_density_bounds, meters_to_degrees};
use taxitrace_types::{BoundingBox2D, TemporalBoundingBox};

fn default_grid_size_m() -> f64 {
    500.0
}

fn default_interval_secs() -> u64 {
    3600
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DensityRequest {
    /// Grid side length in meters.
    #[serde(default = "default_grid_size_m")]
    pub grid_size: f64,
    pub start_time: String,
    pub end_time: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DensitySeriesRequest {
    #[serde(default = "default_grid_size_m")]
    pub grid_size: f64,
    pub start_time: String,
    pub end_time: String,
    /// Bucket width in seconds.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CellBounds {
    pub sw: [f64; 2],
    pub ne: [f64; 2],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DensityCell {
    pub bounds: CellBounds,
    /// Normalized 0..100 density.
    pub density: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: String,
    pub end: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DensityStats {
    pub total_points: u64,
    pub total_grids: usize,
    pub max_density: u32,
    pub avg_density: f64,
    pub time_range: TimeRange,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DensityResponse {
    pub grid_data: Vec<DensityCell>,
    pub stats: DensityStats,
    pub grid_size: f64,
    pub bounds: BoxSpec,
    /// True when the point cap trimmed the stream; densities then reflect
    /// only the consumed prefix.
    pub truncated: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DensitySeriesBucket {
    pub time: String,
    pub max_density: u32,
    pub avg_density: f64,
    pub total_points: u64,
    pub active_grids: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridInfo {
    pub size: f64,
    pub rows: usize,
    pub cols: usize,
    pub bounds: BoxSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DensitySeriesResponse {
    pub time_series: Vec<DensitySeriesBucket>,
    pub grid_info: GridInfo,
    pub truncated: bool,
}

/// Dimensions of the counting matrix over `extent` at `grid_size_deg`.
struct GridShape {
    extent: BoundingBox2D,
    grid_size_deg: f64,
    rows: usize,
    cols: usize,
}

impl GridShape {
    fn new(extent: BoundingBox2D, grid_size_m: f64) -> Result<Self> {
        if grid_size_m <= 0.0 {
            return Err(TaxitraceError::BadRequest(
                "grid_size must be positive".into(),
            ));
        }
        let grid_size_deg = meters_to_degrees(grid_size_m);
        let cols = (extent.width() / grid_size_deg) as usize + 1;
        let rows = (extent.height() / grid_size_deg) as usize + 1;
        Ok(Self {
            extent,
            grid_size_deg,
            rows,
            cols,
        })
    }

    fn cell_of(&self, lon: f64, lat: f64) -> Option<(usize, usize)> {
        if lon < self.extent.min_lon() || lat < self.extent.min_lat() {
            return None;
        }
        let col = ((lon - self.extent.min_lon()) / self.grid_size_deg) as usize;
        let row = ((lat - self.extent.min_lat()) / self.grid_size_deg) as usize;
        (row < self.rows && col < self.cols).then_some((row, col))
    }

    fn cell_bounds(&self, row: usize, col: usize) -> CellBounds {
        let sw = [
            self.extent.min_lon() + col as f64 * self.grid_size_deg,
            self.extent.min_lat() + row as f64 * self.grid_size_deg,
        ];
        let ne = [
            self.extent.min_lon() + (col + 1) as f64 * self.grid_size_deg,
            self.extent.min_lat() + (row + 1) as f64 * self.grid_size_deg,
        ];
        CellBounds { sw, ne }
    }
}

/// A counting matrix normalized to 0..100 by its maximum.
struct DensityMatrix {
    counts: Vec<u32>,
    cols: usize,
}

impl DensityMatrix {
    fn new(shape: &GridShape) -> Self {
        Self {
            counts: vec![0; shape.rows * shape.cols],
            cols: shape.cols,
        }
    }

    fn bump(&mut self, row: usize, col: usize) {
        self.counts[row * self.cols + col] += 1;
    }

    /// Divide by the matrix max and truncate, in place.
    fn normalize(&mut self) {
        let max = self.counts.iter().copied().max().unwrap_or(0);
        if max == 0 {
            return;
        }
        for v in &mut self.counts {
            *v = *v * 100 / max;
        }
    }

    fn max(&self) -> u32 {
        self.counts.iter().copied().max().unwrap_or(0)
    }

    fn nonzero(&self) -> impl Iterator<Item = (usize, usize, u32)> + '_ {
        self.counts.iter().enumerate().filter_map(|(i, &v)| {
            (v > 0).then_some((i / self.cols, i % self.cols, v))
        })
    }

    fn avg_nonzero(&self) -> f64 {
        let (sum, n) = self
            .counts
            .iter()
            .filter(|&&v| v > 0)
            .fold((0u64, 0u64), |(s, n), &v| (s + u64::from(v), n + 1));
        if n == 0 { 0.0 } else { sum as f64 / n as f64 }
    }

    fn active(&self) -> usize {
        self.counts.iter().filter(|&&v| v > 0).count()
    }
}

/// Stream the Beijing-extent intersection, collecting `(t, lon, lat)` up to
/// the configured cap. Returns the samples and whether the cap trimmed.
fn collect_points(
    engine: &QueryEngine,
    extent: &BoundingBox2D,
    t_lo: f64,
    t_hi: f64,
) -> Result<(Vec<(f64, f64, f64)>, bool)> {
    let index = engine.open_index()?;
    let batch_size = engine.config().density_batch_size.max(1);
    let max_points = engine.config().density_max_points;

    let mut points = Vec::new();
    let mut truncated = false;
    for hit in index.intersect(&TemporalBoundingBox::new(*extent, t_lo, t_hi))? {
        let hit = hit?;
        if !extent.contains(hit.lon(), hit.lat()) {
            continue;
        }
        points.push((hit.t(), hit.lon(), hit.lat()));
        if points.len() % batch_size == 0 {
            engine.check_cancelled()?;
        }
        if points.len() >= max_points {
            truncated = true;
            warn!("density stream hit the {max_points}-point cap; results are partial");
            break;
        }
    }
    Ok((points, truncated))
}

pub(super) fn execute(engine: &QueryEngine, request: &DensityRequest) -> Result<DensityResponse> {
    let (t_lo, t_hi) = parse_time_window(&request.start_time, &request.end_time)?;
    let extent = beijing_density_bounds();
    let shape = GridShape::new(extent, request.grid_size)?;

    let (points, truncated) = collect_points(engine, &extent, t_lo, t_hi)?;
    if points.is_empty() {
        return Err(TaxitraceError::NotFound(
            "no trajectory points in the selected time range".into(),
        ));
    }

    let mut matrix = DensityMatrix::new(&shape);
    for &(_, lon, lat) in &points {
        if let Some((row, col)) = shape.cell_of(lon, lat) {
            matrix.bump(row, col);
        }
    }
    matrix.normalize();

    let grid_data: Vec<DensityCell> = matrix
        .nonzero()
        .map(|(row, col, density)| DensityCell {
            bounds: shape.cell_bounds(row, col),
            density,
        })
        .collect();

    let stats = DensityStats {
        total_points: points.len() as u64,
        total_grids: grid_data.len(),
        max_density: matrix.max(),
        avg_density: matrix.avg_nonzero(),
        time_range: TimeRange {
            start: format_time(t_lo),
            end: format_time(t_hi),
        },
    };

    Ok(DensityResponse {
        grid_data,
        stats,
        grid_size: request.grid_size,
        bounds: BoxSpec::from_bbox(&extent),
        truncated,
    })
}

pub(super) fn execute_series(
    engine: &QueryEngine,
    request: &DensitySeriesRequest,
) -> Result<DensitySeriesResponse> {
    let (t_lo, t_hi) = parse_time_window(&request.start_time, &request.end_time)?;
    if request.interval_secs == 0 {
        return Err(TaxitraceError::BadRequest(
            "interval_secs must be positive".into(),
        ));
    }
    let extent = beijing_density_bounds();
    let shape = GridShape::new(extent, request.grid_size)?;

    let (points, truncated) = collect_points(engine, &extent, t_lo, t_hi)?;
    if points.is_empty() {
        return Err(TaxitraceError::NotFound(
            "no trajectory points in the selected time range".into(),
        ));
    }

    let interval = request.interval_secs as f64;
    let mut buckets: FxHashMap<i64, Vec<(f64, f64)>> = FxHashMap::default();
    for &(t, lon, lat) in &points {
        let bucket = (t / interval).floor() as i64;
        buckets.entry(bucket).or_default().push((lon, lat));
    }

    let mut keys: Vec<i64> = buckets.keys().copied().collect();
    keys.sort_unstable();

    let time_series = keys
        .into_iter()
        .map(|key| {
            let bucket_points = &buckets[&key];
            let mut matrix = DensityMatrix::new(&shape);
            for &(lon, lat) in bucket_points {
                if let Some((row, col)) = shape.cell_of(lon, lat) {
                    matrix.bump(row, col);
                }
            }
            matrix.normalize();
            DensitySeriesBucket {
                time: format_time(key as f64 * interval),
                max_density: matrix.max(),
                avg_density: matrix.avg_nonzero(),
                total_points: bucket_points.len() as u64,
                active_grids: matrix.active(),
            }
        })
        .collect();

    Ok(DensitySeriesResponse {
        time_series,
        grid_info: GridInfo {
            size: request.grid_size,
            rows: shape.rows,
            cols: shape.cols,
            bounds: BoxSpec::from_bbox(&extent),
        },
        truncated,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_shape_matches_rough_conversion() {
        let shape = GridShape::new(beijing_density_bounds(), 500.0).unwrap();
        // 1.7 degrees of longitude at ~0.0045 deg per cell.
        assert_eq!(shape.cols, 378);
        assert_eq!(shape.rows, 489);
        assert!(shape.cell_of(115.7, 39.4).is_some());
        assert!(shape.cell_of(115.0, 39.4).is_none());
    }

    #[test]
    fn normalization_truncates_to_percent_scale() {
        let shape = GridShape::new(beijing_density_bounds(), 500.0).unwrap();
        let mut matrix = DensityMatrix::new(&shape);
        matrix.bump(0, 0);
        matrix.bump(0, 0);
        matrix.bump(0, 0);
        matrix.bump(1, 1);
        matrix.normalize();
        assert_eq!(matrix.max(), 100);
        assert_eq!(matrix.counts[shape.cols + 1], 33);
    }

    #[test]
    fn zero_grid_size_is_rejected() {
        assert!(GridShape::new(beijing_density_bounds(), 0.0).is_err());
    }
}
