//! Geographic primitives: haversine distance, grid quantization helpers,
//! and the fixed Beijing bounds the density and ring-flow operators use.

use taxitrace_types::{BoundingBox2D, GridCell};

/// Earth radius in meters for haversine distance calculations.
const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Rough meters-per-degree conversion used to size density grids
/// (1 degree ~= 111 km at Beijing latitudes).
const METERS_PER_DEGREE: f64 = 111_000.0;

/// Beijing bounding box for density analysis.
pub const BEIJING_DENSITY_BOUNDS: (f64, f64, f64, f64) = (115.7, 39.4, 117.4, 41.6);

/// Tighter Beijing bounding box used to clip derived outer rings.
pub const BEIJING_CLIP_BOUNDS: (f64, f64, f64, f64) = (116.0, 39.6, 116.8, 40.2);

/// The density-analysis extent as a box.
pub fn beijing_density_bounds() -> BoundingBox2D {
    let (min_lon, min_lat, max_lon, max_lat) = BEIJING_DENSITY_BOUNDS;
    BoundingBox2D::new(min_lon, min_lat, max_lon, max_lat)
}

/// The ring-clipping extent as a box.
pub fn beijing_clip_bounds() -> BoundingBox2D {
    let (min_lon, min_lat, max_lon, max_lat) = BEIJING_CLIP_BOUNDS;
    BoundingBox2D::new(min_lon, min_lat, max_lon, max_lat)
}

/// Great-circle distance in meters between two (lon, lat) coordinates.
pub fn haversine(lon1: f64, lat1: f64, lon2: f64, lat2: f64) -> f64 {
    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let delta_lat = (lat2 - lat1).to_radians();
    let delta_lon = (lon2 - lon1).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();

    EARTH_RADIUS_METERS * c
}

/// Total geodesic length in meters of a polyline of (lon, lat) points.
pub fn path_length(points: &[(f64, f64)]) -> f64 {
    points
        .windows(2)
        .map(|pair| haversine(pair[0].0, pair[0].1, pair[1].0, pair[1].1))
        .sum()
}

/// Convert a distance in meters to degrees using the rough planar factor.
pub fn meters_to_degrees(meters: f64) -> f64 {
    meters / METERS_PER_DEGREE
}

/// Quantize a coordinate onto the analysis grid.
pub fn grid_of(lon: f64, lat: f64, grid_size: f64) -> GridCell {
    GridCell::of(lon, lat, grid_size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn haversine_is_zero_for_identical_points() {
        assert_eq!(haversine(116.3, 39.9, 116.3, 39.9), 0.0);
    }

    #[test]
    fn haversine_is_symmetric() {
        let d1 = haversine(116.30, 39.90, 116.40, 40.00);
        let d2 = haversine(116.40, 40.00, 116.30, 39.90);
        assert!((d1 - d2).abs() < 1e-9);
    }

    #[test]
    fn haversine_matches_known_distance() {
        // Tiananmen Square to the Forbidden City is roughly a kilometer.
        let d = haversine(116.3975, 39.9087, 116.3972, 39.9180);
        assert!(d > 900.0 && d < 1_200.0, "got {d}");
    }

    #[test]
    fn triangle_inequality_holds_for_small_triangles() {
        let a = (116.30, 39.90);
        let b = (116.31, 39.91);
        let c = (116.32, 39.90);
        let ab = haversine(a.0, a.1, b.0, b.1);
        let bc = haversine(b.0, b.1, c.0, c.1);
        let ac = haversine(a.0, a.1, c.0, c.1);
        assert!(ac <= ab + bc + 1.0);
    }

    #[test]
    fn path_length_sums_segments() {
        let points = [(116.30, 39.90), (116.31, 39.90), (116.32, 39.90)];
        let total = path_length(&points);
        let direct = haversine(116.30, 39.90, 116.32, 39.90);
        assert!((total - direct).abs() < 1.0);
        assert_eq!(path_length(&points[..1]), 0.0);
    }

    #[test]
    fn meters_to_degrees_roundtrip() {
        assert!((meters_to_degrees(111_000.0) - 1.0).abs() < 1e-12);
        assert!((meters_to_degrees(500.0) - 0.0045045).abs() < 1e-6);
    }
}
