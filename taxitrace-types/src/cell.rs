use serde::{Deserialize, Serialize};

/// A cell of the fixed quantization grid.
///
/// Cells are identified by integer grid coordinates obtained by floor
/// division of (lon, lat) by the grid size. The canonical representative of
/// a cell is its center, rounded to 6 decimal places so that identical
/// centers hash and format identically across runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GridCell {
    pub gx: i32,
    pub gy: i32,
}

impl GridCell {
    /// Quantize a (lon, lat) coordinate onto the grid.
    pub fn of(lon: f64, lat: f64, grid_size: f64) -> Self {
        Self {
            gx: (lon / grid_size).floor() as i32,
            gy: (lat / grid_size).floor() as i32,
        }
    }

    /// The cell's canonical center, rounded to 6 decimal places.
    pub fn center(&self, grid_size: f64) -> (f64, f64) {
        let lon = (f64::from(self.gx) + 0.5) * grid_size;
        let lat = (f64::from(self.gy) + 0.5) * grid_size;
        (round6(lon), round6(lat))
    }
}

/// Round a coordinate to 6 decimal places (~0.1 m of longitude).
///
/// Part of the cell-center contract: re-quantizing a rounded center must
/// land in the originating cell.
pub fn round6(v: f64) -> f64 {
    (v * 1_000_000.0).round() / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    const G: f64 = 0.002;

    #[test]
    fn quantization_floors_toward_negative_infinity() {
        assert_eq!(GridCell::of(116.3001, 39.9001, G), GridCell { gx: 58150, gy: 19950 });
        assert_eq!(GridCell::of(-0.0001, -0.0001, G), GridCell { gx: -1, gy: -1 });
    }

    #[test]
    fn center_requantizes_to_same_cell() {
        for &(lon, lat) in &[
            (116.30, 39.90),
            (116.3999, 40.0001),
            (-73.9857, 40.7484),
            (0.0, 0.0),
        ] {
            let cell = GridCell::of(lon, lat, G);
            let (clon, clat) = cell.center(G);
            assert_eq!(GridCell::of(clon, clat, G), cell, "center of {:?} left its cell", cell);
        }
    }

    #[test]
    fn rounding_is_idempotent() {
        let (lon, lat) = GridCell::of(116.318, 39.984, G).center(G);
        assert_eq!(round6(lon), lon);
        assert_eq!(round6(lat), lat);
    }
}
