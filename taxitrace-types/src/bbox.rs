use geo::{Point, Rect};
use serde::{Deserialize, Serialize};

/// A 2D axis-aligned bounding box over (lon, lat).
///
/// A thin wrapper around `geo::Rect` with the operations the query operators
/// need: inclusive containment, center/extent arithmetic, scaling, and
/// clipping.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox2D {
    pub rect: Rect,
}

impl BoundingBox2D {
    /// Create a bounding box from minimum and maximum coordinates.
    ///
    /// `geo::Rect` normalizes the corners, so a swapped input still produces
    /// a well-formed rectangle; use [`Self::is_empty`] to detect degenerate
    /// boxes.
    pub fn new(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> Self {
        Self {
            rect: Rect::new(
                geo::coord! { x: min_lon, y: min_lat },
                geo::coord! { x: max_lon, y: max_lat },
            ),
        }
    }

    pub fn min_lon(&self) -> f64 {
        self.rect.min().x
    }

    pub fn min_lat(&self) -> f64 {
        self.rect.min().y
    }

    pub fn max_lon(&self) -> f64 {
        self.rect.max().x
    }

    pub fn max_lat(&self) -> f64 {
        self.rect.max().y
    }

    pub fn center(&self) -> Point {
        Point::new(
            (self.min_lon() + self.max_lon()) / 2.0,
            (self.min_lat() + self.max_lat()) / 2.0,
        )
    }

    pub fn width(&self) -> f64 {
        self.max_lon() - self.min_lon()
    }

    pub fn height(&self) -> f64 {
        self.max_lat() - self.min_lat()
    }

    /// True when the box has zero extent on either axis.
    pub fn is_empty(&self) -> bool {
        self.width() <= 0.0 || self.height() <= 0.0
    }

    /// Inclusive containment on both axes.
    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        self.min_lon() <= lon && lon <= self.max_lon() && self.min_lat() <= lat && lat <= self.max_lat()
    }

    /// A box with the same center and side lengths scaled by `factor`.
    pub fn scaled(&self, factor: f64) -> Self {
        let center = self.center();
        let half_w = self.width() * factor / 2.0;
        let half_h = self.height() * factor / 2.0;
        Self::new(
            center.x() - half_w,
            center.y() - half_h,
            center.x() + half_w,
            center.y() + half_h,
        )
    }

    /// Clip this box to another; the result never extends past `bounds`.
    pub fn clipped_to(&self, bounds: &BoundingBox2D) -> Self {
        Self::new(
            self.min_lon().max(bounds.min_lon()),
            self.min_lat().max(bounds.min_lat()),
            self.max_lon().min(bounds.max_lon()),
            self.max_lat().min(bounds.max_lat()),
        )
    }
}

/// A 3D query volume: a 2D box plus an inclusive time interval.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TemporalBoundingBox {
    pub bbox: BoundingBox2D,
    pub t_start: f64,
    pub t_end: f64,
}

impl TemporalBoundingBox {
    pub fn new(bbox: BoundingBox2D, t_start: f64, t_end: f64) -> Self {
        Self { bbox, t_start, t_end }
    }

    /// Inclusive containment on all three axes.
    pub fn contains(&self, lon: f64, lat: f64, t: f64) -> bool {
        self.bbox.contains(lon, lat) && self.t_start <= t && t <= self.t_end
    }
}
