//! # taxitrace-types
//!
//! Core spatial and temporal data types for the taxitrace analytics engine.
//!
//! This crate provides the fundamental types shared by the index builders and
//! the query operators:
//!
//! - **Point types**: `TrackPoint`, one trajectory sample (lon, lat, t)
//! - **Grid types**: `GridCell`, the fixed-grid quantization unit
//! - **Box types**: `BoundingBox2D`, `TemporalBoundingBox`
//! - **Trajectory types**: `TaxiTrack`
//!
//! All types are serializable with Serde and built on top of the `geo` crate's
//! geometric primitives.
//!
//! ## Examples
//!
//! ```rust
//! use taxitrace_types::{GridCell, TrackPoint};
//!
//! let sample = TrackPoint::new(7, 1_202_000_000.0, 116.397, 39.909);
//! let cell = GridCell::of(sample.lon(), sample.lat(), 0.002);
//! let (center_lon, center_lat) = cell.center(0.002);
//! assert!((center_lon - sample.lon()).abs() < 0.002);
//! assert!((center_lat - sample.lat()).abs() < 0.002);
//! ```

pub mod bbox;
pub mod cell;
pub mod point;
pub mod trajectory;

pub use bbox::{BoundingBox2D, TemporalBoundingBox};
pub use cell::GridCell;
pub use point::TrackPoint;
pub use trajectory::TaxiTrack;
