//! Spatiotemporal analytics over taxi trajectory corpora.
//!
//! The crate indexes a corpus of per-taxi trajectory files into an on-disk
//! 3D R-tree over (lon, lat, t), mines grid-quantized frequent sub-paths
//! into a SQLite path store, and answers region/density/flow/travel-time/
//! frequent-path queries over both, read-only and cache-backed.
//!
//! ```rust,no_run
//! use taxitrace::{Config, QueryEngine, query::RegionCountRequest};
//!
//! let engine = QueryEngine::new(Config::default());
//! let response = engine.region_count(&RegionCountRequest {
//!     bbox: taxitrace::query::BoxSpec {
//!         min_lon: 116.29, min_lat: 39.89,
//!         max_lon: 116.41, max_lat: 40.01,
//!     },
//!     start_time: "2008-02-02T13:30".into(),
//!     end_time: "2008-02-02 14:30:00".into(),
//! })?;
//! println!("{} taxis", response.distinct_taxis);
//! # Ok::<(), taxitrace::TaxitraceError>(())
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod geo;
pub mod mining;
pub mod query;
pub mod reader;
pub mod rtree;
pub mod store;

pub use cache::ResultCache;
pub use config::Config;
pub use error::{Result, TaxitraceError};
pub use query::{CancelFlag, QueryEngine};

pub use mining::{MiningStats, PathMiner, mine_corpus};
pub use reader::TrackDir;
pub use rtree::{BuildStats, RTreeBuilder, RTreeIndex, build_index_from_dir};
pub use store::{ConsolidateStats, PathStore, consolidate};

pub use taxitrace_types::{
    BoundingBox2D, GridCell, TaxiTrack, TemporalBoundingBox, TrackPoint,
};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Common imports
pub mod prelude {

    pub use crate::{Config, QueryEngine, Result, TaxitraceError};

    pub use crate::query::{
        BoxSpec, DensityRequest, DensitySeriesRequest, FlowAbRequest, FrequentAbRequest,
        FrequentRequest, RegionCountRequest, RingFlowRequest, TravelTimeRequest,
    };

    pub use crate::{TrackDir, build_index_from_dir, consolidate, mine_corpus};

    pub use taxitrace_types::{BoundingBox2D, GridCell, TaxiTrack, TemporalBoundingBox, TrackPoint};
}
