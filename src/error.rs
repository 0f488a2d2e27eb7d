//! Error types for the taxitrace engine.

use std::path::PathBuf;
use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, TaxitraceError>;

/// All errors surfaced by the index builders, the path store, and the query
/// operators.
///
/// Parse-level problems inside the trajectory reader and cache-write
/// failures are recovered silently (skip / log); everything else propagates
/// to the operator boundary as one of these variants.
#[derive(Debug, Error)]
pub enum TaxitraceError {
    /// Malformed request: missing field, non-numeric value, empty box,
    /// `start >= end`, unparseable timestamp.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The query was well-formed but no data satisfies it.
    #[error("not found: {0}")]
    NotFound(String),

    /// The R-tree files are absent at the configured basename.
    #[error("index missing at {0}")]
    IndexMissing(PathBuf),

    /// The path store file is absent.
    #[error("path store missing at {0}")]
    StoreMissing(PathBuf),

    /// Underlying filesystem failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Path store query or schema failure.
    #[error("path store error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Block or node encoding/decoding failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Anything that should not happen under the documented contracts.
    #[error("internal error: {0}")]
    Internal(String),
}

impl TaxitraceError {
    /// HTTP-equivalent status code for this error, used by front-ends when
    /// shaping `{error: string}` responses.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::BadRequest(_) => 400,
            Self::NotFound(_) => 404,
            Self::IndexMissing(_)
            | Self::StoreMissing(_)
            | Self::Io(_)
            | Self::Sqlite(_)
            | Self::Serialization(_)
            | Self::Internal(_) => 500,
        }
    }
}

impl From<bincode::Error> for TaxitraceError {
    fn from(e: bincode::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for TaxitraceError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
