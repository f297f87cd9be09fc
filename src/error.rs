// src/error.rs
use thiserror::Error;

use crate::raster::Grid;

/// Failure deriving a single index band.
///
/// These stay local to one index: the compositor logs and skips them so the
/// rest of the batch still succeeds.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IndexError {
    #[error("index {index}: band {band} is not present in the image")]
    UnavailableBand { index: String, band: String },

    #[error("index {index}: malformed expression: {reason}")]
    MalformedExpression { index: String, reason: String },

    #[error("index {index}: {formula} needs {expected} band references, got {found}")]
    IncompleteDefinition {
        index: String,
        formula: &'static str,
        expected: usize,
        found: usize,
    },
}

impl IndexError {
    /// Short machine-readable failure kind, used in logs and reports.
    pub fn kind(&self) -> &'static str {
        match self {
            IndexError::UnavailableBand { .. } => "unavailable_band",
            IndexError::MalformedExpression { .. } => "malformed_expression",
            IndexError::IncompleteDefinition { .. } => "incomplete_definition",
        }
    }

    pub fn index(&self) -> &str {
        match self {
            IndexError::UnavailableBand { index, .. }
            | IndexError::MalformedExpression { index, .. }
            | IndexError::IncompleteDefinition { index, .. } => index,
        }
    }
}

/// Session-level failures. These always propagate to the caller.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("imagery backend unavailable: {reason}")]
    BackendUnavailable { reason: String },

    #[error("band {band} is not present in the image")]
    UnknownBand { band: String },

    #[error("raster grid mismatch: expected {expected}, found {found}")]
    GridMismatch { expected: Grid, found: Grid },

    #[error("no images found for the requested window")]
    EmptyCollection,

    #[error("invalid configuration value for {field}: {reason}")]
    InvalidConfig { field: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("raster I/O error: {0}")]
    Raster(String),
}

#[cfg(feature = "gdal")]
impl From<gdal::errors::GdalError> for EngineError {
    fn from(err: gdal::errors::GdalError) -> Self {
        EngineError::Raster(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
