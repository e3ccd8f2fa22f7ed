//! Error type shared by every stage of the morphology pipeline.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the library stages.
///
/// Bad individual parcels are not errors: stages drop them and count the drop
/// in their report. These variants cover conditions that stop a run.
#[derive(Error, Debug)]
pub enum MorphoError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Top-level GeoJSON object was not a FeatureCollection, or similar.
    #[error("unsupported input: {0}")]
    UnsupportedInput(String),

    #[error("unsupported coordinate reference system: {0}")]
    UnsupportedCrs(String),

    #[error("dataset is empty after {stage}")]
    EmptyDataset { stage: &'static str },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("clustering failed: {0}")]
    Clustering(String),
}

impl MorphoError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }
}

pub type Result<T> = std::result::Result<T, MorphoError>;
