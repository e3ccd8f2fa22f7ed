//! Parcel morphology analysis: shape metrics, k-means typologies, grain size,
//! orientation roses and fishnet density for cadastral parcel layers.
pub mod cluster;
pub mod config;
pub mod crs;
pub mod density;
pub mod error;
pub mod io;
pub mod metrics;
pub mod orientation;
pub mod parcel;
pub mod pipeline;
pub mod prepare;
pub mod scaling;
pub mod summary;
pub mod validate;

pub use config::{ClusteringConfig, DensityConfig, PipelineConfig};
pub use crs::Crs;
pub use error::{MorphoError, Result};
pub use parcel::{Parcel, ParcelMetrics, ParcelSet};
pub use pipeline::{run, run_on, PipelineOutput};
