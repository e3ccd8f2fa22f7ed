//! Run configuration.
//!
//! Every knob has a default matching the Farahzad study (UTM 39N, four
//! clusters, seed 42, 50 m fishnet). A JSON file may override any subset of
//! fields; missing fields fall back to the defaults.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::crs::Crs;
use crate::error::{MorphoError, Result};
use crate::scaling::Feature;

/// Top-level configuration for one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// UTM zone geographic layers are projected into before measuring,
    /// written as a CRS name such as `"EPSG:32639"`.
    pub target_crs: Crs,
    /// Attribute holding a pre-computed area (m²). When present and numeric
    /// it takes precedence over the area measured from the geometry.
    pub area_attribute: Option<String>,
    /// Parcels at or below this area are treated as slivers and dropped.
    pub min_area_m2: f64,
    pub clustering: ClusteringConfig,
    pub density: DensityConfig,
    /// Rose diagram bin width in degrees. Must divide 90.
    pub rose_bin_deg: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            target_crs: Crs::Utm { zone: 39, north: true },
            area_attribute: Some("AREA_TEST".to_string()),
            min_area_m2: 0.01,
            clustering: ClusteringConfig::default(),
            density: DensityConfig::default(),
            rose_bin_deg: 5.0,
        }
    }
}

/// K-means settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusteringConfig {
    pub n_clusters: usize,
    /// Number of seeded restarts; the lowest-inertia run wins.
    pub n_init: usize,
    pub max_iter: usize,
    /// Relative convergence tolerance: Lloyd iterations stop once the summed
    /// squared centroid shift falls below `tolerance × mean column variance`
    /// of the standardized features.
    pub tolerance: f64,
    pub seed: u64,
    /// Metric columns fed to the scaler and k-means, in order.
    pub features: Vec<Feature>,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            n_clusters: 4,
            n_init: 10,
            max_iter: 300,
            tolerance: 1e-4,
            seed: 42,
            features: vec![
                Feature::LogArea,
                Feature::PerimeterAreaRatio,
                Feature::Rectangularity,
                Feature::Orientation,
            ],
        }
    }
}

/// Fishnet density grid settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DensityConfig {
    /// Grid cell edge length in metres.
    pub cell_size_m: f64,
    /// Margin added around the parcel extent so boundary parcels are covered.
    pub buffer_m: f64,
    /// Upper bound of the density colour scale.
    pub vmax: u32,
}

impl Default for DensityConfig {
    fn default() -> Self {
        Self { cell_size_m: 50.0, buffer_m: 100.0, vmax: 50 }
    }
}

impl PipelineConfig {
    /// Load a configuration from a JSON file. Missing fields take defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| MorphoError::io(path, e))?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let c = &self.clustering;
        if c.n_clusters == 0 {
            return Err(MorphoError::InvalidConfig("n_clusters must be at least 1".into()));
        }
        if c.n_init == 0 {
            return Err(MorphoError::InvalidConfig("n_init must be at least 1".into()));
        }
        if c.max_iter == 0 {
            return Err(MorphoError::InvalidConfig("max_iter must be at least 1".into()));
        }
        if c.features.is_empty() {
            return Err(MorphoError::InvalidConfig("at least one clustering feature is required".into()));
        }
        if !matches!(self.target_crs, Crs::Utm { .. }) {
            return Err(MorphoError::UnsupportedCrs(format!(
                "target CRS {} is not a WGS 84 UTM zone",
                self.target_crs
            )));
        }
        if !(self.density.cell_size_m > 0.0) || !self.density.cell_size_m.is_finite() {
            return Err(MorphoError::InvalidConfig("cell_size_m must be positive".into()));
        }
        if self.density.buffer_m < 0.0 {
            return Err(MorphoError::InvalidConfig("buffer_m must not be negative".into()));
        }
        let bins = 90.0 / self.rose_bin_deg;
        if !(self.rose_bin_deg > 0.0) || (bins - bins.round()).abs() > 1e-9 {
            return Err(MorphoError::InvalidConfig(format!(
                "rose_bin_deg {} does not divide 90",
                self.rose_bin_deg
            )));
        }
        Ok(())
    }
}
