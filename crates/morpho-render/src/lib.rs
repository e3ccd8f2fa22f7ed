//! PNG figures for a finished morphology run.
pub mod canvas;
pub mod chart;
pub mod colormap;
pub mod error;
pub mod map;

use std::path::{Path, PathBuf};

use morpho_core::density::Fishnet;
use morpho_core::orientation::RoseHistogram;
use morpho_core::summary::Histogram;
use morpho_core::{ParcelSet, PipelineOutput};
use tracing::info;

pub use canvas::{Canvas, MapTransform};
pub use chart::{render_histogram, render_rose, render_rose_grid};
pub use error::{RenderError, Result};
pub use map::{render_cluster_map, render_density_map, render_value_map, ValueRange};

use colormap::{reds, viridis_r};

pub const CLUSTER_MAP: &str = "01_morphological_cluster_map.png";
pub const ROSE: &str = "02_rose_diagram_orientation.png";
pub const GRAIN_HISTOGRAM: &str = "03_grain_size_histogram.png";
pub const AREA_MAP: &str = "04_area_distribution_map.png";
pub const COMPACTNESS_MAP: &str = "05_compactness_map.png";
pub const ROSE_GRID: &str = "07_orientation_by_cluster_rose_diagrams.png";
pub const DENSITY_MAP: &str = "08_parcel_density_map.png";

#[derive(Debug, Clone, PartialEq)]
pub struct RenderConfig {
    pub width: u32,
    pub height: u32,
    /// Blank border in pixels on every side.
    pub margin: u32,
    /// Stroke parcel outlines on cluster and value maps.
    pub outlines: bool,
    /// Upper clamp of the density colour scale.
    pub density_vmax: u32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self { width: 1600, height: 1600, margin: 40, outlines: true, density_vmax: 50 }
    }
}

fn save(canvas: Canvas, dir: &Path, name: &str, written: &mut Vec<PathBuf>) -> Result<()> {
    let path = dir.join(name);
    canvas.save(&path)?;
    info!(path = %path.display(), "wrote figure");
    written.push(path);
    Ok(())
}

/// Everything the figures are drawn from, borrowed from a run or rebuilt
/// from a labelled parcel file.
#[derive(Debug, Clone, Copy)]
pub struct FigureInputs<'a> {
    pub parcels: &'a ParcelSet,
    pub overall_rose: &'a RoseHistogram,
    pub roses: &'a [(usize, RoseHistogram)],
    pub log_area_hist: &'a Histogram,
    pub fishnet: &'a Fishnet,
}

impl<'a> From<&'a PipelineOutput> for FigureInputs<'a> {
    fn from(out: &'a PipelineOutput) -> Self {
        Self {
            parcels: &out.parcels,
            overall_rose: &out.overall_rose,
            roses: &out.roses,
            log_area_hist: &out.log_area_hist,
            fishnet: &out.fishnet,
        }
    }
}

/// Render every figure of a run into `out_dir`. Returns the written paths.
pub fn render_all(out: &PipelineOutput, out_dir: &Path, cfg: &RenderConfig) -> Result<Vec<PathBuf>> {
    render_figures(&FigureInputs::from(out), out_dir, cfg)
}

pub fn render_figures(inputs: &FigureInputs<'_>, out_dir: &Path, cfg: &RenderConfig) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();
    let set = inputs.parcels;

    save(render_cluster_map(set, cfg)?, out_dir, CLUSTER_MAP, &mut written)?;
    save(render_rose(inputs.overall_rose, cfg)?, out_dir, ROSE, &mut written)?;
    save(render_histogram(inputs.log_area_hist, cfg)?, out_dir, GRAIN_HISTOGRAM, &mut written)?;
    save(
        render_value_map(set, |m| m.log_area, viridis_r, ValueRange::Data, cfg)?,
        out_dir,
        AREA_MAP,
        &mut written,
    )?;
    save(
        render_value_map(set, |m| m.compactness_idx, viridis_r, ValueRange::Fixed { vmin: 0.0, vmax: 1.0 }, cfg)?,
        out_dir,
        COMPACTNESS_MAP,
        &mut written,
    )?;
    save(render_rose_grid(inputs.roses, cfg)?, out_dir, ROSE_GRID, &mut written)?;
    save(
        render_density_map(inputs.fishnet, set, cfg.density_vmax, reds, cfg)?,
        out_dir,
        DENSITY_MAP,
        &mut written,
    )?;

    Ok(written)
}
