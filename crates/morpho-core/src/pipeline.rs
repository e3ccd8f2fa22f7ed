//! End-to-end run: read, prepare, measure, cluster, summarize, grid.
//!
//! Rendering lives in `morpho-render`; everything it needs is carried by
//! [`PipelineOutput`].

use std::path::Path;
use std::time::Instant;

use tracing::info;

use crate::cluster::{assign_clusters, ClusterOutcome};
use crate::config::PipelineConfig;
use crate::density::{parcel_density, Fishnet};
use crate::error::{MorphoError, Result};
use crate::io::read_parcels;
use crate::metrics::{compute_metrics, MetricsReport};
use crate::orientation::{rose_by_cluster, rose_overall, RoseHistogram};
use crate::parcel::ParcelSet;
use crate::prepare::{clean, reproject, CleanReport};
use crate::summary::{grain_size_stats, log_area_histogram, summarize_clusters, ClusterSummary, GrainSizeStats, Histogram};
use crate::validate::{check_area_ordering, check_labels, check_standardized, ValidationReport};

/// Bins of the grain-size histogram.
pub const GRAIN_HISTOGRAM_BINS: usize = 30;

/// Tolerance for the mean-0 / variance-1 check on the scaled features.
const STANDARDIZED_TOL: f64 = 1e-6;

/// Stage reports of one run.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StageReports {
    pub reprojected: bool,
    pub clean: CleanReport,
    pub metrics: MetricsReport,
}

#[derive(Debug, Clone)]
pub struct PipelineOutput {
    /// Measured, labelled parcels in the target CRS.
    pub parcels: ParcelSet,
    pub clustering: ClusterOutcome,
    pub summaries: Vec<ClusterSummary>,
    pub grain: GrainSizeStats,
    pub log_area_hist: Histogram,
    pub overall_rose: RoseHistogram,
    pub roses: Vec<(usize, RoseHistogram)>,
    pub fishnet: Fishnet,
    pub reports: StageReports,
    pub validation: ValidationReport,
    pub elapsed_ms: u128,
}

/// Read `input` and run every stage.
pub fn run(input: &Path, config: &PipelineConfig) -> Result<PipelineOutput> {
    info!(input = %input.display(), "loading parcel layer");
    let set = read_parcels(input)?;
    run_on(set, config)
}

/// Run every stage on an in-memory layer.
pub fn run_on(mut set: ParcelSet, config: &PipelineConfig) -> Result<PipelineOutput> {
    config.validate()?;
    let t0 = Instant::now();

    // ── Stage 0: prepare ─────────────────────────────────────────────────────
    let clean_report = clean(&mut set);
    if set.is_empty() {
        return Err(MorphoError::EmptyDataset { stage: "geometry filter" });
    }
    let reprojected = reproject(&mut set, config.target_crs)?;

    // ── Stage 1: metrics ─────────────────────────────────────────────────────
    let metrics_report = compute_metrics(&mut set, config);
    if set.is_empty() {
        return Err(MorphoError::EmptyDataset { stage: "shape metrics" });
    }

    // ── Stage 2–3: scale and cluster ─────────────────────────────────────────
    let clustering = assign_clusters(&mut set, &config.clustering)?;

    // ── Stage 4: reporting aggregates ────────────────────────────────────────
    let summaries = summarize_clusters(&set);
    let grain = grain_size_stats(&set).ok_or(MorphoError::EmptyDataset { stage: "grain size" })?;
    let log_area_hist =
        log_area_histogram(&set, GRAIN_HISTOGRAM_BINS).ok_or(MorphoError::EmptyDataset { stage: "grain size" })?;
    let overall_rose = rose_overall(&set, config.rose_bin_deg);
    let roses = rose_by_cluster(&set, config.rose_bin_deg);
    info!(
        count = grain.count,
        mean_m2 = grain.mean_m2,
        median_m2 = grain.median_m2,
        std_m2 = grain.std_m2,
        "grain size"
    );

    // ── Stage 5: fishnet density ─────────────────────────────────────────────
    let fishnet = parcel_density(&set, config.density.cell_size_m, config.density.buffer_m)?
        .ok_or(MorphoError::EmptyDataset { stage: "fishnet density" })?;

    // ── Sanity checks ────────────────────────────────────────────────────────
    let mut validation = ValidationReport::default();
    validation.push(check_labels(&set, config.clustering.n_clusters));
    validation.push(check_standardized(&clustering.standardized, STANDARDIZED_TOL));
    validation.push(check_area_ordering(&summaries));

    let elapsed_ms = t0.elapsed().as_millis();
    info!(
        parcels = set.len(),
        clusters = summaries.len(),
        checks_passed = validation.all_passed(),
        elapsed_ms,
        "pipeline complete"
    );

    Ok(PipelineOutput {
        parcels: set,
        clustering,
        summaries,
        grain,
        log_area_hist,
        overall_rose,
        roses,
        fishnet,
        reports: StageReports { reprojected, clean: clean_report, metrics: metrics_report },
        validation,
        elapsed_ms,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crs::Crs;
    use crate::parcel::test_support::{rect, rotated_rect};
    use crate::parcel::Parcel;

    fn neighbourhood() -> ParcelSet {
        let mut parcels = Vec::new();
        for i in 0..10 {
            let x = 400_000.0 + i as f64 * 150.0;
            let n = parcels.len();
            parcels.push(Parcel::new(n, rect(x, 3_960_000.0, 60.0 + i as f64, 110.0)));
            parcels.push(Parcel::new(n + 1, rect(x, 3_960_300.0, 28.0 + i as f64 * 0.5, 14.0)));
            parcels.push(Parcel::new(n + 2, rotated_rect(x + 40.0, 3_960_600.0, 13.0, 6.0, 45.0 + i as f64)));
            parcels.push(Parcel::new(n + 3, rect(x, 3_960_800.0, 2.0, 9.0 + i as f64 * 0.1)));
        }
        ParcelSet::new(Crs::Utm { zone: 39, north: true }, parcels)
    }

    #[test]
    fn full_run_passes_sanity_checks() {
        let out = run_on(neighbourhood(), &PipelineConfig::default()).unwrap();
        assert!(!out.reports.reprojected);
        assert_eq!(out.parcels.len(), 40);
        assert_eq!(out.summaries.len(), 4);
        assert!(out.validation.all_passed(), "{:?}", out.validation);
        assert_eq!(out.overall_rose.total(), 40);
        assert_eq!(out.roses.len(), 4);
        assert!(out.fishnet.max_count() >= 1);
    }

    #[test]
    fn layer_without_geometry_is_empty_after_filter() {
        let mut p = Parcel::new(0, rect(0.0, 0.0, 1.0, 1.0));
        p.geometry = None;
        let err = run_on(ParcelSet::new(Crs::Unknown, vec![p]), &PipelineConfig::default()).unwrap_err();
        assert!(matches!(err, MorphoError::EmptyDataset { stage: "geometry filter" }));
    }

    #[test]
    fn invalid_config_is_rejected_before_work() {
        let mut cfg = PipelineConfig::default();
        cfg.clustering.features.clear();
        assert!(matches!(run_on(neighbourhood(), &cfg), Err(MorphoError::InvalidConfig(_))));
    }
}
