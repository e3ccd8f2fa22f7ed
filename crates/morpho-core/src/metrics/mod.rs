//! Per-parcel shape metrics (stage 1).
//!
//! Grain size (area, perimeter), outline efficiency (perimeter/area ratio,
//! Polsby-Popper compactness), rectangular fit and main-axis orientation.
pub mod area;
pub mod compactness;
pub mod rectangularity;
pub mod validity;

pub use area::{log_area, parcel_area, parcel_perimeter};
pub use compactness::{perimeter_area_ratio, polsby_popper};
pub use rectangularity::{shape_metrics, ShapeMetrics};
pub use validity::is_valid_parcel;

use tracing::{debug, info};

use crate::config::PipelineConfig;
use crate::parcel::{ParcelMetrics, ParcelSet};

/// Counts from [`compute_metrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsReport {
    pub input: usize,
    /// Parcels whose area came from the configured attribute.
    pub area_from_attribute: usize,
    /// Non-finite perimeter, or area at or below the sliver threshold.
    pub dropped_degenerate: usize,
    /// Self-intersecting or otherwise invalid outline.
    pub dropped_invalid: usize,
    /// MRR could not be built.
    pub dropped_shape: usize,
    pub kept: usize,
}

/// Measure every parcel and attach [`ParcelMetrics`].
///
/// Parcels that cannot be measured are removed from the set. Area is read
/// from `config.area_attribute` when that attribute holds a number, since
/// surveyed areas are more trustworthy than areas of digitised outlines.
pub fn compute_metrics(set: &mut ParcelSet, config: &PipelineConfig) -> MetricsReport {
    let input = set.len();
    let mut area_from_attribute = 0;
    let mut dropped_degenerate = 0;
    let mut dropped_invalid = 0;
    let mut dropped_shape = 0;

    set.parcels.retain_mut(|parcel| {
        let Some(geom) = parcel.geometry.as_ref() else {
            dropped_degenerate += 1;
            return false;
        };

        let attr_area = config
            .area_attribute
            .as_deref()
            .and_then(|key| parcel.numeric_property(key))
            .filter(|a| a.is_finite());
        let area_m2 = match attr_area {
            Some(a) => {
                area_from_attribute += 1;
                a
            }
            None => parcel_area(geom),
        };
        let perimeter_m = parcel_perimeter(geom);

        if !perimeter_m.is_finite() || !(area_m2 > config.min_area_m2) {
            debug!(parcel = parcel.id, area_m2, perimeter_m, "dropping degenerate parcel");
            dropped_degenerate += 1;
            return false;
        }

        if !is_valid_parcel(geom) {
            debug!(parcel = parcel.id, "dropping parcel: invalid geometry");
            dropped_invalid += 1;
            return false;
        }

        let Some(shape) = shape_metrics(geom) else {
            debug!(parcel = parcel.id, "dropping parcel: no minimum rotated rectangle");
            dropped_shape += 1;
            return false;
        };

        parcel.metrics = Some(ParcelMetrics {
            area_m2,
            log_area: log_area(area_m2),
            perimeter_m,
            perimeter_area_ratio: perimeter_area_ratio(area_m2, perimeter_m),
            compactness_idx: polsby_popper(area_m2, perimeter_m),
            rectangularity_idx: shape.rectangularity,
            orientation_deg: shape.orientation_deg,
        });
        true
    });

    let report = MetricsReport {
        input,
        area_from_attribute,
        dropped_degenerate,
        dropped_invalid,
        dropped_shape,
        kept: set.len(),
    };
    info!(
        input,
        area_from_attribute,
        dropped_degenerate,
        dropped_invalid,
        dropped_shape,
        kept = report.kept,
        "shape metrics computed"
    );
    report
}
