//! Stage 0: bring a raw parcel layer into a metric CRS and drop features
//! that cannot be measured.

use geo::{Coord, MapCoords, MultiPolygon};
use tracing::{info, warn};

use crate::crs::{utm_forward, Crs};
use crate::error::{MorphoError, Result};
use crate::parcel::ParcelSet;

/// Counts from [`clean`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanReport {
    pub input: usize,
    /// Null geometry or a non-polygonal type.
    pub dropped_missing: usize,
    /// Polygonal but without a usable exterior ring.
    pub dropped_empty: usize,
    pub kept: usize,
}

/// Project the layer into `target` when it is not already metric.
///
/// A layer with no CRS, or a geographic one, is taken to be WGS 84 and every
/// vertex is projected. A layer that already declares a projected CRS is left
/// as is, even if it differs from `target`; the metrics only need metres.
/// Returns true when coordinates were transformed.
pub fn reproject(set: &mut ParcelSet, target: Crs) -> Result<bool> {
    if set.crs.is_projected() {
        info!(crs = %set.crs, "layer already metric, no reprojection");
        return Ok(false);
    }

    let (zone, north) = match target {
        Crs::Utm { zone, north } => (zone, north),
        other => return Err(MorphoError::UnsupportedCrs(format!("cannot project into {other}"))),
    };

    if set.crs == Crs::Unknown {
        warn!("layer has no CRS; assuming WGS 84 (EPSG:4326)");
    }

    for parcel in &mut set.parcels {
        if let Some(geom) = parcel.geometry.as_mut() {
            *geom = project_multipolygon(geom, zone, north);
        }
    }
    set.crs = target;
    info!(target = %target, parcels = set.len(), "reprojected layer");
    Ok(true)
}

fn project_multipolygon(mp: &MultiPolygon<f64>, zone: u8, north: bool) -> MultiPolygon<f64> {
    mp.map_coords(|Coord { x, y }| {
        let (e, n) = utm_forward(x, y, zone, north);
        Coord { x: e, y: n }
    })
}

/// True when the MultiPolygon has at least one polygon whose exterior ring
/// encloses something: four or more coordinates, all finite.
pub(crate) fn has_usable_ring(mp: &MultiPolygon<f64>) -> bool {
    mp.iter().any(|poly| {
        let ext = poly.exterior();
        ext.0.len() >= 4 && ext.coords().all(|c| c.x.is_finite() && c.y.is_finite())
    })
}

/// Drop parcels without a measurable polygon.
pub fn clean(set: &mut ParcelSet) -> CleanReport {
    let input = set.len();
    let mut dropped_missing = 0;
    let mut dropped_empty = 0;

    set.parcels.retain(|p| match &p.geometry {
        None => {
            dropped_missing += 1;
            false
        }
        Some(mp) if !has_usable_ring(mp) => {
            dropped_empty += 1;
            false
        }
        Some(_) => true,
    });

    let report = CleanReport { input, dropped_missing, dropped_empty, kept: set.len() };
    info!(
        input,
        dropped_missing,
        dropped_empty,
        kept = report.kept,
        "geometry filter"
    );
    report
}
