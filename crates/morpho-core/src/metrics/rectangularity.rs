//! Rectangular fit and main-axis orientation from the minimum rotated
//! bounding rectangle (MRR).
//!
//! For a MultiPolygon the MRR is taken over the convex hull of all parts, so a
//! parcel split by a lane still gets a single axis.

use geo::{Area, Coord, MinimumRotatedRect, MultiPolygon};

use super::area::parcel_area;
use super::validity::is_valid_parcel;

/// Shape descriptors derived from the MRR.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShapeMetrics {
    /// Parcel area / MRR area, in [0, 1]. 0 when the MRR is degenerate.
    pub rectangularity: f64,
    /// Main axis from North folded into [0°, 90°]. 0 = N/S, 90 = E/W.
    pub orientation_deg: f64,
}

/// Compute rectangularity and orientation.
///
/// Returns `None` when the geometry is invalid (see [`super::validity`]), has
/// no finite area, or the MRR cannot be built; such parcels are dropped by
/// the metrics stage.
///
/// Orientation: the longer of the MRR's first two edges is the main axis.
///   θ = atan2(dy, dx) in degrees (counter-clockwise from East)
///   bearing = (90 − θ) mod 180        (clockwise from North, axial)
///   orientation = bearing if ≤ 90 else 180 − bearing
/// The fold makes NE and NW alignments of equal skew indistinguishable,
/// which is what the rose diagrams plot.
pub fn shape_metrics(mp: &MultiPolygon<f64>) -> Option<ShapeMetrics> {
    if !is_valid_parcel(mp) {
        return None;
    }
    let area = parcel_area(mp);
    if !area.is_finite() || area <= 0.0 {
        return None;
    }

    let mrr = mp.minimum_rotated_rect()?;
    let corners: Vec<Coord<f64>> = mrr.exterior().coords().take(3).copied().collect();
    let [p1, p2, p3] = corners.as_slice() else {
        return None;
    };

    let rect_area = mrr.unsigned_area();
    let rectangularity = if rect_area > 0.0 { (area / rect_area).min(1.0) } else { 0.0 };

    let ab = *p2 - *p1;
    let bc = *p3 - *p2;
    let axis = if ab.x * ab.x + ab.y * ab.y >= bc.x * bc.x + bc.y * bc.y { ab } else { bc };

    Some(ShapeMetrics { rectangularity, orientation_deg: fold_orientation(axis.y.atan2(axis.x).to_degrees()) })
}

/// Convert a counter-clockwise-from-East axis angle (degrees) to the folded
/// [0°, 90°] from-North orientation.
pub fn fold_orientation(angle_deg: f64) -> f64 {
    let bearing = (90.0 - angle_deg).rem_euclid(180.0);
    if bearing > 90.0 {
        180.0 - bearing
    } else {
        bearing
    }
}
