//! Grain size: area and perimeter of a parcel in projected units.

use geo::{Area, EuclideanLength, MultiPolygon};

/// Planar area (m²), holes subtracted.
pub fn parcel_area(mp: &MultiPolygon<f64>) -> f64 {
    mp.unsigned_area()
}

/// Total boundary length (m), exterior and interior rings.
pub fn parcel_perimeter(mp: &MultiPolygon<f64>) -> f64 {
    mp.iter()
        .map(|poly| {
            poly.exterior().euclidean_length()
                + poly.interiors().iter().map(|r| r.euclidean_length()).sum::<f64>()
        })
        .sum()
}

/// log10(area + 1). The +1 keeps sub-square-metre slivers non-negative.
pub fn log_area(area_m2: f64) -> f64 {
    (area_m2 + 1.0).log10()
}
