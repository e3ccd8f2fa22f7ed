//! Outline efficiency measures.

use std::f64::consts::PI;

/// Polsby-Popper index: 4πA / P².
///
/// 1.0 for a circle, π/4 ≈ 0.785 for a square, towards 0 for elongated or
/// ragged outlines. Returns 0 when the perimeter is not positive.
pub fn polsby_popper(area: f64, perimeter: f64) -> f64 {
    if perimeter > 0.0 {
        4.0 * PI * area / (perimeter * perimeter)
    } else {
        0.0
    }
}

/// Perimeter-to-area ratio (1/m). Scale dependent: small parcels score high
/// even when well shaped. Returns 0 when the area is not positive.
pub fn perimeter_area_ratio(area: f64, perimeter: f64) -> f64 {
    if area > 0.0 {
        perimeter / area
    } else {
        0.0
    }
}
