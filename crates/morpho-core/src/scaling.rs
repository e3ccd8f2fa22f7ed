//! Feature matrix assembly and z-score standardization (stage 2).

use serde::{Deserialize, Serialize};

use crate::parcel::{ParcelMetrics, ParcelSet};

/// A metric column that can feed the clustering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    Area,
    LogArea,
    Perimeter,
    PerimeterAreaRatio,
    Compactness,
    Rectangularity,
    Orientation,
}

impl Feature {
    pub fn value(self, m: &ParcelMetrics) -> f64 {
        match self {
            Feature::Area => m.area_m2,
            Feature::LogArea => m.log_area,
            Feature::Perimeter => m.perimeter_m,
            Feature::PerimeterAreaRatio => m.perimeter_area_ratio,
            Feature::Compactness => m.compactness_idx,
            Feature::Rectangularity => m.rectangularity_idx,
            Feature::Orientation => m.orientation_deg,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Feature::Area => "area_m2",
            Feature::LogArea => "log_area_m2",
            Feature::Perimeter => "perimeter_m",
            Feature::PerimeterAreaRatio => "perimeter_area_ratio",
            Feature::Compactness => "compactness_idx",
            Feature::Rectangularity => "rectangularity_idx",
            Feature::Orientation => "orientation_angle",
        }
    }
}

/// Dense row-major matrix: one row per parcel, one column per feature.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    pub data: Vec<f64>,
    pub n_rows: usize,
    pub n_cols: usize,
}

impl FeatureMatrix {
    pub fn new(data: Vec<f64>, n_rows: usize, n_cols: usize) -> Self {
        debug_assert_eq!(data.len(), n_rows * n_cols);
        Self { data, n_rows, n_cols }
    }

    /// Build from every parcel that carries metrics, in layer order.
    /// Returns the matrix and the index (into `set.parcels`) of each row.
    pub fn from_parcels(set: &ParcelSet, features: &[Feature]) -> (Self, Vec<usize>) {
        let mut data = Vec::with_capacity(set.len() * features.len());
        let mut rows = Vec::with_capacity(set.len());
        for (idx, parcel) in set.parcels.iter().enumerate() {
            if let Some(m) = &parcel.metrics {
                data.extend(features.iter().map(|f| f.value(m)));
                rows.push(idx);
            }
        }
        (Self::new(data, rows.len(), features.len()), rows)
    }

    #[inline]
    pub fn row(&self, i: usize) -> &[f64] {
        &self.data[i * self.n_cols..(i + 1) * self.n_cols]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f64]> {
        self.data.chunks_exact(self.n_cols.max(1)).take(self.n_rows)
    }

    pub fn column(&self, j: usize) -> impl Iterator<Item = f64> + '_ {
        self.rows().map(move |r| r[j])
    }
}

/// Mean and population variance of one column.
pub fn column_moments(m: &FeatureMatrix, j: usize) -> (f64, f64) {
    let n = m.n_rows as f64;
    if m.n_rows == 0 {
        return (f64::NAN, f64::NAN);
    }
    let mean = m.column(j).sum::<f64>() / n;
    let var = m.column(j).map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, var)
}

/// Relative spread below which a column counts as constant. Rectangularity of
/// rotated rectangles, for one, carries ~1e-13 of rounding spread that must
/// not be blown up to unit variance.
const CONSTANT_COLUMN_RTOL: f64 = 1e-10;

/// Per-column z-score scaler: z = (x − μ) / σ.
///
/// σ is the population standard deviation. A (numerically) constant column
/// is scaled by 1 instead, so it standardizes to all zeros.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl StandardScaler {
    pub fn fit(m: &FeatureMatrix) -> Self {
        let (mean, scale) = (0..m.n_cols)
            .map(|j| {
                let (mu, var) = column_moments(m, j);
                let sd = var.sqrt();
                (mu, if sd > CONSTANT_COLUMN_RTOL * mu.abs().max(1.0) { sd } else { 1.0 })
            })
            .unzip();
        Self { mean, scale }
    }

    pub fn transform(&self, m: &FeatureMatrix) -> FeatureMatrix {
        let data = m
            .rows()
            .flat_map(|row| {
                row.iter()
                    .zip(self.mean.iter().zip(&self.scale))
                    .map(|(&x, (&mu, &s))| (x - mu) / s)
            })
            .collect();
        FeatureMatrix::new(data, m.n_rows, m.n_cols)
    }

    pub fn fit_transform(m: &FeatureMatrix) -> (Self, FeatureMatrix) {
        let scaler = Self::fit(m);
        let z = scaler.transform(m);
        (scaler, z)
    }

    /// Map a standardized row back to metric units.
    pub fn inverse_row(&self, z: &[f64]) -> Vec<f64> {
        z.iter()
            .zip(self.mean.iter().zip(&self.scale))
            .map(|(&v, (&mu, &s))| v * s + mu)
            .collect()
    }
}
