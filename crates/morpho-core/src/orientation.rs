//! Orientation frequency tables for rose diagrams.
//!
//! Orientation angles live in [0°, 90°] (see
//! [`fold_orientation`](crate::metrics::rectangularity::fold_orientation)),
//! so a rose covers one quadrant: 0 = North/South, 90 = East/West.

use serde::Serialize;

use crate::parcel::ParcelSet;

/// Upper end of the orientation range in degrees.
pub const MAX_ORIENTATION_DEG: f64 = 90.0;

/// Frequency of orientation angles in equal-width bins over [0°, 90°].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoseHistogram {
    pub bin_deg: f64,
    /// One count per bin; bin `i` covers `[i·w, (i+1)·w)`, the last bin is
    /// closed so that 90° is counted.
    pub counts: Vec<usize>,
    /// Arithmetic mean of the counted angles, `None` when nothing was counted.
    pub mean_deg: Option<f64>,
}

impl RoseHistogram {
    pub fn n_bins(&self) -> usize {
        self.counts.len()
    }

    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }

    pub fn max_count(&self) -> usize {
        self.counts.iter().copied().max().unwrap_or(0)
    }

    /// Left edge of bin `i` in degrees.
    pub fn bin_start(&self, i: usize) -> f64 {
        i as f64 * self.bin_deg
    }

    /// Index of the fullest bin; ties go to the lower angle.
    pub fn modal_bin(&self) -> Option<usize> {
        let max = self.max_count();
        (max > 0).then(|| self.counts.iter().position(|&c| c == max)).flatten()
    }
}

/// Bin orientation angles. NaN and out-of-range angles are skipped.
///
/// `bin_deg` is expected to divide 90 (checked by config validation); a
/// remainder is absorbed by the last bin.
pub fn rose_histogram<I>(angles: I, bin_deg: f64) -> RoseHistogram
where
    I: IntoIterator<Item = f64>,
{
    let n_bins = ((MAX_ORIENTATION_DEG / bin_deg).round() as usize).max(1);
    let mut counts = vec![0usize; n_bins];
    let mut sum = 0.0;

    for a in angles {
        if !(0.0..=MAX_ORIENTATION_DEG).contains(&a) {
            continue;
        }
        let bin = ((a / bin_deg) as usize).min(n_bins - 1);
        counts[bin] += 1;
        sum += a;
    }

    let total: usize = counts.iter().sum();
    let mean_deg = (total > 0).then(|| sum / total as f64);
    RoseHistogram { bin_deg, counts, mean_deg }
}

/// Rose of every measured parcel in the layer.
pub fn rose_overall(set: &ParcelSet, bin_deg: f64) -> RoseHistogram {
    rose_histogram(set.measured().map(|(_, m)| m.orientation_deg), bin_deg)
}

/// One rose per cluster label present in the layer, ordered by label.
pub fn rose_by_cluster(set: &ParcelSet, bin_deg: f64) -> Vec<(usize, RoseHistogram)> {
    set.cluster_labels()
        .into_iter()
        .map(|c| {
            let angles = set
                .measured()
                .filter(|(p, _)| p.cluster == Some(c))
                .map(|(_, m)| m.orientation_deg);
            (c, rose_histogram(angles, bin_deg))
        })
        .collect()
}
