//! Reporting aggregates: per-cluster mean table, grain-size statistics and
//! the log-area histogram.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::Serialize;
use tracing::info;

use crate::error::{MorphoError, Result};
use crate::parcel::{ParcelMetrics, ParcelSet};

/// Mean metrics of one cluster. Field names double as CSV headers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterSummary {
    #[serde(rename = "morpho_cluster")]
    pub cluster: usize,
    pub parcel_count: usize,
    #[serde(rename = "area_m2")]
    pub mean_area_m2: f64,
    #[serde(rename = "perimeter_m")]
    pub mean_perimeter_m: f64,
    #[serde(rename = "perimeter_area_ratio")]
    pub mean_perimeter_area_ratio: f64,
    #[serde(rename = "compactness_idx")]
    pub mean_compactness: f64,
    #[serde(rename = "rectangularity_idx")]
    pub mean_rectangularity: f64,
    #[serde(rename = "orientation_angle")]
    pub mean_orientation_deg: f64,
}

#[derive(Default)]
struct Accum {
    n: usize,
    area: f64,
    perimeter: f64,
    pa_ratio: f64,
    compactness: f64,
    rectangularity: f64,
    orientation: f64,
}

impl Accum {
    fn add(&mut self, m: &ParcelMetrics) {
        self.n += 1;
        self.area += m.area_m2;
        self.perimeter += m.perimeter_m;
        self.pa_ratio += m.perimeter_area_ratio;
        self.compactness += m.compactness_idx;
        self.rectangularity += m.rectangularity_idx;
        self.orientation += m.orientation_deg;
    }

    fn finish(self, cluster: usize) -> ClusterSummary {
        let n = self.n as f64;
        ClusterSummary {
            cluster,
            parcel_count: self.n,
            mean_area_m2: self.area / n,
            mean_perimeter_m: self.perimeter / n,
            mean_perimeter_area_ratio: self.pa_ratio / n,
            mean_compactness: self.compactness / n,
            mean_rectangularity: self.rectangularity / n,
            mean_orientation_deg: self.orientation / n,
        }
    }
}

/// Group labelled, measured parcels by cluster and average every metric.
/// Ordered by cluster label; parcels without a label or metrics are skipped.
pub fn summarize_clusters(set: &ParcelSet) -> Vec<ClusterSummary> {
    let mut groups: BTreeMap<usize, Accum> = BTreeMap::new();
    for (parcel, m) in set.measured() {
        if let Some(c) = parcel.cluster {
            groups.entry(c).or_default().add(m);
        }
    }
    groups.into_iter().map(|(c, acc)| acc.finish(c)).collect()
}

/// Write the descriptive cluster table as CSV, one row per cluster.
pub fn write_summary_csv(path: &Path, summaries: &[ClusterSummary]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| MorphoError::io(parent, e))?;
    }
    let mut writer = csv::Writer::from_path(path)?;
    for row in summaries {
        writer.serialize(row)?;
    }
    writer.flush().map_err(|e| MorphoError::io(path, e))?;
    info!(path = %path.display(), clusters = summaries.len(), "wrote cluster table");
    Ok(())
}

/// Plain-text rendering of the cluster table for terminal output.
pub fn format_summary_table(summaries: &[ClusterSummary]) -> String {
    let mut out = format!(
        "{:<8} {:>7} {:>12} {:>12} {:>8} {:>8} {:>8} {:>8}\n",
        "Cluster", "Count", "Area m2", "Perim m", "P/A", "Compact", "Rect", "Orient"
    );
    out.push_str(&"-".repeat(80));
    out.push('\n');
    for s in summaries {
        out.push_str(&format!(
            "{:<8} {:>7} {:>12.2} {:>12.2} {:>8.3} {:>8.3} {:>8.3} {:>8.1}\n",
            s.cluster,
            s.parcel_count,
            s.mean_area_m2,
            s.mean_perimeter_m,
            s.mean_perimeter_area_ratio,
            s.mean_compactness,
            s.mean_rectangularity,
            s.mean_orientation_deg,
        ));
    }
    out
}

// ── Grain size ────────────────────────────────────────────────────────────────

/// Distribution summary of parcel area.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GrainSizeStats {
    pub count: usize,
    pub mean_m2: f64,
    pub median_m2: f64,
    /// Sample standard deviation (n − 1 denominator); 0 for a single parcel.
    pub std_m2: f64,
    pub min_m2: f64,
    pub max_m2: f64,
}

pub fn grain_size_stats(set: &ParcelSet) -> Option<GrainSizeStats> {
    let mut areas: Vec<f64> = set.measured().map(|(_, m)| m.area_m2).filter(|a| a.is_finite()).collect();
    if areas.is_empty() {
        return None;
    }
    areas.sort_by(f64::total_cmp);

    let n = areas.len();
    let mean = areas.iter().sum::<f64>() / n as f64;
    let median = if n % 2 == 1 { areas[n / 2] } else { (areas[n / 2 - 1] + areas[n / 2]) / 2.0 };
    let std = if n > 1 {
        (areas.iter().map(|a| (a - mean).powi(2)).sum::<f64>() / (n - 1) as f64).sqrt()
    } else {
        0.0
    };

    Some(GrainSizeStats { count: n, mean_m2: mean, median_m2: median, std_m2: std, min_m2: areas[0], max_m2: areas[n - 1] })
}

/// Equal-width histogram normalised as a density (bar areas sum to 1).
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    /// `bins + 1` edges, ascending.
    pub edges: Vec<f64>,
    pub density: Vec<f64>,
    pub counts: Vec<usize>,
}

/// Histogram of log10(area + 1). The last bin is closed on the right.
pub fn log_area_histogram(set: &ParcelSet, bins: usize) -> Option<Histogram> {
    let values: Vec<f64> = set.measured().map(|(_, m)| m.log_area).filter(|v| v.is_finite()).collect();
    histogram(&values, bins)
}

pub fn histogram(values: &[f64], bins: usize) -> Option<Histogram> {
    if values.is_empty() || bins == 0 {
        return None;
    }
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    // Degenerate range: widen to a unit interval around the value.
    let (lo, hi) = if max > min { (min, max) } else { (min - 0.5, max + 0.5) };
    let width = (hi - lo) / bins as f64;

    let mut counts = vec![0usize; bins];
    for &v in values {
        let b = (((v - lo) / width) as usize).min(bins - 1);
        counts[b] += 1;
    }
    let edges = (0..=bins).map(|i| lo + i as f64 * width).collect();
    let total = values.len() as f64;
    let density = counts.iter().map(|&c| c as f64 / (total * width)).collect();
    Some(Histogram { edges, density, counts })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crs::Crs;
    use crate::parcel::test_support::rect;
    use crate::parcel::Parcel;
    use approx::assert_abs_diff_eq;

    fn metrics(area: f64, orientation: f64) -> ParcelMetrics {
        ParcelMetrics {
            area_m2: area,
            log_area: (area + 1.0).log10(),
            perimeter_m: 4.0 * area.sqrt(),
            perimeter_area_ratio: 4.0 / area.sqrt(),
            compactness_idx: std::f64::consts::FRAC_PI_4,
            rectangularity_idx: 1.0,
            orientation_deg: orientation,
        }
    }

    fn labelled(rows: &[(f64, f64, Option<usize>)]) -> ParcelSet {
        let parcels = rows
            .iter()
            .enumerate()
            .map(|(i, &(area, orient, cluster))| {
                let mut p = Parcel::new(i, rect(0.0, 0.0, 1.0, 1.0));
                p.metrics = Some(metrics(area, orient));
                p.cluster = cluster;
                p
            })
            .collect();
        ParcelSet::new(Crs::Utm { zone: 39, north: true }, parcels)
    }

    #[test]
    fn cluster_means_and_counts() {
        let set = labelled(&[
            (100.0, 10.0, Some(1)),
            (300.0, 30.0, Some(1)),
            (900.0, 80.0, Some(0)),
            (50.0, 0.0, None),
        ]);
        let s = summarize_clusters(&set);
        assert_eq!(s.len(), 2);
        assert_eq!((s[0].cluster, s[0].parcel_count), (0, 1));
        assert_eq!((s[1].cluster, s[1].parcel_count), (1, 2));
        assert_abs_diff_eq!(s[1].mean_area_m2, 200.0, epsilon = 1e-12);
        assert_abs_diff_eq!(s[1].mean_orientation_deg, 20.0, epsilon = 1e-12);
    }

    #[test]
    fn csv_has_header_and_one_row_per_cluster() {
        let set = labelled(&[(100.0, 10.0, Some(0)), (400.0, 20.0, Some(1))]);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("06_descriptive_cluster_table.csv");
        write_summary_csv(&path, &summarize_clusters(&set)).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("morpho_cluster,parcel_count,area_m2,perimeter_m"));
        assert!(lines[1].starts_with("0,1,100"));
    }

    #[test]
    fn grain_size_uses_sample_std_and_true_median() {
        let set = labelled(&[(1.0, 0.0, None), (2.0, 0.0, None), (3.0, 0.0, None), (10.0, 0.0, None)]);
        let g = grain_size_stats(&set).unwrap();
        assert_eq!(g.count, 4);
        assert_abs_diff_eq!(g.mean_m2, 4.0, epsilon = 1e-12);
        assert_abs_diff_eq!(g.median_m2, 2.5, epsilon = 1e-12);
        // Deviations −3, −2, −1, 6 → SS = 50, /3.
        assert_abs_diff_eq!(g.std_m2, (50.0f64 / 3.0).sqrt(), epsilon = 1e-12);
        assert_eq!((g.min_m2, g.max_m2), (1.0, 10.0));
    }

    #[test]
    fn grain_size_of_empty_layer_is_none() {
        assert!(grain_size_stats(&labelled(&[])).is_none());
    }

    #[test]
    fn histogram_density_integrates_to_one() {
        let values: Vec<f64> = (0..100).map(|i| i as f64 / 10.0).collect();
        let h = histogram(&values, 30).unwrap();
        assert_eq!(h.edges.len(), 31);
        assert_eq!(h.counts.iter().sum::<usize>(), 100);
        let width = h.edges[1] - h.edges[0];
        assert_abs_diff_eq!(h.density.iter().sum::<f64>() * width, 1.0, epsilon = 1e-9);
        assert_eq!(*h.counts.last().unwrap() > 0, true, "max value lands in the closed last bin");
    }

    #[test]
    fn histogram_of_single_value_does_not_divide_by_zero() {
        let h = histogram(&[2.0, 2.0, 2.0], 5).unwrap();
        assert_eq!(h.counts.iter().sum::<usize>(), 3);
        assert!(h.density.iter().all(|d| d.is_finite()));
    }
}
