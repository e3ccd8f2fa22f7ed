//! Statistical sanity checks on a finished run.
//!
//! None of these are fatal: a failed check is reported and logged as a
//! warning so the figures are still produced for inspection.

use std::fmt;

use serde::Serialize;
use tracing::warn;

use crate::parcel::ParcelSet;
use crate::scaling::{column_moments, FeatureMatrix};
use crate::summary::ClusterSummary;

/// Variance below which a standardized column is taken as constant.
const CONSTANT_VARIANCE: f64 = 1e-12;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckOutcome {
    pub name: &'static str,
    pub passed: bool,
    pub detail: String,
}

impl fmt::Display for CheckOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mark = if self.passed { "ok" } else { "FAILED" };
        write!(f, "[{mark}] {}: {}", self.name, self.detail)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationReport {
    pub checks: Vec<CheckOutcome>,
}

impl ValidationReport {
    pub fn push(&mut self, outcome: CheckOutcome) {
        if !outcome.passed {
            warn!(check = outcome.name, detail = %outcome.detail, "sanity check failed");
        }
        self.checks.push(outcome);
    }

    pub fn all_passed(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }

    pub fn failures(&self) -> impl Iterator<Item = &CheckOutcome> {
        self.checks.iter().filter(|c| !c.passed)
    }
}

/// Every parcel carries exactly one label in `0..k`, and every label is used.
pub fn check_labels(set: &ParcelSet, k: usize) -> CheckOutcome {
    let unlabelled = set.parcels.iter().filter(|p| p.cluster.is_none()).count();
    let out_of_range = set.parcels.iter().filter(|p| matches!(p.cluster, Some(c) if c >= k)).count();
    let used = set.cluster_labels().iter().filter(|&&c| c < k).count();

    let passed = unlabelled == 0 && out_of_range == 0 && used == k;
    let detail = if passed {
        format!("{} parcels, {k} labels", set.len())
    } else {
        format!("{unlabelled} unlabelled, {out_of_range} out of range, {used}/{k} labels used")
    };
    CheckOutcome { name: "labels", passed, detail }
}

/// Each column has |mean| ≤ tol and |variance − 1| ≤ tol. Columns with no
/// spread at all are accepted with zero variance.
pub fn check_standardized(m: &FeatureMatrix, tol: f64) -> CheckOutcome {
    let mut bad = Vec::new();
    for j in 0..m.n_cols {
        let (mean, var) = column_moments(m, j);
        let unit = (var - 1.0).abs() <= tol || var < CONSTANT_VARIANCE;
        if !(mean.abs() <= tol && unit) {
            bad.push(format!("col {j}: mean={mean:.3e} var={var:.6}"));
        }
    }
    let passed = bad.is_empty() && m.n_rows > 0;
    let detail = if m.n_rows == 0 {
        "empty matrix".to_string()
    } else if passed {
        format!("{} columns at mean 0, variance 1", m.n_cols)
    } else {
        bad.join("; ")
    };
    CheckOutcome { name: "standardization", passed, detail }
}

/// Mean area strictly decreases with cluster label.
pub fn check_area_ordering(summaries: &[ClusterSummary]) -> CheckOutcome {
    let offending: Vec<String> = summaries
        .windows(2)
        .filter(|w| !(w[0].mean_area_m2 > w[1].mean_area_m2))
        .map(|w| format!("{} ({:.1}) ≤ {} ({:.1})", w[0].cluster, w[0].mean_area_m2, w[1].cluster, w[1].mean_area_m2))
        .collect();
    let passed = offending.is_empty();
    let detail = if passed {
        let areas: Vec<String> = summaries.iter().map(|s| format!("{:.1}", s.mean_area_m2)).collect();
        format!("mean area {}", areas.join(" > "))
    } else {
        offending.join("; ")
    };
    CheckOutcome { name: "area ordering", passed, detail }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crs::Crs;
    use crate::parcel::test_support::rect;
    use crate::parcel::Parcel;
    use crate::scaling::StandardScaler;

    fn labelled(labels: &[Option<usize>]) -> ParcelSet {
        let parcels = labels
            .iter()
            .enumerate()
            .map(|(i, &c)| {
                let mut p = Parcel::new(i, rect(0.0, 0.0, 1.0, 1.0));
                p.cluster = c;
                p
            })
            .collect();
        ParcelSet::new(Crs::Unknown, parcels)
    }

    fn summary(cluster: usize, area: f64) -> ClusterSummary {
        ClusterSummary {
            cluster,
            parcel_count: 1,
            mean_area_m2: area,
            mean_perimeter_m: 0.0,
            mean_perimeter_area_ratio: 0.0,
            mean_compactness: 0.0,
            mean_rectangularity: 0.0,
            mean_orientation_deg: 0.0,
        }
    }

    #[test]
    fn complete_labelling_passes() {
        let set = labelled(&[Some(0), Some(1), Some(2), Some(3), Some(0)]);
        assert!(check_labels(&set, 4).passed);
    }

    #[test]
    fn missing_or_extra_labels_fail() {
        assert!(!check_labels(&labelled(&[Some(0), None, Some(2), Some(3), Some(1)]), 4).passed);
        assert!(!check_labels(&labelled(&[Some(0), Some(1), Some(2), Some(4)]), 4).passed);
        assert!(!check_labels(&labelled(&[Some(0), Some(1), Some(2)]), 4).passed, "label 3 unused");
    }

    #[test]
    fn scaler_output_passes_standardization() {
        let m = FeatureMatrix::new(vec![1.0, 10.0, 2.0, 30.0, 3.0, 20.0, 9.0, 5.0], 4, 2);
        let (_, z) = StandardScaler::fit_transform(&m);
        assert!(check_standardized(&z, 1e-9).passed);
        assert!(!check_standardized(&m, 1e-9).passed, "raw metrics are not standardized");
    }

    #[test]
    fn constant_column_is_accepted() {
        let z = FeatureMatrix::new(vec![-1.0, 0.0, 1.0, 0.0], 2, 2);
        assert!(check_standardized(&z, 1e-9).passed);
    }

    #[test]
    fn area_ordering_must_be_strict() {
        let ok = [summary(0, 900.0), summary(1, 300.0), summary(2, 120.0), summary(3, 40.0)];
        assert!(check_area_ordering(&ok).passed);
        let tie = [summary(0, 900.0), summary(1, 300.0), summary(2, 300.0)];
        let outcome = check_area_ordering(&tie);
        assert!(!outcome.passed);
        assert!(outcome.detail.contains("1 (300.0)"), "detail={}", outcome.detail);
    }

    #[test]
    fn report_tracks_failures() {
        let mut report = ValidationReport::default();
        report.push(check_labels(&labelled(&[Some(0)]), 1));
        report.push(check_area_ordering(&[summary(0, 1.0), summary(1, 2.0)]));
        assert!(!report.all_passed());
        assert_eq!(report.failures().count(), 1);
    }
}
