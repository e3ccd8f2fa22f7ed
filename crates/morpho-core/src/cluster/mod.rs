//! Morphological typology assignment (stage 3): standardize the configured
//! metric columns, run k-means, and write labels back onto the parcels.
//!
//! Raw k-means labels are arbitrary. They are renumbered by descending mean
//! parcel area, so cluster 0 always holds the coarsest grain and the labels
//! are comparable between runs and datasets.
pub mod kmeans;

pub use kmeans::{KMeansModel, KMeansParams};

use std::cmp::Ordering;

use tracing::info;

use crate::config::ClusteringConfig;
use crate::error::{MorphoError, Result};
use crate::parcel::ParcelSet;
use crate::scaling::{Feature, FeatureMatrix, StandardScaler};

/// Everything the clustering stage produced, for reporting and validation.
#[derive(Debug, Clone)]
pub struct ClusterOutcome {
    pub features: Vec<Feature>,
    pub scaler: StandardScaler,
    /// Standardized matrix actually fed to k-means.
    pub standardized: FeatureMatrix,
    /// Index into `ParcelSet::parcels` of each matrix row.
    pub row_index: Vec<usize>,
    /// Model after area-ordered relabelling.
    pub model: KMeansModel,
}

impl ClusterOutcome {
    /// Centroids mapped back to metric units, one row per cluster.
    pub fn centroids_in_units(&self) -> Vec<Vec<f64>> {
        (0..self.model.k())
            .map(|c| self.scaler.inverse_row(self.model.centroid(c)))
            .collect()
    }
}

impl From<&ClusteringConfig> for KMeansParams {
    fn from(c: &ClusteringConfig) -> Self {
        Self {
            k: c.n_clusters,
            n_init: c.n_init,
            max_iter: c.max_iter,
            tolerance: c.tolerance,
            seed: c.seed,
        }
    }
}

/// Cluster every measured parcel and set `Parcel::cluster`.
pub fn assign_clusters(set: &mut ParcelSet, config: &ClusteringConfig) -> Result<ClusterOutcome> {
    let (matrix, row_index) = FeatureMatrix::from_parcels(set, &config.features);
    if matrix.n_rows == 0 {
        return Err(MorphoError::EmptyDataset { stage: "shape metrics" });
    }

    let (scaler, standardized) = StandardScaler::fit_transform(&matrix);
    let mut model = kmeans::fit(&standardized, &KMeansParams::from(config))?;

    let order = order_by_mean_area(set, &row_index, &model);
    model.relabel(&order);

    for (row, &idx) in row_index.iter().enumerate() {
        set.parcels[idx].cluster = Some(model.labels[row]);
    }

    info!(
        k = model.k(),
        inertia = model.inertia,
        n_iter = model.n_iter,
        sizes = ?model.cluster_sizes(),
        "k-means clustering complete"
    );

    Ok(ClusterOutcome { features: config.features.clone(), scaler, standardized, row_index, model })
}

/// Raw cluster ids sorted by descending mean area. Empty clusters go last.
fn order_by_mean_area(set: &ParcelSet, row_index: &[usize], model: &KMeansModel) -> Vec<usize> {
    let k = model.k();
    let mut sums = vec![0.0f64; k];
    let mut counts = vec![0usize; k];
    for (row, &idx) in row_index.iter().enumerate() {
        if let Some(m) = &set.parcels[idx].metrics {
            let l = model.labels[row];
            sums[l] += m.area_m2;
            counts[l] += 1;
        }
    }
    let means: Vec<f64> = sums
        .iter()
        .zip(&counts)
        .map(|(&s, &n)| if n > 0 { s / n as f64 } else { f64::NEG_INFINITY })
        .collect();

    let mut order: Vec<usize> = (0..k).collect();
    order.sort_by(|&a, &b| means[b].partial_cmp(&means[a]).unwrap_or(Ordering::Equal).then(a.cmp(&b)));
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::crs::Crs;
    use crate::metrics::compute_metrics;
    use crate::parcel::test_support::{rect, rotated_rect};
    use crate::parcel::Parcel;

    /// Four visually distinct typologies, 12 parcels each:
    /// large N/S blocks, mid E/W lots, small 45° lots, tiny triangles-ish slivers.
    fn neighbourhood() -> ParcelSet {
        let mut parcels = Vec::new();
        let mut id = 0;
        for i in 0..12 {
            let x = i as f64 * 200.0;
            parcels.push(Parcel::new(id, rect(x, 0.0, 60.0 + i as f64, 120.0)));
            id += 1;
            parcels.push(Parcel::new(id, rect(x, 500.0, 30.0 + i as f64 * 0.5, 15.0)));
            id += 1;
            parcels.push(Parcel::new(id, rotated_rect(x + 50.0, 900.0, 14.0, 6.0, 45.0 + i as f64)));
            id += 1;
            parcels.push(Parcel::new(id, rect(x, 1200.0, 2.0, 9.0 + i as f64 * 0.1)));
            id += 1;
        }
        let mut set = ParcelSet::new(Crs::Utm { zone: 39, north: true }, parcels);
        compute_metrics(&mut set, &PipelineConfig::default());
        set
    }

    #[test]
    fn every_parcel_gets_one_of_four_labels() {
        let mut set = neighbourhood();
        let outcome = assign_clusters(&mut set, &ClusteringConfig::default()).unwrap();
        assert_eq!(outcome.model.k(), 4);
        assert!(set.parcels.iter().all(|p| matches!(p.cluster, Some(c) if c < 4)));
        assert_eq!(set.cluster_labels(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn labels_are_ordered_by_descending_mean_area() {
        let mut set = neighbourhood();
        assign_clusters(&mut set, &ClusteringConfig::default()).unwrap();
        let mean_area = |c: usize| {
            let areas: Vec<f64> = set
                .measured()
                .filter(|(p, _)| p.cluster == Some(c))
                .map(|(_, m)| m.area_m2)
                .collect();
            areas.iter().sum::<f64>() / areas.len() as f64
        };
        for c in 0..3 {
            assert!(mean_area(c) > mean_area(c + 1), "cluster {c} not larger than {}", c + 1);
        }
    }

    #[test]
    fn typologies_are_recovered() {
        let mut set = neighbourhood();
        assign_clusters(&mut set, &ClusteringConfig::default()).unwrap();
        // Parcels were pushed in typology order 0,1,2,3 repeatedly.
        for (i, p) in set.parcels.iter().enumerate() {
            assert_eq!(p.cluster, Some(i % 4), "parcel {} misassigned", p.id);
        }
    }

    #[test]
    fn centroids_map_back_to_metric_units() {
        let mut set = neighbourhood();
        let outcome = assign_clusters(&mut set, &ClusteringConfig::default()).unwrap();
        let centroids = outcome.centroids_in_units();
        // First feature is log area; cluster 0 (large blocks) > cluster 3 (slivers).
        assert!(centroids[0][0] > centroids[3][0]);
    }

    #[test]
    fn empty_layer_is_an_error() {
        let mut set = ParcelSet::new(Crs::Utm { zone: 39, north: true }, vec![]);
        assert!(matches!(
            assign_clusters(&mut set, &ClusteringConfig::default()),
            Err(MorphoError::EmptyDataset { .. })
        ));
    }
}
