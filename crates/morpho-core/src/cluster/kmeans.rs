//! Seeded k-means (Lloyd's algorithm with k-means++ initialisation).
//!
//! Deterministic for a given seed: one `StdRng` drives every restart, so the
//! same input and parameters always give the same labels.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{MorphoError, Result};
use crate::scaling::{column_moments, FeatureMatrix};

/// Salt mixed into the user seed so the clustering stream does not coincide
/// with any other seeded stream built from the same number.
const KMEANS_SEED_SALT: u64 = 0x6B4D_E1A5_2F08_93C7;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KMeansParams {
    pub k: usize,
    pub n_init: usize,
    pub max_iter: usize,
    /// Relative tolerance: iterations stop once the summed squared centroid
    /// shift falls below `tolerance × mean column variance`.
    pub tolerance: f64,
    pub seed: u64,
}

impl Default for KMeansParams {
    fn default() -> Self {
        Self { k: 4, n_init: 10, max_iter: 300, tolerance: 1e-4, seed: 42 }
    }
}

/// Result of a k-means fit.
#[derive(Debug, Clone, PartialEq)]
pub struct KMeansModel {
    /// Row-major `k × n_cols` centroid coordinates.
    pub centroids: Vec<f64>,
    pub n_cols: usize,
    /// Cluster index of every training row.
    pub labels: Vec<usize>,
    /// Sum of squared distances from rows to their centroid.
    pub inertia: f64,
    /// Lloyd iterations used by the winning restart.
    pub n_iter: usize,
}

impl KMeansModel {
    pub fn k(&self) -> usize {
        if self.n_cols == 0 {
            0
        } else {
            self.centroids.len() / self.n_cols
        }
    }

    pub fn centroid(&self, c: usize) -> &[f64] {
        &self.centroids[c * self.n_cols..(c + 1) * self.n_cols]
    }

    /// Index of the centroid nearest to `row`.
    pub fn predict(&self, row: &[f64]) -> usize {
        nearest(&self.centroids, self.n_cols, row).0
    }

    /// Number of training rows per cluster.
    pub fn cluster_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.k()];
        for &l in &self.labels {
            sizes[l] += 1;
        }
        sizes
    }

    /// Rename clusters: old cluster `order[i]` becomes cluster `i`.
    /// `order` must be a permutation of `0..k`.
    pub fn relabel(&mut self, order: &[usize]) {
        let k = self.k();
        debug_assert_eq!(order.len(), k);
        let mut new_of_old = vec![0; k];
        for (new, &old) in order.iter().enumerate() {
            new_of_old[old] = new;
        }
        let mut centroids = Vec::with_capacity(self.centroids.len());
        for &old in order {
            centroids.extend_from_slice(self.centroid(old));
        }
        self.centroids = centroids;
        for l in &mut self.labels {
            *l = new_of_old[*l];
        }
    }
}

#[inline]
fn sq_dist(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// (index, squared distance) of the nearest centroid.
fn nearest(centroids: &[f64], n_cols: usize, row: &[f64]) -> (usize, f64) {
    centroids
        .chunks_exact(n_cols)
        .enumerate()
        .map(|(c, centroid)| (c, sq_dist(centroid, row)))
        .fold((0, f64::INFINITY), |best, cur| if cur.1 < best.1 { cur } else { best })
}

/// k-means++ seeding: first centre uniform, each next centre drawn with
/// probability proportional to D², the squared distance to the nearest
/// centre chosen so far.
fn kmeans_plus_plus(m: &FeatureMatrix, k: usize, rng: &mut StdRng) -> Vec<f64> {
    let mut centroids = Vec::with_capacity(k * m.n_cols);
    let first = rng.gen_range(0..m.n_rows);
    centroids.extend_from_slice(m.row(first));

    let mut d2: Vec<f64> = m.rows().map(|r| sq_dist(r, m.row(first))).collect();

    for _ in 1..k {
        let total: f64 = d2.iter().sum();
        let pick = if total > 0.0 {
            let target = rng.gen::<f64>() * total;
            let mut acc = 0.0;
            d2.iter()
                .position(|&w| {
                    acc += w;
                    acc >= target && w > 0.0
                })
                .unwrap_or_else(|| d2.iter().rposition(|&w| w > 0.0).unwrap_or(0))
        } else {
            rng.gen_range(0..m.n_rows)
        };
        let chosen = m.row(pick);
        centroids.extend_from_slice(chosen);
        for (i, r) in m.rows().enumerate() {
            d2[i] = d2[i].min(sq_dist(r, chosen));
        }
    }
    centroids
}

/// Assign every row to its nearest centroid. Returns total inertia.
fn assign(m: &FeatureMatrix, centroids: &[f64], labels: &mut [usize], dists: &mut [f64]) -> f64 {
    let mut inertia = 0.0;
    for (i, row) in m.rows().enumerate() {
        let (c, d) = nearest(centroids, m.n_cols, row);
        labels[i] = c;
        dists[i] = d;
        inertia += d;
    }
    inertia
}

/// Recompute centroids as member means. An emptied cluster takes the row
/// currently farthest from its own centroid, which then stops counting as
/// a candidate for other empty clusters.
fn update(m: &FeatureMatrix, k: usize, labels: &[usize], dists: &mut [f64]) -> Vec<f64> {
    let n_cols = m.n_cols;
    let mut sums = vec![0.0; k * n_cols];
    let mut counts = vec![0usize; k];
    for (row, &l) in m.rows().zip(labels) {
        counts[l] += 1;
        for (s, v) in sums[l * n_cols..(l + 1) * n_cols].iter_mut().zip(row) {
            *s += v;
        }
    }

    for c in 0..k {
        let block = &mut sums[c * n_cols..(c + 1) * n_cols];
        if counts[c] > 0 {
            block.iter_mut().for_each(|s| *s /= counts[c] as f64);
        } else {
            let far = dists
                .iter()
                .enumerate()
                .fold((0, f64::NEG_INFINITY), |best, (i, &d)| if d > best.1 { (i, d) } else { best })
                .0;
            block.copy_from_slice(m.row(far));
            dists[far] = 0.0;
            debug!(cluster = c, row = far, "re-seeded empty cluster");
        }
    }
    sums
}

fn single_run(m: &FeatureMatrix, params: &KMeansParams, tol: f64, rng: &mut StdRng) -> KMeansModel {
    let mut centroids = kmeans_plus_plus(m, params.k, rng);
    let mut labels = vec![0usize; m.n_rows];
    let mut dists = vec![0.0f64; m.n_rows];
    let mut n_iter = 0;

    for iter in 1..=params.max_iter {
        n_iter = iter;
        assign(m, &centroids, &mut labels, &mut dists);
        let next = update(m, params.k, &labels, &mut dists);
        let shift = sq_dist(&centroids, &next);
        centroids = next;
        if shift <= tol {
            break;
        }
    }

    let inertia = assign(m, &centroids, &mut labels, &mut dists);
    KMeansModel { centroids, n_cols: m.n_cols, labels, inertia, n_iter }
}

/// Fit k-means to `m`, keeping the lowest-inertia of `n_init` restarts.
pub fn fit(m: &FeatureMatrix, params: &KMeansParams) -> Result<KMeansModel> {
    if params.k == 0 || params.n_init == 0 {
        return Err(MorphoError::Clustering("k and n_init must be at least 1".into()));
    }
    if m.n_rows < params.k {
        return Err(MorphoError::Clustering(format!(
            "{} samples cannot form {} clusters",
            m.n_rows, params.k
        )));
    }
    if m.n_cols == 0 {
        return Err(MorphoError::Clustering("feature matrix has no columns".into()));
    }

    let mean_var = (0..m.n_cols).map(|j| column_moments(m, j).1).sum::<f64>() / m.n_cols as f64;
    let tol = params.tolerance * mean_var;

    let mut rng = StdRng::seed_from_u64(params.seed ^ KMEANS_SEED_SALT);
    let mut best: Option<KMeansModel> = None;
    for run in 0..params.n_init {
        let model = single_run(m, params, tol, &mut rng);
        debug!(run, inertia = model.inertia, n_iter = model.n_iter, "k-means restart");
        if best.as_ref().map_or(true, |b| model.inertia < b.inertia) {
            best = Some(model);
        }
    }
    best.ok_or_else(|| MorphoError::Clustering("no k-means run completed".into()))
}
