// src/clustering/evaluation.rs
// Diagnostic cluster-quality metrics. Nothing here feeds back into labels.

use log::{info, warn};
use ndarray::{Array1, Array2, ArrayView2, Axis};
use serde::Serialize;
use std::collections::HashMap;

use crate::clustering::dbscan::NOISE_LABEL;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterQualityReport {
    /// Distinct non-noise labels.
    pub n_clusters: usize,
    pub n_noise: usize,
    /// Points the scores were computed over (noise excluded).
    pub n_evaluated: usize,
    /// Mean silhouette coefficient in [-1, 1], higher is better.
    pub silhouette: Option<f64>,
    /// Davies-Bouldin index, lower is better.
    pub davies_bouldin: Option<f64>,
}

impl ClusterQualityReport {
    pub fn is_degenerate(&self) -> bool {
        self.silhouette.is_none()
    }

    pub fn log_report(&self) {
        info!("=== Clustering Evaluation ===");
        info!("Number of clusters: {}", self.n_clusters);
        info!("Noise points: {}", self.n_noise);
        match (self.silhouette, self.davies_bouldin) {
            (Some(sil), Some(db)) => {
                info!("Metrics on clean data ({} points):", self.n_evaluated);
                info!("Silhouette Score: {:.3}", sil);
                info!("Davies-Bouldin Index: {:.3}", db);
            }
            _ => warn!(
                "Quality scores skipped: {} clusters over {} points is too few to compare",
                self.n_clusters, self.n_evaluated
            ),
        }
    }
}

/// Counts clusters and noise, and scores separation over non-noise points
/// when there are at least two clusters and fewer clusters than points.
/// Scores use Euclidean distance on the raw embeddings.
pub fn evaluate_clusters(embeddings: ArrayView2<f32>, labels: &[i64]) -> ClusterQualityReport {
    let n_noise = labels.iter().filter(|&&l| l == NOISE_LABEL).count();

    let mut dense_of: HashMap<i64, usize> = HashMap::new();
    let mut kept_rows = Vec::new();
    let mut dense_labels = Vec::new();
    for (row, &label) in labels.iter().enumerate() {
        if label == NOISE_LABEL {
            continue;
        }
        let next = dense_of.len();
        let dense = *dense_of.entry(label).or_insert(next);
        kept_rows.push(row);
        dense_labels.push(dense);
    }

    let n_clusters = dense_of.len();
    let n_evaluated = kept_rows.len();
    let mut report = ClusterQualityReport {
        n_clusters,
        n_noise,
        n_evaluated,
        silhouette: None,
        davies_bouldin: None,
    };

    if n_clusters < 2 || n_clusters >= n_evaluated || embeddings.nrows() != labels.len() {
        return report;
    }

    let points = embeddings.select(Axis(0), &kept_rows).mapv(f64::from);
    report.silhouette = Some(silhouette_score(&points, &dense_labels, n_clusters));
    report.davies_bouldin = Some(davies_bouldin_score(&points, &dense_labels, n_clusters));
    report
}

fn squared_norms(points: &Array2<f64>) -> Array1<f64> {
    points.map_axis(Axis(1), |row| row.dot(&row))
}

/// Mean over points of `(b - a) / max(a, b)`. Members of singleton clusters
/// score 0.
fn silhouette_score(points: &Array2<f64>, labels: &[usize], n_clusters: usize) -> f64 {
    let n = points.nrows();
    let norms = squared_norms(points);
    let mut cluster_sizes = vec![0usize; n_clusters];
    for &l in labels {
        cluster_sizes[l] += 1;
    }

    let mut total = 0.0;
    for i in 0..n {
        let own = labels[i];
        if cluster_sizes[own] <= 1 {
            continue;
        }

        let dots = points.dot(&points.row(i));
        let mut sums = vec![0.0f64; n_clusters];
        for j in 0..n {
            if j == i {
                continue;
            }
            let d2 = (norms[i] + norms[j] - 2.0 * dots[j]).max(0.0);
            sums[labels[j]] += d2.sqrt();
        }

        let a = sums[own] / (cluster_sizes[own] - 1) as f64;
        let b = (0..n_clusters)
            .filter(|&c| c != own)
            .map(|c| sums[c] / cluster_sizes[c] as f64)
            .fold(f64::INFINITY, f64::min);
        let denom = a.max(b);
        if denom > 0.0 && denom.is_finite() {
            total += (b - a) / denom;
        }
    }

    total / n as f64
}

/// Mean over clusters of the worst `(s_i + s_j) / d(c_i, c_j)` ratio, where
/// `s` is the mean distance to the centroid.
fn davies_bouldin_score(points: &Array2<f64>, labels: &[usize], n_clusters: usize) -> f64 {
    let dim = points.ncols();
    let mut centroids = Array2::<f64>::zeros((n_clusters, dim));
    let mut sizes = vec![0usize; n_clusters];
    for (row, &l) in points.axis_iter(Axis(0)).zip(labels) {
        let mut c = centroids.row_mut(l);
        c += &row;
        sizes[l] += 1;
    }
    for (mut c, &size) in centroids.axis_iter_mut(Axis(0)).zip(&sizes) {
        c /= size as f64;
    }

    let mut scatter = vec![0.0f64; n_clusters];
    for (row, &l) in points.axis_iter(Axis(0)).zip(labels) {
        let diff = &row - &centroids.row(l);
        scatter[l] += diff.dot(&diff).sqrt();
    }
    for (s, &size) in scatter.iter_mut().zip(&sizes) {
        *s /= size as f64;
    }

    let centroid_dist = |i: usize, j: usize| {
        let diff = &centroids.row(i) - &centroids.row(j);
        diff.dot(&diff).sqrt()
    };

    let all_scatter_zero = scatter.iter().all(|&s| s.abs() < 1e-12);
    let all_centroids_equal = (0..n_clusters)
        .flat_map(|i| (i + 1..n_clusters).map(move |j| (i, j)))
        .all(|(i, j)| centroid_dist(i, j) < 1e-12);
    if all_scatter_zero || all_centroids_equal {
        return 0.0;
    }

    let mut total = 0.0;
    for i in 0..n_clusters {
        let worst = (0..n_clusters)
            .filter(|&j| j != i)
            .map(|j| {
                let d = centroid_dist(i, j);
                if d < 1e-12 {
                    0.0
                } else {
                    (scatter[i] + scatter[j]) / d
                }
            })
            .fold(0.0f64, f64::max);
        total += worst;
    }
    total / n_clusters as f64
}
