// src/clustering/dbscan.rs

use log::{debug, info};
use ndarray::{s, Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Instant;

/// Label given to points that belong to no cluster.
pub const NOISE_LABEL: i64 = -1;

pub const DEFAULT_EPS: f64 = 0.01;
pub const DEFAULT_MIN_SAMPLES: usize = 1;

// Rows per block when computing the similarity matrix.
const NEIGHBOR_BLOCK_ROWS: usize = 256;

/// DBSCAN parameters over cosine distance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DbscanParams {
    /// Neighbourhood radius in cosine distance (`1 - cos`).
    pub eps: f64,
    /// Neighbourhood size, the point itself included, at which a point becomes
    /// a core point. With 1 every point is a core point and nothing is noise.
    pub min_samples: usize,
}

impl Default for DbscanParams {
    fn default() -> Self {
        Self {
            eps: DEFAULT_EPS,
            min_samples: DEFAULT_MIN_SAMPLES,
        }
    }
}

/// Returns a copy of `embeddings` with each row scaled to unit length.
/// Zero rows are left as zero, which puts them at distance 1 from everything.
fn unit_rows(embeddings: ArrayView2<f32>) -> Array2<f32> {
    let mut normalized = embeddings.to_owned();
    for mut row in normalized.axis_iter_mut(Axis(0)) {
        let norm = row.dot(&row).sqrt();
        if norm > 0.0 {
            row.mapv_inplace(|x| x / norm);
        }
    }
    normalized
}

/// Indices within `eps` cosine distance of each point, the point itself
/// always included.
fn region_queries(normalized: &Array2<f32>, eps: f64) -> Vec<Vec<usize>> {
    let n = normalized.nrows();
    let min_similarity = (1.0 - eps) as f32;
    let mut neighborhoods = Vec::with_capacity(n);

    let mut start = 0;
    while start < n {
        let end = (start + NEIGHBOR_BLOCK_ROWS).min(n);
        let block = normalized.slice(s![start..end, ..]);
        let similarities = block.dot(&normalized.t());

        for (offset, sims) in similarities.axis_iter(Axis(0)).enumerate() {
            let i = start + offset;
            let mut neighbors: Vec<usize> = sims
                .iter()
                .enumerate()
                .filter(|&(j, &sim)| j == i || sim >= min_similarity)
                .map(|(j, _)| j)
                .collect();
            neighbors.sort_unstable();
            neighborhoods.push(neighbors);
        }
        start = end;
    }

    neighborhoods
}

/// Density-based clustering of the rows of `embeddings` under cosine distance.
///
/// Returns one label per row. Labels are assigned in order of first discovery
/// and carry no meaning beyond which rows share them. Rows that are not within
/// reach of any core point get [`NOISE_LABEL`].
pub fn cluster_embeddings(embeddings: ArrayView2<f32>, params: &DbscanParams) -> Vec<i64> {
    let n = embeddings.nrows();
    if n == 0 {
        return Vec::new();
    }

    let start_time = Instant::now();
    let normalized = unit_rows(embeddings);
    let neighborhoods = region_queries(&normalized, params.eps);
    let is_core: Vec<bool> = neighborhoods
        .iter()
        .map(|nb| nb.len() >= params.min_samples)
        .collect();
    debug!(
        "Region queries done for {} points in {:.2?} ({} core points)",
        n,
        start_time.elapsed(),
        is_core.iter().filter(|&&c| c).count()
    );

    let mut labels = vec![NOISE_LABEL; n];
    let mut next_label: i64 = 0;
    let mut queue = VecDeque::new();

    for seed in 0..n {
        if labels[seed] != NOISE_LABEL || !is_core[seed] {
            continue;
        }
        labels[seed] = next_label;
        queue.push_back(seed);

        while let Some(point) = queue.pop_front() {
            if !is_core[point] {
                continue;
            }
            for &neighbor in &neighborhoods[point] {
                if labels[neighbor] == NOISE_LABEL {
                    labels[neighbor] = next_label;
                    queue.push_back(neighbor);
                }
            }
        }
        next_label += 1;
    }

    let noise = labels.iter().filter(|&&l| l == NOISE_LABEL).count();
    info!(
        "DBSCAN (eps={}, min_samples={}) produced {} clusters and {} noise points from {} embeddings in {:.2?}",
        params.eps,
        params.min_samples,
        next_label,
        noise,
        n,
        start_time.elapsed()
    );

    labels
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::rngs::StdRng;
    use rand::seq::SliceRandom;
    use rand::{Rng, SeedableRng};
    use std::collections::{BTreeSet, HashMap};

    /// Partition as a set of sorted member lists, independent of label values.
    fn partition(labels: &[i64], ids: &[usize]) -> BTreeSet<Vec<usize>> {
        let mut groups: HashMap<i64, Vec<usize>> = HashMap::new();
        for (pos, &label) in labels.iter().enumerate() {
            groups.entry(label).or_default().push(ids[pos]);
        }
        groups
            .into_values()
            .map(|mut g| {
                g.sort_unstable();
                g
            })
            .collect()
    }

    #[test]
    fn test_empty_input() {
        let empty = Array2::<f32>::zeros((0, 8));
        assert!(cluster_embeddings(empty.view(), &DbscanParams::default()).is_empty());
    }

    #[test]
    fn test_near_identical_rows_merge() {
        let emb = array![
            [1.0f32, 0.0, 0.0],
            [0.999, 0.01, 0.0],
            [0.0, 1.0, 0.0],
            [2.0, 0.0, 0.0], // same direction as row 0, different magnitude
        ];
        let labels = cluster_embeddings(emb.view(), &DbscanParams::default());
        assert_eq!(labels.len(), 4);
        assert_eq!(labels[0], labels[1]);
        assert_eq!(labels[0], labels[3]);
        assert_ne!(labels[0], labels[2]);
    }

    #[test]
    fn test_min_samples_one_never_yields_noise() {
        let mut rng = StdRng::seed_from_u64(42);
        let emb = Array2::from_shape_fn((60, 5), |_| rng.gen_range(-1.0f32..1.0));
        let labels = cluster_embeddings(emb.view(), &DbscanParams::default());
        assert_eq!(labels.len(), 60);
        assert!(labels.iter().all(|&l| l != NOISE_LABEL));
    }

    #[test]
    fn test_zero_vectors_are_singletons() {
        let emb = array![[0.0f32, 0.0], [0.0, 0.0], [1.0, 0.0]];
        let labels = cluster_embeddings(emb.view(), &DbscanParams::default());
        assert!(labels.iter().all(|&l| l != NOISE_LABEL));
        assert_ne!(labels[0], labels[1]);
        assert_ne!(labels[0], labels[2]);
    }

    #[test]
    fn test_chains_merge_transitively() {
        // 0-1 and 1-2 are within eps, 0-2 is not.
        let angle = 0.12f32;
        let emb = array![
            [1.0f32, 0.0],
            [angle.cos(), angle.sin()],
            [(2.0 * angle).cos(), (2.0 * angle).sin()],
        ];
        let params = DbscanParams {
            eps: 1.0 - (angle as f64 * 1.2).cos(),
            min_samples: 1,
        };
        let labels = cluster_embeddings(emb.view(), &params);
        assert_eq!(labels[0], labels[1]);
        assert_eq!(labels[1], labels[2]);
    }

    #[test]
    fn test_sparse_points_become_noise_with_larger_min_samples() {
        let emb = array![
            [1.0f32, 0.0],
            [0.9999, 0.001],
            [0.9998, 0.002],
            [0.0, 1.0],
        ];
        let params = DbscanParams {
            eps: 0.01,
            min_samples: 3,
        };
        let labels = cluster_embeddings(emb.view(), &params);
        assert_eq!(labels[0], 0);
        assert_eq!(labels[1], 0);
        assert_eq!(labels[2], 0);
        assert_eq!(labels[3], NOISE_LABEL);
    }

    #[test]
    fn test_partition_is_invariant_under_permutation() {
        let mut rng = StdRng::seed_from_u64(7);
        let centers: [[f32; 4]; 6] = [
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, -1.0],
            [1.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 1.0],
        ];
        let mut rows = Vec::new();
        for i in 0..30 {
            let c = centers[i % centers.len()];
            let jitter = 1.0 + rng.gen_range(0.0f32..0.5);
            rows.push([c[0] * jitter, c[1] * jitter, c[2] * jitter, c[3] * jitter]);
        }

        let to_matrix = |order: &[usize]| {
            Array2::from_shape_fn((order.len(), 4), |(r, c)| rows[order[r]][c])
        };

        let identity: Vec<usize> = (0..rows.len()).collect();
        let base = cluster_embeddings(to_matrix(&identity).view(), &DbscanParams::default());

        let mut shuffled = identity.clone();
        shuffled.shuffle(&mut rng);
        let permuted = cluster_embeddings(to_matrix(&shuffled).view(), &DbscanParams::default());

        assert_eq!(partition(&base, &identity), partition(&permuted, &shuffled));
        assert_eq!(partition(&base, &identity).len(), centers.len());
    }

    #[test]
    fn test_blocks_cover_all_rows() {
        let n = NEIGHBOR_BLOCK_ROWS * 2 + 3;
        let emb = Array2::from_shape_fn((n, 2), |(r, c)| if c == 0 { 1.0 } else { r as f32 * 1e-6 });
        let labels = cluster_embeddings(emb.view(), &DbscanParams::default());
        assert_eq!(labels.len(), n);
        assert!(labels.iter().all(|&l| l == 0));
    }
}
