pub mod dbscan;
pub mod evaluation;

pub use dbscan::{cluster_embeddings, DbscanParams, NOISE_LABEL};
pub use evaluation::{evaluate_clusters, ClusterQualityReport};
