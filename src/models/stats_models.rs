// src/models/stats_models.rs

use log::info;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::clustering::evaluation::ClusterQualityReport;

/// Counters and timings collected over one consolidation run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConsolidationStats {
    pub run_id: String,
    pub store_scope: String,
    pub embedding_mode: String,
    pub records_read: usize,
    pub records_excluded: usize,
    pub records_embedded: usize,
    pub embedding_dimension: usize,
    pub clusters: usize,
    pub consolidated_products: usize,
    pub variants: usize,
    pub offers: usize,
    pub quality: Option<ClusterQualityReport>,
    #[serde(skip)]
    pub phase_times: BTreeMap<String, Duration>,
}

impl ConsolidationStats {
    pub fn new(run_id: &str, store_scope: &str, embedding_mode: &str) -> Self {
        Self {
            run_id: run_id.to_string(),
            store_scope: store_scope.to_string(),
            embedding_mode: embedding_mode.to_string(),
            ..Default::default()
        }
    }

    pub fn record_phase(&mut self, phase: &str, elapsed: Duration) {
        self.phase_times.insert(phase.to_string(), elapsed);
    }

    pub fn total_time(&self) -> Duration {
        self.phase_times.values().sum()
    }

    pub fn log_summary(&self) {
        info!("=== Consolidation Summary (run {}) ===", self.run_id);
        info!("  Store scope: {}", self.store_scope);
        info!("  Embedding mode: {}", self.embedding_mode);
        info!(
            "  Records: {} read, {} excluded (unlisted), {} embedded",
            self.records_read, self.records_excluded, self.records_embedded
        );
        info!("  Embedding dimension: {}", self.embedding_dimension);
        info!("  Clusters: {}", self.clusters);
        info!(
            "  Output: {} products, {} variants, {} seller offers",
            self.consolidated_products, self.variants, self.offers
        );
        for (phase, elapsed) in &self.phase_times {
            info!("  {}: {:.2?}", phase, elapsed);
        }
        info!("  Total: {:.2?}", self.total_time());
    }
}
