// src/pipeline.rs
//! One consolidation run over one store's normalized dataset:
//! validate → exclude unlisted → normalize names → embed → cluster →
//! evaluate → group into products, then a single write of the result.

use anyhow::{Context, Result};
use chrono::{NaiveDateTime, Utc};
use indicatif::ProgressBar;
use log::{debug, info};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use crate::clustering::{cluster_embeddings, evaluate_clusters, DbscanParams};
use crate::consolidation::group_variants;
use crate::embedding::{EmbeddingMode, EmbeddingProvider};
use crate::error::{EmbeddingError, PipelineError, PipelineResult};
use crate::matching::normalize::normalize_product_names;
use crate::models::stats_models::ConsolidationStats;
use crate::models::{ConsolidatedProduct, NormalizedRow, ProductRecord};
use crate::store::{self, ProductStore};

/// Number of `inc` calls a full run makes on the phase progress bar.
pub const PIPELINE_PHASES: u64 = 7;

/// Identifies one run. Passed explicitly to every stage instead of living in
/// process-wide state.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: String,
    pub store_scope: String,
    pub embedding_mode: EmbeddingMode,
    pub started_at: NaiveDateTime,
}

impl RunContext {
    pub fn new(store_scope: &str, embedding_mode: EmbeddingMode) -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            store_scope: store_scope.to_string(),
            embedding_mode,
            started_at: Utc::now().naive_utc(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConsolidationOutput {
    pub products: Vec<ConsolidatedProduct>,
    pub stats: ConsolidationStats,
}

/// The in-memory part of a run. Holds everything that stays fixed across
/// runs: the embedding provider, the stop-word set and clustering parameters.
pub struct Consolidator {
    provider: Arc<dyn EmbeddingProvider>,
    stopwords: HashSet<String>,
    params: DbscanParams,
}

impl Consolidator {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, stopwords: HashSet<String>, params: DbscanParams) -> Self {
        Self {
            provider,
            stopwords,
            params,
        }
    }

    /// Runs every in-memory stage over `rows`. Any error aborts the whole run;
    /// there is no partial output.
    pub fn consolidate(
        &self,
        ctx: &RunContext,
        rows: Vec<NormalizedRow>,
        progress: Option<&ProgressBar>,
    ) -> PipelineResult<ConsolidationOutput> {
        if self.provider.mode() != ctx.embedding_mode {
            return Err(PipelineError::InvariantViolation(format!(
                "run requested {} embeddings but the provider is {}",
                ctx.embedding_mode,
                self.provider.mode()
            )));
        }

        let mut stats = ConsolidationStats::new(&ctx.run_id, &ctx.store_scope, ctx.embedding_mode.as_str());
        stats.records_read = rows.len();
        let step = |msg: &str| {
            if let Some(pb) = progress {
                pb.inc(1);
                pb.set_message(msg.to_string());
            }
        };

        // Validation and exclusion
        let start = Instant::now();
        let records = rows
            .into_iter()
            .enumerate()
            .map(|(i, row)| ProductRecord::from_row(i, row))
            .collect::<PipelineResult<Vec<_>>>()?;
        let (records, excluded): (Vec<_>, Vec<_>) = records.into_iter().partition(|r| !r.is_unlisted());
        stats.records_excluded = excluded.len();
        if !excluded.is_empty() {
            info!(
                "[{}] Excluded {} unlisted records (price and old price both zero)",
                ctx.store_scope,
                excluded.len()
            );
        }
        stats.record_phase("Validation", start.elapsed());
        step("Normalizing names");

        let start = Instant::now();
        let raw_names: Vec<String> = records.iter().map(|r| r.name.clone()).collect();
        let names = normalize_product_names(&raw_names, &self.stopwords);
        stats.record_phase("Normalization", start.elapsed());
        step("Embedding names");

        let start = Instant::now();
        info!(
            "[{}] Embedding {} names with the {} provider",
            ctx.store_scope,
            names.len(),
            self.provider.mode()
        );
        let embeddings = self.provider.embed(&names)?;
        if embeddings.nrows() != records.len() {
            return Err(EmbeddingError::RowCountMismatch {
                expected: records.len(),
                actual: embeddings.nrows(),
            }
            .into());
        }
        if embeddings.ncols() != self.provider.dimension() {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.provider.dimension(),
                actual: embeddings.ncols(),
            }
            .into());
        }
        stats.records_embedded = embeddings.nrows();
        stats.embedding_dimension = embeddings.ncols();
        stats.record_phase("Embedding", start.elapsed());
        step("Clustering");

        let start = Instant::now();
        let labels = cluster_embeddings(embeddings.view(), &self.params);
        if labels.len() != records.len() {
            return Err(PipelineError::InvariantViolation(format!(
                "clustering returned {} labels for {} records",
                labels.len(),
                records.len()
            )));
        }
        stats.record_phase("Clustering", start.elapsed());
        step("Evaluating clusters");

        let start = Instant::now();
        let quality = evaluate_clusters(embeddings.view(), &labels);
        quality.log_report();
        stats.clusters = quality.n_clusters;
        stats.quality = Some(quality);
        stats.record_phase("Evaluation", start.elapsed());
        step("Grouping variants");

        let start = Instant::now();
        let products = group_variants(&records, &labels, embeddings.view())?;
        stats.consolidated_products = products.len();
        stats.variants = products.iter().map(|p| p.variations.len()).sum();
        stats.offers = products.iter().map(ConsolidatedProduct::offer_count).sum();
        if stats.offers != records.len() {
            return Err(PipelineError::InvariantViolation(format!(
                "{} offers produced from {} records",
                stats.offers,
                records.len()
            )));
        }
        stats.record_phase("Grouping", start.elapsed());
        step("Consolidated");

        debug!(
            "[{}] {} records → {} products",
            ctx.store_scope,
            records.len(),
            products.len()
        );
        Ok(ConsolidationOutput { products, stats })
    }
}

/// Reads the scope's normalized rows and consolidates them. Nothing is
/// written.
pub async fn process(
    store: &dyn ProductStore,
    consolidator: Arc<Consolidator>,
    ctx: &RunContext,
    progress: Option<ProgressBar>,
) -> Result<ConsolidationOutput> {
    store::validate_scope(&ctx.store_scope)?;

    let start = Instant::now();
    if let Some(pb) = &progress {
        pb.set_message("Reading normalized rows");
    }
    let rows = store::read_normalized_rows(store, &ctx.store_scope).await?;
    let read_time = start.elapsed();
    info!("[{}] Read {} normalized rows", ctx.store_scope, rows.len());

    let task_ctx = ctx.clone();
    let mut output = tokio::task::spawn_blocking(move || {
        consolidator.consolidate(&task_ctx, rows, progress.as_ref())
    })
    .await
    .context("Consolidation task panicked")?
    .with_context(|| format!("Consolidation failed for '{}'", ctx.store_scope))?;

    output.stats.record_phase("Read", read_time);
    Ok(output)
}

/// Writes the consolidated set for the run's scope. This is the only write a
/// run performs.
pub async fn load(
    store: &dyn ProductStore,
    ctx: &RunContext,
    products: &[ConsolidatedProduct],
) -> Result<()> {
    store::write_consolidated(store, &ctx.store_scope, products).await?;
    info!(
        "[{}] Loaded {} consolidated products",
        ctx.store_scope,
        products.len()
    );
    Ok(())
}

/// `process` followed by `load`.
pub async fn run(
    store: &dyn ProductStore,
    consolidator: Arc<Consolidator>,
    ctx: &RunContext,
    progress: Option<ProgressBar>,
) -> Result<ConsolidationOutput> {
    let mut output = process(store, consolidator, ctx, progress.clone()).await?;

    let start = Instant::now();
    if let Some(pb) = &progress {
        pb.set_message("Writing consolidated catalog");
    }
    load(store, ctx, &output.products).await?;
    output.stats.record_phase("Load", start.elapsed());
    if let Some(pb) = &progress {
        pb.inc(1);
    }
    Ok(output)
}
