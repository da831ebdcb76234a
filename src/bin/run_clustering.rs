// src/bin/run_clustering.rs
// Embeds one store's names once and reports cluster quality for several
// DBSCAN radii. Never writes to the store.

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::{info, warn};
use std::time::Instant;

use dedupe_lib::clustering::{cluster_embeddings, evaluate_clusters, DbscanParams};
use dedupe_lib::embedding::{build_provider, EmbeddingMode};
use dedupe_lib::matching::normalize::{load_stopwords, normalize_product_names, portuguese_stopwords};
use dedupe_lib::models::ProductRecord;
use dedupe_lib::store::{open_store, read_normalized_rows};
use dedupe_lib::utils::env::load_env;
use dedupe_lib::utils::pipeline_config::PipelineConfig;
use dedupe_lib::utils::progress_config::ProgressConfig;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct ClusteringArgs {
    /// Store scope to evaluate
    #[arg(long)]
    store: String,

    /// Embedding strategy; defaults to EMBEDDING_MODE
    #[arg(long, value_enum)]
    mode: Option<EmbeddingMode>,

    /// Comma-separated radii to try; defaults to CLUSTER_EPS
    #[arg(long, value_delimiter = ',')]
    eps: Vec<f64>,

    /// Minimum neighbourhood size; defaults to CLUSTER_MIN_SAMPLES
    #[arg(long)]
    min_samples: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    load_env();
    let args = ClusteringArgs::parse();

    let config = PipelineConfig::from_env().context("Invalid pipeline configuration")?;
    config.log_config();
    let mode = args.mode.unwrap_or(config.embedding.default_mode);
    let min_samples = args.min_samples.unwrap_or(config.clustering.min_samples).max(1);
    let radii = if args.eps.is_empty() {
        vec![config.clustering.eps]
    } else {
        args.eps.clone()
    };
    if let Some(bad) = radii.iter().find(|e| !(**e > 0.0 && **e <= 2.0)) {
        bail!("eps must be in (0, 2], got {}", bad);
    }

    let stopwords = match &config.stopwords_path {
        Some(path) => load_stopwords(path)?,
        None => portuguese_stopwords().clone(),
    };

    let store = open_store(&config.store).await?;
    let rows = read_normalized_rows(store.as_ref(), &args.store).await?;
    let records = rows
        .into_iter()
        .enumerate()
        .map(|(i, row)| ProductRecord::from_row(i, row))
        .collect::<Result<Vec<_>, _>>()?;
    let total = records.len();
    let records: Vec<ProductRecord> = records.into_iter().filter(|r| !r.is_unlisted()).collect();
    info!(
        "Read {} records for '{}', {} after excluding unlisted",
        total,
        args.store,
        records.len()
    );

    let names: Vec<String> = records.iter().map(|r| r.name.clone()).collect();
    let names = normalize_product_names(&names, &stopwords);

    let progress_config = ProgressConfig::from_env();
    let multi_progress = progress_config.create_multi_progress();
    let embed_progress = progress_config.detailed_multi_progress(&multi_progress);
    let embedding_config = config.embedding.clone();

    let start = Instant::now();
    let embeddings = tokio::task::spawn_blocking(move || -> Result<_> {
        let provider = build_provider(mode, &embedding_config, embed_progress)?;
        Ok(provider.embed(&names)?)
    })
    .await
    .context("Embedding task panicked")??;
    info!(
        "Embedded {} names ({} dimensions) in {:.2?}",
        embeddings.nrows(),
        embeddings.ncols(),
        start.elapsed()
    );

    info!("=== Radius sweep (min_samples={}) ===", min_samples);
    for eps in radii {
        let params = DbscanParams { eps, min_samples };
        let start = Instant::now();
        let labels = cluster_embeddings(embeddings.view(), &params);
        let report = evaluate_clusters(embeddings.view(), &labels);
        let fmt_score = |s: Option<f64>| s.map(|v| format!("{:.3}", v)).unwrap_or_else(|| "n/a".to_string());
        info!(
            "eps={:<8} clusters={:<6} noise={:<6} silhouette={:<6} davies_bouldin={:<6} ({:.2?})",
            eps,
            report.n_clusters,
            report.n_noise,
            fmt_score(report.silhouette),
            fmt_score(report.davies_bouldin),
            start.elapsed()
        );
        if report.is_degenerate() {
            warn!("eps={} yields too few clusters to score", eps);
        }
    }

    Ok(())
}
