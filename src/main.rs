// src/main.rs

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use std::sync::Arc;
use std::time::Instant;

use dedupe_lib::embedding::{build_provider, EmbeddingMode};
use dedupe_lib::matching::normalize::{load_stopwords, portuguese_stopwords};
use dedupe_lib::pipeline::{self, Consolidator, RunContext, PIPELINE_PHASES};
use dedupe_lib::store::open_store;
use dedupe_lib::utils::env::load_env;
use dedupe_lib::utils::get_memory_usage;
use dedupe_lib::utils::pipeline_config::PipelineConfig;
use dedupe_lib::utils::progress_config::{phase_progress_bar, ProgressConfig};

/// Consolidates one store's normalized listings into the product catalog.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Store scope to consolidate (e.g. a retailer slug)
    #[arg(long)]
    store: String,

    /// Embedding strategy; defaults to EMBEDDING_MODE
    #[arg(long, value_enum)]
    mode: Option<EmbeddingMode>,

    /// Compute and report without writing the consolidated layer
    #[arg(long, default_value_t = false)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    load_env();
    let args = Args::parse();
    info!("Starting product consolidation for store '{}'", args.store);

    let config = PipelineConfig::from_env().context("Invalid pipeline configuration")?;
    config.log_config();
    let mode = args.mode.unwrap_or(config.embedding.default_mode);

    let progress_config = ProgressConfig::from_env();
    info!(
        "Progress tracking: enabled={}, detailed={}",
        progress_config.enabled, progress_config.detailed
    );
    let multi_progress = progress_config.create_multi_progress();
    let main_pb = multi_progress.as_ref().map(|mp| {
        let pb = phase_progress_bar(mp, PIPELINE_PHASES);
        pb.set_message("Loading embedding model...");
        pb
    });

    let stopwords = match &config.stopwords_path {
        Some(path) => load_stopwords(path)?,
        None => portuguese_stopwords().clone(),
    };

    let start = Instant::now();
    let embedding_config = config.embedding.clone();
    let embed_progress = progress_config.detailed_multi_progress(&multi_progress);
    let provider = tokio::task::spawn_blocking(move || {
        build_provider(mode, &embedding_config, embed_progress)
    })
    .await
    .context("Model loading task panicked")?
    .context("Failed to load embedding model")?;
    info!(
        "Loaded {} provider ({} dimensions) in {:.2?}",
        provider.mode(),
        provider.dimension(),
        start.elapsed()
    );

    let consolidator = Arc::new(Consolidator::new(
        provider,
        stopwords,
        config.clustering,
    ));

    let store = open_store(&config.store).await?;
    let ctx = RunContext::new(&args.store, mode);
    info!("Run {} started at {}", ctx.run_id, ctx.started_at);

    let output = if args.dry_run {
        info!("Dry run: the consolidated layer will not be written");
        pipeline::process(store.as_ref(), consolidator, &ctx, main_pb.clone()).await?
    } else {
        pipeline::run(store.as_ref(), consolidator, &ctx, main_pb.clone()).await?
    };

    if let Some(pb) = &main_pb {
        pb.finish_with_message("Consolidation complete");
    }

    output.stats.log_summary();
    if progress_config.should_show_memory() {
        info!("Final memory usage: {} MB", get_memory_usage().await);
    }

    info!("Consolidation completed successfully!");
    Ok(())
}
