// src/bin/run_enrichment.rs
//
// Enrichment-only entry point. Reads previously written cluster and batch
// artifacts and runs (or resumes) website enrichment against them, without
// re-ingesting or re-clustering. Useful after a crash, to retry failed
// clusters, or to run enrichment on a different machine than clustering.

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use resolver_lib::artifacts::{read_batch_artifacts, CsvRecordStore, RecordStore};
use resolver_lib::config::PipelineConfig;
use resolver_lib::enrichment::{
    run_enrichment, EnrichmentOptions, HttpPageFetch, HttpSearch, PageFetch,
};
use resolver_lib::utils::env::load_env;
use resolver_lib::utils::progress::progress_callback::create_log_callback;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;

#[derive(Debug, Parser)]
#[command(
    name = "run_enrichment",
    about = "Run or resume website enrichment from existing batch artifacts"
)]
struct Args {
    /// Artifact directory produced by the resolver pipeline.
    #[arg(long, default_value = "./enrichment_artifacts")]
    output_dir: PathBuf,

    /// Reprocess clusters that previously ended in error or unverified.
    #[arg(long)]
    retry_failed: bool,

    /// Concurrent enrichment workers (overrides RESOLVER_WORKERS).
    #[arg(long)]
    workers: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    load_env();

    let args = Args::parse();

    let mut config = PipelineConfig::from_env();
    if let Some(workers) = args.workers {
        config.worker_count = workers;
    }
    config.validate().context("Invalid pipeline configuration")?;
    config.log_config();

    let batch_dir = args.output_dir.join("batches");
    let (batches, clusters) = read_batch_artifacts(&batch_dir)
        .with_context(|| format!("Failed to read batch artifacts from {}", batch_dir.display()))?;
    info!(
        "Loaded {} batches covering {} clusters from {}",
        batches.len(),
        clusters.len(),
        batch_dir.display()
    );

    let search = Arc::new(
        HttpSearch::new(config.search_endpoint.clone(), config.search_timeout_secs)
            .context("Failed to initialize search client")?,
    );
    let page_fetch: Option<Arc<dyn PageFetch>> = if config.fetch_pages {
        Some(Arc::new(
            HttpPageFetch::new(config.search_timeout_secs)
                .context("Failed to initialize page fetcher")?,
        ))
    } else {
        None
    };
    let store: Arc<Mutex<dyn RecordStore>> = Arc::new(Mutex::new(CsvRecordStore::new(
        args.output_dir.join("enriched.csv"),
    )));

    let start = Instant::now();
    let stats = run_enrichment(
        batches,
        &clusters,
        search,
        page_fetch,
        store,
        &config,
        EnrichmentOptions {
            retry_failed: args.retry_failed,
        },
        Some(create_log_callback()),
        None,
    )
    .await
    .context("Enrichment failed")?;

    info!("=== Enrichment Summary ===");
    info!(
        "Processed {} clusters ({} skipped from previous run) in {:.2?}",
        stats.clusters_processed,
        stats.clusters_skipped_resume,
        start.elapsed()
    );
    info!(
        "Statuses: {} verified, {} unverified, {} no_candidate, {} error",
        stats.verified, stats.unverified, stats.no_candidate, stats.error
    );
    info!(
        "Average confidence: {:.3} ({} search retries)",
        stats.avg_confidence, stats.search_retries
    );
    Ok(())
}
