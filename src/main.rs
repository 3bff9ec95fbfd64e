use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use log::info;
use resolver_lib::artifacts::{
    read_raw_records, write_batch_artifacts, write_cluster_artifact, write_run_summary,
    CsvRecordStore, RecordStore,
};
use resolver_lib::batching::make_batches;
use resolver_lib::clustering::cluster_records;
use resolver_lib::config::PipelineConfig;
use resolver_lib::enrichment::{
    run_enrichment, EnrichmentOptions, HttpPageFetch, HttpSearch, PageFetch,
};
use resolver_lib::models::core::NormalizedRecord;
use resolver_lib::models::stats::RunStats;
use resolver_lib::normalize::Normalizer;
use resolver_lib::utils::get_memory_usage;
use resolver_lib::utils::progress::progress_callback::{create_log_callback, ProgressCallback};
use resolver_lib::utils::progress::progress_config::ProgressConfig;
use resolver_lib::utils::{env::load_env, progress::progress_callback::ProgressUpdate};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Company name resolution and website enrichment pipeline.
#[derive(Debug, Parser)]
#[command(name = "resolver", about = "Normalize, cluster, and enrich company names")]
struct Args {
    /// Input CSV of raw company names.
    input: PathBuf,

    /// Directory for cluster, batch, and enrichment artifacts.
    #[arg(long, default_value = "./enrichment_artifacts")]
    output_dir: PathBuf,

    /// Header of the column holding company names (defaults to the first column).
    #[arg(long)]
    name_column: Option<String>,

    /// Reprocess clusters that previously ended in error or unverified.
    #[arg(long)]
    retry_failed: bool,

    /// Concurrent enrichment workers (overrides RESOLVER_WORKERS).
    #[arg(long)]
    workers: Option<usize>,
}

fn make_progress_callback(
    multi_progress: &Option<MultiProgress>,
    progress_config: &ProgressConfig,
) -> Option<ProgressCallback> {
    let mp = match multi_progress {
        Some(mp) if progress_config.should_show_detailed() => mp,
        Some(_) | None => return Some(create_log_callback()),
    };
    let pb = mp.add(ProgressBar::new(0));
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
            .unwrap()
            .progress_chars("█▉▊▋▌▍▎▏  "),
    );
    Some(Arc::new(move |update: ProgressUpdate| {
        pb.set_length(update.clusters_total as u64);
        pb.set_position(update.clusters_done as u64);
        pb.set_message(format!("batch {}", update.batch_id));
    }))
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    info!("Starting company name resolution and enrichment pipeline");
    load_env();

    let args = Args::parse();

    let mut config = PipelineConfig::from_env();
    if let Some(workers) = args.workers {
        config.worker_count = workers;
    }
    config.validate().context("Invalid pipeline configuration")?;
    config.log_config();

    let progress_config = Arc::new(ProgressConfig::from_env());
    info!(
        "Progress tracking: enabled={}, detailed={}",
        progress_config.enabled, progress_config.detailed
    );
    let multi_progress = progress_config.create_multi_progress();

    let main_pb = multi_progress.as_ref().map(|mp| {
        let pb = mp.add(ProgressBar::new(4));
        pb.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}",
                )
                .unwrap()
                .progress_chars("█▉▊▋▌▍▎▏  "),
        );
        pb.set_message("Initializing pipeline...");
        pb
    });

    let run_id = Uuid::new_v4().to_string();
    let mut stats = RunStats::new(run_id.clone(), Utc::now().naive_utc());
    info!("Run ID: {}", run_id);

    // Phase 1: Ingest and normalize
    if let Some(pb) = &main_pb {
        pb.set_message("Phase 1: Ingest and normalize");
    }
    let phase1_start = Instant::now();

    let (records, dropped) = read_raw_records(&args.input, args.name_column.as_deref())
        .context("Failed to read input CSV")?;
    stats.total_records = records.len();
    stats.dropped_records = dropped;

    let normalizer = Normalizer::from_config(&config);
    let normalized: Vec<NormalizedRecord> = records
        .iter()
        .map(|r| normalizer.normalize_record(r.clone()))
        .collect();

    let phase1_duration = phase1_start.elapsed();
    stats
        .phase_times
        .insert("ingest_and_normalize".to_string(), phase1_duration);
    info!(
        "Phase 1 complete: {} records normalized ({} blank rows dropped) in {:.2?}",
        normalized.len(),
        dropped,
        phase1_duration
    );

    // Phase 2: Cluster
    if let Some(pb) = &main_pb {
        pb.inc(1);
        pb.set_message("Phase 2: Clustering");
    }
    let phase2_start = Instant::now();

    let clusters = cluster_records(&normalized, &config);
    stats.total_clusters = clusters.len();

    let cluster_artifact = args.output_dir.join("clusters.csv");
    write_cluster_artifact(&cluster_artifact, &clusters, &records)
        .context("Failed to write cluster artifact")?;

    let phase2_duration = phase2_start.elapsed();
    stats
        .phase_times
        .insert("clustering".to_string(), phase2_duration);
    info!(
        "Phase 2 complete: {} clusters from {} records in {:.2?}",
        clusters.len(),
        normalized.len(),
        phase2_duration
    );

    // Phase 3: Batch
    if let Some(pb) = &main_pb {
        pb.inc(1);
        pb.set_message("Phase 3: Batching");
    }
    let phase3_start = Instant::now();

    let batches =
        make_batches(&clusters, config.max_batch_size).context("Failed to assign batches")?;
    stats.total_batches = batches.len();

    let batch_dir = args.output_dir.join("batches");
    write_batch_artifacts(&batch_dir, &batches, &clusters, &records)
        .context("Failed to write batch artifacts")?;

    let phase3_duration = phase3_start.elapsed();
    stats
        .phase_times
        .insert("batching".to_string(), phase3_duration);
    info!(
        "Phase 3 complete: {} batches written to {} in {:.2?}",
        batches.len(),
        batch_dir.display(),
        phase3_duration
    );

    // Phase 4: Enrich
    if let Some(pb) = &main_pb {
        pb.inc(1);
        pb.set_message("Phase 4: Enrichment");
    }
    let phase4_start = Instant::now();

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
    let progress_callback = make_progress_callback(&multi_progress, &progress_config);

    stats.enrichment = run_enrichment(
        batches,
        &clusters,
        search,
        page_fetch,
        store,
        &config,
        EnrichmentOptions {
            retry_failed: args.retry_failed,
        },
        progress_callback,
        None,
    )
    .await
    .context("Enrichment failed")?;

    let phase4_duration = phase4_start.elapsed();
    stats
        .phase_times
        .insert("enrichment".to_string(), phase4_duration);

    let summary_path = args.output_dir.join("run_summary.json");
    write_run_summary(&summary_path, &stats).context("Failed to write run summary")?;

    if let Some(pb) = &main_pb {
        pb.inc(1);
        pb.set_message(format!(
            "Pipeline complete: {} clusters enriched",
            stats.enrichment.clusters_processed
        ));
        pb.finish();
    }

    let total_time = phase1_duration + phase2_duration + phase3_duration + phase4_duration;

    info!("=== Pipeline Summary ===");
    info!("Run ID: {}", run_id);
    info!(
        "Records: {} read, {} blank dropped",
        stats.total_records, stats.dropped_records
    );
    info!("Clusters: {}", stats.total_clusters);
    info!("Batches: {}", stats.total_batches);
    info!(
        "Enrichment: {} processed, {} skipped (resume)",
        stats.enrichment.clusters_processed, stats.enrichment.clusters_skipped_resume
    );
    info!(
        "Statuses: {} verified, {} unverified, {} no_candidate, {} error",
        stats.enrichment.verified,
        stats.enrichment.unverified,
        stats.enrichment.no_candidate,
        stats.enrichment.error
    );
    info!(
        "Average confidence: {:.3} ({} search retries)",
        stats.enrichment.avg_confidence, stats.enrichment.search_retries
    );
    info!("=== Timing Breakdown ===");
    info!("Phase 1 (Ingest & Normalize): {:.2?}", phase1_duration);
    info!("Phase 2 (Clustering): {:.2?}", phase2_duration);
    info!("Phase 3 (Batching): {:.2?}", phase3_duration);
    info!("Phase 4 (Enrichment): {:.2?}", phase4_duration);
    info!("Total execution time: {:.2?}", total_time);

    if progress_config.should_show_memory() {
        let final_memory_mb = get_memory_usage().await;
        info!("Final memory usage: {} MB", final_memory_mb);
    }

    info!("Pipeline completed successfully!");
    Ok(())
}
