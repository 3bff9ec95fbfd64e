// src/enrichment/orchestrator.rs - Batch-by-batch enrichment with resume support

use crate::artifacts::RecordStore;
use crate::config::PipelineConfig;
use crate::enrichment::scoring::{score_candidate, select_best};
use crate::enrichment::search::{search_query, search_with_retries, CandidateSearch, PageFetch};
use crate::error::{ResolveError, ResolveResult};
use crate::models::core::{Batch, Cluster, ClusterStatus, EnrichedCluster};
use crate::models::stats::EnrichmentStats;
use crate::report_progress;
use crate::utils::progress::progress_callback::ProgressCallback;
use futures::future::join_all;
use log::{info, warn};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};

/// Caller-facing knobs for one enrichment pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnrichmentOptions {
    /// Reprocess clusters left in `error` or `unverified` by a previous
    /// run. Terminal rows (`verified`, `no_candidate`) are always skipped.
    pub retry_failed: bool,
}

/// Enrich one cluster: search, fetch page evidence, score, select. A search
/// failure after retries becomes an `error` row for this cluster only; a
/// failed page fetch just costs that candidate its page evidence.
async fn enrich_cluster(
    cluster: &Cluster,
    search: &dyn CandidateSearch,
    page_fetch: Option<&dyn PageFetch>,
    config: &PipelineConfig,
) -> (EnrichedCluster, u32) {
    let query = search_query(&cluster.representative_name);
    match search_with_retries(
        search,
        &query,
        config.max_search_results,
        config.search_retries,
        config.backoff_base_ms,
    )
    .await
    {
        Ok((hits, retries)) => {
            let mut candidates = Vec::with_capacity(hits.len());
            for hit in &hits {
                let page_text = match page_fetch {
                    Some(fetcher) => fetcher.fetch_text(&hit.url).await,
                    None => None,
                };
                if let Some(candidate) = score_candidate(
                    &cluster.cluster_id,
                    &cluster.representative_name,
                    hit,
                    page_text.as_deref(),
                    config,
                ) {
                    candidates.push(candidate);
                }
            }
            let selection = select_best(candidates, config.accept_threshold);
            let (chosen_url, confidence) = match &selection.chosen {
                Some(candidate) if selection.status != ClusterStatus::NoCandidate => {
                    (Some(candidate.url.clone()), candidate.score)
                }
                _ => (None, 0.0),
            };
            (
                EnrichedCluster {
                    cluster_id: cluster.cluster_id.clone(),
                    representative_name: cluster.representative_name.clone(),
                    chosen_url,
                    confidence,
                    status: selection.status,
                },
                retries,
            )
        }
        Err(e) => {
            warn!(
                "Enrichment: cluster {} ('{}') downgraded to error: {}",
                cluster.cluster_id, cluster.representative_name, e
            );
            (
                EnrichedCluster {
                    cluster_id: cluster.cluster_id.clone(),
                    representative_name: cluster.representative_name.clone(),
                    chosen_url: None,
                    confidence: 0.0,
                    status: ClusterStatus::Error,
                },
                config.search_retries,
            )
        }
    }
}

/// Drive the enrichment pipeline over all batches.
///
/// Batches are independent and run on a bounded worker pool; within a batch
/// clusters are processed sequentially. The output store and the done
/// counter are the only shared mutable state, and all writes go through the
/// synchronized append path. Resumability is read once, before any worker
/// starts.
///
/// A single cluster's failure never halts its batch, and one batch's retry
/// exhaustion never halts the others. The cancellation flag is honored at
/// batch and per-cluster boundaries; rows already appended stay intact for
/// a later resume.
pub async fn run_enrichment(
    batches: Vec<Batch>,
    clusters: &[Cluster],
    search: Arc<dyn CandidateSearch>,
    page_fetch: Option<Arc<dyn PageFetch>>,
    store: Arc<Mutex<dyn RecordStore>>,
    config: &PipelineConfig,
    options: EnrichmentOptions,
    progress_callback: Option<ProgressCallback>,
    cancel_flag: Option<Arc<AtomicBool>>,
) -> ResolveResult<EnrichmentStats> {
    let cluster_map: Arc<HashMap<String, Cluster>> = Arc::new(
        clusters
            .iter()
            .map(|c| (c.cluster_id.clone(), c.clone()))
            .collect(),
    );

    // Read prior output once, before any worker starts. Later rows win when
    // a cluster was reprocessed in an earlier resumed run.
    let existing_rows = store.lock().await.read_all()?;
    let mut existing: HashMap<String, ClusterStatus> = HashMap::new();
    for row in &existing_rows {
        if !cluster_map.contains_key(&row.cluster_id) {
            return Err(ResolveError::ResumeConflict(format!(
                "output artifact references cluster {} ('{}') not present in the current \
                 cluster set; refusing to resume against mismatched data",
                row.cluster_id, row.representative_name
            )));
        }
        existing.insert(row.cluster_id.clone(), row.status);
    }

    let skip: HashSet<&String> = existing
        .iter()
        .filter(|(_, status)| status.is_terminal() || !options.retry_failed)
        .map(|(id, _)| id)
        .collect();
    let skipped_count: usize = batches
        .iter()
        .flat_map(|b| &b.cluster_ids)
        .filter(|id| skip.contains(id))
        .count();
    let total: usize = batches
        .iter()
        .flat_map(|b| &b.cluster_ids)
        .filter(|id| !skip.contains(id))
        .count();
    let skip: Arc<HashSet<String>> = Arc::new(skip.into_iter().cloned().collect());

    info!(
        "Enrichment: {} clusters to process across {} batches ({} skipped from previous run)",
        total,
        batches.len(),
        skipped_count
    );

    let semaphore = Arc::new(Semaphore::new(config.worker_count));
    let done = Arc::new(AtomicUsize::new(0));
    let mut handles = Vec::with_capacity(batches.len());

    for batch in batches {
        let semaphore = Arc::clone(&semaphore);
        let cluster_map = Arc::clone(&cluster_map);
        let skip = Arc::clone(&skip);
        let search = Arc::clone(&search);
        let page_fetch = page_fetch.clone();
        let store = Arc::clone(&store);
        let done = Arc::clone(&done);
        let config = config.clone();
        let progress_callback = progress_callback.clone();
        let cancel_flag = cancel_flag.clone();

        handles.push(tokio::spawn(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .map_err(|e| ResolveError::TransientEnrichment(e.to_string()))?;
            let mut stats = EnrichmentStats::default();

            let cancelled =
                || cancel_flag.as_ref().map(|f| f.load(Ordering::SeqCst)).unwrap_or(false);
            if cancelled() {
                info!("Enrichment: batch {} skipped, cancellation requested", batch.batch_id);
                return Ok::<EnrichmentStats, ResolveError>(stats);
            }

            let mut confidence_sum = 0.0;
            for cluster_id in &batch.cluster_ids {
                if cancelled() {
                    info!(
                        "Enrichment: batch {} stopping early, cancellation requested",
                        batch.batch_id
                    );
                    break;
                }
                if skip.contains(cluster_id) {
                    continue;
                }
                let cluster = match cluster_map.get(cluster_id) {
                    Some(cluster) => cluster,
                    None => {
                        warn!(
                            "Enrichment: batch {} references unknown cluster {}",
                            batch.batch_id, cluster_id
                        );
                        continue;
                    }
                };

                let (row, retries) =
                    enrich_cluster(cluster, search.as_ref(), page_fetch.as_deref(), &config).await;
                confidence_sum += row.confidence;
                stats.search_retries += retries as usize;
                stats.record_status(row.status);
                store.lock().await.append(&row)?;

                let done_now = done.fetch_add(1, Ordering::SeqCst) + 1;
                report_progress!(progress_callback, done_now, total, batch.batch_id);
            }

            if stats.clusters_processed > 0 {
                stats.avg_confidence = confidence_sum / stats.clusters_processed as f64;
            }
            Ok(stats)
        }));
    }

    let mut merged = EnrichmentStats {
        clusters_skipped_resume: skipped_count,
        ..Default::default()
    };
    for result in join_all(handles).await {
        let stats = result
            .map_err(|e| ResolveError::TransientEnrichment(format!("worker failed: {}", e)))??;
        merged.merge(&stats);
    }

    // Retried clusters append a superseding row; compact so the artifact
    // goes back to one row per cluster. First append order is kept.
    if options.retry_failed && merged.clusters_processed > 0 {
        let mut guard = store.lock().await;
        let rows = guard.read_all()?;
        let row_count = rows.len();
        let mut order: Vec<String> = Vec::new();
        let mut latest: HashMap<String, EnrichedCluster> = HashMap::new();
        for row in rows {
            if !latest.contains_key(&row.cluster_id) {
                order.push(row.cluster_id.clone());
            }
            latest.insert(row.cluster_id.clone(), row);
        }
        if latest.len() < row_count {
            let compacted: Vec<_> = order.iter().filter_map(|id| latest.remove(id)).collect();
            guard.rewrite(&compacted)?;
            info!(
                "Enrichment: compacted output artifact from {} to {} rows",
                row_count,
                compacted.len()
            );
        }
    }

    info!(
        "Enrichment: {} processed ({} verified, {} unverified, {} no_candidate, {} error)",
        merged.clusters_processed,
        merged.verified,
        merged.unverified,
        merged.no_candidate,
        merged.error
    );
    Ok(merged)
}
