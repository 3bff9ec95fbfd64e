// src/batching.rs - Deterministic partitioning of clusters into enrichment batches

use crate::error::{ResolveError, ResolveResult};
use crate::models::core::{Batch, Cluster};
use log::info;

/// Partition clusters into batches of at most `max_batch_size`.
///
/// Clusters are ordered by cluster id before chunking, so batch contents and
/// batch id assignment are reproducible for the same cluster set regardless
/// of the order clusters arrive in. Every cluster lands in exactly one batch.
pub fn make_batches(clusters: &[Cluster], max_batch_size: usize) -> ResolveResult<Vec<Batch>> {
    if max_batch_size < 1 {
        return Err(ResolveError::Configuration(
            "max batch size must be at least 1".to_string(),
        ));
    }

    let mut ordered: Vec<&str> = clusters.iter().map(|c| c.cluster_id.as_str()).collect();
    ordered.sort_unstable();

    let batches: Vec<Batch> = ordered
        .chunks(max_batch_size)
        .enumerate()
        .map(|(idx, chunk)| Batch {
            batch_id: idx as u32 + 1,
            cluster_ids: chunk.iter().map(|id| id.to_string()).collect(),
        })
        .collect();

    info!(
        "Batching: {} clusters -> {} batches (max size {})",
        clusters.len(),
        batches.len(),
        max_batch_size
    );
    Ok(batches)
}
