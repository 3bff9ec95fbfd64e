// src/models/stats.rs - Run-level statistics and summaries

use crate::models::core::ClusterStatus;
use chrono::NaiveDateTime;
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;

/// Aggregate statistics for one enrichment pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EnrichmentStats {
    pub clusters_processed: usize,
    pub clusters_skipped_resume: usize,
    pub verified: usize,
    pub unverified: usize,
    pub no_candidate: usize,
    pub error: usize,
    pub search_retries: usize,
    pub avg_confidence: f64,
}

impl EnrichmentStats {
    pub fn record_status(&mut self, status: ClusterStatus) {
        match status {
            ClusterStatus::Verified => self.verified += 1,
            ClusterStatus::Unverified => self.unverified += 1,
            ClusterStatus::NoCandidate => self.no_candidate += 1,
            ClusterStatus::Error => self.error += 1,
        }
        self.clusters_processed += 1;
    }

    pub fn merge(&mut self, other: &EnrichmentStats) {
        let total = self.clusters_processed + other.clusters_processed;
        if total > 0 {
            self.avg_confidence = (self.avg_confidence * self.clusters_processed as f64
                + other.avg_confidence * other.clusters_processed as f64)
                / total as f64;
        }
        self.clusters_processed = total;
        self.clusters_skipped_resume += other.clusters_skipped_resume;
        self.verified += other.verified;
        self.unverified += other.unverified;
        self.no_candidate += other.no_candidate;
        self.error += other.error;
        self.search_retries += other.search_retries;
    }
}

/// Statistics for a full pipeline run, populated phase by phase and
/// written out as the run-summary artifact.
#[derive(Debug, Clone, Serialize)]
pub struct RunStats {
    pub run_id: String,
    pub run_timestamp: NaiveDateTime,
    pub total_records: usize,
    pub dropped_records: usize,
    pub total_clusters: usize,
    pub total_batches: usize,
    pub enrichment: EnrichmentStats,
    pub phase_times: HashMap<String, Duration>,
}

impl RunStats {
    pub fn new(run_id: String, run_timestamp: NaiveDateTime) -> Self {
        Self {
            run_id,
            run_timestamp,
            total_records: 0,
            dropped_records: 0,
            total_clusters: 0,
            total_batches: 0,
            enrichment: EnrichmentStats::default(),
            phase_times: HashMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_status_updates_counts() {
        let mut stats = EnrichmentStats::default();
        stats.record_status(ClusterStatus::Verified);
        stats.record_status(ClusterStatus::Verified);
        stats.record_status(ClusterStatus::Error);
        assert_eq!(stats.verified, 2);
        assert_eq!(stats.error, 1);
        assert_eq!(stats.clusters_processed, 3);
    }

    #[test]
    fn merge_combines_weighted_confidence() {
        let mut a = EnrichmentStats {
            clusters_processed: 2,
            avg_confidence: 0.8,
            ..Default::default()
        };
        let b = EnrichmentStats {
            clusters_processed: 2,
            avg_confidence: 0.4,
            ..Default::default()
        };
        a.merge(&b);
        assert_eq!(a.clusters_processed, 4);
        assert!((a.avg_confidence - 0.6).abs() < 1e-9);
    }
}
