// src/models/core.rs - Core data model for name resolution and enrichment

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// A single input row as ingested from the source CSV. Immutable after ingest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    pub id: u64,
    pub raw_name: String,
    /// Optional source metadata (e.g. originating file or column).
    pub source: Option<String>,
}

/// A raw record annotated with its normalization output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    pub record: RawRecord,
    /// Canonical comparison key used for clustering. Empty string is the
    /// sentinel for unclusterable input.
    pub canonical_key: String,
    /// Light normalization preserving word order, used for display and
    /// search query construction.
    pub display_name: String,
}

impl NormalizedRecord {
    pub fn is_unclusterable(&self) -> bool {
        self.canonical_key.is_empty()
    }
}

/// A group of raw records believed to denote the same company.
///
/// `cluster_id` is a deterministic function of the representative name (plus
/// the sole member id for unclusterable singletons), never of arrival order,
/// so reruns on the same input produce identical ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    pub cluster_id: String,
    pub representative_name: String,
    pub canonical_key: String,
    pub member_ids: BTreeSet<u64>,
}

impl Cluster {
    pub fn member_count(&self) -> usize {
        self.member_ids.len()
    }
}

/// A checkpointable unit of clusters processed together during enrichment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    pub batch_id: u32,
    pub cluster_ids: Vec<String>,
}

/// One raw result from the external search capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub url: String,
    pub title: String,
    pub snippet: String,
}

/// Named sub-scores combined into a candidate's final score.
///
/// A fixed struct rather than an ad hoc map, so the weight configuration is
/// validated once against these fields instead of at every scoring call.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SignalScores {
    /// Share of name tokens found in the candidate title and snippet.
    pub token_overlap: f64,
    /// Similarity between the compacted company name and the domain label.
    pub domain_match: f64,
    /// 1.0 for ordinary domains, 0.0 for denylisted aggregators.
    pub reputable_domain: f64,
}

/// A prospective website URL with its computed evidence. Ephemeral: produced
/// and consumed within a single enrichment pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub cluster_id: String,
    pub url: String,
    pub domain: String,
    pub title: String,
    pub snippet: String,
    pub score: f64,
    pub evidence: SignalScores,
}

/// Terminal enrichment status of a cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterStatus {
    Verified,
    Unverified,
    NoCandidate,
    Error,
}

impl ClusterStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClusterStatus::Verified => "verified",
            ClusterStatus::Unverified => "unverified",
            ClusterStatus::NoCandidate => "no_candidate",
            ClusterStatus::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "verified" => Some(ClusterStatus::Verified),
            "unverified" => Some(ClusterStatus::Unverified),
            "no_candidate" => Some(ClusterStatus::NoCandidate),
            "error" => Some(ClusterStatus::Error),
            _ => None,
        }
    }

    /// Terminal statuses are never reprocessed on resume; `Error` and
    /// `Unverified` rows are retried only when explicitly requested.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ClusterStatus::Verified | ClusterStatus::NoCandidate)
    }
}

impl fmt::Display for ClusterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal output record: one row per cluster in the enriched artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedCluster {
    pub cluster_id: String,
    pub representative_name: String,
    pub chosen_url: Option<String>,
    pub confidence: f64,
    pub status: ClusterStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            ClusterStatus::Verified,
            ClusterStatus::Unverified,
            ClusterStatus::NoCandidate,
            ClusterStatus::Error,
        ] {
            assert_eq!(ClusterStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(ClusterStatus::parse("bogus"), None);
    }

    #[test]
    fn terminal_statuses() {
        assert!(ClusterStatus::Verified.is_terminal());
        assert!(ClusterStatus::NoCandidate.is_terminal());
        assert!(!ClusterStatus::Unverified.is_terminal());
        assert!(!ClusterStatus::Error.is_terminal());
    }
}
