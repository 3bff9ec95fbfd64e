// src/config.rs - Pipeline configuration, environment-driven with documented defaults

use crate::error::{ResolveError, ResolveResult};
use log::info;
use std::env;

const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.90;
const DEFAULT_ACCEPT_THRESHOLD: f64 = 0.70;
const DEFAULT_MAX_BATCH_SIZE: usize = 2000;
const DEFAULT_MAX_SEARCH_RESULTS: usize = 5;
const DEFAULT_SEARCH_RETRIES: u32 = 3;
const DEFAULT_BACKOFF_BASE_MS: u64 = 500;
const DEFAULT_SEARCH_TIMEOUT_SECS: u64 = 10;
const DEFAULT_SEARCH_ENDPOINT: &str = "http://127.0.0.1:8080/search";

const DEFAULT_LEGAL_SUFFIXES: [&str; 9] = [
    "inc",
    "incorporated",
    "llc",
    "ltd",
    "limited",
    "corp",
    "corporation",
    "co",
    "company",
];

/// Generic and aggregator domains that are never a company's official site.
const DEFAULT_DENYLIST_DOMAINS: [&str; 6] = [
    "linkedin.com",
    "facebook.com",
    "crunchbase.com",
    "bloomberg.com",
    "wikipedia.org",
    "youtube.com",
];

/// Weights for combining candidate evidence signals. Must sum to 1.0;
/// validated once at startup rather than at each scoring call.
#[derive(Debug, Clone, Copy)]
pub struct ScoringWeights {
    pub token_overlap: f64,
    pub domain_match: f64,
    pub reputable_domain: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            token_overlap: 0.5,
            domain_match: 0.3,
            reputable_domain: 0.2,
        }
    }
}

impl ScoringWeights {
    pub fn sum(&self) -> f64 {
        self.token_overlap + self.domain_match + self.reputable_domain
    }
}

/// Configuration surface for the whole pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Combined similarity at or above which two canonical keys merge.
    pub similarity_threshold: f64,
    /// Weight of token-set overlap vs. normalized edit distance when
    /// comparing canonical keys. The edit-distance weight is the complement.
    pub token_overlap_weight: f64,
    /// Legal-entity suffix tokens stripped from trailing position.
    pub legal_suffixes: Vec<String>,
    /// Maximum clusters per enrichment batch.
    pub max_batch_size: usize,
    /// Candidate score at or above which a cluster is `verified` (inclusive).
    pub accept_threshold: f64,
    /// Maximum hits requested per search query.
    pub max_search_results: usize,
    /// Retry attempts for transient search failures.
    pub search_retries: u32,
    /// Base delay for exponential retry backoff.
    pub backoff_base_ms: u64,
    /// Per-call timeout for search requests.
    pub search_timeout_secs: u64,
    /// SearXNG-compatible JSON search endpoint.
    pub search_endpoint: String,
    /// Whether to fetch candidate homepages for extra scoring evidence.
    pub fetch_pages: bool,
    /// Domains excluded from candidacy as official websites.
    pub denylist_domains: Vec<String>,
    /// Concurrent enrichment workers (batches in flight).
    pub worker_count: usize,
    pub weights: ScoringWeights,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            token_overlap_weight: 0.5,
            legal_suffixes: DEFAULT_LEGAL_SUFFIXES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            accept_threshold: DEFAULT_ACCEPT_THRESHOLD,
            max_search_results: DEFAULT_MAX_SEARCH_RESULTS,
            search_retries: DEFAULT_SEARCH_RETRIES,
            backoff_base_ms: DEFAULT_BACKOFF_BASE_MS,
            search_timeout_secs: DEFAULT_SEARCH_TIMEOUT_SECS,
            search_endpoint: DEFAULT_SEARCH_ENDPOINT.to_string(),
            fetch_pages: true,
            denylist_domains: DEFAULT_DENYLIST_DOMAINS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            worker_count: num_cpus::get().min(4),
            weights: ScoringWeights::default(),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_list(key: &str, default: Vec<String>) -> Vec<String> {
    match env::var(key) {
        Ok(v) if !v.trim().is_empty() => v
            .split(',')
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect(),
        _ => default,
    }
}

impl PipelineConfig {
    /// Create pipeline configuration from environment variables, falling
    /// back to documented defaults for anything unset.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            similarity_threshold: env_parse(
                "RESOLVER_SIMILARITY_THRESHOLD",
                defaults.similarity_threshold,
            ),
            token_overlap_weight: env_parse(
                "RESOLVER_TOKEN_OVERLAP_WEIGHT",
                defaults.token_overlap_weight,
            ),
            legal_suffixes: env_list("RESOLVER_LEGAL_SUFFIXES", defaults.legal_suffixes),
            max_batch_size: env_parse("RESOLVER_MAX_BATCH_SIZE", defaults.max_batch_size),
            accept_threshold: env_parse("RESOLVER_ACCEPT_THRESHOLD", defaults.accept_threshold),
            max_search_results: env_parse(
                "RESOLVER_MAX_SEARCH_RESULTS",
                defaults.max_search_results,
            ),
            search_retries: env_parse("RESOLVER_SEARCH_RETRIES", defaults.search_retries),
            backoff_base_ms: env_parse("RESOLVER_BACKOFF_BASE_MS", defaults.backoff_base_ms),
            search_timeout_secs: env_parse(
                "RESOLVER_SEARCH_TIMEOUT_SECS",
                defaults.search_timeout_secs,
            ),
            search_endpoint: env::var("RESOLVER_SEARCH_ENDPOINT")
                .unwrap_or(defaults.search_endpoint),
            fetch_pages: env_parse("RESOLVER_FETCH_PAGES", defaults.fetch_pages),
            denylist_domains: env_list("RESOLVER_DENYLIST_DOMAINS", defaults.denylist_domains),
            worker_count: env_parse("RESOLVER_WORKERS", defaults.worker_count),
            weights: ScoringWeights {
                token_overlap: env_parse(
                    "RESOLVER_WEIGHT_TOKEN_OVERLAP",
                    defaults.weights.token_overlap,
                ),
                domain_match: env_parse(
                    "RESOLVER_WEIGHT_DOMAIN_MATCH",
                    defaults.weights.domain_match,
                ),
                reputable_domain: env_parse(
                    "RESOLVER_WEIGHT_REPUTABLE_DOMAIN",
                    defaults.weights.reputable_domain,
                ),
            },
        }
    }

    /// Validate the configuration. Called before any processing starts so
    /// bad values abort the run up front.
    pub fn validate(&self) -> ResolveResult<()> {
        if !(0.0..=1.0).contains(&self.similarity_threshold) || self.similarity_threshold == 0.0 {
            return Err(ResolveError::Configuration(format!(
                "similarity threshold must be in (0.0, 1.0], got {}",
                self.similarity_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.token_overlap_weight) {
            return Err(ResolveError::Configuration(format!(
                "token overlap weight must be in [0.0, 1.0], got {}",
                self.token_overlap_weight
            )));
        }
        if !(0.0..=1.0).contains(&self.accept_threshold) {
            return Err(ResolveError::Configuration(format!(
                "acceptance threshold must be in [0.0, 1.0], got {}",
                self.accept_threshold
            )));
        }
        if self.max_batch_size < 1 {
            return Err(ResolveError::Configuration(
                "max batch size must be at least 1".to_string(),
            ));
        }
        if self.worker_count < 1 {
            return Err(ResolveError::Configuration(
                "worker count must be at least 1".to_string(),
            ));
        }
        let weight_sum = self.weights.sum();
        if (weight_sum - 1.0).abs() > 1e-9 {
            return Err(ResolveError::Configuration(format!(
                "scoring weights must sum to 1.0, got {}",
                weight_sum
            )));
        }
        Ok(())
    }

    pub fn log_config(&self) {
        info!(
            "Config: similarity_threshold={}, accept_threshold={}, max_batch_size={}, workers={}",
            self.similarity_threshold, self.accept_threshold, self.max_batch_size, self.worker_count
        );
        info!(
            "Config: search retries={}, backoff_base_ms={}, timeout={}s, max_results={}",
            self.search_retries, self.backoff_base_ms, self.search_timeout_secs,
            self.max_search_results
        );
        info!(
            "Config: {} legal suffixes, {} denylisted domains",
            self.legal_suffixes.len(),
            self.denylist_domains.len()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(PipelineConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_batch_size_is_a_configuration_error() {
        let config = PipelineConfig {
            max_batch_size: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ResolveError::Configuration(_))
        ));
    }

    #[test]
    fn weights_must_sum_to_one() {
        let config = PipelineConfig {
            weights: ScoringWeights {
                token_overlap: 0.5,
                domain_match: 0.5,
                reputable_domain: 0.5,
            },
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ResolveError::Configuration(_))
        ));
    }

    #[test]
    fn out_of_range_threshold_rejected() {
        let config = PipelineConfig {
            similarity_threshold: 1.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
