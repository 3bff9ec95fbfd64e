// src/enrichment/scoring.rs - Evidence scoring and confidence-gated candidate selection

use crate::config::PipelineConfig;
use crate::models::core::{Candidate, ClusterStatus, SearchHit, SignalScores};
use log::debug;
use std::cmp::Ordering;
use std::collections::HashSet;
use strsim::jaro_winkler;
use url::Url;

/// Extract the registrable-ish domain from a URL, with the `www.` prefix
/// stripped. Returns None for unparseable URLs or URLs without a host.
pub fn domain_of(url_str: &str) -> Option<String> {
    let parsed = Url::parse(url_str).ok()?;
    let host = parsed.host_str()?.to_lowercase();
    Some(host.strip_prefix("www.").unwrap_or(&host).to_string())
}

fn tokenize(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_string())
        .collect()
}

/// Share of the company's name tokens that appear in the candidate's title,
/// snippet, and fetched homepage text (when available).
fn token_overlap_signal(name: &str, hit: &SearchHit, page_text: Option<&str>) -> f64 {
    let name_tokens = tokenize(name);
    if name_tokens.is_empty() {
        return 0.0;
    }
    let mut text = format!("{} {}", hit.title, hit.snippet);
    if let Some(page) = page_text {
        text.push(' ');
        text.push_str(page);
    }
    let text_tokens = tokenize(&text);
    let present = name_tokens
        .iter()
        .filter(|t| text_tokens.contains(*t))
        .count();
    present as f64 / name_tokens.len() as f64
}

/// Similarity between the compacted company name and the leading domain
/// label. Containment either way counts as a full match.
fn domain_match_signal(name: &str, domain: &str) -> f64 {
    let compact: String = name
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric())
        .collect();
    let label = domain.split('.').next().unwrap_or("");
    if compact.is_empty() || label.is_empty() {
        return 0.0;
    }
    if label.contains(&compact) || compact.contains(label) {
        return 1.0;
    }
    jaro_winkler(label, &compact)
}

fn is_denylisted(domain: &str, denylist: &[String]) -> bool {
    denylist
        .iter()
        .any(|entry| domain == entry || domain.ends_with(&format!(".{}", entry)))
}

/// Score one search hit against a cluster's representative name. Signals are
/// combined by the configured weights, which are validated once at startup
/// to sum to 1.0. Hits with unparseable URLs produce no candidate.
/// `page_text` carries fetched homepage evidence when page fetching is on.
pub fn score_candidate(
    cluster_id: &str,
    representative_name: &str,
    hit: &SearchHit,
    page_text: Option<&str>,
    config: &PipelineConfig,
) -> Option<Candidate> {
    let domain = match domain_of(&hit.url) {
        Some(domain) => domain,
        None => {
            debug!("Scoring: skipping unparseable URL '{}'", hit.url);
            return None;
        }
    };

    let evidence = SignalScores {
        token_overlap: token_overlap_signal(representative_name, hit, page_text),
        domain_match: domain_match_signal(representative_name, &domain),
        reputable_domain: if is_denylisted(&domain, &config.denylist_domains) {
            0.0
        } else {
            1.0
        },
    };
    let weights = &config.weights;
    let score = weights.token_overlap * evidence.token_overlap
        + weights.domain_match * evidence.domain_match
        + weights.reputable_domain * evidence.reputable_domain;

    Some(Candidate {
        cluster_id: cluster_id.to_string(),
        url: hit.url.clone(),
        domain,
        title: hit.title.clone(),
        snippet: hit.snippet.clone(),
        score,
        evidence,
    })
}

/// Outcome of candidate selection for one cluster.
#[derive(Debug, Clone)]
pub struct Selection {
    pub chosen: Option<Candidate>,
    pub status: ClusterStatus,
}

/// Pick the best-scoring candidate and gate it against the acceptance
/// threshold (inclusive). Ties at the maximum score break by shorter
/// domain, then lexical URL order, so selection is fully deterministic.
///
/// Below-threshold winners are still recorded best-effort as `unverified`;
/// an empty candidate set is `no_candidate`.
pub fn select_best(mut candidates: Vec<Candidate>, accept_threshold: f64) -> Selection {
    if candidates.is_empty() {
        return Selection {
            chosen: None,
            status: ClusterStatus::NoCandidate,
        };
    }

    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.domain.len().cmp(&b.domain.len()))
            .then_with(|| a.url.cmp(&b.url))
    });
    let best = candidates.swap_remove(0);
    let status = if best.score >= accept_threshold {
        ClusterStatus::Verified
    } else {
        ClusterStatus::Unverified
    };
    Selection {
        chosen: Some(best),
        status,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(url: &str, title: &str, snippet: &str) -> SearchHit {
        SearchHit {
            url: url.to_string(),
            title: title.to_string(),
            snippet: snippet.to_string(),
        }
    }

    #[test]
    fn domain_extraction_strips_www() {
        assert_eq!(
            domain_of("https://www.acme.com/about"),
            Some("acme.com".to_string())
        );
        assert_eq!(domain_of("https://uk.acme.com"), Some("uk.acme.com".to_string()));
        assert_eq!(domain_of("not a url"), None);
    }

    #[test]
    fn exact_match_scores_full_marks() {
        let config = PipelineConfig::default();
        let candidate = score_candidate(
            "c1",
            "Acme",
            &hit("https://acme.com", "Acme", "Acme widgets and tooling"),
            None,
            &config,
        )
        .unwrap();
        assert!((candidate.evidence.token_overlap - 1.0).abs() < 1e-9);
        assert!((candidate.evidence.domain_match - 1.0).abs() < 1e-9);
        assert!((candidate.evidence.reputable_domain - 1.0).abs() < 1e-9);
        assert!((candidate.score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn denylisted_domain_loses_reputation_signal() {
        let config = PipelineConfig::default();
        let candidate = score_candidate(
            "c1",
            "Acme",
            &hit("https://www.linkedin.com/company/acme", "Acme", "Acme"),
            None,
            &config,
        )
        .unwrap();
        assert_eq!(candidate.evidence.reputable_domain, 0.0);
        assert!(candidate.score < 1.0 - config.weights.reputable_domain + 1e-9);
    }

    #[test]
    fn denylist_covers_subdomains() {
        let config = PipelineConfig::default();
        let candidate = score_candidate(
            "c1",
            "Acme",
            &hit("https://uk.linkedin.com/company/acme", "Acme", ""),
            None,
            &config,
        )
        .unwrap();
        assert_eq!(candidate.evidence.reputable_domain, 0.0);
    }

    #[test]
    fn homepage_text_feeds_token_overlap() {
        let config = PipelineConfig::default();
        // Uninformative search hit: the name tokens only appear on the page.
        let input = hit("https://awi-group.com", "Home", "");
        let without = score_candidate("c1", "Acme Widgets International", &input, None, &config)
            .unwrap();
        let with = score_candidate(
            "c1",
            "Acme Widgets International",
            &input,
            Some("Acme Widgets International | industrial widgets since 1952"),
            &config,
        )
        .unwrap();

        assert!((without.evidence.token_overlap - 0.0).abs() < 1e-9);
        assert!((with.evidence.token_overlap - 1.0).abs() < 1e-9);
        assert!(with.score > without.score);
    }

    #[test]
    fn scoring_is_deterministic() {
        let config = PipelineConfig::default();
        let input = hit("https://acme.com", "Acme Widgets", "official site of Acme");
        let a = score_candidate("c1", "Acme Widgets", &input, None, &config).unwrap();
        let b = score_candidate("c1", "Acme Widgets", &input, None, &config).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn empty_candidate_set_is_no_candidate() {
        let selection = select_best(Vec::new(), 0.7);
        assert_eq!(selection.status, ClusterStatus::NoCandidate);
        assert!(selection.chosen.is_none());
    }

    #[test]
    fn score_at_threshold_is_verified() {
        let config = PipelineConfig::default();
        let candidate = score_candidate(
            "c1",
            "Acme",
            &hit("https://acme.com", "Acme", ""),
            None,
            &config,
        )
        .unwrap();
        // Threshold exactly equal to the score: inclusive acceptance.
        let selection = select_best(vec![candidate.clone()], candidate.score);
        assert_eq!(selection.status, ClusterStatus::Verified);
    }

    #[test]
    fn below_threshold_is_unverified_with_url_recorded() {
        let config = PipelineConfig::default();
        let candidate = score_candidate(
            "c1",
            "Acme Widgets International",
            &hit("https://unrelated-site.org", "Something else", "nothing here"),
            None,
            &config,
        )
        .unwrap();
        assert!(candidate.score < 0.7);
        let selection = select_best(vec![candidate], 0.7);
        assert_eq!(selection.status, ClusterStatus::Unverified);
        assert!(selection.chosen.is_some());
    }

    #[test]
    fn ties_break_by_shorter_domain_then_lexical() {
        let config = PipelineConfig::default();
        let a = score_candidate("c1", "Acme", &hit("https://acme.com", "Acme", ""), None, &config)
            .unwrap();
        let b = score_candidate("c1", "Acme", &hit("https://acme.co", "Acme", ""), None, &config)
            .unwrap();
        assert!((a.score - b.score).abs() < 1e-12);
        let selection = select_best(vec![a, b], 0.7);
        assert_eq!(selection.chosen.unwrap().domain, "acme.co");
    }
}
