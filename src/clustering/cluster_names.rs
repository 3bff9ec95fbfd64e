// src/clustering/cluster_names.rs - Fuzzy clustering of normalized company names

use crate::config::PipelineConfig;
use crate::models::core::{Cluster, NormalizedRecord};
use log::{debug, info};
use petgraph::unionfind::UnionFind;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use strsim::normalized_levenshtein;

/// Stable cluster id derived from the representative name alone, so ids
/// survive reruns regardless of input ordering.
pub fn deterministic_cluster_id(representative_name: &str) -> String {
    let digest = Sha256::digest(representative_name.as_bytes());
    hex::encode(&digest[..8])
}

/// Id for an unclusterable (empty-key) singleton. Salted with the member id
/// so two punctuation-only rows with the same raw text get distinct clusters.
fn singleton_cluster_id(raw_name: &str, member_id: u64) -> String {
    let digest = Sha256::digest(format!("singleton:{}:{}", member_id, raw_name).as_bytes());
    hex::encode(&digest[..8])
}

/// Combined similarity between two canonical keys: weighted token-set
/// overlap (Jaccard) plus normalized edit distance.
fn key_similarity(
    key_a: &str,
    tokens_a: &HashSet<&str>,
    key_b: &str,
    tokens_b: &HashSet<&str>,
    token_weight: f64,
) -> f64 {
    let intersection = tokens_a.intersection(tokens_b).count();
    let union = tokens_a.len() + tokens_b.len() - intersection;
    let jaccard = if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    };
    let edit = normalized_levenshtein(key_a, key_b);
    token_weight * jaccard + (1.0 - token_weight) * edit
}

/// Group normalized records into company clusters.
///
/// Records with equal canonical keys always merge. Distinct keys merge when
/// their combined similarity reaches the configured threshold, with
/// union-find guaranteeing transitive closure. Empty-key records become
/// singleton clusters and are never merged with each other.
///
/// Output is sorted by cluster id and fully determined by the input set:
/// permuting the input yields byte-identical clusters.
pub fn cluster_records(records: &[NormalizedRecord], config: &PipelineConfig) -> Vec<Cluster> {
    // Exact-key grouping first. BTreeMap keeps key iteration deterministic.
    let mut key_groups: BTreeMap<&str, Vec<&NormalizedRecord>> = BTreeMap::new();
    let mut unclusterable: Vec<&NormalizedRecord> = Vec::new();
    for record in records {
        if record.is_unclusterable() {
            unclusterable.push(record);
        } else {
            key_groups
                .entry(record.canonical_key.as_str())
                .or_default()
                .push(record);
        }
    }

    let keys: Vec<&str> = key_groups.keys().copied().collect();
    let key_tokens: Vec<HashSet<&str>> = keys
        .iter()
        .map(|k| k.split_whitespace().collect())
        .collect();

    let mut uf: UnionFind<usize> = UnionFind::new(keys.len());

    // Token blocking is only sound when keys sharing no token cannot reach
    // the threshold (their score is capped by the edit-distance weight).
    let blocking_sound = config.similarity_threshold > 1.0 - config.token_overlap_weight;
    let candidate_pairs = if blocking_sound {
        let mut token_index: HashMap<&str, Vec<usize>> = HashMap::new();
        for (idx, tokens) in key_tokens.iter().enumerate() {
            for token in tokens {
                token_index.entry(token).or_default().push(idx);
            }
        }
        let mut pairs: BTreeSet<(usize, usize)> = BTreeSet::new();
        for bucket in token_index.values() {
            for (pos, &i) in bucket.iter().enumerate() {
                for &j in &bucket[pos + 1..] {
                    pairs.insert((i.min(j), i.max(j)));
                }
            }
        }
        pairs
    } else {
        let mut pairs = BTreeSet::new();
        for i in 0..keys.len() {
            for j in i + 1..keys.len() {
                pairs.insert((i, j));
            }
        }
        pairs
    };

    debug!(
        "Clustering: {} distinct keys, {} candidate pairs (blocking={})",
        keys.len(),
        candidate_pairs.len(),
        blocking_sound
    );

    let mut merges = 0usize;
    for (i, j) in candidate_pairs {
        let similarity = key_similarity(
            keys[i],
            &key_tokens[i],
            keys[j],
            &key_tokens[j],
            config.token_overlap_weight,
        );
        if similarity >= config.similarity_threshold && uf.union(i, j) {
            merges += 1;
        }
    }

    // Collect connected components of merged keys.
    let mut components: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for idx in 0..keys.len() {
        components.entry(uf.find(idx)).or_default().push(idx);
    }

    let mut clusters = Vec::with_capacity(components.len() + unclusterable.len());
    for key_indices in components.values() {
        let members: Vec<&NormalizedRecord> = key_indices
            .iter()
            .flat_map(|&idx| key_groups[keys[idx]].iter().copied())
            .collect();
        let representative = select_representative(&members);
        let canonical_key = members
            .iter()
            .find(|r| r.record.raw_name == representative)
            .map(|r| r.canonical_key.clone())
            .unwrap_or_default();
        let member_ids: BTreeSet<u64> = members.iter().map(|r| r.record.id).collect();
        clusters.push(Cluster {
            cluster_id: deterministic_cluster_id(&representative),
            representative_name: representative,
            canonical_key,
            member_ids,
        });
    }

    // Empty-key records are unclusterable: one singleton cluster each.
    for record in &unclusterable {
        let representative = record.record.raw_name.trim().to_string();
        clusters.push(Cluster {
            cluster_id: singleton_cluster_id(&representative, record.record.id),
            representative_name: representative,
            canonical_key: String::new(),
            member_ids: BTreeSet::from([record.record.id]),
        });
    }

    clusters.sort_by(|a, b| a.cluster_id.cmp(&b.cluster_id));

    info!(
        "Clustering: {} records -> {} clusters ({} fuzzy merges, {} unclusterable)",
        records.len(),
        clusters.len(),
        merges,
        unclusterable.len()
    );
    clusters
}

/// Representative selection: most frequent raw form, then shortest string,
/// then lexicographically smallest. The order is total and independent of
/// input iteration order.
fn select_representative(members: &[&NormalizedRecord]) -> String {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for member in members {
        *counts.entry(member.record.raw_name.as_str()).or_default() += 1;
    }
    let mut best: Option<(&str, usize)> = None;
    for (&name, &count) in &counts {
        let better = match best {
            None => true,
            Some((best_name, best_count)) => {
                count > best_count
                    || (count == best_count && name.len() < best_name.len())
                    || (count == best_count
                        && name.len() == best_name.len()
                        && name < best_name)
            }
        };
        if better {
            best = Some((name, count));
        }
    }
    best.map(|(name, _)| name.to_string()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::normalize::Normalizer;

    fn normalize_all(names: &[&str]) -> Vec<NormalizedRecord> {
        let normalizer = Normalizer::from_config(&PipelineConfig::default());
        names
            .iter()
            .enumerate()
            .map(|(i, name)| {
                normalizer.normalize_record(crate::models::core::RawRecord {
                    id: i as u64 + 1,
                    raw_name: name.to_string(),
                    source: None,
                })
            })
            .collect()
    }

    #[test]
    fn acme_and_globex_form_two_clusters() {
        let records = normalize_all(&["Acme Inc.", "ACME INC", "Acme  Incorporated", "Globex LLC"]);
        let clusters = cluster_records(&records, &PipelineConfig::default());
        assert_eq!(clusters.len(), 2);

        let acme = clusters
            .iter()
            .find(|c| c.member_ids.len() == 3)
            .expect("acme cluster");
        // All frequencies tie at 1; shortest raw form wins.
        assert_eq!(acme.representative_name, "ACME INC");
        assert_eq!(acme.member_ids, BTreeSet::from([1, 2, 3]));

        let globex = clusters.iter().find(|c| c.member_ids.len() == 1).unwrap();
        assert_eq!(globex.representative_name, "Globex LLC");
    }

    #[test]
    fn clustering_is_order_independent() {
        let names = [
            "Acme Inc.",
            "ACME INC",
            "Globex LLC",
            "Initech Corp",
            "Acme  Incorporated",
            "Initech Corporation",
        ];
        let forward = normalize_all(&names);
        let mut reversed = forward.clone();
        reversed.reverse();

        let config = PipelineConfig::default();
        let a = cluster_records(&forward, &config);
        let b = cluster_records(&reversed, &config);
        assert_eq!(a, b);
    }

    #[test]
    fn fuzzy_merge_is_transitive() {
        // A~B and B~C clear the threshold, A~C on its own does not; the
        // union-find closure must still put all three in one cluster.
        let records = normalize_all(&[
            "Continental Widget Maker",
            "Continental Widget Makers",
            "Continental Widget Makerszz",
        ]);
        let config = PipelineConfig {
            similarity_threshold: 0.70,
            ..Default::default()
        };
        let clusters = cluster_records(&records, &config);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].member_ids, BTreeSet::from([1, 2, 3]));
    }

    #[test]
    fn member_ids_partition_the_input() {
        let names = ["Acme Inc.", "Globex LLC", "???", "Initech", "Acme Inc."];
        let records = normalize_all(&names);
        let clusters = cluster_records(&records, &PipelineConfig::default());

        let mut seen = BTreeSet::new();
        for cluster in &clusters {
            for id in &cluster.member_ids {
                assert!(seen.insert(*id), "member id {} appears twice", id);
            }
        }
        let expected: BTreeSet<u64> = (1..=names.len() as u64).collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn empty_key_records_stay_singletons() {
        let records = normalize_all(&["???", "!!!", "..."]);
        let clusters = cluster_records(&records, &PipelineConfig::default());
        assert_eq!(clusters.len(), 3);
        for cluster in &clusters {
            assert_eq!(cluster.member_ids.len(), 1);
            assert!(cluster.canonical_key.is_empty());
        }
    }

    #[test]
    fn identical_punctuation_only_rows_get_distinct_ids() {
        let records = normalize_all(&["???", "???"]);
        let clusters = cluster_records(&records, &PipelineConfig::default());
        assert_eq!(clusters.len(), 2);
        assert_ne!(clusters[0].cluster_id, clusters[1].cluster_id);
    }

    #[test]
    fn cluster_id_depends_only_on_representative() {
        assert_eq!(
            deterministic_cluster_id("ACME INC"),
            deterministic_cluster_id("ACME INC")
        );
        assert_ne!(
            deterministic_cluster_id("ACME INC"),
            deterministic_cluster_id("Globex LLC")
        );
    }

    #[test]
    fn representative_tie_breaks_are_total() {
        // Both raw forms normalize to "acme", tie on frequency and length:
        // lexicographically smallest wins.
        let records = normalize_all(&["ACME LTD", "ACME INC"]);
        let clusters = cluster_records(&records, &PipelineConfig::default());
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].representative_name, "ACME INC");
    }
}
