// src/normalize.rs - Company name normalization

use crate::config::PipelineConfig;
use crate::models::core::{NormalizedRecord, RawRecord};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Common abbreviations expanded before punctuation stripping, so that
/// "Acme Co." and "Acme Company" land on the same key.
const ABBREVIATIONS: [(&str, &str); 6] = [
    ("co.", "company"),
    ("intl", "international"),
    ("int'l", "international"),
    ("ind.", "industry"),
    ("tech.", "technology"),
    ("elec.", "electronic"),
];

// Connector characters read as "and" in company names (A&B, A/B).
static CONNECTOR_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[&@/\\]+").unwrap());
static NON_ALNUM: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9\s]+").unwrap());

/// Fold diacritics to base characters and drop anything that does not
/// survive as ASCII, mirroring an ascii-ignore transliteration.
fn fold_to_ascii(text: &str) -> String {
    text.nfkd()
        .filter(|c| !is_combining_mark(*c))
        .filter(|c| c.is_ascii())
        .collect()
}

/// Deterministic, pure normalizer. Produces both the light display form and
/// the canonical comparison key for a raw company name.
#[derive(Debug, Clone)]
pub struct Normalizer {
    legal_suffixes: HashSet<String>,
}

impl Normalizer {
    pub fn new(legal_suffixes: &[String]) -> Self {
        Self {
            legal_suffixes: legal_suffixes.iter().map(|s| s.to_lowercase()).collect(),
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(&config.legal_suffixes)
    }

    /// Light normalization: case-fold, diacritic fold, abbreviation
    /// expansion, punctuation removal, whitespace collapse. Word order and
    /// legal suffixes are preserved; used for display and search queries.
    pub fn display_name(&self, raw_name: &str) -> String {
        let folded = fold_to_ascii(raw_name.trim()).to_lowercase();
        let connected = CONNECTOR_CHARS.replace_all(&folded, " and ");

        // Abbreviations are matched as whole tokens while punctuation is
        // still intact ("co." vs "code").
        let expanded: Vec<&str> = connected
            .split_whitespace()
            .map(|token| {
                ABBREVIATIONS
                    .iter()
                    .find(|(abbr, _)| *abbr == token)
                    .map(|(_, full)| *full)
                    .unwrap_or(token)
            })
            .collect();

        let joined = expanded.join(" ");
        let depunctuated = NON_ALNUM.replace_all(&joined, " ");
        depunctuated
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Canonical comparison key: the display form with legal-entity suffix
    /// tokens stripped from trailing position and duplicate tokens removed
    /// (first occurrence wins). Empty or punctuation-only input yields the
    /// empty sentinel key, which the clusterer treats as unclusterable.
    ///
    /// Idempotent: applying this to its own output is a no-op.
    pub fn canonical_key(&self, raw_name: &str) -> String {
        let display = self.display_name(raw_name);
        let mut tokens: Vec<&str> = display.split_whitespace().collect();

        while let Some(last) = tokens.last() {
            if self.legal_suffixes.contains(*last) {
                tokens.pop();
            } else {
                break;
            }
        }

        let mut seen = HashSet::new();
        tokens.retain(|t| seen.insert(*t));
        tokens.join(" ")
    }

    pub fn normalize_record(&self, record: RawRecord) -> NormalizedRecord {
        let canonical_key = self.canonical_key(&record.raw_name);
        let display_name = self.display_name(&record.raw_name);
        NormalizedRecord {
            record,
            canonical_key,
            display_name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;

    fn normalizer() -> Normalizer {
        Normalizer::from_config(&PipelineConfig::default())
    }

    #[test]
    fn case_and_whitespace_fold() {
        let n = normalizer();
        assert_eq!(n.canonical_key("  ACME   Widgets  "), "acme widgets");
    }

    #[test]
    fn trailing_legal_suffixes_stripped() {
        let n = normalizer();
        assert_eq!(n.canonical_key("Acme Inc."), "acme");
        assert_eq!(n.canonical_key("Acme Incorporated"), "acme");
        assert_eq!(n.canonical_key("Acme Holding Co Ltd"), "acme holding");
    }

    #[test]
    fn suffix_tokens_survive_mid_name() {
        let n = normalizer();
        // "co" is only a suffix at trailing position.
        assert_eq!(n.canonical_key("Co Operative Widgets"), "co operative widgets");
    }

    #[test]
    fn diacritics_fold_to_base_characters() {
        let n = normalizer();
        assert_eq!(n.canonical_key("Café Münchén GmbH"), "cafe munchen gmbh");
    }

    #[test]
    fn abbreviations_expand() {
        let n = normalizer();
        assert_eq!(n.canonical_key("Acme Co."), "acme");
        assert_eq!(n.canonical_key("Acme Intl"), "acme international");
        assert_eq!(n.display_name("Smith & Sons"), "smith and sons");
    }

    #[test]
    fn digits_are_retained() {
        let n = normalizer();
        assert_eq!(n.canonical_key("3M Company"), "3m");
        assert_eq!(n.canonical_key("7-Eleven Inc"), "7 eleven");
    }

    #[test]
    fn empty_and_punctuation_only_yield_sentinel() {
        let n = normalizer();
        assert_eq!(n.canonical_key(""), "");
        assert_eq!(n.canonical_key("   "), "");
        assert_eq!(n.canonical_key("?!*#"), "");
    }

    #[test]
    fn normalization_is_idempotent() {
        let n = normalizer();
        let inputs = [
            "Acme Inc.",
            "ACME INC",
            "Acme  Incorporated",
            "Globex LLC",
            "Café Münchén GmbH",
            "Smith & Sons Ltd.",
            "Inc Acme",
            "3M Company",
            "",
            "?!*",
        ];
        for input in inputs {
            let key = n.canonical_key(input);
            assert_eq!(
                n.canonical_key(&key),
                key,
                "normalize not idempotent for {:?}",
                input
            );
        }
    }

    #[test]
    fn duplicate_tokens_deduplicated() {
        let n = normalizer();
        assert_eq!(n.canonical_key("Acme Acme Widgets"), "acme widgets");
    }

    #[test]
    fn acme_variants_share_a_key() {
        let n = normalizer();
        let key = n.canonical_key("Acme Inc.");
        assert_eq!(n.canonical_key("ACME INC"), key);
        assert_eq!(n.canonical_key("Acme  Incorporated"), key);
        assert_ne!(n.canonical_key("Globex LLC"), key);
    }
}
