//! Derived text projections for lexical and fuzzy retrieval.
//!
//! Both projections are pure functions of chunk text, computed once at
//! write time and stored alongside it. They are never mutated
//! independently; replacing a chunk's text replaces its projections.
//!
//! - **Lexical projection**: lowercased alphanumeric tokens, whitespace
//!   separated. Feeds the full-text index and term-overlap scoring.
//! - **Trigram projection**: the sorted, de-duplicated character trigram
//!   set of each padded token (pg_trgm style: two leading spaces, one
//!   trailing). Feeds fuzzy similarity scoring.

use std::collections::BTreeSet;

/// Lowercase and strip to alphanumeric tokens.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// The stored lexical-search form of a chunk's text.
pub fn lexical_projection(text: &str) -> String {
    tokenize(text).join(" ")
}

/// Character trigrams of a single token, padded `"  token "`.
fn token_trigrams(token: &str, out: &mut BTreeSet<String>) {
    let padded: Vec<char> = format!("  {token} ").chars().collect();
    for window in padded.windows(3) {
        out.insert(window.iter().collect());
    }
}

/// The trigram set of a text, sorted and de-duplicated.
pub fn trigram_set(text: &str) -> BTreeSet<String> {
    let mut set = BTreeSet::new();
    for token in tokenize(text) {
        token_trigrams(&token, &mut set);
    }
    set
}

/// The stored fuzzy-match form of a chunk's text: trigrams joined by `|`.
pub fn trigram_projection(text: &str) -> String {
    trigram_set(text).into_iter().collect::<Vec<_>>().join("|")
}

/// Parse a stored trigram projection back into a set.
pub fn parse_trigram_projection(stored: &str) -> BTreeSet<String> {
    stored
        .split('|')
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Jaccard similarity between two trigram sets, in `[0.0, 1.0]`.
pub fn trigram_similarity(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let shared = a.intersection(b).count();
    let union = a.len() + b.len() - shared;
    shared as f64 / union as f64
}

/// Fraction of query terms present in a lexical projection, in
/// `[0.0, 1.0]`. Used by store backends without a full-text index.
pub fn lexical_overlap(projection: &str, query: &str) -> f64 {
    let query_terms = tokenize(query);
    if query_terms.is_empty() {
        return 0.0;
    }
    let chunk_terms: BTreeSet<&str> = projection.split(' ').collect();
    let matched = query_terms
        .iter()
        .filter(|t| chunk_terms.contains(t.as_str()))
        .count();
    matched as f64 / query_terms.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lexical_projection_lowercases_and_strips_punctuation() {
        assert_eq!(
            lexical_projection("Quarterly Revenue grew 12%!"),
            "quarterly revenue grew 12"
        );
    }

    #[test]
    fn projections_are_deterministic() {
        let text = "Alpha, beta. GAMMA?";
        assert_eq!(lexical_projection(text), lexical_projection(text));
        assert_eq!(trigram_projection(text), trigram_projection(text));
    }

    #[test]
    fn trigram_projection_round_trips() {
        let stored = trigram_projection("hello world");
        let parsed = parse_trigram_projection(&stored);
        assert_eq!(parsed, trigram_set("hello world"));
    }

    #[test]
    fn trigram_similarity_identical_is_one() {
        let a = trigram_set("quarterly revenue");
        assert!((trigram_similarity(&a, &a) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn trigram_similarity_related_beats_unrelated() {
        let query = trigram_set("quarterly revenue growth");
        let related = trigram_set("quarterly revenue grew 12");
        let unrelated = trigram_set("kubernetes deployment guide");
        assert!(trigram_similarity(&query, &related) > trigram_similarity(&query, &unrelated));
    }

    #[test]
    fn trigram_similarity_empty_is_zero() {
        let empty = BTreeSet::new();
        let some = trigram_set("abc");
        assert_eq!(trigram_similarity(&empty, &some), 0.0);
    }

    #[test]
    fn lexical_overlap_counts_matched_terms() {
        let projection = lexical_projection("quarterly revenue grew 12%");
        assert!((lexical_overlap(&projection, "quarterly revenue growth") - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(lexical_overlap(&projection, ""), 0.0);
        assert_eq!(lexical_overlap(&projection, "unrelated"), 0.0);
    }
}
