//! Name normalization and fuzzy entity comparison.
//!
//! Queries say "Maxwell"; documents say "Ghislaine Maxwell" or
//! "G. Maxwell". The matcher bridges the gap with three strategies tried in
//! order: exact match after normalization, substring containment, and a
//! character-sequence similarity ratio against a configurable threshold.

use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::Regex;

/// Default minimum similarity ratio for a fuzzy match.
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.85;

/// Honorifics and articles stripped during normalization.
static PREFIXES: &[&str] = &["the ", "mr. ", "ms. ", "mrs. ", "dr. ", "prof. "];

/// Single-letter initials such as the "G. " in "G. Maxwell".
static INITIALS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b[a-z]\.\s*").unwrap());

/// Fuzzy comparison of entity names with a fixed similarity threshold.
#[derive(Debug, Clone)]
pub struct EntityMatcher {
    threshold: f64,
}

impl Default for EntityMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_SIMILARITY_THRESHOLD)
    }
}

impl EntityMatcher {
    /// Create a matcher with the given similarity threshold in `[0, 1]`.
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    /// Normalize an entity name for comparison.
    ///
    /// Lowercases, strips a leading honorific or article, removes
    /// single-letter initials, and collapses whitespace:
    /// `"G. Maxwell"` → `"maxwell"`, `"The Clinton Foundation"` →
    /// `"clinton foundation"`.
    pub fn normalize(&self, name: &str) -> String {
        let mut normalized = name.to_lowercase();

        for prefix in PREFIXES {
            if let Some(rest) = normalized.strip_prefix(prefix) {
                normalized = rest.to_string();
                break;
            }
        }

        let normalized = INITIALS.replace_all(&normalized, "");
        normalized.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    /// Whether two entity names match.
    ///
    /// True when the normalized forms are equal, one contains the other,
    /// or their similarity ratio meets the threshold. Symmetric.
    pub fn fuzzy_match(&self, a: &str, b: &str) -> bool {
        let a_norm = self.normalize(a);
        let b_norm = self.normalize(b);

        if a_norm == b_norm {
            return true;
        }

        if !a_norm.is_empty() && !b_norm.is_empty() {
            if a_norm.contains(&b_norm) || b_norm.contains(&a_norm) {
                return true;
            }
        }

        similarity_ratio(&a_norm, &b_norm) >= self.threshold
    }

    /// Whether any query entity matches any document entity.
    pub fn match_any(&self, query_entities: &BTreeSet<String>, doc_entities: &BTreeSet<String>) -> bool {
        query_entities
            .iter()
            .any(|q| doc_entities.iter().any(|d| self.fuzzy_match(q, d)))
    }

    /// Fraction of query entities that match at least one document entity.
    ///
    /// Empty query sets score 0.
    pub fn match_score(
        &self,
        query_entities: &BTreeSet<String>,
        doc_entities: &BTreeSet<String>,
    ) -> f64 {
        if query_entities.is_empty() {
            return 0.0;
        }
        self.match_count(query_entities, doc_entities) as f64 / query_entities.len() as f64
    }

    /// Number of query entities matched in the document set.
    pub fn match_count(
        &self,
        query_entities: &BTreeSet<String>,
        doc_entities: &BTreeSet<String>,
    ) -> usize {
        query_entities
            .iter()
            .filter(|q| doc_entities.iter().any(|d| self.fuzzy_match(q, d)))
            .count()
    }
}

/// Similarity of two strings as the matched-character ratio
/// `2·LCS(a, b) / (|a| + |b|)` over their character sequences.
///
/// 1.0 for identical non-empty strings, 0.0 when nothing matches. Symmetric
/// by construction. Two empty strings are defined as fully similar.
pub fn similarity_ratio(a: &str, b: &str) -> f64 {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();

    if a_chars.is_empty() && b_chars.is_empty() {
        return 1.0;
    }
    if a_chars.is_empty() || b_chars.is_empty() {
        return 0.0;
    }

    // Two-row LCS over characters.
    let mut prev = vec![0usize; b_chars.len() + 1];
    let mut curr = vec![0usize; b_chars.len() + 1];

    for &ca in &a_chars {
        for (j, &cb) in b_chars.iter().enumerate() {
            curr[j + 1] = if ca == cb {
                prev[j] + 1
            } else {
                prev[j + 1].max(curr[j])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    let lcs = prev[b_chars.len()];
    (2.0 * lcs as f64) / (a_chars.len() + b_chars.len()) as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn normalize_strips_initials_and_prefixes() {
        let m = EntityMatcher::default();
        assert_eq!(m.normalize("G. Maxwell"), "maxwell");
        assert_eq!(m.normalize("The Clinton Foundation"), "clinton foundation");
        assert_eq!(m.normalize("Dr. Jeffrey Epstein"), "jeffrey epstein");
        assert_eq!(m.normalize("Ghislaine  Maxwell"), "ghislaine maxwell");
    }

    #[test]
    fn exact_match_after_normalization() {
        let m = EntityMatcher::default();
        assert!(m.fuzzy_match("MAXWELL", "maxwell"));
        assert!(m.fuzzy_match("The FBI", "FBI"));
    }

    #[test]
    fn substring_match() {
        let m = EntityMatcher::default();
        assert!(m.fuzzy_match("Maxwell", "Ghislaine Maxwell"));
        assert!(m.fuzzy_match("Epstein", "Jeffrey Epstein"));
        assert!(m.fuzzy_match("Clinton", "Clinton Foundation"));
    }

    #[test]
    fn unrelated_names_do_not_match() {
        let m = EntityMatcher::default();
        assert!(!m.fuzzy_match("Maxwell", "Einstein"));
        assert!(!m.fuzzy_match("Paris", "London"));
    }

    #[test]
    fn matching_is_symmetric_and_reflexive() {
        let m = EntityMatcher::default();
        let pairs = [
            ("Maxwell", "Ghislaine Maxwell"),
            ("Epstein", "Einstein"),
            ("Paris", "paris"),
        ];
        for (a, b) in pairs {
            assert_eq!(m.fuzzy_match(a, b), m.fuzzy_match(b, a));
        }
        for name in ["Maxwell", "Clinton Foundation", "Paris"] {
            assert!(m.fuzzy_match(name, name));
        }
    }

    #[test]
    fn ratio_bounds() {
        assert_eq!(similarity_ratio("abc", "abc"), 1.0);
        assert_eq!(similarity_ratio("abc", "xyz"), 0.0);
        let r = similarity_ratio("epstien", "epstein");
        assert!(r > 0.8 && r < 1.0, "got {r}");
    }

    #[test]
    fn match_score_is_query_fraction() {
        let m = EntityMatcher::default();
        let query = set(&["Maxwell", "Paris"]);
        let doc = set(&["Ghislaine Maxwell", "Paris", "London", "Jeffrey Epstein"]);
        assert_eq!(m.match_score(&query, &doc), 1.0);

        let doc2 = set(&["Bill Clinton", "New York"]);
        assert_eq!(m.match_score(&query, &doc2), 0.0);

        let doc3 = set(&["Ghislaine Maxwell", "London"]);
        assert_eq!(m.match_score(&query, &doc3), 0.5);
    }

    #[test]
    fn empty_query_scores_zero() {
        let m = EntityMatcher::default();
        assert_eq!(m.match_score(&set(&[]), &set(&["Paris"])), 0.0);
    }

    #[test]
    fn match_any_finds_single_pair() {
        let m = EntityMatcher::default();
        assert!(m.match_any(&set(&["maxwell"]), &set(&["G. Maxwell"])));
        assert!(!m.match_any(&set(&["maxwell"]), &set(&["Einstein"])));
        assert!(!m.match_any(&set(&[]), &set(&["Einstein"])));
    }
}
