//! Three-tier query entity extraction.
//!
//! Users type "maxwell case documents", not "Ghislaine Maxwell". The
//! extractor recovers typed canonical entities from free-form queries in
//! three tiers, applied in order and unioned:
//!
//! 1. **Recognizer tier** — run the same recognizer used for documents;
//!    keep validated person/org/location spans.
//! 2. **Lookup tier** — normalize each query token and look it up in the
//!    [`EntityLookupIndex`] built from canonical names and their
//!    consolidation variants (so "maxwell" resolves even lowercased).
//! 3. **Substring tier** — for longer tokens, scan the most frequent
//!    canonicals per kind and take the first canonical containing the
//!    token ("epstein" → "Jeffrey Epstein"). The scan is capped per kind
//!    to bound worst-case latency on large entity inventories.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use tracing::debug;

use crate::consolidate::{normalize_for_grouping, AliasMap};
use crate::matcher::EntityMatcher;
use crate::models::{EntityKind, QueryEntities};
use crate::ner::{EntityRecognizer, NerLabel};
use crate::validator::is_valid_entity;

/// Tokens never treated as entity candidates.
const QUERY_STOPWORDS: &[&str] = &[
    "the",
    "and",
    "for",
    "with",
    "in",
    "on",
    "at",
    "to",
    "from",
    "by",
    "about",
    "investigation",
    "case",
    "documents",
    "files",
];

/// Minimum token length for the lookup tier.
const MIN_LOOKUP_LEN: usize = 3;
/// Minimum token length for the substring tier.
const MIN_SUBSTRING_LEN: usize = 4;
/// Substring tier scans at most this many canonicals per kind.
const SUBSTRING_SCAN_CAP: usize = 2000;

/// Mapping from normalized surface forms to the canonical entities they
/// denote. Immutable after build; shared by reference across queries.
#[derive(Debug, Default)]
pub struct EntityLookupIndex {
    /// normalized form → set of (canonical, kind).
    by_normalized: HashMap<String, BTreeSet<(String, EntityKind)>>,
    /// Per kind: canonicals by descending document frequency, pre-lowercased
    /// for the substring tier, capped at [`SUBSTRING_SCAN_CAP`].
    frequent: BTreeMap<EntityKind, Vec<(String, String)>>,
}

impl EntityLookupIndex {
    /// Build the index from stored canonicals, persisted consolidation
    /// variants, and the static alias dictionary.
    ///
    /// `frequencies` is the store's per-kind canonical frequency listing
    /// (descending); `aliases` the persisted `(kind, variant, canonical)`
    /// rows.
    pub fn build(
        frequencies: &BTreeMap<EntityKind, Vec<(String, u64)>>,
        aliases: &[(EntityKind, String, String)],
        matcher: &EntityMatcher,
    ) -> Self {
        let alias_map = AliasMap::builtin();
        let mut index = Self::default();

        for (kind, names) in frequencies {
            let mut frequent = Vec::with_capacity(names.len().min(SUBSTRING_SCAN_CAP));
            for (canonical, _) in names.iter().take(SUBSTRING_SCAN_CAP) {
                frequent.push((canonical.clone(), canonical.to_lowercase()));
            }
            index.frequent.insert(*kind, frequent);

            for (canonical, _) in names {
                index.insert(matcher, canonical, canonical, *kind);
                // Known alias spellings of this canonical resolve to it even
                // when the corpus never contained them verbatim.
                if alias_map.canonical_for(&normalize_for_grouping(canonical))
                    == Some(canonical.as_str())
                {
                    for variant in alias_map.variants_of(canonical) {
                        index.insert(matcher, variant, canonical, *kind);
                    }
                }
            }
        }

        for (kind, variant, canonical) in aliases {
            index.insert(matcher, variant, canonical, *kind);
        }

        debug!(
            normalized_forms = index.by_normalized.len(),
            "entity lookup index built"
        );
        index
    }

    fn insert(&mut self, matcher: &EntityMatcher, variant: &str, canonical: &str, kind: EntityKind) {
        let key = matcher.normalize(variant);
        if key.is_empty() {
            return;
        }
        self.by_normalized
            .entry(key)
            .or_default()
            .insert((canonical.to_string(), kind));
    }

    /// Canonical entities registered under a normalized form.
    pub fn lookup(&self, normalized: &str) -> Option<&BTreeSet<(String, EntityKind)>> {
        self.by_normalized.get(normalized)
    }

    /// Number of distinct normalized forms.
    pub fn len(&self) -> usize {
        self.by_normalized.len()
    }

    /// True when the index holds nothing.
    pub fn is_empty(&self) -> bool {
        self.by_normalized.is_empty()
    }
}

/// Query-time entity extraction over a fixed recognizer and lookup index.
pub struct QueryEntityExtractor {
    recognizer: Arc<dyn EntityRecognizer>,
    lookup: Arc<EntityLookupIndex>,
    matcher: EntityMatcher,
}

impl QueryEntityExtractor {
    pub fn new(
        recognizer: Arc<dyn EntityRecognizer>,
        lookup: Arc<EntityLookupIndex>,
        matcher: EntityMatcher,
    ) -> Self {
        Self {
            recognizer,
            lookup,
            matcher,
        }
    }

    /// Extract typed canonical entities from a free-form query.
    ///
    /// The three tiers union into one [`QueryEntities`]; set ordering is
    /// irrelevant to callers. Deterministic for a fixed index and
    /// recognizer.
    pub fn extract(&self, query: &str) -> QueryEntities {
        let mut entities = QueryEntities::default();

        self.recognizer_tier(query, &mut entities);
        let tokens = self.candidate_tokens(query);
        self.lookup_tier(&tokens, &mut entities);
        self.substring_tier(&tokens, &mut entities);

        debug!(
            query,
            people = entities.people.len(),
            organizations = entities.organizations.len(),
            locations = entities.locations.len(),
            "query entities extracted"
        );
        entities
    }

    fn recognizer_tier(&self, query: &str, entities: &mut QueryEntities) {
        for span in self.recognizer.recognize(query) {
            if !is_valid_entity(&span.text, span.label) {
                continue;
            }
            let kind = match span.label {
                NerLabel::Person => EntityKind::Person,
                NerLabel::Org => EntityKind::Organization,
                NerLabel::Gpe | NerLabel::Loc => EntityKind::Location,
            };
            // Resolve to the canonical spelling when the surface is known;
            // an unknown surface still participates in fuzzy filtering.
            let resolved = self
                .lookup
                .lookup(&self.matcher.normalize(&span.text))
                .and_then(|hits| {
                    hits.iter()
                        .find(|(_, k)| *k == kind)
                        .map(|(canonical, _)| canonical.clone())
                })
                .unwrap_or(span.text);
            entities.entities_mut(kind).insert(resolved);
        }
    }

    /// Whitespace tokens, lowercased, minus stopwords and short tokens.
    fn candidate_tokens(&self, query: &str) -> Vec<String> {
        query
            .split_whitespace()
            .map(|t| {
                t.trim_matches(|c: char| !c.is_alphanumeric())
                    .to_lowercase()
            })
            .filter(|t| t.len() >= MIN_LOOKUP_LEN && !QUERY_STOPWORDS.contains(&t.as_str()))
            .collect()
    }

    fn lookup_tier(&self, tokens: &[String], entities: &mut QueryEntities) {
        for token in tokens {
            let normalized = self.matcher.normalize(token);
            if let Some(hits) = self.lookup.lookup(&normalized) {
                for (canonical, kind) in hits {
                    entities.entities_mut(*kind).insert(canonical.clone());
                }
            }
        }
    }

    fn substring_tier(&self, tokens: &[String], entities: &mut QueryEntities) {
        for token in tokens {
            if token.len() < MIN_SUBSTRING_LEN {
                continue;
            }
            'token: for kind in EntityKind::ALL {
                let Some(frequent) = self.lookup.frequent.get(&kind) else {
                    continue;
                };
                for (canonical, lowered) in frequent {
                    if lowered.contains(token.as_str())
                        && !entities.entities(kind).contains(canonical)
                    {
                        entities.entities_mut(kind).insert(canonical.clone());
                        // First match wins across all kinds.
                        break 'token;
                    }
                }
            }
        }
    }
}
