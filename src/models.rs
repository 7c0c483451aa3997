//! Core data models used throughout Casefile.
//!
//! These types represent the documents, entity metadata, and search results
//! that flow through the indexing and retrieval pipeline:
//!
//! ```text
//! .txt file → Document → extract() → DocumentMetadata
//!                 ↓                        ↓
//!            Bm25Index              MetadataStore
//!                 └──────── search() ──────┘
//!                              ↓
//!                        RankedResult
//! ```

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;

/// A loaded corpus document.
///
/// `doc_id` is the corpus-relative file path: stable across re-indexing,
/// unique within the corpus, and never reassigned to another file. The raw
/// text is kept verbatim for preview generation.
#[derive(Debug, Clone)]
pub struct Document {
    /// Stable identifier (corpus-relative path).
    pub doc_id: String,
    /// Bare file name, for display.
    pub filename: String,
    /// Full text content as loaded.
    pub text: String,
    /// Byte encoding the file was decoded from (`"utf-8"`, `"utf-8-lossy"`, ...).
    pub encoding: String,
}

/// The kind of a typed entity.
///
/// GPE (geopolitical entity) spans from the recognizer are folded into
/// [`EntityKind::Location`] at extraction time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Person,
    Organization,
    Location,
}

impl EntityKind {
    /// All kinds, in display/storage order.
    pub const ALL: [EntityKind; 3] = [
        EntityKind::Person,
        EntityKind::Organization,
        EntityKind::Location,
    ];

    /// Storage table / export label for this kind.
    pub fn label(&self) -> &'static str {
        match self {
            EntityKind::Person => "people",
            EntityKind::Organization => "organizations",
            EntityKind::Location => "locations",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "people" | "person" => Ok(EntityKind::Person),
            "organizations" | "organization" | "orgs" | "org" => Ok(EntityKind::Organization),
            "locations" | "location" => Ok(EntityKind::Location),
            other => Err(format!("unknown entity kind: {other}")),
        }
    }
}

/// Per-document entity metadata, as persisted by the store.
///
/// All entity collections are sets (no duplicates within a document) and
/// contain consolidated canonical names only. `word_count` excludes
/// pure-punctuation tokens.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DocumentMetadata {
    /// Owning document id.
    pub doc_id: String,
    /// Token count of the document body, punctuation excluded.
    pub word_count: u64,
    /// Canonical person names.
    pub people: BTreeSet<String>,
    /// Canonical organization names.
    pub organizations: BTreeSet<String>,
    /// Canonical location names.
    pub locations: BTreeSet<String>,
    /// Date strings as extracted (no normalization promised).
    pub dates: BTreeSet<String>,
    /// Email addresses as extracted.
    pub emails: BTreeSet<String>,
}

impl DocumentMetadata {
    /// The entity set for `kind`.
    pub fn entities(&self, kind: EntityKind) -> &BTreeSet<String> {
        match kind {
            EntityKind::Person => &self.people,
            EntityKind::Organization => &self.organizations,
            EntityKind::Location => &self.locations,
        }
    }

    /// Mutable entity set for `kind`.
    pub fn entities_mut(&mut self, kind: EntityKind) -> &mut BTreeSet<String> {
        match kind {
            EntityKind::Person => &mut self.people,
            EntityKind::Organization => &mut self.organizations,
            EntityKind::Location => &mut self.locations,
        }
    }
}

/// Typed entities inferred from a query (or supplied as explicit filters).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueryEntities {
    /// Canonical person names.
    pub people: BTreeSet<String>,
    /// Canonical organization names.
    pub organizations: BTreeSet<String>,
    /// Canonical location names.
    pub locations: BTreeSet<String>,
    /// Date strings.
    pub dates: BTreeSet<String>,
}

impl QueryEntities {
    /// True when no entity of any type is present.
    pub fn is_empty(&self) -> bool {
        self.people.is_empty()
            && self.organizations.is_empty()
            && self.locations.is_empty()
            && self.dates.is_empty()
    }

    /// The set for a named kind.
    pub fn entities(&self, kind: EntityKind) -> &BTreeSet<String> {
        match kind {
            EntityKind::Person => &self.people,
            EntityKind::Organization => &self.organizations,
            EntityKind::Location => &self.locations,
        }
    }

    /// Mutable set for a named kind.
    pub fn entities_mut(&mut self, kind: EntityKind) -> &mut BTreeSet<String> {
        match kind {
            EntityKind::Person => &mut self.people,
            EntityKind::Organization => &mut self.organizations,
            EntityKind::Location => &mut self.locations,
        }
    }

    /// Union another entity set into this one.
    pub fn merge(&mut self, other: &QueryEntities) {
        self.people.extend(other.people.iter().cloned());
        self.organizations
            .extend(other.organizations.iter().cloned());
        self.locations.extend(other.locations.iter().cloned());
        self.dates.extend(other.dates.iter().cloned());
    }
}

/// Explicit filter criteria passed programmatically alongside a query.
///
/// Entity lists use OR-within-type semantics; types combine with AND.
/// The date range compares stored date strings lexicographically, which is
/// chronological only for ISO-8601 inputs.
#[derive(Debug, Clone, Default)]
pub struct FilterCriteria {
    /// Person names to require (any of).
    pub people: Vec<String>,
    /// Organization names to require (any of).
    pub organizations: Vec<String>,
    /// Location names to require (any of).
    pub locations: Vec<String>,
    /// Inclusive `(low, high)` bounds over stored date strings.
    pub date_range: Option<(String, String)>,
}

impl FilterCriteria {
    /// True when no criterion is set.
    pub fn is_empty(&self) -> bool {
        self.people.is_empty()
            && self.organizations.is_empty()
            && self.locations.is_empty()
            && self.date_range.is_none()
    }
}

/// Strategy controlling how entity metadata combines with BM25 scores.
///
/// Modeled as a closed enum; the orchestrator dispatches on the tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// AND across entity types, OR within a type; BM25 order preserved.
    Strict,
    /// Keep a candidate if any entity of any type matches.
    Loose,
    /// Keep everything; add the metadata boost to the BM25 score and re-sort.
    Boost,
    /// strict → loose → boost until `min_candidates` survive.
    Adaptive,
    /// Pure BM25, no metadata stage.
    None,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Strategy::Strict => "strict",
            Strategy::Loose => "loose",
            Strategy::Boost => "boost",
            Strategy::Adaptive => "adaptive",
            Strategy::None => "none",
        };
        f.write_str(name)
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "strict" => Ok(Strategy::Strict),
            "loose" => Ok(Strategy::Loose),
            "boost" => Ok(Strategy::Boost),
            "adaptive" => Ok(Strategy::Adaptive),
            "none" => Ok(Strategy::None),
            other => Err(format!(
                "unknown strategy: {other}. Use strict, loose, boost, adaptive, or none."
            )),
        }
    }
}

/// A single ranked search result.
#[derive(Debug, Clone, Serialize)]
pub struct RankedResult {
    /// Document id.
    pub doc_id: String,
    /// Bare file name, for display.
    pub filename: String,
    /// Lexical relevance score.
    pub bm25_score: f64,
    /// Metadata boost (0.0 when the strategy computed none).
    pub metadata_score: f64,
    /// `bm25_score + metadata_score`.
    pub final_score: f64,
    /// Query entities that actually matched this document.
    pub matched_entities: QueryEntities,
    /// First 200 characters of the document text, `...`-terminated when cut.
    pub preview: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_round_trips_through_str() {
        for s in ["strict", "loose", "boost", "adaptive", "none"] {
            let parsed: Strategy = s.parse().unwrap();
            assert_eq!(parsed.to_string(), s);
        }
        assert!("hybrid".parse::<Strategy>().is_err());
    }

    #[test]
    fn entity_kind_parses_aliases() {
        assert_eq!("person".parse::<EntityKind>().unwrap(), EntityKind::Person);
        assert_eq!(
            "orgs".parse::<EntityKind>().unwrap(),
            EntityKind::Organization
        );
        assert_eq!(
            "locations".parse::<EntityKind>().unwrap(),
            EntityKind::Location
        );
    }

    #[test]
    fn query_entities_merge_unions() {
        let mut a = QueryEntities::default();
        a.people.insert("Jeffrey Epstein".to_string());
        let mut b = QueryEntities::default();
        b.people.insert("Ghislaine Maxwell".to_string());
        b.locations.insert("Paris".to_string());

        a.merge(&b);
        assert_eq!(a.people.len(), 2);
        assert_eq!(a.locations.len(), 1);
        assert!(!a.is_empty());
    }
}
