//! Per-document metadata extraction.
//!
//! Combines the entity recognizer (people, organizations, locations) with
//! regex extraction for dates and email addresses, filtering every
//! recognizer span through the validator. Output carries raw surface forms;
//! consolidation to canonical names happens corpus-wide afterwards.

use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::models::EntityKind;
use crate::ner::{EntityRecognizer, NerLabel};
use crate::text;
use crate::validator::is_valid_entity;

/// Recognizer input is bounded to this many characters. Pathological
/// documents (concatenated mail archives, OCR dumps) still produce
/// metadata for their prefix; dates and emails are extracted from the
/// full text either way.
const NER_CHAR_BUDGET: usize = 100_000;

static EMAIL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").unwrap());

static DATE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        // 2015-07-12
        r"\b\d{4}-\d{2}-\d{2}\b",
        // 7/12/2015
        r"\b\d{1,2}/\d{1,2}/\d{4}\b",
        // 7-12-2015
        r"\b\d{1,2}-\d{1,2}-\d{4}\b",
        // July 12, 2015
        r"\b(?:Jan|Feb|Mar|Apr|May|Jun|Jul|Aug|Sep|Oct|Nov|Dec)[a-z]* \d{1,2},? \d{4}\b",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

/// Raw (pre-consolidation) metadata for one document.
#[derive(Debug, Clone, Default)]
pub struct RawMetadata {
    pub doc_id: String,
    pub word_count: u64,
    /// Validated person surface forms.
    pub people: BTreeSet<String>,
    /// Validated organization surface forms.
    pub organizations: BTreeSet<String>,
    /// Validated location surface forms (GPE and LOC merged).
    pub locations: BTreeSet<String>,
    pub dates: BTreeSet<String>,
    pub emails: BTreeSet<String>,
}

impl RawMetadata {
    /// Surface forms for a given kind.
    pub fn surfaces(&self, kind: EntityKind) -> &BTreeSet<String> {
        match kind {
            EntityKind::Person => &self.people,
            EntityKind::Organization => &self.organizations,
            EntityKind::Location => &self.locations,
        }
    }
}

/// Extract all metadata for one document.
///
/// Entity spans come from the recognizer over a bounded text prefix and
/// are kept only when they pass validation. Dates and emails come from
/// regex over the full text. Deterministic for a fixed recognizer.
pub fn extract_metadata(
    recognizer: &dyn EntityRecognizer,
    doc_id: &str,
    doc_text: &str,
) -> RawMetadata {
    let bounded = bounded_prefix(doc_text, NER_CHAR_BUDGET);

    let mut meta = RawMetadata {
        doc_id: doc_id.to_string(),
        word_count: text::word_count(doc_text),
        ..RawMetadata::default()
    };

    for span in recognizer.recognize(bounded) {
        if !is_valid_entity(&span.text, span.label) {
            continue;
        }
        let surface = span.text.trim().to_string();
        match span.label {
            NerLabel::Person => {
                meta.people.insert(surface);
            }
            NerLabel::Org => {
                meta.organizations.insert(surface);
            }
            NerLabel::Gpe | NerLabel::Loc => {
                meta.locations.insert(surface);
            }
        }
    }

    for pattern in DATE_PATTERNS.iter() {
        for found in pattern.find_iter(doc_text) {
            meta.dates.insert(found.as_str().to_string());
        }
    }

    for found in EMAIL.find_iter(doc_text) {
        meta.emails.insert(found.as_str().to_string());
    }

    debug!(
        doc_id,
        people = meta.people.len(),
        organizations = meta.organizations.len(),
        locations = meta.locations.len(),
        dates = meta.dates.len(),
        "extracted metadata"
    );

    meta
}

/// Longest prefix of `text` with at most `budget` characters, cut on a
/// char boundary.
fn bounded_prefix(text: &str, budget: usize) -> &str {
    match text.char_indices().nth(budget) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ner::LexiconRecognizer;

    fn recognizer() -> LexiconRecognizer {
        LexiconRecognizer::from_entries(
            "test",
            &[
                "Jeffrey Epstein".to_string(),
                "Ghislaine Maxwell".to_string(),
            ],
            &["Clinton Foundation".to_string()],
            &["Paris".to_string()],
        )
    }

    #[test]
    fn extracts_entities_dates_and_emails() {
        let text = "On July 15, 2015, Jeffrey Epstein met with Ghislaine Maxwell in Paris.\n\
                    The meeting was arranged via ghislaine@example.com.\n\
                    Representatives of the Clinton Foundation attended on 2015-07-12.";
        let rec = recognizer();
        let meta = extract_metadata(&rec, "doc_001", text);

        assert!(meta.people.contains("Jeffrey Epstein"));
        assert!(meta.people.contains("Ghislaine Maxwell"));
        assert!(meta.organizations.contains("Clinton Foundation"));
        assert!(meta.locations.contains("Paris"));
        assert!(meta.dates.contains("July 15, 2015"));
        assert!(meta.dates.contains("2015-07-12"));
        assert!(meta.emails.contains("ghislaine@example.com"));
        assert!(meta.word_count > 0);
    }

    #[test]
    fn date_formats() {
        let rec = LexiconRecognizer::from_entries("empty", &[], &[], &[]);
        let meta = extract_metadata(
            &rec,
            "d",
            "seen on 7/12/2015 and 7-12-2015 and Mar 3 1999 and 2020-01-31",
        );
        assert!(meta.dates.contains("7/12/2015"));
        assert!(meta.dates.contains("7-12-2015"));
        assert!(meta.dates.contains("Mar 3 1999"));
        assert!(meta.dates.contains("2020-01-31"));
    }

    #[test]
    fn spans_failing_validation_are_dropped() {
        let rec = LexiconRecognizer::from_entries(
            "noisy",
            &["Page 33".to_string(), "Jeffrey Epstein".to_string()],
            &[],
            &[],
        );
        let meta = extract_metadata(&rec, "d", "Page 33 mentions Jeffrey Epstein");
        assert_eq!(meta.people.len(), 1);
        assert!(meta.people.contains("Jeffrey Epstein"));
    }

    #[test]
    fn recognizer_input_is_bounded_but_dates_are_not() {
        let mut text = "x ".repeat(NER_CHAR_BUDGET);
        text.push_str("Jeffrey Epstein wrote on 2016-02-02");

        let rec = recognizer();
        let meta = extract_metadata(&rec, "d", &text);
        // The name sits past the recognizer budget, the date regex still
        // runs over the whole text.
        assert!(meta.people.is_empty());
        assert!(meta.dates.contains("2016-02-02"));
    }

    #[test]
    fn duplicate_mentions_collapse_to_sets() {
        let rec = recognizer();
        let meta = extract_metadata(&rec, "d", "Paris and Paris and again Paris");
        assert_eq!(meta.locations.len(), 1);
    }
}
