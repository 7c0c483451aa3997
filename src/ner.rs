//! Entity recognizer abstraction and implementations.
//!
//! Defines the [`EntityRecognizer`] trait and concrete implementations:
//! - **[`LexiconRecognizer`]** — deterministic gazetteer matching against a
//!   TOML lexicon of known names. Used by the CLI and the test suite.
//! - The `"disabled"` provider refuses to construct; indexing cannot run
//!   without a recognizer, and the failure surfaces at startup.
//!
//! Heavier model-backed recognizers plug in behind the same trait; the rest
//! of the engine only ever sees typed spans.
//!
//! # Provider Selection
//!
//! Use [`create_recognizer`] to instantiate the provider named in the
//! configuration:
//!
//! ```rust,no_run
//! # use casefile::config::NerConfig;
//! # use casefile::ner::create_recognizer;
//! let config = NerConfig::default(); // provider = "disabled"
//! assert!(create_recognizer(&config).is_err());
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;

use crate::error::EngineError;

/// Span label emitted by a recognizer.
///
/// GPE (countries, cities, states) and LOC (physical locations) are kept
/// separate here because validation rules differ slightly; downstream both
/// fold into the location entity kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NerLabel {
    Person,
    Org,
    Gpe,
    Loc,
}

/// A typed span of text reported by a recognizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntitySpan {
    /// Surface text as it appears in the document, boundary punctuation
    /// trimmed.
    pub text: String,
    /// Span label.
    pub label: NerLabel,
}

/// A named-entity recognizer.
///
/// Implementations must be deterministic for a fixed input and safe to
/// share across threads; the same instance recognizes both documents at
/// index time and queries at search time.
pub trait EntityRecognizer: Send + Sync {
    /// Identifier of the backing model or lexicon, for diagnostics.
    fn name(&self) -> &str;

    /// Extract typed spans from `text`.
    fn recognize(&self, text: &str) -> Vec<EntitySpan>;
}

/// Construct the recognizer named by the configuration.
///
/// # Errors
///
/// [`EngineError::NerUnavailable`] when the provider is `"disabled"`,
/// unknown, or the lexicon file cannot be loaded. Fatal at startup by
/// design: an index built without entities is not worth building.
pub fn create_recognizer(
    config: &crate::config::NerConfig,
) -> Result<Arc<dyn EntityRecognizer>, EngineError> {
    match config.provider.as_str() {
        "lexicon" => {
            let path = config.lexicon_path.as_ref().ok_or_else(|| {
                EngineError::NerUnavailable("ner.lexicon_path is not set".to_string())
            })?;
            let recognizer = LexiconRecognizer::from_file(path)?;
            Ok(Arc::new(recognizer))
        }
        "disabled" => Err(EngineError::NerUnavailable(
            "ner.provider is 'disabled'".to_string(),
        )),
        other => Err(EngineError::NerUnavailable(format!(
            "unknown ner provider: {other}"
        ))),
    }
}

/// On-disk lexicon format: one name list per entity kind.
#[derive(Debug, Deserialize, Default)]
struct LexiconFile {
    #[serde(default)]
    people: Vec<String>,
    #[serde(default)]
    organizations: Vec<String>,
    #[serde(default)]
    locations: Vec<String>,
}

/// Gazetteer recognizer backed by a fixed lexicon of known names.
///
/// Scans whitespace-delimited words and reports the longest
/// case-insensitive lexicon match starting at each position. Matching is
/// word-boundary aligned: "Paris" matches in "flew to Paris," but not
/// inside "comparison".
pub struct LexiconRecognizer {
    name: String,
    /// Normalized token sequence (space-joined) → label.
    entries: HashMap<String, NerLabel>,
    /// Longest entry length in words, bounding the scan window.
    max_words: usize,
}

impl LexiconRecognizer {
    /// Load a lexicon from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, EngineError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            EngineError::NerUnavailable(format!(
                "cannot read lexicon {}: {e}",
                path.display()
            ))
        })?;
        let file: LexiconFile = toml::from_str(&content).map_err(|e| {
            EngineError::NerUnavailable(format!(
                "cannot parse lexicon {}: {e}",
                path.display()
            ))
        })?;

        let display = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "lexicon".to_string());

        Ok(Self::from_entries(
            &display,
            &file.people,
            &file.organizations,
            &file.locations,
        ))
    }

    /// Build a recognizer from in-memory name lists.
    pub fn from_entries(
        name: &str,
        people: &[String],
        organizations: &[String],
        locations: &[String],
    ) -> Self {
        let mut entries = HashMap::new();
        let mut max_words = 1;

        let mut add = |names: &[String], label: NerLabel| {
            for entity in names {
                let key = normalize_words(entity);
                if key.is_empty() {
                    continue;
                }
                max_words = max_words.max(key.split(' ').count());
                entries.insert(key, label);
            }
        };

        add(people, NerLabel::Person);
        add(organizations, NerLabel::Org);
        add(locations, NerLabel::Gpe);

        Self {
            name: name.to_string(),
            entries,
            max_words,
        }
    }

    /// Number of lexicon entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when the lexicon holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl EntityRecognizer for LexiconRecognizer {
    fn name(&self) -> &str {
        &self.name
    }

    fn recognize(&self, text: &str) -> Vec<EntitySpan> {
        let words: Vec<&str> = text.split_whitespace().collect();
        let normalized: Vec<String> = words.iter().map(|w| normalize_word(w)).collect();

        let mut spans = Vec::new();
        let mut i = 0;

        while i < words.len() {
            let mut matched = false;
            let window = self.max_words.min(words.len() - i);

            for n in (1..=window).rev() {
                let candidate = normalized[i..i + n].join(" ");
                if candidate.is_empty() {
                    continue;
                }
                if let Some(&label) = self.entries.get(&candidate) {
                    spans.push(EntitySpan {
                        text: surface_slice(&words[i..i + n]),
                        label,
                    });
                    i += n;
                    matched = true;
                    break;
                }
            }

            if !matched {
                i += 1;
            }
        }

        spans
    }
}

/// Join document words back into a display surface, boundary punctuation
/// trimmed per word edge.
fn surface_slice(words: &[&str]) -> String {
    let mut parts: Vec<String> = words.iter().map(|w| w.to_string()).collect();
    if let Some(first) = parts.first_mut() {
        *first = first
            .trim_start_matches(|c: char| !c.is_alphanumeric())
            .to_string();
    }
    if let Some(last) = parts.last_mut() {
        *last = trim_word_end(last);
    }
    parts.join(" ")
}

/// Trim trailing punctuation from a word. Dotted abbreviations keep their
/// final dot, so "U.S.," yields "U.S." while "Paris." yields "Paris".
fn trim_word_end(word: &str) -> String {
    let trimmed = word.trim_end_matches(|c: char| !c.is_alphanumeric());
    if trimmed.contains('.') && word[trimmed.len()..].starts_with('.') {
        format!("{trimmed}.")
    } else {
        trimmed.to_string()
    }
}

/// Lowercase a single word and trim boundary punctuation (inner dots and
/// hyphens survive so "U.S." and "Jean-Luc" stay intact).
fn normalize_word(word: &str) -> String {
    word.trim_matches(|c: char| !c.is_alphanumeric())
        .to_lowercase()
}

/// Normalize a multi-word lexicon entry the same way document words are.
fn normalize_words(entity: &str) -> String {
    entity
        .split_whitespace()
        .map(normalize_word)
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recognizer() -> LexiconRecognizer {
        LexiconRecognizer::from_entries(
            "test",
            &[
                "Jeffrey Epstein".to_string(),
                "Ghislaine Maxwell".to_string(),
                "Alan Dershowitz".to_string(),
            ],
            &["Clinton Foundation".to_string()],
            &["Paris".to_string(), "New York".to_string()],
        )
    }

    #[test]
    fn recognizes_multi_word_names() {
        let spans = recognizer().recognize("Jeffrey Epstein met with Ghislaine Maxwell in Paris.");
        assert_eq!(spans.len(), 3);
        assert_eq!(spans[0].text, "Jeffrey Epstein");
        assert_eq!(spans[0].label, NerLabel::Person);
        assert_eq!(spans[2].text, "Paris");
        assert_eq!(spans[2].label, NerLabel::Gpe);
    }

    #[test]
    fn matching_is_case_insensitive_and_trims_punctuation() {
        let spans = recognizer().recognize("flew to paris, then NEW YORK!");
        let texts: Vec<&str> = spans.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts, vec!["paris", "NEW YORK"]);
    }

    #[test]
    fn longest_match_wins() {
        let rec = LexiconRecognizer::from_entries(
            "test",
            &["Maxwell".to_string(), "Ghislaine Maxwell".to_string()],
            &[],
            &[],
        );
        let spans = rec.recognize("Ghislaine Maxwell attended.");
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].text, "Ghislaine Maxwell");
    }

    #[test]
    fn no_substring_matches_inside_words() {
        let spans = recognizer().recognize("a comparison of appraisals");
        assert!(spans.is_empty());
    }

    #[test]
    fn disabled_provider_fails_at_startup() {
        let config = crate::config::NerConfig::default();
        let err = match create_recognizer(&config) {
            Err(e) => e,
            Ok(_) => panic!("expected create_recognizer to fail"),
        };
        assert!(matches!(err, EngineError::NerUnavailable(_)));
    }

    #[test]
    fn lexicon_file_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("lexicon.toml");
        std::fs::write(
            &path,
            r#"
people = ["Jeffrey Epstein"]
organizations = ["FBI"]
locations = ["Paris"]
"#,
        )
        .unwrap();

        let rec = LexiconRecognizer::from_file(&path).unwrap();
        assert_eq!(rec.len(), 3);
        let spans = rec.recognize("The FBI interviewed Jeffrey Epstein in Paris");
        assert_eq!(spans.len(), 3);
    }
}
