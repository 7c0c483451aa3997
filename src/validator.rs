//! Type-aware rejection of noisy recognizer output.
//!
//! Recognizers trained on clean prose produce junk on scanned court
//! filings and email dumps: JSON fragments, encoded characters, page
//! headers, day-of-week abbreviations. This module filters already
//! extracted entity strings; it never re-runs recognition.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::ner::NerLabel;

/// Minimum accepted surface-form length in characters.
const MIN_NAME_LENGTH: usize = 3;
/// Maximum accepted surface-form length in characters.
const MAX_NAME_LENGTH: usize = 100;

/// Patterns that disqualify a surface form regardless of type.
static INVALID_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        // JSON/HTML/XML debris
        r"[{}\[\]<>]",
        r"&[a-z]+;",
        r"</?\w+",
        r"href=|target=|class=|style=",
        // Dates are extracted separately
        r"^\d{2}-\d{2}-\d{4}",
        r"^\d{4}-\d{2}-\d{2}",
        // Special characters
        r"^[%&@#$]+",
        r"^\d+\s*$",
        r"[|\\~`]",
        // Email artifacts
        r"@\w+\.(com|org|net|edu)",
        r"mailto:",
        // Structured-data keys leaking out of exports
        r"textStyle|layout|identifier",
        // Encoding damage (=20, =3D quoted-printable runs)
        r"=\d{2}",
        // URLs
        r"https?://",
        r"www\.",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

/// Exact lowercase words rejected outright: email header fields, day and
/// month abbreviations, platforms that the recognizer mislabels as people.
static REJECT_EXACT_WORDS: &[&str] = &[
    "sender",
    "subject",
    "from",
    "sent",
    "unauthorized",
    "mon",
    "tue",
    "wed",
    "thu",
    "fri",
    "sat",
    "sun",
    "jan",
    "feb",
    "mar",
    "apr",
    "may",
    "jun",
    "jul",
    "aug",
    "sep",
    "oct",
    "nov",
    "dec",
    "twitter",
    "facebook",
    "instagram",
];

/// Common words the recognizer mistakes for person names.
static PERSON_STOPWORDS: &[&str] = &["the", "and", "page", "chapter", "section"];

/// Validate an extracted entity surface form.
///
/// Returns `true` iff the string passes every quality check for its type.
/// Pure and deterministic; never fails.
pub fn is_valid_entity(surface: &str, label: NerLabel) -> bool {
    let text = surface.trim();
    let char_count = text.chars().count();

    if char_count < MIN_NAME_LENGTH || char_count > MAX_NAME_LENGTH {
        return false;
    }

    if text.contains('\n') {
        return false;
    }

    if REJECT_EXACT_WORDS.contains(&text.to_lowercase().as_str()) {
        return false;
    }

    for pattern in INVALID_PATTERNS.iter() {
        if pattern.is_match(text) {
            return false;
        }
    }

    if !text.chars().any(|c| c.is_alphabetic()) {
        return false;
    }

    match label {
        NerLabel::Person => is_valid_person(text, char_count),
        NerLabel::Org => is_valid_org(text),
        NerLabel::Gpe | NerLabel::Loc => is_valid_location(text),
    }
}

fn is_valid_person(text: &str, char_count: usize) -> bool {
    // All-caps beyond a short acronym length is a code, not a name.
    let has_lowercase = text.chars().any(|c| c.is_lowercase());
    if !has_lowercase && char_count > 5 {
        return false;
    }
    !PERSON_STOPWORDS.contains(&text.to_lowercase().as_str())
}

fn is_valid_org(text: &str) -> bool {
    let special = text
        .chars()
        .filter(|c| !c.is_alphanumeric() && *c != ' ')
        .count();
    let ratio = special as f64 / text.chars().count() as f64;
    ratio <= 0.30
}

fn is_valid_location(text: &str) -> bool {
    if matches!(text.chars().next(), Some('&' | '%' | '#' | '@')) {
        return false;
    }
    let noisy = text
        .chars()
        .filter(|c| !c.is_alphanumeric() && !matches!(c, ' ' | '-' | '.'))
        .count();
    noisy <= 2
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_clean_person_names() {
        assert!(is_valid_entity("Jeffrey Epstein", NerLabel::Person));
        assert!(is_valid_entity("Ghislaine Maxwell", NerLabel::Person));
        assert!(is_valid_entity("Dr. Alan Dershowitz", NerLabel::Person));
    }

    #[test]
    fn rejects_noise_surface_forms() {
        // The classic junk the recognizer emits on OCR'd exhibits.
        assert!(!is_valid_entity("%%", NerLabel::Person));
        assert!(!is_valid_entity("Page 33", NerLabel::Person));
        assert!(!is_valid_entity("\",\"textStyle\":", NerLabel::Person));
        assert!(!is_valid_entity("ALLCAPSCORP", NerLabel::Person));
    }

    #[test]
    fn rejects_length_extremes() {
        assert!(!is_valid_entity("Al", NerLabel::Person));
        let long = "x".repeat(101);
        assert!(!is_valid_entity(&long, NerLabel::Person));
    }

    #[test]
    fn rejects_html_and_json_debris() {
        assert!(!is_valid_entity("&nbsp;name", NerLabel::Org));
        assert!(!is_valid_entity("{name}", NerLabel::Org));
        assert!(!is_valid_entity("<div>Epstein", NerLabel::Person));
        assert!(!is_valid_entity("name=20thing", NerLabel::Org));
    }

    #[test]
    fn rejects_leading_dates_and_pure_digits() {
        assert!(!is_valid_entity("07-12-2015 Hearing", NerLabel::Org));
        assert!(!is_valid_entity("2015-07-12 Hearing", NerLabel::Org));
        assert!(!is_valid_entity("12345", NerLabel::Person));
    }

    #[test]
    fn rejects_day_and_month_abbreviations() {
        assert!(!is_valid_entity("Fri", NerLabel::Person));
        assert!(!is_valid_entity("jul", NerLabel::Person));
    }

    #[test]
    fn rejects_embedded_newlines() {
        assert!(!is_valid_entity("Jeffrey\nEpstein", NerLabel::Person));
    }

    #[test]
    fn rejects_zero_alpha() {
        assert!(!is_valid_entity("12-34", NerLabel::Loc));
    }

    #[test]
    fn person_stopwords_rejected() {
        for word in ["the", "and", "page", "chapter", "section"] {
            assert!(!is_valid_entity(word, NerLabel::Person), "{word}");
        }
    }

    #[test]
    fn short_acronym_people_pass_long_ones_fail() {
        // Five chars or fewer all-caps could be initials.
        assert!(is_valid_entity("JFK", NerLabel::Person));
        assert!(!is_valid_entity("USDOJNY", NerLabel::Person));
    }

    #[test]
    fn org_special_char_ratio() {
        assert!(is_valid_entity("Clinton Foundation", NerLabel::Org));
        assert!(!is_valid_entity("C!!!n###", NerLabel::Org));
    }

    #[test]
    fn location_rules() {
        assert!(is_valid_entity("New York", NerLabel::Gpe));
        assert!(is_valid_entity("Little St. James", NerLabel::Loc));
        assert!(!is_valid_entity("&Paris", NerLabel::Gpe));
        assert!(!is_valid_entity("Pa?r?i?s", NerLabel::Loc));
    }

    #[test]
    fn validation_is_pure() {
        for _ in 0..3 {
            assert!(is_valid_entity("Jeffrey Epstein", NerLabel::Person));
            assert!(!is_valid_entity("%%", NerLabel::Person));
        }
    }
}
