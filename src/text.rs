//! Text cleaning, tokenization, and preview extraction.
//!
//! The tokenizer feeds both the BM25 index and word counting, so its output
//! must be identical for a given input across runs and processes. Cleaning
//! and tokenizing are independent: `tokenize(clean_text(x)) == tokenize(x)`.

use once_cell::sync::Lazy;
use regex::Regex;

/// Tokens shorter than this are discarded.
const MIN_TOKEN_LENGTH: usize = 2;

/// Preview length in characters.
const PREVIEW_LENGTH: usize = 200;

static CONTROL_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\x00-\x08\x0B\x0C\x0E-\x1F\x7F]").unwrap());
static HORIZONTAL_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]+").unwrap());
static BLANK_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n\s*\n").unwrap());

/// Clean raw document text.
///
/// Strips control characters (newline and tab survive), collapses runs of
/// horizontal whitespace to a single space, and collapses three or more
/// consecutive newlines down to two. Deterministic; never fails.
pub fn clean_text(text: &str) -> String {
    let text = CONTROL_CHARS.replace_all(text, "");
    let text = HORIZONTAL_WS.replace_all(&text, " ");
    let text = BLANK_RUNS.replace_all(&text, "\n\n");
    text.trim().to_string()
}

/// Tokenize for indexing and search.
///
/// Lowercases, substitutes every non-alphanumeric non-underscore character
/// with whitespace, splits, and drops tokens shorter than two characters.
/// Tokens therefore contain no punctuation.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|t| t.len() >= MIN_TOKEN_LENGTH)
        .map(|t| t.to_string())
        .collect()
}

/// Count tokens that contain at least one alphanumeric character.
///
/// This is the word count stored per document; pure-punctuation runs never
/// produce tokens under [`tokenize`], so the token count is the word count.
pub fn word_count(text: &str) -> u64 {
    tokenize(text).len() as u64
}

/// First [`PREVIEW_LENGTH`] characters of `text`, `...`-terminated when cut.
///
/// Operates on characters, not bytes, so multi-byte text never splits
/// mid-codepoint.
pub fn extract_preview(text: &str) -> String {
    let mut preview: String = text.chars().take(PREVIEW_LENGTH).collect();
    if text.chars().count() > PREVIEW_LENGTH {
        preview.push_str("...");
    }
    preview
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_strips_control_chars() {
        let cleaned = clean_text("a\x00b\x07c\td\ne");
        assert_eq!(cleaned, "abc d\ne");
    }

    #[test]
    fn clean_collapses_whitespace() {
        let cleaned = clean_text("multiple    spaces\t\there");
        assert_eq!(cleaned, "multiple spaces here");
    }

    #[test]
    fn clean_collapses_blank_runs() {
        let cleaned = clean_text("para one\n\n\n\npara two");
        assert_eq!(cleaned, "para one\n\npara two");
    }

    #[test]
    fn tokenize_lowercases_and_strips_punctuation() {
        let tokens = tokenize("Jeffrey Epstein met with Maxwell in Paris.");
        assert_eq!(
            tokens,
            vec!["jeffrey", "epstein", "met", "with", "maxwell", "in", "paris"]
        );
    }

    #[test]
    fn tokenize_drops_short_tokens() {
        let tokens = tokenize("a to I of x2");
        assert_eq!(tokens, vec!["to", "of", "x2"]);
    }

    #[test]
    fn tokenize_keeps_underscores() {
        let tokens = tokenize("flight_log entry");
        assert_eq!(tokens, vec!["flight_log", "entry"]);
    }

    #[test]
    fn tokenize_is_idempotent_under_cleaning() {
        let inputs = [
            "Jeffrey   Epstein,\n\n\n\nParis!!!",
            "\x00control\x07 chars\t here",
            "plain words only",
        ];
        for input in inputs {
            assert_eq!(tokenize(&clean_text(input)), tokenize(input));
        }
    }

    #[test]
    fn preview_cuts_at_200_chars() {
        let long = "x".repeat(300);
        let preview = extract_preview(&long);
        assert_eq!(preview.len(), 203);
        assert!(preview.ends_with("..."));

        let short = "short text";
        assert_eq!(extract_preview(short), short);
    }

    #[test]
    fn preview_respects_char_boundaries() {
        let text = "é".repeat(250);
        let preview = extract_preview(&text);
        assert_eq!(preview.chars().count(), 203);
    }

    #[test]
    fn word_count_ignores_punctuation_runs() {
        assert_eq!(word_count("one, two; three!!! ... ---"), 3);
        assert_eq!(word_count("!!! ???"), 0);
    }
}
