//! In-memory Okapi BM25 index.
//!
//! The lexical tier of the search engine: documents are tokenized once at
//! build time, the index is immutable afterwards, and scoring is the
//! standard Okapi formulation with the constant-add IDF that keeps scores
//! non-negative for very frequent terms.
//!
//! Ranking is deterministic: score descending, then `doc_id` ascending on
//! ties, for fixed inputs across runs and processes.

use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::debug;

use crate::models::Document;
use crate::text;

/// BM25 parameters.
#[derive(Debug, Clone, Copy)]
pub struct Bm25Params {
    /// Term-frequency saturation.
    pub k1: f64,
    /// Document-length normalization.
    pub b: f64,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self { k1: 1.5, b: 0.75 }
    }
}

/// A scored lexical candidate.
#[derive(Debug, Clone)]
pub struct LexicalHit {
    pub doc_id: String,
    pub score: f64,
}

#[derive(Debug)]
struct IndexedDocument {
    /// Term → occurrences within this document.
    term_freqs: HashMap<String, u32>,
    /// Token count.
    doc_len: u32,
    filename: String,
    /// Raw text retained for preview generation.
    raw_text: String,
}

/// Immutable BM25 index over a document corpus.
///
/// Built once from the full document set; read-only afterwards, so shared
/// references across query threads need no locking.
#[derive(Debug)]
pub struct Bm25Index {
    params: Bm25Params,
    /// Documents keyed by id. BTreeMap keeps iteration order stable, which
    /// makes tie-breaking and tests reproducible.
    documents: BTreeMap<String, IndexedDocument>,
    /// Term → number of documents containing it.
    doc_freqs: HashMap<String, u32>,
    total_doc_len: u64,
}

impl Bm25Index {
    /// Build an index from a document set with default parameters.
    pub fn build(documents: &[Document]) -> Self {
        Self::build_with_params(documents, Bm25Params::default())
    }

    /// Build an index with explicit parameters.
    pub fn build_with_params(documents: &[Document], params: Bm25Params) -> Self {
        let mut index = Self {
            params,
            documents: BTreeMap::new(),
            doc_freqs: HashMap::new(),
            total_doc_len: 0,
        };

        for doc in documents {
            let tokens = text::tokenize(&doc.text);

            let mut term_freqs: HashMap<String, u32> = HashMap::new();
            for token in &tokens {
                *term_freqs.entry(token.clone()).or_insert(0) += 1;
            }

            for term in term_freqs.keys() {
                *index.doc_freqs.entry(term.clone()).or_insert(0) += 1;
            }

            let doc_len = tokens.len() as u32;
            index.total_doc_len += u64::from(doc_len);
            index.documents.insert(
                doc.doc_id.clone(),
                IndexedDocument {
                    term_freqs,
                    doc_len,
                    filename: doc.filename.clone(),
                    raw_text: doc.text.clone(),
                },
            );
        }

        debug!(
            documents = index.documents.len(),
            terms = index.doc_freqs.len(),
            "BM25 index built"
        );
        index
    }

    /// Number of indexed documents.
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    /// True when no documents are indexed.
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Iterate indexed document ids in ascending order.
    pub fn doc_ids(&self) -> impl Iterator<Item = &str> {
        self.documents.keys().map(|s| s.as_str())
    }

    /// Display file name for a document, if indexed.
    pub fn filename(&self, doc_id: &str) -> Option<&str> {
        self.documents.get(doc_id).map(|d| d.filename.as_str())
    }

    /// Preview text for a document, if indexed.
    pub fn preview(&self, doc_id: &str) -> Option<String> {
        self.documents
            .get(doc_id)
            .map(|d| text::extract_preview(&d.raw_text))
    }

    /// Search the corpus.
    ///
    /// Tokenizes the query, scores every document containing at least one
    /// query term, keeps strictly positive scores, and returns the top
    /// `top_k` ordered by score descending with ties broken by ascending
    /// `doc_id`. An empty-tokenizing query returns an empty list.
    pub fn search(&self, query: &str, top_k: usize) -> Vec<LexicalHit> {
        if top_k == 0 || self.documents.is_empty() {
            return Vec::new();
        }

        let query_tokens = text::tokenize(query);
        if query_tokens.is_empty() {
            debug!(query, "query produced no tokens");
            return Vec::new();
        }

        let unique_terms: HashSet<&str> = query_tokens.iter().map(|t| t.as_str()).collect();
        let avg_doc_len = self.total_doc_len as f64 / self.documents.len() as f64;

        let mut hits: Vec<LexicalHit> = self
            .documents
            .iter()
            .map(|(doc_id, doc)| LexicalHit {
                doc_id: doc_id.clone(),
                score: self.score_document(doc, &unique_terms, avg_doc_len),
            })
            .filter(|hit| hit.score > 0.0)
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.doc_id.cmp(&b.doc_id))
        });
        hits.truncate(top_k);
        hits
    }

    fn score_document(
        &self,
        doc: &IndexedDocument,
        query_terms: &HashSet<&str>,
        avg_doc_len: f64,
    ) -> f64 {
        let Bm25Params { k1, b } = self.params;
        let n = self.documents.len() as f64;
        let mut score = 0.0;

        for term in query_terms {
            let tf = doc.term_freqs.get(*term).copied().unwrap_or(0) as f64;
            if tf == 0.0 {
                continue;
            }
            let df = self.doc_freqs.get(*term).copied().unwrap_or(0) as f64;
            if df == 0.0 {
                continue;
            }

            // Constant-add IDF: non-negative even for terms in most docs.
            let idf = ((n - df + 0.5) / (df + 0.5) + 1.0).ln();

            let dl = f64::from(doc.doc_len);
            let tf_norm = tf * (k1 + 1.0) / (tf + k1 * (1.0 - b + b * dl / avg_doc_len));

            score += idf * tf_norm;
        }

        score
    }
}
