//! # Casefile
//!
//! **A local-first investigative document search engine.**
//!
//! Casefile indexes a directory of plain-text documents and answers
//! free-form queries by blending lexical relevance (Okapi BM25) with
//! structured entity matching over people, organizations, locations,
//! dates, and email addresses.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌───────────────┐
//! │  .txt files │──▶│  Extraction  │──▶│    SQLite     │
//! │  (corpus)   │   │ NER+validate │   │ entity tables │
//! └──────┬──────┘   │ +consolidate │   └───────┬───────┘
//!        │          └──────────────┘           │
//!        ▼                                     ▼
//! ┌─────────────┐                      ┌───────────────┐
//! │ BM25 index  │─────────────────────▶│  Orchestrator │──▶ ranked results
//! │ (in memory) │                      │  (strategies) │
//! └─────────────┘                      └───────────────┘
//! ```
//!
//! ## Data Flow
//!
//! 1. **Indexing** ([`ingest`]): the corpus directory is scanned for text
//!    files, each file is loaded with a UTF-8-tolerant reader, tokenized
//!    ([`text`]) into the in-memory [`bm25`] index, and run through the
//!    entity recognizer ([`ner`]). Recognized spans are filtered by the
//!    [`validator`], consolidated to canonical names ([`consolidate`]),
//!    and persisted by the [`store`].
//! 2. **Querying** ([`engine`]): BM25 produces lexical candidates while the
//!    [`query`] extractor infers typed entities from the query text through
//!    three tiers (NER, lookup, substring). The selected strategy then
//!    filters, boosts, or re-ranks the candidates using the [`store`] and
//!    the [`scorer`].
//!
//! ## Filtering Strategies
//!
//! | Strategy | Behavior |
//! |----------|----------|
//! | `strict` | All entity types must match (AND across types, OR within) |
//! | `loose` | Any entity of any type may match |
//! | `boost` | No filtering; entity matches add to the BM25 score |
//! | `adaptive` | strict → loose → boost until enough candidates survive |
//! | `none` | Pure BM25 |
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`models`] | Core data types: `Document`, `DocumentMetadata`, `RankedResult` |
//! | [`error`] | Engine error taxonomy |
//! | [`text`] | Text cleaning, tokenization, preview extraction |
//! | [`validator`] | Type-aware rejection of noisy recognizer output |
//! | [`matcher`] | Name normalization and fuzzy entity comparison |
//! | [`consolidate`] | Surface-form grouping and canonical-name election |
//! | [`ner`] | Entity recognizer trait and lexicon provider |
//! | [`extract`] | Per-document metadata extraction |
//! | [`store`] | SQLite-backed metadata store |
//! | [`bm25`] | In-memory Okapi BM25 index |
//! | [`query`] | Three-tier query entity extraction |
//! | [`scorer`] | Weighted metadata boost computation |
//! | [`engine`] | Search orchestration and strategy dispatch |
//! | [`ingest`] | Index-build pipeline |
//! | [`export`] | CSV export of entity statistics |
//! | [`metrics`] | Per-query performance observations |

pub mod bm25;
pub mod config;
pub mod consolidate;
pub mod engine;
pub mod error;
pub mod export;
pub mod extract;
pub mod ingest;
pub mod matcher;
pub mod metrics;
pub mod models;
pub mod ner;
pub mod query;
pub mod scorer;
pub mod store;
pub mod text;
pub mod validator;

pub use engine::{SearchEngine, SearchRequest, SearchResponse};
pub use error::EngineError;
pub use models::{DocumentMetadata, EntityKind, QueryEntities, RankedResult, Strategy};
