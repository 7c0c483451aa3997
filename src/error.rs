//! Engine error taxonomy.
//!
//! Query operations degrade gracefully instead of raising for data issues
//! (missing metadata, empty queries); the variants here cover the faults
//! that must reach the caller.

use std::path::PathBuf;

/// Errors surfaced by the search engine and its build pipeline.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A corpus file could not be read or decoded. Recovered per-file
    /// during indexing; fatal only when the whole corpus is unreadable.
    #[error("unreadable input: {path}")]
    Input {
        /// Offending file path.
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The entity recognizer could not be constructed. Fatal at startup.
    #[error("entity recognizer unavailable: {0}")]
    NerUnavailable(String),

    /// Metadata store failure that survived the retry.
    #[error("metadata store error")]
    Store(#[from] sqlx::Error),

    /// Caller-supplied argument violated the search contract.
    #[error("invalid search argument: {0}")]
    InvalidArgument(String),

    /// A document is present in one index but missing from the other.
    /// Logged once per id and treated as no-metadata at query time.
    #[error("index inconsistency for document {doc_id}")]
    Consistency {
        /// Document id present on only one side.
        doc_id: String,
    },
}

/// Convenience alias used throughout the engine modules.
pub type EngineResult<T> = Result<T, EngineError>;
