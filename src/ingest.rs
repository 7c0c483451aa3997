//! Index-build pipeline.
//!
//! Coordinates the full build: corpus scan → load → BM25 index →
//! extraction → consolidation → persistence. Per-document faults are
//! tolerated (the file is skipped and counted); a run that processed at
//! least one document succeeds.
//!
//! # Pipeline
//!
//! 1. **Scan** — walk the corpus root for files matching the include
//!    globs, minus excludes. Deterministic ordering by relative path.
//! 2. **Load** — read each file; UTF-8 first (BOM-aware), lossy
//!    replacement as the fallback so no byte sequence is fatal.
//! 3. **BM25** — tokenize and index every loaded document in memory.
//! 4. **Extract** — run the recognizer + validator + date/email regexes
//!    per document. Documents whose content fingerprint is unchanged skip
//!    recognition and reuse their stored entity sets.
//! 5. **Consolidate** — group surface variants corpus-wide, elect
//!    canonical names, and rewrite every document's entity sets.
//! 6. **Persist** — upsert each document's metadata and the alias table;
//!    prune store rows for documents no longer on disk.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use sha2::{Digest, Sha256};
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::bm25::Bm25Index;
use crate::config::Config;
use crate::consolidate::{canonical_lookup, consolidate, AliasMap, SurfaceForm};
use crate::extract::extract_metadata;
use crate::models::{Document, DocumentMetadata, EntityKind};
use crate::ner::EntityRecognizer;
use crate::store::MetadataStore;
use crate::text;

/// Counters and fault records from one build run.
#[derive(Debug, Default)]
pub struct BuildSummary {
    /// Documents loaded and indexed.
    pub documents_loaded: usize,
    /// Documents that went through recognition this run.
    pub documents_extracted: usize,
    /// Documents skipped because their fingerprint was unchanged.
    pub documents_skipped: usize,
    /// Files that could not be read.
    pub documents_failed: usize,
    /// First few offending paths, for the warning summary.
    pub failed_paths: Vec<PathBuf>,
    /// Consolidation groups produced.
    pub consolidation_groups: usize,
    /// Store rows pruned for vanished documents.
    pub documents_pruned: u64,
}

/// The built, query-ready index pair.
pub struct BuiltIndex {
    pub bm25: Arc<Bm25Index>,
    pub store: Arc<MetadataStore>,
    pub summary: BuildSummary,
}

/// Build (or refresh) the BM25 index and metadata store from the corpus.
///
/// `full` forces re-extraction even for documents whose content is
/// unchanged since the last run.
pub async fn build_index(
    config: &Config,
    recognizer: Arc<dyn EntityRecognizer>,
    full: bool,
) -> Result<BuiltIndex> {
    let mut summary = BuildSummary::default();

    let paths = scan_corpus(config)?;
    if paths.is_empty() {
        bail!(
            "no documents matched under {}",
            config.corpus.root.display()
        );
    }

    let mut documents = Vec::with_capacity(paths.len());
    for (path, doc_id) in &paths {
        match load_document(path, doc_id) {
            Ok(doc) => documents.push(doc),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping unreadable file");
                summary.documents_failed += 1;
                if summary.failed_paths.len() < 5 {
                    summary.failed_paths.push(path.clone());
                }
            }
        }
    }

    if documents.is_empty() {
        bail!("no documents could be loaded from the corpus");
    }
    summary.documents_loaded = documents.len();
    info!(documents = documents.len(), "corpus loaded");

    let bm25 = Arc::new(Bm25Index::build(&documents));
    let store = Arc::new(MetadataStore::open(&config.db.path).await?);

    // Extraction, with fingerprint-based skipping. Raw entity sets are
    // collected per document for corpus-wide consolidation afterwards.
    let mut fingerprints: BTreeMap<String, String> = BTreeMap::new();
    let mut raw_sets: BTreeMap<String, DocumentMetadata> = BTreeMap::new();

    for doc in &documents {
        let fingerprint = content_fingerprint(&doc.text);
        let unchanged = !full
            && store.fingerprint(&doc.doc_id).await?.as_deref() == Some(fingerprint.as_str());

        let meta = if unchanged {
            // Stored sets are already canonical; they re-enter
            // consolidation as ordinary surface forms.
            match store.get(&doc.doc_id).await? {
                Some(stored) => {
                    summary.documents_skipped += 1;
                    stored
                }
                None => extract_into_metadata(recognizer.as_ref(), doc, &mut summary),
            }
        } else {
            extract_into_metadata(recognizer.as_ref(), doc, &mut summary)
        };

        fingerprints.insert(doc.doc_id.clone(), fingerprint);
        raw_sets.insert(doc.doc_id.clone(), meta);
    }

    // Corpus-wide consolidation.
    let groups = consolidate(collect_surface_forms(&raw_sets), &AliasMap::builtin());
    summary.consolidation_groups = groups.len();
    let lookup = canonical_lookup(&groups);

    for meta in raw_sets.values_mut() {
        for kind in EntityKind::ALL {
            let canonicalized: BTreeSet<String> = meta
                .entities(kind)
                .iter()
                .map(|surface| {
                    lookup
                        .get(&(kind, surface.clone()))
                        .cloned()
                        .unwrap_or_else(|| surface.clone())
                })
                .collect();
            *meta.entities_mut(kind) = canonicalized;
        }
    }

    // Persist: per-document metadata, the alias table, then prune rows for
    // files that vanished from the corpus.
    for doc in &documents {
        let meta = &raw_sets[&doc.doc_id];
        store
            .put(meta, &doc.filename, &fingerprints[&doc.doc_id])
            .await
            .with_context(|| format!("storing metadata for {}", doc.doc_id))?;
    }
    store.replace_aliases(&groups).await?;

    let known: BTreeSet<String> = documents.iter().map(|d| d.doc_id.clone()).collect();
    summary.documents_pruned = store.retain_documents(&known).await?;

    info!(
        loaded = summary.documents_loaded,
        extracted = summary.documents_extracted,
        skipped = summary.documents_skipped,
        failed = summary.documents_failed,
        groups = summary.consolidation_groups,
        "index build complete"
    );

    Ok(BuiltIndex {
        bm25,
        store,
        summary,
    })
}

/// Load all corpus documents without touching the store (query-time start
/// for an already-built store).
pub fn load_corpus(config: &Config) -> Result<Vec<Document>> {
    let paths = scan_corpus(config)?;
    let mut documents = Vec::with_capacity(paths.len());
    for (path, doc_id) in &paths {
        match load_document(path, doc_id) {
            Ok(doc) => documents.push(doc),
            Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable file"),
        }
    }
    Ok(documents)
}

/// Walk the corpus root and return `(absolute path, doc_id)` pairs sorted
/// by doc id. The doc id is the corpus-relative path.
fn scan_corpus(config: &Config) -> Result<Vec<(PathBuf, String)>> {
    let root = &config.corpus.root;
    if !root.exists() {
        bail!("corpus root does not exist: {}", root.display());
    }

    let include_set = build_globset(&config.corpus.include_globs)?;
    let exclude_set = build_globset(&config.corpus.exclude_globs)?;

    let mut paths = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().replace('\\', "/");

        if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
            continue;
        }

        paths.push((path.to_path_buf(), rel_str));
    }

    paths.sort_by(|a, b| a.1.cmp(&b.1));
    Ok(paths)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

/// Read one file with charset tolerance.
///
/// UTF-8 (with or without BOM) decodes directly; UTF-16 with a BOM is
/// decoded; anything else falls back to UTF-8 with replacement characters
/// so a stray byte never fails the batch.
fn load_document(path: &Path, doc_id: &str) -> std::io::Result<Document> {
    let bytes = std::fs::read(path)?;
    let (decoded, encoding) = decode_bytes(&bytes);

    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| doc_id.to_string());

    Ok(Document {
        doc_id: doc_id.to_string(),
        filename,
        text: text::clean_text(&decoded),
        encoding,
    })
}

fn decode_bytes(bytes: &[u8]) -> (String, String) {
    // UTF-16 BOMs first; they are valid-looking UTF-8 only by accident.
    if bytes.len() >= 2 && bytes[..2] == [0xFF, 0xFE] {
        return (decode_utf16(&bytes[2..], u16::from_le_bytes), "utf-16le".to_string());
    }
    if bytes.len() >= 2 && bytes[..2] == [0xFE, 0xFF] {
        return (decode_utf16(&bytes[2..], u16::from_be_bytes), "utf-16be".to_string());
    }

    let without_bom = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(bytes);
    match std::str::from_utf8(without_bom) {
        Ok(text) => (text.to_string(), "utf-8".to_string()),
        Err(_) => (
            String::from_utf8_lossy(without_bom).into_owned(),
            "utf-8-lossy".to_string(),
        ),
    }
}

fn decode_utf16(bytes: &[u8], combine: fn([u8; 2]) -> u16) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| combine([pair[0], pair[1]]))
        .collect();
    String::from_utf16_lossy(&units)
}

fn content_fingerprint(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn extract_into_metadata(
    recognizer: &dyn EntityRecognizer,
    doc: &Document,
    summary: &mut BuildSummary,
) -> DocumentMetadata {
    let raw = extract_metadata(recognizer, &doc.doc_id, &doc.text);
    summary.documents_extracted += 1;
    DocumentMetadata {
        doc_id: raw.doc_id,
        word_count: raw.word_count,
        people: raw.people,
        organizations: raw.organizations,
        locations: raw.locations,
        dates: raw.dates,
        emails: raw.emails,
    }
}

fn collect_surface_forms(raw_sets: &BTreeMap<String, DocumentMetadata>) -> Vec<SurfaceForm> {
    let mut by_surface: BTreeMap<(EntityKind, String), BTreeSet<String>> = BTreeMap::new();

    for (doc_id, meta) in raw_sets {
        for kind in EntityKind::ALL {
            for surface in meta.entities(kind) {
                by_surface
                    .entry((kind, surface.clone()))
                    .or_default()
                    .insert(doc_id.clone());
            }
        }
    }

    by_surface
        .into_iter()
        .map(|((kind, surface), doc_ids)| SurfaceForm {
            surface,
            kind,
            doc_ids,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CorpusConfig, DbConfig, MatchingConfig, NerConfig, RetrievalConfig, ScoringConfig};
    use crate::ner::LexiconRecognizer;

    fn test_config(root: &Path, db: &Path) -> Config {
        Config {
            db: DbConfig {
                path: db.to_path_buf(),
            },
            corpus: CorpusConfig {
                root: root.to_path_buf(),
                include_globs: vec!["**/*.txt".to_string()],
                exclude_globs: vec![],
            },
            retrieval: RetrievalConfig::default(),
            matching: MatchingConfig::default(),
            scoring: ScoringConfig::default(),
            ner: NerConfig::default(),
        }
    }

    fn recognizer() -> Arc<dyn EntityRecognizer> {
        Arc::new(LexiconRecognizer::from_entries(
            "test",
            &["Jeffrey Epstein".to_string(), "Epstein".to_string()],
            &[],
            &["Paris".to_string(), "U.S.".to_string(), "America".to_string()],
        ))
    }

    #[tokio::test]
    async fn build_indexes_and_persists() {
        let tmp = tempfile::tempdir().unwrap();
        let docs_dir = tmp.path().join("docs");
        std::fs::create_dir_all(&docs_dir).unwrap();
        std::fs::write(
            docs_dir.join("a.txt"),
            "Jeffrey Epstein flew to Paris on 2015-07-12.",
        )
        .unwrap();
        std::fs::write(docs_dir.join("b.txt"), "Notes about the U.S. and America.").unwrap();
        std::fs::write(docs_dir.join("ignored.md"), "not part of the corpus").unwrap();

        let config = test_config(&docs_dir, &tmp.path().join("meta.sqlite"));
        let built = build_index(&config, recognizer(), false).await.unwrap();

        assert_eq!(built.summary.documents_loaded, 2);
        assert_eq!(built.summary.documents_extracted, 2);
        assert_eq!(built.bm25.len(), 2);

        let meta = built.store.get("a.txt").await.unwrap().unwrap();
        assert!(meta.people.contains("Jeffrey Epstein"));
        assert!(meta.locations.contains("Paris"));
        assert!(meta.dates.contains("2015-07-12"));

        // "U.S." and "America" consolidate to the predefined canonical.
        let meta_b = built.store.get("b.txt").await.unwrap().unwrap();
        assert_eq!(
            meta_b.locations,
            ["United States".to_string()].into_iter().collect()
        );
    }

    #[tokio::test]
    async fn unchanged_documents_skip_extraction() {
        let tmp = tempfile::tempdir().unwrap();
        let docs_dir = tmp.path().join("docs");
        std::fs::create_dir_all(&docs_dir).unwrap();
        std::fs::write(docs_dir.join("a.txt"), "Epstein in Paris.").unwrap();

        let config = test_config(&docs_dir, &tmp.path().join("meta.sqlite"));

        let first = build_index(&config, recognizer(), false).await.unwrap();
        assert_eq!(first.summary.documents_extracted, 1);
        assert_eq!(first.summary.documents_skipped, 0);

        let second = build_index(&config, recognizer(), false).await.unwrap();
        assert_eq!(second.summary.documents_extracted, 0);
        assert_eq!(second.summary.documents_skipped, 1);

        let forced = build_index(&config, recognizer(), true).await.unwrap();
        assert_eq!(forced.summary.documents_extracted, 1);
    }

    #[tokio::test]
    async fn vanished_documents_are_pruned() {
        let tmp = tempfile::tempdir().unwrap();
        let docs_dir = tmp.path().join("docs");
        std::fs::create_dir_all(&docs_dir).unwrap();
        std::fs::write(docs_dir.join("a.txt"), "Epstein in Paris.").unwrap();
        std::fs::write(docs_dir.join("b.txt"), "Paris again.").unwrap();

        let config = test_config(&docs_dir, &tmp.path().join("meta.sqlite"));
        build_index(&config, recognizer(), false).await.unwrap();

        std::fs::remove_file(docs_dir.join("b.txt")).unwrap();
        let rebuilt = build_index(&config, recognizer(), false).await.unwrap();
        assert_eq!(rebuilt.summary.documents_pruned, 1);
        assert!(rebuilt.store.get("b.txt").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn undecodable_bytes_fall_back_to_lossy() {
        let tmp = tempfile::tempdir().unwrap();
        let docs_dir = tmp.path().join("docs");
        std::fs::create_dir_all(&docs_dir).unwrap();
        std::fs::write(docs_dir.join("weird.txt"), [0x45, 0x70, 0xFF, 0xFE, 0x73]).unwrap();
        std::fs::write(docs_dir.join("fine.txt"), "Paris notes").unwrap();

        let config = test_config(&docs_dir, &tmp.path().join("meta.sqlite"));
        let built = build_index(&config, recognizer(), false).await.unwrap();
        // Both load; the malformed one via replacement characters.
        assert_eq!(built.summary.documents_loaded, 2);
        assert_eq!(built.summary.documents_failed, 0);
    }

    #[tokio::test]
    async fn empty_corpus_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let docs_dir = tmp.path().join("docs");
        std::fs::create_dir_all(&docs_dir).unwrap();

        let config = test_config(&docs_dir, &tmp.path().join("meta.sqlite"));
        assert!(build_index(&config, recognizer(), false).await.is_err());
    }

    #[test]
    fn utf16_bom_decodes() {
        let text = "Paris";
        let mut le = vec![0xFF, 0xFE];
        for unit in text.encode_utf16() {
            le.extend_from_slice(&unit.to_le_bytes());
        }
        let (decoded, encoding) = decode_bytes(&le);
        assert_eq!(decoded, "Paris");
        assert_eq!(encoding, "utf-16le");

        let (plain, encoding) = decode_bytes("Paris".as_bytes());
        assert_eq!(plain, "Paris");
        assert_eq!(encoding, "utf-8");
    }
}
