//! # Casefile CLI (`casefile`)
//!
//! The `casefile` binary is the front end for the search engine. It builds
//! the index from a corpus directory, runs queries against it, inspects
//! stored metadata, and exports entity statistics as CSV.
//!
//! ## Usage
//!
//! ```bash
//! casefile --config ./config/casefile.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `casefile init` | Scan the corpus, extract metadata, persist the store |
//! | `casefile search "<query>"` | Query with a selectable filtering strategy |
//! | `casefile get <doc_id>` | Print stored metadata for one document |
//! | `casefile entities` | List canonical entities, optionally with counts |
//! | `casefile export <layout>` | Write entity statistics as CSV |
//!
//! ## Exit codes
//!
//! | Code | Meaning |
//! |------|---------|
//! | 0 | Success (including "no results") |
//! | 1 | Startup fault (bad config, recognizer unavailable, store error) |
//! | 2 | Index missing — run `casefile init` first |
//! | 64 | Usage error |

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use casefile::config::{self, Config};
use casefile::engine::{EngineParams, SearchEngine, SearchRequest};
use casefile::export;
use casefile::ingest;
use casefile::metrics::SearchMetrics;
use casefile::models::{EntityKind, FilterCriteria, Strategy};
use casefile::ner::create_recognizer;
use casefile::store::MetadataStore;

/// Casefile — local-first investigative document search.
///
/// All commands read a TOML configuration file naming the corpus
/// directory, the metadata database path, and the retrieval tunables.
#[derive(Parser)]
#[command(
    name = "casefile",
    about = "Hybrid BM25 + entity-metadata search over a plain-text corpus",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/casefile.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Build the index: scan the corpus, extract and consolidate entity
    /// metadata, and persist it. Idempotent; unchanged documents skip the
    /// expensive recognition step.
    Init {
        /// Re-extract every document even when its content is unchanged.
        #[arg(long)]
        full: bool,
    },

    /// Search the corpus.
    Search {
        /// The query string.
        query: String,

        /// Number of results to return.
        #[arg(long, default_value_t = 10)]
        top_k: usize,

        /// Filtering strategy: strict, loose, boost, adaptive, or none.
        /// Defaults to the configured strategy.
        #[arg(long)]
        strategy: Option<Strategy>,

        /// Require this person (repeatable).
        #[arg(long = "person")]
        people: Vec<String>,

        /// Require this organization (repeatable).
        #[arg(long = "org")]
        organizations: Vec<String>,

        /// Require this location (repeatable).
        #[arg(long = "location")]
        locations: Vec<String>,

        /// Date range lower bound (inclusive, compared as strings).
        #[arg(long = "from", requires = "date_to")]
        date_from: Option<String>,

        /// Date range upper bound (inclusive, compared as strings).
        #[arg(long = "to", requires = "date_from")]
        date_to: Option<String>,

        /// Emit results as JSON instead of text.
        #[arg(long)]
        json: bool,

        /// Print a performance summary after the results.
        #[arg(long)]
        stats: bool,
    },

    /// Print stored metadata for one document.
    Get {
        /// Document id (corpus-relative path).
        doc_id: String,
    },

    /// List canonical entities known to the store.
    Entities {
        /// Restrict to one kind: people, organizations, or locations.
        #[arg(long)]
        kind: Option<EntityKind>,

        /// Include per-entity document counts.
        #[arg(long)]
        frequencies: bool,

        /// Maximum entities to print per kind.
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },

    /// Export entity statistics as CSV.
    Export {
        #[command(subcommand)]
        layout: ExportLayout,
    },
}

/// CSV export layouts.
#[derive(Subcommand)]
enum ExportLayout {
    /// `Entity Type, Entity, Document Count` across all kinds.
    Frequencies {
        /// Output file; stdout when omitted.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// `Entity, Document Count, Document IDs` for one kind.
    Documents {
        /// Entity kind to export.
        #[arg(long, default_value = "people")]
        kind: EntityKind,
        /// Output file; stdout when omitted.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Square co-occurrence matrix for one kind.
    Cooccurrence {
        /// Entity kind to export.
        #[arg(long, default_value = "people")]
        kind: EntityKind,
        /// Matrix size cap.
        #[arg(long, default_value_t = 50)]
        limit: usize,
        /// Output file; stdout when omitted.
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
                _ => 64,
            };
            let _ = e.print();
            return ExitCode::from(code);
        }
    };

    let config = match config::load_config(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e:#}");
            return ExitCode::from(1);
        }
    };

    let outcome = match cli.command {
        Commands::Init { full } => run_init(&config, full).await,
        Commands::Search {
            query,
            top_k,
            strategy,
            people,
            organizations,
            locations,
            date_from,
            date_to,
            json,
            stats,
        } => {
            let filters = FilterCriteria {
                people,
                organizations,
                locations,
                date_range: date_from.zip(date_to),
            };
            run_search(&config, &query, top_k, strategy, filters, json, stats).await
        }
        Commands::Get { doc_id } => run_get(&config, &doc_id).await,
        Commands::Entities {
            kind,
            frequencies,
            limit,
        } => run_entities(&config, kind, frequencies, limit).await,
        Commands::Export { layout } => run_export(&config, layout).await,
    };

    match outcome {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(1)
        }
    }
}

async fn run_init(config: &Config, full: bool) -> Result<ExitCode> {
    let recognizer = create_recognizer(&config.ner).context("loading entity recognizer")?;
    let built = ingest::build_index(config, recognizer, full).await?;
    let summary = &built.summary;

    println!("index built");
    println!("  documents: {}", summary.documents_loaded);
    println!("  extracted: {}", summary.documents_extracted);
    println!("  unchanged: {}", summary.documents_skipped);
    println!("  consolidation groups: {}", summary.consolidation_groups);
    if summary.documents_pruned > 0 {
        println!("  pruned from store: {}", summary.documents_pruned);
    }
    if summary.documents_failed > 0 {
        println!(
            "warning: {} file(s) could not be read, e.g.:",
            summary.documents_failed
        );
        for path in &summary.failed_paths {
            println!("  {}", path.display());
        }
    }
    println!("ok");
    Ok(ExitCode::SUCCESS)
}

/// Open the store, failing with exit code 2 when the index was never built.
async fn open_existing_store(config: &Config) -> Result<Result<MetadataStore, ExitCode>> {
    if !config.db.path.exists() {
        eprintln!(
            "error: index not found at {}. Run `casefile init` first.",
            config.db.path.display()
        );
        return Ok(Err(ExitCode::from(2)));
    }
    Ok(Ok(MetadataStore::open(&config.db.path).await?))
}

#[allow(clippy::too_many_arguments)]
async fn run_search(
    config: &Config,
    query: &str,
    top_k: usize,
    strategy: Option<Strategy>,
    filters: FilterCriteria,
    json: bool,
    stats: bool,
) -> Result<ExitCode> {
    let store = match open_existing_store(config).await? {
        Ok(store) => Arc::new(store),
        Err(code) => return Ok(code),
    };

    let strategy = match strategy {
        Some(strategy) => strategy,
        None => config
            .retrieval
            .strategy
            .parse()
            .expect("validated at config load"),
    };

    let recognizer = create_recognizer(&config.ner).context("loading entity recognizer")?;

    let documents = ingest::load_corpus(config)?;
    let bm25 = Arc::new(casefile::bm25::Bm25Index::build(&documents));

    let engine = SearchEngine::new(
        bm25,
        Arc::clone(&store),
        recognizer,
        EngineParams::from_config(config),
    )
    .await?;

    let started = Instant::now();
    let request = SearchRequest {
        query,
        top_k,
        strategy,
        filters: if filters.is_empty() {
            None
        } else {
            Some(&filters)
        },
        cancel: None,
    };
    let response = engine.search(&request).await?;
    let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

    if json {
        println!("{}", serde_json::to_string_pretty(&response.results)?);
    } else if response.results.is_empty() {
        println!("No results.");
    } else {
        for (i, result) in response.results.iter().enumerate() {
            println!("{}. {} [{:.3}]", i + 1, result.filename, result.final_score);
            if result.metadata_score > 0.0 {
                println!(
                    "   bm25 {:.3} + boost {:.1}",
                    result.bm25_score, result.metadata_score
                );
            }
            println!("   {}", result.preview.replace('\n', " "));

            let matched = &result.matched_entities;
            let mut parts = Vec::new();
            if !matched.people.is_empty() {
                parts.push(format!(
                    "people: {}",
                    matched.people.iter().cloned().collect::<Vec<_>>().join(", ")
                ));
            }
            if !matched.organizations.is_empty() {
                parts.push(format!(
                    "orgs: {}",
                    matched
                        .organizations
                        .iter()
                        .cloned()
                        .collect::<Vec<_>>()
                        .join(", ")
                ));
            }
            if !matched.locations.is_empty() {
                parts.push(format!(
                    "locations: {}",
                    matched
                        .locations
                        .iter()
                        .cloned()
                        .collect::<Vec<_>>()
                        .join(", ")
                ));
            }
            if !parts.is_empty() {
                println!("   matched {}", parts.join(" | "));
            }
            println!();
        }
        println!(
            "strategy: {} ({} of {} candidates, {:.0} ms)",
            response.strategy_applied,
            response.filtered_candidates,
            response.bm25_candidates,
            elapsed_ms
        );
    }

    if stats {
        let mut metrics = SearchMetrics::new();
        metrics.record(response.observation(query, elapsed_ms));
        println!("\n{}", metrics.report());
    }

    Ok(ExitCode::SUCCESS)
}

async fn run_get(config: &Config, doc_id: &str) -> Result<ExitCode> {
    let store = match open_existing_store(config).await? {
        Ok(store) => store,
        Err(code) => return Ok(code),
    };

    match store.get(doc_id).await? {
        Some(meta) => {
            println!("{}", serde_json::to_string_pretty(&meta)?);
            Ok(ExitCode::SUCCESS)
        }
        None => {
            eprintln!("no metadata for document: {doc_id}");
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn run_entities(
    config: &Config,
    kind: Option<EntityKind>,
    frequencies: bool,
    limit: usize,
) -> Result<ExitCode> {
    let store = match open_existing_store(config).await? {
        Ok(store) => store,
        Err(code) => return Ok(code),
    };

    let kinds: Vec<EntityKind> = match kind {
        Some(kind) => vec![kind],
        None => EntityKind::ALL.to_vec(),
    };

    for kind in kinds {
        let freqs = store.frequencies(kind).await?;
        println!("{} ({} unique):", kind.label(), freqs.len());
        for (name, count) in freqs.iter().take(limit) {
            if frequencies {
                println!("  {name} ({count})");
            } else {
                println!("  {name}");
            }
        }
        if freqs.len() > limit {
            println!("  ... and {} more", freqs.len() - limit);
        }
        println!();
    }

    Ok(ExitCode::SUCCESS)
}

async fn run_export(config: &Config, layout: ExportLayout) -> Result<ExitCode> {
    let store = match open_existing_store(config).await? {
        Ok(store) => store,
        Err(code) => return Ok(code),
    };

    let output = match &layout {
        ExportLayout::Frequencies { output }
        | ExportLayout::Documents { output, .. }
        | ExportLayout::Cooccurrence { output, .. } => output.clone(),
    };
    let mut buffer = Vec::new();

    match layout {
        ExportLayout::Frequencies { .. } => {
            export::export_frequencies(&store, &mut buffer).await?;
        }
        ExportLayout::Documents { kind, .. } => {
            export::export_documents(&store, kind, &mut buffer).await?;
        }
        ExportLayout::Cooccurrence { kind, limit, .. } => {
            export::export_cooccurrence(&store, kind, limit, &mut buffer).await?;
        }
    }

    match output {
        Some(path) => {
            std::fs::write(&path, &buffer)
                .with_context(|| format!("writing {}", path.display()))?;
            println!("wrote {}", path.display());
        }
        None => {
            print!("{}", String::from_utf8_lossy(&buffer));
        }
    }

    Ok(ExitCode::SUCCESS)
}
