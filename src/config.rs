//! TOML configuration parsing and validation.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub corpus: CorpusConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub matching: MatchingConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub ner: NerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CorpusConfig {
    pub root: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*.txt".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Lexical candidates fetched from BM25 before any metadata stage.
    #[serde(default = "default_bm25_candidates")]
    pub bm25_candidates: usize,
    /// Adaptive fallback threshold: fewer survivors than this triggers the
    /// next sub-strategy.
    #[serde(default = "default_min_candidates")]
    pub min_candidates: usize,
    /// Cap on the candidate set a strategy may hand to ranking.
    #[serde(default = "default_max_candidates")]
    pub max_candidates: usize,
    /// Default number of final results.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Default strategy name (`strict`, `loose`, `boost`, `adaptive`, `none`).
    #[serde(default = "default_strategy")]
    pub strategy: String,
}

fn default_bm25_candidates() -> usize {
    500
}
fn default_min_candidates() -> usize {
    50
}
fn default_max_candidates() -> usize {
    100
}
fn default_top_k() -> usize {
    10
}
fn default_strategy() -> String {
    "adaptive".to_string()
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            bm25_candidates: default_bm25_candidates(),
            min_candidates: default_min_candidates(),
            max_candidates: default_max_candidates(),
            top_k: default_top_k(),
            strategy: default_strategy(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct MatchingConfig {
    /// Minimum similarity ratio for a fuzzy entity match.
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
}

fn default_similarity_threshold() -> f64 {
    0.85
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: default_similarity_threshold(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScoringConfig {
    #[serde(default = "default_person_weight")]
    pub person_weight: f64,
    #[serde(default = "default_location_weight")]
    pub location_weight: f64,
    #[serde(default = "default_organization_weight")]
    pub organization_weight: f64,
    #[serde(default = "default_date_weight")]
    pub date_weight: f64,
}

fn default_person_weight() -> f64 {
    2.0
}
fn default_location_weight() -> f64 {
    1.5
}
fn default_organization_weight() -> f64 {
    1.5
}
fn default_date_weight() -> f64 {
    1.0
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            person_weight: default_person_weight(),
            location_weight: default_location_weight(),
            organization_weight: default_organization_weight(),
            date_weight: default_date_weight(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct NerConfig {
    /// Recognizer backend: `"lexicon"` or `"disabled"`.
    #[serde(default = "default_ner_provider")]
    pub provider: String,
    /// Lexicon file for the `lexicon` provider.
    #[serde(default)]
    pub lexicon_path: Option<PathBuf>,
}

fn default_ner_provider() -> String {
    "disabled".to_string()
}

impl Default for NerConfig {
    fn default() -> Self {
        Self {
            provider: default_ner_provider(),
            lexicon_path: None,
        }
    }
}

impl NerConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.retrieval.bm25_candidates == 0 {
        anyhow::bail!("retrieval.bm25_candidates must be > 0");
    }

    if config.retrieval.min_candidates > config.retrieval.max_candidates {
        anyhow::bail!("retrieval.min_candidates must be <= retrieval.max_candidates");
    }

    if config.retrieval.top_k == 0 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }

    config
        .retrieval
        .strategy
        .parse::<crate::models::Strategy>()
        .map_err(|e| anyhow::anyhow!(e))?;

    if !(0.0..=1.0).contains(&config.matching.similarity_threshold) {
        anyhow::bail!("matching.similarity_threshold must be in [0.0, 1.0]");
    }

    for weight in [
        config.scoring.person_weight,
        config.scoring.location_weight,
        config.scoring.organization_weight,
        config.scoring.date_weight,
    ] {
        if weight < 0.0 {
            anyhow::bail!("scoring weights must be >= 0.0");
        }
    }

    match config.ner.provider.as_str() {
        "disabled" | "lexicon" => {}
        other => anyhow::bail!("Unknown ner provider: '{}'. Must be disabled or lexicon.", other),
    }

    if config.ner.provider == "lexicon" && config.ner.lexicon_path.is_none() {
        anyhow::bail!("ner.lexicon_path must be set when provider is 'lexicon'");
    }

    Ok(config)
}
