//! Search orchestration and strategy dispatch.
//!
//! Ties the tiers together: BM25 produces lexical candidates, the query
//! extractor infers typed entities, and the selected strategy decides how
//! entity metadata reshapes the candidate list before the top-k cut.
//!
//! All indexes are immutable at query time; the orchestrator holds them by
//! `Arc` and can serve queries from any number of threads. A cancellation
//! flag is checked between tiers so abandoned queries stop early without
//! touching shared state.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::bm25::{Bm25Index, LexicalHit};
use crate::config::Config;
use crate::error::EngineResult;
use crate::matcher::EntityMatcher;
use crate::metrics::SearchObservation;
use crate::models::{
    DocumentMetadata, EntityKind, FilterCriteria, QueryEntities, RankedResult, Strategy,
};
use crate::ner::EntityRecognizer;
use crate::query::{EntityLookupIndex, QueryEntityExtractor};
use crate::scorer::{MetadataScorer, ScoreWeights};
use crate::store::MetadataStore;

/// Cooperative cancellation handle shared between a caller and a running
/// query. Cancelling never corrupts indexes; partial results are dropped.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Engine tuning parameters.
#[derive(Debug, Clone, Copy)]
pub struct EngineParams {
    /// Lexical candidates fetched before any metadata stage.
    pub bm25_candidates: usize,
    /// Adaptive threshold: fewer survivors triggers the next sub-strategy.
    pub min_candidates: usize,
    /// Cap on the candidate set adaptive hands to ranking.
    pub max_candidates: usize,
    /// Fuzzy-match similarity threshold.
    pub similarity_threshold: f64,
    /// Boost weights.
    pub weights: ScoreWeights,
}

impl Default for EngineParams {
    fn default() -> Self {
        Self {
            bm25_candidates: 500,
            min_candidates: 50,
            max_candidates: 100,
            similarity_threshold: crate::matcher::DEFAULT_SIMILARITY_THRESHOLD,
            weights: ScoreWeights::default(),
        }
    }
}

impl EngineParams {
    /// Lift the tunables out of an application config.
    pub fn from_config(config: &Config) -> Self {
        Self {
            bm25_candidates: config.retrieval.bm25_candidates,
            min_candidates: config.retrieval.min_candidates,
            max_candidates: config.retrieval.max_candidates,
            similarity_threshold: config.matching.similarity_threshold,
            weights: ScoreWeights {
                person: config.scoring.person_weight,
                location: config.scoring.location_weight,
                organization: config.scoring.organization_weight,
                date: config.scoring.date_weight,
            },
        }
    }
}

/// Bundles all inputs for a single search invocation.
#[derive(Debug, Clone)]
pub struct SearchRequest<'a> {
    /// Free-form query text.
    pub query: &'a str,
    /// Number of final results.
    pub top_k: usize,
    /// Filtering strategy.
    pub strategy: Strategy,
    /// Optional explicit filters merged with the extracted entities.
    pub filters: Option<&'a FilterCriteria>,
    /// Optional cancellation handle.
    pub cancel: Option<&'a CancelFlag>,
}

impl<'a> SearchRequest<'a> {
    /// A request with defaults: adaptive strategy, no filters.
    pub fn new(query: &'a str, top_k: usize) -> Self {
        Self {
            query,
            top_k,
            strategy: Strategy::Adaptive,
            filters: None,
            cancel: None,
        }
    }
}

/// Outcome of one search, with enough context for display and metrics.
#[derive(Debug, Clone)]
pub struct SearchResponse {
    /// Ranked results, best first.
    pub results: Vec<RankedResult>,
    /// Strategy the caller asked for.
    pub strategy_requested: Strategy,
    /// Strategy that actually produced the results (differs from the
    /// requested one when adaptive falls through, or when no entities were
    /// found and the metadata stage was skipped).
    pub strategy_applied: Strategy,
    /// Entities inferred from the query (explicit filters merged in).
    pub query_entities: QueryEntities,
    /// Lexical candidates fetched.
    pub bm25_candidates: usize,
    /// Candidates surviving the metadata stage.
    pub filtered_candidates: usize,
    /// True when the query was cancelled before completion.
    pub cancelled: bool,
}

impl SearchResponse {
    fn empty(strategy: Strategy) -> Self {
        Self {
            results: Vec::new(),
            strategy_requested: strategy,
            strategy_applied: strategy,
            query_entities: QueryEntities::default(),
            bm25_candidates: 0,
            filtered_candidates: 0,
            cancelled: false,
        }
    }

    fn cancelled(strategy: Strategy) -> Self {
        Self {
            cancelled: true,
            ..Self::empty(strategy)
        }
    }

    /// Summarize this response for the metrics recorder.
    pub fn observation(&self, query: &str, elapsed_ms: f64) -> SearchObservation {
        SearchObservation {
            query: query.to_string(),
            bm25_candidates: self.bm25_candidates,
            filtered_candidates: self.filtered_candidates,
            final_results: self.results.len(),
            strategy: self.strategy_applied,
            elapsed_ms,
        }
    }
}

/// The hybrid search engine.
///
/// Construct once at startup; every field is immutable afterwards, so one
/// instance serves concurrent queries.
pub struct SearchEngine {
    bm25: Arc<Bm25Index>,
    store: Arc<MetadataStore>,
    extractor: QueryEntityExtractor,
    matcher: EntityMatcher,
    scorer: MetadataScorer,
    params: EngineParams,
    /// Ids already reported as inconsistent, to log each once.
    consistency_reported: Mutex<HashSet<String>>,
}

impl SearchEngine {
    /// Assemble the engine from its built indexes.
    ///
    /// Loads canonical frequencies and consolidation aliases from the
    /// store to build the query-time entity lookup index.
    pub async fn new(
        bm25: Arc<Bm25Index>,
        store: Arc<MetadataStore>,
        recognizer: Arc<dyn EntityRecognizer>,
        params: EngineParams,
    ) -> EngineResult<Self> {
        let matcher = EntityMatcher::new(params.similarity_threshold);

        let mut frequencies = std::collections::BTreeMap::new();
        for kind in EntityKind::ALL {
            frequencies.insert(kind, store.frequencies(kind).await?);
        }
        let aliases = store.aliases().await?;
        let lookup = Arc::new(EntityLookupIndex::build(&frequencies, &aliases, &matcher));

        let extractor = QueryEntityExtractor::new(recognizer, lookup, matcher.clone());

        Ok(Self {
            bm25,
            store,
            extractor,
            matcher,
            scorer: MetadataScorer::new(params.weights),
            params,
            consistency_reported: Mutex::new(HashSet::new()),
        })
    }

    /// Run one search.
    ///
    /// Never fails for data reasons: empty queries, queries with no
    /// matching documents, and candidates with missing metadata all
    /// degrade to smaller (possibly empty) result lists. A zero `top_k`
    /// is a caller-contract violation and is reported as an error.
    pub async fn search(&self, request: &SearchRequest<'_>) -> EngineResult<SearchResponse> {
        let strategy = request.strategy;

        if request.top_k == 0 {
            return Err(crate::error::EngineError::InvalidArgument(
                "top_k must be >= 1".to_string(),
            ));
        }

        // Lexical tier.
        let candidates = self.bm25.search(request.query, self.params.bm25_candidates);
        if candidates.is_empty() {
            return Ok(SearchResponse::empty(strategy));
        }

        if is_cancelled(request) {
            return Ok(SearchResponse::cancelled(strategy));
        }

        // Entity tier.
        let mut entities = self.extractor.extract(request.query);
        let mut date_range: Option<(String, String)> = None;
        if let Some(filters) = request.filters {
            entities.people.extend(filters.people.iter().cloned());
            entities
                .organizations
                .extend(filters.organizations.iter().cloned());
            entities.locations.extend(filters.locations.iter().cloned());
            date_range = filters.date_range.clone();
        }

        if entities.is_empty() && date_range.is_none() {
            // Nothing to filter or boost on.
            let results = self
                .assemble(&candidates[..candidates.len().min(request.top_k)], &entities, None)
                .await?;
            return Ok(SearchResponse {
                filtered_candidates: candidates.len(),
                bm25_candidates: candidates.len(),
                results,
                strategy_requested: strategy,
                strategy_applied: Strategy::None,
                query_entities: entities,
                cancelled: false,
            });
        }

        if is_cancelled(request) {
            return Ok(SearchResponse::cancelled(strategy));
        }

        // Metadata tier.
        let (kept, boosts, applied) = match strategy {
            Strategy::None => (candidates.clone(), None, Strategy::None),
            Strategy::Strict => (
                self.apply_strict(&candidates, &entities, date_range.as_ref())
                    .await?,
                None,
                Strategy::Strict,
            ),
            Strategy::Loose => (
                self.apply_loose(&candidates, &entities, date_range.as_ref())
                    .await?,
                None,
                Strategy::Loose,
            ),
            Strategy::Boost => {
                if is_cancelled(request) {
                    return Ok(SearchResponse::cancelled(strategy));
                }
                let (kept, boosts) = self.apply_boost(&candidates, &entities).await?;
                (kept, Some(boosts), Strategy::Boost)
            }
            Strategy::Adaptive => {
                self.apply_adaptive(request, &candidates, &entities, date_range.as_ref())
                    .await?
            }
        };

        if is_cancelled(request) {
            return Ok(SearchResponse::cancelled(strategy));
        }

        let filtered_candidates = kept.len();
        debug!(
            strategy = %applied,
            candidates = candidates.len(),
            surviving = filtered_candidates,
            "metadata stage complete"
        );

        let top = &kept[..kept.len().min(request.top_k)];
        let results = self.assemble(top, &entities, boosts.as_deref()).await?;

        Ok(SearchResponse {
            results,
            strategy_requested: strategy,
            strategy_applied: applied,
            query_entities: entities,
            bm25_candidates: candidates.len(),
            filtered_candidates,
            cancelled: false,
        })
    }

    /// Stored metadata for a document, if any.
    pub async fn get_metadata(&self, doc_id: &str) -> EngineResult<Option<DocumentMetadata>> {
        self.store.get(doc_id).await
    }

    /// All canonical entities, keyed by kind label.
    pub async fn all_entities(
        &self,
    ) -> EngineResult<std::collections::BTreeMap<String, std::collections::BTreeSet<String>>> {
        self.store.all_entities().await
    }

    /// Canonical frequency listing for one kind.
    pub async fn frequencies(&self, kind: EntityKind) -> EngineResult<Vec<(String, u64)>> {
        self.store.frequencies(kind).await
    }

    async fn apply_strict(
        &self,
        candidates: &[LexicalHit],
        entities: &QueryEntities,
        date_range: Option<&(String, String)>,
    ) -> EngineResult<Vec<LexicalHit>> {
        let ids: Vec<String> = candidates.iter().map(|c| c.doc_id.clone()).collect();
        let surviving: HashSet<String> = self
            .store
            .filter_fuzzy(&ids, entities, date_range, &self.matcher)
            .await?
            .into_iter()
            .collect();

        Ok(candidates
            .iter()
            .filter(|c| surviving.contains(&c.doc_id))
            .cloned()
            .collect())
    }

    async fn apply_loose(
        &self,
        candidates: &[LexicalHit],
        entities: &QueryEntities,
        date_range: Option<&(String, String)>,
    ) -> EngineResult<Vec<LexicalHit>> {
        let mut kept = Vec::new();

        for candidate in candidates {
            let Some(meta) = self.metadata_or_report(&candidate.doc_id).await? else {
                continue;
            };

            let mut matches = EntityKind::ALL.iter().any(|kind| {
                let wanted = entities.entities(*kind);
                !wanted.is_empty() && self.matcher.match_any(wanted, meta.entities(*kind))
            });

            if !matches && !entities.dates.is_empty() {
                matches = self.matcher.match_any(&entities.dates, &meta.dates);
            }

            if !matches {
                if let Some((low, high)) = date_range {
                    matches = meta
                        .dates
                        .iter()
                        .any(|d| d.as_str() >= low.as_str() && d.as_str() <= high.as_str());
                }
            }

            if matches {
                kept.push(candidate.clone());
            }
        }

        Ok(kept)
    }

    async fn apply_boost(
        &self,
        candidates: &[LexicalHit],
        entities: &QueryEntities,
    ) -> EngineResult<(Vec<LexicalHit>, Vec<f64>)> {
        // (original rank, candidate, boost); ties on final score keep the
        // original BM25 order.
        let mut scored = Vec::with_capacity(candidates.len());

        for (rank, candidate) in candidates.iter().enumerate() {
            let boost = match self.metadata_or_report(&candidate.doc_id).await? {
                Some(meta) => self.scorer.boost(entities, &meta, &self.matcher),
                None => 0.0,
            };
            scored.push((rank, candidate.clone(), boost));
        }

        scored.sort_by(|a, b| {
            let a_final = a.1.score + a.2;
            let b_final = b.1.score + b.2;
            b_final.total_cmp(&a_final).then_with(|| a.0.cmp(&b.0))
        });

        let boosts = scored.iter().map(|(_, _, boost)| *boost).collect();
        let kept = scored.into_iter().map(|(_, c, _)| c).collect();
        Ok((kept, boosts))
    }

    async fn apply_adaptive(
        &self,
        request: &SearchRequest<'_>,
        candidates: &[LexicalHit],
        entities: &QueryEntities,
        date_range: Option<&(String, String)>,
    ) -> EngineResult<(Vec<LexicalHit>, Option<Vec<f64>>, Strategy)> {
        let strict = self.apply_strict(candidates, entities, date_range).await?;
        if strict.len() >= self.params.min_candidates {
            let capped = cap(strict, self.params.max_candidates);
            return Ok((capped, None, Strategy::Strict));
        }
        debug!(
            strict = strict.len(),
            min = self.params.min_candidates,
            "adaptive: strict too narrow, trying loose"
        );

        let loose = self.apply_loose(candidates, entities, date_range).await?;
        if loose.len() >= self.params.min_candidates {
            let capped = cap(loose, self.params.max_candidates);
            return Ok((capped, None, Strategy::Loose));
        }
        debug!(
            loose = loose.len(),
            min = self.params.min_candidates,
            "adaptive: loose too narrow, falling back to boost"
        );

        if is_cancelled(request) {
            return Ok((Vec::new(), None, Strategy::Boost));
        }

        let (kept, boosts) = self.apply_boost(candidates, entities).await?;
        Ok((kept, Some(boosts), Strategy::Boost))
    }

    /// Metadata for a BM25 candidate; a miss is an index inconsistency,
    /// reported once per id and treated as no-metadata.
    async fn metadata_or_report(&self, doc_id: &str) -> EngineResult<Option<DocumentMetadata>> {
        let meta = self.store.get(doc_id).await?;
        if meta.is_none() {
            let mut reported = self
                .consistency_reported
                .lock()
                .expect("consistency set poisoned");
            if reported.insert(doc_id.to_string()) {
                warn!(doc_id, "document indexed by BM25 but missing from store");
            }
        }
        Ok(meta)
    }

    /// Materialize final results: previews, filenames, matched entities.
    async fn assemble(
        &self,
        hits: &[LexicalHit],
        entities: &QueryEntities,
        boosts: Option<&[f64]>,
    ) -> EngineResult<Vec<RankedResult>> {
        let mut results = Vec::with_capacity(hits.len());

        for (i, hit) in hits.iter().enumerate() {
            let boost = boosts.and_then(|b| b.get(i).copied()).unwrap_or(0.0);
            let meta = self.store.get(&hit.doc_id).await?;
            let matched = match &meta {
                Some(meta) => self.matched_entities(entities, meta),
                None => QueryEntities::default(),
            };

            results.push(RankedResult {
                doc_id: hit.doc_id.clone(),
                filename: self
                    .bm25
                    .filename(&hit.doc_id)
                    .unwrap_or(&hit.doc_id)
                    .to_string(),
                bm25_score: hit.score,
                metadata_score: boost,
                final_score: hit.score + boost,
                matched_entities: matched,
                preview: self.bm25.preview(&hit.doc_id).unwrap_or_default(),
            });
        }

        Ok(results)
    }

    /// Query entities that fuzzily match the document's sets, for display.
    fn matched_entities(
        &self,
        entities: &QueryEntities,
        meta: &DocumentMetadata,
    ) -> QueryEntities {
        let mut matched = QueryEntities::default();
        for kind in EntityKind::ALL {
            for entity in entities.entities(kind) {
                if meta
                    .entities(kind)
                    .iter()
                    .any(|d| self.matcher.fuzzy_match(entity, d))
                {
                    matched.entities_mut(kind).insert(entity.clone());
                }
            }
        }
        for date in &entities.dates {
            if meta.dates.iter().any(|d| self.matcher.fuzzy_match(date, d)) {
                matched.dates.insert(date.clone());
            }
        }
        matched
    }
}

fn is_cancelled(request: &SearchRequest<'_>) -> bool {
    request.cancel.map(CancelFlag::is_cancelled).unwrap_or(false)
}

fn cap(mut hits: Vec<LexicalHit>, max: usize) -> Vec<LexicalHit> {
    hits.truncate(max);
    hits
}
