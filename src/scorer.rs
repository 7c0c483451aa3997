//! Weighted metadata boost computation.
//!
//! Turns entity overlap between a query and a document into a scalar that
//! the boost strategy adds to the BM25 score. People weigh heaviest: a
//! matched person is a stronger relevance signal in this corpus than a
//! matched location or date.

use crate::matcher::EntityMatcher;
use crate::models::{DocumentMetadata, QueryEntities};

/// Per-kind boost weights.
#[derive(Debug, Clone, Copy)]
pub struct ScoreWeights {
    pub person: f64,
    pub location: f64,
    pub organization: f64,
    pub date: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            person: 2.0,
            location: 1.5,
            organization: 1.5,
            date: 1.0,
        }
    }
}

/// Computes metadata boosts for documents against a fixed query.
#[derive(Debug, Clone)]
pub struct MetadataScorer {
    weights: ScoreWeights,
}

impl Default for MetadataScorer {
    fn default() -> Self {
        Self::new(ScoreWeights::default())
    }
}

impl MetadataScorer {
    pub fn new(weights: ScoreWeights) -> Self {
        Self { weights }
    }

    /// Unnormalized boost: each matched query entity contributes its
    /// kind's weight once.
    ///
    /// `boost = w_p·|matched people| + w_l·|matched locations|
    ///        + w_o·|matched orgs| + w_d·|matched dates|`
    ///
    /// Matching uses the matcher's fuzzy semantics. Deterministic.
    pub fn boost(
        &self,
        query: &QueryEntities,
        doc: &DocumentMetadata,
        matcher: &EntityMatcher,
    ) -> f64 {
        self.weights.person * matcher.match_count(&query.people, &doc.people) as f64
            + self.weights.location * matcher.match_count(&query.locations, &doc.locations) as f64
            + self.weights.organization
                * matcher.match_count(&query.organizations, &doc.organizations) as f64
            + self.weights.date * matcher.match_count(&query.dates, &doc.dates) as f64
    }

    /// Normalized boost in `[0, 1]`: weighted match fractions summed over
    /// the kinds that are non-empty in the query, divided by the sum of
    /// those kinds' weights. For strategies that need a bounded signal.
    pub fn normalized_boost(
        &self,
        query: &QueryEntities,
        doc: &DocumentMetadata,
        matcher: &EntityMatcher,
    ) -> f64 {
        let mut weighted = 0.0;
        let mut weight_total = 0.0;

        let parts = [
            (&query.people, &doc.people, self.weights.person),
            (&query.locations, &doc.locations, self.weights.location),
            (
                &query.organizations,
                &doc.organizations,
                self.weights.organization,
            ),
            (&query.dates, &doc.dates, self.weights.date),
        ];

        for (query_set, doc_set, weight) in parts {
            if query_set.is_empty() {
                continue;
            }
            weighted += weight * matcher.match_score(query_set, doc_set);
            weight_total += weight;
        }

        if weight_total == 0.0 {
            0.0
        } else {
            weighted / weight_total
        }
    }
}
