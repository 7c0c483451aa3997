//! Per-query performance observations.
//!
//! A lightweight in-memory recorder: the caller hands it one observation
//! per search and can ask for an aggregate report at any point. Nothing is
//! persisted; sessions that want history write the report out themselves.

use std::collections::BTreeMap;

use crate::models::Strategy;

/// One recorded search.
#[derive(Debug, Clone)]
pub struct SearchObservation {
    /// Query text as issued.
    pub query: String,
    /// Lexical candidates fetched.
    pub bm25_candidates: usize,
    /// Candidates surviving the metadata stage.
    pub filtered_candidates: usize,
    /// Results returned to the caller.
    pub final_results: usize,
    /// Strategy that produced the results.
    pub strategy: Strategy,
    /// Wall-clock time for the whole search.
    pub elapsed_ms: f64,
}

/// Aggregate view over recorded observations.
#[derive(Debug, Clone, Default)]
pub struct MetricsSummary {
    pub total_queries: usize,
    pub avg_bm25_candidates: f64,
    pub avg_filtered: f64,
    /// Mean of per-query `filtered / bm25` ratios.
    pub avg_filter_ratio: f64,
    pub avg_elapsed_ms: f64,
    /// Times each strategy produced the final results.
    pub strategies_used: BTreeMap<String, usize>,
}

/// Accumulates search observations.
#[derive(Debug, Default)]
pub struct SearchMetrics {
    observations: Vec<SearchObservation>,
}

impl SearchMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one search.
    pub fn record(&mut self, observation: SearchObservation) {
        self.observations.push(observation);
    }

    /// Recorded observations, oldest first.
    pub fn observations(&self) -> &[SearchObservation] {
        &self.observations
    }

    /// Drop all recorded observations.
    pub fn clear(&mut self) {
        self.observations.clear();
    }

    /// Aggregate statistics; `None` when nothing was recorded.
    pub fn summary(&self) -> Option<MetricsSummary> {
        if self.observations.is_empty() {
            return None;
        }

        let n = self.observations.len() as f64;
        let mut summary = MetricsSummary {
            total_queries: self.observations.len(),
            ..MetricsSummary::default()
        };

        for obs in &self.observations {
            summary.avg_bm25_candidates += obs.bm25_candidates as f64;
            summary.avg_filtered += obs.filtered_candidates as f64;
            if obs.bm25_candidates > 0 {
                summary.avg_filter_ratio +=
                    obs.filtered_candidates as f64 / obs.bm25_candidates as f64;
            }
            summary.avg_elapsed_ms += obs.elapsed_ms;
            *summary
                .strategies_used
                .entry(obs.strategy.to_string())
                .or_insert(0) += 1;
        }

        summary.avg_bm25_candidates /= n;
        summary.avg_filtered /= n;
        summary.avg_filter_ratio /= n;
        summary.avg_elapsed_ms /= n;
        Some(summary)
    }

    /// Human-readable report of the aggregate statistics.
    pub fn report(&self) -> String {
        let Some(summary) = self.summary() else {
            return "No search metrics recorded".to_string();
        };

        let mut report = format!(
            "Search Performance\n\
             ==================\n\
             Total queries: {}\n\
             Avg BM25 candidates: {:.0}\n\
             Avg after filtering: {:.0}\n\
             Avg filter ratio: {:.1}%\n\
             Avg query time: {:.0} ms\n\
             Strategies:\n",
            summary.total_queries,
            summary.avg_bm25_candidates,
            summary.avg_filtered,
            summary.avg_filter_ratio * 100.0,
            summary.avg_elapsed_ms,
        );
        for (strategy, count) in &summary.strategies_used {
            report.push_str(&format!("  {strategy}: {count}\n"));
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(strategy: Strategy, bm25: usize, filtered: usize, elapsed: f64) -> SearchObservation {
        SearchObservation {
            query: "q".to_string(),
            bm25_candidates: bm25,
            filtered_candidates: filtered,
            final_results: filtered.min(10),
            strategy,
            elapsed_ms: elapsed,
        }
    }

    #[test]
    fn empty_metrics_have_no_summary() {
        let metrics = SearchMetrics::new();
        assert!(metrics.summary().is_none());
        assert_eq!(metrics.report(), "No search metrics recorded");
    }

    #[test]
    fn summary_averages_and_counts_strategies() {
        let mut metrics = SearchMetrics::new();
        metrics.record(obs(Strategy::Adaptive, 500, 80, 150.0));
        metrics.record(obs(Strategy::Loose, 500, 120, 170.0));
        metrics.record(obs(Strategy::Boost, 500, 500, 180.0));

        let summary = metrics.summary().unwrap();
        assert_eq!(summary.total_queries, 3);
        assert!((summary.avg_bm25_candidates - 500.0).abs() < 1e-9);
        assert!((summary.avg_elapsed_ms - (150.0 + 170.0 + 180.0) / 3.0).abs() < 1e-9);
        assert_eq!(summary.strategies_used["adaptive"], 1);
        assert_eq!(summary.strategies_used["loose"], 1);
        assert_eq!(summary.strategies_used["boost"], 1);
    }

    #[test]
    fn clear_resets_observations() {
        let mut metrics = SearchMetrics::new();
        metrics.record(obs(Strategy::None, 10, 10, 5.0));
        assert_eq!(metrics.observations().len(), 1);
        metrics.clear();
        assert!(metrics.summary().is_none());
    }

    #[test]
    fn filter_ratio_skips_zero_candidate_queries() {
        let mut metrics = SearchMetrics::new();
        metrics.record(obs(Strategy::Strict, 0, 0, 1.0));
        metrics.record(obs(Strategy::Strict, 100, 50, 1.0));
        let summary = metrics.summary().unwrap();
        assert!((summary.avg_filter_ratio - 0.25).abs() < 1e-9);
    }
}
