//! Query pipeline: embed, over-fetch from the index, filter, then backfill.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::Serialize;

use crate::config::RecommendConfig;
use crate::history::{HistoryError, HistoryStore};
use crate::semantic::embeddings::{EmbeddingError, Embedder};
use crate::semantic::index::{IndexError, SearchResult, VectorIndex};

#[derive(Debug, thiserror::Error)]
pub enum RecommendError {
    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    #[error(transparent)]
    History(#[from] HistoryError),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum Source {
    Ranked { id: i64, score: f32 },
    /// Random fill; carries no similarity guarantee
    Backfill,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    pub title: String,
    #[serde(flatten)]
    pub source: Source,
}

/// Per-call knobs; start from `RecommendationEngine::options`.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryOptions {
    pub top_n: usize,
    pub score_threshold: f32,
    pub backfill: bool,
}

impl QueryOptions {
    /// Plain nearest-neighbour lookup: threshold 0, no backfill.
    pub fn ranked_only(top_n: usize) -> Self {
        Self {
            top_n,
            score_threshold: 0.0,
            backfill: false,
        }
    }
}

pub struct RecommendationEngine {
    embedder: Arc<dyn Embedder>,
    index: Arc<VectorIndex>,
    store: Arc<HistoryStore>,
    config: RecommendConfig,
}

impl RecommendationEngine {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<VectorIndex>,
        store: Arc<HistoryStore>,
        config: RecommendConfig,
    ) -> Self {
        Self {
            embedder,
            index,
            store,
            config,
        }
    }

    pub fn config(&self) -> &RecommendConfig {
        &self.config
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    /// Configured defaults with backfill on.
    pub fn options(&self) -> QueryOptions {
        QueryOptions {
            top_n: self.config.top_n,
            score_threshold: self.config.score_threshold,
            backfill: true,
        }
    }

    /// Recommended titles for `text`: ranked matches first, then random backfill.
    pub fn query(
        &self,
        text: &str,
        top_n: Option<usize>,
        score_threshold: Option<f32>,
    ) -> Result<Vec<String>, RecommendError> {
        let mut options = self.options();
        if let Some(top_n) = top_n {
            options.top_n = top_n;
        }
        if let Some(threshold) = score_threshold {
            options.score_threshold = threshold;
        }

        Ok(self
            .recommend(text, &options)?
            .into_iter()
            .map(|r| r.title)
            .collect())
    }

    pub fn recommend(
        &self,
        text: &str,
        options: &QueryOptions,
    ) -> Result<Vec<Recommendation>, RecommendError> {
        if options.top_n == 0 {
            return Ok(Vec::new());
        }

        let query_vector = self.embedder.encode_one(text)?;
        let k = options.top_n.saturating_mul(self.config.over_fetch_factor);
        let ranked = self.index.search(&query_vector, k)?;

        let titles = self.store.all_titles()?;
        let mut results = Self::accept_ranked(&ranked, &titles, options);

        if options.backfill && results.len() < options.top_n {
            let accepted: HashSet<String> = results.iter().map(|r| r.title.clone()).collect();
            let missing = options.top_n - results.len();
            let fill = self.store.random_distinct_titles(missing, &accepted)?;
            log::debug!(
                "query {text:?}: {} ranked, backfilled {} of {missing}",
                results.len(),
                fill.len()
            );

            results.extend(fill.into_iter().map(|title| Recommendation {
                title,
                source: Source::Backfill,
            }));
        }

        Ok(results)
    }

    /// Walk `ranked` in score order, keeping resolvable, unseen titles at or
    /// above the threshold until `top_n` are accepted.
    fn accept_ranked(
        ranked: &[SearchResult],
        titles: &HashMap<i64, String>,
        options: &QueryOptions,
    ) -> Vec<Recommendation> {
        let mut seen = HashSet::new();
        let mut accepted = Vec::new();

        for hit in ranked {
            if accepted.len() >= options.top_n {
                break;
            }

            let Some(title) = titles.get(&hit.id) else {
                log::debug!("dropping stale index id {}", hit.id);
                continue;
            };
            if seen.contains(title) || hit.score < options.score_threshold {
                continue;
            }

            seen.insert(title.clone());
            accepted.push(Recommendation {
                title: title.clone(),
                source: Source::Ranked {
                    id: hit.id,
                    score: hit.score,
                },
            });
        }

        accepted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(id: i64, score: f32) -> SearchResult {
        SearchResult { id, score }
    }

    fn options(top_n: usize, score_threshold: f32) -> QueryOptions {
        QueryOptions {
            top_n,
            score_threshold,
            backfill: true,
        }
    }

    fn titles(pairs: &[(i64, &str)]) -> HashMap<i64, String> {
        pairs.iter().map(|(id, t)| (*id, t.to_string())).collect()
    }

    fn accepted_titles(recs: &[Recommendation]) -> Vec<&str> {
        recs.iter().map(|r| r.title.as_str()).collect()
    }

    #[test]
    fn test_accept_drops_stale_ids() {
        let ranked = vec![hit(1, 0.9), hit(99, 0.8), hit(2, 0.7)];
        let map = titles(&[(1, "one"), (2, "two")]);

        let recs = RecommendationEngine::accept_ranked(&ranked, &map, &options(5, 0.2));
        assert_eq!(accepted_titles(&recs), vec!["one", "two"]);
    }

    #[test]
    fn test_accept_suppresses_duplicate_titles() {
        let ranked = vec![hit(1, 0.9), hit(2, 0.8), hit(3, 0.7)];
        let map = titles(&[(1, "same"), (2, "same"), (3, "other")]);

        let recs = RecommendationEngine::accept_ranked(&ranked, &map, &options(5, 0.2));
        assert_eq!(accepted_titles(&recs), vec!["same", "other"]);
        assert_eq!(recs[0].source, Source::Ranked { id: 1, score: 0.9 });
    }

    #[test]
    fn test_accept_applies_threshold() {
        let ranked = vec![hit(1, 0.5), hit(2, 0.2), hit(3, 0.19)];
        let map = titles(&[(1, "a"), (2, "b"), (3, "c")]);

        let recs = RecommendationEngine::accept_ranked(&ranked, &map, &options(5, 0.2));
        assert_eq!(accepted_titles(&recs), vec!["a", "b"]);
    }

    #[test]
    fn test_accept_stops_at_top_n() {
        let ranked = vec![hit(1, 0.9), hit(2, 0.8), hit(3, 0.7)];
        let map = titles(&[(1, "a"), (2, "b"), (3, "c")]);

        let recs = RecommendationEngine::accept_ranked(&ranked, &map, &options(2, 0.0));
        assert_eq!(accepted_titles(&recs), vec!["a", "b"]);
    }

    #[test]
    fn test_ranked_only_uses_zero_threshold() {
        let ranked = vec![hit(1, 0.05), hit(2, 0.0), hit(3, -0.4)];
        let map = titles(&[(1, "near"), (2, "orthogonal"), (3, "far")]);

        let recs =
            RecommendationEngine::accept_ranked(&ranked, &map, &QueryOptions::ranked_only(3));
        assert_eq!(accepted_titles(&recs), vec!["near", "orthogonal"]);
    }
}
