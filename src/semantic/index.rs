//! Id-mapped flat inner-product index over title embeddings.
//!
//! Built in one pass from the history store and read-only afterwards.
//! Search is an exact linear scan.

use std::collections::BTreeMap;

use indicatif::{ProgressBar, ProgressStyle};

use crate::semantic::embeddings::{EmbeddingError, Embedder};

/// Search result from the vector index.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    /// History entry id
    pub id: i64,
    /// Inner product with the query, in [-1, 1]
    pub score: f32,
}

pub struct VectorIndex {
    /// History id -> unit embedding. Ordered so iteration and ties are stable.
    entries: BTreeMap<i64, Vec<f32>>,
    dimensions: usize,
}

/// Errors that can occur during index operations.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Cannot store or search with zero-norm vector")]
    ZeroNormVector,

    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),
}

impl VectorIndex {
    /// Create a new empty vector index with specified dimensions.
    pub fn new(dimensions: usize) -> Self {
        Self {
            entries: BTreeMap::new(),
            dimensions,
        }
    }

    /// Embed `(id, title)` pairs and index them by id.
    ///
    /// Entries with an empty title are skipped. Titles are
    /// sent to the embedder `batch_size` at a time.
    pub fn build(
        embedder: &dyn Embedder,
        entries: &[(i64, String)],
        batch_size: usize,
    ) -> Result<Self, IndexError> {
        let usable: Vec<&(i64, String)> = entries
            .iter()
            .filter(|(_, title)| !title.is_empty())
            .collect();

        log::info!(
            "building index over {} titles ({} skipped without title)",
            usable.len(),
            entries.len() - usable.len()
        );

        let mut index = Self::new(embedder.dimensions());

        let pb = ProgressBar::new(usable.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} titles ({percent}%)")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );

        for chunk in usable.chunks(batch_size.max(1)) {
            let titles: Vec<String> = chunk.iter().map(|(_, title)| title.clone()).collect();
            let embeddings = embedder.encode(&titles)?;

            if embeddings.len() != chunk.len() {
                return Err(EmbeddingError::EmbeddingFailed(format!(
                    "expected {} embeddings, got {}",
                    chunk.len(),
                    embeddings.len()
                ))
                .into());
            }

            for ((id, _), embedding) in chunk.iter().zip(embeddings) {
                index.insert(*id, embedding)?;
            }
            pb.inc(chunk.len() as u64);
        }
        pb.finish_and_clear();

        Ok(index)
    }

    /// Get the expected embedding dimensions.
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert or replace the vector for `id`.
    pub fn insert(&mut self, id: i64, embedding: Vec<f32>) -> Result<(), IndexError> {
        if embedding.len() != self.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                got: embedding.len(),
            });
        }

        if Self::l2_norm(&embedding) < f32::EPSILON {
            return Err(IndexError::ZeroNormVector);
        }

        self.entries.insert(id, embedding);
        Ok(())
    }

    /// Iterate over all entries in id order.
    pub fn iter(&self) -> impl Iterator<Item = (i64, &[f32])> {
        self.entries.iter().map(|(id, v)| (*id, v.as_slice()))
    }

    /// Top `k` entries by descending inner product with `query`.
    ///
    /// Equal scores are ordered by ascending id.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchResult>, IndexError> {
        if query.len() != self.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                got: query.len(),
            });
        }

        if Self::l2_norm(query) < f32::EPSILON {
            return Err(IndexError::ZeroNormVector);
        }

        let mut results: Vec<SearchResult> = self
            .entries
            .iter()
            .map(|(id, embedding)| SearchResult {
                id: *id,
                score: inner_product(query, embedding).clamp(-1.0, 1.0),
            })
            .collect();

        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        results.truncate(k);

        Ok(results)
    }

    fn l2_norm(v: &[f32]) -> f32 {
        v.iter().map(|x| x * x).sum::<f32>().sqrt()
    }
}

pub fn inner_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}
