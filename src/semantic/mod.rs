//! Semantic recommendation over browsing-history titles.
//!
//! # Architecture
//!
//! - `embeddings`: `Embedder` seam and the fastembed-backed model
//! - `index`: id-mapped inner-product index, built offline from the store
//! - `storage`: binary file I/O for history.index persistence
//! - `recommend`: query pipeline with threshold, dedup and backfill

pub mod embeddings;
mod index;
mod recommend;
mod storage;

pub use embeddings::{Embedder, EmbeddingModel};
pub use index::VectorIndex;
#[cfg(test)]
pub use recommend::Source;
pub use recommend::{QueryOptions, Recommendation, RecommendationEngine};
pub use storage::VectorStorage;
