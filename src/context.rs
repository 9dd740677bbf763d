use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::{
    config::Config,
    history::{CategoryClassifier, HistoryStore, KeyphraseExtractor},
    lock::RebuildLock,
    semantic::{Embedder, EmbeddingModel, RecommendationEngine, VectorIndex, VectorStorage},
};

#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    pub entries: usize,
    pub indexed: usize,
    pub dimensions: usize,
    pub model: String,
    pub path: PathBuf,
}

/// Everything a command needs, constructed once at startup and passed down.
///
/// The embedding model is loaded on first use since inserts and imports
/// never need it.
pub struct AppContext {
    config: Config,
    store: Arc<HistoryStore>,
    embedder: Mutex<Option<Arc<dyn Embedder>>>,
}

impl AppContext {
    /// Open the history store described by `config`. Fails if the store is unreachable.
    pub fn new(config: Config) -> Result<Self> {
        let keyphrases = if config.keyphrases.enabled {
            Some(KeyphraseExtractor::new(&config.keyphrases)?)
        } else {
            None
        };

        let store = HistoryStore::open(
            &config.history_db_path(),
            CategoryClassifier::new(&config.categories),
            keyphrases,
            config.exclude_domains.clone(),
        )
        .context("failed to open history store")?;

        Ok(Self {
            config,
            store: Arc::new(store),
            embedder: Mutex::new(None),
        })
    }

    /// Same as `new` but with a caller-supplied embedder.
    pub fn with_embedder(config: Config, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let ctx = Self::new(config)?;
        *ctx.embedder.lock().map_err(|e| anyhow::anyhow!("lock poisoned: {e}"))? = Some(embedder);
        Ok(ctx)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Arc<HistoryStore> {
        &self.store
    }

    pub fn embedder(&self) -> Result<Arc<dyn Embedder>> {
        let mut guard = self
            .embedder
            .lock()
            .map_err(|e| anyhow::anyhow!("lock poisoned: {e}"))?;

        if let Some(embedder) = guard.as_ref() {
            return Ok(embedder.clone());
        }

        let emb_config = &self.config.embedding;
        let model = EmbeddingModel::new(
            &emb_config.model,
            self.config.base_path().to_path_buf(),
            Some(Duration::from_secs(emb_config.download_timeout_secs)),
        )
        .context("failed to initialize embedding model")?;

        let embedder: Arc<dyn Embedder> = Arc::new(model);
        *guard = Some(embedder.clone());
        Ok(embedder)
    }

    fn index_storage(&self) -> VectorStorage {
        VectorStorage::new(self.config.index_path())
    }

    /// Rebuild the index from every current history entry and atomically
    /// replace the persisted artifact.
    pub fn build_index(&self) -> Result<BuildReport> {
        let _lock = RebuildLock::try_acquire(self.config.base_path())
            .context("failed to take rebuild lock")?;

        let embedder = self.embedder()?;
        let entries: Vec<(i64, String)> = self
            .store
            .entries()?
            .into_iter()
            .map(|entry| (entry.id, entry.title))
            .collect();

        let index = VectorIndex::build(
            embedder.as_ref(),
            &entries,
            self.config.embedding.batch_size,
        )?;

        let storage = self.index_storage();
        storage.save(&index, &embedder.model_id_hash())?;

        Ok(BuildReport {
            entries: entries.len(),
            indexed: index.len(),
            dimensions: index.dimensions(),
            model: embedder.model_name().to_string(),
            path: storage.path().to_path_buf(),
        })
    }

    /// Load the persisted index. Missing or corrupt artifacts are errors.
    pub fn load_index(&self) -> Result<VectorIndex> {
        let embedder = self.embedder()?;
        let index = self
            .index_storage()
            .load(&embedder.model_id_hash(), embedder.dimensions())?;
        if index.is_empty() {
            log::warn!("loaded index is empty, only backfill can produce results");
        }
        Ok(index)
    }

    /// Engine over a freshly loaded index snapshot.
    pub fn engine(&self) -> Result<RecommendationEngine> {
        let index = self.load_index()?;
        Ok(RecommendationEngine::new(
            self.embedder()?,
            Arc::new(index),
            self.store.clone(),
            self.config.recommend.clone(),
        ))
    }
}
