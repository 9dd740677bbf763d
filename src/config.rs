use std::collections::HashSet;
use std::path::{Path, PathBuf};

use homedir::my_home;
use serde::{Deserialize, Serialize};

/// Default embedding model (384-dim sentence transformer)
const DEFAULT_EMBEDDING_MODEL: &str = "all-MiniLM-L6-v2";
const DEFAULT_BATCH_SIZE: usize = 64;
/// Default model download timeout in seconds
const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 300;

const DEFAULT_TOP_N: usize = 5;
const DEFAULT_SCORE_THRESHOLD: f32 = 0.2;
const DEFAULT_OVER_FETCH_FACTOR: usize = 3;

const DEFAULT_KEYPHRASE_TOP_N: usize = 3;
const DEFAULT_KEYPHRASE_MAX_NGRAM: usize = 2;

const CONFIG_FILE: &str = "config.yaml";
pub const HISTORY_DB_FILE: &str = "history.db";
pub const INDEX_FILE: &str = "history.index";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config is malformed: {0}")]
    Parse(#[from] serde_yml::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// One row of the ordered category rule table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CategoryRule {
    pub name: String,
    pub keywords: Vec<String>,
}

impl CategoryRule {
    pub fn new(name: &str, keywords: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }
}

/// Tunables for the recommendation pipeline
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RecommendConfig {
    /// Number of titles returned when the caller does not ask for a count
    #[serde(default = "default_top_n")]
    pub top_n: usize,

    /// Minimum inner-product score for a ranked match
    #[serde(default = "default_score_threshold")]
    pub score_threshold: f32,

    /// Index search fetches `top_n * over_fetch_factor` candidates
    #[serde(default = "default_over_fetch_factor")]
    pub over_fetch_factor: usize,
}

impl Default for RecommendConfig {
    fn default() -> Self {
        Self {
            top_n: DEFAULT_TOP_N,
            score_threshold: DEFAULT_SCORE_THRESHOLD,
            over_fetch_factor: DEFAULT_OVER_FETCH_FACTOR,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Model name for embeddings (e.g., "all-MiniLM-L6-v2")
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Titles embedded per model call during index build
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Timeout for model download in seconds
    #[serde(default = "default_download_timeout_secs")]
    pub download_timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            download_timeout_secs: DEFAULT_DOWNLOAD_TIMEOUT_SECS,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KeyphraseConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_keyphrase_top_n")]
    pub top_n: usize,
    #[serde(default = "default_keyphrase_max_ngram")]
    pub max_ngram: usize,
}

impl Default for KeyphraseConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            top_n: DEFAULT_KEYPHRASE_TOP_N,
            max_ngram: DEFAULT_KEYPHRASE_MAX_NGRAM,
        }
    }
}

fn default_embedding_model() -> String {
    DEFAULT_EMBEDDING_MODEL.to_string()
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_download_timeout_secs() -> u64 {
    DEFAULT_DOWNLOAD_TIMEOUT_SECS
}

fn default_top_n() -> usize {
    DEFAULT_TOP_N
}

fn default_score_threshold() -> f32 {
    DEFAULT_SCORE_THRESHOLD
}

fn default_over_fetch_factor() -> usize {
    DEFAULT_OVER_FETCH_FACTOR
}

fn default_keyphrase_top_n() -> usize {
    DEFAULT_KEYPHRASE_TOP_N
}

fn default_keyphrase_max_ngram() -> usize {
    DEFAULT_KEYPHRASE_MAX_NGRAM
}

fn default_true() -> bool {
    true
}

pub fn default_categories() -> Vec<CategoryRule> {
    vec![
        CategoryRule::new(
            "AI",
            &["machine learning", "deep learning", "GPT", "transformer", "LLM"],
        ),
        CategoryRule::new("Web Dev", &["JavaScript", "React", "Next.js", "Tailwind", "CSS"]),
        CategoryRule::new("Finance", &["stocks", "crypto", "trading", "investment"]),
        CategoryRule::new("Quantum Computing", &["quantum", "Qiskit", "superposition"]),
    ]
}

pub fn default_exclude_domains() -> Vec<String> {
    ["google.com/search", "mail.google.com", "facebook.com", "twitter.com"]
        .iter()
        .map(|d| d.to_string())
        .collect()
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_categories")]
    pub categories: Vec<CategoryRule>,
    #[serde(default = "default_exclude_domains")]
    pub exclude_domains: Vec<String>,
    #[serde(default)]
    pub recommend: RecommendConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub keyphrases: KeyphraseConfig,

    #[serde(skip_serializing, skip_deserializing)]
    base_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            categories: default_categories(),
            exclude_domains: default_exclude_domains(),
            recommend: RecommendConfig::default(),
            embedding: EmbeddingConfig::default(),
            keyphrases: KeyphraseConfig::default(),
            base_path: PathBuf::new(),
        }
    }
}

/// Resolve the data directory: `$TOPICS_BASE_PATH` or `~/.local/share/topics`.
pub fn base_path() -> anyhow::Result<PathBuf> {
    if let Ok(path) = std::env::var("TOPICS_BASE_PATH") {
        return Ok(PathBuf::from(path));
    }

    let home = my_home()?.ok_or_else(|| anyhow::anyhow!("could not determine home directory"))?;
    Ok(home.join(".local/share/topics"))
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for (idx, rule) in self.categories.iter().enumerate() {
            let idx = idx + 1;
            if rule.name.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("category #{idx} has no name")));
            }
            if rule.keywords.iter().all(|k| k.trim().is_empty()) {
                return Err(ConfigError::Invalid(format!(
                    "category '{}' has no keywords",
                    rule.name
                )));
            }
            if !seen.insert(rule.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "category '{}' is listed twice",
                    rule.name
                )));
            }
        }

        let rec = &self.recommend;
        if rec.top_n == 0 {
            return Err(ConfigError::Invalid(
                "recommend.top_n must be greater than 0".to_string(),
            ));
        }
        if rec.over_fetch_factor == 0 {
            return Err(ConfigError::Invalid(
                "recommend.over_fetch_factor must be greater than 0".to_string(),
            ));
        }
        if !(-1.0..=1.0).contains(&rec.score_threshold) {
            return Err(ConfigError::Invalid(format!(
                "recommend.score_threshold must be between -1.0 and 1.0, got {}",
                rec.score_threshold
            )));
        }

        if self.embedding.batch_size == 0 {
            return Err(ConfigError::Invalid(
                "embedding.batch_size must be greater than 0".to_string(),
            ));
        }
        if self.embedding.download_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "embedding.download_timeout_secs must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn load_with(base_path: &Path) -> Result<Self, ConfigError> {
        std::fs::create_dir_all(base_path)?;
        let config_path = base_path.join(CONFIG_FILE);

        // create new if does not exist
        if !config_path.exists() {
            std::fs::write(&config_path, serde_yml::to_string(&Self::default())?)?;
        }

        let config_str = std::fs::read_to_string(&config_path)?;
        let mut config: Self = serde_yml::from_str(&config_str)?;
        config.base_path = base_path.to_path_buf();

        config.validate()?;

        // resave in case config version needs an upgrade
        if config_str != serde_yml::to_string(&config)? {
            config.save()?;
        }

        Ok(config)
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        let config_str = serde_yml::to_string(&self)?;
        std::fs::write(self.base_path.join(CONFIG_FILE), config_str)?;
        Ok(())
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn history_db_path(&self) -> PathBuf {
        self.base_path.join(HISTORY_DB_FILE)
    }

    pub fn index_path(&self) -> PathBuf {
        self.base_path.join(INDEX_FILE)
    }
}
