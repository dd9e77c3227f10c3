//! Configuration management for querywright
//!
//! Handles loading, saving, and validating configuration from TOML files.

mod defaults;

pub use defaults::*;

use crate::error::{Error, Result};
use crate::index::SimilarityMetric;
use crate::prompt::FewShotExample;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Hard ceiling on follow-up suggestions per response
pub const MAX_SUGGESTIONS: usize = 4;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Read-only database connection
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Embedding model configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Schema retrieval configuration
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Language model provider configuration
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Retry loop and answer configuration
    #[serde(default)]
    pub engine: EngineConfig,

    /// Schema corpus configuration
    #[serde(default)]
    pub schema: SchemaConfig,

    /// Curated few-shot examples; empty means the built-in set
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub few_shot: Vec<FewShotExample>,

    /// Paths configuration (internal, not user-editable)
    #[serde(skip)]
    pub paths: PathsConfig,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite URL (sqlite://path/to/file.db)
    #[serde(default = "default_database_url")]
    pub url: String,

    /// Maximum pooled connections
    #[serde(default = "default_database_max_connections")]
    pub max_connections: u32,

    /// Seconds to wait for a free connection
    #[serde(default = "default_database_acquire_timeout")]
    pub acquire_timeout_secs: u64,

    /// Seconds before a running query is abandoned
    #[serde(default = "default_database_query_timeout")]
    pub query_timeout_secs: u64,

    /// LIMIT appended when a query has none
    #[serde(default = "default_database_row_limit")]
    pub row_limit: usize,

    /// Sample rows captured per table for the schema corpus
    #[serde(default = "default_database_sample_rows")]
    pub sample_rows: usize,
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Backend kind: local, http or hashing
    #[serde(default = "default_embedding_backend")]
    pub backend: String,

    /// Model name/identifier
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Embedding dimension (must match model)
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    /// Batch size for embedding
    #[serde(default = "default_embedding_batch_size")]
    pub batch_size: usize,

    /// Base URL of the HTTP embedding backend
    #[serde(default = "default_embedding_backend_url")]
    pub backend_url: String,
}

/// Lookup the expected embedding dimension for a known model
pub fn embedding_dimension_for_model(model: &str) -> Option<usize> {
    match model {
        "BAAI/bge-small-en-v1.5" => Some(384),
        "BAAI/bge-base-en-v1.5" => Some(768),
        "BAAI/bge-large-en-v1.5" => Some(1024),
        "sentence-transformers/all-MiniLM-L6-v2" => Some(384),
        _ => None,
    }
}

/// Embedding backend kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingBackendKind {
    Local,
    Http,
    Hashing,
}

impl std::str::FromStr for EmbeddingBackendKind {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.to_lowercase().as_str() {
            "local" | "fastembed" => Ok(Self::Local),
            "http" | "https" => Ok(Self::Http),
            "hashing" => Ok(Self::Hashing),
            _ => Err(Error::Config(format!(
                "Unsupported embedding backend '{}'; expected local, http or hashing",
                value
            ))),
        }
    }
}

impl EmbeddingConfig {
    pub fn backend_kind(&self) -> Result<EmbeddingBackendKind> {
        self.backend.parse()
    }
}

/// Retrieval configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Schema fragments retrieved per question
    #[serde(default = "default_retrieval_top_k")]
    pub top_k: usize,

    /// Similarity metric: cosine or inner_product
    #[serde(default = "default_retrieval_metric")]
    pub metric: String,
}

impl RetrievalConfig {
    pub fn similarity_metric(&self) -> Result<SimilarityMetric> {
        self.metric.parse()
    }
}

/// Generation provider configuration (OpenAI-compatible chat completions)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Provider base URL, up to and including the API version segment
    #[serde(default = "default_generation_base_url")]
    pub base_url: String,

    /// Model identifier
    #[serde(default = "default_generation_model")]
    pub model: String,

    /// Environment variable name for the API key
    #[serde(default = "default_generation_api_key_env")]
    pub api_key_env: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_generation_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_sql_temperature")]
    pub sql_temperature: f32,

    #[serde(default = "default_answer_temperature")]
    pub answer_temperature: f32,

    #[serde(default = "default_generation_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_answer_max_tokens")]
    pub answer_max_tokens: u32,

    /// Client-side request cap (0 disables the limiter)
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,
}

/// Retry loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Repair attempts allowed after the first generation
    #[serde(default = "default_engine_max_retries")]
    pub max_retries: u32,

    /// Conversation turns included in the prompt
    #[serde(default = "default_engine_history_turns")]
    pub history_turns: usize,

    /// Follow-up suggestions per answer (at most 4)
    #[serde(default = "default_engine_max_suggestions")]
    pub max_suggestions: usize,

    /// Result rows shown to the answer model
    #[serde(default = "default_engine_answer_preview_rows")]
    pub answer_preview_rows: usize,

    /// SQL dialect named in the system prompt
    #[serde(default = "default_engine_dialect")]
    pub dialect: String,
}

/// Schema corpus configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaConfig {
    /// JSON file with curated fragments added to the introspected corpus
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corpus_file: Option<PathBuf>,

    /// Tables left out of the corpus
    #[serde(default)]
    pub exclude_tables: Vec<String>,
}

/// Internal paths configuration
#[derive(Debug, Clone, Default)]
pub struct PathsConfig {
    /// Base directory for querywright data
    pub base_dir: PathBuf,

    /// Path to config file
    pub config_file: PathBuf,

    /// Path to the persisted index snapshot
    pub index_file: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            embedding: EmbeddingConfig::default(),
            retrieval: RetrievalConfig::default(),
            generation: GenerationConfig::default(),
            engine: EngineConfig::default(),
            schema: SchemaConfig::default(),
            few_shot: Vec::new(),
            paths: PathsConfig::default(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_database_max_connections(),
            acquire_timeout_secs: default_database_acquire_timeout(),
            query_timeout_secs: default_database_query_timeout(),
            row_limit: default_database_row_limit(),
            sample_rows: default_database_sample_rows(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: default_embedding_backend(),
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
            batch_size: default_embedding_batch_size(),
            backend_url: default_embedding_backend_url(),
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_retrieval_top_k(),
            metric: default_retrieval_metric(),
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            base_url: default_generation_base_url(),
            model: default_generation_model(),
            api_key_env: default_generation_api_key_env(),
            timeout_secs: default_generation_timeout(),
            sql_temperature: default_sql_temperature(),
            answer_temperature: default_answer_temperature(),
            max_tokens: default_generation_max_tokens(),
            answer_max_tokens: default_answer_max_tokens(),
            requests_per_minute: default_requests_per_minute(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_retries: default_engine_max_retries(),
            history_turns: default_engine_history_turns(),
            max_suggestions: default_engine_max_suggestions(),
            answer_preview_rows: default_engine_answer_preview_rows(),
            dialect: default_engine_dialect(),
        }
    }
}

impl GenerationConfig {
    /// Get the provider API key from the environment
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl DatabaseConfig {
    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }
}

impl Config {
    /// Get the default base directory for querywright (~/.querywright)
    pub fn default_base_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".querywright")
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        Self::default_base_dir().join("config.toml")
    }

    /// Initialize paths configuration
    pub fn init_paths(&mut self, base_dir: Option<PathBuf>) {
        let base = base_dir.unwrap_or_else(Self::default_base_dir);
        self.paths = PathsConfig {
            config_file: base.join("config.toml"),
            index_file: base.join("index.json"),
            base_dir: base,
        };
    }

    /// Load configuration from a specific file path
    pub fn load(config_path: &Path) -> Result<Self> {
        debug!("Loading config from {:?}", config_path);

        if !config_path.exists() {
            return Err(Error::Config(format!(
                "Config file not found: {}",
                config_path.display()
            )));
        }

        let content = std::fs::read_to_string(config_path)?;
        let mut config: Config = toml::from_str(&content)?;

        let base = config_path.parent().unwrap_or(Path::new(".")).to_path_buf();
        config.paths = PathsConfig {
            config_file: config_path.to_path_buf(),
            index_file: base.join("index.json"),
            base_dir: base,
        };

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific base directory, falling back to defaults
    pub fn load_from(base_dir: Option<PathBuf>) -> Result<Self> {
        let mut config = Config::default();
        config.init_paths(base_dir);

        if config.paths.config_file.exists() {
            debug!("Loading config from {:?}", config.paths.config_file);
            let content = std::fs::read_to_string(&config.paths.config_file)?;
            let mut loaded: Config = toml::from_str(&content)?;
            loaded.paths = config.paths;
            config = loaded;
        } else {
            debug!("No config file found, using defaults");
        }

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.paths.config_file.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&self.paths.config_file, content)?;
        info!("Saved config to {:?}", self.paths.config_file);
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if !self.database.url.starts_with("sqlite:") {
            return Err(Error::Config(
                "database.url must be a sqlite: URL".to_string(),
            ));
        }

        if self.database.max_connections == 0 {
            return Err(Error::Config(
                "database.max_connections must be at least 1".to_string(),
            ));
        }

        if self.database.query_timeout_secs == 0 || self.generation.timeout_secs == 0 {
            return Err(Error::Config(
                "timeouts must be at least one second".to_string(),
            ));
        }

        if self.database.row_limit == 0 {
            return Err(Error::Config(
                "database.row_limit must be at least 1".to_string(),
            ));
        }

        self.embedding.backend_kind()?;

        if let Some(expected) = embedding_dimension_for_model(&self.embedding.model) {
            if expected != self.embedding.dimension
                && self.embedding.backend_kind()? != EmbeddingBackendKind::Hashing
            {
                return Err(Error::Config(format!(
                    "embedding.dimension {} does not match model '{}' ({})",
                    self.embedding.dimension, self.embedding.model, expected
                )));
            }
        }

        if self.embedding.dimension == 0 || self.embedding.batch_size == 0 {
            return Err(Error::Config(
                "embedding.dimension and embedding.batch_size must be positive".to_string(),
            ));
        }

        if self.retrieval.top_k == 0 {
            return Err(Error::Config(
                "retrieval.top_k must be at least 1".to_string(),
            ));
        }

        self.retrieval.similarity_metric()?;

        if self.engine.max_suggestions > MAX_SUGGESTIONS {
            return Err(Error::Config(format!(
                "engine.max_suggestions must be at most {}",
                MAX_SUGGESTIONS
            )));
        }

        for temperature in [
            self.generation.sql_temperature,
            self.generation.answer_temperature,
        ] {
            if !(0.0..=2.0).contains(&temperature) {
                return Err(Error::Config(
                    "generation temperatures must be between 0.0 and 2.0".to_string(),
                ));
            }
        }

        if self
            .few_shot
            .iter()
            .any(|ex| ex.question.trim().is_empty() || ex.sql.trim().is_empty())
        {
            return Err(Error::Config(
                "few_shot entries need both a question and sql".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.engine.max_retries, 2);
        assert_eq!(config.retrieval.top_k, 5);
        assert_eq!(config.generation.model, "llama-3.3-70b-versatile");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_save_load() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.init_paths(Some(tmp.path().to_path_buf()));
        config.engine.max_retries = 3;
        config.retrieval.metric = "inner_product".to_string();

        config.save().unwrap();
        assert!(config.paths.config_file.exists());

        let loaded = Config::load_from(Some(tmp.path().to_path_buf())).unwrap();
        assert_eq!(loaded.engine.max_retries, 3);
        assert_eq!(
            loaded.retrieval.similarity_metric().unwrap(),
            SimilarityMetric::InnerProduct
        );
        assert_eq!(loaded.paths.index_file, tmp.path().join("index.json"));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(
            &path,
            "[engine]\nmax_retries = 1\n\n[[few_shot]]\nquestion = \"How many orders?\"\nsql = \"SELECT COUNT(*) FROM orders;\"\n",
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.engine.max_retries, 1);
        assert_eq!(config.engine.history_turns, 6);
        assert_eq!(config.few_shot.len(), 1);
        assert_eq!(config.database.row_limit, 50);
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();

        config.retrieval.top_k = 0;
        assert!(config.validate().is_err());
        config.retrieval.top_k = 5;

        config.engine.max_suggestions = MAX_SUGGESTIONS + 1;
        assert!(config.validate().is_err());
        config.engine.max_suggestions = 2;

        config.retrieval.metric = "euclidean".to_string();
        assert!(config.validate().is_err());
        config.retrieval.metric = "cosine".to_string();

        config.database.url = "mysql://localhost/northwind".to_string();
        assert!(config.validate().is_err());
        config.database.url = "sqlite://test.db".to_string();

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_dimension_must_match_known_model() {
        let mut config = Config::default();
        config.embedding.backend = "http".to_string();
        config.embedding.model = "BAAI/bge-base-en-v1.5".to_string();
        config.embedding.dimension = 384;
        assert!(config.validate().is_err());

        config.embedding.dimension = 768;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_backend_kind_parsing() {
        assert_eq!(
            "HTTP".parse::<EmbeddingBackendKind>().unwrap(),
            EmbeddingBackendKind::Http
        );
        assert_eq!(
            "fastembed".parse::<EmbeddingBackendKind>().unwrap(),
            EmbeddingBackendKind::Local
        );
        assert!("onnx".parse::<EmbeddingBackendKind>().is_err());
    }
}
