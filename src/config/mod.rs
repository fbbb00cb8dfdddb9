// Configuration management
// TOML-backed settings for the embedding service, vector store, chunking,
// and batch ingestion behavior.

#[cfg(test)]
mod tests;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::chunking::ChunkingConfig;
use crate::documents::SourceType;
use crate::metadata::MetadataLimits;
use crate::retry::RetryPolicy;

pub const DEFAULT_EMBEDDING_DIMENSION: usize = 1536;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub ingestion: IngestionConfig,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

/// Connection settings for the external embedding service
/// (OpenAI-compatible `/embeddings` endpoint).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub endpoint: String,
    pub model: String,
    pub dimension: usize,
    /// Maximum inputs per embedding request
    pub batch_size: usize,
    pub timeout_secs: u64,
    pub api_key: Option<String>,
}

impl Default for EmbeddingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8080/v1".to_string(),
            model: "text-embedding-3-small".to_string(),
            dimension: DEFAULT_EMBEDDING_DIMENSION,
            batch_size: 64,
            timeout_secs: 30,
            api_key: None,
        }
    }
}

/// Connection settings for the external vector store service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StoreConfig {
    pub endpoint: String,
    /// Namespace receiving report-sourced vectors
    pub report_namespace: String,
    /// Namespace receiving article-sourced vectors
    pub article_namespace: String,
    /// Maximum records per upsert call; larger requests are split
    pub max_upsert_batch: usize,
    pub timeout_secs: u64,
    pub api_key: Option<String>,
    pub limits: MetadataLimits,
}

impl Default for StoreConfig {
    #[inline]
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:6333".to_string(),
            report_namespace: "reports".to_string(),
            article_namespace: "articles".to_string(),
            max_upsert_batch: 100,
            timeout_secs: 30,
            api_key: None,
            limits: MetadataLimits::default(),
        }
    }
}

impl StoreConfig {
    #[inline]
    pub fn namespace_for(&self, source_type: SourceType) -> &str {
        match source_type {
            SourceType::Report => &self.report_namespace,
            SourceType::Article => &self.article_namespace,
        }
    }
}

/// Batch ingestion behavior.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IngestionConfig {
    /// Worker pool width; 1 means strictly sequential
    pub parallel_width: usize,
    pub retry: RetryConfig,
}

impl Default for IngestionConfig {
    #[inline]
    fn default() -> Self {
        Self {
            parallel_width: 4,
            retry: RetryConfig::default(),
        }
    }
}

/// Serializable mirror of [`RetryPolicy`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter: f64,
}

impl Default for RetryConfig {
    #[inline]
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            jitter: 0.2,
        }
    }
}

impl RetryConfig {
    #[inline]
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            jitter: self.jitter,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid URL for {0}: {1}")]
    InvalidUrl(&'static str, String),
    #[error("Invalid embedding dimension: {0} (must be between 64 and 4096)")]
    InvalidEmbeddingDimension(usize),
    #[error("Invalid batch size: {0} (must be between 1 and 1000)")]
    InvalidBatchSize(usize),
    #[error("Invalid model name: cannot be empty")]
    InvalidModel,
    #[error("Invalid namespace: cannot be empty")]
    InvalidNamespace,
    #[error("Invalid upsert batch size: {0} (must be between 1 and 1000)")]
    InvalidUpsertBatch(usize),
    #[error("Invalid parallel width: {0} (must be between 1 and 64)")]
    InvalidParallelWidth(usize),
    #[error("Invalid retry attempts: {0} (must be between 1 and 10)")]
    InvalidRetryAttempts(u32),
    #[error("Invalid jitter: {0} (must be between 0.0 and 1.0)")]
    InvalidJitter(f64),
    #[error("Invalid chunking configuration: {0}")]
    InvalidChunking(String),
    #[error("Invalid metadata limits: max_field_length and max_metadata_bytes must be non-zero")]
    InvalidMetadataLimits,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Config {
    /// Load configuration from `config.toml` under the given directory,
    /// falling back to defaults when the file does not exist.
    #[inline]
    pub fn load<P: AsRef<Path>>(config_dir: P) -> anyhow::Result<Self> {
        let config_path = config_dir.as_ref().join("config.toml");

        if !config_path.exists() {
            return Ok(Self {
                base_dir: config_dir.as_ref().to_path_buf(),
                ..Self::default()
            });
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;
        config.base_dir = config_dir.as_ref().to_path_buf();

        config
            .validate()
            .context("Configuration validation failed")?;

        Ok(config)
    }

    #[inline]
    pub fn save(&self) -> anyhow::Result<()> {
        self.validate()
            .context("Configuration validation failed before saving")?;

        fs::create_dir_all(&self.base_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                self.base_dir.display()
            )
        })?;

        let config_path = self.base_dir.join("config.toml");
        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.embedding.validate()?;
        self.store.validate()?;
        self.ingestion.validate()?;

        self.chunking
            .validate()
            .map_err(|e| ConfigError::InvalidChunking(e.to_string()))?;

        Ok(())
    }
}

impl Default for Config {
    #[inline]
    fn default() -> Self {
        Self {
            embedding: EmbeddingConfig::default(),
            store: StoreConfig::default(),
            chunking: ChunkingConfig::default(),
            ingestion: IngestionConfig::default(),
            base_dir: PathBuf::new(),
        }
    }
}

impl EmbeddingConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.endpoint_url()?;

        if self.model.trim().is_empty() {
            return Err(ConfigError::InvalidModel);
        }
        if !(64..=4096).contains(&self.dimension) {
            return Err(ConfigError::InvalidEmbeddingDimension(self.dimension));
        }
        if self.batch_size == 0 || self.batch_size > 1000 {
            return Err(ConfigError::InvalidBatchSize(self.batch_size));
        }

        Ok(())
    }

    #[inline]
    pub fn endpoint_url(&self) -> Result<Url, ConfigError> {
        Url::parse(&self.endpoint)
            .map_err(|_| ConfigError::InvalidUrl("embedding endpoint", self.endpoint.clone()))
    }
}

impl StoreConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.endpoint_url()?;

        if self.report_namespace.trim().is_empty() || self.article_namespace.trim().is_empty() {
            return Err(ConfigError::InvalidNamespace);
        }
        if self.max_upsert_batch == 0 || self.max_upsert_batch > 1000 {
            return Err(ConfigError::InvalidUpsertBatch(self.max_upsert_batch));
        }
        if self.limits.max_field_length == 0 || self.limits.max_metadata_bytes == 0 {
            return Err(ConfigError::InvalidMetadataLimits);
        }

        Ok(())
    }

    #[inline]
    pub fn endpoint_url(&self) -> Result<Url, ConfigError> {
        Url::parse(&self.endpoint)
            .map_err(|_| ConfigError::InvalidUrl("store endpoint", self.endpoint.clone()))
    }
}

impl IngestionConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.parallel_width == 0 || self.parallel_width > 64 {
            return Err(ConfigError::InvalidParallelWidth(self.parallel_width));
        }
        if self.retry.max_attempts == 0 || self.retry.max_attempts > 10 {
            return Err(ConfigError::InvalidRetryAttempts(self.retry.max_attempts));
        }
        if !(0.0..=1.0).contains(&self.retry.jitter) {
            return Err(ConfigError::InvalidJitter(self.retry.jitter));
        }

        Ok(())
    }
}

/// Default configuration directory (`~/.config/landmark-index` on Linux).
#[inline]
pub fn get_config_dir() -> anyhow::Result<PathBuf> {
    let base = dirs::config_dir().context("Could not determine user config directory")?;
    Ok(base.join("landmark-index"))
}
