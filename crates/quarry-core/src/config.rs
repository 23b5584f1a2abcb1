use crate::{QuarryError, QuarryResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration, usually read from `quarry.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuarryConfig {
    /// Directory holding the document database and, by default, the index.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// `[index]` section.
    #[serde(default)]
    pub index: IndexConfig,
    /// `[chunking]` section.
    #[serde(default)]
    pub chunking: ChunkingConfig,
    /// `[embedding]` section.
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    /// `[search]` section.
    #[serde(default)]
    pub search: SearchConfig,
}

/// Vector index settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Location of the persisted index. Defaults to `<data_dir>/vectors.idx`.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Vector length the index accepts.
    #[serde(default = "default_dimension")]
    pub dimension: usize,
    /// Initial number of entries a fresh index is sized for.
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    /// Links per node on upper layers (layer 0 keeps `2 * m`).
    #[serde(default = "default_m")]
    pub m: usize,
    /// Candidate list size while linking new vectors.
    #[serde(default = "default_ef_construction")]
    pub ef_construction: usize,
    /// Candidate list size at query time.
    #[serde(default = "default_ef_search")]
    pub ef_search: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            path: None,
            dimension: default_dimension(),
            capacity: default_capacity(),
            m: default_m(),
            ef_construction: default_ef_construction(),
            ef_search: default_ef_search(),
        }
    }
}

/// Chunker settings, measured in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Target chunk length.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Characters each chunk repeats from its predecessor. Must be smaller
    /// than `chunk_size`.
    #[serde(default = "default_overlap")]
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            overlap: default_overlap(),
        }
    }
}

/// Which embedding backend to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderKind {
    /// Offline hashed bag-of-words embeddings.
    Local,
    /// Any OpenAI-compatible `/v1/embeddings` endpoint.
    OpenAi,
}

/// Embedding provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Backend to use.
    #[serde(default = "default_provider")]
    pub provider: EmbeddingProviderKind,
    /// Model name sent to the remote API.
    #[serde(default = "default_model")]
    pub model: String,
    /// Bearer token for the remote API.
    #[serde(default)]
    pub api_key: String,
    /// Override for the API origin (e.g. a local proxy).
    pub api_base_url: Option<String>,
    /// Vector length the provider produces. Must equal `index.dimension`.
    #[serde(default = "default_dimension")]
    pub dimension: usize,
    /// Backoff for transient provider failures.
    #[serde(default)]
    pub retry_policy: RetryPolicy,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            api_key: String::new(),
            api_base_url: None,
            dimension: default_dimension(),
            retry_policy: RetryPolicy::default(),
        }
    }
}

impl EmbeddingConfig {
    /// API origin, defaulting to OpenAI.
    pub fn base_url(&self) -> &str {
        self.api_base_url
            .as_deref()
            .unwrap_or("https://api.openai.com")
    }
}

/// Configures retry behaviour for calls to the embedding provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of retries after the first attempt.
    pub max_retries: u32,
    /// Base delay in milliseconds for exponential backoff.
    pub backoff_base_ms: u64,
    /// Maximum delay in milliseconds (cap for exponential backoff).
    pub backoff_max_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base_ms: 500,
            backoff_max_ms: 30_000,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (0-based): `base * 2^attempt`,
    /// capped at `backoff_max_ms`.
    pub fn backoff_ms(&self, attempt: u32) -> u64 {
        let delay = self
            .backoff_base_ms
            .saturating_mul(2u64.saturating_pow(attempt));
        delay.min(self.backoff_max_ms)
    }
}

/// Query defaults.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Result count used when a query does not give one.
    #[serde(default = "default_limit")]
    pub default_limit: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}
fn default_dimension() -> usize {
    1536
}
fn default_capacity() -> usize {
    10_000
}
fn default_m() -> usize {
    16
}
fn default_ef_construction() -> usize {
    200
}
fn default_ef_search() -> usize {
    50
}
fn default_chunk_size() -> usize {
    1000
}
fn default_overlap() -> usize {
    200
}
fn default_provider() -> EmbeddingProviderKind {
    EmbeddingProviderKind::OpenAi
}
fn default_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_limit() -> usize {
    10
}

impl Default for QuarryConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            index: IndexConfig::default(),
            chunking: ChunkingConfig::default(),
            embedding: EmbeddingConfig::default(),
            search: SearchConfig::default(),
        }
    }
}

impl QuarryConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml_str(s: &str) -> QuarryResult<Self> {
        let config: QuarryConfig =
            toml::from_str(s).map_err(|e| QuarryError::Config(format!("Invalid TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses, and validates a TOML file.
    pub async fn load(path: &Path) -> QuarryResult<Self> {
        let data = tokio::fs::read_to_string(path).await.map_err(|e| {
            QuarryError::Config(format!("Failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&data)
    }

    /// Location of the persisted vector index.
    pub fn index_path(&self) -> PathBuf {
        self.index
            .path
            .clone()
            .unwrap_or_else(|| self.data_dir.join("vectors.idx"))
    }

    /// Rejects settings the components cannot run with.
    pub fn validate(&self) -> QuarryResult<()> {
        if self.index.dimension == 0 {
            return Err(QuarryError::Config("index.dimension must be > 0".into()));
        }
        if self.index.m < 2 {
            return Err(QuarryError::Config("index.m must be >= 2".into()));
        }
        if self.index.ef_construction == 0 {
            return Err(QuarryError::Config("index.ef_construction must be > 0".into()));
        }
        if self.index.ef_search == 0 {
            return Err(QuarryError::Config("index.ef_search must be > 0".into()));
        }
        if self.chunking.chunk_size == 0 {
            return Err(QuarryError::Config("chunking.chunk_size must be > 0".into()));
        }
        if self.chunking.overlap >= self.chunking.chunk_size {
            return Err(QuarryError::Config(format!(
                "chunking.overlap ({}) must be smaller than chunking.chunk_size ({})",
                self.chunking.overlap, self.chunking.chunk_size
            )));
        }
        if self.embedding.dimension != self.index.dimension {
            return Err(QuarryError::Config(format!(
                "embedding.dimension ({}) does not match index.dimension ({})",
                self.embedding.dimension, self.index.dimension
            )));
        }
        Ok(())
    }
}
