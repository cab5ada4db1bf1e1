// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration file support for polidx
//!
//! Loads configuration from .polidx.toml in the current directory or
//! ~/.config/polidx/config.toml

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::builder::{BuildOptions, DEFAULT_BATCH_SIZE, DEFAULT_MAX_ATTEMPTS};
use crate::embedding::chunker::{
    ChunkConfig, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE, DEFAULT_SEPARATOR, DEFAULT_SNAP_LIMIT,
};
use crate::embedding::provider::{RemoteEmbedderConfig, DEFAULT_BASE_URL, DEFAULT_MODEL};

/// Chunking configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Target characters per chunk
    pub chunk_size: Option<usize>,
    /// Overlap characters between consecutive chunks
    pub chunk_overlap: Option<usize>,
    /// Boundary separator to snap cuts to
    pub separator: Option<String>,
    /// Maximum distance past chunk_size to search for a separator
    pub snap_limit: Option<usize>,
}

impl ChunkingConfig {
    /// Get chunk size (defaults to 500)
    pub fn chunk_size(&self) -> usize {
        self.chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE)
    }

    /// Get chunk overlap (defaults to 50)
    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap.unwrap_or(DEFAULT_CHUNK_OVERLAP)
    }

    /// Get separator (defaults to a paragraph break)
    pub fn separator(&self) -> &str {
        self.separator.as_deref().unwrap_or(DEFAULT_SEPARATOR)
    }

    /// Get snap limit (defaults to 100)
    pub fn snap_limit(&self) -> usize {
        self.snap_limit.unwrap_or(DEFAULT_SNAP_LIMIT)
    }

    /// Build a ChunkConfig from this section. Size invariants are checked
    /// when the chunker runs.
    pub fn to_chunk_config(&self) -> ChunkConfig {
        ChunkConfig {
            chunk_size: self.chunk_size(),
            overlap: self.chunk_overlap(),
            separator: self.separator().to_string(),
            snap_limit: self.snap_limit(),
        }
    }
}

/// Embedding provider configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Model identifier for the embedding provider
    pub model: Option<String>,
    /// Endpoint host override (primarily for tests)
    pub base_url: Option<String>,
    /// API key; GEMINI_API_KEY takes effect at the CLI when unset here
    pub api_key: Option<String>,
    /// Number of chunks per provider batch
    pub batch_size: Option<usize>,
    /// Attempts per batch before giving up on a transient failure
    pub max_attempts: Option<usize>,
    /// Per-request timeout in seconds
    pub request_timeout_secs: Option<u64>,
    /// Backoff before the first retry, in milliseconds
    pub initial_backoff_ms: Option<u64>,
}

impl EmbeddingConfig {
    /// Get model identifier (defaults to "gemini-embedding-001")
    pub fn model(&self) -> &str {
        self.model.as_deref().unwrap_or(DEFAULT_MODEL)
    }

    /// Get endpoint host
    pub fn base_url(&self) -> &str {
        self.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL)
    }

    /// Get batch size (defaults to 32)
    pub fn batch_size(&self) -> usize {
        self.batch_size.unwrap_or(DEFAULT_BATCH_SIZE)
    }

    /// Get attempt budget (defaults to 3)
    pub fn max_attempts(&self) -> usize {
        self.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS)
    }

    /// Get request timeout (defaults to 30s)
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.unwrap_or(30))
    }

    /// Get initial retry backoff (defaults to 500ms)
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms.unwrap_or(500))
    }

    /// Build a RemoteEmbedderConfig from this section
    pub fn to_remote_config(&self) -> RemoteEmbedderConfig {
        RemoteEmbedderConfig {
            model: self.model().to_string(),
            base_url: self.base_url().to_string(),
            timeout: self.request_timeout(),
        }
    }
}

/// Index artifact configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Destination path for the persisted index
    pub destination: Option<PathBuf>,
}

impl IndexConfig {
    /// Get destination path (defaults to "policy_index.db")
    pub fn destination(&self) -> PathBuf {
        self.destination
            .clone()
            .unwrap_or_else(|| PathBuf::from("policy_index.db"))
    }
}

/// Configuration loaded from .polidx.toml or ~/.config/polidx/config.toml
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Chunking configuration
    #[serde(default)]
    pub chunking: ChunkingConfig,

    /// Embedding configuration
    #[serde(default)]
    pub embeddings: EmbeddingConfig,

    /// Index configuration
    #[serde(default)]
    pub index: IndexConfig,
}

impl Config {
    /// Load configuration from files
    ///
    /// Precedence (highest to lowest):
    /// 1. .polidx.toml in current directory
    /// 2. ~/.config/polidx/config.toml
    pub fn load() -> Self {
        if let Some(config) = Self::load_from_path(&PathBuf::from(".polidx.toml")) {
            return config;
        }

        if let Some(home) = dirs::home_dir() {
            let config_path = home.join(".config").join("polidx").join("config.toml");
            if let Some(config) = Self::load_from_path(&config_path) {
                return config;
            }
        }

        Self::default()
    }

    fn load_from_path(path: &PathBuf) -> Option<Self> {
        let content = std::fs::read_to_string(path).ok()?;
        match toml::from_str(&content) {
            Ok(config) => Some(config),
            Err(e) => {
                eprintln!("Warning: Failed to parse {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Assemble BuildOptions from the chunking and embedding sections
    pub fn build_options(&self) -> BuildOptions {
        BuildOptions {
            chunking: self.chunking.to_chunk_config(),
            batch_size: self.embeddings.batch_size(),
            max_attempts: self.embeddings.max_attempts(),
            initial_backoff: self.embeddings.initial_backoff(),
            show_progress: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.chunking.chunk_size(), 500);
        assert_eq!(config.chunking.chunk_overlap(), 50);
        assert_eq!(config.chunking.separator(), "\n\n");
        assert_eq!(config.embeddings.model(), "gemini-embedding-001");
        assert_eq!(config.embeddings.batch_size(), 32);
        assert_eq!(config.index.destination(), PathBuf::from("policy_index.db"));
    }

    #[test]
    fn test_parse_sections() {
        let config: Config = toml::from_str(
            r#"
            [chunking]
            chunk_size = 200
            chunk_overlap = 10
            separator = "\n"

            [embeddings]
            model = "custom-model"
            batch_size = 8

            [index]
            destination = "out/index.db"
            "#,
        )
        .unwrap();

        assert_eq!(config.chunking.chunk_size(), 200);
        assert_eq!(config.chunking.chunk_overlap(), 10);
        assert_eq!(config.chunking.separator(), "\n");
        assert_eq!(config.embeddings.model(), "custom-model");
        assert_eq!(config.embeddings.batch_size(), 8);
        assert_eq!(config.index.destination(), PathBuf::from("out/index.db"));
    }

    #[test]
    fn test_partial_sections_fall_back() {
        let config: Config = toml::from_str(
            r#"
            [chunking]
            chunk_size = 100
            "#,
        )
        .unwrap();

        assert_eq!(config.chunking.chunk_size(), 100);
        assert_eq!(config.chunking.chunk_overlap(), 50);
        assert_eq!(config.embeddings.model(), "gemini-embedding-001");
    }
}
