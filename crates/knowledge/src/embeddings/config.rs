//! Embedding configuration types.

use kbase_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

/// Embedding provider settings, stored under `embedding:` in `retrieval.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddingConfig {
    /// Provider name: "ollama" or "mock"
    pub provider: String,

    /// Model identifier (provider-specific)
    pub model: String,

    /// Embedding vector dimensions
    pub dimensions: usize,

    /// Maximum number of texts sent per backfill batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Custom provider endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

fn default_batch_size() -> usize {
    32
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            model: "nomic-embed-text".to_string(),
            dimensions: 768,
            batch_size: default_batch_size(),
            endpoint: None,
        }
    }
}

impl EmbeddingConfig {
    /// Offline deterministic configuration.
    pub fn mock(dimensions: usize) -> Self {
        Self {
            provider: "mock".to_string(),
            model: "trigram-v1".to_string(),
            dimensions,
            batch_size: default_batch_size(),
            endpoint: None,
        }
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.dimensions == 0 {
            return Err(AppError::Config(
                "embedding.dimensions must be greater than zero".to_string(),
            ));
        }

        if self.batch_size == 0 {
            return Err(AppError::Config(
                "embedding.batchSize must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}
