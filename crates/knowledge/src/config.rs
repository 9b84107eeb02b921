//! Retrieval configuration management.
//!
//! Thresholds, limits and timeouts live in `.kbase/retrieval.yaml`. Missing
//! keys fall back to their defaults, so a partial file is valid.

use crate::embeddings::EmbeddingConfig;
use crate::rank::DEFAULT_LIMIT;
use kbase_core::config::STATE_DIR;
use kbase_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const PROVIDER_TIMEOUT_GRACE: Duration = Duration::from_secs(5);

/// Retrieval and synthesis settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct RetrievalConfig {
    /// Minimum cosine score for general search
    pub min_score: f32,

    /// Minimum cosine score for related-article lookups
    pub related_min_score: f32,

    /// Result count when the request does not give one
    pub default_limit: usize,

    /// Upper bound accepted from requests
    pub max_limit: usize,

    /// Articles assembled into an answer context
    pub context_limit: usize,

    /// Score given to every lexical match
    pub lexical_score: f32,

    /// Body excerpt length used when an article has no summary
    pub snippet_chars: usize,

    /// Answers below this confidence are flagged low-confidence
    pub confidence_threshold: f32,

    /// Number of entries in the top-queries summary
    pub top_queries: usize,

    pub embedding_timeout_secs: u64,

    pub generation_timeout_secs: u64,

    pub classification_timeout_secs: u64,

    pub embedding: EmbeddingConfig,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            min_score: 0.70,
            related_min_score: 0.75,
            default_limit: DEFAULT_LIMIT,
            max_limit: 50,
            context_limit: 3,
            lexical_score: 0.5,
            snippet_chars: 500,
            confidence_threshold: 0.75,
            top_queries: 10,
            embedding_timeout_secs: 10,
            generation_timeout_secs: 60,
            classification_timeout_secs: 30,
            embedding: EmbeddingConfig::default(),
        }
    }
}

impl RetrievalConfig {
    pub fn embedding_timeout(&self) -> Duration {
        Duration::from_secs(self.embedding_timeout_secs)
    }

    pub fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.generation_timeout_secs)
    }

    pub fn classification_timeout(&self) -> Duration {
        Duration::from_secs(self.classification_timeout_secs)
    }

    /// Transport timeout for the generation client.
    ///
    /// Sits above both call timeouts so `generationTimeoutSecs` and
    /// `classificationTimeoutSecs` are the bounds that fire.
    pub fn provider_timeout(&self) -> Duration {
        self.generation_timeout().max(self.classification_timeout()) + PROVIDER_TIMEOUT_GRACE
    }

    /// Check value ranges.
    pub fn validate(&self) -> AppResult<()> {
        for (name, value) in [
            ("minScore", self.min_score),
            ("relatedMinScore", self.related_min_score),
            ("confidenceThreshold", self.confidence_threshold),
        ] {
            if !(-1.0..=1.0).contains(&value) {
                return Err(AppError::Config(format!(
                    "{} must be within [-1, 1], got {}",
                    name, value
                )));
            }
        }

        if self.default_limit == 0 || self.context_limit == 0 {
            return Err(AppError::Config(
                "defaultLimit and contextLimit must be greater than zero".to_string(),
            ));
        }

        if self.default_limit > self.max_limit {
            return Err(AppError::Config(format!(
                "defaultLimit ({}) exceeds maxLimit ({})",
                self.default_limit, self.max_limit
            )));
        }

        if self.embedding_timeout_secs == 0
            || self.generation_timeout_secs == 0
            || self.classification_timeout_secs == 0
        {
            return Err(AppError::Config(
                "timeouts must be greater than zero".to_string(),
            ));
        }

        self.embedding.validate()
    }
}

/// Load retrieval configuration.
///
/// Loads from `.kbase/retrieval.yaml` if it exists, otherwise returns the
/// defaults.
pub fn load_config(workspace: &Path) -> AppResult<RetrievalConfig> {
    let config_path = get_config_path(workspace);

    let config = if config_path.exists() {
        let content = fs::read_to_string(&config_path).map_err(|e| {
            AppError::Config(format!("Failed to read config at {:?}: {}", config_path, e))
        })?;

        let config: RetrievalConfig = serde_yaml::from_str(&content).map_err(|e| {
            AppError::Config(format!("Failed to parse config at {:?}: {}", config_path, e))
        })?;

        tracing::debug!("Loaded retrieval config from {:?}", config_path);
        config
    } else {
        tracing::debug!("Using default retrieval config (no config file found)");
        RetrievalConfig::default()
    };

    config.validate()?;
    Ok(config)
}

/// Save retrieval configuration.
pub fn save_config(workspace: &Path, config: &RetrievalConfig) -> AppResult<()> {
    let config_path = get_config_path(workspace);

    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            AppError::Config(format!("Failed to create config directory: {}", e))
        })?;
    }

    let yaml = serde_yaml::to_string(config)?;

    fs::write(&config_path, yaml).map_err(|e| {
        AppError::Config(format!("Failed to write config to {:?}: {}", config_path, e))
    })?;

    tracing::debug!("Saved retrieval config to {:?}", config_path);
    Ok(())
}

/// Get the path to the retrieval config file.
pub fn get_config_path(workspace: &Path) -> PathBuf {
    workspace.join(STATE_DIR).join("retrieval.yaml")
}

/// Get the SQLite article store path.
pub fn get_articles_path(workspace: &Path) -> PathBuf {
    workspace.join(STATE_DIR).join("articles.sqlite")
}

/// Get the SQLite record store path.
pub fn get_records_path(workspace: &Path) -> PathBuf {
    workspace.join(STATE_DIR).join("records.sqlite")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_default_config() {
        let temp = TempDir::new().unwrap();
        let config = load_config(temp.path()).unwrap();

        assert_eq!(config.min_score, 0.70);
        assert_eq!(config.related_min_score, 0.75);
        assert_eq!(config.default_limit, 5);
        assert_eq!(config.context_limit, 3);
        assert_eq!(config.snippet_chars, 500);
    }

    #[test]
    fn test_save_and_load_config() {
        let temp = TempDir::new().unwrap();
        let config = RetrievalConfig {
            min_score: 0.6,
            embedding: EmbeddingConfig::mock(64),
            ..RetrievalConfig::default()
        };

        save_config(temp.path(), &config).unwrap();

        let loaded = load_config(temp.path()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file() {
        let temp = TempDir::new().unwrap();
        let path = get_config_path(temp.path());
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "relatedMinScore: 0.8\ngenerationTimeoutSecs: 5\n").unwrap();

        let loaded = load_config(temp.path()).unwrap();
        assert_eq!(loaded.related_min_score, 0.8);
        assert_eq!(loaded.generation_timeout(), Duration::from_secs(5));
        assert_eq!(loaded.min_score, 0.70);
    }

    #[test]
    fn test_provider_timeout_outlasts_call_timeouts() {
        let config = RetrievalConfig {
            generation_timeout_secs: 90,
            classification_timeout_secs: 20,
            ..RetrievalConfig::default()
        };
        assert!(config.provider_timeout() > config.generation_timeout());
        assert!(config.provider_timeout() > config.classification_timeout());
        assert_eq!(config.provider_timeout(), Duration::from_secs(95));
    }

    #[test]
    fn test_out_of_range_threshold_rejected() {
        let config = RetrievalConfig {
            min_score: 1.5,
            ..RetrievalConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
