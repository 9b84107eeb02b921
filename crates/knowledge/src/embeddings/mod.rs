//! Embedding generation.
//!
//! Provider-agnostic embedding behind [`EmbeddingProvider`], with a
//! deterministic offline provider and an Ollama-backed one.

pub mod config;
pub mod provider;
pub mod providers;

pub use config::EmbeddingConfig;
pub use provider::{create_provider, EmbeddingProvider};

use kbase_core::{AppError, AppResult};
use std::time::Duration;

/// Embed one text, bounded by `timeout`.
///
/// An elapsed timeout is reported as `AppError::Generation`.
pub async fn embed_with_timeout(
    provider: &dyn EmbeddingProvider,
    text: &str,
    timeout: Duration,
) -> AppResult<Vec<f32>> {
    match tokio::time::timeout(timeout, provider.embed(text)).await {
        Ok(result) => result,
        Err(_) => Err(AppError::Generation(format!(
            "Embedding request timed out after {}ms",
            timeout.as_millis()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kbase_core::AppResult;

    #[derive(Debug)]
    struct StalledProvider;

    #[async_trait::async_trait]
    impl EmbeddingProvider for StalledProvider {
        fn provider_name(&self) -> &str {
            "stalled"
        }

        fn model_name(&self) -> &str {
            "none"
        }

        fn dimensions(&self) -> usize {
            2
        }

        async fn embed_batch(&self, _texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_timeout_becomes_generation_failure() {
        let result =
            embed_with_timeout(&StalledProvider, "query", Duration::from_millis(20)).await;
        assert!(matches!(result, Err(AppError::Generation(_))));
    }

    #[tokio::test]
    async fn test_within_timeout() {
        let provider = providers::MockProvider::new(16);
        let result = embed_with_timeout(&provider, "query text", Duration::from_secs(5)).await;
        assert_eq!(result.unwrap().len(), 16);
    }
}
