//! LLM provider factory.
//!
//! Resolves a provider name from configuration into a ready client.

use crate::client::LlmClient;
use crate::providers::OllamaClient;
use kbase_core::{AppError, AppResult};
use std::sync::Arc;
use std::time::Duration;

/// Provider type enum for matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderType {
    Ollama,
}

impl ProviderType {
    /// Parse provider type from string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "ollama" => Some(Self::Ollama),
            _ => None,
        }
    }

    /// Get the canonical provider name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ollama => "ollama",
        }
    }

    /// Default endpoint when the configuration names none.
    pub fn default_endpoint(&self) -> &'static str {
        match self {
            Self::Ollama => "http://localhost:11434",
        }
    }
}

/// Create an LLM client based on the provider name.
///
/// # Arguments
/// * `provider` - Provider identifier ("ollama")
/// * `endpoint` - Optional custom endpoint URL
/// * `timeout` - Per-request timeout applied by the HTTP client
///
/// # Errors
/// Returns `AppError::Config` if the provider is unknown or the client
/// cannot be built.
pub fn create_client(
    provider: &str,
    endpoint: Option<&str>,
    timeout: Duration,
) -> AppResult<Arc<dyn LlmClient>> {
    let provider_type = ProviderType::parse(provider)
        .ok_or_else(|| AppError::Config(format!("Unknown provider: {}", provider)))?;

    let base_url = endpoint.unwrap_or(provider_type.default_endpoint());

    tracing::debug!(
        provider = provider_type.as_str(),
        endpoint = base_url,
        timeout_secs = timeout.as_secs(),
        "Creating LLM client"
    );

    match provider_type {
        ProviderType::Ollama => Ok(Arc::new(OllamaClient::with_base_url(base_url, timeout)?)),
    }
}
