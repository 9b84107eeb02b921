//! Concrete LLM providers.

pub mod ollama;

pub use ollama::OllamaClient;
