//! LLM integration crate for kbase.
//!
//! This crate provides a provider-agnostic abstraction over the answer
//! generation service. The knowledge crate only sees [`LlmClient`]; the
//! concrete provider is chosen by [`create_client`].
//!
//! # Providers
//! - **Ollama**: Local LLM runtime (default)
//!
//! # Example
//! ```no_run
//! use kbase_llm::{LlmClient, LlmRequest, providers::OllamaClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = OllamaClient::new()?;
//! let request = LlmRequest::new("Hello, world!", "llama3.2");
//! let response = client.complete(&request).await?;
//! println!("{}", response.content);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod factory;
pub mod providers;

// Re-export main types
pub use client::{LlmClient, LlmRequest, LlmResponse, LlmUsage};
pub use factory::{create_client, ProviderType};
pub use providers::OllamaClient;
