//! Prompt system for kbase.
//!
//! This crate provides structured prompt management with:
//! - YAML-based prompt definitions
//! - Built-in definitions for grounded answering and categorisation
//! - Per-workspace overrides under `.kbase/prompts/`
//! - Handlebars template rendering

pub mod builder;
pub mod builtin;
pub mod loader;
pub mod types;

// Re-export main types
pub use builder::build_prompt;
pub use builtin::{ANSWER_PROMPT_ID, CATEGORIZE_PROMPT_ID};
pub use loader::{load_prompt, parse_prompt};
pub use types::{BuiltPrompt, BuiltPromptMetadata, PromptDefinition, PromptOutputSpec};
