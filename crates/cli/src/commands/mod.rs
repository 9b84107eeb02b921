//! Command handlers for the kbase CLI.
//!
//! This module organizes all CLI commands into separate submodules.

pub mod ask;
pub mod knowledge;
pub mod request;
pub mod search;
pub mod serve;
pub mod stats;

// Re-export command types for convenience
pub use ask::{AskCommand, FeedbackCommand};
pub use knowledge::{CategorizeCommand, EmbedCommand, ImportCommand};
pub use request::RequestCommand;
pub use search::{RelatedCommand, SearchCommand, ShowCommand};
pub use serve::ServeCommand;
pub use stats::StatsCommand;

use kbase_core::AppResult;
use serde::Serialize;

/// Print a value as pretty JSON on stdout.
pub(crate) fn print_json<T: Serialize>(value: &T) -> AppResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
