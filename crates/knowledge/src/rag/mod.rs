//! Retrieval-augmented answering.
//!
//! Assembles a bounded context from the best matching articles and asks the
//! generation service for a grounded answer.

pub mod ask;
pub mod context;
pub mod types;

pub use ask::AnswerSynthesizer;
pub use context::{assemble_context, render_context, snippet};
pub use types::{AnswerOutcome, ContextArticle};
