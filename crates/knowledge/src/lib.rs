//! Knowledge base retrieval and answer synthesis.
//!
//! Articles live in a local SQLite store with their embeddings. A query is
//! served by the hybrid retriever (lexical pass plus cosine ranking over
//! every embedded article); a question is answered by the synthesizer from
//! the best few articles, citing each of them. Every served query and answer
//! is recorded by a single background writer.
//!
//! [`KnowledgeService`] wires the pieces together and dispatches requests
//! by their `action`.

pub mod categorize;
pub mod config;
pub mod embeddings;
pub mod import;
pub mod rag;
pub mod rank;
pub mod recorder;
pub mod request;
pub mod search;
pub mod service;
pub mod similarity;
pub mod store;
pub mod types;

#[cfg(test)]
mod tests;

// Re-export commonly used types
pub use categorize::{CategorizationAdvisor, Classification, Classifier, LlmClassifier};
pub use config::{load_config, save_config, RetrievalConfig};
pub use embeddings::{create_provider, EmbeddingConfig, EmbeddingProvider};
pub use import::{backfill_embeddings, import_paths, BackfillStats, ImportStats};
pub use rag::{AnswerOutcome, AnswerSynthesizer};
pub use rank::rank;
pub use recorder::{RecordStore, Recorder, SqliteRecordStore};
pub use request::{parse_action, Action, ArticleDetails, Response, Session};
pub use search::{HybridRetriever, SearchOutcome};
pub use service::{KnowledgeService, ServiceParts, ServiceStats};
pub use similarity::cosine_similarity;
pub use store::{ArticleCounts, ArticleStore, SqliteArticleStore, UpsertOutcome};
pub use types::{
    AnswerRecord, Article, ArticleStatus, Citation, QueryRecord, RecordSummary, ScoredArticle,
    SearchMode,
};
