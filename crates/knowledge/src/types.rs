//! Knowledge system type definitions.

use chrono::{DateTime, Utc};
use kbase_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Words per minute used for the read-time estimate.
const WORDS_PER_MINUTE: usize = 200;

/// Publication state of an article.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArticleStatus {
    #[default]
    Published,
    Draft,
}

impl ArticleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArticleStatus::Published => "published",
            ArticleStatus::Draft => "draft",
        }
    }
}

impl FromStr for ArticleStatus {
    type Err = AppError;

    fn from_str(s: &str) -> AppResult<Self> {
        match s.to_lowercase().as_str() {
            "published" => Ok(ArticleStatus::Published),
            "draft" => Ok(ArticleStatus::Draft),
            other => Err(AppError::InvalidInput(format!(
                "Unknown article status: {}",
                other
            ))),
        }
    }
}

/// A knowledge base article.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    /// Opaque identifier
    pub id: String,

    pub title: String,

    /// Full article text
    pub body: String,

    pub summary: Option<String>,

    pub category: Option<String>,

    /// Tags in author order
    #[serde(default)]
    pub tags: Vec<String>,

    /// Embedding vector; either complete or absent
    #[serde(skip)]
    pub embedding: Option<Vec<f32>>,

    #[serde(default)]
    pub view_count: u64,

    /// Written by a generator rather than a person
    #[serde(default)]
    pub machine_generated: bool,

    #[serde(default)]
    pub status: ArticleStatus,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl Article {
    /// Create a published article with no summary, category, tags or embedding.
    pub fn new(id: impl Into<String>, title: impl Into<String>, body: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            title: title.into(),
            body: body.into(),
            summary: None,
            category: None,
            tags: Vec::new(),
            embedding: None,
            view_count: 0,
            machine_generated: false,
            status: ArticleStatus::Published,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    pub fn with_status(mut self, status: ArticleStatus) -> Self {
        self.status = status;
        self
    }

    pub fn is_published(&self) -> bool {
        self.status == ArticleStatus::Published
    }

    /// Estimated reading time in whole minutes, never less than one.
    pub fn read_time_minutes(&self) -> u32 {
        let words = self.body.split_whitespace().count();
        words.div_ceil(WORDS_PER_MINUTE).max(1) as u32
    }

    /// Text fed to the embedding provider for this article.
    pub fn embedding_text(&self) -> String {
        match &self.summary {
            Some(summary) => format!("{}\n\n{}\n\n{}", self.title, summary, self.body),
            None => format!("{}\n\n{}", self.title, self.body),
        }
    }

    /// SHA-256 over title, summary and body (hex encoded).
    pub fn content_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.title.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.summary.as_deref().unwrap_or("").as_bytes());
        hasher.update([0u8]);
        hasher.update(self.body.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

/// Retrieval strategy for a search request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    Text,
    Semantic,
    #[default]
    Hybrid,
}

impl SearchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchMode::Text => "text",
            SearchMode::Semantic => "semantic",
            SearchMode::Hybrid => "hybrid",
        }
    }
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SearchMode {
    type Err = AppError;

    fn from_str(s: &str) -> AppResult<Self> {
        match s.to_lowercase().as_str() {
            "text" => Ok(SearchMode::Text),
            "semantic" => Ok(SearchMode::Semantic),
            "hybrid" => Ok(SearchMode::Hybrid),
            other => Err(AppError::InvalidInput(format!(
                "Unknown search mode: {}. Expected text, semantic or hybrid",
                other
            ))),
        }
    }
}

/// An article paired with its relevance score.
#[derive(Debug, Clone)]
pub struct ScoredArticle {
    pub article: Article,
    pub score: f32,
}

/// Reference to an article used to ground an answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Citation {
    pub article_id: String,
    pub title: String,
}

/// One ranked result as it was presented to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedHit {
    pub article_id: String,
    pub score: f32,
}

/// A search as it was served.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRecord {
    pub id: String,
    pub query: String,
    pub mode: SearchMode,
    /// Results in presented order
    pub results: Vec<RankedHit>,
    pub clicked_article_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl QueryRecord {
    pub fn new(query: impl Into<String>, mode: SearchMode, results: Vec<RankedHit>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            query: query.into(),
            mode,
            results,
            clicked_article_id: None,
            created_at: Utc::now(),
        }
    }
}

/// A generated answer as it was served.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerRecord {
    pub id: String,
    pub question: String,
    pub answer: String,
    pub citations: Vec<Citation>,
    pub tokens: u32,
    pub latency_ms: u64,
    pub confidence: f32,
    pub helpful: Option<bool>,
    pub created_at: DateTime<Utc>,
}

/// Aggregated view of the recorded queries and answers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordSummary {
    pub total_queries: u64,
    pub clicked_queries: u64,
    pub total_answers: u64,
    pub rated_answers: u64,
    pub helpful_answers: u64,
    /// Most frequent query texts, most frequent first
    pub top_queries: Vec<TopQuery>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopQuery {
    pub query: String,
    pub count: u64,
}
