//! Wire format of the knowledge endpoint.
//!
//! A request body is a JSON object discriminated by `action`. It is parsed
//! into [`RawRequest`] and validated into a typed [`Action`] before any
//! retrieval component runs.

use crate::categorize::Classification;
use crate::config::RetrievalConfig;
use crate::types::{Article, ArticleStatus, SearchMode};
use chrono::{DateTime, Utc};
use kbase_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

/// Identity of the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user: String,
}

impl Session {
    pub fn new(user: impl Into<String>) -> Self {
        Self { user: user.into() }
    }

    /// Session used by the command line.
    pub fn local() -> Self {
        Self::new("local")
    }
}

/// Request body as received.
///
/// Every field is optional here so that a missing field is reported as
/// `InvalidInput` with a readable message instead of a serde error.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum RawRequest {
    Search {
        query: Option<String>,
        limit: Option<usize>,
        mode: Option<String>,
    },
    Ask {
        question: Option<String>,
        #[serde(rename = "useContext")]
        use_context: Option<bool>,
    },
    Categorize {
        title: Option<String>,
        content: Option<String>,
    },
    Related {
        #[serde(rename = "articleId")]
        article_id: Option<String>,
        limit: Option<usize>,
    },
    Feedback {
        #[serde(rename = "answerId")]
        answer_id: Option<String>,
        helpful: Option<bool>,
    },
    Click {
        #[serde(rename = "queryId")]
        query_id: Option<String>,
        #[serde(rename = "articleId")]
        article_id: Option<String>,
    },
}

/// A validated request.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Search {
        query: String,
        limit: usize,
        mode: SearchMode,
    },
    Ask {
        question: String,
        use_context: bool,
    },
    Categorize {
        title: String,
        content: String,
    },
    Related {
        article_id: String,
        limit: usize,
    },
    Feedback {
        answer_id: String,
        helpful: bool,
    },
    Click {
        query_id: String,
        article_id: String,
    },
}

impl Action {
    /// Name of the action as it appears on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            Action::Search { .. } => "search",
            Action::Ask { .. } => "ask",
            Action::Categorize { .. } => "categorize",
            Action::Related { .. } => "related",
            Action::Feedback { .. } => "feedback",
            Action::Click { .. } => "click",
        }
    }
}

/// Parse and validate a request body.
pub fn parse_action(body: &str, config: &RetrievalConfig) -> AppResult<Action> {
    let raw: RawRequest = serde_json::from_str(body)
        .map_err(|e| AppError::InvalidInput(format!("malformed request: {}", e)))?;
    raw.validate(config)
}

impl RawRequest {
    /// Check required fields and resolve defaults.
    pub fn validate(self, config: &RetrievalConfig) -> AppResult<Action> {
        match self {
            RawRequest::Search { query, limit, mode } => Ok(Action::Search {
                query: required(query, "query")?,
                limit: resolve_limit(limit, config)?,
                mode: match mode {
                    Some(mode) => mode.parse()?,
                    None => SearchMode::default(),
                },
            }),
            RawRequest::Ask {
                question,
                use_context,
            } => Ok(Action::Ask {
                question: required(question, "question")?,
                use_context: use_context.unwrap_or(true),
            }),
            RawRequest::Categorize { title, content } => Ok(Action::Categorize {
                title: required(title, "title")?,
                content: required(content, "content")?,
            }),
            RawRequest::Related { article_id, limit } => Ok(Action::Related {
                article_id: required(article_id, "articleId")?,
                limit: resolve_limit(limit, config)?,
            }),
            RawRequest::Feedback { answer_id, helpful } => Ok(Action::Feedback {
                answer_id: required(answer_id, "answerId")?,
                helpful: helpful
                    .ok_or_else(|| AppError::InvalidInput("helpful is required".to_string()))?,
            }),
            RawRequest::Click {
                query_id,
                article_id,
            } => Ok(Action::Click {
                query_id: required(query_id, "queryId")?,
                article_id: required(article_id, "articleId")?,
            }),
        }
    }
}

fn required(value: Option<String>, field: &str) -> AppResult<String> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(AppError::InvalidInput(format!("{} is required", field))),
    }
}

/// Absent limit takes the default; oversized limits are clamped.
fn resolve_limit(limit: Option<usize>, config: &RetrievalConfig) -> AppResult<usize> {
    match limit {
        None => Ok(config.default_limit),
        Some(0) => Err(AppError::InvalidInput(
            "limit must be greater than zero".to_string(),
        )),
        Some(n) => Ok(n.min(config.max_limit)),
    }
}

/// One search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: String,
    pub title: String,
    pub summary: Option<String>,
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub query: String,
    pub query_id: String,
    pub results: Vec<SearchHit>,
}

/// Article referenced by an answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferencedArticle {
    pub id: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AskResponse {
    pub question: String,
    pub answer_id: String,
    pub answer: String,
    pub confidence: f32,
    pub referenced_articles: Vec<ReferencedArticle>,
    pub tokens: u32,
}

/// One entry of a related-articles response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelatedArticle {
    pub id: String,
    pub title: String,
    pub summary: Option<String>,
    pub category: Option<String>,
    pub similarity: f32,
}

impl RelatedArticle {
    pub fn new(article: &Article, similarity: f32) -> Self {
        Self {
            id: article.id.clone(),
            title: article.title.clone(),
            summary: article.summary.clone(),
            category: article.category.clone(),
            similarity,
        }
    }
}

/// Metadata of a single article.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleDetails {
    pub id: String,
    pub title: String,
    pub summary: Option<String>,
    pub category: Option<String>,
    pub tags: Vec<String>,
    pub status: ArticleStatus,
    pub view_count: u64,
    pub read_time_minutes: u32,
    pub machine_generated: bool,
    pub embedded: bool,
    pub updated_at: DateTime<Utc>,
}

impl From<&Article> for ArticleDetails {
    fn from(article: &Article) -> Self {
        Self {
            id: article.id.clone(),
            title: article.title.clone(),
            summary: article.summary.clone(),
            category: article.category.clone(),
            tags: article.tags.clone(),
            status: article.status,
            view_count: article.view_count,
            read_time_minutes: article.read_time_minutes(),
            machine_generated: article.machine_generated,
            embedded: article.embedding.is_some(),
            updated_at: article.updated_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackResponse {
    pub answer_id: String,
    pub helpful: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClickResponse {
    pub query_id: String,
    pub article_id: String,
}

/// Success body of any action.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Response {
    Search(SearchResponse),
    Ask(AskResponse),
    Categorize(Classification),
    Related(Vec<RelatedArticle>),
    Feedback(FeedbackResponse),
    Click(ClickResponse),
}
