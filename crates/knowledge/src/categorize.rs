//! Category and tag suggestions for new articles.

use kbase_core::{AppError, AppResult};
use kbase_llm::{LlmClient, LlmRequest};
use kbase_prompt::{build_prompt, PromptDefinition};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use unicode_segmentation::UnicodeSegmentation;

/// Categories offered when the knowledge base has none yet.
pub const FALLBACK_CATEGORIES: [&str; 4] = ["General", "Technical", "Process", "Documentation"];

/// Maximum number of suggested tags.
pub const MAX_TAGS: usize = 5;

/// Content beyond this many characters is not sent to the classifier.
const MAX_CONTENT_CHARS: usize = 4000;

/// A suggested category with tags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub category: String,
    pub tags: Vec<String>,
}

/// Decides a category and tags for an article.
#[async_trait::async_trait]
pub trait Classifier: Send + Sync {
    /// Classify into one of `categories` (never empty).
    async fn classify(&self, title: &str, content: &str, categories: &[String]) -> AppResult<Classification>;
}

/// Classifier backed by the generation service and the `kb.categorize`
/// prompt.
pub struct LlmClassifier {
    llm: Arc<dyn LlmClient>,
    model: String,
    prompt: PromptDefinition,
}

#[derive(Debug, Deserialize)]
struct RawClassification {
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
}

impl LlmClassifier {
    pub fn new(llm: Arc<dyn LlmClient>, model: impl Into<String>, prompt: PromptDefinition) -> Self {
        Self {
            llm,
            model: model.into(),
            prompt,
        }
    }
}

#[async_trait::async_trait]
impl Classifier for LlmClassifier {
    async fn classify(&self, title: &str, content: &str, categories: &[String]) -> AppResult<Classification> {
        let content = match content.grapheme_indices(true).nth(MAX_CONTENT_CHARS) {
            Some((cut, _)) => &content[..cut],
            None => content,
        };

        let mut variables = HashMap::new();
        variables.insert("title".to_string(), title.to_string());
        variables.insert("content".to_string(), content.to_string());
        variables.insert("categories".to_string(), categories.join(", "));

        let built = build_prompt(&self.prompt, variables)?;

        let mut request = LlmRequest::new(built.user, self.model.clone()).with_max_tokens(200);
        if let Some(system) = built.system {
            request = request.with_system(system);
        }
        if let Some(temperature) = built.metadata.temperature {
            request = request.with_temperature(temperature);
        }
        if built.metadata.json_output {
            request = request.with_json_output();
        }

        let response = self.llm.complete(&request).await?;
        let raw = parse_reply(&response.content)?;

        Ok(Classification {
            category: raw.category.unwrap_or_default(),
            tags: raw.tags,
        })
    }
}

/// Parse the JSON object in a classifier reply, ignoring any prose around it.
fn parse_reply(reply: &str) -> AppResult<RawClassification> {
    let json = match (reply.find('{'), reply.rfind('}')) {
        (Some(start), Some(end)) if start < end => &reply[start..=end],
        _ => {
            return Err(AppError::Generation(
                "Classifier reply contained no JSON object".to_string(),
            ))
        }
    };

    serde_json::from_str(json)
        .map_err(|e| AppError::Generation(format!("Classifier reply was not valid JSON: {}", e)))
}

/// Validates input, picks the offered categories and normalises the
/// classifier's answer.
pub struct CategorizationAdvisor {
    classifier: Arc<dyn Classifier>,
    timeout: Duration,
}

impl CategorizationAdvisor {
    pub fn new(classifier: Arc<dyn Classifier>, timeout: Duration) -> Self {
        Self { classifier, timeout }
    }

    /// Suggest a category and tags.
    ///
    /// Blank title or content is `InvalidInput` and no classifier call is
    /// made. With no known categories the fallback list is offered.
    pub async fn categorize(
        &self,
        title: &str,
        content: &str,
        known_categories: &[String],
    ) -> AppResult<Classification> {
        let title = title.trim();
        let content = content.trim();

        if title.is_empty() {
            return Err(AppError::InvalidInput("title is required".to_string()));
        }
        if content.is_empty() {
            return Err(AppError::InvalidInput("content is required".to_string()));
        }

        let offered = offered_categories(known_categories);

        let raw = match tokio::time::timeout(
            self.timeout,
            self.classifier.classify(title, content, &offered),
        )
        .await
        {
            Ok(result) => result.map_err(|e| match e {
                AppError::Generation(_) => e,
                other => AppError::Generation(other.to_string()),
            })?,
            Err(_) => {
                tracing::warn!(timeout_ms = self.timeout.as_millis() as u64, "Classification timed out");
                return Err(AppError::Generation(format!(
                    "Classification timed out after {}ms",
                    self.timeout.as_millis()
                )));
            }
        };

        Ok(normalize(raw, &offered))
    }
}

/// The known categories, or the fallback list when there are none.
pub fn offered_categories(known: &[String]) -> Vec<String> {
    let known: Vec<String> = known
        .iter()
        .map(|c| c.trim())
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect();

    if known.is_empty() {
        FALLBACK_CATEGORIES.iter().map(|c| c.to_string()).collect()
    } else {
        known
    }
}

fn normalize(raw: Classification, offered: &[String]) -> Classification {
    let wanted = raw.category.trim();
    let category = match offered.iter().find(|c| c.eq_ignore_ascii_case(wanted)) {
        Some(matched) => matched.clone(),
        None => {
            let fallback = offered.first().cloned().unwrap_or_default();
            tracing::warn!(
                suggested = wanted,
                fallback = %fallback,
                "Classifier suggested a category outside the offered list"
            );
            fallback
        }
    };

    let mut tags: Vec<String> = Vec::new();
    for tag in raw.tags {
        let tag = tag.trim().to_lowercase();
        if !tag.is_empty() && !tags.contains(&tag) {
            tags.push(tag);
        }
        if tags.len() == MAX_TAGS {
            break;
        }
    }

    Classification { category, tags }
}
