//! Answering types.

use crate::types::Citation;
use serde::{Deserialize, Serialize};

/// One article as it is presented to the generation service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextArticle {
    pub article_id: String,
    pub title: String,
    /// Summary, or a bounded excerpt of the body
    pub snippet: String,
    pub score: f32,
}

impl ContextArticle {
    pub fn citation(&self) -> Citation {
        Citation {
            article_id: self.article_id.clone(),
            title: self.title.clone(),
        }
    }
}

/// A generated answer with its grounding.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerOutcome {
    pub answer: String,

    /// Highest retrieval score among the context articles
    pub confidence: f32,

    /// Below the configured confidence threshold; steers the prompt
    #[serde(skip_serializing, default)]
    pub low_confidence: bool,

    /// Every article that was placed in the context
    pub citations: Vec<Citation>,

    /// Total tokens reported by the generator
    pub tokens: u32,

    /// Wall-clock time from request start to generator response
    pub latency_ms: u64,

    /// Retrieval ran without the semantic pass
    #[serde(skip_serializing, default)]
    pub degraded: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_internal_flags_not_serialized() {
        let outcome = AnswerOutcome {
            answer: "Use the New Project button.".to_string(),
            confidence: 0.82,
            low_confidence: false,
            citations: vec![],
            tokens: 42,
            latency_ms: 310,
            degraded: true,
        };

        let json = serde_json::to_value(&outcome).unwrap();
        assert!(json.get("lowConfidence").is_none());
        assert!(json.get("degraded").is_none());
        assert_eq!(json["latencyMs"], 310);
    }

    #[test]
    fn test_citation_from_context() {
        let article = ContextArticle {
            article_id: "kb-1".to_string(),
            title: "Creating projects".to_string(),
            snippet: "...".to_string(),
            score: 0.8,
        };
        let citation = article.citation();
        assert_eq!(citation.article_id, "kb-1");
        assert_eq!(citation.title, "Creating projects");
    }
}
