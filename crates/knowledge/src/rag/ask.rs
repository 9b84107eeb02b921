//! Grounded answer synthesis.
//!
//! Retrieves context through the hybrid planner, renders the `kb.answer`
//! prompt and makes a single bounded generation call.

use crate::config::RetrievalConfig;
use crate::rag::context::{assemble_context, render_context};
use crate::rag::types::{AnswerOutcome, ContextArticle};
use crate::search::HybridRetriever;
use crate::types::SearchMode;
use kbase_core::{AppError, AppResult};
use kbase_llm::{LlmClient, LlmRequest, LlmResponse};
use kbase_prompt::{build_prompt, PromptDefinition};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

/// Maximum tokens requested for an answer.
const MAX_ANSWER_TOKENS: u32 = 1000;

/// Produces answers grounded in retrieved articles.
pub struct AnswerSynthesizer {
    retriever: HybridRetriever,
    llm: Arc<dyn LlmClient>,
    model: String,
    prompt: PromptDefinition,
    config: RetrievalConfig,
}

impl AnswerSynthesizer {
    pub fn new(
        retriever: HybridRetriever,
        llm: Arc<dyn LlmClient>,
        model: impl Into<String>,
        prompt: PromptDefinition,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            retriever,
            llm,
            model: model.into(),
            prompt,
            config,
        }
    }

    /// Answer a question.
    ///
    /// With `use_context`, the best `context_limit` hybrid results become the
    /// context and every one of them is cited. An empty retrieval still
    /// produces an answer. Generation failure or timeout is
    /// `AppError::Generation`.
    pub async fn ask(&self, question: &str, use_context: bool) -> AppResult<AnswerOutcome> {
        let started = Instant::now();

        let question = question.trim();
        if question.is_empty() {
            return Err(AppError::InvalidInput("question is required".to_string()));
        }

        let (context, degraded) = if use_context {
            let outcome = self
                .retriever
                .search(question, SearchMode::Hybrid, self.config.context_limit)
                .await?;
            (
                assemble_context(&outcome.results, self.config.snippet_chars),
                outcome.degraded,
            )
        } else {
            (Vec::new(), false)
        };

        let confidence = context
            .iter()
            .map(|a| a.score)
            .reduce(f32::max)
            .unwrap_or(0.0);
        let low_confidence = confidence < self.config.confidence_threshold;

        tracing::info!(
            context_articles = context.len(),
            confidence,
            low_confidence,
            degraded,
            "Generating answer"
        );

        let request = self.build_request(question, &context, low_confidence)?;
        let response = self.generate(&request).await?;

        let latency_ms = started.elapsed().as_millis() as u64;

        tracing::debug!(
            latency_ms,
            tokens = response.usage.total_tokens,
            "Answer generated"
        );

        Ok(AnswerOutcome {
            answer: response.content.trim().to_string(),
            confidence,
            low_confidence,
            citations: context.iter().map(ContextArticle::citation).collect(),
            tokens: response.usage.total_tokens,
            latency_ms,
            degraded,
        })
    }

    fn build_request(
        &self,
        question: &str,
        context: &[ContextArticle],
        low_confidence: bool,
    ) -> AppResult<LlmRequest> {
        let mut variables = HashMap::new();
        variables.insert("question".to_string(), question.to_string());
        variables.insert("context".to_string(), render_context(context));
        variables.insert(
            "lowConfidence".to_string(),
            if low_confidence { "true" } else { "" }.to_string(),
        );

        let built = build_prompt(&self.prompt, variables)?;

        let mut request =
            LlmRequest::new(built.user, self.model.clone()).with_max_tokens(MAX_ANSWER_TOKENS);
        if let Some(system) = built.system {
            request = request.with_system(system);
        }
        if let Some(temperature) = built.metadata.temperature {
            request = request.with_temperature(temperature);
        }
        if built.metadata.json_output {
            request = request.with_json_output();
        }

        Ok(request)
    }

    async fn generate(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        let timeout = self.config.generation_timeout();

        match tokio::time::timeout(timeout, self.llm.complete(request)).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => {
                tracing::warn!(provider = self.llm.provider_name(), error = %e, "Answer generation failed");
                Err(match e {
                    AppError::Generation(_) => e,
                    other => AppError::Generation(other.to_string()),
                })
            }
            Err(_) => {
                tracing::warn!(
                    provider = self.llm.provider_name(),
                    timeout_ms = timeout.as_millis() as u64,
                    "Answer generation timed out"
                );
                Err(AppError::Generation(format!(
                    "Answer generation timed out after {}ms",
                    timeout.as_millis()
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::providers::MockProvider;
    use crate::embeddings::EmbeddingProvider;
    use crate::store::{ArticleStore, SqliteArticleStore};
    use crate::types::Article;
    use crate::tests::doubles::ScriptedLlm;
    use kbase_prompt::{builtin::builtin_source, parse_prompt, ANSWER_PROMPT_ID};
    use std::time::Duration;

    async fn synthesizer(llm: Arc<ScriptedLlm>, config: RetrievalConfig) -> AnswerSynthesizer {
        let embedder = Arc::new(MockProvider::new(256));
        let store = SqliteArticleStore::open_in_memory().unwrap();
        for article in [
            Article::new("kb-1", "Creating projects", "Create a project with the New Project button.")
                .with_summary("Create a project from the dashboard"),
            Article::new("kb-2", "Project templates", "Templates speed up project creation."),
        ] {
            let vector = embedder.embed(&article.embedding_text()).await.unwrap();
            store.upsert(&article.with_embedding(vector)).unwrap();
        }

        let retriever = HybridRetriever::new(Arc::new(store), embedder, config.clone());
        let prompt = parse_prompt(builtin_source(ANSWER_PROMPT_ID).unwrap()).unwrap();
        AnswerSynthesizer::new(retriever, llm, "llama3.2", prompt, config)
    }

    fn permissive() -> RetrievalConfig {
        RetrievalConfig {
            min_score: 0.05,
            ..RetrievalConfig::default()
        }
    }

    #[tokio::test]
    async fn test_citations_match_context() {
        let llm = Arc::new(ScriptedLlm::answering("Use the New Project button."));
        let synth = synthesizer(llm.clone(), permissive()).await;

        let outcome = synth.ask("create a project", true).await.unwrap();
        assert_eq!(outcome.answer, "Use the New Project button.");
        assert_eq!(outcome.tokens, 120);
        assert!(!outcome.citations.is_empty());

        let request = llm.last_request.lock().unwrap().clone().unwrap();
        for citation in &outcome.citations {
            assert!(request.prompt.contains(&format!("## {}", citation.title)));
        }
        assert!(outcome.confidence > 0.0);
        assert_eq!(request.model, "llama3.2");
    }

    #[tokio::test]
    async fn test_without_context() {
        let llm = Arc::new(ScriptedLlm::answering("General answer."));
        let synth = synthesizer(llm.clone(), permissive()).await;

        let outcome = synth.ask("create a project", false).await.unwrap();
        assert!(outcome.citations.is_empty());
        assert_eq!(outcome.confidence, 0.0);
        assert!(outcome.low_confidence);

        let request = llm.last_request.lock().unwrap().clone().unwrap();
        assert!(request.prompt.contains("No knowledge base articles matched"));
        assert!(request.system.unwrap().contains("loosely related"));
    }

    #[tokio::test]
    async fn test_generation_failure_propagates() {
        let llm = Arc::new(ScriptedLlm::failing("connection refused"));
        let synth = synthesizer(llm, permissive()).await;

        let result = synth.ask("create a project", true).await;
        assert!(matches!(result, Err(AppError::Generation(_))));
    }

    #[tokio::test]
    async fn test_generation_timeout() {
        let llm = Arc::new(ScriptedLlm {
            delay: Duration::from_secs(5),
            ..ScriptedLlm::answering("late")
        });
        let config = RetrievalConfig {
            generation_timeout_secs: 1,
            ..permissive()
        };
        let synth = synthesizer(llm, config).await;

        let result = synth.ask("create a project", true).await;
        assert!(matches!(result, Err(AppError::Generation(_))));
    }

    #[tokio::test]
    async fn test_blank_question_rejected() {
        let llm = Arc::new(ScriptedLlm::answering("unused"));
        let synth = synthesizer(llm.clone(), permissive()).await;

        assert!(matches!(
            synth.ask("  ", true).await,
            Err(AppError::InvalidInput(_))
        ));
        assert!(llm.last_request.lock().unwrap().is_none());
    }
}
