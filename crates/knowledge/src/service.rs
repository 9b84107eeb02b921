//! Request dispatch.
//!
//! [`KnowledgeService`] is built once per process and holds the shared
//! clients: the article store, the embedding provider, the generation
//! client and the recorder. Every action runs as an independent pipeline
//! over those.

use crate::categorize::{CategorizationAdvisor, Classification, Classifier, LlmClassifier};
use crate::config::{
    get_articles_path, get_config_path, get_records_path, load_config, save_config, RetrievalConfig,
};
use crate::embeddings::{create_provider, EmbeddingProvider};
use crate::rag::AnswerSynthesizer;
use crate::recorder::{RecordStore, Recorder, SqliteRecordStore};
use crate::request::{
    parse_action, Action, ArticleDetails, AskResponse, ClickResponse, FeedbackResponse,
    ReferencedArticle, RelatedArticle, Response, SearchHit, SearchResponse, Session,
};
use crate::search::HybridRetriever;
use crate::store::{ArticleCounts, ArticleStore, SqliteArticleStore};
use crate::types::{AnswerRecord, QueryRecord, RankedHit, RecordSummary, SearchMode};
use chrono::Utc;
use kbase_core::{AppConfig, AppError, AppResult};
use kbase_llm::{create_client, LlmClient};
use kbase_prompt::{load_prompt, PromptDefinition, ANSWER_PROMPT_ID, CATEGORIZE_PROMPT_ID};
use serde::Serialize;
use std::sync::Arc;

/// Components a service is assembled from.
pub struct ServiceParts {
    pub store: Arc<dyn ArticleStore>,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub llm: Arc<dyn LlmClient>,
    pub model: String,
    pub answer_prompt: PromptDefinition,
    pub classifier: Arc<dyn Classifier>,
    pub records: Box<dyn RecordStore>,
    pub config: RetrievalConfig,
}

/// Article and telemetry totals.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStats {
    pub articles: ArticleCounts,
    pub records: RecordSummary,
}

/// Shared context for every knowledge action.
pub struct KnowledgeService {
    store: Arc<dyn ArticleStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    retriever: HybridRetriever,
    synthesizer: AnswerSynthesizer,
    advisor: CategorizationAdvisor,
    recorder: Recorder,
    config: RetrievalConfig,
}

impl KnowledgeService {
    /// Open the workspace's stores and build the external clients.
    ///
    /// Writes the default retrieval config on first run.
    pub fn open(app: &AppConfig) -> AppResult<Self> {
        app.ensure_state_dir()?;

        let workspace = app.workspace.as_path();
        if !get_config_path(workspace).exists() {
            save_config(workspace, &RetrievalConfig::default())?;
        }
        let config = load_config(workspace)?;

        let store: Arc<dyn ArticleStore> =
            Arc::new(SqliteArticleStore::open(&get_articles_path(workspace))?);
        let records = SqliteRecordStore::open(&get_records_path(workspace))?;

        let embedder = create_provider(&config.embedding)?;
        let llm = create_client(&app.provider, app.endpoint.as_deref(), config.provider_timeout())?;

        let answer_prompt = load_prompt(workspace, ANSWER_PROMPT_ID)?;
        let categorize_prompt = load_prompt(workspace, CATEGORIZE_PROMPT_ID)?;
        let classifier = Arc::new(LlmClassifier::new(
            llm.clone(),
            app.model.clone(),
            categorize_prompt,
        ));

        tracing::info!(
            workspace = ?app.workspace,
            provider = %app.provider,
            model = %app.model,
            embedding_provider = embedder.provider_name(),
            embedding_model = embedder.model_name(),
            "Knowledge service ready"
        );

        Self::assemble(ServiceParts {
            store,
            embedder,
            llm,
            model: app.model.clone(),
            answer_prompt,
            classifier,
            records: Box::new(records),
            config,
        })
    }

    /// Build a service from explicit components.
    pub fn assemble(parts: ServiceParts) -> AppResult<Self> {
        let retriever = HybridRetriever::new(
            parts.store.clone(),
            parts.embedder.clone(),
            parts.config.clone(),
        );
        let synthesizer = AnswerSynthesizer::new(
            retriever.clone(),
            parts.llm,
            parts.model,
            parts.answer_prompt,
            parts.config.clone(),
        );
        let advisor =
            CategorizationAdvisor::new(parts.classifier, parts.config.classification_timeout());
        let recorder = Recorder::spawn(parts.records, Some(parts.store.clone()))?;

        Ok(Self {
            store: parts.store,
            embedder: parts.embedder,
            retriever,
            synthesizer,
            advisor,
            recorder,
            config: parts.config,
        })
    }

    pub fn store(&self) -> &Arc<dyn ArticleStore> {
        &self.store
    }

    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedder
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Handle a raw request body.
    ///
    /// The session is checked before the body is looked at.
    pub async fn handle(&self, session: Option<&Session>, body: &str) -> AppResult<Response> {
        let session =
            session.ok_or_else(|| AppError::Unauthorized("no session".to_string()))?;
        let action = parse_action(body, &self.config)?;
        self.dispatch(session, action).await
    }

    /// Run a validated action.
    pub async fn dispatch(&self, session: &Session, action: Action) -> AppResult<Response> {
        tracing::debug!(user = %session.user, action = action.name(), "Dispatching");

        let response = match action {
            Action::Search { query, limit, mode } => {
                Response::Search(self.search(&query, mode, limit).await?)
            }
            Action::Ask {
                question,
                use_context,
            } => Response::Ask(self.ask(&question, use_context).await?),
            Action::Categorize { title, content } => {
                Response::Categorize(self.categorize(&title, &content).await?)
            }
            Action::Related { article_id, limit } => {
                Response::Related(self.related(&article_id, limit)?)
            }
            Action::Feedback { answer_id, helpful } => {
                Response::Feedback(self.feedback(&answer_id, helpful).await?)
            }
            Action::Click {
                query_id,
                article_id,
            } => Response::Click(self.click(&query_id, &article_id)),
        };

        Ok(response)
    }

    /// Search and record the query as served.
    pub async fn search(&self, query: &str, mode: SearchMode, limit: usize) -> AppResult<SearchResponse> {
        let outcome = self.retriever.search(query, mode, limit).await?;

        let record = QueryRecord::new(
            query.trim(),
            mode,
            outcome
                .results
                .iter()
                .map(|hit| RankedHit {
                    article_id: hit.article.id.clone(),
                    score: hit.score,
                })
                .collect(),
        );
        let query_id = record.id.clone();
        self.recorder.record_query(record);

        Ok(SearchResponse {
            query: query.trim().to_string(),
            query_id,
            results: outcome
                .results
                .into_iter()
                .map(|hit| SearchHit {
                    id: hit.article.id,
                    title: hit.article.title,
                    summary: hit.article.summary,
                    score: hit.score,
                })
                .collect(),
        })
    }

    /// Answer a question and record the answer as served.
    pub async fn ask(&self, question: &str, use_context: bool) -> AppResult<AskResponse> {
        let outcome = self.synthesizer.ask(question, use_context).await?;

        let answer_id = uuid::Uuid::new_v4().to_string();
        self.recorder.record_answer(AnswerRecord {
            id: answer_id.clone(),
            question: question.trim().to_string(),
            answer: outcome.answer.clone(),
            citations: outcome.citations.clone(),
            tokens: outcome.tokens,
            latency_ms: outcome.latency_ms,
            confidence: outcome.confidence,
            helpful: None,
            created_at: Utc::now(),
        });

        Ok(AskResponse {
            question: question.trim().to_string(),
            answer_id,
            answer: outcome.answer,
            confidence: outcome.confidence,
            referenced_articles: outcome
                .citations
                .into_iter()
                .map(|c| ReferencedArticle {
                    id: c.article_id,
                    title: c.title,
                })
                .collect(),
            tokens: outcome.tokens,
        })
    }

    /// Suggest a category among those already in use.
    pub async fn categorize(&self, title: &str, content: &str) -> AppResult<Classification> {
        let known = self.store.categories()?;
        self.advisor.categorize(title, content, &known).await
    }

    pub fn related(&self, article_id: &str, limit: usize) -> AppResult<Vec<RelatedArticle>> {
        Ok(self
            .retriever
            .related(article_id, limit)?
            .iter()
            .map(|hit| RelatedArticle::new(&hit.article, hit.score))
            .collect())
    }

    /// Metadata of one article, drafts included.
    pub fn article(&self, article_id: &str) -> AppResult<ArticleDetails> {
        self.store
            .get(article_id)?
            .map(|article| ArticleDetails::from(&article))
            .ok_or_else(|| AppError::NotFound(format!("article {} not found", article_id)))
    }

    pub async fn feedback(&self, answer_id: &str, helpful: bool) -> AppResult<FeedbackResponse> {
        self.recorder.rate(answer_id, helpful).await?;
        Ok(FeedbackResponse {
            answer_id: answer_id.to_string(),
            helpful,
        })
    }

    /// Queue a click. Unknown queries or articles are only logged.
    pub fn click(&self, query_id: &str, article_id: &str) -> ClickResponse {
        self.recorder.record_click(query_id, article_id);
        ClickResponse {
            query_id: query_id.to_string(),
            article_id: article_id.to_string(),
        }
    }

    pub async fn stats(&self) -> AppResult<ServiceStats> {
        Ok(ServiceStats {
            articles: self.store.counts()?,
            records: self.recorder.summary(self.config.top_queries).await?,
        })
    }

    /// Wait for queued records to be written.
    pub async fn flush(&self) -> AppResult<()> {
        self.recorder.flush().await
    }

    /// Drain and stop the recorder.
    pub fn shutdown(&self) {
        self.recorder.shutdown();
    }
}
