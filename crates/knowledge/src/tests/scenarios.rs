//! Request scenarios through [`KnowledgeService::handle`].

use super::doubles::{FailingEmbedder, FixedEmbedder, ScriptedLlm, StaticClassifier};
use crate::config::RetrievalConfig;
use crate::embeddings::EmbeddingProvider;
use crate::recorder::SqliteRecordStore;
use crate::request::{Response, Session};
use crate::service::{KnowledgeService, ServiceParts};
use crate::store::{ArticleStore, SqliteArticleStore};
use crate::types::Article;
use kbase_core::AppError;
use kbase_llm::{create_client, LlmClient};
use kbase_prompt::{builtin::builtin_source, parse_prompt, ANSWER_PROMPT_ID};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;

const CREATE_QUESTION: &str = "How do I create a project?";
const DEPLOY_QUESTION: &str = "How do I deploy to production?";

/// Two embedded articles: one close to the create question (cosine 0.82),
/// one far from it (cosine 0.40). Neither is about deployment. A third
/// article has no embedding.
fn articles() -> Vec<Article> {
    vec![
        Article::new("kb-create", "Creating projects", "Click New Project on the dashboard.")
            .with_summary("Create a project from the dashboard")
            .with_category("Getting Started")
            .with_embedding(vec![0.82, 0.572_364, 0.0]),
        Article::new("kb-perms", "Team permissions", "Owners can invite members.")
            .with_category("Administration")
            .with_embedding(vec![0.40, 0.916_515, 0.0]),
        Article::new("kb-draft-notes", "Release notes", "Not embedded yet."),
    ]
}

fn embedder() -> FixedEmbedder {
    FixedEmbedder::new(3)
        .with(CREATE_QUESTION, vec![1.0, 0.0, 0.0])
        .with(DEPLOY_QUESTION, vec![0.0, 0.0, 1.0])
}

fn service(embedder: Arc<dyn EmbeddingProvider>, llm: Arc<ScriptedLlm>) -> KnowledgeService {
    service_with(embedder, llm, RetrievalConfig::default())
}

fn service_with(
    embedder: Arc<dyn EmbeddingProvider>,
    llm: Arc<dyn LlmClient>,
    config: RetrievalConfig,
) -> KnowledgeService {
    let store = Arc::new(SqliteArticleStore::open_in_memory().unwrap());
    for article in articles() {
        store.upsert(&article).unwrap();
    }

    KnowledgeService::assemble(ServiceParts {
        store,
        embedder,
        llm,
        model: "llama3.2".to_string(),
        answer_prompt: parse_prompt(builtin_source(ANSWER_PROMPT_ID).unwrap()).unwrap(),
        classifier: Arc::new(StaticClassifier::new("getting started")),
        records: Box::new(SqliteRecordStore::open_in_memory().unwrap()),
        config,
    })
    .unwrap()
}

fn session() -> Session {
    Session::new("alice")
}

#[tokio::test]
async fn test_search_returns_only_relevant_article() {
    let service = service(Arc::new(embedder()), Arc::new(ScriptedLlm::answering("unused")));

    let body = format!(r#"{{"action":"search","query":"{}"}}"#, CREATE_QUESTION);
    let response = match service.handle(Some(&session()), &body).await.unwrap() {
        Response::Search(response) => response,
        other => panic!("expected search response, got {:?}", other),
    };

    assert_eq!(response.results.len(), 1);
    assert_eq!(response.results[0].id, "kb-create");
    assert!((response.results[0].score - 0.82).abs() < 1e-3);
    assert!(!response.query_id.is_empty());

    service.flush().await.unwrap();
    let stats = service.stats().await.unwrap();
    assert_eq!(stats.records.total_queries, 1);
    assert_eq!(stats.records.top_queries[0].query, CREATE_QUESTION);
}

#[tokio::test]
async fn test_ask_without_matching_articles() {
    let llm = Arc::new(ScriptedLlm::answering("I could not find a deployment guide."));
    let service = service(Arc::new(embedder()), llm.clone());

    let body = format!(r#"{{"action":"ask","question":"{}"}}"#, DEPLOY_QUESTION);
    let response = match service.handle(Some(&session()), &body).await.unwrap() {
        Response::Ask(response) => response,
        other => panic!("expected ask response, got {:?}", other),
    };

    assert!(response.referenced_articles.is_empty());
    assert_eq!(response.confidence, 0.0);
    assert_eq!(response.answer, "I could not find a deployment guide.");
    assert_eq!(response.tokens, 120);
    assert!(llm
        .last_prompt()
        .unwrap()
        .contains("No knowledge base articles matched"));
}

#[tokio::test]
async fn test_ask_cites_context_and_accepts_feedback() {
    let llm = Arc::new(ScriptedLlm::answering("Click New Project."));
    let service = service(Arc::new(embedder()), llm.clone());

    let response = service.ask(CREATE_QUESTION, true).await.unwrap();
    assert_eq!(response.referenced_articles.len(), 1);
    assert_eq!(response.referenced_articles[0].id, "kb-create");
    assert!(llm.last_prompt().unwrap().contains("## Creating projects"));

    let body = format!(
        r#"{{"action":"feedback","answerId":"{}","helpful":true}}"#,
        response.answer_id
    );
    service.handle(Some(&session()), &body).await.unwrap();

    let stats = service.stats().await.unwrap();
    assert_eq!(stats.records.total_answers, 1);
    assert_eq!(stats.records.helpful_answers, 1);

    let unknown = service.feedback("no-such-answer", false).await;
    assert!(matches!(unknown, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn test_failed_generation_is_not_recorded() {
    let service = service(Arc::new(embedder()), Arc::new(ScriptedLlm::failing("model not loaded")));

    let result = service.ask(CREATE_QUESTION, true).await;
    let err = result.unwrap_err();
    assert!(matches!(err, AppError::Generation(_)));
    assert_eq!(err.status_code(), 503);

    service.flush().await.unwrap();
    assert_eq!(service.stats().await.unwrap().records.total_answers, 0);
}

#[tokio::test]
async fn test_generation_timeout_bounds_provider_call() {
    // Accepts connections and never answers.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });

    let config = RetrievalConfig {
        generation_timeout_secs: 1,
        classification_timeout_secs: 3,
        ..RetrievalConfig::default()
    };
    let endpoint = format!("http://{}", addr);
    let llm = create_client("ollama", Some(&endpoint), config.provider_timeout()).unwrap();
    let service = service_with(Arc::new(embedder()), llm, config);

    let started = Instant::now();
    let err = service.ask(CREATE_QUESTION, true).await.unwrap_err();
    let elapsed = started.elapsed();

    match &err {
        AppError::Generation(message) => assert!(message.contains("timed out after 1000ms"), "{}", message),
        other => panic!("expected generation failure, got {:?}", other),
    }
    assert!(elapsed >= Duration::from_millis(900));
    assert!(elapsed < Duration::from_secs(3));
}

#[tokio::test]
async fn test_related_applies_stricter_threshold() {
    let service = service(Arc::new(embedder()), Arc::new(ScriptedLlm::answering("unused")));
    for article in [
        Article::new("kb-deploy", "Deploying", "Push to the release branch.")
            .with_summary("Ship a build to production")
            .with_category("Operations")
            .with_embedding(vec![0.0, 0.0, 1.0]),
        Article::new("kb-rollback", "Rolling back", "Redeploy the previous build.")
            .with_summary("Undo a bad release")
            .with_category("Operations")
            .with_embedding(vec![0.0, 0.435_890, 0.9]),
        Article::new("kb-envs", "Environments", "Staging mirrors production.")
            .with_embedding(vec![0.693_974, 0.0, 0.72]),
    ] {
        service.store().upsert(&article).unwrap();
    }

    // kb-envs scores 0.72 against the deploy question: enough for search.
    let body = format!(r#"{{"action":"search","query":"{}"}}"#, DEPLOY_QUESTION);
    let searched = match service.handle(Some(&session()), &body).await.unwrap() {
        Response::Search(response) => response,
        other => panic!("expected search response, got {:?}", other),
    };
    let ids: Vec<&str> = searched.results.iter().map(|hit| hit.id.as_str()).collect();
    assert_eq!(ids, vec!["kb-deploy", "kb-rollback", "kb-envs"]);

    // The same neighbour falls below the related threshold.
    let related = service
        .handle(Some(&session()), r#"{"action":"related","articleId":"kb-deploy"}"#)
        .await
        .unwrap();
    let json = serde_json::to_value(&related).unwrap();
    let entries = json.as_array().unwrap();
    assert_eq!(entries.len(), 1);

    let entry = entries[0].as_object().unwrap();
    let mut keys: Vec<&str> = entry.keys().map(String::as_str).collect();
    keys.sort();
    assert_eq!(keys, vec!["category", "id", "similarity", "summary", "title"]);
    assert_eq!(entry["id"], "kb-rollback");
    assert_eq!(entry["title"], "Rolling back");
    assert_eq!(entry["summary"], "Undo a bad release");
    assert_eq!(entry["category"], "Operations");
    assert!((entry["similarity"].as_f64().unwrap() - 0.9).abs() < 1e-3);
}

#[tokio::test]
async fn test_related_requires_embedding() {
    let service = service(Arc::new(embedder()), Arc::new(ScriptedLlm::answering("unused")));

    let result = service
        .handle(
            Some(&session()),
            r#"{"action":"related","articleId":"kb-draft-notes"}"#,
        )
        .await;
    assert!(matches!(result, Err(AppError::NotFound(_))));

    let result = service
        .handle(Some(&session()), r#"{"action":"related","articleId":"kb-missing"}"#)
        .await;
    assert!(matches!(result, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn test_embedding_outage_degrades_to_lexical() {
    let failing = Arc::new(FailingEmbedder::default());
    let service = service(failing.clone(), Arc::new(ScriptedLlm::answering("unused")));

    let response = service
        .handle(Some(&session()), r#"{"action":"search","query":"project"}"#)
        .await
        .unwrap();

    let response = match response {
        Response::Search(response) => response,
        other => panic!("expected search response, got {:?}", other),
    };
    assert_eq!(failing.calls.load(Ordering::SeqCst), 1);
    assert_eq!(response.results.len(), 1);
    assert_eq!(response.results[0].id, "kb-create");
    assert_eq!(response.results[0].score, 0.5);
}

#[tokio::test]
async fn test_missing_session_rejected_before_parsing() {
    let llm = Arc::new(ScriptedLlm::answering("unused"));
    let service = service(Arc::new(embedder()), llm.clone());

    let result = service
        .handle(None, r#"{"action":"ask","question":"anything"}"#)
        .await;
    assert!(matches!(result, Err(AppError::Unauthorized(_))));

    let result = service.handle(None, "not even json").await;
    assert!(matches!(result, Err(AppError::Unauthorized(_))));
    assert_eq!(llm.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_categorize_offers_store_categories() {
    let service = service(Arc::new(embedder()), Arc::new(ScriptedLlm::answering("unused")));

    let response = service
        .handle(
            Some(&session()),
            r#"{"action":"categorize","title":"Inviting teammates","content":"Send an invite link."}"#,
        )
        .await
        .unwrap();

    match response {
        Response::Categorize(classification) => {
            assert_eq!(classification.category, "Getting Started");
            assert_eq!(classification.tags, vec!["onboarding"]);
        }
        other => panic!("expected classification, got {:?}", other),
    }
}

#[tokio::test]
async fn test_click_counts_view() {
    let service = service(Arc::new(embedder()), Arc::new(ScriptedLlm::answering("unused")));

    let search = service
        .search(CREATE_QUESTION, Default::default(), 5)
        .await
        .unwrap();

    let body = format!(
        r#"{{"action":"click","queryId":"{}","articleId":"kb-create"}}"#,
        search.query_id
    );
    service.handle(Some(&session()), &body).await.unwrap();
    service.flush().await.unwrap();

    let article = service.article("kb-create").unwrap();
    assert_eq!(article.view_count, 1);
    assert_eq!(article.read_time_minutes, 1);
    assert!(article.embedded);
    assert!(matches!(service.article("kb-missing"), Err(AppError::NotFound(_))));
    assert_eq!(service.stats().await.unwrap().records.clicked_queries, 1);
}
