//! Hybrid retrieval: a lexical pass and a semantic pass, merged.

use crate::config::RetrievalConfig;
use crate::embeddings::{embed_with_timeout, EmbeddingProvider};
use crate::rank::{rank, sort_by_score};
use crate::store::ArticleStore;
use crate::types::{Article, ScoredArticle, SearchMode};
use kbase_core::{AppError, AppResult};
use std::collections::HashMap;
use std::sync::Arc;

/// Outcome of a retrieval pass.
#[derive(Debug, Clone, Default)]
pub struct SearchOutcome {
    /// Results in descending score order
    pub results: Vec<ScoredArticle>,

    /// The semantic pass was requested but could not run; results are
    /// lexical only.
    pub degraded: bool,
}

/// Plans and runs text, semantic and hybrid searches over published
/// articles.
#[derive(Clone)]
pub struct HybridRetriever {
    store: Arc<dyn ArticleStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    config: RetrievalConfig,
}

impl HybridRetriever {
    pub fn new(
        store: Arc<dyn ArticleStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            config,
        }
    }

    /// Search published articles.
    ///
    /// An embedding failure or timeout in semantic or hybrid mode is not an
    /// error: lexical results are returned and `degraded` is set.
    pub async fn search(&self, query: &str, mode: SearchMode, limit: usize) -> AppResult<SearchOutcome> {
        let query = query.trim();
        if query.is_empty() {
            return Err(AppError::InvalidInput("query is required".to_string()));
        }

        let articles = self.store.published()?;

        let outcome = match mode {
            SearchMode::Text => SearchOutcome {
                results: self.lexical(query, &articles, limit),
                degraded: false,
            },
            SearchMode::Semantic | SearchMode::Hybrid => {
                match embed_with_timeout(self.embedder.as_ref(), query, self.config.embedding_timeout()).await {
                    Ok(query_vector) => {
                        let semantic = rank(&query_vector, &articles, self.config.min_score, limit);
                        let results = if mode == SearchMode::Hybrid {
                            merge(semantic, self.lexical(query, &articles, usize::MAX), limit)
                        } else {
                            semantic
                        };
                        SearchOutcome {
                            results,
                            degraded: false,
                        }
                    }
                    Err(e) => {
                        tracing::warn!(
                            error = %e,
                            mode = %mode,
                            "Embedding unavailable, serving lexical results"
                        );
                        SearchOutcome {
                            results: self.lexical(query, &articles, limit),
                            degraded: true,
                        }
                    }
                }
            }
        };

        tracing::debug!(
            mode = %mode,
            results = outcome.results.len(),
            degraded = outcome.degraded,
            "Search completed"
        );

        Ok(outcome)
    }

    /// Articles most similar to the given one, excluding itself.
    ///
    /// `NotFound` when the article does not exist, is not published, or has
    /// no embedding.
    pub fn related(&self, article_id: &str, limit: usize) -> AppResult<Vec<ScoredArticle>> {
        let source = self
            .store
            .get(article_id)?
            .filter(Article::is_published)
            .ok_or_else(|| AppError::NotFound(format!("article {} not found", article_id)))?;

        let embedding = source.embedding.as_ref().ok_or_else(|| {
            AppError::NotFound(format!("article {} has no embedding", article_id))
        })?;

        let candidates: Vec<Article> = self
            .store
            .published()?
            .into_iter()
            .filter(|a| a.id != source.id)
            .collect();

        Ok(rank(embedding, &candidates, self.config.related_min_score, limit))
    }

    /// Case-insensitive substring match of the whole query against title,
    /// summary and each tag. Every match scores the configured baseline.
    fn lexical(&self, query: &str, articles: &[Article], limit: usize) -> Vec<ScoredArticle> {
        let needle = query.to_lowercase();

        articles
            .iter()
            .filter(|article| lexical_match(article, &needle))
            .take(limit)
            .map(|article| ScoredArticle {
                article: article.clone(),
                score: self.config.lexical_score,
            })
            .collect()
    }
}

fn lexical_match(article: &Article, needle: &str) -> bool {
    article.title.to_lowercase().contains(needle)
        || article
            .summary
            .as_deref()
            .is_some_and(|s| s.to_lowercase().contains(needle))
        || article
            .tags
            .iter()
            .any(|tag| tag.to_lowercase().contains(needle))
}

/// Merge two result lists by article id, keeping the higher score per id,
/// then sort and truncate.
fn merge(primary: Vec<ScoredArticle>, secondary: Vec<ScoredArticle>, limit: usize) -> Vec<ScoredArticle> {
    let mut merged: Vec<ScoredArticle> = Vec::with_capacity(primary.len() + secondary.len());
    let mut positions: HashMap<String, usize> = HashMap::new();

    for hit in primary.into_iter().chain(secondary) {
        match positions.get(&hit.article.id) {
            Some(&idx) => {
                if hit.score > merged[idx].score {
                    merged[idx].score = hit.score;
                }
            }
            None => {
                positions.insert(hit.article.id.clone(), merged.len());
                merged.push(hit);
            }
        }
    }

    sort_by_score(&mut merged);
    merged.truncate(limit);
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::providers::MockProvider;
    use crate::store::SqliteArticleStore;
    use crate::types::ArticleStatus;
    use std::collections::HashSet;

    fn scored(id: &str, score: f32) -> ScoredArticle {
        ScoredArticle {
            article: Article::new(id, id, "body"),
            score,
        }
    }

    async fn retriever_with(articles: Vec<Article>) -> HybridRetriever {
        let embedder = Arc::new(MockProvider::new(256));
        let store = SqliteArticleStore::open_in_memory().unwrap();
        for article in articles {
            let vector = embedder.embed(&article.embedding_text()).await.unwrap();
            store.upsert(&article.with_embedding(vector)).unwrap();
        }

        let config = RetrievalConfig {
            min_score: 0.1,
            related_min_score: 0.1,
            ..RetrievalConfig::default()
        };
        HybridRetriever::new(Arc::new(store), embedder, config)
    }

    fn corpus() -> Vec<Article> {
        vec![
            Article::new("kb-1", "Creating projects", "Create a project with the New Project button.")
                .with_tags(["projects"]),
            Article::new("kb-2", "Resetting your password", "Use the forgot password link.")
                .with_tags(["account"]),
            Article::new("kb-3", "Project templates", "Templates speed up project creation.")
                .with_summary("Reusable project layouts"),
            Article::new("kb-4", "Draft notes", "Unpublished project notes.")
                .with_status(ArticleStatus::Draft),
        ]
    }

    #[test]
    fn test_merge_keeps_higher_score_without_duplicates() {
        let merged = merge(
            vec![scored("a", 0.9), scored("b", 0.4)],
            vec![scored("b", 0.5), scored("c", 0.5)],
            10,
        );

        let ids: Vec<_> = merged.iter().map(|s| s.article.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(merged[1].score, 0.5);

        let unique: HashSet<_> = ids.iter().collect();
        assert_eq!(unique.len(), ids.len());
    }

    #[test]
    fn test_merge_truncates() {
        let merged = merge(vec![scored("a", 0.9)], vec![scored("b", 0.5), scored("c", 0.5)], 2);
        assert_eq!(merged.len(), 2);
    }

    #[tokio::test]
    async fn test_empty_query_rejected() {
        let retriever = retriever_with(corpus()).await;
        let result = retriever.search("   ", SearchMode::Hybrid, 5).await;
        assert!(matches!(result, Err(AppError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_text_mode_matches_title_summary_and_tags() {
        let retriever = retriever_with(corpus()).await;

        let outcome = retriever.search("PROJECT", SearchMode::Text, 5).await.unwrap();
        let ids: Vec<_> = outcome.results.iter().map(|s| s.article.id.as_str()).collect();
        assert_eq!(ids, vec!["kb-1", "kb-3"]);
        assert!(outcome.results.iter().all(|s| s.score == 0.5));

        let outcome = retriever.search("layouts", SearchMode::Text, 5).await.unwrap();
        assert_eq!(outcome.results[0].article.id, "kb-3");

        let outcome = retriever.search("account", SearchMode::Text, 5).await.unwrap();
        assert_eq!(outcome.results[0].article.id, "kb-2");
    }

    #[tokio::test]
    async fn test_text_mode_does_not_search_body() {
        let retriever = retriever_with(corpus()).await;
        let outcome = retriever.search("forgot", SearchMode::Text, 5).await.unwrap();
        assert!(outcome.results.is_empty());
    }

    #[tokio::test]
    async fn test_drafts_never_returned() {
        let retriever = retriever_with(corpus()).await;
        for mode in [SearchMode::Text, SearchMode::Semantic, SearchMode::Hybrid] {
            let outcome = retriever.search("project notes", mode, 10).await.unwrap();
            assert!(outcome.results.iter().all(|s| s.article.id != "kb-4"));
        }
    }

    #[tokio::test]
    async fn test_hybrid_results_sorted_and_limited() {
        let retriever = retriever_with(corpus()).await;
        let outcome = retriever.search("project", SearchMode::Hybrid, 2).await.unwrap();

        assert!(!outcome.degraded);
        assert!(outcome.results.len() <= 2);
        assert!(outcome
            .results
            .windows(2)
            .all(|w| w[0].score >= w[1].score));
    }

    #[tokio::test]
    async fn test_related_excludes_self() {
        let retriever = retriever_with(corpus()).await;
        let related = retriever.related("kb-1", 5).unwrap();
        assert!(related.iter().all(|s| s.article.id != "kb-1"));
        assert!(related.iter().all(|s| s.article.id != "kb-4"));
    }

    #[tokio::test]
    async fn test_related_unknown_article() {
        let retriever = retriever_with(corpus()).await;
        assert!(matches!(
            retriever.related("kb-404", 5),
            Err(AppError::NotFound(_))
        ));
    }
}
