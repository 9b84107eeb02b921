//! Relevance filtering and ranking over embedded articles.

use crate::similarity::cosine_similarity;
use crate::types::{Article, ScoredArticle};

/// Default number of results returned by a ranking pass.
pub const DEFAULT_LIMIT: usize = 5;

/// Score every candidate against `query`, keep those at or above
/// `min_score`, and return the best `limit` in descending score order.
///
/// Candidates without an embedding are skipped. Candidates whose embedding
/// length differs from the query are skipped with a warning. Ties keep
/// their input order.
pub fn rank(query: &[f32], candidates: &[Article], min_score: f32, limit: usize) -> Vec<ScoredArticle> {
    let mut scored: Vec<ScoredArticle> = candidates
        .iter()
        .filter_map(|article| {
            let embedding = article.embedding.as_ref()?;

            if embedding.len() != query.len() {
                tracing::warn!(
                    article_id = %article.id,
                    expected = query.len(),
                    actual = embedding.len(),
                    "Skipping article with mismatched embedding dimensions"
                );
                return None;
            }

            let score = cosine_similarity(query, embedding);
            (score >= min_score).then(|| ScoredArticle {
                article: article.clone(),
                score,
            })
        })
        .collect();

    sort_by_score(&mut scored);
    scored.truncate(limit);

    tracing::debug!(
        candidates = candidates.len(),
        kept = scored.len(),
        min_score,
        "Ranked candidates"
    );

    scored
}

/// Stable descending sort by score.
pub(crate) fn sort_by_score(scored: &mut [ScoredArticle]) {
    scored.sort_by(|a, b| b.score.total_cmp(&a.score));
}
