//! Ranking over stored embeddings.

use crate::rank::rank;
use crate::store::{ArticleStore, SqliteArticleStore};
use crate::types::Article;
use tempfile::NamedTempFile;

/// Article with a normalised embedding.
fn embedded(id: &str, title: &str, embedding: &[f32]) -> Article {
    Article::new(id, title, format!("{} body", title)).with_embedding(normalize(embedding))
}

fn normalize(v: &[f32]) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter().map(|x| x / norm).collect()
    } else {
        v.to_vec()
    }
}

fn store_with(articles: &[Article]) -> (NamedTempFile, SqliteArticleStore) {
    let temp_file = NamedTempFile::new().unwrap();
    let store = SqliteArticleStore::open(temp_file.path()).unwrap();
    for article in articles {
        store.upsert(article).unwrap();
    }
    (temp_file, store)
}

#[test]
fn test_relevant_query_returns_high_scores() {
    let (_file, store) = store_with(&[
        embedded("kb-1", "Rust ownership", &[0.9, 0.1, 0.0]),
        embedded("kb-2", "Rust borrowing", &[0.8, 0.2, 0.0]),
        embedded("kb-3", "Cooking pasta", &[0.0, 0.0, 1.0]),
    ]);

    let query = normalize(&[1.0, 0.1, 0.0]);
    let results = rank(&query, &store.published().unwrap(), 0.70, 5);

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].article.id, "kb-1");
    assert!(
        results.iter().all(|r| r.score > 0.9),
        "Relevant articles should score above 0.9"
    );
    assert!(results[0].score > results[1].score, "Scores should be ordered");
}

#[test]
fn test_unrelated_query_is_filtered() {
    let (_file, store) = store_with(&[
        embedded("kb-1", "Rust ownership", &[1.0, 0.0, 0.0]),
        embedded("kb-2", "Cooking pasta", &[0.0, 1.0, 0.0]),
    ]);

    let query = normalize(&[0.0, 0.0, 1.0]);
    let results = rank(&query, &store.published().unwrap(), 0.70, 5);

    assert!(results.is_empty(), "Orthogonal articles must not pass 0.70");
}

#[test]
fn test_negative_similarity_dropped() {
    let (_file, store) = store_with(&[
        embedded("kb-1", "Aligned", &[1.0, 0.0]),
        embedded("kb-2", "Opposite", &[-1.0, 0.0]),
    ]);

    let results = rank(&[1.0, 0.0], &store.published().unwrap(), 0.0, 5);

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].article.id, "kb-1");
    assert!((results[0].score - 1.0).abs() < 1e-5);
}

#[test]
fn test_unembedded_articles_skipped() {
    let (_file, store) = store_with(&[
        embedded("kb-1", "Embedded", &[1.0, 0.0]),
        Article::new("kb-2", "Plain", "never embedded"),
    ]);

    let results = rank(&[1.0, 0.0], &store.published().unwrap(), 0.0, 5);
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].article.id, "kb-1");
}

#[test]
fn test_empty_store_returns_no_results() {
    let (_file, store) = store_with(&[]);
    let results = rank(&[1.0, 0.0], &store.published().unwrap(), 0.0, 5);
    assert_eq!(results.len(), 0, "Empty store should return no results");
}

#[test]
fn test_limit_respected() {
    let articles: Vec<Article> = (0..10)
        .map(|i| embedded(&format!("kb-{}", i), &format!("Article {}", i), &[1.0, i as f32 * 0.01]))
        .collect();
    let (_file, store) = store_with(&articles);

    let results = rank(&[1.0, 0.0], &store.published().unwrap(), 0.0, 3);
    assert_eq!(results.len(), 3, "Should return exactly limit results");
    assert_eq!(results[0].article.id, "kb-0");
    for pair in results.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
}
