//! Deterministic offline embedding provider.

use crate::embeddings::provider::EmbeddingProvider;
use kbase_core::AppResult;
use std::collections::HashMap;

const STOP_WORDS: &[&str] = &[
    "the", "is", "at", "which", "on", "a", "an", "as", "are", "was", "were", "for", "to", "of",
    "in", "and", "or", "but", "with", "by", "from", "this", "that", "be", "have", "has", "had",
    "it", "its", "how", "do", "does", "what", "can", "you", "your", "my",
];

/// Hashed trigram provider.
///
/// Each content word adds weight to the buckets of its character trigrams
/// and of the whole word, and the result is L2-normalised. Texts sharing
/// vocabulary land close together, which is enough for offline use and
/// tests. Text with no content words maps to the zero vector.
#[derive(Debug)]
pub struct MockProvider {
    dimensions: usize,
}

impl MockProvider {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    fn bucket(&self, token: &str, seed: u64) -> usize {
        // FNV-1a
        let hash = token.bytes().fold(0xcbf2_9ce4_8422_2325 ^ seed, |acc, b| {
            (acc ^ b as u64).wrapping_mul(0x0100_0000_01b3)
        });
        (hash % self.dimensions as u64) as usize
    }

    fn vectorize(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        let lower = text.to_lowercase();

        let mut frequencies: HashMap<&str, u32> = HashMap::new();
        for word in lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| w.chars().count() > 2 && !STOP_WORDS.contains(w))
        {
            *frequencies.entry(word).or_insert(0) += 1;
        }

        for (word, count) in frequencies {
            let weight = (count as f32).sqrt();
            let chars: Vec<char> = word.chars().collect();
            for window in chars.windows(3) {
                let trigram: String = window.iter().collect();
                vector[self.bucket(&trigram, 3)] += weight;
            }
            vector[self.bucket(word, 1)] += 2.0 * weight;
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }

        vector
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for MockProvider {
    fn provider_name(&self) -> &str {
        "mock"
    }

    fn model_name(&self) -> &str {
        "trigram-v1"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|text| self.vectorize(text)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::similarity::cosine_similarity;

    #[tokio::test]
    async fn test_unit_length() {
        let provider = MockProvider::new(128);
        let embedding = provider.embed("Creating a new project").await.unwrap();

        assert_eq!(embedding.len(), 128);
        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 0.001);
    }

    #[tokio::test]
    async fn test_deterministic() {
        let provider = MockProvider::new(128);
        let a = provider.embed("deterministic test").await.unwrap();
        let b = provider.embed("deterministic test").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_shared_vocabulary_scores_higher() {
        let provider = MockProvider::new(256);
        let query = provider.embed("create a project").await.unwrap();
        let close = provider
            .embed("Creating projects: click New Project to create a project")
            .await
            .unwrap();
        let far = provider
            .embed("Billing invoices are emailed monthly")
            .await
            .unwrap();

        assert!(cosine_similarity(&query, &close) > cosine_similarity(&query, &far));
    }

    #[tokio::test]
    async fn test_stop_words_only_is_zero() {
        let provider = MockProvider::new(64);
        let embedding = provider.embed("how do you").await.unwrap();
        assert!(embedding.iter().all(|&x| x == 0.0));
    }

    #[tokio::test]
    async fn test_batch_preserves_order() {
        let provider = MockProvider::new(64);
        let texts = vec!["kanban boards".to_string(), "password reset".to_string()];
        let batch = provider.embed_batch(&texts).await.unwrap();

        assert_eq!(batch.len(), 2);
        assert_eq!(batch[1], provider.embed("password reset").await.unwrap());
    }
}
