//! Vector similarity.

/// Cosine similarity between two vectors of equal length.
///
/// Returns `0.0` when either vector has zero magnitude. The result is
/// clamped to `[-1.0, 1.0]`.
///
/// # Panics
/// Panics if the vectors differ in length. Callers filter mismatched
/// embeddings before scoring.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    assert_eq!(
        a.len(),
        b.len(),
        "cosine_similarity called with vectors of different length"
    );

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    (dot_product / (norm_a * norm_b)).clamp(-1.0, 1.0)
}
