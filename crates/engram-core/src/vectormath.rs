//! Shared vector arithmetic
//!
//! Grounded on the teacher's `embeddings::local::{cosine_similarity,
//! dot_product}` free functions; kept crate-wide since C3 synthesis, C4's
//! vector index, and C6's cluster centroids all need the same primitives.

/// Cosine similarity in `[-1, 1]`; `0.0` if either vector has zero norm or
/// the lengths differ (callers skip mismatched dimensions rather than
/// panicking — section 7's `EmbeddingDimensionMismatch` handling).
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    let denom = (norm_a * norm_b).sqrt();
    if denom == 0.0 {
        0.0
    } else {
        dot / denom
    }
}

/// Running-average centroid update: `c' = (n*c + x) / (n+1)` (section 4.4).
pub fn running_average(centroid: &[f32], member_count: usize, new_vector: &[f32]) -> Vec<f32> {
    if centroid.len() != new_vector.len() {
        return centroid.to_vec();
    }
    let n = member_count as f32;
    centroid
        .iter()
        .zip(new_vector.iter())
        .map(|(c, x)| (n * c + x) / (n + 1.0))
        .collect()
}

/// Weighted average of two centroids by member count, used when merging
/// the two most-similar clusters to make room (section 4.4).
pub fn weighted_average(a: &[f32], a_count: usize, b: &[f32], b_count: usize) -> Vec<f32> {
    if a.len() != b.len() || a.is_empty() {
        return a.to_vec();
    }
    let total = (a_count + b_count).max(1) as f32;
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x * a_count as f32 + y * b_count as f32) / total)
        .collect()
}
