//! Embedding provider trait (section 4.2 step 1 / 4.3 step 1)

use async_trait::async_trait;

use super::{MAX_EMBEDDING_DIM, MIN_EMBEDDING_DIM};

/// A text-embedding backend. `embed_batch`'s default forwards to
/// `embed_query` one at a time; implementations that have a real batch
/// endpoint should override it.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, String>;

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, String> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed_query(text).await?);
        }
        Ok(out)
    }

    /// Dimensionality of vectors this provider returns. Must fall in
    /// `[MIN_EMBEDDING_DIM, MAX_EMBEDDING_DIM]` (section 4.2).
    fn dimension(&self) -> usize;

    fn name(&self) -> &str;
}

/// Deterministic, dependency-free fallback: a bag-of-hashed-tokens vector,
/// L2-normalized. Gives every caller a well-formed, stable embedding
/// without a network round trip, so the rest of the pipeline (C3 merge
/// detection, C4 vector index, C5 hybrid search) is exercisable end to end
/// with no configured provider.
#[derive(Debug, Clone)]
pub struct HeuristicEmbeddingProvider {
    dim: usize,
}

impl HeuristicEmbeddingProvider {
    pub fn new(dim: usize) -> Self {
        Self {
            dim: dim.clamp(MIN_EMBEDDING_DIM, MAX_EMBEDDING_DIM),
        }
    }
}

impl Default for HeuristicEmbeddingProvider {
    fn default() -> Self {
        Self::new(MIN_EMBEDDING_DIM)
    }
}

#[async_trait]
impl EmbeddingProvider for HeuristicEmbeddingProvider {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, String> {
        Ok(hashed_bow_embedding(text, self.dim))
    }

    fn dimension(&self) -> usize {
        self.dim
    }

    fn name(&self) -> &str {
        "heuristic-hashed-bow"
    }
}

fn hashed_bow_embedding(text: &str, dim: usize) -> Vec<f32> {
    let mut v = vec![0.0f32; dim];
    for token in text.to_lowercase().split_whitespace() {
        let bucket = (fnv1a(token.as_bytes()) as usize) % dim;
        v[bucket] += 1.0;
    }
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in &mut v {
            *x /= norm;
        }
    }
    v
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for &b in bytes {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}
