//! Vector index (section 4.4 / 9 design notes)
//!
//! Brute-force exact cosine scan — the spec explicitly allows this up to
//! ~10^5 records per agent, and several testable properties (cluster
//! centroid consistency, contradiction-resolver determinism) need exact,
//! reproducible similarity rather than an approximate index. Internally
//! keyed by a dense `u64` arena index with `key_to_id`/`id_to_key` maps,
//! the same bimap shape the teacher's `VectorIndex` used for its HNSW
//! keys — just without the HNSW.

use std::collections::HashMap;

use crate::vectormath::cosine_similarity;

/// One scored hit from a vector search.
#[derive(Debug, Clone)]
pub struct VectorHit {
    pub id: String,
    pub similarity: f32,
}

#[derive(Default)]
pub struct VectorIndex {
    key_to_id: HashMap<u64, String>,
    id_to_key: HashMap<String, u64>,
    vectors: HashMap<u64, Vec<f32>>,
    next_key: u64,
}

impl VectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the embedding for `id`.
    pub fn upsert(&mut self, id: &str, embedding: Vec<f32>) {
        if let Some(&key) = self.id_to_key.get(id) {
            self.vectors.insert(key, embedding);
            return;
        }
        let key = self.next_key;
        self.next_key += 1;
        self.key_to_id.insert(key, id.to_string());
        self.id_to_key.insert(id.to_string(), key);
        self.vectors.insert(key, embedding);
    }

    pub fn remove(&mut self, id: &str) {
        if let Some(key) = self.id_to_key.remove(id) {
            self.key_to_id.remove(&key);
            self.vectors.remove(&key);
        }
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Brute-scan cosine search, returning the `top_n` highest-similarity
    /// hits whose dimension matches `query`'s.
    pub fn search(&self, query: &[f32], top_n: usize) -> Vec<VectorHit> {
        let mut hits: Vec<VectorHit> = self
            .vectors
            .iter()
            .filter(|(_, v)| v.len() == query.len())
            .map(|(key, v)| VectorHit {
                id: self.key_to_id[key].clone(),
                similarity: cosine_similarity(query, v),
            })
            .collect();
        hits.sort_by(|a, b| b.similarity.partial_cmp(&a.similarity).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(top_n);
        hits
    }
}
