//! Configuration surface
//!
//! One struct enumerating every tunable named in spec section 6, with the
//! documented defaults. Follows the teacher's `ConsolidationConfig` pattern
//! (`consolidation/sleep.rs`): a plain struct with a hand-written `Default`
//! impl rather than a derive, since several defaults are not `0`/`false`.

use std::time::Duration;

/// All tunables for one engine instance. Cheap to clone; stored once per
/// agent inside `Engine`.
#[derive(Debug, Clone)]
pub struct EngramConfig {
    /// Online-synthesis merge threshold (section 4.3). Default 0.85.
    pub similarity_threshold: f32,
    /// Topic-cluster attach threshold (section 4.4). Default 0.7.
    pub cluster_similarity_threshold: f32,
    /// Maximum number of topic clusters before the oldest two are merged
    /// to make room (section 4.4). Default 100.
    pub max_clusters: usize,
    /// Minimum member count for a cluster to be considered valid (section
    /// 3/4.4). Default 2.
    pub min_cluster_size: usize,
    /// Maximum hop depth for causal-chain traversal (section 4.5.3).
    /// Default 5.
    pub causal_chain_max_depth: usize,
    /// Minimum text-similarity score for a causal link to match a target
    /// effect description (section 4.5.3). Default 0.15.
    pub causal_chain_min_similarity: f32,
    /// Soft latency budget for `prefetch` in milliseconds (section 4.5.4).
    /// Default 100.
    pub prefetch_latency_target_ms: u64,
    /// Minimum interval between consolidation runs, regardless of trigger
    /// (section 4.6). Default 15 minutes.
    pub consolidation_min_interval: Duration,
    /// Weight given to the BM25 component of hybrid search (section
    /// 4.5.2). Default 0.5.
    pub hybrid_alpha: f32,
    /// Hybrid-search score floor below which a candidate is dropped
    /// (section 4.5.2). Default 0.3.
    pub min_score: f32,
    /// Retention-score floor below which a memory is eligible for
    /// forgetting once its TTL has elapsed (section 3/4.6). Default 0.3.
    pub min_retention_score: f32,
    /// Age in days after which an Episode with no access/causal references
    /// is considered stale for forgetting purposes (section 8, scenario
    /// S5). Default 30.
    pub stale_days: i64,
    /// Multiplier applied to `maxSimilarFacts` when fetching synthesis
    /// candidates (section 4.3, step 2). Default 5.
    pub max_similar_facts: usize,
    /// Retry policy shared by the LLM and embedding providers (section
    /// 4.2/5).
    pub retry: RetryConfig,
    /// Directory holding the per-agent SQLite file. `None` uses the
    /// platform default via `directories::ProjectDirs`.
    pub data_dir: Option<std::path::PathBuf>,
}

impl Default for EngramConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.85,
            cluster_similarity_threshold: 0.7,
            max_clusters: 100,
            min_cluster_size: 2,
            causal_chain_max_depth: 5,
            causal_chain_min_similarity: 0.15,
            prefetch_latency_target_ms: 100,
            consolidation_min_interval: Duration::from_secs(15 * 60),
            hybrid_alpha: 0.5,
            min_score: 0.3,
            min_retention_score: 0.3,
            stale_days: 30,
            max_similar_facts: 5,
            retry: RetryConfig::default(),
            data_dir: None,
        }
    }
}

/// Retry/backoff parameters, reused by every provider call (section 5/9).
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first.
    pub attempts: u32,
    /// Initial delay before the first retry.
    pub min_delay: Duration,
    /// Delay ceiling; backoff never waits longer than this.
    pub max_delay: Duration,
    /// Jitter fraction applied to each computed delay (0.1 = ±10%).
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: 3,
            min_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
            jitter: 0.10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_section_6() {
        let cfg = EngramConfig::default();
        assert_eq!(cfg.similarity_threshold, 0.85);
        assert_eq!(cfg.cluster_similarity_threshold, 0.7);
        assert_eq!(cfg.max_clusters, 100);
        assert_eq!(cfg.min_cluster_size, 2);
        assert_eq!(cfg.causal_chain_max_depth, 5);
        assert_eq!(cfg.causal_chain_min_similarity, 0.15);
        assert_eq!(cfg.prefetch_latency_target_ms, 100);
        assert_eq!(cfg.hybrid_alpha, 0.5);
        assert_eq!(cfg.min_score, 0.3);
        assert_eq!(cfg.min_retention_score, 0.3);
        assert_eq!(cfg.stale_days, 30);
        assert_eq!(cfg.retry.attempts, 3);
    }
}
