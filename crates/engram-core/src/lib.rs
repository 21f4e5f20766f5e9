//! # engram-core
//!
//! A per-agent cognitive memory engine: turns raw conversation transcripts
//! into typed, queryable memory, and keeps that memory healthy over time.
//!
//! - **Episodic + semantic memory**: every transcript becomes an `Episode`
//!   plus zero or more subject-predicate-object `Fact`s, extracted either by
//!   an LLM (when configured) or a regex/heuristic fallback.
//! - **Online synthesis**: new facts are embedded and checked against the
//!   active set before they're written, merging near-duplicates instead of
//!   accumulating them.
//! - **Hybrid retrieval**: BM25 keyword search (SQLite FTS5) and brute-force
//!   cosine similarity are combined with an alpha-weighted linear
//!   combination, with a substring-match fallback pass and entity-driven
//!   prefetch ahead of any explicit query.
//! - **Causal chains**: `CausalLink`s connect causes to effects and can be
//!   traced backward from an observed effect to its contributing causes.
//! - **Consolidation**: a background "sleep cycle" that discovers patterns,
//!   merges/strengthens/retracts facts, resolves contradictions
//!   deterministically, discovers new causal connections, and prunes
//!   memories whose retention score has fallen below threshold.
//! - **Health & cleanup**: duplicate and low-quality detection over the
//!   active fact set, with a conservative auto-fix policy and a full audit
//!   trail of anything retracted automatically.
//!
//! Durable storage is one embedded SQLite database file per agent,
//! opened via [`Engine::open`] or cached across lookups with
//! [`EngineRegistry`].
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use engram_core::Engine;
//!
//! # async fn run() -> engram_core::Result<()> {
//! let engine = Engine::open_in_memory_default().await?;
//! engine.learn_from_conversation(
//!     "I'm switching our API to gRPC because REST latency was killing us",
//!     "session-1",
//!     vec!["msg-1".into()],
//!     vec!["user".into()],
//! ).await?;
//!
//! let hits = engine.search_memories("API protocol", 5).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature flags
//!
//! - `bundled-sqlite` (default): vendor and statically link SQLite via
//!   `rusqlite/bundled` rather than requiring a system library.
//! - `http-providers` (default): HTTP-backed [`providers::LlmProvider`] and
//!   [`providers::EmbeddingProvider`] adapters speaking an
//!   OpenAI-compatible API.
//! - `encryption`: swap in `rusqlite/bundled-sqlcipher` for an
//!   encrypted-at-rest store file.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(rustdoc::missing_crate_level_docs)]

// ============================================================================
// MODULES
// ============================================================================

pub mod config;
pub mod consolidation;
pub mod engine;
pub mod error;
pub mod extractor;
pub mod health;
pub mod ids;
pub mod model;
pub mod providers;
pub mod retrieval;
pub mod retry;
pub mod search;
pub mod store;
pub mod synthesis;
pub mod text_similarity;
pub mod vectormath;

// ============================================================================
// PUBLIC API RE-EXPORTS
// ============================================================================

// Integration facade (C8)
pub use engine::{Engine, EngineRegistry};

// Configuration
pub use config::{EngramConfig, RetryConfig};

// Errors
pub use error::{EngramError, Result};

// Durable record types (section 3)
pub use model::{
    CausalEndpointType, CausalLink, CausalStrength, ChangeType, ConsolidationRun,
    ConsolidationStatus, ConsolidationTrigger, CoreMemory, Episode, Fact, Foresight,
    MemoryChange, MemoryCluster, Preference, Procedure, Relationship, SourceTag, Ttl,
    UserProfile, SINGULAR_PREDICATES,
};

// Storage (C1)
pub use store::{MemoryStats, Storage, StorageError};

// Extraction (C2)
pub use extractor::{CausalCandidate, ExtractionResult, Extractor, FactCandidate};

// Online synthesis (C3)
pub use synthesis::{SynthesisEngine, SynthesisOutcome};

// Providers (LLM / embedding, section 4.2 and 5)
pub use providers::{
    CompletionRequest, EmbeddingProvider, HeuristicEmbeddingProvider, LlmProvider,
    RuleBasedLlmProvider, MAX_EMBEDDING_DIM, MIN_EMBEDDING_DIM,
};
#[cfg(feature = "http-providers")]
pub use providers::{HttpEmbeddingProvider, HttpLlmProvider};

// Indexes (C4)
pub use search::{
    assign_to_cluster, linear_combination, normalize_entity, reciprocal_rank_fusion,
    sanitize_fts5_query, Bm25Hit, EntityIndex, RecordKind, VectorHit, VectorIndex,
};

// Retrieval (C5)
pub use retrieval::{
    plan, plan_heuristic, prefetch, should_prefetch, trace, CausalChain, CausalChainLink,
    Intent, IntentType, PrefetchResult, PrefetchTiming, RetrievalDepth, RetrievalPlan, SearchHit,
};

// Consolidation (C6)
pub use consolidation::ConsolidationRunner;

// Health & cleanup (C7)
pub use health::{HealthReport, Issue, Severity};

// Retry/backoff utility and id generation (section 9 design notes)
pub use ids::new_id;
pub use retry::with_backoff;
pub use text_similarity::{HeuristicTextSimilarity, TextSimilarity};

// ============================================================================
// VERSION INFO
// ============================================================================

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// ============================================================================
// PRELUDE
// ============================================================================

/// Convenient imports for common usage.
pub mod prelude {
    pub use crate::{
        CausalChain, Engine, EngineRegistry, EngramConfig, EngramError, Episode, Fact,
        HealthReport, Result, SearchHit, Storage, StorageError,
    };
}
