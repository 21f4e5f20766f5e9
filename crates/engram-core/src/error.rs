//! Crate-wide error taxonomy
//!
//! Subsystems (`store`, `providers`, `extractor`, ...) keep their own
//! `thiserror` enums with precise context; this type is the taxonomy call
//! sites that only care about *category* can match on. Most variants wrap a
//! subsystem error via `#[from]`.

use crate::store::StorageError;

/// Unified error type spanning every subsystem's failure category.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum EngramError {
    /// The LLM or embedding provider could not be reached, or was exhausted
    /// after retry (see `retry::with_backoff`). Never fatal: callers fall
    /// back to regex/rule-based paths.
    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// A provider call was rate-limited. Retried internally; this variant
    /// only escapes after retry exhaustion is itself downgraded — kept for
    /// subsystems that want to observe the raw signal.
    #[error("rate limited: retry after {retry_after_secs:?}")]
    RateLimited {
        /// Parsed `retry-after` hint, if the provider supplied one.
        retry_after_secs: Option<u64>,
    },

    /// Malformed input to a public operation (bad query, invalid record).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An id lookup found nothing.
    #[error("not found: {0}")]
    NotFound(String),

    /// A write would violate a bookkeeping invariant (e.g. two active
    /// facts for a singular predicate) that must instead be resolved
    /// in-line by the contradiction-resolution rules; surfaced only if
    /// resolution itself is impossible (should not happen in practice).
    #[error("conflict detected: {0}")]
    ConflictDetected(String),

    /// The durable store failed; the triggering transaction rolled back
    /// and no index updates were issued.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// An LLM JSON-mode response could not be parsed after one retry.
    #[error("parse error: {0}")]
    Parse(String),

    /// Two embeddings being compared had incompatible or out-of-range
    /// dimensions; the record pair is skipped rather than the crate
    /// crashing.
    #[error("embedding dimension mismatch: expected {expected}, got {got}")]
    EmbeddingDimensionMismatch {
        /// Dimension of the first operand.
        expected: usize,
        /// Dimension of the second operand.
        got: usize,
    },
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, EngramError>;
