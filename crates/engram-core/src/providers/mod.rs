//! LLM and embedding providers (section 4.2/5, "opaque external services
//! with declared contracts")
//!
//! The teacher bundled a local ONNX model (`embeddings::EmbeddingService`,
//! `fastembed`); this crate instead treats the language model and the
//! embedding model as pluggable services behind a trait, since the spec
//! only constrains their contract (inputs, outputs, retry/error shape),
//! never their implementation. The default is the regex/heuristic
//! fallback every call site already tolerates; an HTTP-backed
//! implementation is available behind the `http-providers` feature.

mod embedding;
mod llm;

pub use embedding::{EmbeddingProvider, HeuristicEmbeddingProvider};
pub use llm::{CompletionRequest, LlmProvider, RuleBasedLlmProvider};

#[cfg(feature = "http-providers")]
mod http;
#[cfg(feature = "http-providers")]
pub use http::{HttpEmbeddingProvider, HttpLlmProvider};

/// Acceptable embedding dimensionality range (section 4.2: providers must
/// report a dimension in `[384, 8192]`).
pub const MIN_EMBEDDING_DIM: usize = 384;
pub const MAX_EMBEDDING_DIM: usize = 8192;
