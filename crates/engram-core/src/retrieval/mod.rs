//! C5: Retrieval
//!
//! Turns a query into a `RetrievalPlan` (`intent`), runs the alpha-weighted
//! keyword/vector fusion search over it (`hybrid_search`), optionally walks
//! a causal chain behind a target effect (`causal`), and — ahead of any of
//! that — warms a candidate set from entity mentions and recent episodes
//! (`prefetch`).

pub mod causal;
pub mod hybrid_search;
pub mod intent;
pub mod prefetch;

pub use causal::{trace, CausalChain, CausalChainLink};
pub use hybrid_search::SearchHit;
pub use intent::{plan, plan_heuristic, Intent, IntentType, RetrievalDepth, RetrievalPlan};
pub use prefetch::{prefetch, should_prefetch, PrefetchResult, PrefetchTiming};
