//! C4: Indexes
//!
//! Three cooperating indexes plus the fusion math they feed into C5:
//! BM25 keyword search (`bm25`, FTS5-backed), exact cosine vector search
//! (`vector`, brute-force by design — see its doc comment), the entity
//! index (`entity`), and online topic clustering (`clusters`). `hybrid`
//! is kept from the teacher largely as-is: its RRF/linear-combination
//! fusion primitives are reused verbatim by C5's hybrid search.

pub mod bm25;
pub mod clusters;
pub mod entity;
pub mod hybrid;
pub mod vector;

pub use bm25::{sanitize_fts5_query, Bm25Hit, RecordKind};
pub use clusters::assign as assign_to_cluster;
pub use entity::{normalize_entity, EntityIndex};
pub use hybrid::{linear_combination, reciprocal_rank_fusion};
pub use vector::{VectorHit, VectorIndex};
