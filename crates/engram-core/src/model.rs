//! The durable record types (spec section 3)
//!
//! Mirrors the teacher's `memory/node.rs` layout (plain `Serialize` /
//! `Deserialize` structs with `camelCase` wire fields, a hand-written
//! `Default`, and inline unit tests) but with this crate's own data model:
//! Episode, Fact, CausalLink, Procedure, MemoryCluster, MemoryChange,
//! ConsolidationRun, and the auxiliary record types from section 3's last
//! paragraph.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How long an Episode is retained before it becomes forgetting-eligible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Ttl {
    #[serde(rename = "7d")]
    SevenDays,
    #[serde(rename = "30d")]
    ThirtyDays,
    #[serde(rename = "90d")]
    NinetyDays,
    #[default]
    Permanent,
}

impl Ttl {
    /// Duration this TTL represents, or `None` for `Permanent`.
    pub fn duration(&self) -> Option<chrono::Duration> {
        match self {
            Ttl::SevenDays => Some(chrono::Duration::days(7)),
            Ttl::ThirtyDays => Some(chrono::Duration::days(30)),
            Ttl::NinetyDays => Some(chrono::Duration::days(90)),
            Ttl::Permanent => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Ttl::SevenDays => "7d",
            Ttl::ThirtyDays => "30d",
            Ttl::NinetyDays => "90d",
            Ttl::Permanent => "permanent",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "7d" => Ttl::SevenDays,
            "30d" => Ttl::ThirtyDays,
            "90d" => Ttl::NinetyDays,
            _ => Ttl::Permanent,
        }
    }
}

/// "What happened" — a single coherent conversation unit (section 3).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Episode {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub summary: String,
    pub participants: Vec<String>,
    pub topic: String,
    pub keywords: Vec<String>,
    pub emotional_salience: f32,
    pub utility_score: f32,
    pub source_session_id: String,
    pub source_message_ids: Vec<String>,
    pub ttl: Ttl,
    pub access_count: u32,
    pub last_accessed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Episode {
    /// Whether this episode is past its TTL as of `now`.
    pub fn ttl_elapsed(&self, now: DateTime<Utc>) -> bool {
        match self.ttl.duration() {
            Some(d) => now - self.timestamp > d,
            None => false,
        }
    }
}

/// Source of a fact candidate (section 4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceTag {
    Pattern,
    Inference,
    Llm,
}

/// "What I know" — a subject-predicate-object triple (section 3).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fact {
    pub id: String,
    pub subject: String,
    pub predicate: String,
    pub object: String,
    pub confidence: f32,
    pub evidence: Vec<String>,
    pub first_seen: DateTime<Utc>,
    pub last_confirmed: DateTime<Utc>,
    pub contradictions: Vec<String>,
    pub user_affirmed: bool,
    pub is_active: bool,
    pub retracted_reason: Option<String>,
    pub access_count: u32,
    /// Embedding of `"<subject> <predicate> <object>"`, when computed
    /// (section 4.3 step 1). Stored separately in the store's blob column;
    /// kept here only transiently by callers that already hold it.
    #[serde(skip)]
    pub embedding: Option<Vec<f32>>,
}

/// The predicates for which at most one active fact may exist per subject
/// (section 3/6).
pub const SINGULAR_PREDICATES: &[&str] =
    &["has_name", "works_at", "lives_in", "timezone", "is_a"];

impl Fact {
    pub fn is_singular_predicate(&self) -> bool {
        SINGULAR_PREDICATES.contains(&self.predicate.as_str())
    }
}

/// Which of `{fact, episode, event}` a causal endpoint refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CausalEndpointType {
    Fact,
    Episode,
    Event,
}

/// `direct` vs `contributing` (section 3: `direct` reserved for
/// confidence > 0.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CausalStrength {
    Direct,
    Contributing,
}

impl CausalStrength {
    /// Clamp a requested strength to the confidence-gated invariant.
    pub fn clamped(requested: CausalStrength, confidence: f32) -> CausalStrength {
        if confidence > 0.7 {
            requested
        } else {
            CausalStrength::Contributing
        }
    }
}

/// "Why things happen" — a typed cause→effect edge (section 3).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CausalLink {
    pub id: String,
    pub cause_type: CausalEndpointType,
    pub cause_id: String,
    pub cause_description: String,
    pub effect_type: CausalEndpointType,
    pub effect_id: String,
    pub effect_description: String,
    pub mechanism: String,
    pub confidence: f32,
    pub evidence: Vec<String>,
    pub temporal_delay: Option<String>,
    pub causal_strength: CausalStrength,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// "How to do things" — a behavioral pattern (section 3).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Procedure {
    pub id: String,
    pub trigger: String,
    pub action: String,
    pub expected_outcome: Option<String>,
    pub examples: Vec<String>,
    pub times_used: u32,
    pub times_succeeded: u32,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Procedure {
    /// `timesSucceeded / timesUsed`, or 0 if unused (section 3).
    pub fn success_rate(&self) -> f32 {
        if self.times_used == 0 {
            0.0
        } else {
            self.times_succeeded as f32 / self.times_used as f32
        }
    }
}

/// A topic cluster ("scene") over record embeddings (section 3/4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryCluster {
    pub id: String,
    pub centroid: Vec<f32>,
    pub member_ids: Vec<String>,
    pub member_types: Vec<String>,
    pub theme: String,
    pub keywords: Vec<String>,
    pub last_timestamp: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MemoryCluster {
    /// A cluster is only "valid" (surfaced by queries) at this size or
    /// above.
    pub fn is_valid(&self, min_cluster_size: usize) -> bool {
        self.member_ids.len() >= min_cluster_size
    }
}

/// Every mutation kind an audit row can record (section 3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Add,
    Modify,
    Retract,
    Strengthen,
    Weaken,
    Merge,
}

/// Append-only audit record of one mutation (section 3). Never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryChange {
    pub id: String,
    pub change_type: ChangeType,
    pub target_type: String,
    pub target_id: String,
    pub previous_value: Option<String>,
    pub new_value: String,
    pub reason: String,
    pub trigger_episode_id: Option<String>,
    pub consolidation_run_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Lifecycle status of a `ConsolidationRun` (section 3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsolidationStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

/// What triggered a consolidation run (section 4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsolidationTrigger {
    InitialConsolidation,
    ManyNewMemories,
    IdleTimeConsolidation,
    ScheduledConsolidation,
    DeepSleepConsolidation,
}

/// Tracks one sleep cycle (section 3).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsolidationRun {
    pub id: String,
    pub trigger: ConsolidationTrigger,
    pub status: ConsolidationStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub items_extracted: u32,
    pub items_resolved: u32,
    pub items_pruned: u32,
}

/// A predicted future state or outcome (auxiliary record, section 3 last
/// paragraph).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Foresight {
    pub id: String,
    pub description: String,
    pub confidence: f32,
    pub basis: Vec<String>,
    pub horizon: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A standing summary of who the agent's user is (auxiliary record).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub display_name: Option<String>,
    pub attributes: Vec<(String, String)>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A standing like/dislike (auxiliary record).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preference {
    pub id: String,
    pub subject: String,
    pub object: String,
    pub polarity: f32,
    pub importance: f32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A named relationship between two entities (auxiliary record).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relationship {
    pub id: String,
    pub from_entity: String,
    pub relation: String,
    pub to_entity: String,
    pub confidence: f32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A record that is never recommended for forgetting (section 4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoreMemory {
    pub id: String,
    pub content: String,
    pub importance: f32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ttl_roundtrip() {
        for ttl in [Ttl::SevenDays, Ttl::ThirtyDays, Ttl::NinetyDays, Ttl::Permanent] {
            assert_eq!(Ttl::parse(ttl.as_str()), ttl);
        }
    }

    #[test]
    fn procedure_success_rate_zero_when_unused() {
        let p = Procedure {
            id: "proc-1-1".into(),
            trigger: "t".into(),
            action: "a".into(),
            expected_outcome: None,
            examples: vec![],
            times_used: 0,
            times_succeeded: 0,
            tags: vec![],
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert_eq!(p.success_rate(), 0.0);
    }

    #[test]
    fn causal_strength_clamps_below_threshold() {
        assert_eq!(
            CausalStrength::clamped(CausalStrength::Direct, 0.5),
            CausalStrength::Contributing
        );
        assert_eq!(
            CausalStrength::clamped(CausalStrength::Direct, 0.71),
            CausalStrength::Direct
        );
    }

    #[test]
    fn singular_predicate_detection() {
        let mut f = sample_fact();
        f.predicate = "has_name".into();
        assert!(f.is_singular_predicate());
        f.predicate = "prefers".into();
        assert!(!f.is_singular_predicate());
    }

    fn sample_fact() -> Fact {
        Fact {
            id: "fact-1-1".into(),
            subject: "user".into(),
            predicate: "prefers".into(),
            object: "typescript".into(),
            confidence: 0.9,
            evidence: vec![],
            first_seen: Utc::now(),
            last_confirmed: Utc::now(),
            contradictions: vec![],
            user_affirmed: true,
            is_active: true,
            retracted_reason: None,
            access_count: 0,
            embedding: None,
        }
    }
}
