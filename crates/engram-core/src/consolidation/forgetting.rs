//! Active forgetting (section 4.6 / 3)
//!
//! Weighted retention scoring over the five factors named in the spec,
//! producing a keep/demote/forget decision per memory. `userAffirmed`
//! facts and `CoreMemory` records are exempt regardless of score.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::model::{Episode, Fact};

const W_ACCESS_FREQUENCY: f32 = 0.20;
const W_EMOTIONAL_SALIENCE: f32 = 0.15;
const W_CAUSAL_IMPORTANCE: f32 = 0.25;
const W_RECENCY: f32 = 0.15;
const W_UNIQUENESS: f32 = 0.15;
const W_USER_MARKED: f32 = 0.10;

const KEEP_THRESHOLD: f32 = 0.6;
const FORGET_THRESHOLD: f32 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetentionDecision {
    Keep,
    Demote,
    Forget,
}

/// The five weighted factors, each already normalized to `[0, 1]`.
#[derive(Debug, Clone, Copy)]
pub struct RetentionInputs {
    pub access_frequency: f32,
    pub emotional_salience: f32,
    pub causal_importance: f32,
    pub recency: f32,
    pub uniqueness: f32,
    pub user_marked: bool,
}

/// The weighted-sum formula from section 4.6.
pub fn retention_score(inputs: &RetentionInputs) -> f32 {
    let user_marked = if inputs.user_marked { 1.0 } else { 0.0 };
    (W_ACCESS_FREQUENCY * inputs.access_frequency
        + W_EMOTIONAL_SALIENCE * inputs.emotional_salience
        + W_CAUSAL_IMPORTANCE * inputs.causal_importance
        + W_RECENCY * inputs.recency
        + W_UNIQUENESS * inputs.uniqueness
        + W_USER_MARKED * user_marked)
        .clamp(0.0, 1.0)
}

pub fn decide(score: f32, exempt: bool) -> RetentionDecision {
    if exempt {
        return RetentionDecision::Keep;
    }
    if score >= KEEP_THRESHOLD {
        RetentionDecision::Keep
    } else if score >= FORGET_THRESHOLD {
        RetentionDecision::Demote
    } else {
        RetentionDecision::Forget
    }
}

fn access_frequency(access_count: u32) -> f32 {
    (access_count as f32 / 10.0).min(1.0)
}

fn recency(last_touch: DateTime<Utc>, now: DateTime<Utc>, stale_days: i64) -> f32 {
    let days_since = (now - last_touch).num_days().max(0);
    (1.0 - (days_since as f32 / stale_days.max(1) as f32)).clamp(0.0, 1.0)
}

/// Build retention inputs for a fact. `causally_referenced` is whether
/// the fact's id appears as a cause or effect endpoint of any
/// `CausalLink`; `uniqueness` defaults to 1.0 absent a computed
/// similarity against the rest of the active set.
pub fn inputs_for_fact(fact: &Fact, causally_referenced: &HashSet<String>, now: DateTime<Utc>, stale_days: i64, uniqueness: f32) -> RetentionInputs {
    RetentionInputs {
        access_frequency: access_frequency(fact.access_count),
        emotional_salience: 0.0,
        causal_importance: if causally_referenced.contains(&fact.id) { 1.0 } else { 0.0 },
        recency: recency(fact.last_confirmed, now, stale_days),
        uniqueness,
        user_marked: fact.user_affirmed,
    }
}

/// Build retention inputs for an episode.
pub fn inputs_for_episode(episode: &Episode, causally_referenced: &HashSet<String>, now: DateTime<Utc>, stale_days: i64, uniqueness: f32) -> RetentionInputs {
    let last_touch = episode.last_accessed_at.unwrap_or(episode.timestamp);
    RetentionInputs {
        access_frequency: access_frequency(episode.access_count),
        emotional_salience: episode.emotional_salience.clamp(0.0, 1.0),
        causal_importance: if causally_referenced.contains(&episode.id) { 1.0 } else { 0.0 },
        recency: recency(last_touch, now, stale_days),
        uniqueness,
        user_marked: false,
    }
}
