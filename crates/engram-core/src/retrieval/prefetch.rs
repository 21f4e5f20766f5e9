//! Prefetch (section 4.5.4)
//!
//! Runs ahead of an explicit query: pulls the entities named in a
//! message plus the most recent episodes, so a caller has a warm set of
//! candidate memories before it even decides to search. Budgeted at
//! `prefetchLatencyTargetMs` (default 100ms) — `prefetch` reports how
//! long it actually took so callers can log budget overruns.

use std::time::{Duration, Instant};

use crate::config::EngramConfig;
use crate::model::{Episode, Fact};
use crate::retrieval::intent::plan_heuristic;
use crate::search::entity::EntityIndex;
use crate::store::Storage;

const RECENT_EPISODE_COUNT: usize = 5;

/// Per-phase timing breakdown for one `prefetch` call (section 4.5.4).
/// `vector` is always zero today: prefetch only does entity lookups and a
/// recent-episode scan, neither of which touches the vector index.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrefetchTiming {
    pub total: Duration,
    pub intent_classification: Duration,
    pub entity_extraction: Duration,
    pub db: Duration,
    pub vector: Duration,
}

#[derive(Debug, Clone)]
pub struct PrefetchResult {
    pub facts: Vec<Fact>,
    pub episodes: Vec<Episode>,
    pub timing: PrefetchTiming,
    pub over_budget: bool,
}

/// Decide whether a message is worth prefetching against at all — very
/// short or purely conversational filler isn't (section 4.5.4).
pub fn should_prefetch(message: &str) -> bool {
    let trimmed = message.trim();
    if trimmed.len() < 4 {
        return false;
    }
    const FILLER: &[&str] = &["ok", "okay", "thanks", "thank you", "yes", "no", "sure", "got it", "hi", "hello"];
    !FILLER.contains(&trimmed.to_lowercase().as_str())
}

/// Pull candidate memories ahead of an explicit retrieval call.
pub fn prefetch(store: &Storage, config: &EngramConfig, entity_index: &EntityIndex, message: &str) -> crate::error::Result<PrefetchResult> {
    let start = Instant::now();

    if !should_prefetch(message) {
        let timing = PrefetchTiming { total: start.elapsed(), ..Default::default() };
        return Ok(PrefetchResult { facts: Vec::new(), episodes: Vec::new(), timing, over_budget: false });
    }

    let intent_start = Instant::now();
    let intent_plan = plan_heuristic(message);
    let intent_classification = intent_start.elapsed();

    let entity_start = Instant::now();
    let mut fact_ids: Vec<String> = Vec::new();
    for entity in &intent_plan.entities {
        for id in entity_index.lookup(entity) {
            if !fact_ids.contains(&id) {
                fact_ids.push(id);
            }
        }
    }
    let entity_extraction = entity_start.elapsed();

    let db_start = Instant::now();
    let mut facts = Vec::new();
    for id in &fact_ids {
        if let Some(fact) = store.get_fact(id)? {
            if fact.is_active {
                facts.push(fact);
            }
        }
    }
    let episodes = store.recent_episodes(RECENT_EPISODE_COUNT, None)?;
    let db = db_start.elapsed();

    let total = start.elapsed();
    let over_budget = total > Duration::from_millis(config.prefetch_latency_target_ms);
    let timing = PrefetchTiming { total, intent_classification, entity_extraction, db, vector: Duration::ZERO };
    Ok(PrefetchResult { facts, episodes, timing, over_budget })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filler_messages_are_skipped() {
        assert!(!should_prefetch("ok"));
        assert!(!should_prefetch("thanks"));
        assert!(should_prefetch("what did I say about Rust yesterday"));
    }

    #[test]
    fn prefetch_finds_facts_by_entity_mention() {
        let store = Storage::open_in_memory().unwrap();
        let config = EngramConfig::default();
        let mut index = EntityIndex::new();

        let now = chrono::Utc::now();
        let fact = Fact {
            id: crate::ids::new_id("fact"),
            subject: "user".into(),
            predicate: "works_at".into(),
            object: "Acme".into(),
            confidence: 0.9,
            evidence: vec![],
            first_seen: now,
            last_confirmed: now,
            contradictions: vec![],
            user_affirmed: true,
            is_active: true,
            retracted_reason: None,
            access_count: 0,
            embedding: None,
        };
        store.insert_fact(&fact, None).unwrap();
        index.index_fact(&fact.id, &fact.subject, &fact.object);

        let result = prefetch(&store, &config, &index, "What did Acme say about the project?").unwrap();
        assert_eq!(result.facts.len(), 1);
        assert_eq!(result.facts[0].id, fact.id);
    }

    #[test]
    fn skips_work_entirely_for_filler() {
        let store = Storage::open_in_memory().unwrap();
        let config = EngramConfig::default();
        let index = EntityIndex::new();
        let result = prefetch(&store, &config, &index, "ok").unwrap();
        assert!(result.facts.is_empty());
        assert!(result.episodes.is_empty());
    }
}
