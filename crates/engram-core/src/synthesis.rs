//! C3: Online Synthesis
//!
//! Runs on every new-fact write: embed, find merge candidates among
//! already-embedded active facts, and either insert as-is or merge
//! (section 4.3). Mirrors the teacher's `smart_ingest` decision flow
//! (embed → find similar → decide create/merge/reinforce) but against
//! this crate's Fact model instead of `KnowledgeNode`.

use std::sync::Arc;

use chrono::Utc;

use crate::config::EngramConfig;
use crate::ids::new_id;
use crate::model::{ChangeType, Fact, MemoryChange};
use crate::providers::EmbeddingProvider;
use crate::store::Storage;
use crate::vectormath::cosine_similarity;

/// Outcome of running synthesis on one new fact.
#[derive(Debug, Clone)]
pub enum SynthesisOutcome {
    /// No merge candidate found; the fact was inserted as-is.
    Inserted { fact: Fact },
    /// Merged with one or more existing active facts.
    Merged { fact: Fact, merged_away: Vec<String> },
}

pub struct SynthesisEngine {
    embedder: Arc<dyn EmbeddingProvider>,
    config: EngramConfig,
}

impl SynthesisEngine {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, config: EngramConfig) -> Self {
        Self { embedder, config }
    }

    /// Run synthesis for a freshly-extracted fact candidate and persist
    /// the result (insert or merge) to `store`.
    pub async fn synthesize(&self, store: &Storage, mut candidate: Fact) -> crate::error::Result<SynthesisOutcome> {
        let embed_text = format!("{} {} {}", candidate.subject, candidate.predicate, candidate.object);
        let embedding = self.embedder.embed_query(&embed_text).await.ok();

        let candidates = if embedding.is_some() {
            store.active_fact_embeddings()?
        } else {
            Vec::new()
        };

        let mut merge_targets = Vec::new();
        if let Some(new_embedding) = &embedding {
            let max_candidates = self.config.max_similar_facts * 5;
            for (id, emb) in candidates.into_iter().take(max_candidates) {
                if emb.len() != new_embedding.len() {
                    continue;
                }
                let sim = cosine_similarity(new_embedding, emb.as_slice());
                if sim >= self.config.similarity_threshold {
                    if let Some(existing) = store.get_fact(&id)? {
                        merge_targets.push(existing);
                    }
                }
            }
        }

        if merge_targets.is_empty() {
            candidate.id = new_id("fact");
            store.insert_fact(&candidate, embedding.as_deref())?;
            store.record_change(&MemoryChange {
                id: new_id("chg"),
                change_type: ChangeType::Add,
                target_type: "fact".to_string(),
                target_id: candidate.id.clone(),
                previous_value: None,
                new_value: format!("{}:{}:{}", candidate.subject, candidate.predicate, candidate.object),
                reason: "new fact".to_string(),
                trigger_episode_id: None,
                consolidation_run_id: None,
                created_at: Utc::now(),
            })?;
            return Ok(SynthesisOutcome::Inserted { fact: candidate });
        }

        let merged = merge_rule_based(&candidate, &merge_targets);
        store.insert_fact(&merged, embedding.as_deref())?;

        let mut merged_away = Vec::new();
        for target in &merge_targets {
            let reason = format!("merged into {}", merged.id);
            store.retract_fact(&target.id, &reason)?;
            store.record_change(&MemoryChange {
                id: new_id("chg"),
                change_type: ChangeType::Merge,
                target_type: "fact".to_string(),
                target_id: target.id.clone(),
                previous_value: Some(format!("{}:{}:{}", target.subject, target.predicate, target.object)),
                new_value: merged.id.clone(),
                reason,
                trigger_episode_id: None,
                consolidation_run_id: None,
                created_at: Utc::now(),
            })?;
            merged_away.push(target.id.clone());
        }

        Ok(SynthesisOutcome::Merged { fact: merged, merged_away })
    }
}

/// Rule-based merge (section 4.3 step 5): union evidence, max confidence,
/// keep the new subject/predicate/object, `userAffirmed` = any of them.
fn merge_rule_based(new_fact: &Fact, targets: &[Fact]) -> Fact {
    let mut evidence = new_fact.evidence.clone();
    let mut confidence = new_fact.confidence;
    let mut user_affirmed = new_fact.user_affirmed;
    // Carry the merged-away facts' access history forward, plus one for
    // this restatement, so a re-affirmed fact doesn't look less accessed
    // than it was before the merge (testable property 1).
    let mut access_count = new_fact.access_count;

    for target in targets {
        for e in &target.evidence {
            if !evidence.contains(e) {
                evidence.push(e.clone());
            }
        }
        confidence = confidence.max(target.confidence);
        user_affirmed = user_affirmed || target.user_affirmed;
        access_count += target.access_count;
    }
    access_count += 1;

    Fact {
        id: new_id("fact"),
        subject: new_fact.subject.clone(),
        predicate: new_fact.predicate.clone(),
        object: new_fact.object.clone(),
        confidence,
        evidence,
        first_seen: new_fact.first_seen,
        last_confirmed: Utc::now(),
        contradictions: new_fact.contradictions.clone(),
        user_affirmed,
        is_active: true,
        retracted_reason: None,
        access_count,
        embedding: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::HeuristicEmbeddingProvider;

    fn sample_fact(object: &str, evidence: &str) -> Fact {
        let now = Utc::now();
        Fact {
            id: new_id("fact"),
            subject: "user".into(),
            predicate: "prefers".into(),
            object: object.into(),
            confidence: 0.7,
            evidence: vec![evidence.to_string()],
            first_seen: now,
            last_confirmed: now,
            contradictions: vec![],
            user_affirmed: false,
            is_active: true,
            retracted_reason: None,
            access_count: 0,
            embedding: None,
        }
    }

    #[tokio::test]
    async fn inserts_as_is_when_no_candidates_exist() {
        let store = Storage::open_in_memory().unwrap();
        let embedder = Arc::new(HeuristicEmbeddingProvider::default());
        let engine = SynthesisEngine::new(embedder, EngramConfig::default());

        let outcome = engine.synthesize(&store, sample_fact("typescript", "ev1")).await.unwrap();
        assert!(matches!(outcome, SynthesisOutcome::Inserted { .. }));
        assert_eq!(store.get_stats().unwrap().active_fact_count, 1);
    }

    #[tokio::test]
    async fn merges_near_duplicate_evidence_union() {
        let store = Storage::open_in_memory().unwrap();
        let embedder = Arc::new(HeuristicEmbeddingProvider::default());
        let engine = SynthesisEngine::new(embedder.clone(), EngramConfig::default());

        let first = sample_fact("typescript enthusiast", "ev1");
        engine.synthesize(&store, first.clone()).await.unwrap();

        // same text -> identical embedding -> cosine 1.0 >= threshold
        let second = sample_fact("typescript enthusiast", "ev2");
        let outcome = engine.synthesize(&store, second).await.unwrap();

        match outcome {
            SynthesisOutcome::Merged { fact, merged_away } => {
                assert_eq!(merged_away.len(), 1);
                assert!(fact.evidence.contains(&"ev1".to_string()));
                assert!(fact.evidence.contains(&"ev2".to_string()));
            }
            SynthesisOutcome::Inserted { .. } => panic!("expected a merge"),
        }
        let stats = store.get_stats().unwrap();
        assert_eq!(stats.active_fact_count, 1);
        assert_eq!(stats.retracted_fact_count, 1);
    }
}
