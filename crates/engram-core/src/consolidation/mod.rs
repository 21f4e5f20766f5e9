//! C6: Consolidation
//!
//! The background "sleep cycle": pattern discovery, fact consolidation,
//! connection discovery, contradiction resolution, and active forgetting,
//! all run against one `ConsolidationRun` record. `scheduler` decides
//! *when* a run should happen; `ConsolidationRunner::run` is what the
//! integration facade (C8) calls once it has.

pub mod contradictions;
pub mod forgetting;
pub mod patterns;
pub mod proposals;
pub mod scheduler;

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;

use crate::config::EngramConfig;
use crate::ids::new_id;
use crate::model::{ChangeType, ConsolidationRun, ConsolidationStatus, ConsolidationTrigger, MemoryChange};
use crate::providers::LlmProvider;
use crate::store::Storage;
use crate::text_similarity::heuristic_similarity;

const RECENT_EPISODE_BATCH: usize = 50;
const MAX_CONSOLIDATION_PAIRS: usize = 20;
const FACT_PAIR_SIMILARITY_THRESHOLD: f32 = 0.7;

pub struct ConsolidationRunner {
    llm: Arc<dyn LlmProvider>,
    config: EngramConfig,
}

impl ConsolidationRunner {
    pub fn new(llm: Arc<dyn LlmProvider>, config: EngramConfig) -> Self {
        Self { llm, config }
    }

    /// Run one full consolidation cycle and return the finished
    /// `ConsolidationRun`. Records `failed` rather than propagating on
    /// an unhandled error partway through (section 4.6's "no per-run
    /// timeout; records failed on any unhandled error").
    pub async fn run(&self, store: &Storage, trigger: ConsolidationTrigger) -> crate::error::Result<ConsolidationRun> {
        let started_at = Utc::now();
        let mut run = ConsolidationRun {
            id: new_id("run"),
            trigger,
            status: ConsolidationStatus::Running,
            started_at,
            finished_at: None,
            items_extracted: 0,
            items_resolved: 0,
            items_pruned: 0,
        };
        store.insert_consolidation_run(&run)?;

        match self.execute_stages(store, &run.id).await {
            Ok((extracted, resolved, pruned)) => {
                run.items_extracted = extracted;
                run.items_resolved = resolved;
                run.items_pruned = pruned;
                run.status = ConsolidationStatus::Completed;
            }
            Err(_) => {
                run.status = ConsolidationStatus::Failed;
            }
        }
        run.finished_at = Some(Utc::now());
        store.update_consolidation_run(&run)?;
        Ok(run)
    }

    async fn execute_stages(&self, store: &Storage, run_id: &str) -> crate::error::Result<(u32, u32, u32)> {
        let recent_episodes = store.recent_episodes(RECENT_EPISODE_BATCH, None)?;

        // Stage 1: pattern discovery.
        let discovered = patterns::discover(&self.llm, &recent_episodes).await;
        let extracted_from_patterns = discovered.len() as u32;

        // Stage 2: fact consolidation over similar-looking active fact pairs.
        let active_facts = store.find_facts(None, None, true)?;
        let pairs = similar_fact_pairs(&active_facts);
        let consolidated = proposals::consolidate_facts(&self.llm, store, &pairs, run_id).await?;

        // Contradiction resolution runs regardless of LLM availability.
        let resolutions = contradictions::resolve_all(store, Some(run_id))?;

        // Stage 3: connection discovery.
        let context = build_connection_context(&recent_episodes, &active_facts);
        let connections = proposals::discover_connections(&self.llm, store, &context).await?;

        // Stage 4: forgetting.
        let (pruned, forgotten_ids) = self.run_forgetting(store, run_id)?;

        // Cluster upkeep: drop forgotten members from every cluster, and
        // any cluster left with no members at all.
        self.run_cluster_upkeep(store, &forgotten_ids)?;

        let extracted = extracted_from_patterns + connections;
        let resolved = consolidated + resolutions.len() as u32;
        Ok((extracted, resolved, pruned))
    }

    fn run_cluster_upkeep(&self, store: &Storage, forgotten_ids: &HashSet<String>) -> crate::error::Result<()> {
        if forgotten_ids.is_empty() {
            return Ok(());
        }
        for mut cluster in store.all_clusters()? {
            let before = cluster.member_ids.len();
            let kept: Vec<(String, String)> = cluster
                .member_ids
                .iter()
                .cloned()
                .zip(cluster.member_types.iter().cloned())
                .filter(|(id, _)| !forgotten_ids.contains(id))
                .collect();
            if kept.len() == before {
                continue;
            }
            if kept.is_empty() {
                store.delete_cluster(&cluster.id)?;
                continue;
            }
            cluster.member_ids = kept.iter().map(|(id, _)| id.clone()).collect();
            cluster.member_types = kept.iter().map(|(_, t)| t.clone()).collect();
            cluster.updated_at = Utc::now();
            store.update_cluster(&cluster)?;
        }
        Ok(())
    }

    fn run_forgetting(&self, store: &Storage, run_id: &str) -> crate::error::Result<(u32, HashSet<String>)> {
        let now = Utc::now();
        let links = store.all_causal_links()?;
        let mut referenced: HashSet<String> = HashSet::new();
        for link in &links {
            referenced.insert(link.cause_id.clone());
            referenced.insert(link.effect_id.clone());
        }

        let mut pruned = 0;
        let mut forgotten_ids: HashSet<String> = HashSet::new();

        for fact in store.find_facts(None, None, true)? {
            let inputs = forgetting::inputs_for_fact(&fact, &referenced, now, self.config.stale_days, 1.0);
            let score = forgetting::retention_score(&inputs);
            let exempt = fact.user_affirmed;
            if forgetting::decide(score, exempt) == forgetting::RetentionDecision::Forget {
                store.retract_fact(&fact.id, "forgetting: low retention score")?;
                store.record_change(&MemoryChange {
                    id: new_id("change"),
                    change_type: ChangeType::Retract,
                    target_type: "fact".into(),
                    target_id: fact.id.clone(),
                    previous_value: None,
                    new_value: "forgotten".into(),
                    reason: format!("retention score {score:.2} below forget threshold"),
                    trigger_episode_id: None,
                    consolidation_run_id: Some(run_id.to_string()),
                    created_at: now,
                })?;
                forgotten_ids.insert(fact.id);
                pruned += 1;
            }
        }

        for episode in store.all_episodes()? {
            let inputs = forgetting::inputs_for_episode(&episode, &referenced, now, self.config.stale_days, 1.0);
            let score = forgetting::retention_score(&inputs);
            if forgetting::decide(score, false) == forgetting::RetentionDecision::Forget {
                store.record_change(&MemoryChange {
                    id: new_id("change"),
                    change_type: ChangeType::Retract,
                    target_type: "episode".into(),
                    target_id: episode.id.clone(),
                    previous_value: None,
                    new_value: "forgotten".into(),
                    reason: format!("retention score {score:.2} below forget threshold"),
                    trigger_episode_id: None,
                    consolidation_run_id: Some(run_id.to_string()),
                    created_at: now,
                })?;
                store.delete_episode(&episode.id)?;
                forgotten_ids.insert(episode.id);
                pruned += 1;
            }
        }

        Ok((pruned, forgotten_ids))
    }
}

fn similar_fact_pairs(facts: &[crate::model::Fact]) -> Vec<(crate::model::Fact, crate::model::Fact)> {
    let mut pairs = Vec::new();
    'outer: for i in 0..facts.len() {
        for j in (i + 1)..facts.len() {
            if facts[i].subject != facts[j].subject || facts[i].predicate != facts[j].predicate {
                continue;
            }
            if facts[i].object == facts[j].object {
                continue;
            }
            if heuristic_similarity(&facts[i].object, &facts[j].object) >= FACT_PAIR_SIMILARITY_THRESHOLD {
                pairs.push((facts[i].clone(), facts[j].clone()));
                if pairs.len() >= MAX_CONSOLIDATION_PAIRS {
                    break 'outer;
                }
            }
        }
    }
    pairs
}

fn build_connection_context(episodes: &[crate::model::Episode], facts: &[crate::model::Fact]) -> String {
    let mut lines = Vec::new();
    for e in episodes.iter().take(20) {
        lines.push(format!("episode [{}]: {}", e.id, e.summary));
    }
    for f in facts.iter().take(20) {
        lines.push(format!("fact [{}]: {} {} {}", f.id, f.subject, f.predicate, f.object));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::llm::RuleBasedLlmProvider;

    #[tokio::test]
    async fn run_completes_with_no_llm_and_empty_store() {
        let store = Storage::open_in_memory().unwrap();
        let llm: Arc<dyn LlmProvider> = Arc::new(RuleBasedLlmProvider);
        let runner = ConsolidationRunner::new(llm, EngramConfig::default());

        let run = runner.run(&store, ConsolidationTrigger::InitialConsolidation).await.unwrap();
        assert_eq!(run.status, ConsolidationStatus::Completed);
        assert_eq!(run.items_extracted, 0);
    }

    #[test]
    fn similar_fact_pairs_skips_identical_objects() {
        let now = Utc::now();
        let fact = |id: &str, object: &str| crate::model::Fact {
            id: id.into(),
            subject: "user".into(),
            predicate: "uses".into(),
            object: object.into(),
            confidence: 0.8,
            evidence: vec![],
            first_seen: now,
            last_confirmed: now,
            contradictions: vec![],
            user_affirmed: false,
            is_active: true,
            retracted_reason: None,
            access_count: 0,
            embedding: None,
        };
        let facts = vec![fact("a", "rust programming language"), fact("b", "rust programming language")];
        assert!(similar_fact_pairs(&facts).is_empty());
    }

    #[test]
    fn cluster_upkeep_drops_forgotten_members_and_empty_clusters() {
        let store = Storage::open_in_memory().unwrap();
        let llm: Arc<dyn LlmProvider> = Arc::new(RuleBasedLlmProvider);
        let runner = ConsolidationRunner::new(llm, EngramConfig::default());
        let now = Utc::now();

        let mostly_forgotten = crate::model::MemoryCluster {
            id: new_id("cluster"),
            centroid: vec![1.0, 0.0],
            member_ids: vec!["fact-stale".into(), "fact-keep".into()],
            member_types: vec!["fact".into(), "fact".into()],
            theme: "misc".into(),
            keywords: vec![],
            last_timestamp: now,
            created_at: now,
            updated_at: now,
        };
        let fully_forgotten = crate::model::MemoryCluster {
            id: new_id("cluster"),
            centroid: vec![0.0, 1.0],
            member_ids: vec!["episode-stale".into()],
            member_types: vec!["episode".into()],
            theme: "misc".into(),
            keywords: vec![],
            last_timestamp: now,
            created_at: now,
            updated_at: now,
        };
        store.insert_cluster(&mostly_forgotten).unwrap();
        store.insert_cluster(&fully_forgotten).unwrap();

        let forgotten: HashSet<String> = ["fact-stale".to_string(), "episode-stale".to_string()].into_iter().collect();
        runner.run_cluster_upkeep(&store, &forgotten).unwrap();

        let remaining = store.all_clusters().unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, mostly_forgotten.id);
        assert_eq!(remaining[0].member_ids, vec!["fact-keep".to_string()]);
    }
}
