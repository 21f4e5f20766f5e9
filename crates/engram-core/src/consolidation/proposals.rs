//! Fact consolidation and connection discovery (section 4.6, stages 2–3)
//!
//! For pairs of similar active facts, asks the LLM whether to merge,
//! strengthen, or retract one of them; separately, asks whether any new
//! `CausalLink` should be proposed between already-stored memories. Both
//! are enrichments on top of the deterministic C6 stages (contradiction
//! resolution, forgetting) — any LLM failure just skips the batch.

use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;

use crate::ids::new_id;
use crate::model::{CausalEndpointType, CausalLink, CausalStrength, ChangeType, Fact, MemoryChange};
use crate::providers::{CompletionRequest, LlmProvider};
use crate::store::Storage;

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
enum FactProposal {
    Merge { #[serde(rename = "factIds")] fact_ids: Vec<String>, #[serde(rename = "newObject")] new_object: String },
    Strengthen { #[serde(rename = "factId")] fact_id: String },
    Retract { #[serde(rename = "factId")] fact_id: String, reason: String },
}

#[derive(Debug, Deserialize)]
struct FactProposalBatch {
    #[serde(default)]
    proposals: Vec<FactProposal>,
}

/// Ask the LLM to propose merges/strengthens/retractions among pairs of
/// similar active facts, then apply each proposal, emitting the
/// corresponding `MemoryChange`. Returns the number of proposals applied.
pub async fn consolidate_facts(
    llm: &Arc<dyn LlmProvider>,
    store: &Storage,
    candidate_pairs: &[(Fact, Fact)],
    consolidation_run_id: &str,
) -> crate::error::Result<u32> {
    if candidate_pairs.is_empty() {
        return Ok(0);
    }

    let prompt = build_fact_prompt(candidate_pairs);
    let request = CompletionRequest::new(prompt).json_mode();
    let response = match llm.complete(request).await {
        Ok(r) => r,
        Err(_) => return Ok(0),
    };
    let batch: FactProposalBatch = match serde_json::from_str(&response) {
        Ok(b) => b,
        Err(_) => return Ok(0),
    };

    let mut applied = 0;
    for proposal in batch.proposals {
        if apply_fact_proposal(store, proposal, consolidation_run_id)?.is_some() {
            applied += 1;
        }
    }
    Ok(applied)
}

fn build_fact_prompt(pairs: &[(Fact, Fact)]) -> String {
    let mut lines = vec![
        "For each pair of similar facts below, decide merge/strengthen/retract. \
         Return JSON {\"proposals\": [{\"action\", ...}]}."
            .to_string(),
    ];
    for (a, b) in pairs {
        lines.push(format!(
            "- [{}] {} {} {} (conf {:.2}) vs [{}] {} {} {} (conf {:.2})",
            a.id, a.subject, a.predicate, a.object, a.confidence, b.id, b.subject, b.predicate, b.object, b.confidence
        ));
    }
    lines.join("\n")
}

fn apply_fact_proposal(store: &Storage, proposal: FactProposal, consolidation_run_id: &str) -> crate::error::Result<Option<()>> {
    match proposal {
        FactProposal::Merge { fact_ids, new_object } => {
            let mut facts = Vec::new();
            for id in &fact_ids {
                if let Some(f) = store.get_fact(id)? {
                    facts.push(f);
                }
            }
            if facts.len() < 2 {
                return Ok(None);
            }
            let (winner, losers) = facts.split_first_mut().expect("checked len >= 2");
            winner.object = new_object;
            winner.confidence = winner.confidence.max(losers.iter().map(|f| f.confidence).fold(0.0, f32::max));
            store.update_fact(winner)?;
            for loser in losers.iter_mut() {
                loser.is_active = false;
                loser.retracted_reason = Some(format!("merged into {}", winner.id));
                store.update_fact(loser)?;
                store.record_change(&MemoryChange {
                    id: new_id("change"),
                    change_type: ChangeType::Merge,
                    target_type: "fact".into(),
                    target_id: loser.id.clone(),
                    previous_value: Some(loser.object.clone()),
                    new_value: winner.object.clone(),
                    reason: "llm consolidation merge".into(),
                    trigger_episode_id: None,
                    consolidation_run_id: Some(consolidation_run_id.to_string()),
                    created_at: Utc::now(),
                })?;
            }
            Ok(Some(()))
        }
        FactProposal::Strengthen { fact_id } => {
            let Some(mut fact) = store.get_fact(&fact_id)? else { return Ok(None) };
            let previous = fact.confidence;
            fact.confidence = (fact.confidence + 0.1).min(1.0);
            store.update_fact(&fact)?;
            store.record_change(&MemoryChange {
                id: new_id("change"),
                change_type: ChangeType::Strengthen,
                target_type: "fact".into(),
                target_id: fact.id.clone(),
                previous_value: Some(previous.to_string()),
                new_value: fact.confidence.to_string(),
                reason: "llm consolidation strengthen".into(),
                trigger_episode_id: None,
                consolidation_run_id: Some(consolidation_run_id.to_string()),
                created_at: Utc::now(),
            })?;
            Ok(Some(()))
        }
        FactProposal::Retract { fact_id, reason } => {
            store.retract_fact(&fact_id, &reason)?;
            store.record_change(&MemoryChange {
                id: new_id("change"),
                change_type: ChangeType::Retract,
                target_type: "fact".into(),
                target_id: fact_id,
                previous_value: None,
                new_value: reason.clone(),
                reason,
                trigger_episode_id: None,
                consolidation_run_id: Some(consolidation_run_id.to_string()),
                created_at: Utc::now(),
            })?;
            Ok(Some(()))
        }
    }
}

#[derive(Debug, Deserialize)]
struct ConnectionProposal {
    #[serde(rename = "causeId")]
    cause_id: String,
    #[serde(rename = "causeDescription")]
    cause_description: String,
    #[serde(rename = "effectId")]
    effect_id: String,
    #[serde(rename = "effectDescription")]
    effect_description: String,
    mechanism: String,
    #[serde(default = "default_confidence")]
    confidence: f32,
}

fn default_confidence() -> f32 {
    0.5
}

#[derive(Debug, Deserialize)]
struct ConnectionBatch {
    #[serde(default)]
    connections: Vec<ConnectionProposal>,
}

/// Ask the LLM for plausible new causal connections among already-stored
/// memories, inserting any it proposes.
pub async fn discover_connections(llm: &Arc<dyn LlmProvider>, store: &Storage, context: &str) -> crate::error::Result<u32> {
    let prompt = format!(
        "Propose new causal connections between memories in this context. \
         Return JSON {{\"connections\": [{{\"causeId\", \"causeDescription\", \"effectId\", \"effectDescription\", \"mechanism\", \"confidence\"}}]}}.\n\n{context}"
    );
    let request = CompletionRequest::new(prompt).json_mode();
    let response = match llm.complete(request).await {
        Ok(r) => r,
        Err(_) => return Ok(0),
    };
    let batch: ConnectionBatch = match serde_json::from_str(&response) {
        Ok(b) => b,
        Err(_) => return Ok(0),
    };

    let now = Utc::now();
    let mut inserted = 0;
    for conn in batch.connections {
        let confidence = conn.confidence.clamp(0.0, 1.0);
        let link = CausalLink {
            id: new_id("causal"),
            cause_type: CausalEndpointType::Fact,
            cause_id: conn.cause_id,
            cause_description: conn.cause_description,
            effect_type: CausalEndpointType::Episode,
            effect_id: conn.effect_id,
            effect_description: conn.effect_description,
            mechanism: conn.mechanism,
            confidence,
            evidence: vec![],
            temporal_delay: None,
            causal_strength: CausalStrength::clamped(CausalStrength::Direct, confidence),
            created_at: now,
            updated_at: now,
        };
        store.insert_causal_link(&link, None)?;
        inserted += 1;
    }
    Ok(inserted)
}
