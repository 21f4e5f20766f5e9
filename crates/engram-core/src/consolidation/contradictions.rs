//! Contradiction resolution (section 4.6)
//!
//! A contradiction arises two ways: (1) two or more active facts sharing
//! a subject and a singular predicate (at most one may hold at a time —
//! `has_name`, `works_at`, ...) but disagreeing on the object, or (2) for
//! any other shared (subject, predicate), a direct contradiction detected
//! by negation-keyword asymmetry between otherwise-similar objects (e.g.
//! `(user, likes, coffee)` vs `(user, likes, doesn't like coffee)`).
//! Resolution picks one winner by a deterministic precedence and retracts
//! the rest, each pointing its `contradictions` at the winner.

use chrono::Utc;

use crate::ids::new_id;
use crate::model::{ChangeType, Fact, MemoryChange, SINGULAR_PREDICATES};
use crate::store::Storage;
use crate::text_similarity::heuristic_similarity;

/// One resolved contradiction: the surviving fact and the ones it beat.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub winner_id: String,
    pub losers: Vec<String>,
}

const NEGATION_KEYWORDS: &[&str] =
    &["not", "n't", "no longer", "never", "stopped", "doesn't", "don't", "isn't", "won't", "cannot", "can't"];
const NEGATION_BASE_SIMILARITY_THRESHOLD: f32 = 0.5;

/// Group active facts by `(subject, predicate)` and resolve every cluster
/// of mutually contradicting facts: singular-predicate groups with more
/// than one distinct object, and negation-asymmetric pairs within any
/// other shared-predicate group.
pub fn resolve_all(store: &Storage, consolidation_run_id: Option<&str>) -> crate::error::Result<Vec<Resolution>> {
    let facts = store.find_facts(None, None, true)?;
    let mut groups: std::collections::HashMap<(String, String), Vec<Fact>> = std::collections::HashMap::new();
    for fact in facts {
        groups.entry((fact.subject.clone(), fact.predicate.clone())).or_default().push(fact);
    }

    let mut resolutions = Vec::new();
    for ((_, predicate), members) in groups {
        let is_singular = SINGULAR_PREDICATES.contains(&predicate.as_str());
        let clusters = if is_singular {
            let distinct_objects: std::collections::HashSet<&str> = members.iter().map(|f| f.object.as_str()).collect();
            if distinct_objects.len() <= 1 {
                Vec::new()
            } else {
                vec![members]
            }
        } else {
            negation_asymmetry_clusters(members)
        };

        for cluster in clusters {
            resolutions.push(resolve_cluster(store, cluster, consolidation_run_id)?);
        }
    }

    Ok(resolutions)
}

/// Pick a winner by precedence and retract the rest of `members`, each
/// pointing its `contradictions` at the winner.
fn resolve_cluster(store: &Storage, mut members: Vec<Fact>, consolidation_run_id: Option<&str>) -> crate::error::Result<Resolution> {
    members.sort_by(|a, b| order_key(a).cmp(&order_key(b)));
    let winner = members.remove(0);
    let loser_ids: Vec<String> = members.iter().map(|f| f.id.clone()).collect();

    for mut loser in members {
        loser.is_active = false;
        loser.retracted_reason = Some(format!("superseded by {}", winner.id));
        if !loser.contradictions.contains(&winner.id) {
            loser.contradictions.push(winner.id.clone());
        }
        store.update_fact(&loser)?;
        store.record_change(&MemoryChange {
            id: new_id("change"),
            change_type: ChangeType::Retract,
            target_type: "fact".into(),
            target_id: loser.id.clone(),
            previous_value: Some(loser.object.clone()),
            new_value: winner.object.clone(),
            reason: "contradiction resolution".into(),
            trigger_episode_id: None,
            consolidation_run_id: consolidation_run_id.map(str::to_string),
            created_at: Utc::now(),
        })?;
    }

    Ok(Resolution { winner_id: winner.id, losers: loser_ids })
}

/// Partition `members` (all sharing a non-singular predicate) into
/// clusters of facts that mutually contradict by negation-keyword
/// asymmetry over similar base content. Facts touched by no such pair
/// are dropped: under a non-singular predicate, disagreeing objects are
/// only a contradiction when one is the negation of the other.
fn negation_asymmetry_clusters(members: Vec<Fact>) -> Vec<Vec<Fact>> {
    let n = members.len();
    let mut parent: Vec<usize> = (0..n).collect();
    fn find(parent: &mut [usize], x: usize) -> usize {
        if parent[x] != x {
            parent[x] = find(parent, parent[x]);
        }
        parent[x]
    }
    let bases: Vec<(bool, String)> = members.iter().map(|f| strip_negation(&f.object)).collect();

    let mut touched = vec![false; n];
    for i in 0..n {
        for j in (i + 1)..n {
            let (neg_i, base_i) = &bases[i];
            let (neg_j, base_j) = &bases[j];
            if neg_i == neg_j {
                continue;
            }
            if heuristic_similarity(base_i, base_j) >= NEGATION_BASE_SIMILARITY_THRESHOLD {
                let ri = find(&mut parent, i);
                let rj = find(&mut parent, j);
                if ri != rj {
                    parent[ri] = rj;
                }
                touched[i] = true;
                touched[j] = true;
            }
        }
    }

    let mut clusters: std::collections::HashMap<usize, Vec<Fact>> = std::collections::HashMap::new();
    for (i, fact) in members.into_iter().enumerate() {
        if !touched[i] {
            continue;
        }
        let root = find(&mut parent, i);
        clusters.entry(root).or_default().push(fact);
    }
    clusters.into_values().filter(|c| c.len() > 1).collect()
}

/// Lowercase `object`, strip a leading/embedded negation keyword, and
/// report whether one was present.
fn strip_negation(object: &str) -> (bool, String) {
    let lower = object.to_lowercase();
    let mut has_negation = false;
    let mut base = lower.clone();
    for kw in NEGATION_KEYWORDS {
        if lower.contains(kw) {
            has_negation = true;
            base = base.replace(kw, " ");
        }
    }
    let base: String = base.split_whitespace().collect::<Vec<_>>().join(" ");
    (has_negation, base)
}

/// Lower key sorts first = wins. Precedence: user-affirmed first, then
/// more-recent `lastConfirmed`, then higher confidence, then more
/// evidence, then the smaller id as a final deterministic tie-break.
fn order_key(fact: &Fact) -> (std::cmp::Reverse<bool>, std::cmp::Reverse<i64>, std::cmp::Reverse<i64>, std::cmp::Reverse<usize>, String) {
    (
        std::cmp::Reverse(fact.user_affirmed),
        std::cmp::Reverse(fact.last_confirmed.timestamp_millis()),
        std::cmp::Reverse((fact.confidence * 1_000_000.0) as i64),
        std::cmp::Reverse(fact.evidence.len()),
        fact.id.clone(),
    )
}
