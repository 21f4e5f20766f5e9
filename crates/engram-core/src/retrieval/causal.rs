//! Causal-chain traversal (section 4.5.3)
//!
//! Walks `CausalLink`s backward from a target effect description,
//! following whichever link's `effectDescription` is similar enough to
//! the current frontier, up to `causalChainMaxDepth` hops. Acyclic by
//! construction: a link is never revisited once it's been followed.

use crate::model::CausalLink;
use crate::store::Storage;
use crate::text_similarity::TextSimilarity;

/// One hop of a traversed causal chain.
#[derive(Debug, Clone)]
pub struct CausalChainLink {
    pub link: CausalLink,
    pub match_similarity: f32,
}

/// A full chain from the queried effect back through its causes.
#[derive(Debug, Clone)]
pub struct CausalChain {
    pub links: Vec<CausalChainLink>,
    /// Product of each link's `confidence` (section 3).
    pub total_confidence: f32,
    /// Human-readable trace, section 8 S3: `"<effect>" happened because:`
    /// followed by each hop's `mechanism`, outermost cause last.
    pub explanation: String,
}

/// Trace the causal chain behind `effect_description`, following matches
/// with similarity `>= min_similarity`, up to `max_depth` hops.
pub fn trace(
    store: &Storage,
    similarity: &dyn TextSimilarity,
    effect_description: &str,
    max_depth: usize,
    min_similarity: f32,
) -> crate::error::Result<CausalChain> {
    let all_links = store.all_causal_links()?;
    let mut links = Vec::new();
    let mut visited: std::collections::HashSet<String> = std::collections::HashSet::new();
    let mut frontier = effect_description.to_string();

    for _ in 0..max_depth {
        let candidate = all_links
            .iter()
            .filter(|l| !visited.contains(&l.id))
            .map(|l| (l, similarity.similarity(&l.effect_description, &frontier)))
            .filter(|(_, sim)| *sim >= min_similarity)
            .fold(None, |acc: Option<(&CausalLink, f32)>, (link, sim)| match acc {
                Some((_, best)) if best >= sim => acc,
                _ => Some((link, sim)),
            });

        match candidate {
            Some((link, sim)) => {
                visited.insert(link.id.clone());
                frontier = link.cause_description.clone();
                links.push(CausalChainLink { link: link.clone(), match_similarity: sim });
            }
            None => break,
        }
    }

    let total_confidence = links.iter().fold(1.0f32, |acc, l| acc * l.link.confidence);
    let explanation = build_explanation(effect_description, &links);
    Ok(CausalChain {
        links,
        total_confidence: if links_is_empty(&links) { 0.0 } else { total_confidence },
        explanation,
    })
}

/// Build the section 8 S3 explanation string: `"<effect>" happened
/// because:` followed by each hop's `mechanism`, in traversal order.
fn build_explanation(effect_description: &str, links: &[CausalChainLink]) -> String {
    let mut explanation = format!("\"{effect_description}\" happened because:");
    for hop in links {
        explanation.push_str("\n- ");
        explanation.push_str(&hop.link.mechanism);
    }
    explanation
}

fn links_is_empty(links: &[CausalChainLink]) -> bool {
    links.is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::new_id;
    use crate::model::{CausalEndpointType, CausalStrength};
    use crate::text_similarity::HeuristicTextSimilarity;
    use chrono::Utc;

    fn link(cause: &str, effect: &str, confidence: f32) -> CausalLink {
        let now = Utc::now();
        CausalLink {
            id: new_id("causal"),
            cause_type: CausalEndpointType::Fact,
            cause_id: new_id("fact"),
            cause_description: cause.into(),
            effect_type: CausalEndpointType::Episode,
            effect_id: new_id("episode"),
            effect_description: effect.into(),
            mechanism: "observed".into(),
            confidence,
            evidence: vec![],
            temporal_delay: None,
            causal_strength: CausalStrength::clamped(CausalStrength::Direct, confidence),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn traces_a_multi_hop_chain_and_multiplies_confidence() {
        let store = Storage::open_in_memory().unwrap();
        let l1 = link("missed a deadline", "felt stressed about the project", 0.8);
        let l2 = link("underestimated the task", "missed a deadline", 0.9);
        store.insert_causal_link(&l1, None).unwrap();
        store.insert_causal_link(&l2, None).unwrap();

        let similarity = HeuristicTextSimilarity;
        let chain = trace(&store, &similarity, "felt stressed about the project", 5, 0.15).unwrap();

        assert_eq!(chain.links.len(), 2);
        assert!((chain.total_confidence - 0.72).abs() < 1e-4);
    }

    #[test]
    fn stops_when_no_link_matches() {
        let store = Storage::open_in_memory().unwrap();
        let similarity = HeuristicTextSimilarity;
        let chain = trace(&store, &similarity, "unrelated effect", 5, 0.15).unwrap();
        assert!(chain.links.is_empty());
        assert_eq!(chain.total_confidence, 0.0);
    }

    #[test]
    fn never_revisits_the_same_link_twice() {
        let store = Storage::open_in_memory().unwrap();
        let l1 = link("root cause", "same phrase", 0.9);
        store.insert_causal_link(&l1, None).unwrap();

        let similarity = HeuristicTextSimilarity;
        let chain = trace(&store, &similarity, "same phrase", 10, 0.15).unwrap();
        assert_eq!(chain.links.len(), 1);
    }

    #[test]
    fn respects_max_depth() {
        let store = Storage::open_in_memory().unwrap();
        let l1 = link("cause-b", "cause-a", 0.9);
        let l2 = link("cause-c", "cause-b", 0.9);
        let l3 = link("cause-d", "cause-c", 0.9);
        store.insert_causal_link(&l1, None).unwrap();
        store.insert_causal_link(&l2, None).unwrap();
        store.insert_causal_link(&l3, None).unwrap();

        let similarity = HeuristicTextSimilarity;
        let chain = trace(&store, &similarity, "cause-a", 2, 0.15).unwrap();
        assert_eq!(chain.links.len(), 2);
    }
}
