//! Hybrid search (section 4.5.2)
//!
//! `score = alpha * bm25Normalized + (1 - alpha) * vectorSimilarity`,
//! dropping anything below `minScore`, then a substring-containment
//! post-pass over active facts to catch exact matches the two indexes
//! missed (e.g. short subject/object strings FTS5 tokenizes away).

use crate::config::EngramConfig;
use crate::model::Fact;
use crate::search::{bm25, linear_combination};
use crate::search::vector::VectorIndex;
use crate::store::Storage;

#[derive(Debug, Clone)]
pub struct SearchHit {
    pub id: String,
    pub kind: bm25::RecordKind,
    pub score: f32,
}

/// Run the alpha-weighted hybrid search described in section 4.5.2.
///
/// `vector_index` should already contain the embeddings for whichever
/// record kinds are being searched; `query_embedding` is the caller's
/// already-computed embedding of `query`.
pub fn search(
    store: &Storage,
    config: &EngramConfig,
    vector_index: &VectorIndex,
    query: &str,
    query_embedding: &[f32],
    kinds: &[bm25::RecordKind],
    max_results: usize,
) -> crate::error::Result<Vec<SearchHit>> {
    let fanout = max_results.saturating_mul(2).max(max_results);

    let keyword_hits = store.with_reader_conn(|conn| bm25::search(conn, query, kinds, fanout))?;
    let keyword_pairs: Vec<(String, f32)> = keyword_hits.iter().map(|h| (h.id.clone(), h.score)).collect();

    let vector_hits = vector_index.search(query_embedding, fanout);
    let vector_pairs: Vec<(String, f32)> = vector_hits.iter().map(|h| (h.id.clone(), h.similarity)).collect();

    let fused = linear_combination(&keyword_pairs, &vector_pairs, config.hybrid_alpha, 1.0 - config.hybrid_alpha);

    let kind_of: std::collections::HashMap<String, bm25::RecordKind> =
        keyword_hits.into_iter().map(|h| (h.id, h.kind)).collect();

    let mut hits: Vec<SearchHit> = fused
        .into_iter()
        .filter(|(_, score)| *score >= config.min_score)
        .filter_map(|(id, score)| {
            let kind = kind_of.get(&id).copied().or_else(|| {
                if kinds.len() == 1 {
                    Some(kinds[0])
                } else {
                    None
                }
            })?;
            Some(SearchHit { id, kind, score })
        })
        .collect();

    // Step 4: return up to maxResults*2 ids (fanout above is only the
    // per-index candidate pool, not this cap).
    let result_cap = max_results.saturating_mul(2).max(max_results);
    hits.truncate(result_cap);

    // Step 5: always append substring matches not already present, even
    // once the fused pass already filled result_cap - otherwise a
    // just-written fact can be shadowed by older, higher-scoring hits.
    if kinds.contains(&bm25::RecordKind::Fact) {
        let seen: std::collections::HashSet<String> = hits.iter().map(|h| h.id.clone()).collect();
        let substring_hits = substring_match_facts(store, query, result_cap, &seen)?;
        hits.extend(substring_hits);
        hits.truncate(result_cap);
    }

    Ok(hits)
}

fn substring_match_facts(
    store: &Storage,
    query: &str,
    limit: usize,
    exclude: &std::collections::HashSet<String>,
) -> crate::error::Result<Vec<SearchHit>> {
    let query_lower = query.to_lowercase();
    let facts: Vec<Fact> = store.find_facts(None, None, true)?;
    let mut hits: Vec<SearchHit> = facts
        .into_iter()
        .filter(|f| !exclude.contains(&f.id))
        .filter(|f| {
            let haystack = format!("{} {} {}", f.subject, f.predicate, f.object).to_lowercase();
            haystack.contains(&query_lower) || query_lower.contains(&f.object.to_lowercase())
        })
        .map(|f| SearchHit { id: f.id, kind: bm25::RecordKind::Fact, score: 0.3 })
        .collect();
    hits.truncate(limit);
    Ok(hits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::new_id;
    use chrono::Utc;

    fn sample_fact(subject: &str, predicate: &str, object: &str) -> Fact {
        let now = Utc::now();
        Fact {
            id: new_id("fact"),
            subject: subject.into(),
            predicate: predicate.into(),
            object: object.into(),
            confidence: 0.9,
            evidence: vec![],
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

    #[test]
    fn substring_pass_finds_exact_matches_fts_might_miss() {
        let store = Storage::open_in_memory().unwrap();
        let fact = sample_fact("user", "prefers", "rust");
        store.insert_fact(&fact, None).unwrap();

        let exclude = std::collections::HashSet::new();
        let hits = substring_match_facts(&store, "rust", 5, &exclude).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, fact.id);
    }

    #[test]
    fn substring_pass_respects_exclude_set() {
        let store = Storage::open_in_memory().unwrap();
        let fact = sample_fact("user", "prefers", "rust");
        store.insert_fact(&fact, None).unwrap();

        let mut exclude = std::collections::HashSet::new();
        exclude.insert(fact.id.clone());
        let hits = substring_match_facts(&store, "rust", 5, &exclude).unwrap();
        assert!(hits.is_empty());
    }
}
