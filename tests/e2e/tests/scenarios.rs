//! End-to-end scenarios (spec section 8): one test per literal S1-S6
//! input/output pair, exercised against the real `engram-core` public
//! API rather than any mocked collaborator.

use chrono::{Duration, Utc};
use engram_core::model::{CausalEndpointType, CausalStrength};
use engram_core::search::bm25::RecordKind;
use engram_core::{CausalLink, EngramConfig, Fact, Storage, VectorIndex};

/// Every scenario runs against a real on-disk, WAL-mode SQLite file in a
/// scratch directory rather than an in-memory connection, so these tests
/// exercise the same store the engine opens in production.
fn temp_store() -> (tempfile::TempDir, Storage) {
    let dir = tempfile::tempdir().unwrap();
    let store = Storage::open("scenario-agent", Some(dir.path())).unwrap();
    (dir, store)
}

fn now_fact(subject: &str, predicate: &str, object: &str, confidence: f32, user_affirmed: bool) -> Fact {
    let now = Utc::now();
    Fact {
        id: engram_core::new_id("fact"),
        subject: subject.into(),
        predicate: predicate.into(),
        object: object.into(),
        confidence,
        evidence: vec![],
        first_seen: now,
        last_confirmed: now,
        contradictions: vec![],
        user_affirmed,
        is_active: true,
        retracted_reason: None,
        access_count: 0,
        embedding: None,
    }
}

/// S1 - Remember-recall round-trip. A fact is retrievable by a
/// paraphrased query even with no vector index populated (the
/// substring/BM25-prefix path, not an embedding match).
#[test]
fn s1_remember_recall_round_trip() {
    let (_dir, store) = temp_store();
    let config = EngramConfig::default();
    let fact = now_fact("user", "prefers", "typescript", 0.9, true);
    store.insert_fact(&fact, None).unwrap();

    let vectors = VectorIndex::new();
    let hits = engram_core::retrieval::hybrid_search::search(
        &store,
        &config,
        &vectors,
        "what does the user prefer?",
        &[],
        &[RecordKind::Fact],
        5,
    )
    .unwrap();

    assert!(!hits.is_empty());
    let top = store.get_fact(&hits[0].id).unwrap().unwrap();
    assert_eq!(top.object, "typescript");
}

/// S2 - Contradiction resolution. A later user-affirmed fact beats an
/// earlier, less confident one sharing a singular predicate.
#[test]
fn s2_contradiction_resolution() {
    let (_dir, store) = temp_store();

    let mut acme = now_fact("user", "works_at", "AcmeCo", 0.8, false);
    acme.last_confirmed = Utc::now() - Duration::hours(2);
    acme.first_seen = acme.last_confirmed;
    store.insert_fact(&acme, None).unwrap();

    let mut globex = now_fact("user", "works_at", "Globex", 0.9, true);
    globex.last_confirmed = Utc::now();
    globex.first_seen = globex.last_confirmed;
    store.insert_fact(&globex, None).unwrap();

    let resolutions = engram_core::consolidation::contradictions::resolve_all(&store, None).unwrap();
    assert_eq!(resolutions.len(), 1);
    assert_eq!(resolutions[0].winner_id, globex.id);

    let globex_after = store.get_fact(&globex.id).unwrap().unwrap();
    assert!(globex_after.is_active);

    let acme_after = store.get_fact(&acme.id).unwrap().unwrap();
    assert!(!acme_after.is_active);
    let reason = acme_after.retracted_reason.unwrap();
    assert!(reason.contains(&globex.id), "reason {reason:?} should reference the winning fact id");
}

/// S3 - Causal chain. Two linked causes are traced back from an effect
/// description, with confidences multiplied.
#[test]
fn s3_causal_chain() {
    let (_dir, store) = temp_store();
    let now = Utc::now();

    let l1 = CausalLink {
        id: engram_core::new_id("causal"),
        cause_type: CausalEndpointType::Event,
        cause_id: "injection-issues".into(),
        cause_description: "injection issues".into(),
        effect_type: CausalEndpointType::Event,
        effect_id: "switched-to-opus".into(),
        effect_description: "switched to opus".into(),
        mechanism: "reliability concerns prompted a model switch".into(),
        confidence: 0.9,
        evidence: vec![],
        temporal_delay: None,
        causal_strength: CausalStrength::Direct,
        created_at: now,
        updated_at: now,
    };
    let l2 = CausalLink {
        id: engram_core::new_id("causal"),
        cause_type: CausalEndpointType::Event,
        cause_id: "security-concerns".into(),
        cause_description: "security concerns".into(),
        effect_type: CausalEndpointType::Event,
        effect_id: "injection-issues".into(),
        effect_description: "injection issues".into(),
        mechanism: "security review surfaced injection issues".into(),
        confidence: 0.8,
        evidence: vec![],
        temporal_delay: None,
        causal_strength: CausalStrength::Contributing,
        created_at: now,
        updated_at: now,
    };
    store.insert_causal_link(&l1, None).unwrap();
    store.insert_causal_link(&l2, None).unwrap();

    let similarity = engram_core::HeuristicTextSimilarity;
    let chain = engram_core::trace(&store, &similarity, "switched to opus", 3, 0.15).unwrap();

    assert_eq!(chain.links.len(), 2);
    assert_eq!(chain.links[0].link.id, l1.id);
    assert_eq!(chain.links[1].link.id, l2.id);
    assert!((chain.total_confidence - 0.72).abs() < 1e-4);
    assert!(
        chain.explanation.starts_with("\"switched to opus\" happened because:"),
        "unexpected explanation: {}",
        chain.explanation
    );
}

/// S4 - Synthesis merge. Two near-duplicate facts with cosine-similar
/// embeddings merge into one active fact; the losing one is retracted
/// with a "merged into" reason.
#[tokio::test]
async fn s4_synthesis_merge() {
    use engram_core::providers::EmbeddingProvider;
    use std::sync::Arc;

    // Two embeddings engineered to cosine ~0.88, above the default 0.85
    // synthesis merge threshold.
    struct TwoFacts;
    #[async_trait::async_trait]
    impl EmbeddingProvider for TwoFacts {
        async fn embed_query(&self, text: &str) -> Result<Vec<f32>, String> {
            if text.contains("TypeScript") {
                Ok(vec![1.0, 0.0, 0.0])
            } else {
                Ok(vec![0.88, (1.0 - 0.88f32 * 0.88).sqrt(), 0.0])
            }
        }
        fn dimension(&self) -> usize {
            3
        }
        fn name(&self) -> &str {
            "two-facts-test-embedder"
        }
    }

    let (_dir, store) = temp_store();
    let embedder: Arc<dyn EmbeddingProvider> = Arc::new(TwoFacts);
    let engine = engram_core::SynthesisEngine::new(embedder, EngramConfig::default());

    let first = now_fact("user", "prefers", "TypeScript", 0.8, false);
    let outcome = engine.synthesize(&store, first.clone()).await.unwrap();
    assert!(matches!(outcome, engram_core::SynthesisOutcome::Inserted { .. }));

    let second = now_fact("user", "prefers", "TS", 0.7, false);
    let outcome = engine.synthesize(&store, second).await.unwrap();
    let (merged, merged_away) = match outcome {
        engram_core::SynthesisOutcome::Merged { fact, merged_away } => (fact, merged_away),
        engram_core::SynthesisOutcome::Inserted { .. } => panic!("expected a merge"),
    };
    assert_eq!(merged_away, vec![first.id.clone()]);

    let stats = store.get_stats().unwrap();
    assert_eq!(stats.active_fact_count, 1);
    assert_eq!(stats.retracted_fact_count, 1);

    let retracted = store.get_fact(&first.id).unwrap().unwrap();
    assert!(!retracted.is_active);
    assert!(retracted.retracted_reason.unwrap().starts_with("merged into"));
    let merged_in_store = store.get_fact(&merged.id).unwrap().unwrap();
    assert!(merged_in_store.is_active);
}

/// S5 - Consolidation forgetting. Thirty untouched, stale episodes with
/// no causal references are pruned by a consolidation run but remain in
/// the audit trail.
#[tokio::test]
async fn s5_consolidation_forgetting() {
    use engram_core::model::{Episode, Ttl};
    use engram_core::providers::{LlmProvider, RuleBasedLlmProvider};
    use std::sync::Arc;

    let (_dir, store) = temp_store();
    let config = EngramConfig::default();
    let stale_timestamp = Utc::now() - Duration::days(config.stale_days + 30);

    let mut episode_ids = Vec::new();
    for i in 0..30 {
        let episode = Episode {
            id: engram_core::new_id("ep"),
            timestamp: stale_timestamp,
            summary: format!("stale episode {i}"),
            participants: vec!["user".into()],
            topic: "misc".into(),
            keywords: vec![],
            emotional_salience: 0.0,
            utility_score: 0.0,
            source_session_id: "session-old".into(),
            source_message_ids: vec![],
            ttl: Ttl::Permanent,
            access_count: 0,
            last_accessed_at: None,
            created_at: stale_timestamp,
            updated_at: stale_timestamp,
        };
        episode_ids.push(episode.id.clone());
        store.insert_episode(&episode, None).unwrap();
    }

    let llm: Arc<dyn LlmProvider> = Arc::new(RuleBasedLlmProvider);
    let runner = engram_core::ConsolidationRunner::new(llm, config);
    let run = runner
        .run(&store, engram_core::model::ConsolidationTrigger::InitialConsolidation)
        .await
        .unwrap();

    assert_eq!(run.status, engram_core::model::ConsolidationStatus::Completed);
    assert!(run.items_pruned >= 30, "expected all 30 stale episodes pruned, got {}", run.items_pruned);

    let remaining = store.all_episodes().unwrap();
    for id in &episode_ids {
        assert!(!remaining.iter().any(|e| &e.id == id), "episode {id} should have been forgotten");
        let changes = store.changes_for_target("episode", id).unwrap();
        assert!(changes.iter().any(|c| matches!(c.change_type, engram_core::model::ChangeType::Retract)));
    }
}

/// S6 - Health auto-cleanup. Ten meaningless-object facts under the
/// same predicate are all auto-retracted, with an audited reason
/// prefixed "auto-cleanup", and the health score improves.
#[test]
fn s6_health_auto_cleanup() {
    let (_dir, store) = temp_store();

    for i in 0..10 {
        let fact = now_fact("user", "prefers", "it", 0.9 - i as f32 * 0.01, false);
        store.insert_fact(&fact, None).unwrap();
    }
    // One healthy fact so the pre-cleanup score isn't already 100.
    let healthy = now_fact("user", "uses", "rust programming language", 0.9, true);
    store.insert_fact(&healthy, None).unwrap();

    let before = engram_core::health::run(&store, false).unwrap();
    let after = engram_core::health::run(&store, true).unwrap();

    assert_eq!(after.auto_retracted.len(), 10);
    assert!(after.score >= before.score);

    for fact in store.find_facts(None, None, true).unwrap() {
        assert_ne!(fact.object, "it");
    }

    let mut retract_rows = 0;
    for id in &after.auto_retracted {
        let changes = store.changes_for_target("fact", id).unwrap();
        assert!(changes.iter().any(|c| matches!(c.change_type, engram_core::model::ChangeType::Retract) && c.reason.starts_with("auto-cleanup")));
        retract_rows += 1;
    }
    assert_eq!(retract_rows, 10);
}
