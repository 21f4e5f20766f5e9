//! C8: Integration Facade
//!
//! Owns initialization order (LLM provider -> embedding provider -> Store
//! -> indexes), one public method per use case, and a per-agent engine
//! cache so a process hosting many agents only pays store-open/index-warm
//! cost once per agent (section 4.8).

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::config::EngramConfig;
use crate::consolidation::{scheduler, ConsolidationRunner};
use crate::extractor::{ExtractionResult, Extractor};
use crate::ids::new_id;
use crate::model::{ChangeType, ConsolidationRun, Fact, MemoryChange};
use crate::providers::{EmbeddingProvider, HeuristicEmbeddingProvider, LlmProvider, RuleBasedLlmProvider};
use crate::retrieval::causal::CausalChain;
use crate::retrieval::{self, SearchHit};
use crate::search::bm25::RecordKind;
use crate::search::clusters;
use crate::search::entity::EntityIndex;
use crate::search::vector::VectorIndex;
use crate::store::{MemoryStats, Storage};
use crate::synthesis::{SynthesisEngine, SynthesisOutcome};
use crate::text_similarity::HeuristicTextSimilarity;

/// One per-agent engine instance: a store, its two providers, the
/// in-memory indexes warmed from it at open time, and the consolidation
/// runner. All public methods take `&self` — interior mutability lives
/// in the indexes' `tokio::sync::Mutex`es and in `Storage`'s own
/// connection locks.
pub struct Engine {
    store: Storage,
    llm: Arc<dyn LlmProvider>,
    embedder: Arc<dyn EmbeddingProvider>,
    config: EngramConfig,
    fact_vectors: Mutex<VectorIndex>,
    entities: Mutex<EntityIndex>,
    consolidation: ConsolidationRunner,
}

impl Engine {
    /// Open (or create) the per-agent store and warm the in-memory
    /// indexes from it. Initialization order: providers are already
    /// constructed by the caller; here it's Store -> indexes.
    pub async fn open(
        agent_id: &str,
        data_dir: Option<PathBuf>,
        llm: Arc<dyn LlmProvider>,
        embedder: Arc<dyn EmbeddingProvider>,
        config: EngramConfig,
    ) -> crate::error::Result<Self> {
        let store = Storage::open(agent_id, data_dir.as_deref())?;

        let mut fact_vectors = VectorIndex::new();
        for (id, embedding) in store.active_fact_embeddings()? {
            fact_vectors.upsert(&id, embedding);
        }

        let mut entities = EntityIndex::new();
        for fact in store.find_facts(None, None, true)? {
            entities.index_fact(&fact.id, &fact.subject, &fact.object);
        }

        let consolidation = ConsolidationRunner::new(llm.clone(), config.clone());

        Ok(Self {
            store,
            llm,
            embedder,
            config,
            fact_vectors: Mutex::new(fact_vectors),
            entities: Mutex::new(entities),
            consolidation,
        })
    }

    /// Open purely in-memory, with the default rule-based/heuristic
    /// providers — used by tests and by callers without network access.
    pub async fn open_in_memory_default() -> crate::error::Result<Self> {
        let store = Storage::open_in_memory()?;
        let config = EngramConfig::default();
        let llm: Arc<dyn LlmProvider> = Arc::new(RuleBasedLlmProvider);
        let embedder: Arc<dyn EmbeddingProvider> = Arc::new(HeuristicEmbeddingProvider::default());
        let consolidation = ConsolidationRunner::new(llm.clone(), config.clone());
        Ok(Self {
            store,
            llm,
            embedder,
            config,
            fact_vectors: Mutex::new(VectorIndex::new()),
            entities: Mutex::new(EntityIndex::new()),
            consolidation,
        })
    }

    /// Extract an Episode plus Facts/CausalLinks from a transcript,
    /// synthesize each fact against the active set, and keep the
    /// in-memory indexes current.
    pub async fn learn_from_conversation(
        &self,
        transcript: &str,
        session_id: &str,
        message_ids: Vec<String>,
        participants: Vec<String>,
    ) -> crate::error::Result<ExtractionResult> {
        let extractor = Extractor::new(self.llm.clone(), self.config.clone());
        let mut result = extractor.extract(transcript, session_id, &message_ids, &participants).await;

        let episode_embedding = self
            .embedder
            .embed_query(&format!("{} {} {}", result.episode.summary, result.episode.topic, result.episode.keywords.join(" ")))
            .await
            .ok();
        self.store.insert_episode(&result.episode, episode_embedding.as_deref())?;
        self.store.record_change(&MemoryChange {
            id: new_id("chg"),
            change_type: ChangeType::Add,
            target_type: "episode".to_string(),
            target_id: result.episode.id.clone(),
            previous_value: None,
            new_value: result.episode.summary.clone(),
            reason: "new episode".to_string(),
            trigger_episode_id: None,
            consolidation_run_id: None,
            created_at: chrono::Utc::now(),
        })?;
        if let Some(embedding) = &episode_embedding {
            clusters::assign(&self.store, &self.config, &result.episode.id, "episode", embedding, &result.episode.keywords)?;
        }

        let synthesis = SynthesisEngine::new(self.embedder.clone(), self.config.clone());
        let mut synthesized_facts = Vec::with_capacity(result.facts.len());
        for candidate in result.facts.drain(..) {
            let outcome = synthesis.synthesize(&self.store, candidate).await?;
            let fact = match outcome {
                SynthesisOutcome::Inserted { fact } => fact,
                SynthesisOutcome::Merged { fact, merged_away } => {
                    let mut entities = self.entities.lock().await;
                    for id in &merged_away {
                        entities.remove_record(id);
                    }
                    let mut vectors = self.fact_vectors.lock().await;
                    for id in &merged_away {
                        vectors.remove(id);
                    }
                    fact
                }
            };

            if let Ok(embedding) = self.embedder.embed_query(&format!("{} {} {}", fact.subject, fact.predicate, fact.object)).await {
                self.fact_vectors.lock().await.upsert(&fact.id, embedding.clone());
                clusters::assign(&self.store, &self.config, &fact.id, "fact", &embedding, &[])?;
            }
            self.entities.lock().await.index_fact(&fact.id, &fact.subject, &fact.object);
            synthesized_facts.push(fact);
        }
        result.facts = synthesized_facts;

        for link in &result.causal_links {
            let link_embedding = self
                .embedder
                .embed_query(&format!("{} {} {}", link.cause_description, link.mechanism, link.effect_description))
                .await
                .ok();
            self.store.insert_causal_link(link, link_embedding.as_deref())?;
            self.store.record_change(&MemoryChange {
                id: new_id("chg"),
                change_type: ChangeType::Add,
                target_type: "causal_link".to_string(),
                target_id: link.id.clone(),
                previous_value: None,
                new_value: format!("{} -> {}", link.cause_description, link.effect_description),
                reason: "new causal link".to_string(),
                trigger_episode_id: Some(result.episode.id.clone()),
                consolidation_run_id: None,
                created_at: chrono::Utc::now(),
            })?;
            if let Some(embedding) = &link_embedding {
                clusters::assign(&self.store, &self.config, &link.id, "causal_link", embedding, &[])?;
            }
        }

        Ok(result)
    }

    /// Insert a single user-affirmed fact directly (bypassing extraction),
    /// still running it through synthesis so duplicates merge correctly.
    pub async fn store_fact(&self, fact: Fact) -> crate::error::Result<Fact> {
        let synthesis = SynthesisEngine::new(self.embedder.clone(), self.config.clone());
        let outcome = synthesis.synthesize(&self.store, fact).await?;
        let fact = match outcome {
            SynthesisOutcome::Inserted { fact } => fact,
            SynthesisOutcome::Merged { fact, merged_away } => {
                let mut entities = self.entities.lock().await;
                for id in &merged_away {
                    entities.remove_record(id);
                }
                let mut vectors = self.fact_vectors.lock().await;
                for id in &merged_away {
                    vectors.remove(id);
                }
                fact
            }
        };
        if let Ok(embedding) = self.embedder.embed_query(&format!("{} {} {}", fact.subject, fact.predicate, fact.object)).await {
            self.fact_vectors.lock().await.upsert(&fact.id, embedding.clone());
            clusters::assign(&self.store, &self.config, &fact.id, "fact", &embedding, &[])?;
        }
        self.entities.lock().await.index_fact(&fact.id, &fact.subject, &fact.object);
        Ok(fact)
    }

    /// Alpha-weighted hybrid search over active facts (section 4.5.2).
    ///
    /// Falls back to a substring-only search when the embedding provider is
    /// unavailable (section 8 S1), rather than failing the whole query.
    pub async fn search_memories(&self, query: &str, max_results: usize) -> crate::error::Result<Vec<SearchHit>> {
        let embedding = self.embedder.embed_query(query).await.unwrap_or_default();
        let vectors = self.fact_vectors.lock().await;
        retrieval::hybrid_search::search(&self.store, &self.config, &vectors, query, &embedding, &[RecordKind::Fact], max_results)
    }

    /// Warm a candidate set ahead of an explicit query (section 4.5.4).
    pub async fn prefetch_memories(&self, message: &str) -> crate::error::Result<retrieval::PrefetchResult> {
        let entities = self.entities.lock().await;
        retrieval::prefetch(&self.store, &self.config, &entities, message)
    }

    /// Trace the causal chain behind an effect description (section 4.5.3).
    pub fn search_causal_links_by_effect(&self, effect_description: &str) -> crate::error::Result<CausalChain> {
        let similarity = HeuristicTextSimilarity;
        retrieval::trace(&self.store, &similarity, effect_description, self.config.causal_chain_max_depth, self.config.causal_chain_min_similarity)
    }

    pub fn get_stats(&self) -> crate::error::Result<MemoryStats> {
        self.store.get_stats()
    }

    /// Topic clusters that meet `minClusterSize` (section 4.4).
    pub fn valid_clusters(&self) -> crate::error::Result<Vec<crate::model::MemoryCluster>> {
        self.store.valid_clusters(self.config.min_cluster_size)
    }

    /// Bounded episode lookup (section 4.1's `queryEpisodes`).
    pub fn query_episodes(
        &self,
        limit: Option<usize>,
        from: Option<chrono::DateTime<chrono::Utc>>,
        to: Option<chrono::DateTime<chrono::Utc>>,
        topic: Option<&str>,
    ) -> crate::error::Result<Vec<crate::model::Episode>> {
        self.store.query_episodes(limit, from, to, topic)
    }

    /// Run consolidation now if `scheduler::evaluate` says it's due.
    pub async fn maybe_consolidate(&self, last_run: Option<&ConsolidationRun>, new_memories_since_last_run: u64, idle_since: Option<chrono::Duration>) -> crate::error::Result<Option<ConsolidationRun>> {
        let now = chrono::Utc::now();
        match scheduler::evaluate(&self.config, last_run, now, new_memories_since_last_run, idle_since) {
            Some(trigger) => Ok(Some(self.consolidation.run(&self.store, trigger).await?)),
            None => Ok(None),
        }
    }

    pub fn last_consolidation_run(&self) -> crate::error::Result<Option<ConsolidationRun>> {
        self.store.last_consolidation_run()
    }

    /// Run the C7 health/cleanup passes (section 4.7). When `autofix` is
    /// true, auto-retracted facts are also dropped from the in-memory
    /// vector and entity indexes so they stop surfacing in search.
    pub async fn run_cleanup(&self, autofix: bool) -> crate::error::Result<crate::health::HealthReport> {
        let report = crate::health::run(&self.store, autofix)?;
        if autofix {
            let mut vectors = self.fact_vectors.lock().await;
            let mut entities = self.entities.lock().await;
            for id in &report.auto_retracted {
                vectors.remove(id);
                entities.remove_record(id);
            }
        }
        Ok(report)
    }

    /// There is nothing to flush beyond what SQLite's WAL already
    /// guarantees on commit; `close` exists so callers have an explicit
    /// lifecycle hook matching section 4.8's public surface.
    pub fn close(self) -> crate::error::Result<()> {
        Ok(())
    }
}

/// Caches one `Engine` per agent id, so repeated lookups for the same
/// agent reuse its warmed indexes instead of reopening the store.
#[derive(Default)]
pub struct EngineRegistry {
    engines: Mutex<HashMap<String, Arc<Engine>>>,
}

impl EngineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent get-or-open: concurrent callers for the same agent id
    /// serialize on the registry lock and the second one finds the
    /// first's result already cached.
    pub async fn get_or_open(
        &self,
        agent_id: &str,
        data_dir: Option<PathBuf>,
        llm: Arc<dyn LlmProvider>,
        embedder: Arc<dyn EmbeddingProvider>,
        config: EngramConfig,
    ) -> crate::error::Result<Arc<Engine>> {
        let mut engines = self.engines.lock().await;
        if let Some(existing) = engines.get(agent_id) {
            return Ok(existing.clone());
        }
        let engine = Arc::new(Engine::open(agent_id, data_dir, llm, embedder, config).await?);
        engines.insert(agent_id.to_string(), engine.clone());
        Ok(engine)
    }

    /// Drop one agent's cached engine (or all, if `agent_id` is `None`).
    pub async fn clear_cache(&self, agent_id: Option<&str>) {
        let mut engines = self.engines.lock().await;
        match agent_id {
            Some(id) => {
                engines.remove(id);
            }
            None => engines.clear(),
        }
    }
}
