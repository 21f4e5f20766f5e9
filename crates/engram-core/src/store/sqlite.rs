//! SQLite-backed durable store (section 3/7, "C1 Schema & Store")
//!
//! `Storage` takes `&self` everywhere, so the engine can share one
//! `Arc<Storage>` per agent instead of wrapping the whole store in a
//! `Mutex` (the teacher's `storage/sqlite.rs` rationale, kept verbatim
//! here). For a file-backed store, reads and writes run on two separate
//! WAL-mode connections so a long read never blocks a writer (and vice
//! versa); an in-memory store has no second handle that can see the
//! writer's uncommitted-to-disk state, so both sides route through the
//! same connection and the writer mutex.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use directories::ProjectDirs;
use rusqlite::{params, Connection, OptionalExtension};

use crate::model::{
    CausalEndpointType, CausalLink, CausalStrength, ChangeType, ConsolidationRun,
    ConsolidationStatus, ConsolidationTrigger, Episode, Fact, MemoryChange, MemoryCluster,
    Procedure, Ttl,
};

/// Failure modes of the durable store. A `Database` error always means the
/// triggering statement (and its transaction, where one was open) rolled
/// back; no index update was ever issued for it.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("initialization error: {0}")]
    Init(String),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// Aggregate counts surfaced by `getStats` (section 4.7 / C7).
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryStats {
    pub episode_count: u64,
    pub active_fact_count: u64,
    pub retracted_fact_count: u64,
    pub causal_link_count: u64,
    pub procedure_count: u64,
    pub cluster_count: u64,
    pub consolidation_run_count: u64,
}

pub struct Storage {
    writer: Mutex<Connection>,
    reader: Mutex<Connection>,
    /// `false` for `open_in_memory`, where `reader` has no visibility into
    /// `writer`'s state and reads must be routed through the writer lock.
    file_backed: bool,
}

impl Storage {
    fn configure_connection(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA cache_size = -64000;
             PRAGMA temp_store = MEMORY;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )?;
        Ok(())
    }

    /// Resolve the per-agent database path. `data_dir` overrides the
    /// platform default from `directories::ProjectDirs`.
    fn resolve_path(agent_id: &str, data_dir: Option<&Path>) -> Result<PathBuf> {
        let dir = match data_dir {
            Some(p) => p.to_path_buf(),
            None => {
                let proj_dirs = ProjectDirs::from("com", "engram", "core")
                    .ok_or_else(|| StorageError::Init("no home directory".into()))?;
                proj_dirs.data_dir().to_path_buf()
            }
        };
        std::fs::create_dir_all(&dir)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = std::fs::set_permissions(&dir, std::fs::Permissions::from_mode(0o700));
        }
        let sanitized: String = agent_id
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        Ok(dir.join(format!("{sanitized}.db")))
    }

    /// Open (creating if needed) the store for one agent.
    pub fn open(agent_id: &str, data_dir: Option<&Path>) -> Result<Self> {
        let path = Self::resolve_path(agent_id, data_dir)?;

        let writer_conn = Connection::open(&path)?;
        #[cfg(unix)]
        if path.exists() {
            use std::os::unix::fs::PermissionsExt;
            let _ = std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600));
        }
        Self::configure_connection(&writer_conn)?;
        super::migrations::apply_migrations(&writer_conn)?;

        let reader_conn = Connection::open(&path)?;
        Self::configure_connection(&reader_conn)?;

        Ok(Self {
            writer: Mutex::new(writer_conn),
            reader: Mutex::new(reader_conn),
            file_backed: true,
        })
    }

    /// In-memory store, used by tests and by callers that don't want a
    /// file (section 8 test scenarios run against this).
    pub fn open_in_memory() -> Result<Self> {
        let writer_conn = Connection::open_in_memory()?;
        Self::configure_connection(&writer_conn)?;
        super::migrations::apply_migrations(&writer_conn)?;
        let reader_conn = Connection::open_in_memory()?;
        Self::configure_connection(&reader_conn)?;
        // Attach the writer's memory db isn't possible across separate
        // in-memory handles, so route reads through the writer lock too.
        Ok(Self {
            reader: Mutex::new(reader_conn),
            writer: Mutex::new(writer_conn),
            file_backed: false,
        })
    }

    fn writer(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.writer.lock().expect("writer lock poisoned")
    }

    fn reader(&self) -> std::sync::MutexGuard<'_, Connection> {
        if self.file_backed {
            self.reader.lock().expect("reader lock poisoned")
        } else {
            // in-memory stores have no independent reader state to see
            // writer commits, so route everything through the writer
            // connection.
            self.writer.lock().expect("writer lock poisoned")
        }
    }

    /// Run a raw read against the backing connection. Used by the C4
    /// index modules (`search::bm25`) that need direct SQL access (FTS5
    /// queries) rather than a typed accessor.
    pub fn with_reader_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<T>,
    {
        let conn = self.reader();
        f(&conn).map_err(StorageError::from)
    }

    // ---------------------------------------------------------------
    // embeddings
    // ---------------------------------------------------------------

    fn embedding_to_blob(v: &[f32]) -> Vec<u8> {
        v.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    fn blob_to_embedding(blob: &[u8]) -> Vec<f32> {
        blob.chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }

    // ---------------------------------------------------------------
    // episodes
    // ---------------------------------------------------------------

    pub fn insert_episode(&self, episode: &Episode, embedding: Option<&[f32]>) -> Result<()> {
        let conn = self.writer();
        conn.execute(
            "INSERT INTO episodes (
                id, timestamp, summary, participants, topic, keywords,
                emotional_salience, utility_score, source_session_id,
                source_message_ids, ttl, access_count, last_accessed_at,
                created_at, updated_at
            ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15)",
            params![
                episode.id,
                episode.timestamp.to_rfc3339(),
                episode.summary,
                serde_json::to_string(&episode.participants)?,
                episode.topic,
                serde_json::to_string(&episode.keywords)?,
                episode.emotional_salience,
                episode.utility_score,
                episode.source_session_id,
                serde_json::to_string(&episode.source_message_ids)?,
                episode.ttl.as_str(),
                episode.access_count,
                episode.last_accessed_at.map(|t| t.to_rfc3339()),
                episode.created_at.to_rfc3339(),
                episode.updated_at.to_rfc3339(),
            ],
        )?;
        if let Some(emb) = embedding {
            conn.execute(
                "INSERT INTO episode_embeddings (episode_id, embedding, dimensions)
                 VALUES (?1, ?2, ?3)",
                params![episode.id, Self::embedding_to_blob(emb), emb.len() as i64],
            )?;
        }
        Ok(())
    }

    pub fn get_episode(&self, id: &str) -> Result<Option<Episode>> {
        let conn = self.reader();
        conn.query_row(
            "SELECT id, timestamp, summary, participants, topic, keywords,
                    emotional_salience, utility_score, source_session_id,
                    source_message_ids, ttl, access_count, last_accessed_at,
                    created_at, updated_at
             FROM episodes WHERE id = ?1",
            params![id],
            row_to_episode,
        )
        .optional()
        .map_err(StorageError::from)
    }

    pub fn episode_embedding(&self, id: &str) -> Result<Option<Vec<f32>>> {
        let conn = self.reader();
        let blob: Option<Vec<u8>> = conn
            .query_row(
                "SELECT embedding FROM episode_embeddings WHERE episode_id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(blob.map(|b| Self::blob_to_embedding(&b)))
    }

    /// Most recent episodes, optionally scoped to a session (used by
    /// prefetch's "last 5 episodes" step, section 4.5.4).
    pub fn recent_episodes(&self, limit: usize, session_id: Option<&str>) -> Result<Vec<Episode>> {
        let conn = self.reader();
        let mut rows = Vec::new();
        let sql_base = "SELECT id, timestamp, summary, participants, topic, keywords,
                    emotional_salience, utility_score, source_session_id,
                    source_message_ids, ttl, access_count, last_accessed_at,
                    created_at, updated_at FROM episodes";
        if let Some(session_id) = session_id {
            let mut stmt = conn.prepare(&format!(
                "{sql_base} WHERE source_session_id = ?1 ORDER BY timestamp DESC LIMIT ?2"
            ))?;
            let mapped = stmt.query_map(params![session_id, limit as i64], row_to_episode)?;
            for r in mapped {
                rows.push(r?);
            }
        } else {
            let mut stmt = conn.prepare(&format!("{sql_base} ORDER BY timestamp DESC LIMIT ?1"))?;
            let mapped = stmt.query_map(params![limit as i64], row_to_episode)?;
            for r in mapped {
                rows.push(r?);
            }
        }
        Ok(rows)
    }

    /// General-purpose episode query (section 4.1's `queryEpisodes`):
    /// optionally bounded by time range and/or topic, newest first,
    /// optionally capped at `limit`.
    pub fn query_episodes(
        &self,
        limit: Option<usize>,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
        topic: Option<&str>,
    ) -> Result<Vec<Episode>> {
        let conn = self.reader();
        let mut sql = String::from(
            "SELECT id, timestamp, summary, participants, topic, keywords,
                    emotional_salience, utility_score, source_session_id,
                    source_message_ids, ttl, access_count, last_accessed_at,
                    created_at, updated_at FROM episodes WHERE 1=1",
        );
        let mut bound: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
        if let Some(from) = from {
            sql.push_str(&format!(" AND timestamp >= ?{}", bound.len() + 1));
            bound.push(Box::new(from.to_rfc3339()));
        }
        if let Some(to) = to {
            sql.push_str(&format!(" AND timestamp <= ?{}", bound.len() + 1));
            bound.push(Box::new(to.to_rfc3339()));
        }
        if let Some(topic) = topic {
            sql.push_str(&format!(" AND topic = ?{}", bound.len() + 1));
            bound.push(Box::new(topic.to_string()));
        }
        sql.push_str(" ORDER BY timestamp DESC");
        if let Some(limit) = limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }
        let mut stmt = conn.prepare(&sql)?;
        let param_refs: Vec<&dyn rusqlite::ToSql> = bound.iter().map(|b| b.as_ref()).collect();
        let mapped = stmt.query_map(param_refs.as_slice(), row_to_episode)?;
        let mut out = Vec::new();
        for r in mapped {
            out.push(r?);
        }
        Ok(out)
    }

    pub fn touch_episode_access(&self, id: &str, at: DateTime<Utc>) -> Result<()> {
        self.writer().execute(
            "UPDATE episodes SET access_count = access_count + 1, last_accessed_at = ?2
             WHERE id = ?1",
            params![id, at.to_rfc3339()],
        )?;
        Ok(())
    }

    /// All episodes past their TTL, for `C7`/consolidation forgetting scans.
    pub fn all_episodes(&self) -> Result<Vec<Episode>> {
        let conn = self.reader();
        let mut stmt = conn.prepare(
            "SELECT id, timestamp, summary, participants, topic, keywords,
                    emotional_salience, utility_score, source_session_id,
                    source_message_ids, ttl, access_count, last_accessed_at,
                    created_at, updated_at FROM episodes",
        )?;
        let mapped = stmt.query_map([], row_to_episode)?;
        let mut out = Vec::new();
        for r in mapped {
            out.push(r?);
        }
        Ok(out)
    }

    pub fn delete_episode(&self, id: &str) -> Result<()> {
        self.writer()
            .execute("DELETE FROM episodes WHERE id = ?1", params![id])?;
        Ok(())
    }

    // ---------------------------------------------------------------
    // facts
    // ---------------------------------------------------------------

    pub fn insert_fact(&self, fact: &Fact, embedding: Option<&[f32]>) -> Result<()> {
        let conn = self.writer();
        conn.execute(
            "INSERT INTO facts (
                id, subject, predicate, object, confidence, evidence,
                first_seen, last_confirmed, contradictions, user_affirmed,
                is_active, retracted_reason, access_count
            ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13)",
            params![
                fact.id,
                fact.subject,
                fact.predicate,
                fact.object,
                fact.confidence,
                serde_json::to_string(&fact.evidence)?,
                fact.first_seen.to_rfc3339(),
                fact.last_confirmed.to_rfc3339(),
                serde_json::to_string(&fact.contradictions)?,
                fact.user_affirmed,
                fact.is_active,
                fact.retracted_reason,
                fact.access_count,
            ],
        )?;
        if let Some(emb) = embedding {
            conn.execute(
                "INSERT INTO fact_embeddings (fact_id, embedding, dimensions)
                 VALUES (?1, ?2, ?3)",
                params![fact.id, Self::embedding_to_blob(emb), emb.len() as i64],
            )?;
        }
        Ok(())
    }

    pub fn get_fact(&self, id: &str) -> Result<Option<Fact>> {
        let conn = self.reader();
        conn.query_row(
            "SELECT id, subject, predicate, object, confidence, evidence,
                    first_seen, last_confirmed, contradictions, user_affirmed,
                    is_active, retracted_reason, access_count
             FROM facts WHERE id = ?1",
            params![id],
            row_to_fact,
        )
        .optional()
        .map_err(StorageError::from)
    }

    pub fn fact_embedding(&self, id: &str) -> Result<Option<Vec<f32>>> {
        let conn = self.reader();
        let blob: Option<Vec<u8>> = conn
            .query_row(
                "SELECT embedding FROM fact_embeddings WHERE fact_id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(blob.map(|b| Self::blob_to_embedding(&b)))
    }

    /// Find facts by subject/predicate (either may be omitted), optionally
    /// restricted to active facts. Used by C3 synthesis to fetch merge
    /// candidates and by C8's `findFacts` facade method.
    pub fn find_facts(
        &self,
        subject: Option<&str>,
        predicate: Option<&str>,
        active_only: bool,
    ) -> Result<Vec<Fact>> {
        let conn = self.reader();
        let mut sql = String::from(
            "SELECT id, subject, predicate, object, confidence, evidence,
                    first_seen, last_confirmed, contradictions, user_affirmed,
                    is_active, retracted_reason, access_count FROM facts WHERE 1=1",
        );
        if subject.is_some() {
            sql.push_str(" AND subject = ?1");
        }
        if predicate.is_some() {
            sql.push_str(if subject.is_some() { " AND predicate = ?2" } else { " AND predicate = ?1" });
        }
        if active_only {
            sql.push_str(" AND is_active = 1");
        }
        let mut stmt = conn.prepare(&sql)?;
        let rows = match (subject, predicate) {
            (Some(s), Some(p)) => stmt.query_map(params![s, p], row_to_fact)?,
            (Some(s), None) => stmt.query_map(params![s], row_to_fact)?,
            (None, Some(p)) => stmt.query_map(params![p], row_to_fact)?,
            (None, None) => stmt.query_map([], row_to_fact)?,
        };
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    /// All active facts that carry an embedding, for C3's candidate scan.
    pub fn active_fact_embeddings(&self) -> Result<Vec<(String, Vec<f32>)>> {
        let conn = self.reader();
        let mut stmt = conn.prepare(
            "SELECT fe.fact_id, fe.embedding FROM fact_embeddings fe
             JOIN facts f ON f.id = fe.fact_id WHERE f.is_active = 1",
        )?;
        let rows = stmt.query_map([], |row| {
            let id: String = row.get(0)?;
            let blob: Vec<u8> = row.get(1)?;
            Ok((id, blob))
        })?;
        let mut out = Vec::new();
        for r in rows {
            let (id, blob) = r?;
            out.push((id, Self::blob_to_embedding(&blob)));
        }
        Ok(out)
    }

    pub fn all_facts(&self) -> Result<Vec<Fact>> {
        let conn = self.reader();
        let mut stmt = conn.prepare(
            "SELECT id, subject, predicate, object, confidence, evidence,
                    first_seen, last_confirmed, contradictions, user_affirmed,
                    is_active, retracted_reason, access_count FROM facts",
        )?;
        let mapped = stmt.query_map([], row_to_fact)?;
        let mut out = Vec::new();
        for r in mapped {
            out.push(r?);
        }
        Ok(out)
    }

    pub fn update_fact(&self, fact: &Fact) -> Result<()> {
        self.writer().execute(
            "UPDATE facts SET confidence = ?2, evidence = ?3, last_confirmed = ?4,
                contradictions = ?5, user_affirmed = ?6, is_active = ?7,
                retracted_reason = ?8, access_count = ?9
             WHERE id = ?1",
            params![
                fact.id,
                fact.confidence,
                serde_json::to_string(&fact.evidence)?,
                fact.last_confirmed.to_rfc3339(),
                serde_json::to_string(&fact.contradictions)?,
                fact.user_affirmed,
                fact.is_active,
                fact.retracted_reason,
                fact.access_count,
            ],
        )?;
        Ok(())
    }

    pub fn retract_fact(&self, id: &str, reason: &str) -> Result<()> {
        let affected = self.writer().execute(
            "UPDATE facts SET is_active = 0, retracted_reason = ?2 WHERE id = ?1",
            params![id, reason],
        )?;
        if affected == 0 {
            return Err(StorageError::NotFound(id.to_string()));
        }
        Ok(())
    }

    pub fn touch_fact_access(&self, id: &str) -> Result<()> {
        self.writer().execute(
            "UPDATE facts SET access_count = access_count + 1 WHERE id = ?1",
            params![id],
        )?;
        Ok(())
    }

    // ---------------------------------------------------------------
    // causal links
    // ---------------------------------------------------------------

    pub fn insert_causal_link(&self, link: &CausalLink, embedding: Option<&[f32]>) -> Result<()> {
        let conn = self.writer();
        conn.execute(
            "INSERT INTO causal_links (
                id, cause_type, cause_id, cause_description, effect_type,
                effect_id, effect_description, mechanism, confidence,
                evidence, temporal_delay, causal_strength, created_at, updated_at
            ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14)",
            params![
                link.id,
                causal_endpoint_str(link.cause_type),
                link.cause_id,
                link.cause_description,
                causal_endpoint_str(link.effect_type),
                link.effect_id,
                link.effect_description,
                link.mechanism,
                link.confidence,
                serde_json::to_string(&link.evidence)?,
                link.temporal_delay,
                causal_strength_str(link.causal_strength),
                link.created_at.to_rfc3339(),
                link.updated_at.to_rfc3339(),
            ],
        )?;
        if let Some(emb) = embedding {
            conn.execute(
                "INSERT INTO causal_link_embeddings (causal_link_id, embedding, dimensions)
                 VALUES (?1, ?2, ?3)",
                params![link.id, Self::embedding_to_blob(emb), emb.len() as i64],
            )?;
        }
        Ok(())
    }

    pub fn causal_link_embedding(&self, id: &str) -> Result<Option<Vec<f32>>> {
        let conn = self.reader();
        let blob: Option<Vec<u8>> = conn
            .query_row(
                "SELECT embedding FROM causal_link_embeddings WHERE causal_link_id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(blob.map(|b| Self::blob_to_embedding(&b)))
    }

    /// Links whose effect id matches, for C5's causal-chain traversal
    /// (walking backward from an effect to its causes).
    pub fn find_causal_links_by_effect(&self, effect_id: &str) -> Result<Vec<CausalLink>> {
        let conn = self.reader();
        let mut stmt = conn.prepare(
            "SELECT id, cause_type, cause_id, cause_description, effect_type,
                    effect_id, effect_description, mechanism, confidence,
                    evidence, temporal_delay, causal_strength, created_at, updated_at
             FROM causal_links WHERE effect_id = ?1",
        )?;
        let mapped = stmt.query_map(params![effect_id], row_to_causal_link)?;
        let mut out = Vec::new();
        for r in mapped {
            out.push(r?);
        }
        Ok(out)
    }

    pub fn all_causal_links(&self) -> Result<Vec<CausalLink>> {
        let conn = self.reader();
        let mut stmt = conn.prepare(
            "SELECT id, cause_type, cause_id, cause_description, effect_type,
                    effect_id, effect_description, mechanism, confidence,
                    evidence, temporal_delay, causal_strength, created_at, updated_at
             FROM causal_links",
        )?;
        let mapped = stmt.query_map([], row_to_causal_link)?;
        let mut out = Vec::new();
        for r in mapped {
            out.push(r?);
        }
        Ok(out)
    }

    // ---------------------------------------------------------------
    // procedures
    // ---------------------------------------------------------------

    pub fn insert_procedure(&self, procedure: &Procedure) -> Result<()> {
        self.writer().execute(
            "INSERT INTO procedures (
                id, trigger, action, expected_outcome, examples, times_used,
                times_succeeded, tags, created_at, updated_at
            ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10)",
            params![
                procedure.id,
                procedure.trigger,
                procedure.action,
                procedure.expected_outcome,
                serde_json::to_string(&procedure.examples)?,
                procedure.times_used,
                procedure.times_succeeded,
                serde_json::to_string(&procedure.tags)?,
                procedure.created_at.to_rfc3339(),
                procedure.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn all_procedures(&self) -> Result<Vec<Procedure>> {
        let conn = self.reader();
        let mut stmt = conn.prepare(
            "SELECT id, trigger, action, expected_outcome, examples, times_used,
                    times_succeeded, tags, created_at, updated_at FROM procedures",
        )?;
        let mapped = stmt.query_map([], row_to_procedure)?;
        let mut out = Vec::new();
        for r in mapped {
            out.push(r?);
        }
        Ok(out)
    }

    /// `times_used` always increments; `times_succeeded` only on success.
    pub fn record_procedure_use(&self, id: &str, succeeded: bool) -> Result<()> {
        let sql = if succeeded {
            "UPDATE procedures SET times_used = times_used + 1,
                times_succeeded = times_succeeded + 1, updated_at = ?2 WHERE id = ?1"
        } else {
            "UPDATE procedures SET times_used = times_used + 1, updated_at = ?2 WHERE id = ?1"
        };
        self.writer()
            .execute(sql, params![id, Utc::now().to_rfc3339()])?;
        Ok(())
    }

    // ---------------------------------------------------------------
    // clusters
    // ---------------------------------------------------------------

    pub fn insert_cluster(&self, cluster: &MemoryCluster) -> Result<()> {
        self.writer().execute(
            "INSERT INTO memory_clusters (
                id, centroid, dimensions, member_ids, member_types, theme,
                keywords, last_timestamp, created_at, updated_at
            ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10)",
            params![
                cluster.id,
                Self::embedding_to_blob(&cluster.centroid),
                cluster.centroid.len() as i64,
                serde_json::to_string(&cluster.member_ids)?,
                serde_json::to_string(&cluster.member_types)?,
                cluster.theme,
                serde_json::to_string(&cluster.keywords)?,
                cluster.last_timestamp.to_rfc3339(),
                cluster.created_at.to_rfc3339(),
                cluster.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn update_cluster(&self, cluster: &MemoryCluster) -> Result<()> {
        self.writer().execute(
            "UPDATE memory_clusters SET centroid = ?2, dimensions = ?3,
                member_ids = ?4, member_types = ?5, theme = ?6, keywords = ?7,
                last_timestamp = ?8, updated_at = ?9 WHERE id = ?1",
            params![
                cluster.id,
                Self::embedding_to_blob(&cluster.centroid),
                cluster.centroid.len() as i64,
                serde_json::to_string(&cluster.member_ids)?,
                serde_json::to_string(&cluster.member_types)?,
                cluster.theme,
                serde_json::to_string(&cluster.keywords)?,
                cluster.last_timestamp.to_rfc3339(),
                cluster.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn delete_cluster(&self, id: &str) -> Result<()> {
        self.writer()
            .execute("DELETE FROM memory_clusters WHERE id = ?1", params![id])?;
        Ok(())
    }

    pub fn all_clusters(&self) -> Result<Vec<MemoryCluster>> {
        let conn = self.reader();
        let mut stmt = conn.prepare(
            "SELECT id, centroid, member_ids, member_types, theme, keywords,
                    last_timestamp, created_at, updated_at FROM memory_clusters",
        )?;
        let mapped = stmt.query_map([], row_to_cluster)?;
        let mut out = Vec::new();
        for r in mapped {
            out.push(r?);
        }
        Ok(out)
    }

    /// Clusters with at least `min_size` members (section 4.4: "a cluster
    /// is valid only with >= minClusterSize members"). Below-threshold
    /// clusters are still held in the table, just excluded here.
    pub fn valid_clusters(&self, min_size: usize) -> Result<Vec<MemoryCluster>> {
        Ok(self
            .all_clusters()?
            .into_iter()
            .filter(|c| c.member_ids.len() >= min_size)
            .collect())
    }

    // ---------------------------------------------------------------
    // audit log
    // ---------------------------------------------------------------

    pub fn record_change(&self, change: &MemoryChange) -> Result<()> {
        self.writer().execute(
            "INSERT INTO memory_changes (
                id, change_type, target_type, target_id, previous_value,
                new_value, reason, trigger_episode_id, consolidation_run_id, created_at
            ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10)",
            params![
                change.id,
                change_type_str(change.change_type),
                change.target_type,
                change.target_id,
                change.previous_value,
                change.new_value,
                change.reason,
                change.trigger_episode_id,
                change.consolidation_run_id,
                change.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn changes_for_target(&self, target_type: &str, target_id: &str) -> Result<Vec<MemoryChange>> {
        let conn = self.reader();
        let mut stmt = conn.prepare(
            "SELECT id, change_type, target_type, target_id, previous_value, new_value,
                    reason, trigger_episode_id, consolidation_run_id, created_at
             FROM memory_changes WHERE target_type = ?1 AND target_id = ?2
             ORDER BY created_at ASC",
        )?;
        let mapped = stmt.query_map(params![target_type, target_id], row_to_change)?;
        let mut out = Vec::new();
        for r in mapped {
            out.push(r?);
        }
        Ok(out)
    }

    // ---------------------------------------------------------------
    // consolidation runs
    // ---------------------------------------------------------------

    pub fn insert_consolidation_run(&self, run: &ConsolidationRun) -> Result<()> {
        self.writer().execute(
            "INSERT INTO consolidation_runs (
                id, trigger, status, started_at, finished_at,
                items_extracted, items_resolved, items_pruned
            ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8)",
            params![
                run.id,
                consolidation_trigger_str(run.trigger),
                consolidation_status_str(run.status),
                run.started_at.to_rfc3339(),
                run.finished_at.map(|t| t.to_rfc3339()),
                run.items_extracted,
                run.items_resolved,
                run.items_pruned,
            ],
        )?;
        Ok(())
    }

    pub fn update_consolidation_run(&self, run: &ConsolidationRun) -> Result<()> {
        self.writer().execute(
            "UPDATE consolidation_runs SET status = ?2, finished_at = ?3,
                items_extracted = ?4, items_resolved = ?5, items_pruned = ?6
             WHERE id = ?1",
            params![
                run.id,
                consolidation_status_str(run.status),
                run.finished_at.map(|t| t.to_rfc3339()),
                run.items_extracted,
                run.items_resolved,
                run.items_pruned,
            ],
        )?;
        Ok(())
    }

    pub fn last_consolidation_run(&self) -> Result<Option<ConsolidationRun>> {
        let conn = self.reader();
        conn.query_row(
            "SELECT id, trigger, status, started_at, finished_at,
                    items_extracted, items_resolved, items_pruned
             FROM consolidation_runs ORDER BY started_at DESC LIMIT 1",
            [],
            row_to_run,
        )
        .optional()
        .map_err(StorageError::from)
    }

    // ---------------------------------------------------------------
    // stats
    // ---------------------------------------------------------------

    pub fn get_stats(&self) -> Result<MemoryStats> {
        let conn = self.reader();
        let count = |sql: &str| -> Result<u64> {
            Ok(conn.query_row(sql, [], |r| r.get::<_, i64>(0))? as u64)
        };
        Ok(MemoryStats {
            episode_count: count("SELECT COUNT(*) FROM episodes")?,
            active_fact_count: count("SELECT COUNT(*) FROM facts WHERE is_active = 1")?,
            retracted_fact_count: count("SELECT COUNT(*) FROM facts WHERE is_active = 0")?,
            causal_link_count: count("SELECT COUNT(*) FROM causal_links")?,
            procedure_count: count("SELECT COUNT(*) FROM procedures")?,
            cluster_count: count("SELECT COUNT(*) FROM memory_clusters")?,
            consolidation_run_count: count("SELECT COUNT(*) FROM consolidation_runs")?,
        })
    }
}

fn row_to_episode(row: &rusqlite::Row) -> rusqlite::Result<Episode> {
    let ttl: String = row.get(10)?;
    let last_accessed: Option<String> = row.get(12)?;
    Ok(Episode {
        id: row.get(0)?,
        timestamp: parse_dt(row, 1)?,
        summary: row.get(2)?,
        participants: parse_json(row, 3)?,
        topic: row.get(4)?,
        keywords: parse_json(row, 5)?,
        emotional_salience: row.get(6)?,
        utility_score: row.get(7)?,
        source_session_id: row.get(8)?,
        source_message_ids: parse_json(row, 9)?,
        ttl: Ttl::parse(&ttl),
        access_count: row.get(11)?,
        last_accessed_at: last_accessed.map(|s| parse_rfc3339(&s)).transpose()?,
        created_at: parse_dt(row, 13)?,
        updated_at: parse_dt(row, 14)?,
    })
}

fn row_to_fact(row: &rusqlite::Row) -> rusqlite::Result<Fact> {
    Ok(Fact {
        id: row.get(0)?,
        subject: row.get(1)?,
        predicate: row.get(2)?,
        object: row.get(3)?,
        confidence: row.get(4)?,
        evidence: parse_json(row, 5)?,
        first_seen: parse_dt(row, 6)?,
        last_confirmed: parse_dt(row, 7)?,
        contradictions: parse_json(row, 8)?,
        user_affirmed: row.get(9)?,
        is_active: row.get(10)?,
        retracted_reason: row.get(11)?,
        access_count: row.get(12)?,
        embedding: None,
    })
}

fn row_to_causal_link(row: &rusqlite::Row) -> rusqlite::Result<CausalLink> {
    let cause_type: String = row.get(1)?;
    let effect_type: String = row.get(4)?;
    let strength: String = row.get(11)?;
    Ok(CausalLink {
        id: row.get(0)?,
        cause_type: parse_endpoint_type(&cause_type),
        cause_id: row.get(2)?,
        cause_description: row.get(3)?,
        effect_type: parse_endpoint_type(&effect_type),
        effect_id: row.get(5)?,
        effect_description: row.get(6)?,
        mechanism: row.get(7)?,
        confidence: row.get(8)?,
        evidence: parse_json(row, 9)?,
        temporal_delay: row.get(10)?,
        causal_strength: if strength == "direct" {
            CausalStrength::Direct
        } else {
            CausalStrength::Contributing
        },
        created_at: parse_dt(row, 12)?,
        updated_at: parse_dt(row, 13)?,
    })
}

fn row_to_procedure(row: &rusqlite::Row) -> rusqlite::Result<Procedure> {
    Ok(Procedure {
        id: row.get(0)?,
        trigger: row.get(1)?,
        action: row.get(2)?,
        expected_outcome: row.get(3)?,
        examples: parse_json(row, 4)?,
        times_used: row.get(5)?,
        times_succeeded: row.get(6)?,
        tags: parse_json(row, 7)?,
        created_at: parse_dt(row, 8)?,
        updated_at: parse_dt(row, 9)?,
    })
}

fn row_to_cluster(row: &rusqlite::Row) -> rusqlite::Result<MemoryCluster> {
    let centroid_blob: Vec<u8> = row.get(1)?;
    Ok(MemoryCluster {
        id: row.get(0)?,
        centroid: centroid_blob
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
        member_ids: parse_json(row, 2)?,
        member_types: parse_json(row, 3)?,
        theme: row.get(4)?,
        keywords: parse_json(row, 5)?,
        last_timestamp: parse_dt(row, 6)?,
        created_at: parse_dt(row, 7)?,
        updated_at: parse_dt(row, 8)?,
    })
}

fn row_to_change(row: &rusqlite::Row) -> rusqlite::Result<MemoryChange> {
    let change_type: String = row.get(1)?;
    Ok(MemoryChange {
        id: row.get(0)?,
        change_type: parse_change_type(&change_type),
        target_type: row.get(2)?,
        target_id: row.get(3)?,
        previous_value: row.get(4)?,
        new_value: row.get(5)?,
        reason: row.get(6)?,
        trigger_episode_id: row.get(7)?,
        consolidation_run_id: row.get(8)?,
        created_at: parse_dt(row, 9)?,
    })
}

fn row_to_run(row: &rusqlite::Row) -> rusqlite::Result<ConsolidationRun> {
    let trigger: String = row.get(1)?;
    let status: String = row.get(2)?;
    let finished: Option<String> = row.get(4)?;
    Ok(ConsolidationRun {
        id: row.get(0)?,
        trigger: parse_trigger(&trigger),
        status: parse_status(&status),
        started_at: parse_dt(row, 3)?,
        finished_at: finished.map(|s| parse_rfc3339(&s)).transpose()?,
        items_extracted: row.get(5)?,
        items_resolved: row.get(6)?,
        items_pruned: row.get(7)?,
    })
}

fn parse_dt(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let s: String = row.get(idx)?;
    parse_rfc3339(&s)
}

fn parse_rfc3339(s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e)))
}

fn parse_json<T: serde::de::DeserializeOwned>(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<T> {
    let s: String = row.get(idx)?;
    serde_json::from_str(&s)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e)))
}

fn causal_endpoint_str(t: CausalEndpointType) -> &'static str {
    match t {
        CausalEndpointType::Fact => "fact",
        CausalEndpointType::Episode => "episode",
        CausalEndpointType::Event => "event",
    }
}

fn parse_endpoint_type(s: &str) -> CausalEndpointType {
    match s {
        "episode" => CausalEndpointType::Episode,
        "event" => CausalEndpointType::Event,
        _ => CausalEndpointType::Fact,
    }
}

fn causal_strength_str(s: CausalStrength) -> &'static str {
    match s {
        CausalStrength::Direct => "direct",
        CausalStrength::Contributing => "contributing",
    }
}

fn change_type_str(c: ChangeType) -> &'static str {
    match c {
        ChangeType::Add => "add",
        ChangeType::Modify => "modify",
        ChangeType::Retract => "retract",
        ChangeType::Strengthen => "strengthen",
        ChangeType::Weaken => "weaken",
        ChangeType::Merge => "merge",
    }
}

fn parse_change_type(s: &str) -> ChangeType {
    match s {
        "modify" => ChangeType::Modify,
        "retract" => ChangeType::Retract,
        "strengthen" => ChangeType::Strengthen,
        "weaken" => ChangeType::Weaken,
        "merge" => ChangeType::Merge,
        _ => ChangeType::Add,
    }
}

fn consolidation_trigger_str(t: ConsolidationTrigger) -> &'static str {
    match t {
        ConsolidationTrigger::InitialConsolidation => "initial_consolidation",
        ConsolidationTrigger::ManyNewMemories => "many_new_memories",
        ConsolidationTrigger::IdleTimeConsolidation => "idle_time_consolidation",
        ConsolidationTrigger::ScheduledConsolidation => "scheduled_consolidation",
        ConsolidationTrigger::DeepSleepConsolidation => "deep_sleep_consolidation",
    }
}

fn parse_trigger(s: &str) -> ConsolidationTrigger {
    match s {
        "many_new_memories" => ConsolidationTrigger::ManyNewMemories,
        "idle_time_consolidation" => ConsolidationTrigger::IdleTimeConsolidation,
        "scheduled_consolidation" => ConsolidationTrigger::ScheduledConsolidation,
        "deep_sleep_consolidation" => ConsolidationTrigger::DeepSleepConsolidation,
        _ => ConsolidationTrigger::InitialConsolidation,
    }
}

fn consolidation_status_str(s: ConsolidationStatus) -> &'static str {
    match s {
        ConsolidationStatus::Running => "running",
        ConsolidationStatus::Completed => "completed",
        ConsolidationStatus::Failed => "failed",
        ConsolidationStatus::Cancelled => "cancelled",
    }
}

fn parse_status(s: &str) -> ConsolidationStatus {
    match s {
        "completed" => ConsolidationStatus::Completed,
        "failed" => ConsolidationStatus::Failed,
        "cancelled" => ConsolidationStatus::Cancelled,
        _ => ConsolidationStatus::Running,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::new_id;

    fn sample_fact() -> Fact {
        let now = Utc::now();
        Fact {
            id: new_id("fact"),
            subject: "user".into(),
            predicate: "prefers".into(),
            object: "dark mode".into(),
            confidence: 0.8,
            evidence: vec!["ep-1".into()],
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
    fn insert_and_fetch_fact_roundtrips() {
        let store = Storage::open_in_memory().unwrap();
        let fact = sample_fact();
        store.insert_fact(&fact, Some(&[0.1, 0.2, 0.3])).unwrap();
        let fetched = store.get_fact(&fact.id).unwrap().unwrap();
        assert_eq!(fetched.subject, "user");
        assert_eq!(fetched.predicate, "prefers");
        let emb = store.fact_embedding(&fact.id).unwrap().unwrap();
        assert_eq!(emb, vec![0.1, 0.2, 0.3]);
    }

    #[test]
    fn retract_fact_flips_is_active() {
        let store = Storage::open_in_memory().unwrap();
        let fact = sample_fact();
        store.insert_fact(&fact, None).unwrap();
        store.retract_fact(&fact.id, "superseded").unwrap();
        let fetched = store.get_fact(&fact.id).unwrap().unwrap();
        assert!(!fetched.is_active);
        assert_eq!(fetched.retracted_reason.as_deref(), Some("superseded"));
    }

    #[test]
    fn retract_missing_fact_errors() {
        let store = Storage::open_in_memory().unwrap();
        let err = store.retract_fact("fact-missing-0", "x").unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[test]
    fn find_facts_by_subject_and_predicate() {
        let store = Storage::open_in_memory().unwrap();
        let mut a = sample_fact();
        a.predicate = "works_at".into();
        a.object = "acme".into();
        let mut b = sample_fact();
        b.predicate = "prefers".into();
        store.insert_fact(&a, None).unwrap();
        store.insert_fact(&b, None).unwrap();

        let by_subject = store.find_facts(Some("user"), None, true).unwrap();
        assert_eq!(by_subject.len(), 2);

        let by_both = store.find_facts(Some("user"), Some("works_at"), true).unwrap();
        assert_eq!(by_both.len(), 1);
        assert_eq!(by_both[0].object, "acme");
    }

    #[test]
    fn stats_reflect_active_and_retracted_facts() {
        let store = Storage::open_in_memory().unwrap();
        let a = sample_fact();
        let mut b = sample_fact();
        b.id = new_id("fact");
        store.insert_fact(&a, None).unwrap();
        store.insert_fact(&b, None).unwrap();
        store.retract_fact(&a.id, "dup").unwrap();

        let stats = store.get_stats().unwrap();
        assert_eq!(stats.active_fact_count, 1);
        assert_eq!(stats.retracted_fact_count, 1);
    }

    fn sample_episode(topic: &str, timestamp: DateTime<Utc>) -> Episode {
        Episode {
            id: new_id("ep"),
            timestamp,
            summary: "talked about things".into(),
            participants: vec!["user".into()],
            topic: topic.into(),
            keywords: vec![],
            emotional_salience: 0.2,
            utility_score: 0.5,
            source_session_id: "session-1".into(),
            source_message_ids: vec!["msg-1".into()],
            ttl: Ttl::Permanent,
            access_count: 0,
            last_accessed_at: None,
            created_at: timestamp,
            updated_at: timestamp,
        }
    }

    #[test]
    fn query_episodes_filters_by_topic_and_range() {
        let store = Storage::open_in_memory().unwrap();
        let t0 = Utc::now() - chrono::Duration::days(2);
        let t1 = Utc::now() - chrono::Duration::days(1);
        let t2 = Utc::now();
        store.insert_episode(&sample_episode("rust", t0), None).unwrap();
        store.insert_episode(&sample_episode("cooking", t1), None).unwrap();
        store.insert_episode(&sample_episode("rust", t2), None).unwrap();

        let rust_only = store.query_episodes(None, None, None, Some("rust")).unwrap();
        assert_eq!(rust_only.len(), 2);

        let bounded = store.query_episodes(None, Some(t1 - chrono::Duration::hours(1)), Some(t1 + chrono::Duration::hours(1)), None).unwrap();
        assert_eq!(bounded.len(), 1);
        assert_eq!(bounded[0].topic, "cooking");

        let limited = store.query_episodes(Some(1), None, None, None).unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].topic, "rust");
        assert_eq!(limited[0].timestamp, t2);
    }

    #[test]
    fn audit_log_accumulates_in_insertion_order() {
        let store = Storage::open_in_memory().unwrap();
        for i in 0..3 {
            store
                .record_change(&MemoryChange {
                    id: new_id("chg"),
                    change_type: ChangeType::Add,
                    target_type: "fact".into(),
                    target_id: "fact-x".into(),
                    previous_value: None,
                    new_value: format!("v{i}"),
                    reason: "test".into(),
                    trigger_episode_id: None,
                    consolidation_run_id: None,
                    created_at: Utc::now(),
                })
                .unwrap();
        }
        let changes = store.changes_for_target("fact", "fact-x").unwrap();
        assert_eq!(changes.len(), 3);
        assert_eq!(changes[0].new_value, "v0");
        assert_eq!(changes[2].new_value, "v2");
    }
}
