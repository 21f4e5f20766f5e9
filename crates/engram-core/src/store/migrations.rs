//! Schema migrations
//!
//! One table per record type from section 3, plus the append-only
//! `memory_changes` and `consolidation_runs` audit tables. Embeddings live
//! in sibling `*_embeddings` tables as little-endian `f32` blobs, matching
//! the teacher's `node_embeddings` table.

/// Ordered list of migrations, applied in order against `schema_version`.
pub const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    description: "Initial schema: episodes, facts, causal links, procedures, clusters, audit log",
    up: MIGRATION_V1_UP,
}];

/// A single forward-only migration.
#[derive(Debug, Clone)]
pub struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub up: &'static str,
}

const MIGRATION_V1_UP: &str = r#"
CREATE TABLE IF NOT EXISTS episodes (
    id TEXT PRIMARY KEY,
    timestamp TEXT NOT NULL,
    summary TEXT NOT NULL,
    participants TEXT NOT NULL DEFAULT '[]',
    topic TEXT NOT NULL DEFAULT '',
    keywords TEXT NOT NULL DEFAULT '[]',
    emotional_salience REAL NOT NULL DEFAULT 0.0,
    utility_score REAL NOT NULL DEFAULT 0.0,
    source_session_id TEXT NOT NULL,
    source_message_ids TEXT NOT NULL DEFAULT '[]',
    ttl TEXT NOT NULL DEFAULT 'permanent',
    access_count INTEGER NOT NULL DEFAULT 0,
    last_accessed_at TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_episodes_timestamp ON episodes(timestamp);
CREATE INDEX IF NOT EXISTS idx_episodes_session ON episodes(source_session_id);

CREATE TABLE IF NOT EXISTS episode_embeddings (
    episode_id TEXT PRIMARY KEY REFERENCES episodes(id) ON DELETE CASCADE,
    embedding BLOB NOT NULL,
    dimensions INTEGER NOT NULL
);

CREATE VIRTUAL TABLE IF NOT EXISTS episodes_fts USING fts5(
    id UNINDEXED,
    summary,
    topic,
    keywords,
    tokenize = 'porter unicode61'
);

CREATE TRIGGER IF NOT EXISTS episodes_ai AFTER INSERT ON episodes BEGIN
    INSERT INTO episodes_fts(rowid, id, summary, topic, keywords)
    VALUES (NEW.rowid, NEW.id, NEW.summary, NEW.topic, NEW.keywords);
END;
CREATE TRIGGER IF NOT EXISTS episodes_ad AFTER DELETE ON episodes BEGIN
    INSERT INTO episodes_fts(episodes_fts, rowid, id, summary, topic, keywords)
    VALUES ('delete', OLD.rowid, OLD.id, OLD.summary, OLD.topic, OLD.keywords);
END;
CREATE TRIGGER IF NOT EXISTS episodes_au AFTER UPDATE ON episodes BEGIN
    INSERT INTO episodes_fts(episodes_fts, rowid, id, summary, topic, keywords)
    VALUES ('delete', OLD.rowid, OLD.id, OLD.summary, OLD.topic, OLD.keywords);
    INSERT INTO episodes_fts(rowid, id, summary, topic, keywords)
    VALUES (NEW.rowid, NEW.id, NEW.summary, NEW.topic, NEW.keywords);
END;

CREATE TABLE IF NOT EXISTS facts (
    id TEXT PRIMARY KEY,
    subject TEXT NOT NULL,
    predicate TEXT NOT NULL,
    object TEXT NOT NULL,
    confidence REAL NOT NULL DEFAULT 0.5,
    evidence TEXT NOT NULL DEFAULT '[]',
    first_seen TEXT NOT NULL,
    last_confirmed TEXT NOT NULL,
    contradictions TEXT NOT NULL DEFAULT '[]',
    user_affirmed INTEGER NOT NULL DEFAULT 0,
    is_active INTEGER NOT NULL DEFAULT 1,
    retracted_reason TEXT,
    access_count INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_facts_subject_predicate ON facts(subject, predicate);
CREATE INDEX IF NOT EXISTS idx_facts_active ON facts(is_active);

CREATE TABLE IF NOT EXISTS fact_embeddings (
    fact_id TEXT PRIMARY KEY REFERENCES facts(id) ON DELETE CASCADE,
    embedding BLOB NOT NULL,
    dimensions INTEGER NOT NULL
);

CREATE VIRTUAL TABLE IF NOT EXISTS facts_fts USING fts5(
    id UNINDEXED,
    subject,
    predicate,
    object,
    tokenize = 'porter unicode61'
);

CREATE TRIGGER IF NOT EXISTS facts_ai AFTER INSERT ON facts BEGIN
    INSERT INTO facts_fts(rowid, id, subject, predicate, object)
    VALUES (NEW.rowid, NEW.id, NEW.subject, NEW.predicate, NEW.object);
END;
CREATE TRIGGER IF NOT EXISTS facts_ad AFTER DELETE ON facts BEGIN
    INSERT INTO facts_fts(facts_fts, rowid, id, subject, predicate, object)
    VALUES ('delete', OLD.rowid, OLD.id, OLD.subject, OLD.predicate, OLD.object);
END;
CREATE TRIGGER IF NOT EXISTS facts_au AFTER UPDATE ON facts BEGIN
    INSERT INTO facts_fts(facts_fts, rowid, id, subject, predicate, object)
    VALUES ('delete', OLD.rowid, OLD.id, OLD.subject, OLD.predicate, OLD.object);
    INSERT INTO facts_fts(rowid, id, subject, predicate, object)
    VALUES (NEW.rowid, NEW.id, NEW.subject, NEW.predicate, NEW.object);
END;

CREATE TABLE IF NOT EXISTS causal_links (
    id TEXT PRIMARY KEY,
    cause_type TEXT NOT NULL,
    cause_id TEXT NOT NULL,
    cause_description TEXT NOT NULL,
    effect_type TEXT NOT NULL,
    effect_id TEXT NOT NULL,
    effect_description TEXT NOT NULL,
    mechanism TEXT NOT NULL,
    confidence REAL NOT NULL DEFAULT 0.5,
    evidence TEXT NOT NULL DEFAULT '[]',
    temporal_delay TEXT,
    causal_strength TEXT NOT NULL DEFAULT 'contributing',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_causal_cause ON causal_links(cause_id);
CREATE INDEX IF NOT EXISTS idx_causal_effect ON causal_links(effect_id);

CREATE TABLE IF NOT EXISTS causal_link_embeddings (
    causal_link_id TEXT PRIMARY KEY REFERENCES causal_links(id) ON DELETE CASCADE,
    embedding BLOB NOT NULL,
    dimensions INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS procedures (
    id TEXT PRIMARY KEY,
    trigger TEXT NOT NULL,
    action TEXT NOT NULL,
    expected_outcome TEXT,
    examples TEXT NOT NULL DEFAULT '[]',
    times_used INTEGER NOT NULL DEFAULT 0,
    times_succeeded INTEGER NOT NULL DEFAULT 0,
    tags TEXT NOT NULL DEFAULT '[]',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS memory_clusters (
    id TEXT PRIMARY KEY,
    centroid BLOB NOT NULL,
    dimensions INTEGER NOT NULL,
    member_ids TEXT NOT NULL DEFAULT '[]',
    member_types TEXT NOT NULL DEFAULT '[]',
    theme TEXT NOT NULL DEFAULT '',
    keywords TEXT NOT NULL DEFAULT '[]',
    last_timestamp TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS memory_changes (
    id TEXT PRIMARY KEY,
    change_type TEXT NOT NULL,
    target_type TEXT NOT NULL,
    target_id TEXT NOT NULL,
    previous_value TEXT,
    new_value TEXT NOT NULL,
    reason TEXT NOT NULL,
    trigger_episode_id TEXT,
    consolidation_run_id TEXT,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_changes_target ON memory_changes(target_type, target_id);
CREATE INDEX IF NOT EXISTS idx_changes_created ON memory_changes(created_at);

CREATE TABLE IF NOT EXISTS consolidation_runs (
    id TEXT PRIMARY KEY,
    trigger TEXT NOT NULL,
    status TEXT NOT NULL,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    items_extracted INTEGER NOT NULL DEFAULT 0,
    items_resolved INTEGER NOT NULL DEFAULT 0,
    items_pruned INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_runs_started ON consolidation_runs(started_at);

CREATE TABLE IF NOT EXISTS foresights (
    id TEXT PRIMARY KEY,
    description TEXT NOT NULL,
    confidence REAL NOT NULL DEFAULT 0.5,
    basis TEXT NOT NULL DEFAULT '[]',
    horizon TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS user_profiles (
    id TEXT PRIMARY KEY,
    display_name TEXT,
    attributes TEXT NOT NULL DEFAULT '[]',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS preferences (
    id TEXT PRIMARY KEY,
    subject TEXT NOT NULL,
    object TEXT NOT NULL,
    polarity REAL NOT NULL DEFAULT 0.0,
    importance REAL NOT NULL DEFAULT 0.5,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS relationships (
    id TEXT PRIMARY KEY,
    from_entity TEXT NOT NULL,
    relation TEXT NOT NULL,
    to_entity TEXT NOT NULL,
    confidence REAL NOT NULL DEFAULT 0.5,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS core_memories (
    id TEXT PRIMARY KEY,
    content TEXT NOT NULL,
    importance REAL NOT NULL DEFAULT 1.0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL
);
INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (1, datetime('now'));
"#;

/// Apply every migration whose version exceeds the database's current
/// `schema_version`, in order, inside one transaction each.
pub fn apply_migrations(conn: &rusqlite::Connection) -> rusqlite::Result<()> {
    let current: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    for migration in MIGRATIONS {
        if i64::from(migration.version) > current {
            conn.execute_batch(migration.up)?;
        }
    }
    Ok(())
}
