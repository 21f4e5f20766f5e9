//! BM25 keyword index (section 4.4)
//!
//! Backed by the `episodes_fts`/`facts_fts` FTS5 virtual tables (schema in
//! `store::migrations`), which already maintain themselves incrementally
//! via `AFTER INSERT/UPDATE/DELETE` triggers — the "incremental add/remove"
//! requirement is satisfied by SQLite itself rather than a hand-rolled
//! inverted index, mirroring the teacher's `knowledge_fts` table.

use rusqlite::{params, Connection};

/// Which record types a keyword search should cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Episode,
    Fact,
}

/// One scored hit.
#[derive(Debug, Clone)]
pub struct Bm25Hit {
    pub id: String,
    pub kind: RecordKind,
    pub score: f32,
}

/// Strip characters FTS5's query syntax treats specially so a raw user
/// query can't break the MATCH expression (ported from the teacher's
/// `search::sanitize_fts5_query`).
pub fn sanitize_fts5_query(query: &str) -> String {
    let cleaned: String = query
        .chars()
        .map(|c| if c.is_alphanumeric() || c.is_whitespace() { c } else { ' ' })
        .collect();
    cleaned
        .split_whitespace()
        .map(|token| format!("{token}*"))
        .collect::<Vec<_>>()
        .join(" OR ")
}

/// Keyword search across one or both FTS5 tables. FTS5's `bm25()` already
/// uses the standard k1/b defaults (1.2 / 0.75); its return value is
/// negative-is-better, so this negates it to match the spec's
/// higher-is-better convention.
pub fn search(conn: &Connection, query: &str, kinds: &[RecordKind], top_n: usize) -> rusqlite::Result<Vec<Bm25Hit>> {
    let sanitized = sanitize_fts5_query(query);
    if sanitized.is_empty() {
        return Ok(Vec::new());
    }

    let mut hits = Vec::new();
    if kinds.is_empty() || kinds.contains(&RecordKind::Episode) {
        hits.extend(search_table(conn, "episodes_fts", RecordKind::Episode, &sanitized, top_n)?);
    }
    if kinds.is_empty() || kinds.contains(&RecordKind::Fact) {
        hits.extend(search_table(conn, "facts_fts", RecordKind::Fact, &sanitized, top_n)?);
    }
    hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    hits.truncate(top_n);
    Ok(hits)
}

fn search_table(
    conn: &Connection,
    table: &str,
    kind: RecordKind,
    sanitized_query: &str,
    top_n: usize,
) -> rusqlite::Result<Vec<Bm25Hit>> {
    let sql = format!("SELECT id, bm25({table}) FROM {table} WHERE {table} MATCH ?1 ORDER BY bm25({table}) LIMIT ?2");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![sanitized_query, top_n as i64], |row| {
        let id: String = row.get(0)?;
        let raw_score: f64 = row.get(1)?;
        Ok(Bm25Hit { id, kind, score: -raw_score as f32 })
    })?;
    let mut out = Vec::new();
    for r in rows {
        out.push(r?);
    }
    Ok(out)
}

/// Normalize a set of BM25 scores to `[0, 1]` by dividing by the max
/// (section 4.5.2's `bm25_normalized`). Empty input yields no-ops.
pub fn normalize_scores(hits: &mut [Bm25Hit]) {
    let max = hits.iter().map(|h| h.score).fold(0.0f32, f32::max);
    if max <= 0.0 {
        return;
    }
    for hit in hits {
        hit.score /= max;
    }
}
