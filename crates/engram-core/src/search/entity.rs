//! Entity index (section 4.4)
//!
//! Maps a normalized entity string to the records that mention it as
//! subject or object. Used by C5's prefetch to do targeted lookups
//! without a full scan.

use std::collections::HashMap;

/// Normalize an entity string: lower-case, non-alphanumerics -> `_`.
pub fn normalize_entity(entity: &str) -> String {
    entity
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect::<String>()
        .trim_matches('_')
        .to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityRole {
    Subject,
    Object,
}

#[derive(Default)]
pub struct EntityIndex {
    by_entity: HashMap<String, Vec<(String, EntityRole)>>,
}

impl EntityIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn index_fact(&mut self, fact_id: &str, subject: &str, object: &str) {
        self.add(subject, fact_id, EntityRole::Subject);
        self.add(object, fact_id, EntityRole::Object);
    }

    fn add(&mut self, entity: &str, record_id: &str, role: EntityRole) {
        let key = normalize_entity(entity);
        if key.is_empty() {
            return;
        }
        let entry = self.by_entity.entry(key).or_default();
        if !entry.iter().any(|(id, r)| id == record_id && *r == role) {
            entry.push((record_id.to_string(), role));
        }
    }

    pub fn remove_record(&mut self, record_id: &str) {
        for records in self.by_entity.values_mut() {
            records.retain(|(id, _)| id != record_id);
        }
    }

    /// Lookup, both as subject and object, for an (unnormalized) entity.
    pub fn lookup(&self, entity: &str) -> Vec<String> {
        let key = normalize_entity(entity);
        self.by_entity
            .get(&key)
            .map(|records| records.iter().map(|(id, _)| id.clone()).collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_collapses_punctuation_and_case() {
        assert_eq!(normalize_entity("Acme, Inc."), "acme__inc");
    }

    #[test]
    fn lookup_finds_subject_and_object_mentions() {
        let mut index = EntityIndex::new();
        index.index_fact("fact-1", "user", "Acme Corp");
        index.index_fact("fact-2", "Acme Corp", "contractor");

        let hits = index.lookup("acme corp");
        assert_eq!(hits.len(), 2);
        assert!(hits.contains(&"fact-1".to_string()));
        assert!(hits.contains(&"fact-2".to_string()));
    }

    #[test]
    fn remove_record_drops_it_from_all_entities() {
        let mut index = EntityIndex::new();
        index.index_fact("fact-1", "user", "rust");
        index.remove_record("fact-1");
        assert!(index.lookup("rust").is_empty());
    }
}
