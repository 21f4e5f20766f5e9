//! C7: Health & Cleanup
//!
//! Two passes over the active fact set — duplicate detection and
//! low-quality detection — followed by a conservative auto-fix policy
//! (section 4.7). Everything that isn't safe to retract automatically
//! surfaces in the `HealthReport` for a human to act on.

use std::collections::HashMap;

use chrono::Utc;

use crate::ids::new_id;
use crate::model::{ChangeType, Fact, MemoryChange};
use crate::store::Storage;
use crate::text_similarity::levenshtein_similarity;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

impl Severity {
    fn weight(self) -> f32 {
        match self {
            Severity::Critical => 10.0,
            Severity::High => 5.0,
            Severity::Medium => 2.0,
            Severity::Low => 1.0,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Issue {
    Duplicate { fact_id: String, best_id: String },
    LowQuality { fact_id: String, reason: String },
}

impl Issue {
    fn severity(&self) -> Severity {
        match self {
            Issue::Duplicate { .. } => Severity::Medium,
            Issue::LowQuality { .. } => Severity::High,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct HealthReport {
    pub issues: Vec<Issue>,
    pub auto_retracted: Vec<String>,
    pub score: f32,
}

/// Predicate-specific minimum object lengths (section 6).
fn min_object_len(predicate: &str) -> Option<usize> {
    match predicate {
        "prefers" => Some(5),
        "uses" => Some(3),
        "wants" => Some(5),
        "needs" => Some(5),
        "likes" => Some(3),
        "dislikes" => Some(3),
        "is_interested_in" => Some(5),
        "works_on" => Some(5),
        "working_on" => Some(5),
        "location" => Some(3),
        "email" => Some(5),
        "is" => Some(3),
        _ => None,
    }
}

const MEANINGLESS_OBJECTS: &[&str] = &[
    "it", "this", "that", "what", "the", "a", "an", "yes", "no", "ok", "okay", "done", "here", "there",
];

fn is_meaningless(object: &str) -> bool {
    let normalized = object.trim().to_lowercase();
    MEANINGLESS_OBJECTS.contains(&normalized.as_str()) || normalized.chars().all(|c| c.is_ascii_digit())
}

fn is_truncated(object: &str) -> bool {
    let trimmed = object.trim();
    if trimmed.chars().count() < 3 {
        return true;
    }
    let words: Vec<&str> = trimmed.split_whitespace().collect();
    if let Some(last) = words.last() {
        if last.len() <= 2 && words.len() > 1 {
            return true;
        }
        let ends_without_punctuation = !trimmed.ends_with(['.', '!', '?']);
        if ends_without_punctuation && last.len() < 3 && words.len() > 3 {
            return true;
        }
    }
    false
}

/// section 4.7's low-quality predicate, minus the `confidence < 0.3`
/// check (evaluated separately since it doesn't need the object text).
fn low_quality_reason(fact: &Fact) -> Option<String> {
    if fact.user_affirmed {
        return None;
    }
    if is_meaningless(&fact.object) {
        return Some("meaningless object".to_string());
    }
    if is_truncated(&fact.object) {
        return Some("truncated object".to_string());
    }
    if let Some(min_len) = min_object_len(&fact.predicate) {
        if fact.object.trim().len() < min_len {
            return Some(format!("object shorter than minimum for predicate '{}'", fact.predicate));
        }
    }
    if fact.confidence < 0.3 {
        return Some("confidence below 0.3".to_string());
    }
    None
}

/// Whether a low-quality fact may be retracted without human review
/// (section 4.7's `isSafeToAutoRetract`).
fn is_safe_to_auto_retract(fact: &Fact) -> bool {
    if fact.user_affirmed {
        return false;
    }
    is_meaningless(&fact.object) || fact.object.trim().len() < 3 || fact.confidence < 0.2
}

fn normalize(s: &str) -> String {
    s.trim().to_lowercase()
}

fn is_duplicate_equal(a: &str, b: &str) -> bool {
    let a = normalize(a);
    let b = normalize(b);
    if a == b {
        return true;
    }
    let (shorter, longer) = if a.len() <= b.len() { (&a, &b) } else { (&b, &a) };
    if !shorter.is_empty() && longer.starts_with(shorter.as_str()) && shorter.len() as f32 / longer.len() as f32 >= 0.8 {
        return true;
    }
    if a.len() > 10 && b.len() > 10 {
        return levenshtein_similarity(&a, &b) > 0.85;
    }
    false
}

fn quality_key(fact: &Fact) -> (std::cmp::Reverse<bool>, std::cmp::Reverse<i64>, std::cmp::Reverse<usize>, std::cmp::Reverse<usize>) {
    (
        std::cmp::Reverse(fact.user_affirmed),
        std::cmp::Reverse((fact.confidence * 1_000_000.0) as i64),
        std::cmp::Reverse(fact.evidence.len()),
        std::cmp::Reverse(fact.object.len()),
    )
}

/// Retract `fact_id` and record a `MemoryChange(Retract)` audit row whose
/// `reason` starts with `auto-cleanup` (section 8, scenario S6).
fn auto_retract(store: &Storage, fact: &Fact, reason: &str) -> crate::error::Result<()> {
    let reason = format!("auto-cleanup: {reason}");
    store.retract_fact(&fact.id, &reason)?;
    store.record_change(&MemoryChange {
        id: new_id("chg"),
        change_type: ChangeType::Retract,
        target_type: "fact".to_string(),
        target_id: fact.id.clone(),
        previous_value: Some(format!("{}:{}:{}", fact.subject, fact.predicate, fact.object)),
        new_value: String::new(),
        reason,
        trigger_episode_id: None,
        consolidation_run_id: None,
        created_at: Utc::now(),
    })?;
    Ok(())
}

/// Run both health passes over every active fact. When `autofix` is true
/// (section 4.7's `runCleanup(autoFix: true)`), issues that are safe to
/// retract automatically are retracted and audited; when false, `run`
/// only reports issues without mutating the store.
pub fn run(store: &Storage, autofix: bool) -> crate::error::Result<HealthReport> {
    let facts = store.find_facts(None, None, true)?;

    let mut groups: HashMap<(String, String), Vec<Fact>> = HashMap::new();
    for fact in &facts {
        groups.entry((normalize(&fact.subject), normalize(&fact.predicate))).or_default().push(fact.clone());
    }

    let mut issues = Vec::new();
    let mut auto_retracted = Vec::new();

    for (_, mut members) in groups {
        if members.len() < 2 {
            continue;
        }
        members.sort_by_key(quality_key);
        let best = members[0].clone();
        for member in &members[1..] {
            if is_duplicate_equal(&member.object, &best.object) {
                issues.push(Issue::Duplicate { fact_id: member.id.clone(), best_id: best.id.clone() });
                if autofix {
                    auto_retract(store, member, &format!("duplicate of {}", best.id))?;
                    auto_retracted.push(member.id.clone());
                }
            }
        }
    }

    for fact in &facts {
        if auto_retracted.contains(&fact.id) {
            continue;
        }
        if let Some(reason) = low_quality_reason(fact) {
            issues.push(Issue::LowQuality { fact_id: fact.id.clone(), reason: reason.clone() });
            if autofix && is_safe_to_auto_retract(fact) {
                auto_retract(store, fact, &reason)?;
                auto_retracted.push(fact.id.clone());
            }
        }
    }

    let active_count = facts.len().max(1) as f32;
    let weight_sum: f32 = issues.iter().map(|i| i.severity().weight()).sum();
    let score = (100.0 - (weight_sum / (2.0 * active_count)) * 100.0).clamp(0.0, 100.0);

    Ok(HealthReport { issues, auto_retracted, score })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::new_id;
    use chrono::Utc;

    fn fact(subject: &str, predicate: &str, object: &str, confidence: f32) -> Fact {
        let now = Utc::now();
        Fact {
            id: new_id("fact"),
            subject: subject.into(),
            predicate: predicate.into(),
            object: object.into(),
            confidence,
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
    fn detects_and_retracts_true_duplicate() {
        let store = Storage::open_in_memory().unwrap();
        let best = fact("user", "likes", "typescript enthusiast programming", 0.9);
        let dup = fact("user", "likes", "typescript enthusiast program", 0.6);
        store.insert_fact(&best, None).unwrap();
        store.insert_fact(&dup, None).unwrap();

        let report = run(&store, true).unwrap();
        assert!(report.auto_retracted.contains(&dup.id));
        let refreshed = store.get_fact(&dup.id).unwrap().unwrap();
        assert!(!refreshed.is_active);
    }

    #[test]
    fn retracts_meaningless_object_automatically() {
        let store = Storage::open_in_memory().unwrap();
        let f = fact("user", "likes", "it", 0.9);
        store.insert_fact(&f, None).unwrap();

        let report = run(&store, true).unwrap();
        assert!(report.auto_retracted.contains(&f.id));
    }

    #[test]
    fn user_affirmed_facts_are_exempt_from_low_quality() {
        let store = Storage::open_in_memory().unwrap();
        let mut f = fact("user", "likes", "it", 0.9);
        f.user_affirmed = true;
        store.insert_fact(&f, None).unwrap();

        let report = run(&store, true).unwrap();
        assert!(report.auto_retracted.is_empty());
        assert!(report.issues.is_empty());
    }

    #[test]
    fn short_object_below_predicate_minimum_flagged_but_not_auto_fixed_above_threshold() {
        let store = Storage::open_in_memory().unwrap();
        let f = fact("user", "prefers", "css", 0.5);
        store.insert_fact(&f, None).unwrap();

        let report = run(&store, true).unwrap();
        assert_eq!(report.issues.len(), 1);
        assert!(report.auto_retracted.is_empty());
    }

    #[test]
    fn health_score_is_100_with_no_issues() {
        let store = Storage::open_in_memory().unwrap();
        let f = fact("user", "prefers", "rust programming language", 0.9);
        store.insert_fact(&f, None).unwrap();

        let report = run(&store, true).unwrap();
        assert_eq!(report.score, 100.0);
    }

    #[test]
    fn autofix_false_reports_without_retracting() {
        let store = Storage::open_in_memory().unwrap();
        let f = fact("user", "likes", "it", 0.9);
        store.insert_fact(&f, None).unwrap();

        let report = run(&store, false).unwrap();
        assert_eq!(report.issues.len(), 1);
        assert!(report.auto_retracted.is_empty());
        let refreshed = store.get_fact(&f.id).unwrap().unwrap();
        assert!(refreshed.is_active);
    }

    #[test]
    fn auto_retractions_are_audited_with_auto_cleanup_reason() {
        let store = Storage::open_in_memory().unwrap();
        for i in 0..10 {
            let f = fact("user", "likes", "it", 0.9 - i as f32 * 0.01);
            store.insert_fact(&f, None).unwrap();
        }

        let report = run(&store, true).unwrap();
        assert_eq!(report.auto_retracted.len(), 10);

        let mut retract_count = 0;
        for id in &report.auto_retracted {
            let changes = store.changes_for_target("fact", id).unwrap();
            assert!(changes.iter().any(|c| matches!(c.change_type, ChangeType::Retract) && c.reason.starts_with("auto-cleanup")));
            retract_count += 1;
        }
        assert_eq!(retract_count, 10);
    }
}
