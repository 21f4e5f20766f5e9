//! Regex/heuristic fact and causal patterns (section 6)

use std::sync::OnceLock;

use regex::Regex;

use crate::model::SourceTag;

use super::{CausalCandidate, FactCandidate};

/// One fact pattern: `(regex, subject_group, predicate, object_group, confidence)`.
pub struct FactPattern {
    pub regex: &'static str,
    pub subject_group: usize,
    pub predicate: &'static str,
    pub object_group: usize,
    pub confidence: f32,
}

pub const FACT_PATTERNS: &[FactPattern] = &[
    FactPattern { regex: r"(?i)\bmy name is ([a-z][a-z '\-]{1,40})", subject_group: 0, predicate: "has_name", object_group: 1, confidence: 0.95 },
    FactPattern { regex: r"(?i)\bi work (?:at|for) ([a-z0-9][a-z0-9 .,'\-&]{1,60})", subject_group: 0, predicate: "works_at", object_group: 1, confidence: 0.9 },
    FactPattern { regex: r"(?i)\bi live in ([a-z][a-z ,'\-]{1,60})", subject_group: 0, predicate: "lives_in", object_group: 1, confidence: 0.9 },
    FactPattern { regex: r"(?i)\bi am an? ([a-z][a-z \-]{1,40})", subject_group: 0, predicate: "is_a", object_group: 1, confidence: 0.8 },
    FactPattern { regex: r"(?i)\bi (?:prefer|like|love) ([a-z0-9][a-z0-9 .,'\-]{1,60})", subject_group: 0, predicate: "prefers", object_group: 1, confidence: 0.75 },
    FactPattern { regex: r"(?i)\bi speak ([a-z][a-z \-]{1,40})", subject_group: 0, predicate: "speaks", object_group: 1, confidence: 0.85 },
    FactPattern { regex: r"(?i)\bmy ([a-z][a-z _\-]{1,30}) is ([a-z0-9][a-z0-9 .,'\-]{1,60})", subject_group: 0, predicate: "is", object_group: 2, confidence: 0.7 },
];

const INFERENCE_KEYWORDS: &[(&str, &str)] = &[
    ("rust", "uses"), ("typescript", "uses"), ("python", "uses"), ("go", "uses"),
    ("postgres", "uses"), ("postgresql", "uses"), ("sqlite", "uses"), ("redis", "uses"),
    ("react", "uses"), ("vue", "uses"), ("docker", "uses"), ("kubernetes", "uses"),
    ("dark mode", "prefers"), ("light mode", "prefers"), ("vim", "prefers"), ("emacs", "prefers"),
];

/// One causal pattern: `(regex, cause_group, effect_group, confidence)`.
struct CausalPattern {
    regex: &'static str,
    cause_group: usize,
    effect_group: usize,
    confidence: f32,
}

pub const CAUSAL_PATTERNS: &[(&str, f32)] = &[
    (r"(?i)^(.+?)\s+because\s+(.+)$", 0.80),
    (r"(?i)^(.+?)\s+caused\s+(.+)$", 0.90),
    (r"(?i)^due to\s+(.+?),\s*(.+)$", 0.75),
    (r"(?i)^(.+?)\s+led to\s+(.+)$", 0.80),
    (r"(?i)^after\s+(.+?),\s*(.+)$", 0.50),
    (r"(?i)^(.+?)\s+triggered\s+(.+)$", 0.85),
];

fn causal_patterns() -> &'static [(CausalPattern, Regex)] {
    static CELL: OnceLock<Vec<(CausalPattern, Regex)>> = OnceLock::new();
    CELL.get_or_init(|| {
        vec![
            (CausalPattern { regex: r"(?i)^(.+?)\s+because\s+(.+)$", cause_group: 2, effect_group: 1, confidence: 0.80 }, Regex::new(r"(?i)^(.+?)\s+because\s+(.+)$").unwrap()),
            (CausalPattern { regex: r"(?i)^(.+?)\s+caused\s+(.+)$", cause_group: 1, effect_group: 2, confidence: 0.90 }, Regex::new(r"(?i)^(.+?)\s+caused\s+(.+)$").unwrap()),
            (CausalPattern { regex: r"(?i)^due to\s+(.+?),\s*(.+)$", cause_group: 1, effect_group: 2, confidence: 0.75 }, Regex::new(r"(?i)^due to\s+(.+?),\s*(.+)$").unwrap()),
            (CausalPattern { regex: r"(?i)^(.+?)\s+led to\s+(.+)$", cause_group: 1, effect_group: 2, confidence: 0.80 }, Regex::new(r"(?i)^(.+?)\s+led to\s+(.+)$").unwrap()),
            (CausalPattern { regex: r"(?i)^after\s+(.+?),\s*(.+)$", cause_group: 1, effect_group: 2, confidence: 0.50 }, Regex::new(r"(?i)^after\s+(.+?),\s*(.+)$").unwrap()),
            (CausalPattern { regex: r"(?i)^(.+?)\s+triggered\s+(.+)$", cause_group: 1, effect_group: 2, confidence: 0.85 }, Regex::new(r"(?i)^(.+?)\s+triggered\s+(.+)$").unwrap()),
            (CausalPattern { regex: r"(?i)that'?s why\s+(.+)$", cause_group: 0, effect_group: 1, confidence: 0.70 }, Regex::new(r"(?i)that'?s why\s+(.+)$").unwrap()),
        ]
    })
}

fn fact_pattern_regexes() -> &'static [Regex] {
    static CELL: OnceLock<Vec<Regex>> = OnceLock::new();
    CELL.get_or_init(|| FACT_PATTERNS.iter().map(|p| Regex::new(p.regex).unwrap()).collect())
}

/// Extract fact candidates via the ordered regex list, then the keyword
/// inference heuristics (section 6). Subject defaults to `"user"`.
pub fn extract_fact_candidates(transcript: &str) -> Vec<FactCandidate> {
    let mut out = Vec::new();
    let regexes = fact_pattern_regexes();

    for sentence in split_sentences(transcript) {
        for (pattern, regex) in FACT_PATTERNS.iter().zip(regexes.iter()) {
            if let Some(caps) = regex.captures(sentence) {
                if let Some(object) = caps.get(pattern.object_group) {
                    out.push(FactCandidate {
                        subject: "user".to_string(),
                        predicate: pattern.predicate.to_string(),
                        object: object.as_str().trim().to_string(),
                        source: SourceTag::Pattern,
                        base_confidence: pattern.confidence,
                        raw_span: Some(sentence.trim().to_string()),
                    });
                }
            }
        }

        let lower = sentence.to_lowercase();
        for (keyword, predicate) in INFERENCE_KEYWORDS {
            if lower.contains(keyword) {
                out.push(FactCandidate {
                    subject: "user".to_string(),
                    predicate: predicate.to_string(),
                    object: keyword.to_string(),
                    source: SourceTag::Inference,
                    base_confidence: 0.6,
                    raw_span: Some(sentence.trim().to_string()),
                });
            }
        }
    }
    out
}

/// Extract causal candidates (section 6's representative list).
pub fn extract_causal_candidates(transcript: &str) -> Vec<CausalCandidate> {
    let mut out = Vec::new();
    for sentence in split_sentences(transcript) {
        for (pattern, regex) in causal_patterns() {
            if let Some(caps) = regex.captures(sentence) {
                let cause = if pattern.cause_group == 0 {
                    "(prior context)".to_string()
                } else {
                    caps.get(pattern.cause_group).map(|m| m.as_str().to_string()).unwrap_or_default()
                };
                let effect = caps.get(pattern.effect_group).map(|m| m.as_str().to_string()).unwrap_or_default();
                if !cause.is_empty() && !effect.is_empty() {
                    out.push(CausalCandidate {
                        cause_description: cause,
                        effect_description: effect,
                        confidence: pattern.confidence,
                    });
                }
                break;
            }
        }
    }
    out
}

fn split_sentences(transcript: &str) -> Vec<&str> {
    transcript
        .split(['.', '\n', '!', '?'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}
