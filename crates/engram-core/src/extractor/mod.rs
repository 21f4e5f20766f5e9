//! C2: Extractor
//!
//! Turns one conversation transcript into at most one `Episode` plus zero
//! or more `Fact`/`CausalLink` candidates. Two modes, matching the
//! teacher's fallback style in `storage/sqlite.rs::smart_ingest` (try the
//! rich path, degrade to a cheaper one on provider failure) rather than
//! surfacing the failure to the caller.

mod patterns;

use std::sync::Arc;

use chrono::Utc;

use crate::config::EngramConfig;
use crate::ids::new_id;
use crate::model::{
    CausalEndpointType, CausalLink, CausalStrength, Episode, Fact, SourceTag, Ttl,
};
use crate::providers::{CompletionRequest, LlmProvider};
use crate::retry::with_backoff;

pub use patterns::{CAUSAL_PATTERNS, FACT_PATTERNS};

/// One fact candidate before dedup/confidence finalization.
#[derive(Debug, Clone)]
pub struct FactCandidate {
    pub subject: String,
    pub predicate: String,
    pub object: String,
    pub source: SourceTag,
    pub base_confidence: f32,
    pub raw_span: Option<String>,
}

/// One causal-link candidate before finalization.
#[derive(Debug, Clone)]
pub struct CausalCandidate {
    pub cause_description: String,
    pub effect_description: String,
    pub confidence: f32,
}

/// Everything the extractor produced from one transcript.
#[derive(Debug, Clone)]
pub struct ExtractionResult {
    pub episode: Episode,
    pub facts: Vec<Fact>,
    pub causal_links: Vec<CausalLink>,
    pub used_llm: bool,
}

pub struct Extractor {
    llm: Arc<dyn LlmProvider>,
    config: EngramConfig,
}

impl Extractor {
    pub fn new(llm: Arc<dyn LlmProvider>, config: EngramConfig) -> Self {
        Self { llm, config }
    }

    /// Extract an Episode + Facts + CausalLinks from one transcript.
    /// `session_id` and `message_ids` feed the Episode's provenance.
    pub async fn extract(
        &self,
        transcript: &str,
        session_id: &str,
        message_ids: &[String],
        participants: &[String],
    ) -> ExtractionResult {
        match self.extract_with_llm(transcript, session_id, message_ids, participants).await {
            Some(result) => result,
            None => self.extract_with_regex(transcript, session_id, message_ids, participants),
        }
    }

    async fn extract_with_llm(
        &self,
        transcript: &str,
        session_id: &str,
        message_ids: &[String],
        participants: &[String],
    ) -> Option<ExtractionResult> {
        let prompt = format!(
            "Extract a one-sentence summary, topic, up to 10 keywords, an \
             emotional salience in [0,1], subject-predicate-object facts, \
             and cause-effect relationships from this transcript. Respond \
             as JSON with keys summary, topic, keywords, salience, facts, \
             causalLinks.\n\nTranscript:\n{transcript}"
        );

        let response = with_backoff(
            &self.config.retry,
            || {
                let llm = self.llm.clone();
                let request = CompletionRequest::new(prompt.clone())
                    .json_mode()
                    .with_system("You are a precise information extraction engine.");
                async move { llm.complete(request).await }
            },
            |e: &String| crate::retry::looks_rate_limited(e),
            |e: &String| crate::retry::parse_retry_after(e),
        )
        .await
        .ok()?;

        let parsed: LlmExtraction = serde_json::from_str(&response)
            .or_else(|_| serde_json::from_str(response.trim()))
            .ok()?;

        let now = Utc::now();
        let episode = Episode {
            id: new_id("ep"),
            timestamp: now,
            summary: parsed.summary,
            participants: participants.to_vec(),
            topic: parsed.topic,
            keywords: parsed.keywords.into_iter().take(10).collect(),
            emotional_salience: parsed.salience.clamp(0.0, 1.0),
            utility_score: 0.0,
            source_session_id: session_id.to_string(),
            source_message_ids: message_ids.to_vec(),
            ttl: Ttl::Permanent,
            access_count: 0,
            last_accessed_at: None,
            created_at: now,
            updated_at: now,
        };

        let fact_candidates: Vec<FactCandidate> = parsed
            .facts
            .into_iter()
            .map(|f| FactCandidate {
                subject: f.subject,
                predicate: normalize_predicate(&f.predicate),
                object: normalize_object(&f.object),
                source: SourceTag::Llm,
                base_confidence: f.confidence,
                raw_span: None,
            })
            .collect();

        let facts = finalize_facts(fact_candidates, episode.emotional_salience);

        let causal_links = parsed
            .causal_links
            .into_iter()
            .map(|c| {
                let confidence = c.confidence.clamp(0.0, 1.0);
                build_causal_link(&c.cause, &c.effect, confidence)
            })
            .collect();

        Some(ExtractionResult { episode, facts, causal_links, used_llm: true })
    }

    fn extract_with_regex(
        &self,
        transcript: &str,
        session_id: &str,
        message_ids: &[String],
        participants: &[String],
    ) -> ExtractionResult {
        let now = Utc::now();
        let fact_candidates = patterns::extract_fact_candidates(transcript);
        let emotional_salience = 0.0;
        let facts = finalize_facts(fact_candidates, emotional_salience);

        let causal_candidates = patterns::extract_causal_candidates(transcript);
        let causal_links = causal_candidates
            .into_iter()
            .map(|c| build_causal_link(&c.cause_description, &c.effect_description, c.confidence))
            .collect();

        let keywords = stub_keywords(transcript);
        let episode = Episode {
            id: new_id("ep"),
            timestamp: now,
            summary: stub_summary(transcript),
            participants: participants.to_vec(),
            topic: keywords.first().cloned().unwrap_or_default(),
            keywords,
            emotional_salience,
            utility_score: 0.0,
            source_session_id: session_id.to_string(),
            source_message_ids: message_ids.to_vec(),
            ttl: Ttl::Permanent,
            access_count: 0,
            last_accessed_at: None,
            created_at: now,
            updated_at: now,
        };

        ExtractionResult { episode, facts, causal_links, used_llm: false }
    }
}

fn build_causal_link(cause: &str, effect: &str, confidence: f32) -> CausalLink {
    let now = Utc::now();
    CausalLink {
        id: new_id("causal"),
        cause_type: CausalEndpointType::Event,
        cause_id: new_id("event"),
        cause_description: cause.trim().to_string(),
        effect_type: CausalEndpointType::Event,
        effect_id: new_id("event"),
        effect_description: effect.trim().to_string(),
        mechanism: String::new(),
        confidence,
        evidence: vec![],
        temporal_delay: None,
        causal_strength: CausalStrength::clamped(CausalStrength::Direct, confidence),
        created_at: now,
        updated_at: now,
    }
}

/// Apply confidence computation (section 4.2), dedup collisions by
/// `(subject:predicate:object)` with pattern beating inference, and
/// materialize `Fact` records.
fn finalize_facts(candidates: Vec<FactCandidate>, emotional_salience: f32) -> Vec<Fact> {
    use std::collections::HashMap;

    let mut by_key: HashMap<String, FactCandidate> = HashMap::new();
    for candidate in candidates {
        let key = format!("{}:{}:{}", candidate.subject, candidate.predicate, candidate.object);
        match by_key.get(&key) {
            Some(existing) if existing.source == SourceTag::Pattern && candidate.source != SourceTag::Pattern => {
                // pattern already won; keep it
            }
            _ => {
                by_key.insert(key, candidate);
            }
        }
    }

    let now = Utc::now();
    by_key
        .into_values()
        .map(|candidate| {
            let confidence = compute_confidence(&candidate, emotional_salience);
            Fact {
                id: new_id("fact"),
                subject: candidate.subject,
                predicate: candidate.predicate,
                object: candidate.object,
                confidence,
                evidence: candidate.raw_span.into_iter().collect(),
                first_seen: now,
                last_confirmed: now,
                contradictions: vec![],
                user_affirmed: false,
                is_active: true,
                retracted_reason: None,
                access_count: 0,
                embedding: None,
            }
        })
        .collect()
}

/// Section 4.2's confidence formula, shared by both modes for the regex
/// path's base (the LLM path reads its own confidence but clamps
/// identically).
fn compute_confidence(candidate: &FactCandidate, emotional_salience: f32) -> f32 {
    let mut score = candidate.base_confidence;
    score += 0.1 * emotional_salience;
    if crate::model::SINGULAR_PREDICATES.contains(&candidate.predicate.as_str()) {
        score += 0.15;
    }
    if candidate.object.len() < 3 {
        score -= 0.2;
    }
    score.clamp(0.0, 1.0)
}

fn normalize_predicate(predicate: &str) -> String {
    predicate
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
}

/// Trim, strip leading articles, strip single quotes, lower-case, cap at
/// 200 chars (section 4.2).
fn normalize_object(object: &str) -> String {
    let trimmed = object.trim().replace('\'', "");
    let lower = trimmed.to_lowercase();
    let stripped = ["a ", "an ", "the "]
        .iter()
        .find_map(|article| lower.strip_prefix(article))
        .unwrap_or(&lower);
    stripped.chars().take(200).collect()
}

fn stub_summary(transcript: &str) -> String {
    transcript
        .split(['.', '\n'])
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(|s| s.chars().take(160).collect())
        .unwrap_or_else(|| "conversation".to_string())
}

fn stub_keywords(transcript: &str) -> Vec<String> {
    let stopwords = ["the", "a", "an", "is", "and", "to", "of", "i", "you", "it", "in", "on"];
    let mut seen = std::collections::HashSet::new();
    transcript
        .to_lowercase()
        .split_whitespace()
        .filter(|w| w.len() > 3 && !stopwords.contains(w))
        .filter(|w| seen.insert(w.to_string()))
        .take(10)
        .map(str::to_string)
        .collect()
}

#[derive(Debug, serde::Deserialize)]
struct LlmExtraction {
    summary: String,
    topic: String,
    #[serde(default)]
    keywords: Vec<String>,
    #[serde(default)]
    salience: f32,
    #[serde(default)]
    facts: Vec<LlmFact>,
    #[serde(default, rename = "causalLinks")]
    causal_links: Vec<LlmCausalLink>,
}

#[derive(Debug, serde::Deserialize)]
struct LlmFact {
    subject: String,
    predicate: String,
    object: String,
    #[serde(default = "default_confidence")]
    confidence: f32,
}

fn default_confidence() -> f32 {
    0.5
}

#[derive(Debug, serde::Deserialize)]
struct LlmCausalLink {
    cause: String,
    effect: String,
    #[serde(default = "default_confidence")]
    confidence: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedup_prefers_pattern_source_over_inference() {
        let candidates = vec![
            FactCandidate {
                subject: "user".into(),
                predicate: "uses".into(),
                object: "rust".into(),
                source: SourceTag::Inference,
                base_confidence: 0.6,
                raw_span: None,
            },
            FactCandidate {
                subject: "user".into(),
                predicate: "uses".into(),
                object: "rust".into(),
                source: SourceTag::Pattern,
                base_confidence: 0.9,
                raw_span: Some("I use rust".into()),
            },
        ];
        let facts = finalize_facts(candidates, 0.0);
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].evidence, vec!["I use rust".to_string()]);
    }

    #[test]
    fn confidence_gets_singular_predicate_bonus() {
        let candidate = FactCandidate {
            subject: "user".into(),
            predicate: "has_name".into(),
            object: "alex".into(),
            source: SourceTag::Pattern,
            base_confidence: 0.5,
            raw_span: None,
        };
        let facts = finalize_facts(vec![candidate], 0.0);
        assert!((facts[0].confidence - 0.65).abs() < 1e-4);
    }

    #[test]
    fn short_object_gets_confidence_penalty() {
        let candidate = FactCandidate {
            subject: "user".into(),
            predicate: "prefers".into(),
            object: "ts".into(),
            source: SourceTag::Pattern,
            base_confidence: 0.7,
            raw_span: None,
        };
        let facts = finalize_facts(vec![candidate], 0.0);
        assert!((facts[0].confidence - 0.5).abs() < 1e-4);
    }

    #[test]
    fn normalize_object_strips_articles_and_quotes() {
        assert_eq!(normalize_object("  The Project's Name  "), "project's name".replace('\'', ""));
        assert_eq!(normalize_object("a Rust Crate"), "rust crate");
    }

    #[tokio::test]
    async fn falls_back_to_regex_when_llm_unavailable() {
        let extractor = Extractor::new(
            Arc::new(crate::providers::RuleBasedLlmProvider),
            EngramConfig::default(),
        );
        let result = extractor
            .extract("my name is Alex and I work at Acme", "sess-1", &[], &["user".into()])
            .await;
        assert!(!result.used_llm);
        assert!(result.facts.iter().any(|f| f.predicate == "has_name"));
    }
}
