//! Pattern discovery (section 4.6, stage 1)
//!
//! One JSON-mode LLM call over a batch of recent episodes, returning
//! pattern objects the caller may turn into `Procedure`s. Skipped
//! entirely (returns an empty batch) when the configured provider can't
//! answer — pattern discovery is an enrichment, not a correctness path.

use std::sync::Arc;

use serde::Deserialize;

use crate::model::Episode;
use crate::providers::{CompletionRequest, LlmProvider};

#[derive(Debug, Clone)]
pub struct DiscoveredPattern {
    pub description: String,
    pub confidence: f32,
    pub supporting_memory_ids: Vec<String>,
    pub pattern_type: String,
}

#[derive(Debug, Deserialize)]
struct LlmPatternBatch {
    #[serde(default)]
    patterns: Vec<LlmPattern>,
}

#[derive(Debug, Deserialize)]
struct LlmPattern {
    description: String,
    #[serde(default = "default_confidence")]
    confidence: f32,
    #[serde(rename = "supportingMemoryIds", default)]
    supporting_memory_ids: Vec<String>,
    #[serde(rename = "patternType", default = "default_pattern_type")]
    pattern_type: String,
}

fn default_confidence() -> f32 {
    0.5
}

fn default_pattern_type() -> String {
    "behavioral".to_string()
}

/// Ask the LLM for recurring patterns across `episodes`. Returns an
/// empty vec on any provider or parse failure.
pub async fn discover(llm: &Arc<dyn LlmProvider>, episodes: &[Episode]) -> Vec<DiscoveredPattern> {
    if episodes.is_empty() {
        return Vec::new();
    }

    let summaries: Vec<String> = episodes
        .iter()
        .map(|e| format!("- [{}] {}", e.id, e.summary))
        .collect();
    let prompt = format!(
        "Identify recurring behavioral patterns across these episode summaries. \
         Return JSON {{\"patterns\": [{{\"description\", \"confidence\", \"supportingMemoryIds\", \"patternType\"}}]}}.\n\n{}",
        summaries.join("\n")
    );

    let request = CompletionRequest::new(prompt).json_mode();
    let response = match llm.complete(request).await {
        Ok(r) => r,
        Err(_) => return Vec::new(),
    };

    match serde_json::from_str::<LlmPatternBatch>(&response) {
        Ok(batch) => batch
            .patterns
            .into_iter()
            .map(|p| DiscoveredPattern {
                description: p.description,
                confidence: p.confidence.clamp(0.0, 1.0),
                supporting_memory_ids: p.supporting_memory_ids,
                pattern_type: p.pattern_type,
            })
            .collect(),
        Err(_) => Vec::new(),
    }
}
