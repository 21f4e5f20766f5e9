//! Intent planning (section 4.5.1)

use std::sync::Arc;

use crate::providers::{CompletionRequest, LlmProvider};

/// Coarse classification of what the user is asking for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntentType {
    Question,
    Command,
    Statement,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrievalDepth {
    Shallow,
    Deep,
}

#[derive(Debug, Clone)]
pub struct Intent {
    pub intent_type: IntentType,
    pub confidence: f32,
}

/// A retrieval plan (section 4.5.1).
#[derive(Debug, Clone)]
pub struct RetrievalPlan {
    pub semantic_queries: Vec<String>,
    pub keyword_queries: Vec<String>,
    pub entities: Vec<String>,
    pub retrieval_depth: RetrievalDepth,
    pub intent: Intent,
}

const QUESTION_WORDS: &[&str] = &["what", "how", "why", "when", "where", "who", "which", "is", "are", "can", "does", "do"];
const CONJUNCTION_MARKERS: &[&str] = &["and", "also", "then", "after", "before", "since"];
const STOPWORDS: &[&str] = &[
    "the", "a", "an", "is", "are", "was", "were", "and", "or", "to", "of", "in", "on", "at", "for",
    "i", "you", "he", "she", "it", "we", "they", "what", "how", "why", "does", "do", "did",
];

/// Produce a plan via regex/heuristics (section 4.5.1's fallback mode).
pub fn plan_heuristic(query: &str) -> RetrievalPlan {
    let lower = query.to_lowercase();
    let first_word = lower.split_whitespace().next().unwrap_or("");
    let is_question = query.trim_end().ends_with('?') || QUESTION_WORDS.contains(&first_word);

    let intent_type = if is_question { IntentType::Question } else { IntentType::Statement };

    let entities = extract_entities(query);
    let keywords: Vec<String> = lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 2 && !STOPWORDS.contains(w))
        .map(str::to_string)
        .collect();

    let has_conjunction = CONJUNCTION_MARKERS.iter().any(|m| {
        lower.split_whitespace().any(|w| w == *m)
    });
    let depth = if has_conjunction || keywords.len() > 5 {
        RetrievalDepth::Deep
    } else {
        RetrievalDepth::Shallow
    };

    RetrievalPlan {
        semantic_queries: vec![query.to_string()],
        keyword_queries: keywords,
        entities,
        retrieval_depth: depth,
        intent: Intent { intent_type, confidence: if is_question { 0.8 } else { 0.5 } },
    }
}

/// Capitalized-word and quoted-string entity extraction (section 4.5.1).
fn extract_entities(query: &str) -> Vec<String> {
    let mut entities = Vec::new();

    let mut chars = query.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if c == '"' || c == '\'' {
            if let Some(end) = query[i + 1..].find(c) {
                let quoted = &query[i + 1..i + 1 + end];
                if !quoted.is_empty() {
                    entities.push(quoted.to_string());
                }
            }
        }
    }

    for word in query.split_whitespace() {
        let trimmed: String = word.chars().filter(|c| c.is_alphanumeric()).collect();
        if trimmed.len() > 1 && trimmed.chars().next().is_some_and(|c| c.is_uppercase()) {
            if !entities.contains(&trimmed) {
                entities.push(trimmed);
            }
        }
    }
    entities
}

/// Produce a plan via a single JSON-mode LLM prompt, falling back to
/// heuristics on any provider failure (section 4.5.1).
pub async fn plan(llm: &Arc<dyn LlmProvider>, query: &str) -> RetrievalPlan {
    let prompt = format!(
        "Produce a retrieval plan for this query as JSON with keys \
         semanticQueries, keywordQueries, entities, retrievalDepth \
         (\"shallow\"|\"deep\"), intentType, intentConfidence.\n\nQuery: {query}"
    );
    let request = CompletionRequest::new(prompt).json_mode();
    match llm.complete(request).await {
        Ok(response) => match serde_json::from_str::<LlmPlan>(&response) {
            Ok(parsed) => RetrievalPlan {
                semantic_queries: parsed.semantic_queries,
                keyword_queries: parsed.keyword_queries,
                entities: parsed.entities,
                retrieval_depth: if parsed.retrieval_depth == "deep" { RetrievalDepth::Deep } else { RetrievalDepth::Shallow },
                intent: Intent {
                    intent_type: parse_intent_type(&parsed.intent_type),
                    confidence: parsed.intent_confidence.clamp(0.0, 1.0),
                },
            },
            Err(_) => plan_heuristic(query),
        },
        Err(_) => plan_heuristic(query),
    }
}

fn parse_intent_type(s: &str) -> IntentType {
    match s {
        "command" => IntentType::Command,
        "question" => IntentType::Question,
        _ => IntentType::Statement,
    }
}

#[derive(Debug, serde::Deserialize)]
struct LlmPlan {
    #[serde(rename = "semanticQueries", default)]
    semantic_queries: Vec<String>,
    #[serde(rename = "keywordQueries", default)]
    keyword_queries: Vec<String>,
    #[serde(default)]
    entities: Vec<String>,
    #[serde(rename = "retrievalDepth", default)]
    retrieval_depth: String,
    #[serde(rename = "intentType", default)]
    intent_type: String,
    #[serde(rename = "intentConfidence", default)]
    intent_confidence: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_question_by_word_and_mark() {
        let plan = plan_heuristic("What does the user prefer?");
        assert_eq!(plan.intent.intent_type, IntentType::Question);
    }

    #[test]
    fn detects_deep_retrieval_on_conjunction() {
        let plan = plan_heuristic("tell me about rust and also typescript");
        assert_eq!(plan.retrieval_depth, RetrievalDepth::Deep);
    }

    #[test]
    fn extracts_capitalized_and_quoted_entities() {
        let plan = plan_heuristic("What did Alex say about \"dark mode\"?");
        assert!(plan.entities.contains(&"Alex".to_string()));
        assert!(plan.entities.contains(&"dark mode".to_string()));
    }

    #[test]
    fn strips_stopwords_from_keywords() {
        let plan = plan_heuristic("what is the weather today");
        assert!(!plan.keyword_queries.contains(&"the".to_string()));
        assert!(plan.keyword_queries.contains(&"weather".to_string()));
    }
}
