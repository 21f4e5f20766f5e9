//! LLM provider trait (section 4.2 step 3 / 4.6 pattern discovery)

use async_trait::async_trait;

/// One completion request. Mirrors section 4.2's declared contract:
/// prompt plus optional sampling/formatting hints.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub prompt: String,
    pub system: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub json_mode: bool,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system: None,
            temperature: None,
            max_tokens: None,
            json_mode: false,
        }
    }

    pub fn json_mode(mut self) -> Self {
        self.json_mode = true;
        self
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }
}

/// A text-completion backend. Implementations may be rate-limited;
/// callers wrap calls in `retry::with_backoff` rather than retrying
/// internally, so a single failed `complete` call always means "give up
/// on this attempt", never "silently retried".
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<String, String>;

    fn name(&self) -> &str;
}

/// The always-available fallback (section 4.2: "extraction degrades to
/// the regex/rule-based path when no LLM provider is configured or when
/// the provider is exhausted after retry"). This provider never actually
/// calls out; callers that need LLM-quality extraction should configure
/// an `HttpLlmProvider` instead and treat this as the contract's floor.
#[derive(Debug, Default, Clone, Copy)]
pub struct RuleBasedLlmProvider;

#[async_trait]
impl LlmProvider for RuleBasedLlmProvider {
    async fn complete(&self, _request: CompletionRequest) -> Result<String, String> {
        Err("no LLM provider configured".to_string())
    }

    fn name(&self) -> &str {
        "rule-based-fallback"
    }
}
