//! Request/response shapes for `generate`/`generate_stream` (spec.md §4.2).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SamplingParams {
    pub temperature: f64,
    pub top_p: f64,
    pub top_k: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetySettings {
    /// Lower is stricter. The mediated gateway's default per spec.md §4.2
    /// ("default safety settings") is `Standard`.
    pub threshold: SafetyThreshold,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SafetyThreshold {
    Permissive,
    Standard,
    Strict,
}

impl Default for SafetySettings {
    fn default() -> Self {
        Self {
            threshold: SafetyThreshold::Standard,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub model_id: String,
    pub prompt: String,
    pub sampling_params: SamplingParams,
    pub max_output_tokens: u32,
    #[serde(default)]
    pub stop_sequences: Vec<String>,
    #[serde(default)]
    pub safety_settings: SafetySettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    Safety,
    Error,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl TokenUsage {
    pub fn total(&self) -> u32 {
        self.prompt_tokens + self.completion_tokens
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationResponse {
    pub text: String,
    pub usage: TokenUsage,
    pub finish_reason: FinishReason,
    /// Empty unless the provider flagged content; non-empty ratings above
    /// the configured threshold map to `FinishReason::Safety`.
    pub safety_ratings: Vec<String>,
}

/// One fragment of a streamed generation. The terminal chunk carries
/// `finish_reason` and the cumulative `usage` seen so far; intermediate
/// chunks carry only a text delta.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationChunk {
    pub text_delta: String,
    pub finish_reason: Option<FinishReason>,
    pub usage: Option<TokenUsage>,
}

impl GenerationChunk {
    pub fn delta(text_delta: impl Into<String>) -> Self {
        Self {
            text_delta: text_delta.into(),
            finish_reason: None,
            usage: None,
        }
    }

    pub fn terminal(finish_reason: FinishReason, usage: TokenUsage) -> Self {
        Self {
            text_delta: String::new(),
            finish_reason: Some(finish_reason),
            usage: Some(usage),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.finish_reason.is_some()
    }
}
