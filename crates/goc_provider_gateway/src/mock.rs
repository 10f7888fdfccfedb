//! Deterministic mock provider, grounded on the teacher's
//! `MockClaudeProvider` (`cli/tui/llm/mock.rs`): a queue of canned
//! behaviors consumed in order, so a test can script exact failure/success
//! sequences (e.g. spec.md S3: "Primary provider returns 503 twice then
//! 500; secondary returns success").
//!
//! Ships in the gateway crate itself, not only under `#[cfg(test)]`, so the
//! Router and Job Manager can be exercised end-to-end without network
//! access — this is how S1-S6 are implemented as integration tests.

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use goc_ids::CorrelationId;
use goc_protocol::GocError;
use std::collections::VecDeque;
use std::sync::Mutex;

use crate::provider::Provider;
use crate::types::{FinishReason, GenerationChunk, GenerationRequest, GenerationResponse, TokenUsage};

/// One scripted outcome for the next `generate`/`generate_stream` call.
#[derive(Debug, Clone)]
pub enum MockBehavior {
    Success { text: String },
    Transient { message: String },
    Timeout { elapsed_ms: u64 },
    SafetyRefused { reason: String },
}

impl MockBehavior {
    pub fn success(text: impl Into<String>) -> Self {
        MockBehavior::Success { text: text.into() }
    }
}

pub struct MockProvider {
    kind: goc_protocol::Provider,
    cheapest_model: &'static str,
    queue: Mutex<VecDeque<MockBehavior>>,
    default_text: String,
}

impl MockProvider {
    pub fn new(kind: goc_protocol::Provider, cheapest_model: &'static str) -> Self {
        Self {
            kind,
            cheapest_model,
            queue: Mutex::new(VecDeque::new()),
            default_text: "synthetic row data".to_string(),
        }
    }

    pub fn with_default_text(mut self, text: impl Into<String>) -> Self {
        self.default_text = text.into();
        self
    }

    pub fn queue(&self, behavior: MockBehavior) {
        self.queue.lock().expect("mock queue lock poisoned").push_back(behavior);
    }

    pub fn queue_all(&self, behaviors: impl IntoIterator<Item = MockBehavior>) {
        let mut queue = self.queue.lock().expect("mock queue lock poisoned");
        queue.extend(behaviors);
    }

    fn next_behavior(&self) -> MockBehavior {
        self.queue
            .lock()
            .expect("mock queue lock poisoned")
            .pop_front()
            .unwrap_or_else(|| MockBehavior::success(self.default_text.clone()))
    }

    fn resolve(&self, behavior: MockBehavior, prompt_tokens: u32) -> Result<GenerationResponse, GocError> {
        match behavior {
            MockBehavior::Success { text } => Ok(completion_tokens_response(&text, prompt_tokens)),
            MockBehavior::Transient { message } => Err(GocError::ProviderTransient {
                provider: self.kind.to_string(),
                message,
                correlation_id: CorrelationId::new(),
            }),
            MockBehavior::Timeout { elapsed_ms } => Err(GocError::ProviderTimeout {
                provider: self.kind.to_string(),
                elapsed_ms,
                correlation_id: CorrelationId::new(),
            }),
            MockBehavior::SafetyRefused { reason } => Err(GocError::SafetyRefused {
                reason,
                correlation_id: CorrelationId::new(),
            }),
        }
    }
}

fn completion_tokens_response(text: &str, prompt_tokens: u32) -> GenerationResponse {
    let completion_tokens = text.split_whitespace().count() as u32;
    GenerationResponse {
        text: text.to_string(),
        usage: TokenUsage {
            prompt_tokens,
            completion_tokens,
        },
        finish_reason: FinishReason::Stop,
        safety_ratings: Vec::new(),
    }
}

fn estimate_prompt_tokens(prompt: &str) -> u32 {
    prompt.split_whitespace().count() as u32
}

#[async_trait]
impl Provider for MockProvider {
    fn kind(&self) -> goc_protocol::Provider {
        self.kind
    }

    fn cheapest_model(&self) -> &'static str {
        self.cheapest_model
    }

    async fn generate(&self, req: &GenerationRequest) -> Result<GenerationResponse, GocError> {
        let behavior = self.next_behavior();
        let prompt_tokens = estimate_prompt_tokens(&req.prompt);
        self.resolve(behavior, prompt_tokens)
    }

    async fn generate_stream(
        &self,
        req: &GenerationRequest,
    ) -> Result<BoxStream<'static, Result<GenerationChunk, GocError>>, GocError> {
        let response = self.generate(req).await?;
        let words: Vec<String> = response.text.split_whitespace().map(str::to_string).collect();
        let finish_reason = response.finish_reason;
        let usage = response.usage;
        let chunks: Vec<Result<GenerationChunk, GocError>> = words
            .into_iter()
            .map(|word| Ok(GenerationChunk::delta(format!("{word} "))))
            .chain(std::iter::once(Ok(GenerationChunk::terminal(finish_reason, usage))))
            .collect();
        Ok(stream::iter(chunks).boxed())
    }
}
