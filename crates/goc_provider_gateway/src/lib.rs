//! Uniform interface over the three supported model providers. Generalizes
//! the teacher's single-vendor `LlmProvider` trait (`casparian`'s
//! `cli/tui/llm` module) into a mediated gateway that retries transient
//! failures, caches per-provider health, and reports pricing alongside
//! every response.

pub mod gateway;
pub mod health;
pub mod http;
pub mod mock;
pub mod pricing;
pub mod provider;
pub mod retry;
pub mod types;

pub use gateway::{GatewayResponse, ProviderGateway};
pub use health::{HealthCache, HealthStatus};
pub use http::HttpProvider;
pub use mock::{MockBehavior, MockProvider};
pub use pricing::{estimated_cost_usd, model_routes, ModelRoute};
pub use provider::Provider;
pub use retry::{retry_with_backoff, RetryPolicy};
pub use types::{
    FinishReason, GenerationChunk, GenerationRequest, GenerationResponse, SamplingParams,
    SafetySettings, SafetyThreshold, TokenUsage,
};
