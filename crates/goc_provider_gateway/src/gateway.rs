//! The mediated gateway itself: dispatches to the concrete [`Provider`] for
//! a requested model, wraps the call in [`retry_with_backoff`], and reports
//! health/pricing alongside the raw response. Providers are registered once
//! at construction (spec.md §4.2, Design Notes §9: closed set, no dynamic
//! registry), mirroring how the teacher's `LlmConfig` resolves a single
//! configured provider rather than dispatching dynamically.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::BoxStream;
use goc_ids::CorrelationId;
use goc_protocol::{GocError, Provider as ProviderKind};
use tokio::time::timeout;

use crate::health::{HealthCache, HealthStatus};
use crate::pricing::{estimated_cost_usd, model_routes, ModelRoute};
use crate::provider::Provider;
use crate::retry::{retry_with_backoff, RetryPolicy};
use crate::types::{GenerationChunk, GenerationRequest, GenerationResponse};

/// Per-call timeout enforced around every provider invocation (spec.md
/// §4.2: "a per-call timeout of 30s wraps every attempt").
const CALL_TIMEOUT: Duration = Duration::from_secs(30);

pub struct GatewayResponse {
    pub response: GenerationResponse,
    pub estimated_cost_usd: f64,
}

pub struct ProviderGateway {
    providers: HashMap<ProviderKind, Arc<dyn Provider>>,
    routes: HashMap<&'static str, ModelRoute>,
    retry_policy: RetryPolicy,
    health: HealthCache,
}

impl ProviderGateway {
    pub fn new(providers: Vec<Arc<dyn Provider>>) -> Self {
        let mut by_kind = HashMap::new();
        for provider in providers {
            by_kind.insert(provider.kind(), provider);
        }
        Self {
            providers: by_kind,
            routes: model_routes(),
            retry_policy: RetryPolicy::DEFAULT,
            health: HealthCache::default(),
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn providers(&self) -> impl Iterator<Item = ProviderKind> + '_ {
        self.providers.keys().copied()
    }

    pub fn route_for(&self, model_id: &str) -> Option<&ModelRoute> {
        self.routes.get(model_id)
    }

    pub async fn health_of(&self, kind: ProviderKind) -> Option<HealthStatus> {
        let provider = self.providers.get(&kind)?;
        Some(self.health.check(provider.as_ref()).await)
    }

    fn provider_for(&self, kind: ProviderKind, correlation_id: &CorrelationId) -> Result<&Arc<dyn Provider>, GocError> {
        self.providers.get(&kind).ok_or_else(|| GocError::ProviderUnavailable {
            provider: kind.id().to_string(),
            message: "no provider registered for this kind".to_string(),
            correlation_id: correlation_id.clone(),
        })
    }

    /// Issues a single non-streaming generation, retrying transient
    /// failures up to the gateway's retry policy and enforcing the per-call
    /// timeout on each attempt.
    pub async fn generate(
        &self,
        kind: ProviderKind,
        req: &GenerationRequest,
        correlation_id: &CorrelationId,
    ) -> Result<GatewayResponse, GocError> {
        let provider = self.provider_for(kind, correlation_id)?.clone();
        let cid = correlation_id.clone();
        let response = retry_with_backoff(self.retry_policy, |_attempt| {
            let provider = provider.clone();
            let cid = cid.clone();
            async move { call_with_timeout(provider.as_ref(), req, &cid).await }
        })
        .await?;

        let route = self.routes.get(req.model_id.as_str());
        let estimated_cost_usd = route
            .map(|route| estimated_cost_usd(&route.profile, response.usage.prompt_tokens, response.usage.completion_tokens))
            .unwrap_or(0.0);

        Ok(GatewayResponse {
            response,
            estimated_cost_usd,
        })
    }

    /// Streaming variant. Streaming calls are not retried mid-stream
    /// (spec.md §4.4: a dropped stream surfaces as a terminal error to the
    /// caller, which decides whether to restart); only the initial
    /// connection attempt goes through the retry policy.
    pub async fn generate_stream(
        &self,
        kind: ProviderKind,
        req: &GenerationRequest,
        correlation_id: &CorrelationId,
    ) -> Result<BoxStream<'static, Result<GenerationChunk, GocError>>, GocError> {
        let provider = self.provider_for(kind, correlation_id)?.clone();
        let cid = correlation_id.clone();
        retry_with_backoff(self.retry_policy, |_attempt| {
            let provider = provider.clone();
            let cid = cid.clone();
            async move {
                timeout(CALL_TIMEOUT, provider.generate_stream(req))
                    .await
                    .map_err(|_| GocError::ProviderTimeout {
                        provider: provider.kind().id().to_string(),
                        elapsed_ms: CALL_TIMEOUT.as_millis() as u64,
                        correlation_id: cid.clone(),
                    })?
            }
        })
        .await
    }
}

async fn call_with_timeout(
    provider: &dyn Provider,
    req: &GenerationRequest,
    correlation_id: &CorrelationId,
) -> Result<GenerationResponse, GocError> {
    timeout(CALL_TIMEOUT, provider.generate(req))
        .await
        .map_err(|_| GocError::ProviderTimeout {
            provider: provider.kind().id().to_string(),
            elapsed_ms: CALL_TIMEOUT.as_millis() as u64,
            correlation_id: correlation_id.clone(),
        })?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockBehavior, MockProvider};

    fn sample_request() -> GenerationRequest {
        GenerationRequest {
            model_id: "claude-sonnet-4-20250514".into(),
            prompt: "generate 1 row".into(),
            sampling_params: crate::types::SamplingParams {
                temperature: 1.0,
                top_p: 1.0,
                top_k: 40,
            },
            max_output_tokens: 256,
            stop_sequences: vec![],
            safety_settings: Default::default(),
        }
    }

    #[tokio::test]
    async fn generate_dispatches_to_the_matching_provider() {
        let provider: Arc<dyn Provider> = Arc::new(MockProvider::new(ProviderKind::Claude, "claude-sonnet-4-20250514"));
        let gateway = ProviderGateway::new(vec![provider]);
        let correlation_id = CorrelationId::new();
        let result = gateway
            .generate(ProviderKind::Claude, &sample_request(), &correlation_id)
            .await
            .unwrap();
        assert!(result.estimated_cost_usd >= 0.0);
    }

    #[tokio::test]
    async fn generate_fails_fast_for_unregistered_provider() {
        let gateway = ProviderGateway::new(vec![]);
        let correlation_id = CorrelationId::new();
        let err = gateway
            .generate(ProviderKind::Gpt, &sample_request(), &correlation_id)
            .await
            .unwrap_err();
        assert!(matches!(err, GocError::ProviderUnavailable { .. }));
    }

    #[tokio::test]
    async fn generate_retries_transient_failures_then_succeeds() {
        let provider = MockProvider::new(ProviderKind::Claude, "claude-sonnet-4-20250514");
        provider.queue(MockBehavior::Transient { message: "503".into() });
        let provider: Arc<dyn Provider> = Arc::new(provider);
        let gateway =
            ProviderGateway::new(vec![provider]).with_retry_policy(RetryPolicy::with_max_attempts(3));
        let correlation_id = CorrelationId::new();
        let result = gateway
            .generate(ProviderKind::Claude, &sample_request(), &correlation_id)
            .await;
        assert!(result.is_ok());
    }
}
