//! Per-provider health cache (spec.md §4.2: "a cached health check, TTL 30s,
//! probes the cheapest model with a minimal prompt"). The Router consults
//! this before routing to avoid sending real work to a provider that just
//! failed its last probe.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::provider::Provider;
use crate::types::{GenerationRequest, SamplingParams};
use goc_protocol::Provider as ProviderKind;

const HEALTH_CHECK_TTL: Duration = Duration::from_secs(30);
const PROBE_PROMPT: &str = "ping";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

struct CachedHealth {
    status: HealthStatus,
    checked_at: Instant,
}

/// Caches the result of probing each provider's cheapest model so repeated
/// routing decisions within the TTL window don't re-probe.
pub struct HealthCache {
    ttl: Duration,
    entries: Mutex<HashMap<ProviderKind, CachedHealth>>,
}

impl Default for HealthCache {
    fn default() -> Self {
        Self::new(HEALTH_CHECK_TTL)
    }
}

impl HealthCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the cached status if still within the TTL window, probing the
    /// provider with a minimal prompt otherwise.
    pub async fn check(&self, provider: &dyn Provider) -> HealthStatus {
        let kind = provider.kind();
        if let Some(status) = self.cached(kind) {
            return status;
        }

        let status = self.probe(provider).await;
        self.entries.lock().expect("health cache lock poisoned").insert(
            kind,
            CachedHealth {
                status,
                checked_at: Instant::now(),
            },
        );
        status
    }

    fn cached(&self, kind: ProviderKind) -> Option<HealthStatus> {
        let entries = self.entries.lock().expect("health cache lock poisoned");
        entries.get(&kind).and_then(|entry| {
            if entry.checked_at.elapsed() < self.ttl {
                Some(entry.status)
            } else {
                None
            }
        })
    }

    async fn probe(&self, provider: &dyn Provider) -> HealthStatus {
        let request = GenerationRequest {
            model_id: provider.cheapest_model().to_string(),
            prompt: PROBE_PROMPT.to_string(),
            sampling_params: SamplingParams {
                temperature: 0.0,
                top_p: 1.0,
                top_k: 1,
            },
            max_output_tokens: 8,
            stop_sequences: Vec::new(),
            safety_settings: Default::default(),
        };
        match provider.generate(&request).await {
            Ok(_) => HealthStatus::Healthy,
            Err(_) => HealthStatus::Unhealthy,
        }
    }
}
