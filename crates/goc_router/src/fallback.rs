//! Fallback chain walking (spec.md §4.3: "if the primary provider returns a
//! non-retryable failure, or exhausts retries, the Router invokes the next
//! fallback with the same request. Exhausting the list surfaces the last
//! error as `ProviderUnavailable`.").

use goc_ids::CorrelationId;
use goc_protocol::{GocError, Provider};
use goc_provider_gateway::{GatewayResponse, GenerationRequest, ProviderGateway};

/// Walks `ordered_providers` (already ranked by [`crate::score::rank_providers`])
/// invoking the gateway for each in turn until one succeeds or the list is
/// exhausted. Only errors [`GocError::is_fallback_eligible`] trigger moving
/// to the next provider; anything else (e.g. `SafetyRefused`,
/// `QualityBelowThreshold`) is returned immediately.
pub async fn invoke_with_fallback(
    gateway: &ProviderGateway,
    ordered_providers: &[Provider],
    req: &GenerationRequest,
    correlation_id: &CorrelationId,
) -> Result<(Provider, GatewayResponse), GocError> {
    let mut last_error: Option<GocError> = None;

    for &provider in ordered_providers {
        match gateway.generate(provider, req, correlation_id).await {
            Ok(response) => return Ok((provider, response)),
            Err(err) if err.is_fallback_eligible() => {
                tracing::warn!(provider = provider.id(), error = %err, "falling back to next provider");
                last_error = Some(err);
            }
            Err(err) => return Err(err),
        }
    }

    Err(last_error.unwrap_or_else(|| GocError::ProviderUnavailable {
        provider: "none".to_string(),
        message: "no providers configured".to_string(),
        correlation_id: correlation_id.clone(),
    }))
}
