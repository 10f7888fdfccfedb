//! Static per-model routing table: endpoint path on the mediated gateway,
//! pricing, context length and default safety settings (spec.md §4.2:
//! "the Gateway therefore knows per-model endpoints, pricing ... and
//! default safety settings"). Not fetched at runtime.

use crate::types::SafetySettings;
use goc_protocol::{model_profiles, ModelProfile};
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct ModelRoute {
    pub profile: ModelProfile,
    pub gateway_path: &'static str,
    pub default_safety: SafetySettings,
}

pub fn model_routes() -> HashMap<&'static str, ModelRoute> {
    let profiles = model_profiles();
    let mut routes = HashMap::new();
    routes.insert(
        "claude-sonnet-4-20250514",
        ModelRoute {
            profile: profiles["claude-sonnet-4-20250514"],
            gateway_path: "/v1/providers/claude/generate",
            default_safety: SafetySettings::default(),
        },
    );
    routes.insert(
        "gpt-4.1",
        ModelRoute {
            profile: profiles["gpt-4.1"],
            gateway_path: "/v1/providers/gpt/generate",
            default_safety: SafetySettings::default(),
        },
    );
    routes.insert(
        "palm-codey-2",
        ModelRoute {
            profile: profiles["palm-codey-2"],
            gateway_path: "/v1/providers/palm/generate",
            default_safety: SafetySettings::default(),
        },
    );
    routes
}

/// Estimated USD cost of a call, used by the Router's cost-bonus term
/// (spec.md §4.3).
pub fn estimated_cost_usd(profile: &ModelProfile, prompt_tokens: u32, completion_tokens: u32) -> f64 {
    let input_cost = (prompt_tokens as f64 / 1000.0) * profile.cost_per_1k_input_tokens_usd;
    let output_cost = (completion_tokens as f64 / 1000.0) * profile.cost_per_1k_output_tokens_usd;
    input_cost + output_cost
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_provider_has_a_route() {
        let routes = model_routes();
        assert_eq!(routes.len(), 3);
        assert!(routes.contains_key("claude-sonnet-4-20250514"));
    }

    #[test]
    fn cost_estimate_scales_with_tokens() {
        let routes = model_routes();
        let profile = routes["gpt-4.1"].profile;
        let cheap = estimated_cost_usd(&profile, 100, 100);
        let expensive = estimated_cost_usd(&profile, 1000, 1000);
        assert!(expensive > cheap);
    }
}
