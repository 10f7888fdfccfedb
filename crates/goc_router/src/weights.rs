//! Configured tie-break weights per provider (spec.md §4.3: "ties are
//! broken by configured `provider_weights`"). Missing entries default to
//! `1.0`, same weight for everyone.

use goc_protocol::Provider;
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct ProviderWeights(HashMap<Provider, f64>);

impl ProviderWeights {
    pub fn new() -> Self {
        Self(HashMap::new())
    }

    pub fn with(mut self, provider: Provider, weight: f64) -> Self {
        self.0.insert(provider, weight);
        self
    }

    pub fn weight_of(&self, provider: Provider) -> f64 {
        *self.0.get(&provider).unwrap_or(&1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unconfigured_provider_defaults_to_equal_weight() {
        let weights = ProviderWeights::new();
        assert_eq!(weights.weight_of(Provider::Claude), 1.0);
    }

    #[test]
    fn configured_weight_overrides_default() {
        let weights = ProviderWeights::new().with(Provider::Gpt, 1.5);
        assert_eq!(weights.weight_of(Provider::Gpt), 1.5);
        assert_eq!(weights.weight_of(Provider::Claude), 1.0);
    }
}
