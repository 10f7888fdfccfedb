//! Provider scoring (spec.md §4.3): `s = 0.4·accuracy + 0.2·speed_bonus +
//! 0.2·cost_bonus + 0.2·quality_match`, weighted-sum accumulation grounded
//! on the teacher's `calculate_confidence` (`ai/pathfinder/analyzer.rs`),
//! generalized from path-pattern confidence to provider routing.

use goc_protocol::{GenerationStrategy, ModelProfile, Provider};

const ACCURACY_WEIGHT: f64 = 0.4;
const SPEED_WEIGHT: f64 = 0.2;
const COST_WEIGHT: f64 = 0.2;
const QUALITY_MATCH_WEIGHT: f64 = 0.2;

#[derive(Debug, Clone, Copy)]
pub struct ScoredProvider {
    pub provider: Provider,
    pub score: f64,
}

/// Strategies that care more about latency (streaming, interactive use)
/// weight `relative_speed` more heavily than strategies that run as one
/// large batch.
fn strategy_speed_weight(strategy: GenerationStrategy) -> f64 {
    match strategy {
        GenerationStrategy::Hybrid | GenerationStrategy::AiCreative => 1.0,
        GenerationStrategy::ConstraintDriven => 0.8,
        GenerationStrategy::Statistical | GenerationStrategy::PatternBased => 0.5,
    }
}

fn speed_bonus(profile: &ModelProfile, strategy: GenerationStrategy) -> f64 {
    (profile.relative_speed * strategy_speed_weight(strategy)).clamp(0.0, 1.0)
}

/// Reward for meeting or exceeding `quality_threshold`; partial credit below
/// it, scaled linearly toward zero.
fn quality_match(profile: &ModelProfile, quality_threshold: f64) -> f64 {
    if quality_threshold <= 0.0 {
        return 1.0;
    }
    if profile.accuracy_rating >= quality_threshold {
        1.0
    } else {
        (profile.accuracy_rating / quality_threshold).clamp(0.0, 1.0)
    }
}

/// Min-max normalized, inverted so the cheapest candidate in the set scores
/// `1.0` and the most expensive scores `0.0`. A singleton set scores `1.0`.
fn cost_bonus(profile: &ModelProfile, candidates: &[ModelProfile]) -> f64 {
    let cost = estimated_per_1k_cost(profile);
    let costs: Vec<f64> = candidates.iter().map(estimated_per_1k_cost).collect();
    let min = costs.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = costs.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if (max - min).abs() < f64::EPSILON {
        return 1.0;
    }
    1.0 - (cost - min) / (max - min)
}

fn estimated_per_1k_cost(profile: &ModelProfile) -> f64 {
    profile.cost_per_1k_input_tokens_usd + profile.cost_per_1k_output_tokens_usd
}

/// Scores every candidate, highest first. Ties are broken by `provider_weights`,
/// then by lexicographic provider id for a fully deterministic order.
pub fn rank_providers(
    candidates: &[(Provider, ModelProfile)],
    strategy: GenerationStrategy,
    quality_threshold: f64,
    weights: &crate::weights::ProviderWeights,
) -> Vec<ScoredProvider> {
    let profiles: Vec<ModelProfile> = candidates.iter().map(|(_, profile)| *profile).collect();

    let mut scored: Vec<ScoredProvider> = candidates
        .iter()
        .map(|(provider, profile)| {
            let score = ACCURACY_WEIGHT * profile.accuracy_rating
                + SPEED_WEIGHT * speed_bonus(profile, strategy)
                + COST_WEIGHT * cost_bonus(profile, &profiles)
                + QUALITY_MATCH_WEIGHT * quality_match(profile, quality_threshold);
            ScoredProvider {
                provider: *provider,
                score,
            }
        })
        .collect();

    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| {
                weights
                    .weight_of(b.provider)
                    .partial_cmp(&weights.weight_of(a.provider))
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .then_with(|| a.provider.id().cmp(b.provider.id()))
    });
    scored
}

#[cfg(test)]
mod tests {
    use super::*;
    use goc_protocol::model_profiles;

    fn candidates() -> Vec<(Provider, ModelProfile)> {
        let profiles = model_profiles();
        vec![
            (Provider::Claude, profiles["claude-sonnet-4-20250514"]),
            (Provider::Gpt, profiles["gpt-4.1"]),
            (Provider::Palm, profiles["palm-codey-2"]),
        ]
    }

    #[test]
    fn ranking_is_deterministic_for_identical_inputs() {
        let weights = crate::weights::ProviderWeights::new();
        let a = rank_providers(&candidates(), GenerationStrategy::Hybrid, 0.8, &weights);
        let b = rank_providers(&candidates(), GenerationStrategy::Hybrid, 0.8, &weights);
        let order_a: Vec<Provider> = a.iter().map(|s| s.provider).collect();
        let order_b: Vec<Provider> = b.iter().map(|s| s.provider).collect();
        assert_eq!(order_a, order_b);
    }

    #[test]
    fn higher_quality_threshold_favors_more_accurate_providers() {
        let weights = crate::weights::ProviderWeights::new();
        let ranked = rank_providers(&candidates(), GenerationStrategy::Hybrid, 0.95, &weights);
        assert_eq!(ranked[0].provider, Provider::Claude);
    }

    #[test]
    fn exact_score_ties_fall_back_to_lexicographic_provider_id() {
        let profile = model_profiles()["claude-sonnet-4-20250514"];
        let tied = vec![
            (Provider::Gpt, profile),
            (Provider::Claude, profile),
            (Provider::Palm, profile),
        ];
        let weights = crate::weights::ProviderWeights::new();
        let ranked = rank_providers(&tied, GenerationStrategy::Hybrid, 0.8, &weights);
        assert_eq!(ranked[0].provider, Provider::Claude);
        assert_eq!(ranked[1].provider, Provider::Gpt);
        assert_eq!(ranked[2].provider, Provider::Palm);
    }

    #[test]
    fn configured_weight_breaks_a_score_tie() {
        let profile = model_profiles()["claude-sonnet-4-20250514"];
        let tied = vec![(Provider::Gpt, profile), (Provider::Palm, profile)];
        let weights = crate::weights::ProviderWeights::new().with(Provider::Palm, 2.0);
        let ranked = rank_providers(&tied, GenerationStrategy::Hybrid, 0.8, &weights);
        assert_eq!(ranked[0].provider, Provider::Palm);
    }
}
