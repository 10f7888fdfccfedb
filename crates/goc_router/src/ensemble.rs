//! Ensemble merge (spec.md §4.3): when `strategy = hybrid` with the
//! ensemble flag set, the Router invokes >= 2 providers concurrently and
//! merges their output row-by-row, preferring the highest-quality row at
//! each position.
//!
//! Per-row quality is "computed by the Realism Engine" per spec, but
//! `goc_realism` sits *after* the Router in the dependency order (Storage,
//! Quota, Schema -> Provider Gateway -> Router -> Realism -> Streaming ->
//! Job Manager), so this module can't depend on it directly without a
//! cycle. Instead the scorer is injected by the caller (`goc_jobs`, which
//! depends on both crates) through the [`RowScorer`] trait — ordinary
//! dependency inversion, not a deviation from the merge rule itself.

use goc_protocol::Provider;
use serde_json::Value;

/// Scores one generated row in `[0, 1]`; higher is better. Implemented by
/// `goc_realism` in the full pipeline.
pub trait RowScorer: Send + Sync {
    fn score(&self, row: &Value) -> f64;
}

pub struct EnsembleResult {
    pub rows: Vec<Value>,
    pub ensemble_used: bool,
    pub contributing_providers: Vec<Provider>,
}

/// Merges per-row output from `>= 2` providers. `primary` breaks ties when
/// two providers score a row position identically. `rows_by_provider`
/// entries are assumed already aligned by row index; a provider missing a
/// row at some index contributes nothing for that position.
pub fn merge_ensemble(
    rows_by_provider: &[(Provider, Vec<Value>)],
    scorer: &dyn RowScorer,
    primary: Provider,
) -> EnsembleResult {
    if rows_by_provider.len() < 2 {
        let rows = rows_by_provider.first().map(|(_, rows)| rows.clone()).unwrap_or_default();
        return EnsembleResult {
            rows,
            ensemble_used: false,
            contributing_providers: rows_by_provider.iter().map(|(p, _)| *p).collect(),
        };
    }

    let row_count = rows_by_provider.iter().map(|(_, rows)| rows.len()).max().unwrap_or(0);
    let mut merged = Vec::with_capacity(row_count);
    let mut contributing = std::collections::HashSet::new();

    for index in 0..row_count {
        let mut best: Option<(Provider, &Value, f64)> = None;
        for (provider, rows) in rows_by_provider {
            let Some(row) = rows.get(index) else { continue };
            let score = scorer.score(row);
            let is_better = match &best {
                None => true,
                Some((best_provider, _, best_score)) => {
                    score > *best_score || (score == *best_score && *provider == primary && *best_provider != primary)
                }
            };
            if is_better {
                best = Some((*provider, row, score));
            }
        }
        if let Some((provider, row, _)) = best {
            contributing.insert(provider);
            merged.push(row.clone());
        }
    }

    EnsembleResult {
        rows: merged,
        ensemble_used: true,
        contributing_providers: Provider::ALL.into_iter().filter(|p| contributing.contains(p)).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct LengthScorer;
    impl RowScorer for LengthScorer {
        fn score(&self, row: &Value) -> f64 {
            row.to_string().len() as f64
        }
    }

    #[test]
    fn single_provider_is_not_an_ensemble() {
        let rows = vec![(Provider::Claude, vec![json!({"a": 1})])];
        let result = merge_ensemble(&rows, &LengthScorer, Provider::Claude);
        assert!(!result.ensemble_used);
    }

    #[test]
    fn picks_highest_scoring_row_per_position() {
        let rows = vec![
            (Provider::Claude, vec![json!({"a": 1})]),
            (Provider::Gpt, vec![json!({"a": 1, "b": "much longer value here"})]),
        ];
        let result = merge_ensemble(&rows, &LengthScorer, Provider::Claude);
        assert!(result.ensemble_used);
        assert_eq!(result.rows[0]["b"], "much longer value here");
        assert!(result.contributing_providers.contains(&Provider::Gpt));
    }

    #[test]
    fn exact_tie_prefers_the_primary_provider() {
        struct FlatScorer;
        impl RowScorer for FlatScorer {
            fn score(&self, _row: &Value) -> f64 {
                1.0
            }
        }
        let rows = vec![
            (Provider::Gpt, vec![json!({"from": "gpt"})]),
            (Provider::Claude, vec![json!({"from": "claude"})]),
        ];
        let result = merge_ensemble(&rows, &FlatScorer, Provider::Claude);
        assert_eq!(result.rows[0]["from"], "claude");
    }

    #[test]
    fn missing_row_at_a_position_is_skipped_for_that_provider() {
        let rows = vec![
            (Provider::Claude, vec![json!({"a": 1})]),
            (Provider::Gpt, vec![json!({"a": 1}), json!({"a": 2})]),
        ];
        let result = merge_ensemble(&rows, &LengthScorer, Provider::Claude);
        assert_eq!(result.rows.len(), 2);
    }
}
