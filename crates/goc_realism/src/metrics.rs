//! Quality metrics computation (spec.md §4.5.6): the six `[0,1]` components
//! of [`goc_protocol::QualityMetrics`], computed from the repair pass's
//! observed violations plus the reservation's privacy-budget headroom.

use crate::diagnostics::RowViolation;
use goc_protocol::{Correlation, QualityMetrics};
use serde_json::{Map, Value};

/// Inputs the pipeline accumulates across a batch, independent of any one
/// row's violations, and needed to compute dataset-level components.
#[derive(Debug, Clone, Copy)]
pub struct PrivacyBudgetHeadroom {
    pub epsilon_spent: f64,
    pub epsilon_total: f64,
    pub delta_spent: f64,
    pub delta_total: f64,
}

impl PrivacyBudgetHeadroom {
    fn epsilon_headroom(&self) -> f64 {
        if self.epsilon_total <= 0.0 {
            return 0.0;
        }
        (1.0 - self.epsilon_spent / self.epsilon_total).clamp(0.0, 1.0)
    }

    fn delta_headroom(&self) -> f64 {
        if self.delta_total <= 0.0 {
            return 0.0;
        }
        (1.0 - self.delta_spent / self.delta_total).clamp(0.0, 1.0)
    }
}

/// `pii_scrub_completeness`: fraction of PII-tagged fields across the batch
/// that were actually scrubbed, out of those that needed it. A batch with no
/// PII-tagged fields at all scores full marks — there was nothing to leak.
pub fn pii_scrub_completeness(pii_fields_total: usize, pii_fields_scrubbed: usize) -> f64 {
    if pii_fields_total == 0 {
        1.0
    } else {
        (pii_fields_scrubbed as f64 / pii_fields_total as f64).clamp(0.0, 1.0)
    }
}

/// spec.md §9's resolved Open Question: `privacy_protection` blends scrub
/// completeness with both differential-privacy budget headrooms.
pub fn privacy_protection(scrub_completeness: f64, headroom: PrivacyBudgetHeadroom) -> f64 {
    (0.5 * scrub_completeness + 0.3 * headroom.epsilon_headroom() + 0.2 * headroom.delta_headroom()).clamp(0.0, 1.0)
}

/// `constraint_compliance`: fraction of rows with zero *remaining*
/// (irreparable) violations after the repair pass ran.
pub fn constraint_compliance(violations_by_row: &[Vec<RowViolation>]) -> f64 {
    if violations_by_row.is_empty() {
        return 1.0;
    }
    let clean_rows = violations_by_row
        .iter()
        .filter(|violations| violations.iter().all(|v| v.repaired))
        .count();
    clean_rows as f64 / violations_by_row.len() as f64
}

/// `semantic_coherence`: fraction of violations that were successfully
/// repaired (vs. left irreparable), across the whole batch. Distinct from
/// `constraint_compliance`, which is row-granular; this one is
/// violation-granular, so one badly-behaved row with many irreparable
/// fields weighs more heavily here than in `constraint_compliance`.
pub fn semantic_coherence(violations_by_row: &[Vec<RowViolation>]) -> f64 {
    let all: Vec<&RowViolation> = violations_by_row.iter().flatten().collect();
    if all.is_empty() {
        return 1.0;
    }
    let repaired = all.iter().filter(|v| v.repaired).count();
    repaired as f64 / all.len() as f64
}

/// `correlation_preservation`: average absolute difference between the
/// descriptor's declared coefficients and the coefficients actually observed
/// in the generated batch, inverted so 1.0 means perfect preservation.
pub fn correlation_preservation(declared: &[Correlation], observed: &[(String, String, f64)]) -> f64 {
    if declared.is_empty() {
        return 1.0;
    }
    let mut total_error = 0.0;
    for correlation in declared {
        let observed_coefficient = observed
            .iter()
            .find(|(a, b, _)| {
                (a == &correlation.column_a && b == &correlation.column_b)
                    || (a == &correlation.column_b && b == &correlation.column_a)
            })
            .map(|(_, _, c)| *c)
            .unwrap_or(0.0);
        total_error += (correlation.coefficient - observed_coefficient).abs();
    }
    (1.0 - (total_error / declared.len() as f64) / 2.0).clamp(0.0, 1.0)
}

/// `statistical_similarity` / `distribution_fidelity`: both approximated from
/// the same signal in this core — how close each numeric column's observed
/// mean sits relative to its declared `value_range` midpoint, since no
/// reference statistical sample is retained past job submission (see
/// [`crate::temporal`] for the same narrowing rationale applied there).
pub fn numeric_range_fidelity(columns_with_ranges: &[(String, (f64, f64))], rows: &[Map<String, Value>]) -> f64 {
    if columns_with_ranges.is_empty() || rows.is_empty() {
        return 1.0;
    }
    let mut total = 0.0;
    for (name, (lo, hi)) in columns_with_ranges {
        let values: Vec<f64> = rows.iter().filter_map(|r| r.get(name)).filter_map(Value::as_f64).collect();
        if values.is_empty() {
            total += 1.0;
            continue;
        }
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        let midpoint = (lo + hi) / 2.0;
        let span = (hi - lo).max(f64::EPSILON);
        let deviation = ((mean - midpoint).abs() / (span / 2.0)).clamp(0.0, 1.0);
        total += 1.0 - deviation;
    }
    (total / columns_with_ranges.len() as f64).clamp(0.0, 1.0)
}

/// Assembles the full [`QualityMetrics`] record for one completed batch.
#[allow(clippy::too_many_arguments)]
pub fn compute(
    violations_by_row: &[Vec<RowViolation>],
    declared_correlations: &[Correlation],
    observed_correlations: &[(String, String, f64)],
    numeric_fidelity: f64,
    scrub_completeness: f64,
    headroom: PrivacyBudgetHeadroom,
    execution_time_ms: u64,
    peak_memory_bytes: u64,
) -> QualityMetrics {
    QualityMetrics {
        statistical_similarity: numeric_fidelity,
        distribution_fidelity: numeric_fidelity,
        correlation_preservation: correlation_preservation(declared_correlations, observed_correlations),
        privacy_protection: privacy_protection(scrub_completeness, headroom),
        semantic_coherence: semantic_coherence(violations_by_row),
        constraint_compliance: constraint_compliance(violations_by_row),
        execution_time_ms,
        peak_memory_bytes,
    }
}
