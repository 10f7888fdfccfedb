//! The Realism Engine's top-level orchestrator (spec.md §4.5): runs a batch
//! of generated rows through domain constraints, business rules, temporal
//! consistency, cross-field reconciliation and PII scrubbing, then computes
//! [`goc_protocol::QualityMetrics`] and enforces the quality-threshold
//! failure policy.

use crate::constraints::apply_constraints;
use crate::cross_field::{reconcile, CrossFieldConfig};
use crate::diagnostics::RowViolation;
use crate::metrics::{self, PrivacyBudgetHeadroom};
use crate::rules::{parse_rule, apply_rules, BusinessRule};
use crate::scrubbing::{detect_domain, scrub_row};
use crate::temporal::{apply_pattern, is_temporal, pattern_for};
use chrono::Utc;
use goc_protocol::{CorrelationId, DatasetDescriptor, GocError, QualityMetrics};
use rand::Rng;
use serde_json::{Map, Value};
use tracing::{info, warn};

/// One batch's worth of repair bookkeeping, returned alongside the repaired
/// rows so the caller (`goc_jobs`) can decide whether to accept the batch.
pub struct PipelineOutcome {
    pub rows: Vec<Map<String, Value>>,
    pub metrics: QualityMetrics,
    pub violations_by_row: Vec<Vec<RowViolation>>,
}

/// Runs the full realism pipeline over `rows`, in place conceptually (each
/// row is consumed and returned repaired). `business_rules` are parsed once
/// per batch; malformed rule strings are logged and skipped, never fatal.
#[allow(clippy::too_many_arguments)]
pub fn run(
    descriptor: &DatasetDescriptor,
    rows: Vec<Map<String, Value>>,
    headroom: PrivacyBudgetHeadroom,
    quality_threshold: f64,
    correlation_id: &CorrelationId,
    rng: &mut impl Rng,
) -> Result<PipelineOutcome, GocError> {
    let rules: Vec<BusinessRule> = descriptor
        .business_rules
        .iter()
        .filter_map(|raw| match parse_rule(raw) {
            Some(rule) => Some(rule),
            None => {
                warn!(rule = %raw, "skipping malformed business rule");
                None
            }
        })
        .collect();

    let cross_field_config = CrossFieldConfig::default();
    let domain = detect_domain(descriptor);
    let total_rows = rows.len();
    let base_time = Utc::now();

    let temporal_columns: Vec<_> = descriptor.columns.iter().filter(|c| is_temporal(c)).collect();

    let mut pii_fields_total = 0usize;
    let mut pii_fields_scrubbed = 0usize;
    let mut violations_by_row = Vec::with_capacity(total_rows);
    let mut repaired_rows = Vec::with_capacity(total_rows);

    for (index, mut row) in rows.into_iter().enumerate() {
        let mut violations = apply_constraints(&descriptor.columns, &mut row, rng);
        violations.extend(apply_rules(&rules, &mut row, rng));

        for column in &temporal_columns {
            if !row.contains_key(&column.name) {
                continue;
            }
            let pattern = pattern_for(column);
            let timestamp = apply_pattern(pattern, base_time, index, total_rows.max(1), column.value_range, rng);
            row.insert(column.name.clone(), Value::String(timestamp.to_rfc3339()));
        }

        reconcile(&cross_field_config, &mut row);

        for column in &descriptor.columns {
            if column.semantic_tag.is_some() && row.contains_key(&column.name) {
                pii_fields_total += 1;
            }
        }
        pii_fields_scrubbed += scrub_row(&descriptor.columns, domain, &mut row);

        violations_by_row.push(violations);
        repaired_rows.push(row);
    }

    let scrub_completeness = metrics::pii_scrub_completeness(pii_fields_total, pii_fields_scrubbed);
    let numeric_columns: Vec<_> = descriptor
        .columns
        .iter()
        .filter_map(|c| c.value_range.map(|range| (c.name.clone(), range)))
        .collect();
    let numeric_fidelity = metrics::numeric_range_fidelity(&numeric_columns, &repaired_rows);

    let quality = metrics::compute(
        &violations_by_row,
        &descriptor.correlations,
        &[],
        numeric_fidelity,
        scrub_completeness,
        headroom,
        0,
        0,
    );

    let overall = quality.overall();
    info!(overall, rows = total_rows, "realism pipeline completed batch");

    if overall < quality_threshold {
        return Err(GocError::QualityBelowThreshold {
            achieved: overall,
            threshold: quality_threshold,
            correlation_id: correlation_id.clone(),
        });
    }

    Ok(PipelineOutcome {
        rows: repaired_rows,
        metrics: quality,
        violations_by_row,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use goc_protocol::{Column, LogicalType};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use serde_json::json;

    fn headroom() -> PrivacyBudgetHeadroom {
        PrivacyBudgetHeadroom {
            epsilon_spent: 0.1,
            epsilon_total: 1.0,
            delta_spent: 0.0,
            delta_total: 1e-5,
        }
    }

    fn descriptor() -> DatasetDescriptor {
        let mut age = Column::required("age", LogicalType::Integer);
        age.value_range = Some((0.0, 120.0));
        DatasetDescriptor {
            columns: vec![age],
            business_rules: vec![],
            correlations: vec![],
        }
    }

    #[test]
    fn clean_batch_passes_threshold() {
        let rows = vec![[("age".to_string(), json!(42))].into_iter().collect()];
        let result = run(&descriptor(), rows, headroom(), 0.1, &CorrelationId::new(), &mut StdRng::seed_from_u64(1));
        assert!(result.is_ok());
    }

    #[test]
    fn unrepairable_batch_fails_with_quality_below_threshold() {
        let mut ssn = Column::required("ssn", LogicalType::String);
        ssn.regex_pattern = Some(r"^\d{3}-\d{2}-\d{4}$".to_string());
        let descriptor = DatasetDescriptor {
            columns: vec![ssn],
            business_rules: vec![],
            correlations: vec![],
        };
        let rows: Vec<Map<String, Value>> = (0..5)
            .map(|_| [("ssn".to_string(), json!("not-an-ssn"))].into_iter().collect())
            .collect();
        let result = run(&descriptor, rows, headroom(), 0.99, &CorrelationId::new(), &mut StdRng::seed_from_u64(2));
        assert!(matches!(result, Err(GocError::QualityBelowThreshold { .. })));
    }

    #[test]
    fn malformed_business_rule_is_skipped_not_fatal() {
        let mut descriptor = descriptor();
        descriptor.business_rules = vec!["this is not a rule".to_string()];
        let rows = vec![[("age".to_string(), json!(42))].into_iter().collect()];
        let result = run(&descriptor, rows, headroom(), 0.1, &CorrelationId::new(), &mut StdRng::seed_from_u64(3));
        assert!(result.is_ok());
    }

    #[test]
    fn out_of_range_value_is_repaired_in_returned_rows() {
        let rows = vec![[("age".to_string(), json!(500))].into_iter().collect()];
        let outcome = run(&descriptor(), rows, headroom(), 0.1, &CorrelationId::new(), &mut StdRng::seed_from_u64(4)).unwrap();
        assert_eq!(outcome.rows[0]["age"].as_f64().unwrap(), 120.0);
        assert_eq!(outcome.violations_by_row[0].len(), 1);
    }
}
