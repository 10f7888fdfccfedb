//! The Realism Engine (spec.md §4.5): repairs generated rows against domain
//! constraints, business rules, temporal consistency and cross-field
//! relationships, scrubs regulated PII, and scores the result into
//! [`goc_protocol::QualityMetrics`]. Also supplies the per-row quality
//! scorer the Router's ensemble merge needs (see [`RealismRowScorer`]).

pub mod constraints;
pub mod cross_field;
pub mod diagnostics;
pub mod generators;
pub mod metrics;
pub mod pipeline;
pub mod rules;
pub mod scrubbing;
pub mod temporal;

pub use cross_field::{Authority, CrossFieldConfig, CrossFieldPair};
pub use diagnostics::{RowViolation, ViolationKind};
pub use metrics::PrivacyBudgetHeadroom;
pub use pipeline::PipelineOutcome;
pub use rules::{parse_rule, BusinessRule, RulePredicate};
pub use scrubbing::detect_domain;

use goc_router::RowScorer;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::Value;
use std::sync::Mutex;

/// Scores a candidate row by how many of `columns`' declared constraints it
/// satisfies without needing repair — the ensemble merge's notion of
/// "quality" per spec.md §4.3. Wraps its own RNG since scoring must never
/// mutate the row it's judging; repair candidates that would need
/// regeneration are simply scored lower, not fixed in place.
pub struct RealismRowScorer {
    columns: Vec<goc_protocol::Column>,
    rng: Mutex<StdRng>,
}

impl RealismRowScorer {
    pub fn new(columns: Vec<goc_protocol::Column>) -> Self {
        Self {
            columns,
            rng: Mutex::new(StdRng::seed_from_u64(0)),
        }
    }
}

impl RowScorer for RealismRowScorer {
    fn score(&self, row: &Value) -> f64 {
        let Some(object) = row.as_object() else { return 0.0 };
        if self.columns.is_empty() {
            return 1.0;
        }
        let mut probe = object.clone();
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let violations = constraints::apply_constraints(&self.columns, &mut probe, &mut *rng);
        let clean = violations.is_empty();
        if clean {
            1.0
        } else {
            let repaired = violations.iter().filter(|v| v.repaired).count();
            0.5 * (repaired as f64 / violations.len() as f64)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use goc_protocol::{Column, LogicalType};
    use serde_json::json;

    #[test]
    fn conforming_row_scores_highest() {
        let mut age = Column::required("age", LogicalType::Integer);
        age.value_range = Some((0.0, 120.0));
        let scorer = RealismRowScorer::new(vec![age]);
        assert_eq!(scorer.score(&json!({"age": 42})), 1.0);
    }

    #[test]
    fn violating_row_scores_lower() {
        let mut age = Column::required("age", LogicalType::Integer);
        age.value_range = Some((0.0, 120.0));
        let scorer = RealismRowScorer::new(vec![age]);
        assert!(scorer.score(&json!({"age": 500})) < 1.0);
    }

    #[test]
    fn empty_column_set_scores_everything_perfectly() {
        let scorer = RealismRowScorer::new(vec![]);
        assert_eq!(scorer.score(&json!({"a": 1})), 1.0);
    }

    #[test]
    fn non_object_row_scores_zero() {
        let scorer = RealismRowScorer::new(vec![]);
        assert_eq!(scorer.score(&json!([1, 2, 3])), 0.0);
    }
}
