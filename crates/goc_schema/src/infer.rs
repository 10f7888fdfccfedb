//! `infer(sample_rows) -> DatasetDescriptor` (spec.md §4.7).
//!
//! Columns are ordered by first appearance in the sample. Each column's type
//! is narrowed with [`TypeCandidates`]; columns that resolve to `String` are
//! additionally checked for a bounded enum (≤20 distinct values, ≥5x average
//! repetition) before falling back to free text. `nullable` and `unique` are
//! derived from the observed values, and a semantic tag is guessed from the
//! column name. Pearson correlations are computed for every pair of numeric
//! columns that both resolved to `Integer` or `Float`.

use crate::candidates::TypeCandidates;
use crate::correlation::pearson;
use crate::semantic::detect_semantic_tag;
use goc_protocol::{Column, Correlation, DatasetDescriptor, LogicalType};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};

const ENUM_MAX_DISTINCT: usize = 20;
const ENUM_MIN_AVG_REPETITION: f64 = 5.0;

struct ColumnAccumulator {
    candidates: TypeCandidates,
    distinct: HashSet<String>,
    non_null_count: u64,
    numeric_samples: Vec<f64>,
}

impl ColumnAccumulator {
    fn new() -> Self {
        Self {
            candidates: TypeCandidates::default(),
            distinct: HashSet::new(),
            non_null_count: 0,
            numeric_samples: Vec::new(),
        }
    }

    fn observe(&mut self, value: &Value) {
        self.candidates.eliminate(value);
        if value.is_null() {
            return;
        }
        self.non_null_count += 1;
        self.distinct.insert(canonical_key(value));
        if let Some(n) = value.as_f64() {
            self.numeric_samples.push(n);
        }
    }

    fn is_enum_eligible(&self) -> bool {
        let distinct = self.distinct.len();
        if distinct == 0 || distinct > ENUM_MAX_DISTINCT {
            return false;
        }
        let avg_repetition = self.non_null_count as f64 / distinct as f64;
        avg_repetition >= ENUM_MIN_AVG_REPETITION
    }
}

fn canonical_key(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Infer a [`DatasetDescriptor`] from a sample of rows. Rows are JSON
/// objects keyed by column name; missing keys in a given row are treated as
/// nulls for that column, matching the original sample's tolerance for
/// ragged input.
pub fn infer(sample_rows: &[Map<String, Value>]) -> DatasetDescriptor {
    let mut order: Vec<String> = Vec::new();
    let mut accumulators: HashMap<String, ColumnAccumulator> = HashMap::new();

    for row in sample_rows {
        for (name, value) in row {
            if !accumulators.contains_key(name) {
                order.push(name.clone());
                accumulators.insert(name.clone(), ColumnAccumulator::new());
            }
        }
    }

    for row in sample_rows {
        for name in &order {
            let value = row.get(name).unwrap_or(&Value::Null);
            accumulators.get_mut(name).unwrap().observe(value);
        }
    }

    let mut columns = Vec::with_capacity(order.len());
    let mut numeric_series: HashMap<&str, &[f64]> = HashMap::new();

    for name in &order {
        let acc = &accumulators[name];
        let resolved = acc.candidates.resolve();

        let (logical_type, enum_values) = if resolved == LogicalType::String && acc.is_enum_eligible() {
            let mut values: Vec<String> = acc.distinct.iter().cloned().collect();
            values.sort();
            (LogicalType::String, Some(values))
        } else {
            (resolved, None)
        };

        let unique = acc.distinct.len() as u64 == acc.non_null_count && acc.non_null_count > 0;

        columns.push(Column {
            name: name.clone(),
            logical_type,
            nullable: acc.candidates.saw_null,
            unique,
            regex_pattern: None,
            value_range: None,
            enum_values,
            semantic_tag: detect_semantic_tag(name).map(str::to_string),
            strategy_override: None,
        });

        if matches!(logical_type, LogicalType::Integer | LogicalType::Float) {
            numeric_series.insert(name.as_str(), acc.numeric_samples.as_slice());
        }
    }

    let correlations = compute_correlations(&order, &numeric_series);

    DatasetDescriptor {
        columns,
        business_rules: Vec::new(),
        correlations,
    }
}

fn compute_correlations(
    order: &[String],
    numeric_series: &HashMap<&str, &[f64]>,
) -> Vec<Correlation> {
    let numeric_columns: Vec<&String> = order.iter().filter(|n| numeric_series.contains_key(n.as_str())).collect();

    let mut correlations = Vec::new();
    for i in 0..numeric_columns.len() {
        for j in (i + 1)..numeric_columns.len() {
            let a = numeric_series[numeric_columns[i].as_str()];
            let b = numeric_series[numeric_columns[j].as_str()];
            if let Some(coefficient) = pearson(a, b) {
                correlations.push(Correlation {
                    column_a: numeric_columns[i].clone(),
                    column_b: numeric_columns[j].clone(),
                    coefficient,
                });
            }
        }
    }
    correlations
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn columns_are_ordered_by_first_appearance() {
        let rows = vec![
            row(&[("id", json!(1)), ("name", json!("a"))]),
            row(&[("id", json!(2)), ("name", json!("b"))]),
        ];
        let descriptor = infer(&rows);
        let names: Vec<&str> = descriptor.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["id", "name"]);
    }

    #[test]
    fn unique_integer_column_is_flagged_unique() {
        let rows = vec![row(&[("id", json!(1))]), row(&[("id", json!(2))]), row(&[("id", json!(3))])];
        let descriptor = infer(&rows);
        assert_eq!(descriptor.columns[0].logical_type, LogicalType::Integer);
        assert!(descriptor.columns[0].unique);
    }

    #[test]
    fn any_null_marks_column_nullable() {
        let rows = vec![row(&[("x", json!(1))]), row(&[("x", Value::Null)])];
        let descriptor = infer(&rows);
        assert!(descriptor.columns[0].nullable);
    }

    #[test]
    fn bounded_repeated_strings_become_enum() {
        let mut rows = Vec::new();
        for _ in 0..30 {
            rows.push(row(&[("status", json!("active"))]));
        }
        for _ in 0..10 {
            rows.push(row(&[("status", json!("inactive"))]));
        }
        let descriptor = infer(&rows);
        let col = &descriptor.columns[0];
        assert_eq!(col.logical_type, LogicalType::String);
        let values = col.enum_values.as_ref().unwrap();
        assert_eq!(values, &vec!["active".to_string(), "inactive".to_string()]);
    }

    #[test]
    fn free_text_does_not_become_enum() {
        let rows: Vec<_> = (0..10)
            .map(|i| row(&[("comment", json!(format!("unique comment {i}")))]))
            .collect();
        let descriptor = infer(&rows);
        assert!(descriptor.columns[0].enum_values.is_none());
    }

    #[test]
    fn semantic_tag_is_attached_by_name() {
        let rows = vec![row(&[("email", json!("a@example.com"))])];
        let descriptor = infer(&rows);
        assert_eq!(descriptor.columns[0].semantic_tag.as_deref(), Some("email"));
    }

    #[test]
    fn correlated_numeric_columns_are_reported() {
        let rows: Vec<_> = (1..=5)
            .map(|i| row(&[("a", json!(i as f64)), ("b", json!(i as f64 * 2.0))]))
            .collect();
        let descriptor = infer(&rows);
        assert_eq!(descriptor.correlations.len(), 1);
        assert!((descriptor.correlations[0].coefficient - 1.0).abs() < 1e-9);
    }

    #[test]
    fn ragged_rows_treat_missing_keys_as_null() {
        let rows = vec![row(&[("a", json!(1)), ("b", json!(2))]), row(&[("a", json!(3))])];
        let descriptor = infer(&rows);
        let b = descriptor.columns.iter().find(|c| c.name == "b").unwrap();
        assert!(b.nullable);
    }
}
