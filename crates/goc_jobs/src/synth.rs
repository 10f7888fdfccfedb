//! Local row synthesis for strategies [`GenerationStrategy::requires_provider`]
//! reports `false` for (`Statistical`, `PatternBased`): no model call is
//! made at all, rows are drawn directly from each column's declared shape
//! and handed straight to the Realism Engine for repair and scoring like
//! any provider-sourced batch.

use goc_protocol::{Column, LogicalType};
use goc_realism::generators::generate_by_tag;
use rand::Rng;
use serde_json::{Map, Value};

fn synth_value(column: &Column, rng: &mut impl Rng) -> Value {
    if column.nullable && rng.gen_bool(0.05) {
        return Value::Null;
    }
    if let Some(values) = &column.enum_values {
        if !values.is_empty() {
            return Value::String(values[rng.gen_range(0..values.len())].clone());
        }
    }
    if let Some(tag) = &column.semantic_tag {
        if let Some(generated) = generate_by_tag(tag, rng) {
            return Value::String(generated);
        }
    }
    match column.logical_type {
        LogicalType::Integer => {
            let (lo, hi) = column.value_range.unwrap_or((0.0, 1000.0));
            Value::from(rng.gen_range(lo as i64..=hi.max(lo) as i64))
        }
        LogicalType::Float => {
            let (lo, hi) = column.value_range.unwrap_or((0.0, 1000.0));
            Value::from(rng.gen_range(lo..=hi.max(lo)))
        }
        LogicalType::Boolean => Value::Bool(rng.gen_bool(0.5)),
        LogicalType::Date => Value::String(chrono::Utc::now().date_naive().to_string()),
        LogicalType::DateTime => Value::String(chrono::Utc::now().to_rfc3339()),
        LogicalType::Json => Value::Object(Map::new()),
        LogicalType::String => Value::String(format!("{}-{}", column.name, rng.gen_range(0..1_000_000))),
    }
}

/// Synthesizes `count` rows directly from `columns`, with no provider
/// round-trip. The Realism Engine still runs over the result, so a
/// `regex_pattern` or cross-field rule unmet by this best-effort synthesis
/// is repaired the same way a provider-sourced row would be.
pub fn synthesize_rows(columns: &[Column], count: u64, rng: &mut impl Rng) -> Vec<Map<String, Value>> {
    (0..count)
        .map(|_| columns.iter().map(|column| (column.name.clone(), synth_value(column, rng))).collect())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use goc_protocol::LogicalType;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn synthesizes_the_requested_row_count() {
        let columns = vec![Column::required("id", LogicalType::Integer)];
        let rows = synthesize_rows(&columns, 7, &mut StdRng::seed_from_u64(0));
        assert_eq!(rows.len(), 7);
    }

    #[test]
    fn enum_column_only_produces_declared_values() {
        let mut status = Column::required("status", LogicalType::String);
        status.enum_values = Some(vec!["active".to_string(), "inactive".to_string()]);
        let rows = synthesize_rows(&[status], 20, &mut StdRng::seed_from_u64(1));
        for row in &rows {
            let value = row["status"].as_str().unwrap();
            assert!(value == "active" || value == "inactive");
        }
    }

    #[test]
    fn numeric_column_stays_within_declared_range() {
        let mut age = Column::required("age", LogicalType::Integer);
        age.value_range = Some((18.0, 65.0));
        let rows = synthesize_rows(&[age], 50, &mut StdRng::seed_from_u64(2));
        for row in &rows {
            let value = row["age"].as_i64().unwrap();
            assert!((18..=65).contains(&value));
        }
    }

    #[test]
    fn semantic_tag_drives_generation_over_the_generic_string_fallback() {
        let mut email = Column::required("email", LogicalType::String);
        email.semantic_tag = Some("email".to_string());
        let rows = synthesize_rows(&[email], 5, &mut StdRng::seed_from_u64(3));
        for row in &rows {
            assert!(row["email"].as_str().unwrap().contains('@'));
        }
    }
}
