//! Constraint-elimination type narrowing.
//!
//! Rather than voting ("70% of values look like integers"), each value
//! narrows the surviving candidate set for its column. A value that cannot
//! be parsed as a type removes that type from the set; the column's
//! inferred type is whatever remains once every sample row has been fed in.
//! Ties (a column of `"0"`/`"1"` values is compatible with both `Boolean`
//! and `Integer`) resolve by a fixed specificity order, not sample order.

use chrono::NaiveDate;
use goc_protocol::LogicalType;
use serde_json::Value;

const RESOLUTION_PRIORITY: [LogicalType; 7] = [
    LogicalType::Boolean,
    LogicalType::Integer,
    LogicalType::Float,
    LogicalType::DateTime,
    LogicalType::Date,
    LogicalType::Json,
    LogicalType::String,
];

#[derive(Debug, Clone)]
pub struct TypeCandidates {
    surviving: Vec<LogicalType>,
    pub saw_null: bool,
    pub rows_seen: u64,
}

impl Default for TypeCandidates {
    fn default() -> Self {
        Self {
            surviving: RESOLUTION_PRIORITY.to_vec(),
            saw_null: false,
            rows_seen: 0,
        }
    }
}

impl TypeCandidates {
    /// Narrow the candidate set with one observed value. Leaves the set
    /// untouched for `Value::Null` (nulls inform nullability, not type).
    pub fn eliminate(&mut self, value: &Value) {
        if value.is_null() {
            self.saw_null = true;
            return;
        }
        self.rows_seen += 1;
        let compatible = compatible_types(value);
        self.surviving.retain(|t| compatible.contains(t));
    }

    pub fn is_resolved(&self) -> bool {
        self.surviving.len() <= 1
    }

    /// The most specific surviving type, by [`RESOLUTION_PRIORITY`]. Falls
    /// back to `String` if every candidate was eliminated (contradictory
    /// data across rows — treat it as opaque text rather than fail closed).
    pub fn resolve(&self) -> LogicalType {
        RESOLUTION_PRIORITY
            .into_iter()
            .find(|t| self.surviving.contains(t))
            .unwrap_or(LogicalType::String)
    }
}

fn compatible_types(value: &Value) -> Vec<LogicalType> {
    match value {
        Value::Bool(_) => vec![LogicalType::Boolean],
        Value::Number(n) => {
            if n.is_i64() || n.is_u64() {
                vec![LogicalType::Integer, LogicalType::Float]
            } else {
                vec![LogicalType::Float]
            }
        }
        Value::Array(_) | Value::Object(_) => vec![LogicalType::Json],
        Value::String(s) => string_compatible_types(s),
        Value::Null => RESOLUTION_PRIORITY.to_vec(),
    }
}

fn string_compatible_types(s: &str) -> Vec<LogicalType> {
    let mut types = vec![LogicalType::String];

    let lowered = s.to_ascii_lowercase();
    if matches!(lowered.as_str(), "true" | "false" | "yes" | "no" | "0" | "1") {
        types.push(LogicalType::Boolean);
    }

    if let Ok(parsed) = s.parse::<i64>() {
        types.push(LogicalType::Integer);
        let _ = parsed;
    }
    if s.parse::<f64>().is_ok() && !s.parse::<i64>().is_ok() {
        types.push(LogicalType::Float);
    } else if s.parse::<i64>().is_ok() {
        types.push(LogicalType::Float);
    }

    if NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok() {
        types.push(LogicalType::Date);
    }

    if chrono::DateTime::parse_from_rfc3339(s).is_ok()
        || chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S").is_ok()
    {
        types.push(LogicalType::DateTime);
    }

    types
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(values: &[Value]) -> TypeCandidates {
        let mut candidates = TypeCandidates::default();
        for v in values {
            candidates.eliminate(v);
        }
        candidates
    }

    #[test]
    fn pure_integers_resolve_to_integer() {
        let candidates = feed(&[Value::from(1), Value::from(2), Value::from(3)]);
        assert_eq!(candidates.resolve(), LogicalType::Integer);
    }

    #[test]
    fn mixed_int_and_float_resolves_to_float() {
        let candidates = feed(&[Value::from(1), Value::from(2.5)]);
        assert_eq!(candidates.resolve(), LogicalType::Float);
    }

    #[test]
    fn zero_one_strings_resolve_to_boolean_over_integer() {
        let candidates = feed(&[
            Value::String("0".into()),
            Value::String("1".into()),
            Value::String("0".into()),
        ]);
        // "0"/"1" are compatible with both Boolean and Integer; Boolean is
        // higher priority in RESOLUTION_PRIORITY since truthy tokens are
        // a narrower domain than arbitrary integers.
        assert_eq!(candidates.resolve(), LogicalType::Boolean);
    }

    #[test]
    fn iso_dates_resolve_to_date() {
        let candidates = feed(&[Value::String("2026-01-01".into()), Value::String("2026-07-28".into())]);
        assert_eq!(candidates.resolve(), LogicalType::Date);
    }

    #[test]
    fn rfc3339_resolves_to_datetime() {
        let candidates = feed(&[Value::String("2026-01-01T12:00:00Z".into())]);
        assert_eq!(candidates.resolve(), LogicalType::DateTime);
    }

    #[test]
    fn free_text_resolves_to_string() {
        let candidates = feed(&[Value::String("hello world".into()), Value::String("abc".into())]);
        assert_eq!(candidates.resolve(), LogicalType::String);
    }

    #[test]
    fn nulls_do_not_affect_resolution_but_flag_nullable() {
        let candidates = feed(&[Value::from(1), Value::Null, Value::from(2)]);
        assert!(candidates.saw_null);
        assert_eq!(candidates.resolve(), LogicalType::Integer);
    }

    #[test]
    fn nested_structures_resolve_to_json() {
        let candidates = feed(&[Value::Array(vec![Value::from(1), Value::from(2)])]);
        assert_eq!(candidates.resolve(), LogicalType::Json);
    }
}
