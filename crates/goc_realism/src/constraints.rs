//! Domain constraint enforcement (spec.md §4.5.1): for each column with a
//! `regex_pattern` or `semantic_tag`, validate the generated value and
//! either regenerate it with a tag-specific generator or clamp it into
//! `value_range`. A column's `strategy_override` (the per-column strategy
//! extension carried from `original_source/`, see SPEC_FULL.md §9) is
//! consulted only by the caller deciding whether regeneration needs a
//! provider call — this module always repairs locally.

use crate::diagnostics::{RowViolation, ViolationKind};
use crate::generators::{clamp_to_range, generate_by_tag};
use goc_protocol::Column;
use rand::Rng;
use serde_json::{Map, Value};
use std::sync::OnceLock;

fn compiled(pattern: &str) -> Option<regex::Regex> {
    regex::Regex::new(pattern).ok()
}

fn email_pattern() -> &'static regex::Regex {
    static PATTERN: OnceLock<regex::Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        regex::Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$").expect("valid regex")
    })
}

fn tag_pattern(tag: &str) -> Option<regex::Regex> {
    match tag.to_ascii_lowercase().as_str() {
        "email" => Some(email_pattern().clone()),
        "phone" | "phone_number" => regex::Regex::new(r"^\+?[0-9][0-9\-\s]{6,}$").ok(),
        "postal_code" | "zip" | "zip_code" => regex::Regex::new(r"^\d{5}(-\d{4})?$").ok(),
        _ => None,
    }
}

/// One column's repair pass over a single row value. Idempotent: a value
/// already satisfying the column's constraints is returned unchanged.
pub fn repair_column(column: &Column, row: &mut Map<String, Value>, rng: &mut impl Rng) -> Option<RowViolation> {
    let Some(value) = row.get(&column.name).cloned() else {
        return None;
    };
    if value.is_null() {
        return None; // nullability is enforced elsewhere; null is not a domain violation here.
    }

    if let Some((lo, hi)) = column.value_range {
        if let Some(n) = value.as_f64() {
            if n < lo || n > hi {
                let clamped = clamp_to_range(n, (lo, hi));
                row.insert(column.name.clone(), json_number(clamped));
                return Some(RowViolation {
                    column: column.name.clone(),
                    kind: ViolationKind::OutOfRange,
                    repaired: true,
                });
            }
        }
    }

    if let Some(enum_values) = &column.enum_values {
        if let Some(s) = value.as_str() {
            if !enum_values.iter().any(|v| v == s) {
                let replacement = enum_values.first().cloned().unwrap_or_default();
                row.insert(column.name.clone(), Value::String(replacement));
                return Some(RowViolation {
                    column: column.name.clone(),
                    kind: ViolationKind::PatternMismatch,
                    repaired: true,
                });
            }
        }
    }

    if let Some(pattern) = &column.regex_pattern {
        if let (Some(s), Some(re)) = (value.as_str(), compiled(pattern)) {
            if !re.is_match(s) {
                return Some(repair_against_tag_or_fail(column, row, rng, ViolationKind::PatternMismatch));
            }
        }
    } else if let Some(tag) = &column.semantic_tag {
        if let (Some(s), Some(re)) = (value.as_str(), tag_pattern(tag)) {
            if !re.is_match(s) {
                return Some(repair_against_tag_or_fail(column, row, rng, ViolationKind::BadFormat));
            }
        }
    }

    None
}

fn repair_against_tag_or_fail(
    column: &Column,
    row: &mut Map<String, Value>,
    rng: &mut impl Rng,
    kind: ViolationKind,
) -> RowViolation {
    let tag = column.semantic_tag.as_deref().unwrap_or("");
    match generate_by_tag(tag, rng) {
        Some(replacement) => {
            row.insert(column.name.clone(), Value::String(replacement));
            RowViolation {
                column: column.name.clone(),
                kind,
                repaired: true,
            }
        }
        None => RowViolation {
            column: column.name.clone(),
            kind: ViolationKind::Irreparable,
            repaired: false,
        },
    }
}

fn json_number(n: f64) -> Value {
    serde_json::Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
}

/// Runs every column's domain-constraint repair over one row, returning the
/// violations observed.
pub fn apply_constraints(columns: &[Column], row: &mut Map<String, Value>, rng: &mut impl Rng) -> Vec<RowViolation> {
    columns.iter().filter_map(|c| repair_column(c, row, rng)).collect()
}
