//! Business rule parsing and repair (spec.md §4.5.2).
//!
//! A business rule on [`goc_protocol::DatasetDescriptor::business_rules`] is
//! an opaque string of the form `"<column>:<predicate>"`, e.g.
//! `"email:required"`, `"bio:max_length(280)"`, `"age:positive"`. Unknown
//! predicate names parse as [`RulePredicate::Custom`] and are treated as
//! always-satisfied (the engine has no repair action for a predicate it
//! doesn't recognize, matching spec.md's "custom named predicates" without
//! inventing semantics for them).

use crate::diagnostics::{RowViolation, ViolationKind};
use rand::Rng;
use serde_json::Value;
use std::sync::OnceLock;

#[derive(Debug, Clone, PartialEq)]
pub enum RulePredicate {
    Required,
    MinLength(usize),
    MaxLength(usize),
    EmailFormat,
    PhoneFormat,
    Positive,
    Custom(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct BusinessRule {
    pub column: String,
    pub predicate: RulePredicate,
}

/// Parses `"column:predicate"` or `"column:predicate(arg)"`. Returns `None`
/// for a malformed rule (missing the `:` separator) rather than panicking —
/// a malformed rule is logged and skipped by the caller, never fatal to the
/// batch.
pub fn parse_rule(raw: &str) -> Option<BusinessRule> {
    let (column, predicate_str) = raw.split_once(':')?;
    let predicate = parse_predicate(predicate_str.trim())?;
    Some(BusinessRule {
        column: column.trim().to_string(),
        predicate,
    })
}

fn parse_predicate(text: &str) -> Option<RulePredicate> {
    if let Some(n) = parse_call(text, "min_length") {
        return Some(RulePredicate::MinLength(n?));
    }
    if let Some(n) = parse_call(text, "max_length") {
        return Some(RulePredicate::MaxLength(n?));
    }
    match text {
        "required" => Some(RulePredicate::Required),
        "email_format" => Some(RulePredicate::EmailFormat),
        "phone_format" => Some(RulePredicate::PhoneFormat),
        "positive" => Some(RulePredicate::Positive),
        other if !other.is_empty() => Some(RulePredicate::Custom(other.to_string())),
        _ => None,
    }
}

/// `Some(Some(n))` if `text` is `"name(n)"`; `Some(None)` if it's `"name(...)"`
/// with an unparseable argument; `None` if `text` doesn't start with `name(`.
fn parse_call(text: &str, name: &str) -> Option<Option<usize>> {
    let rest = text.strip_prefix(name)?.trim();
    let inner = rest.strip_prefix('(')?.strip_suffix(')')?;
    Some(inner.trim().parse().ok())
}

fn email_pattern() -> &'static regex::Regex {
    static PATTERN: OnceLock<regex::Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        regex::Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$").expect("valid regex")
    })
}

fn phone_pattern() -> &'static regex::Regex {
    static PATTERN: OnceLock<regex::Regex> = OnceLock::new();
    PATTERN.get_or_init(|| regex::Regex::new(r"^\+?[0-9][0-9\-\s]{6,}$").expect("valid regex"))
}

/// `true` if `value` satisfies `rule`. `Custom` predicates the engine
/// doesn't understand are always satisfied.
pub fn check(rule: &BusinessRule, value: &Value) -> bool {
    match &rule.predicate {
        RulePredicate::Required => !value.is_null(),
        RulePredicate::MinLength(min) => as_str(value).map(|s| s.len() >= *min).unwrap_or(true),
        RulePredicate::MaxLength(max) => as_str(value).map(|s| s.len() <= *max).unwrap_or(true),
        RulePredicate::EmailFormat => as_str(value).map(|s| email_pattern().is_match(s)).unwrap_or(true),
        RulePredicate::PhoneFormat => as_str(value).map(|s| phone_pattern().is_match(s)).unwrap_or(true),
        RulePredicate::Positive => value.as_f64().map(|n| n > 0.0).unwrap_or(true),
        RulePredicate::Custom(_) => true,
    }
}

fn as_str(value: &Value) -> Option<&str> {
    value.as_str()
}

/// Attempts a rule-specific repair. Returns `None` when the violation is
/// irreparable (the caller drops the row and schedules regeneration per
/// spec.md §4.5.2). Idempotent: repairing an already-satisfying value
/// returns it unchanged rather than mutating it again.
pub fn repair(rule: &BusinessRule, value: &Value, rng: &mut impl Rng) -> Option<Value> {
    if check(rule, value) {
        return Some(value.clone());
    }
    match &rule.predicate {
        RulePredicate::Required => None,
        RulePredicate::MinLength(min) => {
            let mut s = as_str(value).unwrap_or("").to_string();
            while s.len() < *min {
                s.push('x');
            }
            Some(Value::String(s))
        }
        RulePredicate::MaxLength(max) => {
            let s = as_str(value).unwrap_or("");
            Some(Value::String(s.chars().take(*max).collect()))
        }
        RulePredicate::EmailFormat => Some(Value::String(crate::generators::generate_email(rng))),
        RulePredicate::PhoneFormat => Some(Value::String(crate::generators::generate_phone(rng))),
        RulePredicate::Positive => {
            let n = value.as_f64().unwrap_or(0.0).abs();
            let n = if n == 0.0 { 1.0 } else { n };
            serde_json::Number::from_f64(n).map(Value::Number)
        }
        RulePredicate::Custom(_) => Some(value.clone()),
    }
}

/// Applies every rule whose column is present in `row`, returning the list
/// of violations observed (repaired or not) for diagnostics/metrics.
pub fn apply_rules(rules: &[BusinessRule], row: &mut serde_json::Map<String, Value>, rng: &mut impl Rng) -> Vec<RowViolation> {
    let mut violations = Vec::new();
    for rule in rules {
        let Some(value) = row.get(&rule.column) else { continue };
        if check(rule, value) {
            continue;
        }
        let kind = violation_kind(&rule.predicate);
        match repair(rule, value, rng) {
            Some(repaired) => {
                row.insert(rule.column.clone(), repaired);
                violations.push(RowViolation {
                    column: rule.column.clone(),
                    kind,
                    repaired: true,
                });
            }
            None => violations.push(RowViolation {
                column: rule.column.clone(),
                kind: ViolationKind::Irreparable,
                repaired: false,
            }),
        }
    }
    violations
}

fn violation_kind(predicate: &RulePredicate) -> ViolationKind {
    match predicate {
        RulePredicate::Required => ViolationKind::MissingRequired,
        RulePredicate::MinLength(min) => ViolationKind::TooShort { min: *min },
        RulePredicate::MaxLength(max) => ViolationKind::TooLong { max: *max },
        RulePredicate::EmailFormat | RulePredicate::PhoneFormat => ViolationKind::BadFormat,
        RulePredicate::Positive => ViolationKind::OutOfRange,
        RulePredicate::Custom(_) => ViolationKind::BadFormat,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use serde_json::json;

    #[test]
    fn parses_simple_and_call_predicates() {
        assert_eq!(
            parse_rule("email:required").unwrap(),
            BusinessRule {
                column: "email".into(),
                predicate: RulePredicate::Required
            }
        );
        assert_eq!(
            parse_rule("bio:max_length(280)").unwrap(),
            BusinessRule {
                column: "bio".into(),
                predicate: RulePredicate::MaxLength(280)
            }
        );
    }

    #[test]
    fn malformed_rule_fails_to_parse() {
        assert!(parse_rule("no colon here").is_none());
    }

    #[test]
    fn unknown_predicate_becomes_custom_and_is_always_satisfied() {
        let rule = parse_rule("status:one_of_active_inactive").unwrap();
        assert!(matches!(rule.predicate, RulePredicate::Custom(_)));
        assert!(check(&rule, &json!("anything")));
    }

    #[test]
    fn required_rejects_null() {
        let rule = BusinessRule {
            column: "email".into(),
            predicate: RulePredicate::Required,
        };
        assert!(!check(&rule, &Value::Null));
        assert!(repair(&rule, &Value::Null, &mut StdRng::seed_from_u64(1)).is_none());
    }

    #[test]
    fn positive_repair_flips_sign_of_negative_value() {
        let rule = BusinessRule {
            column: "age".into(),
            predicate: RulePredicate::Positive,
        };
        let repaired = repair(&rule, &json!(-5.0), &mut StdRng::seed_from_u64(1)).unwrap();
        assert_eq!(repaired.as_f64().unwrap(), 5.0);
    }

    #[test]
    fn repair_is_idempotent_on_already_valid_value() {
        let rule = BusinessRule {
            column: "age".into(),
            predicate: RulePredicate::Positive,
        };
        let value = json!(10.0);
        let repaired = repair(&rule, &value, &mut StdRng::seed_from_u64(1)).unwrap();
        assert_eq!(repaired, value);
    }

    #[test]
    fn apply_rules_collects_violations_and_mutates_row() {
        let rules = vec![parse_rule("email:email_format").unwrap()];
        let mut row = serde_json::Map::new();
        row.insert("email".to_string(), json!("not-an-email"));
        let mut rng = StdRng::seed_from_u64(7);
        let violations = apply_rules(&rules, &mut row, &mut rng);
        assert_eq!(violations.len(), 1);
        assert!(violations[0].repaired);
        assert!(row["email"].as_str().unwrap().contains('@'));
    }
}
