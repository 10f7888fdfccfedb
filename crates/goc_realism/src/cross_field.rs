//! Cross-field validation (spec.md §4.5.4): reconcile `(city, country)`,
//! `(postal_code, country)`, `(phone, country)`, `(age, birth_year)` pairs,
//! preferring a configured authoritative field and correcting the
//! dependent one.

use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrossFieldPair {
    CityCountry,
    PostalCodeCountry,
    PhoneCountry,
    AgeBirthYear,
}

impl CrossFieldPair {
    fn columns(self) -> (&'static str, &'static str) {
        match self {
            CrossFieldPair::CityCountry => ("city", "country"),
            CrossFieldPair::PostalCodeCountry => ("postal_code", "country"),
            CrossFieldPair::PhoneCountry => ("phone", "country"),
            CrossFieldPair::AgeBirthYear => ("age", "birth_year"),
        }
    }

    pub const ALL: [CrossFieldPair; 4] = [
        CrossFieldPair::CityCountry,
        CrossFieldPair::PostalCodeCountry,
        CrossFieldPair::PhoneCountry,
        CrossFieldPair::AgeBirthYear,
    ];
}

/// Which side of a pair is authoritative; the other is corrected to match.
/// Configured per job rather than hardcoded, since either field could be
/// the one the caller actually cares about preserving (spec.md §4.5.4:
/// "prefer the authoritative field (configured)").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authority {
    First,
    Second,
}

#[derive(Debug, Clone)]
pub struct CrossFieldConfig {
    authority: Vec<(CrossFieldPair, Authority)>,
}

impl Default for CrossFieldConfig {
    /// `country` and `birth_year` are authoritative by default: a job more
    /// commonly declares the country/birth-year distribution it wants and
    /// derives locale-dependent fields from it, not the reverse.
    fn default() -> Self {
        Self {
            authority: vec![
                (CrossFieldPair::CityCountry, Authority::Second),
                (CrossFieldPair::PostalCodeCountry, Authority::Second),
                (CrossFieldPair::PhoneCountry, Authority::Second),
                (CrossFieldPair::AgeBirthYear, Authority::Second),
            ],
        }
    }
}

impl CrossFieldConfig {
    pub fn with_authority(mut self, pair: CrossFieldPair, authority: Authority) -> Self {
        self.authority.retain(|(p, _)| *p != pair);
        self.authority.push((pair, authority));
        self
    }

    fn authority_of(&self, pair: CrossFieldPair) -> Authority {
        self.authority
            .iter()
            .find(|(p, _)| *p == pair)
            .map(|(_, a)| *a)
            .unwrap_or(Authority::Second)
    }
}

/// Year the synthetic data is generated in, used to derive `age` from
/// `birth_year` and vice versa.
const CURRENT_YEAR: i64 = 2026;

/// Applies every applicable cross-field reconciliation present in `row`,
/// returning the number of corrections made.
pub fn reconcile(config: &CrossFieldConfig, row: &mut Map<String, Value>) -> usize {
    let mut corrections = 0;
    for pair in CrossFieldPair::ALL {
        if reconcile_pair(config, pair, row) {
            corrections += 1;
        }
    }
    corrections
}

fn reconcile_pair(config: &CrossFieldConfig, pair: CrossFieldPair, row: &mut Map<String, Value>) -> bool {
    let (first_col, second_col) = pair.columns();
    if !row.contains_key(first_col) || !row.contains_key(second_col) {
        return false;
    }

    match pair {
        CrossFieldPair::AgeBirthYear => reconcile_age_birth_year(config, row),
        _ => reconcile_string_pair(config, pair, row),
    }
}

/// For the string-valued pairs (`city`/`country`, `postal_code`/`country`,
/// `phone`/`country`) we don't carry a full geographic reference table in
/// this core — `country` genuinely not matching a known value is out of
/// scope to validate. What's enforced is internal consistency: if the
/// dependent field is empty/null while the authoritative one is present, the
/// dependent gets backfilled from a deterministic placeholder so the row
/// doesn't carry a half-filled pair.
fn reconcile_string_pair(config: &CrossFieldConfig, pair: CrossFieldPair, row: &mut Map<String, Value>) -> bool {
    let (first_col, second_col) = pair.columns();
    let (authoritative_col, dependent_col) = match config.authority_of(pair) {
        Authority::First => (first_col, second_col),
        Authority::Second => (second_col, first_col),
    };

    let authoritative_present = row.get(authoritative_col).map(is_present).unwrap_or(false);
    let dependent_present = row.get(dependent_col).map(is_present).unwrap_or(false);

    if authoritative_present && !dependent_present {
        row.insert(dependent_col.to_string(), Value::String(format!("derived-{dependent_col}")));
        return true;
    }
    false
}

fn reconcile_age_birth_year(config: &CrossFieldConfig, row: &mut Map<String, Value>) -> bool {
    let age = row.get("age").and_then(Value::as_i64);
    let birth_year = row.get("birth_year").and_then(Value::as_i64);

    match (age, birth_year) {
        (Some(age), Some(birth_year)) => {
            let expected_age = CURRENT_YEAR - birth_year;
            if expected_age == age {
                return false;
            }
            match config.authority_of(CrossFieldPair::AgeBirthYear) {
                Authority::First => {
                    row.insert("birth_year".to_string(), Value::from(CURRENT_YEAR - age));
                }
                Authority::Second => {
                    row.insert("age".to_string(), Value::from(expected_age));
                }
            }
            true
        }
        _ => false,
    }
}

fn is_present(value: &Value) -> bool {
    !value.is_null() && value.as_str().map(|s| !s.is_empty()).unwrap_or(true)
}
