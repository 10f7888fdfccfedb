//! Structured repair diagnostics, grounded on the teacher's
//! `summarize_schema_mismatch` (`casparian_worker::schema_validation`):
//! collect structured violations first, summarize into one human-readable
//! line second. Generalized from *rejecting* a non-conforming batch to
//! *repairing* individual rows.

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum ViolationKind {
    PatternMismatch,
    OutOfRange,
    MissingRequired,
    TooShort { min: usize },
    TooLong { max: usize },
    BadFormat,
    CrossFieldMismatch,
    Irreparable,
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViolationKind::PatternMismatch => write!(f, "pattern mismatch"),
            ViolationKind::OutOfRange => write!(f, "out of range"),
            ViolationKind::MissingRequired => write!(f, "missing required value"),
            ViolationKind::TooShort { min } => write!(f, "shorter than {min}"),
            ViolationKind::TooLong { max } => write!(f, "longer than {max}"),
            ViolationKind::BadFormat => write!(f, "malformed"),
            ViolationKind::CrossFieldMismatch => write!(f, "cross-field mismatch"),
            ViolationKind::Irreparable => write!(f, "irreparable"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RowViolation {
    pub column: String,
    pub kind: ViolationKind,
    pub repaired: bool,
}

pub fn summarize(violations: &[RowViolation]) -> String {
    if violations.is_empty() {
        return "no violations".to_string();
    }
    let repaired = violations.iter().filter(|v| v.repaired).count();
    let irreparable: Vec<&str> = violations
        .iter()
        .filter(|v| !v.repaired)
        .map(|v| v.column.as_str())
        .collect();

    let mut parts = vec![format!("{} violation(s), {} repaired", violations.len(), repaired)];
    if !irreparable.is_empty() {
        parts.push(format!("irreparable: {}", irreparable.join(", ")));
    }
    parts.join("; ")
}
