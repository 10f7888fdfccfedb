//! Regulatory PII scrubbing for the Realism Engine's fifth pipeline step.
//!
//! Two concrete masks are specified: Social Security Numbers are fully
//! redacted, and financial/account-style identifiers are partially masked
//! (last four digits retained) when the dataset's domain is one of the
//! regulated domains named below. Unrecognized tags or domains pass the
//! value through unchanged — scrubbing only fires on a recognized
//! semantic tag.

use regex::Regex;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegulatedDomain {
    Healthcare,
    Finance,
    Pharmaceutical,
    Energy,
    Other,
}

impl RegulatedDomain {
    pub fn from_tag(tag: &str) -> Self {
        match tag.to_ascii_lowercase().as_str() {
            "healthcare" | "health" => RegulatedDomain::Healthcare,
            "finance" | "financial" | "banking" => RegulatedDomain::Finance,
            "pharmaceutical" | "pharma" => RegulatedDomain::Pharmaceutical,
            "energy" | "utilities" => RegulatedDomain::Energy,
            _ => RegulatedDomain::Other,
        }
    }

    fn is_regulated(self) -> bool {
        !matches!(self, RegulatedDomain::Other)
    }
}

fn ssn_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\d{3}-\d{2}-\d{4}$").expect("valid regex"))
}

/// Scrub `value` in place for the given `semantic_tag`, returning the
/// (possibly unchanged) replacement.
///
/// - `semantic_tag == "ssn"`: always redacted to `***-**-****` regardless of
///   domain, since an SSN is never safe to leave partially visible.
/// - `semantic_tag` containing `"account"`: last four characters retained,
///   the rest masked with `*`, but only within a [`RegulatedDomain`] other
///   than [`RegulatedDomain::Other`].
/// - anything else: passed through unchanged.
pub fn scrub_value(semantic_tag: &str, domain: RegulatedDomain, value: &str) -> String {
    let tag = semantic_tag.to_ascii_lowercase();
    if tag == "ssn" && ssn_pattern().is_match(value) {
        return "***-**-****".to_string();
    }
    if tag.contains("account") && domain.is_regulated() {
        return mask_account(value);
    }
    value.to_string()
}

fn mask_account(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= 4 {
        return "*".repeat(chars.len());
    }
    let visible_start = chars.len() - 4;
    let mut masked: String = chars[..visible_start].iter().map(|_| '*').collect();
    masked.extend(&chars[visible_start..]);
    masked
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ssn_is_fully_redacted() {
        let result = scrub_value("ssn", RegulatedDomain::Healthcare, "123-45-6789");
        assert_eq!(result, "***-**-****");
    }

    #[test]
    fn malformed_ssn_is_left_untouched() {
        let result = scrub_value("ssn", RegulatedDomain::Healthcare, "not-an-ssn");
        assert_eq!(result, "not-an-ssn");
    }

    #[test]
    fn account_number_masked_in_regulated_domain() {
        let result = scrub_value("account_number", RegulatedDomain::Finance, "1234567890");
        assert_eq!(result, "******7890");
    }

    #[test]
    fn account_number_untouched_outside_regulated_domain() {
        let result = scrub_value("account_number", RegulatedDomain::Other, "1234567890");
        assert_eq!(result, "1234567890");
    }

    #[test]
    fn short_account_values_are_fully_masked() {
        let result = scrub_value("account_id", RegulatedDomain::Energy, "42");
        assert_eq!(result, "**");
    }

    #[test]
    fn domain_from_tag_is_case_insensitive() {
        assert_eq!(RegulatedDomain::from_tag("FINANCE"), RegulatedDomain::Finance);
        assert_eq!(RegulatedDomain::from_tag("unknown"), RegulatedDomain::Other);
    }
}
