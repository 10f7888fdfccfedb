//! Regulatory PII scrubbing orchestration (spec.md §4.5.5): applies
//! [`goc_security::scrub_value`] to every column carrying a scrubbable
//! semantic tag once the dataset's industry domain is detected as
//! regulated. Domain detection reads `business_rules` for a `"domain:<tag>"`
//! marker (the one place this core lets a business-rule string carry
//! dataset-level metadata rather than a per-row predicate).

use goc_protocol::{Column, DatasetDescriptor};
use goc_security::{scrub_value, RegulatedDomain};
use serde_json::{Map, Value};

const DOMAIN_RULE_PREFIX: &str = "domain:";

/// Reads the dataset's declared industry domain from `business_rules`, if
/// any (`"domain:healthcare"`, `"domain:finance"`, ...). Absent a marker,
/// the domain is [`RegulatedDomain::Other`] and scrubbing never fires.
pub fn detect_domain(descriptor: &DatasetDescriptor) -> RegulatedDomain {
    descriptor
        .business_rules
        .iter()
        .find_map(|rule| rule.strip_prefix(DOMAIN_RULE_PREFIX))
        .map(RegulatedDomain::from_tag)
        .unwrap_or(RegulatedDomain::Other)
}

/// Scrubs every column with a semantic tag in `row`, in place. Returns the
/// number of fields actually altered (used by the privacy-protection
/// component of [`crate::metrics`]).
pub fn scrub_row(columns: &[Column], domain: RegulatedDomain, row: &mut Map<String, Value>) -> usize {
    let mut scrubbed = 0;
    for column in columns {
        let Some(tag) = &column.semantic_tag else { continue };
        let Some(value) = row.get(&column.name).and_then(Value::as_str) else { continue };
        let replacement = scrub_value(tag, domain, value);
        if replacement != value {
            row.insert(column.name.clone(), Value::String(replacement));
            scrubbed += 1;
        }
    }
    scrubbed
}
