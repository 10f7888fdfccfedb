//! Deterministic tag-specific regeneration for a handful of well-known
//! semantic tags (spec.md §4.5.1: "regenerate the offending field using a
//! tag-specific generator"). Takes any `rand::Rng` so callers can seed for
//! reproducible tests; production code seeds from entropy.

use rand::Rng;

const FIRST_NAMES: &[&str] = &["alex", "sam", "jordan", "taylor", "morgan", "casey"];
const DOMAINS: &[&str] = &["example.com", "mailhost.test", "corp.example"];
const COUNTRY_CODES: &[&str] = &["1", "44", "49", "81"];

pub fn generate_email(rng: &mut impl Rng) -> String {
    let name = FIRST_NAMES[rng.gen_range(0..FIRST_NAMES.len())];
    let domain = DOMAINS[rng.gen_range(0..DOMAINS.len())];
    let suffix: u32 = rng.gen_range(0..10_000);
    format!("{name}{suffix}@{domain}")
}

pub fn generate_phone(rng: &mut impl Rng) -> String {
    let cc = COUNTRY_CODES[rng.gen_range(0..COUNTRY_CODES.len())];
    let rest: u64 = rng.gen_range(2_000_000_000..9_999_999_999);
    format!("+{cc}{rest}")
}

pub fn generate_postal_code(rng: &mut impl Rng) -> String {
    format!("{:05}", rng.gen_range(10_000..99_999))
}

pub fn generate_by_tag(tag: &str, rng: &mut impl Rng) -> Option<String> {
    match tag.to_ascii_lowercase().as_str() {
        "email" => Some(generate_email(rng)),
        "phone" | "phone_number" => Some(generate_phone(rng)),
        "postal_code" | "zip" | "zip_code" => Some(generate_postal_code(rng)),
        _ => None,
    }
}

pub fn clamp_to_range(value: f64, range: (f64, f64)) -> f64 {
    value.clamp(range.0, range.1)
}
