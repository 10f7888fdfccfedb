//! Semantic tag detection by column-name heuristic.
//!
//! Spec.md §4.7: "Semantic tag detection by name heuristic (e.g., `email`,
//! `phone`, `ssn`, `city`, `country`, `postal_code`)." Detection looks only
//! at the column name, never the values — a `city` column full of numbers is
//! still tagged `city`; the Realism Engine's domain-constraint step is what
//! validates the values actually match.

const TAG_ALIASES: &[(&str, &[&str])] = &[
    ("email", &["email", "e_mail", "mail"]),
    ("phone", &["phone", "telephone", "mobile", "cell"]),
    ("postal_code", &["postal_code", "zip", "zipcode", "zip_code"]),
    ("country", &["country", "country_code", "nation"]),
    ("city", &["city", "town"]),
    ("ssn", &["ssn", "social_security", "social_security_number"]),
    (
        "account_number",
        &["account_number", "account_no", "acct_number", "iban"],
    ),
];

/// Guess a semantic tag for `column_name`, or `None` if nothing matches.
///
/// Matching is substring-based against a lowercased, de-punctuated form of
/// the name, longest alias first so `postal_code` wins over a looser `code`
/// match that doesn't even exist in the table above but would otherwise be
/// a trap for future aliases.
pub fn detect_semantic_tag(column_name: &str) -> Option<&'static str> {
    let normalized = normalize(column_name);
    let mut best: Option<(&'static str, usize)> = None;
    for (tag, aliases) in TAG_ALIASES {
        for alias in *aliases {
            if normalized.contains(alias) {
                let better = match best {
                    Some((_, len)) => alias.len() > len,
                    None => true,
                };
                if better {
                    best = Some((tag, alias.len()));
                }
            }
        }
    }
    best.map(|(tag, _)| tag)
}

fn normalize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect()
}
