//! Builds the generation request sent to a provider for strategies that
//! [`GenerationStrategy::requires_provider`] reports `true` for, and parses
//! the provider's returned text back into row objects.
//!
//! The prompt is a plain-language schema description rather than a
//! few-shot example grid (spec.md's example payloads are illustrative, not
//! a wire format this core emits) — columns, types, constraints and
//! business rules are listed so any of the three providers can follow them
//! without a provider-specific template.

use goc_protocol::{Column, DatasetDescriptor, GenerationConfig, LogicalType};
use goc_streaming::RowAssembler;
use serde_json::Value;
use std::fmt::Write as _;

fn describe_column(column: &Column) -> String {
    let mut parts = vec![format!("{}: {}", column.name, type_name(column.logical_type))];
    if column.nullable {
        parts.push("nullable".to_string());
    }
    if column.unique {
        parts.push("unique".to_string());
    }
    if let Some((lo, hi)) = column.value_range {
        parts.push(format!("range [{lo}, {hi}]"));
    }
    if let Some(values) = &column.enum_values {
        parts.push(format!("one of [{}]", values.join(", ")));
    }
    if let Some(pattern) = &column.regex_pattern {
        parts.push(format!("matches pattern {pattern}"));
    }
    if let Some(tag) = &column.semantic_tag {
        parts.push(format!("semantic type {tag}"));
    }
    parts.join(", ")
}

fn type_name(logical_type: LogicalType) -> &'static str {
    match logical_type {
        LogicalType::Integer => "integer",
        LogicalType::Float => "float",
        LogicalType::String => "string",
        LogicalType::Boolean => "boolean",
        LogicalType::Date => "ISO-8601 date",
        LogicalType::DateTime => "ISO-8601 datetime",
        LogicalType::Json => "json object",
    }
}

/// Builds the text prompt for one batch of `row_count` rows.
pub fn build_prompt(descriptor: &DatasetDescriptor, config: &GenerationConfig, row_count: u32) -> String {
    let mut prompt = String::new();
    let _ = writeln!(
        prompt,
        "Generate exactly {row_count} synthetic JSON rows matching this schema. \
         Respond with a single JSON array of row objects and nothing else."
    );
    prompt.push_str("Columns:\n");
    for column in &descriptor.columns {
        let _ = writeln!(prompt, "- {}", describe_column(column));
    }
    if !descriptor.business_rules.is_empty() {
        prompt.push_str("Business rules:\n");
        for rule in &descriptor.business_rules {
            let _ = writeln!(prompt, "- {rule}");
        }
    }
    if !descriptor.correlations.is_empty() {
        prompt.push_str("Correlations to respect:\n");
        for correlation in &descriptor.correlations {
            let _ = writeln!(
                prompt,
                "- {} and {} should correlate at approximately {:.2}",
                correlation.column_a, correlation.column_b, correlation.coefficient
            );
        }
    }
    if config.maintain_correlations {
        prompt.push_str("Maintain the statistical correlations above across the batch.\n");
    }
    if config.preserve_distributions {
        prompt.push_str("Preserve realistic value distributions for each column.\n");
    }
    prompt
}

/// Parses a provider's full (non-streaming) response text into row objects,
/// reusing the Streaming Pipeline's bracket-depth scanner rather than a
/// second JSON-extraction implementation.
pub fn parse_rows(text: &str) -> Vec<Value> {
    let mut assembler = RowAssembler::new();
    let mut rows = assembler.push(text);
    if let Some(tail) = assembler.flush() {
        rows.push(tail);
    }
    rows
}
