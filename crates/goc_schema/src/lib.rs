//! Schema Inference for the Generation Orchestration Core (spec.md §4.7).
//!
//! Derives a [`goc_protocol::DatasetDescriptor`] from a sample of rows:
//! column order, logical type (via constraint-elimination narrowing),
//! nullability, uniqueness, bounded-enum detection, semantic-tag guessing by
//! column name, and pairwise Pearson correlation between numeric columns.

pub mod candidates;
pub mod correlation;
pub mod infer;
pub mod semantic;

pub use candidates::TypeCandidates;
pub use correlation::pearson;
pub use infer::infer;
pub use semantic::detect_semantic_tag;
