//! Shared domain types for the Generation Orchestration Core.
//!
//! This crate has no I/O of its own. It defines the data model every other
//! `goc_*` crate builds against: the dataset descriptor, generation config,
//! job record, quality metrics, usage ledger entry, the closed provider sum
//! type, and the single error enum every component's error eventually
//! converts into.

pub mod error;
pub mod idempotency;
pub mod types;

pub use error::GocError;
pub use goc_ids::{CorrelationId, JobId, OwnerId, ProviderCallId, ReservationId};
pub use types::*;
