//! Quota & Privacy-Budget Ledger for the Generation Orchestration Core
//! (spec.md §4.6).
//!
//! Atomic per-`(owner_id, period_yyyymm)` reserve/commit/release accounting,
//! backed by a pluggable [`LedgerBackend`]: [`SqliteLedger`] for production,
//! [`InMemoryLedger`] for tests and embedding. Tier caps (rows/month,
//! ε/month) are resolved through a [`TierCapsProvider`], cached with
//! [`CachedTierCapsProvider`] per spec.md's "cached with a short TTL".

pub mod backend;
pub mod memory;
pub mod sqlite;
pub mod tiers;

pub use backend::{CommitRequest, LedgerBackend, ReleaseRequest, ReserveRequest};
pub use memory::InMemoryLedger;
pub use sqlite::SqliteLedger;
pub use tiers::{CachedTierCapsProvider, StaticTierCapsProvider, TierCaps, TierCapsProvider};
