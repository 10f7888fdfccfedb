//! The Job Manager (spec.md §3, §5): the one component a host binary wires
//! directly into a CLI or API handler. Accepts a generation request,
//! reserves quota against the Quota & Privacy-Budget Ledger, enqueues a
//! [`goc_protocol::Job`], and drives it to a terminal state on a bounded
//! worker pool, orchestrating the Provider Gateway, Router, Realism Engine,
//! Streaming Pipeline and Storage Adapter along the way.

pub mod config;
pub mod manager;
pub mod prompt;
pub mod store;
pub mod synth;
pub mod worker;

pub use config::JobManagerConfig;
pub use manager::{JobManager, UsageStats};
pub use store::{InMemoryJobStore, JobStore, SqliteJobStore};
pub use worker::Deps;
