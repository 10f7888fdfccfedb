//! The [`LedgerBackend`] trait: atomic reserve/commit/release over a
//! per-`(owner_id, period_yyyymm)` [`UsageLedgerEntry`] (spec.md §4.6).
//!
//! Every mutating call is idempotent given a request-scoped
//! [`ReservationId`]: replaying the same reservation must not double-charge.
//! Implementations achieve this the way the teacher's `JobQueue::pop_job`
//! claims a row — a single atomic `UPDATE ... WHERE <invariant>` (or, for the
//! in-memory backend, a single-writer mutex) — never a read-then-write race.

use async_trait::async_trait;
use goc_ids::{OwnerId, ReservationId};
use goc_protocol::{GocError, UsageLedgerEntry};

use crate::tiers::TierCaps;

/// A quota/privacy-budget reservation request.
#[derive(Debug, Clone)]
pub struct ReserveRequest {
    pub reservation_id: ReservationId,
    pub owner_id: OwnerId,
    pub period_yyyymm: String,
    pub rows: u64,
    /// `Some` only when the job's `GenerationConfig.add_noise` is true
    /// (spec.md §3: "epsilon, delta only meaningful when add_noise is
    /// true").
    pub epsilon: Option<f64>,
    pub delta: Option<f64>,
    pub tier_caps: TierCaps,
}

/// A commit request: reserved rows/epsilon move to committed.
#[derive(Debug, Clone)]
pub struct CommitRequest {
    pub reservation_id: ReservationId,
    pub owner_id: OwnerId,
    pub period_yyyymm: String,
    pub actual_rows: u64,
    pub actual_epsilon: Option<f64>,
}

/// A release request: the full reservation is returned (job failed or was
/// cancelled before producing anything committable).
#[derive(Debug, Clone)]
pub struct ReleaseRequest {
    pub reservation_id: ReservationId,
    pub owner_id: OwnerId,
    pub period_yyyymm: String,
}

#[async_trait]
pub trait LedgerBackend: Send + Sync {
    /// Reserve `rows` (and `epsilon`/`delta` if present) against the tier
    /// caps. Fails with [`GocError::QuotaExceeded`] or
    /// [`GocError::PrivacyBudgetExceeded`] if the reservation would breach a
    /// cap. Replaying the same `reservation_id` returns the same outcome
    /// without reserving twice.
    async fn reserve(&self, req: ReserveRequest) -> Result<(), GocError>;

    /// Move `actual_rows`/`actual_epsilon` from reserved to committed for the
    /// given reservation; any unused portion of the reservation is released.
    async fn commit(&self, req: CommitRequest) -> Result<(), GocError>;

    /// Return the full reservation (job failed or was cancelled).
    async fn release(&self, req: ReleaseRequest) -> Result<(), GocError>;

    /// Current-period usage snapshot for `owner_id`.
    async fn stats(&self, owner_id: &OwnerId, period_yyyymm: &str) -> Result<UsageLedgerEntry, GocError>;
}
