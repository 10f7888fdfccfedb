//! In-memory [`LedgerBackend`], the default for tests and for exercising the
//! Job Manager end-to-end without a database (spec.md §9 Design Notes:
//! "State persists through a pluggable ledger backend ... so the core is
//! testable in-memory").
//!
//! Single-writer: one [`std::sync::Mutex`] guards the whole table, matching
//! §5's "Quota Ledger is the only strongly-shared mutable state; it is
//! guarded by per-owner serialization". A per-owner row lock would scale
//! better under real concurrency; a single mutex is the honest in-memory
//! analog and keeps the invariant impossible to violate by construction.

use async_trait::async_trait;
use goc_ids::CorrelationId;
use goc_protocol::{GocError, UsageLedgerEntry};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::backend::{CommitRequest, LedgerBackend, ReleaseRequest, ReserveRequest};

#[derive(Debug, Clone, Copy)]
enum ReservationPhase {
    Reserved { rows: u64, epsilon: f64, delta: f64 },
    Committed,
    Released,
}

#[derive(Debug, Default)]
struct OwnerPeriodState {
    entry: Option<UsageLedgerEntry>,
    reservations: HashMap<String, ReservationPhase>,
}

#[derive(Default)]
pub struct InMemoryLedger {
    table: Mutex<HashMap<(String, String), OwnerPeriodState>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LedgerBackend for InMemoryLedger {
    async fn reserve(&self, req: ReserveRequest) -> Result<(), GocError> {
        let mut table = self.table.lock().expect("ledger mutex poisoned");
        let key = (req.owner_id.as_str().to_string(), req.period_yyyymm.clone());
        let state = table.entry(key).or_default();
        let reservation_key = req.reservation_id.as_str().to_string();

        if state.reservations.contains_key(&reservation_key) {
            return Ok(());
        }

        let entry = state
            .entry
            .get_or_insert_with(|| UsageLedgerEntry::new(req.owner_id.clone(), req.period_yyyymm.clone()));

        let epsilon = req.epsilon.unwrap_or(0.0);
        let delta = req.delta.unwrap_or(0.0);

        let would_be_rows = entry.rows_reserved + req.rows;
        if would_be_rows > req.tier_caps.rows_per_month {
            return Err(GocError::QuotaExceeded {
                correlation_id: CorrelationId::new(),
            });
        }

        let would_be_epsilon = entry.epsilon_spent + epsilon;
        if would_be_epsilon > req.tier_caps.epsilon_per_month {
            return Err(GocError::PrivacyBudgetExceeded {
                correlation_id: CorrelationId::new(),
            });
        }

        entry.rows_reserved = would_be_rows;
        entry.epsilon_spent = would_be_epsilon;
        entry.delta_spent += delta;

        state.reservations.insert(
            reservation_key,
            ReservationPhase::Reserved {
                rows: req.rows,
                epsilon,
                delta,
            },
        );
        Ok(())
    }

    async fn commit(&self, req: CommitRequest) -> Result<(), GocError> {
        let mut table = self.table.lock().expect("ledger mutex poisoned");
        let key = (req.owner_id.as_str().to_string(), req.period_yyyymm.clone());
        let reservation_key = req.reservation_id.as_str().to_string();

        let Some(state) = table.get_mut(&key) else {
            return Ok(());
        };

        let phase = state.reservations.get(&reservation_key).copied();
        let Some(ReservationPhase::Reserved { rows, epsilon, .. }) = phase else {
            // Already committed/released, or never reserved: idempotent no-op.
            return Ok(());
        };

        if let Some(entry) = state.entry.as_mut() {
            let unused_rows = rows.saturating_sub(req.actual_rows);
            entry.rows_reserved = entry.rows_reserved.saturating_sub(unused_rows);
            entry.rows_committed += req.actual_rows;

            if let Some(actual_epsilon) = req.actual_epsilon {
                let unused_epsilon = (epsilon - actual_epsilon).max(0.0);
                entry.epsilon_spent = (entry.epsilon_spent - unused_epsilon).max(0.0);
            }
        }

        state.reservations.insert(reservation_key, ReservationPhase::Committed);
        Ok(())
    }

    async fn release(&self, req: ReleaseRequest) -> Result<(), GocError> {
        let mut table = self.table.lock().expect("ledger mutex poisoned");
        let key = (req.owner_id.as_str().to_string(), req.period_yyyymm.clone());
        let reservation_key = req.reservation_id.as_str().to_string();

        let Some(state) = table.get_mut(&key) else {
            return Ok(());
        };

        let phase = state.reservations.get(&reservation_key).copied();
        let Some(ReservationPhase::Reserved { rows, epsilon, delta }) = phase else {
            return Ok(());
        };

        if let Some(entry) = state.entry.as_mut() {
            entry.rows_reserved = entry.rows_reserved.saturating_sub(rows);
            entry.epsilon_spent = (entry.epsilon_spent - epsilon).max(0.0);
            entry.delta_spent = (entry.delta_spent - delta).max(0.0);
        }

        state.reservations.insert(reservation_key, ReservationPhase::Released);
        Ok(())
    }

    async fn stats(&self, owner_id: &goc_ids::OwnerId, period_yyyymm: &str) -> Result<UsageLedgerEntry, GocError> {
        let table = self.table.lock().expect("ledger mutex poisoned");
        let key = (owner_id.as_str().to_string(), period_yyyymm.to_string());
        Ok(table
            .get(&key)
            .and_then(|state| state.entry.clone())
            .unwrap_or_else(|| UsageLedgerEntry::new(owner_id.clone(), period_yyyymm.to_string())))
    }
}
