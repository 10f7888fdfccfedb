//! Sqlite-backed [`LedgerBackend`], mirroring the teacher's `JobQueue`
//! atomic-claim-by-update idiom (`UPDATE ... WHERE <invariant>`), generalized
//! from "claim a job row" to "reserve/commit/release a ledger row". Every
//! mutating operation runs inside one transaction so the read-check-write is
//! atomic under sqlite's whole-database write lock.

use async_trait::async_trait;
use chrono::Utc;
use goc_ids::CorrelationId;
use goc_protocol::{GocError, UsageLedgerEntry};
use sqlx::{Pool, Row, Sqlite};

use crate::backend::{CommitRequest, LedgerBackend, ReleaseRequest, ReserveRequest};

pub struct SqliteLedger {
    pool: Pool<Sqlite>,
}

impl SqliteLedger {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    /// Create the ledger tables if they don't already exist. Safe to call on
    /// every startup.
    pub async fn ensure_schema(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS goc_usage_ledger (
                owner_id TEXT NOT NULL,
                period_yyyymm TEXT NOT NULL,
                rows_reserved INTEGER NOT NULL DEFAULT 0,
                rows_committed INTEGER NOT NULL DEFAULT 0,
                epsilon_spent REAL NOT NULL DEFAULT 0.0,
                delta_spent REAL NOT NULL DEFAULT 0.0,
                custom_model_count INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (owner_id, period_yyyymm)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS goc_ledger_reservations (
                reservation_id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                period_yyyymm TEXT NOT NULL,
                phase TEXT NOT NULL,
                rows INTEGER NOT NULL,
                epsilon REAL NOT NULL,
                delta REAL NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn row_to_entry(row: &sqlx::sqlite::SqliteRow, owner_id: &str, period: &str) -> UsageLedgerEntry {
    UsageLedgerEntry {
        owner_id: goc_ids::OwnerId::parse(owner_id).unwrap_or_else(|_| goc_ids::OwnerId::new()),
        period_yyyymm: period.to_string(),
        rows_reserved: row.try_get::<i64, _>("rows_reserved").unwrap_or(0) as u64,
        rows_committed: row.try_get::<i64, _>("rows_committed").unwrap_or(0) as u64,
        epsilon_spent: row.try_get("epsilon_spent").unwrap_or(0.0),
        delta_spent: row.try_get("delta_spent").unwrap_or(0.0),
        custom_model_count: row.try_get::<i64, _>("custom_model_count").unwrap_or(0) as u32,
    }
}

fn internal_error(err: sqlx::Error) -> GocError {
    GocError::internal(format!("ledger storage error: {err}"), CorrelationId::new())
}

#[async_trait]
impl LedgerBackend for SqliteLedger {
    async fn reserve(&self, req: ReserveRequest) -> Result<(), GocError> {
        let mut tx = self.pool.begin().await.map_err(internal_error)?;

        let existing: Option<String> = sqlx::query_scalar(
            "SELECT phase FROM goc_ledger_reservations WHERE reservation_id = ?",
        )
        .bind(req.reservation_id.as_str())
        .fetch_optional(&mut *tx)
        .await
        .map_err(internal_error)?;

        if existing.is_some() {
            tx.commit().await.map_err(internal_error)?;
            return Ok(());
        }

        sqlx::query(
            r#"
            INSERT OR IGNORE INTO goc_usage_ledger (owner_id, period_yyyymm)
            VALUES (?, ?)
            "#,
        )
        .bind(req.owner_id.as_str())
        .bind(&req.period_yyyymm)
        .execute(&mut *tx)
        .await
        .map_err(internal_error)?;

        let current = sqlx::query(
            "SELECT rows_reserved, epsilon_spent FROM goc_usage_ledger WHERE owner_id = ? AND period_yyyymm = ?",
        )
        .bind(req.owner_id.as_str())
        .bind(&req.period_yyyymm)
        .fetch_one(&mut *tx)
        .await
        .map_err(internal_error)?;

        let rows_reserved: i64 = current.try_get("rows_reserved").map_err(internal_error)?;
        let epsilon_spent: f64 = current.try_get("epsilon_spent").map_err(internal_error)?;

        let epsilon = req.epsilon.unwrap_or(0.0);
        let delta = req.delta.unwrap_or(0.0);

        let would_be_rows = rows_reserved as u64 + req.rows;
        if would_be_rows > req.tier_caps.rows_per_month {
            return Err(GocError::QuotaExceeded {
                correlation_id: CorrelationId::new(),
            });
        }

        let would_be_epsilon = epsilon_spent + epsilon;
        if would_be_epsilon > req.tier_caps.epsilon_per_month {
            return Err(GocError::PrivacyBudgetExceeded {
                correlation_id: CorrelationId::new(),
            });
        }

        sqlx::query(
            r#"
            UPDATE goc_usage_ledger
            SET rows_reserved = rows_reserved + ?,
                epsilon_spent = epsilon_spent + ?,
                delta_spent = delta_spent + ?
            WHERE owner_id = ? AND period_yyyymm = ?
            "#,
        )
        .bind(req.rows as i64)
        .bind(epsilon)
        .bind(delta)
        .bind(req.owner_id.as_str())
        .bind(&req.period_yyyymm)
        .execute(&mut *tx)
        .await
        .map_err(internal_error)?;

        sqlx::query(
            r#"
            INSERT INTO goc_ledger_reservations
                (reservation_id, owner_id, period_yyyymm, phase, rows, epsilon, delta, created_at)
            VALUES (?, ?, ?, 'reserved', ?, ?, ?, ?)
            "#,
        )
        .bind(req.reservation_id.as_str())
        .bind(req.owner_id.as_str())
        .bind(&req.period_yyyymm)
        .bind(req.rows as i64)
        .bind(epsilon)
        .bind(delta)
        .bind(Utc::now().to_rfc3339())
        .execute(&mut *tx)
        .await
        .map_err(internal_error)?;

        tx.commit().await.map_err(internal_error)?;
        Ok(())
    }

    async fn commit(&self, req: CommitRequest) -> Result<(), GocError> {
        let mut tx = self.pool.begin().await.map_err(internal_error)?;

        let reservation = sqlx::query(
            "SELECT phase, rows, epsilon FROM goc_ledger_reservations WHERE reservation_id = ?",
        )
        .bind(req.reservation_id.as_str())
        .fetch_optional(&mut *tx)
        .await
        .map_err(internal_error)?;

        let Some(reservation) = reservation else {
            tx.commit().await.map_err(internal_error)?;
            return Ok(());
        };

        let phase: String = reservation.try_get("phase").map_err(internal_error)?;
        if phase != "reserved" {
            tx.commit().await.map_err(internal_error)?;
            return Ok(());
        }

        let reserved_rows: i64 = reservation.try_get("rows").map_err(internal_error)?;
        let reserved_epsilon: f64 = reservation.try_get("epsilon").map_err(internal_error)?;
        let unused_rows = (reserved_rows as u64).saturating_sub(req.actual_rows);
        let unused_epsilon = req
            .actual_epsilon
            .map(|actual| (reserved_epsilon - actual).max(0.0))
            .unwrap_or(0.0);

        sqlx::query(
            r#"
            UPDATE goc_usage_ledger
            SET rows_reserved = MAX(rows_reserved - ?, 0),
                rows_committed = rows_committed + ?,
                epsilon_spent = MAX(epsilon_spent - ?, 0.0)
            WHERE owner_id = ? AND period_yyyymm = ?
            "#,
        )
        .bind(unused_rows as i64)
        .bind(req.actual_rows as i64)
        .bind(unused_epsilon)
        .bind(req.owner_id.as_str())
        .bind(&req.period_yyyymm)
        .execute(&mut *tx)
        .await
        .map_err(internal_error)?;

        sqlx::query("UPDATE goc_ledger_reservations SET phase = 'committed' WHERE reservation_id = ?")
            .bind(req.reservation_id.as_str())
            .execute(&mut *tx)
            .await
            .map_err(internal_error)?;

        tx.commit().await.map_err(internal_error)?;
        Ok(())
    }

    async fn release(&self, req: ReleaseRequest) -> Result<(), GocError> {
        let mut tx = self.pool.begin().await.map_err(internal_error)?;

        let reservation = sqlx::query(
            "SELECT phase, rows, epsilon, delta FROM goc_ledger_reservations WHERE reservation_id = ?",
        )
        .bind(req.reservation_id.as_str())
        .fetch_optional(&mut *tx)
        .await
        .map_err(internal_error)?;

        let Some(reservation) = reservation else {
            tx.commit().await.map_err(internal_error)?;
            return Ok(());
        };

        let phase: String = reservation.try_get("phase").map_err(internal_error)?;
        if phase != "reserved" {
            tx.commit().await.map_err(internal_error)?;
            return Ok(());
        }

        let rows: i64 = reservation.try_get("rows").map_err(internal_error)?;
        let epsilon: f64 = reservation.try_get("epsilon").map_err(internal_error)?;
        let delta: f64 = reservation.try_get("delta").map_err(internal_error)?;

        sqlx::query(
            r#"
            UPDATE goc_usage_ledger
            SET rows_reserved = MAX(rows_reserved - ?, 0),
                epsilon_spent = MAX(epsilon_spent - ?, 0.0),
                delta_spent = MAX(delta_spent - ?, 0.0)
            WHERE owner_id = ? AND period_yyyymm = ?
            "#,
        )
        .bind(rows)
        .bind(epsilon)
        .bind(delta)
        .bind(req.owner_id.as_str())
        .bind(&req.period_yyyymm)
        .execute(&mut *tx)
        .await
        .map_err(internal_error)?;

        sqlx::query("UPDATE goc_ledger_reservations SET phase = 'released' WHERE reservation_id = ?")
            .bind(req.reservation_id.as_str())
            .execute(&mut *tx)
            .await
            .map_err(internal_error)?;

        tx.commit().await.map_err(internal_error)?;
        Ok(())
    }

    async fn stats(&self, owner_id: &goc_ids::OwnerId, period_yyyymm: &str) -> Result<UsageLedgerEntry, GocError> {
        let row = sqlx::query("SELECT * FROM goc_usage_ledger WHERE owner_id = ? AND period_yyyymm = ?")
            .bind(owner_id.as_str())
            .bind(period_yyyymm)
            .fetch_optional(&self.pool)
            .await
            .map_err(internal_error)?;

        match row {
            Some(row) => Ok(row_to_entry(&row, owner_id.as_str(), period_yyyymm)),
            None => Ok(UsageLedgerEntry::new(owner_id.clone(), period_yyyymm.to_string())),
        }
    }
}
