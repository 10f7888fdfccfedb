//! The [`JobStore`] trait: persists [`Job`] records and exposes the
//! race-free claim operation the worker pool pulls from, mirroring the
//! teacher's `JobQueue::pop_job` atomic `UPDATE ... WHERE status = 'QUEUED'`
//! claim pattern (`casparian_sentinel::db::queue`), generalized from
//! "claim a processing job" to "claim a generation job".
//!
//! [`InMemoryJobStore`] backs tests and embedding; [`SqliteJobStore`] is the
//! production backend, storing each [`Job`] as a JSON blob alongside an
//! indexed `state` column so the claim query never deserializes every row.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use goc_protocol::{GocError, Job, JobId, JobState};
use std::collections::HashMap;
use std::sync::Mutex;

fn internal(message: impl Into<String>) -> GocError {
    GocError::internal(message, goc_ids::CorrelationId::new())
}

#[async_trait]
pub trait JobStore: Send + Sync {
    /// Persists a brand-new `Queued` job.
    async fn insert(&self, job: Job) -> Result<(), GocError>;

    async fn get(&self, job_id: &JobId) -> Result<Option<Job>, GocError>;

    /// Full-record overwrite. The Job Manager is the sole owner of a job's
    /// record (spec.md §3), so this never races against another writer for
    /// the same job — only `claim_next_queued` and `cancel_if_queued` need
    /// the atomic `UPDATE ... WHERE` shape.
    async fn save(&self, job: Job) -> Result<(), GocError>;

    /// Atomically claims the oldest still-`Queued` job, transitioning it to
    /// `Running { streaming: false }` as part of the same operation, so two
    /// worker-pool loops racing on the same row can never both claim it.
    async fn claim_next_queued(&self) -> Result<Option<Job>, GocError>;

    /// Atomically cancels a job only if it is still `Queued` (i.e. no
    /// worker has claimed it yet). Returns whether the cancellation
    /// actually applied.
    async fn cancel_if_queued(&self, job_id: &JobId) -> Result<bool, GocError>;

    /// Job ids in a terminal state whose `finished_at` is older than
    /// `older_than` (spec.md §3: "destroyed only by explicit archival after
    /// >= 7 days in a terminal state").
    async fn list_archivable(&self, older_than: DateTime<Utc>) -> Result<Vec<JobId>, GocError>;

    async fn archive(&self, job_id: &JobId) -> Result<(), GocError>;
}

#[derive(Default)]
pub struct InMemoryJobStore {
    jobs: Mutex<HashMap<String, Job>>,
    /// Insertion order, so `claim_next_queued` claims the oldest queued job
    /// first, same as the teacher's `ORDER BY priority DESC, id ASC`.
    order: Mutex<Vec<String>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn insert(&self, job: Job) -> Result<(), GocError> {
        let key = job.job_id.as_str().to_string();
        self.order.lock().expect("job order lock poisoned").push(key.clone());
        self.jobs.lock().expect("job store lock poisoned").insert(key, job);
        Ok(())
    }

    async fn get(&self, job_id: &JobId) -> Result<Option<Job>, GocError> {
        Ok(self.jobs.lock().expect("job store lock poisoned").get(job_id.as_str()).cloned())
    }

    async fn save(&self, job: Job) -> Result<(), GocError> {
        self.jobs
            .lock()
            .expect("job store lock poisoned")
            .insert(job.job_id.as_str().to_string(), job);
        Ok(())
    }

    async fn claim_next_queued(&self) -> Result<Option<Job>, GocError> {
        let order = self.order.lock().expect("job order lock poisoned").clone();
        let mut jobs = self.jobs.lock().expect("job store lock poisoned");
        for key in order {
            if let Some(job) = jobs.get_mut(&key) {
                if job.state == JobState::Queued {
                    job.state = JobState::Running { streaming: false };
                    job.started_at = Some(Utc::now());
                    return Ok(Some(job.clone()));
                }
            }
        }
        Ok(None)
    }

    async fn cancel_if_queued(&self, job_id: &JobId) -> Result<bool, GocError> {
        let mut jobs = self.jobs.lock().expect("job store lock poisoned");
        let Some(job) = jobs.get_mut(job_id.as_str()) else {
            return Ok(false);
        };
        if job.state != JobState::Queued {
            return Ok(false);
        }
        job.state = JobState::Cancelled;
        job.finished_at = Some(Utc::now());
        Ok(true)
    }

    async fn list_archivable(&self, older_than: DateTime<Utc>) -> Result<Vec<JobId>, GocError> {
        let jobs = self.jobs.lock().expect("job store lock poisoned");
        Ok(jobs
            .values()
            .filter(|job| job.state.is_terminal() && job.finished_at.map(|t| t < older_than).unwrap_or(false))
            .map(|job| job.job_id.clone())
            .collect())
    }

    async fn archive(&self, job_id: &JobId) -> Result<(), GocError> {
        self.jobs.lock().expect("job store lock poisoned").remove(job_id.as_str());
        self.order
            .lock()
            .expect("job order lock poisoned")
            .retain(|key| key != job_id.as_str());
        Ok(())
    }
}

/// Sqlite-backed [`JobStore`]. Each job is stored as a JSON blob (the `Job`
/// record's own schema evolves with the type, not with hand-maintained SQL
/// columns) alongside an indexed `state` column so `claim_next_queued`
/// filters in SQL rather than deserializing every row.
pub struct SqliteJobStore {
    pool: sqlx::Pool<sqlx::Sqlite>,
}

impl SqliteJobStore {
    pub fn new(pool: sqlx::Pool<sqlx::Sqlite>) -> Self {
        Self { pool }
    }

    pub async fn ensure_schema(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS goc_jobs (
                job_id TEXT PRIMARY KEY,
                state TEXT NOT NULL,
                finished_at TEXT,
                created_at TEXT NOT NULL,
                payload TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS goc_jobs_state_idx ON goc_jobs(state, created_at)")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    fn row_of(job: &Job) -> Result<(String, String, Option<String>, String, String), GocError> {
        let payload = serde_json::to_string(job).map_err(|e| internal(format!("failed to serialize job: {e}")))?;
        Ok((
            job.job_id.as_str().to_string(),
            job.state.label().to_string(),
            job.finished_at.map(|t| t.to_rfc3339()),
            job.created_at.to_rfc3339(),
            payload,
        ))
    }
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn insert(&self, job: Job) -> Result<(), GocError> {
        let (job_id, state, finished_at, created_at, payload) = Self::row_of(&job)?;
        sqlx::query(
            "INSERT INTO goc_jobs (job_id, state, finished_at, created_at, payload) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(job_id)
        .bind(state)
        .bind(finished_at)
        .bind(created_at)
        .bind(payload)
        .execute(&self.pool)
        .await
        .map_err(|e| internal(format!("failed to insert job: {e}")))?;
        Ok(())
    }

    async fn get(&self, job_id: &JobId) -> Result<Option<Job>, GocError> {
        let row: Option<(String,)> = sqlx::query_as("SELECT payload FROM goc_jobs WHERE job_id = ?")
            .bind(job_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| internal(format!("failed to load job: {e}")))?;
        row.map(|(payload,)| {
            serde_json::from_str(&payload).map_err(|e| internal(format!("failed to deserialize job: {e}")))
        })
        .transpose()
    }

    async fn save(&self, job: Job) -> Result<(), GocError> {
        let (job_id, state, finished_at, created_at, payload) = Self::row_of(&job)?;
        sqlx::query(
            r#"
            INSERT INTO goc_jobs (job_id, state, finished_at, created_at, payload)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(job_id) DO UPDATE SET
                state = excluded.state,
                finished_at = excluded.finished_at,
                payload = excluded.payload
            "#,
        )
        .bind(job_id)
        .bind(state)
        .bind(finished_at)
        .bind(created_at)
        .bind(payload)
        .execute(&self.pool)
        .await
        .map_err(|e| internal(format!("failed to save job: {e}")))?;
        Ok(())
    }

    async fn claim_next_queued(&self) -> Result<Option<Job>, GocError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| internal(format!("failed to open claim transaction: {e}")))?;

        let candidate: Option<(String, String)> = sqlx::query_as(
            "SELECT job_id, payload FROM goc_jobs WHERE state = 'queued' ORDER BY created_at ASC LIMIT 1",
        )
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| internal(format!("failed to select queued job: {e}")))?;

        let Some((job_id, payload)) = candidate else {
            tx.commit().await.map_err(|e| internal(format!("failed to commit empty claim: {e}")))?;
            return Ok(None);
        };

        let rows_affected = sqlx::query("UPDATE goc_jobs SET state = 'running' WHERE job_id = ? AND state = 'queued'")
            .bind(&job_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| internal(format!("failed to claim job: {e}")))?
            .rows_affected();

        if rows_affected == 0 {
            // Claimed by another worker between the SELECT and the UPDATE.
            tx.commit().await.map_err(|e| internal(format!("failed to commit lost race: {e}")))?;
            return Ok(None);
        }

        let mut job: Job =
            serde_json::from_str(&payload).map_err(|e| internal(format!("failed to deserialize claimed job: {e}")))?;
        job.state = JobState::Running { streaming: false };
        job.started_at = Some(Utc::now());
        let updated_payload =
            serde_json::to_string(&job).map_err(|e| internal(format!("failed to serialize claimed job: {e}")))?;
        sqlx::query("UPDATE goc_jobs SET payload = ? WHERE job_id = ?")
            .bind(updated_payload)
            .bind(&job_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| internal(format!("failed to persist claimed job: {e}")))?;

        tx.commit().await.map_err(|e| internal(format!("failed to commit claim: {e}")))?;
        Ok(Some(job))
    }

    async fn cancel_if_queued(&self, job_id: &JobId) -> Result<bool, GocError> {
        let Some(mut job) = self.get(job_id).await? else {
            return Ok(false);
        };
        if job.state != JobState::Queued {
            return Ok(false);
        }
        job.state = JobState::Cancelled;
        job.finished_at = Some(Utc::now());
        let rows_affected =
            sqlx::query("UPDATE goc_jobs SET state = 'cancelled' WHERE job_id = ? AND state = 'queued'")
                .bind(job_id.as_str())
                .execute(&self.pool)
                .await
                .map_err(|e| internal(format!("failed to cancel queued job: {e}")))?
                .rows_affected();
        if rows_affected == 0 {
            return Ok(false);
        }
        self.save(job).await?;
        Ok(true)
    }

    async fn list_archivable(&self, older_than: DateTime<Utc>) -> Result<Vec<JobId>, GocError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT job_id FROM goc_jobs WHERE state IN ('completed','failed','cancelled') AND finished_at < ?",
        )
        .bind(older_than.to_rfc3339())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| internal(format!("failed to list archivable jobs: {e}")))?;
        rows.into_iter()
            .map(|(id,)| JobId::parse(&id).map_err(|e| internal(format!("corrupt job id in store: {e}"))))
            .collect()
    }

    async fn archive(&self, job_id: &JobId) -> Result<(), GocError> {
        sqlx::query("DELETE FROM goc_jobs WHERE job_id = ?")
            .bind(job_id.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| internal(format!("failed to archive job: {e}")))?;
        Ok(())
    }
}
