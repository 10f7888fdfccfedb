//! The Job Manager's public surface (spec.md §3): accepts a generation
//! request, reserves quota, enqueues the job, and drives it to a terminal
//! state on a bounded worker pool. Every other component is reached only
//! through this crate — `goc_jobs` is the one piece a host binary wires
//! directly into a CLI or API handler.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, Mutex as AsyncMutex};
use tokio_stream::wrappers::BroadcastStream;
use tracing::{info, warn};

use goc_ledger::{LedgerBackend, ReserveRequest, TierCapsProvider};
use goc_logging::{EventSink, GocEvent};
use goc_protocol::{
    CorrelationId, DatasetDescriptor, GenerationConfig, GocError, Job, JobId, JobState, OwnerId, Validate,
};
use goc_provider_gateway::ProviderGateway;
use goc_router::ProviderWeights;
use goc_storage::StorageAdapter;
use goc_streaming::{CancellationToken, StreamChunk};

use crate::config::JobManagerConfig;
use crate::store::JobStore;
use crate::worker::{self, Deps};

/// A point-in-time usage snapshot for one owner/period, returned by
/// [`JobManager::usage_stats`].
#[derive(Debug, Clone, PartialEq)]
pub struct UsageStats {
    pub rows_reserved: u64,
    pub rows_committed: u64,
    pub epsilon_spent: f64,
    pub delta_spent: f64,
}

/// Orchestrates every other component behind a single async API: `submit`,
/// `cancel`, `status`, `artifact_url`, `usage_stats`, `archive_terminal_jobs`,
/// `stream_job`. A fixed-size worker pool pulls from `store` rather than one
/// task per job, bounding concurrency the way spec.md §5 requires ("no more
/// than `worker_pool_size` jobs run at once, regardless of how many are
/// queued").
pub struct JobManager {
    deps: Arc<Deps>,
    cancellations: Arc<AsyncMutex<HashMap<String, CancellationToken>>>,
    broadcasts: Arc<AsyncMutex<HashMap<String, broadcast::Sender<StreamChunk>>>>,
}

impl JobManager {
    pub fn new(
        store: Arc<dyn JobStore>,
        ledger: Arc<dyn LedgerBackend>,
        tier_caps: Arc<dyn TierCapsProvider>,
        gateway: Arc<ProviderGateway>,
        storage: Arc<dyn StorageAdapter>,
        sink: Arc<dyn EventSink>,
        weights: ProviderWeights,
        config: JobManagerConfig,
    ) -> Self {
        let manager = Self {
            deps: Arc::new(Deps {
                store,
                ledger,
                tier_caps,
                gateway,
                storage,
                sink,
                weights,
                config,
            }),
            cancellations: Arc::new(AsyncMutex::new(HashMap::new())),
            broadcasts: Arc::new(AsyncMutex::new(HashMap::new())),
        };
        manager.spawn_worker_pool();
        manager
    }

    fn spawn_worker_pool(&self) {
        for worker_index in 0..self.deps.config.worker_pool_size {
            let deps = self.deps.clone();
            let cancellations = self.cancellations.clone();
            let broadcasts = self.broadcasts.clone();
            tokio::spawn(async move {
                loop {
                    match deps.store.claim_next_queued().await {
                        Ok(Some(job)) => {
                            let job_id = job.job_id.as_str().to_string();
                            let cancellation = CancellationToken::new();
                            cancellations.lock().await.insert(job_id.clone(), cancellation.clone());
                            let stream_tx = broadcasts.lock().await.get(&job_id).cloned();

                            let wall_clock = if job.config.enable_streaming && job.config.strategy.requires_provider() {
                                deps.config.streaming_wall_clock
                            } else {
                                deps.config.batch_wall_clock
                            };

                            let finished = tokio::time::timeout(
                                wall_clock,
                                worker::run(&deps, job, cancellation.clone(), stream_tx),
                            )
                            .await;

                            if finished.is_err() {
                                cancellation.cancel();
                                warn!(job_id = %job_id, worker_index, "job exceeded its wall-clock budget and was cancelled");
                            }
                            cancellations.lock().await.remove(&job_id);
                            broadcasts.lock().await.remove(&job_id);
                        }
                        Ok(None) => {
                            tokio::time::sleep(Duration::from_millis(100)).await;
                        }
                        Err(err) => {
                            warn!(error = %err, worker_index, "failed to claim next queued job");
                            tokio::time::sleep(Duration::from_secs(1)).await;
                        }
                    }
                }
            });
        }
    }

    fn current_period() -> String {
        worker::current_period()
    }

    /// Validates the request, reserves quota/privacy budget for the full
    /// requested batch up front, and enqueues the job. Quota failures never
    /// create a job record (spec.md §3: "a rejected reservation never
    /// produces a queued job").
    pub async fn submit(&self, owner_id: OwnerId, descriptor: DatasetDescriptor, config: GenerationConfig) -> Result<JobId, GocError> {
        let correlation_id = CorrelationId::new();
        descriptor
            .validate()
            .map_err(|e| GocError::InvalidArgument { message: e.to_string(), correlation_id: correlation_id.clone() })?;
        config
            .validate()
            .map_err(|e| GocError::InvalidArgument { message: e.to_string(), correlation_id: correlation_id.clone() })?;

        let period = Self::current_period();
        let tier_caps = self.deps.tier_caps.caps(&owner_id).await;
        let reservation_id = goc_protocol::ReservationId::new();

        self.deps
            .ledger
            .reserve(ReserveRequest {
                reservation_id: reservation_id.clone(),
                owner_id: owner_id.clone(),
                period_yyyymm: period.clone(),
                rows: config.rows,
                epsilon: if config.add_noise { Some(config.epsilon) } else { None },
                delta: if config.add_noise { Some(config.delta) } else { None },
                tier_caps,
            })
            .await?;

        let mut job = Job::new(owner_id, descriptor, config);
        job.reservation_id = Some(reservation_id);
        job.period_yyyymm = Some(period);
        let job_id = job.job_id.clone();

        self.deps.sink.emit(GocEvent::JobSubmitted {
            job_id: job_id.to_string(),
            owner_id: job.owner_id.to_string(),
            rows: job.config.rows,
        });

        self.deps.store.insert(job).await?;
        info!(job_id = %job_id, "job submitted");
        Ok(job_id)
    }

    /// Cancels a job. A still-`Queued` job is cancelled immediately; a
    /// `Running` job has its cancellation token flipped and is cancelled
    /// cooperatively by its worker at the next suspension point (spec.md
    /// §5). Returns `Ok(false)` if the job is already terminal or unknown.
    pub async fn cancel(&self, job_id: &JobId) -> Result<bool, GocError> {
        if self.deps.store.cancel_if_queued(job_id).await? {
            return Ok(true);
        }
        let Some(token) = self.cancellations.lock().await.get(job_id.as_str()).cloned() else {
            return Ok(false);
        };
        token.cancel();
        Ok(true)
    }

    pub async fn status(&self, job_id: &JobId) -> Result<Option<Job>, GocError> {
        self.deps.store.get(job_id).await
    }

    /// Issues a signed URL to a completed job's output artifact. Returns
    /// `GocError::InvalidArgument` (this core's stand-in for `NotFound`, see
    /// `goc_storage`) if the job doesn't exist, isn't `Completed`, or has no
    /// output key recorded.
    pub async fn artifact_url(&self, job_id: &JobId, ttl: Duration) -> Result<String, GocError> {
        let correlation_id = CorrelationId::new();
        let job = self.deps.store.get(job_id).await?.ok_or_else(|| GocError::InvalidArgument {
            message: format!("job {job_id} not found"),
            correlation_id: correlation_id.clone(),
        })?;
        if job.state != JobState::Completed {
            return Err(GocError::InvalidArgument {
                message: format!("job {job_id} has no artifact (state: {})", job.state.label()),
                correlation_id: correlation_id.clone(),
            });
        }
        let key = job.output_key.ok_or_else(|| GocError::InvalidArgument {
            message: format!("job {job_id} completed without an output key"),
            correlation_id: correlation_id.clone(),
        })?;
        self.deps.storage.sign(&key, ttl).await
    }

    pub async fn usage_stats(&self, owner_id: &OwnerId) -> Result<UsageStats, GocError> {
        let period = Self::current_period();
        let entry = self.deps.ledger.stats(owner_id, &period).await?;
        Ok(UsageStats {
            rows_reserved: entry.rows_reserved,
            rows_committed: entry.rows_committed,
            epsilon_spent: entry.epsilon_spent,
            delta_spent: entry.delta_spent,
        })
    }

    /// Deletes every job record whose terminal age exceeds the spec's
    /// 7-day retention window. Returns the number of jobs archived.
    pub async fn archive_terminal_jobs(&self) -> Result<usize, GocError> {
        let cutoff = Utc::now() - chrono::Duration::days(7);
        let ids = self.deps.store.list_archivable(cutoff).await?;
        for id in &ids {
            self.deps.store.archive(id).await?;
        }
        Ok(ids.len())
    }

    /// Subscribes to a job's live row stream. Returns `None` if the job was
    /// never going to stream at all (its config didn't request it, or its
    /// strategy has no provider to stream from) or has already finished —
    /// the caller falls back to polling `status` for batch jobs (spec.md
    /// §4.4: streaming is opt-in per job, not a universal transport).
    ///
    /// Subscribing before the worker pool has claimed the job is fine: the
    /// broadcast sender is created here (or reused) and the worker looks it
    /// up by job id once it starts running, so a caller that subscribes
    /// immediately after `submit` never misses the first row.
    pub async fn stream_job(&self, job_id: &JobId) -> Result<Option<BroadcastStream<StreamChunk>>, GocError> {
        let Some(job) = self.deps.store.get(job_id).await? else {
            return Ok(None);
        };
        let will_stream = job.config.enable_streaming && job.config.strategy.requires_provider();
        if !will_stream || job.state.is_terminal() {
            return Ok(None);
        }
        let mut broadcasts = self.broadcasts.lock().await;
        let sender = broadcasts
            .entry(job_id.as_str().to_string())
            .or_insert_with(|| broadcast::channel(goc_streaming::DEFAULT_BUFFER_CAPACITY).0);
        Ok(Some(BroadcastStream::new(sender.subscribe())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use goc_ledger::{InMemoryLedger, StaticTierCapsProvider, TierCaps};
    use goc_logging::NoopSink;
    use goc_protocol::{Column, GenerationStrategy, LogicalType, PrivacyLevel, Provider as ProviderKind};
    use goc_provider_gateway::{MockBehavior, MockProvider};
    use goc_storage::FilesystemStorage;
    use tempfile_shim::TempDir;

    mod tempfile_shim {
        use std::path::PathBuf;
        use std::sync::atomic::{AtomicU64, Ordering};

        static COUNTER: AtomicU64 = AtomicU64::new(0);

        /// Minimal scratch-directory helper so these tests don't pull in the
        /// `tempfile` crate for a single throwaway directory; removed on drop.
        pub struct TempDir(PathBuf);

        impl TempDir {
            pub fn new(label: &str) -> Self {
                let unique = COUNTER.fetch_add(1, Ordering::SeqCst);
                let path = std::env::temp_dir().join(format!("goc_jobs_test_{label}_{}_{unique}", std::process::id()));
                std::fs::create_dir_all(&path).expect("create temp dir");
                Self(path)
            }

            pub fn path(&self) -> &std::path::Path {
                &self.0
            }
        }

        impl Drop for TempDir {
            fn drop(&mut self) {
                let _ = std::fs::remove_dir_all(&self.0);
            }
        }
    }

    fn descriptor() -> DatasetDescriptor {
        DatasetDescriptor {
            columns: vec![Column::required("id", LogicalType::Integer)],
            business_rules: vec![],
            correlations: vec![],
        }
    }

    fn config(strategy: GenerationStrategy) -> GenerationConfig {
        GenerationConfig {
            rows: 4,
            privacy_level: PrivacyLevel::Low,
            epsilon: 1.0,
            delta: 1e-5,
            model_id: "claude-sonnet-4-20250514".into(),
            strategy,
            maintain_correlations: true,
            preserve_distributions: true,
            add_noise: false,
            quality_threshold: 0.0,
            batch_size: 4,
            max_retries: 3,
            enable_streaming: false,
            temperature: 1.0,
            top_p: 1.0,
            top_k: 40,
            max_output_tokens: 1024,
        }
    }

    fn manager_with_mock_provider(dir: &std::path::Path) -> JobManager {
        let provider = MockProvider::new(ProviderKind::Claude, "claude-sonnet-4-20250514");
        for _ in 0..8 {
            provider.queue(MockBehavior::Success {
                text: r#"[{"id": 1}, {"id": 2}, {"id": 3}, {"id": 4}]"#.to_string(),
            });
        }
        let gateway = Arc::new(ProviderGateway::new(vec![Arc::new(provider)]));
        JobManager::new(
            Arc::new(crate::store::InMemoryJobStore::new()),
            Arc::new(InMemoryLedger::new()),
            Arc::new(StaticTierCapsProvider(TierCaps::PRO)),
            gateway,
            Arc::new(FilesystemStorage::new(dir.to_path_buf(), b"test-signing-key".to_vec(), "https://example.invalid".to_string())),
            Arc::new(NoopSink),
            ProviderWeights::new(),
            JobManagerConfig {
                worker_pool_size: 2,
                ..JobManagerConfig::default()
            },
        )
    }

    #[tokio::test]
    async fn submitted_statistical_job_completes_without_a_provider() {
        let dir = TempDir::new("stat");
        let manager = manager_with_mock_provider(dir.path());
        let job_id = manager
            .submit(OwnerId::new(), descriptor(), config(GenerationStrategy::Statistical))
            .await
            .unwrap();

        let mut job = None;
        for _ in 0..100 {
            let fetched = manager.status(&job_id).await.unwrap().unwrap();
            if fetched.state.is_terminal() {
                job = Some(fetched);
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        let job = job.expect("job did not reach a terminal state in time");
        assert_eq!(job.state, JobState::Completed);
        assert_eq!(job.rows_produced, 4);
    }

    #[tokio::test]
    async fn cancelling_a_queued_job_prevents_it_from_ever_running() {
        let dir = TempDir::new("cancel");
        let provider = MockProvider::new(ProviderKind::Claude, "claude-sonnet-4-20250514");
        let gateway = Arc::new(ProviderGateway::new(vec![Arc::new(provider)]));
        let manager = JobManager::new(
            Arc::new(crate::store::InMemoryJobStore::new()),
            Arc::new(InMemoryLedger::new()),
            Arc::new(StaticTierCapsProvider(TierCaps::PRO)),
            gateway,
            Arc::new(FilesystemStorage::new(dir.path().to_path_buf(), b"test-signing-key".to_vec(), "https://example.invalid".to_string())),
            Arc::new(NoopSink),
            ProviderWeights::new(),
            JobManagerConfig {
                worker_pool_size: 0,
                ..JobManagerConfig::default()
            },
        );
        let job_id = manager
            .submit(OwnerId::new(), descriptor(), config(GenerationStrategy::Statistical))
            .await
            .unwrap();
        assert!(manager.cancel(&job_id).await.unwrap());
        let job = manager.status(&job_id).await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Cancelled);
    }

    #[tokio::test]
    async fn artifact_url_is_rejected_for_a_job_that_has_not_completed() {
        let dir = TempDir::new("artifact");
        let manager = manager_with_mock_provider(dir.path());
        let job_id = manager
            .submit(OwnerId::new(), descriptor(), config(GenerationStrategy::Statistical))
            .await
            .unwrap();
        let err = manager.artifact_url(&job_id, Duration::from_secs(60)).await.unwrap_err();
        assert!(matches!(err, GocError::InvalidArgument { .. }));
    }
}
