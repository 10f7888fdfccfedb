//! Job Manager scheduling configuration (spec.md §5). Loaded once at
//! startup by the host binary and handed to [`crate::manager::JobManager`];
//! this crate never reads environment variables or files directly.

use std::time::Duration;

/// Worker-pool sizing and per-job fan-out limits, plus the timeouts spec.md
/// §5 names. All fields have the spec's stated defaults.
#[derive(Debug, Clone, Copy)]
pub struct JobManagerConfig {
    /// Default `num_cpus x 2`, capped at 32.
    pub worker_pool_size: usize,
    /// Degree of concurrent provider calls a single job's worker may fan
    /// out to (ensembles, batching). Default 4.
    pub per_job_parallelism: usize,
    /// Wall-clock budget for a job running in streaming mode. Default 10
    /// minutes.
    pub streaming_wall_clock: Duration,
    /// Wall-clock budget for a batch job. Default 30 minutes.
    pub batch_wall_clock: Duration,
    /// Timeout for the quota-reservation call. Default 5s.
    pub quota_reservation_timeout: Duration,
}

impl JobManagerConfig {
    pub fn worker_pool_default() -> usize {
        (num_cpus::get() * 2).min(32)
    }
}

impl Default for JobManagerConfig {
    fn default() -> Self {
        Self {
            worker_pool_size: Self::worker_pool_default(),
            per_job_parallelism: 4,
            streaming_wall_clock: Duration::from_secs(10 * 60),
            batch_wall_clock: Duration::from_secs(30 * 60),
            quota_reservation_timeout: Duration::from_secs(5),
        }
    }
}
