//! The streaming wire contract (spec.md §4.4): `stream(job_id)` is a lazy,
//! finite, non-restartable sequence of [`StreamChunk`]s.

use goc_protocol::QualityMetrics;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalStatus {
    Completed,
    Cancelled,
    Failed,
}

#[derive(Debug, Clone)]
pub enum StreamChunk {
    Rows { rows: Vec<Value>, progress: f64 },
    Terminal {
        status: TerminalStatus,
        /// Full [`QualityMetrics`] are unavailable in streaming mode (spec.md
        /// §4.5: "full correlation/statistics scoring is skipped in
        /// streaming mode"); present only when the producer supplied a
        /// running approximation.
        metrics: Option<QualityMetrics>,
    },
}
