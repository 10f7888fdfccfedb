//! Observability event sink.
//!
//! The core never writes to a logging framework directly when reporting
//! domain events — it emits a [`GocEvent`] through whatever [`EventSink`] the
//! host wired in. The default [`TracingSink`] renders events as `tracing`
//! events; a host embedding this core elsewhere could forward the same
//! events to a metrics or audit system instead.

use serde::Serialize;
use std::fmt;

/// A structured event raised at a well-known point in the generation
/// lifecycle.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GocEvent {
    JobSubmitted {
        job_id: String,
        owner_id: String,
        rows: u64,
    },
    ProviderCalled {
        job_id: String,
        provider: String,
        model_id: String,
        attempt: u32,
    },
    RowBatchAssembled {
        job_id: String,
        rows_in_batch: usize,
        rows_produced_total: u64,
    },
    JobTerminal {
        job_id: String,
        state: String,
        rows_produced: u64,
    },
}

impl fmt::Display for GocEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(self) {
            Ok(json) => write!(f, "{json}"),
            Err(_) => write!(f, "<unserializable event>"),
        }
    }
}

/// Sink for structured domain events.
///
/// Implementations must not block the caller for long; the core calls
/// `emit` from hot paths (once per provider call, once per row batch).
pub trait EventSink: Send + Sync {
    fn emit(&self, event: GocEvent);
}

/// Default sink: renders every event as a `tracing` info event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: GocEvent) {
        tracing::info!(target: "goc::events", event = %event);
    }
}

/// Sink that discards every event — useful for tests that don't care about
/// observability output.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn emit(&self, _event: GocEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct CollectingSink(Mutex<Vec<GocEvent>>);

    impl EventSink for CollectingSink {
        fn emit(&self, event: GocEvent) {
            self.0.lock().unwrap().push(event);
        }
    }

    #[test]
    fn collecting_sink_records_events() {
        let sink = Arc::new(CollectingSink::default());
        sink.emit(GocEvent::JobSubmitted {
            job_id: "job-1".into(),
            owner_id: "owner-1".into(),
            rows: 100,
        });
        assert_eq!(sink.0.lock().unwrap().len(), 1);
    }

    #[test]
    fn event_display_is_json() {
        let event = GocEvent::JobTerminal {
            job_id: "job-2".into(),
            state: "completed".into(),
            rows_produced: 42,
        };
        let rendered = event.to_string();
        assert!(rendered.contains("job_terminal"));
        assert!(rendered.contains("\"rows_produced\":42"));
    }
}
