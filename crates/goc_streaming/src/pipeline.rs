//! Wires the Provider Gateway's streaming variant to a consumer: row
//! assembly, a reduced row-at-a-time realism pass, a bounded backpressure
//! buffer, and cooperative cancellation (spec.md §4.4).

use crate::assembler::RowAssembler;
use crate::cancel::CancellationToken;
use crate::types::{StreamChunk, TerminalStatus};
use futures::stream::{BoxStream, StreamExt};
use goc_protocol::{Column, GocError};
use goc_provider_gateway::GenerationChunk;
use goc_realism::constraints::apply_constraints;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};

/// Default capacity of the bounded channel between the assembler and the
/// consumer (spec.md §4.4: "a bounded buffer (default 64 rows)").
pub const DEFAULT_BUFFER_CAPACITY: usize = 64;

/// Consumes `producer` (the Provider Gateway's streamed chunks), assembles
/// complete rows, applies a row-at-a-time subset of the Realism Engine, and
/// republishes them as [`StreamChunk`]s on a bounded channel. `target_rows`
/// caps progress reporting; the stream self-terminates once the producer
/// finishes, the job is cancelled, or the consumer drops its receiver.
pub fn stream_rows(
    mut producer: BoxStream<'static, Result<GenerationChunk, GocError>>,
    columns: Vec<Column>,
    target_rows: u64,
    cancellation: CancellationToken,
) -> BoxStream<'static, StreamChunk> {
    let (tx, rx) = mpsc::channel(DEFAULT_BUFFER_CAPACITY);

    tokio::spawn(async move {
        let mut assembler = RowAssembler::new();
        let mut rng = StdRng::from_entropy();
        let mut rows_produced: u64 = 0;

        loop {
            if cancellation.is_cancelled() {
                info!(rows_produced, "streaming pipeline cancelled");
                let _ = tx.send(StreamChunk::Terminal {
                    status: TerminalStatus::Cancelled,
                    metrics: None,
                }).await;
                return;
            }

            let next = tokio::select! {
                biased;
                _ = wait_for_cancellation(&cancellation) => {
                    let _ = tx.send(StreamChunk::Terminal { status: TerminalStatus::Cancelled, metrics: None }).await;
                    return;
                }
                next = producer.next() => next,
            };

            match next {
                Some(Ok(chunk)) => {
                    let completed = assembler.push(&chunk.text_delta);
                    if !completed.is_empty() {
                        rows_produced += completed.len() as u64;
                        let repaired = repair_rows(&columns, completed, &mut rng);
                        let progress = progress_of(rows_produced, target_rows);
                        if tx.send(StreamChunk::Rows { rows: repaired, progress }).await.is_err() {
                            info!("consumer disconnected, cancelling stream");
                            cancellation.cancel();
                            return;
                        }
                    }

                    if chunk.is_terminal() {
                        if let Some(value) = assembler.flush() {
                            rows_produced += 1;
                            let repaired = repair_rows(&columns, vec![value], &mut rng);
                            let progress = progress_of(rows_produced, target_rows);
                            let _ = tx.send(StreamChunk::Rows { rows: repaired, progress }).await;
                        }
                        let _ = tx.send(StreamChunk::Terminal {
                            status: TerminalStatus::Completed,
                            metrics: None,
                        }).await;
                        return;
                    }
                }
                Some(Err(err)) => {
                    warn!(error = %err, "streaming producer failed");
                    let _ = tx.send(StreamChunk::Terminal {
                        status: TerminalStatus::Failed,
                        metrics: None,
                    }).await;
                    return;
                }
                None => {
                    if let Some(value) = assembler.flush() {
                        rows_produced += 1;
                        let repaired = repair_rows(&columns, vec![value], &mut rng);
                        let progress = progress_of(rows_produced, target_rows);
                        let _ = tx.send(StreamChunk::Rows { rows: repaired, progress }).await;
                    }
                    let _ = tx.send(StreamChunk::Terminal {
                        status: TerminalStatus::Completed,
                        metrics: None,
                    }).await;
                    return;
                }
            }
        }
    });

    ReceiverStream::new(rx).boxed()
}

async fn wait_for_cancellation(token: &CancellationToken) {
    loop {
        if token.is_cancelled() {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(25)).await;
    }
}

fn repair_rows(columns: &[Column], rows: Vec<serde_json::Value>, rng: &mut StdRng) -> Vec<serde_json::Value> {
    rows.into_iter()
        .map(|row| {
            let Some(mut object) = row.as_object().cloned() else {
                return row;
            };
            apply_constraints(columns, &mut object, rng);
            serde_json::Value::Object(object)
        })
        .collect()
}

fn progress_of(rows_produced: u64, target_rows: u64) -> f64 {
    if target_rows == 0 {
        return 1.0;
    }
    (rows_produced as f64 / target_rows as f64).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use goc_protocol::FinishReason;
    use goc_provider_gateway::{GenerationChunk as Chunk, TokenUsage};

    fn text_chunk(delta: &str) -> Result<Chunk, GocError> {
        Ok(Chunk::delta(delta))
    }

    fn terminal_chunk() -> Result<Chunk, GocError> {
        Ok(Chunk::terminal(FinishReason::Stop, TokenUsage { prompt_tokens: 1, completion_tokens: 1 }))
    }

    #[tokio::test]
    async fn streams_assembled_rows_then_a_completed_terminal() {
        let chunks = vec![
            text_chunk(r#"[{"a": 1}"#),
            text_chunk(r#", {"a": 2}]"#),
            terminal_chunk(),
        ];
        let producer = stream::iter(chunks).boxed();
        let mut out = stream_rows(producer, vec![], 2, CancellationToken::new());

        let first = out.next().await.unwrap();
        match first {
            StreamChunk::Rows { rows, .. } => assert_eq!(rows.len(), 2),
            _ => panic!("expected a Rows chunk first"),
        }
        let second = out.next().await.unwrap();
        assert!(matches!(second, StreamChunk::Terminal { status: TerminalStatus::Completed, .. }));
    }

    #[tokio::test]
    async fn cancellation_emits_a_cancelled_terminal() {
        let token = CancellationToken::new();
        token.cancel();
        let producer = stream::iter(vec![text_chunk("[{}]")]).boxed();
        let mut out = stream_rows(producer, vec![], 10, token);
        let first = out.next().await.unwrap();
        assert!(matches!(first, StreamChunk::Terminal { status: TerminalStatus::Cancelled, .. }));
    }

    #[tokio::test]
    async fn provider_error_emits_a_failed_terminal() {
        let producer = stream::iter(vec![Err(GocError::Internal {
            message: "boom".into(),
            correlation_id: goc_protocol::CorrelationId::new(),
        })])
        .boxed();
        let mut out = stream_rows(producer, vec![], 10, CancellationToken::new());
        let first = out.next().await.unwrap();
        assert!(matches!(first, StreamChunk::Terminal { status: TerminalStatus::Failed, .. }));
    }
}
