//! Executes one claimed [`Job`] end to end: resolves and invokes providers
//! (or synthesizes rows locally), runs every batch through the Realism
//! Engine, persists progress as it goes, and finalizes quota and storage on
//! every terminal outcome. One [`run`] call is one worker-pool slot's full
//! lifecycle for a job (spec.md §5: "each job runs on one worker for its
//! entire lifecycle").

use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use futures::stream::StreamExt;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::{Map, Value};
use tokio::sync::broadcast;
use tracing::{info, warn};

use goc_ledger::{CommitRequest, LedgerBackend, ReleaseRequest, TierCapsProvider};
use goc_logging::{EventSink, GocEvent};
use goc_protocol::{
    CorrelationId, GenerationStrategy, GocError, Job, JobErrorSnapshot, JobState, Provider as ProviderKind,
};
use goc_provider_gateway::{GenerationRequest, ProviderGateway, SamplingParams};
use goc_realism::metrics::PrivacyBudgetHeadroom;
use goc_realism::RealismRowScorer;
use goc_router::{invoke_with_fallback, merge_ensemble, rank_providers, ProviderWeights};
use goc_storage::StorageAdapter;
use goc_streaming::{stream_rows, CancellationToken, StreamChunk, TerminalStatus};

use crate::config::JobManagerConfig;
use crate::prompt::{build_prompt, parse_rows};
use crate::synth::synthesize_rows;

/// Everything a worker needs to drive a job, collected so the manager's
/// claim loop can hand off a fully self-contained execution unit.
pub struct Deps {
    pub store: Arc<dyn crate::store::JobStore>,
    pub ledger: Arc<dyn LedgerBackend>,
    pub tier_caps: Arc<dyn TierCapsProvider>,
    pub gateway: Arc<ProviderGateway>,
    pub storage: Arc<dyn StorageAdapter>,
    pub sink: Arc<dyn EventSink>,
    pub weights: ProviderWeights,
    pub config: JobManagerConfig,
}

fn artifact_key(job: &Job) -> String {
    format!("jobs/{}/rows.json", job.job_id.as_str())
}

async fn headroom_for(deps: &Deps, job: &Job) -> Result<PrivacyBudgetHeadroom, GocError> {
    if !job.config.add_noise {
        // Resolved Open Question (see DESIGN.md): a job that opted out of
        // differential-privacy noise has nothing to spend against, so both
        // headroom terms read as fully available.
        return Ok(PrivacyBudgetHeadroom {
            epsilon_spent: 0.0,
            epsilon_total: 1.0,
            delta_spent: 0.0,
            delta_total: 1.0,
        });
    }
    let period = job.period_yyyymm.clone().unwrap_or_else(current_period);
    let stats = deps.ledger.stats(&job.owner_id, &period).await?;
    let caps = deps.tier_caps.caps(&job.owner_id).await;
    Ok(PrivacyBudgetHeadroom {
        epsilon_spent: stats.epsilon_spent,
        epsilon_total: caps.epsilon_per_month,
        delta_spent: stats.delta_spent,
        // No tier-level delta cap is defined (spec.md names only rows/month
        // and epsilon/month caps); the job's own requested delta stands in
        // as the budget it is being measured against.
        delta_total: job.config.delta,
    })
}

pub fn current_period() -> String {
    Utc::now().format("%Y%m").to_string()
}

fn candidate_providers(gateway: &ProviderGateway) -> Vec<(ProviderKind, goc_protocol::ModelProfile)> {
    let profiles = goc_protocol::model_profiles();
    gateway
        .providers()
        .filter_map(|kind| profiles.values().find(|profile| profile.provider == kind).map(|profile| (kind, *profile)))
        .collect()
}

async fn call_provider(
    deps: &Deps,
    job: &Job,
    batch_rows: u32,
    correlation_id: &CorrelationId,
) -> Result<Vec<Value>, GocError> {
    let candidates = candidate_providers(&deps.gateway);
    if candidates.is_empty() {
        return Err(GocError::ProviderUnavailable {
            provider: "none".to_string(),
            message: "no providers registered with the gateway".to_string(),
            correlation_id: correlation_id.clone(),
        });
    }

    let ranked = rank_providers(&candidates, job.config.strategy, job.config.quality_threshold, &deps.weights);
    let ordered: Vec<ProviderKind> = ranked.iter().map(|s| s.provider).collect();

    let request = GenerationRequest {
        model_id: job.config.model_id.clone(),
        prompt: build_prompt(&job.descriptor, &job.config, batch_rows),
        sampling_params: SamplingParams {
            temperature: job.config.temperature,
            top_p: job.config.top_p,
            top_k: job.config.top_k,
        },
        max_output_tokens: job.config.max_output_tokens,
        stop_sequences: vec![],
        safety_settings: Default::default(),
    };

    if job.config.strategy == GenerationStrategy::Hybrid && ordered.len() >= 2 {
        let fan_out = ordered.len().min(deps.config.per_job_parallelism.max(2));
        let calls = ordered[..fan_out].iter().map(|&provider| {
            let gateway = deps.gateway.clone();
            let request = request.clone();
            let correlation_id = correlation_id.clone();
            async move { (provider, gateway.generate(provider, &request, &correlation_id).await) }
        });
        let results = join_all(calls).await;

        let mut rows_by_provider = Vec::new();
        let mut last_error = None;
        for (provider, result) in results {
            match result {
                Ok(response) => {
                    deps.sink.emit(GocEvent::ProviderCalled {
                        job_id: job.job_id.to_string(),
                        provider: provider.id().to_string(),
                        model_id: job.config.model_id.clone(),
                        attempt: 1,
                    });
                    rows_by_provider.push((provider, parse_rows(&response.response.text)));
                }
                Err(err) => {
                    warn!(provider = provider.id(), error = %err, "ensemble member failed");
                    last_error = Some(err);
                }
            }
        }
        if rows_by_provider.is_empty() {
            return Err(last_error.unwrap_or(GocError::ProviderUnavailable {
                provider: "none".to_string(),
                message: "every ensemble member failed".to_string(),
                correlation_id: correlation_id.clone(),
            }));
        }
        let scorer = RealismRowScorer::new(job.descriptor.columns.clone());
        let merged = merge_ensemble(&rows_by_provider, &scorer, ordered[0]);
        Ok(merged.rows)
    } else {
        let (provider, response) = invoke_with_fallback(&deps.gateway, &ordered, &request, correlation_id).await?;
        deps.sink.emit(GocEvent::ProviderCalled {
            job_id: job.job_id.to_string(),
            provider: provider.id().to_string(),
            model_id: job.config.model_id.clone(),
            attempt: 1,
        });
        Ok(parse_rows(&response.response.text))
    }
}

async fn release_reservation(deps: &Deps, job: &Job) {
    let (Some(reservation_id), Some(period)) = (job.reservation_id.clone(), job.period_yyyymm.clone()) else {
        return;
    };
    if let Err(err) = deps
        .ledger
        .release(ReleaseRequest {
            reservation_id,
            owner_id: job.owner_id.clone(),
            period_yyyymm: period,
        })
        .await
    {
        warn!(job_id = %job.job_id, error = %err, "failed to release ledger reservation");
    }
}

async fn finalize_terminal(deps: &Deps, mut job: Job, state: JobState, error: Option<&GocError>) -> Job {
    job.state = state;
    job.finished_at = Some(Utc::now());
    job.error = error.map(JobErrorSnapshot::from);
    if let Err(err) = deps.store.save(job.clone()).await {
        warn!(job_id = %job.job_id, error = %err, "failed to persist terminal job state");
    }
    deps.sink.emit(GocEvent::JobTerminal {
        job_id: job.job_id.to_string(),
        state: job.state.label().to_string(),
        rows_produced: job.rows_produced,
    });
    job
}

async fn fail(deps: &Deps, job: Job, err: GocError) -> Job {
    release_reservation(deps, &job).await;
    let state = if matches!(err, GocError::Cancelled { .. }) {
        JobState::Cancelled
    } else {
        JobState::Failed
    };
    finalize_terminal(deps, job, state, Some(&err)).await
}

/// Drives `job` from `Running` to a terminal state. `job` is assumed already
/// claimed (its state transition to `Running` happened atomically in
/// [`crate::store::JobStore::claim_next_queued`]).
pub async fn run(deps: &Deps, job: Job, cancellation: CancellationToken, stream_tx: Option<broadcast::Sender<StreamChunk>>) -> Job {
    if job.config.enable_streaming && job.config.strategy.requires_provider() {
        run_streaming(deps, job, cancellation, stream_tx).await
    } else {
        run_batch(deps, job, cancellation).await
    }
}

async fn run_batch(deps: &Deps, mut job: Job, cancellation: CancellationToken) -> Job {
    let correlation_id = CorrelationId::new();
    let mut rng = StdRng::from_entropy();
    let mut accumulated: Vec<Map<String, Value>> = Vec::new();
    let target = job.config.rows;
    let mut last_metrics = None;

    while (accumulated.len() as u64) < target {
        if cancellation.is_cancelled() {
            return fail(
                deps,
                job,
                GocError::Cancelled {
                    correlation_id: correlation_id.clone(),
                },
            )
            .await;
        }

        let remaining = target - accumulated.len() as u64;
        let batch_rows = remaining.min(job.config.batch_size as u64) as u32;

        let raw_rows = if job.config.strategy.requires_provider() {
            match call_provider(deps, &job, batch_rows, &correlation_id).await {
                Ok(rows) => rows,
                Err(err) => return fail(deps, job, err).await,
            }
        } else {
            synthesize_rows(&job.descriptor.columns, batch_rows as u64, &mut rng)
                .into_iter()
                .map(Value::Object)
                .collect()
        };

        let rows_as_maps: Vec<Map<String, Value>> =
            raw_rows.into_iter().filter_map(|value| value.as_object().cloned()).collect();
        if rows_as_maps.is_empty() {
            return fail(
                deps,
                job,
                GocError::Internal {
                    message: "batch produced no parsable rows".to_string(),
                    correlation_id: correlation_id.clone(),
                },
            )
            .await;
        }

        let headroom = match headroom_for(deps, &job).await {
            Ok(headroom) => headroom,
            Err(err) => return fail(deps, job, err).await,
        };

        let batch_len = rows_as_maps.len();
        match goc_realism::pipeline::run(
            &job.descriptor,
            rows_as_maps,
            headroom,
            job.config.quality_threshold,
            &correlation_id,
            &mut rng,
        ) {
            Ok(outcome) => {
                accumulated.extend(outcome.rows);
                last_metrics = Some(outcome.metrics);
                job.rows_produced = accumulated.len() as u64;
                job.progress = (job.rows_produced as f64 / target.max(1) as f64).clamp(0.0, 1.0);
                if let Err(err) = deps.store.save(job.clone()).await {
                    warn!(job_id = %job.job_id, error = %err, "failed to persist job progress");
                }
                deps.sink.emit(GocEvent::RowBatchAssembled {
                    job_id: job.job_id.to_string(),
                    rows_in_batch: batch_len,
                    rows_produced_total: job.rows_produced,
                });
            }
            Err(err) => return fail(deps, job, err).await,
        }
    }

    accumulated.truncate(target as usize);
    let bytes = match serde_json::to_vec(&accumulated) {
        Ok(bytes) => bytes,
        Err(err) => {
            return fail(
                deps,
                job,
                GocError::Internal {
                    message: format!("failed to serialize artifact: {err}"),
                    correlation_id: correlation_id.clone(),
                },
            )
            .await
        }
    };

    let key = artifact_key(&job);
    if let Err(err) = deps.storage.put(&key, bytes).await {
        return fail(deps, job, err).await;
    }

    if let (Some(reservation_id), Some(period)) = (job.reservation_id.clone(), job.period_yyyymm.clone()) {
        let actual_epsilon = if job.config.add_noise { Some(job.config.epsilon) } else { None };
        if let Err(err) = deps
            .ledger
            .commit(CommitRequest {
                reservation_id,
                owner_id: job.owner_id.clone(),
                period_yyyymm: period,
                actual_rows: accumulated.len() as u64,
                actual_epsilon,
            })
            .await
        {
            return fail(deps, job, err).await;
        }
    }

    job.output_key = Some(key);
    job.quality_metrics = last_metrics;
    job.rows_produced = accumulated.len() as u64;
    job.progress = 1.0;
    info!(job_id = %job.job_id, rows = job.rows_produced, "job completed");
    finalize_terminal(deps, job, JobState::Completed, None).await
}

async fn run_streaming(
    deps: &Deps,
    mut job: Job,
    cancellation: CancellationToken,
    stream_tx: Option<broadcast::Sender<StreamChunk>>,
) -> Job {
    job.state = JobState::Running { streaming: true };
    if let Err(err) = deps.store.save(job.clone()).await {
        warn!(job_id = %job.job_id, error = %err, "failed to persist streaming state");
    }

    let correlation_id = CorrelationId::new();
    let candidates = candidate_providers(&deps.gateway);
    if candidates.is_empty() {
        return fail(
            deps,
            job,
            GocError::ProviderUnavailable {
                provider: "none".to_string(),
                message: "no providers registered with the gateway".to_string(),
                correlation_id: correlation_id.clone(),
            },
        )
        .await;
    }
    let ranked = rank_providers(&candidates, job.config.strategy, job.config.quality_threshold, &deps.weights);
    let primary = ranked[0].provider;

    let request = GenerationRequest {
        model_id: job.config.model_id.clone(),
        prompt: build_prompt(&job.descriptor, &job.config, job.config.rows.min(u32::MAX as u64) as u32),
        sampling_params: SamplingParams {
            temperature: job.config.temperature,
            top_p: job.config.top_p,
            top_k: job.config.top_k,
        },
        max_output_tokens: job.config.max_output_tokens,
        stop_sequences: vec![],
        safety_settings: Default::default(),
    };

    let producer = match deps.gateway.generate_stream(primary, &request, &correlation_id).await {
        Ok(producer) => producer,
        Err(err) => return fail(deps, job, err).await,
    };

    let mut chunks = stream_rows(producer, job.descriptor.columns.clone(), job.config.rows, cancellation.clone());
    let mut accumulated: Vec<Value> = Vec::new();
    let mut terminal_status = None;

    while let Some(chunk) = chunks.next().await {
        if let Some(tx) = &stream_tx {
            let _ = tx.send(chunk.clone());
        }
        match chunk {
            StreamChunk::Rows { rows, progress } => {
                accumulated.extend(rows);
                job.rows_produced = accumulated.len() as u64;
                job.progress = progress;
                if let Err(err) = deps.store.save(job.clone()).await {
                    warn!(job_id = %job.job_id, error = %err, "failed to persist streaming progress");
                }
            }
            StreamChunk::Terminal { status, .. } => {
                terminal_status = Some(status);
                break;
            }
        }
    }

    match terminal_status.unwrap_or(TerminalStatus::Failed) {
        TerminalStatus::Cancelled => {
            fail(
                deps,
                job,
                GocError::Cancelled {
                    correlation_id: correlation_id.clone(),
                },
            )
            .await
        }
        TerminalStatus::Failed => {
            fail(
                deps,
                job,
                GocError::Internal {
                    message: "streaming pipeline failed".to_string(),
                    correlation_id: correlation_id.clone(),
                },
            )
            .await
        }
        TerminalStatus::Completed => {
            let key = artifact_key(&job);
            let bytes = match serde_json::to_vec(&accumulated) {
                Ok(bytes) => bytes,
                Err(err) => {
                    return fail(
                        deps,
                        job,
                        GocError::Internal {
                            message: format!("failed to serialize artifact: {err}"),
                            correlation_id: correlation_id.clone(),
                        },
                    )
                    .await
                }
            };
            if let Err(err) = deps.storage.put(&key, bytes).await {
                return fail(deps, job, err).await;
            }
            if let (Some(reservation_id), Some(period)) = (job.reservation_id.clone(), job.period_yyyymm.clone()) {
                let actual_epsilon = if job.config.add_noise { Some(job.config.epsilon) } else { None };
                if let Err(err) = deps
                    .ledger
                    .commit(CommitRequest {
                        reservation_id,
                        owner_id: job.owner_id.clone(),
                        period_yyyymm: period,
                        actual_rows: accumulated.len() as u64,
                        actual_epsilon,
                    })
                    .await
                {
                    return fail(deps, job, err).await;
                }
            }
            job.output_key = Some(key);
            job.rows_produced = accumulated.len() as u64;
            job.progress = 1.0;
            finalize_terminal(deps, job, JobState::Completed, None).await
        }
    }
}
