//! End-to-end scenarios exercising the full Job Manager stack — ledger,
//! router, provider gateway, realism engine and streaming pipeline wired
//! together exactly as a host binary would wire them, with
//! [`goc_provider_gateway::MockProvider`] standing in for the network.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::StreamExt;
use goc_ids::{OwnerId, ReservationId};
use goc_ledger::{
    CachedTierCapsProvider, InMemoryLedger, LedgerBackend, ReserveRequest, StaticTierCapsProvider, TierCaps,
    TierCapsProvider,
};
use goc_logging::{EventSink, GocEvent, NoopSink};
use goc_protocol::{
    Column, Correlation, DatasetDescriptor, GenerationConfig, GenerationStrategy, JobState, LogicalType, PrivacyLevel,
    Provider as ProviderKind,
};
use goc_provider_gateway::{MockBehavior, MockProvider, Provider, ProviderGateway};
use goc_router::ProviderWeights;
use goc_storage::FilesystemStorage;
use serde_json::Value;
use tempfile::TempDir;

fn storage(dir: &Path) -> Arc<dyn goc_storage::StorageAdapter> {
    Arc::new(FilesystemStorage::new(dir.join("artifacts"), b"integration-test-key".to_vec(), "file://artifacts".to_string()))
}

fn base_config(strategy: GenerationStrategy, rows: u64) -> GenerationConfig {
    GenerationConfig {
        rows,
        privacy_level: PrivacyLevel::Low,
        epsilon: 1.0,
        delta: 1e-5,
        model_id: "claude-sonnet-4-20250514".into(),
        strategy,
        maintain_correlations: true,
        preserve_distributions: true,
        add_noise: false,
        quality_threshold: 0.5,
        batch_size: rows.max(1) as u32,
        max_retries: 3,
        enable_streaming: false,
        temperature: 1.0,
        top_p: 1.0,
        top_k: 40,
        max_output_tokens: 4096,
    }
}

fn manager(
    providers: Vec<Arc<dyn Provider>>,
    ledger: Arc<dyn LedgerBackend>,
    tier_caps: TierCaps,
    storage: Arc<dyn goc_storage::StorageAdapter>,
    sink: Arc<dyn EventSink>,
) -> goc_jobs::JobManager {
    let gateway = ProviderGateway::new(providers);
    goc_jobs::JobManager::new(
        Arc::new(goc_jobs::InMemoryJobStore::new()),
        ledger,
        Arc::new(CachedTierCapsProvider::with_default_ttl(StaticTierCapsProvider(tier_caps))),
        Arc::new(gateway),
        storage,
        sink,
        ProviderWeights::new(),
        goc_jobs::JobManagerConfig {
            worker_pool_size: 2,
            ..Default::default()
        },
    )
}

async fn wait_for_terminal(manager: &goc_jobs::JobManager, job_id: &goc_ids::JobId) -> goc_protocol::Job {
    for _ in 0..200 {
        let job = manager.status(job_id).await.unwrap().expect("job must exist");
        if job.state.is_terminal() {
            return job;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {job_id} never reached a terminal state");
}

#[derive(Default)]
struct CollectingSink(Mutex<Vec<GocEvent>>);

impl EventSink for CollectingSink {
    fn emit(&self, event: GocEvent) {
        self.0.lock().unwrap().push(event);
    }
}

impl CollectingSink {
    fn provider_used(&self) -> Option<String> {
        self.0.lock().unwrap().iter().find_map(|event| match event {
            GocEvent::ProviderCalled { provider, .. } => Some(provider.clone()),
            _ => None,
        })
    }
}

/// S1 (happy batch): a statistical (no-provider) job over a small schema
/// reaches `completed` with an artifact matching every declared constraint.
#[tokio::test]
async fn s1_happy_batch_completes_with_a_valid_artifact() {
    let temp = TempDir::new().unwrap();
    let mgr = manager(
        vec![],
        Arc::new(InMemoryLedger::new()),
        TierCaps::PRO,
        storage(temp.path()),
        Arc::new(NoopSink),
    );

    let mut age = Column::required("age", LogicalType::Integer);
    age.value_range = Some((0.0, 120.0));
    let mut email = Column::required("email", LogicalType::String);
    email.semantic_tag = Some("email".to_string());
    let descriptor = DatasetDescriptor {
        columns: vec![Column::required("id", LogicalType::Integer), email, age],
        business_rules: vec![],
        correlations: vec![],
    };

    let owner = OwnerId::new();
    let job_id = mgr.submit(owner, descriptor, base_config(GenerationStrategy::Statistical, 10)).await.unwrap();
    let job = wait_for_terminal(&mgr, &job_id).await;

    assert_eq!(job.state, JobState::Completed);
    let url = mgr.artifact_url(&job_id, Duration::from_secs(60)).await.unwrap();
    assert!(url.contains("rows.json"));

    let rows: Vec<Value> = serde_json::from_str(&std::fs::read_to_string(temp.path().join("artifacts").join("jobs").join(job_id.as_str()).join("rows.json")).unwrap()).unwrap();
    assert_eq!(rows.len(), 10);
    let email_pattern = regex::Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$").unwrap();
    for row in &rows {
        let age = row["age"].as_f64().unwrap();
        assert!((0.0..=120.0).contains(&age));
        assert!(email_pattern.is_match(row["email"].as_str().unwrap()));
    }
}

/// S2 (quota refusal): an owner who has already reserved 995 of a 1 000
/// row/month cap is refused a further 10-row job, and the ledger is left
/// untouched by the rejected attempt.
#[tokio::test]
async fn s2_quota_refusal_leaves_the_ledger_unchanged() {
    let temp = TempDir::new().unwrap();
    let ledger = Arc::new(InMemoryLedger::new());
    let tier_caps = TierCaps {
        rows_per_month: 1_000,
        epsilon_per_month: 5.0,
        max_custom_models: 0,
    };
    let owner = OwnerId::new();
    let period = goc_jobs::worker::current_period();
    ledger
        .reserve(ReserveRequest {
            reservation_id: ReservationId::new(),
            owner_id: owner.clone(),
            period_yyyymm: period.clone(),
            rows: 995,
            epsilon: None,
            delta: None,
            tier_caps,
        })
        .await
        .unwrap();

    let mgr = manager(vec![], ledger.clone(), tier_caps, storage(temp.path()), Arc::new(NoopSink));

    let descriptor = DatasetDescriptor {
        columns: vec![Column::required("id", LogicalType::Integer)],
        business_rules: vec![],
        correlations: vec![],
    };
    let err = mgr
        .submit(owner.clone(), descriptor, base_config(GenerationStrategy::Statistical, 10))
        .await
        .unwrap_err();
    assert!(matches!(err, goc_protocol::GocError::QuotaExceeded { .. }));

    let stats = ledger.stats(&owner, &period).await.unwrap();
    assert_eq!(stats.rows_reserved, 995);
    assert_eq!(stats.rows_committed, 0);
}

/// S3 (fallback): the higher-ranked provider exhausts its retries on
/// transient failures and the job completes via the next-ranked provider.
#[tokio::test]
async fn s3_job_completes_through_fallback_after_primary_exhausts_retries() {
    let temp = TempDir::new().unwrap();

    // For `AiCreative` with only Claude and Gpt registered, Gpt outranks
    // Claude (higher speed and cost bonus outweigh Claude's accuracy edge),
    // so Gpt is the one whose retries are exhausted here.
    let gpt = MockProvider::new(ProviderKind::Gpt, "gpt-4.1");
    gpt.queue(MockBehavior::Transient { message: "503".into() });
    gpt.queue(MockBehavior::Transient { message: "503".into() });
    gpt.queue(MockBehavior::Transient { message: "500".into() });
    let claude = MockProvider::new(ProviderKind::Claude, "claude-sonnet-4-20250514")
        .with_default_text(r#"[{"id": 1}, {"id": 2}]"#);

    let sink = Arc::new(CollectingSink::default());
    let mgr = manager(
        vec![Arc::new(gpt), Arc::new(claude)],
        Arc::new(InMemoryLedger::new()),
        TierCaps::PRO,
        storage(temp.path()),
        sink.clone(),
    );

    let descriptor = DatasetDescriptor {
        columns: vec![Column::required("id", LogicalType::Integer)],
        business_rules: vec![],
        correlations: vec![],
    };
    let job_id = mgr.submit(OwnerId::new(), descriptor, base_config(GenerationStrategy::AiCreative, 2)).await.unwrap();
    let job = wait_for_terminal(&mgr, &job_id).await;

    assert_eq!(job.state, JobState::Completed);
    assert_eq!(sink.provider_used().as_deref(), Some("claude"));
}

/// S4 (cancellation mid-stream): cancelling a streaming job releases its
/// full quota reservation and the job settles into either `cancelled` or
/// (if it finished before the cancel landed) `completed` — it never stays
/// `running` with the reservation still outstanding.
#[tokio::test]
async fn s4_cancelling_a_streaming_job_eventually_releases_its_reservation() {
    let temp = TempDir::new().unwrap();
    let rows: Vec<String> = (0..500).map(|i| format!("{{\"id\":{i}}}")).collect();
    let claude = MockProvider::new(ProviderKind::Claude, "claude-sonnet-4-20250514").with_default_text(rows.join(" "));

    let ledger = Arc::new(InMemoryLedger::new());
    let mgr = manager(vec![Arc::new(claude)], ledger.clone(), TierCaps::ENTERPRISE, storage(temp.path()), Arc::new(NoopSink));

    let descriptor = DatasetDescriptor {
        columns: vec![Column::required("id", LogicalType::Integer)],
        business_rules: vec![],
        correlations: vec![],
    };
    let mut config = base_config(GenerationStrategy::AiCreative, 500);
    config.enable_streaming = true;
    let owner = OwnerId::new();
    let job_id = mgr.submit(owner.clone(), descriptor, config).await.unwrap();

    let mut subscription = mgr.stream_job(&job_id).await.unwrap().expect("streaming job must be subscribable");
    let mut rows_seen = 0u64;
    while rows_seen < 5 {
        match subscription.next().await {
            Some(Ok(goc_streaming::StreamChunk::Rows { rows, .. })) => rows_seen += rows.len() as u64,
            Some(Ok(goc_streaming::StreamChunk::Terminal { .. })) | None => break,
            Some(Err(_)) => {}
        }
    }
    mgr.cancel(&job_id).await.unwrap();

    let job = wait_for_terminal(&mgr, &job_id).await;
    assert!(matches!(job.state, JobState::Cancelled | JobState::Completed));

    let period = goc_jobs::worker::current_period();
    let stats = ledger.stats(&owner, &period).await.unwrap();
    assert_eq!(stats.rows_reserved, 0, "cancellation must not leave a dangling reservation");
}

/// S5 (privacy scrub): a healthcare-domain dataset never leaks a raw SSN
/// into the artifact, regardless of what the provider returned.
#[tokio::test]
async fn s5_healthcare_domain_scrubs_ssn_fields() {
    let temp = TempDir::new().unwrap();
    let claude = MockProvider::new(ProviderKind::Claude, "claude-sonnet-4-20250514")
        .with_default_text(r#"[{"ssn": "123-45-6789"}, {"ssn": "987-65-4321"}]"#);

    let mgr = manager(vec![Arc::new(claude)], Arc::new(InMemoryLedger::new()), TierCaps::PRO, storage(temp.path()), Arc::new(NoopSink));

    let mut ssn = Column::required("ssn", LogicalType::String);
    ssn.semantic_tag = Some("ssn".to_string());
    ssn.regex_pattern = Some(r"^\d{3}-\d{2}-\d{4}$".to_string());
    let descriptor = DatasetDescriptor {
        columns: vec![ssn],
        business_rules: vec!["domain:healthcare".to_string()],
        correlations: vec![],
    };
    let mut config = base_config(GenerationStrategy::AiCreative, 2);
    config.quality_threshold = 0.1;
    let job_id = mgr.submit(OwnerId::new(), descriptor, config).await.unwrap();
    let job = wait_for_terminal(&mgr, &job_id).await;

    assert_eq!(job.state, JobState::Completed);
    let metrics = job.quality_metrics.expect("completed job must carry quality metrics");
    assert!(metrics.privacy_protection >= 0.9);

    let rows_path = temp.path().join("artifacts").join("jobs").join(job_id.as_str()).join("rows.json");
    let rows: Vec<Value> = serde_json::from_str(&std::fs::read_to_string(rows_path).unwrap()).unwrap();
    for row in &rows {
        assert_eq!(row["ssn"], Value::String("***-**-****".to_string()));
    }
}

/// S6 (quality fail): a threshold the repaired rows cannot meet terminates
/// the job as `failed` with `QualityBelowThreshold`, and the reservation is
/// released rather than committed.
#[tokio::test]
async fn s6_quality_below_threshold_fails_the_job_and_releases_quota() {
    let temp = TempDir::new().unwrap();
    // A correlation between two unrelated columns the statistical
    // synthesizer has no way to honor, at a threshold no repair can clear.
    let descriptor = DatasetDescriptor {
        columns: vec![
            Column::required("a", LogicalType::Integer),
            Column::required("b", LogicalType::Integer),
        ],
        business_rules: vec![],
        correlations: vec![Correlation { column_a: "a".into(), column_b: "b".into(), coefficient: 0.95 }],
    };
    let mut config = base_config(GenerationStrategy::Statistical, 50);
    config.quality_threshold = 0.99;

    let ledger = Arc::new(InMemoryLedger::new());
    let owner = OwnerId::new();
    let mgr = manager(vec![], ledger.clone(), TierCaps::PRO, storage(temp.path()), Arc::new(NoopSink));
    let job_id = mgr.submit(owner.clone(), descriptor, config).await.unwrap();
    let job = wait_for_terminal(&mgr, &job_id).await;

    assert_eq!(job.state, JobState::Failed);
    let error = job.error.expect("failed job must carry an error snapshot");
    assert_eq!(error.kind, "quality_below_threshold");

    let period = goc_jobs::worker::current_period();
    let stats = ledger.stats(&owner, &period).await.unwrap();
    assert_eq!(stats.rows_reserved, 0);
    assert_eq!(stats.rows_committed, 0);
}
