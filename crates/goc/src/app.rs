//! Wires the concrete backends named in [`crate::config::AppConfig`] into a
//! running [`goc_jobs::JobManager`]: sqlite or in-memory ledger and job
//! store, filesystem storage, mock or HTTP providers, tracing-backed event
//! sink.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use goc_ledger::{
    CachedTierCapsProvider, InMemoryLedger, LedgerBackend, SqliteLedger, StaticTierCapsProvider,
    TierCapsProvider,
};
use goc_logging::{EventSink, TracingSink};
use goc_protocol::Provider as ProviderKind;
use goc_provider_gateway::{HttpProvider, MockProvider, Provider, ProviderGateway};
use goc_storage::{FilesystemStorage, StorageAdapter};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Sqlite};

use crate::config::{AppConfig, BackendKind, ProviderMode};

/// Every collaborator a running [`goc_jobs::JobManager`] needs, constructed
/// once at startup from [`AppConfig`].
pub struct App {
    pub manager: goc_jobs::JobManager,
}

impl App {
    pub async fn build(config: &AppConfig) -> Result<Self> {
        std::fs::create_dir_all(goc_logging::goc_home()).context("failed to create GOC home directory")?;

        let storage_root = config.storage_root();
        std::fs::create_dir_all(&storage_root)
            .with_context(|| format!("failed to create storage root: {}", storage_root.display()))?;
        let storage: Arc<dyn StorageAdapter> = Arc::new(FilesystemStorage::new(
            storage_root,
            config.storage.signing_key.clone().into_bytes(),
            config.storage.base_url.clone(),
        ));

        let ledger: Arc<dyn LedgerBackend> = match config.ledger.backend {
            BackendKind::Memory => Arc::new(InMemoryLedger::new()),
            BackendKind::Sqlite => {
                let pool = open_sqlite_pool(&config.ledger_db_path()).await?;
                let ledger = SqliteLedger::new(pool);
                ledger.ensure_schema().await.context("failed to create ledger schema")?;
                Arc::new(ledger)
            }
        };

        let store: Arc<dyn goc_jobs::JobStore> = match config.jobs.job_store_backend {
            BackendKind::Memory => Arc::new(goc_jobs::InMemoryJobStore::new()),
            BackendKind::Sqlite => {
                let pool = open_sqlite_pool(&config.job_store_db_path()).await?;
                let store = goc_jobs::SqliteJobStore::new(pool);
                store.ensure_schema().await.context("failed to create job store schema")?;
                Arc::new(store)
            }
        };

        let tier_caps: Arc<dyn TierCapsProvider> = Arc::new(CachedTierCapsProvider::with_default_ttl(
            StaticTierCapsProvider(config.ledger.default_tier.caps()),
        ));

        let gateway = ProviderGateway::new(build_providers(config)).with_retry_policy(config.providers.retry_policy());

        let sink: Arc<dyn EventSink> = Arc::new(TracingSink);

        let manager = goc_jobs::JobManager::new(
            store,
            ledger,
            tier_caps,
            Arc::new(gateway),
            storage,
            sink,
            goc_router::ProviderWeights::new(),
            config.jobs.to_manager_config(),
        );

        Ok(Self { manager })
    }
}

fn build_providers(config: &AppConfig) -> Vec<Arc<dyn Provider>> {
    vec![
        build_provider(ProviderKind::Claude, "claude-sonnet-4-20250514", "/v1/providers/claude/generate", &config.providers.claude),
        build_provider(ProviderKind::Gpt, "gpt-4.1", "/v1/providers/gpt/generate", &config.providers.gpt),
        build_provider(ProviderKind::Palm, "palm-codey-2", "/v1/providers/palm/generate", &config.providers.palm),
    ]
}

fn build_provider(
    kind: ProviderKind,
    cheapest_model: &'static str,
    gateway_path: &'static str,
    provider_config: &crate::config::ProviderConfig,
) -> Arc<dyn Provider> {
    match provider_config.mode {
        ProviderMode::Mock => Arc::new(MockProvider::new(kind, cheapest_model)),
        ProviderMode::Http => Arc::new(HttpProvider::new(
            kind,
            cheapest_model,
            provider_config.base_url.clone(),
            gateway_path,
            provider_config.bearer_token.clone(),
        )),
    }
}

async fn open_sqlite_pool(path: &std::path::Path) -> Result<Pool<Sqlite>> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).with_context(|| format!("failed to create directory: {}", parent.display()))?;
    }
    let url = format!("sqlite://{}?mode=rwc", path.display());
    SqlitePoolOptions::new()
        .max_connections(8)
        .acquire_timeout(Duration::from_secs(10))
        .connect(&url)
        .await
        .with_context(|| format!("failed to open sqlite database at {}", path.display()))
}
