//! TOML configuration for the `goc` binary: provider endpoints, worker-pool
//! sizing, the quota tier table and storage backend selection, following
//! the `ai/config.rs` loader pattern from this workspace's ancestor crate
//! (default-if-missing, `#[serde(deny_unknown_fields)]` per section).

use std::path::{Path, PathBuf};
use std::time::Duration;

use goc_ledger::TierCaps;
use goc_provider_gateway::RetryPolicy;
use serde::Deserialize;

/// Error type for config operations.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("config not found at: {0}")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProviderMode {
    /// No network calls; responses come from an in-process [`goc_provider_gateway::MockProvider`].
    Mock,
    /// Real calls to the mediated gateway HTTP endpoint.
    Http,
}

impl Default for ProviderMode {
    fn default() -> Self {
        ProviderMode::Mock
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    #[serde(default)]
    pub mode: ProviderMode,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub bearer_token: String,
}

fn default_base_url() -> String {
    "https://gateway.invalid".to_string()
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            mode: ProviderMode::default(),
            base_url: default_base_url(),
            bearer_token: String::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub claude: ProviderConfig,
    #[serde(default)]
    pub gpt: ProviderConfig,
    #[serde(default)]
    pub palm: ProviderConfig,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_max_retries() -> u32 {
    3
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            claude: ProviderConfig::default(),
            gpt: ProviderConfig::default(),
            palm: ProviderConfig::default(),
            max_retries: default_max_retries(),
        }
    }
}

impl ProvidersConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::with_max_attempts(self.max_retries)
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Memory,
    Sqlite,
}

impl Default for BackendKind {
    fn default() -> Self {
        BackendKind::Sqlite
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobsConfig {
    #[serde(default)]
    pub worker_pool_size: Option<usize>,
    #[serde(default = "default_per_job_parallelism")]
    pub per_job_parallelism: usize,
    #[serde(default = "default_streaming_wall_clock_secs")]
    pub streaming_wall_clock_secs: u64,
    #[serde(default = "default_batch_wall_clock_secs")]
    pub batch_wall_clock_secs: u64,
    #[serde(default = "default_quota_reservation_timeout_secs")]
    pub quota_reservation_timeout_secs: u64,
    #[serde(default)]
    pub job_store_backend: BackendKind,
}

fn default_per_job_parallelism() -> usize {
    4
}
fn default_streaming_wall_clock_secs() -> u64 {
    600
}
fn default_batch_wall_clock_secs() -> u64 {
    1800
}
fn default_quota_reservation_timeout_secs() -> u64 {
    5
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            worker_pool_size: None,
            per_job_parallelism: default_per_job_parallelism(),
            streaming_wall_clock_secs: default_streaming_wall_clock_secs(),
            batch_wall_clock_secs: default_batch_wall_clock_secs(),
            quota_reservation_timeout_secs: default_quota_reservation_timeout_secs(),
            job_store_backend: BackendKind::default(),
        }
    }
}

impl JobsConfig {
    pub fn to_manager_config(&self) -> goc_jobs::JobManagerConfig {
        let mut config = goc_jobs::JobManagerConfig::default();
        if let Some(size) = self.worker_pool_size {
            config.worker_pool_size = size;
        }
        config.per_job_parallelism = self.per_job_parallelism;
        config.streaming_wall_clock = Duration::from_secs(self.streaming_wall_clock_secs);
        config.batch_wall_clock = Duration::from_secs(self.batch_wall_clock_secs);
        config.quota_reservation_timeout = Duration::from_secs(self.quota_reservation_timeout_secs);
        config
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DefaultTier {
    Free,
    Pro,
    Enterprise,
}

impl Default for DefaultTier {
    fn default() -> Self {
        DefaultTier::Free
    }
}

impl DefaultTier {
    pub fn caps(self) -> TierCaps {
        match self {
            DefaultTier::Free => TierCaps::FREE,
            DefaultTier::Pro => TierCaps::PRO,
            DefaultTier::Enterprise => TierCaps::ENTERPRISE,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LedgerConfig {
    #[serde(default)]
    pub backend: BackendKind,
    #[serde(default)]
    pub default_tier: DefaultTier,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            default_tier: DefaultTier::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    #[serde(default = "default_storage_root")]
    pub root: String,
    #[serde(default = "default_storage_base_url")]
    pub base_url: String,
    #[serde(default = "default_signing_key")]
    pub signing_key: String,
}

fn default_storage_root() -> String {
    "artifacts".to_string()
}
fn default_storage_base_url() -> String {
    "file:///goc/artifacts".to_string()
}
fn default_signing_key() -> String {
    "goc-development-signing-key".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_storage_root(),
            base_url: default_storage_base_url(),
            signing_key: default_signing_key(),
        }
    }
}

/// Top-level configuration for the `goc` CLI, loaded once at startup.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub jobs: JobsConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

impl AppConfig {
    /// Resolves `storage.root` and `ledger`/`job_store` sqlite paths
    /// against `$GOC_HOME` (`~/.goc` unless overridden), mirroring
    /// [`goc_logging::goc_home`].
    pub fn storage_root(&self) -> PathBuf {
        resolve_under_home(&self.storage.root)
    }

    pub fn ledger_db_path(&self) -> PathBuf {
        goc_logging::goc_home().join("ledger.db")
    }

    pub fn job_store_db_path(&self) -> PathBuf {
        goc_logging::goc_home().join("jobs.db")
    }
}

fn resolve_under_home(value: &str) -> PathBuf {
    let path = PathBuf::from(value);
    if path.is_absolute() {
        path
    } else {
        goc_logging::goc_home().join(path)
    }
}

/// Loads [`AppConfig`] from `config_path`, returning defaults if the file
/// does not exist.
pub fn load_config(config_path: &Path) -> Result<AppConfig> {
    if !config_path.exists() {
        return Ok(AppConfig::default());
    }

    let content = std::fs::read_to_string(config_path)?;
    let config: AppConfig = toml::from_str(&content)?;
    Ok(config)
}

/// Loads [`AppConfig`] from `$GOC_HOME/config.toml` (`~/.goc/config.toml`
/// unless `GOC_HOME` is set).
pub fn load_default_config() -> Result<AppConfig> {
    let config_path = goc_logging::goc_home().join("config.toml");
    load_config(&config_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_are_sensible() {
        let config = AppConfig::default();
        assert_eq!(config.providers.max_retries, 3);
        assert_eq!(config.jobs.per_job_parallelism, 4);
        assert_eq!(config.ledger.default_tier.caps(), TierCaps::FREE);
    }

    #[test]
    fn nonexistent_file_returns_defaults() {
        let temp = TempDir::new().unwrap();
        let config = load_config(&temp.path().join("missing.toml")).unwrap();
        assert_eq!(config.jobs.per_job_parallelism, 4);
    }

    #[test]
    fn partial_toml_overrides_only_named_fields() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join("config.toml");
        std::fs::write(
            &config_path,
            r#"
            [jobs]
            per_job_parallelism = 8

            [ledger]
            default_tier = "pro"
            "#,
        )
        .unwrap();

        let config = load_config(&config_path).unwrap();
        assert_eq!(config.jobs.per_job_parallelism, 8);
        assert_eq!(config.ledger.default_tier.caps(), TierCaps::PRO);
        assert_eq!(config.providers.max_retries, 3);
    }

    #[test]
    fn unknown_top_level_field_is_rejected() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join("config.toml");
        std::fs::write(&config_path, "unknown_section = true\n").unwrap();
        assert!(load_config(&config_path).is_err());
    }
}
