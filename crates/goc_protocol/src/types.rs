//! The GOC data model: dataset descriptors, generation config, the job
//! record, quality metrics, the usage ledger entry, and the closed provider
//! sum type.

use crate::error::GocError;
use crate::{CorrelationId, JobId, OwnerId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A validation error surfaced by [`Validate::validate`].
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError(pub String);

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Implemented by every config/descriptor type the Job Manager accepts at
/// `submit_job`, so validation has one call site per type.
pub trait Validate {
    fn validate(&self) -> Result<(), ValidationError>;
}

fn require(condition: bool, message: impl Into<String>) -> Result<(), ValidationError> {
    if condition {
        Ok(())
    } else {
        Err(ValidationError(message.into()))
    }
}

// ---------------------------------------------------------------------
// Dataset descriptor
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogicalType {
    Integer,
    Float,
    String,
    Boolean,
    Date,
    DateTime,
    Json,
}

/// Per-column generation strategy override.
///
/// Carried over from the original system this core was distilled from: a
/// column (e.g. `account_number`) can pin its own strategy independent of
/// the job-level [`GenerationStrategy`], most commonly `PatternBased` for
/// columns that should never need a provider call to regenerate.
pub type ColumnStrategyOverride = GenerationStrategy;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub logical_type: LogicalType,
    #[serde(default)]
    pub nullable: bool,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub regex_pattern: Option<String>,
    #[serde(default)]
    pub value_range: Option<(f64, f64)>,
    #[serde(default)]
    pub enum_values: Option<Vec<String>>,
    #[serde(default)]
    pub semantic_tag: Option<String>,
    #[serde(default)]
    pub strategy_override: Option<ColumnStrategyOverride>,
}

impl Column {
    pub fn required(name: impl Into<String>, logical_type: LogicalType) -> Self {
        Self {
            name: name.into(),
            logical_type,
            nullable: false,
            unique: false,
            regex_pattern: None,
            value_range: None,
            enum_values: None,
            semantic_tag: None,
            strategy_override: None,
        }
    }

    pub fn optional(name: impl Into<String>, logical_type: LogicalType) -> Self {
        let mut column = Self::required(name, logical_type);
        column.nullable = true;
        column
    }
}

impl Validate for Column {
    fn validate(&self) -> Result<(), ValidationError> {
        require(!self.name.is_empty(), "column name must not be empty")?;
        if let Some((lo, hi)) = self.value_range {
            require(lo <= hi, format!("column {}: value_range lo must be <= hi", self.name))?;
        }
        if let Some(values) = &self.enum_values {
            require(!values.is_empty(), format!("column {}: enum_values must not be empty", self.name))?;
        }
        Ok(())
    }
}

/// A named correlation between two columns, `[-1.0, 1.0]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Correlation {
    pub column_a: String,
    pub column_b: String,
    pub coefficient: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasetDescriptor {
    pub columns: Vec<Column>,
    #[serde(default)]
    pub business_rules: Vec<String>,
    #[serde(default)]
    pub correlations: Vec<Correlation>,
}

impl Validate for DatasetDescriptor {
    fn validate(&self) -> Result<(), ValidationError> {
        require(!self.columns.is_empty(), "dataset descriptor must declare at least one column")?;
        let mut seen = std::collections::HashSet::new();
        for column in &self.columns {
            column.validate()?;
            require(seen.insert(column.name.as_str()), format!("duplicate column name: {}", column.name))?;
        }
        for correlation in &self.correlations {
            require(
                (-1.0..=1.0).contains(&correlation.coefficient),
                format!(
                    "correlation {}/{} coefficient out of range [-1,1]",
                    correlation.column_a, correlation.column_b
                ),
            )?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------
// Generation config
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrivacyLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationStrategy {
    Statistical,
    AiCreative,
    Hybrid,
    PatternBased,
    ConstraintDriven,
}

impl GenerationStrategy {
    /// Whether this strategy ever needs a provider call to produce rows.
    pub fn requires_provider(self) -> bool {
        !matches!(self, GenerationStrategy::PatternBased | GenerationStrategy::Statistical)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    pub rows: u64,
    pub privacy_level: PrivacyLevel,
    pub epsilon: f64,
    pub delta: f64,
    pub model_id: String,
    pub strategy: GenerationStrategy,
    #[serde(default = "default_true")]
    pub maintain_correlations: bool,
    #[serde(default = "default_true")]
    pub preserve_distributions: bool,
    #[serde(default)]
    pub add_noise: bool,
    pub quality_threshold: f64,
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_true")]
    pub enable_streaming: bool,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_top_p")]
    pub top_p: f64,
    #[serde(default = "default_top_k")]
    pub top_k: u32,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
}

fn default_true() -> bool {
    true
}
fn default_batch_size() -> u32 {
    100
}
fn default_max_retries() -> u32 {
    3
}
fn default_temperature() -> f64 {
    1.0
}
fn default_top_p() -> f64 {
    1.0
}
fn default_top_k() -> u32 {
    40
}
fn default_max_output_tokens() -> u32 {
    4096
}

impl Validate for GenerationConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        require(self.rows > 0, "rows must be > 0")?;
        require(self.epsilon > 0.0, "epsilon must be > 0")?;
        require((0.0..1.0).contains(&self.delta), "delta must be in (0, 1)")?;
        require(!self.model_id.is_empty(), "model_id must not be empty")?;
        require(
            (0.0..=1.0).contains(&self.quality_threshold),
            "quality_threshold must be in [0, 1]",
        )?;
        require(self.batch_size > 0, "batch_size must be > 0")?;
        require(
            (0.0..=2.0).contains(&self.temperature),
            "temperature must be in [0, 2]",
        )?;
        require((0.0..=1.0).contains(&self.top_p) && self.top_p > 0.0, "top_p must be in (0, 1]")?;
        require(self.top_k >= 1, "top_k must be >= 1")?;
        require(self.max_output_tokens > 0, "max_output_tokens must be > 0")?;
        Ok(())
    }
}

// ---------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobState {
    Queued,
    /// `streaming` is a sub-mode reported alongside `running`, not a
    /// separate externally reachable state.
    Running { streaming: bool },
    Completed,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed | JobState::Cancelled)
    }

    pub fn label(&self) -> &'static str {
        match self {
            JobState::Queued => "queued",
            JobState::Running { .. } => "running",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::Cancelled => "cancelled",
        }
    }
}

/// A serializable snapshot of a [`GocError`], stored on a terminal job
/// record. `Job` must be cheaply clonable and serializable for
/// `get_job`/`status()`, which `GocError` itself is not guaranteed to
/// remain (a future variant could carry a non-serializable payload).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobErrorSnapshot {
    pub kind: String,
    pub message: String,
    pub correlation_id: String,
}

impl From<&GocError> for JobErrorSnapshot {
    fn from(err: &GocError) -> Self {
        let kind = match err {
            GocError::InvalidArgument { .. } => "invalid_argument",
            GocError::QuotaExceeded { .. } => "quota_exceeded",
            GocError::PrivacyBudgetExceeded { .. } => "privacy_budget_exceeded",
            GocError::ProviderTimeout { .. } => "provider_timeout",
            GocError::ProviderTransient { .. } => "provider_transient",
            GocError::ProviderUnavailable { .. } => "provider_unavailable",
            GocError::SafetyRefused { .. } => "safety_refused",
            GocError::QualityBelowThreshold { .. } => "quality_below_threshold",
            GocError::Cancelled { .. } => "cancelled",
            GocError::Internal { .. } => "internal",
        };
        Self {
            kind: kind.to_string(),
            message: err.to_string(),
            correlation_id: err.correlation_id().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityMetrics {
    pub statistical_similarity: f64,
    pub distribution_fidelity: f64,
    pub correlation_preservation: f64,
    pub privacy_protection: f64,
    pub semantic_coherence: f64,
    pub constraint_compliance: f64,
    pub execution_time_ms: u64,
    pub peak_memory_bytes: u64,
}

impl QualityMetrics {
    /// Arithmetic mean of the six `[0,1]` components, itself clamped to
    /// `[0,1]` in case a component was computed slightly out of range.
    pub fn overall(&self) -> f64 {
        let sum = self.statistical_similarity
            + self.distribution_fidelity
            + self.correlation_preservation
            + self.privacy_protection
            + self.semantic_coherence
            + self.constraint_compliance;
        (sum / 6.0).clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub job_id: JobId,
    pub owner_id: OwnerId,
    pub state: JobState,
    pub descriptor: DatasetDescriptor,
    pub config: GenerationConfig,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub progress: f64,
    pub rows_produced: u64,
    pub output_key: Option<String>,
    pub quality_metrics: Option<QualityMetrics>,
    pub error: Option<JobErrorSnapshot>,
    /// Set once the Job Manager has reserved quota for this job against the
    /// usage ledger; `commit`/`release` are keyed off it so a crashed and
    /// resumed job never double-charges.
    #[serde(default)]
    pub reservation_id: Option<crate::ReservationId>,
    #[serde(default)]
    pub period_yyyymm: Option<String>,
}

impl Job {
    pub fn new(owner_id: OwnerId, descriptor: DatasetDescriptor, config: GenerationConfig) -> Self {
        Self {
            job_id: JobId::new(),
            owner_id,
            state: JobState::Queued,
            descriptor,
            config,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            progress: 0.0,
            rows_produced: 0,
            output_key: None,
            quality_metrics: None,
            error: None,
            reservation_id: None,
            period_yyyymm: None,
        }
    }
}

// ---------------------------------------------------------------------
// Usage ledger entry
// ---------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageLedgerEntry {
    pub owner_id: OwnerId,
    pub period_yyyymm: String,
    pub rows_reserved: u64,
    pub rows_committed: u64,
    pub epsilon_spent: f64,
    pub delta_spent: f64,
    pub custom_model_count: u32,
}

impl UsageLedgerEntry {
    pub fn new(owner_id: OwnerId, period_yyyymm: impl Into<String>) -> Self {
        Self {
            owner_id,
            period_yyyymm: period_yyyymm.into(),
            rows_reserved: 0,
            rows_committed: 0,
            epsilon_spent: 0.0,
            delta_spent: 0.0,
            custom_model_count: 0,
        }
    }
}

// ---------------------------------------------------------------------
// Provider — closed sum type, never a dynamic registry
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    Claude,
    Gpt,
    Palm,
}

impl Provider {
    pub const ALL: [Provider; 3] = [Provider::Claude, Provider::Gpt, Provider::Palm];

    /// Lexicographic provider id, used as the final routing tie-break.
    pub fn id(self) -> &'static str {
        match self {
            Provider::Claude => "claude",
            Provider::Gpt => "gpt",
            Provider::Palm => "palm",
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id())
    }
}

/// Static per-model characteristics the gateway consults for routing and
/// cost estimation. Not fetched at runtime.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelProfile {
    pub provider: Provider,
    pub context_tokens: u32,
    pub cost_per_1k_input_tokens_usd: f64,
    pub cost_per_1k_output_tokens_usd: f64,
    pub accuracy_rating: f64,
    pub relative_speed: f64,
}

pub fn model_profiles() -> HashMap<&'static str, ModelProfile> {
    let mut map = HashMap::new();
    map.insert(
        "claude-sonnet-4-20250514",
        ModelProfile {
            provider: Provider::Claude,
            context_tokens: 200_000,
            cost_per_1k_input_tokens_usd: 0.003,
            cost_per_1k_output_tokens_usd: 0.015,
            accuracy_rating: 0.93,
            relative_speed: 0.8,
        },
    );
    map.insert(
        "gpt-4.1",
        ModelProfile {
            provider: Provider::Gpt,
            context_tokens: 128_000,
            cost_per_1k_input_tokens_usd: 0.002,
            cost_per_1k_output_tokens_usd: 0.008,
            accuracy_rating: 0.91,
            relative_speed: 0.9,
        },
    );
    map.insert(
        "palm-codey-2",
        ModelProfile {
            provider: Provider::Palm,
            context_tokens: 32_000,
            cost_per_1k_input_tokens_usd: 0.0005,
            cost_per_1k_output_tokens_usd: 0.0015,
            accuracy_rating: 0.85,
            relative_speed: 1.2,
        },
    );
    map
}
