//! The single error enum every GOC component ultimately converts into.
//!
//! Provider Gateway retries `ProviderTimeout`/`ProviderTransient` locally;
//! the Router decides whether to fall back to another provider or propagate;
//! whatever reaches the Job Manager as terminal gets written to the job
//! record and releases any reserved quota. Every variant threads a
//! [`CorrelationId`] so a single external request can be traced across
//! every internal hop.

use crate::CorrelationId;
use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum GocError {
    #[error("invalid argument: {message} [{correlation_id}]")]
    InvalidArgument {
        message: String,
        correlation_id: CorrelationId,
    },

    #[error("row quota exceeded for owner in this period [{correlation_id}]")]
    QuotaExceeded { correlation_id: CorrelationId },

    #[error("privacy budget exceeded (epsilon or delta cap reached) [{correlation_id}]")]
    PrivacyBudgetExceeded { correlation_id: CorrelationId },

    #[error("provider {provider} timed out after {elapsed_ms}ms [{correlation_id}]")]
    ProviderTimeout {
        provider: String,
        elapsed_ms: u64,
        correlation_id: CorrelationId,
    },

    #[error("provider {provider} returned a transient error: {message} [{correlation_id}]")]
    ProviderTransient {
        provider: String,
        message: String,
        correlation_id: CorrelationId,
    },

    #[error("provider {provider} unavailable: {message} [{correlation_id}]")]
    ProviderUnavailable {
        provider: String,
        message: String,
        correlation_id: CorrelationId,
    },

    #[error("provider refused the request on safety grounds: {reason} [{correlation_id}]")]
    SafetyRefused {
        reason: String,
        correlation_id: CorrelationId,
    },

    #[error("generated output quality {achieved:.3} below threshold {threshold:.3} [{correlation_id}]")]
    QualityBelowThreshold {
        achieved: f64,
        threshold: f64,
        correlation_id: CorrelationId,
    },

    #[error("cancelled [{correlation_id}]")]
    Cancelled { correlation_id: CorrelationId },

    #[error("internal error: {message} [{correlation_id}]")]
    Internal {
        message: String,
        correlation_id: CorrelationId,
    },
}

impl GocError {
    pub fn correlation_id(&self) -> &CorrelationId {
        match self {
            GocError::InvalidArgument { correlation_id, .. }
            | GocError::QuotaExceeded { correlation_id }
            | GocError::PrivacyBudgetExceeded { correlation_id }
            | GocError::ProviderTimeout { correlation_id, .. }
            | GocError::ProviderTransient { correlation_id, .. }
            | GocError::ProviderUnavailable { correlation_id, .. }
            | GocError::SafetyRefused { correlation_id, .. }
            | GocError::QualityBelowThreshold { correlation_id, .. }
            | GocError::Cancelled { correlation_id }
            | GocError::Internal { correlation_id, .. } => correlation_id,
        }
    }

    /// Whether the Provider Gateway should retry this error locally before
    /// surfacing it to the Router.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GocError::ProviderTimeout { .. } | GocError::ProviderTransient { .. }
        )
    }

    /// Whether the Router should consider falling back to another provider
    /// rather than propagating this error to the Job Manager.
    pub fn is_fallback_eligible(&self) -> bool {
        self.is_retryable() || matches!(self, GocError::ProviderUnavailable { .. })
    }

    pub fn internal(message: impl Into<String>, correlation_id: CorrelationId) -> Self {
        GocError::Internal {
            message: message.into(),
            correlation_id,
        }
    }
}
