//! Error types for the insight pipeline.
//!
//! Three failure surfaces exist: missing upstream data (caught before any
//! paid generation call), a failed generation call, and a failed store
//! operation. Malformed generator *output* is never an error; it degrades
//! to unstructured markdown content instead.

use serde::Serialize;
use thiserror::Error;

use crate::types::InsightType;

// ============================================================================
// Generation Errors
// ============================================================================

/// Types of text-generation API errors
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum GenerationErrorKind {
    /// Rate limit exceeded - too many requests, retry after delay
    RateLimit,
    /// Quota/credits exhausted - need to upgrade plan or switch provider
    QuotaExceeded,
    /// Invalid or expired API key
    InvalidApiKey,
    /// Model not found or not available
    ModelNotFound,
    /// Server error on provider side
    ServerError,
    /// Network/connection error
    NetworkError,
    /// Other/unknown error
    Other,
}

/// Structured generation error with details
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationError {
    pub kind: GenerationErrorKind,
    pub message: String,
    pub provider: String,
    pub model: String,
    /// Suggested retry delay in seconds (for rate limit errors)
    pub retry_after_secs: Option<u32>,
}

impl GenerationError {
    pub fn rate_limit(provider: &str, model: &str, retry_after: Option<u32>) -> Self {
        Self {
            kind: GenerationErrorKind::RateLimit,
            message: "Too many requests. Please wait a moment and try again.".to_string(),
            provider: provider.to_string(),
            model: model.to_string(),
            retry_after_secs: retry_after,
        }
    }

    pub fn quota_exceeded(provider: &str, model: &str) -> Self {
        Self {
            kind: GenerationErrorKind::QuotaExceeded,
            message: "Quota exhausted. Please switch the model or provider.".to_string(),
            provider: provider.to_string(),
            model: model.to_string(),
            retry_after_secs: None,
        }
    }

    pub fn invalid_api_key(provider: &str, model: &str) -> Self {
        Self {
            kind: GenerationErrorKind::InvalidApiKey,
            message: "Invalid API key. Please check your settings.".to_string(),
            provider: provider.to_string(),
            model: model.to_string(),
            retry_after_secs: None,
        }
    }

    pub fn model_not_found(provider: &str, model: &str) -> Self {
        Self {
            kind: GenerationErrorKind::ModelNotFound,
            message: format!("Model '{}' is not available.", model),
            provider: provider.to_string(),
            model: model.to_string(),
            retry_after_secs: None,
        }
    }

    pub fn server_error(provider: &str, model: &str, details: &str) -> Self {
        Self {
            kind: GenerationErrorKind::ServerError,
            message: format!("Server error at {}: {}", provider, details),
            provider: provider.to_string(),
            model: model.to_string(),
            retry_after_secs: Some(5),
        }
    }

    pub fn network_error(provider: &str, model: &str, details: &str) -> Self {
        Self {
            kind: GenerationErrorKind::NetworkError,
            message: format!("Network error: {}", details),
            provider: provider.to_string(),
            model: model.to_string(),
            retry_after_secs: Some(3),
        }
    }

    pub fn other(provider: &str, model: &str, message: &str) -> Self {
        Self {
            kind: GenerationErrorKind::Other,
            message: message.to_string(),
            provider: provider.to_string(),
            model: model.to_string(),
            retry_after_secs: None,
        }
    }
}

impl std::fmt::Display for GenerationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for GenerationError {}

// ============================================================================
// Store Errors
// ============================================================================

/// Failure against the persistence collaborator.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("store read failed: {0}")]
    Read(String),
    #[error("store write failed: {0}")]
    Write(String),
}

// ============================================================================
// Pipeline Errors
// ============================================================================

/// Top-level failure of a pipeline run.
///
/// `NoData` is raised before any external call; `Generation` and `Store`
/// propagate collaborator failures unchanged. No partial record is ever
/// persisted on failure.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Zero transactions for an insight type that requires them.
    /// User-visible as "sync your accounts first".
    #[error("no transaction data for user {user_id}; sync accounts before requesting {insight_type}")]
    NoData {
        user_id: String,
        insight_type: InsightType,
    },

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
