//! Error types for LLM providers and pipeline stages.
//!
//! `ProviderError` is defined here rather than in `sheetsmith-providers` so
//! the pipeline can downcast and classify failures for retry decisions
//! without string matching.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Errors that can occur when interacting with an LLM provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The API returned a 429 rate limit response.
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// Authentication failed (invalid API key).
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The requested model was not found.
    #[error("model not found: {0}")]
    ModelNotFound(String),

    /// The API returned an error response.
    #[error("API error (HTTP {status}): {message}")]
    ApiError { status: u16, message: String },

    /// The request timed out.
    #[error("request timed out after {0}s")]
    Timeout(u64),

    /// A network error occurred.
    #[error("network error: {0}")]
    NetworkError(String),

    /// The request could not be built for this provider (e.g. a malformed data URI).
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl ProviderError {
    /// Returns `true` if this error is permanent and should not be retried.
    pub fn is_permanent(&self) -> bool {
        match self {
            ProviderError::AuthenticationFailed(_)
            | ProviderError::ModelNotFound(_)
            | ProviderError::InvalidRequest(_) => true,
            ProviderError::ApiError { status, .. } => (400..500).contains(status),
            _ => false,
        }
    }

    /// Returns the retry-after delay in milliseconds, if applicable.
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            ProviderError::RateLimited { retry_after_ms } => Some(*retry_after_ms),
            _ => None,
        }
    }
}

/// The three pipeline stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Analyze,
    Generate,
    Customize,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Analyze => write!(f, "analysis"),
            Stage::Generate => write!(f, "problem generation"),
            Stage::Customize => write!(f, "customized problem generation"),
        }
    }
}

/// Errors returned by the analyze / generate / customize stages.
///
/// Every stage is all-or-nothing: an error never comes with partial output.
#[derive(Debug, Error)]
pub enum StageError {
    /// The worksheet analysis handed to a stage could not be parsed or is not schema-valid.
    #[error("invalid JSON format for worksheet analysis: {0}")]
    InvalidAnalysis(String),

    /// The customizer was called without instructions.
    #[error("a custom prompt is required to customize problem generation")]
    MissingPrompt,

    /// Some other caller-supplied argument was rejected.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The LLM call itself failed.
    #[error("{stage} failed: {source}")]
    External {
        stage: Stage,
        #[source]
        source: anyhow::Error,
    },

    /// The LLM answered, but the answer does not match the stage's output schema.
    #[error("{stage} failed: model output does not match the expected schema: {message}")]
    Schema { stage: Stage, message: String },

    /// The stage did not finish within its time budget.
    #[error("{stage} failed: timed out after {limit:?}")]
    Timeout { stage: Stage, limit: Duration },
}

impl StageError {
    /// Returns `true` if the error was detected before any LLM call was made.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            StageError::InvalidAnalysis(_) | StageError::MissingPrompt | StageError::InvalidInput(_)
        )
    }

    /// The underlying provider error, if the failure came from one.
    pub fn provider_error(&self) -> Option<&ProviderError> {
        match self {
            StageError::External { source, .. } => source.downcast_ref::<ProviderError>(),
            _ => None,
        }
    }
}
