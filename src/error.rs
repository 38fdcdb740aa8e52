//! Error types for AI Hospital.

use std::time::Duration;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Consultation error: {0}")]
    Consult(#[from] ConsultError),

    #[error("Export error: {0}")]
    Export(#[from] ExportError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Failures talking to the completion service.
///
/// These never escape the flow controller: question failures become a
/// fallback question and advice failures become the error report.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} rate limited, retry after {retry_after:?}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("Request to {provider} timed out after {timeout:?}")]
    Timeout { provider: String, timeout: Duration },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Rejected consultation actions. State is never mutated when one of these
/// is returned.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConsultError {
    /// Bad or missing user input; the user can correct it and resubmit.
    #[error("Invalid {field}: {message}")]
    Validation { field: String, message: String },

    /// The action is not valid in the current phase.
    #[error("Cannot {action} while in phase {phase}")]
    InvalidTransition { phase: String, action: String },

    /// An answer was submitted for a question that is no longer pending.
    #[error("Answer for question {got} is stale, question {expected} is pending")]
    StaleAnswer { expected: usize, got: usize },

    /// An answer was submitted but no generated question is waiting for one.
    #[error("No follow-up question is waiting for an answer")]
    NoPendingQuestion,
}

impl ConsultError {
    pub(crate) fn validation(field: &str, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.to_string(),
            message: message.into(),
        }
    }

    /// Whether the user can fix this by correcting their input.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }
}

/// Report export errors.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("No report has been generated yet")]
    NoReport,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
