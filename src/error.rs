use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classification of a failed inference call.
///
/// Credential and authorization kinds are surfaced to users with their own
/// message and are never retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InferenceErrorKind {
    /// Credentials were found but are no longer valid
    CredentialsExpired,
    /// The caller is authenticated but not allowed to use the model
    AccessDenied,
    /// No credentials could be located
    CredentialsMissing,
    /// Transport failures, throttling, malformed replies and everything else
    Other,
}

impl InferenceErrorKind {
    /// Message suitable for showing to the person who started the evaluation.
    pub fn user_message(self) -> &'static str {
        match self {
            Self::CredentialsExpired => {
                "The inference credentials have expired. Refresh them and run the evaluation again."
            }
            Self::AccessDenied => {
                "Access to the requested model was denied. Check that your account is allowed to invoke it."
            }
            Self::CredentialsMissing => {
                "No inference credentials were found. Configure credentials for the backend first."
            }
            Self::Other => "The evaluation failed because the inference backend call did not succeed.",
        }
    }

    /// Whether a wrapper on the backend side may retry this failure.
    pub fn is_transient(self) -> bool {
        matches!(self, Self::Other)
    }
}

impl fmt::Display for InferenceErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::CredentialsExpired => "credentials_expired",
            Self::AccessDenied => "access_denied",
            Self::CredentialsMissing => "credentials_missing",
            Self::Other => "other",
        };
        write!(f, "{name}")
    }
}

/// Error returned by an inference backend.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct InferenceError {
    pub kind: InferenceErrorKind,
    pub message: String,
}

impl InferenceError {
    pub fn new(kind: InferenceErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn credentials_expired(message: impl Into<String>) -> Self {
        Self::new(InferenceErrorKind::CredentialsExpired, message)
    }

    pub fn access_denied(message: impl Into<String>) -> Self {
        Self::new(InferenceErrorKind::AccessDenied, message)
    }

    pub fn credentials_missing(message: impl Into<String>) -> Self {
        Self::new(InferenceErrorKind::CredentialsMissing, message)
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(InferenceErrorKind::Other, message)
    }
}

/// Converts reqwest HTTP errors into transport failures
impl From<reqwest::Error> for InferenceError {
    fn from(err: reqwest::Error) -> Self {
        InferenceError::other(format!("HTTP error: {err}"))
    }
}

impl From<serde_json::Error> for InferenceError {
    fn from(err: serde_json::Error) -> Self {
        InferenceError::other(format!(
            "JSON parse error: {} at line {} column {}",
            err,
            err.line(),
            err.column()
        ))
    }
}

/// Error types raised by metric implementations and the plugin host.
#[derive(Debug, Error)]
pub enum MetricError {
    /// The metric ran but raised an error for this input
    #[error("metric execution failed: {0}")]
    Execution(String),
    /// The metric returned something that is not a finite number
    #[error("metric returned a non-numeric score: {0}")]
    NonNumeric(String),
    /// The plugin process could not be started
    #[error("failed to start metric plugin: {0}")]
    Spawn(#[from] std::io::Error),
    /// The plugin spoke something other than the expected JSON protocol
    #[error("metric plugin protocol error: {0}")]
    Protocol(String),
    /// The plugin did not answer in time
    #[error("metric plugin timed out after {0} ms")]
    Timeout(u64),
    /// The plugin does not expose a usable scoring capability
    #[error("no scorable metric found: {0}")]
    NotScorable(String),
}

impl From<serde_json::Error> for MetricError {
    fn from(err: serde_json::Error) -> Self {
        MetricError::Protocol(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = InferenceError::access_denied("model not enabled");
        assert_eq!(err.to_string(), "access_denied: model not enabled");
    }

    #[test]
    fn test_serde_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let err: InferenceError = json_err.into();
        assert_eq!(err.kind, InferenceErrorKind::Other);
        assert!(err.message.starts_with("JSON parse error"));
    }

    #[test]
    fn user_messages_are_distinct_per_kind() {
        let kinds = [
            InferenceErrorKind::CredentialsExpired,
            InferenceErrorKind::AccessDenied,
            InferenceErrorKind::CredentialsMissing,
            InferenceErrorKind::Other,
        ];
        let mut messages: Vec<_> = kinds.iter().map(|k| k.user_message()).collect();
        messages.sort();
        messages.dedup();
        assert_eq!(messages.len(), kinds.len());
    }

    #[test]
    fn only_other_is_transient() {
        assert!(InferenceErrorKind::Other.is_transient());
        assert!(!InferenceErrorKind::CredentialsExpired.is_transient());
        assert!(!InferenceErrorKind::AccessDenied.is_transient());
        assert!(!InferenceErrorKind::CredentialsMissing.is_transient());
    }
}
