//! Pipeline error types
//!
//! Every failure that crosses a module boundary is a [`NarrativeError`]: a
//! tagged error carrying its kind, a human-readable message, an optional
//! wrapped cause and a details map with remediation context.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Result type alias for pipeline operations
pub type NarrativeResult<T> = Result<T, NarrativeError>;

/// Coarse error taxonomy used for propagation decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Missing required identifier or malformed input item.
    Validation,
    /// A single-item transform failed.
    Processing,
    /// Remote generation endpoint failed (connection, timeout, HTTP status).
    Network,
    /// Output was produced but is empty, too short or generic.
    SynthesisQuality,
    /// Invalid configuration values.
    Configuration,
    /// The caller cancelled the operation.
    Cancelled,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation => write!(f, "validation"),
            Self::Processing => write!(f, "processing"),
            Self::Network => write!(f, "network"),
            Self::SynthesisQuality => write!(f, "synthesis_quality"),
            Self::Configuration => write!(f, "configuration"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

type BoxedCause = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Tagged pipeline error.
///
/// ```text
/// NarrativeError { kind: Network, message: "model 'llama3.2' not found ...",
///                  cause: Some(GenerationError::Api { 404, .. }),
///                  details: { "error_kind": "api_error", "attempts": "1" } }
/// ```
#[derive(Debug, Error)]
#[error("{kind} error: {message}")]
pub struct NarrativeError {
    /// Error category
    pub kind: ErrorKind,
    /// Human-readable message, including a remediation hint where one exists
    pub message: String,
    /// Underlying error, if any
    #[source]
    pub cause: Option<BoxedCause>,
    /// Machine-readable context (error kind, attempt counts, endpoint, ...)
    pub details: BTreeMap<String, String>,
}

impl NarrativeError {
    /// Create a new error with no cause and no details
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            cause: None,
            details: BTreeMap::new(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn processing(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Processing, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Network, message)
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration, message)
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Cancelled, message)
    }

    /// Attach the underlying cause
    pub fn with_cause<E>(mut self, cause: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.cause = Some(Box::new(cause));
        self
    }

    /// Add a context key-value pair
    pub fn with_detail(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.details.insert(key.into(), value.to_string());
        self
    }

    pub fn detail(&self, key: &str) -> Option<&str> {
        self.details.get(key).map(String::as_str)
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind == ErrorKind::Cancelled
    }

    /// Serializable view of this error for reports.
    pub fn to_summary(&self) -> ErrorSummary {
        ErrorSummary {
            kind: self.kind,
            message: self.message.clone(),
            cause: self.cause.as_ref().map(|c| c.to_string()),
            details: self.details.clone(),
        }
    }
}

/// Owned, serializable snapshot of a [`NarrativeError`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorSummary {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_display_includes_kind_and_message() {
        let err = NarrativeError::validation("issue key is empty");
        assert_eq!(err.to_string(), "validation error: issue key is empty");
    }

    #[test]
    fn test_cause_is_exposed_as_source() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk gone");
        let err = NarrativeError::processing("could not read").with_cause(io);
        assert_eq!(err.source().map(|s| s.to_string()), Some("disk gone".into()));
    }

    #[test]
    fn test_details_and_summary() {
        let err = NarrativeError::network("unreachable")
            .with_detail("base_url", "http://localhost:11434")
            .with_detail("attempts", 4);
        assert_eq!(err.detail("attempts"), Some("4"));

        let summary = err.to_summary();
        assert_eq!(summary.kind, ErrorKind::Network);
        assert_eq!(summary.details.len(), 2);
        assert!(summary.cause.is_none());
    }
}
