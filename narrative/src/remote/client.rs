//! Generation endpoint client
//!
//! Speaks the Ollama-style generate API:
//!
//! ```text
//! POST {base_url}/api/generate   {"model": "...", "prompt": "...", "stream": false}
//!                             →  {"response": "...", "done": true}
//! GET  {base_url}/api/tags       liveness
//! ```

use crate::config::RemoteConfig;
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Upper bound on the liveness probe.
const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

/// Longest error body kept from a failed response.
const ERROR_BODY_LIMIT: usize = 200;

/// Failure of a single generation attempt.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("failed to encode generation request: {0}")]
    Marshal(#[source] serde_json::Error),

    #[error("failed to build request: {0}")]
    RequestCreation(String),

    #[error("generation request timeout after {0:?}")]
    Timeout(Duration),

    #[error("connection to {url} failed: {message}")]
    Connection { url: String, message: String },

    #[error("generation endpoint returned HTTP {status_code}: {body}")]
    Api { status_code: u16, body: String },

    #[error("failed to decode generation response: {0}")]
    Decode(String),

    #[error("generation cancelled")]
    Cancelled,
}

/// Stable error-kind names used in logs and error details.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationErrorKind {
    MarshalError,
    RequestCreationError,
    TimeoutError,
    ConnectionError,
    ApiError,
    DecodeError,
    Cancelled,
}

impl std::fmt::Display for GenerationErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MarshalError => write!(f, "marshal_error"),
            Self::RequestCreationError => write!(f, "request_creation_error"),
            Self::TimeoutError => write!(f, "timeout_error"),
            Self::ConnectionError => write!(f, "connection_error"),
            Self::ApiError => write!(f, "api_error"),
            Self::DecodeError => write!(f, "decode_error"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl GenerationError {
    pub fn kind(&self) -> GenerationErrorKind {
        match self {
            Self::Marshal(_) => GenerationErrorKind::MarshalError,
            Self::RequestCreation(_) => GenerationErrorKind::RequestCreationError,
            Self::Timeout(_) => GenerationErrorKind::TimeoutError,
            Self::Connection { .. } => GenerationErrorKind::ConnectionError,
            Self::Api { .. } => GenerationErrorKind::ApiError,
            Self::Decode(_) => GenerationErrorKind::DecodeError,
            Self::Cancelled => GenerationErrorKind::Cancelled,
        }
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Api { status_code, .. } => Some(*status_code),
            _ => None,
        }
    }

    pub fn is_server_error(&self) -> bool {
        self.status_code().is_some_and(|code| (500..=599).contains(&code))
    }
}

/// A text-generation endpoint.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// One generation attempt, no retries.
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;

    /// Cheap liveness probe.
    async fn health_check(&self) -> Result<(), GenerationError>;

    fn base_url(&self) -> &str;

    fn model(&self) -> &str;
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
}

/// HTTP client for an Ollama-compatible server.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    timeout: Duration,
}

impl OllamaClient {
    pub fn new(config: &RemoteConfig) -> Result<Self, GenerationError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| GenerationError::RequestCreation(e.to_string()))?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            timeout: config.timeout(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn classify(&self, err: reqwest::Error, timeout: Duration) -> GenerationError {
        if err.is_timeout() {
            GenerationError::Timeout(timeout)
        } else if err.is_builder() {
            GenerationError::RequestCreation(err.to_string())
        } else if err.is_decode() {
            GenerationError::Decode(err.to_string())
        } else {
            GenerationError::Connection {
                url: self.base_url.clone(),
                message: err.to_string(),
            }
        }
    }
}

#[async_trait]
impl GenerationBackend for OllamaClient {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let body = serde_json::to_vec(&GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
        })
        .map_err(GenerationError::Marshal)?;

        debug!(model = %self.model, prompt_chars = prompt.len(), "POST /api/generate");
        let response = self
            .http
            .post(self.endpoint("/api/generate"))
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| self.classify(e, self.timeout))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let body: String = body.chars().take(ERROR_BODY_LIMIT).collect();
            return Err(GenerationError::Api {
                status_code: status.as_u16(),
                body,
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| self.classify(e, self.timeout))?;
        let parsed: GenerateResponse =
            serde_json::from_slice(&bytes).map_err(|e| GenerationError::Decode(e.to_string()))?;
        if !parsed.done {
            debug!("Endpoint reported done=false for a non-streaming request");
        }
        Ok(parsed.response)
    }

    async fn health_check(&self) -> Result<(), GenerationError> {
        let timeout = self.timeout.min(HEALTH_TIMEOUT);
        let response = self
            .http
            .get(self.endpoint("/api/tags"))
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| self.classify(e, timeout))?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(GenerationError::Api {
                status_code: status.as_u16(),
                body: String::new(),
            })
        }
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        let err = GenerationError::Api {
            status_code: 503,
            body: "overloaded".into(),
        };
        assert_eq!(err.kind().to_string(), "api_error");
        assert!(err.is_server_error());
        assert!(!GenerationError::Timeout(Duration::from_secs(1)).is_server_error());
        assert_eq!(
            GenerationError::Connection {
                url: "http://x".into(),
                message: "refused".into()
            }
            .kind(),
            GenerationErrorKind::ConnectionError
        );
    }

    #[test]
    fn test_request_wire_format() {
        let body = serde_json::to_value(GenerateRequest {
            model: "llama3.2",
            prompt: "hi",
            stream: false,
        })
        .unwrap();
        assert_eq!(
            body,
            serde_json::json!({"model": "llama3.2", "prompt": "hi", "stream": false})
        );
    }

    #[test]
    fn test_response_decoding() {
        let parsed: GenerateResponse =
            serde_json::from_str(r#"{"model":"llama3.2","response":"Shipped it","done":true}"#)
                .unwrap();
        assert_eq!(parsed.response, "Shipped it");
        assert!(parsed.done);
    }

    #[test]
    fn test_client_trims_base_url() {
        let config = RemoteConfig {
            base_url: "http://localhost:11434/".into(),
            ..Default::default()
        };
        let client = OllamaClient::new(&config).unwrap();
        assert_eq!(client.base_url(), "http://localhost:11434");
        assert_eq!(client.endpoint("/api/tags"), "http://localhost:11434/api/tags");
        assert_eq!(client.model(), "llama3.2");
    }
}
