//! Bounded retry with exponential backoff and cancellation
//!
//! Attempt `i > 0` waits `base_delay * 2^(i-1)` first. Only timeouts,
//! connection failures and 5xx responses are retried; everything else
//! stops the loop. Cancellation aborts both the in-flight call and any
//! pending backoff sleep and is always surfaced as-is.

use super::client::{GenerationBackend, GenerationError, GenerationErrorKind};
use crate::config::RemoteConfig;
use crate::error::NarrativeError;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Retry schedule for generation calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    pub fn from_config(config: &RemoteConfig) -> Self {
        Self::new(config.max_retries, config.base_backoff())
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Sleep before `attempt` (0-based). Zero for the first attempt.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let factor = 1u32.checked_shl(attempt - 1).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }
}

/// Timeouts, connection failures and 5xx responses.
pub fn is_retryable_error(err: &GenerationError) -> bool {
    match err.kind() {
        GenerationErrorKind::TimeoutError | GenerationErrorKind::ConnectionError => true,
        GenerationErrorKind::ApiError => err.is_server_error(),
        _ => false,
    }
}

/// Whether a final failure should hand over to the rule-based synthesizer.
pub fn should_fallback_to_embedded(err: &GenerationError) -> bool {
    is_retryable_error(err)
}

/// The last error and how many attempts were made.
#[derive(Debug)]
pub struct RetryFailure {
    pub error: GenerationError,
    pub attempts: u32,
}

/// Call `backend.generate` under `policy`, honouring `cancel`.
pub async fn generate_with_retry(
    backend: &dyn GenerationBackend,
    prompt: &str,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
) -> Result<String, RetryFailure> {
    let mut attempts = 0;
    loop {
        if attempts > 0 {
            let delay = policy.delay_for_attempt(attempts);
            debug!(attempt = attempts, delay_ms = delay.as_millis() as u64, "Backing off");
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(RetryFailure { error: GenerationError::Cancelled, attempts });
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
        if cancel.is_cancelled() {
            return Err(RetryFailure {
                error: GenerationError::Cancelled,
                attempts,
            });
        }

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(GenerationError::Cancelled),
            r = backend.generate(prompt) => r,
        };
        attempts += 1;

        match result {
            Ok(text) => return Ok(text),
            Err(error) if is_retryable_error(&error) && attempts < policy.max_attempts() => {
                warn!(
                    attempt = attempts,
                    max_attempts = policy.max_attempts(),
                    kind = %error.kind(),
                    "Generation attempt failed, retrying: {error}"
                );
            }
            Err(error) => return Err(RetryFailure { error, attempts }),
        }
    }
}

/// Turn a final failure into an actionable pipeline error.
pub fn enhance_error(failure: RetryFailure, base_url: &str, model: &str) -> NarrativeError {
    let RetryFailure { error, attempts } = failure;
    let kind = error.kind();

    let message = match &error {
        GenerationError::Cancelled => {
            return NarrativeError::cancelled("generation cancelled")
                .with_detail("attempts", attempts)
                .with_detail("error_kind", kind);
        }
        GenerationError::Api {
            status_code: 404, ..
        } => format!(
            "model '{model}' not found at {base_url}; pull it with `ollama pull {model}` or set STANDUP_LLM_MODEL"
        ),
        GenerationError::Api {
            status_code: code @ (401 | 403),
            ..
        } => format!(
            "generation endpoint rejected the request (HTTP {code}); check authentication for {base_url}"
        ),
        GenerationError::Api { status_code, .. } if error.is_server_error() => format!(
            "generation endpoint at {base_url} returned HTTP {status_code} after {attempts} attempt(s); check the service logs"
        ),
        GenerationError::Api { status_code, body } => {
            format!("generation endpoint returned HTTP {status_code}: {body}")
        }
        GenerationError::Connection { .. } => format!(
            "connection to generation endpoint at {base_url} failed after {attempts} attempt(s); start the service or set STANDUP_LLM_URL"
        ),
        GenerationError::Timeout(after) => format!(
            "generation request timeout ({after:?}) after {attempts} attempt(s); increase STANDUP_LLM_TIMEOUT_SECS or use a smaller model than '{model}'"
        ),
        GenerationError::Marshal(_) => "failed to encode the generation request".to_string(),
        GenerationError::RequestCreation(_) => {
            format!("could not build a request for {base_url}; check the URL format")
        }
        GenerationError::Decode(_) => format!(
            "unexpected response from {base_url}; check that it serves the generate API"
        ),
    };

    let mut enhanced = NarrativeError::network(message)
        .with_detail("error_kind", kind)
        .with_detail("attempts", attempts)
        .with_detail("base_url", base_url)
        .with_detail("model", model);
    if let Some(code) = error.status_code() {
        enhanced = enhanced.with_detail("status_code", code);
    }
    enhanced.with_cause(error)
}

/// One liveness probe, no retries, with the same remediation hints as
/// generation failures.
pub async fn probe_endpoint(backend: &dyn GenerationBackend) -> Result<(), NarrativeError> {
    backend.health_check().await.map_err(|error| {
        enhance_error(
            RetryFailure { error, attempts: 1 },
            backend.base_url(),
            backend.model(),
        )
    })
}
