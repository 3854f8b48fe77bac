//! Synthesizer backed by a remote generation endpoint

use super::client::{GenerationBackend, GenerationError};
use super::prompts::PromptBuilder;
use super::retry::{enhance_error, generate_with_retry, should_fallback_to_embedded, RetryPolicy};
use crate::config::{RemoteConfig, SynthesisConfig};
use crate::error::NarrativeResult;
use crate::fallback::FallbackStrategy;
use crate::observer::{DebugEvent, NoopObserver, PipelineObserver};
use crate::synth::{RuleBasedSynthesizer, StandupSynthesizer};
use crate::text::truncate_to_length;
use crate::tracker::{Comment, CommentsByIssue, Issue, WorklogEntry};
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Remote generation with retry. Transient endpoint failures (timeouts,
/// connection errors, 5xx) hand over to the embedded rule-based
/// synthesizer unless the fallback strategy is strict.
pub struct RemoteSynthesizer {
    backend: Arc<dyn GenerationBackend>,
    prompts: PromptBuilder,
    embedded: RuleBasedSynthesizer,
    policy: RetryPolicy,
    config: SynthesisConfig,
    cancel: CancellationToken,
    observer: Arc<dyn PipelineObserver>,
}

impl RemoteSynthesizer {
    pub fn new(
        backend: Arc<dyn GenerationBackend>,
        config: SynthesisConfig,
        remote: &RemoteConfig,
    ) -> Self {
        Self {
            backend,
            prompts: PromptBuilder::new(config.clone()),
            embedded: RuleBasedSynthesizer::new(config.clone()),
            policy: RetryPolicy::from_config(remote),
            config,
            cancel: CancellationToken::new(),
            observer: Arc::new(NoopObserver),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn PipelineObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn backend(&self) -> &dyn GenerationBackend {
        self.backend.as_ref()
    }

    /// Run one prompt. `embedded` produces the rule-based answer used when
    /// the endpoint is unavailable or returns nothing.
    async fn complete(
        &self,
        prompt: String,
        embedded: impl FnOnce() -> String,
    ) -> NarrativeResult<String> {
        match generate_with_retry(self.backend.as_ref(), &prompt, &self.policy, &self.cancel).await {
            Ok(text) => {
                let text = text.trim();
                if text.is_empty() {
                    warn!(model = %self.backend.model(), "Generation returned empty text");
                    self.observer.on_event(DebugEvent::EmbeddedFallback {
                        reason: "empty generation".into(),
                    });
                    return Ok(embedded());
                }
                Ok(truncate_to_length(text, self.config.max_length))
            }
            Err(failure) => {
                let fallback_allowed = should_fallback_to_embedded(&failure.error)
                    && self.config.fallback != FallbackStrategy::Strict;
                if fallback_allowed && !matches!(failure.error, GenerationError::Cancelled) {
                    info!(
                        attempts = failure.attempts,
                        kind = %failure.error.kind(),
                        "Falling back to rule-based synthesis"
                    );
                    self.observer.on_event(DebugEvent::EmbeddedFallback {
                        reason: failure.error.to_string(),
                    });
                    return Ok(embedded());
                }
                Err(enhance_error(
                    failure,
                    self.backend.base_url(),
                    self.backend.model(),
                ))
            }
        }
    }
}

#[async_trait]
impl StandupSynthesizer for RemoteSynthesizer {
    fn name(&self) -> &str {
        "remote"
    }

    async fn summarize_issue(&self, issue: &Issue) -> NarrativeResult<String> {
        let prompt = self.prompts.issue_prompt(issue);
        self.complete(prompt, || self.embedded.summarize_issue(issue))
            .await
    }

    async fn summarize_comments(&self, comments: &[Comment]) -> NarrativeResult<String> {
        let prompt = self.prompts.comments_prompt(comments);
        self.complete(prompt, || self.embedded.summarize_comments(comments))
            .await
    }

    async fn generate_standup_summary(
        &self,
        issues: &[Issue],
        worklogs: &[WorklogEntry],
    ) -> NarrativeResult<String> {
        let prompt = self
            .prompts
            .standup_prompt(issues, &CommentsByIssue::new(), worklogs)?;
        self.complete(prompt, || {
            self.embedded.generate_standup_summary(issues, worklogs)
        })
        .await
    }

    async fn generate_standup_summary_with_comments(
        &self,
        issues: &[Issue],
        comments: &CommentsByIssue,
        worklogs: &[WorklogEntry],
    ) -> NarrativeResult<String> {
        let prompt = self.prompts.standup_prompt(issues, comments, worklogs)?;
        self.complete(prompt, || {
            self.embedded
                .generate_standup_summary_with_comments(issues, comments, worklogs)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::QualityRecorder;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Replays scripted results and counts calls.
    struct Scripted {
        results: Mutex<Vec<Result<String, GenerationError>>>,
        calls: Mutex<u32>,
    }

    impl Scripted {
        fn new(mut results: Vec<Result<String, GenerationError>>) -> Arc<Self> {
            results.reverse();
            Arc::new(Self {
                results: Mutex::new(results),
                calls: Mutex::new(0),
            })
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl GenerationBackend for Scripted {
        async fn generate(&self, _prompt: &str) -> Result<String, GenerationError> {
            *self.calls.lock().unwrap() += 1;
            self.results.lock().unwrap().pop().unwrap_or_else(|| {
                Err(GenerationError::Connection {
                    url: "http://test".into(),
                    message: "refused".into(),
                })
            })
        }

        async fn health_check(&self) -> Result<(), GenerationError> {
            Ok(())
        }

        fn base_url(&self) -> &str {
            "http://test"
        }

        fn model(&self) -> &str {
            "test-model"
        }
    }

    fn synth(backend: Arc<Scripted>, config: SynthesisConfig) -> RemoteSynthesizer {
        RemoteSynthesizer::new(backend, config, &RemoteConfig::default())
            .with_policy(RetryPolicy::new(2, Duration::from_millis(10)))
    }

    fn issue() -> Issue {
        Issue::new("DEV-1", "Deploy AWS Lambda using Terraform").with_status("Done")
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_is_trimmed_and_bounded() {
        let long = format!("  {}  ", "x".repeat(500));
        let backend = Scripted::new(vec![Ok(long)]);
        let result = synth(backend.clone(), SynthesisConfig::default())
            .summarize_issue(&issue())
            .await
            .unwrap();
        assert!(result.chars().count() <= 200);
        assert!(!result.starts_with(' '));
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_generation_uses_rule_based() {
        let backend = Scripted::new(vec![Ok("   ".into())]);
        let remote = synth(backend, SynthesisConfig::default());
        let expected = RuleBasedSynthesizer::default().summarize_issue(&issue());
        assert_eq!(remote.summarize_issue(&issue()).await.unwrap(), expected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failure_retries_then_succeeds() {
        let backend = Scripted::new(vec![
            Err(GenerationError::Timeout(Duration::from_secs(30))),
            Err(GenerationError::Api {
                status_code: 503,
                body: String::new(),
            }),
            Ok("Shipped the Lambda".into()),
        ]);
        let result = synth(backend.clone(), SynthesisConfig::default())
            .summarize_issue(&issue())
            .await
            .unwrap();
        assert_eq!(result, "Shipped the Lambda");
        assert_eq!(backend.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_graceful_connection_failure_falls_back() {
        let backend = Scripted::new(Vec::new());
        let recorder = Arc::new(QualityRecorder::new());
        let remote = synth(backend.clone(), SynthesisConfig::default()).with_observer(recorder.clone());
        let result = remote.summarize_issue(&issue()).await.unwrap();
        assert_eq!(result, RuleBasedSynthesizer::default().summarize_issue(&issue()));
        assert_eq!(backend.calls(), 3);
        assert_eq!(recorder.report(None).embedded_fallbacks, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_strict_connection_failure_is_enhanced() {
        let backend = Scripted::new(Vec::new());
        let config = SynthesisConfig::default().with_fallback(FallbackStrategy::Strict);
        let err = synth(backend.clone(), config)
            .summarize_issue(&issue())
            .await
            .unwrap_err();
        assert_eq!(backend.calls(), 3);
        assert!(err.message.contains("connection"));
        assert!(err.message.contains("http://test"));
        assert_eq!(err.detail("attempts"), Some("3"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_found_is_not_retried_or_replaced() {
        let backend = Scripted::new(vec![Err(GenerationError::Api {
            status_code: 404,
            body: "model not found".into(),
        })]);
        let err = synth(backend.clone(), SynthesisConfig::default())
            .summarize_issue(&issue())
            .await
            .unwrap_err();
        assert_eq!(backend.calls(), 1);
        assert!(err.message.contains("test-model"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_before_start() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let backend = Scripted::new(vec![Ok("never".into())]);
        let err = synth(backend.clone(), SynthesisConfig::default())
            .with_cancellation(cancel)
            .summarize_issue(&issue())
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(backend.calls(), 0);
    }
}
