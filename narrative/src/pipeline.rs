//! End-to-end standup run
//!
//! ```text
//! StandupPipeline::run(snapshot)
//!   → aggregate     DataAggregator::process_concurrently, skips become warnings
//!   → synthesize    rule-based or remote synthesizer
//!       on error    FallbackSupervisor::handle (strict → Err)
//!   → assess        QualityRecorder::report
//! ```
//!
//! Cancellation is checked before the run and raced against synthesis; a
//! cancelled run is never handed to the fallback supervisor.

use crate::aggregate::{DataAggregator, ProcessedData};
use crate::config::{RemoteConfig, SummaryStyle, SynthesisConfig};
use crate::error::{NarrativeError, NarrativeResult};
use crate::fallback::{FallbackInput, FallbackOutcome, FallbackSupervisor};
use crate::observer::{
    DebugEvent, NoopObserver, ObserverSet, PipelineObserver, QualityRecorder, QualityReport,
};
use crate::remote::{GenerationBackend, RemoteSynthesizer};
use crate::synth::{RuleBasedSynthesizer, StandupSynthesizer};
use crate::tracker::TrackerSnapshot;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

/// Default number of concurrent per-issue analyses.
pub const DEFAULT_WORKERS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SynthesisMode {
    RuleBased,
    Remote,
}

impl std::fmt::Display for SynthesisMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RuleBased => write!(f, "rule_based"),
            Self::Remote => write!(f, "remote"),
        }
    }
}

/// Everything a run produced.
#[derive(Debug, Clone, Serialize)]
pub struct StandupReport {
    pub run_id: String,
    pub generated_at: DateTime<Utc>,
    pub mode: SynthesisMode,
    pub style: SummaryStyle,
    pub narrative: String,
    pub processed: ProcessedData,
    /// Present when the synthesizer failed and the supervisor answered
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback: Option<FallbackOutcome>,
    pub quality: QualityReport,
}

enum Engine {
    RuleBased(RuleBasedSynthesizer),
    Remote {
        backend: Arc<dyn GenerationBackend>,
        remote: RemoteConfig,
    },
}

/// Aggregate → synthesize → assess.
pub struct StandupPipeline {
    aggregator: DataAggregator,
    engine: Engine,
    supervisor: FallbackSupervisor,
    observer: Arc<dyn PipelineObserver>,
    config: SynthesisConfig,
    workers: usize,
    cancel: CancellationToken,
}

impl StandupPipeline {
    /// Network-free pipeline.
    pub fn rule_based(config: SynthesisConfig) -> Self {
        Self::with_engine(
            Engine::RuleBased(RuleBasedSynthesizer::new(config.clone())),
            config,
        )
    }

    /// Pipeline generating through `backend`.
    pub fn remote(
        config: SynthesisConfig,
        backend: Arc<dyn GenerationBackend>,
        remote: RemoteConfig,
    ) -> Self {
        Self::with_engine(Engine::Remote { backend, remote }, config)
    }

    fn with_engine(engine: Engine, config: SynthesisConfig) -> Self {
        Self {
            aggregator: DataAggregator::default(),
            engine,
            supervisor: FallbackSupervisor::new(config.clone()),
            observer: Arc::new(NoopObserver),
            config,
            workers: DEFAULT_WORKERS,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn PipelineObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn mode(&self) -> SynthesisMode {
        match self.engine {
            Engine::RuleBased(_) => SynthesisMode::RuleBased,
            Engine::Remote { .. } => SynthesisMode::Remote,
        }
    }

    pub fn config(&self) -> &SynthesisConfig {
        &self.config
    }

    fn synthesizer(&self, observer: Arc<dyn PipelineObserver>) -> Box<dyn StandupSynthesizer> {
        match &self.engine {
            Engine::RuleBased(synth) => Box::new(synth.clone()),
            Engine::Remote { backend, remote } => Box::new(
                RemoteSynthesizer::new(backend.clone(), self.config.clone(), remote)
                    .with_cancellation(self.cancel.clone())
                    .with_observer(observer),
            ),
        }
    }

    /// Produce a standup report from a tracker snapshot.
    pub async fn run(&self, snapshot: &TrackerSnapshot) -> NarrativeResult<StandupReport> {
        let run_id = Uuid::new_v4().to_string();
        let mode = self.mode();
        if self.cancel.is_cancelled() {
            return Err(NarrativeError::cancelled("standup run cancelled before start")
                .with_detail("run_id", &run_id));
        }

        let recorder = Arc::new(QualityRecorder::new());
        let observers: Vec<Arc<dyn PipelineObserver>> = vec![recorder.clone(), self.observer.clone()];
        let observer: Arc<dyn PipelineObserver> = Arc::new(ObserverSet::new(observers));

        info!(
            run_id = %run_id,
            mode = %mode,
            style = %self.config.style,
            issues = snapshot.issues.len(),
            "Starting standup run"
        );

        // Aggregate
        observer.on_event(DebugEvent::StepStarted {
            step: "aggregate".into(),
        });
        let started = Instant::now();
        let aggregated = self
            .aggregator
            .process_concurrently(snapshot.issues.clone(), snapshot.comments.clone(), self.workers)
            .await;
        observer.on_event(DebugEvent::StepFinished {
            step: "aggregate".into(),
            duration_ms: elapsed_ms(started),
            ok: aggregated.is_ok(),
        });
        let processed = aggregated?;
        for warning in &processed.warnings {
            observer.on_event(DebugEvent::Warning {
                step: "aggregate".into(),
                message: warning.clone(),
            });
        }

        // Synthesize
        observer.on_event(DebugEvent::StepStarted {
            step: "synthesize".into(),
        });
        let started = Instant::now();
        let synthesizer = self.synthesizer(observer.clone());
        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(NarrativeError::cancelled("standup run cancelled during synthesis")),
            r = synthesizer.generate_standup_summary_with_comments(
                &snapshot.issues,
                &snapshot.comments,
                &snapshot.worklogs,
            ) => r,
        };

        let (narrative, fallback) = match result {
            Ok(narrative) => (narrative, None),
            Err(error) if error.is_cancelled() => {
                observer.on_event(DebugEvent::StepFinished {
                    step: "synthesize".into(),
                    duration_ms: elapsed_ms(started),
                    ok: false,
                });
                return Err(error.with_detail("run_id", &run_id));
            }
            Err(error) => {
                warn!(
                    run_id = %run_id,
                    synthesizer = synthesizer.name(),
                    "Synthesis failed: {error}"
                );
                let reason = error.to_string();
                let handled = self.supervisor.handle(
                    error,
                    FallbackInput::Standup {
                        issues: &snapshot.issues,
                        comments: &snapshot.comments,
                        worklogs: &snapshot.worklogs,
                    },
                );
                observer.on_event(DebugEvent::StepFinished {
                    step: "synthesize".into(),
                    duration_ms: elapsed_ms(started),
                    ok: false,
                });
                let outcome = handled?;
                observer.on_event(DebugEvent::FallbackUsed {
                    tier: outcome.tier,
                    reason,
                });
                (outcome.result.clone(), Some(outcome))
            }
        };
        if fallback.is_none() {
            observer.on_event(DebugEvent::StepFinished {
                step: "synthesize".into(),
                duration_ms: elapsed_ms(started),
                ok: true,
            });
        }
        observer.on_event(DebugEvent::NarrativeProduced {
            length: narrative.chars().count(),
        });

        // Assess
        let quality = recorder.report(Some(&narrative));
        for issue in &quality.narrative_issues {
            warn!(run_id = %run_id, "Narrative quality: {issue}");
        }
        info!(
            run_id = %run_id,
            score = quality.score,
            length = narrative.chars().count(),
            fallback = fallback.is_some(),
            "Standup run finished"
        );

        Ok(StandupReport {
            run_id,
            generated_at: Utc::now(),
            mode,
            style: self.config.style,
            narrative,
            processed,
            fallback,
            quality,
        })
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fallback::{FallbackStrategy, FallbackTier};
    use crate::remote::GenerationError;
    use crate::tracker::{Comment, Issue};
    use async_trait::async_trait;

    struct NotFound;

    #[async_trait]
    impl GenerationBackend for NotFound {
        async fn generate(&self, _prompt: &str) -> Result<String, GenerationError> {
            Err(GenerationError::Api {
                status_code: 404,
                body: "model not found".into(),
            })
        }

        async fn health_check(&self) -> Result<(), GenerationError> {
            Ok(())
        }

        fn base_url(&self) -> &str {
            "http://test"
        }

        fn model(&self) -> &str {
            "missing"
        }
    }

    fn snapshot() -> TrackerSnapshot {
        TrackerSnapshot::new(vec![
            Issue::new("DEV-1", "Deploy AWS Lambda using Terraform")
                .with_status("Done")
                .with_priority("Critical"),
            Issue::new("DEV-2", "Database migration for auth service")
                .with_status("In Progress")
                .with_priority("Medium"),
        ])
        .with_comments(
            "DEV-1",
            vec![Comment::new("c1", "Completed Terraform apply for production")],
        )
    }

    #[tokio::test]
    async fn test_rule_based_run() {
        let report = StandupPipeline::rule_based(SynthesisConfig::default())
            .run(&snapshot())
            .await
            .unwrap();
        assert_eq!(report.mode, SynthesisMode::RuleBased);
        assert_eq!(report.processed.issue_count(), 2);
        assert!(report.fallback.is_none());
        assert!(report.narrative.contains("Terraform"));
        assert_eq!(report.quality.steps.len(), 2);
        assert!(report.quality.steps.iter().all(|s| s.ok));
        assert!(!report.run_id.is_empty());
    }

    #[tokio::test]
    async fn test_skipped_issue_becomes_warning() {
        let mut snap = snapshot();
        snap.issues.push(Issue::new("", "Orphan"));
        let report = StandupPipeline::rule_based(SynthesisConfig::default())
            .run(&snap)
            .await
            .unwrap();
        assert_eq!(report.processed.issue_count(), 2);
        assert_eq!(report.quality.warnings.len(), 1);
        assert!(report.quality.score < 100);
    }

    #[tokio::test]
    async fn test_graceful_remote_failure_uses_supervisor() {
        let pipeline = StandupPipeline::remote(
            SynthesisConfig::default(),
            Arc::new(NotFound),
            RemoteConfig::default(),
        );
        let report = pipeline.run(&snapshot()).await.unwrap();
        let outcome = report.fallback.expect("fallback outcome");
        assert!(outcome.success);
        assert_eq!(outcome.tier, FallbackTier::Basic);
        assert_eq!(report.narrative, outcome.result);
        assert_eq!(report.quality.fallback_tier, Some(FallbackTier::Basic));
    }

    #[tokio::test]
    async fn test_strict_remote_failure_propagates() {
        let pipeline = StandupPipeline::remote(
            SynthesisConfig::default().with_fallback(FallbackStrategy::Strict),
            Arc::new(NotFound),
            RemoteConfig::default(),
        );
        let err = pipeline.run(&snapshot()).await.unwrap_err();
        assert!(err.message.contains("missing"));
        assert_eq!(err.detail("status_code"), Some("404"));
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = StandupPipeline::rule_based(SynthesisConfig::default())
            .with_cancellation(cancel)
            .run(&snapshot())
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }
}
