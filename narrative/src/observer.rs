//! Pipeline observation and quality assessment
//!
//! The pipeline reports what it does through [`PipelineObserver`]. Three
//! observers ship with the crate:
//!
//! - [`NoopObserver`]: discards everything
//! - [`TracingObserver`]: forwards events to `tracing`
//! - [`QualityRecorder`]: keeps the events and scores the run

use crate::fallback::FallbackTier;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};

/// Narratives shorter than this are flagged as too short.
pub const MIN_NARRATIVE_CHARS: usize = 20;

/// Placeholders that carry no information.
const GENERIC_NARRATIVES: &[&str] = &[
    "no recent activity to report",
    "team activity detected",
    "issue activity detected",
    "comment activity detected",
    "issue data available",
    "work in progress",
];

/// Something the pipeline did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DebugEvent {
    StepStarted {
        step: String,
    },
    StepFinished {
        step: String,
        duration_ms: u64,
        ok: bool,
    },
    Warning {
        step: String,
        message: String,
    },
    /// The fallback supervisor answered for a failed step.
    FallbackUsed {
        tier: FallbackTier,
        reason: String,
    },
    /// Remote generation failed and the rule-based synthesizer answered.
    EmbeddedFallback {
        reason: String,
    },
    NarrativeProduced {
        length: usize,
    },
}

/// Receives pipeline events. Must not block.
pub trait PipelineObserver: Send + Sync {
    fn on_event(&self, event: DebugEvent);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl PipelineObserver for NoopObserver {
    fn on_event(&self, _event: DebugEvent) {}
}

/// Logs every event at a level matching its weight.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl PipelineObserver for TracingObserver {
    fn on_event(&self, event: DebugEvent) {
        match event {
            DebugEvent::StepStarted { step } => debug!(step = %step, "Step started"),
            DebugEvent::StepFinished {
                step,
                duration_ms,
                ok,
            } => info!(step = %step, duration_ms, ok, "Step finished"),
            DebugEvent::Warning { step, message } => warn!(step = %step, "{message}"),
            DebugEvent::FallbackUsed { tier, reason } => {
                warn!(tier = %tier, "Fallback used: {reason}")
            }
            DebugEvent::EmbeddedFallback { reason } => {
                warn!("Remote generation unavailable, used rule-based synthesis: {reason}")
            }
            DebugEvent::NarrativeProduced { length } => info!(length, "Narrative produced"),
        }
    }
}

// ============================================================================
// Quality
// ============================================================================

/// Timing and outcome of one pipeline step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub step: String,
    pub duration_ms: u64,
    pub ok: bool,
}

/// Scored summary of a pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub steps: Vec<StepRecord>,
    pub warnings: Vec<String>,
    /// 0-100
    pub score: u8,
    pub recommendations: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_tier: Option<FallbackTier>,
    pub embedded_fallbacks: usize,
    pub narrative_issues: Vec<String>,
}

impl QualityReport {
    pub fn is_clean(&self) -> bool {
        self.score == 100
    }
}

#[derive(Debug, Default)]
struct Recorded {
    steps: Vec<StepRecord>,
    warnings: Vec<String>,
    fallback_tier: Option<FallbackTier>,
    embedded_fallbacks: usize,
    narrative_length: Option<usize>,
}

/// Collects events for a [`QualityReport`].
#[derive(Debug, Default)]
pub struct QualityRecorder {
    inner: Mutex<Recorded>,
}

impl QualityRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Score the recorded run, optionally checking the final narrative.
    pub fn report(&self, narrative: Option<&str>) -> QualityReport {
        let recorded = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let narrative_issues = match narrative {
            Some(text) => assess_narrative(text),
            None if recorded.narrative_length == Some(0) => vec!["narrative is empty".to_string()],
            None => Vec::new(),
        };

        let mut penalty: u32 = 0;
        let mut recommendations = Vec::new();

        penalty += (recorded.warnings.len() as u32 * 10).min(40);
        if !recorded.warnings.is_empty() {
            recommendations.push("Review skipped input items in the warnings list".to_string());
        }

        let failed = recorded.steps.iter().filter(|s| !s.ok).count() as u32;
        penalty += failed * 25;

        if let Some(tier) = recorded.fallback_tier {
            penalty += match tier {
                FallbackTier::Basic => 15,
                FallbackTier::Metadata => 30,
                FallbackTier::Minimal => 50,
            };
            recommendations.push(format!(
                "Narrative came from the {tier} fallback tier; inspect the triggering error"
            ));
        }

        if recorded.embedded_fallbacks > 0 {
            penalty += 15;
            recommendations.push(
                "Remote generation was unavailable; check the endpoint with `standup health`"
                    .to_string(),
            );
        }

        penalty += narrative_issues.len() as u32 * 10;
        if !narrative_issues.is_empty() {
            recommendations.push("Add issue comments so the narrative has more to draw on".to_string());
        }

        QualityReport {
            steps: recorded.steps.clone(),
            warnings: recorded.warnings.clone(),
            score: 100u32.saturating_sub(penalty) as u8,
            recommendations,
            fallback_tier: recorded.fallback_tier,
            embedded_fallbacks: recorded.embedded_fallbacks,
            narrative_issues,
        }
    }
}

impl PipelineObserver for QualityRecorder {
    fn on_event(&self, event: DebugEvent) {
        let mut recorded = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        match event {
            DebugEvent::StepStarted { .. } => {}
            DebugEvent::StepFinished {
                step,
                duration_ms,
                ok,
            } => recorded.steps.push(StepRecord {
                step,
                duration_ms,
                ok,
            }),
            DebugEvent::Warning { message, .. } => recorded.warnings.push(message),
            DebugEvent::FallbackUsed { tier, .. } => {
                recorded.fallback_tier = Some(tier);
            }
            DebugEvent::EmbeddedFallback { .. } => recorded.embedded_fallbacks += 1,
            DebugEvent::NarrativeProduced { length } => recorded.narrative_length = Some(length),
        }
    }
}

/// Whether `text` is one of the known placeholder narratives.
pub fn is_generic_narrative(text: &str) -> bool {
    let lower = text.trim().trim_end_matches('.').to_lowercase();
    GENERIC_NARRATIVES.contains(&lower.as_str())
}

/// Problems with a finished narrative: empty, too short or generic.
pub fn assess_narrative(narrative: &str) -> Vec<String> {
    let trimmed = narrative.trim();
    if trimmed.is_empty() {
        return vec!["narrative is empty".to_string()];
    }
    let mut issues = Vec::new();
    if trimmed.chars().count() < MIN_NARRATIVE_CHARS {
        issues.push(format!("narrative is shorter than {MIN_NARRATIVE_CHARS} characters"));
    }
    if is_generic_narrative(trimmed) {
        issues.push("narrative is a generic placeholder".to_string());
    }
    issues
}

/// Fans one event out to several observers.
pub struct ObserverSet {
    observers: Vec<Arc<dyn PipelineObserver>>,
}

impl ObserverSet {
    pub fn new(observers: Vec<Arc<dyn PipelineObserver>>) -> Self {
        Self { observers }
    }
}

impl PipelineObserver for ObserverSet {
    fn on_event(&self, event: DebugEvent) {
        for observer in &self.observers {
            observer.on_event(event.clone());
        }
    }
}
