//! Fallback supervisor: degradation policy for failed steps
//!
//! ```text
//! strict    failure returned verbatim
//! minimal   fixed placeholder for the input type
//! graceful  basic rule-based  →  metadata tally  →  minimal placeholder
//!           (quality high)       (quality medium)   (quality low)
//! ```
//!
//! Every error handed to the supervisor is also classified into a severity
//! and recoverability with remediation suggestions (see [`analyze_error`]).

use crate::aggregate::ProcessedData;
use crate::config::{ConfigError, SynthesisConfig};
use crate::error::{ErrorSummary, NarrativeError, NarrativeResult};
use crate::observer::is_generic_narrative;
use crate::synth::RuleBasedSynthesizer;
use crate::text::truncate_to_length;
use crate::tracker::{Comment, CommentsByIssue, Issue, WorklogEntry};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::{error, info, warn};

/// How a failed step degrades.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FallbackStrategy {
    /// Propagate the failure
    Strict,
    /// Always answer with a placeholder
    Minimal,
    /// Walk the tier cascade
    #[default]
    Graceful,
}

impl std::fmt::Display for FallbackStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Strict => write!(f, "strict"),
            Self::Minimal => write!(f, "minimal"),
            Self::Graceful => write!(f, "graceful"),
        }
    }
}

impl FromStr for FallbackStrategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "minimal" => Ok(Self::Minimal),
            "graceful" => Ok(Self::Graceful),
            other => Err(ConfigError::InvalidValue {
                key: "fallback".into(),
                value: other.into(),
                reason: "expected strict, minimal or graceful".into(),
            }),
        }
    }
}

/// Which tier answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackTier {
    Basic,
    Metadata,
    Minimal,
}

impl FallbackTier {
    pub fn quality(&self) -> QualityGrade {
        match self {
            Self::Basic => QualityGrade::High,
            Self::Metadata => QualityGrade::Medium,
            Self::Minimal => QualityGrade::Low,
        }
    }
}

impl std::fmt::Display for FallbackTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Basic => write!(f, "basic"),
            Self::Metadata => write!(f, "metadata"),
            Self::Minimal => write!(f, "minimal"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityGrade {
    High,
    Medium,
    Low,
}

impl std::fmt::Display for QualityGrade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::High => write!(f, "high"),
            Self::Medium => write!(f, "medium"),
            Self::Low => write!(f, "low"),
        }
    }
}

// ============================================================================
// Error analysis
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// Classification of a failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorAnalysis {
    /// Matched rule keyword, or `"unknown"`
    pub error_type: String,
    pub severity: ErrorSeverity,
    pub recoverable: bool,
    pub suggestions: Vec<String>,
}

/// Substring rules, checked in order.
const SEVERITY_RULES: &[(&str, ErrorSeverity)] = &[
    ("panic", ErrorSeverity::Critical),
    ("fatal", ErrorSeverity::Critical),
    ("timeout", ErrorSeverity::High),
    ("connection", ErrorSeverity::High),
    ("authentication", ErrorSeverity::High),
    ("validation", ErrorSeverity::Medium),
    ("format", ErrorSeverity::Medium),
    ("parsing", ErrorSeverity::Medium),
];

fn suggestions_for(error_type: &str) -> Vec<String> {
    let hints: &[&str] = match error_type {
        "panic" | "fatal" => &["Re-run with --debug and report the failure with the log attached"],
        "timeout" => &[
            "Increase STANDUP_LLM_TIMEOUT_SECS",
            "Use a smaller model or check load on the generation service",
        ],
        "connection" => &[
            "Check that the generation service is running",
            "Verify STANDUP_LLM_URL points at it",
        ],
        "authentication" => &["Check the credentials for the tracker or generation endpoint"],
        "validation" => &["Check that every issue has a key and every comment an id"],
        "format" | "parsing" => &["Check that the input export is valid tracker JSON"],
        _ => &["Re-run with --debug for step-level details"],
    };
    hints.iter().map(|h| h.to_string()).collect()
}

/// Classify an error message by fixed substring rules.
pub fn analyze_message(message: &str) -> ErrorAnalysis {
    let lower = message.to_lowercase();
    let (error_type, severity) = SEVERITY_RULES
        .iter()
        .find(|(needle, _)| lower.contains(needle))
        .map_or(("unknown", ErrorSeverity::Low), |(needle, sev)| (*needle, *sev));
    ErrorAnalysis {
        error_type: error_type.to_string(),
        severity,
        recoverable: severity != ErrorSeverity::Critical,
        suggestions: suggestions_for(error_type),
    }
}

/// Classify a pipeline error using its message, kind and cause.
pub fn analyze_error(error: &NarrativeError) -> ErrorAnalysis {
    let mut text = error.to_string();
    if let Some(cause) = &error.cause {
        text.push_str(": ");
        text.push_str(&cause.to_string());
    }
    analyze_message(&text)
}

// ============================================================================
// Supervisor
// ============================================================================

/// What the failed step was working on.
#[derive(Debug, Clone, Copy)]
pub enum FallbackInput<'a> {
    Issue(&'a Issue),
    Comments(&'a [Comment]),
    Standup {
        issues: &'a [Issue],
        comments: &'a CommentsByIssue,
        worklogs: &'a [WorklogEntry],
    },
    Processed(&'a ProcessedData),
}

impl FallbackInput<'_> {
    fn placeholder(&self) -> &'static str {
        match self {
            Self::Issue(_) => "Issue activity detected",
            Self::Comments(_) => "Comment activity detected",
            Self::Standup { .. } => "Team activity detected",
            Self::Processed(_) => "Issue data available",
        }
    }

    fn is_empty(&self) -> bool {
        match self {
            Self::Issue(issue) => issue.summary().trim().is_empty() && issue.description().trim().is_empty(),
            Self::Comments(comments) => comments.iter().all(|c| c.text().trim().is_empty()),
            Self::Standup {
                issues, worklogs, ..
            } => issues.is_empty() && worklogs.is_empty(),
            Self::Processed(data) => data.issue_count() == 0,
        }
    }
}

/// Result of a supervised step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackOutcome {
    pub success: bool,
    pub result: String,
    pub strategy: FallbackStrategy,
    pub tier: FallbackTier,
    pub quality: QualityGrade,
    /// The failure that triggered the fallback
    pub error: ErrorSummary,
    pub analysis: ErrorAnalysis,
    /// Tiers that failed before `tier` answered
    pub warnings: Vec<String>,
}

impl FallbackOutcome {
    /// One-line annotation for reports.
    pub fn annotation(&self) -> String {
        format!(
            "{} fallback: {} tier answered (quality {})",
            self.strategy, self.tier, self.quality
        )
    }
}

/// Applies a [`FallbackStrategy`] to failed steps.
#[derive(Debug, Clone)]
pub struct FallbackSupervisor {
    strategy: FallbackStrategy,
    basic: RuleBasedSynthesizer,
    max_length: usize,
}

impl FallbackSupervisor {
    pub fn new(config: SynthesisConfig) -> Self {
        Self {
            strategy: config.fallback,
            max_length: config.max_length,
            basic: RuleBasedSynthesizer::new(config),
        }
    }

    pub fn strategy(&self) -> FallbackStrategy {
        self.strategy
    }

    /// Degrade a failed step. Only the strict strategy returns `Err`.
    pub fn handle(
        &self,
        error: NarrativeError,
        input: FallbackInput<'_>,
    ) -> NarrativeResult<FallbackOutcome> {
        let analysis = analyze_error(&error);
        match self.strategy {
            FallbackStrategy::Strict => {
                error!(
                    kind = %error.kind,
                    severity = %analysis.severity,
                    "Step failed under strict fallback: {}",
                    error.message
                );
                Err(error)
            }
            FallbackStrategy::Minimal => Ok(self.outcome(
                &error,
                analysis,
                FallbackTier::Minimal,
                input.placeholder().to_string(),
                Vec::new(),
            )),
            FallbackStrategy::Graceful => {
                let mut warnings = Vec::new();
                for tier in [FallbackTier::Basic, FallbackTier::Metadata] {
                    match self.try_tier(tier, &input) {
                        Ok(result) => {
                            return Ok(self.outcome(&error, analysis, tier, result, warnings));
                        }
                        Err(reason) => {
                            warn!(tier = %tier, "Fallback tier failed: {reason}");
                            warnings.push(format!("{tier} tier failed: {reason}"));
                        }
                    }
                }
                Ok(self.outcome(
                    &error,
                    analysis,
                    FallbackTier::Minimal,
                    input.placeholder().to_string(),
                    warnings,
                ))
            }
        }
    }

    fn outcome(
        &self,
        error: &NarrativeError,
        analysis: ErrorAnalysis,
        tier: FallbackTier,
        result: String,
        warnings: Vec<String>,
    ) -> FallbackOutcome {
        info!(
            strategy = %self.strategy,
            tier = %tier,
            severity = %analysis.severity,
            "Fallback produced a result"
        );
        FallbackOutcome {
            success: true,
            result: truncate_to_length(&result, self.max_length),
            strategy: self.strategy,
            tier,
            quality: tier.quality(),
            error: error.to_summary(),
            analysis,
            warnings,
        }
    }

    fn try_tier(&self, tier: FallbackTier, input: &FallbackInput<'_>) -> Result<String, String> {
        if input.is_empty() {
            return Err("nothing to summarize".into());
        }
        let result = match tier {
            FallbackTier::Basic => self.basic_tier(input),
            FallbackTier::Metadata => metadata_tally(input),
            FallbackTier::Minimal => input.placeholder().to_string(),
        };
        if result.trim().is_empty() {
            return Err("empty result".into());
        }
        if tier == FallbackTier::Basic && is_generic_narrative(&result) {
            return Err("only a generic placeholder".into());
        }
        Ok(result)
    }

    fn basic_tier(&self, input: &FallbackInput<'_>) -> String {
        match *input {
            FallbackInput::Issue(issue) => self.basic.summarize_issue(issue),
            FallbackInput::Comments(comments) => self.basic.summarize_comments(comments),
            FallbackInput::Standup {
                issues,
                comments,
                worklogs,
            } => self
                .basic
                .generate_standup_summary_with_comments(issues, comments, worklogs),
            FallbackInput::Processed(data) => self.basic.summarize_processed(data),
        }
    }
}

/// Status-name tally, e.g. `"3 issues: 2 Done, 1 In Progress"`.
fn metadata_tally(input: &FallbackInput<'_>) -> String {
    fn tally<'a>(names: impl Iterator<Item = &'a str>) -> String {
        let mut counts: Vec<(&str, usize)> = Vec::new();
        for name in names {
            let name = if name.trim().is_empty() { "Unknown" } else { name };
            match counts.iter_mut().find(|(n, _)| *n == name) {
                Some((_, count)) => *count += 1,
                None => counts.push((name, 1)),
            }
        }
        counts
            .iter()
            .map(|(name, count)| format!("{count} {name}"))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn plural(n: usize, word: &str) -> String {
        if n == 1 {
            format!("1 {word}")
        } else {
            format!("{n} {word}s")
        }
    }

    match *input {
        FallbackInput::Issue(issue) => {
            let key = if issue.key.is_empty() { "Issue" } else { issue.key.as_str() };
            let status = if issue.status_name().is_empty() {
                "Unknown"
            } else {
                issue.status_name()
            };
            format!("{key}: {status}")
        }
        FallbackInput::Comments(comments) => format!("{} recorded", plural(comments.len(), "comment")),
        FallbackInput::Standup {
            issues, worklogs, ..
        } => {
            let mut out = plural(issues.len(), "issue");
            if !issues.is_empty() {
                out.push_str(": ");
                out.push_str(&tally(issues.iter().map(|i| i.status_name())));
            }
            if !worklogs.is_empty() {
                out.push_str(&format!("; {}", plural(worklogs.len(), "worklog")));
            }
            out
        }
        FallbackInput::Processed(data) => {
            format!(
                "{}: {}",
                plural(data.issue_count(), "issue"),
                tally(data.issues().iter().map(|i| i.completion_status.label()))
            )
        }
    }
}
