//! Shared plumbing for the `standup` binary: configuration layering,
//! snapshot loading and report rendering.
//!
//! Configuration precedence, lowest first:
//!
//! ```text
//! defaults → --config TOML file → STANDUP_* environment → command-line flags
//! ```

use anyhow::{Context, Result};
use narrative::fallback::FallbackStrategy;
use narrative::{Issue, StandupConfig, StandupReport, SummaryStyle, TrackerSnapshot};
use serde::Deserialize;
use std::fmt::Write as _;
use std::path::Path;

/// Values given on the command line. `None` leaves the layered value alone.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub style: Option<SummaryStyle>,
    pub max_length: Option<usize>,
    pub fallback: Option<FallbackStrategy>,
    pub llm_url: Option<String>,
    pub model: Option<String>,
    pub timeout_secs: Option<u64>,
    pub max_retries: Option<u32>,
}

impl Overrides {
    pub fn apply(&self, config: &mut StandupConfig) {
        if let Some(style) = self.style {
            config.synthesis.style = style;
        }
        if let Some(max_length) = self.max_length {
            config.synthesis.max_length = max_length;
        }
        if let Some(fallback) = self.fallback {
            config.synthesis.fallback = fallback;
        }
        if let Some(url) = &self.llm_url {
            config.remote.base_url = url.clone();
        }
        if let Some(model) = &self.model {
            config.remote.model = model.clone();
        }
        if let Some(timeout) = self.timeout_secs {
            config.remote.timeout_secs = timeout;
        }
        if let Some(retries) = self.max_retries {
            config.remote.max_retries = retries;
        }
    }
}

/// Layer file, process environment and flags into a validated config.
pub fn resolve_config(path: Option<&Path>, overrides: &Overrides) -> Result<StandupConfig> {
    resolve_config_with(path, |key| std::env::var(key).ok(), overrides)
}

/// [`resolve_config`] with an explicit environment lookup.
pub fn resolve_config_with<F>(
    path: Option<&Path>,
    env: F,
    overrides: &Overrides,
) -> Result<StandupConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = match path {
        Some(path) => StandupConfig::load(path)?,
        None => StandupConfig::default(),
    };
    config
        .apply_env_from(env)
        .context("invalid STANDUP_* environment variable")?;
    overrides.apply(&mut config);
    config.validate()?;
    Ok(config)
}

/// Accepted input shapes: a full snapshot object or a bare issue array.
#[derive(Deserialize)]
#[serde(untagged)]
enum SnapshotFile {
    Issues(Vec<Issue>),
    Snapshot(TrackerSnapshot),
}

/// Read a tracker export from disk.
pub fn load_snapshot(path: &Path) -> Result<TrackerSnapshot> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read tracker export {}", path.display()))?;
    parse_snapshot(&raw).with_context(|| format!("failed to parse tracker export {}", path.display()))
}

pub fn parse_snapshot(raw: &str) -> Result<TrackerSnapshot> {
    let file: SnapshotFile = serde_json::from_str(raw)?;
    Ok(match file {
        SnapshotFile::Issues(issues) => TrackerSnapshot::new(issues),
        SnapshotFile::Snapshot(snapshot) => snapshot,
    })
}

/// Report as pretty JSON or as the narrative with a short footer.
pub fn render_report(report: &StandupReport, json: bool) -> Result<String> {
    if json {
        return Ok(serde_json::to_string_pretty(report)?);
    }

    let mut out = String::new();
    writeln!(out, "{}", report.narrative)?;
    writeln!(out)?;
    writeln!(
        out,
        "mode: {}  style: {}  issues: {}  quality: {}/100",
        report.mode,
        report.style,
        report.processed.issue_count(),
        report.quality.score
    )?;
    if let Some(outcome) = &report.fallback {
        writeln!(out, "{}", outcome.annotation())?;
    }
    for warning in &report.quality.warnings {
        writeln!(out, "warning: {warning}")?;
    }
    for recommendation in &report.quality.recommendations {
        writeln!(out, "- {recommendation}")?;
    }
    Ok(out)
}
