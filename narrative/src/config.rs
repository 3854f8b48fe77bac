//! Synthesis and remote-endpoint configuration
//!
//! Values come from, in increasing precedence: built-in defaults, a TOML
//! file, `STANDUP_*` environment variables and finally caller overrides
//! (CLI flags).
//!
//! ```toml
//! [synthesis]
//! style = "business"
//! max_length = 160
//! fallback = "graceful"
//!
//! [remote]
//! base_url = "http://localhost:11434"
//! model = "llama3.2"
//! timeout_secs = 30
//! ```

use crate::error::NarrativeError;
use crate::fallback::FallbackStrategy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub const ENV_STYLE: &str = "STANDUP_STYLE";
pub const ENV_MAX_LENGTH: &str = "STANDUP_MAX_LENGTH";
pub const ENV_FALLBACK: &str = "STANDUP_FALLBACK";
pub const ENV_LLM_URL: &str = "STANDUP_LLM_URL";
pub const ENV_LLM_MODEL: &str = "STANDUP_LLM_MODEL";
pub const ENV_LLM_TIMEOUT_SECS: &str = "STANDUP_LLM_TIMEOUT_SECS";
pub const ENV_LLM_MAX_RETRIES: &str = "STANDUP_LLM_MAX_RETRIES";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value {value:?} for {key}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl From<ConfigError> for NarrativeError {
    fn from(err: ConfigError) -> Self {
        let message = err.to_string();
        NarrativeError::configuration(message).with_cause(err)
    }
}

// ============================================================================
// Style
// ============================================================================

/// Narrative phrasing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryStyle {
    /// Names technologies and environments
    #[default]
    Technical,
    /// Outcome-oriented, no technology names
    Business,
    /// At most three points
    Brief,
}

impl std::fmt::Display for SummaryStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Technical => write!(f, "technical"),
            Self::Business => write!(f, "business"),
            Self::Brief => write!(f, "brief"),
        }
    }
}

impl FromStr for SummaryStyle {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "technical" => Ok(Self::Technical),
            "business" => Ok(Self::Business),
            "brief" => Ok(Self::Brief),
            other => Err(ConfigError::InvalidValue {
                key: "style".into(),
                value: other.into(),
                reason: "expected technical, business or brief".into(),
            }),
        }
    }
}

// ============================================================================
// Synthesis
// ============================================================================

/// Parameters shared by every synthesizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    pub style: SummaryStyle,
    /// Upper bound on narrative length, in characters
    pub max_length: usize,
    pub include_technical_details: bool,
    pub fallback: FallbackStrategy,
    /// Issues embedded in a remote prompt
    pub max_prompt_issues: usize,
    /// Comments embedded in a remote prompt
    pub max_prompt_comments: usize,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            style: SummaryStyle::Technical,
            max_length: 200,
            include_technical_details: true,
            fallback: FallbackStrategy::Graceful,
            max_prompt_issues: 10,
            max_prompt_comments: 15,
        }
    }
}

impl SynthesisConfig {
    pub fn with_style(mut self, style: SummaryStyle) -> Self {
        self.style = style;
        self
    }

    pub fn with_max_length(mut self, max_length: usize) -> Self {
        self.max_length = max_length;
        self
    }

    pub fn with_fallback(mut self, fallback: FallbackStrategy) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn with_technical_details(mut self, include: bool) -> Self {
        self.include_technical_details = include;
        self
    }

    /// Technology names appear only in technical style with details enabled.
    pub fn shows_technical_details(&self) -> bool {
        self.include_technical_details && self.style == SummaryStyle::Technical
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_length == 0 {
            return Err(ConfigError::Invalid("max_length must be greater than 0".into()));
        }
        Ok(())
    }
}

// ============================================================================
// Remote endpoint
// ============================================================================

/// Generation endpoint connection parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry; doubles per attempt
    pub base_backoff_ms: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".into(),
            model: "llama3.2".into(),
            timeout_secs: 30,
            max_retries: 3,
            base_backoff_ms: 1000,
        }
    }
}

impl RemoteConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn base_backoff(&self) -> Duration {
        Duration::from_millis(self.base_backoff_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid("remote base_url must not be empty".into()));
        }
        if self.model.trim().is_empty() {
            return Err(ConfigError::Invalid("remote model must not be empty".into()));
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::Invalid("remote timeout_secs must be greater than 0".into()));
        }
        Ok(())
    }
}

// ============================================================================
// File + environment
// ============================================================================

/// Top-level configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StandupConfig {
    pub synthesis: SynthesisConfig,
    pub remote: RemoteConfig,
}

impl StandupConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    /// Overlay `STANDUP_*` variables from the process environment.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Overlay `STANDUP_*` variables from `lookup`. Unset and empty values
    /// leave the current setting untouched.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get(ENV_STYLE) {
            self.synthesis.style = v.parse()?;
        }
        if let Some(v) = get(ENV_MAX_LENGTH) {
            self.synthesis.max_length = parse_number(ENV_MAX_LENGTH, &v)?;
        }
        if let Some(v) = get(ENV_FALLBACK) {
            self.synthesis.fallback = v.parse()?;
        }
        if let Some(v) = get(ENV_LLM_URL) {
            self.remote.base_url = v;
        }
        if let Some(v) = get(ENV_LLM_MODEL) {
            self.remote.model = v;
        }
        if let Some(v) = get(ENV_LLM_TIMEOUT_SECS) {
            self.remote.timeout_secs = parse_number(ENV_LLM_TIMEOUT_SECS, &v)?;
        }
        if let Some(v) = get(ENV_LLM_MAX_RETRIES) {
            self.remote.max_retries = parse_number(ENV_LLM_MAX_RETRIES, &v)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.synthesis.validate()?;
        self.remote.validate()
    }
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.into(),
        value: value.into(),
        reason: "expected a non-negative integer".into(),
    })
}
