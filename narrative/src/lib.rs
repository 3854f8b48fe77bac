//! Standup narratives from issue-tracker data
//!
//! Issues, comments and worklogs are classified by keyword patterns,
//! aggregated into a structured work model and turned into a short
//! narrative, either by deterministic rules or by a remote generation
//! endpoint with bounded retry and a supervised fallback chain.
//!
//! ```text
//! TrackerSnapshot ──► DataAggregator ──► ProcessedData
//!        │                                    │
//!        └──────► StandupSynthesizer ◄────────┘
//!                  ├─ RuleBasedSynthesizer
//!                  └─ RemoteSynthesizer ──► GenerationBackend
//!                         │ failure
//!                         ▼
//!                  FallbackSupervisor (strict | minimal | graceful)
//! ```

pub mod aggregate;
pub mod config;
pub mod error;
pub mod fallback;
pub mod observer;
pub mod patterns;
pub mod pipeline;
pub mod remote;
pub mod synth;
pub mod text;
pub mod tracker;

pub use aggregate::{DataAggregator, EnhancedIssue, ProcessedData};
pub use config::{ConfigError, RemoteConfig, StandupConfig, SummaryStyle, SynthesisConfig};
pub use error::{ErrorKind, NarrativeError, NarrativeResult};
pub use fallback::{FallbackOutcome, FallbackStrategy, FallbackSupervisor};
pub use observer::{PipelineObserver, QualityRecorder, QualityReport, TracingObserver};
pub use patterns::PatternMatcher;
pub use pipeline::{StandupPipeline, StandupReport, SynthesisMode};
pub use remote::{GenerationBackend, OllamaClient, RemoteSynthesizer};
pub use synth::{RuleBasedSynthesizer, StandupSynthesizer};
pub use tracker::{Comment, CommentsByIssue, Issue, IssueSource, TrackerSnapshot, WorklogEntry};
