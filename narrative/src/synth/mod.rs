//! Narrative synthesis
//!
//! [`StandupSynthesizer`] is implemented by the local
//! [`RuleBasedSynthesizer`] and by the remote-generation synthesizer in
//! [`crate::remote`].

pub mod extractors;
pub mod rule_based;

pub use extractors::{extract_key_point, extract_key_point_with, ExtractionContext, ExtractorStage, KeyPoint};
pub use rule_based::{RuleBasedSynthesizer, NO_ACTIVITY};

use crate::error::NarrativeResult;
use crate::tracker::{Comment, CommentsByIssue, Issue, WorklogEntry};
use async_trait::async_trait;

/// Turns tracker data into a bounded-length narrative.
#[async_trait]
pub trait StandupSynthesizer: Send + Sync {
    /// Short identifier for logs and reports.
    fn name(&self) -> &str;

    async fn summarize_issue(&self, issue: &Issue) -> NarrativeResult<String>;

    async fn summarize_comments(&self, comments: &[Comment]) -> NarrativeResult<String>;

    async fn generate_standup_summary(
        &self,
        issues: &[Issue],
        worklogs: &[WorklogEntry],
    ) -> NarrativeResult<String>;

    async fn generate_standup_summary_with_comments(
        &self,
        issues: &[Issue],
        comments: &CommentsByIssue,
        worklogs: &[WorklogEntry],
    ) -> NarrativeResult<String>;
}
