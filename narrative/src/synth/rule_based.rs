//! Deterministic, network-free narrative synthesis

use super::extractors::{extract_key_point_with, ExtractionContext, ExtractorStage, KeyPoint};
use super::StandupSynthesizer;
use crate::aggregate::vocabulary::{first_substring_match, first_word_prefix_match};
use crate::aggregate::{CompletionStatus, ProcessedData, Vocabulary};
use crate::config::{SummaryStyle, SynthesisConfig};
use crate::error::NarrativeResult;
use crate::patterns::PatternLibrary;
use crate::text::{capitalize_first, truncate_to_length};
use crate::tracker::{Comment, CommentsByIssue, Issue, WorklogEntry};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// Returned when there is nothing to summarize.
pub const NO_ACTIVITY: &str = "No recent activity to report";

/// Brief style keeps at most this many points.
const BRIEF_POINT_LIMIT: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Bucket {
    Completed,
    InProgress,
    General,
}

impl From<CompletionStatus> for Bucket {
    fn from(status: CompletionStatus) -> Self {
        match status {
            CompletionStatus::Completed => Bucket::Completed,
            CompletionStatus::InProgress
            | CompletionStatus::Blocked
            | CompletionStatus::UnderReview => Bucket::InProgress,
            CompletionStatus::Planned => Bucket::General,
        }
    }
}

#[derive(Debug, Clone)]
struct StandupItem {
    phrase: String,
    issue_key: Option<String>,
    bucket: Bucket,
}

impl StandupItem {
    /// Leading verb plus the first technology named, so near-identical
    /// phrases about the same thing collapse.
    fn canonical(&self, vocabulary: &Vocabulary) -> String {
        let lower = self.phrase.to_lowercase();
        let verb = lower.split_whitespace().next().unwrap_or_default();
        match Vocabulary::terms_in(&lower, vocabulary.technical_terms).first() {
            Some(term) => format!("{verb}:{term}"),
            None => lower
                .chars()
                .filter(|c| c.is_alphanumeric() || c.is_whitespace())
                .collect::<String>()
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" "),
        }
    }
}

/// Rule-based synthesizer driven by the key-point extraction cascade.
#[derive(Debug, Clone)]
pub struct RuleBasedSynthesizer {
    config: SynthesisConfig,
    vocabulary: &'static Vocabulary,
    patterns: Arc<PatternLibrary>,
}

impl Default for RuleBasedSynthesizer {
    fn default() -> Self {
        Self::new(SynthesisConfig::default())
    }
}

impl RuleBasedSynthesizer {
    pub fn new(config: SynthesisConfig) -> Self {
        Self {
            config,
            vocabulary: Vocabulary::builtin(),
            patterns: PatternLibrary::shared(),
        }
    }

    pub fn with_vocabulary(mut self, vocabulary: &'static Vocabulary) -> Self {
        self.vocabulary = vocabulary;
        self
    }

    pub fn with_patterns(mut self, patterns: Arc<PatternLibrary>) -> Self {
        self.patterns = patterns;
        self
    }

    pub fn config(&self) -> &SynthesisConfig {
        &self.config
    }

    fn key_point(&self, text: &str) -> Option<KeyPoint> {
        let cx = ExtractionContext {
            vocabulary: self.vocabulary,
            patterns: &self.patterns,
            technical: self.config.shows_technical_details(),
        };
        extract_key_point_with(&cx, text)
    }

    /// One-line summary of a single issue.
    pub fn summarize_issue(&self, issue: &Issue) -> String {
        let status = self.issue_status(issue);
        let Some(phrase) = self.issue_phrase(issue) else {
            if issue.key.is_empty() {
                return NO_ACTIVITY.to_string();
            }
            return self.bound(&format!("{}: {}", issue.key, status.label()));
        };
        let text = if self.config.style == SummaryStyle::Brief || issue.key.is_empty() {
            phrase
        } else {
            format!("{phrase} ({}, {})", issue.key, status.label().to_lowercase())
        };
        self.bound(&text)
    }

    /// Combined summary of a comment thread.
    pub fn summarize_comments(&self, comments: &[Comment]) -> String {
        let items = comments
            .iter()
            .filter_map(|c| self.comment_item(c.text(), None, Bucket::General))
            .collect();
        self.render(items)
    }

    /// Standup narrative from issues and worklogs.
    pub fn generate_standup_summary(&self, issues: &[Issue], worklogs: &[WorklogEntry]) -> String {
        let mut items: Vec<StandupItem> =
            issues.iter().filter_map(|i| self.issue_item(i)).collect();
        items.extend(worklogs.iter().filter_map(|w| self.worklog_item(w)));
        self.render(items)
    }

    /// Standup narrative from issues, their comments and worklogs. Issues
    /// with comments are described by their comments.
    pub fn generate_standup_summary_with_comments(
        &self,
        issues: &[Issue],
        comments: &CommentsByIssue,
        worklogs: &[WorklogEntry],
    ) -> String {
        let mut items = Vec::new();
        for issue in issues {
            match comments.get(&issue.key).filter(|c| !c.is_empty()) {
                Some(thread) => {
                    let fallback = Bucket::from(self.issue_status(issue));
                    items.extend(
                        thread
                            .iter()
                            .filter_map(|c| self.comment_item(c.text(), Some(&issue.key), fallback)),
                    );
                }
                None => items.extend(self.issue_item(issue)),
            }
        }
        items.extend(worklogs.iter().filter_map(|w| self.worklog_item(w)));
        self.render(items)
    }

    /// Narrative from an already aggregated model.
    pub fn summarize_processed(&self, data: &ProcessedData) -> String {
        let mut items = Vec::new();
        for enhanced in data.issues() {
            if enhanced.processed_comments.is_empty() {
                if let Some(phrase) = self.issue_phrase(&enhanced.issue) {
                    items.push(StandupItem {
                        phrase,
                        issue_key: Some(enhanced.issue.key.clone()),
                        bucket: enhanced.completion_status.into(),
                    });
                }
                continue;
            }
            for processed in &enhanced.processed_comments {
                if let Some(point) = self.key_point(processed.comment.text()) {
                    items.push(StandupItem {
                        phrase: point.text,
                        issue_key: Some(enhanced.issue.key.clone()),
                        bucket: processed.completion_status.into(),
                    });
                }
            }
        }
        self.render(items)
    }

    // ========================================================================
    // Item construction
    // ========================================================================

    fn issue_status(&self, issue: &Issue) -> CompletionStatus {
        first_substring_match(&issue.status_name().to_lowercase(), self.vocabulary.issue_statuses)
            .unwrap_or(CompletionStatus::Planned)
    }

    /// Key point from the summary, or the description when the summary only
    /// yields a raw truncation.
    fn issue_phrase(&self, issue: &Issue) -> Option<String> {
        let from_summary = self.key_point(issue.summary());
        match from_summary {
            Some(point) if point.stage != ExtractorStage::RawTruncation => Some(point.text),
            other => self.key_point(issue.description())
                .filter(|p| p.stage != ExtractorStage::RawTruncation)
                .or(other)
                .map(|p| p.text),
        }
    }

    fn issue_item(&self, issue: &Issue) -> Option<StandupItem> {
        Some(StandupItem {
            phrase: self.issue_phrase(issue)?,
            issue_key: (!issue.key.is_empty()).then(|| issue.key.clone()),
            bucket: self.issue_status(issue).into(),
        })
    }

    fn comment_item(&self, text: &str, issue_key: Option<&str>, fallback: Bucket) -> Option<StandupItem> {
        let point = self.key_point(text)?;
        let bucket = first_word_prefix_match(&text.to_lowercase(), self.vocabulary.comment_statuses)
            .map_or(fallback, Bucket::from);
        Some(StandupItem {
            phrase: point.text,
            issue_key: issue_key.map(str::to_string),
            bucket,
        })
    }

    fn worklog_item(&self, worklog: &WorklogEntry) -> Option<StandupItem> {
        let key = (!worklog.issue_id.is_empty()).then_some(worklog.issue_id.as_str());
        self.comment_item(&worklog.comment, key, Bucket::General)
    }

    // ========================================================================
    // Rendering
    // ========================================================================

    fn labels(&self) -> (&'static str, &'static str, &'static str) {
        match self.config.style {
            SummaryStyle::Technical => ("Completed", "In progress", "Also"),
            SummaryStyle::Business => ("Delivered", "Underway", "Also"),
            SummaryStyle::Brief => ("Done", "Doing", "Also"),
        }
    }

    fn render_item(&self, item: &StandupItem) -> String {
        let mut phrase = item.phrase.clone();
        if item.bucket == Bucket::Completed {
            if let Some(rest) = phrase
                .get(..10)
                .filter(|head| head.eq_ignore_ascii_case("completed "))
                .map(|_| phrase[10..].to_string())
            {
                phrase = capitalize_first(&rest);
            }
        }
        match (&item.issue_key, self.config.style) {
            (Some(key), SummaryStyle::Technical | SummaryStyle::Business) => {
                format!("{phrase} ({key})")
            }
            _ => phrase,
        }
    }

    /// Bucket, deduplicate and fit items into `max_length`, completed first.
    fn render(&self, mut items: Vec<StandupItem>) -> String {
        if items.is_empty() {
            return NO_ACTIVITY.to_string();
        }
        items.sort_by_key(|i| i.bucket);
        let mut seen = HashSet::new();
        items.retain(|i| seen.insert(i.canonical(self.vocabulary)));
        if self.config.style == SummaryStyle::Brief {
            items.truncate(BRIEF_POINT_LIMIT);
        }

        let mut sections: [Vec<String>; 3] = Default::default();
        for item in &items {
            let slot = match item.bucket {
                Bucket::Completed => 0,
                Bucket::InProgress => 1,
                Bucket::General => 2,
            };
            sections[slot].push(self.render_item(item));
        }

        let (done, doing, also) = self.labels();
        let compose = |sections: &[Vec<String>; 3]| -> String {
            [done, doing, also]
                .iter()
                .zip(sections.iter())
                .filter(|(_, points)| !points.is_empty())
                .map(|(label, points)| format!("{label}: {}", points.join(", ")))
                .collect::<Vec<_>>()
                .join("; ")
        };

        let max = self.config.max_length;
        let mut text = compose(&sections);
        while text.chars().count() > max {
            let dropped = if !sections[2].is_empty() {
                sections[2].pop()
            } else if sections[1].len() > 1 {
                sections[1].pop()
            } else if sections[0].len() > 1 {
                sections[0].pop()
            } else {
                None
            };
            if dropped.is_none() {
                break;
            }
            text = compose(&sections);
        }
        debug!(points = items.len(), length = text.chars().count(), "Rendered standup");
        self.bound(&text)
    }

    fn bound(&self, text: &str) -> String {
        truncate_to_length(text, self.config.max_length)
    }
}

#[async_trait]
impl StandupSynthesizer for RuleBasedSynthesizer {
    fn name(&self) -> &str {
        "rule_based"
    }

    async fn summarize_issue(&self, issue: &Issue) -> NarrativeResult<String> {
        Ok(RuleBasedSynthesizer::summarize_issue(self, issue))
    }

    async fn summarize_comments(&self, comments: &[Comment]) -> NarrativeResult<String> {
        Ok(RuleBasedSynthesizer::summarize_comments(self, comments))
    }

    async fn generate_standup_summary(
        &self,
        issues: &[Issue],
        worklogs: &[WorklogEntry],
    ) -> NarrativeResult<String> {
        Ok(RuleBasedSynthesizer::generate_standup_summary(self, issues, worklogs))
    }

    async fn generate_standup_summary_with_comments(
        &self,
        issues: &[Issue],
        comments: &CommentsByIssue,
        worklogs: &[WorklogEntry],
    ) -> NarrativeResult<String> {
        Ok(RuleBasedSynthesizer::generate_standup_summary_with_comments(
            self, issues, comments, worklogs,
        ))
    }
}
