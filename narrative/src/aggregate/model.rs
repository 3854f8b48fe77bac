//! Structured work model produced by the aggregator

use crate::error::{NarrativeError, NarrativeResult};
use crate::text::dedup_preserving_order;
use crate::tracker::{Comment, Issue};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Coarse domain of an issue or comment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkType {
    BugFix,
    Deployment,
    Infrastructure,
    Database,
    Testing,
    Security,
    CodeReview,
    FeatureDevelopment,
    General,
}

impl WorkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BugFix => "bug_fix",
            Self::Deployment => "deployment",
            Self::Infrastructure => "infrastructure",
            Self::Database => "database",
            Self::Testing => "testing",
            Self::Security => "security",
            Self::CodeReview => "code_review",
            Self::FeatureDevelopment => "feature_development",
            Self::General => "general",
        }
    }
}

impl std::fmt::Display for WorkType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionStatus {
    Completed,
    InProgress,
    Blocked,
    UnderReview,
    Planned,
}

impl CompletionStatus {
    /// Human-facing label used in summaries.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Completed => "Completed",
            Self::InProgress => "In progress",
            Self::Blocked => "Blocked",
            Self::UnderReview => "Under review",
            Self::Planned => "Planned",
        }
    }
}

impl std::fmt::Display for CompletionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Blocked => write!(f, "blocked"),
            Self::UnderReview => write!(f, "under_review"),
            Self::Planned => write!(f, "planned"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
}

/// What kind of activity a comment reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityType {
    Blocker,
    Deployment,
    Testing,
    Review,
    Investigation,
    Implementation,
    Planning,
    Communication,
}

impl std::fmt::Display for ActivityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Blocker => write!(f, "blocker"),
            Self::Deployment => write!(f, "deployment"),
            Self::Testing => write!(f, "testing"),
            Self::Review => write!(f, "review"),
            Self::Investigation => write!(f, "investigation"),
            Self::Implementation => write!(f, "implementation"),
            Self::Planning => write!(f, "planning"),
            Self::Communication => write!(f, "communication"),
        }
    }
}

/// A comment with its extracted signals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedComment {
    pub comment: Comment,
    /// Action verbs found, in vocabulary order
    pub actions: Vec<String>,
    pub technical_terms: Vec<String>,
    pub work_type: WorkType,
    pub sentiment: Sentiment,
    /// 0-100
    pub importance: u8,
    pub activity_type: ActivityType,
    pub completion_status: CompletionStatus,
    pub key_topics: Vec<String>,
}

/// A typed activity observed in an issue or comment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub issue_key: String,
    pub description: String,
    pub status: CompletionStatus,
    pub timestamp: DateTime<Utc>,
}

/// Accumulated, deduplicated technical signals.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TechnicalContext {
    pub technologies: Vec<String>,
    pub environments: Vec<String>,
    pub actions: Vec<String>,
    pub deployments: Vec<ActivityRecord>,
    pub infrastructure: Vec<ActivityRecord>,
    pub database: Vec<ActivityRecord>,
    pub security: Vec<ActivityRecord>,
    pub testing: Vec<ActivityRecord>,
    pub code_reviews: Vec<ActivityRecord>,
}

impl TechnicalContext {
    /// Append a record to the list matching `work_type`. Types without a
    /// typed list (bug fixes, features, general) are ignored.
    pub fn record_activity(&mut self, work_type: WorkType, record: ActivityRecord) -> bool {
        let list = match work_type {
            WorkType::Deployment => &mut self.deployments,
            WorkType::Infrastructure => &mut self.infrastructure,
            WorkType::Database => &mut self.database,
            WorkType::Security => &mut self.security,
            WorkType::Testing => &mut self.testing,
            WorkType::CodeReview => &mut self.code_reviews,
            WorkType::BugFix | WorkType::FeatureDevelopment | WorkType::General => return false,
        };
        list.push(record);
        true
    }

    /// Append everything from `other`, then deduplicate.
    pub fn merge(&mut self, other: &TechnicalContext) {
        self.technologies.extend(other.technologies.iter().cloned());
        self.environments.extend(other.environments.iter().cloned());
        self.actions.extend(other.actions.iter().cloned());
        self.deployments.extend(other.deployments.iter().cloned());
        self.infrastructure.extend(other.infrastructure.iter().cloned());
        self.database.extend(other.database.iter().cloned());
        self.security.extend(other.security.iter().cloned());
        self.testing.extend(other.testing.iter().cloned());
        self.code_reviews.extend(other.code_reviews.iter().cloned());
        self.deduplicate();
    }

    pub fn deduplicate(&mut self) {
        dedup_preserving_order(&mut self.technologies);
        dedup_preserving_order(&mut self.environments);
        dedup_preserving_order(&mut self.actions);
        for records in [
            &mut self.deployments,
            &mut self.infrastructure,
            &mut self.database,
            &mut self.security,
            &mut self.testing,
            &mut self.code_reviews,
        ] {
            let mut seen = HashSet::new();
            records.retain(|r| seen.insert((r.issue_key.clone(), r.description.clone())));
        }
    }

    pub fn has_technology(&self, name: &str) -> bool {
        self.technologies.iter().any(|t| t.eq_ignore_ascii_case(name))
    }

    pub fn activity_count(&self) -> usize {
        self.deployments.len()
            + self.infrastructure.len()
            + self.database.len()
            + self.security.len()
            + self.testing.len()
            + self.code_reviews.len()
    }
}

/// An issue with classification, context and derived summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnhancedIssue {
    pub issue: Issue,
    pub comments: Vec<Comment>,
    pub processed_comments: Vec<ProcessedComment>,
    pub technical_context: TechnicalContext,
    pub priority: u32,
    pub work_type: WorkType,
    pub completion_status: CompletionStatus,
    pub work_summary: String,
    pub key_activities: Vec<String>,
    /// Mean pattern confidence over the issue and its comments
    pub signal_confidence: f64,
}

impl EnhancedIssue {
    pub fn key(&self) -> &str {
        &self.issue.key
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimelineEventType {
    IssueCreated,
    CommentAdded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
    Issue,
    Comment,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEvent {
    pub timestamp: DateTime<Utc>,
    pub event_type: TimelineEventType,
    pub description: String,
    pub issue_key: String,
    pub source: EventSource,
    /// 0-100
    pub importance: u8,
}

/// Root aggregate for one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "ProcessedDataRecord")]
pub struct ProcessedData {
    issues: Vec<EnhancedIssue>,
    pub technical_context: TechnicalContext,
    pub timeline: Vec<TimelineEvent>,
    pub created_at: DateTime<Utc>,
    /// Soft warnings for items skipped during aggregation
    pub warnings: Vec<String>,
}

/// Wire form of [`ProcessedData`]; issues are re-inserted through
/// [`ProcessedData::add_issue`] on load.
#[derive(Deserialize)]
struct ProcessedDataRecord {
    issues: Vec<EnhancedIssue>,
    technical_context: TechnicalContext,
    timeline: Vec<TimelineEvent>,
    created_at: DateTime<Utc>,
    #[serde(default)]
    warnings: Vec<String>,
}

impl TryFrom<ProcessedDataRecord> for ProcessedData {
    type Error = NarrativeError;

    fn try_from(record: ProcessedDataRecord) -> Result<Self, Self::Error> {
        let mut data = ProcessedData {
            issues: Vec::with_capacity(record.issues.len()),
            technical_context: record.technical_context,
            timeline: record.timeline,
            created_at: record.created_at,
            warnings: record.warnings,
        };
        for issue in record.issues {
            data.add_issue(issue)?;
        }
        Ok(data)
    }
}

impl ProcessedData {
    pub fn new() -> Self {
        Self {
            issues: Vec::new(),
            technical_context: TechnicalContext::default(),
            timeline: Vec::new(),
            created_at: Utc::now(),
            warnings: Vec::new(),
        }
    }

    /// Insert an issue, keeping keys unique.
    pub fn add_issue(&mut self, issue: EnhancedIssue) -> NarrativeResult<()> {
        let key = issue.key();
        if key.trim().is_empty() {
            return Err(NarrativeError::validation("cannot add an issue with an empty key"));
        }
        if self.get_issue(key).is_some() {
            return Err(
                NarrativeError::validation(format!("issue {key} is already present"))
                    .with_detail("issue_key", key),
            );
        }
        self.issues.push(issue);
        Ok(())
    }

    pub fn issues(&self) -> &[EnhancedIssue] {
        &self.issues
    }

    pub fn issue_count(&self) -> usize {
        self.issues.len()
    }

    pub fn get_issue(&self, key: &str) -> Option<&EnhancedIssue> {
        self.issues.iter().find(|i| i.key() == key)
    }

    pub fn issues_with_status(
        &self,
        status: CompletionStatus,
    ) -> impl Iterator<Item = &EnhancedIssue> {
        self.issues
            .iter()
            .filter(move |i| i.completion_status == status)
    }

    /// The `n` most important timeline events, ties broken by recency.
    pub fn top_events(&self, n: usize) -> Vec<&TimelineEvent> {
        let mut events: Vec<&TimelineEvent> = self.timeline.iter().collect();
        events.sort_by(|a, b| {
            b.importance
                .cmp(&a.importance)
                .then_with(|| b.timestamp.cmp(&a.timestamp))
        });
        events.truncate(n);
        events
    }

    pub fn comment_count(&self) -> usize {
        self.issues.iter().map(|i| i.processed_comments.len()).sum()
    }
}

impl Default for ProcessedData {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn enhanced(key: &str) -> EnhancedIssue {
        EnhancedIssue {
            issue: Issue::new(key, "Summary"),
            comments: vec![],
            processed_comments: vec![],
            technical_context: TechnicalContext::default(),
            priority: 50,
            work_type: WorkType::General,
            completion_status: CompletionStatus::Planned,
            work_summary: String::new(),
            key_activities: vec![],
            signal_confidence: 0.0,
        }
    }

    fn record(key: &str, description: &str) -> ActivityRecord {
        ActivityRecord {
            issue_key: key.into(),
            description: description.into(),
            status: CompletionStatus::Completed,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_deserialize_goes_through_add_issue() {
        let mut data = ProcessedData::new();
        data.add_issue(enhanced("DEV-1")).unwrap();
        data.add_issue(enhanced("DEV-2")).unwrap();
        let mut value = serde_json::to_value(&data).unwrap();

        let loaded: ProcessedData = serde_json::from_value(value.clone()).unwrap();
        assert_eq!(loaded.issue_count(), 2);
        assert!(loaded.get_issue("DEV-2").is_some());

        let first = value["issues"][0].clone();
        value["issues"].as_array_mut().unwrap().push(first);
        let err = serde_json::from_value::<ProcessedData>(value).unwrap_err();
        assert!(err.to_string().contains("DEV-1"), "{err}");
    }

    #[test]
    fn test_add_issue_rejects_empty_key() {
        let mut data = ProcessedData::new();
        let err = data.add_issue(enhanced("")).unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::Validation);
        assert_eq!(data.issue_count(), 0);
    }

    #[test]
    fn test_add_issue_rejects_duplicate_key() {
        let mut data = ProcessedData::new();
        data.add_issue(enhanced("DEV-1")).unwrap();
        let err = data.add_issue(enhanced("DEV-1")).unwrap_err();
        assert_eq!(err.detail("issue_key"), Some("DEV-1"));
        assert_eq!(data.issue_count(), 1);
    }

    #[test]
    fn test_record_activity_routes_by_work_type() {
        let mut ctx = TechnicalContext::default();
        assert!(ctx.record_activity(WorkType::Deployment, record("A-1", "deploy")));
        assert!(ctx.record_activity(WorkType::Database, record("A-1", "migrate")));
        assert!(!ctx.record_activity(WorkType::BugFix, record("A-1", "fix")));
        assert_eq!(ctx.deployments.len(), 1);
        assert_eq!(ctx.database.len(), 1);
        assert_eq!(ctx.activity_count(), 2);
    }

    #[test]
    fn test_merge_deduplicates_preserving_order() {
        let mut global = TechnicalContext {
            technologies: vec!["terraform".into(), "aws".into()],
            ..Default::default()
        };
        let other = TechnicalContext {
            technologies: vec!["database".into(), "terraform".into()],
            deployments: vec![record("A-1", "deploy"), record("A-1", "deploy")],
            ..Default::default()
        };
        global.merge(&other);
        assert_eq!(global.technologies, vec!["terraform", "aws", "database"]);
        assert_eq!(global.deployments.len(), 1);
        assert!(global.has_technology("AWS"));
    }

    #[test]
    fn test_top_events_by_importance_then_recency() {
        let now = Utc::now();
        let event = |key: &str, importance: u8, age_minutes: i64| TimelineEvent {
            timestamp: now - Duration::minutes(age_minutes),
            event_type: TimelineEventType::CommentAdded,
            description: String::new(),
            issue_key: key.into(),
            source: EventSource::Comment,
            importance,
        };
        let mut data = ProcessedData::new();
        data.timeline = vec![event("a", 50, 1), event("b", 90, 5), event("c", 50, 0)];
        let top: Vec<_> = data.top_events(2).iter().map(|e| e.issue_key.as_str()).collect();
        assert_eq!(top, vec!["b", "c"]);
    }

    #[test]
    fn test_status_labels() {
        assert_eq!(CompletionStatus::InProgress.to_string(), "in_progress");
        assert_eq!(CompletionStatus::InProgress.label(), "In progress");
        assert_eq!(WorkType::FeatureDevelopment.to_string(), "feature_development");
    }
}
