//! Issue-tracker data model
//!
//! Mirrors the subset of the tracker's REST payloads the pipeline reads.
//! Fetching is done by an external client behind [`IssueSource`];
//! [`TrackerSnapshot`] serves exported data from memory.

use crate::error::NarrativeResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A named reference (`status`, `priority`, `issuetype`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedRef {
    #[serde(default)]
    pub name: String,
}

impl NamedRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Project reference.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectRef {
    #[serde(default)]
    pub key: String,
}

/// Issue fields used by classification and synthesis.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IssueFields {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: NamedRef,
    #[serde(default)]
    pub priority: Option<NamedRef>,
    #[serde(default, rename = "issuetype")]
    pub issue_type: Option<NamedRef>,
    #[serde(default)]
    pub project: Option<ProjectRef>,
    #[serde(default, with = "tracker_time")]
    pub created: Option<DateTime<Utc>>,
    #[serde(default, with = "tracker_time")]
    pub updated: Option<DateTime<Utc>>,
}

/// A tracker issue.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub fields: IssueFields,
}

impl Issue {
    /// Create an issue with a key and summary; everything else empty.
    pub fn new(key: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            fields: IssueFields {
                summary: summary.into(),
                ..Default::default()
            },
        }
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.fields.status = NamedRef::new(status);
        self
    }

    pub fn with_priority(mut self, priority: impl Into<String>) -> Self {
        self.fields.priority = Some(NamedRef::new(priority));
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.fields.description = Some(description.into());
        self
    }

    pub fn with_issue_type(mut self, issue_type: impl Into<String>) -> Self {
        self.fields.issue_type = Some(NamedRef::new(issue_type));
        self
    }

    pub fn with_project(mut self, project_key: impl Into<String>) -> Self {
        self.fields.project = Some(ProjectRef {
            key: project_key.into(),
        });
        self
    }

    pub fn with_created(mut self, created: DateTime<Utc>) -> Self {
        self.fields.created = Some(created);
        self
    }

    pub fn with_updated(mut self, updated: DateTime<Utc>) -> Self {
        self.fields.updated = Some(updated);
        self
    }

    pub fn summary(&self) -> &str {
        &self.fields.summary
    }

    pub fn description(&self) -> &str {
        self.fields.description.as_deref().unwrap_or("")
    }

    pub fn status_name(&self) -> &str {
        &self.fields.status.name
    }

    pub fn priority_name(&self) -> &str {
        self.fields
            .priority
            .as_ref()
            .map(|p| p.name.as_str())
            .unwrap_or("")
    }

    /// Summary and description joined for keyword classification.
    pub fn full_text(&self) -> String {
        match self.fields.description.as_deref() {
            Some(desc) if !desc.trim().is_empty() => {
                format!("{} {}", self.fields.summary, desc)
            }
            _ => self.fields.summary.clone(),
        }
    }
}

/// Comment body container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentBody {
    #[serde(default)]
    pub text: String,
}

/// A comment on an issue.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub body: CommentBody,
    #[serde(default, with = "tracker_time")]
    pub created: Option<DateTime<Utc>>,
}

impl Comment {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            body: CommentBody { text: text.into() },
            created: None,
        }
    }

    pub fn with_created(mut self, created: DateTime<Utc>) -> Self {
        self.created = Some(created);
        self
    }

    pub fn text(&self) -> &str {
        &self.body.text
    }
}

/// A worklog entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorklogEntry {
    #[serde(default, rename = "issueId")]
    pub issue_id: String,
    #[serde(default)]
    pub comment: String,
    #[serde(default, with = "tracker_time")]
    pub started: Option<DateTime<Utc>>,
}

impl WorklogEntry {
    pub fn new(issue_id: impl Into<String>, comment: impl Into<String>) -> Self {
        Self {
            issue_id: issue_id.into(),
            comment: comment.into(),
            started: None,
        }
    }
}

/// Comments keyed by owning issue key.
pub type CommentsByIssue = HashMap<String, Vec<Comment>>;

/// Seam for the tracker API client.
#[async_trait]
pub trait IssueSource: Send + Sync {
    /// Issues in scope for the report.
    async fn fetch_issues(&self) -> NarrativeResult<Vec<Issue>>;

    /// Comments for a single issue, oldest first.
    async fn fetch_comments(&self, issue_key: &str) -> NarrativeResult<Vec<Comment>>;

    /// Worklog entries in scope for the report.
    async fn fetch_worklogs(&self) -> NarrativeResult<Vec<WorklogEntry>>;
}

/// Tracker data already in memory (exports, fixtures).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrackerSnapshot {
    #[serde(default)]
    pub issues: Vec<Issue>,
    #[serde(default)]
    pub comments: CommentsByIssue,
    #[serde(default)]
    pub worklogs: Vec<WorklogEntry>,
}

impl TrackerSnapshot {
    pub fn new(issues: Vec<Issue>) -> Self {
        Self {
            issues,
            ..Default::default()
        }
    }

    pub fn with_comments(mut self, issue_key: impl Into<String>, comments: Vec<Comment>) -> Self {
        self.comments.entry(issue_key.into()).or_default().extend(comments);
        self
    }

    pub fn with_worklogs(mut self, worklogs: Vec<WorklogEntry>) -> Self {
        self.worklogs = worklogs;
        self
    }

    /// Pull everything from a live source into a snapshot.
    pub async fn collect(source: &dyn IssueSource) -> NarrativeResult<Self> {
        let issues = source.fetch_issues().await?;
        let mut comments = CommentsByIssue::new();
        for issue in &issues {
            if issue.key.is_empty() {
                continue;
            }
            let issue_comments = source.fetch_comments(&issue.key).await?;
            if !issue_comments.is_empty() {
                comments.insert(issue.key.clone(), issue_comments);
            }
        }
        let worklogs = source.fetch_worklogs().await?;
        Ok(Self {
            issues,
            comments,
            worklogs,
        })
    }
}

#[async_trait]
impl IssueSource for TrackerSnapshot {
    async fn fetch_issues(&self) -> NarrativeResult<Vec<Issue>> {
        Ok(self.issues.clone())
    }

    async fn fetch_comments(&self, issue_key: &str) -> NarrativeResult<Vec<Comment>> {
        Ok(self.comments.get(issue_key).cloned().unwrap_or_default())
    }

    async fn fetch_worklogs(&self) -> NarrativeResult<Vec<WorklogEntry>> {
        Ok(self.worklogs.clone())
    }
}

/// Tracker timestamps: RFC 3339 or `2024-01-15T10:30:00.000+0000`.
pub(crate) mod tracker_time {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    const OFFSET_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%dT%H:%M:%S%z"];

    pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.with_timezone(&Utc));
        }
        OFFSET_FORMATS
            .iter()
            .find_map(|fmt| DateTime::parse_from_str(raw, fmt).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }

    pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(dt) => serializer.serialize_str(&dt.to_rfc3339()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        match raw.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(s) => parse(s)
                .map(Some)
                .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {s}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_deserialize_tracker_payload() {
        let json = r#"{
            "key": "OPS-12",
            "fields": {
                "summary": "Rotate TLS certificates",
                "description": "Renew the wildcard cert",
                "status": {"name": "In Progress"},
                "priority": {"name": "High"},
                "issuetype": {"name": "Task"},
                "project": {"key": "OPS"},
                "created": "2024-01-15T10:30:00.000+0000",
                "updated": "2024-01-16T08:00:00Z"
            }
        }"#;
        let issue: Issue = serde_json::from_str(json).unwrap();
        assert_eq!(issue.key, "OPS-12");
        assert_eq!(issue.status_name(), "In Progress");
        assert_eq!(issue.priority_name(), "High");
        assert_eq!(issue.fields.issue_type.as_ref().unwrap().name, "Task");
        let created = issue.fields.created.unwrap();
        assert_eq!((created.year(), created.day(), created.hour()), (2024, 15, 10));
        assert!(issue.fields.updated.is_some());
    }

    #[test]
    fn test_missing_fields_default() {
        let issue: Issue = serde_json::from_str(r#"{"key": "X-1", "fields": {}}"#).unwrap();
        assert_eq!(issue.summary(), "");
        assert_eq!(issue.priority_name(), "");
        assert!(issue.fields.created.is_none());
    }

    #[test]
    fn test_invalid_timestamp_rejected() {
        let result: Result<Comment, _> =
            serde_json::from_str(r#"{"id": "1", "body": {"text": "x"}, "created": "yesterday"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_worklog_field_names() {
        let entry: WorklogEntry =
            serde_json::from_str(r#"{"issueId": "10001", "comment": "Pairing on deploy"}"#)
                .unwrap();
        assert_eq!(entry.issue_id, "10001");
        assert!(entry.started.is_none());
    }

    #[test]
    fn test_full_text_joins_description() {
        let issue = Issue::new("A-1", "Fix login").with_description("Redirect loop on SSO");
        assert_eq!(issue.full_text(), "Fix login Redirect loop on SSO");
        assert_eq!(Issue::new("A-2", "Only summary").full_text(), "Only summary");
    }

    #[tokio::test]
    async fn test_snapshot_collect_roundtrip() {
        let source = TrackerSnapshot::new(vec![Issue::new("A-1", "One"), Issue::new("", "bad")])
            .with_comments("A-1", vec![Comment::new("c1", "Started work")])
            .with_worklogs(vec![WorklogEntry::new("A-1", "Investigating")]);

        let collected = TrackerSnapshot::collect(&source).await.unwrap();
        assert_eq!(collected.issues.len(), 2);
        assert_eq!(collected.comments.len(), 1);
        assert_eq!(collected.comments["A-1"][0].text(), "Started work");
        assert_eq!(collected.worklogs.len(), 1);
    }
}
