//! Keyword tables used by the aggregator
//!
//! Every classification cascade is an ordered `(label, keywords)` table: the
//! first row with a matching keyword wins. Tables are plain data so callers
//! can substitute their own [`Vocabulary`].

use super::model::{ActivityType, CompletionStatus, WorkType};
use crate::text::{contains_term, contains_word_prefix};

pub const BUILTIN_VOCABULARY_VERSION: &str = "2024.1";

/// Ordered cascade table.
pub type Cascade<T> = &'static [(T, &'static [&'static str])];

/// Versioned keyword data for issue and comment classification.
#[derive(Debug, Clone)]
pub struct Vocabulary {
    pub version: &'static str,
    /// Priority name (lowercased, exact) to base score
    pub priority_base: &'static [(&'static str, u32)],
    pub default_priority: u32,
    /// Status-name fragments to additive boost; first hit only
    pub status_boosts: &'static [(&'static [&'static str], u32)],
    /// Matched as word prefixes over title and description
    pub work_types: Cascade<WorkType>,
    /// Matched as substrings over the status name
    pub issue_statuses: Cascade<CompletionStatus>,
    /// Matched as word prefixes over comment text
    pub comment_statuses: Cascade<CompletionStatus>,
    pub activity_types: Cascade<ActivityType>,
    /// Whole-term action verbs, reported in table order
    pub action_verbs: &'static [&'static str],
    /// Whole-term technology names
    pub technical_terms: &'static [&'static str],
    /// Topic name to word-prefix triggers
    pub topics: &'static [(&'static str, &'static [&'static str])],
    pub positive_words: &'static [&'static str],
    pub negative_words: &'static [&'static str],
    pub high_severity: &'static [&'static str],
    pub medium_severity: &'static [&'static str],
}

static BUILTIN: Vocabulary = Vocabulary {
    version: BUILTIN_VOCABULARY_VERSION,
    priority_base: &[
        ("critical", 100),
        ("highest", 100),
        ("high", 80),
        ("medium", 60),
        ("low", 40),
        ("lowest", 20),
    ],
    default_priority: 50,
    status_boosts: &[
        (&["blocked"], 30),
        (&["progress", "development"], 20),
        (&["done", "closed"], 10),
    ],
    work_types: &[
        (
            WorkType::BugFix,
            &["bug", "fix", "defect", "crash", "hotfix", "regression"],
        ),
        (
            WorkType::Deployment,
            &["deploy", "release", "rollout", "rollback", "ci/cd", "pipeline"],
        ),
        (
            WorkType::Infrastructure,
            &[
                "terraform",
                "aws",
                "infrastructure",
                "kubernetes",
                "k8s",
                "docker",
                "vpc",
                "lambda",
                "cloud",
                "server",
            ],
        ),
        (
            WorkType::Database,
            &["database", "migration", "sql", "postgres", "mysql", "schema", "query"],
        ),
        (WorkType::Testing, &["test", "qa", "coverage"]),
        (
            WorkType::Security,
            &[
                "security",
                "auth",
                "permission",
                "vulnerability",
                "ssl",
                "certificate",
                "iam",
                "encryption",
            ],
        ),
        (WorkType::CodeReview, &["review", "pull request", "merge"]),
        (
            WorkType::FeatureDevelopment,
            &["feature", "implement", "create", "build", "new"],
        ),
    ],
    issue_statuses: &[
        (CompletionStatus::Completed, &["done", "closed", "resolved"]),
        (
            CompletionStatus::InProgress,
            &["progress", "development", "active"],
        ),
        (CompletionStatus::Blocked, &["blocked"]),
        (CompletionStatus::UnderReview, &["review"]),
    ],
    comment_statuses: &[
        (
            CompletionStatus::Completed,
            &[
                "completed", "complete", "done", "finished", "merged", "deployed", "resolved",
                "shipped", "fixed",
            ],
        ),
        (
            CompletionStatus::Blocked,
            &["blocked", "stuck", "waiting on", "waiting for", "cannot proceed"],
        ),
        (
            CompletionStatus::UnderReview,
            &["review", "pr open", "awaiting approval"],
        ),
        (
            CompletionStatus::InProgress,
            &["working on", "investigating", "debugging", "started", "in progress", "ongoing"],
        ),
    ],
    activity_types: &[
        (
            ActivityType::Blocker,
            &["blocked", "stuck", "waiting on", "waiting for"],
        ),
        (
            ActivityType::Deployment,
            &["deploy", "release", "rollout", "rolled back", "apply", "applied"],
        ),
        (ActivityType::Testing, &["test", "qa", "verified", "validated"]),
        (
            ActivityType::Review,
            &["review", "merged", "pull request", "approved"],
        ),
        (
            ActivityType::Investigation,
            &["investigat", "debug", "looking into", "root cause", "troubleshoot"],
        ),
        (
            ActivityType::Implementation,
            &[
                "implement", "fix", "refactor", "added", "built", "wrote", "configur", "updat",
                "creat", "migrat",
            ],
        ),
        (
            ActivityType::Planning,
            &["plan", "next step", "will", "todo", "design"],
        ),
    ],
    action_verbs: &[
        "completed",
        "finished",
        "implemented",
        "fixed",
        "deployed",
        "merged",
        "released",
        "rolled back",
        "applied",
        "migrated",
        "configured",
        "refactored",
        "tested",
        "reviewed",
        "resolved",
        "created",
        "updated",
        "added",
        "removed",
        "investigating",
        "debugging",
        "working on",
        "started",
        "blocked",
    ],
    technical_terms: &[
        "terraform",
        "aws",
        "lambda",
        "ec2",
        "s3",
        "rds",
        "vpc",
        "iam",
        "kubernetes",
        "k8s",
        "docker",
        "helm",
        "database",
        "postgres",
        "postgresql",
        "mysql",
        "redis",
        "dynamodb",
        "mongodb",
        "sql",
        "api",
        "graphql",
        "ci/cd",
        "jenkins",
        "github actions",
        "pipeline",
        "oauth",
        "ssl",
        "tls",
        "grafana",
        "prometheus",
        "datadog",
    ],
    topics: &[
        ("deployment", &["deploy", "release", "rollout"]),
        (
            "infrastructure",
            &["terraform", "infrastructure", "aws", "vpc", "kubernetes"],
        ),
        ("database", &["database", "migration", "sql", "postgres"]),
        (
            "security",
            &["security", "auth", "permission", "vulnerab", "iam"],
        ),
        ("testing", &["test", "qa"]),
        ("performance", &["performance", "latency", "slow"]),
        ("monitoring", &["monitoring", "alert", "dashboard"]),
        ("documentation", &["docs", "documentation", "readme"]),
        ("configuration", &["config", "settings"]),
    ],
    positive_words: &[
        "completed",
        "success",
        "successful",
        "successfully",
        "done",
        "fixed",
        "resolved",
        "merged",
        "passed",
        "passing",
        "great",
        "good",
        "improved",
        "deployed",
        "working",
    ],
    negative_words: &[
        "failed", "failing", "error", "errors", "issue", "issues", "problem", "blocked",
        "broken", "bug", "crash", "stuck", "unable", "cannot", "timeout", "denied",
    ],
    high_severity: &[
        "critical",
        "urgent",
        "blocker",
        "outage",
        "production",
        "security",
        "data loss",
        "downtime",
        "incident",
    ],
    medium_severity: &[
        "bug",
        "error",
        "failed",
        "issue",
        "deadline",
        "customer",
        "performance",
        "regression",
    ],
};

impl Vocabulary {
    /// The built-in tables.
    pub fn builtin() -> &'static Vocabulary {
        &BUILTIN
    }

    pub fn base_priority(&self, priority_name: &str) -> u32 {
        let name = priority_name.trim().to_lowercase();
        self.priority_base
            .iter()
            .find(|(candidate, _)| *candidate == name)
            .map_or(self.default_priority, |(_, score)| *score)
    }

    pub fn status_boost(&self, status_name: &str) -> u32 {
        let status = status_name.to_lowercase();
        self.status_boosts
            .iter()
            .find(|(fragments, _)| fragments.iter().any(|f| status.contains(f)))
            .map_or(0, |(_, boost)| *boost)
    }

    /// Whole-term matches from `terms`, in table order.
    pub fn terms_in(text_lower: &str, terms: &[&str]) -> Vec<String> {
        terms
            .iter()
            .filter(|term| contains_term(text_lower, term))
            .map(|term| term.to_string())
            .collect()
    }

    pub fn topics_in(&self, text_lower: &str) -> Vec<String> {
        self.topics
            .iter()
            .filter(|(_, triggers)| triggers.iter().any(|t| contains_word_prefix(text_lower, t)))
            .map(|(topic, _)| topic.to_string())
            .collect()
    }
}

/// First row whose keywords appear (as word prefixes) in `text_lower`.
pub fn first_word_prefix_match<T: Copy>(text_lower: &str, cascade: Cascade<T>) -> Option<T> {
    cascade
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| contains_word_prefix(text_lower, k)))
        .map(|(label, _)| *label)
}

/// First row whose keywords appear anywhere in `text_lower`.
pub fn first_substring_match<T: Copy>(text_lower: &str, cascade: Cascade<T>) -> Option<T> {
    cascade
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| text_lower.contains(k)))
        .map(|(label, _)| *label)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_priority_exact_names() {
        let v = Vocabulary::builtin();
        assert_eq!(v.base_priority("Highest"), 100);
        assert_eq!(v.base_priority("High"), 80);
        assert_eq!(v.base_priority("Lowest"), 20);
        assert_eq!(v.base_priority("Somewhat high"), 50);
        assert_eq!(v.base_priority(""), 50);
    }

    #[test]
    fn test_status_boost_first_hit_only() {
        let v = Vocabulary::builtin();
        assert_eq!(v.status_boost("Blocked"), 30);
        assert_eq!(v.status_boost("In Progress"), 20);
        assert_eq!(v.status_boost("In Development"), 20);
        assert_eq!(v.status_boost("Done"), 10);
        assert_eq!(v.status_boost("To Do"), 0);
    }

    #[test]
    fn test_cascade_order_wins() {
        let v = Vocabulary::builtin();
        // "fix" precedes "deploy" in the cascade
        assert_eq!(
            first_word_prefix_match("fix the deploy script", v.work_types),
            Some(WorkType::BugFix)
        );
        assert_eq!(
            first_word_prefix_match("tidy up the docs", v.work_types),
            None
        );
    }

    #[test]
    fn test_topics_and_terms() {
        let v = Vocabulary::builtin();
        let text = "deploying terraform changes to aws";
        assert_eq!(
            Vocabulary::terms_in(text, v.technical_terms),
            vec!["terraform", "aws"]
        );
        assert_eq!(v.topics_in(text), vec!["deployment", "infrastructure"]);
    }
}
