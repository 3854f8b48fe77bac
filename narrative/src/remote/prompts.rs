//! Prompt templates for remote generation
//!
//! Bump [`PROMPT_VERSION`] whenever template text changes so a narrative
//! can be traced back to the prompt that produced it.

use crate::aggregate::{ActivityType, DataAggregator, EnhancedIssue, ProcessedComment, WorkType};
use crate::config::{SummaryStyle, SynthesisConfig};
use crate::error::NarrativeResult;
use crate::tracker::{Comment, CommentsByIssue, Issue, WorklogEntry};
use std::fmt::Write as _;
use tracing::debug;

/// Prompt version. Bump on any template change.
pub const PROMPT_VERSION: &str = "1.2.0";

const TECHNICAL_INSTRUCTIONS: &str = "\
You are writing a daily standup update for an engineering team. \
Name the concrete technologies, environments and components involved. \
Lead with completed work, then work in progress, then blockers.";

const TECHNICAL_PLAIN_INSTRUCTIONS: &str = "\
You are writing a daily standup update for an engineering team. \
Describe the work in plain terms without naming specific tools or vendors. \
Lead with completed work, then work in progress, then blockers.";

const BUSINESS_INSTRUCTIONS: &str = "\
You are writing a standup update for business stakeholders. \
Describe outcomes and their impact. Avoid technical jargon, tool names and ticket numbers.";

const BRIEF_INSTRUCTIONS: &str = "\
You are writing a one-line standup update. \
Mention only the most important items, separated by semicolons.";

const OUTPUT_RULES: &str = "\
Reply with the update text only: no preamble, no markdown, no bullet points.";

/// Emoji marker for a tracker priority name.
pub fn priority_emoji(priority: &str) -> &'static str {
    match priority.trim().to_lowercase().as_str() {
        "critical" | "highest" | "blocker" => "🔴",
        "high" => "🟠",
        "medium" => "🟡",
        "low" | "lowest" => "🟢",
        _ => "⚪",
    }
}

pub fn work_type_emoji(work_type: WorkType) -> &'static str {
    match work_type {
        WorkType::BugFix => "🐛",
        WorkType::Deployment => "🚀",
        WorkType::Infrastructure => "🏗️",
        WorkType::Database => "🗄️",
        WorkType::Testing => "🧪",
        WorkType::Security => "🔒",
        WorkType::CodeReview => "👀",
        WorkType::FeatureDevelopment => "✨",
        WorkType::General => "📝",
    }
}

pub fn activity_emoji(activity: ActivityType) -> &'static str {
    match activity {
        ActivityType::Blocker => "🚫",
        ActivityType::Deployment => "🚀",
        ActivityType::Testing => "🧪",
        ActivityType::Review => "👀",
        ActivityType::Investigation => "🔍",
        ActivityType::Implementation => "🔨",
        ActivityType::Planning => "📋",
        ActivityType::Communication => "💬",
    }
}

/// Builds style-specific prompts from tracker data.
#[derive(Debug, Clone, Default)]
pub struct PromptBuilder {
    config: SynthesisConfig,
    aggregator: DataAggregator,
}

impl PromptBuilder {
    pub fn new(config: SynthesisConfig) -> Self {
        Self {
            config,
            aggregator: DataAggregator::default(),
        }
    }

    pub fn config(&self) -> &SynthesisConfig {
        &self.config
    }

    fn instructions(&self) -> &'static str {
        match self.config.style {
            SummaryStyle::Technical if self.config.include_technical_details => {
                TECHNICAL_INSTRUCTIONS
            }
            SummaryStyle::Technical => TECHNICAL_PLAIN_INSTRUCTIONS,
            SummaryStyle::Business => BUSINESS_INSTRUCTIONS,
            SummaryStyle::Brief => BRIEF_INSTRUCTIONS,
        }
    }

    fn header(&self, task: &str) -> String {
        format!(
            "{}\n{task}\nKeep it under {} characters. {OUTPUT_RULES}\n",
            self.instructions(),
            self.config.max_length
        )
    }

    /// Prompt summarizing one issue.
    pub fn issue_prompt(&self, issue: &Issue) -> String {
        let mut prompt = self.header("Summarize this issue in one sentence.");
        prompt.push_str("\nIssue:\n");
        match self.aggregator.process_issue(issue, &[]) {
            Ok(analysis) => push_issue(&mut prompt, &analysis.enhanced),
            Err(_) => push_raw_issue(&mut prompt, issue),
        }
        prompt
    }

    /// Prompt summarizing a comment thread.
    pub fn comments_prompt(&self, comments: &[Comment]) -> String {
        let mut prompt = self.header("Summarize what these comments report.");
        prompt.push_str("\nComments:\n");
        let processed: Vec<ProcessedComment> = comments
            .iter()
            .filter_map(|c| self.aggregator.process_comment(c).ok())
            .collect();
        push_comments(&mut prompt, processed.iter().map(|c| (None, c)), self.config.max_prompt_comments);
        prompt
    }

    /// Prompt for the full standup. Issues are ordered by priority and
    /// capped, as are comments.
    pub fn standup_prompt(
        &self,
        issues: &[Issue],
        comments: &CommentsByIssue,
        worklogs: &[WorklogEntry],
    ) -> NarrativeResult<String> {
        let data = self.aggregator.process_issues_with_comments(issues, comments)?;
        let mut ranked: Vec<&EnhancedIssue> = data.issues().iter().collect();
        ranked.sort_by(|a, b| b.priority.cmp(&a.priority));

        let mut prompt = self.header("Summarize the team's recent work.");
        prompt.push_str("\nIssues (highest priority first):\n");
        for enhanced in ranked.iter().take(self.config.max_prompt_issues) {
            push_issue(&mut prompt, enhanced);
        }
        if ranked.len() > self.config.max_prompt_issues {
            let _ = writeln!(
                prompt,
                "(+{} lower-priority issues omitted)",
                ranked.len() - self.config.max_prompt_issues
            );
        }

        let mut thread: Vec<(Option<&str>, &ProcessedComment)> = ranked
            .iter()
            .flat_map(|e| e.processed_comments.iter().map(move |c| (Some(e.key()), c)))
            .collect();
        if !thread.is_empty() {
            thread.sort_by(|a, b| b.1.importance.cmp(&a.1.importance));
            prompt.push_str("\nRecent comments:\n");
            push_comments(&mut prompt, thread.into_iter(), self.config.max_prompt_comments);
        }

        let logged: Vec<&WorklogEntry> = worklogs
            .iter()
            .filter(|w| !w.comment.trim().is_empty())
            .collect();
        if !logged.is_empty() {
            prompt.push_str("\nWork log:\n");
            for entry in logged.iter().take(self.config.max_prompt_comments) {
                let _ = writeln!(prompt, "- [{}] {}", entry.issue_id, entry.comment.trim());
            }
        }

        debug!(
            version = PROMPT_VERSION,
            style = %self.config.style,
            issues = ranked.len().min(self.config.max_prompt_issues),
            chars = prompt.chars().count(),
            "Built standup prompt"
        );
        Ok(prompt)
    }
}

fn push_issue(prompt: &mut String, enhanced: &EnhancedIssue) {
    let issue = &enhanced.issue;
    let _ = writeln!(
        prompt,
        "- {} {} [{}] {} (status: {}, priority: {})",
        priority_emoji(issue.priority_name()),
        work_type_emoji(enhanced.work_type),
        issue.key,
        issue.summary().trim(),
        or_unknown(issue.status_name()),
        or_unknown(issue.priority_name()),
    );
    if !enhanced.work_summary.is_empty() {
        let _ = writeln!(prompt, "  {}", enhanced.work_summary);
    }
}

fn push_raw_issue(prompt: &mut String, issue: &Issue) {
    let _ = writeln!(
        prompt,
        "- {} {} (status: {})",
        priority_emoji(issue.priority_name()),
        issue.summary().trim(),
        or_unknown(issue.status_name()),
    );
}

fn push_comments<'a>(
    prompt: &mut String,
    comments: impl Iterator<Item = (Option<&'a str>, &'a ProcessedComment)>,
    limit: usize,
) {
    for (key, processed) in comments.take(limit) {
        let emoji = activity_emoji(processed.activity_type);
        let text = processed.comment.text().trim();
        let _ = match key {
            Some(key) => writeln!(prompt, "- {emoji} [{key}] {text}"),
            None => writeln!(prompt, "- {emoji} {text}"),
        };
    }
}

fn or_unknown(value: &str) -> &str {
    if value.trim().is_empty() {
        "unknown"
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issues() -> Vec<Issue> {
        vec![
            Issue::new("DEV-1", "Deploy AWS Lambda using Terraform")
                .with_status("Done")
                .with_priority("Critical"),
            Issue::new("DEV-2", "Database migration for auth service")
                .with_status("In Progress")
                .with_priority("Medium"),
        ]
    }

    #[test]
    fn test_priority_emoji() {
        assert_eq!(priority_emoji("Critical"), "🔴");
        assert_eq!(priority_emoji("high"), "🟠");
        assert_eq!(priority_emoji("Medium"), "🟡");
        assert_eq!(priority_emoji("Low"), "🟢");
        assert_eq!(priority_emoji(""), "⚪");
    }

    #[test]
    fn test_standup_prompt_orders_and_annotates() {
        let mut comments = CommentsByIssue::new();
        comments.insert(
            "DEV-2".into(),
            vec![Comment::new("c1", "Investigating database permission issue")],
        );
        let prompt = PromptBuilder::default()
            .standup_prompt(&issues(), &comments, &[])
            .unwrap();
        let dev1 = prompt.find("[DEV-1]").unwrap();
        let dev2 = prompt.find("[DEV-2] Database").unwrap();
        assert!(dev1 < dev2);
        assert!(prompt.contains("🔴"));
        assert!(prompt.contains("🟡"));
        assert!(prompt.contains("Investigating database permission issue"));
        assert!(prompt.contains("under 200 characters"));
    }

    #[test]
    fn test_issue_cap() {
        let many: Vec<Issue> = (0..15)
            .map(|i| Issue::new(format!("DEV-{i}"), "Update docs").with_status("To Do"))
            .collect();
        let prompt = PromptBuilder::default()
            .standup_prompt(&many, &CommentsByIssue::new(), &[])
            .unwrap();
        assert_eq!(prompt.matches("] Update docs").count(), 10);
        assert!(prompt.contains("+5 lower-priority issues omitted"));
    }

    #[test]
    fn test_comment_cap() {
        let thread: Vec<Comment> = (0..20)
            .map(|i| Comment::new(format!("c{i}"), format!("Note number {i}")))
            .collect();
        let prompt = PromptBuilder::default().comments_prompt(&thread);
        assert_eq!(prompt.matches("Note number").count(), 15);
    }

    #[test]
    fn test_style_instructions_differ() {
        let business = PromptBuilder::new(SynthesisConfig::default().with_style(SummaryStyle::Business))
            .issue_prompt(&issues()[0]);
        let brief = PromptBuilder::new(SynthesisConfig::default().with_style(SummaryStyle::Brief))
            .issue_prompt(&issues()[0]);
        assert!(business.contains("business stakeholders"));
        assert!(brief.contains("one-line"));
        assert_ne!(business, brief);
    }
}
