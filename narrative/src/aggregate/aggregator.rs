//! Issue and comment aggregation
//!
//! Turns raw tracker records into [`ProcessedData`]. Each issue is analyzed
//! independently into an [`IssueAnalysis`]; a single merge step then folds
//! analyses into the shared aggregate in input order. Invalid items are
//! skipped with a warning, they never abort the batch.

use super::model::{
    ActivityRecord, ActivityType, CompletionStatus, EnhancedIssue, EventSource, ProcessedComment,
    ProcessedData, Sentiment, TechnicalContext, TimelineEvent, TimelineEventType, WorkType,
};
use super::vocabulary::{first_substring_match, first_word_prefix_match, Vocabulary};
use crate::error::{NarrativeError, NarrativeResult};
use crate::fallback::analyze_error;
use crate::patterns::{PatternMatchSet, PatternMatcher};
use crate::text::{capitalize_first, dedup_preserving_order, sentences, truncate_to_length};
use crate::tracker::{Comment, CommentsByIssue, Issue};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

/// Longest description kept on timeline events and activity records.
const DESCRIPTION_LIMIT: usize = 100;

/// Importance added per high-severity keyword.
const HIGH_SEVERITY_WEIGHT: u32 = 30;
const MEDIUM_SEVERITY_WEIGHT: u32 = 20;
const TECHNICAL_TERM_WEIGHT: u32 = 10;
const BASE_IMPORTANCE: u32 = 50;

/// Everything derived from one issue, before merging.
#[derive(Debug, Clone)]
pub struct IssueAnalysis {
    pub enhanced: EnhancedIssue,
    pub timeline: Vec<TimelineEvent>,
    /// Comments skipped during analysis
    pub warnings: Vec<String>,
}

/// Classifies issues and comments and accumulates technical context.
#[derive(Debug, Clone)]
pub struct DataAggregator {
    matcher: PatternMatcher,
    vocabulary: &'static Vocabulary,
}

impl Default for DataAggregator {
    fn default() -> Self {
        Self::new(PatternMatcher::default())
    }
}

impl DataAggregator {
    pub fn new(matcher: PatternMatcher) -> Self {
        Self {
            matcher,
            vocabulary: Vocabulary::builtin(),
        }
    }

    /// Swap the keyword tables.
    pub fn with_vocabulary(mut self, vocabulary: &'static Vocabulary) -> Self {
        self.vocabulary = vocabulary;
        self
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        self.vocabulary
    }

    // ========================================================================
    // Batch entry points
    // ========================================================================

    /// Analyze every issue with its comments and merge the results.
    ///
    /// Issues with an empty key, duplicate keys and comments without an id
    /// are skipped and reported in [`ProcessedData::warnings`].
    pub fn process_issues_with_comments(
        &self,
        issues: &[Issue],
        comments: &CommentsByIssue,
    ) -> NarrativeResult<ProcessedData> {
        info!(issues = issues.len(), "Aggregating tracker data");
        let analyses = issues.iter().map(|issue| {
            let issue_comments = comments.get(&issue.key).map_or(&[][..], Vec::as_slice);
            self.process_issue(issue, issue_comments)
        });
        Ok(Self::merge(analyses))
    }

    /// Same result as [`process_issues_with_comments`](Self::process_issues_with_comments),
    /// with per-issue analysis fanned out over at most `workers` blocking tasks.
    /// Results are merged in input order.
    pub async fn process_concurrently(
        &self,
        issues: Vec<Issue>,
        comments: CommentsByIssue,
        workers: usize,
    ) -> NarrativeResult<ProcessedData> {
        let workers = workers.max(1);
        info!(issues = issues.len(), workers, "Aggregating tracker data concurrently");

        let results: Vec<NarrativeResult<IssueAnalysis>> = stream::iter(issues)
            .map(|issue| {
                let aggregator = self.clone();
                let issue_comments = comments.get(&issue.key).cloned().unwrap_or_default();
                async move {
                    let key = issue.key.clone();
                    let task = tokio::task::spawn_blocking(move || {
                        aggregator.process_issue(&issue, &issue_comments)
                    });
                    match task.await {
                        Ok(result) => result,
                        Err(e) => Err(NarrativeError::processing(format!(
                            "analysis task for {key} failed"
                        ))
                        .with_cause(e)
                        .with_detail("issue_key", &key)),
                    }
                }
            })
            .buffered(workers)
            .collect()
            .await;

        Ok(Self::merge(results))
    }

    /// Fold per-issue analyses into one aggregate. Single owner, input order.
    fn merge(analyses: impl IntoIterator<Item = NarrativeResult<IssueAnalysis>>) -> ProcessedData {
        let mut data = ProcessedData::new();
        for analysis in analyses {
            let analysis = match analysis {
                Ok(a) => a,
                Err(e) => {
                    Self::record_skip(&mut data, &e);
                    continue;
                }
            };
            let IssueAnalysis {
                enhanced,
                timeline,
                warnings,
            } = analysis;
            let context = enhanced.technical_context.clone();
            if let Err(e) = data.add_issue(enhanced) {
                Self::record_skip(&mut data, &e);
                continue;
            }
            data.technical_context.merge(&context);
            data.timeline.extend(timeline);
            data.warnings.extend(warnings);
        }
        data.timeline.sort_by_key(|e| e.timestamp);
        debug!(
            issues = data.issue_count(),
            events = data.timeline.len(),
            warnings = data.warnings.len(),
            "Aggregation merged"
        );
        data
    }

    fn record_skip(data: &mut ProcessedData, error: &NarrativeError) {
        let analysis = analyze_error(error);
        warn!(
            kind = %error.kind,
            severity = %analysis.severity,
            "Skipping issue: {}",
            error.message
        );
        data.warnings.push(format!("skipped issue: {}", error.message));
    }

    // ========================================================================
    // Per-issue analysis
    // ========================================================================

    /// Analyze a single issue. Fails only when the issue itself is invalid;
    /// invalid comments become warnings.
    pub fn process_issue(&self, issue: &Issue, comments: &[Comment]) -> NarrativeResult<IssueAnalysis> {
        if issue.key.trim().is_empty() {
            return Err(NarrativeError::validation("issue has an empty key")
                .with_detail("summary", issue.summary()));
        }

        let text = issue.full_text().to_lowercase();
        let priority = self.calculate_priority(issue);
        let work_type = self.classify_work_type(&text);
        let completion_status = self.classify_completion_status(issue.status_name());

        let mut processed = Vec::with_capacity(comments.len());
        let mut warnings = Vec::new();
        for comment in comments {
            match self.process_comment(comment) {
                Ok(p) => processed.push(p),
                Err(e) => {
                    warn!(issue = %issue.key, "Skipping comment: {}", e.message);
                    warnings.push(format!("{}: skipped comment: {}", issue.key, e.message));
                }
            }
        }

        let issue_signals = self.matcher.match_all_patterns(&issue.full_text());
        let comment_signals: Vec<PatternMatchSet> = processed
            .iter()
            .map(|p| self.matcher.match_all_patterns(p.comment.text()))
            .collect();

        let technical_context = self.build_context(
            issue,
            &text,
            work_type,
            completion_status,
            &processed,
            std::iter::once(&issue_signals).chain(comment_signals.iter()),
        );

        let confidences: Vec<f64> = std::iter::once(&issue_signals)
            .chain(comment_signals.iter())
            .filter(|s| !s.is_empty())
            .map(|s| s.overall_confidence)
            .collect();
        let signal_confidence = if confidences.is_empty() {
            0.0
        } else {
            confidences.iter().sum::<f64>() / confidences.len() as f64
        };

        let work_summary = self.generate_work_summary(issue, completion_status, &processed);
        let key_activities = Self::key_activities(&processed);
        let timeline = Self::timeline_events(issue, priority, &processed);

        let enhanced = EnhancedIssue {
            issue: issue.clone(),
            comments: processed.iter().map(|p| p.comment.clone()).collect(),
            processed_comments: processed,
            technical_context,
            priority,
            work_type,
            completion_status,
            work_summary,
            key_activities,
            signal_confidence,
        };
        debug!(
            issue = %enhanced.issue.key,
            %work_type,
            status = %completion_status,
            priority,
            "Issue analyzed"
        );

        Ok(IssueAnalysis {
            enhanced,
            timeline,
            warnings,
        })
    }

    /// Base score from the priority name plus the first matching status boost.
    pub fn calculate_priority(&self, issue: &Issue) -> u32 {
        self.vocabulary.base_priority(issue.priority_name())
            + self.vocabulary.status_boost(issue.status_name())
    }

    pub fn classify_work_type(&self, text_lower: &str) -> WorkType {
        first_word_prefix_match(text_lower, self.vocabulary.work_types).unwrap_or(WorkType::General)
    }

    pub fn classify_completion_status(&self, status_name: &str) -> CompletionStatus {
        first_substring_match(&status_name.to_lowercase(), self.vocabulary.issue_statuses)
            .unwrap_or(CompletionStatus::Planned)
    }

    // ========================================================================
    // Comments
    // ========================================================================

    /// Extract signals from one comment. Fails when the comment has no id.
    pub fn process_comment(&self, comment: &Comment) -> NarrativeResult<ProcessedComment> {
        if comment.id.trim().is_empty() {
            return Err(NarrativeError::validation("comment has an empty id")
                .with_detail("text", truncate_to_length(comment.text(), 40)));
        }
        let text = comment.text().to_lowercase();
        let v = self.vocabulary;

        let actions = Vocabulary::terms_in(&text, v.action_verbs);
        let technical_terms = Vocabulary::terms_in(&text, v.technical_terms);
        let key_topics = v.topics_in(&text);

        Ok(ProcessedComment {
            comment: comment.clone(),
            importance: self.comment_importance(&text, technical_terms.len()),
            sentiment: self.sentiment(&text),
            work_type: self.classify_work_type(&text),
            activity_type: first_word_prefix_match(&text, v.activity_types)
                .unwrap_or(ActivityType::Communication),
            completion_status: first_word_prefix_match(&text, v.comment_statuses)
                .unwrap_or(CompletionStatus::InProgress),
            actions,
            technical_terms,
            key_topics,
        })
    }

    fn sentiment(&self, text_lower: &str) -> Sentiment {
        let positive = Vocabulary::terms_in(text_lower, self.vocabulary.positive_words).len();
        let negative = Vocabulary::terms_in(text_lower, self.vocabulary.negative_words).len();
        match positive.cmp(&negative) {
            std::cmp::Ordering::Greater => Sentiment::Positive,
            std::cmp::Ordering::Less => Sentiment::Negative,
            std::cmp::Ordering::Equal => Sentiment::Neutral,
        }
    }

    fn comment_importance(&self, text_lower: &str, technical_terms: usize) -> u8 {
        let high = Vocabulary::terms_in(text_lower, self.vocabulary.high_severity).len() as u32;
        let medium = Vocabulary::terms_in(text_lower, self.vocabulary.medium_severity).len() as u32;
        let score = BASE_IMPORTANCE
            + high * HIGH_SEVERITY_WEIGHT
            + medium * MEDIUM_SEVERITY_WEIGHT
            + technical_terms as u32 * TECHNICAL_TERM_WEIGHT;
        score.min(100) as u8
    }

    // ========================================================================
    // Derived fields
    // ========================================================================

    /// One-line summary of what happened on an issue.
    ///
    /// No comments: `"<status>: <summary>"`. One distinct action across the
    /// comments: `"<Action> <summary>"`. Several: `"Multiple activities: a, b, c"`.
    pub fn generate_work_summary(
        &self,
        issue: &Issue,
        status: CompletionStatus,
        processed: &[ProcessedComment],
    ) -> String {
        let mut distinct: Vec<String> = processed
            .iter()
            .flat_map(|p| p.actions.iter().cloned())
            .collect();
        dedup_preserving_order(&mut distinct);

        match distinct.as_slice() {
            [] => format!("{}: {}", status.label(), issue.summary()),
            [only] => format!("{} {}", capitalize_first(only), issue.summary().to_lowercase()),
            many => {
                let shown: Vec<&str> = many.iter().take(3).map(String::as_str).collect();
                format!("Multiple activities: {}", shown.join(", "))
            }
        }
    }

    fn key_activities(processed: &[ProcessedComment]) -> Vec<String> {
        let mut activities: Vec<String> = processed
            .iter()
            .filter_map(|p| {
                let action = p.actions.first()?;
                let subject = p
                    .technical_terms
                    .first()
                    .or_else(|| p.key_topics.first())
                    .map_or_else(|| p.work_type.to_string(), Clone::clone);
                Some(format!("{action} {subject}"))
            })
            .collect();
        dedup_preserving_order(&mut activities);
        activities
    }

    fn build_context<'a>(
        &self,
        issue: &Issue,
        text_lower: &str,
        work_type: WorkType,
        status: CompletionStatus,
        processed: &[ProcessedComment],
        signals: impl Iterator<Item = &'a PatternMatchSet>,
    ) -> TechnicalContext {
        let v = self.vocabulary;
        let issue_time = activity_time(issue);
        let mut ctx = TechnicalContext {
            technologies: Vocabulary::terms_in(text_lower, v.technical_terms),
            ..Default::default()
        };

        let environments = &self.matcher.library().environments;
        if let Some(env) = environments.resolve(text_lower) {
            ctx.environments.push(env.to_string());
        }
        for p in processed {
            ctx.technologies.extend(p.technical_terms.iter().cloned());
            ctx.actions.extend(p.actions.iter().cloned());
            if let Some(env) = environments.resolve(&p.comment.text().to_lowercase()) {
                ctx.environments.push(env.to_string());
            }
        }

        for set in signals {
            for infra in &set.infrastructure {
                if v.technical_terms.contains(&infra.pattern_type.as_str()) {
                    ctx.technologies.push(infra.pattern_type.clone());
                }
                if infra.action != "work" {
                    ctx.actions.push(infra.action.clone());
                }
            }
            for deploy in &set.deployment {
                if deploy.environment != "unspecified" {
                    ctx.environments.push(deploy.environment.clone());
                }
                if deploy.action != "work" {
                    ctx.actions.push(deploy.action.clone());
                }
            }
        }

        ctx.record_activity(
            work_type,
            ActivityRecord {
                issue_key: issue.key.clone(),
                description: truncate_to_length(issue.summary(), DESCRIPTION_LIMIT),
                status,
                timestamp: issue_time,
            },
        );
        for p in processed {
            let description = sentences(p.comment.text())
                .next()
                .map(|s| truncate_to_length(s, DESCRIPTION_LIMIT))
                .unwrap_or_default();
            if description.is_empty() {
                continue;
            }
            ctx.record_activity(
                p.work_type,
                ActivityRecord {
                    issue_key: issue.key.clone(),
                    description,
                    status: p.completion_status,
                    timestamp: p.comment.created.unwrap_or(issue_time),
                },
            );
        }

        ctx.deduplicate();
        ctx
    }

    fn timeline_events(
        issue: &Issue,
        priority: u32,
        processed: &[ProcessedComment],
    ) -> Vec<TimelineEvent> {
        let issue_time = activity_time(issue);
        let mut events = Vec::with_capacity(processed.len() + 1);
        events.push(TimelineEvent {
            timestamp: issue.fields.created.unwrap_or(issue_time),
            event_type: TimelineEventType::IssueCreated,
            description: truncate_to_length(
                &format!("{} created: {}", issue.key, issue.summary()),
                DESCRIPTION_LIMIT,
            ),
            issue_key: issue.key.clone(),
            source: EventSource::Issue,
            importance: priority.min(100) as u8,
        });
        for p in processed {
            events.push(TimelineEvent {
                timestamp: p.comment.created.unwrap_or(issue_time),
                event_type: TimelineEventType::CommentAdded,
                description: truncate_to_length(p.comment.text(), DESCRIPTION_LIMIT),
                issue_key: issue.key.clone(),
                source: EventSource::Comment,
                importance: p.importance,
            });
        }
        events
    }
}

/// Last-updated time, else now.
fn activity_time(issue: &Issue) -> DateTime<Utc> {
    issue.fields.updated.unwrap_or_else(Utc::now)
}
