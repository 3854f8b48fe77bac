//! End-to-end standup runs over a small, realistic tracker snapshot.
//!
//! Tests verify:
//! - Both issues survive aggregation with their technologies recorded
//! - Every style produces a narrative within the configured length
//! - Each style lists completed work before in-progress work
//! - Snapshots load from JSON the way the CLI reads them

use narrative::aggregate::CompletionStatus;
use narrative::{
    Comment, DataAggregator, Issue, StandupPipeline, SummaryStyle, SynthesisConfig,
    TrackerSnapshot, WorklogEntry,
};

fn snapshot() -> TrackerSnapshot {
    TrackerSnapshot::new(vec![
        Issue::new("DEV-1", "Deploy AWS Lambda using Terraform")
            .with_status("Done")
            .with_priority("Critical"),
        Issue::new("DEV-2", "Database migration for auth service")
            .with_status("In Progress")
            .with_priority("Medium"),
    ])
    .with_comments(
        "DEV-1",
        vec![Comment::new("1", "Completed Terraform apply for production")],
    )
    .with_comments(
        "DEV-2",
        vec![
            Comment::new("2", "Investigating database permission issue"),
            Comment::new("3", "Merged PR for auth service"),
        ],
    )
}

#[test]
fn test_aggregation_records_both_issues_and_technologies() {
    let snap = snapshot();
    let data = DataAggregator::default()
        .process_issues_with_comments(&snap.issues, &snap.comments)
        .unwrap();

    assert_eq!(data.issue_count(), 2);
    assert!(data.technical_context.has_technology("terraform"));
    assert!(data.technical_context.has_technology("database"));
    assert!(data.warnings.is_empty());

    let dev1 = data.get_issue("DEV-1").unwrap();
    assert_eq!(dev1.completion_status, CompletionStatus::Completed);
    assert_eq!(dev1.priority, 110);
    let dev2 = data.get_issue("DEV-2").unwrap();
    assert_eq!(dev2.completion_status, CompletionStatus::InProgress);
    assert_eq!(dev2.comments.len(), 2);
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_env_filter("info").try_init();
}

/// Byte offsets of the completed and in-progress labels, asserting both exist.
fn section_order(narrative: &str, done: &str, doing: &str) -> (usize, usize) {
    let done_at = narrative
        .find(done)
        .unwrap_or_else(|| panic!("missing {done:?} in {narrative}"));
    let doing_at = narrative
        .find(doing)
        .unwrap_or_else(|| panic!("missing {doing:?} in {narrative}"));
    (done_at, doing_at)
}

#[tokio::test]
async fn test_technical_narrative_covers_completed_and_in_progress() {
    init_tracing();
    let report = StandupPipeline::rule_based(SynthesisConfig::default())
        .run(&snapshot())
        .await
        .unwrap();

    let (done, doing) = section_order(&report.narrative, "Completed:", "In progress:");
    assert!(done < doing, "{}", report.narrative);
    assert!(report.narrative.contains("DEV-1"));
    assert!(report.narrative.contains("DEV-2"));
    assert!(report.narrative.chars().count() <= 200);
    assert!(report.fallback.is_none());
    assert!(report.quality.narrative_issues.is_empty());
}

#[tokio::test]
async fn test_business_narrative_orders_sections_without_technology() {
    init_tracing();
    let config = SynthesisConfig::default().with_style(SummaryStyle::Business);
    let report = StandupPipeline::rule_based(config)
        .run(&snapshot())
        .await
        .unwrap();

    let (done, doing) = section_order(&report.narrative, "Delivered:", "Underway:");
    assert!(done < doing, "{}", report.narrative);
    assert!(report.narrative.contains("DEV-1"));
    assert!(report.narrative.contains("DEV-2"));
    let lower = report.narrative.to_lowercase();
    assert!(!lower.contains("terraform"), "{}", report.narrative);
    assert!(!lower.contains("aws"), "{}", report.narrative);
    assert!(report.fallback.is_none());
}

#[tokio::test]
async fn test_brief_narrative_orders_sections_without_keys() {
    init_tracing();
    let config = SynthesisConfig::default().with_style(SummaryStyle::Brief);
    let report = StandupPipeline::rule_based(config)
        .run(&snapshot())
        .await
        .unwrap();

    let (done, doing) = section_order(&report.narrative, "Done:", "Doing:");
    assert!(done < doing, "{}", report.narrative);
    assert!(!report.narrative.contains("DEV-"), "{}", report.narrative);
    assert!(!report.narrative.to_lowercase().contains("terraform"));
    assert!(report.fallback.is_none());
}

#[tokio::test]
async fn test_every_style_respects_max_length() {
    for style in [SummaryStyle::Technical, SummaryStyle::Business, SummaryStyle::Brief] {
        for max_length in [40, 80, 200] {
            let config = SynthesisConfig::default()
                .with_style(style)
                .with_max_length(max_length);
            let report = StandupPipeline::rule_based(config)
                .with_workers(2)
                .run(&snapshot())
                .await
                .unwrap();
            assert!(
                report.narrative.chars().count() <= max_length,
                "{style} at {max_length}: {}",
                report.narrative
            );
            assert!(!report.narrative.is_empty());
        }
    }
}

#[tokio::test]
async fn test_worklogs_without_issues_still_produce_a_narrative() {
    let snap = TrackerSnapshot::default()
        .with_worklogs(vec![WorklogEntry::new("OPS-4", "Fixed the nightly backup job")]);
    let report = StandupPipeline::rule_based(SynthesisConfig::default())
        .run(&snap)
        .await
        .unwrap();
    assert!(report.narrative.contains("OPS-4"));
}

#[tokio::test]
async fn test_empty_snapshot_reports_no_activity() {
    let report = StandupPipeline::rule_based(SynthesisConfig::default())
        .run(&TrackerSnapshot::default())
        .await
        .unwrap();
    assert_eq!(report.narrative, narrative::synth::NO_ACTIVITY);
    assert!(report.quality.score < 100);
}

#[test]
fn test_snapshot_loads_from_tracker_json() {
    let raw = r#"{
        "issues": [
            {
                "key": "DEV-1",
                "fields": {
                    "summary": "Deploy AWS Lambda using Terraform",
                    "status": {"name": "Done"},
                    "priority": {"name": "Critical"}
                }
            }
        ],
        "comments": {
            "DEV-1": [{"id": "1", "body": {"text": "Completed Terraform apply for production"}}]
        }
    }"#;
    let snap: TrackerSnapshot = serde_json::from_str(raw).unwrap();
    assert_eq!(snap.issues.len(), 1);
    assert_eq!(snap.issues[0].status_name(), "Done");
    assert_eq!(snap.issues[0].priority_name(), "Critical");
    assert_eq!(
        snap.comments["DEV-1"][0].text(),
        "Completed Terraform apply for production"
    );
    assert!(snap.worklogs.is_empty());
}
