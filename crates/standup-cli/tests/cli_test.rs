//! Config layering and end-to-end rendering through the CLI library.

use narrative::fallback::FallbackStrategy;
use narrative::{StandupPipeline, SummaryStyle};
use standup_cli::{load_snapshot, render_report, resolve_config_with, Overrides};
use std::io::Write;
use tempfile::NamedTempFile;

const EXPORT: &str = r#"{
    "issues": [
        {"key": "DEV-1", "fields": {"summary": "Deploy AWS Lambda using Terraform",
            "status": {"name": "Done"}, "priority": {"name": "Critical"}}},
        {"key": "DEV-2", "fields": {"summary": "Database migration for auth service",
            "status": {"name": "In Progress"}, "priority": {"name": "Medium"}}}
    ],
    "comments": {
        "DEV-1": [{"id": "1", "body": {"text": "Completed Terraform apply for production"}}],
        "DEV-2": [
            {"id": "2", "body": {"text": "Investigating database permission issue"}},
            {"id": "3", "body": {"text": "Merged PR for auth service"}}
        ]
    }
}"#;

fn temp_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn test_file_then_env_then_flags() {
    let file = temp_file(
        r#"
[synthesis]
style = "brief"
max_length = 150
fallback = "minimal"

[remote]
base_url = "http://gpu-box:11434"
model = "mistral"
"#,
    );
    let env = |key: &str| match key {
        "STANDUP_LLM_MODEL" => Some("llama3.2".to_string()),
        "STANDUP_MAX_LENGTH" => Some("120".to_string()),
        _ => None,
    };
    let overrides = Overrides {
        style: Some(SummaryStyle::Technical),
        ..Default::default()
    };

    let config = resolve_config_with(Some(file.path()), env, &overrides).unwrap();

    assert_eq!(config.synthesis.style, SummaryStyle::Technical);
    assert_eq!(config.synthesis.max_length, 120);
    assert_eq!(config.synthesis.fallback, FallbackStrategy::Minimal);
    assert_eq!(config.remote.base_url, "http://gpu-box:11434");
    assert_eq!(config.remote.model, "llama3.2");
}

#[test]
fn test_bad_environment_value_is_reported() {
    let env = |key: &str| (key == "STANDUP_FALLBACK").then(|| "sometimes".to_string());
    let err = resolve_config_with(None, env, &Overrides::default()).unwrap_err();
    assert!(format!("{err:#}").contains("STANDUP_"));
}

#[test]
fn test_missing_config_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("standup.toml");
    assert!(resolve_config_with(Some(&missing), |_| None, &Overrides::default()).is_err());
}

#[tokio::test]
async fn test_renders_text_and_json_reports() {
    let export = temp_file(EXPORT);
    let snapshot = load_snapshot(export.path()).unwrap();
    let config = resolve_config_with(None, |_| None, &Overrides::default()).unwrap();

    let report = StandupPipeline::rule_based(config.synthesis)
        .run(&snapshot)
        .await
        .unwrap();

    let text = render_report(&report, false).unwrap();
    let first_line = text.lines().next().unwrap();
    assert_eq!(first_line, report.narrative);
    assert!(text.contains("mode: rule_based"));
    assert!(text.contains("issues: 2"));

    let json = render_report(&report, true).unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["mode"], "rule_based");
    assert_eq!(value["style"], "technical");
    assert_eq!(value["narrative"], report.narrative.as_str());
    assert!(value.get("fallback").is_none());
}
