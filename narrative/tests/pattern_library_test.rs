//! Loading replacement pattern libraries from disk and injecting them into
//! the rule-based synthesizer.

use narrative::patterns::{LookupTable, PatternLibrary};
use narrative::{Comment, ErrorKind, RuleBasedSynthesizer};
use std::io::Write;
use std::sync::Arc;
use tempfile::NamedTempFile;

fn library_file(library: &PatternLibrary) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(toml::to_string(library).unwrap().as_bytes())
        .unwrap();
    file
}

#[test]
fn test_load_library_from_file() {
    let file = library_file(&PatternLibrary::builtin());
    let loaded = PatternLibrary::load(file.path()).unwrap();
    assert_eq!(loaded, PatternLibrary::builtin());
}

#[test]
fn test_load_rejects_missing_and_invalid_files() {
    let dir = tempfile::tempdir().unwrap();
    let err = PatternLibrary::load(&dir.path().join("patterns.toml")).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Configuration);

    let mut file = NamedTempFile::new().unwrap();
    file.write_all(b"version = 3").unwrap();
    let err = PatternLibrary::load(file.path()).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Configuration);
    assert!(err.detail("path").is_some());
}

#[test]
fn test_loaded_environments_reach_synthesis() {
    let mut library = PatternLibrary::builtin();
    library.environments = LookupTable::from_pairs(&[("sandbox", "sandbox")]);
    let file = library_file(&library);
    let loaded = Arc::new(PatternLibrary::load(file.path()).unwrap());

    let thread = vec![Comment::new("1", "Completed Terraform apply for sandbox")];

    let builtin = RuleBasedSynthesizer::default().summarize_comments(&thread);
    assert!(!builtin.contains("sandbox"), "{builtin}");

    let custom = RuleBasedSynthesizer::default()
        .with_patterns(loaded)
        .summarize_comments(&thread);
    assert!(custom.contains("in sandbox"), "{custom}");
}
