//! Key-point extraction cascade
//!
//! A comment or issue text is run through seven extractors in fixed order;
//! the first one that produces a phrase wins:
//!
//! ```text
//! 1. technical activity      "Merged PR for auth service", "Configured VPC networking"
//! 2. development activity    "Added unit tests", "Fixed login redirect"
//! 3. infra / deployment      "Completed Terraform apply in production"
//! 4. progress indicator      "Working on the export job"
//! 5. action sentence         first sentence with a known action verb
//! 6. topic fallback          "Work on database, security"
//! 7. raw truncation          first 60 characters
//! ```
//!
//! With `technical == false` technology names are scrubbed from captured
//! objects and raw text, and the infrastructure stage uses plain-language
//! subjects.

use crate::aggregate::Vocabulary;
use crate::patterns::PatternLibrary;
use crate::text::{capitalize_first, contains_term, contains_word_prefix, sentences, truncate_to_length};
use regex::Regex;
use std::sync::LazyLock;

const OBJECT_LIMIT: usize = 50;
const SENTENCE_LIMIT: usize = 80;
const RAW_LIMIT: usize = 60;

/// Plain-language stand-in when scrubbing leaves nothing.
const PLAIN_PLACEHOLDER: &str = "General progress";

/// Which extractor produced a key point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExtractorStage {
    TechnicalActivity,
    DevelopmentActivity,
    InfrastructureDeployment,
    ProgressIndicator,
    ActionSentence,
    TopicFallback,
    RawTruncation,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPoint {
    pub stage: ExtractorStage,
    pub text: String,
}

/// Tables and register for one cascade run.
#[derive(Debug, Clone, Copy)]
pub struct ExtractionContext<'a> {
    pub vocabulary: &'a Vocabulary,
    pub patterns: &'a PatternLibrary,
    /// Keep technology names and environments
    pub technical: bool,
}

/// Run the cascade against the built-in tables.
pub fn extract_key_point(text: &str, technical: bool) -> Option<KeyPoint> {
    let patterns = PatternLibrary::shared();
    let cx = ExtractionContext {
        vocabulary: Vocabulary::builtin(),
        patterns: &patterns,
        technical,
    };
    extract_key_point_with(&cx, text)
}

/// Run the cascade. `None` only for blank input.
pub fn extract_key_point_with(cx: &ExtractionContext<'_>, text: &str) -> Option<KeyPoint> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    let lower = text.to_lowercase();

    type Stage = fn(&ExtractionContext<'_>, &str, &str) -> Option<String>;
    const STAGES: [(ExtractorStage, Stage); 7] = [
        (ExtractorStage::TechnicalActivity, technical_activity),
        (ExtractorStage::DevelopmentActivity, development_activity),
        (ExtractorStage::InfrastructureDeployment, infrastructure_activity),
        (ExtractorStage::ProgressIndicator, progress_indicator),
        (ExtractorStage::ActionSentence, action_sentence),
        (ExtractorStage::TopicFallback, topic_fallback),
        (ExtractorStage::RawTruncation, raw_truncation),
    ];

    STAGES.iter().find_map(|(stage, extract)| {
        extract(cx, text, &lower)
            .filter(|phrase| !phrase.trim().is_empty())
            .map(|phrase| KeyPoint {
                stage: *stage,
                text: phrase,
            })
    })
}

// ============================================================================
// Stage 1: technical activity
// ============================================================================

static MERGED_PR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\bmerged\s+(?:the\s+|a\s+)?(?:pr|pull\s+request)\b(?:\s*#?\d+)?(?:\s+(?:for|to|on|into)\s+(?P<obj>[^.,;!?\n]+))?",
    )
    .expect("MERGED_PR regex should compile")
});

static CONFIGURED_NETWORK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:configured|configuring|set\s+up)\s+(?:(?:the|a|new)\s+)*(?P<component>vpc|security\s+groups?|load\s+balancers?|iam)\b",
    )
    .expect("CONFIGURED_NETWORK regex should compile")
});

static SET_UP_MONITORING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bset\s+up\s+(?:(?:the|new|some)\s+)*(?:monitoring|alerting|alerts|dashboards?)\b")
        .expect("SET_UP_MONITORING regex should compile")
});

fn technical_activity(cx: &ExtractionContext<'_>, text: &str, lower: &str) -> Option<String> {
    if let Some(caps) = MERGED_PR.captures(text) {
        let target = caps
            .name("obj")
            .map(|m| clean_object(cx, m.as_str()))
            .filter(|t| !t.is_empty());
        return Some(match (target, cx.technical) {
            (Some(t), true) => format!("Merged PR for {t}"),
            (Some(t), false) => format!("Merged changes for {t}"),
            (None, true) => "Merged PR".to_string(),
            (None, false) => "Merged code changes".to_string(),
        });
    }

    if let Some(caps) = CONFIGURED_NETWORK.captures(text) {
        let component = caps["component"].to_lowercase();
        let (tech, plain) = if component.starts_with("vpc") {
            ("Configured VPC networking", "Configured network isolation")
        } else if component.starts_with("security") {
            ("Configured security groups", "Configured network access rules")
        } else if component.starts_with("load") {
            ("Configured load balancer", "Configured traffic routing")
        } else {
            ("Configured IAM permissions", "Configured access permissions")
        };
        return Some(if cx.technical { tech } else { plain }.to_string());
    }

    if SET_UP_MONITORING.is_match(text) {
        return Some(match (cx.technical, contains_word_prefix(lower, "alert")) {
            (true, true) => "Set up monitoring and alerting".to_string(),
            (true, false) => "Set up monitoring".to_string(),
            (false, _) => "Set up service monitoring".to_string(),
        });
    }
    None
}

// ============================================================================
// Stage 2: development activity
// ============================================================================

static TESTS_ADDED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:added|wrote|adding|writing)\s+(?:(?:some|more|new)\s+)?(?:(?P<kind>unit|integration|e2e|end-to-end|load|regression)\s+)?tests?\b(?:\s+(?:for|to|on)\s+(?P<obj>[^.,;!?\n]+))?",
    )
    .expect("TESTS_ADDED regex should compile")
});

static TESTS_PASSING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\btests?\s+(?:are\s+|now\s+)*(?:passed|passing|pass|green)\b")
        .expect("TESTS_PASSING regex should compile")
});

static FIXED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:fixed|resolved)\s+(?P<obj>[^.,;!?\n]+)").expect("FIXED regex should compile")
});

static IMPLEMENTED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bimplemented\s+(?P<obj>[^.,;!?\n]+)")
        .expect("IMPLEMENTED regex should compile")
});

static REFACTORED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\brefactored\s+(?P<obj>[^.,;!?\n]+)")
        .expect("REFACTORED regex should compile")
});

fn development_activity(cx: &ExtractionContext<'_>, text: &str, _lower: &str) -> Option<String> {
    if let Some(caps) = TESTS_ADDED.captures(text) {
        let mut phrase = match caps.name("kind") {
            Some(kind) => format!("Added {} tests", kind.as_str().to_lowercase()),
            None => "Added tests".to_string(),
        };
        if let Some(obj) = caps.name("obj").map(|m| clean_object(cx, m.as_str())) {
            if !obj.is_empty() {
                phrase.push_str(" for ");
                phrase.push_str(&obj);
            }
        }
        return Some(phrase);
    }
    if TESTS_PASSING.is_match(text) {
        return Some("Tests passing".to_string());
    }

    let rules: [(&Regex, &str, &str); 3] = [
        (&*FIXED, "Fixed", "Fixed a bug"),
        (&*IMPLEMENTED, "Implemented", "Implemented new functionality"),
        (&*REFACTORED, "Refactored", "Refactored existing code"),
    ];
    rules.iter().find_map(|(re, verb, bare)| {
        let caps = re.captures(text)?;
        let obj = clean_object(cx, &caps["obj"]);
        Some(if obj.is_empty() {
            bare.to_string()
        } else {
            format!("{verb} {obj}")
        })
    })
}

// ============================================================================
// Stage 3: infrastructure / deployment
// ============================================================================

struct InfraRule {
    triggers: &'static [&'static str],
    /// `(qualifier, technical subject, plain subject)`; empty qualifier always matches
    subjects: &'static [(&'static str, &'static str, &'static str)],
}

const INFRA_RULES: &[InfraRule] = &[
    InfraRule {
        triggers: &["terraform"],
        subjects: &[
            ("apply", "Terraform apply", "infrastructure rollout"),
            ("plan", "Terraform plan", "infrastructure plan"),
            ("", "Terraform infrastructure", "infrastructure changes"),
        ],
    },
    InfraRule {
        triggers: &["database", "migration", "schema", "postgres", "mysql"],
        subjects: &[
            ("permission", "database permissions", "data access permissions"),
            ("migration", "database migration", "data migration"),
            ("schema", "database schema", "data model changes"),
            ("", "database changes", "data changes"),
        ],
    },
    InfraRule {
        triggers: &["aws", "lambda", "ec2", "s3"],
        subjects: &[
            ("lambda", "AWS Lambda", "serverless functions"),
            ("", "AWS resources", "cloud resources"),
        ],
    },
    InfraRule {
        triggers: &["vpc", "subnet"],
        subjects: &[("", "VPC networking", "network configuration")],
    },
    InfraRule {
        triggers: &["kubernetes", "k8s", "helm"],
        subjects: &[("", "Kubernetes deployment", "service deployment")],
    },
    InfraRule {
        triggers: &["ci/cd", "pipeline", "jenkins", "github actions"],
        subjects: &[("", "CI/CD pipeline", "delivery pipeline")],
    },
];

/// Progress verbs, whole-term, in priority order.
const PROGRESS_VERBS: &[(&str, &str)] = &[
    ("completed", "Completed"),
    ("finished", "Finished"),
    ("applied", "Applied"),
    ("deployed", "Deployed"),
    ("migrated", "Migrated"),
    ("configured", "Configured"),
    ("updated", "Updated"),
    ("investigating", "Investigating"),
    ("debugging", "Debugging"),
    ("working on", "Working on"),
    ("started", "Started"),
    ("blocked", "Blocked on"),
];

fn infrastructure_activity(cx: &ExtractionContext<'_>, _text: &str, lower: &str) -> Option<String> {
    let rule = INFRA_RULES
        .iter()
        .find(|r| r.triggers.iter().any(|t| contains_word_prefix(lower, t)))?;
    let (_, tech, plain) = rule
        .subjects
        .iter()
        .find(|(q, _, _)| q.is_empty() || contains_word_prefix(lower, q))?;
    let subject = if cx.technical { *tech } else { *plain };

    let environment = if cx.technical {
        cx.patterns
            .environments
            .resolve(lower)
            .map(|env| format!(" in {env}"))
            .unwrap_or_default()
    } else {
        String::new()
    };

    let verb = PROGRESS_VERBS
        .iter()
        .find(|(term, _)| contains_term(lower, term))
        .map(|(_, display)| *display);

    Some(match verb {
        Some(verb) => format!("{verb} {subject}{environment}"),
        None => format!("{}{environment}", capitalize_first(subject)),
    })
}

// ============================================================================
// Stage 4: progress indicator
// ============================================================================

static PROGRESS_INDICATOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?P<verb>completed|implemented|fixed|tested|deployed|investigating|working\s+on|updated|blocked\s+(?:on|by)|reviewed)\s+(?P<obj>[^.,;!?\n]+)",
    )
    .expect("PROGRESS_INDICATOR regex should compile")
});

fn progress_indicator(cx: &ExtractionContext<'_>, text: &str, _lower: &str) -> Option<String> {
    let caps = PROGRESS_INDICATOR.captures(text)?;
    let verb = caps["verb"]
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    let obj = clean_object(cx, &caps["obj"]);
    if obj.is_empty() {
        return None;
    }
    Some(format!("{} {obj}", capitalize_first(&verb)))
}

// ============================================================================
// Stages 5-7: sentence, topic, raw
// ============================================================================

fn action_sentence(cx: &ExtractionContext<'_>, text: &str, _lower: &str) -> Option<String> {
    let verbs = cx.vocabulary.action_verbs;
    let sentence = sentences(text).find(|s| {
        let lower = s.to_lowercase();
        verbs.iter().any(|v| contains_term(&lower, v))
    })?;
    let sentence = if cx.technical {
        sentence.to_string()
    } else {
        scrub_technical(cx.vocabulary, sentence)
    };
    Some(capitalize_first(&truncate_to_length(&sentence, SENTENCE_LIMIT)))
}

fn topic_fallback(cx: &ExtractionContext<'_>, _text: &str, lower: &str) -> Option<String> {
    let topics = cx.vocabulary.topics_in(lower);
    if topics.is_empty() {
        return None;
    }
    let shown: Vec<&str> = topics.iter().take(2).map(String::as_str).collect();
    Some(format!("Work on {}", shown.join(", ")))
}

fn raw_truncation(cx: &ExtractionContext<'_>, text: &str, _lower: &str) -> Option<String> {
    if cx.technical {
        let out = truncate_to_length(text, RAW_LIMIT);
        return (!out.is_empty()).then_some(out);
    }
    let scrubbed = scrub_technical(cx.vocabulary, text);
    let out = truncate_to_length(&scrubbed, RAW_LIMIT);
    if out.trim_matches(|c: char| !c.is_alphanumeric()).is_empty() {
        return Some(PLAIN_PLACEHOLDER.to_string());
    }
    Some(out)
}

// ============================================================================
// Helpers
// ============================================================================

/// Tidy a captured object phrase: drop a leading article, optionally scrub
/// technology names, bound the length.
fn clean_object(cx: &ExtractionContext<'_>, raw: &str) -> String {
    let mut obj = raw.trim();
    for article in ["the ", "a ", "an "] {
        let is_article = obj
            .get(..article.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(article));
        if is_article && obj.len() > article.len() {
            obj = obj[article.len()..].trim_start();
            break;
        }
    }
    let obj = if cx.technical {
        obj.to_string()
    } else {
        scrub_technical(cx.vocabulary, obj)
    };
    truncate_to_length(&obj, OBJECT_LIMIT)
}

/// Remove single-word technology names listed in `vocabulary`.
pub fn scrub_technical(vocabulary: &Vocabulary, text: &str) -> String {
    let terms = vocabulary.technical_terms;
    text.split_whitespace()
        .filter(|word| {
            let bare = word
                .trim_matches(|c: char| !c.is_alphanumeric() && c != '/')
                .to_lowercase();
            !terms.contains(&bare.as_str())
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(text: &str) -> KeyPoint {
        extract_key_point(text, true).unwrap()
    }

    fn plain(text: &str) -> String {
        extract_key_point(text, false).unwrap().text
    }

    #[test]
    fn test_blank_input_yields_nothing() {
        assert!(extract_key_point("", true).is_none());
        assert!(extract_key_point("   \n", true).is_none());
    }

    #[test]
    fn test_merged_pr() {
        let kp = point("Merged PR for auth service");
        assert_eq!(kp.stage, ExtractorStage::TechnicalActivity);
        assert_eq!(kp.text, "Merged PR for auth service");
        assert_eq!(point("merged the pull request #42").text, "Merged PR");
        assert_eq!(plain("Merged PR for auth service"), "Merged changes for auth service");
    }

    #[test]
    fn test_configuration_sub_cases() {
        assert_eq!(point("Configured the VPC peering").text, "Configured VPC networking");
        assert_eq!(point("configured security groups for ssh").text, "Configured security groups");
        assert_eq!(plain("Configured IAM roles"), "Configured access permissions");
        assert_eq!(point("Set up alerting dashboards").text, "Set up monitoring and alerting");
    }

    #[test]
    fn test_development_activity() {
        let kp = point("Added unit tests for the parser");
        assert_eq!(kp.stage, ExtractorStage::DevelopmentActivity);
        assert_eq!(kp.text, "Added unit tests for parser");
        assert_eq!(point("Fixed the login redirect loop").text, "Fixed login redirect loop");
        assert_eq!(point("All tests passing now").text, "Tests passing");
        assert_eq!(point("Refactored the retry helper").text, "Refactored retry helper");
    }

    #[test]
    fn test_infrastructure_with_verb_and_environment() {
        let kp = point("Completed Terraform apply for production");
        assert_eq!(kp.stage, ExtractorStage::InfrastructureDeployment);
        assert_eq!(kp.text, "Completed Terraform apply in production");
        assert_eq!(plain("Completed Terraform apply for production"), "Completed infrastructure rollout");
    }

    #[test]
    fn test_infrastructure_rule_order() {
        assert_eq!(
            point("Investigating database permission issue").text,
            "Investigating database permissions"
        );
        assert_eq!(point("Database migration for auth service").text, "Database migration");
        assert_eq!(point("Deploy AWS Lambda using Terraform").text, "Terraform infrastructure");
        assert_eq!(point("new k8s cluster").text, "Kubernetes deployment");
    }

    #[test]
    fn test_progress_indicator() {
        let kp = point("Working on the export job");
        assert_eq!(kp.stage, ExtractorStage::ProgressIndicator);
        assert_eq!(kp.text, "Working on export job");
    }

    #[test]
    fn test_action_sentence() {
        let kp = point("Quick note. Merged upstream changes, all good.");
        assert_eq!(kp.stage, ExtractorStage::ActionSentence);
        assert_eq!(kp.text, "Merged upstream changes, all good");
    }

    #[test]
    fn test_topic_and_raw_fallbacks() {
        let kp = point("Some thoughts about security and performance");
        assert_eq!(kp.stage, ExtractorStage::TopicFallback);
        assert_eq!(kp.text, "Work on security, performance");

        let kp = point("Sync with design about the onboarding copy and next quarter goals");
        assert_eq!(kp.stage, ExtractorStage::RawTruncation);
        assert!(kp.text.chars().count() <= RAW_LIMIT);
    }

    #[test]
    fn test_raw_truncation_scrubs_plain_text() {
        let kp = extract_key_point("Pairing session on graphql with Sam", false).unwrap();
        assert_eq!(kp.stage, ExtractorStage::RawTruncation);
        assert_eq!(kp.text, "Pairing session on with Sam");

        let kp = extract_key_point("graphql", false).unwrap();
        assert_eq!(kp.stage, ExtractorStage::RawTruncation);
        assert_eq!(kp.text, PLAIN_PLACEHOLDER);

        assert_eq!(
            point("Pairing session on graphql with Sam").text,
            "Pairing session on graphql with Sam"
        );
    }

    #[test]
    fn test_context_vocabulary_drives_stages() {
        let pairing = Vocabulary {
            action_verbs: &["pairing"],
            ..Vocabulary::builtin().clone()
        };
        let patterns = PatternLibrary::shared();
        let cx = ExtractionContext {
            vocabulary: &pairing,
            patterns: &patterns,
            technical: true,
        };
        let kp = extract_key_point_with(&cx, "Pairing session on graphql with Sam").unwrap();
        assert_eq!(kp.stage, ExtractorStage::ActionSentence);
    }

    #[test]
    fn test_scrub_technical() {
        assert_eq!(
            scrub_technical(Vocabulary::builtin(), "the Terraform module for aws"),
            "the module for"
        );
    }
}
