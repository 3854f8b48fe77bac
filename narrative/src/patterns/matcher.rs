//! Keyword pattern matcher
//!
//! Classifies free text into categorized technical signals. Each definition
//! whose keywords occur in the text emits one [`PatternMatch`]; definitions in
//! the same category emit independently and are not deduplicated here.

use super::library::{PatternCategory, PatternDefinition, PatternLibrary};
use crate::text::{ceil_char_boundary, floor_char_boundary};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::trace;

/// Bytes of surrounding text kept on each side of a keyword hit.
const CONTEXT_RADIUS: usize = 60;

/// Confidence added for every keyword hit beyond the first.
const EXTRA_KEYWORD_BOOST: f64 = 0.1;

/// A single definition hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternMatch {
    /// Name of the [`PatternDefinition`] that fired
    pub pattern_name: String,
    pub category: PatternCategory,
    pub subcategory: String,
    /// First keyword (in definition order) found in the text
    pub keyword: String,
    /// Match strength in [0, 1]
    pub confidence: f64,
    /// Text surrounding the keyword
    pub context: String,
    /// Byte offset of the keyword in the lowercased text
    pub position: usize,
    pub timestamp: DateTime<Utc>,
}

/// Infrastructure signal with resolved action, component and status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InfrastructurePattern {
    pub pattern_type: String,
    pub action: String,
    pub component: String,
    pub status: String,
    pub confidence: f64,
    pub context: String,
    pub timestamp: DateTime<Utc>,
}

/// Deployment signal with resolved action, environment and status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentPattern {
    pub pattern_type: String,
    pub action: String,
    pub environment: String,
    pub status: String,
    pub confidence: f64,
    pub context: String,
    pub timestamp: DateTime<Utc>,
}

/// Development signal with resolved action, component and status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DevelopmentPattern {
    pub pattern_type: String,
    pub action: String,
    pub component: String,
    pub status: String,
    pub confidence: f64,
    pub context: String,
    pub timestamp: DateTime<Utc>,
}

/// Every category's matches for one text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatternMatchSet {
    pub infrastructure: Vec<InfrastructurePattern>,
    pub deployment: Vec<DeploymentPattern>,
    pub development: Vec<DevelopmentPattern>,
    pub database: Vec<PatternMatch>,
    pub security: Vec<PatternMatch>,
    pub testing: Vec<PatternMatch>,
    /// Mean confidence over all matches, 0.0 when there are none
    pub overall_confidence: f64,
    pub total_matches: usize,
}

impl PatternMatchSet {
    pub fn is_empty(&self) -> bool {
        self.total_matches == 0
    }

    /// Number of matches in one category.
    pub fn count(&self, category: PatternCategory) -> usize {
        match category {
            PatternCategory::Infrastructure => self.infrastructure.len(),
            PatternCategory::Deployment => self.deployment.len(),
            PatternCategory::Development => self.development.len(),
            PatternCategory::Database => self.database.len(),
            PatternCategory::Security => self.security.len(),
            PatternCategory::Testing => self.testing.len(),
        }
    }
}

/// Text classifier over an injected, immutable [`PatternLibrary`].
#[derive(Debug, Clone)]
pub struct PatternMatcher {
    library: Arc<PatternLibrary>,
}

impl PatternMatcher {
    pub fn new(library: Arc<PatternLibrary>) -> Self {
        Self { library }
    }

    pub fn library(&self) -> &PatternLibrary {
        &self.library
    }

    /// Raw matches for one category.
    pub fn match_category(&self, text: &str, category: PatternCategory) -> Vec<PatternMatch> {
        let lower = text.to_lowercase();
        if lower.trim().is_empty() {
            return Vec::new();
        }
        self.library
            .definitions_for(category)
            .filter_map(|def| self.match_definition(def, text, &lower))
            .collect()
    }

    fn match_definition(
        &self,
        def: &PatternDefinition,
        text: &str,
        lower: &str,
    ) -> Option<PatternMatch> {
        let hits: Vec<(&str, usize)> = def
            .keywords
            .iter()
            .filter_map(|k| lower.find(k.as_str()).map(|pos| (k.as_str(), pos)))
            .collect();
        let (keyword, position) = *hits.first()?;

        let confidence = Self::confidence(def, lower, hits.len());
        trace!(pattern = %def.name, keyword, confidence, "pattern hit");

        Some(PatternMatch {
            pattern_name: def.name.clone(),
            category: def.category,
            subcategory: def.subcategory.clone(),
            keyword: keyword.to_string(),
            confidence,
            context: context_window(text, lower, position, keyword.len()),
            position,
            timestamp: Utc::now(),
        })
    }

    /// `base + Σ present modifier boosts + 0.1 × (keyword hits − 1)`, clamped to [0, 1].
    fn confidence(def: &PatternDefinition, lower: &str, keyword_hits: usize) -> f64 {
        let boost: f64 = def
            .modifiers
            .iter()
            .filter(|m| lower.contains(m.keyword.as_str()))
            .map(|m| m.boost)
            .sum();
        let extra = EXTRA_KEYWORD_BOOST * (keyword_hits.saturating_sub(1) as f64);
        (def.base_score + boost + extra).clamp(0.0, 1.0)
    }

    pub fn match_infrastructure_patterns(&self, text: &str) -> Vec<InfrastructurePattern> {
        self.match_category(text, PatternCategory::Infrastructure)
            .into_iter()
            .map(|m| {
                let ctx = m.context.to_lowercase();
                InfrastructurePattern {
                    action: self.resolve_action(&ctx),
                    component: self
                        .library
                        .components
                        .resolve(&ctx)
                        .unwrap_or(&m.subcategory)
                        .to_string(),
                    status: self.resolve_status(&ctx),
                    pattern_type: m.subcategory,
                    confidence: m.confidence,
                    context: m.context,
                    timestamp: m.timestamp,
                }
            })
            .collect()
    }

    pub fn match_deployment_patterns(&self, text: &str) -> Vec<DeploymentPattern> {
        self.match_category(text, PatternCategory::Deployment)
            .into_iter()
            .map(|m| {
                let ctx = m.context.to_lowercase();
                DeploymentPattern {
                    action: self.resolve_action(&ctx),
                    environment: self
                        .library
                        .environments
                        .resolve(&ctx)
                        .unwrap_or("unspecified")
                        .to_string(),
                    status: self.resolve_status(&ctx),
                    pattern_type: m.subcategory,
                    confidence: m.confidence,
                    context: m.context,
                    timestamp: m.timestamp,
                }
            })
            .collect()
    }

    pub fn match_development_patterns(&self, text: &str) -> Vec<DevelopmentPattern> {
        self.match_category(text, PatternCategory::Development)
            .into_iter()
            .map(|m| {
                let ctx = m.context.to_lowercase();
                DevelopmentPattern {
                    action: self.resolve_action(&ctx),
                    component: self
                        .library
                        .components
                        .resolve(&ctx)
                        .unwrap_or("codebase")
                        .to_string(),
                    status: self.resolve_status(&ctx),
                    pattern_type: m.subcategory,
                    confidence: m.confidence,
                    context: m.context,
                    timestamp: m.timestamp,
                }
            })
            .collect()
    }

    /// Run every category over `text`.
    pub fn match_all_patterns(&self, text: &str) -> PatternMatchSet {
        let mut set = PatternMatchSet {
            infrastructure: self.match_infrastructure_patterns(text),
            deployment: self.match_deployment_patterns(text),
            development: self.match_development_patterns(text),
            database: self.match_category(text, PatternCategory::Database),
            security: self.match_category(text, PatternCategory::Security),
            testing: self.match_category(text, PatternCategory::Testing),
            overall_confidence: 0.0,
            total_matches: 0,
        };

        let confidences: Vec<f64> = set
            .infrastructure
            .iter()
            .map(|p| p.confidence)
            .chain(set.deployment.iter().map(|p| p.confidence))
            .chain(set.development.iter().map(|p| p.confidence))
            .chain(set.database.iter().map(|p| p.confidence))
            .chain(set.security.iter().map(|p| p.confidence))
            .chain(set.testing.iter().map(|p| p.confidence))
            .collect();

        set.total_matches = confidences.len();
        if !confidences.is_empty() {
            set.overall_confidence = confidences.iter().sum::<f64>() / confidences.len() as f64;
        }
        set
    }

    fn resolve_action(&self, ctx_lower: &str) -> String {
        self.library
            .actions
            .resolve(ctx_lower)
            .unwrap_or("work")
            .to_string()
    }

    fn resolve_status(&self, ctx_lower: &str) -> String {
        self.library
            .statuses
            .resolve(ctx_lower)
            .unwrap_or("unknown")
            .to_string()
    }
}

impl Default for PatternMatcher {
    fn default() -> Self {
        Self::new(PatternLibrary::shared())
    }
}

/// Slice of text around a keyword hit at `position` in `lower`.
///
/// Byte offsets from the lowercased text only line up with the original when
/// lowercasing preserved the length; otherwise the lowercased text is used.
fn context_window(text: &str, lower: &str, position: usize, keyword_len: usize) -> String {
    let source = if lower.len() == text.len() { text } else { lower };
    let start = floor_char_boundary(source, position.saturating_sub(CONTEXT_RADIUS));
    let end = ceil_char_boundary(source, position + keyword_len + CONTEXT_RADIUS);
    source[start..end].trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher() -> PatternMatcher {
        PatternMatcher::default()
    }

    #[test]
    fn test_empty_and_whitespace_yield_nothing() {
        let m = matcher();
        for text in ["", "   ", "\n\t"] {
            let set = m.match_all_patterns(text);
            assert!(set.is_empty());
            assert_eq!(set.overall_confidence, 0.0);
            for category in PatternCategory::ALL {
                assert_eq!(set.count(category), 0);
            }
        }
    }

    #[test]
    fn test_no_keyword_text_yields_nothing() {
        let set = matcher().match_all_patterns("Had a nice lunch with the team");
        assert_eq!(set.total_matches, 0);
    }

    #[test]
    fn test_terraform_apply_confidence_capped() {
        let patterns = matcher().match_infrastructure_patterns("Ran terraform apply on the cluster");
        let tf = patterns
            .iter()
            .find(|p| p.pattern_type == "terraform")
            .expect("terraform match");
        // 0.9 base + 0.15 "apply" modifier, capped
        assert_eq!(tf.confidence, (0.9_f64 + 0.15).min(1.0));
        assert_eq!(tf.confidence, 1.0);
        assert_eq!(tf.action, "apply");
    }

    #[test]
    fn test_extra_keyword_hits_add_confidence() {
        let matches =
            matcher().match_category("Moved the aws lambda to arm64", PatternCategory::Infrastructure);
        let aws = matches.iter().find(|m| m.subcategory == "aws").unwrap();
        // two keyword hits ("aws", "lambda"), no modifiers
        assert_eq!(aws.keyword, "aws");
        assert_eq!(aws.confidence, 0.8 + 0.1 * (2.0 - 1.0));
    }

    #[test]
    fn test_single_hit_uses_base_score() {
        let matches = matcher().match_category("Tuning grafana panels", PatternCategory::Infrastructure);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].confidence, 0.7);
        assert_eq!(matches[0].position, "tuning ".len());
    }

    #[test]
    fn test_confidence_always_bounded() {
        let text = "Critical production hotfix: rolled back deploy, terraform apply plan state module, \
                    aws lambda ec2 rds eks, kubernetes k8s helm docker, database migration, \
                    vulnerability cve exploit, unit test e2e load test";
        let set = matcher().match_all_patterns(text);
        assert!(set.total_matches > 10);
        let all = set
            .infrastructure
            .iter()
            .map(|p| p.confidence)
            .chain(set.deployment.iter().map(|p| p.confidence))
            .chain(set.development.iter().map(|p| p.confidence))
            .chain(set.database.iter().map(|p| p.confidence))
            .chain(set.security.iter().map(|p| p.confidence))
            .chain(set.testing.iter().map(|p| p.confidence));
        for confidence in all {
            assert!((0.0..=1.0).contains(&confidence));
        }
        assert!((0.0..=1.0).contains(&set.overall_confidence));
    }

    #[test]
    fn test_multiple_definitions_emit_independently() {
        // deployment_activity ("deploy") and rollback ("rolled back") both fire
        let patterns = matcher().match_deployment_patterns("Rolled back the deploy on staging");
        let types: Vec<_> = patterns.iter().map(|p| p.pattern_type.as_str()).collect();
        assert_eq!(types, vec!["deployment", "rollback"]);
        assert!(patterns.iter().all(|p| p.environment == "staging"));
    }

    #[test]
    fn test_deployment_environment_and_status() {
        let patterns = matcher().match_deployment_patterns("Deployed release 4.2 to production");
        let deploy = &patterns[0];
        assert_eq!(deploy.environment, "production");
        assert_eq!(deploy.status, "completed");
        assert_eq!(deploy.action, "deploy");
    }

    #[test]
    fn test_development_component_resolution() {
        let patterns = matcher().match_development_patterns("Merged PR for auth service");
        let review = patterns
            .iter()
            .find(|p| p.pattern_type == "code_review")
            .unwrap();
        assert_eq!(review.component, "auth");
        assert_eq!(review.action, "merge");
        assert_eq!(review.status, "completed");
    }

    #[test]
    fn test_overall_confidence_is_mean() {
        let set = matcher().match_all_patterns("Tuning grafana panels and the postgres database");
        let sum: f64 = set.infrastructure.iter().map(|p| p.confidence).sum::<f64>()
            + set.database.iter().map(|p| p.confidence).sum::<f64>();
        assert_eq!(set.total_matches, 2);
        assert!((set.overall_confidence - sum / 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_context_window_handles_multibyte_text() {
        let text = "Größere Änderung: terraform apply für die Umgebung";
        let matches = matcher().match_category(text, PatternCategory::Infrastructure);
        assert!(!matches.is_empty());
        assert!(matches[0].context.contains("terraform"));
    }

    #[test]
    fn test_injected_library_is_used() {
        let library = PatternLibrary {
            definitions: vec![PatternDefinition::new("pager", PatternCategory::Infrastructure, "oncall", 0.5)
                .keywords(&["pager"])],
            ..PatternLibrary::builtin()
        };
        let m = PatternMatcher::new(Arc::new(library));
        assert_eq!(m.match_infrastructure_patterns("pager went off").len(), 1);
        assert!(m.match_infrastructure_patterns("terraform apply").is_empty());
    }
}
