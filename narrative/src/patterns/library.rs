//! Pattern library: versioned, ordered classification tables
//!
//! Definitions are evaluated in the order they appear, and every secondary
//! lookup table resolves first-match-in-priority-order, so classification is
//! reproducible across runs. The built-in library is constructed once and
//! shared behind an `Arc`; alternative libraries (localized keyword sets,
//! test fixtures) load from TOML and are injected into the matcher.

use crate::error::{NarrativeError, NarrativeResult};
use crate::text::contains_term;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, LazyLock};

/// Version tag of the built-in tables.
pub const BUILTIN_LIBRARY_VERSION: &str = "2024.1";

/// Signal categories a text span can be classified into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternCategory {
    Infrastructure,
    Deployment,
    Development,
    Database,
    Security,
    Testing,
}

impl PatternCategory {
    /// All categories in evaluation order.
    pub const ALL: [PatternCategory; 6] = [
        Self::Infrastructure,
        Self::Deployment,
        Self::Development,
        Self::Database,
        Self::Security,
        Self::Testing,
    ];
}

impl std::fmt::Display for PatternCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Infrastructure => write!(f, "infrastructure"),
            Self::Deployment => write!(f, "deployment"),
            Self::Development => write!(f, "development"),
            Self::Database => write!(f, "database"),
            Self::Security => write!(f, "security"),
            Self::Testing => write!(f, "testing"),
        }
    }
}

/// Score boost applied when `keyword` appears anywhere in the text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Modifier {
    pub keyword: String,
    pub boost: f64,
}

/// A named keyword rule for one category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternDefinition {
    pub name: String,
    pub category: PatternCategory,
    pub subcategory: String,
    /// Lowercase keywords, tested by substring containment.
    pub keywords: Vec<String>,
    pub base_score: f64,
    #[serde(default)]
    pub examples: Vec<String>,
    #[serde(default)]
    pub modifiers: Vec<Modifier>,
}

impl PatternDefinition {
    pub fn new(
        name: &str,
        category: PatternCategory,
        subcategory: &str,
        base_score: f64,
    ) -> Self {
        Self {
            name: name.to_string(),
            category,
            subcategory: subcategory.to_string(),
            keywords: Vec::new(),
            base_score,
            examples: Vec::new(),
            modifiers: Vec::new(),
        }
    }

    pub fn keywords(mut self, keywords: &[&str]) -> Self {
        self.keywords
            .extend(keywords.iter().map(|k| k.to_lowercase()));
        self
    }

    pub fn modifier(mut self, keyword: &str, boost: f64) -> Self {
        self.modifiers.push(Modifier {
            keyword: keyword.to_lowercase(),
            boost,
        });
        self
    }

    pub fn examples(mut self, examples: &[&str]) -> Self {
        self.examples.extend(examples.iter().map(|e| e.to_string()));
        self
    }

    fn validate(&self) -> NarrativeResult<()> {
        if self.name.trim().is_empty() {
            return Err(NarrativeError::configuration("pattern definition has no name"));
        }
        if self.keywords.is_empty() || self.keywords.iter().any(|k| k.trim().is_empty()) {
            return Err(NarrativeError::configuration(format!(
                "pattern '{}' needs at least one non-empty keyword",
                self.name
            )));
        }
        if !(0.0..=1.0).contains(&self.base_score) {
            return Err(NarrativeError::configuration(format!(
                "pattern '{}' base score {} is outside [0, 1]",
                self.name, self.base_score
            )));
        }
        Ok(())
    }
}

/// One row of an ordered lookup table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LookupEntry {
    pub term: String,
    pub value: String,
}

/// Ordered term → value table resolved by whole-term containment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LookupTable {
    entries: Vec<LookupEntry>,
}

impl LookupTable {
    pub fn from_pairs(pairs: &[(&str, &str)]) -> Self {
        Self {
            entries: pairs
                .iter()
                .map(|(term, value)| LookupEntry {
                    term: term.to_lowercase(),
                    value: value.to_string(),
                })
                .collect(),
        }
    }

    /// Value of the first entry whose term occurs in `text_lower`.
    pub fn resolve(&self, text_lower: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| contains_term(text_lower, &e.term))
            .map(|e| e.value.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Immutable registry of pattern definitions and secondary lookups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternLibrary {
    pub version: String,
    pub definitions: Vec<PatternDefinition>,
    pub actions: LookupTable,
    pub statuses: LookupTable,
    pub components: LookupTable,
    pub environments: LookupTable,
}

static BUILTIN: LazyLock<Arc<PatternLibrary>> = LazyLock::new(|| Arc::new(PatternLibrary::builtin()));

impl PatternLibrary {
    /// Shared handle to the built-in library, built on first use.
    pub fn shared() -> Arc<PatternLibrary> {
        Arc::clone(&BUILTIN)
    }

    /// Load a replacement library from TOML.
    pub fn from_toml_str(source: &str) -> NarrativeResult<Self> {
        let library: PatternLibrary = toml::from_str(source).map_err(|e| {
            NarrativeError::configuration("invalid pattern library").with_cause(e)
        })?;
        library.validate()?;
        Ok(library)
    }

    /// Read and validate a TOML library from disk.
    pub fn load(path: &Path) -> NarrativeResult<Self> {
        let source = std::fs::read_to_string(path).map_err(|e| {
            NarrativeError::configuration(format!(
                "failed to read pattern library {}",
                path.display()
            ))
            .with_cause(e)
        })?;
        Self::from_toml_str(&source).map_err(|e| e.with_detail("path", path.display()))
    }

    pub fn validate(&self) -> NarrativeResult<()> {
        if self.definitions.is_empty() {
            return Err(NarrativeError::configuration(
                "pattern library has no definitions",
            ));
        }
        for def in &self.definitions {
            def.validate()?;
        }
        Ok(())
    }

    /// Definitions of one category, in evaluation order.
    pub fn definitions_for(
        &self,
        category: PatternCategory,
    ) -> impl Iterator<Item = &PatternDefinition> {
        self.definitions
            .iter()
            .filter(move |d| d.category == category)
    }

    pub fn find(&self, name: &str) -> Option<&PatternDefinition> {
        self.definitions.iter().find(|d| d.name == name)
    }

    /// The built-in tables.
    pub fn builtin() -> Self {
        Self {
            version: BUILTIN_LIBRARY_VERSION.to_string(),
            definitions: builtin_definitions(),
            actions: LookupTable::from_pairs(ACTION_TABLE),
            statuses: LookupTable::from_pairs(STATUS_TABLE),
            components: LookupTable::from_pairs(COMPONENT_TABLE),
            environments: LookupTable::from_pairs(ENVIRONMENT_TABLE),
        }
    }
}

impl Default for PatternLibrary {
    fn default() -> Self {
        Self::builtin()
    }
}

// ============================================================================
// Built-in tables
// ============================================================================

fn builtin_definitions() -> Vec<PatternDefinition> {
    use PatternCategory::*;

    vec![
        // Infrastructure
        PatternDefinition::new("terraform_operations", Infrastructure, "terraform", 0.9)
            .keywords(&["terraform", "tfstate", "tf plan", "tf apply", "hcl"])
            .modifier("apply", 0.15)
            .modifier("plan", 0.1)
            .modifier("module", 0.05)
            .modifier("state", 0.05)
            .examples(&["Ran terraform apply for the staging VPC"]),
        PatternDefinition::new("aws_services", Infrastructure, "aws", 0.8)
            .keywords(&["aws", "lambda", "ec2", "s3 bucket", "cloudformation", "cloudwatch", "rds", "eks"])
            .modifier("production", 0.1)
            .modifier("deployed", 0.1)
            .modifier("configured", 0.05)
            .examples(&["Deployed the AWS Lambda for image resizing"]),
        PatternDefinition::new("container_orchestration", Infrastructure, "kubernetes", 0.8)
            .keywords(&["kubernetes", "k8s", "helm", "kubectl", "docker", "container"])
            .modifier("cluster", 0.1)
            .modifier("namespace", 0.05)
            .examples(&["Upgraded the k8s cluster to 1.29"]),
        PatternDefinition::new("networking", Infrastructure, "networking", 0.75)
            .keywords(&["vpc", "subnet", "security group", "load balancer", "route53", "nat gateway", "firewall"])
            .modifier("configured", 0.1)
            .modifier("peering", 0.1)
            .examples(&["Configured VPC peering between accounts"]),
        PatternDefinition::new("monitoring", Infrastructure, "monitoring", 0.7)
            .keywords(&["monitoring", "grafana", "prometheus", "datadog", "alerting"])
            .modifier("alert", 0.1)
            .modifier("dashboard", 0.05)
            .examples(&["Set up Grafana alerting for the API"]),
        // Deployment
        PatternDefinition::new("deployment_activity", Deployment, "deployment", 0.7)
            .keywords(&["deploy", "release", "rollout", "shipped"])
            .modifier("production", 0.15)
            .modifier("staging", 0.1)
            .modifier("successful", 0.05)
            .modifier("hotfix", 0.05)
            .examples(&["Deployed release 2.3 to production"]),
        PatternDefinition::new("rollback", Deployment, "rollback", 0.85)
            .keywords(&["rollback", "rolled back", "revert deployment"])
            .modifier("production", 0.1)
            .modifier("incident", 0.05)
            .examples(&["Rolled back the payment service release"]),
        PatternDefinition::new("ci_cd_pipeline", Deployment, "ci_cd", 0.75)
            .keywords(&["pipeline", "ci/cd", "github actions", "jenkins", "gitlab ci"])
            .modifier("failed", 0.1)
            .modifier("green", 0.05)
            .examples(&["Fixed the flaky GitHub Actions pipeline"]),
        PatternDefinition::new("environment_promotion", Deployment, "promotion", 0.8)
            .keywords(&["promoted to", "canary", "blue-green", "staging environment", "production environment"])
            .modifier("production", 0.1)
            .examples(&["Promoted build 118 to production via canary"]),
        // Development
        PatternDefinition::new("bug_fix", Development, "bug_fix", 0.75)
            .keywords(&["bug", "fix", "hotfix", "defect", "regression", "crash"])
            .modifier("critical", 0.15)
            .modifier("production", 0.1)
            .modifier("resolved", 0.05)
            .examples(&["Fixed null pointer crash in checkout"]),
        PatternDefinition::new("feature_implementation", Development, "feature", 0.7)
            .keywords(&["implement", "feature", "endpoint", "functionality"])
            .modifier("completed", 0.1)
            .modifier("api", 0.05)
            .examples(&["Implemented the export endpoint"]),
        PatternDefinition::new("refactoring", Development, "refactor", 0.7)
            .keywords(&["refactor", "cleanup", "clean up", "technical debt", "restructure"])
            .modifier("performance", 0.1)
            .modifier("legacy", 0.05)
            .examples(&["Refactored the legacy billing module"]),
        PatternDefinition::new("code_review", Development, "code_review", 0.8)
            .keywords(&["pull request", "merge request", "code review", "merged pr", "pr review"])
            .modifier("approved", 0.1)
            .modifier("merged", 0.1)
            .examples(&["Merged PR for the auth service"]),
        // Database
        PatternDefinition::new("schema_migration", Database, "migration", 0.85)
            .keywords(&["migration", "schema change", "alter table", "migrate"])
            .modifier("production", 0.1)
            .modifier("rollback", 0.05)
            .examples(&["Ran the users table migration"]),
        PatternDefinition::new("database_access", Database, "access", 0.8)
            .keywords(&["database permission", "database access", "db user", "connection pool", "grant"])
            .modifier("production", 0.1)
            .examples(&["Granted read access to the analytics role"]),
        PatternDefinition::new("query_performance", Database, "performance", 0.75)
            .keywords(&["slow query", "query plan", "index", "query optimization"])
            .modifier("latency", 0.1)
            .examples(&["Added an index for the slow orders query"]),
        PatternDefinition::new("database_general", Database, "database", 0.7)
            .keywords(&["database", "postgres", "mysql", "dynamodb", "redis", "mongodb"])
            .modifier("replica", 0.1)
            .modifier("backup", 0.1)
            .examples(&["Restored the Postgres replica from backup"]),
        // Security
        PatternDefinition::new("authentication", Security, "auth", 0.8)
            .keywords(&["authentication", "auth service", "oauth", "sso", "jwt", "login"])
            .modifier("vulnerability", 0.1)
            .modifier("token", 0.05)
            .examples(&["Moved the auth service to OAuth2"]),
        PatternDefinition::new("access_control", Security, "access_control", 0.75)
            .keywords(&["iam", "permission", "rbac", "least privilege"])
            .modifier("policy", 0.1)
            .modifier("audit", 0.05)
            .examples(&["Tightened IAM permission boundaries"]),
        PatternDefinition::new("vulnerability_management", Security, "vulnerability", 0.9)
            .keywords(&["vulnerability", "cve", "security patch", "penetration test", "exploit"])
            .modifier("critical", 0.1)
            .modifier("patched", 0.05)
            .examples(&["Patched CVE-2024-1234 in the base image"]),
        PatternDefinition::new("secrets_and_tls", Security, "secrets", 0.8)
            .keywords(&["secret", "certificate", "ssl", "tls", "encryption", "kms"])
            .modifier("rotated", 0.1)
            .modifier("expired", 0.1)
            .examples(&["Rotated the TLS certificate for the API"]),
        // Testing
        PatternDefinition::new("unit_testing", Testing, "unit", 0.8)
            .keywords(&["unit test", "test coverage", "tests pass", "pytest", "jest"])
            .modifier("passing", 0.1)
            .modifier("coverage", 0.05)
            .examples(&["Added unit tests for the parser"]),
        PatternDefinition::new("integration_testing", Testing, "integration", 0.8)
            .keywords(&["integration test", "e2e", "end-to-end", "smoke test"])
            .modifier("staging", 0.1)
            .modifier("passing", 0.05)
            .examples(&["Smoke tests passing on staging"]),
        PatternDefinition::new("performance_testing", Testing, "load", 0.8)
            .keywords(&["load test", "performance test", "stress test", "benchmark"])
            .modifier("throughput", 0.1)
            .modifier("latency", 0.05)
            .examples(&["Load test hit 2k rps"]),
        PatternDefinition::new("qa_validation", Testing, "qa", 0.7)
            .keywords(&["qa", "regression test", "test plan", "verified"])
            .modifier("signed off", 0.1)
            .examples(&["QA verified the release candidate"]),
    ]
}

/// Action verbs, most specific first.
const ACTION_TABLE: &[(&str, &str)] = &[
    ("rolled back", "rollback"),
    ("set up", "setup"),
    ("working on", "work"),
    ("deployed", "deploy"),
    ("deploying", "deploy"),
    ("deploy", "deploy"),
    ("applied", "apply"),
    ("apply", "apply"),
    ("configured", "configure"),
    ("configuring", "configure"),
    ("configure", "configure"),
    ("provisioned", "provision"),
    ("provision", "provision"),
    ("migrated", "migrate"),
    ("migrating", "migrate"),
    ("migrate", "migrate"),
    ("merged", "merge"),
    ("merge", "merge"),
    ("implemented", "implement"),
    ("implementing", "implement"),
    ("implement", "implement"),
    ("fixed", "fix"),
    ("fixing", "fix"),
    ("fix", "fix"),
    ("refactored", "refactor"),
    ("refactor", "refactor"),
    ("tested", "test"),
    ("testing", "test"),
    ("reviewed", "review"),
    ("review", "review"),
    ("upgraded", "upgrade"),
    ("upgrade", "upgrade"),
    ("updated", "update"),
    ("update", "update"),
    ("created", "create"),
    ("create", "create"),
    ("investigating", "investigate"),
    ("investigated", "investigate"),
    ("released", "release"),
    ("release", "release"),
    ("rollback", "rollback"),
];

/// Status words; failures and blockers outrank completion words.
const STATUS_TABLE: &[(&str, &str)] = &[
    ("failed", "failed"),
    ("failing", "failed"),
    ("broken", "failed"),
    ("blocked", "blocked"),
    ("waiting on", "blocked"),
    ("completed", "completed"),
    ("complete", "completed"),
    ("done", "completed"),
    ("finished", "completed"),
    ("merged", "completed"),
    ("deployed", "completed"),
    ("applied", "completed"),
    ("fixed", "completed"),
    ("resolved", "completed"),
    ("released", "completed"),
    ("in progress", "in_progress"),
    ("investigating", "in_progress"),
    ("working on", "in_progress"),
    ("started", "in_progress"),
    ("ongoing", "in_progress"),
    ("planned", "planned"),
    ("scheduled", "planned"),
];

const COMPONENT_TABLE: &[(&str, &str)] = &[
    ("lambda", "lambda"),
    ("ec2", "ec2"),
    ("s3", "s3"),
    ("rds", "rds"),
    ("eks", "eks"),
    ("ecs", "ecs"),
    ("vpc", "vpc"),
    ("subnet", "vpc"),
    ("security group", "security_group"),
    ("load balancer", "load_balancer"),
    ("alb", "load_balancer"),
    ("cloudfront", "cloudfront"),
    ("route53", "dns"),
    ("dns", "dns"),
    ("iam", "iam"),
    ("kubernetes", "kubernetes"),
    ("k8s", "kubernetes"),
    ("helm", "kubernetes"),
    ("docker", "docker"),
    ("api", "api"),
    ("frontend", "frontend"),
    ("ui", "frontend"),
    ("backend", "backend"),
    ("auth", "auth"),
    ("database", "database"),
    ("service", "service"),
];

const ENVIRONMENT_TABLE: &[(&str, &str)] = &[
    ("production", "production"),
    ("prod", "production"),
    ("staging", "staging"),
    ("stage", "staging"),
    ("uat", "uat"),
    ("qa", "qa"),
    ("development", "development"),
    ("dev", "development"),
    ("sandbox", "sandbox"),
    ("local", "local"),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_library_validates() {
        let library = PatternLibrary::builtin();
        assert!(library.validate().is_ok());
        assert_eq!(library.version, BUILTIN_LIBRARY_VERSION);
    }

    #[test]
    fn test_every_category_has_definitions() {
        let library = PatternLibrary::builtin();
        for category in PatternCategory::ALL {
            assert!(
                library.definitions_for(category).count() > 0,
                "no definitions for {category}"
            );
        }
    }

    #[test]
    fn test_definition_names_unique() {
        let library = PatternLibrary::builtin();
        let mut names: Vec<_> = library.definitions.iter().map(|d| &d.name).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), library.definitions.len());
    }

    #[test]
    fn test_terraform_definition_values() {
        let library = PatternLibrary::builtin();
        let tf = library.find("terraform_operations").unwrap();
        assert_eq!(tf.subcategory, "terraform");
        assert_eq!(tf.base_score, 0.9);
        assert_eq!(tf.modifiers[0].keyword, "apply");
        assert_eq!(tf.modifiers[0].boost, 0.15);
    }

    #[test]
    fn test_lookup_first_match_in_priority_order() {
        let library = PatternLibrary::builtin();
        // "failed" outranks "deployed" even though both occur
        assert_eq!(library.statuses.resolve("deployed but smoke tests failed"), Some("failed"));
        assert_eq!(library.statuses.resolve("migration completed"), Some("completed"));
        assert_eq!(library.actions.resolve("we rolled back the deploy"), Some("rollback"));
        assert_eq!(library.environments.resolve("pushed to prod"), Some("production"));
        assert_eq!(library.environments.resolve("new product page"), None);
        assert_eq!(library.components.resolve("nothing relevant"), None);
    }

    #[test]
    fn test_shared_library_is_one_instance() {
        let a = PatternLibrary::shared();
        let b = PatternLibrary::shared();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_toml_roundtrip_and_validation() {
        let library = PatternLibrary::builtin();
        let encoded = toml::to_string(&library).unwrap();
        let decoded = PatternLibrary::from_toml_str(&encoded).unwrap();
        assert_eq!(decoded, library);

        let bad = r#"
            version = "x"
            definitions = []
            actions = []
            statuses = []
            components = []
            environments = []
        "#;
        assert!(PatternLibrary::from_toml_str(bad).is_err());
    }

    #[test]
    fn test_out_of_range_base_score_rejected() {
        let mut library = PatternLibrary::builtin();
        library.definitions[0].base_score = 1.5;
        assert!(library.validate().is_err());
    }
}
