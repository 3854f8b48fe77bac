//! Pattern library and keyword matcher
//!
//! Classifies free text into typed technical signals with confidence scores.

pub mod library;
pub mod matcher;

pub use library::{
    LookupTable, Modifier, PatternCategory, PatternDefinition, PatternLibrary,
    BUILTIN_LIBRARY_VERSION,
};
pub use matcher::{
    DeploymentPattern, DevelopmentPattern, InfrastructurePattern, PatternMatch, PatternMatchSet,
    PatternMatcher,
};
