//! Tracker data aggregation
//!
//! Classifies issues and comments, accumulates a deduplicated technical
//! context and builds a chronological timeline.

pub mod aggregator;
pub mod model;
pub mod vocabulary;

pub use aggregator::{DataAggregator, IssueAnalysis};
pub use model::{
    ActivityRecord, ActivityType, CompletionStatus, EnhancedIssue, EventSource, ProcessedComment,
    ProcessedData, Sentiment, TechnicalContext, TimelineEvent, TimelineEventType, WorkType,
};
pub use vocabulary::{Vocabulary, BUILTIN_VOCABULARY_VERSION};
