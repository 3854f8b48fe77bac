//! Remote narrative generation
//!
//! [`OllamaClient`] speaks the generate API, [`retry`] bounds and backs off
//! calls, [`PromptBuilder`] renders style-specific prompts and
//! [`RemoteSynthesizer`] ties them together behind
//! [`StandupSynthesizer`](crate::synth::StandupSynthesizer).

pub mod client;
pub mod prompts;
pub mod retry;
pub mod synthesizer;

pub use client::{GenerationBackend, GenerationError, GenerationErrorKind, OllamaClient};
pub use prompts::{PromptBuilder, PROMPT_VERSION};
pub use retry::{
    enhance_error, generate_with_retry, is_retryable_error, probe_endpoint, should_fallback_to_embedded,
    RetryFailure, RetryPolicy,
};
pub use synthesizer::RemoteSynthesizer;
