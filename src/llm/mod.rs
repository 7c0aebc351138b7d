//! Answer generation through a hosted language model.
//!
//! The pipeline only depends on [`AnswerClient`]; [`GeminiClient`] is the production adapter
//! and issues HTTP requests directly against the Generative Language API.

mod gemini;
pub mod prompts;

pub use gemini::GeminiClient;

use async_trait::async_trait;
use thiserror::Error;

/// Errors surfaced while asking the model for an answer.
#[derive(Debug, Error)]
pub enum LlmError {
    /// Provider could not be reached.
    #[error("LLM provider unavailable: {0}")]
    ProviderUnavailable(String),
    /// Provider returned an error response.
    #[error("Failed to generate answer: {0}")]
    GenerationFailed(String),
    /// Provider response could not be parsed.
    #[error("Malformed provider response: {0}")]
    InvalidResponse(String),
    /// Provider answered without any candidate text.
    #[error("LLM returned no answer{}", block_suffix(.block_reason))]
    EmptyResponse {
        /// Reason reported by the provider's safety filter, when present.
        block_reason: Option<String>,
    },
}

fn block_suffix(reason: &Option<String>) -> String {
    reason
        .as_deref()
        .map(|reason| format!(" (blocked: {reason})"))
        .unwrap_or_default()
}

/// Interface implemented by answer-generating models.
#[async_trait]
pub trait AnswerClient: Send + Sync {
    /// Send `prompt` to the model and return its text answer.
    async fn generate(&self, prompt: &str) -> Result<String, LlmError>;
}
