//! Retrieval-augmented answering pipeline: ingestion, retrieval, and answer generation.

pub mod answer;
mod service;
pub mod types;

pub use service::{RagApi, RagService};
pub use types::{AnswerSource, IngestOutcome, QueryOutcome, RagError, StatusReport};
