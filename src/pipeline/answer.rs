//! Choosing between a grounded answer and a general-knowledge fallback.

use crate::{
    chroma::RetrievedChunk,
    llm::prompts::{general_knowledge_prompt, rag_prompt},
    pipeline::types::AnswerSource,
};

/// Answer returned to the caller when the model call fails.
pub const GENERATION_FAILURE_ANSWER: &str =
    "Sorry, I encountered an error while generating an answer.";

/// Decide which prompt to use for `chunks`, which must be sorted closest first.
///
/// Document context is used only when the best hit's distance is within `threshold`.
pub fn choose_answer_source(chunks: &[RetrievedChunk], threshold: f32) -> AnswerSource {
    match chunks.first() {
        Some(best) if best.distance <= threshold => AnswerSource::Documents,
        _ => AnswerSource::GeneralKnowledge,
    }
}

/// Build the prompt for `question` in the chosen mode.
pub fn build_prompt(source: AnswerSource, question: &str, chunks: &[RetrievedChunk]) -> String {
    match source {
        AnswerSource::Documents => rag_prompt(question, chunks),
        AnswerSource::GeneralKnowledge => general_knowledge_prompt(question),
    }
}
