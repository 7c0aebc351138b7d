//! Prompt templates used to ask the model for an answer.

use crate::chroma::RetrievedChunk;

/// Line the model must append when answering without document context.
pub const GENERAL_KNOWLEDGE_DISCLAIMER: &str = "[Disclaimer: This information was not found in the uploaded documents and is based on general knowledge.]";

const RAG_PROMPT_TEMPLATE: &str = "
SYSTEM: You are a helpful and precise assistant for question-answering tasks.
Use the following pieces of retrieved context to answer the question.
If you don't know the answer from the given context, just say that you don't know.
Use three sentences maximum and keep the answer concise.
Cite the source of your answer using the format [SOURCE: <source_name>, PAGE: <page_number>].

QUESTION: {question}

CONTEXT:
{context}

ANSWER:
";

const GENERAL_KNOWLEDGE_PROMPT_TEMPLATE: &str = "
SYSTEM: You are a helpful assistant. The user has asked a question that could not be answered based on the provided documents.
Answer the following question using your general knowledge.
After providing the answer, you MUST include the following disclaimer on a new line:
\"{disclaimer}\"

QUESTION: {question}

ANSWER:
";

const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

/// Render retrieved chunks into the context block of the RAG prompt.
pub fn format_context(chunks: &[RetrievedChunk]) -> String {
    chunks
        .iter()
        .map(|chunk| {
            format!(
                "Source: {}, Page: {}\n\n{}",
                chunk.metadata.source, chunk.metadata.page, chunk.content
            )
        })
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR)
}

/// Prompt asking for a cited answer grounded in `chunks`.
pub fn rag_prompt(question: &str, chunks: &[RetrievedChunk]) -> String {
    render(
        RAG_PROMPT_TEMPLATE,
        &[("question", question), ("context", &format_context(chunks))],
    )
}

/// Prompt asking for an answer from general knowledge, with the disclaimer.
pub fn general_knowledge_prompt(question: &str) -> String {
    render(
        GENERAL_KNOWLEDGE_PROMPT_TEMPLATE,
        &[
            ("question", question),
            ("disclaimer", GENERAL_KNOWLEDGE_DISCLAIMER),
        ],
    )
}

/// Substitute `{name}` slots of `template` in a single pass.
///
/// Substituted values are copied verbatim and never rescanned for slots.
fn render(template: &str, values: &[(&str, &str)]) -> String {
    let mut output = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        output.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let slot = after.find('}').and_then(|end| {
            let name = &after[..end];
            values
                .iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| (end, *value))
        });
        match slot {
            Some((end, value)) => {
                output.push_str(value);
                rest = &after[end + 1..];
            }
            None => {
                output.push('{');
                rest = after;
            }
        }
    }

    output.push_str(rest);
    output
}
