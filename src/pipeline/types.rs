//! Outcome types and error definitions for the RAG pipeline.

use crate::{
    chroma::{ChromaError, RetrievedChunk},
    embedding::EmbeddingClientError,
    ingest::IngestError,
    metrics::MetricsSnapshot,
};
use serde::Serialize;
use thiserror::Error;

/// Errors emitted by the RAG pipeline.
#[derive(Debug, Error)]
pub enum RagError {
    /// Requested file or directory does not exist.
    #[error("File not found: {0}")]
    NotFound(String),
    /// Caller supplied an unusable request.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    /// Parsing or chunking a document failed.
    #[error(transparent)]
    Ingest(#[from] IngestError),
    /// Embedding provider failed to produce vectors.
    #[error("Failed to generate embeddings: {0}")]
    Embedding(#[from] EmbeddingClientError),
    /// Vector store interaction failed.
    #[error("Chroma request failed: {0}")]
    Chroma(#[from] ChromaError),
    /// Returned embedding dimension does not match configuration.
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Expected embedding dimension configured on the server.
        expected: usize,
        /// Actual embedding dimension produced by the provider.
        actual: usize,
    },
    /// Embedding provider returned no vectors.
    #[error("Embedding provider returned no vectors for the query")]
    EmptyEmbedding,
}

/// Summary of an ingestion run over one file, one upload, or a directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestOutcome {
    /// PDFs ingested.
    pub documents: usize,
    /// Pages that produced text.
    pub pages: usize,
    /// Chunks written to the vector store.
    pub chunks_added: usize,
    /// Chunks skipped because their text repeated earlier in the same document.
    pub skipped_duplicates: usize,
}

impl IngestOutcome {
    pub(crate) fn absorb(&mut self, other: IngestOutcome) {
        self.documents += other.documents;
        self.pages += other.pages;
        self.chunks_added += other.chunks_added;
        self.skipped_duplicates += other.skipped_duplicates;
    }
}

/// Which prompt produced the answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerSource {
    /// Answer grounded in retrieved chunks.
    Documents,
    /// No relevant chunk; answered from general knowledge.
    GeneralKnowledge,
}

/// Answer returned for a question.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryOutcome {
    /// Model answer, or the apology text when generation failed.
    pub llm_answer: String,
    /// Prompt used for the answer.
    pub answer_source: AnswerSource,
    /// Chunks retrieved for the question, closest first.
    pub retrieved_chunks: Vec<RetrievedChunk>,
}

/// Index statistics reported by `status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    /// Records currently stored in the collection.
    pub indexed_chunks: u64,
    /// In-process counters since startup.
    pub metrics: MetricsSnapshot,
}
