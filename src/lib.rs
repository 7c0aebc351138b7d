#![deny(missing_docs)]

//! Core library for the PDF knowledge base: ingestion, retrieval, and answering.

/// HTTP routing and REST handlers.
pub mod api;
/// ChromaDB vector store integration.
pub mod chroma;
/// Environment-driven configuration management.
pub mod config;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// PDF parsing, OCR fallback, and chunking.
pub mod ingest;
/// Answer generation client and prompt templates.
pub mod llm;
/// Structured logging and tracing setup.
pub mod logging;
/// Ingestion and query counters.
pub mod metrics;
/// Retrieval-augmented answering pipeline.
pub mod pipeline;

#[cfg(test)]
mod test_support;
