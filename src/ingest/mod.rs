//! Document ingestion: PDF parsing, OCR fallback, and chunking.

pub mod chunking;
pub mod ocr;
pub mod parser;

pub use chunking::{ChunkSettings, ChunkingError, DocumentChunk, chunk_pages, dedupe_chunks};
pub use ocr::{OcrEngine, OcrError, TesseractOcr};
pub use parser::{DocumentParser, PageText};

use thiserror::Error;

/// Errors produced while turning a PDF into chunks.
#[derive(Debug, Error)]
pub enum IngestError {
    /// File could not be read from disk.
    #[error("failed to read {path}: {source}")]
    Io {
        /// Path we attempted to read.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The file is not a readable PDF.
    #[error("failed to parse PDF {path}: {message}")]
    PdfParse {
        /// Source path or upload name.
        path: String,
        /// Parser diagnostic.
        message: String,
    },
    /// Chunking step failed to segment the document.
    #[error("failed to chunk document: {0}")]
    Chunking(#[from] ChunkingError),
    /// Background parsing task panicked or was cancelled.
    #[error("parsing task failed: {0}")]
    Task(String),
}
