//! ChromaDB vector store integration.

pub mod client;
mod mappers;
pub mod types;

pub use client::ChromaService;
pub use types::{
    ChromaError, ChromaSettings, ChunkMetadata, ChunkRecord, RecordMetadata, RetrievedChunk,
};
