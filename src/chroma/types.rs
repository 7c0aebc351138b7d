//! Shared types used by the Chroma client and helpers.

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Errors returned while interacting with ChromaDB.
#[derive(Debug, Error)]
pub enum ChromaError {
    /// Base URL failed to parse or normalize.
    #[error("Invalid Chroma URL: {0}")]
    InvalidUrl(String),
    /// HTTP layer failed before receiving a response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Chroma responded with an unexpected status code.
    #[error("Unexpected Chroma response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned from Chroma.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
    /// Chroma returned a payload that does not line up with the request.
    #[error("Malformed Chroma response: {0}")]
    InvalidResponse(String),
}

/// Connection settings for a Chroma collection.
#[derive(Debug, Clone)]
pub struct ChromaSettings {
    /// Base URL of the Chroma server.
    pub url: String,
    /// Tenant owning the database.
    pub tenant: String,
    /// Database holding the collection.
    pub database: String,
    /// Collection name.
    pub collection: String,
    /// Optional bearer token.
    pub auth_token: Option<String>,
}

impl From<&crate::config::Config> for ChromaSettings {
    fn from(config: &crate::config::Config) -> Self {
        Self {
            url: config.chroma_url.clone(),
            tenant: config.chroma_tenant.clone(),
            database: config.chroma_database.clone(),
            collection: config.chroma_collection.clone(),
            auth_token: config.chroma_auth_token.clone(),
        }
    }
}

/// Record written to the collection for one chunk.
#[derive(Debug, Clone)]
pub struct ChunkRecord {
    /// Record identifier, unique across sources.
    pub id: String,
    /// Embedding vector for the chunk.
    pub embedding: Vec<f32>,
    /// Chunk text stored as the Chroma document.
    pub document: String,
    /// Metadata persisted alongside the record.
    pub metadata: RecordMetadata,
}

/// Metadata persisted with every chunk record.
#[derive(Debug, Clone, Serialize)]
pub struct RecordMetadata {
    /// Source path or upload name.
    pub source: String,
    /// 1-based page number.
    pub page: u32,
    /// Human readable chunk identifier.
    pub chunk_id: String,
    /// SHA-256 of the chunk text.
    pub chunk_hash: String,
    /// RFC 3339 ingestion timestamp.
    pub ingested_at: String,
}

/// Location of a retrieved chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Source path or upload name.
    pub source: String,
    /// 1-based page number.
    pub page: u32,
}

/// Nearest-neighbour hit returned by a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    /// Chunk text.
    pub content: String,
    /// Where the chunk came from.
    pub metadata: ChunkMetadata,
    /// Cosine distance to the query (0 is identical, 2 is opposite).
    pub distance: f32,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CollectionModel {
    pub(crate) id: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct QueryResponse {
    #[serde(default)]
    pub(crate) documents: Option<Vec<Vec<Option<String>>>>,
    #[serde(default)]
    pub(crate) metadatas: Option<Vec<Vec<Option<Map<String, Value>>>>>,
    #[serde(default)]
    pub(crate) distances: Option<Vec<Vec<Option<f32>>>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GetResponse {
    pub(crate) ids: Vec<String>,
    #[serde(default)]
    pub(crate) metadatas: Option<Vec<Option<Map<String, Value>>>>,
}
