//! HTTP surface for the knowledge base.
//!
//! This module exposes a compact Axum router with a handful of endpoints:
//!
//! - `GET /status` – Report the number of indexed chunks and in-process counters.
//! - `GET /list-docs` – List the distinct document sources stored in Chroma.
//! - `POST /ingest` – Ingest a PDF file, or every PDF below a directory, from the server's disk.
//! - `POST /upload?filename=<name>` – Ingest a PDF sent as the raw request body.
//! - `POST /query` – Retrieve the closest chunks and answer the question with Gemini.
//! - `GET /commands` – Machine-readable command catalog for quick discovery by tools/hosts.
//!
//! Errors are returned as `{"detail": "<message>"}` with a 4xx/5xx status.

use crate::metrics::MetricsSnapshot;
use crate::pipeline::{IngestOutcome, QueryOutcome, RagApi, RagError};
use axum::{
    Json, Router,
    body::Bytes,
    extract::{
        DefaultBodyLimit, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;

/// Largest accepted upload body.
pub const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

/// Build the HTTP router exposing the knowledge base API surface.
pub fn create_router<S>(service: Arc<S>) -> Router
where
    S: RagApi + 'static,
{
    Router::new()
        .route("/status", get(get_status::<S>))
        .route("/list-docs", get(list_documents::<S>))
        .route("/ingest", post(ingest_path::<S>))
        .route(
            "/upload",
            post(upload_document::<S>).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/query", post(query::<S>))
        .route("/commands", get(get_commands))
        .with_state(service)
}

/// Response body for `GET /status`.
#[derive(Serialize)]
struct StatusResponse {
    status: &'static str,
    indexed_chunks: u64,
    metrics: MetricsSnapshot,
}

/// Report the collection size alongside ingestion and query counters.
async fn get_status<S>(State(service): State<Arc<S>>) -> Result<Json<StatusResponse>, AppError>
where
    S: RagApi,
{
    let report = service
        .status()
        .await
        .map_err(|error| AppError::internal("Vector store connection failed", error))?;
    Ok(Json(StatusResponse {
        status: "ok",
        indexed_chunks: report.indexed_chunks,
        metrics: report.metrics,
    }))
}

/// Response body for `GET /list-docs`.
#[derive(Serialize)]
struct DocumentsResponse {
    documents: Vec<String>,
}

/// List the distinct sources stored in the collection.
async fn list_documents<S>(
    State(service): State<Arc<S>>,
) -> Result<Json<DocumentsResponse>, AppError>
where
    S: RagApi,
{
    let documents = service
        .list_documents()
        .await
        .map_err(|error| AppError::internal("Failed to retrieve documents", error))?;
    Ok(Json(DocumentsResponse { documents }))
}

/// Request body for `POST /ingest`.
#[derive(Deserialize)]
struct IngestRequest {
    /// File or directory path on the server's filesystem.
    file_path: String,
}

/// Success response for `POST /ingest` and `POST /upload`.
#[derive(Serialize)]
struct IngestResponse {
    status: &'static str,
    file_path: String,
    #[serde(flatten)]
    outcome: IngestOutcome,
}

/// Ingest a PDF or a directory of PDFs from the server's disk.
///
/// Re-ingesting a path replaces the records previously stored for it.
async fn ingest_path<S>(
    State(service): State<Arc<S>>,
    payload: Result<Json<IngestRequest>, JsonRejection>,
) -> Result<Json<IngestResponse>, AppError>
where
    S: RagApi,
{
    let Json(request) = payload?;
    let file_path = request.file_path.trim().to_string();
    if file_path.is_empty() {
        return Err(AppError::bad_request("file_path must not be empty"));
    }
    let outcome = service
        .ingest_path(Path::new(&file_path))
        .await
        .map_err(AppError::ingest)?;
    tracing::info!(
        file_path = %file_path,
        documents = outcome.documents,
        chunks = outcome.chunks_added,
        skipped_duplicates = outcome.skipped_duplicates,
        "Ingest request completed"
    );
    Ok(Json(IngestResponse {
        status: "success",
        file_path,
        outcome,
    }))
}

/// Query parameters for `POST /upload`.
#[derive(Deserialize)]
struct UploadParams {
    filename: String,
}

/// Ingest a PDF sent as the raw request body.
async fn upload_document<S>(
    State(service): State<Arc<S>>,
    params: Result<Query<UploadParams>, QueryRejection>,
    body: Bytes,
) -> Result<Json<IngestResponse>, AppError>
where
    S: RagApi,
{
    let Query(params) = params?;
    let outcome = service
        .ingest_bytes(&params.filename, body.to_vec())
        .await
        .map_err(AppError::ingest)?;
    tracing::info!(
        filename = %params.filename,
        chunks = outcome.chunks_added,
        "Upload ingested"
    );
    Ok(Json(IngestResponse {
        status: "success",
        file_path: params.filename,
        outcome,
    }))
}

/// Request body for `POST /query`.
#[derive(Deserialize)]
struct QueryRequest {
    /// Natural-language question.
    query: String,
    /// Optional number of chunks to retrieve (defaults to `DEFAULT_TOP_K`).
    #[serde(default)]
    top_k: Option<usize>,
}

/// Answer a question from the indexed documents.
async fn query<S>(
    State(service): State<Arc<S>>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<QueryOutcome>, AppError>
where
    S: RagApi,
{
    let Json(request) = payload?;
    let outcome = service
        .query(&request.query, request.top_k)
        .await
        .map_err(|error| match error {
            RagError::InvalidRequest(message) => AppError::bad_request(message),
            other => AppError::internal("Query failed", other),
        })?;
    Ok(Json(outcome))
}

/// Descriptor for a single command in the discovery catalog.
#[derive(Serialize)]
struct CommandDescriptor {
    name: &'static str,
    method: &'static str,
    path: &'static str,
    description: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_example: Option<serde_json::Value>,
}

/// Response body for `GET /commands`.
#[derive(Serialize)]
struct CommandsResponse {
    commands: Vec<CommandDescriptor>,
}

/// Enumerate supported HTTP commands for discovery/UX in hosts and tools.
async fn get_commands() -> Json<CommandsResponse> {
    Json(CommandsResponse {
        commands: vec![
            CommandDescriptor {
                name: "status",
                method: "GET",
                path: "/status",
                description: "Return { \"status\": \"ok\", \"indexed_chunks\": number, \"metrics\": {..} }.",
                request_example: None,
            },
            CommandDescriptor {
                name: "list_docs",
                method: "GET",
                path: "/list-docs",
                description: "Return the sorted, unique document sources stored in the vector store.",
                request_example: None,
            },
            CommandDescriptor {
                name: "ingest",
                method: "POST",
                path: "/ingest",
                description: "Parse, chunk, embed, and store a PDF (or every PDF below a directory) on the server. Re-ingesting a file replaces its chunks.",
                request_example: Some(json!({ "file_path": "data/handbook.pdf" })),
            },
            CommandDescriptor {
                name: "upload",
                method: "POST",
                path: "/upload?filename=<name>.pdf",
                description: "Ingest a PDF sent as the raw request body; the filename becomes the document source.",
                request_example: None,
            },
            CommandDescriptor {
                name: "query",
                method: "POST",
                path: "/query",
                description: "Retrieve the closest chunks and answer with citations, or from general knowledge with a disclaimer when nothing relevant is indexed.",
                request_example: Some(json!({ "query": "What color is the sky?", "top_k": 3 })),
            },
        ],
    })
}

/// Error returned to HTTP clients as `{"detail": ..}`.
struct AppError {
    status: StatusCode,
    detail: String,
}

impl AppError {
    fn bad_request(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            detail: detail.into(),
        }
    }

    fn internal(context: &str, error: RagError) -> Self {
        tracing::error!(error = %error, "{context}");
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            detail: format!("{context}: {error}"),
        }
    }

    fn ingest(error: RagError) -> Self {
        match error {
            RagError::NotFound(_) => Self {
                status: StatusCode::NOT_FOUND,
                detail: error.to_string(),
            },
            RagError::InvalidRequest(message) => Self::bad_request(message),
            other => Self::internal("Ingestion failed", other),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}
