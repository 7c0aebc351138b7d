//! HTTP client wrapper for the Chroma v2 REST API.

use crate::chroma::{
    mappers::{accumulate_source, map_query_response},
    types::{
        ChromaError, ChromaSettings, ChunkRecord, CollectionModel, GetResponse, QueryResponse,
        RetrievedChunk,
    },
};
use reqwest::{Client, Method, Url};
use serde_json::json;
use std::collections::BTreeSet;
use tokio::sync::OnceCell;

const UPSERT_BATCH_SIZE: usize = 512;
const LIST_PAGE_SIZE: usize = 1000;

/// Lightweight HTTP client for one Chroma collection.
///
/// The collection is created on first use (cosine space) and its id is cached for the
/// lifetime of the client.
pub struct ChromaService {
    client: Client,
    base_url: String,
    settings: ChromaSettings,
    collection_id: OnceCell<String>,
}

impl ChromaService {
    /// Construct a new client for the configured collection.
    pub fn new(settings: ChromaSettings) -> Result<Self, ChromaError> {
        let client = Client::builder().user_agent("ragkb/0.1").build()?;
        let base_url = normalize_base_url(&settings.url).map_err(ChromaError::InvalidUrl)?;
        tracing::debug!(
            url = %base_url,
            tenant = %settings.tenant,
            database = %settings.database,
            collection = %settings.collection,
            has_auth_token = settings.auth_token.as_deref().is_some_and(|value| !value.is_empty()),
            "Initialized Chroma HTTP client"
        );

        Ok(Self {
            client,
            base_url,
            settings,
            collection_id: OnceCell::new(),
        })
    }

    /// Name of the collection this client writes to.
    pub fn collection_name(&self) -> &str {
        &self.settings.collection
    }

    /// Check that the Chroma server answers.
    pub async fn heartbeat(&self) -> Result<(), ChromaError> {
        let response = self.request(Method::GET, "api/v2/heartbeat").send().await?;
        self.check(response, "heartbeat").await.map(|_| ())
    }

    /// Get or create the collection and return its id.
    pub async fn ensure_collection(&self) -> Result<&str, ChromaError> {
        self.collection_id
            .get_or_try_init(|| async {
                let body = json!({
                    "name": self.settings.collection,
                    "metadata": { "hnsw:space": "cosine" },
                    "get_or_create": true,
                });
                let response = self
                    .request(Method::POST, &self.collections_path())
                    .json(&body)
                    .send()
                    .await?;
                let response = self.check(response, "get_or_create collection").await?;
                let collection: CollectionModel = response.json().await?;
                tracing::info!(
                    collection = %self.settings.collection,
                    id = %collection.id,
                    "Collection loaded/created"
                );
                Ok::<_, ChromaError>(collection.id)
            })
            .await
            .map(String::as_str)
    }

    /// Insert or replace records, batching large writes.
    pub async fn upsert(&self, records: Vec<ChunkRecord>) -> Result<usize, ChromaError> {
        if records.is_empty() {
            tracing::warn!("No chunks provided to add to the vector store");
            return Ok(0);
        }

        let path = self.collection_path("upsert").await?;
        let total = records.len();

        for batch in records.chunks(UPSERT_BATCH_SIZE) {
            let body = json!({
                "ids": batch.iter().map(|record| record.id.as_str()).collect::<Vec<_>>(),
                "embeddings": batch.iter().map(|record| &record.embedding).collect::<Vec<_>>(),
                "documents": batch.iter().map(|record| record.document.as_str()).collect::<Vec<_>>(),
                "metadatas": batch.iter().map(|record| &record.metadata).collect::<Vec<_>>(),
            });
            let response = self
                .request(Method::POST, &path)
                .json(&body)
                .send()
                .await?;
            self.check(response, "upsert").await?;
            tracing::debug!(
                collection = %self.settings.collection,
                records = batch.len(),
                "Upserted record batch"
            );
        }

        tracing::info!(collection = %self.settings.collection, records = total, "Records stored");
        Ok(total)
    }

    /// Delete the records of `source` that were not written at `ingested_at`.
    ///
    /// Called after a successful upsert so a failed re-ingest leaves the previous records in place.
    pub async fn delete_stale(&self, source: &str, ingested_at: &str) -> Result<(), ChromaError> {
        let path = self.collection_path("delete").await?;
        let filter = json!({
            "$and": [
                { "source": source },
                { "ingested_at": { "$ne": ingested_at } }
            ]
        });
        let response = self
            .request(Method::POST, &path)
            .json(&json!({ "where": filter }))
            .send()
            .await?;
        self.check(response, "delete").await?;
        tracing::debug!(collection = %self.settings.collection, source, "Removed stale records");
        Ok(())
    }

    /// Number of records in the collection.
    pub async fn count(&self) -> Result<u64, ChromaError> {
        let path = self.collection_path("count").await?;
        let response = self.request(Method::GET, &path).send().await?;
        let response = self.check(response, "count").await?;
        Ok(response.json::<u64>().await?)
    }

    /// Return the `n_results` nearest records to `embedding`, closest first.
    pub async fn query(
        &self,
        embedding: Vec<f32>,
        n_results: usize,
    ) -> Result<Vec<RetrievedChunk>, ChromaError> {
        let path = self.collection_path("query").await?;
        let body = json!({
            "query_embeddings": [embedding],
            "n_results": n_results,
            "include": ["documents", "metadatas", "distances"],
        });
        let response = self
            .request(Method::POST, &path)
            .json(&body)
            .send()
            .await?;
        let response = self.check(response, "query").await?;
        let payload: QueryResponse = response.json().await?;
        let hits = map_query_response(payload)?;
        tracing::debug!(
            collection = %self.settings.collection,
            requested = n_results,
            returned = hits.len(),
            "Query completed"
        );
        Ok(hits)
    }

    /// Sorted, unique `source` values across the collection.
    pub async fn list_sources(&self) -> Result<Vec<String>, ChromaError> {
        let path = self.collection_path("get").await?;
        let mut sources = BTreeSet::new();
        let mut offset = 0usize;

        loop {
            let body = json!({
                "include": ["metadatas"],
                "limit": LIST_PAGE_SIZE,
                "offset": offset,
            });
            let response = self
                .request(Method::POST, &path)
                .json(&body)
                .send()
                .await?;
            let response = self.check(response, "get").await?;
            let page: GetResponse = response.json().await?;
            let fetched = page.ids.len();

            for metadata in page.metadatas.unwrap_or_default().into_iter().flatten() {
                accumulate_source(&metadata, &mut sources);
            }

            if fetched < LIST_PAGE_SIZE {
                break;
            }
            offset += fetched;
        }

        Ok(sources.into_iter().collect())
    }

    fn collections_path(&self) -> String {
        format!(
            "api/v2/tenants/{}/databases/{}/collections",
            self.settings.tenant, self.settings.database
        )
    }

    async fn collection_path(&self, operation: &str) -> Result<String, ChromaError> {
        let id = self.ensure_collection().await?;
        Ok(format!("{}/{id}/{operation}", self.collections_path()))
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format_endpoint(&self.base_url, path);
        let mut req = self.client.request(method, url);
        if let Some(token) = &self.settings.auth_token
            && !token.is_empty()
        {
            req = req.bearer_auth(token);
        }
        req
    }

    async fn check(
        &self,
        response: reqwest::Response,
        operation: &str,
    ) -> Result<reqwest::Response, ChromaError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let error = ChromaError::UnexpectedStatus { status, body };
        tracing::error!(operation, error = %error, "Chroma request failed");
        Err(error)
    }
}

fn normalize_base_url(url: &str) -> Result<String, String> {
    let mut parsed = Url::parse(url).map_err(|err| err.to_string())?;
    let path = parsed.path().trim_end_matches('/').to_string();
    parsed.set_path(&path);
    Ok(parsed.to_string())
}

fn format_endpoint(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{base}/{path}")
}
