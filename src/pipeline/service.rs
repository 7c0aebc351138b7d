//! RAG service coordinating PDF parsing, chunking, embedding, Chroma, and answer generation.

use crate::{
    chroma::{ChromaService, ChromaSettings, ChunkRecord, RecordMetadata},
    config::Config,
    embedding::{EmbeddingClient, build_embedding_client},
    ingest::{
        ChunkSettings, DocumentParser, IngestError, OcrEngine, PageText, TesseractOcr, chunk_pages,
        chunking::compute_chunk_hash, dedupe_chunks,
    },
    llm::{AnswerClient, GeminiClient},
    metrics::{MetricsSnapshot, RagMetrics},
    pipeline::{
        answer::{GENERATION_FAILURE_ANSWER, build_prompt, choose_answer_source},
        types::{AnswerSource, IngestOutcome, QueryOutcome, RagError, StatusReport},
    },
};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use walkdir::WalkDir;

const SOURCE_KEY_LEN: usize = 12;

/// Retrieval knobs applied to every query.
#[derive(Debug, Clone, Copy)]
struct RetrievalSettings {
    default_top_k: usize,
    max_top_k: usize,
    relevance_threshold: f32,
}

/// Coordinates the full pipeline: PDF parsing, chunking, embedding, Chroma writes, and answers.
///
/// The service owns long-lived handles to every collaborator so the HTTP surface and the CLI
/// reuse the same components. Construct it once near process start and share it through an
/// `Arc`.
pub struct RagService {
    parser: DocumentParser,
    chunk_settings: ChunkSettings,
    embedding_client: Box<dyn EmbeddingClient>,
    embedding_dimension: usize,
    chroma: ChromaService,
    answer_client: Box<dyn AnswerClient>,
    retrieval: RetrievalSettings,
    metrics: Arc<RagMetrics>,
}

/// Abstraction over the RAG pipeline used by external surfaces (HTTP, CLI).
#[async_trait]
pub trait RagApi: Send + Sync {
    /// Ingest a PDF file, or every PDF below a directory.
    async fn ingest_path(&self, path: &Path) -> Result<IngestOutcome, RagError>;

    /// Ingest an uploaded PDF, attributing it to `filename`.
    async fn ingest_bytes(
        &self,
        filename: &str,
        bytes: Vec<u8>,
    ) -> Result<IngestOutcome, RagError>;

    /// Answer a question from the indexed documents.
    async fn query(&self, text: &str, top_k: Option<usize>) -> Result<QueryOutcome, RagError>;

    /// Report index size and in-process counters.
    async fn status(&self) -> Result<StatusReport, RagError>;

    /// List the distinct sources stored in the index.
    async fn list_documents(&self) -> Result<Vec<String>, RagError>;
}

impl RagService {
    /// Build the service with the production collaborators selected by `config`.
    pub fn from_config(config: &Config) -> Result<Self, RagError> {
        tracing::info!(provider = ?config.embedding_provider, "Initializing embedding client");
        let embedding_client = build_embedding_client(config);
        let answer_client = Box::new(GeminiClient::from_config(config));
        let ocr: Option<Arc<dyn OcrEngine>> = if config.ocr_enabled {
            Some(Arc::new(TesseractOcr::new(
                config.tesseract_cmd.clone(),
                config.ocr_language.clone(),
            )))
        } else {
            tracing::info!("OCR fallback disabled");
            None
        };
        Self::from_parts(config, embedding_client, answer_client, ocr)
    }

    /// Build the service around caller supplied collaborators.
    pub fn from_parts(
        config: &Config,
        embedding_client: Box<dyn EmbeddingClient>,
        answer_client: Box<dyn AnswerClient>,
        ocr: Option<Arc<dyn OcrEngine>>,
    ) -> Result<Self, RagError> {
        let chroma = ChromaService::new(ChromaSettings::from(config))?;
        tracing::debug!(
            collection = chroma.collection_name(),
            chunk_size = config.chunk_size,
            chunk_overlap = config.chunk_overlap,
            unit = ?config.chunk_unit,
            "RAG service configured"
        );

        Ok(Self {
            parser: DocumentParser::new(ocr),
            chunk_settings: ChunkSettings {
                size: config.chunk_size,
                overlap: config.chunk_overlap,
                unit: config.chunk_unit,
            },
            embedding_client,
            embedding_dimension: config.embedding_dimension,
            chroma,
            answer_client,
            retrieval: RetrievalSettings {
                default_top_k: config.default_top_k,
                max_top_k: config.max_top_k,
                relevance_threshold: config.relevance_threshold,
            },
            metrics: Arc::new(RagMetrics::new()),
        })
    }

    /// Ingest a PDF file, or every `*.pdf` below a directory.
    pub async fn ingest_path(&self, path: &Path) -> Result<IngestOutcome, RagError> {
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|_| RagError::NotFound(path.display().to_string()))?;

        if !metadata.is_dir() {
            let pages = self.parser.parse_file(path).await?;
            return self.index_pages(&path.display().to_string(), pages).await;
        }

        let files = collect_pdf_files(path);
        if files.is_empty() {
            tracing::warn!(directory = %path.display(), "No PDF files found");
        }

        let mut outcome = IngestOutcome::default();
        for file in files {
            let pages = self.parser.parse_file(&file).await?;
            outcome.absorb(self.index_pages(&file.display().to_string(), pages).await?);
        }
        tracing::info!(
            directory = %path.display(),
            documents = outcome.documents,
            chunks = outcome.chunks_added,
            "Directory ingested"
        );
        Ok(outcome)
    }

    /// Ingest an in-memory PDF under `filename`.
    pub async fn ingest_bytes(
        &self,
        filename: &str,
        bytes: Vec<u8>,
    ) -> Result<IngestOutcome, RagError> {
        let filename = filename.trim();
        if filename.is_empty() {
            return Err(RagError::InvalidRequest("filename must not be empty".into()));
        }
        if bytes.is_empty() {
            return Err(RagError::InvalidRequest("uploaded file is empty".into()));
        }
        tracing::info!(source = filename, bytes = bytes.len(), "Processing upload");
        let pages = self.parser.parse_bytes(bytes, filename).await?;
        self.index_pages(filename, pages).await
    }

    async fn index_pages(
        &self,
        source: &str,
        pages: Vec<PageText>,
    ) -> Result<IngestOutcome, RagError> {
        let chunks = chunk_pages(&pages, self.chunk_settings).map_err(IngestError::from)?;
        let (chunks, skipped_duplicates) = dedupe_chunks(chunks);

        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.content.clone()).collect();
        let embeddings = if texts.is_empty() {
            Vec::new()
        } else {
            self.embedding_client.generate_embeddings(texts).await?
        };
        for vector in &embeddings {
            self.check_dimension(vector)?;
        }

        let ingested_at = current_timestamp_rfc3339();
        let key = source_key(source);
        let records: Vec<ChunkRecord> = chunks
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| ChunkRecord {
                id: format!("{key}-{}", chunk.chunk_id),
                embedding,
                document: chunk.content,
                metadata: RecordMetadata {
                    source: chunk.source,
                    page: chunk.page_number,
                    chunk_id: chunk.chunk_id,
                    chunk_hash: chunk.chunk_hash,
                    ingested_at: ingested_at.clone(),
                },
            })
            .collect();

        let chunks_added = self.chroma.upsert(records).await?;
        self.chroma.delete_stale(source, &ingested_at).await?;
        self.metrics.record_document(chunks_added as u64);
        tracing::info!(
            source,
            pages = pages.len(),
            chunks = chunks_added,
            skipped_duplicates,
            "Document indexed"
        );

        Ok(IngestOutcome {
            documents: 1,
            pages: pages.len(),
            chunks_added,
            skipped_duplicates,
        })
    }

    /// Retrieve context for `text` and ask the model for an answer.
    pub async fn query(&self, text: &str, top_k: Option<usize>) -> Result<QueryOutcome, RagError> {
        let question = text.trim();
        if question.is_empty() {
            return Err(RagError::InvalidRequest("query must not be empty".into()));
        }
        let n_results = top_k
            .unwrap_or(self.retrieval.default_top_k)
            .clamp(1, self.retrieval.max_top_k.max(1));

        let mut vectors = self
            .embedding_client
            .generate_embeddings(vec![question.to_string()])
            .await?;
        let vector = vectors.pop().ok_or(RagError::EmptyEmbedding)?;
        self.check_dimension(&vector)?;

        let retrieved_chunks = self.chroma.query(vector, n_results).await?;
        let answer_source =
            choose_answer_source(&retrieved_chunks, self.retrieval.relevance_threshold);
        tracing::info!(
            top_k = n_results,
            hits = retrieved_chunks.len(),
            best_distance = retrieved_chunks.first().map(|hit| hit.distance),
            answer_source = ?answer_source,
            "Retrieved context"
        );

        let prompt = build_prompt(answer_source, question, &retrieved_chunks);
        let llm_answer = match self.answer_client.generate(&prompt).await {
            Ok(answer) => answer,
            Err(error) => {
                tracing::error!(error = %error, "Answer generation failed");
                self.metrics.record_generation_failure();
                GENERATION_FAILURE_ANSWER.to_string()
            }
        };
        self.metrics
            .record_query(answer_source == AnswerSource::GeneralKnowledge);

        Ok(QueryOutcome {
            llm_answer,
            answer_source,
            retrieved_chunks,
        })
    }

    /// Report the collection size alongside in-process counters.
    pub async fn status(&self) -> Result<StatusReport, RagError> {
        self.chroma.heartbeat().await?;
        let indexed_chunks = self.chroma.count().await?;
        Ok(StatusReport {
            indexed_chunks,
            metrics: self.metrics_snapshot(),
        })
    }

    /// Sorted, unique sources stored in the collection.
    pub async fn list_documents(&self) -> Result<Vec<String>, RagError> {
        Ok(self.chroma.list_sources().await?)
    }

    /// Return the current counters.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<(), RagError> {
        let expected = self.embedding_dimension;
        let actual = vector.len();
        if actual != expected {
            return Err(RagError::DimensionMismatch { expected, actual });
        }
        Ok(())
    }
}

#[async_trait]
impl RagApi for RagService {
    async fn ingest_path(&self, path: &Path) -> Result<IngestOutcome, RagError> {
        RagService::ingest_path(self, path).await
    }

    async fn ingest_bytes(
        &self,
        filename: &str,
        bytes: Vec<u8>,
    ) -> Result<IngestOutcome, RagError> {
        RagService::ingest_bytes(self, filename, bytes).await
    }

    async fn query(&self, text: &str, top_k: Option<usize>) -> Result<QueryOutcome, RagError> {
        RagService::query(self, text, top_k).await
    }

    async fn status(&self) -> Result<StatusReport, RagError> {
        RagService::status(self).await
    }

    async fn list_documents(&self) -> Result<Vec<String>, RagError> {
        RagService::list_documents(self).await
    }
}

/// Every `*.pdf` file below `root`, in a stable order.
fn collect_pdf_files(root: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| {
            entry.file_type().is_file()
                && entry
                    .path()
                    .extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
        })
        .map(|entry| entry.into_path())
        .collect();
    files.sort();
    files
}

/// Short stable prefix keeping record ids unique across sources that share a file stem.
fn source_key(source: &str) -> String {
    let mut key = compute_chunk_hash(source);
    key.truncate(SOURCE_KEY_LEN);
    key
}

fn current_timestamp_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}
