use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing ingestion and query activity.
#[derive(Default)]
pub struct RagMetrics {
    documents_ingested: AtomicU64,
    chunks_indexed: AtomicU64,
    queries_answered: AtomicU64,
    general_knowledge_answers: AtomicU64,
    generation_failures: AtomicU64,
}

impl RagMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an ingested document and the number of chunks stored for it.
    pub fn record_document(&self, chunk_count: u64) {
        self.documents_ingested.fetch_add(1, Ordering::Relaxed);
        self.chunks_indexed
            .fetch_add(chunk_count, Ordering::Relaxed);
    }

    /// Record an answered query, noting whether it fell back to general knowledge.
    pub fn record_query(&self, general_knowledge: bool) {
        self.queries_answered.fetch_add(1, Ordering::Relaxed);
        if general_knowledge {
            self.general_knowledge_answers
                .fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record an LLM call that failed and was replaced by the apology answer.
    pub fn record_generation_failure(&self) {
        self.generation_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            documents_ingested: self.documents_ingested.load(Ordering::Relaxed),
            chunks_indexed: self.chunks_indexed.load(Ordering::Relaxed),
            queries_answered: self.queries_answered.load(Ordering::Relaxed),
            general_knowledge_answers: self.general_knowledge_answers.load(Ordering::Relaxed),
            generation_failures: self.generation_failures.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of the counters used for reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Documents ingested since startup.
    pub documents_ingested: u64,
    /// Chunks written to the vector store since startup.
    pub chunks_indexed: u64,
    /// Queries answered since startup.
    pub queries_answered: u64,
    /// Answers produced without document context.
    pub general_knowledge_answers: u64,
    /// LLM calls that failed.
    pub generation_failures: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_documents_and_chunks() {
        let metrics = RagMetrics::new();
        metrics.record_document(2);
        metrics.record_document(3);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.documents_ingested, 2);
        assert_eq!(snapshot.chunks_indexed, 5);
    }

    #[test]
    fn records_queries_by_answer_mode() {
        let metrics = RagMetrics::new();
        metrics.record_query(false);
        metrics.record_query(true);
        metrics.record_query(true);
        metrics.record_generation_failure();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.queries_answered, 3);
        assert_eq!(snapshot.general_knowledge_answers, 2);
        assert_eq!(snapshot.generation_failures, 1);
    }

    #[test]
    fn fresh_snapshot_is_zeroed() {
        assert_eq!(RagMetrics::new().snapshot(), MetricsSnapshot::default());
    }
}
