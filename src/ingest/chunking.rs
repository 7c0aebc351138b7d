//! Page chunking with bounded size and sliding overlap.
//!
//! Each page is segmented independently with `semchunk-rs`, which prefers paragraph, sentence
//! and word boundaries. Segments are sized `chunk_size - chunk_overlap` so that prepending the
//! tail of the previous segment keeps every chunk within `chunk_size`. Length is measured in
//! characters by default, or in `cl100k_base` tokens when configured.

use super::PageText;
use crate::config::ChunkUnit;
use semchunk_rs::Chunker;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tiktoken_rs::cl100k_base;

type LengthCounter = Arc<dyn Fn(&str) -> usize + Send + Sync>;

/// Errors produced while turning page text into chunks.
#[derive(Debug, Error)]
pub enum ChunkingError {
    /// Ingestion configured an impossible size budget.
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,
    /// Overlap would leave no room for new content.
    #[error("chunk overlap ({overlap}) must be smaller than chunk size ({size})")]
    InvalidOverlap {
        /// Requested overlap.
        overlap: usize,
        /// Requested chunk size.
        size: usize,
    },
    /// Tokenizer resources could not be loaded.
    #[error("failed to initialize tokenizer: {0}")]
    Tokenizer(#[source] anyhow::Error),
}

/// Size budget applied by the chunker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSettings {
    /// Maximum chunk length.
    pub size: usize,
    /// Length shared between consecutive chunks of one page.
    pub overlap: usize,
    /// Unit used to measure `size` and `overlap`.
    pub unit: ChunkUnit,
}

impl Default for ChunkSettings {
    fn default() -> Self {
        Self {
            size: 1000,
            overlap: 200,
            unit: ChunkUnit::Chars,
        }
    }
}

/// Chunk of a page ready for embedding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentChunk {
    /// Human readable identifier, `{stem}_p{page}_c{n}`.
    pub chunk_id: String,
    /// Chunk text.
    pub content: String,
    /// Source path or upload name.
    pub source: String,
    /// 1-based page number the chunk came from.
    pub page_number: u32,
    /// SHA-256 of the chunk text, hex encoded.
    pub chunk_hash: String,
}

/// Split pages into chunks, numbering them per page starting at 1.
///
/// Whitespace-only pages produce no chunks.
pub fn chunk_pages(
    pages: &[PageText],
    settings: ChunkSettings,
) -> Result<Vec<DocumentChunk>, ChunkingError> {
    if settings.size == 0 {
        return Err(ChunkingError::InvalidChunkSize);
    }
    if settings.overlap >= settings.size {
        return Err(ChunkingError::InvalidOverlap {
            overlap: settings.overlap,
            size: settings.size,
        });
    }

    let counter = build_length_counter(settings.unit)?;
    let mut chunks = Vec::new();

    for page in pages {
        let stem = source_stem(&page.source);
        let pieces = chunk_text_with_counter(
            &page.content,
            settings.size,
            settings.overlap,
            counter.clone(),
        );
        chunks.extend(pieces.into_iter().enumerate().map(|(index, content)| {
            DocumentChunk {
                chunk_id: format!("{stem}_p{}_c{}", page.page_number, index + 1),
                chunk_hash: compute_chunk_hash(&content),
                content,
                source: page.source.clone(),
                page_number: page.page_number,
            }
        }));
    }

    tracing::info!(chunks = chunks.len(), pages = pages.len(), "Created chunks");
    Ok(chunks)
}

/// Remove chunks whose text already appeared earlier in the document, keeping the first.
///
/// Returns the surviving chunks and how many were skipped.
pub fn dedupe_chunks(chunks: Vec<DocumentChunk>) -> (Vec<DocumentChunk>, usize) {
    let mut seen = HashSet::new();
    let mut kept = Vec::with_capacity(chunks.len());
    let mut skipped = 0;

    for chunk in chunks {
        if chunk.content.trim().is_empty() {
            continue;
        }
        if seen.insert(chunk.chunk_hash.clone()) {
            kept.push(chunk);
        } else {
            skipped += 1;
        }
    }

    (kept, skipped)
}

/// Compute a deterministic SHA-256 hash for the chunk text.
pub fn compute_chunk_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

fn source_stem(source: &str) -> String {
    Path::new(source)
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .filter(|stem| !stem.is_empty())
        .unwrap_or_else(|| "document".to_string())
}

fn build_length_counter(unit: ChunkUnit) -> Result<LengthCounter, ChunkingError> {
    match unit {
        ChunkUnit::Chars => Ok(Arc::new(|segment: &str| segment.chars().count())),
        ChunkUnit::Tokens => {
            let encoding = Arc::new(cl100k_base().map_err(ChunkingError::Tokenizer)?);
            Ok(Arc::new(move |segment: &str| {
                encoding.encode_ordinary(segment).len()
            }))
        }
    }
}

fn chunk_text_with_counter(
    text: &str,
    chunk_size: usize,
    overlap: usize,
    counter: LengthCounter,
) -> Vec<String> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let segment_size = chunk_size.saturating_sub(overlap).max(1);
    let counter_for_chunker = counter.clone();
    let chunker = Chunker::new(
        segment_size,
        Box::new(move |segment: &str| counter_for_chunker.as_ref()(segment)),
    );
    let segments: Vec<String> = chunker
        .chunk(text)
        .into_iter()
        .filter(|segment| !segment.trim().is_empty())
        .collect();
    apply_overlap(segments, chunk_size, overlap, &counter)
}

/// Prefix each segment with the tail of its predecessor, bounded by `overlap`.
///
/// The result never exceeds `chunk_size`; an over-long combination is trimmed from the start.
fn apply_overlap(
    segments: Vec<String>,
    chunk_size: usize,
    overlap: usize,
    counter: &LengthCounter,
) -> Vec<String> {
    if overlap == 0 || segments.len() < 2 {
        return segments
            .into_iter()
            .map(|segment| trim_to_budget(&segment, chunk_size, counter))
            .collect();
    }

    let mut overlapped = Vec::with_capacity(segments.len());
    let mut previous: Option<String> = None;

    for current in segments {
        let chunk = match &previous {
            None => trim_to_budget(&current, chunk_size, counter),
            Some(prev) => build_overlapped_chunk(prev, &current, overlap, chunk_size, counter),
        };
        overlapped.push(chunk);
        previous = Some(current);
    }

    overlapped
}

fn build_overlapped_chunk(
    previous: &str,
    current: &str,
    overlap: usize,
    chunk_size: usize,
    counter: &LengthCounter,
) -> String {
    let tail = tail_within_budget(previous, overlap, counter);
    let mut combined = String::with_capacity(tail.len() + current.len() + 1);

    if !tail.is_empty() {
        combined.push_str(tail);
        if !ends_with_whitespace(tail) && !starts_with_whitespace(current) {
            combined.push(' ');
        }
    }

    combined.push_str(current);
    trim_to_budget(&combined, chunk_size, counter)
}

/// Longest suffix of `text` (starting on a char boundary, leading whitespace trimmed) that
/// fits within `budget`.
///
/// Suffix length only grows as the start moves left, so the first fitting start is found by
/// binary search over char boundaries.
fn tail_within_budget<'a>(text: &'a str, budget: usize, counter: &LengthCounter) -> &'a str {
    if budget == 0 {
        return "";
    }

    let starts: Vec<usize> = text.char_indices().map(|(start, _)| start).collect();
    let first_fit =
        starts.partition_point(|&start| counter.as_ref()(text[start..].trim_start()) > budget);

    starts
        .get(first_fit)
        .map(|&start| text[start..].trim_start())
        .unwrap_or("")
}

fn trim_to_budget(text: &str, budget: usize, counter: &LengthCounter) -> String {
    if counter.as_ref()(text) <= budget {
        return text.to_string();
    }
    tail_within_budget(text, budget, counter).to_string()
}

fn starts_with_whitespace(text: &str) -> bool {
    text.chars().next().is_some_and(char::is_whitespace)
}

fn ends_with_whitespace(text: &str) -> bool {
    text.chars().next_back().is_some_and(char::is_whitespace)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(source: &str, number: u32, content: &str) -> PageText {
        PageText {
            page_number: number,
            content: content.to_string(),
            source: source.to_string(),
        }
    }

    fn chars(size: usize, overlap: usize) -> ChunkSettings {
        ChunkSettings {
            size,
            overlap,
            unit: ChunkUnit::Chars,
        }
    }

    #[test]
    fn long_page_is_split_with_metadata() {
        let text = "This is a test sentence. ".repeat(100);
        let chunks = chunk_pages(&[page("dummy_source.pdf", 1, &text)], chars(150, 30))
            .expect("chunks");

        assert!(chunks.len() > 1, "should have created more than one chunk");
        let first = &chunks[0];
        assert_eq!(first.source, "dummy_source.pdf");
        assert_eq!(first.page_number, 1);
        assert_eq!(first.chunk_id, "dummy_source_p1_c1");
        assert_eq!(chunks[1].chunk_id, "dummy_source_p1_c2");
        for chunk in &chunks {
            assert!(chunk.content.chars().count() <= 150, "{:?}", chunk.content);
        }
    }

    #[test]
    fn consecutive_chunks_share_context() {
        let text = "alpha beta gamma delta epsilon zeta eta theta iota kappa lambda mu";
        let pieces = chunk_text_with_counter(text, 30, 10, build_length_counter(ChunkUnit::Chars).unwrap());

        assert!(pieces.len() > 1);
        for pair in pieces.windows(2) {
            let first_word_of_next = pair[1].split_whitespace().next().unwrap();
            assert!(
                pair[0].contains(first_word_of_next),
                "{:?} should start with context from {:?}",
                pair[1],
                pair[0]
            );
        }
        for piece in &pieces {
            assert!(piece.chars().count() <= 30);
        }
    }

    #[test]
    fn chunk_ids_restart_per_page_and_use_file_stem() {
        let pages = vec![
            page("/data/reports/annual.pdf", 1, "First page."),
            page("/data/reports/annual.pdf", 2, "Second page."),
        ];
        let chunks = chunk_pages(&pages, ChunkSettings::default()).expect("chunks");

        let ids: Vec<_> = chunks.iter().map(|chunk| chunk.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["annual_p1_c1", "annual_p2_c1"]);
    }

    #[test]
    fn whitespace_pages_produce_no_chunks() {
        let chunks = chunk_pages(&[page("x.pdf", 1, "   \n\t ")], chars(50, 10)).expect("chunks");
        assert!(chunks.is_empty());
    }

    #[test]
    fn zero_chunk_size_is_rejected() {
        let error = chunk_pages(&[page("x.pdf", 1, "hello")], chars(0, 0)).unwrap_err();
        assert!(matches!(error, ChunkingError::InvalidChunkSize));
    }

    #[test]
    fn overlap_not_smaller_than_size_is_rejected() {
        let error = chunk_pages(&[page("x.pdf", 1, "hello")], chars(10, 10)).unwrap_err();
        assert!(matches!(error, ChunkingError::InvalidOverlap { overlap: 10, size: 10 }));
    }

    #[test]
    fn token_budget_is_respected() {
        let text = "The quick brown fox jumps over the lazy dog. ".repeat(20);
        let settings = ChunkSettings {
            size: 16,
            overlap: 4,
            unit: ChunkUnit::Tokens,
        };
        let chunks = chunk_pages(&[page("fox.pdf", 3, &text)], settings).expect("chunks");
        let counter = build_length_counter(ChunkUnit::Tokens).unwrap();

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(counter.as_ref()(&chunk.content) <= 16);
            assert_eq!(chunk.page_number, 3);
        }
    }

    #[test]
    fn dedupe_keeps_first_occurrence() {
        let pages = vec![
            page("deck.pdf", 1, "Confidential"),
            page("deck.pdf", 2, "Quarterly results"),
            page("deck.pdf", 3, "Confidential"),
        ];
        let chunks = chunk_pages(&pages, ChunkSettings::default()).expect("chunks");
        let (kept, skipped) = dedupe_chunks(chunks);

        assert_eq!(skipped, 1);
        let ids: Vec<_> = kept.iter().map(|chunk| chunk.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["deck_p1_c1", "deck_p2_c1"]);
    }

    #[test]
    fn chunk_hash_is_stable() {
        let h1 = compute_chunk_hash("Hello world");
        let h2 = compute_chunk_hash("Hello world");
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 64);
        assert_ne!(h1, compute_chunk_hash("Hello world!"));
    }

    #[test]
    fn tail_search_counts_logarithmically() {
        let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let seen = calls.clone();
        let counter: LengthCounter = Arc::new(move |segment: &str| {
            seen.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            segment.chars().count()
        });
        let text = "word ".repeat(2_000);

        let tail = tail_within_budget(&text, 12, &counter);

        assert_eq!(tail, "d word word ");
        assert!(calls.load(std::sync::atomic::Ordering::Relaxed) <= 20);
    }

    #[test]
    fn tail_keeps_multibyte_boundaries() {
        let counter = build_length_counter(ChunkUnit::Chars).unwrap();
        assert_eq!(tail_within_budget("héllo wörld", 5, &counter), "wörld");
        assert_eq!(tail_within_budget("ab", 0, &counter), "");
    }

    #[test]
    fn trim_to_budget_drops_leading_text() {
        let counter = build_length_counter(ChunkUnit::Chars).unwrap();
        assert_eq!(trim_to_budget("abc def", 3, &counter), "def");
        assert_eq!(trim_to_budget("abc", 3, &counter), "abc");
    }
}
