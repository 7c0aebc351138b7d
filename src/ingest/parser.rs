//! PDF text extraction with an OCR fallback for scanned pages.
//!
//! Pages are read with `lopdf` on the blocking pool. A page whose text layer is empty (or
//! fails to decode) has its image XObjects collected and handed to the configured
//! [`OcrEngine`]. Pages that still have no text are dropped.

use super::{IngestError, OcrEngine};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use std::path::Path;
use std::sync::Arc;

const MAX_PAGE_TREE_DEPTH: usize = 32;

/// Text recovered from one PDF page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageText {
    /// 1-based page number.
    pub page_number: u32,
    /// Trimmed page text.
    pub content: String,
    /// Source path or upload name the page came from.
    pub source: String,
}

/// Page as read from the PDF, before OCR.
#[derive(Debug)]
struct RawPage {
    number: u32,
    text: String,
    images: Vec<Vec<u8>>,
}

/// Extracts page text from PDFs, optionally running OCR on image-only pages.
#[derive(Clone, Default)]
pub struct DocumentParser {
    ocr: Option<Arc<dyn OcrEngine>>,
}

impl DocumentParser {
    /// Build a parser; `ocr` of `None` disables the scanned-page fallback.
    pub fn new(ocr: Option<Arc<dyn OcrEngine>>) -> Self {
        Self { ocr }
    }

    /// Extract the pages of the PDF at `path`. The path's display form becomes the source.
    pub async fn parse_file(&self, path: &Path) -> Result<Vec<PageText>, IngestError> {
        let source = path.display().to_string();
        tracing::info!(source = %source, "Processing PDF");
        let bytes = tokio::fs::read(path).await.map_err(|source_error| IngestError::Io {
            path: source.clone(),
            source: source_error,
        })?;
        self.parse_bytes(bytes, &source).await
    }

    /// Extract the pages of an in-memory PDF, attributing them to `source`.
    pub async fn parse_bytes(
        &self,
        bytes: Vec<u8>,
        source: &str,
    ) -> Result<Vec<PageText>, IngestError> {
        let collect_images = self.ocr.is_some();
        let owned_source = source.to_string();
        let raw_pages = tokio::task::spawn_blocking(move || {
            let document = Document::load_mem(&bytes).map_err(|error| IngestError::PdfParse {
                path: owned_source.clone(),
                message: error.to_string(),
            })?;
            Ok::<_, IngestError>(scan_document(&document, &owned_source, collect_images))
        })
        .await
        .map_err(|error| IngestError::Task(error.to_string()))??;

        Ok(self.finish_pages(raw_pages, source).await)
    }

    async fn finish_pages(&self, raw_pages: Vec<RawPage>, source: &str) -> Vec<PageText> {
        let mut pages = Vec::with_capacity(raw_pages.len());

        for raw in raw_pages {
            let mut content = raw.text;

            if content.trim().is_empty()
                && let Some(ocr) = &self.ocr
            {
                tracing::info!(source, page = raw.number, "No text found; attempting OCR");
                content.clear();
                for (index, image) in raw.images.iter().enumerate() {
                    match ocr.recognize(image).await {
                        Ok(text) => content.push_str(&text),
                        Err(error) => tracing::error!(
                            source,
                            page = raw.number,
                            image = index,
                            error = %error,
                            "OCR failed for page image"
                        ),
                    }
                }
            }

            let trimmed = content.trim();
            if trimmed.is_empty() {
                tracing::warn!(
                    source,
                    page = raw.number,
                    "Page is empty or contains no extractable text"
                );
                continue;
            }

            pages.push(PageText {
                page_number: raw.number,
                content: trimmed.to_string(),
                source: source.to_string(),
            });
        }

        tracing::debug!(source, pages = pages.len(), "PDF text extraction complete");
        pages
    }
}

fn scan_document(document: &Document, source: &str, collect_images: bool) -> Vec<RawPage> {
    document
        .get_pages()
        .into_iter()
        .map(|(number, page_id)| {
            let text = match document.extract_text(&[number]) {
                Ok(text) => text,
                Err(error) => {
                    tracing::warn!(
                        source,
                        page = number,
                        error = %error,
                        "Could not extract text directly from page"
                    );
                    String::new()
                }
            };

            let images = if collect_images && text.trim().is_empty() {
                page_images(document, page_id)
            } else {
                Vec::new()
            };

            RawPage {
                number,
                text,
                images,
            }
        })
        .collect()
}

/// Collect OCR-ready encodings of every image XObject referenced by the page resources.
fn page_images(document: &Document, page_id: ObjectId) -> Vec<Vec<u8>> {
    let Some(resources) = page_resources(document, page_id) else {
        return Vec::new();
    };
    let Some(xobjects) = resolve_dict(document, resources.get(b"XObject").ok()) else {
        return Vec::new();
    };

    xobjects
        .iter()
        .filter_map(|(_, object)| {
            let (_, resolved) = document.dereference(object).ok()?;
            let stream = resolved.as_stream().ok()?;
            encode_image(stream)
        })
        .collect()
}

/// Find the page resources, following the `Parent` chain for inherited entries.
fn page_resources(document: &Document, page_id: ObjectId) -> Option<&Dictionary> {
    let mut node = document.get_dictionary(page_id).ok()?;
    for _ in 0..MAX_PAGE_TREE_DEPTH {
        if let Some(resources) = resolve_dict(document, node.get(b"Resources").ok()) {
            return Some(resources);
        }
        let parent = node.get(b"Parent").ok()?.as_reference().ok()?;
        node = document.get_dictionary(parent).ok()?;
    }
    None
}

fn resolve_dict<'a>(document: &'a Document, object: Option<&'a Object>) -> Option<&'a Dictionary> {
    let (_, resolved) = document.dereference(object?).ok()?;
    resolved.as_dict().ok()
}

fn filter_names(dict: &Dictionary) -> Vec<Vec<u8>> {
    match dict.get(b"Filter") {
        Ok(Object::Name(name)) => vec![name.clone()],
        Ok(Object::Array(items)) => items
            .iter()
            .filter_map(|item| item.as_name().ok().map(<[u8]>::to_vec))
            .collect(),
        _ => Vec::new(),
    }
}

/// Turn an image XObject into bytes an OCR engine can decode.
///
/// JPEG and JPEG 2000 streams are already self-describing. 8-bit gray and RGB bitmaps are
/// wrapped in a binary PNM header. Anything else is skipped.
fn encode_image(stream: &Stream) -> Option<Vec<u8>> {
    let subtype = stream.dict.get(b"Subtype").ok()?.as_name().ok()?;
    if subtype != b"Image" {
        return None;
    }

    let filters = filter_names(&stream.dict);
    match filters.as_slice() {
        [single] if single == b"DCTDecode" || single == b"JPXDecode" => {
            return Some(stream.content.clone());
        }
        [] => encode_bitmap(&stream.dict, &stream.content),
        [single] if single == b"FlateDecode" => {
            let pixels = stream.decompressed_content().ok()?;
            encode_bitmap(&stream.dict, &pixels)
        }
        _ => {
            let names: Vec<_> = filters.iter().map(|f| String::from_utf8_lossy(f)).collect();
            tracing::debug!(filters = ?names, "Skipping image with unsupported filters");
            None
        }
    }
}

fn encode_bitmap(dict: &Dictionary, pixels: &[u8]) -> Option<Vec<u8>> {
    let width = usize::try_from(dict.get(b"Width").ok()?.as_i64().ok()?).ok()?;
    let height = usize::try_from(dict.get(b"Height").ok()?.as_i64().ok()?).ok()?;
    let bits = dict
        .get(b"BitsPerComponent")
        .ok()
        .and_then(|value| value.as_i64().ok())
        .unwrap_or(8);
    if bits != 8 || width == 0 || height == 0 {
        return None;
    }

    let (magic, channels) = match dict.get(b"ColorSpace").ok()?.as_name().ok()? {
        b"DeviceGray" => ("P5", 1),
        b"DeviceRGB" => ("P6", 3),
        _ => return None,
    };

    let expected = width.checked_mul(height)?.checked_mul(channels)?;
    if pixels.len() < expected {
        return None;
    }

    let mut encoded = format!("{magic}\n{width} {height}\n255\n").into_bytes();
    encoded.extend_from_slice(&pixels[..expected]);
    Some(encoded)
}
