//! Mapping helpers between Chroma wire payloads and domain types.

use crate::chroma::types::{ChromaError, ChunkMetadata, QueryResponse, RetrievedChunk};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// Flatten the single-query response into hits sorted by ascending distance.
///
/// Rows missing text, metadata or distance are skipped.
pub(crate) fn map_query_response(response: QueryResponse) -> Result<Vec<RetrievedChunk>, ChromaError> {
    let documents = first_row(response.documents, "documents")?;
    let metadatas = first_row(response.metadatas, "metadatas")?;
    let distances = first_row(response.distances, "distances")?;

    if documents.len() != metadatas.len() || documents.len() != distances.len() {
        return Err(ChromaError::InvalidResponse(format!(
            "query columns differ in length (documents={}, metadatas={}, distances={})",
            documents.len(),
            metadatas.len(),
            distances.len()
        )));
    }

    let mut hits: Vec<RetrievedChunk> = documents
        .into_iter()
        .zip(metadatas)
        .zip(distances)
        .filter_map(|((document, metadata), distance)| {
            let content = document?;
            let metadata = metadata.as_ref().and_then(metadata_from_map)?;
            Some(RetrievedChunk {
                content,
                metadata,
                distance: distance?,
            })
        })
        .collect();

    hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    Ok(hits)
}

fn first_row<T>(column: Option<Vec<Vec<T>>>, name: &str) -> Result<Vec<T>, ChromaError> {
    let rows = column.ok_or_else(|| {
        ChromaError::InvalidResponse(format!("query response is missing '{name}'"))
    })?;
    Ok(rows.into_iter().next().unwrap_or_default())
}

/// Read `source` and `page` from a metadata map.
pub(crate) fn metadata_from_map(map: &Map<String, Value>) -> Option<ChunkMetadata> {
    let source = map.get("source")?.as_str()?.trim();
    if source.is_empty() {
        return None;
    }
    let page = match map.get("page")? {
        Value::Number(number) => number
            .as_u64()
            .or_else(|| number.as_f64().map(|value| value as u64))?,
        Value::String(text) => text.trim().parse().ok()?,
        _ => return None,
    };
    Some(ChunkMetadata {
        source: source.to_string(),
        page: u32::try_from(page).ok()?,
    })
}

/// Insert the `source` value of a metadata map into the set.
pub(crate) fn accumulate_source(map: &Map<String, Value>, sources: &mut BTreeSet<String>) {
    if let Some(source) = map
        .get("source")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
    {
        sources.insert(source.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn response(value: Value) -> QueryResponse {
        serde_json::from_value(value).expect("query response")
    }

    #[test]
    fn query_rows_are_sorted_by_distance() {
        let hits = map_query_response(response(json!({
            "ids": [["b", "a"]],
            "documents": [["The grass is green.", "The sky is blue."]],
            "metadatas": [[
                { "source": "doc1.pdf", "page": 2 },
                { "source": "doc1.pdf", "page": 1 }
            ]],
            "distances": [[0.42, 0.12]]
        })))
        .expect("hits");

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].content, "The sky is blue.");
        assert_eq!(hits[0].metadata.page, 1);
        assert!(hits[0].distance < hits[1].distance);
    }

    #[test]
    fn empty_result_rows_yield_no_hits() {
        let hits = map_query_response(response(json!({
            "ids": [[]],
            "documents": [[]],
            "metadatas": [[]],
            "distances": [[]]
        })))
        .expect("hits");
        assert!(hits.is_empty());
    }

    #[test]
    fn rows_without_metadata_are_skipped() {
        let hits = map_query_response(response(json!({
            "ids": [["a", "b"]],
            "documents": [["kept", "dropped"]],
            "metadatas": [[{ "source": "x.pdf", "page": 3 }, null]],
            "distances": [[0.1, 0.2]]
        })))
        .expect("hits");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].content, "kept");
    }

    #[test]
    fn missing_columns_are_reported() {
        let error = map_query_response(response(json!({
            "ids": [["a"]],
            "documents": [["text"]],
            "metadatas": [[{ "source": "x.pdf", "page": 1 }]]
        })))
        .unwrap_err();
        assert!(matches!(error, ChromaError::InvalidResponse(message) if message.contains("distances")));
    }

    #[test]
    fn metadata_accepts_numeric_strings_and_floats() {
        let from_float = json!({ "source": "a.pdf", "page": 4.0 });
        let from_string = json!({ "source": "a.pdf", "page": "5" });
        assert_eq!(
            metadata_from_map(from_float.as_object().unwrap()).map(|meta| meta.page),
            Some(4)
        );
        assert_eq!(
            metadata_from_map(from_string.as_object().unwrap()).map(|meta| meta.page),
            Some(5)
        );
    }

    #[test]
    fn sources_are_deduplicated_and_sorted() {
        let mut sources = BTreeSet::new();
        for value in [
            json!({ "source": "b.pdf" }),
            json!({ "source": "a.pdf" }),
            json!({ "source": "b.pdf" }),
            json!({ "source": "  " }),
        ] {
            accumulate_source(value.as_object().unwrap(), &mut sources);
        }
        assert_eq!(sources.into_iter().collect::<Vec<_>>(), vec!["a.pdf", "b.pdf"]);
    }
}
