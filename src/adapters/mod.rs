//! Backend adapters.
//!
//! Each adapter implements [`SearchProvider`](crate::search::SearchProvider)
//! over one backend's REST API:
//!
//! - [`meilisearch`]: full-featured, including index settings management.
//! - [`algolia`]: writes, lookups, search and facets. Per-query sorting and
//!   index settings are managed outside this crate and report
//!   `NotImplemented`.

pub mod algolia;
mod http;
pub mod meilisearch;

pub use algolia::AlgoliaProvider;
pub use meilisearch::MeilisearchProvider;

use std::future::Future;
use std::time::Instant;

use serde_json::Value;
use tracing::warn;

use crate::metrics::{self, SEARCH_HITS_DROPPED_TOTAL};
use crate::search::{BackendError, ErrorKind, RecordKind, SearchError, SearchRecord, SearchResult};

/// Per-hit annotations the backends add to search results.
const HIT_METADATA_FIELDS: &[&str] = &[
    "_formatted",
    "_matchesPosition",
    "_rankingScore",
    "_rankingScoreDetails",
    "_highlightResult",
    "_snippetResult",
    "_rankingInfo",
    "_distinctSeqID",
];

/// Time an operation and record its outcome.
pub(crate) async fn observe<T, F>(backend: &'static str, op: &'static str, fut: F) -> SearchResult<T>
where
    F: Future<Output = SearchResult<T>>,
{
    let started = Instant::now();
    let result = fut.await;
    metrics::record_operation(backend, op, started.elapsed(), &result);
    result
}

/// Decode raw hits, dropping any that do not fit the record shape.
///
/// Freeform records keep every stored key, so hit annotations are removed
/// first to make a hit equal the stored record.
pub(crate) fn decode_hits<R: SearchRecord>(
    backend: &'static str,
    index: &str,
    raw: Vec<Value>,
) -> Vec<R> {
    raw.into_iter()
        .map(|mut hit| {
            if R::KIND == RecordKind::Freeform {
                if let Value::Object(fields) = &mut hit {
                    fields.retain(|key, _| !HIT_METADATA_FIELDS.contains(&key.as_str()));
                }
            }
            hit
        })
        .filter_map(|hit| match serde_json::from_value(hit) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(backend, index, error = %e, "Dropping undecodable search hit");
                SEARCH_HITS_DROPPED_TOTAL
                    .with_label_values(&[backend, index])
                    .inc();
                None
            }
        })
        .collect()
}

/// Classify a failed read. Interrupted reads count as the backend being
/// unavailable to this caller.
pub(crate) fn read_error(op: &'static str, fallback: ErrorKind, err: BackendError) -> SearchError {
    match err {
        BackendError::Interrupted(_) => {
            SearchError::new(op, ErrorKind::BackendUnavailable, err.to_string())
        }
        err => SearchError::classify(op, fallback, err),
    }
}

/// Classify a failed point lookup. Any 4xx means the key cannot be served.
pub(crate) fn lookup_error(op: &'static str, err: BackendError) -> SearchError {
    match &err {
        BackendError::Status { status, .. } if (400..500).contains(status) => {
            SearchError::new(op, ErrorKind::NotFound, err.to_string())
        }
        _ => read_error(op, ErrorKind::BackendUnavailable, err),
    }
}

/// Classify a failed write.
pub(crate) fn write_error(op: &'static str, err: BackendError) -> SearchError {
    SearchError::classify(op, ErrorKind::IndexingFailed, err)
}

pub(crate) fn missing_object_id(op: &'static str) -> SearchError {
    SearchError::new(op, ErrorKind::IndexingFailed, "record has no objectID")
}
