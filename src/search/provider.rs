//! Provider and collection contracts implemented by every backend adapter.

use async_trait::async_trait;

use super::document::{Document, Link, Project, SearchRecord};
use super::error::SearchResult;
use super::facets::Facets;
use super::query::{SearchQuery, SearchResponse};
use crate::context::CallContext;

/// A searchable collection of records mapped to one backend index.
///
/// Writes return once the backend has applied them, so the next read observes
/// the change. Deleting a key that does not exist is `NotFound`.
#[async_trait]
pub trait Collection<R: SearchRecord>: Send + Sync {
    /// Index one record, overwriting any record with the same object id.
    async fn index(&self, ctx: &CallContext, record: &R) -> SearchResult<()>;

    /// Index many records as a single backend task.
    async fn index_batch(&self, ctx: &CallContext, records: &[R]) -> SearchResult<()>;

    async fn delete(&self, ctx: &CallContext, object_id: &str) -> SearchResult<()>;

    /// Delete many records as a single backend task.
    async fn delete_batch(&self, ctx: &CallContext, object_ids: &[String]) -> SearchResult<()>;

    /// Run a query. Unclassified backend failures pass through unchanged.
    async fn search(&self, ctx: &CallContext, query: &SearchQuery) -> SearchResult<SearchResponse<R>>;

    async fn get_object(&self, ctx: &CallContext, object_id: &str) -> SearchResult<R>;

    /// Remove every record, keeping the index and its settings.
    async fn clear(&self, ctx: &CallContext) -> SearchResult<()>;
}

/// Documents and drafts: a typed collection with facet summaries.
#[async_trait]
pub trait DocumentCollection: Collection<Document> {
    /// Facet counts across the whole collection. Never returns hits.
    async fn get_facets(&self, ctx: &CallContext, facet_names: &[String]) -> SearchResult<Facets>;
}

/// Redirect mappings: key/value storage without search.
#[async_trait]
pub trait LinkCollection: Send + Sync {
    async fn save_link(&self, ctx: &CallContext, link: &Link) -> SearchResult<()>;

    async fn get_link(&self, ctx: &CallContext, object_id: &str) -> SearchResult<Link>;

    async fn delete_link(&self, ctx: &CallContext, object_id: &str) -> SearchResult<()>;

    async fn clear(&self, ctx: &CallContext) -> SearchResult<()>;
}

/// Entry point to one search backend.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Backend name, e.g. `meilisearch`
    fn name(&self) -> &'static str;

    fn documents(&self) -> &dyn DocumentCollection;

    fn drafts(&self) -> &dyn DocumentCollection;

    fn projects(&self) -> &dyn Collection<Project>;

    fn links(&self) -> &dyn LinkCollection;

    /// `Ok(())` when the backend answers, `BackendUnavailable` otherwise.
    async fn healthy(&self, ctx: &CallContext) -> SearchResult<()>;
}
