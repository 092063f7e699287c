//! Algolia adapter.
//!
//! Construction performs no network I/O; it only validates credentials and
//! builds the client. Writes return a `taskID`, which the adapter polls until
//! Algolia reports it `published`.
//!
//! Per-query sorting is reported as `NotImplemented`, since Algolia sorts
//! through replica indices. Index settings (searchable and filterable
//! attributes) are managed in the Algolia dashboard, so there is no
//! counterpart to `MeilisearchProvider::ensure_indexes`.

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};
use validator::Validate;

use super::http::RestClient;
use super::{decode_hits, lookup_error, missing_object_id, observe, read_error, write_error};
use crate::context::CallContext;
use crate::search::facets::FACET_DIMENSIONS;
use crate::search::filter::{compile, AlgoliaDialect};
use crate::search::query::total_pages;
use crate::search::wait::{wait_for_task, TaskStatus, BATCH_WRITE_WAIT, SINGLE_WRITE_WAIT};
use crate::search::{
    AlgoliaConfig, BackendError, Collection, Document, DocumentCollection, ErrorKind, Facets,
    IndexNames, Link, LinkCollection, Project, SearchError, SearchProvider, SearchQuery,
    SearchRecord, SearchResponse, SearchResult,
};

pub const BACKEND_NAME: &str = "algolia";

const APPLICATION_ID_HEADER: &str = "x-algolia-application-id";
const API_KEY_HEADER: &str = "x-algolia-api-key";

#[derive(Debug, Deserialize)]
struct TaskReply {
    #[serde(rename = "taskID")]
    task_id: u64,
}

#[derive(Debug, Deserialize)]
struct TaskView {
    status: String,
}

#[derive(Debug, Deserialize)]
struct ObjectsReply {
    #[serde(default)]
    results: Vec<Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    query: &'a str,
    page: usize,
    hits_per_page: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    filters: Option<String>,
    #[serde(skip_serializing_if = "<[_]>::is_empty")]
    facets: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    highlight_pre_tag: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    highlight_post_tag: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryReply {
    #[serde(default)]
    hits: Vec<Value>,
    #[serde(default)]
    nb_hits: Option<u64>,
    #[serde(default)]
    facets: Value,
}

#[derive(Debug)]
struct Algolia {
    http: RestClient,
    poll_interval: Duration,
}

impl Algolia {
    fn index_path<'a>(index: &'a str, rest: &[&'a str]) -> Vec<&'a str> {
        let mut segments = vec!["1", "indexes", index];
        segments.extend_from_slice(rest);
        segments
    }

    async fn task_status(
        &self,
        ctx: &CallContext,
        index: &str,
        task: u64,
    ) -> Result<TaskStatus, BackendError> {
        let id = task.to_string();
        let view: TaskView = self
            .http
            .send(
                ctx,
                self.http
                    .request(Method::GET, &Self::index_path(index, &["task", &id])),
            )
            .await?;

        Ok(if view.status == "published" {
            TaskStatus::Succeeded {
                details: Value::Null,
            }
        } else {
            TaskStatus::Pending
        })
    }

    async fn write(
        &self,
        ctx: &CallContext,
        index: &str,
        request: reqwest::RequestBuilder,
        bound: Duration,
    ) -> Result<(), BackendError> {
        let reply: TaskReply = self.http.send(ctx, request).await?;
        let task = reply.task_id;
        wait_for_task(ctx, BACKEND_NAME, task, bound, self.poll_interval, move || {
            self.task_status(ctx, index, task)
        })
        .await
        .map(|_| ())
    }

    /// Object ids from `object_ids` that are absent from `index`.
    async fn missing(
        &self,
        ctx: &CallContext,
        index: &str,
        object_ids: &[&str],
    ) -> Result<Vec<String>, BackendError> {
        let requests: Vec<Value> = object_ids
            .iter()
            .map(|id| json!({"indexName": index, "objectID": id, "attributesToRetrieve": ["objectID"]}))
            .collect();
        let request = self
            .http
            .request(Method::POST, &["1", "indexes", "*", "objects"])
            .json(&json!({ "requests": requests }));

        let reply: ObjectsReply = match self.http.send(ctx, request).await {
            Ok(reply) => reply,
            Err(e) if e.is_not_found() => {
                return Ok(object_ids.iter().map(|id| id.to_string()).collect())
            }
            Err(e) => return Err(e),
        };

        Ok(object_ids
            .iter()
            .enumerate()
            .filter(|(i, _)| reply.results.get(*i).map_or(true, Value::is_null))
            .map(|(_, id)| id.to_string())
            .collect())
    }

    /// Delete keys that must all exist. Returns `NotFound` before deleting
    /// anything if one of them is absent. `batch` selects the batch endpoint
    /// and the longer wait.
    async fn delete_existing(
        &self,
        ctx: &CallContext,
        op: &'static str,
        index: &str,
        object_ids: &[&str],
        batch: bool,
    ) -> SearchResult<()> {
        let missing = self
            .missing(ctx, index, object_ids)
            .await
            .map_err(|e| write_error(op, e))?;
        if !missing.is_empty() {
            return Err(SearchError::new(
                op,
                ErrorKind::NotFound,
                format!("{} not found in {}", missing.join(", "), index),
            ));
        }

        let (request, bound) = match object_ids {
            [single] if !batch => (
                self.http
                    .request(Method::DELETE, &Self::index_path(index, &[*single])),
                SINGLE_WRITE_WAIT,
            ),
            _ => {
                let requests: Vec<Value> = object_ids
                    .iter()
                    .map(|id| json!({"action": "deleteObject", "body": {"objectID": id}}))
                    .collect();
                (
                    self.http
                        .request(Method::POST, &Self::index_path(index, &["batch"]))
                        .json(&json!({ "requests": requests })),
                    BATCH_WRITE_WAIT,
                )
            }
        };

        self.write(ctx, index, request, bound)
            .await
            .map_err(|e| write_error(op, e))
    }

    async fn clear(&self, ctx: &CallContext, index: &str) -> SearchResult<()> {
        let request = self
            .http
            .request(Method::POST, &Self::index_path(index, &["clear"]));
        self.write(ctx, index, request, BATCH_WRITE_WAIT)
            .await
            .map_err(|e| write_error("Clear", e))?;
        info!(index, "Index cleared");
        Ok(())
    }
}

fn search_error(op: &'static str, err: BackendError) -> SearchError {
    match err {
        BackendError::Status { status: 400, .. } => {
            SearchError::new(op, ErrorKind::InvalidQuery, err.to_string())
        }
        err if err.is_unreachable() || matches!(err, BackendError::Interrupted(_)) => {
            read_error(op, ErrorKind::BackendUnavailable, err)
        }
        err => SearchError::backend(op, err),
    }
}

/// A searchable Algolia index holding records of type `R`.
pub struct AlgoliaCollection<R> {
    algolia: Arc<Algolia>,
    index: String,
    _record: PhantomData<fn() -> R>,
}

impl<R: SearchRecord> AlgoliaCollection<R> {
    fn new(algolia: Arc<Algolia>, index: String) -> Self {
        Self {
            algolia,
            index,
            _record: PhantomData,
        }
    }

    fn http(&self) -> &RestClient {
        &self.algolia.http
    }

    async fn execute_query(
        &self,
        ctx: &CallContext,
        query: &SearchQuery,
        op: &'static str,
    ) -> SearchResult<(QueryReply, Duration)> {
        if query.sort_expression().is_some() {
            return Err(SearchError::new(
                op,
                ErrorKind::NotImplemented,
                "per-query sorting needs an Algolia replica index",
            ));
        }

        let body = QueryRequest {
            query: &query.query,
            page: query.page,
            hits_per_page: query.per_page,
            filters: compile(&AlgoliaDialect, query),
            facets: &query.facets,
            highlight_pre_tag: query.highlight.as_ref().map(|h| h.pre_tag.as_str()),
            highlight_post_tag: query.highlight.as_ref().map(|h| h.post_tag.as_str()),
        };

        let started = Instant::now();
        let request = self
            .http()
            .request(Method::POST, &Algolia::index_path(&self.index, &["query"]))
            .json(&body);
        let reply: QueryReply = self
            .http()
            .send(ctx, request)
            .await
            .map_err(|e| search_error(op, e))?;
        Ok((reply, started.elapsed()))
    }
}

#[async_trait]
impl<R: SearchRecord> Collection<R> for AlgoliaCollection<R> {
    async fn index(&self, ctx: &CallContext, record: &R) -> SearchResult<()> {
        observe(BACKEND_NAME, "Index", async {
            let object_id = record.object_id().ok_or_else(|| missing_object_id("Index"))?;
            let request = self
                .http()
                .request(Method::PUT, &Algolia::index_path(&self.index, &[object_id]))
                .json(record);
            self.algolia
                .write(ctx, &self.index, request, SINGLE_WRITE_WAIT)
                .await
                .map_err(|e| write_error("Index", e))?;

            debug!(index = %self.index, object_id, "Record indexed");
            Ok(())
        })
        .await
    }

    async fn index_batch(&self, ctx: &CallContext, records: &[R]) -> SearchResult<()> {
        observe(BACKEND_NAME, "IndexBatch", async {
            if records.is_empty() {
                return Ok(());
            }
            if records.iter().any(|r| r.object_id().is_none()) {
                return Err(missing_object_id("IndexBatch"));
            }

            let requests: Vec<Value> = records
                .iter()
                .map(|record| {
                    serde_json::to_value(record)
                        .map(|body| json!({"action": "updateObject", "body": body}))
                })
                .collect::<Result<_, _>>()
                .map_err(|e| write_error("IndexBatch", BackendError::Decode(e)))?;
            let request = self
                .http()
                .request(Method::POST, &Algolia::index_path(&self.index, &["batch"]))
                .json(&json!({ "requests": requests }));
            self.algolia
                .write(ctx, &self.index, request, BATCH_WRITE_WAIT)
                .await
                .map_err(|e| write_error("IndexBatch", e))?;

            debug!(index = %self.index, count = records.len(), "Records indexed");
            Ok(())
        })
        .await
    }

    async fn delete(&self, ctx: &CallContext, object_id: &str) -> SearchResult<()> {
        observe(BACKEND_NAME, "Delete", async {
            self.algolia
                .delete_existing(ctx, "Delete", &self.index, &[object_id], false)
                .await?;
            debug!(index = %self.index, object_id, "Record deleted");
            Ok(())
        })
        .await
    }

    async fn delete_batch(&self, ctx: &CallContext, object_ids: &[String]) -> SearchResult<()> {
        observe(BACKEND_NAME, "DeleteBatch", async {
            let mut ids: Vec<&str> = object_ids.iter().map(String::as_str).collect();
            ids.sort_unstable();
            ids.dedup();
            if ids.is_empty() {
                return Ok(());
            }
            self.algolia
                .delete_existing(ctx, "DeleteBatch", &self.index, &ids, true)
                .await
        })
        .await
    }

    async fn search(&self, ctx: &CallContext, query: &SearchQuery) -> SearchResult<SearchResponse<R>> {
        observe(BACKEND_NAME, "Search", async {
            let (reply, query_time) = self.execute_query(ctx, query, "Search").await?;

            let raw_count = reply.hits.len() as u64;
            let hits: Vec<R> = decode_hits(BACKEND_NAME, &self.index, reply.hits);
            let facets = Facets::from_json(reply.facets).unwrap_or_else(|e| {
                warn!(index = %self.index, error = %e, "Malformed facet distribution, using empty facets");
                Facets::default()
            });
            let total_hits = reply.nb_hits.unwrap_or(raw_count);

            Ok(SearchResponse {
                hits,
                total_hits,
                page: query.page,
                per_page: query.per_page,
                total_pages: total_pages(total_hits, query.per_page),
                facets,
                query_time,
            })
        })
        .await
    }

    async fn get_object(&self, ctx: &CallContext, object_id: &str) -> SearchResult<R> {
        observe(BACKEND_NAME, "GetObject", async {
            let request = self
                .http()
                .request(Method::GET, &Algolia::index_path(&self.index, &[object_id]));
            let raw: Value = self
                .http()
                .send(ctx, request)
                .await
                .map_err(|e| lookup_error("GetObject", e))?;
            serde_json::from_value(raw)
                .map_err(|e| SearchError::new("GetObject", ErrorKind::NotFound, e.to_string()))
        })
        .await
    }

    async fn clear(&self, ctx: &CallContext) -> SearchResult<()> {
        observe(BACKEND_NAME, "Clear", self.algolia.clear(ctx, &self.index)).await
    }
}

#[async_trait]
impl DocumentCollection for AlgoliaCollection<Document> {
    async fn get_facets(&self, ctx: &CallContext, facet_names: &[String]) -> SearchResult<Facets> {
        observe(BACKEND_NAME, "GetFacets", async {
            let names: Vec<String> = if facet_names.is_empty() {
                FACET_DIMENSIONS.iter().map(|(name, _)| name.to_string()).collect()
            } else {
                facet_names.to_vec()
            };
            let query = SearchQuery::new("").with_page(0, 0).with_facets(names);
            let (reply, _) = self.execute_query(ctx, &query, "GetFacets").await?;
            Facets::from_json(reply.facets)
                .map_err(|e| SearchError::backend("GetFacets", BackendError::Decode(e)))
        })
        .await
    }
}

/// Redirect links stored in an Algolia index.
pub struct AlgoliaLinks {
    algolia: Arc<Algolia>,
    index: String,
}

#[async_trait]
impl LinkCollection for AlgoliaLinks {
    async fn save_link(&self, ctx: &CallContext, link: &Link) -> SearchResult<()> {
        observe(BACKEND_NAME, "SaveLink", async {
            let object_id = link.object_id().ok_or_else(|| missing_object_id("SaveLink"))?;
            let request = self
                .algolia
                .http
                .request(Method::PUT, &Algolia::index_path(&self.index, &[object_id]))
                .json(link);
            self.algolia
                .write(ctx, &self.index, request, SINGLE_WRITE_WAIT)
                .await
                .map_err(|e| write_error("SaveLink", e))?;
            debug!(index = %self.index, object_id, "Link saved");
            Ok(())
        })
        .await
    }

    async fn get_link(&self, ctx: &CallContext, object_id: &str) -> SearchResult<Link> {
        observe(BACKEND_NAME, "GetLink", async {
            let request = self
                .algolia
                .http
                .request(Method::GET, &Algolia::index_path(&self.index, &[object_id]));
            let stored: Map<String, Value> = self
                .algolia
                .http
                .send(ctx, request)
                .await
                .map_err(|e| lookup_error("GetLink", e))?;
            Ok(Link::from_object(stored))
        })
        .await
    }

    async fn delete_link(&self, ctx: &CallContext, object_id: &str) -> SearchResult<()> {
        observe(
            BACKEND_NAME,
            "DeleteLink",
            self.algolia
                .delete_existing(ctx, "DeleteLink", &self.index, &[object_id], false),
        )
        .await
    }

    async fn clear(&self, ctx: &CallContext) -> SearchResult<()> {
        observe(BACKEND_NAME, "Clear", self.algolia.clear(ctx, &self.index)).await
    }
}

/// Search provider backed by Algolia.
pub struct AlgoliaProvider {
    algolia: Arc<Algolia>,
    indexes: IndexNames,
    documents: AlgoliaCollection<Document>,
    drafts: AlgoliaCollection<Document>,
    projects: AlgoliaCollection<Project>,
    links: AlgoliaLinks,
}

impl AlgoliaProvider {
    /// Validate credentials and build the client. No request is sent.
    pub fn new(config: AlgoliaConfig) -> SearchResult<Self> {
        config.validate()?;

        let mut headers = HeaderMap::new();
        for (name, value) in [
            (APPLICATION_ID_HEADER, config.application_id.as_str()),
            (API_KEY_HEADER, config.write_api_key.as_str()),
        ] {
            let value = HeaderValue::from_str(value).map_err(|e| {
                SearchError::configuration("new", format!("invalid value for {}: {}", name, e))
            })?;
            headers.insert(HeaderName::from_static(name), value);
        }

        let http = RestClient::new(
            BACKEND_NAME,
            &config.base_url(),
            Duration::from_secs(config.request_timeout_secs),
            headers,
        )?;
        let algolia = Arc::new(Algolia {
            http,
            poll_interval: Duration::from_millis(config.task_poll_interval_ms),
        });

        let indexes = config.indexes.clone();
        info!(application_id = %config.application_id, "Algolia provider configured");
        Ok(Self {
            documents: AlgoliaCollection::new(algolia.clone(), indexes.docs.clone()),
            drafts: AlgoliaCollection::new(algolia.clone(), indexes.drafts.clone()),
            projects: AlgoliaCollection::new(algolia.clone(), indexes.projects.clone()),
            links: AlgoliaLinks {
                algolia: algolia.clone(),
                index: indexes.links.clone(),
            },
            algolia,
            indexes,
        })
    }

    pub fn indexes(&self) -> &IndexNames {
        &self.indexes
    }
}

#[async_trait]
impl SearchProvider for AlgoliaProvider {
    fn name(&self) -> &'static str {
        BACKEND_NAME
    }

    fn documents(&self) -> &dyn DocumentCollection {
        &self.documents
    }

    fn drafts(&self) -> &dyn DocumentCollection {
        &self.drafts
    }

    fn projects(&self) -> &dyn Collection<Project> {
        &self.projects
    }

    fn links(&self) -> &dyn LinkCollection {
        &self.links
    }

    async fn healthy(&self, ctx: &CallContext) -> SearchResult<()> {
        observe(BACKEND_NAME, "Healthy", async {
            let request = self.algolia.http.request(
                Method::GET,
                &Algolia::index_path(&self.indexes.docs, &["settings"]),
            );
            self.algolia
                .http
                .send::<Value>(ctx, request)
                .await
                .map(|_| ())
                .map_err(|e| SearchError::new("Healthy", ErrorKind::BackendUnavailable, e.to_string()))
        })
        .await
    }
}
