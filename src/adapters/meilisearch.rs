//! Meilisearch adapter.
//!
//! Every write is a Meilisearch task: the adapter submits it, then polls
//! `GET /tasks/{uid}` until the task is terminal or the wait bound runs out.
//! Construction creates the four indexes and applies their attribute
//! settings. Both steps are idempotent, so running them on every start is
//! safe.
//!
//! Meilisearch only accepts `[A-Za-z0-9_-]` in document ids, while redirect
//! keys look like `/rfc/tf-123`. The links collection therefore stores each
//! link under a hex-encoded key and keeps the caller's key in a separate
//! field. Hex doubles the length, so link keys are limited to 255 bytes.

use std::collections::BTreeSet;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};
use validator::Validate;

use super::http::RestClient;
use super::{decode_hits, lookup_error, missing_object_id, observe, read_error, write_error};
use crate::context::CallContext;
use crate::search::facets::FACET_DIMENSIONS;
use crate::search::filter::{compile, MeilisearchDialect};
use crate::search::query::total_pages;
use crate::search::wait::{wait_for_task, TaskStatus, BATCH_WRITE_WAIT, SINGLE_WRITE_WAIT};
use crate::search::{
    BackendError, Collection, Document, DocumentCollection, ErrorKind, Facets, IndexNames, Link,
    LinkCollection, MeilisearchConfig, Project, SearchError, SearchProvider, SearchQuery,
    SearchRecord, SearchResponse, SearchResult, OBJECT_ID_FIELD,
};

pub const BACKEND_NAME: &str = "meilisearch";

/// Field holding the caller's key in the links index.
const LINK_KEY_FIELD: &str = "linkObjectID";

/// Longest document id Meilisearch accepts, in bytes.
const MAX_DOCUMENT_ID_BYTES: usize = 511;

/// Attribute settings applied to an index at construction
#[derive(Debug)]
pub struct IndexSettings {
    pub searchable: &'static [&'static str],
    pub filterable: &'static [&'static str],
    pub sortable: &'static [&'static str],
}

/// Documents and drafts
pub const DOCUMENT_SETTINGS: IndexSettings = IndexSettings {
    searchable: &["title", "docNumber", "summary", "content", "owners", "contributors"],
    filterable: &[
        "product",
        "docType",
        "status",
        "owners",
        "contributors",
        "approvers",
        "createdTime",
        "modifiedTime",
        "appCreated",
        "approvedBy",
    ],
    sortable: &["createdTime", "modifiedTime", "title"],
};

pub const PROJECT_SETTINGS: IndexSettings = IndexSettings {
    searchable: &["title", "description", "jiraIssueID"],
    filterable: &["status", "createdTime", "modifiedTime"],
    sortable: &["createdTime", "modifiedTime", "title"],
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EnqueuedTask {
    task_uid: u64,
}

#[derive(Debug, Default, Deserialize)]
struct TaskFailure {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct TaskView {
    status: String,
    #[serde(default)]
    error: Option<TaskFailure>,
    #[serde(default)]
    details: Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchRequest<'a> {
    q: &'a str,
    limit: usize,
    offset: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<String>,
    #[serde(skip_serializing_if = "<[_]>::is_empty")]
    facets: &'a [String],
    #[serde(skip_serializing_if = "Vec::is_empty")]
    sort: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    attributes_to_highlight: Option<[&'static str; 1]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    highlight_pre_tag: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    highlight_post_tag: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchReply {
    #[serde(default)]
    hits: Vec<Value>,
    #[serde(default)]
    estimated_total_hits: Option<u64>,
    #[serde(default)]
    total_hits: Option<u64>,
    #[serde(default)]
    facet_distribution: Value,
}

#[derive(Debug, Deserialize)]
struct HealthReply {
    status: String,
}

/// Connection state shared by every collection of one provider.
#[derive(Debug)]
struct Meili {
    http: RestClient,
    poll_interval: Duration,
}

impl Meili {
    fn index_path<'a>(index: &'a str, rest: &[&'a str]) -> Vec<&'a str> {
        let mut segments = vec!["indexes", index];
        segments.extend_from_slice(rest);
        segments
    }

    async fn task_status(&self, ctx: &CallContext, task: u64) -> Result<TaskStatus, BackendError> {
        let uid = task.to_string();
        let view: TaskView = self
            .http
            .send(ctx, self.http.request(Method::GET, &["tasks", &uid]))
            .await?;

        Ok(match view.status.as_str() {
            "succeeded" => TaskStatus::Succeeded {
                details: view.details,
            },
            "failed" | "canceled" => {
                let failure = view.error.unwrap_or_default();
                TaskStatus::Failed {
                    code: if failure.code.is_empty() {
                        format!("task_{}", view.status)
                    } else {
                        failure.code
                    },
                    message: failure.message,
                }
            }
            _ => TaskStatus::Pending,
        })
    }

    /// Submit a task-producing request and wait for the task to finish.
    async fn write(
        &self,
        ctx: &CallContext,
        request: reqwest::RequestBuilder,
        bound: Duration,
    ) -> Result<Value, BackendError> {
        let enqueued: EnqueuedTask = self.http.send(ctx, request).await?;
        let task = enqueued.task_uid;
        wait_for_task(ctx, BACKEND_NAME, task, bound, self.poll_interval, move || {
            self.task_status(ctx, task)
        })
        .await
    }
}

/// Number of documents a deletion task actually removed.
fn deleted_documents(details: &Value) -> Option<u64> {
    details.get("deletedDocuments").and_then(Value::as_u64)
}

fn is_index_missing(err: &BackendError) -> bool {
    err.code() == Some("index_not_found")
}

fn delete_error(op: &'static str, err: BackendError) -> SearchError {
    if is_index_missing(&err) {
        SearchError::new(op, ErrorKind::NotFound, err.to_string())
    } else {
        write_error(op, err)
    }
}

fn search_error(op: &'static str, err: BackendError) -> SearchError {
    let invalid = err
        .code()
        .is_some_and(|code| code.starts_with("invalid_search_"));
    if invalid {
        SearchError::new(op, ErrorKind::InvalidQuery, err.to_string())
    } else if err.is_unreachable() || matches!(err, BackendError::Interrupted(_)) {
        read_error(op, ErrorKind::BackendUnavailable, err)
    } else {
        SearchError::backend(op, err)
    }
}

/// A searchable Meilisearch index holding records of type `R`.
///
/// Documents and drafts are both `MeiliCollection<Document>` over different
/// indexes, so they cannot diverge.
pub struct MeiliCollection<R> {
    meili: Arc<Meili>,
    index: String,
    _record: PhantomData<fn() -> R>,
}

impl<R: SearchRecord> MeiliCollection<R> {
    fn new(meili: Arc<Meili>, index: String) -> Self {
        Self {
            meili,
            index,
            _record: PhantomData,
        }
    }

    pub fn index_name(&self) -> &str {
        &self.index
    }

    fn http(&self) -> &RestClient {
        &self.meili.http
    }

    async fn execute_search(
        &self,
        ctx: &CallContext,
        query: &SearchQuery,
        op: &'static str,
    ) -> SearchResult<(SearchReply, Duration)> {
        let body = SearchRequest {
            q: &query.query,
            limit: query.per_page,
            offset: query.offset(),
            filter: compile(&MeilisearchDialect, query),
            facets: &query.facets,
            sort: query.sort_expression().into_iter().collect(),
            attributes_to_highlight: query.highlight.as_ref().map(|_| ["*"]),
            highlight_pre_tag: query.highlight.as_ref().map(|h| h.pre_tag.as_str()),
            highlight_post_tag: query.highlight.as_ref().map(|h| h.post_tag.as_str()),
        };

        let started = Instant::now();
        let request = self
            .http()
            .request(Method::POST, &Meili::index_path(&self.index, &["search"]))
            .json(&body);
        let reply: SearchReply = self
            .http()
            .send(ctx, request)
            .await
            .map_err(|e| search_error(op, e))?;
        Ok((reply, started.elapsed()))
    }
}

#[async_trait]
impl<R: SearchRecord> Collection<R> for MeiliCollection<R> {
    async fn index(&self, ctx: &CallContext, record: &R) -> SearchResult<()> {
        observe(BACKEND_NAME, "Index", async {
            let object_id = record.object_id().ok_or_else(|| missing_object_id("Index"))?;
            let request = self
                .http()
                .request(Method::POST, &Meili::index_path(&self.index, &["documents"]))
                .query(&[("primaryKey", OBJECT_ID_FIELD)])
                .json(std::slice::from_ref(record));
            self.meili
                .write(ctx, request, SINGLE_WRITE_WAIT)
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

            let request = self
                .http()
                .request(Method::POST, &Meili::index_path(&self.index, &["documents"]))
                .query(&[("primaryKey", OBJECT_ID_FIELD)])
                .json(records);
            self.meili
                .write(ctx, request, BATCH_WRITE_WAIT)
                .await
                .map_err(|e| write_error("IndexBatch", e))?;

            debug!(index = %self.index, count = records.len(), "Records indexed");
            Ok(())
        })
        .await
    }

    async fn delete(&self, ctx: &CallContext, object_id: &str) -> SearchResult<()> {
        observe(BACKEND_NAME, "Delete", async {
            let request = self.http().request(
                Method::DELETE,
                &Meili::index_path(&self.index, &["documents", object_id]),
            );
            let details = self
                .meili
                .write(ctx, request, SINGLE_WRITE_WAIT)
                .await
                .map_err(|e| delete_error("Delete", e))?;

            if deleted_documents(&details) == Some(0) {
                return Err(SearchError::new(
                    "Delete",
                    ErrorKind::NotFound,
                    format!("{} not found in {}", object_id, self.index),
                ));
            }
            debug!(index = %self.index, object_id, "Record deleted");
            Ok(())
        })
        .await
    }

    async fn delete_batch(&self, ctx: &CallContext, object_ids: &[String]) -> SearchResult<()> {
        observe(BACKEND_NAME, "DeleteBatch", async {
            let unique: BTreeSet<&str> = object_ids.iter().map(String::as_str).collect();
            if unique.is_empty() {
                return Ok(());
            }

            let request = self
                .http()
                .request(
                    Method::POST,
                    &Meili::index_path(&self.index, &["documents", "delete-batch"]),
                )
                .json(&unique);
            let details = self
                .meili
                .write(ctx, request, BATCH_WRITE_WAIT)
                .await
                .map_err(|e| delete_error("DeleteBatch", e))?;

            if let Some(deleted) = deleted_documents(&details) {
                if deleted < unique.len() as u64 {
                    return Err(SearchError::new(
                        "DeleteBatch",
                        ErrorKind::NotFound,
                        format!(
                            "{} of {} ids not found in {}",
                            unique.len() as u64 - deleted,
                            unique.len(),
                            self.index
                        ),
                    ));
                }
            }
            debug!(index = %self.index, count = unique.len(), "Records deleted");
            Ok(())
        })
        .await
    }

    async fn search(&self, ctx: &CallContext, query: &SearchQuery) -> SearchResult<SearchResponse<R>> {
        observe(BACKEND_NAME, "Search", async {
            let (reply, query_time) = self.execute_search(ctx, query, "Search").await?;

            let raw_count = reply.hits.len() as u64;
            let hits: Vec<R> = decode_hits(BACKEND_NAME, &self.index, reply.hits);
            let facets = Facets::from_json(reply.facet_distribution).unwrap_or_else(|e| {
                warn!(index = %self.index, error = %e, "Malformed facet distribution, using empty facets");
                Facets::default()
            });
            let total_hits = reply
                .total_hits
                .or(reply.estimated_total_hits)
                .unwrap_or(raw_count);

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
            let request = self.http().request(
                Method::GET,
                &Meili::index_path(&self.index, &["documents", object_id]),
            );
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
        observe(BACKEND_NAME, "Clear", async {
            let request = self
                .http()
                .request(Method::DELETE, &Meili::index_path(&self.index, &["documents"]));
            self.meili
                .write(ctx, request, BATCH_WRITE_WAIT)
                .await
                .map_err(|e| delete_error("Clear", e))?;

            info!(index = %self.index, "Index cleared");
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl DocumentCollection for MeiliCollection<Document> {
    /// With no names given, the four summarized dimensions are requested.
    async fn get_facets(&self, ctx: &CallContext, facet_names: &[String]) -> SearchResult<Facets> {
        observe(BACKEND_NAME, "GetFacets", async {
            let names: Vec<String> = if facet_names.is_empty() {
                FACET_DIMENSIONS.iter().map(|(name, _)| name.to_string()).collect()
            } else {
                facet_names.to_vec()
            };
            let query = SearchQuery::new("").with_page(0, 0).with_facets(names);
            let (reply, _) = self.execute_search(ctx, &query, "GetFacets").await?;
            Facets::from_json(reply.facet_distribution)
                .map_err(|e| SearchError::backend("GetFacets", BackendError::Decode(e)))
        })
        .await
    }
}

/// Redirect links stored in a Meilisearch index.
pub struct MeiliLinks {
    meili: Arc<Meili>,
    index: String,
}

/// Document id used for a link key: lower-case hex of its bytes. `None`
/// when the encoded key exceeds the Meilisearch id limit.
fn link_storage_key(object_id: &str) -> Option<String> {
    Some(hex::encode(object_id)).filter(|key| key.len() <= MAX_DOCUMENT_ID_BYTES)
}

fn link_key_too_long(op: &'static str, kind: ErrorKind, object_id: &str) -> SearchError {
    SearchError::new(
        op,
        kind,
        format!(
            "link key of {} bytes exceeds the {} byte limit",
            object_id.len(),
            MAX_DOCUMENT_ID_BYTES / 2
        ),
    )
}

impl MeiliLinks {
    fn http(&self) -> &RestClient {
        &self.meili.http
    }
}

#[async_trait]
impl LinkCollection for MeiliLinks {
    async fn save_link(&self, ctx: &CallContext, link: &Link) -> SearchResult<()> {
        observe(BACKEND_NAME, "SaveLink", async {
            let object_id = link.object_id().ok_or_else(|| missing_object_id("SaveLink"))?;
            let key = link_storage_key(object_id).ok_or_else(|| {
                link_key_too_long("SaveLink", ErrorKind::IndexingFailed, object_id)
            })?;

            let mut stored: Map<String, Value> = link
                .0
                .iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect();
            stored.insert(OBJECT_ID_FIELD.to_string(), Value::String(key));
            stored.insert(LINK_KEY_FIELD.to_string(), Value::String(object_id.to_string()));

            let request = self
                .http()
                .request(Method::POST, &Meili::index_path(&self.index, &["documents"]))
                .query(&[("primaryKey", OBJECT_ID_FIELD)])
                .json(&[Value::Object(stored)]);
            self.meili
                .write(ctx, request, SINGLE_WRITE_WAIT)
                .await
                .map_err(|e| write_error("SaveLink", e))?;

            debug!(index = %self.index, object_id, "Link saved");
            Ok(())
        })
        .await
    }

    async fn get_link(&self, ctx: &CallContext, object_id: &str) -> SearchResult<Link> {
        observe(BACKEND_NAME, "GetLink", async {
            // Never storable, so never stored.
            let key = link_storage_key(object_id)
                .ok_or_else(|| link_key_too_long("GetLink", ErrorKind::NotFound, object_id))?;
            let request = self
                .http()
                .request(Method::GET, &Meili::index_path(&self.index, &["documents", &key]));
            let mut stored: Map<String, Value> = self
                .http()
                .send(ctx, request)
                .await
                .map_err(|e| lookup_error("GetLink", e))?;

            let original = stored
                .remove(LINK_KEY_FIELD)
                .unwrap_or_else(|| Value::String(object_id.to_string()));
            stored.insert(OBJECT_ID_FIELD.to_string(), original);
            Ok(Link::from_object(stored))
        })
        .await
    }

    async fn delete_link(&self, ctx: &CallContext, object_id: &str) -> SearchResult<()> {
        observe(BACKEND_NAME, "DeleteLink", async {
            let key = link_storage_key(object_id)
                .ok_or_else(|| link_key_too_long("DeleteLink", ErrorKind::NotFound, object_id))?;
            let request = self
                .http()
                .request(Method::DELETE, &Meili::index_path(&self.index, &["documents", &key]));
            let details = self
                .meili
                .write(ctx, request, SINGLE_WRITE_WAIT)
                .await
                .map_err(|e| delete_error("DeleteLink", e))?;

            if deleted_documents(&details) == Some(0) {
                return Err(SearchError::new(
                    "DeleteLink",
                    ErrorKind::NotFound,
                    format!("link {} not found", object_id),
                ));
            }
            Ok(())
        })
        .await
    }

    async fn clear(&self, ctx: &CallContext) -> SearchResult<()> {
        observe(BACKEND_NAME, "Clear", async {
            let request = self
                .http()
                .request(Method::DELETE, &Meili::index_path(&self.index, &["documents"]));
            self.meili
                .write(ctx, request, BATCH_WRITE_WAIT)
                .await
                .map_err(|e| delete_error("Clear", e))?;
            info!(index = %self.index, "Links cleared");
            Ok(())
        })
        .await
    }
}

/// Search provider backed by Meilisearch.
pub struct MeilisearchProvider {
    meili: Arc<Meili>,
    indexes: IndexNames,
    documents: MeiliCollection<Document>,
    drafts: MeiliCollection<Document>,
    projects: MeiliCollection<Project>,
    links: MeiliLinks,
}

impl MeilisearchProvider {
    /// Validate the configuration, connect, and make sure every index exists
    /// with its attribute settings.
    pub async fn connect(ctx: &CallContext, config: MeilisearchConfig) -> SearchResult<Self> {
        config.validate()?;

        let mut headers = HeaderMap::new();
        if let Some(api_key) = config.api_key.as_deref().filter(|k| !k.is_empty()) {
            let value = HeaderValue::from_str(&format!("Bearer {}", api_key)).map_err(|e| {
                SearchError::configuration("new", format!("invalid meilisearch api key: {}", e))
            })?;
            headers.insert(AUTHORIZATION, value);
        }

        let http = RestClient::new(
            BACKEND_NAME,
            &config.host,
            Duration::from_secs(config.request_timeout_secs),
            headers,
        )?;
        let meili = Arc::new(Meili {
            http,
            poll_interval: Duration::from_millis(config.task_poll_interval_ms),
        });

        let indexes = config.indexes.clone();
        let provider = Self {
            documents: MeiliCollection::new(meili.clone(), indexes.docs.clone()),
            drafts: MeiliCollection::new(meili.clone(), indexes.drafts.clone()),
            projects: MeiliCollection::new(meili.clone(), indexes.projects.clone()),
            links: MeiliLinks {
                meili: meili.clone(),
                index: indexes.links.clone(),
            },
            meili,
            indexes,
        };

        provider.ensure_indexes(ctx).await?;
        info!(host = %config.host, "Meilisearch provider ready");
        Ok(provider)
    }

    pub fn indexes(&self) -> &IndexNames {
        &self.indexes
    }

    /// Create missing indexes and apply attribute settings.
    pub async fn ensure_indexes(&self, ctx: &CallContext) -> SearchResult<()> {
        let plan: [(&str, Option<&IndexSettings>); 4] = [
            (self.indexes.docs.as_str(), Some(&DOCUMENT_SETTINGS)),
            (self.indexes.drafts.as_str(), Some(&DOCUMENT_SETTINGS)),
            (self.indexes.projects.as_str(), Some(&PROJECT_SETTINGS)),
            (self.indexes.links.as_str(), None),
        ];

        for (uid, settings) in plan {
            self.create_index(ctx, uid).await?;
            if let Some(settings) = settings {
                self.apply_settings(ctx, uid, settings).await?;
            }
        }
        Ok(())
    }

    async fn create_index(&self, ctx: &CallContext, uid: &str) -> SearchResult<()> {
        let request = self
            .meili
            .http
            .request(Method::POST, &["indexes"])
            .json(&json!({"uid": uid, "primaryKey": OBJECT_ID_FIELD}));

        match self.meili.write(ctx, request, BATCH_WRITE_WAIT).await {
            Ok(_) => {
                info!(index = uid, "Created index");
                Ok(())
            }
            Err(e) if e.code() == Some("index_already_exists") => {
                debug!(index = uid, "Index already exists");
                Ok(())
            }
            Err(e) => Err(write_error("new", e).with_context(format!("create index {}", uid))),
        }
    }

    async fn apply_settings(
        &self,
        ctx: &CallContext,
        uid: &str,
        settings: &IndexSettings,
    ) -> SearchResult<()> {
        let request = self
            .meili
            .http
            .request(Method::PATCH, &Meili::index_path(uid, &["settings"]))
            .json(&json!({
                "searchableAttributes": settings.searchable,
                "filterableAttributes": settings.filterable,
                "sortableAttributes": settings.sortable,
            }));

        self.meili
            .write(ctx, request, BATCH_WRITE_WAIT)
            .await
            .map_err(|e| write_error("new", e).with_context(format!("configure index {}", uid)))?;
        debug!(index = uid, "Index settings applied");
        Ok(())
    }
}

#[async_trait]
impl SearchProvider for MeilisearchProvider {
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
            let reply: HealthReply = self
                .meili
                .http
                .send(ctx, self.meili.http.request(Method::GET, &["health"]))
                .await
                .map_err(|e| {
                    SearchError::new("Healthy", ErrorKind::BackendUnavailable, e.to_string())
                })?;

            if reply.status != "available" {
                return Err(SearchError::new(
                    "Healthy",
                    ErrorKind::BackendUnavailable,
                    format!("meilisearch status {}", reply.status),
                ));
            }
            Ok(())
        })
        .await
    }
}
