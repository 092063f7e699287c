//! Meilisearch adapter tests against a mocked HTTP server

use std::time::Duration;

use docsearch::adapters::MeilisearchProvider;
use docsearch::context::CallContext;
use docsearch::search::*;
use mockito::{Matcher, Mock, ServerGuard};
use serde_json::json;

const JSON: &str = "application/json";

/// Mocks for the index bootstrap performed by `connect`: index creation,
/// settings and the shared task.
async fn mock_bootstrap(server: &mut ServerGuard) -> Vec<Mock> {
    let create = server
        .mock("POST", "/indexes")
        .with_status(202)
        .with_header("content-type", JSON)
        .with_body(r#"{"taskUid": 1}"#)
        .expect(4)
        .create_async()
        .await;
    let settings = server
        .mock("PATCH", Matcher::Regex(r"^/indexes/[a-z]+/settings$".to_string()))
        .with_status(202)
        .with_header("content-type", JSON)
        .with_body(r#"{"taskUid": 1}"#)
        .expect(3)
        .create_async()
        .await;
    let task = server
        .mock("GET", "/tasks/1")
        .with_header("content-type", JSON)
        .with_body(r#"{"uid": 1, "status": "succeeded", "details": {}}"#)
        .create_async()
        .await;
    vec![create, settings, task]
}

/// Mock the status view of `task`
async fn mock_task(server: &mut ServerGuard, task: u64, view: serde_json::Value) -> Mock {
    server
        .mock("GET", format!("/tasks/{}", task).as_str())
        .with_header("content-type", JSON)
        .with_body(view.to_string())
        .create_async()
        .await
}

fn enqueued(task: u64) -> String {
    json!({"taskUid": task, "status": "enqueued"}).to_string()
}

fn config(server: &ServerGuard) -> MeilisearchConfig {
    let mut config = MeilisearchConfig::new(server.url()).with_api_key("masterKey");
    config.task_poll_interval_ms = 5;
    config
}

async fn connect(server: &mut ServerGuard) -> (MeilisearchProvider, Vec<Mock>) {
    let bootstrap = mock_bootstrap(server).await;
    let provider = MeilisearchProvider::connect(&CallContext::background(), config(server))
        .await
        .unwrap();
    (provider, bootstrap)
}

#[tokio::test]
async fn test_connect_creates_and_configures_indexes() {
    let mut server = mockito::Server::new_async().await;
    let bootstrap = mock_bootstrap(&mut server).await;

    let provider = MeilisearchProvider::connect(&CallContext::background(), config(&server))
        .await
        .unwrap();

    assert_eq!(provider.name(), "meilisearch");
    assert_eq!(provider.indexes().drafts, "drafts");
    bootstrap[0].assert_async().await;
    bootstrap[1].assert_async().await;
}

#[tokio::test]
async fn test_connect_sends_bearer_token() {
    let mut server = mockito::Server::new_async().await;
    let create = server
        .mock("POST", "/indexes")
        .match_header("authorization", "Bearer masterKey")
        .match_body(Matcher::PartialJson(json!({"primaryKey": "objectID"})))
        .with_status(202)
        .with_header("content-type", JSON)
        .with_body(enqueued(1))
        .expect(4)
        .create_async()
        .await;
    let _mock = server
        .mock("PATCH", Matcher::Regex(r"/settings$".to_string()))
        .with_status(202)
        .with_header("content-type", JSON)
        .with_body(enqueued(1))
        .create_async()
        .await;
    let _task = mock_task(&mut server, 1, json!({"status": "succeeded"})).await;

    MeilisearchProvider::connect(&CallContext::background(), config(&server))
        .await
        .unwrap();
    create.assert_async().await;
}

#[tokio::test]
async fn test_connect_tolerates_existing_indexes() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/indexes")
        .with_status(202)
        .with_header("content-type", JSON)
        .with_body(enqueued(2))
        .create_async()
        .await;
    let _task = mock_task(
        &mut server,
        2,
        json!({
            "status": "failed",
            "error": {"code": "index_already_exists", "message": "Index `docs` already exists."}
        }),
    )
    .await;
    let _mock = server
        .mock("PATCH", Matcher::Regex(r"/settings$".to_string()))
        .with_status(202)
        .with_header("content-type", JSON)
        .with_body(enqueued(3))
        .create_async()
        .await;
    let _task = mock_task(&mut server, 3, json!({"status": "succeeded"})).await;

    let result = MeilisearchProvider::connect(&CallContext::background(), config(&server)).await;
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_connect_rejects_invalid_host() {
    let err = MeilisearchProvider::connect(
        &CallContext::background(),
        MeilisearchConfig::new("not a url"),
    )
    .await
    .err()
    .unwrap();
    assert!(err.is_configuration());
}

#[tokio::test]
async fn test_connect_unreachable_backend() {
    // Nothing listens on port 9 in the test environment.
    let err = MeilisearchProvider::connect(
        &CallContext::background(),
        MeilisearchConfig::new("http://127.0.0.1:9"),
    )
    .await
    .err()
    .unwrap();
    assert!(err.is(ErrorKind::BackendUnavailable));
}

#[tokio::test]
async fn test_index_waits_for_task() {
    let mut server = mockito::Server::new_async().await;
    let (provider, _bootstrap) = connect(&mut server).await;

    let write = server
        .mock("POST", "/indexes/docs/documents")
        .match_query(Matcher::UrlEncoded("primaryKey".into(), "objectID".into()))
        .match_body(Matcher::Regex(r#""objectID":"doc-1""#.to_string()))
        .with_status(202)
        .with_header("content-type", JSON)
        .with_body(enqueued(10))
        .create_async()
        .await;
    let status = server
        .mock("GET", "/tasks/10")
        .with_header("content-type", JSON)
        .with_body(r#"{"status": "succeeded", "details": {"indexedDocuments": 1}}"#)
        .expect(1)
        .create_async()
        .await;

    let doc = Document::new("doc-1")
        .with_title("Terraform RFC")
        .with_product("terraform");
    provider
        .documents()
        .index(&CallContext::background(), &doc)
        .await
        .unwrap();

    write.assert_async().await;
    status.assert_async().await;
}

#[tokio::test]
async fn test_index_failed_task_is_indexing_failed() {
    let mut server = mockito::Server::new_async().await;
    let (provider, _bootstrap) = connect(&mut server).await;

    let _mock = server
        .mock("POST", "/indexes/drafts/documents")
        .match_query(Matcher::Any)
        .with_status(202)
        .with_header("content-type", JSON)
        .with_body(enqueued(11))
        .create_async()
        .await;
    let _task = mock_task(
        &mut server,
        11,
        json!({
            "status": "failed",
            "error": {"code": "invalid_document_id", "message": "bad id"}
        }),
    )
    .await;

    let err = provider
        .drafts()
        .index(&CallContext::background(), &Document::new("bad id"))
        .await
        .unwrap_err();
    assert!(err.is(ErrorKind::IndexingFailed));
    assert_eq!(err.op(), "Index");
}

#[tokio::test]
async fn test_index_without_object_id_sends_nothing() {
    let mut server = mockito::Server::new_async().await;
    let (provider, _bootstrap) = connect(&mut server).await;

    let write = server
        .mock("POST", "/indexes/docs/documents")
        .match_query(Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let err = provider
        .documents()
        .index_batch(
            &CallContext::background(),
            &[Document::new("a"), Document::new("")],
        )
        .await
        .unwrap_err();
    assert!(err.is(ErrorKind::IndexingFailed));
    write.assert_async().await;
}

#[tokio::test]
async fn test_task_wait_respects_caller_deadline() {
    let mut server = mockito::Server::new_async().await;
    let (provider, _bootstrap) = connect(&mut server).await;

    let _mock = server
        .mock("POST", "/indexes/docs/documents")
        .match_query(Matcher::Any)
        .with_status(202)
        .with_header("content-type", JSON)
        .with_body(enqueued(12))
        .create_async()
        .await;
    let _task = mock_task(&mut server, 12, json!({"status": "processing"})).await;

    let ctx = CallContext::with_timeout(Duration::from_millis(200));
    let started = std::time::Instant::now();
    let err = provider
        .documents()
        .index(&ctx, &Document::new("slow"))
        .await
        .unwrap_err();

    assert!(err.is(ErrorKind::IndexingFailed));
    assert!(started.elapsed() < Duration::from_millis(1500));
}

#[tokio::test]
async fn test_delete_missing_is_not_found() {
    let mut server = mockito::Server::new_async().await;
    let (provider, _bootstrap) = connect(&mut server).await;

    let _mock = server
        .mock("DELETE", "/indexes/docs/documents/nope")
        .with_status(202)
        .with_header("content-type", JSON)
        .with_body(enqueued(13))
        .create_async()
        .await;
    let _task = mock_task(
        &mut server,
        13,
        json!({"status": "succeeded", "details": {"providedIds": 1, "deletedDocuments": 0}}),
    )
    .await;

    let err = provider
        .documents()
        .delete(&CallContext::background(), "nope")
        .await
        .unwrap_err();
    assert!(err.is(ErrorKind::NotFound));
}

#[tokio::test]
async fn test_delete_batch_dedupes_and_reports_missing() {
    let mut server = mockito::Server::new_async().await;
    let (provider, _bootstrap) = connect(&mut server).await;

    let batch = server
        .mock("POST", "/indexes/projects/documents/delete-batch")
        .match_body(Matcher::Json(json!(["p1", "p2"])))
        .with_status(202)
        .with_header("content-type", JSON)
        .with_body(enqueued(14))
        .create_async()
        .await;
    let _task = mock_task(
        &mut server,
        14,
        json!({"status": "succeeded", "details": {"providedIds": 2, "deletedDocuments": 1}}),
    )
    .await;

    let ids = vec!["p2".to_string(), "p1".to_string(), "p2".to_string()];
    let err = provider
        .projects()
        .delete_batch(&CallContext::background(), &ids)
        .await
        .unwrap_err();
    assert!(err.is(ErrorKind::NotFound));
    batch.assert_async().await;
}

#[tokio::test]
async fn test_search_decodes_hits_and_facets() {
    let mut server = mockito::Server::new_async().await;
    let (provider, _bootstrap) = connect(&mut server).await;

    let search = server
        .mock("POST", "/indexes/docs/search")
        .match_body(Matcher::PartialJson(json!({
            "q": "vault",
            "limit": 20,
            "offset": 20,
            "filter": "product = \"vault\"",
            "facets": ["product", "docType"],
        })))
        .with_header("content-type", JSON)
        .with_body(
            json!({
                "hits": [
                    {"objectID": "a", "title": "Vault RFC", "product": "vault", "_formatted": {}},
                    {"objectID": "b", "owners": "not-a-list"},
                ],
                "estimatedTotalHits": 41,
                "facetDistribution": {
                    "product": {"vault": 41},
                    "docType": {"RFC": 30, "PRD": 11},
                },
                "processingTimeMs": 2,
            })
            .to_string(),
        )
        .create_async()
        .await;

    let query = SearchQuery::new("vault")
        .with_page(1, 20)
        .with_filter("product", vec!["vault"])
        .with_facets(vec!["product", "docType"]);
    let results = provider
        .documents()
        .search(&CallContext::background(), &query)
        .await
        .unwrap();

    search.assert_async().await;
    assert_eq!(results.hits.len(), 1);
    assert_eq!(results.hits[0].title, "Vault RFC");
    assert_eq!(results.total_hits, 41);
    assert_eq!(results.total_pages, 3);
    assert_eq!(results.page, 1);
    assert_eq!(results.facets.products["vault"], 41);
    assert_eq!(results.facets.doc_types["PRD"], 11);
}

#[tokio::test]
async fn test_search_malformed_facets_degrade_to_empty() {
    let mut server = mockito::Server::new_async().await;
    let (provider, _bootstrap) = connect(&mut server).await;

    let _mock = server
        .mock("POST", "/indexes/docs/search")
        .with_header("content-type", JSON)
        .with_body(r#"{"hits": [], "totalHits": 0, "facetDistribution": {"product": "oops"}}"#)
        .create_async()
        .await;

    let results = provider
        .documents()
        .search(&CallContext::background(), &SearchQuery::new(""))
        .await
        .unwrap();
    assert!(results.facets.is_empty());
    assert_eq!(results.total_pages, 0);
}

#[tokio::test]
async fn test_search_invalid_filter_is_invalid_query() {
    let mut server = mockito::Server::new_async().await;
    let (provider, _bootstrap) = connect(&mut server).await;

    let _mock = server
        .mock("POST", "/indexes/docs/search")
        .with_status(400)
        .with_header("content-type", JSON)
        .with_body(
            r#"{"message": "Attribute `team` is not filterable.", "code": "invalid_search_filter", "type": "invalid_request"}"#,
        )
        .create_async()
        .await;

    let query = SearchQuery::new("").with_filter("team", vec!["core"]);
    let err = provider
        .documents()
        .search(&CallContext::background(), &query)
        .await
        .unwrap_err();
    assert!(err.is(ErrorKind::InvalidQuery));
}

#[tokio::test]
async fn test_search_unclassified_failure_passes_through() {
    let mut server = mockito::Server::new_async().await;
    let (provider, _bootstrap) = connect(&mut server).await;

    let _mock = server
        .mock("POST", "/indexes/docs/search")
        .with_status(500)
        .with_body("internal error")
        .create_async()
        .await;

    let err = provider
        .documents()
        .search(&CallContext::background(), &SearchQuery::new("x"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), None);
    assert!(matches!(
        err.cause(),
        Cause::Backend(BackendError::Status { status: 500, .. })
    ));
}

#[tokio::test]
async fn test_get_facets_defaults_to_known_dimensions() {
    let mut server = mockito::Server::new_async().await;
    let (provider, _bootstrap) = connect(&mut server).await;

    let search = server
        .mock("POST", "/indexes/docs/search")
        .match_body(Matcher::PartialJson(json!({
            "limit": 0,
            "facets": ["product", "docType", "status", "owners"],
        })))
        .with_header("content-type", JSON)
        .with_body(
            json!({
                "hits": [],
                "facetDistribution": {
                    "status": {"approved": 4},
                    "owners": {"alice@example.com": 2},
                },
            })
            .to_string(),
        )
        .create_async()
        .await;

    let facets = provider
        .documents()
        .get_facets(&CallContext::background(), &[])
        .await
        .unwrap();
    search.assert_async().await;
    assert_eq!(facets.statuses["approved"], 4);
    assert_eq!(facets.owners["alice@example.com"], 2);
    assert!(facets.products.is_empty());
}

#[tokio::test]
async fn test_get_object_missing_is_not_found() {
    let mut server = mockito::Server::new_async().await;
    let (provider, _bootstrap) = connect(&mut server).await;

    let _mock = server
        .mock("GET", "/indexes/docs/documents/ghost")
        .with_status(404)
        .with_header("content-type", JSON)
        .with_body(r#"{"message": "Document `ghost` not found.", "code": "document_not_found"}"#)
        .create_async()
        .await;

    let err = provider
        .documents()
        .get_object(&CallContext::background(), "ghost")
        .await
        .unwrap_err();
    assert!(err.is(ErrorKind::NotFound));
}

#[tokio::test]
async fn test_links_round_trip_through_storage_key() {
    let mut server = mockito::Server::new_async().await;
    let (provider, _bootstrap) = connect(&mut server).await;

    // "/rfc/tf-1" hex-encoded
    let key = "2f7266632f74662d31";
    let save = server
        .mock("POST", "/indexes/links/documents")
        .match_query(Matcher::Any)
        .match_body(Matcher::Json(json!([{
            "objectID": key,
            "linkObjectID": "/rfc/tf-1",
            "documentID": "abc123",
        }])))
        .with_status(202)
        .with_header("content-type", JSON)
        .with_body(enqueued(20))
        .create_async()
        .await;
    let _task = mock_task(&mut server, 20, json!({"status": "succeeded"})).await;
    let _mock = server
        .mock("GET", format!("/indexes/links/documents/{}", key).as_str())
        .with_header("content-type", JSON)
        .with_body(
            json!({"objectID": key, "linkObjectID": "/rfc/tf-1", "documentID": "abc123"})
                .to_string(),
        )
        .create_async()
        .await;

    let ctx = CallContext::background();
    let link = Link::redirect("RFC", "TF-1", "abc123");
    provider.links().save_link(&ctx, &link).await.unwrap();
    save.assert_async().await;

    let stored = provider.links().get_link(&ctx, "/rfc/tf-1").await.unwrap();
    assert_eq!(stored, link);
}

#[tokio::test]
async fn test_overlong_link_key_is_rejected_locally() {
    let mut server = mockito::Server::new_async().await;
    let (provider, _bootstrap) = connect(&mut server).await;

    let save = server
        .mock("POST", "/indexes/links/documents")
        .match_query(Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let ctx = CallContext::background();
    let link = Link::redirect("RFC", &"9".repeat(300), "abc123");
    let err = provider.links().save_link(&ctx, &link).await.unwrap_err();
    assert!(err.is(ErrorKind::IndexingFailed));
    assert!(err.to_string().contains("255 byte limit"));
    save.assert_async().await;

    let key = link.object_id().unwrap().to_string();
    let err = provider.links().get_link(&ctx, &key).await.unwrap_err();
    assert!(err.is(ErrorKind::NotFound));
}

#[tokio::test]
async fn test_healthy() {
    let mut server = mockito::Server::new_async().await;
    let (provider, _bootstrap) = connect(&mut server).await;

    let health = server
        .mock("GET", "/health")
        .with_header("content-type", JSON)
        .with_body(r#"{"status": "available"}"#)
        .create_async()
        .await;

    provider.healthy(&CallContext::background()).await.unwrap();
    health.assert_async().await;
}

#[tokio::test]
async fn test_unhealthy_is_backend_unavailable() {
    let mut server = mockito::Server::new_async().await;
    let (provider, _bootstrap) = connect(&mut server).await;

    let _mock = server
        .mock("GET", "/health")
        .with_status(503)
        .with_body("service unavailable")
        .create_async()
        .await;

    let err = provider
        .healthy(&CallContext::background())
        .await
        .unwrap_err();
    assert!(err.is(ErrorKind::BackendUnavailable));
}
