//! Algolia adapter tests against a mocked HTTP server

use docsearch::adapters::AlgoliaProvider;
use docsearch::context::CallContext;
use docsearch::search::*;
use mockito::{Matcher, Mock, ServerGuard};
use serde_json::json;

const JSON: &str = "application/json";

fn provider(server: &ServerGuard) -> AlgoliaProvider {
    let mut config = AlgoliaConfig::new("TESTAPP", "write-key").with_host(server.url());
    config.task_poll_interval_ms = 5;
    AlgoliaProvider::new(config).unwrap()
}

async fn mock_published(server: &mut ServerGuard, index: &str, task: u64) -> Mock {
    server
        .mock("GET", format!("/1/indexes/{}/task/{}", index, task).as_str())
        .with_header("content-type", JSON)
        .with_body(r#"{"status": "published", "pendingTask": false}"#)
        .create_async()
        .await
}

fn task_reply(task: u64) -> String {
    json!({"taskID": task, "objectID": "ignored"}).to_string()
}

#[test]
fn test_new_does_no_io_and_validates() {
    let provider = AlgoliaProvider::new(AlgoliaConfig::new("APP", "key")).unwrap();
    assert_eq!(provider.name(), "algolia");
    assert_eq!(provider.indexes().projects, "projects");

    let err = AlgoliaProvider::new(AlgoliaConfig::new("APP", "")).err().unwrap();
    assert!(err.is_configuration());
}

#[tokio::test]
async fn test_index_sends_credentials_and_waits() {
    let mut server = mockito::Server::new_async().await;
    let write = server
        .mock("PUT", "/1/indexes/docs/doc-1")
        .match_header("x-algolia-application-id", "TESTAPP")
        .match_header("x-algolia-api-key", "write-key")
        .match_body(Matcher::PartialJson(json!({"objectID": "doc-1", "title": "Hello"})))
        .with_header("content-type", JSON)
        .with_body(task_reply(7))
        .create_async()
        .await;
    let task = mock_published(&mut server, "docs", 7).await;

    provider(&server)
        .documents()
        .index(&CallContext::background(), &Document::new("doc-1").with_title("Hello"))
        .await
        .unwrap();
    write.assert_async().await;
    task.assert_async().await;
}

#[tokio::test]
async fn test_index_batch_uses_batch_endpoint() {
    let mut server = mockito::Server::new_async().await;
    let batch = server
        .mock("POST", "/1/indexes/projects/batch")
        .match_body(Matcher::Regex(r#""action":"updateObject""#.to_string()))
        .with_header("content-type", JSON)
        .with_body(task_reply(8))
        .create_async()
        .await;
    let _task = mock_published(&mut server, "projects", 8).await;

    let projects = vec![
        Project::new("p1").with_field("title", "Alpha"),
        Project::new("p2").with_field("title", "Beta"),
    ];
    provider(&server)
        .projects()
        .index_batch(&CallContext::background(), &projects)
        .await
        .unwrap();
    batch.assert_async().await;
}

#[tokio::test]
async fn test_delete_missing_is_not_found_and_deletes_nothing() {
    let mut server = mockito::Server::new_async().await;
    let _lookup = server
        .mock("POST", "/1/indexes/*/objects")
        .with_header("content-type", JSON)
        .with_body(r#"{"results": [null]}"#)
        .create_async()
        .await;
    let delete = server
        .mock("DELETE", "/1/indexes/docs/ghost")
        .expect(0)
        .create_async()
        .await;

    let err = provider(&server)
        .documents()
        .delete(&CallContext::background(), "ghost")
        .await
        .unwrap_err();
    assert!(err.is(ErrorKind::NotFound));
    delete.assert_async().await;
}

#[tokio::test]
async fn test_delete_existing_record() {
    let mut server = mockito::Server::new_async().await;
    let _lookup = server
        .mock("POST", "/1/indexes/*/objects")
        .match_body(Matcher::Regex(r#""indexName":"drafts","objectID":"d1""#.to_string()))
        .with_header("content-type", JSON)
        .with_body(r#"{"results": [{"objectID": "d1"}]}"#)
        .create_async()
        .await;
    let delete = server
        .mock("DELETE", "/1/indexes/drafts/d1")
        .with_header("content-type", JSON)
        .with_body(task_reply(9))
        .create_async()
        .await;
    let _task = mock_published(&mut server, "drafts", 9).await;

    provider(&server)
        .drafts()
        .delete(&CallContext::background(), "d1")
        .await
        .unwrap();
    delete.assert_async().await;
}

#[tokio::test]
async fn test_delete_batch_reports_any_missing_id() {
    let mut server = mockito::Server::new_async().await;
    let _lookup = server
        .mock("POST", "/1/indexes/*/objects")
        .with_header("content-type", JSON)
        .with_body(r#"{"results": [{"objectID": "a"}, null]}"#)
        .create_async()
        .await;
    let batch = server
        .mock("POST", "/1/indexes/docs/batch")
        .expect(0)
        .create_async()
        .await;

    let err = provider(&server)
        .documents()
        .delete_batch(&CallContext::background(), &["b".to_string(), "a".to_string()])
        .await
        .unwrap_err();
    assert!(err.is(ErrorKind::NotFound));
    assert!(err.to_string().contains("b not found"));
    batch.assert_async().await;
}

#[tokio::test]
async fn test_search_compiles_algolia_filters() {
    let mut server = mockito::Server::new_async().await;
    let query_mock = server
        .mock("POST", "/1/indexes/docs/query")
        .match_body(Matcher::PartialJson(json!({
            "query": "vault",
            "page": 0,
            "hitsPerPage": 2,
            "filters": "(status:\"approved\" OR status:\"in-review\")",
        })))
        .with_header("content-type", JSON)
        .with_body(
            json!({
                "hits": [
                    {"objectID": "a", "title": "One"},
                    {"objectID": "b", "title": "Two"},
                ],
                "nbHits": 5,
                "page": 0,
                "facets": {"status": {"approved": 3, "in-review": 2}},
            })
            .to_string(),
        )
        .create_async()
        .await;

    let query = SearchQuery::new("vault")
        .with_page(0, 2)
        .with_filter("status", vec!["approved", "in-review"]);
    let results = provider(&server)
        .documents()
        .search(&CallContext::background(), &query)
        .await
        .unwrap();

    query_mock.assert_async().await;
    assert_eq!(results.hits.len(), 2);
    assert_eq!(results.total_hits, 5);
    assert_eq!(results.total_pages, 3);
    assert_eq!(results.facets.statuses["in-review"], 2);
}

#[tokio::test]
async fn test_project_hits_match_indexed_project() {
    let mut server = mockito::Server::new_async().await;
    let _query = server
        .mock("POST", "/1/indexes/projects/query")
        .with_header("content-type", JSON)
        .with_body(
            json!({
                "hits": [{
                    "objectID": "p1",
                    "title": "Platform migration",
                    "status": "active",
                    "_highlightResult": {
                        "title": {"value": "Platform <em>migration</em>", "matchLevel": "full"},
                    },
                    "_snippetResult": {"title": {"value": "Platform…"}},
                }],
                "nbHits": 1,
                "page": 0,
            })
            .to_string(),
        )
        .create_async()
        .await;

    let indexed = Project::new("p1")
        .with_field("title", "Platform migration")
        .with_field("status", "active");
    let results = provider(&server)
        .projects()
        .search(&CallContext::background(), &SearchQuery::new("migration"))
        .await
        .unwrap();
    assert_eq!(results.hits, vec![indexed]);
}

#[tokio::test]
async fn test_search_with_sort_is_not_implemented() {
    let mut server = mockito::Server::new_async().await;
    let query_mock = server
        .mock("POST", "/1/indexes/docs/query")
        .expect(0)
        .create_async()
        .await;

    let query = SearchQuery::new("").with_sort("modifiedTime", SortOrder::Desc);
    let err = provider(&server)
        .documents()
        .search(&CallContext::background(), &query)
        .await
        .unwrap_err();
    assert!(err.is(ErrorKind::NotImplemented));
    query_mock.assert_async().await;
}

#[tokio::test]
async fn test_search_bad_request_is_invalid_query() {
    let mut server = mockito::Server::new_async().await;
    let _query = server
        .mock("POST", "/1/indexes/docs/query")
        .with_status(400)
        .with_header("content-type", JSON)
        .with_body(r#"{"message": "Invalid syntax for filter", "status": 400}"#)
        .create_async()
        .await;

    let err = provider(&server)
        .documents()
        .search(&CallContext::background(), &SearchQuery::new("x").with_filter("a", vec!["b"]))
        .await
        .unwrap_err();
    assert!(err.is(ErrorKind::InvalidQuery));
}

#[tokio::test]
async fn test_get_object_missing_is_not_found() {
    let mut server = mockito::Server::new_async().await;
    let _get = server
        .mock("GET", "/1/indexes/projects/nope")
        .with_status(404)
        .with_header("content-type", JSON)
        .with_body(r#"{"message": "ObjectID does not exist", "status": 404}"#)
        .create_async()
        .await;

    let err = provider(&server)
        .projects()
        .get_object(&CallContext::background(), "nope")
        .await
        .unwrap_err();
    assert!(err.is(ErrorKind::NotFound));
}

#[tokio::test]
async fn test_links_save_and_get() {
    let mut server = mockito::Server::new_async().await;
    let save = server
        .mock("PUT", "/1/indexes/links/%2Fprd%2Fvlt-7")
        .match_body(Matcher::Json(json!({"objectID": "/prd/vlt-7", "documentID": "doc-7"})))
        .with_header("content-type", JSON)
        .with_body(task_reply(30))
        .create_async()
        .await;
    let _task = mock_published(&mut server, "links", 30).await;
    let _get = server
        .mock("GET", "/1/indexes/links/%2Fprd%2Fvlt-7")
        .with_header("content-type", JSON)
        .with_body(r#"{"objectID": "/prd/vlt-7", "documentID": "doc-7", "_highlightResult": {}}"#)
        .create_async()
        .await;

    let provider = provider(&server);
    let ctx = CallContext::background();
    let link = Link::redirect("PRD", "VLT-7", "doc-7");
    provider.links().save_link(&ctx, &link).await.unwrap();
    save.assert_async().await;

    let stored = provider.links().get_link(&ctx, "/prd/vlt-7").await.unwrap();
    assert_eq!(stored, link);
}

#[tokio::test]
async fn test_clear_waits_for_task() {
    let mut server = mockito::Server::new_async().await;
    let clear = server
        .mock("POST", "/1/indexes/drafts/clear")
        .with_header("content-type", JSON)
        .with_body(task_reply(40))
        .create_async()
        .await;
    let _task = mock_published(&mut server, "drafts", 40).await;

    provider(&server)
        .drafts()
        .clear(&CallContext::background())
        .await
        .unwrap();
    clear.assert_async().await;
}

#[tokio::test]
async fn test_healthy_reads_docs_settings() {
    let mut server = mockito::Server::new_async().await;
    let settings = server
        .mock("GET", "/1/indexes/docs/settings")
        .with_header("content-type", JSON)
        .with_body(r#"{"searchableAttributes": ["title"]}"#)
        .create_async()
        .await;

    provider(&server)
        .healthy(&CallContext::background())
        .await
        .unwrap();
    settings.assert_async().await;
}

#[tokio::test]
async fn test_unhealthy_is_backend_unavailable() {
    let mut server = mockito::Server::new_async().await;
    let _settings = server
        .mock("GET", "/1/indexes/docs/settings")
        .with_status(403)
        .with_body(r#"{"message": "Invalid Application-ID or API key", "status": 403}"#)
        .create_async()
        .await;

    let err = provider(&server)
        .healthy(&CallContext::background())
        .await
        .unwrap_err();
    assert!(err.is(ErrorKind::BackendUnavailable));
}
