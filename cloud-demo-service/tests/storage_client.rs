use cloud_demo_service::services::{CloudError, Credentials, GcsObjectStore, ObjectStore};
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn store(server: &MockServer, credentials: Credentials) -> GcsObjectStore {
    GcsObjectStore::new(reqwest::Client::new(), server.uri(), Arc::new(credentials))
}

#[tokio::test]
async fn lists_object_names_with_bearer_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/storage/v1/b/my-bucket/o"))
        .and(query_param("maxResults", "5"))
        .and(query_param("fields", "items(name)"))
        .and(header("authorization", "Bearer token-123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{ "name": "b.txt" }, { "name": "a.txt" }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let names = store(&server, Credentials::Static("token-123".to_string()))
        .list_objects("my-bucket", 5)
        .await
        .unwrap();

    assert_eq!(names, vec!["b.txt", "a.txt"]);
}

#[tokio::test]
async fn empty_bucket_has_no_items_field() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/storage/v1/b/empty/o"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    let names = store(&server, Credentials::Anonymous)
        .list_objects("empty", 5)
        .await
        .unwrap();

    assert!(names.is_empty());
}

#[tokio::test]
async fn truncates_listings_that_ignore_max_results() {
    let server = MockServer::start().await;
    let items: Vec<_> = (0..8).map(|i| json!({ "name": format!("obj-{}", i) })).collect();
    Mock::given(method("GET"))
        .and(path("/storage/v1/b/big/o"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "items": items })))
        .mount(&server)
        .await;

    let names = store(&server, Credentials::Anonymous)
        .list_objects("big", 5)
        .await
        .unwrap();

    assert_eq!(names.len(), 5);
    assert_eq!(names[0], "obj-0");
}

#[tokio::test]
async fn missing_bucket_surfaces_api_message() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/storage/v1/b/missing/o"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": {
                "code": 404,
                "message": "The specified bucket does not exist.",
                "errors": [{ "reason": "notFound" }]
            }
        })))
        .mount(&server)
        .await;

    let err = store(&server, Credentials::Anonymous)
        .list_objects("missing", 5)
        .await
        .unwrap_err();

    match err {
        CloudError::Api { status, message } => {
            assert_eq!(status, 404);
            assert_eq!(message, "The specified bucket does not exist.");
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn plain_text_errors_are_kept() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(502).set_body_string("upstream exploded"))
        .mount(&server)
        .await;

    let err = store(&server, Credentials::Anonymous)
        .list_objects("any", 5)
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "502 upstream exploded");
}

#[tokio::test]
async fn unreachable_endpoint_is_connection_error() {
    let store = GcsObjectStore::new(
        reqwest::Client::new(),
        "http://127.0.0.1:1",
        Arc::new(Credentials::Anonymous),
    );

    let err = store.list_objects("any", 5).await.unwrap_err();

    assert!(matches!(err, CloudError::Connection(_)));
}
