#![allow(clippy::unwrap_used)]
// Retry and classification against a live mock server.

use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use pocketlink_api::Client;
use pocketlink_core::{DomainError, RetryPolicy, safe_call, with_retry};

fn quick() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        initial_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(20),
    }
}

#[tokio::test]
async fn test_retry_recovers_from_server_errors() {
    let server = MockServer::start().await;
    let client = Client::new(&server.uri()).unwrap();

    Mock::given(method("GET"))
        .and(path("/api/collections/posts/records/r1"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/collections/posts/records/r1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "r1"})))
        .mount(&server)
        .await;

    let posts = client.collection("posts");
    let record: Value = with_retry(&quick(), || posts.get_one("r1")).await.unwrap();

    assert_eq!(record, json!({"id": "r1"}));
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_not_found_is_not_retried() {
    let server = MockServer::start().await;
    let client = Client::new(&server.uri()).unwrap();

    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(404)
                .set_body_json(json!({"code": 404, "message": "Missing record."})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let posts = client.collection("posts");
    let err = with_retry(&quick(), || posts.get_one::<Value>("nope"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "business.not_found");
    assert_eq!(err.to_string(), "Resource not found: Missing record.");
}

#[tokio::test]
async fn test_refused_connection_is_no_connection() {
    let client = Client::new("http://127.0.0.1:9").unwrap();
    let err = safe_call(client.health()).await.unwrap_err();
    assert!(
        matches!(err, DomainError::Network(_)),
        "expected a network kind, got {err:?}"
    );
}
