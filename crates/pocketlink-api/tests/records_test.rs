#![allow(clippy::unwrap_used)]
// Integration tests for the record service using wiremock.

use pretty_assertions::assert_eq;
use secrecy::SecretString;
use serde::Deserialize;
use serde_json::{Value, json};
use wiremock::matchers::{body_json, method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

use pocketlink_api::{Client, Error, ListOptions, ListResult, ReconnectConfig, RecordModel};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, Client) {
    let server = MockServer::start().await;
    let client = Client::from_reqwest(
        &server.uri(),
        reqwest::Client::new(),
        ReconnectConfig::default(),
    )
    .unwrap();
    (server, client)
}

fn record(id: &str, title: &str) -> Value {
    json!({
        "id": id,
        "collectionId": "pbc_1",
        "collectionName": "posts",
        "created": "2024-01-01 00:00:00.000Z",
        "updated": "2024-01-01 00:00:00.000Z",
        "title": title,
    })
}

fn page(page: u32, per_page: u32, items: Vec<Value>) -> Value {
    json!({
        "page": page,
        "perPage": per_page,
        "totalItems": -1,
        "totalPages": -1,
        "items": items,
    })
}

#[derive(Debug, Deserialize, PartialEq)]
struct Post {
    id: String,
    title: String,
}

// ── Listing ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_get_list_sends_paging_and_options() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/collections/posts/records"))
        .and(query_param("page", "2"))
        .and(query_param("perPage", "10"))
        .and(query_param("sort", "-created"))
        .and(query_param("filter", "title ~ 'x'"))
        .and(query_param_is_missing("skipTotal"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "page": 2,
            "perPage": 10,
            "totalItems": 11,
            "totalPages": 2,
            "items": [record("r11", "eleven")],
        })))
        .expect(1)
        .mount(&server)
        .await;

    let options = ListOptions::default().sort("-created").filter("title ~ 'x'");
    let result: ListResult<RecordModel> = client
        .collection("posts")
        .get_list(2, 10, &options)
        .await
        .unwrap();

    assert_eq!(result.page, 2);
    assert_eq!(result.total_items, 11);
    assert_eq!(result.items.len(), 1);
    assert_eq!(result.items[0].id, "r11");
    assert_eq!(result.items[0].collection_name, "posts");
    assert_eq!(result.items[0].get_str("title"), Some("eleven"));
}

#[tokio::test]
async fn test_get_full_list_pages_until_short_page() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/collections/posts/records"))
        .and(query_param("page", "1"))
        .and(query_param("perPage", "2"))
        .and(query_param("skipTotal", "1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(page(1, 2, vec![record("a", "A"), record("b", "B")])),
        )
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/collections/posts/records"))
        .and(query_param("page", "2"))
        .and(query_param("perPage", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(2, 2, vec![record("c", "C")])))
        .expect(1)
        .mount(&server)
        .await;

    let posts: Vec<Post> = client
        .collection("posts")
        .get_full_list(2, &ListOptions::default())
        .await
        .unwrap();

    let ids: Vec<&str> = posts.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b", "c"]);
}

#[tokio::test]
async fn test_get_full_list_stops_on_empty_page() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/collections/posts/records"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(1, 500, vec![])))
        .expect(1)
        .mount(&server)
        .await;

    let posts: Vec<Value> = client
        .collection("posts")
        .get_full_list(0, &ListOptions::default())
        .await
        .unwrap();
    assert!(posts.is_empty());
}

#[tokio::test]
async fn test_get_first_list_item_empty_is_not_found() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/collections/posts/records"))
        .and(query_param("perPage", "1"))
        .and(query_param("filter", "slug = 'nope'"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(1, 1, vec![])))
        .mount(&server)
        .await;

    let err = client
        .collection("posts")
        .get_first_list_item::<Value>("slug = 'nope'", &ListOptions::default())
        .await
        .unwrap_err();
    assert!(err.is_not_found(), "got: {err:?}");
}

// ── Single records ──────────────────────────────────────────────────

#[tokio::test]
async fn test_get_one_encodes_id() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/collections/posts/records/a%20b"))
        .respond_with(ResponseTemplate::new(200).set_body_json(record("a b", "spaced")))
        .expect(1)
        .mount(&server)
        .await;

    let post: Post = client.collection("posts").get_one("a b").await.unwrap();
    assert_eq!(
        post,
        Post {
            id: "a b".into(),
            title: "spaced".into()
        }
    );
}

#[tokio::test]
async fn test_get_one_missing_is_response_error() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/collections/posts/records/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "code": 404,
            "message": "The requested resource wasn't found.",
            "data": {}
        })))
        .mount(&server)
        .await;

    let err = client
        .collection("posts")
        .get_one::<Value>("missing")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Response { status: 404, .. }), "got: {err:?}");
}

#[tokio::test]
async fn test_create_posts_body() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/api/collections/posts/records"))
        .and(body_json(json!({"title": "new"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(record("n1", "new")))
        .expect(1)
        .mount(&server)
        .await;

    let created: RecordModel = client
        .collection("posts")
        .create(&json!({"title": "new"}))
        .await
        .unwrap();
    assert_eq!(created.id, "n1");
}

#[tokio::test]
async fn test_validation_error_exposes_fields() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/api/collections/posts/records"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "code": 400,
            "message": "Failed to create record.",
            "data": {"title": {"code": "validation_required", "message": "Missing required value."}}
        })))
        .mount(&server)
        .await;

    let err = client
        .collection("posts")
        .create::<Value>(&json!({}))
        .await
        .unwrap_err();
    let fields = err.envelope().unwrap().invalid_fields();
    assert_eq!(fields, vec!["title".to_owned()]);
}

#[tokio::test]
async fn test_delete_accepts_no_content() {
    let (server, client) = setup().await;

    Mock::given(method("DELETE"))
        .and(path("/api/collections/posts/records/r1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    client.collection("posts").delete("r1").await.unwrap();
}

// ── Auth ────────────────────────────────────────────────────────────

fn user(id: &str, name: &str) -> Value {
    json!({
        "id": id,
        "collectionId": "_pb_users_auth_",
        "collectionName": "users",
        "email": "a@b.c",
        "name": name,
    })
}

#[tokio::test]
async fn test_auth_with_password_saves_session() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/api/collections/users/auth-with-password"))
        .and(body_json(json!({"identity": "a@b.c", "password": "hunter2"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "token": "tok-abc",
            "record": user("u1", "Ann"),
        })))
        .expect(1)
        .mount(&server)
        .await;

    let auth = client
        .collection("users")
        .auth_with_password::<RecordModel>("a@b.c", &SecretString::from("hunter2"))
        .await
        .unwrap();

    assert_eq!(auth.token, "tok-abc");
    assert_eq!(auth.record.id, "u1");
    assert_eq!(client.auth_store().token(), "tok-abc");
    assert_eq!(
        client.auth_store().record().unwrap()["id"],
        json!("u1")
    );
}

#[tokio::test]
async fn test_failed_auth_leaves_store_untouched() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/api/collections/users/auth-with-password"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "code": 400,
            "message": "Failed to authenticate.",
            "data": {}
        })))
        .mount(&server)
        .await;

    let err = client
        .collection("users")
        .auth_with_password::<Value>("a@b.c", &SecretString::from("wrong"))
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(400));
    assert!(client.auth_store().token().is_empty());
}

#[tokio::test]
async fn test_update_of_own_record_refreshes_auth_record() {
    let (server, client) = setup().await;
    client.auth_store().save("tok", Some(user("u1", "Ann")));

    Mock::given(method("PATCH"))
        .and(path("/api/collections/users/records/u1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(user("u1", "Bea")))
        .mount(&server)
        .await;

    let _: Value = client
        .collection("users")
        .update("u1", &json!({"name": "Bea"}))
        .await
        .unwrap();

    assert_eq!(client.auth_store().token(), "tok");
    assert_eq!(client.auth_store().record().unwrap()["name"], json!("Bea"));
}

#[tokio::test]
async fn test_delete_of_own_record_clears_session() {
    let (server, client) = setup().await;
    client.auth_store().save("tok", Some(user("u1", "Ann")));

    Mock::given(method("DELETE"))
        .and(path("/api/collections/users/records/u1"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    client.collection("users").delete("u1").await.unwrap();
    assert!(client.auth_store().token().is_empty());
    assert!(client.auth_store().record().is_none());
}

#[tokio::test]
async fn test_delete_of_other_record_keeps_session() {
    let (server, client) = setup().await;
    client.auth_store().save("tok", Some(user("u1", "Ann")));

    Mock::given(method("DELETE"))
        .and(path("/api/collections/posts/records/u1"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    client.collection("posts").delete("u1").await.unwrap();
    assert_eq!(client.auth_store().token(), "tok");
}
