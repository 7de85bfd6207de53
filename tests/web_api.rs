//! HTTP API tests
//!
//! Drives the router in-process against an in-memory database.

use std::sync::Arc;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{HeaderMap, Method, Request, StatusCode, header};
use recret::service::SecretService;
use recret::store::SqliteStore;
use recret::web::{AppState, router};
use serde_json::{Value, json};
use tower::ServiceExt;

const BASE_URL: &str = "https://secrets.example.com";

fn app_with_base_url(base_url: Option<&str>) -> Router {
    let service = Arc::new(SecretService::new(SqliteStore::open_in_memory().unwrap()));
    router(AppState::new(service, base_url.map(str::to_string)))
}

fn app() -> Router {
    app_with_base_url(Some(BASE_URL))
}

struct Reply {
    status: StatusCode,
    headers: HeaderMap,
    body: Value,
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> Reply {
    let mut request = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(value) => {
            request = request.header(header::CONTENT_TYPE, "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };

    let response = app
        .clone()
        .oneshot(request.body(body).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let headers = response.headers().clone();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    Reply {
        status,
        headers,
        body,
    }
}

async fn create(app: &Router, message: &str, code: &str) -> String {
    let reply = send(
        app,
        Method::POST,
        "/messages/new",
        Some(json!({ "message": message, "code": code, "intent": "create" })),
    )
    .await;
    assert_eq!(reply.status, StatusCode::CREATED, "{}", reply.body);
    reply.body["id"].as_str().unwrap().to_string()
}

async fn unlock(app: &Router, id: &str, code: &str) -> Reply {
    send(
        app,
        Method::POST,
        &format!("/messages/{}", id),
        Some(json!({ "code": code })),
    )
    .await
}

#[tokio::test]
async fn test_create_and_unlock_scenario() {
    let app = app();

    let reply = send(
        &app,
        Method::POST,
        "/messages/new",
        Some(json!({ "message": "launch codes", "code": "swordfish", "intent": "create" })),
    )
    .await;
    assert_eq!(reply.status, StatusCode::CREATED);
    let id = reply.body["id"].as_str().unwrap().to_string();
    assert_eq!(
        reply.headers[header::LOCATION].to_str().unwrap(),
        format!("/messages/{}", id)
    );
    assert_eq!(
        reply.body["url"],
        json!(format!("{}/messages/{}", BASE_URL, id))
    );

    let reply = unlock(&app, &id, "swordfish").await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["status"], "success");
    assert_eq!(reply.body["message"], "launch codes");

    let reply = unlock(&app, &id, "wrong").await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    assert_eq!(reply.body["status"], "error");
    assert_eq!(reply.body["errors"]["code"], json!(["Code is wrong"]));
    assert_eq!(reply.body["message"], Value::Null);

    let reply = unlock(&app, "does-not-exist", "swordfish").await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);
    assert_eq!(reply.body["error"], "not_found");
}

#[tokio::test]
async fn test_show_secret_page() {
    let app = app();
    let id = create(&app, "hello", "code").await;

    let reply = send(&app, Method::GET, &format!("/messages/{}", id), None).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["id"], json!(id));
    assert_eq!(
        reply.body["secret_url"],
        json!(format!("{}/messages/{}", BASE_URL, id))
    );
    assert!(reply.body.get("message").is_none());

    let reply = send(&app, Method::GET, "/messages/does-not-exist", None).await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);
    assert_eq!(reply.body["message"], "We can't find this secret");
}

#[tokio::test]
async fn test_share_url_falls_back_to_host_header() {
    let app = app_with_base_url(None);

    let request = Request::builder()
        .method(Method::POST)
        .uri("/messages/new")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::HOST, "localhost:3000")
        .body(Body::from(
            json!({ "message": "m", "code": "c", "intent": "create" }).to_string(),
        ))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    let id = body["id"].as_str().unwrap();
    assert_eq!(
        body["url"],
        json!(format!("http://localhost:3000/messages/{}", id))
    );
}

#[tokio::test]
async fn test_confirm_and_cancel_do_not_store() {
    let app = app();
    let form = |intent: &str| json!({ "message": "m", "code": "c", "intent": intent });

    let reply = send(&app, Method::POST, "/messages/new", Some(form("confirm"))).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body, json!({ "status": "success", "confirm": true }));

    let reply = send(&app, Method::POST, "/messages/new", Some(form("cancel"))).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body, json!({ "status": "success", "confirm": false }));
}

#[tokio::test]
async fn test_invalid_intent_is_malformed() {
    let app = app();

    for body in [
        json!({ "message": "m", "code": "c", "intent": "confrim" }),
        json!({ "message": "m", "code": "c" }),
    ] {
        let reply = send(&app, Method::POST, "/messages/new", Some(body)).await;
        assert_eq!(reply.status, StatusCode::BAD_REQUEST);
        assert_eq!(reply.body["error"], "malformed_input");
    }
}

#[tokio::test]
async fn test_create_validation_errors() {
    let app = app();

    let reply = send(
        &app,
        Method::POST,
        "/messages/new",
        Some(json!({ "message": "", "intent": "create" })),
    )
    .await;

    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.body["status"], "error");
    assert_eq!(reply.body["confirm"], false);
    assert_eq!(reply.body["errors"]["message"], json!(["Required"]));
    assert_eq!(reply.body["errors"]["code"], json!(["Required"]));
}

#[tokio::test]
async fn test_unlock_requires_code() {
    let app = app();
    let id = create(&app, "hello", "code").await;

    let reply = send(
        &app,
        Method::POST,
        &format!("/messages/{}", id),
        Some(json!({})),
    )
    .await;

    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.body["errors"]["code"], json!(["Required"]));
}

#[tokio::test]
async fn test_malformed_bodies() {
    let app = app();

    let request = Request::builder()
        .method(Method::POST)
        .uri("/messages/new")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let reply = send(
        &app,
        Method::POST,
        "/messages/new",
        Some(json!({ "message": 42, "code": "c", "intent": "create" })),
    )
    .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.body["error"], "malformed_input");

    let reply = send(&app, Method::POST, "/messages/anything", None).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.body["error"], "malformed_input");
}

#[tokio::test]
async fn test_same_message_gets_distinct_ids() {
    let app = app();

    let a = create(&app, "same", "code").await;
    let b = create(&app, "same", "code").await;
    assert_ne!(a, b);

    assert_eq!(unlock(&app, &a, "code").await.body["message"], "same");
    assert_eq!(unlock(&app, &b, "code").await.body["message"], "same");
}

#[tokio::test]
async fn test_index() {
    let reply = send(&app(), Method::GET, "/", None).await;

    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["new_secret"], "/messages/new");
}
