use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{Value, json};
use tower::util::ServiceExt;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use gemini_relay::config::Config;
use gemini_relay::message::ChatResponse;
use gemini_relay::routes::create_router;
use gemini_relay::services::relay::BlockSplitter;
use gemini_relay::state::AppState;

fn test_config(base_url: &str) -> Config {
    Config {
        port: 0,
        model: "gemini-test".to_string(),
        api_key: "test-key".to_string(),
        base_url: base_url.to_string(),
        request_timeout: Duration::from_secs(5),
    }
}

fn app(base_url: &str) -> Router {
    let state = AppState::new(test_config(base_url)).unwrap();
    create_router().with_state(Arc::new(state))
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json_of(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn upstream_body(message: &str) -> Value {
    json!({ "contents": [{ "role": "user", "parts": [{ "text": message }] }] })
}

#[tokio::test]
async fn chat_forwards_message_and_returns_normalized_reply() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-test:generateContent"))
        .and(header("x-goog-api-key", "test-key"))
        .and(body_json(upstream_body("hello")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{ "content": [{ "parts": [{ "text": "hi there" }] }] }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let response = app(&server.uri())
        .oneshot(post_json("/api/chat", json!({ "message": "hello" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let reply: ChatResponse = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(reply.reply, "hi there");
}

#[tokio::test]
async fn empty_message_is_rejected_without_calling_upstream() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let app = app(&server.uri());

    for body in [json!({ "message": "   " }), json!({ "user_id": "u1" })] {
        let response = app
            .clone()
            .oneshot(post_json("/api/chat", body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let payload = body_json_of(response).await;
        assert!(payload.get("error").is_some());
    }
}

#[tokio::test]
async fn upstream_failure_surfaces_error_and_detail() {
    let server = MockServer::start().await;
    let upstream_error = json!({ "error": { "code": 429, "message": "quota exceeded" } });
    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-test:generateContent"))
        .respond_with(ResponseTemplate::new(429).set_body_json(upstream_error.clone()))
        .mount(&server)
        .await;

    let response = app(&server.uri())
        .oneshot(post_json("/api/chat", json!({ "message": "hello" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let payload = body_json_of(response).await;
    assert_eq!(payload["error"], "error calling Gemini");
    assert_eq!(payload["detail"], upstream_error);
}

#[tokio::test]
async fn concurrent_requests_get_their_own_replies() {
    let server = MockServer::start().await;
    for (message, reply) in [("first", "reply one"), ("second", "reply two")] {
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-test:generateContent"))
            .and(body_json(upstream_body(message)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{ "content": [{ "parts": [{ "text": reply }] }] }]
            })))
            .expect(1)
            .mount(&server)
            .await;
    }

    let app = app(&server.uri());
    let (a, b) = tokio::join!(
        app.clone()
            .oneshot(post_json("/api/chat", json!({ "message": "first" }))),
        app.clone()
            .oneshot(post_json("/api/chat", json!({ "message": "second" }))),
    );

    assert_eq!(body_json_of(a.unwrap()).await["reply"], "reply one");
    assert_eq!(body_json_of(b.unwrap()).await["reply"], "reply two");
}

#[tokio::test]
async fn stream_relays_fragments_in_order_with_single_end_block() {
    let server = MockServer::start().await;
    let sse_body = concat!(
        "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"Hel\"}],\"role\":\"model\"}}]}\n\n",
        "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"lo\"}],\"role\":\"model\"}}]}\n\n",
    );
    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-test:streamGenerateContent"))
        .and(query_param("alt", "sse"))
        .and(header("x-goog-api-key", "test-key"))
        .and(body_json(upstream_body("hello")))
        .respond_with(ResponseTemplate::new(200).set_body_raw(sse_body, "text/event-stream"))
        .expect(1)
        .mount(&server)
        .await;

    let response = app(&server.uri())
        .oneshot(post_json("/api/chat/stream", json!({ "message": "hello" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["content-type"],
        "text/event-stream"
    );

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let mut splitter = BlockSplitter::new();
    let blocks = splitter.feed(&bytes);
    assert!(splitter.flush().is_none());

    let fragments: Vec<&str> = blocks
        .iter()
        .filter(|block| block.event.is_none())
        .map(|block| block.data.as_str())
        .collect();
    assert_eq!(fragments.concat(), "Hello");

    let events: Vec<&str> = blocks
        .iter()
        .filter_map(|block| block.event.as_deref())
        .collect();
    assert_eq!(events, ["end"]);
    assert_eq!(blocks.last().unwrap().event.as_deref(), Some("end"));
}

#[tokio::test]
async fn stream_ignores_reserved_request_fields() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-test:streamGenerateContent"))
        .and(body_json(upstream_body("oi")))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"olá\"}]}}]}\n\n",
            "text/event-stream",
        ))
        .mount(&server)
        .await;

    let response = app(&server.uri())
        .oneshot(post_json(
            "/api/chat/stream",
            json!({ "message": "oi", "user_id": "u1", "use_gemini": true }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn stream_with_empty_message_is_rejected() {
    let server = MockServer::start().await;
    let response = app(&server.uri())
        .oneshot(post_json("/api/chat/stream", json!({ "message": "" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn stream_fails_plainly_when_upstream_is_unreachable() {
    // Nothing listens here; the connection is refused before any event byte.
    let response = app("http://127.0.0.1:9")
        .oneshot(post_json("/api/chat/stream", json!({ "message": "hello" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let payload = body_json_of(response).await;
    assert_eq!(payload["error"], "error calling Gemini");
    assert!(payload.get("detail").is_some());
}

#[tokio::test]
async fn health_endpoint_reports_model() {
    let response = app("http://127.0.0.1:9")
        .oneshot(
            Request::builder()
                .uri("/api/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let payload = body_json_of(response).await;
    assert_eq!(payload["status"], "healthy");
    assert_eq!(payload["model"], "gemini-test");
}
