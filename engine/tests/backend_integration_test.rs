//! Integration tests for the HTTP backend client
//!
//! A wiremock server stands in for the research backend. These tests cover
//! request shapes, response decoding and error mapping.

use copilot_engine::backend::{BackendApi, HttpBackend};
use sdk::errors::{ClientError, CopilotErrorExt};
use sdk::types::TaskStatus;
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn backend_for(server: &MockServer) -> HttpBackend {
    HttpBackend::new(server.uri(), Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn test_chat_posts_message_and_reads_task_list() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(body_json(json!({ "message": "回测VOO" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "reply": "已开始回测",
            "tool_result": [{ "task_id": "t1", "symbol": "VOO" }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let response = backend_for(&server).chat("回测VOO").await.unwrap();

    assert_eq!(response.reply, "已开始回测");
    assert_eq!(response.first_task_id(), Some("t1"));
    assert_eq!(response.tool_result[0].fields["symbol"], "VOO");
}

#[tokio::test]
async fn test_chat_accepts_single_object_tool_result() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "reply": "ok",
            "tool_result": { "task_id": "t7" }
        })))
        .mount(&server)
        .await;

    let response = backend_for(&server).chat("hi").await.unwrap();
    assert_eq!(response.first_task_id(), Some("t7"));
}

#[tokio::test]
async fn test_chat_without_tool_result() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "reply": null })))
        .mount(&server)
        .await;

    let response = backend_for(&server).chat("hi").await.unwrap();
    assert_eq!(response.reply, "");
    assert!(response.tool_result.is_empty());
    assert_eq!(response.first_task_id(), None);
}

#[tokio::test]
async fn test_chat_server_error_maps_to_backend_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(500).set_body_string("internal error"))
        .mount(&server)
        .await;

    let err = backend_for(&server).chat("hi").await.unwrap_err();
    match &err {
        ClientError::BackendStatus { status, body } => {
            assert_eq!(*status, 500);
            assert_eq!(body, "internal error");
        }
        other => panic!("Expected BackendStatus, got: {:?}", other),
    }
    assert!(err.is_recoverable());
}

#[tokio::test]
async fn test_chat_malformed_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>not json</html>"))
        .mount(&server)
        .await;

    let err = backend_for(&server).chat("hi").await.unwrap_err();
    assert!(matches!(err, ClientError::MalformedResponse(_)));
    assert!(!err.is_recoverable());
}

#[tokio::test]
async fn test_status_complete_with_result() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/backtest/status/t1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "complete",
            "result": { "symbol": "VOO", "cagr": 0.12, "sharpe": 1.1 }
        })))
        .mount(&server)
        .await;

    let status = backend_for(&server).task_status("t1").await.unwrap();

    assert_eq!(status.status, TaskStatus::Complete);
    let result = status.result.unwrap();
    assert_eq!(result.symbol.as_deref(), Some("VOO"));
    assert_eq!(result.cagr, Some(0.12));
    assert_eq!(result.extra["sharpe"], json!(1.1));
}

#[tokio::test]
async fn test_status_failed_and_unknown() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/backtest/status/bad"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "failed",
            "error": "no data"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/backtest/status/odd"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "queued" })))
        .mount(&server)
        .await;

    let backend = backend_for(&server);

    let failed = backend.task_status("bad").await.unwrap();
    assert_eq!(failed.status, TaskStatus::Failed);
    assert_eq!(failed.error.as_deref(), Some("no data"));

    let odd = backend.task_status("odd").await.unwrap();
    assert_eq!(odd.status, TaskStatus::Unknown);
    assert!(!odd.status.is_terminal());
}

#[tokio::test]
async fn test_status_task_id_is_one_path_segment() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/backtest/status/a%2Fb%20c"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "pending" })))
        .expect(1)
        .mount(&server)
        .await;

    let status = backend_for(&server).task_status("a/b c").await.unwrap();
    assert_eq!(status.status, TaskStatus::Pending);
}

#[tokio::test]
async fn test_status_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/backtest/status/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({ "detail": "not found" })))
        .mount(&server)
        .await;

    let err = backend_for(&server).task_status("missing").await.unwrap_err();
    assert!(matches!(err, ClientError::BackendStatus { status: 404, .. }));
    assert!(!err.is_recoverable());
}

#[tokio::test]
async fn test_blank_task_id_is_rejected_without_request() {
    let server = MockServer::start().await;

    let err = backend_for(&server).task_status("  ").await.unwrap_err();
    assert!(matches!(err, ClientError::InvalidTaskId(_)));

    let requests = server.received_requests().await.unwrap();
    assert!(requests.is_empty());
}

#[tokio::test]
async fn test_base_url_trailing_slash() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/backtest/status/t1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "running" })))
        .mount(&server)
        .await;

    let backend = HttpBackend::new(format!("{}/", server.uri()), Duration::from_secs(5)).unwrap();
    assert_eq!(backend.base_url(), server.uri());

    let status = backend.task_status("t1").await.unwrap();
    assert_eq!(status.status, TaskStatus::Running);
}
