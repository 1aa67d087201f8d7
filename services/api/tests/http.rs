//! REST endpoints, exercised in-process with `tower::ServiceExt::oneshot`.

mod common;

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode, header},
};
use callbridge_api::{router::create_router, state::AppState};
use common::test_config;
use serde_json::{Value, json};
use tower::util::ServiceExt;

fn app() -> axum::Router {
    let state = Arc::new(AppState::new(test_config("ws://127.0.0.1:9"), None));
    create_router(state)
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_root_reports_running() {
    let response = app()
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await,
        json!({"status": "running", "service": "Streaming Voice Bot", "active_calls": 0})
    );
}

#[tokio::test]
async fn test_health_reports_audio_config() {
    let response = app()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["model"], "gemini-2.0-flash-exp");
    assert_eq!(body["voice"], "Puck");
    assert_eq!(
        body["audio_config"],
        json!({
            "telephony_sample_rate": 8000,
            "model_input_sample_rate": 16000,
            "model_output_sample_rate": 24000,
            "encoding": "base64"
        })
    );
}

#[tokio::test]
async fn test_webhook_acknowledges_call() {
    let request = Request::builder()
        .method("POST")
        .uri("/webhook")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"call_id":"C1"}"#))
        .unwrap();
    let response = app().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await,
        json!({"status": "ok", "call_id": "C1", "message": "Call acknowledged"})
    );
}

#[tokio::test]
async fn test_webhook_rejects_malformed_body() {
    let request = Request::builder()
        .method("POST")
        .uri("/webhook")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{oops"))
        .unwrap();
    let response = app().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(body_json(response).await["message"].is_string());
}

#[tokio::test]
async fn test_openapi_document_is_served() {
    let response = app()
        .oneshot(
            Request::builder()
                .uri("/api-docs/openapi.json")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert!(body["paths"]["/webhook"].is_object());
    assert!(body["paths"]["/health"].is_object());
}
