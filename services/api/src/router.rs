//! Axum Router Configuration
//!
//! This module defines the complete HTTP routing for the application,
//! including the REST API, the telephony WebSocket endpoint, and OpenAPI
//! documentation.

use crate::{
    handlers,
    models::{AudioConfig, ErrorResponse, HealthResponse, ServiceStatus, WebhookAck, WebhookPayload},
    state::AppState,
    ws::ws_handler,
};

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::root,
        handlers::health,
        handlers::webhook,
    ),
    components(
        schemas(ServiceStatus, HealthResponse, AudioConfig, WebhookPayload, WebhookAck, ErrorResponse)
    ),
    tags(
        (name = "Call Bridge API", description = "Telephony to Gemini Live voice bridge")
    )
)]
pub struct ApiDoc;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    let api_router = Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route("/webhook", post(handlers::webhook))
        .route("/smartflo/audio", get(ws_handler))
        .route("/smartflo/ws", get(ws_handler))
        .with_state(app_state);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(api_router)
}
