//! Axum Handlers for the REST API
//!
//! Service status, health, and the call-event webhook. The media stream
//! itself is handled in `ws`.

use axum::{
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use callbridge_core::audio::TELEPHONY_SAMPLE_RATE;
use std::sync::Arc;
use tracing::{info, warn};

use crate::{
    models::{AudioConfig, ErrorResponse, HealthResponse, ServiceStatus, WebhookAck, WebhookPayload},
    state::AppState,
};

pub const SERVICE_NAME: &str = "Streaming Voice Bot";

pub enum ApiError {
    BadRequest(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(message) => {
                warn!(message = %message, "Rejected request");
                (StatusCode::BAD_REQUEST, Json(ErrorResponse { message })).into_response()
            }
        }
    }
}

/// Service status and the number of calls in progress.
#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "Service is running", body = ServiceStatus)
    )
)]
pub async fn root(State(state): State<Arc<AppState>>) -> Json<ServiceStatus> {
    Json(ServiceStatus {
        status: "running".to_string(),
        service: SERVICE_NAME.to_string(),
        active_calls: state.active_calls(),
    })
}

/// Model and audio configuration in use.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    )
)]
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let session = &state.call_settings.session;
    Json(HealthResponse {
        status: "healthy".to_string(),
        model: session.model.clone(),
        voice: session.voice.clone(),
        audio_config: AudioConfig {
            telephony_sample_rate: TELEPHONY_SAMPLE_RATE,
            model_input_sample_rate: session.input_sample_rate,
            model_output_sample_rate: session.output_sample_rate,
            encoding: session.payload_encoding.to_string(),
        },
    })
}

/// Acknowledge a call lifecycle event.
#[utoipa::path(
    post,
    path = "/webhook",
    request_body = WebhookPayload,
    responses(
        (status = 200, description = "Event acknowledged", body = WebhookAck),
        (status = 400, description = "Malformed event body", body = ErrorResponse)
    )
)]
pub async fn webhook(
    payload: Result<Json<WebhookPayload>, JsonRejection>,
) -> Result<Json<WebhookAck>, ApiError> {
    let Json(payload) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    info!(
        call_id = ?payload.call_id,
        event_type = %payload.event_type,
        "Webhook received"
    );
    Ok(Json(WebhookAck {
        status: "ok".to_string(),
        call_id: payload.call_id,
        message: "Call acknowledged".to_string(),
    }))
}
