//! API Models
//!
//! Request and response bodies for the REST endpoints, annotated for OpenAPI
//! generation with `utoipa`.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
pub struct ServiceStatus {
    #[schema(example = "running")]
    pub status: String,
    #[schema(example = "Streaming Voice Bot")]
    pub service: String,
    pub active_calls: usize,
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
pub struct AudioConfig {
    #[schema(example = 8000)]
    pub telephony_sample_rate: u32,
    #[schema(example = 16000)]
    pub model_input_sample_rate: u32,
    #[schema(example = 24000)]
    pub model_output_sample_rate: u32,
    #[schema(example = "base64")]
    pub encoding: String,
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
pub struct HealthResponse {
    #[schema(example = "healthy")]
    pub status: String,
    #[schema(example = "gemini-2.0-flash-exp")]
    pub model: String,
    #[schema(example = "Puck")]
    pub voice: String,
    pub audio_config: AudioConfig,
}

fn default_event_type() -> String {
    "ANSWERED".to_string()
}

/// Call lifecycle notification from the telephony platform.
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
pub struct WebhookPayload {
    #[schema(example = "C1")]
    pub call_id: Option<String>,
    #[serde(default = "default_event_type")]
    #[schema(example = "ANSWERED")]
    pub event_type: String,
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
pub struct WebhookAck {
    #[schema(example = "ok")]
    pub status: String,
    pub call_id: Option<String>,
    #[schema(example = "Call acknowledged")]
    pub message: String,
}

#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_webhook_event_type_defaults_to_answered() {
        let payload: WebhookPayload = serde_json::from_str(r#"{"call_id":"C1"}"#).unwrap();
        assert_eq!(payload.call_id.as_deref(), Some("C1"));
        assert_eq!(payload.event_type, "ANSWERED");

        let payload: WebhookPayload =
            serde_json::from_str(r#"{"call_id":"C2","event_type":"HANGUP"}"#).unwrap();
        assert_eq!(payload.event_type, "HANGUP");
    }

    #[test]
    fn test_webhook_without_call_id() {
        let payload: WebhookPayload = serde_json::from_str("{}").unwrap();
        assert_eq!(payload.call_id, None);
    }

    #[test]
    fn test_status_serialization() {
        let status = ServiceStatus {
            status: "running".to_string(),
            service: "Streaming Voice Bot".to_string(),
            active_calls: 2,
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"status":"running","service":"Streaming Voice Bot","active_calls":2})
        );
    }
}
