//! Session parameters for the Gemini Live bidirectional endpoint.

use callbridge_core::{
    PayloadEncoding,
    audio::{MODEL_INPUT_SAMPLE_RATE, MODEL_OUTPUT_SAMPLE_RATE},
};
use std::time::Duration;

pub const GEMINI_LIVE_URL: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1alpha.GenerativeService.BidiGenerateContent";
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash-exp";
pub const DEFAULT_VOICE: &str = "Puck";

pub const DEFAULT_SYSTEM_INSTRUCTION: &str = "You are a friendly voice assistant answering a phone call. \
Keep every reply short and conversational, ask one question at a time, \
and never read out lists or long explanations.";

/// Everything needed to open and configure one model session.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Full WebSocket URL, including the API key query parameter.
    pub url: String,
    pub model: String,
    pub voice: String,
    pub temperature: f32,
    pub top_p: f32,
    pub max_output_tokens: u32,
    pub system_instruction: String,
    /// Rate of the PCM we send.
    pub input_sample_rate: u32,
    /// Rate assumed for model audio whose mime type does not name one.
    pub output_sample_rate: u32,
    pub payload_encoding: PayloadEncoding,
    pub keepalive_interval: Duration,
    pub keepalive_timeout: Duration,
}

impl SessionConfig {
    /// Default configuration against the public endpoint for `api_key`.
    pub fn for_api_key(api_key: &str) -> Self {
        Self {
            url: endpoint_for_key(api_key),
            ..Self::default()
        }
    }

    /// The model identifier in the `models/<id>` form the setup message expects.
    pub fn model_path(&self) -> String {
        if self.model.starts_with("models/") {
            self.model.clone()
        } else {
            format!("models/{}", self.model)
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            url: GEMINI_LIVE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            voice: DEFAULT_VOICE.to_string(),
            temperature: 0.5,
            top_p: 0.9,
            max_output_tokens: 80,
            system_instruction: DEFAULT_SYSTEM_INSTRUCTION.to_string(),
            input_sample_rate: MODEL_INPUT_SAMPLE_RATE,
            output_sample_rate: MODEL_OUTPUT_SAMPLE_RATE,
            payload_encoding: PayloadEncoding::Base64,
            keepalive_interval: Duration::from_secs(10),
            keepalive_timeout: Duration::from_secs(5),
        }
    }
}

pub fn endpoint_for_key(api_key: &str) -> String {
    format!("{GEMINI_LIVE_URL}?key={api_key}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_path() {
        let mut config = SessionConfig::default();
        assert_eq!(config.model_path(), "models/gemini-2.0-flash-exp");
        config.model = "models/custom".to_string();
        assert_eq!(config.model_path(), "models/custom");
    }

    #[test]
    fn test_for_api_key() {
        let config = SessionConfig::for_api_key("abc");
        assert!(config.url.starts_with("wss://generativelanguage.googleapis.com/"));
        assert!(config.url.ends_with("?key=abc"));
        assert_eq!(config.input_sample_rate, 16000);
        assert_eq!(config.output_sample_rate, 24000);
    }
}
