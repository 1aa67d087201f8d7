use callbridge_core::{
    PayloadEncoding,
    audio::{MODEL_INPUT_SAMPLE_RATE, MODEL_OUTPUT_SAMPLE_RATE},
};
use gemini_realtime::{
    SessionConfig,
    config::{DEFAULT_MODEL, DEFAULT_SYSTEM_INSTRUCTION, DEFAULT_VOICE, endpoint_for_key},
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub gemini_api_key: String,
    pub gemini_model: String,
    /// Explicit model endpoint. When unset the public endpoint is used.
    pub gemini_ws_url: Option<String>,
    pub gemini_voice: String,
    pub temperature: f32,
    pub top_p: f32,
    pub max_output_tokens: u32,
    pub system_prompt_path: Option<PathBuf>,
    pub model_input_sample_rate: u32,
    pub model_output_sample_rate: u32,
    pub audio_encoding: PayloadEncoding,
    pub health_interval: Duration,
    pub keepalive_interval: Duration,
    pub keepalive_timeout: Duration,
    pub latency_warn: Duration,
    pub barge_in_clear: bool,
    pub log_level: Level,
}

/// Reads `name`, falling back to `default` when unset.
fn parse_var<T>(name: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), format!("'{raw}': {e}"))),
        Err(_) => Ok(default),
    }
}

fn parse_bool(name: &str, default: bool) -> Result<bool, ConfigError> {
    match std::env::var(name) {
        Ok(raw) => match raw.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidValue(
                name.to_string(),
                format!("'{raw}' is not a boolean"),
            )),
        },
        Err(_) => Ok(default),
    }
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8000".to_string());
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let gemini_api_key = std::env::var("GEMINI_API_KEY")
            .or_else(|_| std::env::var("GOOGLE_API_KEY"))
            .map_err(|_| {
                ConfigError::MissingVar("GEMINI_API_KEY (or GOOGLE_API_KEY)".to_string())
            })?;

        let gemini_model =
            std::env::var("GEMINI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        let gemini_ws_url = std::env::var("GEMINI_WS_URL").ok();
        let gemini_voice =
            std::env::var("GEMINI_VOICE").unwrap_or_else(|_| DEFAULT_VOICE.to_string());

        let temperature = parse_var("GEMINI_TEMPERATURE", 0.5f32)?;
        let top_p = parse_var("GEMINI_TOP_P", 0.9f32)?;
        let max_output_tokens = parse_var("GEMINI_MAX_TOKENS", 80u32)?;

        let system_prompt_path = std::env::var("SYSTEM_PROMPT_PATH").ok().map(PathBuf::from);

        let model_input_sample_rate = parse_var("MODEL_INPUT_SAMPLE_RATE", MODEL_INPUT_SAMPLE_RATE)?;
        let model_output_sample_rate =
            parse_var("MODEL_OUTPUT_SAMPLE_RATE", MODEL_OUTPUT_SAMPLE_RATE)?;
        for (name, rate) in [
            ("MODEL_INPUT_SAMPLE_RATE", model_input_sample_rate),
            ("MODEL_OUTPUT_SAMPLE_RATE", model_output_sample_rate),
        ] {
            if rate == 0 {
                return Err(ConfigError::InvalidValue(
                    name.to_string(),
                    "sample rate must be positive".to_string(),
                ));
            }
        }
        let audio_encoding = parse_var("MODEL_AUDIO_ENCODING", PayloadEncoding::Base64)?;

        let health_interval = Duration::from_secs(parse_var("HEALTH_INTERVAL_SECS", 30u64)?);
        let keepalive_interval = Duration::from_secs(parse_var("KEEPALIVE_INTERVAL_SECS", 10u64)?);
        let keepalive_timeout = Duration::from_secs(parse_var("KEEPALIVE_TIMEOUT_SECS", 5u64)?);
        let latency_warn = Duration::from_millis(parse_var("LATENCY_WARN_MS", 50u64)?);
        for (name, period) in [
            ("HEALTH_INTERVAL_SECS", health_interval),
            ("KEEPALIVE_INTERVAL_SECS", keepalive_interval),
            ("KEEPALIVE_TIMEOUT_SECS", keepalive_timeout),
        ] {
            if period.is_zero() {
                return Err(ConfigError::InvalidValue(
                    name.to_string(),
                    "must be at least one second".to_string(),
                ));
            }
        }

        let barge_in_clear = parse_bool("BARGE_IN_CLEAR", false)?;

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            bind_address,
            gemini_api_key,
            gemini_model,
            gemini_ws_url,
            gemini_voice,
            temperature,
            top_p,
            max_output_tokens,
            system_prompt_path,
            model_input_sample_rate,
            model_output_sample_rate,
            audio_encoding,
            health_interval,
            keepalive_interval,
            keepalive_timeout,
            latency_warn,
            barge_in_clear,
            log_level,
        })
    }

    /// Builds the per-call model session parameters.
    ///
    /// `system_instruction` replaces the built-in persona when given.
    pub fn session_config(&self, system_instruction: Option<String>) -> SessionConfig {
        SessionConfig {
            url: self
                .gemini_ws_url
                .clone()
                .unwrap_or_else(|| endpoint_for_key(&self.gemini_api_key)),
            model: self.gemini_model.clone(),
            voice: self.gemini_voice.clone(),
            temperature: self.temperature,
            top_p: self.top_p,
            max_output_tokens: self.max_output_tokens,
            system_instruction: system_instruction
                .unwrap_or_else(|| DEFAULT_SYSTEM_INSTRUCTION.to_string()),
            input_sample_rate: self.model_input_sample_rate,
            output_sample_rate: self.model_output_sample_rate,
            payload_encoding: self.audio_encoding,
            keepalive_interval: self.keepalive_interval,
            keepalive_timeout: self.keepalive_timeout,
        }
    }
}
