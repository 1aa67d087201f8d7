//! Wire types for the Gemini Live `BidiGenerateContent` protocol.
//!
//! Outbound messages use the snake_case field names the endpoint accepts;
//! inbound messages arrive camelCased.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::SessionConfig;

// --- Client -> server ---

#[derive(Serialize, Debug)]
#[serde(rename_all = "snake_case")]
pub enum ClientMessage {
    Setup(Setup),
    RealtimeInput(RealtimeInput),
}

#[derive(Serialize, Debug)]
pub struct Setup {
    pub model: String,
    pub generation_config: GenerationConfig,
    pub system_instruction: SystemInstruction,
    pub tools: Vec<Value>,
}

#[derive(Serialize, Debug)]
pub struct GenerationConfig {
    pub response_modalities: Vec<ResponseModality>,
    pub speech_config: SpeechConfig,
    pub temperature: f32,
    pub top_p: f32,
    pub max_output_tokens: u32,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResponseModality {
    Text,
    Audio,
}

#[derive(Serialize, Debug)]
pub struct SpeechConfig {
    pub voice_config: VoiceConfig,
}

#[derive(Serialize, Debug)]
pub struct VoiceConfig {
    pub prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Serialize, Debug)]
pub struct PrebuiltVoiceConfig {
    pub voice_name: String,
}

#[derive(Serialize, Debug)]
pub struct SystemInstruction {
    pub parts: Vec<TextPart>,
}

#[derive(Serialize, Debug)]
pub struct TextPart {
    pub text: String,
}

#[derive(Serialize, Debug)]
pub struct RealtimeInput {
    pub media_chunks: Vec<MediaChunk>,
}

#[derive(Serialize, Debug)]
pub struct MediaChunk {
    pub mime_type: String,
    pub data: String,
}

impl ClientMessage {
    pub fn setup(config: &SessionConfig) -> Self {
        ClientMessage::Setup(Setup {
            model: config.model_path(),
            generation_config: GenerationConfig {
                response_modalities: vec![ResponseModality::Audio],
                speech_config: SpeechConfig {
                    voice_config: VoiceConfig {
                        prebuilt_voice_config: PrebuiltVoiceConfig {
                            voice_name: config.voice.clone(),
                        },
                    },
                },
                temperature: config.temperature,
                top_p: config.top_p,
                max_output_tokens: config.max_output_tokens,
            },
            system_instruction: SystemInstruction {
                parts: vec![TextPart {
                    text: config.system_instruction.clone(),
                }],
            },
            tools: Vec::new(),
        })
    }

    /// One chunk of caller audio, already encoded for the wire.
    pub fn audio(data: String, sample_rate: u32) -> Self {
        ClientMessage::RealtimeInput(RealtimeInput {
            media_chunks: vec![MediaChunk {
                mime_type: format!("audio/pcm;rate={sample_rate}"),
                data,
            }],
        })
    }
}

// --- Server -> client ---

/// Raw inbound frame. Every top-level key is optional; anything we do not
/// model lands in `other`.
#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct ServerMessage {
    pub setup_complete: Option<Value>,
    pub server_content: Option<ServerContent>,
    pub tool_call: Option<Value>,
    pub tool_call_cancellation: Option<Value>,
    pub go_away: Option<GoAway>,
    pub usage_metadata: Option<Value>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ServerContent {
    pub model_turn: Option<ModelTurn>,
    #[serde(default)]
    pub turn_complete: bool,
    #[serde(default)]
    pub interrupted: bool,
    pub input_transcription: Option<Transcription>,
    pub output_transcription: Option<Transcription>,
}

#[derive(Deserialize, Debug, Default, Clone)]
pub struct ModelTurn {
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    pub text: Option<String>,
    pub inline_data: Option<InlineData>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub data: String,
}

impl InlineData {
    pub fn is_audio(&self) -> bool {
        self.mime_type.starts_with("audio/")
    }

    /// The `rate=` parameter of the mime type, e.g. `audio/pcm;rate=24000`.
    pub fn sample_rate(&self) -> Option<u32> {
        self.mime_type
            .split(';')
            .skip(1)
            .filter_map(|param| param.trim().strip_prefix("rate="))
            .find_map(|rate| rate.trim().parse().ok())
    }
}

#[derive(Deserialize, Debug, Default, Clone)]
pub struct Transcription {
    #[serde(default)]
    pub text: String,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "camelCase")]
pub struct GoAway {
    pub time_left: Option<String>,
}

/// A single recognised item from a [`ServerMessage`], in processing order.
#[derive(Debug, Clone)]
pub enum ServerEvent {
    SetupComplete,
    Content(ServerContent),
    ToolCall,
    ToolCallCancellation,
    GoAway(Option<String>),
    UsageMetadata(Value),
    Unrecognized(String),
}

impl ServerMessage {
    pub fn parse(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    pub fn into_events(self) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        if self.setup_complete.is_some() {
            events.push(ServerEvent::SetupComplete);
        }
        if let Some(content) = self.server_content {
            events.push(ServerEvent::Content(content));
        }
        if self.tool_call.is_some() {
            events.push(ServerEvent::ToolCall);
        }
        if self.tool_call_cancellation.is_some() {
            events.push(ServerEvent::ToolCallCancellation);
        }
        if let Some(go_away) = self.go_away {
            events.push(ServerEvent::GoAway(go_away.time_left));
        }
        if let Some(usage) = self.usage_metadata {
            events.push(ServerEvent::UsageMetadata(usage));
        }
        events.extend(self.other.into_iter().map(|(k, _)| k).map(ServerEvent::Unrecognized));
        events
    }
}
