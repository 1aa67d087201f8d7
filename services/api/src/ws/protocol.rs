//! JSON event protocol spoken by the telephony media stream.

use callbridge_core::{BridgeError, Result};
use serde::{Deserialize, Serialize};

/// Events received from the telephony platform.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum TelephonyEvent {
    Connected {
        #[serde(default)]
        protocol: Option<String>,
    },
    Start {
        #[serde(rename = "streamSid", default)]
        stream_sid: Option<String>,
        #[serde(default)]
        start: StartMetadata,
    },
    Media {
        #[serde(default)]
        media: MediaPayload,
    },
    Stop {
        #[serde(default)]
        stop: StopMetadata,
    },
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StartMetadata {
    pub stream_sid: Option<String>,
    pub call_sid: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub struct MediaPayload {
    #[serde(default)]
    pub payload: String,
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
pub struct StopMetadata {
    pub reason: Option<String>,
}

impl TelephonyEvent {
    pub fn parse(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| BridgeError::MalformedMessage(e.to_string()))
    }
}

/// Events sent back to the telephony platform.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum OutboundEvent {
    Media {
        #[serde(rename = "streamSid")]
        stream_sid: String,
        media: MediaPayload,
    },
    /// Flushes audio the platform has buffered but not yet played.
    Clear {
        #[serde(rename = "streamSid")]
        stream_sid: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_start() {
        let event = TelephonyEvent::parse(
            r#"{"event":"start","streamSid":"S1","start":{"callSid":"C1","from":"+911","to":"+912"}}"#,
        )
        .unwrap();
        assert_eq!(
            event,
            TelephonyEvent::Start {
                stream_sid: Some("S1".into()),
                start: StartMetadata {
                    stream_sid: None,
                    call_sid: Some("C1".into()),
                    from: Some("+911".into()),
                    to: Some("+912".into()),
                },
            }
        );
    }

    #[test]
    fn test_parse_media_and_stop() {
        let media = TelephonyEvent::parse(r#"{"event":"media","media":{"payload":"//8="}}"#).unwrap();
        assert_eq!(
            media,
            TelephonyEvent::Media {
                media: MediaPayload {
                    payload: "//8=".into()
                }
            }
        );
        let stop = TelephonyEvent::parse(r#"{"event":"stop","stop":{"reason":"hangup"}}"#).unwrap();
        assert_eq!(
            stop,
            TelephonyEvent::Stop {
                stop: StopMetadata {
                    reason: Some("hangup".into())
                }
            }
        );
        // Extra fields such as sequence numbers are tolerated.
        assert!(matches!(
            TelephonyEvent::parse(r#"{"event":"connected","protocol":"Call","sequenceNumber":"1"}"#),
            Ok(TelephonyEvent::Connected { .. })
        ));
    }

    #[test]
    fn test_unknown_or_malformed_events_are_rejected() {
        for text in [r#"{"event":"mark","mark":{}}"#, r#"{"media":{}}"#, "not json"] {
            assert!(matches!(
                TelephonyEvent::parse(text),
                Err(BridgeError::MalformedMessage(_))
            ));
        }
    }

    #[test]
    fn test_outbound_shapes() {
        let media = OutboundEvent::Media {
            stream_sid: "S1".into(),
            media: MediaPayload {
                payload: "AAAA".into(),
            },
        };
        assert_eq!(
            serde_json::to_value(media).unwrap(),
            json!({"event":"media","streamSid":"S1","media":{"payload":"AAAA"}})
        );
        let clear = OutboundEvent::Clear {
            stream_sid: "S1".into(),
        };
        assert_eq!(
            serde_json::to_value(clear).unwrap(),
            json!({"event":"clear","streamSid":"S1"})
        );
    }
}
