//! Error taxonomy shared by the telephony side, the model side, and the codec.

/// Errors raised while bridging a call.
///
/// Only socket-level variants (`ConnectionRejected`, `UpstreamConnectFailed`,
/// `ConnectionClosed`) end a session. The rest describe a single bad frame or
/// message and are logged by the read loops, which then keep going.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("Telephony connection rejected: {0}")]
    ConnectionRejected(String),
    #[error("Failed to connect to the model endpoint: {0}")]
    UpstreamConnectFailed(String),
    #[error("Invalid frame length: {0} bytes is not a whole number of 16-bit samples")]
    InvalidFrameLength(usize),
    #[error("Malformed message: {0}")]
    MalformedMessage(String),
    #[error("Connection closed: {0}")]
    ConnectionClosed(String),
    #[error("Resampler error: {0}")]
    Resampler(String),
}

impl BridgeError {
    /// Whether this error ends the session it was raised on.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            BridgeError::ConnectionRejected(_)
                | BridgeError::UpstreamConnectFailed(_)
                | BridgeError::ConnectionClosed(_)
        )
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        BridgeError::MalformedMessage(err.to_string())
    }
}

pub type Result<T, E = BridgeError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            BridgeError::InvalidFrameLength(3).to_string(),
            "Invalid frame length: 3 bytes is not a whole number of 16-bit samples"
        );
        assert_eq!(
            BridgeError::ConnectionClosed("peer hung up".into()).to_string(),
            "Connection closed: peer hung up"
        );
    }

    #[test]
    fn test_only_socket_errors_are_fatal() {
        assert!(BridgeError::ConnectionClosed("x".into()).is_fatal());
        assert!(BridgeError::UpstreamConnectFailed("x".into()).is_fatal());
        assert!(BridgeError::ConnectionRejected("x".into()).is_fatal());
        assert!(!BridgeError::MalformedMessage("x".into()).is_fatal());
        assert!(!BridgeError::InvalidFrameLength(1).is_fatal());
        assert!(!BridgeError::Resampler("x".into()).is_fatal());
    }

    #[test]
    fn test_json_errors_become_malformed_message() {
        let err: BridgeError = serde_json::from_str::<serde_json::Value>("{not json")
            .unwrap_err()
            .into();
        assert!(matches!(err, BridgeError::MalformedMessage(_)));
    }
}
