//! Client for the Gemini Live bidirectional streaming endpoint, speaking in
//! PCM16 audio frames and turn-taking events.

pub mod config;
pub mod messages;
pub mod session;

pub use config::SessionConfig;
pub use session::{ModelEvent, ModelReceiver, ModelSession, ModelStatus, SessionState, Speaker};
