//! Shared building blocks for the call bridge: audio conversion, turn-taking
//! state, and the error taxonomy used by both session types.

pub mod audio;
pub mod error;
pub mod turn;

pub use audio::{AudioFrame, Encoding, PayloadEncoding};
pub use error::{BridgeError, Result};
pub use turn::{TurnEvent, TurnPhase, TurnTracker};
