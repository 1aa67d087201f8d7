//! Telephony media streaming.
//!
//! - `protocol`: the JSON events exchanged with the telephony platform.
//! - `telephony`: one telephony WebSocket, split into a reader and a writer.
//! - `orchestrator`: bridges a telephony leg to a model session for one call.
//! - `health`: per-call counters and the periodic health report.
//! - `session`: the axum upgrade handler that runs one call per socket.

pub mod health;
pub mod orchestrator;
pub mod protocol;
pub mod session;
pub mod telephony;

pub use orchestrator::{CallHandle, CallSettings, Orchestrator};
pub use session::ws_handler;
