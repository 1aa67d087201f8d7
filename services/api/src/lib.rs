//! Call Bridge API Library Crate
//!
//! Configuration, application state, REST handlers, routing, and the
//! telephony media-stream logic that bridges each call to a Gemini Live
//! session. The binaries are thin wrappers around this library.

pub mod config;
pub mod handlers;
pub mod models;
pub mod router;
pub mod state;
pub mod ws;
