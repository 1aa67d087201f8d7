//! Accepts telephony media-stream WebSockets and runs one call per socket.

use axum::{
    extract::{
        State,
        ws::{WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use callbridge_core::BridgeError;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use super::{orchestrator::Orchestrator, telephony::TelephonySession};
use crate::state::AppState;

/// Axum handler to upgrade an HTTP connection to a telephony media stream.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_failed_upgrade(|e: axum::Error| {
        let err = BridgeError::ConnectionRejected(e.to_string());
        warn!(error = %err, "Telephony WebSocket upgrade failed");
    })
    .on_upgrade(|socket| handle_socket(socket, state))
}

/// Runs a single call from accept to teardown, registering it while it lives.
#[instrument(name = "call", skip_all, fields(call_id, stream_sid, call_sid))]
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let call_id = Uuid::new_v4().to_string();
    tracing::Span::current().record("call_id", call_id.as_str());
    info!("Telephony WebSocket connection accepted");

    let (telephony, reader) = TelephonySession::accept(socket);
    let orchestrator = Orchestrator::new(telephony, reader, state.call_settings.clone());
    state.calls.insert(call_id.clone(), orchestrator.handle());

    if let Err(e) = orchestrator.start().await {
        error!(error = %e, "Call ended with error");
    }

    state.calls.remove(&call_id);
    info!(active_calls = state.calls.len(), "Telephony WebSocket disconnected");
}
