//! Shared Application State
//!
//! This module defines the `AppState` struct, which holds the configuration,
//! the per-call settings handed to every orchestrator, and the registry of
//! calls currently in progress.

use crate::{
    config::Config,
    ws::{CallHandle, CallSettings},
};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::info;

/// The shared application state, created once at startup and passed to all handlers.
pub struct AppState {
    pub config: Arc<Config>,
    pub call_settings: CallSettings,
    /// Active calls keyed by connection id.
    pub calls: DashMap<String, CallHandle>,
}

impl AppState {
    /// `system_instruction` replaces the built-in persona when given.
    pub fn new(config: Config, system_instruction: Option<String>) -> Self {
        let call_settings = CallSettings {
            session: config.session_config(system_instruction),
            health_interval: config.health_interval,
            latency_warn: config.latency_warn,
            barge_in_clear: config.barge_in_clear,
        };
        Self {
            config: Arc::new(config),
            call_settings,
            calls: DashMap::new(),
        }
    }

    pub fn active_calls(&self) -> usize {
        self.calls.len()
    }

    /// Signals every active call to stop. Returns how many were signalled.
    pub fn stop_all_calls(&self) -> usize {
        let mut stopped = 0;
        for call in self.calls.iter() {
            call.value().stop();
            stopped += 1;
        }
        if stopped > 0 {
            info!(calls = stopped, "Stopping active calls");
        }
        stopped
    }
}
