//! Runs one call: wires the telephony leg to a model session and routes
//! audio and turn events between them until either side ends.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use callbridge_core::{
    BridgeError, Result, TurnEvent,
    audio::{to_model, to_telephony},
};
use gemini_realtime::{ModelEvent, ModelSession, SessionConfig};
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, debug, error, info, warn};

use super::{
    health::{CallStats, HealthMonitor},
    telephony::{TelephonyInbound, TelephonyReader, TelephonySession},
};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Per-call tuning derived from the service configuration.
#[derive(Clone, Debug)]
pub struct CallSettings {
    pub session: SessionConfig,
    pub health_interval: Duration,
    pub latency_warn: Duration,
    /// Send a telephony `clear` when the model reports an interruption.
    pub barge_in_clear: bool,
}

/// A cheap handle for stopping a running call from outside.
#[derive(Clone, Debug)]
pub struct CallHandle {
    cancel: CancellationToken,
    stats: Arc<CallStats>,
}

impl CallHandle {
    /// Idempotent. The orchestrator tears both sessions down and returns.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn stats(&self) -> &Arc<CallStats> {
        &self.stats
    }
}

pub struct Orchestrator {
    telephony: TelephonySession,
    telephony_reader: TelephonyReader,
    settings: CallSettings,
    cancel: CancellationToken,
    stats: Arc<CallStats>,
}

/// Why the router loop ended.
#[derive(Debug)]
enum Exit {
    Stopped,
    TelephonyEnded,
    ModelEnded,
    Failed(BridgeError),
}

impl Orchestrator {
    pub fn new(
        telephony: TelephonySession,
        telephony_reader: TelephonyReader,
        settings: CallSettings,
    ) -> Self {
        Self {
            telephony,
            telephony_reader,
            settings,
            cancel: CancellationToken::new(),
            stats: Arc::new(CallStats::new()),
        }
    }

    pub fn handle(&self) -> CallHandle {
        CallHandle {
            cancel: self.cancel.clone(),
            stats: self.stats.clone(),
        }
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Connects the model, runs the call to completion and tears everything
    /// down. Both sessions are closed on every exit path.
    pub async fn start(self) -> Result<()> {
        let Orchestrator {
            mut telephony,
            telephony_reader,
            settings,
            cancel,
            stats,
        } = self;
        info!("Starting streaming orchestrator");

        let (model, model_receiver) = match ModelSession::connect(&settings.session).await {
            Ok(pair) => pair,
            Err(e) => {
                error!(error = %e, "Could not reach the model, ending call");
                cancel.cancel();
                telephony.close().await;
                return Err(e);
            }
        };

        let (telephony_tx, mut telephony_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (model_tx, mut model_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        let tasks: Vec<(&str, JoinHandle<Result<()>>)> = vec![
            (
                "telephony",
                tokio::spawn(
                    telephony_reader
                        .run_event_loop(telephony_tx, cancel.clone())
                        .in_current_span(),
                ),
            ),
            (
                "model",
                tokio::spawn(
                    model_receiver
                        .receive_events(model_tx, cancel.clone())
                        .in_current_span(),
                ),
            ),
            (
                "health",
                tokio::spawn({
                    let monitor = HealthMonitor::new(settings.health_interval, stats.clone());
                    let cancel = cancel.clone();
                    async move {
                        monitor.run(cancel).await;
                        Ok(())
                    }
                    .in_current_span()
                }),
            ),
        ];

        let mut router = Router {
            telephony: &mut telephony,
            model: &model,
            settings: &settings,
            stats: &stats,
        };
        let exit = loop {
            tokio::select! {
                _ = cancel.cancelled() => break Exit::Stopped,
                inbound = telephony_rx.recv() => match inbound {
                    Some(inbound) => {
                        if let Err(e) = router.on_telephony(inbound).await {
                            break Exit::Failed(e);
                        }
                    }
                    None => break Exit::TelephonyEnded,
                },
                event = model_rx.recv() => match event {
                    Some(event) => {
                        if let Err(e) = router.on_model(event).await {
                            break Exit::Failed(e);
                        }
                    }
                    None => break Exit::ModelEnded,
                },
            }
        };
        info!(reason = ?exit, "Stopping streaming orchestrator");

        cancel.cancel();
        model.close().await;
        telephony.close().await;

        for (name, task) in tasks {
            match task.await {
                Ok(Ok(())) => debug!(task = name, "Task finished"),
                Ok(Err(e)) => warn!(task = name, error = %e, "Task ended with error"),
                Err(e) => error!(task = name, error = %e, "Task panicked or was aborted"),
            }
        }

        let snapshot = stats.snapshot();
        info!(
            audio_in = snapshot.audio_in,
            audio_out = snapshot.audio_out,
            model_messages = model.state().messages_received(),
            "Streaming orchestrator stopped"
        );

        match exit {
            Exit::Failed(e) => Err(e),
            Exit::Stopped | Exit::TelephonyEnded | Exit::ModelEnded => Ok(()),
        }
    }
}

/// Moves events between the two legs. Only fatal errors are returned.
struct Router<'a> {
    telephony: &'a mut TelephonySession,
    model: &'a ModelSession,
    settings: &'a CallSettings,
    stats: &'a CallStats,
}

impl Router<'_> {
    async fn on_telephony(&mut self, inbound: TelephonyInbound) -> Result<()> {
        match inbound {
            TelephonyInbound::Started {
                stream_sid,
                call_sid,
                ..
            } => {
                let span = Span::current();
                if let Some(stream_sid) = &stream_sid {
                    span.record("stream_sid", stream_sid.as_str());
                }
                if let Some(call_sid) = &call_sid {
                    span.record("call_sid", call_sid.as_str());
                }
                Ok(())
            }
            TelephonyInbound::Audio(frame) => {
                if self.stats.on_caller_audio() {
                    info!("Caller interrupting, resetting response tracking");
                }
                let pcm = match to_model(&frame, self.settings.session.input_sample_rate) {
                    Ok(pcm) => pcm,
                    Err(e) => {
                        warn!(error = %e, "Dropping caller audio that failed conversion");
                        return Ok(());
                    }
                };
                match self.model.send_audio_chunk(&pcm).await {
                    Ok(Some(TurnEvent::UserStarted)) => debug!("Caller turn started"),
                    Ok(_) => {}
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => warn!(error = %e, "Failed to forward caller audio"),
                }
                Ok(())
            }
            TelephonyInbound::Stopped { reason, duration } => {
                info!(
                    reason = %reason,
                    duration_secs = duration.as_secs_f64(),
                    "Telephony stream stopped"
                );
                Ok(())
            }
        }
    }

    async fn on_model(&mut self, event: ModelEvent) -> Result<()> {
        match event {
            ModelEvent::SetupComplete => info!("Model ready"),
            ModelEvent::Audio(frame) => {
                let started = Instant::now();
                if let Some(latency) = self.stats.on_bot_audio() {
                    info!(latency_ms = latency.as_millis() as u64, "First response audio");
                }
                let ulaw = match to_telephony(&frame) {
                    Ok(ulaw) => ulaw,
                    Err(e) => {
                        warn!(error = %e, "Dropping model audio that failed conversion");
                        return Ok(());
                    }
                };
                match self.telephony.send_audio(&ulaw).await {
                    Ok(_) => {}
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => warn!(error = %e, "Failed to send audio to caller"),
                }
                let elapsed = started.elapsed();
                if elapsed > self.settings.latency_warn {
                    warn!(
                        latency_ms = elapsed.as_millis() as u64,
                        "Slow audio forwarding"
                    );
                }
            }
            ModelEvent::Transcript {
                text,
                speaker,
                is_final,
            } => info!(speaker = ?speaker, is_final, text = %text, "Transcript"),
            ModelEvent::Turn(turn) => self.on_turn(turn).await?,
        }
        Ok(())
    }

    async fn on_turn(&mut self, turn: TurnEvent) -> Result<()> {
        match turn {
            TurnEvent::Interrupted => {
                self.stats.clear_response();
                if self.settings.barge_in_clear {
                    match self.telephony.send_clear().await {
                        Ok(true) => info!("Cleared caller playback after interruption"),
                        Ok(false) => {}
                        Err(e) if e.is_fatal() => return Err(e),
                        Err(e) => warn!(error = %e, "Failed to clear caller playback"),
                    }
                }
            }
            TurnEvent::UserStopped | TurnEvent::BotStarted | TurnEvent::TurnComplete => {
                debug!(turn = ?turn, "Turn event")
            }
            TurnEvent::UserStarted => debug!("Caller turn started"),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_handle_stop_is_idempotent() {
        let handle = CallHandle {
            cancel: CancellationToken::new(),
            stats: Arc::new(CallStats::new()),
        };
        assert!(!handle.is_stopped());
        handle.stop();
        handle.stop();
        assert!(handle.is_stopped());
    }
}
