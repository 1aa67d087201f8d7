//! The telephony leg of a call: one media-stream WebSocket from the phone system.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use axum::extract::ws::{Message, WebSocket};
use callbridge_core::{
    AudioFrame, BridgeError, PayloadEncoding, Result,
    audio::{MULAW_SILENCE, TELEPHONY_FRAME_BYTES},
};
use chrono::{DateTime, Utc};
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::protocol::{MediaPayload, OutboundEvent, TelephonyEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TelephonyStatus {
    Connecting,
    Connected,
    Streaming,
    Stopped,
}

/// What the telephony read loop reports to the orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub enum TelephonyInbound {
    Started {
        stream_sid: Option<String>,
        call_sid: Option<String>,
        from: Option<String>,
        to: Option<String>,
    },
    /// Raw µ-law 8 kHz audio, in arrival order.
    Audio(AudioFrame),
    Stopped {
        reason: String,
        duration: Duration,
    },
}

#[derive(Debug)]
pub struct TelephonyState {
    status: RwLock<TelephonyStatus>,
    stream_sid: RwLock<Option<String>>,
    call_sid: RwLock<Option<String>>,
    frames_received: AtomicU64,
    frames_sent: AtomicU64,
    started_at: DateTime<Utc>,
    started: Instant,
}

impl TelephonyState {
    fn new() -> Self {
        Self {
            status: RwLock::new(TelephonyStatus::Connecting),
            stream_sid: RwLock::new(None),
            call_sid: RwLock::new(None),
            frames_received: AtomicU64::new(0),
            frames_sent: AtomicU64::new(0),
            started_at: Utc::now(),
            started: Instant::now(),
        }
    }

    pub fn status(&self) -> TelephonyStatus {
        *self.status.read()
    }

    fn set_status(&self, status: TelephonyStatus) {
        *self.status.write() = status;
    }

    pub fn stream_sid(&self) -> Option<String> {
        self.stream_sid.read().clone()
    }

    pub fn call_sid(&self) -> Option<String> {
        self.call_sid.read().clone()
    }

    pub fn frames_received(&self) -> u64 {
        self.frames_received.load(Ordering::Relaxed)
    }

    pub fn frames_sent(&self) -> u64 {
        self.frames_sent.load(Ordering::Relaxed)
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Applies one inbound text frame. Malformed frames are logged and
    /// change nothing.
    pub fn handle_text(&self, text: &str) -> Option<TelephonyInbound> {
        let event = match TelephonyEvent::parse(text) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "Skipping telephony message");
                return None;
            }
        };

        match event {
            TelephonyEvent::Connected { protocol } => {
                info!(protocol = ?protocol, "Telephony stream connected");
                None
            }
            TelephonyEvent::Start { stream_sid, start } => {
                let stream_sid = stream_sid.or(start.stream_sid);
                {
                    // Identifiers are fixed by the first start event.
                    let mut current = self.stream_sid.write();
                    if current.is_none() {
                        *current = stream_sid.clone();
                    }
                    let mut call = self.call_sid.write();
                    if call.is_none() {
                        *call = start.call_sid.clone();
                    }
                }
                self.set_status(TelephonyStatus::Streaming);
                info!(
                    stream_sid = ?stream_sid,
                    call_sid = ?start.call_sid,
                    from = ?start.from,
                    to = ?start.to,
                    "Call started"
                );
                Some(TelephonyInbound::Started {
                    stream_sid,
                    call_sid: start.call_sid,
                    from: start.from,
                    to: start.to,
                })
            }
            TelephonyEvent::Media { media } => {
                if media.payload.is_empty() {
                    return None;
                }
                match PayloadEncoding::Base64.decode(&media.payload) {
                    Ok(ulaw) => {
                        self.frames_received.fetch_add(1, Ordering::Relaxed);
                        Some(TelephonyInbound::Audio(AudioFrame::mulaw(ulaw)))
                    }
                    Err(e) => {
                        warn!(error = %e, "Dropping undecodable telephony audio");
                        None
                    }
                }
            }
            TelephonyEvent::Stop { stop } => {
                let reason = stop.reason.unwrap_or_else(|| "Unknown".to_string());
                let duration = self.started.elapsed();
                self.set_status(TelephonyStatus::Stopped);
                info!(
                    reason = %reason,
                    duration_secs = duration.as_secs_f64(),
                    "Call ended"
                );
                Some(TelephonyInbound::Stopped { reason, duration })
            }
        }
    }
}

/// Pads µ-law audio with silence up to the next whole wire frame.
pub fn pad_to_frame(ulaw: &[u8]) -> Vec<u8> {
    let mut padded = ulaw.to_vec();
    let remainder = padded.len() % TELEPHONY_FRAME_BYTES;
    if remainder != 0 {
        padded.resize(
            padded.len() + TELEPHONY_FRAME_BYTES - remainder,
            MULAW_SILENCE,
        );
    }
    padded
}

/// Writing half of the telephony socket.
pub struct TelephonySession {
    sink: SplitSink<WebSocket, Message>,
    state: Arc<TelephonyState>,
    closed: bool,
}

/// Reading half of the telephony socket.
pub struct TelephonyReader {
    stream: SplitStream<WebSocket>,
    state: Arc<TelephonyState>,
}

impl TelephonySession {
    /// Takes ownership of an upgraded socket.
    pub fn accept(socket: WebSocket) -> (TelephonySession, TelephonyReader) {
        let state = Arc::new(TelephonyState::new());
        state.set_status(TelephonyStatus::Connected);
        info!(started_at = %state.started_at(), "Telephony WebSocket connected");

        let (sink, stream) = socket.split();
        (
            TelephonySession {
                sink,
                state: state.clone(),
                closed: false,
            },
            TelephonyReader { stream, state },
        )
    }

    pub fn state(&self) -> &Arc<TelephonyState> {
        &self.state
    }

    /// Sends µ-law audio to the caller. Returns `false` when nothing was sent
    /// because the stream has not started (or has ended).
    pub async fn send_audio(&mut self, frame: &AudioFrame) -> Result<bool> {
        if self.state.status() != TelephonyStatus::Streaming || frame.is_empty() {
            return Ok(false);
        }
        let Some(stream_sid) = self.state.stream_sid() else {
            return Ok(false);
        };

        let payload = PayloadEncoding::Base64.encode(&pad_to_frame(frame.data()));
        self.send_event(&OutboundEvent::Media {
            stream_sid,
            media: MediaPayload { payload },
        })
        .await?;
        self.state.frames_sent.fetch_add(1, Ordering::Relaxed);
        Ok(true)
    }

    /// Asks the platform to drop audio it has queued for playback.
    pub async fn send_clear(&mut self) -> Result<bool> {
        if self.state.status() != TelephonyStatus::Streaming {
            return Ok(false);
        }
        let Some(stream_sid) = self.state.stream_sid() else {
            return Ok(false);
        };
        self.send_event(&OutboundEvent::Clear { stream_sid }).await?;
        Ok(true)
    }

    async fn send_event(&mut self, event: &OutboundEvent) -> Result<()> {
        let text = serde_json::to_string(event)?;
        self.sink
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| BridgeError::ConnectionClosed(e.to_string()))
    }

    /// Idempotent.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.state.set_status(TelephonyStatus::Stopped);
        if let Err(e) = self.sink.close().await {
            debug!(error = %e, "Telephony socket already closed");
        }
        info!(
            frames_received = self.state.frames_received(),
            frames_sent = self.state.frames_sent(),
            "Closed telephony WebSocket"
        );
    }
}

impl TelephonyReader {
    /// Reads until the call stops, the socket closes, or `cancel` fires.
    ///
    /// Every frame is forwarded as soon as it is decoded; a full channel
    /// pauses reading.
    pub async fn run_event_loop(
        mut self,
        events: mpsc::Sender<TelephonyInbound>,
        cancel: CancellationToken,
    ) -> Result<()> {
        let result = self.read_events(&events, &cancel).await;
        self.state.set_status(TelephonyStatus::Stopped);
        if let Err(e) = &result {
            error!(error = %e, "Telephony event loop failed");
        }
        result
    }

    async fn read_events(
        &mut self,
        events: &mpsc::Sender<TelephonyInbound>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        loop {
            let message = tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                message = self.stream.next() => message,
            };
            let text = match message {
                None => {
                    info!("Telephony WebSocket disconnected");
                    return Ok(());
                }
                Some(Err(e)) => return Err(BridgeError::ConnectionClosed(e.to_string())),
                Some(Ok(Message::Text(text))) => text,
                Some(Ok(Message::Close(frame))) => {
                    info!(frame = ?frame, "Telephony peer closed the connection");
                    return Ok(());
                }
                Some(Ok(Message::Binary(data))) => {
                    warn!(len = data.len(), "Ignoring binary telephony frame");
                    continue;
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
            };

            let Some(inbound) = self.state.handle_text(text.as_str()) else {
                continue;
            };
            let stopped = matches!(inbound, TelephonyInbound::Stopped { .. });
            if events.send(inbound).await.is_err() {
                debug!("Orchestrator gone, stopping telephony event loop");
                return Ok(());
            }
            if stopped {
                return Ok(());
            }
        }
    }
}
