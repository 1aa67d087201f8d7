//! One live connection to the model endpoint.
//!
//! [`ModelSession::connect`] splits the socket in two: the [`ModelSession`]
//! handle sends setup and audio, while the [`ModelReceiver`] runs the read
//! loop and reports typed [`ModelEvent`]s over a channel.

use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicU64, Ordering},
};

use callbridge_core::{
    AudioFrame, BridgeError, PayloadEncoding, Result, TurnEvent, TurnPhase, TurnTracker,
};
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use parking_lot::{Mutex, RwLock};
use tokio::{
    net::TcpStream,
    sync::{Mutex as AsyncMutex, mpsc},
    time::{Instant, MissedTickBehavior, interval_at, sleep_until},
};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async, tungstenite::protocol::Message as WsMessage,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    config::SessionConfig,
    messages::{ClientMessage, ServerContent, ServerEvent, ServerMessage},
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = Arc<AsyncMutex<SplitSink<WsStream, WsMessage>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelStatus {
    Connecting,
    SetupSent,
    Ready,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speaker {
    User,
    Bot,
}

/// Everything the model side reports to the rest of the call.
#[derive(Debug, Clone)]
pub enum ModelEvent {
    SetupComplete,
    /// Synthesized PCM16 at the rate the model declared.
    Audio(AudioFrame),
    Transcript {
        text: String,
        speaker: Speaker,
        is_final: bool,
    },
    Turn(TurnEvent),
}

/// State shared between the sending handle and the read loop.
#[derive(Debug)]
pub struct SessionState {
    status: RwLock<ModelStatus>,
    turn: Mutex<TurnTracker>,
    messages_received: AtomicU64,
    audio_chunks_sent: AtomicU64,
}

impl SessionState {
    fn new() -> Self {
        Self {
            status: RwLock::new(ModelStatus::Connecting),
            turn: Mutex::new(TurnTracker::new()),
            messages_received: AtomicU64::new(0),
            audio_chunks_sent: AtomicU64::new(0),
        }
    }

    pub fn status(&self) -> ModelStatus {
        *self.status.read()
    }

    fn set_status(&self, status: ModelStatus) {
        *self.status.write() = status;
    }

    pub fn turn_phase(&self) -> TurnPhase {
        self.turn.lock().phase()
    }

    pub fn messages_received(&self) -> u64 {
        self.messages_received.load(Ordering::Relaxed)
    }

    pub fn audio_chunks_sent(&self) -> u64 {
        self.audio_chunks_sent.load(Ordering::Relaxed)
    }
}

/// Turns inbound text frames into [`ModelEvent`]s, updating the shared state.
#[derive(Debug, Clone)]
pub struct EventDecoder {
    state: Arc<SessionState>,
    payload_encoding: PayloadEncoding,
    default_output_rate: u32,
}

impl EventDecoder {
    pub fn new(
        state: Arc<SessionState>,
        payload_encoding: PayloadEncoding,
        default_output_rate: u32,
    ) -> Self {
        Self {
            state,
            payload_encoding,
            default_output_rate,
        }
    }

    pub fn state(&self) -> &Arc<SessionState> {
        &self.state
    }

    /// Malformed frames are logged and produce no events.
    pub fn handle_text(&self, text: &str) -> Vec<ModelEvent> {
        let message = match ServerMessage::parse(text) {
            Ok(message) => message,
            Err(e) => {
                error!(error = %e, "Invalid JSON from model, skipping message");
                return Vec::new();
            }
        };
        self.state.messages_received.fetch_add(1, Ordering::Relaxed);

        let mut events = Vec::new();
        for event in message.into_events() {
            match event {
                ServerEvent::SetupComplete => {
                    info!("Model setup complete");
                    self.state.set_status(ModelStatus::Ready);
                    events.push(ModelEvent::SetupComplete);
                }
                ServerEvent::Content(content) => self.handle_content(content, &mut events),
                ServerEvent::ToolCall => debug!("Tool call received, no tools are registered"),
                ServerEvent::ToolCallCancellation => debug!("Tool call cancelled"),
                ServerEvent::GoAway(time_left) => {
                    warn!(time_left = ?time_left, "Model server is going away")
                }
                ServerEvent::UsageMetadata(usage) => debug!(%usage, "Usage metadata"),
                ServerEvent::Unrecognized(key) => {
                    warn!(key = %key, "Unrecognized model message, ignoring")
                }
            }
        }
        events
    }

    fn handle_content(&self, content: ServerContent, events: &mut Vec<ModelEvent>) {
        if let Some(transcription) = content.input_transcription.filter(|t| !t.text.is_empty()) {
            events.push(ModelEvent::Transcript {
                text: transcription.text,
                speaker: Speaker::User,
                is_final: true,
            });
        }

        for part in content.model_turn.map(|turn| turn.parts).unwrap_or_default() {
            if let Some(blob) = part.inline_data.filter(|blob| blob.is_audio()) {
                match self.payload_encoding.decode(&blob.data) {
                    Ok(pcm) if pcm.is_empty() => {}
                    Ok(pcm) => {
                        let rate = blob.sample_rate().unwrap_or(self.default_output_rate);
                        let turn_events = self.state.turn.lock().on_bot_audio();
                        for turn_event in turn_events {
                            if turn_event == TurnEvent::BotStarted {
                                info!("Bot started speaking");
                            }
                            events.push(ModelEvent::Turn(turn_event));
                        }
                        events.push(ModelEvent::Audio(AudioFrame::pcm16(pcm, rate)));
                    }
                    Err(e) => warn!(error = %e, "Dropping undecodable model audio"),
                }
            }
            if let Some(text) = part.text.filter(|text| !text.is_empty()) {
                events.push(ModelEvent::Transcript {
                    text,
                    speaker: Speaker::Bot,
                    is_final: true,
                });
            }
        }

        if let Some(transcription) = content.output_transcription.filter(|t| !t.text.is_empty()) {
            events.push(ModelEvent::Transcript {
                text: transcription.text,
                speaker: Speaker::Bot,
                is_final: true,
            });
        }

        if content.turn_complete {
            info!("Turn complete, waiting for caller");
            events.push(ModelEvent::Turn(self.state.turn.lock().on_turn_complete()));
        }
        if content.interrupted {
            info!("Bot interrupted by caller");
            events.push(ModelEvent::Turn(self.state.turn.lock().on_interrupted()));
        }
    }
}

/// Sending half of a model connection.
pub struct ModelSession {
    sink: WsSink,
    state: Arc<SessionState>,
    closed: AtomicBool,
    payload_encoding: PayloadEncoding,
    input_sample_rate: u32,
}

impl ModelSession {
    /// Opens the socket and sends the setup message. No retries.
    pub async fn connect(config: &SessionConfig) -> Result<(ModelSession, ModelReceiver)> {
        let state = Arc::new(SessionState::new());
        info!(model = %config.model, "Connecting to model endpoint");
        let (ws_stream, _) = connect_async(config.url.as_str())
            .await
            .map_err(|e| BridgeError::UpstreamConnectFailed(e.to_string()))?;
        let (sink, stream) = ws_stream.split();
        let sink = Arc::new(AsyncMutex::new(sink));

        let setup = serde_json::to_string(&ClientMessage::setup(config))?;
        sink.lock()
            .await
            .send(WsMessage::Text(setup.into()))
            .await
            .map_err(|e| BridgeError::UpstreamConnectFailed(e.to_string()))?;
        state.set_status(ModelStatus::SetupSent);
        info!(voice = %config.voice, "Sent model setup");

        let session = ModelSession {
            sink: sink.clone(),
            state: state.clone(),
            closed: AtomicBool::new(false),
            payload_encoding: config.payload_encoding,
            input_sample_rate: config.input_sample_rate,
        };
        let receiver = ModelReceiver {
            stream,
            sink,
            decoder: EventDecoder::new(state, config.payload_encoding, config.output_sample_rate),
            keepalive: Keepalive {
                interval: config.keepalive_interval,
                timeout: config.keepalive_timeout,
            },
        };
        Ok((session, receiver))
    }

    pub fn state(&self) -> &Arc<SessionState> {
        &self.state
    }

    /// Sends one chunk of caller PCM. Returns `UserStarted` on the first chunk
    /// of a new speaking segment.
    ///
    /// Only an idle session moves to `UserSpeaking`. While the bot is speaking
    /// the phase is left alone; barge-in comes from the model's `interrupted`.
    pub async fn send_audio_chunk(&self, frame: &AudioFrame) -> Result<Option<TurnEvent>> {
        if !matches!(
            self.state.status(),
            ModelStatus::SetupSent | ModelStatus::Ready
        ) {
            return Ok(None);
        }
        let turn_event = self.state.turn.lock().on_user_audio();
        if turn_event.is_some() {
            debug!("User started speaking");
        }

        let data = self.payload_encoding.encode(frame.data());
        let message = ClientMessage::audio(data, self.input_sample_rate);
        let payload = serde_json::to_string(&message)?;
        self.sink
            .lock()
            .await
            .send(WsMessage::Text(payload.into()))
            .await
            .map_err(|e| BridgeError::ConnectionClosed(e.to_string()))?;
        self.state.audio_chunks_sent.fetch_add(1, Ordering::Relaxed);
        Ok(turn_event)
    }

    /// Idempotent.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.state.set_status(ModelStatus::Closed);
        if let Err(e) = self.sink.lock().await.close().await {
            debug!(error = %e, "Model socket already closed");
        }
        info!("Model session closed");
    }
}

#[derive(Debug, Clone, Copy)]
struct Keepalive {
    interval: std::time::Duration,
    timeout: std::time::Duration,
}

/// Receiving half of a model connection.
pub struct ModelReceiver {
    stream: SplitStream<WsStream>,
    sink: WsSink,
    decoder: EventDecoder,
    keepalive: Keepalive,
}

impl ModelReceiver {
    /// Runs until the socket closes, `cancel` fires, or `events` is dropped.
    ///
    /// Pings the server every keepalive interval; a ping left unanswered past
    /// the keepalive timeout ends the loop with `ConnectionClosed`.
    pub async fn receive_events(
        mut self,
        events: mpsc::Sender<ModelEvent>,
        cancel: CancellationToken,
    ) -> Result<()> {
        let state = self.decoder.state().clone();
        let result = self.run(&events, &cancel).await;
        state.set_status(ModelStatus::Closed);
        match &result {
            Ok(()) => info!("Model receive loop finished"),
            Err(e) => warn!(error = %e, "Model receive loop ended"),
        }
        result
    }

    async fn run(
        &mut self,
        events: &mpsc::Sender<ModelEvent>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mut ping = interval_at(
            Instant::now() + self.keepalive.interval,
            self.keepalive.interval,
        );
        ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut pong_deadline: Option<Instant> = None;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                _ = ping.tick(), if pong_deadline.is_none() => {
                    self.sink
                        .lock()
                        .await
                        .send(WsMessage::Ping(Default::default()))
                        .await
                        .map_err(|e| BridgeError::ConnectionClosed(e.to_string()))?;
                    pong_deadline = Some(Instant::now() + self.keepalive.timeout);
                }
                _ = sleep_until(pong_deadline.unwrap_or_else(Instant::now)), if pong_deadline.is_some() => {
                    return Err(BridgeError::ConnectionClosed(
                        "keepalive ping timed out".to_string(),
                    ));
                }
                frame = self.stream.next() => {
                    let message = match frame {
                        None => return Ok(()),
                        Some(Err(e)) => return Err(BridgeError::ConnectionClosed(e.to_string())),
                        Some(Ok(message)) => message,
                    };
                    // Any traffic proves the peer is alive.
                    pong_deadline = None;
                    let text = match message {
                        WsMessage::Text(text) => text.as_str().to_owned(),
                        WsMessage::Binary(data) => match String::from_utf8(data.to_vec()) {
                            Ok(text) => text,
                            Err(_) => {
                                warn!(len = data.len(), "Non UTF-8 binary frame from model, skipping");
                                continue;
                            }
                        },
                        WsMessage::Close(frame) => {
                            info!(frame = ?frame, "Model closed the connection");
                            return Ok(());
                        }
                        WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_) => continue,
                    };
                    for event in self.decoder.handle_text(&text) {
                        if events.send(event).await.is_err() {
                            debug!("Event consumer gone, stopping model receive loop");
                            return Ok(());
                        }
                    }
                }
            }
        }
    }
}
