//! Drives a real `ModelSession` against a local mock of the Live endpoint.

use std::time::Duration;

use callbridge_core::{AudioFrame, BridgeError, PayloadEncoding, TurnEvent, TurnPhase};
use futures_util::{SinkExt, StreamExt};
use gemini_realtime::{ModelEvent, ModelSession, ModelStatus, SessionConfig, Speaker};
use serde_json::{Value, json};
use tokio::{net::TcpListener, sync::mpsc};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;

async fn bind() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    (listener, url)
}

fn config(url: String) -> SessionConfig {
    SessionConfig {
        url,
        system_instruction: "Keep it short.".to_string(),
        ..SessionConfig::default()
    }
}

async fn next_json<S>(read: &mut S) -> Value
where
    S: StreamExt<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        match read.next().await.unwrap().unwrap() {
            Message::Text(text) => return serde_json::from_str(text.as_str()).unwrap(),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected frame from client: {other:?}"),
        }
    }
}

async fn recv(rx: &mut mpsc::Receiver<ModelEvent>) -> ModelEvent {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for model event")
        .expect("model event channel closed")
}

#[tokio::test]
async fn test_full_model_turn() {
    let (listener, url) = bind().await;

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let ws = accept_async(stream).await.unwrap();
        let (mut write, mut read) = ws.split();

        let setup = next_json(&mut read).await;
        assert_eq!(setup["setup"]["model"], "models/gemini-2.0-flash-exp");
        assert_eq!(
            setup["setup"]["system_instruction"]["parts"][0]["text"],
            "Keep it short."
        );
        write
            .send(Message::Text(json!({"setupComplete": {}}).to_string().into()))
            .await
            .unwrap();

        let audio = next_json(&mut read).await;
        let chunk = &audio["realtime_input"]["media_chunks"][0];
        assert_eq!(chunk["mime_type"], "audio/pcm;rate=16000");
        let pcm = PayloadEncoding::Base64
            .decode(chunk["data"].as_str().unwrap())
            .unwrap();
        assert_eq!(pcm.len(), 640);

        let reply = PayloadEncoding::Base64.encode(&[0u8; 960]);
        let frames = [
            "{not json".to_string(),
            json!({"serverContent": {"modelTurn": {"parts": [
                {"inlineData": {"mimeType": "audio/pcm;rate=24000", "data": reply}},
                {"text": "Ji boliye"}
            ]}}})
            .to_string(),
            json!({"serverContent": {"turnComplete": true}}).to_string(),
            json!({"toolCallCancellation": {"ids": ["a"]}}).to_string(),
            json!({"serverContent": {"interrupted": true}}).to_string(),
        ];
        for frame in frames {
            write.send(Message::Text(frame.into())).await.unwrap();
        }
        write.send(Message::Close(None)).await.unwrap();
    });

    let (session, receiver) = ModelSession::connect(&config(url)).await.unwrap();
    assert_eq!(session.state().status(), ModelStatus::SetupSent);

    let (tx, mut rx) = mpsc::channel(32);
    let cancel = CancellationToken::new();
    let receive = tokio::spawn(receiver.receive_events(tx, cancel.clone()));

    assert!(matches!(recv(&mut rx).await, ModelEvent::SetupComplete));
    assert_eq!(session.state().status(), ModelStatus::Ready);

    let caller_audio = AudioFrame::pcm16(vec![0u8; 640], 16000);
    let started = session.send_audio_chunk(&caller_audio).await.unwrap();
    assert_eq!(started, Some(TurnEvent::UserStarted));
    assert_eq!(session.state().turn_phase(), TurnPhase::UserSpeaking);

    assert!(matches!(recv(&mut rx).await, ModelEvent::Turn(TurnEvent::UserStopped)));
    assert!(matches!(recv(&mut rx).await, ModelEvent::Turn(TurnEvent::BotStarted)));
    match recv(&mut rx).await {
        ModelEvent::Audio(frame) => {
            assert_eq!(frame.len(), 960);
            assert_eq!(frame.sample_rate(), 24000);
        }
        other => panic!("expected audio, got {other:?}"),
    }
    assert!(matches!(
        recv(&mut rx).await,
        ModelEvent::Transcript { speaker: Speaker::Bot, is_final: true, .. }
    ));
    assert!(matches!(recv(&mut rx).await, ModelEvent::Turn(TurnEvent::TurnComplete)));
    assert!(matches!(recv(&mut rx).await, ModelEvent::Turn(TurnEvent::Interrupted)));

    receive.await.unwrap().unwrap();
    server.await.unwrap();

    // The malformed frame was skipped without counting.
    assert_eq!(session.state().messages_received(), 5);
    assert_eq!(session.state().audio_chunks_sent(), 1);
    assert_eq!(session.state().turn_phase(), TurnPhase::UserSpeaking);
    assert_eq!(session.state().status(), ModelStatus::Closed);

    // Closed sessions swallow audio and close again quietly.
    assert_eq!(session.send_audio_chunk(&caller_audio).await.unwrap(), None);
    session.close().await;
    session.close().await;
}

#[tokio::test]
async fn test_connect_failure_is_upstream_error() {
    let (listener, url) = bind().await;
    drop(listener);

    match ModelSession::connect(&config(url)).await {
        Err(BridgeError::UpstreamConnectFailed(_)) => {}
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("connect should fail with nothing listening"),
    }
}

#[tokio::test]
async fn test_unanswered_ping_closes_session() {
    let (listener, url) = bind().await;

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let ws = accept_async(stream).await.unwrap();
        // Never read again, so pings go unanswered.
        tokio::time::sleep(Duration::from_secs(2)).await;
        drop(ws);
    });

    let mut config = config(url);
    config.keepalive_interval = Duration::from_millis(50);
    config.keepalive_timeout = Duration::from_millis(100);
    let (session, receiver) = ModelSession::connect(&config).await.unwrap();

    let (tx, _rx) = mpsc::channel(8);
    let result = tokio::time::timeout(
        Duration::from_secs(1),
        receiver.receive_events(tx, CancellationToken::new()),
    )
    .await
    .expect("keepalive should end the loop");

    assert!(matches!(result, Err(BridgeError::ConnectionClosed(_))));
    assert_eq!(session.state().status(), ModelStatus::Closed);
    server.abort();
}

#[tokio::test]
async fn test_cancel_stops_receive_loop() {
    let (listener, url) = bind().await;

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        while let Some(Ok(_)) = ws.next().await {}
    });

    let (session, receiver) = ModelSession::connect(&config(url)).await.unwrap();
    let (tx, _rx) = mpsc::channel(8);
    let cancel = CancellationToken::new();
    let receive = tokio::spawn(receiver.receive_events(tx, cancel.clone()));

    cancel.cancel();
    receive.await.unwrap().unwrap();
    session.close().await;
    server.await.unwrap();
}
