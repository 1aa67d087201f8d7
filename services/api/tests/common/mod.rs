//! Shared fixtures: a test configuration and a mock Gemini Live server.

#![allow(dead_code)]

use std::{net::SocketAddr, sync::Arc, time::Duration};

use callbridge_api::{config::Config, router::create_router, state::AppState};
use callbridge_core::PayloadEncoding;
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{WebSocketStream, accept_async, tungstenite::Message};
use tracing::Level;

pub type MockSocket = WebSocketStream<TcpStream>;

pub fn test_config(model_url: &str) -> Config {
    Config {
        bind_address: "127.0.0.1:0".parse().unwrap(),
        gemini_api_key: "test-key".to_string(),
        gemini_model: "gemini-2.0-flash-exp".to_string(),
        gemini_ws_url: Some(model_url.to_string()),
        gemini_voice: "Puck".to_string(),
        temperature: 0.5,
        top_p: 0.9,
        max_output_tokens: 80,
        system_prompt_path: None,
        model_input_sample_rate: 16000,
        model_output_sample_rate: 24000,
        audio_encoding: PayloadEncoding::Base64,
        health_interval: Duration::from_secs(30),
        keepalive_interval: Duration::from_secs(10),
        keepalive_timeout: Duration::from_secs(5),
        latency_warn: Duration::from_millis(50),
        barge_in_clear: false,
        log_level: Level::INFO,
    }
}

/// Serves the app on an ephemeral port.
pub async fn spawn_app(state: Arc<AppState>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, create_router(state)).await.unwrap();
    });
    addr
}

/// Binds the mock model endpoint; the caller accepts with [`accept_model`].
pub async fn bind_model() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    (listener, url)
}

/// Accepts one model connection and answers its setup message.
pub async fn accept_model(listener: &TcpListener) -> (MockSocket, Value) {
    let (stream, _) = listener.accept().await.unwrap();
    let mut ws = accept_async(stream).await.unwrap();
    let setup = next_json(&mut ws).await.expect("setup message");
    send_json(&mut ws, json!({"setupComplete": {}})).await;
    (ws, setup)
}

/// Next JSON text frame, or `None` once the peer closes.
pub async fn next_json<S>(ws: &mut WebSocketStream<S>) -> Option<Value>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for a frame");
        match frame {
            Some(Ok(Message::Text(text))) => {
                return Some(serde_json::from_str(text.as_str()).unwrap());
            }
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
            Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return None,
            Some(Ok(other)) => panic!("unexpected frame: {other:?}"),
        }
    }
}

pub async fn send_json<S>(ws: &mut WebSocketStream<S>, value: Value)
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    ws.send(Message::Text(value.to_string().into())).await.unwrap();
}

pub fn model_audio(pcm: &[u8], rate: u32) -> Value {
    json!({"serverContent": {"modelTurn": {"parts": [
        {"inlineData": {"mimeType": format!("audio/pcm;rate={rate}"), "data": PayloadEncoding::Base64.encode(pcm)}}
    ]}}})
}

pub fn telephony_media(ulaw: &[u8]) -> Value {
    json!({"event": "media", "media": {"payload": PayloadEncoding::Base64.encode(ulaw)}})
}

/// Polls `check` until it holds or a second passes.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
