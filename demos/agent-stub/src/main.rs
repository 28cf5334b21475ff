//! Stand-in for a device agent's terminal endpoint.
//!
//! Run with: cargo run -p agent-stub
//!
//! Then point a client at ws://127.0.0.1:3000 (see `shell-client`).
//! Input is echoed back line by line, like a very small shell.

use std::net::SocketAddr;

use agent_link_transport::ControlMessage;
use axum::{
    Router,
    extract::{
        Path, Query, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::IntoResponse,
    routing::get,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const PROMPT: &str = "$ ";

#[derive(Debug, Deserialize)]
struct SessionParams {
    session_id: Option<String>,
    org_id: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let addr: SocketAddr = std::env::var("AGENT_STUB_ADDR")
        .unwrap_or_else(|_| "127.0.0.1:3000".into())
        .parse()?;

    let app = Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route("/terminal/{device_id}", get(terminal_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    tracing::info!("Agent stub listening on ws://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn terminal_handler(
    ws: WebSocketUpgrade,
    Path(device_id): Path<String>,
    Query(params): Query<SessionParams>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_session(socket, device_id, params))
}

async fn handle_session(socket: WebSocket, device_id: String, params: SessionParams) {
    let session_id = params.session_id.unwrap_or_else(|| "anonymous".into());
    let org_id = params.org_id.unwrap_or_default();
    tracing::info!(%device_id, %session_id, %org_id, "Session connected");

    let (mut sender, mut receiver) = socket.split();
    let mut line = Vec::new();

    while let Some(msg) = receiver.next().await {
        let reply = match msg {
            Ok(Message::Binary(data)) if data.is_empty() => {
                format!("Connected to {device_id} (session {session_id})\r\n{PROMPT}").into_bytes()
            }
            Ok(Message::Binary(data)) => echo(&mut line, &data),
            Ok(Message::Text(text)) => {
                match serde_json::from_str::<ControlMessage>(text.as_str()) {
                    Ok(ControlMessage::Resize { cols, rows }) => {
                        tracing::info!(%session_id, cols, rows, "Resize");
                    }
                    Err(e) => tracing::warn!(%session_id, "Invalid control frame: {e}"),
                }
                continue;
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                tracing::error!(%session_id, "WebSocket error: {e}");
                break;
            }
        };

        if reply.is_empty() {
            continue;
        }
        if sender.send(Message::Binary(reply.into())).await.is_err() {
            break;
        }
    }

    tracing::info!(%device_id, %session_id, "Session disconnected");
}

/// Echo keystrokes; a carriage return completes the line.
fn echo(line: &mut Vec<u8>, data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    for &byte in data {
        match byte {
            b'\r' | b'\n' => {
                let command = String::from_utf8_lossy(line).trim().to_string();
                line.clear();
                out.extend_from_slice(b"\r\n");
                if !command.is_empty() {
                    out.extend_from_slice(format!("you typed: {command}\r\n").as_bytes());
                }
                out.extend_from_slice(PROMPT.as_bytes());
            }
            0x7f => {
                if line.pop().is_some() {
                    out.extend_from_slice(b"\x08 \x08");
                }
            }
            _ => {
                line.push(byte);
                out.push(byte);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_echo_completes_lines() {
        let mut line = Vec::new();
        assert_eq!(echo(&mut line, b"ls"), b"ls");
        assert_eq!(
            echo(&mut line, b"\x7f\x7fpwd\r"),
            b"\x08 \x08\x08 \x08pwd\r\nyou typed: pwd\r\n$ "
        );
        assert!(line.is_empty());
    }
}
