//! WebSocket connector.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt, future};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        Error as WsError, Message,
        protocol::{CloseFrame, frame::coding::CloseCode},
    },
};
use url::Url;

use crate::{
    connector::{Connector, Duplex, TransportError},
    protocol::Frame,
};

/// Connects sessions over WebSocket (`ws://` or `wss://`).
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

impl WsConnector {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, uri: &Url) -> Result<Duplex, TransportError> {
        let (socket, _response) = connect_async(uri.as_str())
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        tracing::debug!(host = ?uri.host_str(), "WebSocket connected");

        let (sink, stream) = socket.split();
        let sink = sink
            .sink_map_err(|e| TransportError::Io(e.to_string()))
            .with(|frame: Frame| future::ready(Ok::<_, TransportError>(to_message(frame))));
        let stream = stream.filter_map(|msg| future::ready(from_message(msg)));

        Ok(Duplex {
            sink: Box::pin(sink),
            stream: Box::pin(stream),
        })
    }
}

fn to_message(frame: Frame) -> Message {
    match frame {
        Frame::Text(text) => Message::Text(text),
        Frame::Binary(data) => Message::Binary(data.to_vec()),
        Frame::Close(reason) => Message::Close(Some(CloseFrame {
            code: CloseCode::Normal,
            reason: reason.unwrap_or_default().into(),
        })),
    }
}

/// Ping, pong and raw frames are handled by tungstenite and skipped here.
fn from_message(msg: Result<Message, WsError>) -> Option<Result<Frame, TransportError>> {
    match msg {
        Ok(Message::Text(text)) => Some(Ok(Frame::Text(text))),
        Ok(Message::Binary(data)) => Some(Ok(Frame::Binary(data.into()))),
        Ok(Message::Close(frame)) => Some(Ok(Frame::Close(
            frame
                .map(|f| f.reason.into_owned())
                .filter(|reason| !reason.is_empty()),
        ))),
        Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => None,
        Err(WsError::ConnectionClosed) => None,
        Err(e) => Some(Err(TransportError::Io(e.to_string()))),
    }
}
