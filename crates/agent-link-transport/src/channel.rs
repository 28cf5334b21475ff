//! In-memory connector.
//!
//! Pairs a session with an [`AgentEnd`] in the same process. Used by the
//! tests and by embedders that bridge frames themselves.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use futures::{SinkExt, StreamExt, channel::mpsc as frames};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use url::Url;

use crate::{
    connector::{Connector, Duplex, TransportError},
    protocol::Frame,
};

struct ClientHalves {
    to_agent: frames::UnboundedSender<Frame>,
    from_agent: mpsc::UnboundedReceiver<Result<Frame, TransportError>>,
}

type SharedUri = Arc<Mutex<Option<Url>>>;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Connector backed by in-process channels. Connects at most once.
pub struct ChannelConnector {
    halves: Mutex<Option<ClientHalves>>,
    refusal: Option<String>,
    uri: SharedUri,
}

impl ChannelConnector {
    /// Create a connector and the agent side it will connect to.
    #[must_use]
    pub fn pair() -> (Self, AgentEnd) {
        let (to_agent, inbound) = frames::unbounded();
        let (outbound, from_agent) = mpsc::unbounded_channel();
        let uri = SharedUri::default();

        let connector = Self {
            halves: Mutex::new(Some(ClientHalves {
                to_agent,
                from_agent,
            })),
            refusal: None,
            uri: Arc::clone(&uri),
        };
        let agent = AgentEnd {
            inbound,
            outbound,
            uri,
        };
        (connector, agent)
    }

    /// A connector whose every connect fails with `reason`.
    #[must_use]
    pub fn refusing(reason: impl Into<String>) -> Self {
        Self {
            halves: Mutex::new(None),
            refusal: Some(reason.into()),
            uri: SharedUri::default(),
        }
    }
}

#[async_trait]
impl Connector for ChannelConnector {
    async fn connect(&self, uri: &Url) -> Result<Duplex, TransportError> {
        if let Some(reason) = &self.refusal {
            return Err(TransportError::Connect(reason.clone()));
        }
        let halves = lock(&self.halves)
            .take()
            .ok_or_else(|| TransportError::Connect("channel already connected".into()))?;
        *lock(&self.uri) = Some(uri.clone());

        Ok(Duplex {
            sink: Box::pin(halves.to_agent.sink_map_err(|_| TransportError::Closed)),
            stream: Box::pin(UnboundedReceiverStream::new(halves.from_agent)),
        })
    }
}

/// Agent side of a [`ChannelConnector`].
///
/// Dropping it looks like the agent hanging up without a close frame.
pub struct AgentEnd {
    inbound: frames::UnboundedReceiver<Frame>,
    outbound: mpsc::UnboundedSender<Result<Frame, TransportError>>,
    uri: SharedUri,
}

impl AgentEnd {
    /// Next frame sent by the session, or `None` once it hung up.
    pub async fn recv(&mut self) -> Option<Frame> {
        self.inbound.next().await
    }

    /// Collect frames until a close frame (included) or hang-up.
    pub async fn recv_until_close(&mut self) -> Vec<Frame> {
        let mut received = Vec::new();
        while let Some(frame) = self.recv().await {
            let done = frame.is_close();
            received.push(frame);
            if done {
                break;
            }
        }
        received
    }

    /// URI the session connected with, once connected.
    #[must_use]
    pub fn connected_uri(&self) -> Option<Url> {
        lock(&self.uri).clone()
    }

    /// Send a frame to the session. Returns `false` if it is gone.
    pub fn send(&self, frame: Frame) -> bool {
        self.outbound.send(Ok(frame)).is_ok()
    }

    pub fn send_text(&self, text: impl Into<String>) -> bool {
        self.send(Frame::Text(text.into()))
    }

    pub fn send_binary(&self, data: &[u8]) -> bool {
        self.send(Frame::input(data))
    }

    /// Start the close handshake from the agent side.
    pub fn close(&self, reason: Option<&str>) -> bool {
        self.send(Frame::Close(reason.map(str::to_string)))
    }

    /// Break the channel with a transport error.
    pub fn fail(&self, message: impl Into<String>) -> bool {
        self.outbound
            .send(Err(TransportError::Io(message.into())))
            .is_ok()
    }
}
