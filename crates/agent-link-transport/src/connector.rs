//! The seam between sessions and the byte channel underneath them.

use std::pin::Pin;

use async_trait::async_trait;
use futures::{Sink, Stream};
use thiserror::Error;
use url::Url;

use crate::protocol::Frame;

/// Transport error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("connect failed: {0}")]
    Connect(String),

    #[error("channel closed")]
    Closed,

    #[error("transport error: {0}")]
    Io(String),
}

/// Outbound half of a connected channel.
pub type FrameSink = Pin<Box<dyn Sink<Frame, Error = TransportError> + Send>>;

/// Inbound half of a connected channel.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Frame, TransportError>> + Send>>;

/// A connected, framed duplex channel.
pub struct Duplex {
    pub sink: FrameSink,
    pub stream: FrameStream,
}

/// Opens framed channels to a session URI.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connect to `uri`.
    ///
    /// # Errors
    /// Returns [`TransportError::Connect`] if the channel cannot be opened.
    async fn connect(&self, uri: &Url) -> Result<Duplex, TransportError>;
}
