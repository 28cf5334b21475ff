//! Interactive terminal sessions to device agents.
//!
//! Provides:
//! - Frame protocol (raw binary input, JSON control frames)
//! - `AgentSession` - one terminal session and its lifecycle
//! - Connectors: WebSocket (feature: websocket) and in-memory channels
//! - Terminal surfaces with scroll-back and live fan-out
//! - Crossterm bridge (feature: tui)

pub mod channel;
pub mod connector;
pub mod protocol;
pub mod session;
pub mod surface;

#[cfg(feature = "websocket")]
pub mod websocket;

#[cfg(feature = "tui")]
pub mod tui;

pub use channel::{AgentEnd, ChannelConnector};
pub use connector::{Connector, Duplex, TransportError};
pub use protocol::{ControlMessage, Dimensions, Frame};
pub use session::{
    AgentSession, CloseReason, SessionError, SessionId, SessionOptions, TransportState,
    session_uri,
};
pub use surface::{ScreenBuffer, TerminalSurface};
#[cfg(feature = "websocket")]
pub use websocket::WsConnector;
