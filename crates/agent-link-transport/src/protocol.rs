//! Frame protocol for terminal sessions.
//!
//! One channel carries both kinds of traffic: binary frames are raw
//! terminal bytes, text frames are JSON control messages.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Terminal size in character cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimensions {
    pub cols: u16,
    pub rows: u16,
}

impl Dimensions {
    #[must_use]
    pub const fn new(cols: u16, rows: u16) -> Self {
        Self { cols, rows }
    }
}

/// Control message sent as a text frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlMessage {
    /// The local surface changed size.
    Resize { cols: u16, rows: u16 },
}

impl From<Dimensions> for ControlMessage {
    fn from(d: Dimensions) -> Self {
        Self::Resize {
            cols: d.cols,
            rows: d.rows,
        }
    }
}

/// One frame on the session channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Bytes),
    /// Close handshake, with an optional reason.
    Close(Option<String>),
}

impl Frame {
    /// The zero-length binary frame announcing a new session.
    #[must_use]
    pub const fn init() -> Self {
        Self::Binary(Bytes::new())
    }

    /// Raw terminal input, sent unmodified.
    #[must_use]
    pub fn input(data: &[u8]) -> Self {
        Self::Binary(Bytes::copy_from_slice(data))
    }

    /// Encode a control message as a text frame.
    ///
    /// # Errors
    /// Returns an error if the message cannot be serialized.
    pub fn control(msg: &ControlMessage) -> Result<Self, serde_json::Error> {
        serde_json::to_string(msg).map(Self::Text)
    }

    /// Parse a text frame as a control message.
    #[must_use]
    pub fn as_control(&self) -> Option<ControlMessage> {
        match self {
            Self::Text(text) => serde_json::from_str(text).ok(),
            _ => None,
        }
    }

    /// Bytes to write to the terminal for an inbound frame.
    ///
    /// Text and binary frames decode to the same byte sequence; close
    /// frames carry none.
    #[must_use]
    pub fn payload(&self) -> Option<Bytes> {
        match self {
            Self::Text(text) => Some(Bytes::copy_from_slice(text.as_bytes())),
            Self::Binary(data) => Some(data.clone()),
            Self::Close(_) => None,
        }
    }

    #[must_use]
    pub const fn is_close(&self) -> bool {
        matches!(self, Self::Close(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resize_wire_shape() {
        let frame = Frame::control(&Dimensions::new(120, 40).into()).unwrap();
        let Frame::Text(text) = &frame else {
            panic!("resize must be a text frame");
        };
        let value: serde_json::Value = serde_json::from_str(text).unwrap();
        assert_eq!(value, serde_json::json!({"type": "resize", "cols": 120, "rows": 40}));
        assert_eq!(
            frame.as_control(),
            Some(ControlMessage::Resize { cols: 120, rows: 40 })
        );
    }

    #[test]
    fn test_text_and_binary_decode_alike() {
        let text = Frame::Text("héllo\r\n".into());
        let binary = Frame::input("héllo\r\n".as_bytes());
        assert_eq!(text.payload(), binary.payload());
        assert_eq!(Frame::Close(None).payload(), None);
    }

    #[test]
    fn test_init_is_empty_binary() {
        assert_eq!(Frame::init(), Frame::Binary(Bytes::new()));
        assert!(Frame::init().as_control().is_none());
    }
}
