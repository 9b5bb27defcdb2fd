//! Frames exchanged with the shell transport
//!
//! Frames are JSON objects tagged by `type`. Terminal data travels as base64
//! in both directions so arbitrary bytes survive the JSON encoding.
//!
//! # Frame Flow
//!
//! 1. Client sends `open` with the connection id
//! 2. Transport answers with lifecycle `event` frames (`Start` first)
//! 3. Terminal I/O: `input` / `resize` outbound, `output` inbound
//! 4. Session end: a terminal `event` (`Unattached`, `Disconnect`, `Delete`)
//!    or an `error` frame

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;
use crate::session::ConnectionId;

/// Terminal dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalSize {
    /// Number of rows
    pub rows: u16,
    /// Number of columns
    #[serde(rename = "columns")]
    pub cols: u16,
}

impl TerminalSize {
    /// Create a new terminal size
    pub fn new(rows: u16, cols: u16) -> Self {
        Self { rows, cols }
    }

    /// Default terminal size (24x80)
    pub fn default_size() -> Self {
        Self { rows: 24, cols: 80 }
    }
}

impl Default for TerminalSize {
    fn default() -> Self {
        Self::default_size()
    }
}

/// Lifecycle events reported by the transport for a shell connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShellEvent {
    /// Remote shell is ready for input
    Start,
    /// Another client took over this connection
    Unattached,
    /// Target went away
    Disconnect,
    /// Connection was closed/deleted on the service side
    Delete,
    /// Transport socket broke; a reconnect is in progress
    #[serde(alias = "BrokenWebsocket")]
    BrokenSocket,
}

/// Frames flowing from the transport to the session controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundFrame {
    /// Lifecycle transition
    Event { event: ShellEvent },
    /// Base64 encoded terminal output
    Output { data: String },
    /// Transport level failure; ends the session
    Error { message: String },
}

impl InboundFrame {
    /// Build an output frame from raw bytes
    pub fn output(data: &[u8]) -> Self {
        InboundFrame::Output {
            data: STANDARD.encode(data),
        }
    }

    /// Parse a single JSON line
    pub fn from_json(line: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(line.trim())?)
    }
}

/// Decode a base64 output payload
pub fn decode_output(data: &str) -> Result<Bytes, ProtocolError> {
    Ok(Bytes::from(STANDARD.decode(data)?))
}

/// Frames flowing from the session controller to the transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundFrame {
    /// Open (or re-attach to) a connection
    Open {
        #[serde(rename = "connectionId")]
        connection_id: ConnectionId,
    },
    /// Base64 encoded keyboard input
    Input { data: String },
    /// Terminal resize
    Resize {
        #[serde(flatten)]
        size: TerminalSize,
    },
    /// Client is going away; the remote connection stays open
    Close,
}

impl OutboundFrame {
    /// Build an input frame from raw bytes
    pub fn input(data: &[u8]) -> Self {
        OutboundFrame::Input {
            data: STANDARD.encode(data),
        }
    }

    /// Serialize as one JSON line, without the line terminator
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}
