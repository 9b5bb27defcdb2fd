//! zl-protocol: Value types exchanged with the zli shell transport
//!
//! The remote shell protocol itself lives in an external library. This crate
//! only defines what crosses the seam between that transport and the local
//! session controller: lifecycle events, output/input frames and terminal
//! dimensions.

pub mod error;
pub mod message;
pub mod session;

pub use error::ProtocolError;
pub use message::{InboundFrame, OutboundFrame, ShellEvent, TerminalSize};
pub use session::ConnectionId;
