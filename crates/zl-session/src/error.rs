//! Session errors

use thiserror::Error;

/// Why a session ended unsuccessfully
///
/// Cloneable so every observer of the session's completion sees the same
/// error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The target went away
    #[error("Target Disconnected.")]
    TargetDisconnected,

    /// The connection was closed on the service side
    #[error("Connection was closed.")]
    ConnectionClosed,

    /// The user interrupted a session that was not running yet
    #[error("Terminal killed")]
    Killed,

    /// The transport could not be opened
    #[error("Failed to open connection {connection_id}: {reason}")]
    Open {
        connection_id: String,
        reason: String,
    },

    /// The transport failed or ended unexpectedly
    #[error("Transport error: {0}")]
    Transport(String),

    /// `start` was called twice
    #[error("Session was already started")]
    AlreadyStarted,
}
