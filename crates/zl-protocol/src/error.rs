//! Protocol error types

use thiserror::Error;

/// Errors that can occur while decoding transport frames
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Frame was not valid JSON or did not match any known frame
    #[error("Invalid frame: {0}")]
    InvalidFrame(#[from] serde_json::Error),

    /// Output payload was not valid base64
    #[error("Invalid payload encoding: {0}")]
    InvalidPayload(#[from] base64::DecodeError),
}
