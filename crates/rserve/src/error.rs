use std::time::Duration;

use thiserror::Error;

/// Errors raised while configuring, connecting to, or evaluating on Rserve.
#[derive(Debug, Error)]
pub enum RserveError {
    /// Bad address or a non-local host. Fatal at startup.
    #[error("config error: {0}")]
    Config(String),

    #[error("rserve I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("handshake failed: {0}")]
    Handshake(String),

    /// The daemon rejected or failed the command.
    #[error("r eval err: {description} (status {status:#04x})")]
    Command { status: u8, description: String },

    /// Framing the client could not follow; the stream is out of sync.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A well-framed response whose content could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    #[error("evaluation timed out after {0:?}")]
    Timeout(Duration),
}

impl RserveError {
    /// Whether the connection can no longer be trusted to be in sync.
    pub fn breaks_connection(&self) -> bool {
        matches!(
            self,
            Self::Io(_) | Self::Protocol(_) | Self::Timeout(_) | Self::Handshake(_)
        )
    }
}
