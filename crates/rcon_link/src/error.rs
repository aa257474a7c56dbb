//! Error types for control-channel links.
//!
//! Connection-level failures are [`LinkError`]s and are retried by the
//! supervisor. Failures of a single command are
//! [`CommandError`](warden_event_system::CommandError)s handed back to the caller.

use tokio_tungstenite::tungstenite;
use warden_event_system::CommandError;

/// Why a link could not be established or was lost.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// Network or WebSocket failure; retried
    #[error("Transport error: {0}")]
    Transport(String),

    /// The server refused the RCON password; retried but logged distinctly
    #[error("Authentication rejected (HTTP {0})")]
    AuthRejected(u16),

    /// The peer sent something that is not a WebRCON envelope
    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl LinkError {
    /// Classifies a handshake failure, picking out explicit auth rejections.
    pub(crate) fn from_handshake(error: tungstenite::Error) -> Self {
        match error {
            tungstenite::Error::Http(response)
                if matches!(response.status().as_u16(), 401 | 403) =>
            {
                LinkError::AuthRejected(response.status().as_u16())
            }
            other => LinkError::Transport(other.to_string()),
        }
    }
}

impl From<tungstenite::Error> for LinkError {
    fn from(error: tungstenite::Error) -> Self {
        LinkError::Transport(error.to_string())
    }
}

impl From<LinkError> for CommandError {
    fn from(error: LinkError) -> Self {
        CommandError::Transport(error.to_string())
    }
}
