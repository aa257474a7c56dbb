//! Typed inbound events and the handler contract subsystems implement.
//!
//! Every event is ephemeral: it is built from one console line, fanned out to
//! the registered handlers of its server and then dropped.

use crate::notify::CommandError;
use crate::storage::StorageError;
use crate::types::{ChatChannel, ServerId};
use async_trait::async_trait;
use std::fmt;

/// A domain event decoded from a remote server's console stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    /// A player said something in chat
    ChatLine {
        speaker: String,
        text: String,
        channel: ChatChannel,
    },
    /// A player finished connecting
    PlayerJoined { name: String },
    /// A player disconnected
    PlayerLeft { name: String },
    /// Kill feed entry
    Kill { killer: String, victim: String },
}

impl InboundEvent {
    /// Short name of the variant, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            InboundEvent::ChatLine { .. } => "chat",
            InboundEvent::PlayerJoined { .. } => "join",
            InboundEvent::PlayerLeft { .. } => "leave",
            InboundEvent::Kill { .. } => "kill",
        }
    }
}

impl fmt::Display for InboundEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InboundEvent::ChatLine {
                speaker,
                text,
                channel,
            } => write!(f, "[{channel}] {speaker}: {text}"),
            InboundEvent::PlayerJoined { name } => write!(f, "{name} joined"),
            InboundEvent::PlayerLeft { name } => write!(f, "{name} left"),
            InboundEvent::Kill { killer, victim } => write!(f, "{killer} killed {victim}"),
        }
    }
}

/// A subsystem that consumes the events of one or more servers.
///
/// The dispatcher gives every handler its own queue and worker task, so a
/// handler may await storage or commands freely without delaying other
/// handlers. Events of one server reach a handler in wire order.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Name used when logging handler failures.
    fn name(&self) -> &str;

    /// Processes one event from `server`.
    async fn handle(&self, server: &ServerId, event: &InboundEvent) -> Result<(), HandlerError>;
}

/// Failure while a handler processed an event. Logged by the dispatcher,
/// never fatal to the worker.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Command error: {0}")]
    Command(#[from] CommandError),
}
