//! Outbound contracts: commands sent to a server and notifications posted to
//! players or feed channels.

use crate::types::{FeedChannel, ServerId};
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::info;

/// Why a command round-trip failed. Returned to the caller, never retried by
/// the connection layer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("No response within {0:?}")]
    Timeout(Duration),
    #[error("Server {0} is not configured")]
    ServerUnknown(ServerId),
    #[error("Server {0} is not connected")]
    ServerUnreachable(ServerId),
    #[error("Connection dropped before a response arrived")]
    Disconnected,
    #[error("Transport error: {0}")]
    Transport(String),
}

/// Sends console commands to a server and returns the response text.
#[async_trait]
pub trait CommandSender: Send + Sync {
    async fn send_command(&self, server: &ServerId, command: &str) -> Result<String, CommandError>;
}

/// Failure to deliver a notification.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("In-game message failed: {0}")]
    Command(#[from] CommandError),
}

/// Where the subsystems post human-readable messages.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Message shown to one player in game.
    async fn notify_player(
        &self,
        server: &ServerId,
        player: &str,
        message: &str,
    ) -> Result<(), NotifyError>;

    /// Message posted to an external feed channel.
    async fn notify_channel(
        &self,
        server: &ServerId,
        channel: FeedChannel,
        message: &str,
    ) -> Result<(), NotifyError>;
}

/// One message posted to a feed channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedMessage {
    pub server: ServerId,
    pub channel: FeedChannel,
    pub message: String,
}

/// Feed channel publisher.
///
/// Each message is logged on the `warden::feed` target, where a log shipper
/// can pick it up, and republished to in-process subscribers.
#[derive(Debug, Clone)]
pub struct FeedPublisher {
    sender: broadcast::Sender<FeedMessage>,
}

impl FeedPublisher {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FeedMessage> {
        self.sender.subscribe()
    }

    pub fn publish(&self, server: &ServerId, channel: FeedChannel, message: &str) {
        info!(
            target: "warden::feed",
            server = %server,
            channel = %channel,
            "{}", message
        );
        // No subscribers is fine; the log line above is the durable record.
        let _ = self.sender.send(FeedMessage {
            server: server.clone(),
            channel,
            message: message.to_string(),
        });
    }
}

impl Default for FeedPublisher {
    fn default() -> Self {
        Self::new(256)
    }
}
