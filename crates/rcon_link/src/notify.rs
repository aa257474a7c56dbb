//! Notification sink that talks to players in game over the control channel.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;
use warden_event_system::{
    CommandSender, FeedChannel, FeedPublisher, NotificationSink, NotifyError, ServerId,
};

/// Default in-game message command.
pub const DEFAULT_PLAYER_TEMPLATE: &str = "say {player}: {message}";

/// Sends player notifications as console commands and posts channel
/// notifications to a [`FeedPublisher`].
#[derive(Clone)]
pub struct RconNotifier {
    commands: Arc<dyn CommandSender>,
    feed: FeedPublisher,
    player_template: String,
}

impl RconNotifier {
    pub fn new(commands: Arc<dyn CommandSender>, feed: FeedPublisher) -> Self {
        Self {
            commands,
            feed,
            player_template: DEFAULT_PLAYER_TEMPLATE.to_string(),
        }
    }

    /// Overrides the message command; `{player}` and `{message}` are substituted.
    pub fn with_player_template(mut self, template: impl Into<String>) -> Self {
        self.player_template = template.into();
        self
    }

    pub fn feed(&self) -> &FeedPublisher {
        &self.feed
    }

    fn render(&self, player: &str, message: &str) -> String {
        self.player_template
            .replace("{player}", player)
            .replace("{message}", message)
    }
}

impl std::fmt::Debug for RconNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RconNotifier")
            .field("player_template", &self.player_template)
            .finish()
    }
}

#[async_trait]
impl NotificationSink for RconNotifier {
    async fn notify_player(
        &self,
        server: &ServerId,
        player: &str,
        message: &str,
    ) -> Result<(), NotifyError> {
        let command = self.render(player, message);
        debug!(server = %server, player, "💬 {}", message);
        self.commands.send_command(server, &command).await?;
        Ok(())
    }

    async fn notify_channel(
        &self,
        server: &ServerId,
        channel: FeedChannel,
        message: &str,
    ) -> Result<(), NotifyError> {
        self.feed.publish(server, channel, message);
        Ok(())
    }
}
