use crate::emote::format_remaining;
use crate::KitsPlugin;
use std::time::Duration;
use tracing::{info, warn};
use warden_event_system::clock::{add_duration, duration_between};
use warden_event_system::{
    CommandError, FeedChannel, HandlerError, RewardDefinition, ServerId,
};

/// What became of one claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// Delivered and cooldown recorded
    Granted,
    /// Player is not on the reward's allow-list
    Unauthorized,
    /// Claimed again too early
    OnCooldown { remaining: Duration },
    /// The delivery command failed; the cooldown was put back
    DeliveryFailed(CommandError),
}

impl KitsPlugin {
    /// Runs one claim of `reward` by `player`.
    ///
    /// Storage failures abort the claim without a grant and are returned.
    pub async fn claim(
        &self,
        server: &ServerId,
        player: &str,
        reward: &RewardDefinition,
    ) -> Result<ClaimOutcome, HandlerError> {
        if let Some(list) = &reward.authorization_list {
            if !self.storage.is_authorized(server, list, player).await? {
                info!(server = %server, "🚫 {} is not on list '{}' for {}", player, list, reward.key);
                self.tell(
                    server,
                    player,
                    &format!("You are not authorized to claim {}.", reward.display_name),
                )
                .await;
                return Ok(ClaimOutcome::Unauthorized);
            }
        }

        let _slot = self.claim_slot(server, &reward.key, player).await;

        let now = self.clock.now();
        let previous = self.storage.cooldown(server, &reward.key, player).await?;
        if let Some(last) = previous {
            let ready_at = add_duration(last, reward.cooldown);
            if now < ready_at {
                return Ok(self
                    .reject_cooldown(server, player, reward, duration_between(now, ready_at))
                    .await);
            }
        }

        let reserved = self
            .storage
            .compare_and_set_cooldown(server, &reward.key, player, previous, Some(now))
            .await?;
        if !reserved {
            // Someone outside this process claimed in between.
            let remaining = match self.storage.cooldown(server, &reward.key, player).await? {
                Some(last) => duration_between(now, add_duration(last, reward.cooldown)),
                None => reward.cooldown,
            };
            return Ok(self.reject_cooldown(server, player, reward, remaining).await);
        }

        if let Err(e) = self
            .commands
            .send_command(server, &reward.delivery_command(player))
            .await
        {
            warn!(server = %server, "❌ Delivering {} to {} failed: {}", reward.key, player, e);
            match self
                .storage
                .compare_and_set_cooldown(server, &reward.key, player, Some(now), previous)
                .await
            {
                Ok(true) => {}
                Ok(false) => warn!(
                    server = %server,
                    "⚠️ Cooldown of {} for {} changed during delivery, leaving it", reward.key, player
                ),
                Err(revert) => warn!(
                    server = %server,
                    "⚠️ Could not release cooldown of {} for {}: {}", reward.key, player, revert
                ),
            }
            return Ok(ClaimOutcome::DeliveryFailed(e));
        }

        info!(server = %server, "🎁 {} received {}", player, reward.display_name);
        self.tell(server, player, &format!("{} delivered, enjoy!", reward.display_name))
            .await;
        if let Err(e) = self
            .notifier
            .notify_channel(
                server,
                FeedChannel::Rewards,
                &format!("{} claimed {} ({})", player, reward.display_name, reward.key),
            )
            .await
        {
            warn!(server = %server, "⚠️ Reward feed post failed: {}", e);
        }
        Ok(ClaimOutcome::Granted)
    }

    async fn reject_cooldown(
        &self,
        server: &ServerId,
        player: &str,
        reward: &RewardDefinition,
        remaining: Duration,
    ) -> ClaimOutcome {
        let remaining_text = format_remaining(remaining);
        info!(server = %server, "⏳ {} must wait {} for {}", player, remaining_text, reward.key);
        self.tell(
            server,
            player,
            &format!(
                "{} is on cooldown, {} remaining.",
                reward.display_name, remaining_text
            ),
        )
        .await;
        ClaimOutcome::OnCooldown { remaining }
    }

    /// In-game message; a failure only costs the player the message.
    async fn tell(&self, server: &ServerId, player: &str, message: &str) {
        if let Err(e) = self.notifier.notify_player(server, player, message).await {
            warn!(server = %server, "⚠️ Could not message {}: {}", player, e);
        }
    }
}
