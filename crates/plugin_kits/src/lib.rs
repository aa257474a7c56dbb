//! # Kits Plugin
//!
//! Reward claims through chat emotes. A player types `:FREEkit1:` in any chat
//! scope; if `FREEkit1` is a reward on that server, the claim is checked
//! against the reward's allow-list and cooldown and, when it passes, the
//! delivery command is sent back over the control channel.
//!
//! ## Claim flow
//!
//! 1. Resolve the first emote token that names a reward; nothing resolves → ignore
//! 2. Allow-listed reward and the player is not on the list → "not authorized", stop
//! 3. Last claim younger than the cooldown → reply with the remaining time, stop
//! 4. Reserve the cooldown (compare-and-set), deliver, notify player and feed
//!
//! Claims on one (server, reward, player) key are serialized by an in-process
//! lock, and the reservation is a compare-and-set against the value read in
//! step 3, so of any number of concurrent claims at most one is granted. A
//! failed delivery puts the previous cooldown back.
//!
//! Reward definitions are read from storage on every claim and never cached.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;
use warden_event_system::{
    Clock, CommandSender, EventHandler, HandlerError, InboundEvent, NotificationSink, ServerId,
    Storage,
};

mod claims;
pub mod emote;


pub use claims::ClaimOutcome;
pub use emote::{emote_tokens, format_remaining};

type ClaimKey = (ServerId, String, String);

/// Handler turning chat emotes into reward claims.
pub struct KitsPlugin {
    name: String,
    storage: Arc<dyn Storage>,
    commands: Arc<dyn CommandSender>,
    notifier: Arc<dyn NotificationSink>,
    clock: Arc<dyn Clock>,
    /// Per-key claim locks, serializing claims of one player on one reward
    claim_locks: DashMap<ClaimKey, Arc<Mutex<()>>>,
}

impl KitsPlugin {
    pub fn new(
        storage: Arc<dyn Storage>,
        commands: Arc<dyn CommandSender>,
        notifier: Arc<dyn NotificationSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        debug!("🎁 KitsPlugin: Creating new instance");
        Self {
            name: "kits".to_string(),
            storage,
            commands,
            notifier,
            clock,
            claim_locks: DashMap::new(),
        }
    }

    /// Takes the claim lock of one key. The entry is evicted again when the
    /// last holder drops its slot.
    async fn claim_slot(&self, server: &ServerId, reward: &str, player: &str) -> ClaimSlot<'_> {
        let key = (server.clone(), reward.to_string(), player.to_string());
        let lock = self.claim_locks.entry(key.clone()).or_default().clone();
        ClaimSlot {
            guard: Some(lock.lock_owned().await),
            locks: &self.claim_locks,
            key,
        }
    }
}

/// Held for the duration of one claim.
struct ClaimSlot<'a> {
    guard: Option<OwnedMutexGuard<()>>,
    locks: &'a DashMap<ClaimKey, Arc<Mutex<()>>>,
    key: ClaimKey,
}

impl Drop for ClaimSlot<'_> {
    fn drop(&mut self) {
        // Release our reference first so an uncontended entry counts one.
        drop(self.guard.take());
        self.locks
            .remove_if(&self.key, |_, lock| Arc::strong_count(lock) == 1);
    }
}

impl std::fmt::Debug for KitsPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KitsPlugin")
            .field("name", &self.name)
            .field("clock", &self.clock)
            .field("claim_locks", &self.claim_locks.len())
            .finish()
    }
}

#[async_trait]
impl EventHandler for KitsPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, server: &ServerId, event: &InboundEvent) -> Result<(), HandlerError> {
        let InboundEvent::ChatLine {
            speaker,
            text,
            channel,
        } = event
        else {
            return Ok(());
        };

        for token in emote_tokens(text) {
            let Some(reward) = self.storage.reward_definition(server, token).await? else {
                continue;
            };
            debug!(server = %server, %channel, "🎁 {} claims {}", speaker, reward.key);
            self.claim(server, speaker, &reward).await?;
            return Ok(());
        }
        Ok(())
    }
}
