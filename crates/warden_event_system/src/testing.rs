//! Recording doubles for the outbound contracts and a storage wrapper with
//! switchable failures. Enabled with the `testing` feature.

use crate::notify::{CommandError, CommandSender, FeedMessage, NotificationSink, NotifyError};
use crate::storage::{MemoryStorage, Storage, StorageError};
use crate::types::{FeedChannel, RewardDefinition, ServerId, Zone, ZoneId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// [`CommandSender`] that records every command it is asked to send.
#[derive(Debug, Default)]
pub struct RecordingCommands {
    sent: Mutex<Vec<(ServerId, String)>>,
    failure: Mutex<Option<CommandError>>,
    responses: Mutex<Vec<(String, String)>>,
}

impl RecordingCommands {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following command fail with `error`, or succeed with `None`.
    pub fn fail_with(&self, error: Option<CommandError>) {
        *lock(&self.failure) = error;
    }

    /// Answers commands starting with `prefix` with `response`.
    pub fn respond_to(&self, prefix: &str, response: &str) {
        lock(&self.responses).push((prefix.to_string(), response.to_string()));
    }

    /// Every command attempted so far, including failed ones.
    pub fn sent(&self) -> Vec<(ServerId, String)> {
        lock(&self.sent).clone()
    }

    pub fn commands(&self) -> Vec<String> {
        lock(&self.sent)
            .iter()
            .map(|(_, command)| command.clone())
            .collect()
    }

    pub fn count_matching(&self, prefix: &str) -> usize {
        lock(&self.sent)
            .iter()
            .filter(|(_, command)| command.starts_with(prefix))
            .count()
    }
}

#[async_trait]
impl CommandSender for RecordingCommands {
    async fn send_command(&self, server: &ServerId, command: &str) -> Result<String, CommandError> {
        lock(&self.sent).push((server.clone(), command.to_string()));
        if let Some(error) = lock(&self.failure).clone() {
            return Err(error);
        }
        let response = lock(&self.responses)
            .iter()
            .find(|(prefix, _)| command.starts_with(prefix.as_str()))
            .map(|(_, response)| response.clone())
            .unwrap_or_default();
        Ok(response)
    }
}

/// [`NotificationSink`] that records player and channel messages.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    players: Mutex<Vec<(ServerId, String, String)>>,
    channels: Mutex<Vec<FeedMessage>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages sent to `player`, oldest first.
    pub fn player_messages(&self, player: &str) -> Vec<String> {
        lock(&self.players)
            .iter()
            .filter(|(_, name, _)| name == player)
            .map(|(_, _, message)| message.clone())
            .collect()
    }

    /// Messages posted to `channel`, oldest first.
    pub fn channel_messages(&self, channel: FeedChannel) -> Vec<String> {
        lock(&self.channels)
            .iter()
            .filter(|posted| posted.channel == channel)
            .map(|posted| posted.message.clone())
            .collect()
    }
}

#[async_trait]
impl NotificationSink for RecordingNotifier {
    async fn notify_player(
        &self,
        server: &ServerId,
        player: &str,
        message: &str,
    ) -> Result<(), NotifyError> {
        lock(&self.players).push((server.clone(), player.to_string(), message.to_string()));
        Ok(())
    }

    async fn notify_channel(
        &self,
        server: &ServerId,
        channel: FeedChannel,
        message: &str,
    ) -> Result<(), NotifyError> {
        lock(&self.channels).push(FeedMessage {
            server: server.clone(),
            channel,
            message: message.to_string(),
        });
        Ok(())
    }
}

/// [`MemoryStorage`] whose reads or writes can be made to fail on demand.
#[derive(Debug, Default)]
pub struct FaultyStorage {
    inner: MemoryStorage,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl FaultyStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn memory(&self) -> &MemoryStorage {
        &self.inner
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check(flag: &AtomicBool) -> Result<(), StorageError> {
        if flag.load(Ordering::SeqCst) {
            return Err(StorageError::Backend("injected failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Storage for FaultyStorage {
    async fn reward_definition(
        &self,
        server: &ServerId,
        key: &str,
    ) -> Result<Option<RewardDefinition>, StorageError> {
        Self::check(&self.fail_reads)?;
        self.inner.reward_definition(server, key).await
    }

    async fn is_authorized(
        &self,
        server: &ServerId,
        list: &str,
        player: &str,
    ) -> Result<bool, StorageError> {
        Self::check(&self.fail_reads)?;
        self.inner.is_authorized(server, list, player).await
    }

    async fn cooldown(
        &self,
        server: &ServerId,
        reward: &str,
        player: &str,
    ) -> Result<Option<DateTime<Utc>>, StorageError> {
        Self::check(&self.fail_reads)?;
        self.inner.cooldown(server, reward, player).await
    }

    async fn compare_and_set_cooldown(
        &self,
        server: &ServerId,
        reward: &str,
        player: &str,
        expected: Option<DateTime<Utc>>,
        new: Option<DateTime<Utc>>,
    ) -> Result<bool, StorageError> {
        Self::check(&self.fail_writes)?;
        self.inner
            .compare_and_set_cooldown(server, reward, player, expected, new)
            .await
    }

    async fn list_active_zones(&self, server: &ServerId) -> Result<Vec<Zone>, StorageError> {
        Self::check(&self.fail_reads)?;
        self.inner.list_active_zones(server).await
    }

    async fn upsert_zone(&self, zone: &Zone) -> Result<(), StorageError> {
        Self::check(&self.fail_writes)?;
        self.inner.upsert_zone(zone).await
    }

    async fn delete_zone(&self, zone_id: &ZoneId) -> Result<(), StorageError> {
        Self::check(&self.fail_writes)?;
        self.inner.delete_zone(zone_id).await
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
