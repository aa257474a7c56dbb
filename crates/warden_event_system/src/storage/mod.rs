//! Durable state contract.
//!
//! The subsystems only ever talk to storage through [`Storage`]. Two backends
//! ship with the crate: [`MemoryStorage`] for tests and ephemeral runs, and
//! [`JsonFileStorage`], which snapshots the memory tables to a JSON file after
//! every mutation.

mod file;
mod memory;

pub use file::JsonFileStorage;
pub use memory::{MemoryStorage, StorageSnapshot, StoredReward};

use crate::types::{RewardDefinition, ServerId, Zone, ZoneId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Narrow query interface over the durable store.
///
/// Reward definitions are read on every dispatch and never cached by callers.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Reward claimed by the emote `key` on `server`, if any.
    async fn reward_definition(
        &self,
        server: &ServerId,
        key: &str,
    ) -> Result<Option<RewardDefinition>, StorageError>;

    /// Whether `player` is on allow-list `list` of `server`.
    async fn is_authorized(
        &self,
        server: &ServerId,
        list: &str,
        player: &str,
    ) -> Result<bool, StorageError>;

    /// Last successful claim of `reward` by `player` on `server`.
    async fn cooldown(
        &self,
        server: &ServerId,
        reward: &str,
        player: &str,
    ) -> Result<Option<DateTime<Utc>>, StorageError>;

    /// Atomically replaces the last-claim timestamp when it still equals
    /// `expected`. `None` stands for "no record": `expected = None` requires
    /// the record to be absent and `new = None` removes it.
    ///
    /// Returns `false` without writing when the stored value differs.
    async fn compare_and_set_cooldown(
        &self,
        server: &ServerId,
        reward: &str,
        player: &str,
        expected: Option<DateTime<Utc>>,
        new: Option<DateTime<Utc>>,
    ) -> Result<bool, StorageError>;

    /// Every zone on `server` that has not been deleted.
    async fn list_active_zones(&self, server: &ServerId) -> Result<Vec<Zone>, StorageError>;

    async fn upsert_zone(&self, zone: &Zone) -> Result<(), StorageError>;

    /// Removes a zone. Removing an unknown zone is not an error.
    async fn delete_zone(&self, zone_id: &ZoneId) -> Result<(), StorageError>;
}

/// Storage failure. Callers abort the claim or transition they were making.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Storage backend error: {0}")]
    Backend(String),
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Storage serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
