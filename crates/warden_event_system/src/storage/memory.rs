use super::{Storage, StorageError};
use crate::types::{
    AuthorizationEntry, CooldownRecord, RewardDefinition, ServerId, Zone, ZoneId, ZoneState,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use serde::{Deserialize, Serialize};

type CooldownKey = (ServerId, String, String);

/// In-process storage backed by concurrent maps.
///
/// Cooldown compare-and-set holds the shard lock of its key for the whole
/// check-and-write, so it is atomic per (server, reward, player).
#[derive(Debug, Default)]
pub struct MemoryStorage {
    rewards: DashMap<(ServerId, String), RewardDefinition>,
    authorizations: DashSet<AuthorizationEntry>,
    cooldowns: DashMap<CooldownKey, DateTime<Utc>>,
    zones: DashMap<ZoneId, Zone>,
}

/// Reward definition together with the server it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredReward {
    pub server: ServerId,
    #[serde(flatten)]
    pub reward: RewardDefinition,
}

/// Serializable copy of every table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageSnapshot {
    #[serde(default)]
    pub rewards: Vec<StoredReward>,
    #[serde(default)]
    pub authorizations: Vec<AuthorizationEntry>,
    #[serde(default)]
    pub cooldowns: Vec<CooldownRecord>,
    #[serde(default)]
    pub zones: Vec<Zone>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a reward definition.
    pub fn put_reward(&self, server: &ServerId, reward: RewardDefinition) {
        self.rewards
            .insert((server.clone(), reward.key.clone()), reward);
    }

    pub fn remove_reward(&self, server: &ServerId, key: &str) -> Option<RewardDefinition> {
        self.rewards
            .remove(&(server.clone(), key.to_string()))
            .map(|(_, reward)| reward)
    }

    /// Adds `player` to allow-list `list`. Returns `false` if already present.
    pub fn authorize(&self, server: &ServerId, list: &str, player: &str) -> bool {
        self.authorizations.insert(AuthorizationEntry {
            server: server.clone(),
            list: list.to_string(),
            player: player.to_string(),
        })
    }

    /// Removes `player` from allow-list `list`. Returns `false` if absent.
    pub fn revoke(&self, server: &ServerId, list: &str, player: &str) -> bool {
        self.authorizations
            .remove(&AuthorizationEntry {
                server: server.clone(),
                list: list.to_string(),
                player: player.to_string(),
            })
            .is_some()
    }

    pub fn zone(&self, zone_id: &ZoneId) -> Option<Zone> {
        self.zones.get(zone_id).map(|zone| zone.clone())
    }

    pub(crate) fn put_zone(&self, zone: Zone) -> Option<Zone> {
        self.zones.insert(zone.id.clone(), zone)
    }

    pub(crate) fn take_zone(&self, zone_id: &ZoneId) -> Option<Zone> {
        self.zones.remove(zone_id).map(|(_, zone)| zone)
    }

    pub(crate) fn swap_cooldown(
        &self,
        server: &ServerId,
        reward: &str,
        player: &str,
        expected: Option<DateTime<Utc>>,
        new: Option<DateTime<Utc>>,
    ) -> bool {
        let key = (server.clone(), reward.to_string(), player.to_string());
        match self.cooldowns.entry(key) {
            Entry::Occupied(mut entry) => {
                if expected != Some(*entry.get()) {
                    return false;
                }
                match new {
                    Some(at) => {
                        entry.insert(at);
                    }
                    None => {
                        entry.remove();
                    }
                }
            }
            Entry::Vacant(entry) => {
                if expected.is_some() {
                    return false;
                }
                if let Some(at) = new {
                    entry.insert(at);
                }
            }
        }
        true
    }

    /// Copies every table, sorted for stable output.
    pub fn snapshot(&self) -> StorageSnapshot {
        let mut rewards: Vec<StoredReward> = self
            .rewards
            .iter()
            .map(|entry| StoredReward {
                server: entry.key().0.clone(),
                reward: entry.value().clone(),
            })
            .collect();
        rewards.sort_by(|a, b| (&a.server, &a.reward.key).cmp(&(&b.server, &b.reward.key)));

        let mut authorizations: Vec<AuthorizationEntry> =
            self.authorizations.iter().map(|entry| entry.clone()).collect();
        authorizations.sort_by(|a, b| {
            (&a.server, &a.list, &a.player).cmp(&(&b.server, &b.list, &b.player))
        });

        let mut cooldowns: Vec<CooldownRecord> = self
            .cooldowns
            .iter()
            .map(|entry| {
                let (server, reward, player) = entry.key().clone();
                CooldownRecord {
                    server,
                    reward,
                    player,
                    last_claim: *entry.value(),
                }
            })
            .collect();
        cooldowns.sort_by(|a, b| {
            (&a.server, &a.reward, &a.player).cmp(&(&b.server, &b.reward, &b.player))
        });

        let mut zones: Vec<Zone> = self.zones.iter().map(|entry| entry.clone()).collect();
        zones.sort_by(|a, b| a.id.cmp(&b.id));

        StorageSnapshot {
            rewards,
            authorizations,
            cooldowns,
            zones,
        }
    }

    /// Rebuilds storage from a snapshot.
    pub fn from_snapshot(snapshot: StorageSnapshot) -> Self {
        let storage = Self::new();
        for stored in snapshot.rewards {
            storage.put_reward(&stored.server, stored.reward);
        }
        for entry in snapshot.authorizations {
            storage.authorizations.insert(entry);
        }
        for record in snapshot.cooldowns {
            storage
                .cooldowns
                .insert((record.server, record.reward, record.player), record.last_claim);
        }
        for zone in snapshot.zones {
            storage.put_zone(zone);
        }
        storage
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn reward_definition(
        &self,
        server: &ServerId,
        key: &str,
    ) -> Result<Option<RewardDefinition>, StorageError> {
        Ok(self
            .rewards
            .get(&(server.clone(), key.to_string()))
            .map(|reward| reward.clone()))
    }

    async fn is_authorized(
        &self,
        server: &ServerId,
        list: &str,
        player: &str,
    ) -> Result<bool, StorageError> {
        Ok(self.authorizations.contains(&AuthorizationEntry {
            server: server.clone(),
            list: list.to_string(),
            player: player.to_string(),
        }))
    }

    async fn cooldown(
        &self,
        server: &ServerId,
        reward: &str,
        player: &str,
    ) -> Result<Option<DateTime<Utc>>, StorageError> {
        let key = (server.clone(), reward.to_string(), player.to_string());
        Ok(self.cooldowns.get(&key).map(|at| *at))
    }

    async fn compare_and_set_cooldown(
        &self,
        server: &ServerId,
        reward: &str,
        player: &str,
        expected: Option<DateTime<Utc>>,
        new: Option<DateTime<Utc>>,
    ) -> Result<bool, StorageError> {
        Ok(self.swap_cooldown(server, reward, player, expected, new))
    }

    async fn list_active_zones(&self, server: &ServerId) -> Result<Vec<Zone>, StorageError> {
        let mut zones: Vec<Zone> = self
            .zones
            .iter()
            .filter(|zone| &zone.server == server && zone.state != ZoneState::Deleted)
            .map(|zone| zone.clone())
            .collect();
        zones.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(zones)
    }

    async fn upsert_zone(&self, zone: &Zone) -> Result<(), StorageError> {
        self.put_zone(zone.clone());
        Ok(())
    }

    async fn delete_zone(&self, zone_id: &ZoneId) -> Result<(), StorageError> {
        self.take_zone(zone_id);
        Ok(())
    }
}
