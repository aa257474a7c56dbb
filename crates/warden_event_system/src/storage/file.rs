use super::{MemoryStorage, Storage, StorageError, StorageSnapshot};
use crate::types::{RewardDefinition, ServerId, Zone, ZoneId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// [`MemoryStorage`] persisted to a single JSON file.
///
/// Every mutation is written through: the full snapshot goes to a temporary
/// file next to the target which is then renamed over it. When the write
/// fails the in-memory change is rolled back and the error returned, so the
/// file and memory never disagree about a completed call.
#[derive(Debug)]
pub struct JsonFileStorage {
    path: PathBuf,
    memory: MemoryStorage,
    write_lock: Mutex<()>,
}

impl JsonFileStorage {
    /// Loads `path`, or starts empty when it does not exist yet.
    ///
    /// # Errors
    ///
    /// [`StorageError`] when the file exists but cannot be read or parsed.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        let memory = match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let snapshot: StorageSnapshot = serde_json::from_slice(&bytes)?;
                info!(
                    "📂 Loaded state from {} ({} zones, {} cooldowns)",
                    path.display(),
                    snapshot.zones.len(),
                    snapshot.cooldowns.len()
                );
                MemoryStorage::from_snapshot(snapshot)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("📂 No state file at {}, starting empty", path.display());
                MemoryStorage::new()
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path,
            memory,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Direct access to the tables, e.g. for seeding before [`flush`](Self::flush).
    pub fn memory(&self) -> &MemoryStorage {
        &self.memory
    }

    /// Writes the current tables to disk.
    ///
    /// # Errors
    ///
    /// [`StorageError`] when the file cannot be written.
    pub async fn flush(&self) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().await;
        self.persist().await
    }

    /// Adds or replaces a reward definition and persists it.
    pub async fn put_reward(
        &self,
        server: &ServerId,
        reward: RewardDefinition,
    ) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().await;
        let key = reward.key.clone();
        let previous = self.memory.remove_reward(server, &key);
        self.memory.put_reward(server, reward);
        if let Err(e) = self.persist().await {
            self.memory.remove_reward(server, &key);
            if let Some(previous) = previous {
                self.memory.put_reward(server, previous);
            }
            return Err(e);
        }
        Ok(())
    }

    /// Adds `player` to allow-list `list` and persists it.
    pub async fn authorize(
        &self,
        server: &ServerId,
        list: &str,
        player: &str,
    ) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().await;
        if !self.memory.authorize(server, list, player) {
            return Ok(());
        }
        if let Err(e) = self.persist().await {
            self.memory.revoke(server, list, player);
            return Err(e);
        }
        Ok(())
    }

    /// Removes `player` from allow-list `list` and persists it.
    pub async fn revoke(
        &self,
        server: &ServerId,
        list: &str,
        player: &str,
    ) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().await;
        if !self.memory.revoke(server, list, player) {
            return Ok(());
        }
        if let Err(e) = self.persist().await {
            self.memory.authorize(server, list, player);
            return Err(e);
        }
        Ok(())
    }

    async fn persist(&self) -> Result<(), StorageError> {
        let bytes = serde_json::to_vec_pretty(&self.memory.snapshot())?;
        let temp = temp_path(&self.path);
        tokio::fs::write(&temp, &bytes).await?;
        if let Err(e) = tokio::fs::rename(&temp, &self.path).await {
            warn!("⚠️ Failed to replace {}: {}", self.path.display(), e);
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(e.into());
        }
        debug!("💾 State written to {} ({} bytes)", self.path.display(), bytes.len());
        Ok(())
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_else(|| "state".into());
    name.push(".tmp");
    path.with_file_name(name)
}

#[async_trait]
impl Storage for JsonFileStorage {
    async fn reward_definition(
        &self,
        server: &ServerId,
        key: &str,
    ) -> Result<Option<RewardDefinition>, StorageError> {
        self.memory.reward_definition(server, key).await
    }

    async fn is_authorized(
        &self,
        server: &ServerId,
        list: &str,
        player: &str,
    ) -> Result<bool, StorageError> {
        self.memory.is_authorized(server, list, player).await
    }

    async fn cooldown(
        &self,
        server: &ServerId,
        reward: &str,
        player: &str,
    ) -> Result<Option<DateTime<Utc>>, StorageError> {
        self.memory.cooldown(server, reward, player).await
    }

    async fn compare_and_set_cooldown(
        &self,
        server: &ServerId,
        reward: &str,
        player: &str,
        expected: Option<DateTime<Utc>>,
        new: Option<DateTime<Utc>>,
    ) -> Result<bool, StorageError> {
        let _guard = self.write_lock.lock().await;
        if !self.memory.swap_cooldown(server, reward, player, expected, new) {
            return Ok(false);
        }
        if let Err(e) = self.persist().await {
            self.memory.swap_cooldown(server, reward, player, new, expected);
            return Err(e);
        }
        Ok(true)
    }

    async fn list_active_zones(&self, server: &ServerId) -> Result<Vec<Zone>, StorageError> {
        self.memory.list_active_zones(server).await
    }

    async fn upsert_zone(&self, zone: &Zone) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().await;
        let previous = self.memory.put_zone(zone.clone());
        if let Err(e) = self.persist().await {
            match previous {
                Some(previous) => {
                    self.memory.put_zone(previous);
                }
                None => {
                    self.memory.take_zone(&zone.id);
                }
            }
            return Err(e);
        }
        Ok(())
    }

    async fn delete_zone(&self, zone_id: &ZoneId) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().await;
        let Some(previous) = self.memory.take_zone(zone_id) else {
            return Ok(());
        };
        if let Err(e) = self.persist().await {
            self.memory.put_zone(previous);
            return Err(e);
        }
        Ok(())
    }
}
