//! The durable state backend chosen by configuration, and seeding it with the
//! rewards and allow-lists the configuration declares.

use crate::config::{ServerSettings, StorageBackend, StorageSettings};
use std::sync::Arc;
use tracing::info;
use warden_event_system::{JsonFileStorage, MemoryStorage, Storage, StorageError};

#[derive(Debug, Clone)]
pub enum StateStore {
    Memory(Arc<MemoryStorage>),
    File(Arc<JsonFileStorage>),
}

impl StateStore {
    /// Opens the configured backend. A missing state file starts empty.
    ///
    /// # Errors
    ///
    /// [`StorageError`] when an existing state file cannot be read or parsed.
    pub async fn open(settings: &StorageSettings) -> Result<Self, StorageError> {
        match settings.backend {
            StorageBackend::Memory => {
                info!("💾 Using in-memory state; cooldowns and zones are lost on exit");
                Ok(Self::Memory(Arc::new(MemoryStorage::new())))
            }
            StorageBackend::File => {
                let storage = JsonFileStorage::open(&settings.path).await?;
                info!("💾 Using state file {}", storage.path().display());
                Ok(Self::File(Arc::new(storage)))
            }
        }
    }

    pub fn storage(&self) -> Arc<dyn Storage> {
        match self {
            Self::Memory(memory) => memory.clone(),
            Self::File(file) => file.clone(),
        }
    }

    fn tables(&self) -> &MemoryStorage {
        match self {
            Self::Memory(memory) => memory,
            Self::File(file) => file.memory(),
        }
    }

    /// Writes every configured reward and allow-list entry, replacing rewards
    /// with the same key. Existing cooldowns and zones are left alone.
    ///
    /// # Errors
    ///
    /// [`StorageError`] when the seeded state cannot be written back.
    pub async fn seed(&self, servers: &[ServerSettings]) -> Result<(), StorageError> {
        let tables = self.tables();
        let mut rewards = 0;
        let mut entries = 0;
        for server in servers {
            let id = server.server_id();
            for reward in &server.rewards {
                tables.put_reward(&id, reward.clone());
                rewards += 1;
            }
            for (list, players) in &server.authorization {
                for player in players {
                    tables.authorize(&id, list, player);
                    entries += 1;
                }
            }
        }
        self.flush().await?;
        info!(
            "🌱 Seeded {} reward(s) and {} allow-list entr(ies) for {} server(s)",
            rewards,
            entries,
            servers.len()
        );
        Ok(())
    }

    /// Writes the file backend to disk; a no-op in memory.
    ///
    /// # Errors
    ///
    /// [`StorageError`] when the state file cannot be written.
    pub async fn flush(&self) -> Result<(), StorageError> {
        match self {
            Self::Memory(_) => Ok(()),
            Self::File(file) => file.flush().await,
        }
    }
}
