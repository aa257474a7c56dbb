//! Configuration management for Warden.
//!
//! This module handles loading, validation, and conversion of the TOML
//! configuration: logging, link tuning, the state backend, and every remote
//! server with its rewards, allow-lists and zone timing.

use plugin_zones::{ZoneCommands, ZoneConfig};
use rcon_link::LinkConfig;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::time::Duration;
use tracing::info;
use warden_event_system::{RemoteServer, RewardDefinition, ServerId};

fn default_command_timeout_secs() -> u64 {
    5
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_backoff_initial_ms() -> u64 {
    1000
}

fn default_backoff_max_secs() -> u64 {
    60
}

fn default_event_buffer() -> usize {
    1024
}

fn default_health_interval_secs() -> u64 {
    60
}

fn default_state_path() -> String {
    "warden-state.json".to_string()
}

fn default_player_template() -> String {
    rcon_link::DEFAULT_PLAYER_TEMPLATE.to_string()
}

fn default_offline_delay_secs() -> u64 {
    300
}

fn default_offline_protection_secs() -> u64 {
    1800
}

fn default_retry_delay_secs() -> u64 {
    30
}

fn default_port() -> u16 {
    28016
}

/// Application configuration loaded from TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Logging configuration settings
    #[serde(default)]
    pub logging: LoggingSettings,
    /// Control-channel link tuning
    #[serde(default)]
    pub link: LinkSettings,
    /// Where durable state lives
    #[serde(default)]
    pub storage: StorageSettings,
    /// In-game message settings
    #[serde(default)]
    pub notifications: NotificationSettings,
    /// Remote game servers, each with its own tenant
    #[serde(default)]
    pub servers: Vec<ServerSettings>,
}

/// Logging system configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level filter (trace, debug, info, warn, error)
    pub level: String,
    /// Whether to output logs in JSON format
    #[serde(default)]
    pub json_format: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

/// Link timeouts and reconnect backoff, shared by every server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkSettings {
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_backoff_initial_ms")]
    pub backoff_initial_ms: u64,
    #[serde(default = "default_backoff_max_secs")]
    pub backoff_max_secs: u64,
    /// Raw console lines buffered per server
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
    /// Interval of the link health summary in the log
    #[serde(default = "default_health_interval_secs")]
    pub health_interval_secs: u64,
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            command_timeout_secs: default_command_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            backoff_initial_ms: default_backoff_initial_ms(),
            backoff_max_secs: default_backoff_max_secs(),
            event_buffer: default_event_buffer(),
            health_interval_secs: default_health_interval_secs(),
        }
    }
}

impl LinkSettings {
    pub fn to_link_config(&self) -> LinkConfig {
        LinkConfig {
            command_timeout: Duration::from_secs(self.command_timeout_secs),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            backoff_initial: Duration::from_millis(self.backoff_initial_ms),
            backoff_max: Duration::from_secs(self.backoff_max_secs),
            event_buffer: self.event_buffer,
        }
    }
}

/// Storage backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Nothing survives a restart
    Memory,
    /// JSON snapshot file, rewritten after every change
    File,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    pub backend: StorageBackend,
    /// State file used by the `file` backend
    #[serde(default = "default_state_path")]
    pub path: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            backend: StorageBackend::File,
            path: default_state_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationSettings {
    /// Command used for in-game player messages; `{player}` and `{message}` are substituted
    #[serde(default = "default_player_template")]
    pub player_template: String,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            player_template: default_player_template(),
        }
    }
}

/// One remote game server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Tenant (community) owning the server
    pub tenant: String,
    /// Server id, unique within the tenant
    pub id: String,
    /// Display name used in logs
    #[serde(default)]
    pub name: String,
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// WebRCON password
    pub password: String,
    #[serde(default)]
    pub zones: ZoneSettings,
    /// Rewards claimable through chat emotes
    #[serde(default)]
    pub rewards: Vec<RewardDefinition>,
    /// Allow-lists: list name to player names
    #[serde(default)]
    pub authorization: BTreeMap<String, Vec<String>>,
}

impl ServerSettings {
    pub fn server_id(&self) -> ServerId {
        ServerId::new(&self.tenant, &self.id)
    }

    pub fn to_remote(&self) -> RemoteServer {
        let name = if self.name.is_empty() {
            self.id.clone()
        } else {
            self.name.clone()
        };
        RemoteServer {
            id: self.server_id(),
            name,
            host: self.host.clone(),
            port: self.port,
            password: self.password.clone(),
        }
    }
}

/// Zone timing and state commands of one server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneSettings {
    #[serde(default = "default_offline_delay_secs")]
    pub offline_delay_secs: u64,
    #[serde(default = "default_offline_protection_secs")]
    pub offline_protection_secs: u64,
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
    #[serde(default)]
    pub commands: ZoneCommands,
}

impl Default for ZoneSettings {
    fn default() -> Self {
        Self {
            offline_delay_secs: default_offline_delay_secs(),
            offline_protection_secs: default_offline_protection_secs(),
            retry_delay_secs: default_retry_delay_secs(),
            commands: ZoneCommands::default(),
        }
    }
}

impl ZoneSettings {
    pub fn to_zone_config(&self) -> ZoneConfig {
        ZoneConfig {
            offline_delay: Duration::from_secs(self.offline_delay_secs),
            offline_protection: Duration::from_secs(self.offline_protection_secs),
            retry_delay: Duration::from_secs(self.retry_delay_secs),
            commands: self.commands.clone(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            logging: LoggingSettings::default(),
            link: LinkSettings::default(),
            storage: StorageSettings::default(),
            notifications: NotificationSettings::default(),
            servers: vec![ServerSettings {
                tenant: "default".to_string(),
                id: "main".to_string(),
                name: "Main".to_string(),
                host: "127.0.0.1".to_string(),
                port: default_port(),
                password: "change-me".to_string(),
                zones: ZoneSettings::default(),
                rewards: vec![RewardDefinition {
                    key: "FREEkit1".to_string(),
                    display_name: "Free Kit".to_string(),
                    cooldown: Duration::from_secs(3600),
                    authorization_list: None,
                    command: warden_event_system::DEFAULT_REWARD_COMMAND.to_string(),
                }],
                authorization: BTreeMap::new(),
            }],
        }
    }
}

impl AppConfig {
    /// Loads configuration from a TOML file.
    ///
    /// If the file doesn't exist, creates a default configuration file at the
    /// specified path and returns the default configuration.
    ///
    /// # Errors
    ///
    /// I/O errors reading or writing `path`, and TOML errors parsing it.
    pub async fn load_from_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path).await?;
            let config: AppConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            let default_config = AppConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            tokio::fs::write(path, toml_content).await?;
            info!("Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    /// Validates the configuration for consistency and correctness.
    ///
    /// # Returns
    ///
    /// `Ok(())` if the configuration is valid, or an error string describing the issue.
    pub fn validate(&self) -> Result<(), String> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(format!(
                "Invalid log level: {}. Must be one of: {valid_levels:?}",
                &self.logging.level
            ));
        }

        if self.link.command_timeout_secs == 0 || self.link.connect_timeout_secs == 0 {
            return Err("link timeouts must be greater than 0".to_string());
        }
        if self.link.backoff_initial_ms == 0 || self.link.backoff_max_secs == 0 {
            return Err("link backoff must be greater than 0".to_string());
        }
        if self.link.event_buffer == 0 {
            return Err("link.event_buffer must be greater than 0".to_string());
        }
        if self.link.health_interval_secs == 0 {
            return Err("link.health_interval_secs must be greater than 0".to_string());
        }

        if self.storage.backend == StorageBackend::File && self.storage.path.is_empty() {
            return Err("storage.path cannot be empty for the file backend".to_string());
        }

        let mut seen = HashSet::new();
        for server in &self.servers {
            let id = server.server_id();
            if server.tenant.is_empty() || server.id.is_empty() {
                return Err("Server tenant and id cannot be empty".to_string());
            }
            if !seen.insert(id.clone()) {
                return Err(format!("Duplicate server: {id}"));
            }
            if server.host.is_empty() {
                return Err(format!("Server {id}: host cannot be empty"));
            }
            if server.port == 0 {
                return Err(format!("Server {id}: port must be greater than 0"));
            }
            if server.password.is_empty() {
                return Err(format!("Server {id}: password cannot be empty"));
            }

            let zones = &server.zones;
            if zones.offline_delay_secs == 0
                || zones.offline_protection_secs == 0
                || zones.retry_delay_secs == 0
            {
                return Err(format!("Server {id}: zone durations must be greater than 0"));
            }

            let mut keys = HashSet::new();
            for reward in &server.rewards {
                if reward.key.is_empty() || reward.key.contains(':') {
                    return Err(format!("Server {id}: invalid reward key '{}'", reward.key));
                }
                if !keys.insert(reward.key.as_str()) {
                    return Err(format!("Server {id}: duplicate reward '{}'", reward.key));
                }
            }
        }

        Ok(())
    }
}
