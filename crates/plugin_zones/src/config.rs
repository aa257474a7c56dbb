//! Per-server zone timing and the in-game commands issued on state changes.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use warden_event_system::{Zone, ZoneState};

/// Timing of the offline part of the lifecycle on one server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneConfig {
    /// Grace delay in `Yellow` before offline protection starts
    pub offline_delay: Duration,
    /// Time in `Red` before the zone is deleted
    pub offline_protection: Duration,
    /// Wait before retrying a timed transition whose storage write failed
    pub retry_delay: Duration,
    pub commands: ZoneCommands,
}

impl Default for ZoneConfig {
    fn default() -> Self {
        Self {
            offline_delay: Duration::from_secs(5 * 60),
            offline_protection: Duration::from_secs(30 * 60),
            retry_delay: Duration::from_secs(30),
            commands: ZoneCommands::default(),
        }
    }
}

/// Command templates sent to the server when a zone enters a state.
///
/// `{zone}` and `{owner}` are substituted. A `None` template sends nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneCommands {
    #[serde(default)]
    pub green: Option<String>,
    #[serde(default)]
    pub yellow: Option<String>,
    #[serde(default)]
    pub red: Option<String>,
    #[serde(default)]
    pub deleted: Option<String>,
}

impl Default for ZoneCommands {
    fn default() -> Self {
        Self {
            green: Some("zones.setcolor \"{zone}\" green".to_string()),
            yellow: Some("zones.setcolor \"{zone}\" yellow".to_string()),
            red: Some("zones.setcolor \"{zone}\" red".to_string()),
            deleted: Some("zones.erase \"{zone}\"".to_string()),
        }
    }
}

impl ZoneCommands {
    /// No commands at all.
    pub fn none() -> Self {
        Self {
            green: None,
            yellow: None,
            red: None,
            deleted: None,
        }
    }

    /// The rendered command for `zone` entering `state`, if one is configured.
    pub fn render(&self, state: ZoneState, zone: &Zone) -> Option<String> {
        let template = match state {
            ZoneState::Green => self.green.as_ref(),
            ZoneState::Yellow => self.yellow.as_ref(),
            ZoneState::Red => self.red.as_ref(),
            ZoneState::Deleted => self.deleted.as_ref(),
        }?;
        Some(
            template
                .replace("{zone}", zone.id.as_str())
                .replace("{owner}", &zone.owner),
        )
    }
}
