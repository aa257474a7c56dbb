//! # Core Type Definitions
//!
//! This module contains the fundamental types shared by every Warden crate:
//! server identity, reward definitions, authorization and cooldown records,
//! and the persisted zone record.
//!
//! ## Key Types
//!
//! - [`ServerId`] - (tenant, server) identity of one remote game server
//! - [`RemoteServer`] - Connection details for one remote game server
//! - [`RewardDefinition`] - A cooldown-gated reward claimable through chat
//! - [`Zone`] - A player-owned zone and its lifecycle state
//!
//! ## Design Principles
//!
//! - **Type Safety**: Wrapper types prevent mixing up zone ids, server ids and player names
//! - **Serialization**: Every persisted type round-trips through JSON for the file-backed store
//! - **Resolved once**: Server identity is fixed at configuration time and never remapped per event

use crate::clock::add_duration;
use chrono::{DateTime, Utc};
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Bytes escaped in a URL path segment.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

// ============================================================================
// Server identity
// ============================================================================

/// Identity of one remote game server: the tenant that owns it plus the
/// server's own id within that tenant.
///
/// # Examples
///
/// ```rust
/// use warden_event_system::ServerId;
///
/// let id = ServerId::new("acme", "eu-main");
/// assert_eq!(id.to_string(), "acme/eu-main");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ServerId {
    /// Tenant (community / customer) owning the server
    pub tenant: String,
    /// Server id, unique within the tenant
    pub server: String,
}

impl ServerId {
    /// Creates a new server identity.
    pub fn new(tenant: impl Into<String>, server: impl Into<String>) -> Self {
        Self {
            tenant: tenant.into(),
            server: server.into(),
        }
    }
}

impl fmt::Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.tenant, self.server)
    }
}

/// Connection details for one remote game server.
///
/// Created from configuration and read-only afterwards. The password is the
/// control-channel credential and is redacted from `Debug` output.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteServer {
    /// Identity of the server
    pub id: ServerId,
    /// Human readable name used in logs and notifications
    pub name: String,
    /// Host name or IP address of the control channel
    pub host: String,
    /// Control channel port
    pub port: u16,
    /// Control channel password
    pub password: String,
}

impl RemoteServer {
    /// WebSocket URL of the control channel. The password travels in the
    /// path, percent-encoded as one segment.
    pub fn url(&self) -> String {
        format!(
            "ws://{}:{}/{}",
            self.host,
            self.port,
            utf8_percent_encode(&self.password, PATH_SEGMENT)
        )
    }

    /// Address of the control channel without the credential, safe to log.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Debug for RemoteServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteServer")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("password", &"[redacted]")
            .finish()
    }
}

// ============================================================================
// Chat & feed channels
// ============================================================================

/// Scope of an in-game chat line.
///
/// All scopes are equally valid carriers of reward emotes; the scope is only
/// recorded for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChatChannel {
    Global,
    Team,
    Local,
}

impl fmt::Display for ChatChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChatChannel::Global => "global",
            ChatChannel::Team => "team",
            ChatChannel::Local => "local",
        };
        f.write_str(name)
    }
}

/// External feed a notification is posted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FeedChannel {
    /// General administrative log
    Admin,
    /// Reward grants
    Rewards,
    /// Zone lifecycle transitions
    Zones,
}

impl fmt::Display for FeedChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FeedChannel::Admin => "admin",
            FeedChannel::Rewards => "rewards",
            FeedChannel::Zones => "zones",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Rewards, cooldowns and authorization
// ============================================================================

/// Default delivery command template for rewards that do not set one.
pub const DEFAULT_REWARD_COMMAND: &str = "kit givetoplayer {key} \"{player}\"";

/// A cooldown-gated reward a player claims by typing its emote token in chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardDefinition {
    /// Emote token that claims the reward, e.g. `FREEkit1` for `:FREEkit1:`
    pub key: String,
    /// Name shown to players and in the feed
    pub display_name: String,
    /// Minimum time between two successful claims by the same player
    #[serde(with = "duration_secs")]
    pub cooldown: Duration,
    /// Allow-list a player must be on to claim the reward
    #[serde(default)]
    pub authorization_list: Option<String>,
    /// Delivery command template; `{player}` and `{key}` are substituted
    #[serde(default = "default_reward_command")]
    pub command: String,
}

fn default_reward_command() -> String {
    DEFAULT_REWARD_COMMAND.to_string()
}

impl RewardDefinition {
    /// Renders the delivery command for `player`.
    pub fn delivery_command(&self, player: &str) -> String {
        self.command
            .replace("{player}", player)
            .replace("{key}", &self.key)
    }
}

/// Last successful claim of a reward by a player on a server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CooldownRecord {
    pub server: ServerId,
    pub reward: String,
    pub player: String,
    pub last_claim: DateTime<Utc>,
}

/// Membership of a player in a named allow-list on a server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AuthorizationEntry {
    pub server: ServerId,
    pub list: String,
    pub player: String,
}

// ============================================================================
// Zones
// ============================================================================

/// Identity of a zone (its name). Unique across all servers of a process.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ZoneId(pub String);

impl ZoneId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ZoneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle state of a zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ZoneState {
    /// Owner/team believed online
    Green,
    /// Team just went offline, short grace delay running
    Yellow,
    /// Offline protection active, counting down toward deletion
    Red,
    /// Terminal; the zone record is gone
    Deleted,
}

impl ZoneState {
    /// Aggregate team presence implied by the state, `None` once deleted.
    pub fn team_online(self) -> Option<bool> {
        match self {
            ZoneState::Green => Some(true),
            ZoneState::Yellow | ZoneState::Red => Some(false),
            ZoneState::Deleted => None,
        }
    }
}

impl fmt::Display for ZoneState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ZoneState::Green => "green",
            ZoneState::Yellow => "yellow",
            ZoneState::Red => "red",
            ZoneState::Deleted => "deleted",
        };
        f.write_str(name)
    }
}

/// A player-owned zone whose protection state follows the team's presence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Zone {
    pub id: ZoneId,
    /// Owning player
    pub owner: String,
    /// Additional team members; the team is the owner plus these players
    #[serde(default)]
    pub members: Vec<String>,
    pub server: ServerId,
    pub created_at: DateTime<Utc>,
    /// Total lifetime measured from `created_at`, regardless of state
    #[serde(with = "duration_secs")]
    pub lifetime: Duration,
    pub state: ZoneState,
    pub last_transition: DateTime<Utc>,
}

impl Zone {
    /// Creates a new `Green` zone.
    pub fn new(
        id: ZoneId,
        owner: impl Into<String>,
        server: ServerId,
        created_at: DateTime<Utc>,
        lifetime: Duration,
    ) -> Self {
        Self {
            id,
            owner: owner.into(),
            members: Vec::new(),
            server,
            created_at,
            lifetime,
            state: ZoneState::Green,
            last_transition: created_at,
        }
    }

    /// Adds team members, builder style.
    pub fn with_members<I, S>(mut self, members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.members.extend(members.into_iter().map(Into::into));
        self
    }

    /// Hard ceiling after which the zone is deleted no matter what.
    pub fn expires_at(&self) -> DateTime<Utc> {
        add_duration(self.created_at, self.lifetime)
    }

    /// Owner followed by members.
    pub fn team(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.owner.as_str()).chain(self.members.iter().map(String::as_str))
    }

    /// Whether `player` belongs to the zone's team.
    pub fn has_member(&self, player: &str) -> bool {
        self.team().any(|name| name == player)
    }
}

/// Serde helper storing a `Duration` as whole seconds.
pub mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_remote_server_debug_redacts_password() {
        let server = RemoteServer {
            id: ServerId::new("acme", "eu"),
            name: "EU Main".to_string(),
            host: "10.0.0.1".to_string(),
            port: 28016,
            password: "hunter2".to_string(),
        };

        let debug = format!("{server:?}");
        assert!(!debug.contains("hunter2"));
        assert_eq!(server.url(), "ws://10.0.0.1:28016/hunter2");
        assert_eq!(server.address(), "10.0.0.1:28016");
    }

    #[test]
    fn test_url_escapes_password_as_one_segment() {
        let server = RemoteServer {
            id: ServerId::new("acme", "eu"),
            name: "EU Main".to_string(),
            host: "10.0.0.1".to_string(),
            port: 28016,
            password: "a/b?c#d%e f".to_string(),
        };

        assert_eq!(server.url(), "ws://10.0.0.1:28016/a%2Fb%3Fc%23d%25e%20f");
    }

    #[test]
    fn test_delivery_command_substitution() {
        let reward = RewardDefinition {
            key: "FREEkit1".to_string(),
            display_name: "Free Kit".to_string(),
            cooldown: Duration::from_secs(3600),
            authorization_list: None,
            command: DEFAULT_REWARD_COMMAND.to_string(),
        };

        assert_eq!(
            reward.delivery_command("Alice"),
            "kit givetoplayer FREEkit1 \"Alice\""
        );
    }

    #[test]
    fn test_reward_deserializes_with_defaults() {
        let reward: RewardDefinition = serde_json::from_str(
            r#"{"key":"VIPkit","display_name":"VIP","cooldown":600}"#,
        )
        .expect("reward should deserialize");

        assert_eq!(reward.cooldown, Duration::from_secs(600));
        assert!(reward.authorization_list.is_none());
        assert_eq!(reward.command, DEFAULT_REWARD_COMMAND);
    }

    #[test]
    fn test_zone_team_and_expiry() {
        let created = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let zone = Zone::new(
            ZoneId::new("carl-base"),
            "Carl",
            ServerId::new("acme", "eu"),
            created,
            Duration::from_secs(35 * 3600),
        )
        .with_members(["Dana"]);

        assert!(zone.has_member("Carl"));
        assert!(zone.has_member("Dana"));
        assert!(!zone.has_member("Eve"));
        assert_eq!(zone.expires_at(), Utc.with_ymd_and_hms(2024, 5, 2, 23, 0, 0).unwrap());
        assert_eq!(zone.state, ZoneState::Green);
        assert_eq!(zone.last_transition, created);
    }

    #[test]
    fn test_zone_state_team_online() {
        assert_eq!(ZoneState::Green.team_online(), Some(true));
        assert_eq!(ZoneState::Yellow.team_online(), Some(false));
        assert_eq!(ZoneState::Red.team_online(), Some(false));
        assert_eq!(ZoneState::Deleted.team_online(), None);
    }
}
