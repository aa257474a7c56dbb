//! Seeds zone presence from the server's own player list whenever a link
//! comes up, so players who joined while the link was down are not missed.

use plugin_zones::{ZoneError, ZoneLifecycle};
use rcon_link::LinkState;
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use warden_event_system::{CommandError, CommandSender, ServerId};

/// Console command answering with a JSON array of the connected players.
pub const PLAYER_LIST_COMMAND: &str = "playerlist";

#[derive(Debug, Deserialize)]
struct PlayerEntry {
    #[serde(rename = "DisplayName")]
    display_name: String,
}

/// Why a player-list sync did not complete.
#[derive(Debug, Error)]
pub enum RosterError {
    #[error("Could not fetch player list: {0}")]
    Fetch(#[from] CommandError),
    #[error("Unreadable player list: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Zone presence sync failed: {0}")]
    Zones(#[from] ZoneError),
}

/// Extracts display names from a `playerlist` response. An empty response
/// means nobody is connected.
///
/// # Errors
///
/// Any other response that is not a JSON array of player entries.
pub fn parse_player_list(response: &str) -> Result<Vec<String>, serde_json::Error> {
    if response.trim().is_empty() {
        return Ok(Vec::new());
    }
    let entries: Vec<PlayerEntry> = serde_json::from_str(response)?;
    Ok(entries.into_iter().map(|entry| entry.display_name).collect())
}

/// Asks `server` for its player list and replaces the zone presence with it.
/// Joins and leaves handled while the request is in flight win over the list.
/// Returns how many players the list named.
///
/// # Errors
///
/// [`RosterError::Fetch`] and [`RosterError::Parse`] leave presence as it
/// was. [`RosterError::Zones`] means presence was replaced but some zone
/// could not persist its transition; the next join or leave retries it.
pub async fn sync_players(
    commands: &dyn CommandSender,
    zones: &ZoneLifecycle,
    server: &ServerId,
) -> Result<usize, RosterError> {
    let sync = zones.begin_presence_sync(server);
    let response = commands.send_command(server, PLAYER_LIST_COMMAND).await?;
    let players = parse_player_list(&response)?;
    let online = players.len();
    sync.apply(players).await?;
    info!("👥 {} player(s) online on {}", online, server);
    Ok(online)
}

/// Re-syncs presence every time the link of `server` reaches `Connected`.
/// Ends when the link is closed.
pub fn spawn_roster_sync(
    commands: Arc<dyn CommandSender>,
    zones: ZoneLifecycle,
    server: ServerId,
    mut state: watch::Receiver<LinkState>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let up = state
                .wait_for(|s| matches!(s, LinkState::Connected | LinkState::Closed))
                .await
                .map(|s| *s);
            match up {
                Ok(LinkState::Connected) => {}
                _ => break,
            }

            // The join and leave feed keeps presence current if this fails.
            if let Err(e) = sync_players(commands.as_ref(), &zones, &server).await {
                warn!("👥 Player list sync of {} failed: {}", server, e);
            }

            if state.wait_for(|s| *s != LinkState::Connected).await.is_err() {
                break;
            }
        }
        debug!("👥 Roster sync for {} stopped", server);
    })
}
