//! Who is online on each server, fed by join/leave lines and player-list
//! snapshots.
//!
//! A snapshot is requested before the list is fetched and applied once it
//! arrives. Joins and leaves seen in between are newer than the list, so they
//! override it for the players they name.

use dashmap::DashMap;
use std::collections::{HashMap, HashSet};
use warden_event_system::ServerId;

#[derive(Debug, Default)]
struct ServerPresence {
    online: HashSet<String>,
    /// Bumped by every join and leave
    seq: u64,
    /// Snapshots requested and not yet applied or abandoned
    pending: usize,
    /// Sequence of each player's latest event, recorded while `pending > 0`
    touched: HashMap<String, u64>,
}

impl ServerPresence {
    fn record(&mut self, player: &str) {
        self.seq += 1;
        if self.pending > 0 {
            self.touched.insert(player.to_string(), self.seq);
        }
    }

    fn settle(&mut self) {
        self.pending = self.pending.saturating_sub(1);
        if self.pending == 0 {
            self.touched.clear();
        }
    }
}

#[derive(Debug, Default)]
pub struct Presence {
    servers: DashMap<ServerId, ServerPresence>,
}

impl Presence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `player` online; `false` if they already were.
    pub fn join(&self, server: &ServerId, player: &str) -> bool {
        let mut presence = self.servers.entry(server.clone()).or_default();
        presence.record(player);
        presence.online.insert(player.to_string())
    }

    /// Marks `player` offline; `false` if they already were.
    pub fn leave(&self, server: &ServerId, player: &str) -> bool {
        let mut presence = self.servers.entry(server.clone()).or_default();
        presence.record(player);
        presence.online.remove(player)
    }

    /// Opens a snapshot of `server` and returns its stamp. Every stamp must
    /// be passed to [`apply_snapshot`](Self::apply_snapshot) or
    /// [`abandon_snapshot`](Self::abandon_snapshot).
    pub fn begin_snapshot(&self, server: &ServerId) -> u64 {
        let mut presence = self.servers.entry(server.clone()).or_default();
        presence.pending += 1;
        presence.seq
    }

    /// Replaces the online set of `server` with `players`, except for players
    /// whose joins or leaves arrived after the snapshot stamped `since` was
    /// opened; those keep their event-derived status.
    pub fn apply_snapshot<I, S>(&self, server: &ServerId, since: u64, players: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut snapshot: HashSet<String> = players.into_iter().map(Into::into).collect();
        let mut presence = self.servers.entry(server.clone()).or_default();
        for (player, &at) in &presence.touched {
            if at <= since {
                continue;
            }
            if presence.online.contains(player) {
                snapshot.insert(player.clone());
            } else {
                snapshot.remove(player);
            }
        }
        presence.online = snapshot;
        presence.settle();
    }

    /// Closes a snapshot that will never be applied.
    pub fn abandon_snapshot(&self, server: &ServerId) {
        if let Some(mut presence) = self.servers.get_mut(server) {
            presence.settle();
        }
    }

    pub fn is_online(&self, server: &ServerId, player: &str) -> bool {
        self.servers
            .get(server)
            .is_some_and(|presence| presence.online.contains(player))
    }

    /// Whether any of `team` is online on `server`.
    pub fn any_online<'a>(&self, server: &ServerId, mut team: impl Iterator<Item = &'a str>) -> bool {
        let Some(presence) = self.servers.get(server) else {
            return false;
        };
        team.any(|member| presence.online.contains(member))
    }

    /// Online players of `server`, sorted.
    pub fn online(&self, server: &ServerId) -> Vec<String> {
        let mut players: Vec<String> = self
            .servers
            .get(server)
            .map(|presence| presence.online.iter().cloned().collect())
            .unwrap_or_default();
        players.sort();
        players
    }

    #[cfg(test)]
    fn tracked_events(&self, server: &ServerId) -> usize {
        self.servers
            .get(server)
            .map_or(0, |presence| presence.touched.len())
    }
}
