//! # Zones Plugin
//!
//! Player-owned zones whose protection follows the owning team's presence.
//!
//! ## States
//!
//! | State     | Meaning                                   | Leaves when                                 |
//! |-----------|-------------------------------------------|---------------------------------------------|
//! | `Green`   | Some team member is online                | the whole team is offline → `Yellow`        |
//! | `Yellow`  | Team just went offline, grace delay       | delay elapses → `Red`, a member returns → `Green` |
//! | `Red`     | Offline protection counting down          | protection elapses → `Deleted`, a member returns → `Green` |
//! | `Deleted` | Terminal, the record is gone              | never                                       |
//!
//! `created_at + lifetime` deletes a zone from any state, and an administrator
//! can delete one at any time.
//!
//! ## Timers
//!
//! A zone has at most one live timer, aimed at the earlier of its state
//! deadline and its lifetime ceiling. Timed transitions are stamped with the
//! deadline they fired for rather than with the current time, so after a
//! restart a zone whose deadlines passed during the downtime walks through
//! every missed transition on the original schedule.
//!
//! ## Presence
//!
//! Joins and leaves only move a zone when the team's aggregate online status
//! disagrees with the zone's state; repeated leaves of an already offline team
//! change nothing and arm nothing. After each (re)connect the application
//! replaces a server's online set with its player list through a
//! [`PresenceSync`]; joins and leaves that arrive while the list is in flight
//! are newer than it and win.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;
use warden_event_system::{
    Clock, CommandSender, EventHandler, HandlerError, InboundEvent, NotificationSink, ServerId,
    Storage, Zone, ZoneId,
};

pub mod config;
mod error;
mod lifecycle;
pub mod machine;
pub mod presence;

#[cfg(test)]
mod tests;

pub use config::{ZoneCommands, ZoneConfig};
pub use error::ZoneError;
pub use machine::{next_wakeup, Reason, WakeCause, Wakeup};
pub use presence::Presence;

use lifecycle::Inner;

/// Handler driving every zone of the process. Cheap to clone.
#[derive(Clone, Debug)]
pub struct ZoneLifecycle {
    inner: Arc<Inner>,
}

impl ZoneLifecycle {
    /// Creates the lifecycle; servers without their own configuration use
    /// `default_config`.
    pub fn new(
        storage: Arc<dyn Storage>,
        commands: Arc<dyn CommandSender>,
        notifier: Arc<dyn NotificationSink>,
        clock: Arc<dyn Clock>,
        default_config: ZoneConfig,
    ) -> Self {
        debug!("🏕️ ZoneLifecycle: Creating new instance");
        Self {
            inner: Arc::new(Inner::new(storage, commands, notifier, clock, default_config)),
        }
    }

    /// Sets the timing and commands used for zones of `server`.
    pub fn configure_server(&self, server: ServerId, config: ZoneConfig) {
        self.inner.configure_server(server, config);
    }

    pub fn config_for(&self, server: &ServerId) -> ZoneConfig {
        self.inner.config_for(server).as_ref().clone()
    }

    /// Registers and persists a new zone, settles it against the team's
    /// current presence and arms its timer.
    ///
    /// # Errors
    ///
    /// [`ZoneError::AlreadyExists`] for a live id, [`ZoneError::Storage`] when
    /// the record cannot be written; nothing is registered in either case.
    pub async fn create_zone(&self, zone: Zone) -> Result<(), ZoneError> {
        self.inner.create_zone(zone).await
    }

    /// Deletes a zone immediately, cancelling its timer.
    ///
    /// # Errors
    ///
    /// [`ZoneError::NotFound`] for an unknown id, [`ZoneError::Storage`] when
    /// the record cannot be removed; the zone then stays live.
    pub async fn delete_zone(&self, zone_id: &ZoneId) -> Result<Zone, ZoneError> {
        self.inner.delete_zone(zone_id).await
    }

    /// Restores the stored zones of `server`. Returns how many are still live.
    ///
    /// # Errors
    ///
    /// [`ZoneError::Storage`] when the stored zones cannot be listed.
    pub async fn rehydrate(&self, server: &ServerId) -> Result<usize, ZoneError> {
        self.inner.rehydrate(server).await
    }

    /// Replaces the online set of `server` and re-evaluates its zones.
    ///
    /// # Errors
    ///
    /// Returns the last storage failure among the zones whose transition
    /// could not be persisted; those zones keep their state.
    pub async fn sync_presence<I, S>(&self, server: &ServerId, online: I) -> Result<(), ZoneError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.begin_presence_sync(server).apply(online).await
    }

    /// Starts a presence sync of `server`. Call this before requesting the
    /// player list; joins and leaves handled until [`PresenceSync::apply`]
    /// take precedence over the list for the players they name.
    pub fn begin_presence_sync(&self, server: &ServerId) -> PresenceSync {
        let since = self.inner.presence.begin_snapshot(server);
        PresenceSync {
            lifecycle: self.clone(),
            server: server.clone(),
            since,
            settled: false,
        }
    }

    /// Current record of a live zone.
    pub async fn zone(&self, zone_id: &ZoneId) -> Option<Zone> {
        self.inner.zone(zone_id).await
    }

    /// Live zones of `server`, ordered by id.
    pub async fn zones(&self, server: &ServerId) -> Vec<Zone> {
        self.inner.zones_of(server).await
    }

    /// The transition the zone's armed timer is waiting for.
    pub async fn pending_wakeup(&self, zone_id: &ZoneId) -> Option<Wakeup> {
        self.inner.pending_wakeup(zone_id).await
    }

    /// Total number of timers armed since creation.
    pub fn timers_armed(&self) -> u64 {
        self.inner.timers_armed()
    }

    pub fn presence(&self) -> &Presence {
        &self.inner.presence
    }

    /// Cancels every timer; later transitions no longer arm new ones.
    pub async fn shutdown(&self) {
        self.inner.shutdown().await;
    }
}

/// A player-list sync in progress. Dropping it without applying abandons it.
#[derive(Debug)]
pub struct PresenceSync {
    lifecycle: ZoneLifecycle,
    server: ServerId,
    since: u64,
    settled: bool,
}

impl PresenceSync {
    /// Applies the fetched list and re-evaluates the zones of the server.
    ///
    /// # Errors
    ///
    /// Same as [`ZoneLifecycle::sync_presence`].
    pub async fn apply<I, S>(mut self, online: I) -> Result<(), ZoneError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let inner = self.lifecycle.inner.clone();
        inner.presence.apply_snapshot(&self.server, self.since, online);
        self.settled = true;
        inner.player_changed(&self.server, None).await?;
        Ok(())
    }
}

impl Drop for PresenceSync {
    fn drop(&mut self) {
        if !self.settled {
            self.lifecycle.inner.presence.abandon_snapshot(&self.server);
        }
    }
}

#[async_trait]
impl EventHandler for ZoneLifecycle {
    fn name(&self) -> &str {
        &self.inner.name
    }

    async fn handle(&self, server: &ServerId, event: &InboundEvent) -> Result<(), HandlerError> {
        let player = match event {
            InboundEvent::PlayerJoined { name } => {
                self.inner.presence.join(server, name);
                name
            }
            InboundEvent::PlayerLeft { name } => {
                self.inner.presence.leave(server, name);
                name
            }
            _ => return Ok(()),
        };
        self.inner.player_changed(server, Some(player)).await?;
        Ok(())
    }
}
