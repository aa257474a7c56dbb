//! Zone registry, timers and transitions.
//!
//! Every live zone sits in its own slot behind an async mutex; all reads and
//! writes of a zone, its storage record and its timer happen while holding
//! that slot. A slot owns at most one armed timer. Arming bumps the slot's
//! generation, and a timer whose generation no longer matches when it wakes
//! does nothing.
//!
//! Transitions queue their feed post and in-game command on the slot; they
//! are sent once the slot is released, so a slow server never holds a zone.

use crate::config::ZoneConfig;
use crate::machine::{next_wakeup, Reason, Wakeup};
use crate::presence::Presence;
use crate::ZoneError;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};
use warden_event_system::clock::duration_between;
use warden_event_system::{
    Clock, CommandSender, FeedChannel, NotificationSink, ServerId, Storage, StorageError, Zone,
    ZoneId, ZoneState,
};

struct ArmedTimer {
    generation: u64,
    wakeup: Wakeup,
    handle: JoinHandle<()>,
}

/// Feed post and optional command produced by one transition.
struct Announcement {
    server: ServerId,
    zone_id: ZoneId,
    message: String,
    command: Option<String>,
}

pub(crate) struct ZoneSlot {
    pub(crate) zone: Zone,
    generation: u64,
    timer: Option<ArmedTimer>,
    outbox: Vec<Announcement>,
}

impl ZoneSlot {
    fn new(zone: Zone) -> Self {
        Self {
            zone,
            generation: 0,
            timer: None,
            outbox: Vec::new(),
        }
    }

    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.handle.abort();
        }
    }
}

type SharedSlot = Arc<Mutex<ZoneSlot>>;

/// Registry entry; the server never changes, so it is readable without the slot lock.
struct Registered {
    server: ServerId,
    slot: SharedSlot,
}

pub(crate) struct Inner {
    pub(crate) name: String,
    storage: Arc<dyn Storage>,
    commands: Arc<dyn CommandSender>,
    notifier: Arc<dyn NotificationSink>,
    clock: Arc<dyn Clock>,
    default_config: Arc<ZoneConfig>,
    server_configs: DashMap<ServerId, Arc<ZoneConfig>>,
    zones: DashMap<ZoneId, Registered>,
    pub(crate) presence: Presence,
    /// Serializes zone creation so ids stay unique
    admin: Mutex<()>,
    timers_armed: AtomicU64,
    stopped: AtomicBool,
}

impl Inner {
    pub(crate) fn new(
        storage: Arc<dyn Storage>,
        commands: Arc<dyn CommandSender>,
        notifier: Arc<dyn NotificationSink>,
        clock: Arc<dyn Clock>,
        default_config: ZoneConfig,
    ) -> Self {
        Self {
            name: "zones".to_string(),
            storage,
            commands,
            notifier,
            clock,
            default_config: Arc::new(default_config),
            server_configs: DashMap::new(),
            zones: DashMap::new(),
            presence: Presence::new(),
            admin: Mutex::new(()),
            timers_armed: AtomicU64::new(0),
            stopped: AtomicBool::new(false),
        }
    }

    pub(crate) fn configure_server(&self, server: ServerId, config: ZoneConfig) {
        self.server_configs.insert(server, Arc::new(config));
    }

    pub(crate) fn config_for(&self, server: &ServerId) -> Arc<ZoneConfig> {
        self.server_configs
            .get(server)
            .map(|config| config.clone())
            .unwrap_or_else(|| self.default_config.clone())
    }

    pub(crate) fn timers_armed(&self) -> u64 {
        self.timers_armed.load(Ordering::SeqCst)
    }

    fn slot(&self, zone_id: &ZoneId) -> Option<SharedSlot> {
        self.zones.get(zone_id).map(|entry| entry.slot.clone())
    }

    /// Slots of `server`, ordered by zone id.
    fn slots_of(&self, server: &ServerId) -> Vec<SharedSlot> {
        let mut slots: Vec<(ZoneId, SharedSlot)> = self
            .zones
            .iter()
            .filter(|entry| entry.value().server == *server)
            .map(|entry| (entry.key().clone(), entry.value().slot.clone()))
            .collect();
        slots.sort_by(|a, b| a.0.cmp(&b.0));
        slots.into_iter().map(|(_, slot)| slot).collect()
    }

    fn register(&self, zone: Zone) -> SharedSlot {
        let slot: SharedSlot = Arc::new(Mutex::new(ZoneSlot::new(zone.clone())));
        self.zones.insert(
            zone.id,
            Registered {
                server: zone.server,
                slot: slot.clone(),
            },
        );
        slot
    }

    pub(crate) async fn zone(&self, zone_id: &ZoneId) -> Option<Zone> {
        let slot = self.slot(zone_id)?;
        let guard = slot.lock().await;
        Some(guard.zone.clone()).filter(|zone| zone.state != ZoneState::Deleted)
    }

    pub(crate) async fn pending_wakeup(&self, zone_id: &ZoneId) -> Option<Wakeup> {
        let slot = self.slot(zone_id)?;
        let guard = slot.lock().await;
        guard.timer.as_ref().map(|timer| timer.wakeup)
    }

    pub(crate) async fn zones_of(&self, server: &ServerId) -> Vec<Zone> {
        let mut zones = Vec::new();
        for slot in self.slots_of(server) {
            let guard = slot.lock().await;
            if guard.zone.state != ZoneState::Deleted {
                zones.push(guard.zone.clone());
            }
        }
        zones
    }

    // ------------------------------------------------------------------
    // Administrative operations
    // ------------------------------------------------------------------

    pub(crate) async fn create_zone(self: &Arc<Self>, zone: Zone) -> Result<(), ZoneError> {
        let admin = self.admin.lock().await;
        if self.zones.contains_key(&zone.id) {
            return Err(ZoneError::AlreadyExists(zone.id));
        }

        self.storage.upsert_zone(&zone).await?;
        info!(
            server = %zone.server,
            "🏕️ Zone {} created for {} ({} member(s), lifetime {:?})",
            zone.id,
            zone.owner,
            zone.members.len(),
            zone.lifetime
        );

        let slot = self.register(zone);
        let mut guard = slot.lock().await;
        self.catch_up(&mut guard).await;
        // The team may already be gone; the next join or leave retries a failure.
        if let Err(e) = self.evaluate(&mut guard).await {
            warn!(server = %guard.zone.server, "⚠️ Zone {} kept its state: {}", guard.zone.id, e);
        }
        drop(admin);
        self.release(guard).await;
        Ok(())
    }

    pub(crate) async fn delete_zone(&self, zone_id: &ZoneId) -> Result<Zone, ZoneError> {
        let slot = self
            .slot(zone_id)
            .ok_or_else(|| ZoneError::NotFound(zone_id.clone()))?;
        let mut guard = slot.lock().await;
        if guard.zone.state == ZoneState::Deleted {
            return Err(ZoneError::NotFound(zone_id.clone()));
        }
        let now = self.clock.now();
        self.apply(&mut guard, ZoneState::Deleted, now, Reason::AdminDelete)
            .await?;
        let zone = guard.zone.clone();
        self.release(guard).await;
        Ok(zone)
    }

    /// Loads the stored zones of `server`, applies every transition that came
    /// due while nobody was watching, and arms the rest.
    pub(crate) async fn rehydrate(self: &Arc<Self>, server: &ServerId) -> Result<usize, ZoneError> {
        let stored = self.storage.list_active_zones(server).await?;
        let mut restored = 0;
        for zone in stored {
            if zone.state == ZoneState::Deleted {
                continue;
            }
            let owner = self.zones.get(&zone.id).map(|entry| entry.server.clone());
            match owner {
                Some(owner) if owner == *server => {
                    debug!(server = %server, "🏕️ Zone {} already live, skipped", zone.id);
                    continue;
                }
                Some(owner) => {
                    warn!(
                        server = %server,
                        "⚠️ Stored zone {} skipped: the id is already live on {}",
                        zone.id,
                        owner
                    );
                    continue;
                }
                None => {}
            }
            let slot = self.register(zone);
            let mut guard = slot.lock().await;
            self.catch_up(&mut guard).await;
            if guard.zone.state != ZoneState::Deleted {
                restored += 1;
            }
            self.release(guard).await;
        }
        info!(server = %server, "🏕️ Rehydrated {} zone(s)", restored);
        Ok(restored)
    }

    // ------------------------------------------------------------------
    // Presence
    // ------------------------------------------------------------------

    /// Re-evaluates every zone of `server` whose team contains `player`.
    pub(crate) async fn player_changed(
        self: &Arc<Self>,
        server: &ServerId,
        player: Option<&str>,
    ) -> Result<(), StorageError> {
        let mut result = Ok(());
        for slot in self.slots_of(server) {
            let mut guard = slot.lock().await;
            if guard.zone.state == ZoneState::Deleted {
                continue;
            }
            if player.is_some_and(|player| !guard.zone.has_member(player)) {
                continue;
            }
            if let Err(e) = self.evaluate(&mut guard).await {
                warn!(server = %server, "⚠️ Zone {} kept its state: {}", guard.zone.id, e);
                result = Err(e);
            }
            self.release(guard).await;
        }
        result
    }

    /// Moves a zone between green and yellow/red when the team's aggregate
    /// presence disagrees with its state.
    async fn evaluate(self: &Arc<Self>, slot: &mut ZoneSlot) -> Result<(), StorageError> {
        let now = self.clock.now();
        let config = self.config_for(&slot.zone.server);
        if next_wakeup(&slot.zone, &config).is_some_and(|wakeup| wakeup.at <= now) {
            // A timer is due but has not run yet.
            self.catch_up(slot).await;
        }
        let Some(was_online) = slot.zone.state.team_online() else {
            return Ok(());
        };

        let online = self.presence.any_online(&slot.zone.server, slot.zone.team());
        if online == was_online {
            trace!("Zone {} unchanged, team online: {}", slot.zone.id, online);
            return Ok(());
        }

        let (target, reason) = if online {
            (ZoneState::Green, Reason::TeamReturned)
        } else {
            (ZoneState::Yellow, Reason::TeamOffline)
        };
        self.apply(slot, target, now, reason).await?;
        self.catch_up(slot).await;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Timers
    // ------------------------------------------------------------------

    /// Applies every wakeup already due, then arms the next one. A failed
    /// write arms a retry of the same wakeup instead.
    async fn catch_up(self: &Arc<Self>, slot: &mut ZoneSlot) {
        let config = self.config_for(&slot.zone.server);
        loop {
            let Some(wakeup) = next_wakeup(&slot.zone, &config) else {
                return;
            };
            let now = self.clock.now();
            if wakeup.at > now {
                self.arm(slot, wakeup, duration_between(now, wakeup.at));
                return;
            }
            // Stamped with the deadline so chained deadlines keep their schedule.
            if let Err(e) = self
                .apply(slot, wakeup.target(), wakeup.at, wakeup.cause.into())
                .await
            {
                warn!(
                    server = %slot.zone.server,
                    "⚠️ Zone {} could not become {}: {} (retrying in {:?})",
                    slot.zone.id,
                    wakeup.target(),
                    e,
                    config.retry_delay
                );
                self.arm(slot, wakeup, config.retry_delay);
                return;
            }
        }
    }

    fn arm(self: &Arc<Self>, slot: &mut ZoneSlot, wakeup: Wakeup, delay: Duration) {
        slot.cancel_timer();
        if self.stopped.load(Ordering::SeqCst) {
            return;
        }
        slot.generation += 1;
        let generation = slot.generation;
        let zone_id = slot.zone.id.clone();
        let lifecycle: Weak<Self> = Arc::downgrade(self);

        debug!(
            "⏲️ Zone {} waits {:?} for {:?} (generation {})",
            zone_id, delay, wakeup.cause, generation
        );
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(lifecycle) = lifecycle.upgrade() {
                lifecycle.fire(zone_id, generation).await;
            }
        });
        slot.timer = Some(ArmedTimer {
            generation,
            wakeup,
            handle,
        });
        self.timers_armed.fetch_add(1, Ordering::SeqCst);
    }

    fn fire(self: Arc<Self>, zone_id: ZoneId, generation: u64) -> BoxFuture<'static, ()> {
        async move {
            let Some(slot) = self.slot(&zone_id) else {
                return;
            };
            let mut guard = slot.lock().await;
            if guard.timer.as_ref().map(|timer| timer.generation) != Some(generation) {
                trace!("Zone {} timer generation {} superseded", zone_id, generation);
                return;
            }
            // This task is the timer; detach instead of aborting it.
            guard.timer = None;
            self.catch_up(&mut guard).await;
            self.release(guard).await;
        }
        .boxed()
    }

    pub(crate) async fn shutdown(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        let slots: Vec<SharedSlot> = self.zones.iter().map(|entry| entry.slot.clone()).collect();
        for slot in slots {
            slot.lock().await.cancel_timer();
        }
        info!("🏕️ Zone timers cancelled");
    }

    // ------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------

    /// Persists `target` first; on failure the slot is left untouched.
    async fn apply(
        &self,
        slot: &mut ZoneSlot,
        target: ZoneState,
        at: DateTime<Utc>,
        reason: Reason,
    ) -> Result<(), StorageError> {
        let from = slot.zone.state;
        if target == ZoneState::Deleted {
            self.storage.delete_zone(&slot.zone.id).await?;
            slot.cancel_timer();
            self.zones.remove(&slot.zone.id);
        } else {
            let mut next = slot.zone.clone();
            next.state = target;
            next.last_transition = at;
            self.storage.upsert_zone(&next).await?;
        }
        slot.zone.state = target;
        slot.zone.last_transition = at;

        info!(
            server = %slot.zone.server,
            "🏕️ Zone {} of {}: {} -> {} ({})",
            slot.zone.id, slot.zone.owner, from, target, reason
        );
        let announcement = self.announcement(&slot.zone, from, reason);
        slot.outbox.push(announcement);
        Ok(())
    }

    fn announcement(&self, zone: &Zone, from: ZoneState, reason: Reason) -> Announcement {
        let message = match zone.state {
            ZoneState::Deleted => format!("Zone {} of {} was deleted: {}", zone.id, zone.owner, reason),
            state => format!(
                "Zone {} of {} is now {} (was {}): {}",
                zone.id, zone.owner, state, from, reason
            ),
        };
        Announcement {
            server: zone.server.clone(),
            zone_id: zone.id.clone(),
            message,
            command: self.config_for(&zone.server).commands.render(zone.state, zone),
        }
    }

    /// Unlocks the slot, then sends what its transitions queued.
    async fn release(&self, mut guard: MutexGuard<'_, ZoneSlot>) {
        let outbox = std::mem::take(&mut guard.outbox);
        drop(guard);
        for announcement in outbox {
            self.announce(announcement).await;
        }
    }

    /// Zone feed post and in-game command; both are best effort.
    async fn announce(&self, announcement: Announcement) {
        let Announcement {
            server,
            zone_id,
            message,
            command,
        } = announcement;
        if let Err(e) = self
            .notifier
            .notify_channel(&server, FeedChannel::Zones, &message)
            .await
        {
            warn!(server = %server, "⚠️ Zone feed post failed: {}", e);
        }
        if let Some(command) = command {
            if let Err(e) = self.commands.send_command(&server, &command).await {
                warn!(server = %server, "⚠️ Zone {} command failed: {}", zone_id, e);
            }
        }
    }
}

impl std::fmt::Debug for Inner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZoneLifecycle")
            .field("name", &self.name)
            .field("zones", &self.zones.len())
            .field("timers_armed", &self.timers_armed())
            .field("clock", &self.clock)
            .finish()
    }
}
