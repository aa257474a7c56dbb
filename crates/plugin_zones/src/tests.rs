//! Zone lifecycle scenarios on paused time.

use super::*;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::time::Duration;
use warden_event_system::testing::{FaultyStorage, RecordingCommands, RecordingNotifier};
use warden_event_system::{FeedChannel, MemoryStorage, StorageError, TokioClock, ZoneState};

const SECOND: Duration = Duration::from_secs(1);
const MINUTE: Duration = Duration::from_secs(60);
const HOUR: Duration = Duration::from_secs(3600);

fn server() -> ServerId {
    ServerId::new("acme", "eu")
}

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

fn minutes(n: i64) -> DateTime<Utc> {
    start() + chrono::Duration::minutes(n)
}

fn config() -> ZoneConfig {
    ZoneConfig {
        offline_delay: 5 * MINUTE,
        offline_protection: 30 * MINUTE,
        retry_delay: 30 * SECOND,
        commands: ZoneCommands::default(),
    }
}

fn carl_base(lifetime: Duration) -> Zone {
    Zone::new(ZoneId::new("carl-base"), "Carl", server(), start(), lifetime)
}

fn joined(name: &str) -> InboundEvent {
    InboundEvent::PlayerJoined {
        name: name.to_string(),
    }
}

fn left(name: &str) -> InboundEvent {
    InboundEvent::PlayerLeft {
        name: name.to_string(),
    }
}

struct Harness {
    commands: Arc<RecordingCommands>,
    notifier: Arc<RecordingNotifier>,
    zones: ZoneLifecycle,
}

fn harness(storage: Arc<dyn Storage>) -> Harness {
    let commands = Arc::new(RecordingCommands::new());
    let notifier = Arc::new(RecordingNotifier::new());
    let zones = ZoneLifecycle::new(
        storage,
        commands.clone(),
        notifier.clone(),
        Arc::new(TokioClock::starting_at(start())),
        ZoneConfig::default(),
    );
    zones.configure_server(server(), config());
    Harness {
        commands,
        notifier,
        zones,
    }
}

async fn state_of(zones: &ZoneLifecycle) -> Option<(ZoneState, DateTime<Utc>)> {
    zones
        .zone(&ZoneId::new("carl-base"))
        .await
        .map(|zone| (zone.state, zone.last_transition))
}

#[tokio::test(start_paused = true)]
async fn test_carl_goes_yellow_red_then_deleted() {
    let storage = Arc::new(MemoryStorage::new());
    let h = harness(storage.clone());
    let id = ZoneId::new("carl-base");
    h.zones.handle(&server(), &joined("Carl")).await.unwrap();
    h.zones.create_zone(carl_base(35 * HOUR)).await.unwrap();

    h.zones.handle(&server(), &left("Carl")).await.unwrap();
    assert_eq!(state_of(&h.zones).await, Some((ZoneState::Yellow, start())));
    assert_eq!(storage.zone(&id).unwrap().state, ZoneState::Yellow);

    tokio::time::sleep(5 * MINUTE + SECOND).await;
    assert_eq!(state_of(&h.zones).await, Some((ZoneState::Red, minutes(5))));
    assert_eq!(
        h.zones.pending_wakeup(&id).await,
        Some(Wakeup {
            at: minutes(35),
            cause: WakeCause::OfflineProtection
        })
    );

    tokio::time::sleep(30 * MINUTE).await;
    assert_eq!(state_of(&h.zones).await, None);
    assert!(storage.zone(&id).is_none());

    assert_eq!(
        h.notifier.channel_messages(FeedChannel::Zones),
        vec![
            "Zone carl-base of Carl is now yellow (was green): team went offline",
            "Zone carl-base of Carl is now red (was yellow): offline delay elapsed",
            "Zone carl-base of Carl was deleted: offline protection elapsed",
        ]
    );
    assert_eq!(
        h.commands.commands(),
        vec![
            "zones.setcolor \"carl-base\" yellow",
            "zones.setcolor \"carl-base\" red",
            "zones.erase \"carl-base\"",
        ]
    );
    assert!(h.commands.sent().iter().all(|(to, _)| *to == server()));
}

#[tokio::test(start_paused = true)]
async fn test_zone_created_while_team_offline_counts_down() {
    let storage = Arc::new(MemoryStorage::new());
    let h = harness(storage.clone());
    let id = ZoneId::new("carl-base");
    h.zones.sync_presence(&server(), ["Eve"]).await.unwrap();

    h.zones.create_zone(carl_base(35 * HOUR)).await.unwrap();
    assert_eq!(state_of(&h.zones).await, Some((ZoneState::Yellow, start())));
    assert_eq!(storage.zone(&id).unwrap().state, ZoneState::Yellow);
    assert_eq!(
        h.zones.pending_wakeup(&id).await,
        Some(Wakeup {
            at: minutes(5),
            cause: WakeCause::OfflineDelay
        })
    );

    tokio::time::sleep(3 * HOUR).await;
    assert_eq!(state_of(&h.zones).await, None);
    assert_eq!(
        h.notifier.channel_messages(FeedChannel::Zones),
        vec![
            "Zone carl-base of Carl is now yellow (was green): team went offline",
            "Zone carl-base of Carl is now red (was yellow): offline delay elapsed",
            "Zone carl-base of Carl was deleted: offline protection elapsed",
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_zone_created_while_team_online_stays_green() {
    let h = harness(Arc::new(MemoryStorage::new()));
    h.zones.sync_presence(&server(), ["Carl"]).await.unwrap();

    h.zones.create_zone(carl_base(35 * HOUR)).await.unwrap();

    assert_eq!(state_of(&h.zones).await, Some((ZoneState::Green, start())));
    assert!(h.notifier.channel_messages(FeedChannel::Zones).is_empty());
    assert_eq!(
        h.zones
            .pending_wakeup(&ZoneId::new("carl-base"))
            .await
            .map(|wakeup| wakeup.cause),
        Some(WakeCause::Lifetime)
    );
}

#[tokio::test(start_paused = true)]
async fn test_leave_during_presence_sync_is_not_undone() {
    let h = harness(Arc::new(MemoryStorage::new()));
    h.zones.handle(&server(), &joined("Carl")).await.unwrap();
    h.zones.create_zone(carl_base(35 * HOUR)).await.unwrap();

    // The player list is requested while Carl is still online, and Carl
    // leaves before the answer arrives.
    let sync = h.zones.begin_presence_sync(&server());
    h.zones.handle(&server(), &left("Carl")).await.unwrap();
    assert_eq!(state_of(&h.zones).await, Some((ZoneState::Yellow, start())));

    sync.apply(["Carl", "Dana"]).await.unwrap();
    assert_eq!(state_of(&h.zones).await, Some((ZoneState::Yellow, start())));
    assert_eq!(h.zones.presence().online(&server()), vec!["Dana"]);

    tokio::time::sleep(5 * MINUTE + SECOND).await;
    assert_eq!(state_of(&h.zones).await, Some((ZoneState::Red, minutes(5))));
}

/// Command sender that checks whether the zone is readable while a zone
/// command is being sent.
#[derive(Default)]
struct ZoneReadingCommands {
    zones: std::sync::OnceLock<ZoneLifecycle>,
    readable: std::sync::Mutex<Vec<bool>>,
}

#[async_trait]
impl CommandSender for ZoneReadingCommands {
    async fn send_command(
        &self,
        _server: &ServerId,
        _command: &str,
    ) -> Result<String, warden_event_system::CommandError> {
        if let Some(zones) = self.zones.get() {
            let read = tokio::time::timeout(SECOND, zones.zone(&ZoneId::new("carl-base"))).await;
            self.readable.lock().unwrap().push(read.is_ok());
        }
        Ok(String::new())
    }
}

#[tokio::test(start_paused = true)]
async fn test_zone_commands_are_sent_after_the_zone_is_released() {
    let commands = Arc::new(ZoneReadingCommands::default());
    let zones = ZoneLifecycle::new(
        Arc::new(MemoryStorage::new()),
        commands.clone(),
        Arc::new(RecordingNotifier::new()),
        Arc::new(TokioClock::starting_at(start())),
        config(),
    );
    assert!(commands.zones.set(zones.clone()).is_ok());

    zones.handle(&server(), &joined("Carl")).await.unwrap();
    zones.create_zone(carl_base(35 * HOUR)).await.unwrap();
    zones.handle(&server(), &left("Carl")).await.unwrap();
    tokio::time::sleep(5 * MINUTE + SECOND).await;
    zones.delete_zone(&ZoneId::new("carl-base")).await.unwrap();

    // Yellow, red and the erase, each sent with the zone unlocked.
    assert_eq!(*commands.readable.lock().unwrap(), vec![true, true, true]);
}

#[tokio::test(start_paused = true)]
async fn test_rejoin_during_grace_returns_to_green() {
    let h = harness(Arc::new(MemoryStorage::new()));
    let id = ZoneId::new("carl-base");
    h.zones.handle(&server(), &joined("Carl")).await.unwrap();
    h.zones.create_zone(carl_base(35 * HOUR)).await.unwrap();

    h.zones.handle(&server(), &left("Carl")).await.unwrap();
    tokio::time::sleep(3 * MINUTE).await;
    h.zones.handle(&server(), &joined("Carl")).await.unwrap();

    assert_eq!(state_of(&h.zones).await, Some((ZoneState::Green, minutes(3))));
    // Back in green only the lifetime ceiling is pending.
    assert_eq!(
        h.zones.pending_wakeup(&id).await.map(|wakeup| wakeup.cause),
        Some(WakeCause::Lifetime)
    );

    tokio::time::sleep(40 * MINUTE).await;
    assert_eq!(state_of(&h.zones).await, Some((ZoneState::Green, minutes(3))));
    assert_eq!(h.commands.count_matching("zones.erase"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_return_from_red_cancels_deletion() {
    let h = harness(Arc::new(MemoryStorage::new()));
    h.zones.create_zone(carl_base(35 * HOUR)).await.unwrap();
    h.zones.sync_presence(&server(), Vec::<String>::new()).await.unwrap();

    tokio::time::sleep(20 * MINUTE).await;
    assert_eq!(state_of(&h.zones).await, Some((ZoneState::Red, minutes(5))));

    h.zones.handle(&server(), &joined("Carl")).await.unwrap();
    tokio::time::sleep(HOUR).await;
    assert_eq!(state_of(&h.zones).await, Some((ZoneState::Green, minutes(20))));
}

#[tokio::test(start_paused = true)]
async fn test_repeated_leaves_arm_no_timers() {
    let h = harness(Arc::new(MemoryStorage::new()));
    h.zones.handle(&server(), &joined("Carl")).await.unwrap();
    h.zones.create_zone(carl_base(35 * HOUR)).await.unwrap();
    h.zones.handle(&server(), &left("Carl")).await.unwrap();
    let armed = h.zones.timers_armed();

    for _ in 0..3 {
        h.zones.handle(&server(), &left("Carl")).await.unwrap();
    }
    h.zones.handle(&server(), &joined("Eve")).await.unwrap();
    h.zones.handle(&server(), &left("Eve")).await.unwrap();

    assert_eq!(h.zones.timers_armed(), armed);
    assert_eq!(state_of(&h.zones).await, Some((ZoneState::Yellow, start())));
    assert_eq!(h.notifier.channel_messages(FeedChannel::Zones).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_team_member_keeps_zone_green() {
    let h = harness(Arc::new(MemoryStorage::new()));
    h.zones.sync_presence(&server(), ["Carl", "Dana"]).await.unwrap();
    h.zones
        .create_zone(carl_base(35 * HOUR).with_members(["Dana"]))
        .await
        .unwrap();

    h.zones.handle(&server(), &left("Carl")).await.unwrap();
    assert_eq!(state_of(&h.zones).await.unwrap().0, ZoneState::Green);

    h.zones.handle(&server(), &left("Dana")).await.unwrap();
    assert_eq!(state_of(&h.zones).await.unwrap().0, ZoneState::Yellow);

    // Only the owner's or a member's presence counts, and only on this server.
    h.zones
        .handle(&ServerId::new("acme", "us"), &joined("Dana"))
        .await
        .unwrap();
    assert_eq!(state_of(&h.zones).await.unwrap().0, ZoneState::Yellow);
    h.zones.handle(&server(), &joined("Dana")).await.unwrap();
    assert_eq!(state_of(&h.zones).await.unwrap().0, ZoneState::Green);
}

#[tokio::test(start_paused = true)]
async fn test_lifetime_is_a_hard_ceiling() {
    let h = harness(Arc::new(MemoryStorage::new()));
    h.zones.handle(&server(), &joined("Carl")).await.unwrap();
    h.zones.create_zone(carl_base(20 * MINUTE)).await.unwrap();

    tokio::time::sleep(20 * MINUTE + SECOND).await;
    assert_eq!(state_of(&h.zones).await, None);

    // Protection that would outlive the zone is cut short too.
    h.zones
        .create_zone(Zone::new(
            ZoneId::new("short"),
            "Dana",
            server(),
            minutes(20),
            15 * MINUTE,
        ))
        .await
        .unwrap();
    h.zones.sync_presence(&server(), ["Carl"]).await.unwrap();
    assert_eq!(
        h.zones.pending_wakeup(&ZoneId::new("short")).await,
        Some(Wakeup {
            at: minutes(25) + chrono::Duration::seconds(1),
            cause: WakeCause::OfflineDelay
        })
    );
    tokio::time::sleep(15 * MINUTE).await;
    assert!(h.zones.zone(&ZoneId::new("short")).await.is_none());
    assert_eq!(
        h.notifier.channel_messages(FeedChannel::Zones).last().unwrap(),
        "Zone short of Dana was deleted: lifetime expired"
    );
}

#[tokio::test(start_paused = true)]
async fn test_rehydrate_replays_missed_deadlines() {
    let storage = Arc::new(MemoryStorage::new());

    // Went yellow ten minutes before the restart: red at -5 min.
    let mut yellow = Zone::new(
        ZoneId::new("yellow-base"),
        "Carl",
        server(),
        start() - chrono::Duration::hours(1),
        35 * HOUR,
    );
    yellow.state = ZoneState::Yellow;
    yellow.last_transition = minutes(-10);
    // Lifetime ran out during the downtime.
    let expired = Zone::new(
        ZoneId::new("old-base"),
        "Dana",
        server(),
        start() - chrono::Duration::hours(36),
        35 * HOUR,
    );
    // Yellow long enough to pass both delay and protection.
    let mut abandoned = Zone::new(
        ZoneId::new("abandoned"),
        "Eve",
        server(),
        start() - chrono::Duration::hours(2),
        35 * HOUR,
    );
    abandoned.state = ZoneState::Yellow;
    abandoned.last_transition = minutes(-40);
    let green = Zone::new(ZoneId::new("green-base"), "Finn", server(), minutes(-30), 35 * HOUR);
    for zone in [&yellow, &expired, &abandoned, &green] {
        storage.upsert_zone(zone).await.unwrap();
    }

    let h = harness(storage.clone());
    assert_eq!(h.zones.rehydrate(&server()).await.unwrap(), 2);

    let restored = h.zones.zone(&ZoneId::new("yellow-base")).await.unwrap();
    assert_eq!(restored.state, ZoneState::Red);
    assert_eq!(restored.last_transition, minutes(-5));
    assert_eq!(
        h.zones.pending_wakeup(&ZoneId::new("yellow-base")).await,
        Some(Wakeup {
            at: minutes(25),
            cause: WakeCause::OfflineProtection
        })
    );
    assert!(storage.zone(&ZoneId::new("old-base")).is_none());
    assert!(storage.zone(&ZoneId::new("abandoned")).is_none());
    assert_eq!(
        h.zones.zone(&ZoneId::new("green-base")).await.unwrap().state,
        ZoneState::Green
    );

    let feed = h.notifier.channel_messages(FeedChannel::Zones);
    assert!(feed.contains(&"Zone abandoned of Eve is now red (was yellow): offline delay elapsed".to_string()));
    assert!(feed.contains(&"Zone abandoned of Eve was deleted: offline protection elapsed".to_string()));
    assert!(feed.contains(&"Zone old-base of Dana was deleted: lifetime expired".to_string()));

    // Rehydrating twice does not duplicate zones.
    assert_eq!(h.zones.rehydrate(&server()).await.unwrap(), 0);
    assert_eq!(h.zones.zones(&server()).await.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_rehydrate_skips_id_live_on_another_server() {
    let storage = Arc::new(MemoryStorage::new());
    let us = ServerId::new("acme", "us");
    let h = harness(storage.clone());
    h.zones.handle(&server(), &joined("Carl")).await.unwrap();
    h.zones.create_zone(carl_base(35 * HOUR)).await.unwrap();

    let clash = Zone::new(ZoneId::new("carl-base"), "Dana", us.clone(), start(), 35 * HOUR);
    storage.upsert_zone(&clash).await.unwrap();

    assert_eq!(h.zones.rehydrate(&us).await.unwrap(), 0);
    assert!(h.zones.zones(&us).await.is_empty());
    let live = h.zones.zone(&ZoneId::new("carl-base")).await.unwrap();
    assert_eq!(live.server, server());
    assert_eq!(live.owner, "Carl");
}

#[tokio::test(start_paused = true)]
async fn test_failed_timed_transition_is_retried() {
    let storage = Arc::new(FaultyStorage::new());
    let h = harness(storage.clone());
    let id = ZoneId::new("carl-base");
    h.zones.create_zone(carl_base(35 * HOUR)).await.unwrap();
    h.zones.sync_presence(&server(), Vec::<String>::new()).await.unwrap();

    storage.fail_writes(true);
    tokio::time::sleep(5 * MINUTE + SECOND).await;
    assert_eq!(state_of(&h.zones).await, Some((ZoneState::Yellow, start())));
    assert_eq!(storage.memory().zone(&id).unwrap().state, ZoneState::Yellow);
    assert_eq!(
        h.zones.pending_wakeup(&id).await.map(|wakeup| wakeup.cause),
        Some(WakeCause::OfflineDelay)
    );

    storage.fail_writes(false);
    tokio::time::sleep(30 * SECOND).await;
    assert_eq!(state_of(&h.zones).await, Some((ZoneState::Red, minutes(5))));
}

#[tokio::test(start_paused = true)]
async fn test_failed_event_transition_keeps_state() {
    let storage = Arc::new(FaultyStorage::new());
    let h = harness(storage.clone());
    h.zones.handle(&server(), &joined("Carl")).await.unwrap();
    h.zones.create_zone(carl_base(35 * HOUR)).await.unwrap();
    let armed = h.zones.timers_armed();

    storage.fail_writes(true);
    let result = h.zones.handle(&server(), &left("Carl")).await;
    assert!(matches!(
        result,
        Err(HandlerError::Storage(StorageError::Backend(_)))
    ));
    assert_eq!(state_of(&h.zones).await, Some((ZoneState::Green, start())));
    assert_eq!(h.zones.timers_armed(), armed);
    assert!(h.notifier.channel_messages(FeedChannel::Zones).is_empty());

    // The next event still sees the team offline and retries.
    storage.fail_writes(false);
    tokio::time::sleep(MINUTE).await;
    h.zones.handle(&server(), &left("Carl")).await.unwrap();
    assert_eq!(state_of(&h.zones).await, Some((ZoneState::Yellow, minutes(1))));
}

#[tokio::test(start_paused = true)]
async fn test_admin_delete_and_duplicates() {
    let storage = Arc::new(MemoryStorage::new());
    let h = harness(storage.clone());
    let id = ZoneId::new("carl-base");
    h.zones.handle(&server(), &joined("Carl")).await.unwrap();
    h.zones.create_zone(carl_base(35 * HOUR)).await.unwrap();

    assert!(matches!(
        h.zones.create_zone(carl_base(HOUR)).await,
        Err(ZoneError::AlreadyExists(_))
    ));

    let deleted = h.zones.delete_zone(&id).await.unwrap();
    assert_eq!(deleted.state, ZoneState::Deleted);
    assert!(storage.zone(&id).is_none());
    assert!(h.zones.zone(&id).await.is_none());
    assert!(matches!(
        h.zones.delete_zone(&id).await,
        Err(ZoneError::NotFound(_))
    ));
    assert_eq!(
        h.notifier.channel_messages(FeedChannel::Zones),
        vec!["Zone carl-base of Carl was deleted: deleted by an administrator"]
    );

    // Nothing fires for the deleted zone, and its id can be reused.
    tokio::time::sleep(36 * HOUR).await;
    assert_eq!(h.notifier.channel_messages(FeedChannel::Zones).len(), 1);
    h.zones.create_zone(carl_base(36 * HOUR)).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_sync_presence_moves_zones() {
    let h = harness(Arc::new(MemoryStorage::new()));
    h.zones.create_zone(carl_base(35 * HOUR)).await.unwrap();

    h.zones.sync_presence(&server(), ["Eve"]).await.unwrap();
    assert_eq!(state_of(&h.zones).await.unwrap().0, ZoneState::Yellow);
    assert_eq!(h.zones.presence().online(&server()), vec!["Eve"]);

    h.zones.sync_presence(&server(), ["Eve", "Carl"]).await.unwrap();
    assert_eq!(state_of(&h.zones).await.unwrap().0, ZoneState::Green);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_cancels_timers() {
    let h = harness(Arc::new(MemoryStorage::new()));
    h.zones.create_zone(carl_base(35 * HOUR)).await.unwrap();
    h.zones.sync_presence(&server(), Vec::<String>::new()).await.unwrap();

    h.zones.shutdown().await;
    tokio::time::sleep(HOUR).await;

    assert_eq!(state_of(&h.zones).await, Some((ZoneState::Yellow, start())));
    assert_eq!(h.zones.pending_wakeup(&ZoneId::new("carl-base")).await, None);
}

#[tokio::test(start_paused = true)]
async fn test_other_events_are_ignored() {
    let h = harness(Arc::new(MemoryStorage::new()));
    h.zones.handle(&server(), &joined("Carl")).await.unwrap();
    h.zones.create_zone(carl_base(35 * HOUR)).await.unwrap();
    let armed = h.zones.timers_armed();

    h.zones
        .handle(
            &server(),
            &InboundEvent::Kill {
                killer: "Eve".to_string(),
                victim: "Carl".to_string(),
            },
        )
        .await
        .unwrap();

    assert_eq!(h.zones.timers_armed(), armed);
    assert_eq!(state_of(&h.zones).await.unwrap().0, ZoneState::Green);
}
