//! Pure transition rules: which deadline a zone waits for next and what it
//! turns into when that deadline passes.
//!
//! A zone waits on exactly one deadline, the earlier of its state deadline
//! and its lifetime ceiling. `Green` has no state deadline, so a green zone
//! only ever waits for its lifetime.

use crate::config::ZoneConfig;
use chrono::{DateTime, Utc};
use std::fmt;
use warden_event_system::clock::add_duration;
use warden_event_system::{Zone, ZoneState};

/// Deadline that ends a zone's current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeCause {
    /// `Yellow` grace delay, leads to `Red`
    OfflineDelay,
    /// `Red` protection window, leads to deletion
    OfflineProtection,
    /// `created_at + lifetime`, deletes from any state
    Lifetime,
}

/// The next timed transition of a zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Wakeup {
    pub at: DateTime<Utc>,
    pub cause: WakeCause,
}

impl Wakeup {
    /// State the zone enters when the wakeup fires.
    pub fn target(&self) -> ZoneState {
        match self.cause {
            WakeCause::OfflineDelay => ZoneState::Red,
            WakeCause::OfflineProtection | WakeCause::Lifetime => ZoneState::Deleted,
        }
    }
}

/// Why a zone changed state; shown in logs and the zone feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reason {
    TeamOffline,
    TeamReturned,
    OfflineDelayElapsed,
    ProtectionElapsed,
    LifetimeExpired,
    AdminDelete,
}

impl From<WakeCause> for Reason {
    fn from(cause: WakeCause) -> Self {
        match cause {
            WakeCause::OfflineDelay => Reason::OfflineDelayElapsed,
            WakeCause::OfflineProtection => Reason::ProtectionElapsed,
            WakeCause::Lifetime => Reason::LifetimeExpired,
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Reason::TeamOffline => "team went offline",
            Reason::TeamReturned => "team member returned",
            Reason::OfflineDelayElapsed => "offline delay elapsed",
            Reason::ProtectionElapsed => "offline protection elapsed",
            Reason::LifetimeExpired => "lifetime expired",
            Reason::AdminDelete => "deleted by an administrator",
        };
        f.write_str(text)
    }
}

/// The wakeup `zone` waits for under `config`, `None` once deleted.
pub fn next_wakeup(zone: &Zone, config: &ZoneConfig) -> Option<Wakeup> {
    let lifetime = Wakeup {
        at: zone.expires_at(),
        cause: WakeCause::Lifetime,
    };
    let state_deadline = match zone.state {
        ZoneState::Green => None,
        ZoneState::Yellow => Some(Wakeup {
            at: add_duration(zone.last_transition, config.offline_delay),
            cause: WakeCause::OfflineDelay,
        }),
        ZoneState::Red => Some(Wakeup {
            at: add_duration(zone.last_transition, config.offline_protection),
            cause: WakeCause::OfflineProtection,
        }),
        ZoneState::Deleted => return None,
    };
    // The lifetime ceiling wins ties.
    match state_deadline {
        Some(wakeup) if wakeup.at < lifetime.at => Some(wakeup),
        _ => Some(lifetime),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::time::Duration;
    use warden_event_system::{ServerId, ZoneId};

    const MINUTE: Duration = Duration::from_secs(60);

    fn created() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn zone(state: ZoneState, since_minutes: i64, lifetime: Duration) -> Zone {
        let mut zone = Zone::new(
            ZoneId::new("carl-base"),
            "Carl",
            ServerId::new("acme", "eu"),
            created(),
            lifetime,
        );
        zone.state = state;
        zone.last_transition = created() + chrono::Duration::minutes(since_minutes);
        zone
    }

    fn config() -> ZoneConfig {
        ZoneConfig {
            offline_delay: 5 * MINUTE,
            offline_protection: 30 * MINUTE,
            ..ZoneConfig::default()
        }
    }

    #[test]
    fn test_green_waits_only_for_lifetime() {
        let wakeup = next_wakeup(&zone(ZoneState::Green, 0, 35 * 60 * MINUTE), &config()).unwrap();

        assert_eq!(wakeup.cause, WakeCause::Lifetime);
        assert_eq!(wakeup.at, created() + chrono::Duration::hours(35));
        assert_eq!(wakeup.target(), ZoneState::Deleted);
    }

    #[test]
    fn test_state_deadlines_run_from_last_transition() {
        let yellow = next_wakeup(&zone(ZoneState::Yellow, 10, 35 * 60 * MINUTE), &config()).unwrap();
        assert_eq!(yellow.cause, WakeCause::OfflineDelay);
        assert_eq!(yellow.at, created() + chrono::Duration::minutes(15));
        assert_eq!(yellow.target(), ZoneState::Red);

        let red = next_wakeup(&zone(ZoneState::Red, 15, 35 * 60 * MINUTE), &config()).unwrap();
        assert_eq!(red.cause, WakeCause::OfflineProtection);
        assert_eq!(red.at, created() + chrono::Duration::minutes(45));
    }

    #[test]
    fn test_lifetime_preempts_state_deadline() {
        let red = next_wakeup(&zone(ZoneState::Red, 0, 20 * MINUTE), &config()).unwrap();
        assert_eq!(red.cause, WakeCause::Lifetime);
        assert_eq!(red.at, created() + chrono::Duration::minutes(20));

        // Equal deadlines resolve to the lifetime ceiling.
        let tie = next_wakeup(&zone(ZoneState::Yellow, 0, 5 * MINUTE), &config()).unwrap();
        assert_eq!(tie.cause, WakeCause::Lifetime);
    }

    #[test]
    fn test_deleted_has_no_wakeup() {
        assert_eq!(next_wakeup(&zone(ZoneState::Deleted, 0, MINUTE), &config()), None);
    }
}
