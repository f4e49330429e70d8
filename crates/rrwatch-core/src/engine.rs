//! Per-process engine state and the tick entry point.

use serde::{Deserialize, Serialize};

use crate::config::{ConfigError, EngineConfig};
use crate::notify::{NotificationMemory, decide};
use crate::session::{SessionSnapshot, SessionTracker};
use crate::tracker::{self, TrackedRoom, TrackedRooms, TrackingPolicy};
use crate::types::{RoomEvent, Snapshot};
use crate::watchlist::WatchlistMatcher;

/// Result of one tick.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickOutput {
    /// Every event the components produced, in component order.
    pub events: Vec<RoomEvent>,
    /// The subset that should reach notification sinks.
    pub fireable: Vec<RoomEvent>,
}

/// Tick counters, for status lines and logs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickStats {
    pub ticks: u64,
    pub missed_ticks: u64,
}

/// All engine state for one process: tracked rooms, watchlist presence,
/// session, and notification memory.
#[derive(Debug, Clone)]
pub struct RoomWatchEngine {
    config: EngineConfig,
    policy: TrackingPolicy,
    tracked: TrackedRooms,
    watchlist: WatchlistMatcher,
    session: SessionTracker,
    memory: NotificationMemory,
    stats: TickStats,
    latest: Option<Snapshot>,
}

impl RoomWatchEngine {
    /// Build an engine. Fails if the configuration violates its invariants.
    pub fn new(config: EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            policy: TrackingPolicy::from(&config),
            config,
            tracked: TrackedRooms::new(),
            watchlist: WatchlistMatcher::new(),
            session: SessionTracker::new(),
            memory: NotificationMemory::new(),
            stats: TickStats::default(),
            latest: None,
        })
    }

    /// Advance by one poll. `None` means no snapshot this tick: state is
    /// left exactly as it was.
    pub fn tick(&mut self, snapshot: Option<&Snapshot>) -> TickOutput {
        let Some(snapshot) = snapshot else {
            self.stats.missed_ticks += 1;
            tracing::debug!(missed = self.stats.missed_ticks, "no snapshot this tick");
            return TickOutput::default();
        };
        self.stats.ticks += 1;

        let (tracked, mut events) = tracker::update(&self.tracked, snapshot, &self.policy);
        self.tracked = tracked;

        events.extend(self.watchlist.scan(snapshot, &self.config.watchlist));

        if let Some(own) = &self.config.player_friend_code {
            events.extend(self.session.observe(snapshot, own));
        }

        let fireable = decide(&events, &mut self.memory, &self.config.notify);

        tracing::debug!(
            rooms = snapshot.rooms.len(),
            skipped = snapshot.skipped.len(),
            tracked = self.tracked.len(),
            events = events.len(),
            fireable = fireable.len(),
            "tick processed"
        );

        self.latest = Some(snapshot.clone());
        TickOutput { events, fireable }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Tracked rooms, highest average VR first.
    pub fn tracked_rooms(&self) -> Vec<&TrackedRoom> {
        let mut rooms: Vec<&TrackedRoom> = self.tracked.values().collect();
        rooms.sort_by(|a, b| b.room.average_vr().cmp(&a.room.average_vr()));
        rooms
    }

    pub fn is_tracked(&self, id: &crate::types::RoomId) -> bool {
        self.tracked.contains_key(id)
    }

    pub fn session(&self) -> SessionSnapshot {
        self.session
            .snapshot(self.config.player_friend_code.as_ref())
    }

    pub fn memory(&self) -> &NotificationMemory {
        &self.memory
    }

    pub fn stats(&self) -> TickStats {
        self.stats
    }

    /// The last snapshot the engine processed. Missed ticks keep it.
    pub fn latest_snapshot(&self) -> Option<&Snapshot> {
        self.latest.as_ref()
    }
}
