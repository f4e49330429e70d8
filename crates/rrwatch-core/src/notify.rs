//! Notification decision: per-episode dedup memory and per-kind gates.
//!
//! Pure, testable state machine with no IO. Sinks receive only what
//! [`decide`] returns.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::config::NotifyToggles;
use crate::types::{FriendCode, RoomEvent, RoomId};

// ─── Memory Keys ─────────────────────────────────────────────────

/// What a memory key was recorded for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NotifyKind {
    NewRoom,
    BecameJoinable,
    Watchlist(FriendCode),
}

impl NotifyKind {
    /// Kinds whose episode is the room's tenure in the tracked set.
    fn is_tracking_scoped(&self) -> bool {
        matches!(self, Self::NewRoom | Self::BecameJoinable)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MemoryKey {
    pub room_id: RoomId,
    pub kind: NotifyKind,
}

impl MemoryKey {
    pub fn new(room_id: RoomId, kind: NotifyKind) -> Self {
        Self { room_id, kind }
    }
}

// ─── Notification Memory ─────────────────────────────────────────

/// Keys already notified in their current episode.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotificationMemory {
    keys: BTreeSet<MemoryKey>,
}

impl NotificationMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &MemoryKey) -> bool {
        self.keys.contains(key)
    }

    /// Record a key. Returns `false` if it was already present.
    pub fn insert(&mut self, key: MemoryKey) -> bool {
        self.keys.insert(key)
    }

    pub fn remove(&mut self, key: &MemoryKey) -> bool {
        self.keys.remove(key)
    }

    /// End the tracking episode of a room.
    pub fn clear_tracking(&mut self, room_id: &RoomId) -> usize {
        let before = self.keys.len();
        self.keys
            .retain(|k| !(k.room_id == *room_id && k.kind.is_tracking_scoped()));
        before - self.keys.len()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MemoryKey> {
        self.keys.iter()
    }
}

// ─── Decide ──────────────────────────────────────────────────────

/// Filter one tick's events down to those that should reach the sinks.
///
/// - Gated kinds (`EnteredTracking`, `BecameJoinable`, `WatchlistPlayerSeen`)
///   fire when enabled and not yet in memory; firing records the key.
/// - Boundary events end episodes: `ExitedTracking` clears the room's
///   tracking keys, `BecameFull` the joinable key, `WatchlistPlayerLeft`
///   the watchlist key. `BecameFull` and `WatchlistPlayerLeft` are consumed.
/// - `ExitedTracking` and `RaceCompleted` pass through.
pub fn decide(
    events: &[RoomEvent],
    memory: &mut NotificationMemory,
    toggles: &NotifyToggles,
) -> Vec<RoomEvent> {
    let mut fireable = Vec::new();

    for event in events {
        let gated = match event {
            RoomEvent::EnteredTracking { room } => {
                toggles.new_room.then(|| MemoryKey::new(room.id.clone(), NotifyKind::NewRoom))
            }
            RoomEvent::BecameJoinable { room } => toggles
                .became_joinable
                .then(|| MemoryKey::new(room.id.clone(), NotifyKind::BecameJoinable)),
            RoomEvent::WatchlistPlayerSeen { room_id, player } => toggles.watchlist.then(|| {
                MemoryKey::new(
                    room_id.clone(),
                    NotifyKind::Watchlist(player.friend_code.clone()),
                )
            }),
            RoomEvent::ExitedTracking { room_id, .. } => {
                memory.clear_tracking(room_id);
                fireable.push(event.clone());
                continue;
            }
            RoomEvent::BecameFull { room_id } => {
                memory.remove(&MemoryKey::new(room_id.clone(), NotifyKind::BecameJoinable));
                continue;
            }
            RoomEvent::WatchlistPlayerLeft {
                room_id,
                friend_code,
            } => {
                memory.remove(&MemoryKey::new(
                    room_id.clone(),
                    NotifyKind::Watchlist(friend_code.clone()),
                ));
                continue;
            }
            RoomEvent::RaceCompleted { .. } => {
                fireable.push(event.clone());
                continue;
            }
        };

        // Disabled kinds neither fire nor enter memory.
        let Some(key) = gated else {
            continue;
        };
        if memory.insert(key) {
            fireable.push(event.clone());
        }
    }

    fireable
}

// ─── Tests ───────────────────────────────────────────────────────
