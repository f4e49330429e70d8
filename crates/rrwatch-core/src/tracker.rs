//! Room state tracker: threshold/grace hysteresis over the tracked-room set.
//!
//! - **Entry**: an untracked room enters when `average_vr >= vr_threshold`
//!   (subject to the retro-only and private-room entry filters).
//! - **Retention**: a tracked room stays while `average_vr >= vr_grace`, even
//!   inside the `[vr_grace, vr_threshold)` band. Re-crossing the threshold
//!   from inside the band does not re-enter.
//! - **Exit**: below grace, or no longer listed. Rooms listed as skipped
//!   (malformed this tick) are carried over untouched.
//!
//! Pure function of `(previous, snapshot, policy)`; the caller keeps the result.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};

use crate::config::EngineConfig;
use crate::joinable;
use crate::types::{ExitReason, Room, RoomEvent, RoomId, Snapshot};

/// Entry/retention bounds for the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackingPolicy {
    pub vr_threshold: i64,
    pub vr_grace: i64,
    pub retro_tracks_only: bool,
}

impl From<&EngineConfig> for TrackingPolicy {
    fn from(cfg: &EngineConfig) -> Self {
        Self {
            vr_threshold: cfg.vr_threshold,
            vr_grace: cfg.vr_grace,
            retro_tracks_only: cfg.retro_tracks_only,
        }
    }
}

impl TrackingPolicy {
    /// Entry filters only. Tracked rooms are never evicted by them.
    fn admits(&self, room: &Room) -> bool {
        if room.is_private() {
            return false;
        }
        !self.retro_tracks_only || room.is_retro()
    }
}

/// A room currently in the tracked set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedRoom {
    /// Latest observation of the room.
    pub room: Room,
    /// Player count from the previous tick, for joinability edges.
    pub last_player_count: usize,
    /// Snapshot time at which the room entered tracking.
    pub tracked_since: DateTime<Utc>,
}

impl TrackedRoom {
    pub fn id(&self) -> &RoomId {
        &self.room.id
    }
}

/// Tracked rooms keyed by identity.
pub type TrackedRooms = BTreeMap<RoomId, TrackedRoom>;

/// Advance the tracked set by one snapshot.
///
/// Events are ordered: rooms in snapshot order first, then vanished rooms
/// in identity order.
pub fn update(
    previous: &TrackedRooms,
    snapshot: &Snapshot,
    policy: &TrackingPolicy,
) -> (TrackedRooms, Vec<RoomEvent>) {
    let mut next = TrackedRooms::new();
    let mut events = Vec::new();
    let mut listed: HashSet<&RoomId> = HashSet::with_capacity(snapshot.rooms.len());

    for room in &snapshot.rooms {
        if !listed.insert(&room.id) {
            tracing::warn!(room_id = %room.id, "duplicate room identity in snapshot, ignoring repeat");
            continue;
        }

        let average_vr = room.average_vr();

        match previous.get(&room.id) {
            Some(entry) => {
                if average_vr < policy.vr_grace {
                    tracing::debug!(room_id = %room.id, average_vr, "room fell below grace");
                    events.push(RoomEvent::ExitedTracking {
                        room_id: room.id.clone(),
                        reason: ExitReason::BelowGrace { average_vr },
                    });
                    continue;
                }

                events.extend(joinable::detect(entry.last_player_count, room));

                next.insert(
                    room.id.clone(),
                    TrackedRoom {
                        room: room.clone(),
                        last_player_count: room.player_count(),
                        tracked_since: entry.tracked_since,
                    },
                );
            }
            None => {
                if average_vr < policy.vr_threshold || !policy.admits(room) {
                    continue;
                }
                tracing::debug!(room_id = %room.id, average_vr, "room crossed threshold");
                events.push(RoomEvent::EnteredTracking { room: room.clone() });
                next.insert(
                    room.id.clone(),
                    TrackedRoom {
                        room: room.clone(),
                        last_player_count: room.player_count(),
                        tracked_since: snapshot.fetched_at,
                    },
                );
            }
        }
    }

    for (id, entry) in previous {
        if listed.contains(id) {
            continue;
        }
        if snapshot.is_skipped(id) {
            next.insert(id.clone(), entry.clone());
            continue;
        }
        events.push(RoomEvent::ExitedTracking {
            room_id: id.clone(),
            reason: ExitReason::Vanished,
        });
    }

    (next, events)
}

// ─── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Player, RoomCategory, RoomVisibility};

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-02-25T12:00:00Z")
            .expect("valid RFC3339")
            .with_timezone(&Utc)
    }

    const POLICY: TrackingPolicy = TrackingPolicy {
        vr_threshold: 35000,
        vr_grace: 30000,
        retro_tracks_only: false,
    };

    fn room(id: &str, vr: i64, count: usize) -> Room {
        let players = (0..count)
            .map(|i| Player::new(format!("0000-0000-{i:04}"), format!("p{i}"), vr))
            .collect();
        Room::new(id, players).with_category(RoomCategory::RetroTracks)
    }

    fn snap(rooms: Vec<Room>) -> Snapshot {
        Snapshot::new(rooms, t0())
    }

    fn run(previous: &TrackedRooms, rooms: Vec<Room>) -> (TrackedRooms, Vec<RoomEvent>) {
        update(previous, &snap(rooms), &POLICY)
    }

    // ── 1. Entry ─────────────────────────────────────────────────────

    #[test]
    fn below_threshold_not_tracked() {
        let (next, events) = run(&TrackedRooms::new(), vec![room("a", 34999, 6)]);
        assert!(next.is_empty());
        assert!(events.is_empty());
    }

    #[test]
    fn exact_threshold_enters() {
        let (next, events) = run(&TrackedRooms::new(), vec![room("a", 35000, 6)]);
        assert!(next.contains_key(&RoomId::new("a")));
        assert!(matches!(
            events.as_slice(),
            [RoomEvent::EnteredTracking { room }] if room.id.as_str() == "a"
        ));
    }

    #[test]
    fn entry_fires_once_while_above() {
        let (s1, e1) = run(&TrackedRooms::new(), vec![room("a", 40000, 6)]);
        let (s2, e2) = run(&s1, vec![room("a", 41000, 6)]);
        let (_, e3) = run(&s2, vec![room("a", 39000, 6)]);
        assert_eq!(e1.len(), 1);
        assert!(e2.is_empty());
        assert!(e3.is_empty());
    }

    #[test]
    fn entry_records_baseline_count_and_time() {
        let (next, _) = run(&TrackedRooms::new(), vec![room("a", 40000, 12)]);
        let entry = &next[&RoomId::new("a")];
        assert_eq!(entry.last_player_count, 12);
        assert_eq!(entry.tracked_since, t0());
    }

    // ── 2. Hysteresis band ───────────────────────────────────────────

    #[test]
    fn band_retains_without_events() {
        let (s1, _) = run(&TrackedRooms::new(), vec![room("a", 36000, 6)]);
        let (s2, e2) = run(&s1, vec![room("a", 30000, 6)]);
        let (s3, e3) = run(&s2, vec![room("a", 34999, 6)]);
        let (_, e4) = run(&s3, vec![room("a", 36000, 6)]);
        assert!(s3.contains_key(&RoomId::new("a")));
        assert!(e2.is_empty());
        assert!(e3.is_empty());
        // Re-crossing the threshold from inside the band is not a new entry.
        assert!(e4.is_empty());
    }

    #[test]
    fn band_does_not_admit_untracked_room() {
        let (next, events) = run(&TrackedRooms::new(), vec![room("a", 31000, 6)]);
        assert!(next.is_empty());
        assert!(events.is_empty());
    }

    // ── 3. Exit ──────────────────────────────────────────────────────

    #[test]
    fn below_grace_exits_once() {
        let (s1, _) = run(&TrackedRooms::new(), vec![room("a", 36000, 6)]);
        let (s2, e2) = run(&s1, vec![room("a", 29999, 6)]);
        let (_, e3) = run(&s2, vec![room("a", 29000, 6)]);
        assert!(s2.is_empty());
        assert_eq!(
            e2,
            vec![RoomEvent::ExitedTracking {
                room_id: RoomId::new("a"),
                reason: ExitReason::BelowGrace { average_vr: 29999 },
            }]
        );
        assert!(e3.is_empty());
    }

    #[test]
    fn vanished_room_exits() {
        let (s1, _) = run(&TrackedRooms::new(), vec![room("a", 36000, 6)]);
        let (s2, e2) = run(&s1, vec![]);
        assert!(s2.is_empty());
        assert_eq!(
            e2,
            vec![RoomEvent::ExitedTracking {
                room_id: RoomId::new("a"),
                reason: ExitReason::Vanished,
            }]
        );
    }

    #[test]
    fn re_entry_after_exit_is_fresh() {
        let (s1, _) = run(&TrackedRooms::new(), vec![room("a", 36000, 6)]);
        let (s2, _) = run(&s1, vec![room("a", 20000, 6)]);
        let (s3, e3) = run(&s2, vec![room("a", 36000, 6)]);
        assert!(s3.contains_key(&RoomId::new("a")));
        assert!(matches!(e3.as_slice(), [RoomEvent::EnteredTracking { .. }]));
    }

    #[test]
    fn skipped_room_is_carried_over() {
        let (s1, _) = run(&TrackedRooms::new(), vec![room("a", 36000, 6)]);
        let mut snapshot = snap(vec![]);
        snapshot.skipped.push(RoomId::new("a"));
        let (s2, e2) = update(&s1, &snapshot, &POLICY);
        assert!(e2.is_empty());
        assert_eq!(s2, s1);
    }

    // ── 4. Entry filters ─────────────────────────────────────────────

    #[test]
    fn retro_only_blocks_entry_of_other_rooms() {
        let policy = TrackingPolicy {
            retro_tracks_only: true,
            ..POLICY
        };
        let other = room("a", 40000, 6).with_category(RoomCategory::Other);
        let (next, events) = update(&TrackedRooms::new(), &snap(vec![other]), &policy);
        assert!(next.is_empty());
        assert!(events.is_empty());
    }

    #[test]
    fn retro_only_does_not_evict_tracked_rooms() {
        let other = room("a", 40000, 6).with_category(RoomCategory::Other);
        let (s1, _) = run(&TrackedRooms::new(), vec![other.clone()]);
        let policy = TrackingPolicy {
            retro_tracks_only: true,
            ..POLICY
        };
        let (s2, e2) = update(&s1, &snap(vec![other]), &policy);
        assert!(s2.contains_key(&RoomId::new("a")));
        assert!(e2.is_empty());
    }

    #[test]
    fn private_rooms_never_enter() {
        let private = room("a", 50000, 6).with_visibility(RoomVisibility::Private);
        let (next, events) = run(&TrackedRooms::new(), vec![private]);
        assert!(next.is_empty());
        assert!(events.is_empty());
    }

    // ── 5. Joinability wiring ────────────────────────────────────────

    #[test]
    fn no_joinable_event_on_entry_tick() {
        let (_, events) = run(&TrackedRooms::new(), vec![room("b", 40000, 10)]);
        assert!(
            !events
                .iter()
                .any(|e| matches!(e, RoomEvent::BecameJoinable { .. }))
        );
    }

    #[test]
    fn full_to_open_on_tracked_room() {
        let (s1, _) = run(&TrackedRooms::new(), vec![room("b", 40000, 12)]);
        let (s2, e2) = run(&s1, vec![room("b", 40000, 10)]);
        let (_, e3) = run(&s2, vec![room("b", 40000, 10)]);
        assert!(matches!(e2.as_slice(), [RoomEvent::BecameJoinable { .. }]));
        assert!(e3.is_empty());
    }

    #[test]
    fn duplicate_identity_ignored() {
        let (next, events) = run(
            &TrackedRooms::new(),
            vec![room("a", 40000, 6), room("a", 10000, 6)],
        );
        assert_eq!(next.len(), 1);
        assert_eq!(events.len(), 1);
    }
}
