//! Session VR tracker for the own player.
//!
//! State machine over two states:
//!
//! - **NoRoom**: own player not listed. Entering it from `InRoom` discards
//!   the session.
//! - **InRoom**: own player listed in one room. The first sighting sets the
//!   baseline; every non-zero VR change between consecutive polls is one race.
//!   A different room identity starts a fresh session with a new baseline.
//!
//! Derived statistics are computed from the sample sequence on every read.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{FriendCode, RaceSample, RoomEvent, RoomId, Snapshot};

/// An in-progress session in a single room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveSession {
    pub room_id: RoomId,
    pub player_name: String,
    pub started_at: DateTime<Utc>,
    pub start_vr: i64,
    pub last_vr: i64,
    pub samples: Vec<RaceSample>,
}

impl ActiveSession {
    fn start(room_id: RoomId, player_name: String, vr: i64, now: DateTime<Utc>) -> Self {
        Self {
            room_id,
            player_name,
            started_at: now,
            start_vr: vr,
            last_vr: vr,
            samples: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum SessionState {
    #[default]
    NoRoom,
    InRoom(ActiveSession),
}

/// Statistics derived from a sample sequence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionStats {
    pub race_count: usize,
    /// Sum of all sample deltas.
    pub net_change: i64,
    /// `net_change / race_count`, or 0.0 with no races.
    pub average_per_race: f64,
    pub start_vr: i64,
    pub current_vr: i64,
    pub high_vr: i64,
    pub low_vr: i64,
    /// Sum of the trailing run of positive deltas.
    pub streak_vr: i64,
    pub streak_races: usize,
}

impl SessionStats {
    pub fn from_samples(start_vr: i64, samples: &[RaceSample]) -> Self {
        let race_count = samples.len();
        let net_change: i64 = samples.iter().map(|s| s.delta).sum();
        let average_per_race = if race_count == 0 {
            0.0
        } else {
            net_change as f64 / race_count as f64
        };

        let totals = std::iter::once(start_vr).chain(samples.iter().map(|s| s.total_vr));
        let (high_vr, low_vr) = totals.fold((start_vr, start_vr), |(hi, lo), vr| {
            (hi.max(vr), lo.min(vr))
        });

        let streak: Vec<i64> = samples
            .iter()
            .rev()
            .map(|s| s.delta)
            .take_while(|d| *d > 0)
            .collect();

        Self {
            race_count,
            net_change,
            average_per_race,
            start_vr,
            current_vr: samples.last().map_or(start_vr, |s| s.total_vr),
            high_vr,
            low_vr,
            streak_vr: streak.iter().sum(),
            streak_races: streak.len(),
        }
    }
}

/// Read-only view handed to renderers and the session record writer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub friend_code: Option<FriendCode>,
    pub room_id: Option<RoomId>,
    pub player_name: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub samples: Vec<RaceSample>,
    pub stats: SessionStats,
}

#[derive(Debug, Clone, Default)]
pub struct SessionTracker {
    state: SessionState,
}

impl SessionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn current_room(&self) -> Option<&RoomId> {
        match &self.state {
            SessionState::InRoom(s) => Some(&s.room_id),
            SessionState::NoRoom => None,
        }
    }

    /// Feed one snapshot. Returns a `RaceCompleted` event when a race was detected.
    pub fn observe(&mut self, snapshot: &Snapshot, own: &FriendCode) -> Vec<RoomEvent> {
        let mut matches = snapshot
            .rooms
            .iter()
            .filter_map(|room| room.find_player(own).map(|p| (room, p)));
        let found = matches.next();
        let extra: Vec<&RoomId> = matches.map(|(room, _)| &room.id).collect();
        if !extra.is_empty() {
            tracing::warn!(
                friend_code = %own,
                chosen = ?found.map(|(room, _)| &room.id),
                ignored = ?extra,
                "own player listed in more than one room, using first"
            );
        }

        let Some((room, player)) = found else {
            if let SessionState::InRoom(active) = &self.state {
                if snapshot.is_skipped(&active.room_id) {
                    return Vec::new();
                }
                tracing::info!(
                    room_id = %active.room_id,
                    races = active.samples.len(),
                    "left room, session reset"
                );
            }
            self.state = SessionState::NoRoom;
            return Vec::new();
        };

        let now = snapshot.fetched_at;

        match &mut self.state {
            SessionState::InRoom(active) if active.room_id == room.id => {
                if player.vr == active.last_vr {
                    return Vec::new();
                }
                let sample = RaceSample {
                    at: now,
                    delta: player.vr - active.last_vr,
                    total_vr: player.vr,
                };
                active.last_vr = player.vr;
                active.samples.push(sample.clone());
                tracing::info!(
                    room_id = %room.id,
                    delta = sample.delta,
                    total_vr = sample.total_vr,
                    race = active.samples.len(),
                    "race completed"
                );
                vec![RoomEvent::RaceCompleted {
                    room_id: room.id.clone(),
                    sample,
                }]
            }
            state => {
                if let SessionState::InRoom(previous) = state {
                    tracing::info!(
                        from = %previous.room_id,
                        to = %room.id,
                        "room changed, session reset"
                    );
                } else {
                    tracing::info!(room_id = %room.id, vr = player.vr, "session started");
                }
                *state = SessionState::InRoom(ActiveSession::start(
                    room.id.clone(),
                    player.name.clone(),
                    player.vr,
                    now,
                ));
                Vec::new()
            }
        }
    }

    pub fn snapshot(&self, friend_code: Option<&FriendCode>) -> SessionSnapshot {
        match &self.state {
            SessionState::NoRoom => SessionSnapshot {
                friend_code: friend_code.cloned(),
                room_id: None,
                player_name: None,
                started_at: None,
                samples: Vec::new(),
                stats: SessionStats::default(),
            },
            SessionState::InRoom(active) => SessionSnapshot {
                friend_code: friend_code.cloned(),
                room_id: Some(active.room_id.clone()),
                player_name: Some(active.player_name.clone()),
                started_at: Some(active.started_at),
                samples: active.samples.clone(),
                stats: SessionStats::from_samples(active.start_vr, &active.samples),
            },
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────
