//! Watchlist matcher: finds configured friend codes anywhere in the snapshot.
//!
//! Runs over every room regardless of tracking state, VR, category or
//! visibility. `WatchlistPlayerSeen` is emitted on every tick a code is
//! present; `WatchlistPlayerLeft` marks the end of a (room, code) presence so
//! the notification memory can re-arm.

use std::collections::{BTreeMap, BTreeSet};

use crate::types::{FriendCode, RoomEvent, RoomId, Snapshot};

/// Remembers which (room, code) pairs were present on the previous tick.
#[derive(Debug, Clone, Default)]
pub struct WatchlistMatcher {
    present: BTreeSet<(RoomId, FriendCode)>,
}

impl WatchlistMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pairs present as of the last scan.
    pub fn present(&self) -> impl Iterator<Item = &(RoomId, FriendCode)> {
        self.present.iter()
    }

    /// Scan a snapshot. `watchlist` maps each code to an optional nickname.
    pub fn scan(
        &mut self,
        snapshot: &Snapshot,
        watchlist: &BTreeMap<FriendCode, Option<String>>,
    ) -> Vec<RoomEvent> {
        let mut events = Vec::new();
        let mut now_present = BTreeSet::new();

        if !watchlist.is_empty() {
            let mut rooms_by_code: BTreeMap<&FriendCode, Vec<&RoomId>> = BTreeMap::new();

            for room in &snapshot.rooms {
                for player in &room.players {
                    let Some(nickname) = watchlist.get(&player.friend_code) else {
                        continue;
                    };
                    if !now_present.insert((room.id.clone(), player.friend_code.clone())) {
                        continue;
                    }
                    rooms_by_code
                        .entry(&player.friend_code)
                        .or_default()
                        .push(&room.id);

                    let mut seen = player.clone();
                    if nickname.is_some() {
                        seen.nickname = nickname.clone();
                    }
                    events.push(RoomEvent::WatchlistPlayerSeen {
                        room_id: room.id.clone(),
                        player: seen,
                    });
                }
            }

            for (code, rooms) in rooms_by_code {
                if rooms.len() > 1 {
                    tracing::warn!(
                        friend_code = %code,
                        rooms = ?rooms,
                        "watchlisted player listed in more than one room"
                    );
                }
            }
        }

        for (room_id, code) in &self.present {
            if now_present.contains(&(room_id.clone(), code.clone())) {
                continue;
            }
            // A malformed room this tick says nothing about who left it.
            if snapshot.is_skipped(room_id) && watchlist.contains_key(code) {
                now_present.insert((room_id.clone(), code.clone()));
                continue;
            }
            events.push(RoomEvent::WatchlistPlayerLeft {
                room_id: room_id.clone(),
                friend_code: code.clone(),
            });
        }

        self.present = now_present;
        events
    }
}
