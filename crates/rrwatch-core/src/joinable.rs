//! Joinability edges for tracked rooms.

use crate::types::{Room, RoomEvent};

/// Compare last tick's player count with the room as seen now.
///
/// Emits `BecameJoinable` on a full → open edge and `BecameFull` on the
/// reverse edge. Anything else (staying full, staying open) emits nothing,
/// so a room that was never observed full can never become joinable.
pub fn detect(previous_count: usize, room: &Room) -> Option<RoomEvent> {
    let capacity = room.capacity;
    let current = room.player_count();

    if previous_count == capacity && current < capacity {
        Some(RoomEvent::BecameJoinable { room: room.clone() })
    } else if previous_count < capacity && current == capacity {
        Some(RoomEvent::BecameFull {
            room_id: room.id.clone(),
        })
    } else {
        None
    }
}
