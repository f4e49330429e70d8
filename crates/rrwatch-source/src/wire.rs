//! Room directory wire payload and per-room conversion.
//!
//! Field names follow the `/api/roomstatus` JSON. Every field is optional on
//! the wire; what is required for a usable room is checked in
//! [`convert_room`]. Rooms are decoded one record at a time, so a record of
//! the wrong shape only spoils itself.

use rrwatch_core::types::{
    DEFAULT_ROOM_CAPACITY, FriendCode, Player, Room, RoomCategory, RoomId, RoomVisibility,
};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::MalformedRoom;

/// Room label the directory uses for the retro track pack.
pub const RETRO_TRACKS_LABEL: &str = "retro tracks";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WirePayload {
    #[serde(default, deserialize_with = "rooms_one_by_one")]
    pub rooms: Vec<WireRoom>,
}

fn rooms_one_by_one<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<WireRoom>, D::Error> {
    let raw = Vec::<Value>::deserialize(d)?;
    Ok(raw.into_iter().map(WireRoom::from_value).collect())
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireRoom {
    #[serde(default)]
    pub id: Option<String>,
    /// `"private"` for private rooms.
    #[serde(default, rename = "type")]
    pub visibility: Option<String>,
    #[serde(default)]
    pub players: Vec<WirePlayer>,
    #[serde(default)]
    pub is_joinable: bool,
    #[serde(default)]
    pub suspend: bool,
    #[serde(default)]
    pub rk: Option<String>,
    /// Human label, e.g. `"Retro Tracks"`.
    #[serde(default)]
    pub room_type: Option<String>,
    #[serde(default)]
    pub max_players: Option<i64>,
    /// Set when the record did not have the room shape.
    #[serde(skip)]
    pub decode_error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WirePlayer {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub vr: Option<i64>,
    #[serde(default)]
    pub friend_code: Option<String>,
    #[serde(default)]
    pub is_open_host: bool,
}

/// A converted room whose identity may still need resolving.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraftRoom {
    /// Directory id, when the payload carried one.
    pub wire_id: Option<RoomId>,
    /// Room with a placeholder id when `wire_id` is `None`.
    pub room: Room,
}

impl WireRoom {
    /// Decode one room record.
    ///
    /// A record of the wrong shape still yields a room: it keeps whatever id
    /// and friend codes are readable and carries the decode error, which
    /// [`convert_room`] reports as malformed.
    pub fn from_value(value: Value) -> Self {
        let id = value.get("id").and_then(Value::as_str).map(String::from);
        let players = value
            .get("players")
            .and_then(Value::as_array)
            .map(|players| {
                players
                    .iter()
                    .map(|p| WirePlayer {
                        friend_code: p.get("friendCode").and_then(Value::as_str).map(String::from),
                        ..Default::default()
                    })
                    .collect()
            })
            .unwrap_or_default();

        match serde_json::from_value::<WireRoom>(value) {
            Ok(room) => room,
            Err(e) => WireRoom {
                id,
                players,
                decode_error: Some(e.to_string()),
                ..Default::default()
            },
        }
    }

    pub fn wire_id(&self) -> Option<RoomId> {
        self.id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(RoomId::new)
    }

    fn category(&self) -> RoomCategory {
        let label = self.room_type.as_deref().unwrap_or("").trim();
        if label.eq_ignore_ascii_case(RETRO_TRACKS_LABEL) {
            RoomCategory::RetroTracks
        } else {
            RoomCategory::Other
        }
    }

    fn visibility(&self) -> RoomVisibility {
        match self.visibility.as_deref() {
            Some("private") => RoomVisibility::Private,
            _ => RoomVisibility::Public,
        }
    }
}

/// Convert one wire room. Any invalid player or capacity rejects the whole room.
pub fn convert_room(wire: &WireRoom) -> Result<DraftRoom, MalformedRoom> {
    if let Some(reason) = &wire.decode_error {
        return Err(MalformedRoom::Undecodable(reason.clone()));
    }

    let capacity = match wire.max_players {
        None => DEFAULT_ROOM_CAPACITY,
        Some(n) if n > 0 => n as usize,
        Some(n) => return Err(MalformedRoom::InvalidCapacity(n)),
    };

    let mut players = Vec::with_capacity(wire.players.len());
    for (index, p) in wire.players.iter().enumerate() {
        let friend_code = p
            .friend_code
            .as_deref()
            .map(str::trim)
            .filter(|fc| !fc.is_empty())
            .ok_or(MalformedRoom::MissingFriendCode { index })?;
        let vr = p.vr.ok_or(MalformedRoom::MissingVr { index })?;
        players.push(Player {
            friend_code: FriendCode::new(friend_code),
            name: p.name.clone().unwrap_or_else(|| "Unknown".to_string()),
            vr,
            nickname: None,
            is_open_host: p.is_open_host,
        });
    }

    if players.len() > capacity {
        return Err(MalformedRoom::OverCapacity {
            players: players.len(),
            capacity,
        });
    }

    let wire_id = wire.wire_id();
    let room = Room {
        id: wire_id.clone().unwrap_or_else(|| RoomId::new("")),
        players,
        capacity,
        category: wire.category(),
        visibility: wire.visibility(),
        is_joinable: wire.is_joinable,
        is_suspended: wire.suspend,
        kind: wire.rk.clone().unwrap_or_default(),
    };

    Ok(DraftRoom { wire_id, room })
}
