use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Room capacity used by the directory for every public and private room.
pub const DEFAULT_ROOM_CAPACITY: usize = 12;

// ─── Identifiers ──────────────────────────────────────────────────

/// Player friend code, e.g. `"1760-9375-6261"`. Stable across polls.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FriendCode(pub String);

impl FriendCode {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FriendCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Room identity, either the directory's own id or a synthetic key
/// assigned by identity resolution.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(pub String);

impl RoomId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ─── Player ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub friend_code: FriendCode,
    pub name: String,
    pub vr: i64,
    /// Watchlist nickname, filled in by the watchlist matcher.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    #[serde(default)]
    pub is_open_host: bool,
}

impl Player {
    pub fn new(friend_code: impl Into<String>, name: impl Into<String>, vr: i64) -> Self {
        Self {
            friend_code: FriendCode::new(friend_code),
            name: name.into(),
            vr,
            nickname: None,
            is_open_host: false,
        }
    }

    /// Nickname if one is configured, otherwise the in-game name.
    pub fn display_name(&self) -> &str {
        self.nickname.as_deref().unwrap_or(&self.name)
    }
}

// ─── Room ─────────────────────────────────────────────────────────

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomCategory {
    RetroTracks,
    #[default]
    Other,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomVisibility {
    #[default]
    Public,
    Private,
}

/// One room as seen in a single snapshot.
///
/// `players` is in join order, so the first entry is the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: RoomId,
    pub players: Vec<Player>,
    pub capacity: usize,
    pub category: RoomCategory,
    #[serde(default)]
    pub visibility: RoomVisibility,
    /// Directory-reported joinable flag (display only).
    #[serde(default)]
    pub is_joinable: bool,
    #[serde(default)]
    pub is_suspended: bool,
    /// Raw room kind string from the directory, e.g. `"vs_10"`.
    #[serde(default)]
    pub kind: String,
}

impl Room {
    pub fn new(id: impl Into<String>, players: Vec<Player>) -> Self {
        Self {
            id: RoomId::new(id),
            players,
            capacity: DEFAULT_ROOM_CAPACITY,
            category: RoomCategory::Other,
            visibility: RoomVisibility::Public,
            is_joinable: false,
            is_suspended: false,
            kind: String::new(),
        }
    }

    #[must_use]
    pub fn with_category(mut self, category: RoomCategory) -> Self {
        self.category = category;
        self
    }

    #[must_use]
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    #[must_use]
    pub fn with_visibility(mut self, visibility: RoomVisibility) -> Self {
        self.visibility = visibility;
        self
    }

    /// Integer mean of member VRs, truncated toward zero. Empty rooms average 0.
    pub fn average_vr(&self) -> i64 {
        if self.players.is_empty() {
            return 0;
        }
        let total: i64 = self.players.iter().map(|p| p.vr).sum();
        total / self.players.len() as i64
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn is_full(&self) -> bool {
        self.players.len() >= self.capacity
    }

    pub fn host(&self) -> Option<&Player> {
        self.players.first()
    }

    pub fn is_retro(&self) -> bool {
        self.category == RoomCategory::RetroTracks
    }

    pub fn is_private(&self) -> bool {
        self.visibility == RoomVisibility::Private
    }

    pub fn find_player(&self, code: &FriendCode) -> Option<&Player> {
        self.players.iter().find(|p| &p.friend_code == code)
    }

    /// Open hosts sorted by VR, highest first.
    pub fn open_hosts(&self) -> Vec<&Player> {
        let mut hosts: Vec<&Player> = self.players.iter().filter(|p| p.is_open_host).collect();
        hosts.sort_by(|a, b| b.vr.cmp(&a.vr));
        hosts
    }
}

// ─── Snapshot ─────────────────────────────────────────────────────

/// The parsed result of one poll of the room directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Fully identified, well-formed rooms in directory order.
    pub rooms: Vec<Room>,
    /// Rooms whose records were malformed this tick. They are neither
    /// updated nor treated as gone.
    #[serde(default)]
    pub skipped: Vec<RoomId>,
    pub fetched_at: DateTime<Utc>,
}

impl Snapshot {
    pub fn new(rooms: Vec<Room>, fetched_at: DateTime<Utc>) -> Self {
        Self {
            rooms,
            skipped: Vec::new(),
            fetched_at,
        }
    }

    pub fn room(&self, id: &RoomId) -> Option<&Room> {
        self.rooms.iter().find(|r| &r.id == id)
    }

    pub fn is_skipped(&self, id: &RoomId) -> bool {
        self.skipped.contains(id)
    }
}

// ─── Events ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ExitReason {
    /// Average VR fell below the grace bound.
    BelowGrace { average_vr: i64 },
    /// The room is no longer listed by the directory.
    Vanished,
}

/// One race worth of VR movement for the own player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaceSample {
    pub at: DateTime<Utc>,
    pub delta: i64,
    pub total_vr: i64,
}

/// Typed output of one engine tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "event")]
pub enum RoomEvent {
    EnteredTracking {
        room: Room,
    },
    ExitedTracking {
        room_id: RoomId,
        reason: ExitReason,
    },
    BecameJoinable {
        room: Room,
    },
    /// A tracked room went back to full capacity. Re-arms `BecameJoinable`.
    BecameFull {
        room_id: RoomId,
    },
    WatchlistPlayerSeen {
        room_id: RoomId,
        player: Player,
    },
    WatchlistPlayerLeft {
        room_id: RoomId,
        friend_code: FriendCode,
    },
    RaceCompleted {
        room_id: RoomId,
        sample: RaceSample,
    },
}

impl RoomEvent {
    pub fn room_id(&self) -> &RoomId {
        match self {
            Self::EnteredTracking { room } | Self::BecameJoinable { room } => &room.id,
            Self::ExitedTracking { room_id, .. }
            | Self::BecameFull { room_id }
            | Self::WatchlistPlayerSeen { room_id, .. }
            | Self::WatchlistPlayerLeft { room_id, .. }
            | Self::RaceCompleted { room_id, .. } => room_id,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EnteredTracking { .. } => "entered_tracking",
            Self::ExitedTracking { .. } => "exited_tracking",
            Self::BecameJoinable { .. } => "became_joinable",
            Self::BecameFull { .. } => "became_full",
            Self::WatchlistPlayerSeen { .. } => "watchlist_player_seen",
            Self::WatchlistPlayerLeft { .. } => "watchlist_player_left",
            Self::RaceCompleted { .. } => "race_completed",
        }
    }
}

impl fmt::Display for RoomEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.as_str(), self.room_id())
    }
}
