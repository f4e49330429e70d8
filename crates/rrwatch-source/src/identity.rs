//! Room identity resolution for rooms the directory lists without an id.
//!
//! Rooms with a directory id keep it. An anonymous room inherits the
//! synthetic key of a previous-tick anonymous room when:
//!
//! 1. both have the same host friend code, or failing that
//! 2. their rosters overlap with Jaccard similarity >= [`MIN_ROSTER_OVERLAP`].
//!
//! Each previous key is claimed at most once per tick. Anything unmatched
//! gets a fresh `anon-N` key.
//!
//! An anonymous room that fails conversion can still hold its key for the
//! tick through a [`RosterHint`], so downstream state treats it as skipped
//! rather than gone.

use std::collections::BTreeSet;

use rrwatch_core::types::{FriendCode, Room, RoomId};

use crate::wire::{DraftRoom, WireRoom};

/// Minimum roster overlap to treat two anonymous rooms as the same instance.
pub const MIN_ROSTER_OVERLAP: f64 = 0.5;

#[derive(Debug, Clone)]
struct Seen {
    id: RoomId,
    host: Option<FriendCode>,
    roster: BTreeSet<FriendCode>,
}

impl Seen {
    fn of(room: &Room) -> Self {
        Self {
            id: room.id.clone(),
            host: room.host().map(|p| p.friend_code.clone()),
            roster: room.players.iter().map(|p| p.friend_code.clone()).collect(),
        }
    }
}

/// Whatever identity evidence a malformed anonymous room still carries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RosterHint {
    pub host: Option<FriendCode>,
    pub roster: BTreeSet<FriendCode>,
}

impl RosterHint {
    pub fn from_wire(wire: &WireRoom) -> Self {
        let code = |fc: &Option<String>| {
            fc.as_deref()
                .map(str::trim)
                .filter(|fc| !fc.is_empty())
                .map(FriendCode::new)
        };
        Self {
            host: wire.players.first().and_then(|p| code(&p.friend_code)),
            roster: wire.players.iter().filter_map(|p| code(&p.friend_code)).collect(),
        }
    }
}

/// One tick's resolution: identified rooms plus keys held by malformed rooms.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolved {
    pub rooms: Vec<Room>,
    pub held: Vec<RoomId>,
}

/// Tracks anonymous rooms across ticks to keep their synthetic keys stable.
#[derive(Debug, Clone, Default)]
pub struct IdentityResolver {
    previous: Vec<Seen>,
    next_key: u64,
}

impl IdentityResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign identities to one tick's drafts, preserving order.
    pub fn resolve(&mut self, drafts: Vec<DraftRoom>) -> Vec<Room> {
        self.resolve_tick(drafts, &[]).rooms
    }

    /// Assign identities to one tick's drafts, then let each malformed
    /// anonymous room hold the key of a still-unclaimed previous room it
    /// matches. A held key is remembered for the next tick unchanged.
    pub fn resolve_tick(&mut self, drafts: Vec<DraftRoom>, malformed: &[RosterHint]) -> Resolved {
        let mut claimed = vec![false; self.previous.len()];
        let mut current = Vec::new();
        let mut rooms = Vec::with_capacity(drafts.len());

        for draft in drafts {
            let mut room = draft.room;
            match draft.wire_id {
                Some(id) => room.id = id,
                None => {
                    let matched = {
                        let host = room.host().map(|p| &p.friend_code);
                        let roster: BTreeSet<&FriendCode> =
                            room.players.iter().map(|p| &p.friend_code).collect();
                        self.match_previous(host, &roster, &claimed)
                    };
                    room.id = match matched {
                        Some(idx) => {
                            claimed[idx] = true;
                            self.previous[idx].id.clone()
                        }
                        None => self.fresh_key(),
                    };
                    current.push(Seen::of(&room));
                }
            }
            rooms.push(room);
        }

        let mut held = Vec::new();
        for hint in malformed {
            let roster: BTreeSet<&FriendCode> = hint.roster.iter().collect();
            if let Some(idx) = self.match_previous(hint.host.as_ref(), &roster, &claimed) {
                claimed[idx] = true;
                held.push(self.previous[idx].id.clone());
                current.push(self.previous[idx].clone());
            }
        }

        self.previous = current;
        Resolved { rooms, held }
    }

    fn match_previous(
        &self,
        host: Option<&FriendCode>,
        roster: &BTreeSet<&FriendCode>,
        claimed: &[bool],
    ) -> Option<usize> {
        let unclaimed = || {
            self.previous
                .iter()
                .enumerate()
                .filter(|(idx, _)| !claimed[*idx])
        };

        if let Some(host) = host
            && let Some((idx, _)) = unclaimed().find(|(_, seen)| seen.host.as_ref() == Some(host))
        {
            return Some(idx);
        }

        unclaimed()
            .map(|(idx, seen)| (idx, jaccard(roster, &seen.roster)))
            .filter(|(_, score)| *score >= MIN_ROSTER_OVERLAP)
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(idx, _)| idx)
    }

    fn fresh_key(&mut self) -> RoomId {
        self.next_key += 1;
        RoomId::new(format!("anon-{}", self.next_key))
    }
}

fn jaccard(a: &BTreeSet<&FriendCode>, b: &BTreeSet<FriendCode>) -> f64 {
    let union_len = a.len() + b.len();
    if union_len == 0 {
        return 0.0;
    }
    let shared = a.iter().filter(|fc| b.contains(**fc)).count();
    shared as f64 / (union_len - shared) as f64
}
