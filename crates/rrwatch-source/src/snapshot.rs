//! Bridge a wire payload into an engine `Snapshot`.

use chrono::{DateTime, Utc};
use rrwatch_core::types::Snapshot;

use crate::identity::{IdentityResolver, RosterHint};
use crate::wire::{WirePayload, convert_room};

/// Converts payloads tick by tick, keeping anonymous room keys stable.
#[derive(Debug, Clone, Default)]
pub struct SnapshotAssembler {
    resolver: IdentityResolver,
}

impl SnapshotAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the snapshot for one tick.
    ///
    /// A malformed room with a directory id lands in `skipped` so downstream
    /// state for it is held. A malformed anonymous room is skipped under the
    /// key of the previous room it matches; with no match it is dropped.
    pub fn assemble(&mut self, payload: &WirePayload, fetched_at: DateTime<Utc>) -> Snapshot {
        let mut drafts = Vec::with_capacity(payload.rooms.len());
        let mut skipped = Vec::new();
        let mut hints = Vec::new();

        for wire in &payload.rooms {
            match convert_room(wire) {
                Ok(draft) => drafts.push(draft),
                Err(reason) => match wire.wire_id() {
                    Some(id) => {
                        tracing::warn!(room = %id, %reason, "skipping malformed room");
                        skipped.push(id);
                    }
                    None => {
                        tracing::debug!(%reason, "malformed room without id");
                        hints.push(RosterHint::from_wire(wire));
                    }
                },
            }
        }

        let resolved = self.resolver.resolve_tick(drafts, &hints);
        for id in &resolved.held {
            tracing::warn!(room = %id, "skipping malformed anonymous room");
        }
        if resolved.held.len() < hints.len() {
            tracing::debug!(
                dropped = hints.len() - resolved.held.len(),
                "dropping unmatched malformed rooms"
            );
        }
        skipped.extend(resolved.held);
        let rooms = resolved.rooms;
        Snapshot {
            rooms,
            skipped,
            fetched_at,
        }
    }
}
