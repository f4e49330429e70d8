//! rrwatch-source: room directory IO boundary.
//! Fetches the room directory over HTTP, caches and backs off, and turns
//! the wire payload into engine snapshots. No tracking logic lives here.

pub mod backoff;
pub mod cache;
pub mod error;
pub mod fetch;
pub mod identity;
pub mod snapshot;
pub mod wire;

pub use backoff::{BackoffPolicy, RateLimitBackoff};
pub use cache::{CachedFetcher, Fetched, Origin};
pub use error::{FetchError, MalformedRoom};
pub use fetch::{DEFAULT_ROOMS_URL, HttpRoomFetcher, RoomFetcher};
pub use identity::{IdentityResolver, Resolved, RosterHint};
pub use snapshot::SnapshotAssembler;
pub use wire::{WirePayload, WirePlayer, WireRoom, convert_room};
