//! rrwatch-core: room tracking and notification-decision engine.
//!
//! Turns stateless room-directory snapshots into typed events by diffing
//! against retained state. No IO: snapshots come in, events go out.

pub mod config;
pub mod engine;
pub mod joinable;
pub mod notify;
pub mod session;
pub mod tracker;
pub mod types;
pub mod watchlist;

pub use config::{ConfigError, EngineConfig, NotifyToggles};
pub use engine::{RoomWatchEngine, TickOutput};
pub use types::{FriendCode, Player, Room, RoomEvent, RoomId, Snapshot};
