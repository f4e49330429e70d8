//! Error types for the room directory source.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("room directory request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("room directory rate limited (HTTP 429) and no cached copy available")]
    RateLimited,

    #[error("room directory returned HTTP {0}")]
    Status(u16),

    #[error("failed to decode room directory payload: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Why a wire room could not become a `Room` this tick.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedRoom {
    #[error("player #{index} has no VR")]
    MissingVr { index: usize },

    #[error("player #{index} has no friend code")]
    MissingFriendCode { index: usize },

    #[error("invalid capacity {0}")]
    InvalidCapacity(i64),

    #[error("{players} players exceed capacity {capacity}")]
    OverCapacity { players: usize, capacity: usize },

    #[error("record does not have the room shape: {0}")]
    Undecodable(String),
}
