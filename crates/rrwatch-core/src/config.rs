//! Validated engine configuration.
//!
//! Loading happens in the runtime; this type is what the engine consumes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::FriendCode;

pub const DEFAULT_VR_THRESHOLD: i64 = 35_000;
pub const DEFAULT_VR_GRACE: i64 = 30_000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("vr_grace ({grace}) must not exceed vr_threshold ({threshold})")]
    GraceAboveThreshold { grace: i64, threshold: i64 },

    #[error("vr_threshold must be non-negative, got {0}")]
    NegativeThreshold(i64),

    #[error("invalid friend code {0:?}: expected NNNN-NNNN-NNNN")]
    InvalidFriendCode(String),
}

/// Per-kind notification switches. A disabled kind never fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyToggles {
    pub new_room: bool,
    pub became_joinable: bool,
    pub watchlist: bool,
}

impl Default for NotifyToggles {
    fn default() -> Self {
        Self {
            new_room: true,
            became_joinable: true,
            watchlist: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub vr_threshold: i64,
    pub vr_grace: i64,
    pub retro_tracks_only: bool,
    pub notify: NotifyToggles,
    /// Watchlisted friend codes, each with an optional nickname.
    pub watchlist: BTreeMap<FriendCode, Option<String>>,
    /// Own friend code for session tracking. `None` disables it.
    pub player_friend_code: Option<FriendCode>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            vr_threshold: DEFAULT_VR_THRESHOLD,
            vr_grace: DEFAULT_VR_GRACE,
            retro_tracks_only: true,
            notify: NotifyToggles::default(),
            watchlist: BTreeMap::new(),
            player_friend_code: None,
        }
    }
}

impl EngineConfig {
    /// Check invariants. Bounds are reported, never reordered.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.vr_threshold < 0 {
            return Err(ConfigError::NegativeThreshold(self.vr_threshold));
        }
        if self.vr_grace > self.vr_threshold {
            return Err(ConfigError::GraceAboveThreshold {
                grace: self.vr_grace,
                threshold: self.vr_threshold,
            });
        }
        for code in self
            .watchlist
            .keys()
            .chain(self.player_friend_code.as_ref())
        {
            if !is_valid_friend_code(code.as_str()) {
                return Err(ConfigError::InvalidFriendCode(code.0.clone()));
            }
        }
        Ok(())
    }

    pub fn nickname_for(&self, code: &FriendCode) -> Option<&str> {
        self.watchlist.get(code).and_then(|n| n.as_deref())
    }
}

/// Friend codes are three dash-separated groups of four digits.
pub fn is_valid_friend_code(code: &str) -> bool {
    let groups: Vec<&str> = code.split('-').collect();
    groups.len() == 3
        && groups
            .iter()
            .all(|g| g.len() == 4 && g.bytes().all(|b| b.is_ascii_digit()))
}
