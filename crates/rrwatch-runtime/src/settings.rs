//! TOML settings file.
//!
//! Every field has a default, so a partial file (or no file) is fine.
//! Invariants are checked by `EngineConfig::validate` after conversion.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use rrwatch_core::config::{DEFAULT_VR_GRACE, DEFAULT_VR_THRESHOLD, EngineConfig, NotifyToggles};
use rrwatch_core::types::FriendCode;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub vr_threshold: i64,
    pub vr_grace: i64,
    pub retro_tracks_only: bool,
    pub notify: NotifyToggles,
    pub poll: PollSettings,
    pub dashboard: DashboardSettings,
    pub watchlist: WatchlistSettings,
    pub session: SessionSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            vr_threshold: DEFAULT_VR_THRESHOLD,
            vr_grace: DEFAULT_VR_GRACE,
            retro_tracks_only: true,
            notify: NotifyToggles::default(),
            poll: PollSettings::default(),
            dashboard: DashboardSettings::default(),
            watchlist: WatchlistSettings::default(),
            session: SessionSettings::default(),
        }
    }
}

/// Poll intervals per process, in seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PollSettings {
    pub dashboard_secs: u64,
    pub notifier_secs: u64,
    pub session_secs: u64,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            dashboard_secs: 15,
            notifier_secs: 20,
            session_secs: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DashboardSettings {
    pub show_open_hosts: bool,
}

impl Default for DashboardSettings {
    fn default() -> Self {
        Self {
            show_open_hosts: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WatchlistSettings {
    /// Codes watched without a nickname.
    pub friend_codes: Vec<String>,
    /// Code → nickname. Codes listed here are watched too.
    pub nicknames: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionSettings {
    pub player_friend_code: Option<String>,
    /// Write the session record to `dir` after every change.
    pub save: bool,
    pub dir: PathBuf,
    /// Keep a self-refreshing HTML graph of the session at `graph_path`.
    pub graph: bool,
    pub graph_path: PathBuf,
    /// Target VR drawn as a line on the graph.
    pub goal_vr: Option<i64>,
    pub goal_label: String,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            player_friend_code: None,
            save: false,
            dir: PathBuf::from("sessions"),
            graph: true,
            graph_path: PathBuf::from("session_graph.html"),
            goal_vr: None,
            goal_label: "Goal".to_string(),
        }
    }
}

impl Settings {
    /// Load from `path`. A missing file yields defaults.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "config file not found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(e).with_context(|| format!("failed to read {}", path.display()));
            }
        };
        Self::parse(&text).with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn parse(text: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Convert into the engine config. Call `validate` on the result.
    pub fn engine_config(&self) -> EngineConfig {
        let mut watchlist: BTreeMap<FriendCode, Option<String>> = self
            .watchlist
            .friend_codes
            .iter()
            .map(|code| (FriendCode::new(code.trim()), None))
            .collect();
        for (code, nickname) in &self.watchlist.nicknames {
            watchlist.insert(FriendCode::new(code.trim()), Some(nickname.clone()));
        }

        EngineConfig {
            vr_threshold: self.vr_threshold,
            vr_grace: self.vr_grace,
            retro_tracks_only: self.retro_tracks_only,
            notify: self.notify,
            watchlist,
            player_friend_code: self
                .session
                .player_friend_code
                .as_deref()
                .map(str::trim)
                .filter(|code| !code.is_empty())
                .map(FriendCode::new),
        }
    }

    /// Poll intervals, with an optional `--interval` override. Never below 1s.
    pub fn dashboard_interval(&self, override_secs: Option<u64>) -> Duration {
        clamped_secs(override_secs.unwrap_or(self.poll.dashboard_secs))
    }

    pub fn notifier_interval(&self, override_secs: Option<u64>) -> Duration {
        clamped_secs(override_secs.unwrap_or(self.poll.notifier_secs))
    }

    pub fn session_interval(&self, override_secs: Option<u64>) -> Duration {
        clamped_secs(override_secs.unwrap_or(self.poll.session_secs))
    }

    /// Goal line for the session graph, when one is configured.
    pub fn session_goal(&self) -> Option<Goal> {
        self.session.goal_vr.filter(|vr| *vr > 0).map(|vr| Goal {
            vr,
            label: self.session.goal_label.clone(),
        })
    }
}

/// A target VR shown alongside the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Goal {
    pub vr: i64,
    pub label: String,
}

fn clamped_secs(secs: u64) -> Duration {
    Duration::from_secs(secs.max(1))
}
