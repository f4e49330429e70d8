//! `rrwatch session`: race-by-race VR status line and the persisted
//! session record.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Local, Utc};
use rrwatch_core::session::{SessionSnapshot, SessionStats};
use rrwatch_core::types::{FriendCode, RoomEvent, RoomId};
use rrwatch_core::{RoomWatchEngine, TickOutput};
use rrwatch_source::FetchError;
use serde::{Deserialize, Serialize};

use crate::context::{signed, thousands};
use crate::poll_loop::{TickContext, TickHandler};
use crate::session_graph::SessionGraph;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RaceRecord {
    pub time: DateTime<Utc>,
    pub vr_change: i64,
    pub total_vr: i64,
}

/// On-disk form of one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub start_time: DateTime<Utc>,
    pub player_name: String,
    pub friend_code: Option<FriendCode>,
    pub room_id: Option<RoomId>,
    pub start_vr: i64,
    pub current_vr: i64,
    pub races: Vec<RaceRecord>,
    pub stats: SessionStats,
}

impl SessionRecord {
    /// `None` until a session has started.
    pub fn from_snapshot(snap: &SessionSnapshot) -> Option<Self> {
        let start_time = snap.started_at?;
        Some(Self {
            start_time,
            player_name: snap.player_name.clone().unwrap_or_default(),
            friend_code: snap.friend_code.clone(),
            room_id: snap.room_id.clone(),
            start_vr: snap.stats.start_vr,
            current_vr: snap.stats.current_vr,
            races: snap
                .samples
                .iter()
                .map(|s| RaceRecord {
                    time: s.at,
                    vr_change: s.delta,
                    total_vr: s.total_vr,
                })
                .collect(),
            stats: snap.stats.clone(),
        })
    }

    pub fn file_name(&self) -> String {
        format!(
            "session_{}.json",
            self.start_time.with_timezone(&Local).format("%Y-%m-%d_%H-%M-%S")
        )
    }

    /// Write to `<dir>/<file_name>` via a temp file and rename.
    pub fn save(&self, dir: &Path) -> anyhow::Result<PathBuf> {
        fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
        let path = dir.join(self.file_name());
        let json = serde_json::to_string_pretty(self)?;
        write_atomic(&path, json.as_bytes())?;
        Ok(path)
    }
}

/// Replace `path` with `contents`. Readers see the old file or the new one.
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> anyhow::Result<()> {
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);

    let mut f = File::create(&tmp).with_context(|| format!("failed to create {}", tmp.display()))?;
    f.write_all(contents)?;
    f.sync_all()?;
    fs::rename(&tmp, path).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

/// One-line status, redrawn with `\r`.
pub fn status_line(snap: &SessionSnapshot, at: DateTime<Utc>) -> String {
    let clock = at.with_timezone(&Local).format("%I:%M:%S %p");
    let room = snap.room_id.as_ref().map_or("None", |r| r.as_str());
    let stats = &snap.stats;
    let mut line = format!(
        "[{clock}] Room: {room} | VR: {} | Net: {} | Races: {}",
        thousands(stats.current_vr),
        signed(stats.net_change),
        stats.race_count
    );
    if let Some(last) = snap.samples.last() {
        line.push_str(&format!(" | Last: {}", signed(last.delta)));
    }
    if stats.streak_races > 1 {
        line.push_str(&format!(
            " | Streak: {} ({})",
            stats.streak_races,
            signed(stats.streak_vr)
        ));
    }
    line
}

pub fn summary_lines(snap: &SessionSnapshot) -> Vec<String> {
    let stats = &snap.stats;
    if stats.race_count == 0 {
        return vec!["No races completed this session".to_string()];
    }
    vec![
        format!("Total Races: {}", stats.race_count),
        format!("Starting VR: {}", thousands(stats.start_vr)),
        format!("Ending VR: {}", thousands(stats.current_vr)),
        format!("Net Change: {}", signed(stats.net_change)),
        format!("Average / Race: {:+.1}", stats.average_per_race),
        format!(
            "High / Low: {} / {}",
            thousands(stats.high_vr),
            thousands(stats.low_vr)
        ),
    ]
}

/// Tick handler for the session tracker.
pub struct SessionLog<W> {
    out: W,
    save_dir: Option<PathBuf>,
    graph: Option<SessionGraph>,
    last: Option<SessionSnapshot>,
}

impl<W: Write> SessionLog<W> {
    /// `save_dir` enables the persisted record.
    pub fn new(out: W, save_dir: Option<PathBuf>) -> Self {
        Self {
            out,
            save_dir,
            graph: None,
            last: None,
        }
    }

    /// Also keep the live session graph up to date.
    pub fn with_graph(mut self, graph: SessionGraph) -> Self {
        self.graph = Some(graph);
        self
    }

    fn draw_graph(
        &self,
        engine: &RoomWatchEngine,
        snap: &SessionSnapshot,
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let Some(graph) = &self.graph else {
            return Ok(());
        };
        let room = snap
            .room_id
            .as_ref()
            .and_then(|id| engine.latest_snapshot()?.room(id));
        graph.write(snap, room, now)
    }

    fn persist(&self, snap: &SessionSnapshot) -> anyhow::Result<Option<PathBuf>> {
        let (Some(dir), Some(record)) = (&self.save_dir, SessionRecord::from_snapshot(snap)) else {
            return Ok(None);
        };
        record.save(dir).map(Some)
    }
}

impl<W: Write> TickHandler for SessionLog<W> {
    fn on_start(&mut self, engine: &RoomWatchEngine) -> anyhow::Result<()> {
        let code = engine
            .config()
            .player_friend_code
            .as_ref()
            .map_or("(none)", |c| c.as_str());
        writeln!(self.out, "Retro Rewind Session Tracker")?;
        writeln!(self.out, "Friend Code: {code}")?;
        writeln!(self.out, "{}", "-".repeat(55))?;
        writeln!(self.out, "Tracking... (Ctrl+C to stop)")?;
        if let Some(graph) = &self.graph {
            writeln!(self.out, "Graph: open {}", graph.path().display())?;
        }
        writeln!(self.out)?;
        self.draw_graph(engine, &engine.session(), Utc::now())
    }

    fn on_tick(
        &mut self,
        engine: &RoomWatchEngine,
        output: &TickOutput,
        ctx: &TickContext,
    ) -> anyhow::Result<()> {
        let snap = engine.session();

        for event in &output.events {
            if let RoomEvent::RaceCompleted { sample, .. } = event {
                let marker = if sample.delta > 0 { "\u{1f7e2}" } else { "\u{1f534}" };
                writeln!(
                    self.out,
                    "\n{marker} Race {}: {} VR (Total: {})",
                    snap.stats.race_count,
                    signed(sample.delta),
                    thousands(sample.total_vr)
                )?;
            }
        }

        write!(self.out, "\r{}          ", status_line(&snap, ctx.at))?;
        self.out.flush()?;

        let changed = self.last.as_ref() != Some(&snap);
        if changed {
            if let Some(path) = self.persist(&snap)? {
                tracing::debug!(path = %path.display(), "session record written");
            }
        }
        // Redrawn every tick: the roster and session clock move on their own.
        self.draw_graph(engine, &snap, ctx.at)?;
        if changed {
            self.last = Some(snap);
        }
        Ok(())
    }

    fn on_missed(&mut self, error: &FetchError) {
        if let Err(e) = writeln!(self.out, "\n[Error: {error}]") {
            tracing::warn!("session output failed: {e}");
        }
    }

    fn on_shutdown(&mut self, engine: &RoomWatchEngine) -> anyhow::Result<()> {
        let snap = engine.session();
        let rule = "=".repeat(55);
        writeln!(self.out, "\n\n{rule}")?;
        writeln!(self.out, "SESSION ENDED")?;
        writeln!(self.out, "{rule}")?;
        for line in summary_lines(&snap) {
            writeln!(self.out, "{line}")?;
        }
        if let Some(path) = self.persist(&snap)? {
            writeln!(self.out, "Session saved to {}", path.display())?;
        }
        writeln!(self.out, "{rule}")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use rrwatch_core::config::EngineConfig;
    use rrwatch_core::types::{Player, Room, Snapshot};
    use rrwatch_source::Origin;

    const ME: &str = "1760-9375-6261";

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-02-25T12:00:00Z")
            .expect("valid")
            .with_timezone(&Utc)
    }

    fn engine() -> RoomWatchEngine {
        let cfg = EngineConfig {
            player_friend_code: Some(FriendCode::new(ME)),
            ..EngineConfig::default()
        };
        RoomWatchEngine::new(cfg).expect("valid")
    }

    fn snapshot(vr: i64, secs: i64) -> Snapshot {
        Snapshot::new(
            vec![Room::new("C", vec![Player::new(ME, "me", vr)])],
            t0() + chrono::TimeDelta::seconds(secs),
        )
    }

    fn ctx() -> TickContext {
        TickContext {
            at: t0(),
            origin: Origin::Fresh,
            interval: Duration::from_secs(10),
        }
    }

    fn run(log: &mut SessionLog<&mut Vec<u8>>, engine: &mut RoomWatchEngine, vrs: &[i64]) {
        for (i, vr) in vrs.iter().enumerate() {
            let out = engine.tick(Some(&snapshot(*vr, i as i64 * 10)));
            log.on_tick(engine, &out, &ctx()).expect("tick");
        }
    }

    #[test]
    fn status_line_shows_net_and_last() {
        let mut e = engine();
        for (i, vr) in [5000, 5010, 5025].iter().enumerate() {
            e.tick(Some(&snapshot(*vr, i as i64)));
        }
        let line = status_line(&e.session(), t0());
        assert!(line.contains("Room: C | VR: 5,025 | Net: +25 | Races: 2"));
        assert!(line.contains("Last: +15"));
        assert!(line.contains("Streak: 2 (+25)"));
    }

    #[test]
    fn status_line_without_session() {
        let line = status_line(&engine().session(), t0());
        assert!(line.contains("Room: None | VR: 0 | Net: +0 | Races: 0"));
    }

    #[test]
    fn race_lines_printed() {
        let mut e = engine();
        let mut buf = Vec::new();
        {
            let mut log = SessionLog::new(&mut buf, None);
            run(&mut log, &mut e, &[5000, 5010, 4990]);
        }
        let text = String::from_utf8(buf).expect("utf8");
        assert!(text.contains("Race 1: +10 VR (Total: 5,010)"));
        assert!(text.contains("Race 2: -20 VR (Total: 4,990)"));
    }

    #[test]
    fn record_saved_on_change() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut e = engine();
        let mut buf = Vec::new();
        let mut log = SessionLog::new(&mut buf, Some(dir.path().to_path_buf()));
        run(&mut log, &mut e, &[5000, 5010, 5025]);

        let files: Vec<PathBuf> = fs::read_dir(dir.path())
            .expect("read dir")
            .map(|entry| entry.expect("entry").path())
            .collect();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].extension().and_then(|e| e.to_str()), Some("json"));

        let record: SessionRecord =
            serde_json::from_str(&fs::read_to_string(&files[0]).expect("read")).expect("json");
        assert_eq!(record.start_vr, 5000);
        assert_eq!(record.current_vr, 5025);
        assert_eq!(record.races.len(), 2);
        assert_eq!(record.stats.net_change, 25);
        assert_eq!(record.room_id, Some(RoomId::new("C")));
        assert_eq!(record.friend_code, Some(FriendCode::new(ME)));
    }

    #[test]
    fn nothing_saved_without_session() {
        let dir = tempfile::tempdir().expect("tempdir");
        let e = engine();
        let log = SessionLog::new(Vec::new(), Some(dir.path().join("sessions")));
        assert_eq!(log.persist(&e.session()).expect("persist"), None);
        assert!(!dir.path().join("sessions").exists());
    }

    #[test]
    fn save_overwrites_atomically() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut e = engine();
        e.tick(Some(&snapshot(5000, 0)));
        let record = SessionRecord::from_snapshot(&e.session()).expect("started");

        let first = record.save(dir.path()).expect("save");
        let second = record.save(dir.path()).expect("save");
        assert_eq!(first, second);
        assert!(!first.with_extension("json.tmp").exists());
    }

    #[test]
    fn graph_written_each_tick() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("session_graph.html");
        let mut e = engine();
        let mut buf = Vec::new();
        let mut log = SessionLog::new(&mut buf, None).with_graph(SessionGraph::new(&path, None));

        log.on_start(&e).expect("start");
        let html = fs::read_to_string(&path).expect("graph");
        assert!(html.contains("Not currently in a room"));

        run(&mut log, &mut e, &[5000, 5010]);
        let html = fs::read_to_string(&path).expect("graph");
        assert!(html.contains("Race 1 ("));
        assert!(html.contains("1 Players - 5,010 VR Avg"));
    }

    #[test]
    fn summary_for_races() {
        let mut e = engine();
        for (i, vr) in [5000, 5010, 4990].iter().enumerate() {
            e.tick(Some(&snapshot(*vr, i as i64)));
        }
        let lines = summary_lines(&e.session());
        assert_eq!(lines[0], "Total Races: 2");
        assert_eq!(lines[3], "Net Change: -10");
        assert_eq!(lines[5], "High / Low: 5,010 / 4,990");
        assert_eq!(
            summary_lines(&engine().session()),
            vec!["No races completed this session"]
        );
    }
}
