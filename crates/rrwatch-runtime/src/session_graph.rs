//! Live session graph: a self-refreshing HTML page with the VR line, session
//! start/high/low (and goal) lines, race history, streak and the current
//! room's roster.

use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Local, Utc};
use rrwatch_core::session::SessionSnapshot;
use rrwatch_core::types::Room;
use serde::Serialize;

use crate::context::{signed, thousands};
use crate::session_log::write_atomic;
use crate::settings::Goal;

/// Newest races listed under the chart.
pub const HISTORY_LEN: usize = 15;

/// Series handed to Chart.js, one point per label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartData {
    pub labels: Vec<String>,
    pub values: Vec<i64>,
    pub start_line: Vec<i64>,
    pub high_line: Vec<i64>,
    pub low_line: Vec<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub goal_line: Option<Vec<i64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub goal_label: Option<String>,
}

impl ChartData {
    pub fn from_session(snap: &SessionSnapshot, goal: Option<&Goal>) -> Self {
        let stats = &snap.stats;
        let mut labels = vec!["Start".to_string()];
        let mut values = vec![stats.start_vr];
        for (i, sample) in snap.samples.iter().enumerate() {
            labels.push(format!("Race {}", i + 1));
            values.push(sample.total_vr);
        }
        let flat = |vr: i64| vec![vr; labels.len()];

        Self {
            start_line: flat(stats.start_vr),
            high_line: flat(stats.high_vr),
            low_line: flat(stats.low_vr),
            goal_line: goal.map(|g| flat(g.vr)),
            goal_label: goal.map(|g| g.label.clone()),
            labels,
            values,
        }
    }
}

/// Writes the session page to one path, replacing it on every update.
#[derive(Debug, Clone)]
pub struct SessionGraph {
    path: PathBuf,
    goal: Option<Goal>,
}

impl SessionGraph {
    pub fn new(path: impl Into<PathBuf>, goal: Option<Goal>) -> Self {
        Self {
            path: path.into(),
            goal,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write(
        &self,
        snap: &SessionSnapshot,
        room: Option<&Room>,
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let html = render_html(snap, room, self.goal.as_ref(), now)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        write_atomic(&self.path, html.as_bytes())
    }
}

pub fn render_html(
    snap: &SessionSnapshot,
    room: Option<&Room>,
    goal: Option<&Goal>,
    now: DateTime<Utc>,
) -> anyhow::Result<String> {
    let stats = &snap.stats;
    let chart = ChartData::from_session(snap, goal);
    // `<` escaped so a label can never close the script element.
    let chart_json = serde_json::to_string(&chart)?.replace('<', "\\u003c");

    let duration = snap
        .started_at
        .map_or_else(|| "--:--:--".to_string(), |start| clock_duration(now - start));
    let room_heading = snap
        .room_id
        .as_ref()
        .map(|id| format!(" : {}", escape(id.as_str())))
        .unwrap_or_default();
    let goal_box = goal.map_or_else(String::new, |g| {
        stat_box(&escape(&g.label), &thousands(g.vr), "neutral")
    });
    let race_label = if stats.streak_races == 1 { "race" } else { "races" };

    let stats_html = [
        stat_box("Session", &duration, "neutral"),
        stat_box("Start VR", &thousands(stats.start_vr), "neutral"),
        stat_box("Current VR", &thousands(stats.current_vr), "neutral"),
        stat_box("Net", &signed(stats.net_change), tone(stats.net_change)),
        stat_box("Races", &stats.race_count.to_string(), "neutral"),
        stat_box(
            "Streak",
            &format!("{} ({} {race_label})", signed(stats.streak_vr), stats.streak_races),
            tone(stats.streak_vr),
        ),
        goal_box,
    ]
    .concat();

    Ok(PAGE
        .replace("{player}", &escape(snap.player_name.as_deref().unwrap_or("Unknown")))
        .replace("{stats}", &stats_html)
        .replace("{history}", &history_html(snap))
        .replace("{room_heading}", &room_heading)
        .replace("{roster}", &roster_html(snap, room))
        .replace("{chart_data}", &chart_json))
}

fn tone(value: i64) -> &'static str {
    match value.signum() {
        1 => "positive",
        -1 => "negative",
        _ => "neutral",
    }
}

fn stat_box(label: &str, value: &str, class: &str) -> String {
    format!(
        r#"<div class="stat-box"><div class="label">{label}</div><div class="value {class}">{value}</div></div>"#
    )
}

fn clock_duration(elapsed: chrono::TimeDelta) -> String {
    let secs = elapsed.num_seconds().max(0);
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

fn history_html(snap: &SessionSnapshot) -> String {
    if snap.samples.is_empty() {
        return r#"<p class="waiting">Waiting for first race...</p>"#.to_string();
    }
    snap.samples
        .iter()
        .enumerate()
        .rev()
        .take(HISTORY_LEN)
        .map(|(i, sample)| {
            let at = sample.at.with_timezone(&Local).format("%I:%M %p");
            format!(
                r#"<div class="race-item"><span>Race {} ({at})</span><span class="race-change {}">{} VR</span></div>"#,
                i + 1,
                tone(sample.delta),
                signed(sample.delta)
            )
        })
        .collect::<Vec<_>>()
        .concat()
}

fn roster_html(snap: &SessionSnapshot, room: Option<&Room>) -> String {
    if snap.room_id.is_none() {
        return r#"<p class="not-in-room">Not currently in a room</p>"#.to_string();
    }
    let Some(room) = room.filter(|r| Some(&r.id) == snap.room_id.as_ref()) else {
        return r#"<p class="waiting">Room data not found. It may have just changed.</p>"#
            .to_string();
    };

    let mut players: Vec<_> = room.players.iter().collect();
    players.sort_by(|a, b| b.vr.cmp(&a.vr));

    let mut html = format!(
        r#"<p class="room-summary">{} Players - {} VR Avg</p>"#,
        room.player_count(),
        thousands(room.average_vr())
    );
    html.push_str(r#"<table class="players-table"><thead><tr><th>Name</th><th>Friend Code</th><th>VR</th></tr></thead><tbody>"#);
    for p in players {
        html.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td>{}</td></tr>",
            escape(&p.name),
            escape(p.friend_code.as_str()),
            thousands(p.vr)
        ));
    }
    html.push_str("</tbody></table>");
    html
}

/// HTML text escaping for names coming off the wire. Braces are escaped too
/// so a name can never look like a page placeholder.
fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            '{' => out.push_str("&#123;"),
            _ => out.push(c),
        }
    }
    out
}

const PAGE: &str = r##"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>Retro Rewind Session</title>
    <meta http-equiv="refresh" content="5">
    <script src="https://cdn.jsdelivr.net/npm/chart.js"></script>
    <style>
        body { font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
               background: #1a1a2e; color: #eee; margin: 0; padding: 20px; }
        .container { max-width: 1200px; margin: 0 auto; }
        h1 { color: #00d4ff; margin-bottom: 5px; }
        h2 { color: #00d4ff; font-size: 1.1em; }
        .subtitle { color: #888; margin-bottom: 20px; }
        .stats { display: flex; gap: 20px; flex-wrap: wrap; margin-bottom: 20px; }
        .stat-box { background: #16213e; border-radius: 10px; padding: 15px 25px; min-width: 120px; }
        .stat-box .label { color: #888; font-size: 0.85em; }
        .stat-box .value { font-size: 1.6em; font-weight: bold; }
        .positive { color: #4ade80; }
        .negative { color: #f87171; }
        .neutral { color: #eee; }
        .panels { display: flex; gap: 20px; flex-wrap: wrap; }
        .panel { background: #16213e; border-radius: 10px; padding: 15px; flex: 1; min-width: 300px; }
        .chart-container { background: #16213e; border-radius: 10px; padding: 20px; margin-bottom: 20px; }
        .race-item { display: flex; justify-content: space-between; padding: 6px 0; border-bottom: 1px solid #233; }
        .players-table { width: 100%; border-collapse: collapse; }
        .players-table th, .players-table td { text-align: left; padding: 4px 8px; }
        .waiting, .not-in-room { color: #888; }
    </style>
</head>
<body>
<div class="container">
    <h1>Retro Rewind Session</h1>
    <div class="subtitle">{player}</div>
    <div class="stats">{stats}</div>
    <div class="chart-container"><canvas id="vrChart"></canvas></div>
    <div class="panels">
        <div class="panel"><h2>Race History</h2>{history}</div>
        <div class="panel"><h2>Current Room{room_heading}</h2>{roster}</div>
    </div>
</div>
<script>
    const data = {chart_data};
    const line = (label, values, color, dash) => ({
        label, data: values, borderColor: color, borderDash: dash,
        pointRadius: 0, borderWidth: 1, fill: false,
    });
    const datasets = [
        { label: "VR", data: data.values, borderColor: "#00d4ff", tension: 0.2, fill: false },
        line("Start", data.startLine, "#888", [6, 4]),
        line("High", data.highLine, "#4ade80", [2, 4]),
        line("Low", data.lowLine, "#f87171", [2, 4]),
    ];
    if (data.goalLine) {
        datasets.push(line(data.goalLabel, data.goalLine, "#facc15", [8, 4]));
    }
    new Chart(document.getElementById("vrChart"), {
        type: "line",
        data: { labels: data.labels, datasets },
        options: { animation: false, plugins: { legend: { labels: { color: "#eee" } } },
                   scales: { x: { ticks: { color: "#888" } }, y: { ticks: { color: "#888" } } } },
    });
</script>
</body>
</html>
"##;

#[cfg(test)]
mod tests {
    use super::*;
    use rrwatch_core::config::EngineConfig;
    use rrwatch_core::types::{FriendCode, Player, Snapshot};
    use rrwatch_core::RoomWatchEngine;

    const ME: &str = "1760-9375-6261";

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-02-25T12:00:00Z")
            .expect("valid")
            .with_timezone(&Utc)
    }

    fn room(vr: i64) -> Room {
        Room::new(
            "C",
            vec![
                Player::new("1111-1111-1111", "<b>Rival</b>", 9000),
                Player::new(ME, "me", vr),
            ],
        )
    }

    fn engine_after(vrs: &[i64]) -> RoomWatchEngine {
        let cfg = EngineConfig {
            player_friend_code: Some(FriendCode::new(ME)),
            ..EngineConfig::default()
        };
        let mut engine = RoomWatchEngine::new(cfg).expect("valid");
        for (i, vr) in vrs.iter().enumerate() {
            let at = t0() + chrono::TimeDelta::seconds(i as i64 * 60);
            engine.tick(Some(&Snapshot::new(vec![room(*vr)], at)));
        }
        engine
    }

    fn goal() -> Goal {
        Goal {
            vr: 6000,
            label: "Top 50".to_string(),
        }
    }

    #[test]
    fn chart_series_follow_races() {
        let snap = engine_after(&[5000, 5100, 4950]).session();
        let chart = ChartData::from_session(&snap, Some(&goal()));
        assert_eq!(chart.labels, vec!["Start", "Race 1", "Race 2"]);
        assert_eq!(chart.values, vec![5000, 5100, 4950]);
        assert_eq!(chart.start_line, vec![5000; 3]);
        assert_eq!(chart.high_line, vec![5100; 3]);
        assert_eq!(chart.low_line, vec![4950; 3]);
        assert_eq!(chart.goal_line, Some(vec![6000; 3]));
    }

    #[test]
    fn chart_json_omits_goal_when_unset() {
        let snap = engine_after(&[5000]).session();
        let json = serde_json::to_value(ChartData::from_session(&snap, None)).expect("json");
        assert!(json.get("startLine").is_some());
        assert!(json.get("goalLine").is_none());
    }

    #[test]
    fn page_shows_stats_history_and_roster() {
        let engine = engine_after(&[5000, 5010, 5025]);
        let snap = engine.session();
        let room = engine
            .latest_snapshot()
            .and_then(|s| s.room(&rrwatch_core::types::RoomId::new("C")));
        let now = t0() + chrono::TimeDelta::seconds(3725);
        let html = render_html(&snap, room, Some(&goal()), now).expect("render");

        assert!(html.contains("01:02:05"));
        assert!(html.contains("+25"));
        assert!(html.contains("Race 2 ("));
        assert!(html.contains("Current Room : C"));
        assert!(html.contains("2 Players - 7,012 VR Avg"));
        assert!(html.contains("&lt;b&gt;Rival&lt;/b&gt;"));
        assert!(!html.contains("<b>Rival</b>"));
        assert!(html.contains("Top 50"));
        assert!(html.contains(r#""goalLine":[6000,6000,6000]"#));
        // Highest VR first.
        let rival = html.find("<td>&lt;b&gt;Rival").expect("rival row");
        let me = html.find("<td>me</td>").expect("own row");
        assert!(rival < me);
    }

    #[test]
    fn names_cannot_inject_placeholders() {
        assert_eq!(escape("{chart_data}"), "&#123;chart_data}");
        assert_eq!(escape("a&b"), "a&amp;b");
    }

    #[test]
    fn page_without_room() {
        let engine = engine_after(&[]);
        let html = render_html(&engine.session(), None, None, t0()).expect("render");
        assert!(html.contains("Not currently in a room"));
        assert!(html.contains("Waiting for first race"));
        assert!(html.contains("--:--:--"));
    }

    #[test]
    fn history_keeps_newest_races() {
        let vrs: Vec<i64> = (0..20).map(|i| 5000 + i * 10).collect();
        let snap = engine_after(&vrs).session();
        let html = history_html(&snap);
        assert_eq!(html.matches("race-item").count(), HISTORY_LEN);
        assert!(html.starts_with(r#"<div class="race-item"><span>Race 19 ("#));
        assert!(!html.contains("Race 4 ("));
    }

    #[test]
    fn write_replaces_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("graphs").join("session_graph.html");
        let graph = SessionGraph::new(&path, None);
        let engine = engine_after(&[5000, 5010]);

        graph.write(&engine.session(), None, t0()).expect("write");
        let first = std::fs::read_to_string(&path).expect("read");
        let engine = engine_after(&[5000, 5010, 5030]);
        graph.write(&engine.session(), None, t0()).expect("write");
        let second = std::fs::read_to_string(&path).expect("read");

        assert_ne!(first, second);
        assert!(second.contains("Race 2 ("));
        assert!(!dir.path().join("graphs").join("session_graph.html.tmp").exists());
        assert_eq!(graph.path(), path.as_path());
    }
}
