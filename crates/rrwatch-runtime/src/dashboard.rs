//! `rrwatch dashboard`: live view of tracked rooms, redrawn in place.

use std::io::Write;

use chrono::{DateTime, Local, Utc};
use rrwatch_core::config::EngineConfig;
use rrwatch_core::tracker::TrackedRoom;
use rrwatch_core::{RoomWatchEngine, TickOutput};
use rrwatch_source::{FetchError, Origin};

use crate::context::{paint, thousands};
use crate::poll_loop::{TickContext, TickHandler};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DashboardView {
    pub show_open_hosts: bool,
    pub use_color: bool,
}

/// Render tracked rooms (highest VR first) into dashboard lines.
pub fn render_rooms(
    rooms: &[&TrackedRoom],
    config: &EngineConfig,
    view: DashboardView,
    ctx: &TickContext,
) -> Vec<String> {
    let clock = clock_label(ctx.at);

    if rooms.is_empty() {
        return vec![format!(
            "[{clock}] No rooms above {} VR",
            thousands(config.vr_threshold)
        )];
    }

    let mut lines = vec![format!(
        "\u{2501}\u{2501}\u{2501} {} high-VR room(s) | {clock} \u{2501}\u{2501}\u{2501}",
        rooms.len()
    )];

    for tracked in rooms {
        let room = &tracked.room;
        let joinable = if room.is_joinable {
            paint("JOINABLE", "32", view.use_color)
        } else {
            paint("NOT JOINABLE", "2", view.use_color)
        };
        let suspended = if room.is_suspended {
            "SUSPENDED"
        } else {
            "UNSUSPENDED"
        };
        let below = if room.average_vr() < config.vr_threshold {
            " (grace)"
        } else {
            ""
        };
        lines.push(format!(
            "  {}: {} VR{below} | {}p | {joinable} | {suspended}",
            room.id,
            thousands(room.average_vr()),
            room.player_count()
        ));

        let watched: Vec<String> = room
            .players
            .iter()
            .filter(|p| config.watchlist.contains_key(&p.friend_code))
            .map(|p| {
                config
                    .nickname_for(&p.friend_code)
                    .unwrap_or(&p.name)
                    .to_string()
            })
            .collect();
        if !watched.is_empty() {
            let line = format!("    \u{2605} watchlist: {}", watched.join(", "));
            lines.push(paint(&line, "1;35", view.use_color));
        }

        if view.show_open_hosts {
            for host in room.open_hosts() {
                lines.push(format!(
                    "    \u{21b3} {} | {} VR | {}",
                    host.name,
                    thousands(host.vr),
                    host.friend_code
                ));
            }
        }
    }

    let stale = match ctx.origin {
        Origin::Fresh => String::new(),
        Origin::Cached | Origin::Stale => " | cached data".to_string(),
    };
    lines.push(format!(
        "\u{2501}\u{2501}\u{2501} Threshold: {} | Poll: {}s{stale} \u{2501}\u{2501}\u{2501}",
        thousands(config.vr_threshold),
        ctx.interval.as_secs()
    ));
    lines
}

fn clock_label(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%H:%M:%S").to_string()
}

/// Tick handler that redraws the dashboard over its previous frame.
pub struct Dashboard<W> {
    out: W,
    view: DashboardView,
    lines_printed: usize,
}

impl<W: Write> Dashboard<W> {
    pub fn new(out: W, view: DashboardView) -> Self {
        Self {
            out,
            view,
            lines_printed: 0,
        }
    }

    fn redraw(&mut self, lines: &[String]) -> std::io::Result<()> {
        for _ in 0..self.lines_printed {
            // Cursor up, clear line.
            write!(self.out, "\x1b[A\x1b[K")?;
        }
        for line in lines {
            writeln!(self.out, "{line}")?;
        }
        self.out.flush()?;
        self.lines_printed = lines.len();
        Ok(())
    }
}

impl<W: Write> TickHandler for Dashboard<W> {
    fn on_start(&mut self, engine: &RoomWatchEngine) -> anyhow::Result<()> {
        let cfg = engine.config();
        writeln!(self.out, "Retro Rewind Room Dashboard")?;
        writeln!(
            self.out,
            "Threshold: {} VR | Grace: {} VR",
            thousands(cfg.vr_threshold),
            thousands(cfg.vr_grace)
        )?;
        if cfg.retro_tracks_only {
            writeln!(self.out, "Filter: Retro Tracks only")?;
        }
        if self.view.show_open_hosts {
            writeln!(self.out, "Showing: Open hosts with VR and friend codes")?;
        }
        writeln!(self.out, "{}\n", "-".repeat(50))?;
        Ok(())
    }

    fn on_tick(
        &mut self,
        engine: &RoomWatchEngine,
        _output: &TickOutput,
        ctx: &TickContext,
    ) -> anyhow::Result<()> {
        let lines = render_rooms(&engine.tracked_rooms(), engine.config(), self.view, ctx);
        self.redraw(&lines)?;
        Ok(())
    }

    fn on_missed(&mut self, error: &FetchError) {
        if let Err(e) = self.redraw(&[format!("[Error: {error}]")]) {
            tracing::warn!("dashboard redraw failed: {e}");
        }
    }

    fn on_shutdown(&mut self, _engine: &RoomWatchEngine) -> anyhow::Result<()> {
        writeln!(self.out, "\n\nDashboard stopped.")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::time::Duration;

    use super::*;
    use rrwatch_core::types::{FriendCode, Player, Room, RoomCategory, Snapshot};

    fn ctx(origin: Origin) -> TickContext {
        TickContext {
            at: Utc::now(),
            origin,
            interval: Duration::from_secs(15),
        }
    }

    fn view() -> DashboardView {
        DashboardView {
            show_open_hosts: true,
            use_color: false,
        }
    }

    fn engine_with(rooms: Vec<Room>) -> RoomWatchEngine {
        let mut watchlist = BTreeMap::new();
        watchlist.insert(FriendCode::new("0944-8938-8437"), Some("Rival".to_string()));
        let cfg = EngineConfig {
            watchlist,
            ..EngineConfig::default()
        };
        let mut engine = RoomWatchEngine::new(cfg).expect("valid");
        engine.tick(Some(&Snapshot::new(rooms, Utc::now())));
        engine
    }

    fn room(id: &str, vr: i64) -> Room {
        let mut host = Player::new("1111-2222-3333", "Host", vr + 100);
        host.is_open_host = true;
        let guest = Player::new("0944-8938-8437", "Friend", vr - 100);
        let mut r = Room::new(id, vec![host, guest]).with_category(RoomCategory::RetroTracks);
        r.is_joinable = true;
        r
    }

    #[test]
    fn empty_dashboard_single_line() {
        let engine = engine_with(vec![]);
        let lines = render_rooms(&engine.tracked_rooms(), engine.config(), view(), &ctx(Origin::Fresh));
        assert_eq!(lines.len(), 1);
        assert!(lines[0].ends_with("No rooms above 35,000 VR"));
    }

    #[test]
    fn rooms_with_hosts_and_watchlist() {
        let engine = engine_with(vec![room("low", 36000), room("high", 50000)]);
        let lines = render_rooms(&engine.tracked_rooms(), engine.config(), view(), &ctx(Origin::Fresh));

        assert!(lines[0].contains("2 high-VR room(s)"));
        assert_eq!(
            lines[1],
            "  high: 50,000 VR | 2p | JOINABLE | UNSUSPENDED"
        );
        assert_eq!(lines[2], "    \u{2605} watchlist: Rival");
        assert_eq!(lines[3], "    \u{21b3} Host | 50,100 VR | 1111-2222-3333");
        assert!(lines[4].starts_with("  low: 36,000 VR"));
        assert!(lines.last().expect("footer").contains("Threshold: 35,000 | Poll: 15s"));
    }

    #[test]
    fn open_hosts_hidden_when_disabled() {
        let engine = engine_with(vec![room("a", 40000)]);
        let v = DashboardView {
            show_open_hosts: false,
            use_color: false,
        };
        let lines = render_rooms(&engine.tracked_rooms(), engine.config(), v, &ctx(Origin::Fresh));
        assert!(!lines.iter().any(|l| l.contains('\u{21b3}')));
    }

    #[test]
    fn stale_data_marked_in_footer() {
        let engine = engine_with(vec![room("a", 40000)]);
        let lines = render_rooms(&engine.tracked_rooms(), engine.config(), view(), &ctx(Origin::Stale));
        assert!(lines.last().expect("footer").contains("cached data"));
    }

    #[test]
    fn redraw_clears_previous_frame() {
        let engine = engine_with(vec![room("a", 40000)]);
        let mut buf = Vec::new();
        {
            let mut dash = Dashboard::new(&mut buf, view());
            dash.on_tick(&engine, &TickOutput::default(), &ctx(Origin::Fresh))
                .expect("draw");
            let first = dash.lines_printed;
            dash.on_tick(&engine, &TickOutput::default(), &ctx(Origin::Fresh))
                .expect("draw");
            assert_eq!(dash.lines_printed, first);
        }
        let text = String::from_utf8(buf).expect("utf8");
        assert_eq!(text.matches("\x1b[A\x1b[K").count(), 5);
    }
}
