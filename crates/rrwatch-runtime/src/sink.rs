//! Notification sinks: terminal banner, `terminal-notifier` push, and the
//! notifier tick handler that feeds them.

use std::io::Write;

use rrwatch_core::types::{ExitReason, Room, RoomEvent};
use rrwatch_core::{RoomWatchEngine, TickOutput};

use crate::context::{paint, thousands};
use crate::poll_loop::{TickContext, TickHandler};

const RULE_WIDTH: usize = 55;

/// A rendered notification, ready for any sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub message: String,
    /// Multi-line terminal banner.
    pub banner: Vec<String>,
    /// Whether OS push sinks should deliver it. Informational lines are
    /// terminal-only.
    pub push: bool,
}

/// Render a fireable event. Session and boundary events have no
/// notification.
pub fn render(event: &RoomEvent, vr_threshold: i64) -> Option<Notification> {
    match event {
        RoomEvent::EnteredTracking { room } => {
            let mut banner = vec![
                format!("ROOM HIT {}+ VR!", thousands(vr_threshold)),
                format!("Room {} [{}]", room.id, joinable_label(room)),
            ];
            banner.extend(room_lines(room));
            Some(Notification {
                title: format!("Room Above {}k VR!", vr_threshold / 1000),
                message: format!(
                    "{} avg \u{2022} {}p",
                    thousands(room.average_vr()),
                    room.player_count()
                ),
                banner,
                push: true,
            })
        }
        RoomEvent::BecameJoinable { room } => {
            let mut banner = vec![format!("ROOM {} IS NOW JOINABLE!", room.id)];
            banner.extend(room_lines(room));
            Some(Notification {
                title: "Room Now Joinable!".to_string(),
                message: format!(
                    "{} VR avg \u{2022} {}p",
                    thousands(room.average_vr()),
                    room.player_count()
                ),
                banner,
                push: true,
            })
        }
        RoomEvent::WatchlistPlayerSeen { room_id, player } => {
            let who = format!("{} ({})", player.display_name(), player.friend_code);
            Some(Notification {
                title: "Watchlist Player Detected".to_string(),
                message: format!("Room {room_id}: {who}"),
                banner: vec![
                    format!("WATCHLIST IN ROOM {room_id}!"),
                    format!("  Match: {who} | {} VR", thousands(player.vr)),
                ],
                push: true,
            })
        }
        RoomEvent::ExitedTracking { room_id, reason } => {
            let why = match reason {
                ExitReason::BelowGrace { average_vr } => {
                    format!("average {} VR fell below grace", thousands(*average_vr))
                }
                ExitReason::Vanished => "no longer listed".to_string(),
            };
            Some(Notification {
                title: "Room No Longer Tracked".to_string(),
                message: format!("Room {room_id}: {why}"),
                banner: vec![format!("Room {room_id} left tracking ({why})")],
                push: false,
            })
        }
        RoomEvent::BecameFull { .. }
        | RoomEvent::WatchlistPlayerLeft { .. }
        | RoomEvent::RaceCompleted { .. } => None,
    }
}

fn joinable_label(room: &Room) -> &'static str {
    if room.is_joinable {
        "JOINABLE"
    } else {
        "NOT JOINABLE"
    }
}

fn room_lines(room: &Room) -> Vec<String> {
    let names: Vec<&str> = room.players.iter().map(|p| p.display_name()).collect();
    vec![
        format!("  Average VR: {}", thousands(room.average_vr())),
        format!("  Players ({}): {}", room.player_count(), names.join(", ")),
    ]
}

/// Destination for rendered notifications.
pub trait NotificationSink {
    fn name(&self) -> &'static str;
    fn deliver(&mut self, notification: &Notification) -> anyhow::Result<()>;
}

/// Prints banners to a writer (stdout in production).
pub struct TerminalSink<W> {
    out: W,
    use_color: bool,
}

impl<W: Write> TerminalSink<W> {
    pub fn new(out: W, use_color: bool) -> Self {
        Self { out, use_color }
    }
}

impl<W: Write> NotificationSink for TerminalSink<W> {
    fn name(&self) -> &'static str {
        "terminal"
    }

    fn deliver(&mut self, n: &Notification) -> anyhow::Result<()> {
        if !n.push {
            for line in &n.banner {
                writeln!(self.out, "{}", paint(line, "2", self.use_color))?;
            }
            return Ok(());
        }
        let rule = "=".repeat(RULE_WIDTH);
        writeln!(self.out)?;
        writeln!(self.out, "{rule}")?;
        if let Some((heading, rest)) = n.banner.split_first() {
            writeln!(self.out, "{}", paint(heading, "1;33", self.use_color))?;
            writeln!(self.out, "{rule}")?;
            for line in rest {
                writeln!(self.out, "{line}")?;
            }
        }
        writeln!(self.out, "{rule}")?;
        writeln!(self.out)?;
        self.out.flush()?;
        Ok(())
    }
}

/// macOS push notifications through the `terminal-notifier` binary.
pub struct OsNotifierSink {
    bin: String,
    sound: String,
    disabled: bool,
}

impl OsNotifierSink {
    pub fn new(bin: impl Into<String>) -> Self {
        Self {
            bin: bin.into(),
            sound: "Glass".to_string(),
            disabled: false,
        }
    }

    pub fn args<'a>(&'a self, n: &'a Notification) -> [&'a str; 6] {
        [
            "-title",
            n.title.as_str(),
            "-message",
            n.message.as_str(),
            "-sound",
            self.sound.as_str(),
        ]
    }
}

impl Default for OsNotifierSink {
    fn default() -> Self {
        Self::new("terminal-notifier")
    }
}

impl NotificationSink for OsNotifierSink {
    fn name(&self) -> &'static str {
        "terminal-notifier"
    }

    fn deliver(&mut self, n: &Notification) -> anyhow::Result<()> {
        if !n.push || self.disabled {
            return Ok(());
        }
        let result = std::process::Command::new(&self.bin)
            .args(self.args(n))
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status();
        match result {
            Ok(status) if status.success() => Ok(()),
            Ok(status) => anyhow::bail!("{} exited with {status}", self.bin),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(bin = %self.bin, "notifier binary not found, push notifications off");
                self.disabled = true;
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Tick handler for `rrwatch notify`: renders fireable events into sinks.
pub struct Notifier {
    sinks: Vec<Box<dyn NotificationSink>>,
    vr_threshold: i64,
}

impl Notifier {
    pub fn new(sinks: Vec<Box<dyn NotificationSink>>, vr_threshold: i64) -> Self {
        Self {
            sinks,
            vr_threshold,
        }
    }

    /// Deliver to every sink. A failing sink is logged and skipped.
    pub fn dispatch(&mut self, fireable: &[RoomEvent]) -> usize {
        let mut delivered = 0;
        for event in fireable {
            let Some(notification) = render(event, self.vr_threshold) else {
                continue;
            };
            tracing::info!(event = %event, title = %notification.title, "notify");
            for sink in &mut self.sinks {
                if let Err(e) = sink.deliver(&notification) {
                    tracing::warn!(sink = sink.name(), "delivery failed: {e:#}");
                }
            }
            delivered += 1;
        }
        delivered
    }
}

impl TickHandler for Notifier {
    fn on_tick(
        &mut self,
        _engine: &RoomWatchEngine,
        output: &TickOutput,
        _ctx: &TickContext,
    ) -> anyhow::Result<()> {
        self.dispatch(&output.fireable);
        Ok(())
    }
}
