//! Poll loop: wires room directory → snapshot → engine → tick handler.
//! Single-threaded; engine state is owned here and mutated only between
//! ticks.

use std::time::Duration;

use chrono::{DateTime, Utc};
use rrwatch_core::{RoomWatchEngine, TickOutput};
use rrwatch_source::fetch::DEFAULT_TIMEOUT;
use rrwatch_source::{
    CachedFetcher, DEFAULT_ROOMS_URL, FetchError, HttpRoomFetcher, Origin, RoomFetcher,
    SnapshotAssembler,
};

/// Sleep between ticks varies by up to this fraction either way.
pub const SLEEP_JITTER: f64 = 0.10;

/// What a handler knows about the tick beyond the engine output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickContext {
    pub at: DateTime<Utc>,
    pub origin: Origin,
    pub interval: Duration,
}

/// Per-command behavior plugged into the loop.
pub trait TickHandler {
    fn on_start(&mut self, _engine: &RoomWatchEngine) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_tick(
        &mut self,
        engine: &RoomWatchEngine,
        output: &TickOutput,
        ctx: &TickContext,
    ) -> anyhow::Result<()>;

    /// Nothing to show this tick, not even a cached copy.
    fn on_missed(&mut self, _error: &FetchError) {}

    fn on_shutdown(&mut self, _engine: &RoomWatchEngine) -> anyhow::Result<()> {
        Ok(())
    }
}

pub struct PollLoop<F> {
    fetcher: Option<CachedFetcher<F>>,
    assembler: SnapshotAssembler,
    engine: RoomWatchEngine,
    interval: Duration,
}

/// HTTP fetcher against the public directory, behind the TTL cache.
pub fn http_fetcher() -> anyhow::Result<CachedFetcher<HttpRoomFetcher>> {
    let http = HttpRoomFetcher::new(DEFAULT_ROOMS_URL, DEFAULT_TIMEOUT)?;
    Ok(CachedFetcher::new(http))
}

impl<F: RoomFetcher + 'static> PollLoop<F> {
    pub fn new(fetcher: CachedFetcher<F>, engine: RoomWatchEngine, interval: Duration) -> Self {
        Self {
            fetcher: Some(fetcher),
            assembler: SnapshotAssembler::new(),
            engine,
            interval,
        }
    }

    /// Run one tick. Handler errors are logged; only a lost fetcher is fatal.
    ///
    /// Only fresh payloads reach the engine. A cached or stale copy is data
    /// the engine has already seen, so the engine skips the tick and the
    /// handler still gets a chance to redraw.
    pub async fn tick<H: TickHandler>(&mut self, handler: &mut H) -> anyhow::Result<()> {
        let Some(mut fetcher) = self.fetcher.take() else {
            anyhow::bail!("room fetcher lost after a failed tick");
        };
        let now = Utc::now();
        let now_ms = u64::try_from(now.timestamp_millis()).unwrap_or(0);

        let (fetcher, result) = tokio::task::spawn_blocking(move || {
            let result = fetcher.fetch_at(now_ms);
            (fetcher, result)
        })
        .await?;
        self.fetcher = Some(fetcher);

        let interval = self.interval;
        let ctx = |origin| TickContext {
            at: now,
            origin,
            interval,
        };

        let handled = match result {
            Ok(fetched) if fetched.origin == Origin::Fresh => {
                let snapshot = self.assembler.assemble(&fetched.payload, now);
                let output = self.engine.tick(Some(&snapshot));
                handler.on_tick(&self.engine, &output, &ctx(fetched.origin))
            }
            Ok(fetched) => {
                tracing::debug!(origin = ?fetched.origin, age_ms = fetched.age_ms, "no fresh payload");
                let output = self.engine.tick(None);
                handler.on_tick(&self.engine, &output, &ctx(fetched.origin))
            }
            Err(e) => {
                tracing::warn!("fetch failed, skipping tick: {e}");
                self.engine.tick(None);
                handler.on_missed(&e);
                Ok(())
            }
        };
        if let Err(e) = handled {
            tracing::warn!("tick handler failed: {e:#}");
        }
        Ok(())
    }

    /// Tick until ctrl-c, sleeping a jittered interval between ticks.
    pub async fn run<H: TickHandler>(self, handler: &mut H) -> anyhow::Result<()> {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!("cannot listen for ctrl-c: {e}");
                std::future::pending::<()>().await;
            }
            tracing::info!("received ctrl-c, shutting down");
        };
        self.run_until(handler, ctrl_c).await
    }

    /// Tick until `shutdown` resolves. One shutdown future lives for the whole
    /// run, so it is honored mid-fetch as well as mid-sleep.
    pub async fn run_until<H, S>(mut self, handler: &mut H, shutdown: S) -> anyhow::Result<()>
    where
        H: TickHandler,
        S: Future<Output = ()>,
    {
        handler.on_start(&self.engine)?;
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                res = self.tick(handler) => res?,
                _ = &mut shutdown => break,
            }

            let pause = jittered(self.interval, rand::random::<f64>());
            tokio::select! {
                _ = tokio::time::sleep(pause) => {}
                _ = &mut shutdown => break,
            }
        }

        handler.on_shutdown(&self.engine)
    }
}

/// Scale `base` by `1 ± SLEEP_JITTER`. `unit` is a sample in `[0, 1)`.
pub fn jittered(base: Duration, unit: f64) -> Duration {
    let factor = 1.0 + SLEEP_JITTER * (2.0 * unit.clamp(0.0, 1.0) - 1.0);
    Duration::from_secs_f64(base.as_secs_f64() * factor)
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use super::*;
    use rrwatch_core::config::EngineConfig;
    use rrwatch_core::types::RoomId;
    use rrwatch_source::{WirePayload, WirePlayer, WireRoom};

    /// Fake room directory replaying scripted responses.
    #[derive(Clone, Default)]
    struct FakeDirectory {
        replies: Arc<Mutex<VecDeque<Result<WirePayload, FetchError>>>>,
        latency: Duration,
    }

    impl FakeDirectory {
        fn push(&self, reply: Result<WirePayload, FetchError>) {
            self.replies.lock().expect("lock").push_back(reply);
        }
    }

    impl RoomFetcher for FakeDirectory {
        fn fetch(&self) -> Result<WirePayload, FetchError> {
            std::thread::sleep(self.latency);
            self.replies
                .lock()
                .expect("lock")
                .pop_front()
                .unwrap_or(Err(FetchError::Status(503)))
        }
    }

    #[derive(Default)]
    struct Recorder {
        ticks: Vec<(TickOutput, Origin)>,
        missed: usize,
        shutdowns: usize,
    }

    impl TickHandler for Recorder {
        fn on_tick(
            &mut self,
            _engine: &RoomWatchEngine,
            output: &TickOutput,
            ctx: &TickContext,
        ) -> anyhow::Result<()> {
            self.ticks.push((output.clone(), ctx.origin));
            Ok(())
        }

        fn on_missed(&mut self, _error: &FetchError) {
            self.missed += 1;
        }

        fn on_shutdown(&mut self, _engine: &RoomWatchEngine) -> anyhow::Result<()> {
            self.shutdowns += 1;
            Ok(())
        }
    }

    fn payload(vr: i64, players: usize) -> WirePayload {
        WirePayload {
            rooms: vec![WireRoom {
                id: Some("A".into()),
                room_type: Some("Retro Tracks".into()),
                players: (0..players)
                    .map(|i| WirePlayer {
                        name: Some(format!("p{i}")),
                        vr: Some(vr),
                        friend_code: Some(format!("9000-0000-{i:04}")),
                        is_open_host: false,
                    })
                    .collect(),
                ..Default::default()
            }],
        }
    }

    fn no_jitter() -> f64 {
        0.0
    }

    fn poll_loop(dir: &FakeDirectory) -> PollLoop<FakeDirectory> {
        let fetcher = CachedFetcher::new(dir.clone())
            .with_ttl_ms(0)
            .with_jitter(no_jitter);
        let engine = RoomWatchEngine::new(EngineConfig::default()).expect("valid");
        PollLoop::new(fetcher, engine, Duration::from_secs(20))
    }

    #[tokio::test]
    async fn fresh_payload_reaches_engine() {
        let dir = FakeDirectory::default();
        dir.push(Ok(payload(36000, 6)));
        let mut pl = poll_loop(&dir);
        let mut rec = Recorder::default();

        pl.tick(&mut rec).await.expect("tick");

        assert_eq!(rec.ticks.len(), 1);
        let (output, origin) = &rec.ticks[0];
        assert_eq!(*origin, Origin::Fresh);
        assert_eq!(output.fireable.len(), 1);
        assert!(pl.engine.is_tracked(&RoomId::new("A")));
    }

    #[tokio::test]
    async fn stale_payload_skips_engine_tick() {
        let dir = FakeDirectory::default();
        dir.push(Ok(payload(36000, 6)));
        dir.push(Err(FetchError::Status(500)));
        let mut pl = poll_loop(&dir);
        let mut rec = Recorder::default();

        pl.tick(&mut rec).await.expect("tick");
        pl.tick(&mut rec).await.expect("tick");

        assert_eq!(rec.ticks.len(), 2);
        assert_eq!(rec.ticks[1].1, Origin::Stale);
        assert!(rec.ticks[1].0.events.is_empty());
        assert!(pl.engine.is_tracked(&RoomId::new("A")));
        assert_eq!(pl.engine.stats().missed_ticks, 1);
    }

    #[tokio::test]
    async fn failure_without_cache_is_missed_tick() {
        let dir = FakeDirectory::default();
        dir.push(Err(FetchError::RateLimited));
        let mut pl = poll_loop(&dir);
        let mut rec = Recorder::default();

        pl.tick(&mut rec).await.expect("tick");

        assert!(rec.ticks.is_empty());
        assert_eq!(rec.missed, 1);
        assert_eq!(pl.engine.stats().missed_ticks, 1);
    }

    #[tokio::test]
    async fn joinable_flow_across_ticks() {
        let dir = FakeDirectory::default();
        dir.push(Ok(payload(40000, 12)));
        dir.push(Ok(payload(40000, 10)));
        dir.push(Ok(payload(40000, 10)));
        let mut pl = poll_loop(&dir);
        let mut rec = Recorder::default();

        for _ in 0..3 {
            pl.tick(&mut rec).await.expect("tick");
        }

        let fired: Vec<Vec<&str>> = rec
            .ticks
            .iter()
            .map(|(out, _)| out.fireable.iter().map(|e| e.as_str()).collect())
            .collect();
        assert_eq!(
            fired,
            vec![
                vec!["entered_tracking"],
                vec!["became_joinable"],
                Vec::<&str>::new()
            ]
        );
    }

    #[tokio::test]
    async fn shutdown_during_slow_fetch_stops_promptly() {
        let dir = FakeDirectory {
            latency: Duration::from_millis(500),
            ..Default::default()
        };
        dir.push(Ok(payload(36000, 6)));
        let pl = poll_loop(&dir);
        let mut rec = Recorder::default();

        let started = std::time::Instant::now();
        pl.run_until(&mut rec, tokio::time::sleep(Duration::from_millis(20)))
            .await
            .expect("run");

        assert!(started.elapsed() < Duration::from_millis(400));
        assert!(rec.ticks.is_empty());
        assert_eq!(rec.shutdowns, 1);
    }

    #[tokio::test]
    async fn shutdown_during_sleep_after_tick() {
        let dir = FakeDirectory::default();
        dir.push(Ok(payload(36000, 6)));
        let pl = poll_loop(&dir);
        let mut rec = Recorder::default();

        pl.run_until(&mut rec, tokio::time::sleep(Duration::from_millis(200)))
            .await
            .expect("run");

        assert_eq!(rec.ticks.len(), 1);
        assert_eq!(rec.shutdowns, 1);
    }

    #[test]
    fn jitter_bounds() {
        let base = Duration::from_secs(20);
        let lo = jittered(base, 0.0).as_secs_f64();
        assert!((lo - 18.0).abs() < 1e-6);
        assert_eq!(jittered(base, 0.5), base);
        let hi = jittered(base, 0.999_999).as_secs_f64();
        assert!(hi > 21.9 && hi <= 22.0 + 1e-6);
    }
}
