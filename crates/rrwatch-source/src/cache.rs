//! TTL cache in front of a `RoomFetcher`, with rate-limit backoff and
//! stale fallback.

use crate::backoff::{BackoffPolicy, RateLimitBackoff};
use crate::error::FetchError;
use crate::fetch::RoomFetcher;
use crate::wire::WirePayload;

pub const DEFAULT_TTL_MS: u64 = 8_000;

/// Where a returned payload came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Fetched just now.
    Fresh,
    /// Served from cache within the TTL.
    Cached,
    /// Served from an expired cache because the fetch failed or is backed off.
    Stale,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Fetched {
    pub payload: WirePayload,
    pub origin: Origin,
    /// Age of the payload in milliseconds.
    pub age_ms: u64,
}

/// Samples a jitter unit in `[0, 1)`.
pub type JitterSource = fn() -> f64;

pub fn thread_rng_jitter() -> f64 {
    rand::random::<f64>()
}

struct Entry {
    payload: WirePayload,
    fetched_ms: u64,
}

pub struct CachedFetcher<F> {
    inner: F,
    ttl_ms: u64,
    backoff: RateLimitBackoff,
    jitter: JitterSource,
    entry: Option<Entry>,
}

impl<F: RoomFetcher> CachedFetcher<F> {
    pub fn new(inner: F) -> Self {
        Self {
            inner,
            ttl_ms: DEFAULT_TTL_MS,
            backoff: RateLimitBackoff::default(),
            jitter: thread_rng_jitter,
            entry: None,
        }
    }

    #[must_use]
    pub fn with_ttl_ms(mut self, ttl_ms: u64) -> Self {
        self.ttl_ms = ttl_ms;
        self
    }

    #[must_use]
    pub fn with_backoff(mut self, policy: BackoffPolicy) -> Self {
        self.backoff = RateLimitBackoff::new(policy);
        self
    }

    #[must_use]
    pub fn with_jitter(mut self, jitter: JitterSource) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn backoff(&self) -> &RateLimitBackoff {
        &self.backoff
    }

    /// Return a payload at `now_ms` (epoch milliseconds).
    ///
    /// Order: cache within TTL, then a live fetch unless backed off, then the
    /// stale cache. Errors only when there is nothing cached at all.
    pub fn fetch_at(&mut self, now_ms: u64) -> Result<Fetched, FetchError> {
        if let Some(entry) = &self.entry {
            let age_ms = now_ms.saturating_sub(entry.fetched_ms);
            if age_ms < self.ttl_ms {
                return Ok(Fetched {
                    payload: entry.payload.clone(),
                    origin: Origin::Cached,
                    age_ms,
                });
            }
        }

        if !self.backoff.ready(now_ms) {
            tracing::debug!(
                remaining_ms = self.backoff.remaining_ms(now_ms),
                "room directory backed off"
            );
            return self.stale_or(now_ms, FetchError::RateLimited);
        }

        match self.inner.fetch() {
            Ok(payload) => {
                self.backoff.record_success();
                self.entry = Some(Entry {
                    payload: payload.clone(),
                    fetched_ms: now_ms,
                });
                Ok(Fetched {
                    payload,
                    origin: Origin::Fresh,
                    age_ms: 0,
                })
            }
            Err(FetchError::RateLimited) => {
                let delay_ms = self.backoff.record_rate_limited(now_ms, (self.jitter)());
                tracing::warn!(delay_ms, "room directory rate limited, backing off");
                self.stale_or(now_ms, FetchError::RateLimited)
            }
            Err(e) => {
                tracing::warn!(error = %e, "room directory fetch failed");
                self.stale_or(now_ms, e)
            }
        }
    }

    fn stale_or(&self, now_ms: u64, err: FetchError) -> Result<Fetched, FetchError> {
        match &self.entry {
            Some(entry) => Ok(Fetched {
                payload: entry.payload.clone(),
                origin: Origin::Stale,
                age_ms: now_ms.saturating_sub(entry.fetched_ms),
            }),
            None => Err(err),
        }
    }
}
