//! Rate-limit backoff for the room directory.
//!
//! Pure state machine: time is passed in as epoch milliseconds and the
//! returned delays are pre-jitter. The caller applies `jitter_pct`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    /// Delay after the first 429 in milliseconds (default 10_000).
    pub initial_ms: u64,
    /// Growth per consecutive 429 (default 2.0).
    pub multiplier: f64,
    /// Upper bound on the delay in milliseconds (default 120_000).
    pub max_ms: u64,
    /// Extra delay fraction added by the caller, in `[0, jitter_pct]` (default 0.20).
    pub jitter_pct: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_ms: 10_000,
            multiplier: 2.0,
            max_ms: 120_000,
            jitter_pct: 0.20,
        }
    }
}

impl BackoffPolicy {
    /// Pre-jitter delay for the given zero-based consecutive-429 count.
    pub fn delay_ms(&self, attempt: u32) -> u64 {
        let raw = self.initial_ms as f64 * self.multiplier.powi(attempt as i32);
        if !raw.is_finite() || raw >= self.max_ms as f64 {
            self.max_ms
        } else {
            raw as u64
        }
    }

    /// Apply jitter. `unit` is a sample in `[0, 1)`.
    pub fn jittered(&self, delay_ms: u64, unit: f64) -> u64 {
        let extra = delay_ms as f64 * self.jitter_pct * unit.clamp(0.0, 1.0);
        delay_ms.saturating_add(extra as u64)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackoffState {
    /// Requests may go out.
    Clear,
    /// Rate limited; no requests before `until_ms`.
    Waiting { attempt: u32, until_ms: u64 },
}

#[derive(Debug, Clone)]
pub struct RateLimitBackoff {
    policy: BackoffPolicy,
    state: BackoffState,
    consecutive: u32,
}

impl RateLimitBackoff {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            policy,
            state: BackoffState::Clear,
            consecutive: 0,
        }
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    pub fn state(&self) -> BackoffState {
        self.state
    }

    /// Whether a request may be sent at `now_ms`.
    pub fn ready(&self, now_ms: u64) -> bool {
        match self.state {
            BackoffState::Clear => true,
            BackoffState::Waiting { until_ms, .. } => now_ms >= until_ms,
        }
    }

    /// Milliseconds left in the current wait, zero when clear.
    pub fn remaining_ms(&self, now_ms: u64) -> u64 {
        match self.state {
            BackoffState::Clear => 0,
            BackoffState::Waiting { until_ms, .. } => until_ms.saturating_sub(now_ms),
        }
    }

    /// Record a 429 at `now_ms`. `jitter_unit` is a sample in `[0, 1)`.
    /// Returns the applied delay.
    pub fn record_rate_limited(&mut self, now_ms: u64, jitter_unit: f64) -> u64 {
        let attempt = self.consecutive;
        let delay = self
            .policy
            .jittered(self.policy.delay_ms(attempt), jitter_unit);
        self.consecutive = self.consecutive.saturating_add(1);
        self.state = BackoffState::Waiting {
            attempt,
            until_ms: now_ms.saturating_add(delay),
        };
        delay
    }

    /// A successful response resets the backoff.
    pub fn record_success(&mut self) {
        self.consecutive = 0;
        self.state = BackoffState::Clear;
    }
}

impl Default for RateLimitBackoff {
    fn default() -> Self {
        Self::new(BackoffPolicy::default())
    }
}
