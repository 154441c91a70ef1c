//! Fixed-window rate limiting keyed by identity.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::broadcast;
use tokio::time;

use crate::config::RateLimitConfig;
use crate::observability::metrics;

/// Counter for one identity's current window.
#[derive(Debug, Clone)]
struct RateWindow {
    window_start: Instant,
    count: u32,
    last_seen: Instant,
}

impl RateWindow {
    fn new(now: Instant) -> Self {
        Self {
            window_start: now,
            count: 0,
            last_seen: now,
        }
    }
}

/// A counted, admitted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    pub limit: u32,
    pub remaining: u32,
    pub reset_after: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RateLimitError {
    #[error("rate limit of {limit} exceeded, retry after {retry_after_secs}s")]
    Exceeded { retry_after_secs: u64, limit: u32 },
}

/// Per-identity fixed-window counters.
///
/// Increment-and-compare happens while holding the entry's shard lock, so
/// concurrent requests for the same identity cannot lose updates.
pub struct RateLimiter {
    windows: DashMap<String, RateWindow>,
    limit: u32,
    window: Duration,
    idle_eviction: Duration,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            windows: DashMap::new(),
            limit: config.requests_per_window,
            window: Duration::from_secs(config.window_secs),
            idle_eviction: Duration::from_secs(config.idle_eviction_secs),
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Count one request for `identity` against its window.
    pub fn check(&self, identity: &str, limit_override: Option<u32>) -> Result<Admission, RateLimitError> {
        self.check_at(identity, limit_override, Instant::now())
    }

    pub fn check_at(
        &self,
        identity: &str,
        limit_override: Option<u32>,
        now: Instant,
    ) -> Result<Admission, RateLimitError> {
        let limit = limit_override.unwrap_or(self.limit);

        let mut window = self
            .windows
            .entry(identity.to_string())
            .or_insert_with(|| RateWindow::new(now));

        if now.saturating_duration_since(window.window_start) >= self.window {
            window.window_start = now;
            window.count = 0;
        }
        window.last_seen = now;

        let elapsed = now.saturating_duration_since(window.window_start);
        let reset_after = self.window.saturating_sub(elapsed);

        if window.count >= limit {
            let retry_after_secs = ceil_secs(reset_after).clamp(1, self.window.as_secs().max(1));
            return Err(RateLimitError::Exceeded { retry_after_secs, limit });
        }

        window.count += 1;
        Ok(Admission {
            limit,
            remaining: limit - window.count,
            reset_after,
        })
    }

    /// Evict windows idle longer than the configured period.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    pub fn sweep_at(&self, now: Instant) -> usize {
        let before = self.windows.len();
        self.windows
            .retain(|_, w| now.saturating_duration_since(w.last_seen) < self.idle_eviction);
        let evicted = before.saturating_sub(self.windows.len());
        metrics::record_rate_windows(self.windows.len());
        evicted
    }

    /// Number of identities currently tracked.
    pub fn tracked(&self) -> usize {
        self.windows.len()
    }

    /// Periodically evict idle windows until shutdown.
    pub async fn run_sweeper(self: Arc<Self>, interval: Duration, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let evicted = self.sweep();
                    if evicted > 0 {
                        tracing::debug!(evicted, tracked = self.tracked(), "Evicted idle rate windows");
                    }
                }
                _ = shutdown.recv() => {
                    tracing::debug!("Rate window sweeper received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}

fn ceil_secs(d: Duration) -> u64 {
    d.as_secs() + u64::from(d.subsec_nanos() > 0)
}
