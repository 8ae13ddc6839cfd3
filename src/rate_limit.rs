//! Per-client sliding window rate limiter.
//!
//! Each client key keeps two fixed windows. The request count for the moving
//! window is estimated by blending the previous window's count (weighted by
//! how much of it is still in view) with the current one. The estimate is
//! truncated, so a client may see slightly more or fewer than `limit`
//! requests in a true `window`-long span. That imprecision is accepted.

use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::RateLimitConfig;
use crate::metrics::RATE_LIMIT_CLIENTS;

// Request count for one fixed window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub count: u32,
    pub start_time: DateTime<Utc>,
}

impl Window {
    fn fresh(now: DateTime<Utc>) -> Self {
        Self {
            count: 0,
            start_time: now,
        }
    }
}

// Rate limit entry - tracks requests per IP/key
#[derive(Debug, Clone, Copy)]
pub struct ClientWindowState {
    pub current: Window,
    pub previous: Window,
}

/// Outcome of a single [`RateLimiter::check`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
    /// Whole seconds from the decision instant until `reset_at`, rounded up.
    pub retry_after_secs: i64,
}

/// Longest accepted window; keeps window arithmetic well inside chrono's range.
pub const MAX_WINDOW_SECONDS: i64 = 31_536_000;

pub struct RateLimiter {
    clients: DashMap<String, ClientWindowState>,
    limit: u32,
    window: TimeDelta,
}

impl RateLimiter {
    pub fn new(limit: u32, window_seconds: i64) -> Self {
        Self {
            clients: DashMap::new(),
            limit,
            window: TimeDelta::seconds(window_seconds.clamp(1, MAX_WINDOW_SECONDS)),
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.requests_limit, config.window_seconds)
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn window(&self) -> TimeDelta {
        self.window
    }

    pub fn check(&self, client_key: &str) -> RateLimitDecision {
        self.check_at(client_key, Utc::now())
    }

    /// Decide whether `client_key` may make a request at `now`.
    ///
    /// The per-key shard lock is held for the whole read-modify-write, so
    /// concurrent calls for one key are serialized.
    pub fn check_at(&self, client_key: &str, now: DateTime<Utc>) -> RateLimitDecision {
        let mut entry = self
            .clients
            .entry(client_key.to_string())
            .or_insert_with(|| ClientWindowState {
                current: Window::fresh(now),
                previous: Window::fresh(now),
            });
        let state = entry.value_mut();

        // A clock step backwards must not move the window start back.
        let mut elapsed = (now - state.current.start_time).max(TimeDelta::zero());

        if elapsed >= self.window {
            // After two idle windows the retired window no longer borders the new one.
            state.previous = if elapsed >= self.window * 2 {
                Window {
                    count: 0,
                    start_time: state.current.start_time,
                }
            } else {
                state.current
            };
            state.current = Window::fresh(now);
            elapsed = TimeDelta::zero();
        }

        let window_ms = self.window.num_milliseconds() as f64;
        let weight = (window_ms - elapsed.num_milliseconds() as f64) / window_ms;
        let carried = (f64::from(state.previous.count) * weight).floor() as u64;
        let estimated = carried + u64::from(state.current.count);

        let allowed = estimated < u64::from(self.limit);
        if allowed {
            state.current.count = state.current.count.saturating_add(1);
        }

        let remaining = u64::from(self.limit)
            .saturating_sub(estimated)
            .saturating_sub(1);
        let reset_at = state
            .current
            .start_time
            .checked_add_signed(self.window)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let until_reset = (reset_at - now).max(TimeDelta::zero());
        let mut retry_after_secs = until_reset.num_seconds();
        if until_reset > TimeDelta::seconds(retry_after_secs) {
            retry_after_secs += 1;
        }

        RateLimitDecision {
            allowed,
            limit: self.limit,
            remaining: u32::try_from(remaining).unwrap_or(u32::MAX),
            reset_at,
            retry_after_secs,
        }
    }

    pub fn cleanup(&self) -> usize {
        self.cleanup_at(Utc::now())
    }

    /// Drop every entry whose current window started more than two windows
    /// before `now`. Returns how many entries were evicted.
    pub fn cleanup_at(&self, now: DateTime<Utc>) -> usize {
        let max_idle = self.window * 2;
        let before = self.clients.len();
        self.clients
            .retain(|_, state| now - state.current.start_time <= max_idle);
        before.saturating_sub(self.clients.len())
    }

    pub fn tracked_clients(&self) -> usize {
        self.clients.len()
    }

    pub fn client_state(&self, client_key: &str) -> Option<ClientWindowState> {
        self.clients.get(client_key).map(|entry| *entry.value())
    }
}

// Background sweep - runs every `cleanup_interval` until shutdown
pub async fn cleanup_task(
    limiter: Arc<RateLimiter>,
    cleanup_interval: Duration,
    shutdown: CancellationToken,
) {
    let mut ticker = interval(cleanup_interval);
    info!(interval = ?cleanup_interval, "rate limit cleanup started");

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("rate limit cleanup stopped");
                return;
            }
            _ = ticker.tick() => {
                let evicted = limiter.cleanup();
                let remaining = limiter.tracked_clients();
                RATE_LIMIT_CLIENTS.set(remaining as f64);
                if evicted > 0 {
                    debug!(evicted, remaining, "evicted idle rate limit entries");
                }
            }
        }
    }
}
