use clap::{ArgAction, Parser};
use std::time::Duration;

use crate::rate_limit::MAX_WINDOW_SECONDS;

// CLI argument structure
#[derive(Parser, Debug, Clone)]
#[command(name = "forum-gateway")]
#[command(about = "Rate limited HTTP edge and live notification stream for the forum")]
pub struct Args {
    // Port to run the server on
    #[arg(short, long, default_value_t = 8080)]
    pub port: u16,

    // Rate limit max requests per window
    #[arg(long, default_value_t = 100, value_parser = clap::value_parser!(u32).range(1..))]
    pub rate_limit: u32,

    // Rate limit window in seconds
    #[arg(long, default_value_t = 60, value_parser = clap::value_parser!(i64).range(1..=MAX_WINDOW_SECONDS))]
    pub rate_window: i64,

    // How often idle rate limit entries are swept, in seconds
    #[arg(long, default_value_t = 60, value_parser = clap::value_parser!(u64).range(1..))]
    pub rate_cleanup_interval: u64,

    // `--rate-limit-enabled false` turns the middleware into a pass-through
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    pub rate_limit_enabled: bool,

    // Buffered notifications per live subscriber before drops start
    #[arg(long, default_value_t = 10, value_parser = clap::value_parser!(u64).range(1..))]
    pub subscriber_capacity: u64,

    // SSE keep-alive period in seconds
    #[arg(long, default_value_t = 10, value_parser = clap::value_parser!(u64).range(1..))]
    pub heartbeat_interval: u64,

    // Default page size for notification listings
    #[arg(long, default_value_t = 50)]
    pub notification_page_size: usize,

    // Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    pub log_level: String,

    // Emit JSON log lines
    #[arg(long, default_value_t = false)]
    pub log_json: bool,
}

/// Rate limiter settings, split out so the limiter does not depend on clap.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub requests_limit: u32,
    pub window_seconds: i64,
    pub cleanup_interval: Duration,
    pub enabled: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_limit: 100,
            window_seconds: 60,
            cleanup_interval: Duration::from_secs(60),
            enabled: true,
        }
    }
}

/// Settings for the live notification path.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub subscriber_capacity: usize,
    pub heartbeat_interval: Duration,
    pub page_size: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            subscriber_capacity: 10,
            heartbeat_interval: Duration::from_secs(10),
            page_size: 50,
        }
    }
}

impl Args {
    pub fn rate_limit_config(&self) -> RateLimitConfig {
        RateLimitConfig {
            requests_limit: self.rate_limit,
            window_seconds: self.rate_window,
            cleanup_interval: Duration::from_secs(self.rate_cleanup_interval),
            enabled: self.rate_limit_enabled,
        }
    }

    pub fn stream_config(&self) -> StreamConfig {
        StreamConfig {
            subscriber_capacity: usize::try_from(self.subscriber_capacity).unwrap_or(usize::MAX),
            heartbeat_interval: Duration::from_secs(self.heartbeat_interval),
            page_size: self.notification_page_size,
        }
    }
}
