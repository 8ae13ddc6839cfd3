use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::config::{RateLimitConfig, StreamConfig};
use crate::hub::NotificationHub;
use crate::rate_limit::RateLimiter;
use crate::store::NotificationStore;

// app's shared state
pub struct AppState {
    pub rate_limiter: Arc<RateLimiter>,
    pub rate_limit_enabled: bool,
    pub hub: Arc<NotificationHub>,
    pub stream: StreamConfig,
    pub shutdown: CancellationToken, // cancelled once on server shutdown
}

impl AppState {
    pub fn new(
        rate_limit: &RateLimitConfig,
        stream: StreamConfig,
        store: Arc<dyn NotificationStore>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            rate_limiter: Arc::new(RateLimiter::from_config(rate_limit)),
            rate_limit_enabled: rate_limit.enabled,
            hub: Arc::new(NotificationHub::new(store, stream.subscriber_capacity)),
            stream,
            shutdown,
        }
    }
}
