use lazy_static::lazy_static;
use prometheus::{Counter, Encoder, Gauge, TextEncoder, register_counter, register_gauge};


lazy_static! {
    pub static ref REQUEST_TOTAL: Counter =
        register_counter!("forum_http_requests_total", "API requests seen by the rate limit middleware").unwrap();
    pub static ref RATE_LIMITED_TOTAL: Counter =
        register_counter!("forum_rate_limited_total", "Requests rejected with 429").unwrap();
    pub static ref RATE_LIMIT_CLIENTS: Gauge =
        register_gauge!("forum_rate_limit_clients", "Client keys tracked by the rate limiter").unwrap();
    pub static ref NOTIFICATIONS_CREATED: Counter =
        register_counter!("forum_notifications_created_total", "Notifications persisted").unwrap();
    pub static ref NOTIFICATIONS_DELIVERED: Counter =
        register_counter!("forum_notifications_delivered_total", "Live deliveries queued to subscribers").unwrap();
    pub static ref NOTIFICATIONS_DROPPED: Counter =
        register_counter!("forum_notifications_dropped_total", "Live deliveries dropped on a full subscriber").unwrap();
    pub static ref SSE_CONNECTIONS: Gauge =
        register_gauge!("forum_sse_connections", "Open notification streams").unwrap();
}

// Render the default registry in the text exposition format
pub fn render() -> Result<String, String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| format!("Encode error: {}", e))?;
    String::from_utf8(buffer).map_err(|e| format!("Metrics are not UTF-8: {}", e))
}
