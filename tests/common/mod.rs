#![allow(dead_code)]

use axum::body::{Body, BodyDataStream};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use forum_gateway::config::{RateLimitConfig, StreamConfig};
use forum_gateway::state::AppState;
use forum_gateway::store::MemoryNotificationStore;

pub fn state_with(rate_limit: RateLimitConfig, stream: StreamConfig) -> Arc<AppState> {
    let store = Arc::new(MemoryNotificationStore::new());
    Arc::new(AppState::new(
        &rate_limit,
        stream,
        store,
        CancellationToken::new(),
    ))
}

pub fn default_state() -> Arc<AppState> {
    state_with(RateLimitConfig::default(), StreamConfig::default())
}

pub fn rate_limited_state(limit: u32, window_seconds: i64) -> Arc<AppState> {
    state_with(
        RateLimitConfig {
            requests_limit: limit,
            window_seconds,
            ..RateLimitConfig::default()
        },
        StreamConfig::default(),
    )
}

pub fn streaming_state(heartbeat: Duration) -> Arc<AppState> {
    state_with(
        RateLimitConfig::default(),
        StreamConfig {
            heartbeat_interval: heartbeat,
            ..StreamConfig::default()
        },
    )
}

/// Next SSE frame as text, failing the test if none arrives within two seconds.
pub async fn next_frame(body: &mut BodyDataStream) -> String {
    let chunk = tokio::time::timeout(Duration::from_secs(2), body.next())
        .await
        .expect("timed out waiting for frame")
        .expect("stream ended")
        .expect("body error");
    String::from_utf8(chunk.to_vec()).expect("frame is not UTF-8")
}

/// Decode a `data: <json>\n\n` frame.
pub fn frame_json(frame: &str) -> serde_json::Value {
    let payload = frame
        .strip_prefix("data: ")
        .and_then(|rest| rest.strip_suffix("\n\n"))
        .unwrap_or_else(|| panic!("not a data frame: {frame:?}"));
    serde_json::from_str(payload).expect("frame payload is not JSON")
}

pub fn into_stream(body: Body) -> BodyDataStream {
    body.into_data_stream()
}
