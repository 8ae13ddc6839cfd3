//! HTTP guard in front of the API routes.
//!
//! Every response carries the `X-RateLimit-*` quota headers; denied requests
//! are answered with 429 before reaching any handler.

use axum::{
    Json,
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::warn;

use crate::metrics::{RATE_LIMITED_TOTAL, REQUEST_TOTAL};
use crate::rate_limit::RateLimitDecision;
use crate::state::AppState;

pub mod headers {
    pub const X_RATE_LIMIT_LIMIT: &str = "X-RateLimit-Limit";
    pub const X_RATE_LIMIT_REMAINING: &str = "X-RateLimit-Remaining";
    pub const X_RATE_LIMIT_RESET: &str = "X-RateLimit-Reset";
    pub const RETRY_AFTER: &str = "Retry-After";
    pub const X_FORWARDED_FOR: &str = "x-forwarded-for";
    pub const X_REAL_IP: &str = "x-real-ip";
}

pub const RATE_LIMIT_MESSAGE: &str = "Rate limit exceeded, try again later";

/// Key a request is throttled under: first forwarded hop, then the peer address.
pub fn client_key(req: &Request) -> String {
    let forwarded = req
        .headers()
        .get(headers::X_FORWARDED_FOR)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty());
    if let Some(ip) = forwarded {
        return ip.to_string();
    }

    let real_ip = req
        .headers()
        .get(headers::X_REAL_IP)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|ip| !ip.is_empty());
    if let Some(ip) = real_ip {
        return ip.to_string();
    }

    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn insert_quota_headers(map: &mut HeaderMap, decision: &RateLimitDecision) {
    map.insert(headers::X_RATE_LIMIT_LIMIT, HeaderValue::from(decision.limit));
    map.insert(
        headers::X_RATE_LIMIT_REMAINING,
        HeaderValue::from(decision.remaining),
    );
    map.insert(
        headers::X_RATE_LIMIT_RESET,
        HeaderValue::from(decision.reset_at.timestamp()),
    );
}

pub async fn rate_limit_middleware(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Response {
    REQUEST_TOTAL.inc();
    if !state.rate_limit_enabled {
        return next.run(req).await;
    }

    let key = client_key(&req);
    let decision = state.rate_limiter.check(&key);

    if !decision.allowed {
        RATE_LIMITED_TOTAL.inc();
        warn!(client = %key, retry_after = decision.retry_after_secs, "rate limit exceeded");

        let mut response = (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({ "error": RATE_LIMIT_MESSAGE })),
        )
            .into_response();
        let map = response.headers_mut();
        insert_quota_headers(map, &decision);
        map.insert(
            headers::RETRY_AFTER,
            HeaderValue::from(decision.retry_after_secs),
        );
        return response;
    }

    let mut response = next.run(req).await;
    insert_quota_headers(response.headers_mut(), &decision);
    response
}
