//! Rate limiting through the HTTP stack.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use axum::{
    body::{Body, to_bytes},
    http::{Request, StatusCode},
};
use forum_gateway::config::{RateLimitConfig, StreamConfig};
use forum_gateway::metrics::REQUEST_TOTAL;
use forum_gateway::server::router;
use std::error::Error;
use tower::ServiceExt;

fn unread_request(ip: &str) -> Request<Body> {
    Request::builder()
        .uri("/api/notifications/unread-count")
        .header("X-Forwarded-For", ip)
        .header("X-User-Id", "u1")
        .body(Body::empty())
        .unwrap()
}

fn header<'a>(response: &'a axum::response::Response, name: &str) -> &'a str {
    response
        .headers()
        .get(name)
        .unwrap_or_else(|| panic!("missing header {name}"))
        .to_str()
        .unwrap()
}

#[tokio::test]
async fn burst_is_allowed_then_throttled() -> Result<(), Box<dyn Error>> {
    let app = router(common::rate_limited_state(5, 60));

    for expected_remaining in ["4", "3", "2", "1", "0"] {
        let response = app.clone().oneshot(unread_request("1.2.3.4")).await?;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(header(&response, "X-RateLimit-Limit"), "5");
        assert_eq!(header(&response, "X-RateLimit-Remaining"), expected_remaining);
        assert!(header(&response, "X-RateLimit-Reset").parse::<i64>().is_ok());
    }

    let response = app.clone().oneshot(unread_request("1.2.3.4")).await?;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(header(&response, "Retry-After"), "60");
    assert_eq!(header(&response, "X-RateLimit-Remaining"), "0");

    let body = to_bytes(response.into_body(), usize::MAX).await?;
    let json: serde_json::Value = serde_json::from_slice(&body)?;
    assert_eq!(json["error"], "Rate limit exceeded, try again later");

    // A different client still has its own quota.
    let response = app.oneshot(unread_request("5.6.7.8")).await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "X-RateLimit-Remaining"), "4");

    Ok(())
}

#[tokio::test]
async fn throttling_happens_before_authentication() -> Result<(), Box<dyn Error>> {
    let app = router(common::rate_limited_state(1, 60));

    let anonymous = || {
        Request::builder()
            .uri("/api/notifications")
            .header("X-Forwarded-For", "1.2.3.4")
            .body(Body::empty())
            .unwrap()
    };

    let first = app.clone().oneshot(anonymous()).await?;
    assert_eq!(first.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(header(&first, "X-RateLimit-Remaining"), "0");

    let second = app.oneshot(anonymous()).await?;
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    Ok(())
}

#[tokio::test]
async fn disabled_limiter_passes_through_without_headers() -> Result<(), Box<dyn Error>> {
    let state = common::state_with(
        RateLimitConfig {
            requests_limit: 1,
            enabled: false,
            ..RateLimitConfig::default()
        },
        StreamConfig::default(),
    );
    let app = router(state);
    let seen_before = REQUEST_TOTAL.get();

    for _ in 0..3 {
        let response = app.clone().oneshot(unread_request("1.2.3.4")).await?;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get("X-RateLimit-Limit").is_none());
    }

    // Still counted while limiting is off; other tests only ever add to it.
    assert!(REQUEST_TOTAL.get() >= seen_before + 3.0);
    Ok(())
}

#[tokio::test]
async fn health_is_not_rate_limited() -> Result<(), Box<dyn Error>> {
    let app = router(common::rate_limited_state(1, 60));

    for _ in 0..3 {
        let request = Request::builder().uri("/health").body(Body::empty())?;
        let response = app.clone().oneshot(request).await?;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get("X-RateLimit-Limit").is_none());
    }
    Ok(())
}
