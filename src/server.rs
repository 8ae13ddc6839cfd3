//! Router assembly and server lifecycle.

use axum::{
    Router, middleware,
    routing::{get, post},
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::handlers::{
    create_notification_handler, health_handler, list_notifications_handler,
    mark_all_read_handler, mark_read_handler, metrics_handler, stream_handler,
    unread_count_handler,
};
use crate::identity::identity_middleware;
use crate::middleware::rate_limit_middleware;
use crate::state::AppState;

/// Build the full application router.
///
/// `/api` routes run the rate limiter first, then identity resolution.
/// Health and metrics stay outside both.
pub fn router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route(
            "/notifications",
            get(list_notifications_handler).post(create_notification_handler),
        )
        .route("/notifications/unread-count", get(unread_count_handler))
        .route("/notifications/read-all", post(mark_all_read_handler))
        .route("/notifications/{id}/read", post(mark_read_handler))
        .route("/notifications/stream", get(stream_handler))
        .layer(middleware::from_fn(identity_middleware))
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            rate_limit_middleware,
        ));

    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(listener: TcpListener, state: Arc<AppState>) -> std::io::Result<()> {
    let shutdown = state.shutdown.clone();
    let app = router(state);

    info!(addr = ?listener.local_addr().ok(), "forum gateway listening");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move { shutdown.cancelled().await })
    .await
}
