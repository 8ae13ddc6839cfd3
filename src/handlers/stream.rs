//! Live notification stream (Server-Sent Events).
//!
//! One long-lived task per open connection. It registers a subscriber, sends
//! a `connected` frame and a best-effort unread snapshot, then waits on three
//! sources at once: cancellation, the subscriber channel and a heartbeat
//! timer. Dropping the stream (client gone) or server shutdown ends it, and
//! the subscriber is always unregistered on the way out.

use axum::{
    extract::State,
    http::header,
    response::{
        IntoResponse,
        sse::{Event, Sse},
    },
};
use futures::Stream;
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::hub::{NotificationHub, SubscriberId, Subscription};
use crate::identity::CurrentUser;
use crate::metrics::SSE_CONNECTIONS;
use crate::state::AppState;

const HEARTBEAT_COMMENT: &str = "heartbeat";

// Unregisters the subscriber when the stream is dropped, however it ends
struct SubscriptionGuard {
    hub: Arc<NotificationHub>,
    user_id: String,
    id: SubscriberId,
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        self.hub.unregister_client(&self.user_id, self.id);
        SSE_CONNECTIONS.dec();
        info!(user_id = %self.user_id, subscriber_id = self.id, "notification stream closed");
    }
}

pub async fn stream_handler(
    State(state): State<Arc<AppState>>,
    CurrentUser(user_id): CurrentUser,
) -> impl IntoResponse {
    let subscription = state.hub.register_client(&user_id);
    SSE_CONNECTIONS.inc();
    info!(user_id = %user_id, subscriber_id = subscription.id, "notification stream opened");

    let guard = SubscriptionGuard {
        hub: Arc::clone(&state.hub),
        user_id,
        id: subscription.id,
    };
    let events = notification_events(
        guard,
        subscription,
        state.stream.heartbeat_interval,
        state.shutdown.clone(),
    );

    ([(header::CONNECTION, "keep-alive")], Sse::new(events))
}

fn notification_events(
    guard: SubscriptionGuard,
    subscription: Subscription,
    heartbeat_period: Duration,
    cancel: CancellationToken,
) -> impl Stream<Item = Result<Event, Infallible>> {
    let Subscription { mut receiver, .. } = subscription;

    async_stream::stream! {
        let guard = guard;

        yield Ok(Event::default().data(json!({ "type": "connected" }).to_string()));

        match guard.hub.get_unread_count(&guard.user_id).await {
            Ok(count) => {
                yield Ok(Event::default()
                    .data(json!({ "type": "unread_count", "count": count }).to_string()));
            }
            Err(e) => warn!(user_id = %guard.user_id, error = %e, "skipping unread count snapshot"),
        }

        let mut heartbeat = interval_at(Instant::now() + heartbeat_period, heartbeat_period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => break,
                message = receiver.recv() => {
                    let Some(notification) = message else { break };
                    match Event::default().json_data(&notification) {
                        Ok(event) => event,
                        Err(e) => {
                            warn!(notification_id = notification.id, error = %e, "failed to encode notification");
                            continue;
                        }
                    }
                }
                _ = heartbeat.tick() => Event::default().comment(HEARTBEAT_COMMENT),
            };
            yield Ok(event);
        }
    }
}
