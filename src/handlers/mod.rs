mod health;
mod metrics;
mod notifications;
mod stream;

pub use health::health_handler;
pub use metrics::metrics_handler;
pub use notifications::{
    create_notification_handler, list_notifications_handler, mark_all_read_handler,
    mark_read_handler, unread_count_handler,
};
pub use stream::stream_handler;
