//! Per-user notification fan-out.
//!
//! New notifications are persisted first and then offered to every live
//! subscriber of the target user with a non-blocking send. A subscriber
//! whose buffer is full simply misses that notification; the store still
//! has it. Delivery on the live path is therefore at most once.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, error, info};

use crate::error::StoreError;
use crate::metrics::{NOTIFICATIONS_CREATED, NOTIFICATIONS_DELIVERED, NOTIFICATIONS_DROPPED};
use crate::models::{NewNotification, Notification};
use crate::store::NotificationStore;

pub type SubscriberId = u64;

struct SubscriberSlot {
    id: SubscriberId,
    sender: mpsc::Sender<Notification>,
}

/// Receiving end of one live subscription.
///
/// Yields `None` once the hub has unregistered it.
pub struct Subscription {
    pub id: SubscriberId,
    pub receiver: mpsc::Receiver<Notification>,
}

pub struct NotificationHub {
    store: Arc<dyn NotificationStore>,
    subscribers: RwLock<HashMap<String, Vec<SubscriberSlot>>>,
    capacity: usize,
    next_id: AtomicU64,
}

impl NotificationHub {
    pub fn new(store: Arc<dyn NotificationStore>, capacity: usize) -> Self {
        Self {
            store,
            subscribers: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn register_client(&self, user_id: &str) -> Subscription {
        let (sender, receiver) = mpsc::channel(self.capacity);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let live = {
            let mut subscribers = self.subscribers.write();
            let slots = subscribers.entry(user_id.to_string()).or_default();
            slots.push(SubscriberSlot { id, sender });
            slots.len()
        };

        info!(user_id, subscriber_id = id, live, "subscriber registered");
        Subscription { id, receiver }
    }

    /// Remove a subscriber and close its channel. Unknown ids are ignored.
    pub fn unregister_client(&self, user_id: &str, id: SubscriberId) {
        let removed = {
            let mut subscribers = self.subscribers.write();
            let Some(slots) = subscribers.get_mut(user_id) else {
                return;
            };
            let before = slots.len();
            // Dropping the sender closes the channel for the receiver.
            slots.retain(|slot| slot.id != id);
            let removed = slots.len() != before;
            if slots.is_empty() {
                subscribers.remove(user_id);
            }
            removed
        };

        if removed {
            info!(user_id, subscriber_id = id, "subscriber unregistered");
        }
    }

    /// Persist `notification`, then push it to the user's live subscribers.
    ///
    /// A persistence failure is returned and nothing is broadcast.
    pub async fn create_notification(
        &self,
        notification: NewNotification,
    ) -> Result<Notification, StoreError> {
        let stored = self
            .store
            .create(notification)
            .await
            .inspect_err(|e| error!(error = %e, "failed to persist notification"))?;
        NOTIFICATIONS_CREATED.inc();

        self.broadcast(&stored);
        Ok(stored)
    }

    fn broadcast(&self, notification: &Notification) {
        let subscribers = self.subscribers.read();
        let Some(slots) = subscribers.get(&notification.user_id) else {
            return;
        };

        for slot in slots {
            match slot.sender.try_send(notification.clone()) {
                Ok(()) => NOTIFICATIONS_DELIVERED.inc(),
                Err(TrySendError::Full(_)) => {
                    NOTIFICATIONS_DROPPED.inc();
                    debug!(
                        user_id = %notification.user_id,
                        subscriber_id = slot.id,
                        notification_id = notification.id,
                        "subscriber buffer full, dropping live delivery"
                    );
                }
                // The stream is tearing down and will unregister itself.
                Err(TrySendError::Closed(_)) => {}
            }
        }
    }

    pub async fn get_notifications(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<Notification>, StoreError> {
        self.store.get_by_user_id(user_id, limit).await
    }

    pub async fn get_unread_count(&self, user_id: &str) -> Result<u64, StoreError> {
        self.store.get_unread_count(user_id).await
    }

    pub async fn mark_as_read(&self, id: i64, user_id: &str) -> Result<(), StoreError> {
        self.store.mark_as_read(id, user_id).await
    }

    pub async fn mark_all_as_read(&self, user_id: &str) -> Result<u64, StoreError> {
        self.store.mark_all_as_read(user_id).await
    }

    pub fn subscriber_count(&self, user_id: &str) -> usize {
        self.subscribers
            .read()
            .get(user_id)
            .map_or(0, Vec::len)
    }

    pub fn connected_users(&self) -> usize {
        self.subscribers.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryNotificationStore;
    use async_trait::async_trait;

    fn notify(user: &str, title: &str) -> NewNotification {
        NewNotification {
            user_id: user.into(),
            actor_id: "actor".into(),
            kind: "mention".into(),
            title: title.into(),
            message: format!("{title} body"),
            related_type: Some("post".into()),
            related_id: Some("1".into()),
        }
    }

    fn hub_with_store(capacity: usize) -> (NotificationHub, Arc<MemoryNotificationStore>) {
        let store = Arc::new(MemoryNotificationStore::new());
        (NotificationHub::new(store.clone(), capacity), store)
    }

    #[tokio::test]
    async fn registered_subscriber_receives_exactly_one_message() {
        let (hub, _) = hub_with_store(10);
        let mut sub = hub.register_client("u1");

        let created = hub.create_notification(notify("u1", "hello")).await.unwrap();

        assert_eq!(sub.receiver.recv().await.unwrap(), created);
        assert!(sub.receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn every_subscriber_of_a_user_gets_the_notification() {
        let (hub, _) = hub_with_store(10);
        let mut tab = hub.register_client("u1");
        let mut phone = hub.register_client("u1");
        let mut other = hub.register_client("u2");

        let created = hub.create_notification(notify("u1", "n")).await.unwrap();

        assert_eq!(tab.receiver.recv().await.unwrap().id, created.id);
        assert_eq!(phone.receiver.recv().await.unwrap().id, created.id);
        assert!(other.receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn full_subscriber_drops_but_store_keeps_everything() {
        let (hub, _) = hub_with_store(10);
        let mut sub = hub.register_client("u1");

        for i in 0..11 {
            hub.create_notification(notify("u1", &format!("n{i}")))
                .await
                .unwrap();
        }

        let mut received = Vec::new();
        while let Ok(n) = sub.receiver.try_recv() {
            received.push(n.title);
        }
        let expected: Vec<String> = (0..10).map(|i| format!("n{i}")).collect();
        assert_eq!(received, expected);

        assert_eq!(hub.get_notifications("u1", 100).await.unwrap().len(), 11);
    }

    #[tokio::test]
    async fn unregister_closes_channel_and_removes_empty_entry() {
        let (hub, _) = hub_with_store(10);
        let mut sub = hub.register_client("u1");
        assert_eq!(hub.connected_users(), 1);

        hub.unregister_client("u1", sub.id);

        assert!(sub.receiver.recv().await.is_none());
        assert_eq!(hub.subscriber_count("u1"), 0);
        assert_eq!(hub.connected_users(), 0);

        // Still persisted, just nobody is listening.
        hub.create_notification(notify("u1", "late")).await.unwrap();
    }

    #[tokio::test]
    async fn unregister_keeps_sibling_subscribers() {
        let (hub, _) = hub_with_store(10);
        let first = hub.register_client("u1");
        let mut second = hub.register_client("u1");

        hub.unregister_client("u1", first.id);
        assert_eq!(hub.subscriber_count("u1"), 1);

        hub.create_notification(notify("u1", "n")).await.unwrap();
        assert!(second.receiver.recv().await.is_some());
    }

    #[test]
    fn unregister_without_register_is_a_noop() {
        let (hub, _) = hub_with_store(10);
        hub.unregister_client("ghost", 99);
        let sub = hub.register_client("u1");
        hub.unregister_client("u1", sub.id + 1);
        assert_eq!(hub.subscriber_count("u1"), 1);
    }

    struct FailingStore;

    #[async_trait]
    impl NotificationStore for FailingStore {
        async fn create(&self, _: NewNotification) -> Result<Notification, StoreError> {
            Err(StoreError::Unavailable("disk full".into()))
        }
        async fn get_by_user_id(&self, _: &str, _: usize) -> Result<Vec<Notification>, StoreError> {
            Ok(Vec::new())
        }
        async fn get_unread_count(&self, _: &str) -> Result<u64, StoreError> {
            Err(StoreError::Unavailable("disk full".into()))
        }
        async fn mark_as_read(&self, _: i64, _: &str) -> Result<(), StoreError> {
            Ok(())
        }
        async fn mark_all_as_read(&self, _: &str) -> Result<u64, StoreError> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn persistence_failure_is_returned_and_not_broadcast() {
        let hub = NotificationHub::new(Arc::new(FailingStore), 10);
        let mut sub = hub.register_client("u1");

        let result = hub.create_notification(notify("u1", "n")).await;

        assert!(matches!(result, Err(StoreError::Unavailable(_))));
        assert!(sub.receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn read_operations_pass_through_to_store() {
        let (hub, store) = hub_with_store(10);
        let a = hub.create_notification(notify("u1", "a")).await.unwrap();
        hub.create_notification(notify("u1", "b")).await.unwrap();
        assert_eq!(store.len(), 2);

        assert_eq!(hub.get_unread_count("u1").await.unwrap(), 2);
        hub.mark_as_read(a.id, "u1").await.unwrap();
        assert_eq!(hub.get_unread_count("u1").await.unwrap(), 1);
        assert_eq!(hub.mark_all_as_read("u1").await.unwrap(), 1);
        assert_eq!(hub.get_unread_count("u1").await.unwrap(), 0);
    }
}
