//! Durable side of notifications.
//!
//! The hub only ever reads existence and read status from a store; its live
//! subscriber state is never authoritative.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;

use crate::error::StoreError;
use crate::models::{NewNotification, Notification};

#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Persist a notification, assigning its id and creation time.
    async fn create(&self, notification: NewNotification) -> Result<Notification, StoreError>;

    /// Newest first, at most `limit` entries.
    async fn get_by_user_id(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<Notification>, StoreError>;

    async fn get_unread_count(&self, user_id: &str) -> Result<u64, StoreError>;

    /// Fails with [`StoreError::NotFound`] when `id` does not belong to `user_id`.
    async fn mark_as_read(&self, id: i64, user_id: &str) -> Result<(), StoreError>;

    /// Returns how many notifications changed state.
    async fn mark_all_as_read(&self, user_id: &str) -> Result<u64, StoreError>;
}

struct Rows {
    next_id: i64,
    notifications: Vec<Notification>,
}

/// In-process store used by the binary and the tests.
pub struct MemoryNotificationStore {
    rows: RwLock<Rows>,
}

impl Default for MemoryNotificationStore {
    fn default() -> Self {
        Self {
            rows: RwLock::new(Rows {
                next_id: 1,
                notifications: Vec::new(),
            }),
        }
    }
}

impl MemoryNotificationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.read().notifications.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl NotificationStore for MemoryNotificationStore {
    async fn create(&self, new: NewNotification) -> Result<Notification, StoreError> {
        let mut rows = self.rows.write();
        let notification = Notification {
            id: rows.next_id,
            user_id: new.user_id,
            actor_id: new.actor_id,
            kind: new.kind,
            title: new.title,
            message: new.message,
            related_type: new.related_type,
            related_id: new.related_id,
            created_at: Utc::now(),
            is_read: false,
        };
        rows.next_id += 1;
        rows.notifications.push(notification.clone());
        Ok(notification)
    }

    async fn get_by_user_id(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<Notification>, StoreError> {
        let rows = self.rows.read();
        // Insertion order is id order, so reverse iteration is newest first.
        Ok(rows
            .notifications
            .iter()
            .rev()
            .filter(|n| n.user_id == user_id)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn get_unread_count(&self, user_id: &str) -> Result<u64, StoreError> {
        let rows = self.rows.read();
        Ok(rows
            .notifications
            .iter()
            .filter(|n| n.user_id == user_id && !n.is_read)
            .count() as u64)
    }

    async fn mark_as_read(&self, id: i64, user_id: &str) -> Result<(), StoreError> {
        let mut rows = self.rows.write();
        let notification = rows
            .notifications
            .iter_mut()
            .find(|n| n.id == id && n.user_id == user_id)
            .ok_or(StoreError::NotFound)?;
        notification.is_read = true;
        Ok(())
    }

    async fn mark_all_as_read(&self, user_id: &str) -> Result<u64, StoreError> {
        let mut rows = self.rows.write();
        let mut updated = 0;
        for n in rows
            .notifications
            .iter_mut()
            .filter(|n| n.user_id == user_id && !n.is_read)
        {
            n.is_read = true;
            updated += 1;
        }
        Ok(updated)
    }
}
