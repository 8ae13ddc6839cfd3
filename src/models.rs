use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// Stored notification, as returned by the store and pushed to live streams
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: i64,
    pub user_id: String,
    pub actor_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub is_read: bool,
}

// Notification before the store has assigned an id and timestamp
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNotification {
    pub user_id: String,
    pub actor_id: String,
    pub kind: String,
    pub title: String,
    pub message: String,
    pub related_type: Option<String>,
    pub related_id: Option<String>,
}

// Body of POST /api/notifications; the actor is the authenticated caller
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateNotificationRequest {
    pub user_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub related_type: Option<String>,
    #[serde(default)]
    pub related_id: Option<String>,
}

impl CreateNotificationRequest {
    pub fn into_new(self, actor_id: String) -> NewNotification {
        NewNotification {
            user_id: self.user_id,
            actor_id,
            kind: self.kind,
            title: self.title,
            message: self.message,
            related_type: self.related_type,
            related_id: self.related_id,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListQuery {
    pub limit: Option<usize>,
}
