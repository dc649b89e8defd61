//! Persisted notification model and the drafts processors produce on the way
//! to persistence. Mirrors the Envelope/QueuedMessage split in `envelope.rs`:
//! a processor never writes to the store directly, it only ever returns
//! [`NotificationDraft`] values for the notification service to persist.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationStatus {
    Unread,
    Read,
}

impl Default for NotificationStatus {
    fn default() -> Self {
        NotificationStatus::Unread
    }
}

/// A notification a processor wants persisted. Not yet assigned an id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationDraft {
    pub user_id: String,
    pub subscription_id: String,
    pub title: String,
    pub content: String,
    pub source_url: String,
    pub entity_type: String,
    pub metadata: Map<String, Value>,
}

/// A notification row as stored and as returned by the dedupe lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: String,
    pub subscription_id: String,
    pub title: String,
    pub content: String,
    pub source_url: String,
    pub metadata: Map<String, Value>,
    pub entity_type: String,
    pub status: NotificationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
