use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::notification::{Notification, NotificationCategory};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PushKeys {
    pub p256dh: String,
    pub auth: String,
}

/// Offline delivery target registered by a device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushSubscription {
    pub id: Uuid,
    pub user_id: Uuid,
    pub endpoint: String,
    pub keys: PushKeys,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

pub const PUSH_PAYLOAD_VERSION: u8 = 1;

/// Body handed to the offline pusher. The field set is fixed; bump
/// `PUSH_PAYLOAD_VERSION` when it changes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PushPayload {
    pub version: u8,
    pub notification_id: Uuid,
    pub title: String,
    pub message: String,
    pub category: NotificationCategory,
}

impl From<&Notification> for PushPayload {
    fn from(notification: &Notification) -> Self {
        Self {
            version: PUSH_PAYLOAD_VERSION,
            notification_id: notification.id,
            title: notification.title.clone(),
            message: notification.body.clone(),
            category: notification.category,
        }
    }
}
