use anyhow::{anyhow, Result};
use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::Row;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::notification::{Notification, NotificationCategory};
use crate::infra::db::Db;

/// Durable notification history.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn insert(&self, notification: &Notification) -> Result<()>;

    /// Newest first. `cursor` is the `(created_at, id)` of the last item of the
    /// previous page.
    async fn list_by_user(
        &self,
        user_id: Uuid,
        cursor: Option<(OffsetDateTime, Uuid)>,
        limit: i64,
    ) -> Result<Vec<Notification>>;

    /// Marks unread notifications created strictly before `cutoff` as read and
    /// returns how many changed.
    async fn mark_read_before(&self, user_id: Uuid, cutoff: OffsetDateTime) -> Result<u64>;

    async fn ping(&self) -> Result<()>;
}

#[derive(Clone)]
pub struct PgNotificationStore {
    db: Db,
}

impl PgNotificationStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

#[async_trait]
impl NotificationStore for PgNotificationStore {
    async fn insert(&self, notification: &Notification) -> Result<()> {
        sqlx::query(
            "INSERT INTO notifications (id, user_id, title, body, category, read, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(notification.id)
        .bind(notification.user_id)
        .bind(&notification.title)
        .bind(&notification.body)
        .bind(notification.category.as_str())
        .bind(notification.read)
        .bind(notification.created_at)
        .execute(self.db.pool())
        .await?;

        Ok(())
    }

    async fn list_by_user(
        &self,
        user_id: Uuid,
        cursor: Option<(OffsetDateTime, Uuid)>,
        limit: i64,
    ) -> Result<Vec<Notification>> {
        let rows = match cursor {
            Some((created_at, notification_id)) => {
                sqlx::query(
                    "SELECT id, user_id, title, body, category, read, created_at \
                     FROM notifications \
                     WHERE user_id = $1 \
                       AND (created_at < $2 OR (created_at = $2 AND id < $3)) \
                     ORDER BY created_at DESC, id DESC \
                     LIMIT $4",
                )
                .bind(user_id)
                .bind(created_at)
                .bind(notification_id)
                .bind(limit)
                .fetch_all(self.db.pool())
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT id, user_id, title, body, category, read, created_at \
                     FROM notifications \
                     WHERE user_id = $1 \
                     ORDER BY created_at DESC, id DESC \
                     LIMIT $2",
                )
                .bind(user_id)
                .bind(limit)
                .fetch_all(self.db.pool())
                .await?
            }
        };

        rows.iter().map(notification_from_row).collect()
    }

    async fn mark_read_before(&self, user_id: Uuid, cutoff: OffsetDateTime) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE notifications \
             SET read = TRUE \
             WHERE user_id = $1 AND created_at < $2 AND read = FALSE",
        )
        .bind(user_id)
        .bind(cutoff)
        .execute(self.db.pool())
        .await?;

        Ok(result.rows_affected())
    }

    async fn ping(&self) -> Result<()> {
        self.db.ping().await
    }
}

fn notification_from_row(row: &PgRow) -> Result<Notification> {
    let category: String = row.get("category");
    let category = category
        .parse::<NotificationCategory>()
        .map_err(|err| anyhow!(err))?;

    Ok(Notification {
        id: row.get("id"),
        user_id: row.get("user_id"),
        title: row.get("title"),
        body: row.get("body"),
        category,
        read: row.get("read"),
        created_at: row.get("created_at"),
    })
}
