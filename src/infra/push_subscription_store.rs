use anyhow::Result;
use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::Row;
use uuid::Uuid;

use crate::domain::push_subscription::{PushKeys, PushSubscription};
use crate::infra::db::Db;

#[async_trait]
pub trait PushSubscriptionStore: Send + Sync {
    /// Registers an endpoint for `user_id`. Re-registering an endpoint
    /// refreshes its keys and owner instead of creating a duplicate.
    async fn upsert(
        &self,
        user_id: Uuid,
        endpoint: &str,
        keys: &PushKeys,
    ) -> Result<PushSubscription>;

    async fn list_by_user(&self, user_id: Uuid) -> Result<Vec<PushSubscription>>;

    async fn delete(&self, subscription_id: Uuid) -> Result<bool>;

    async fn delete_for_user(&self, user_id: Uuid, subscription_id: Uuid) -> Result<bool>;
}

#[derive(Clone)]
pub struct PgPushSubscriptionStore {
    db: Db,
}

impl PgPushSubscriptionStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

#[async_trait]
impl PushSubscriptionStore for PgPushSubscriptionStore {
    async fn upsert(
        &self,
        user_id: Uuid,
        endpoint: &str,
        keys: &PushKeys,
    ) -> Result<PushSubscription> {
        let row = sqlx::query(
            "INSERT INTO push_subscriptions (user_id, endpoint, p256dh, auth) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (endpoint) DO UPDATE \
             SET user_id = EXCLUDED.user_id, p256dh = EXCLUDED.p256dh, auth = EXCLUDED.auth \
             RETURNING id, user_id, endpoint, p256dh, auth, created_at",
        )
        .bind(user_id)
        .bind(endpoint)
        .bind(&keys.p256dh)
        .bind(&keys.auth)
        .fetch_one(self.db.pool())
        .await?;

        Ok(subscription_from_row(&row))
    }

    async fn list_by_user(&self, user_id: Uuid) -> Result<Vec<PushSubscription>> {
        let rows = sqlx::query(
            "SELECT id, user_id, endpoint, p256dh, auth, created_at \
             FROM push_subscriptions \
             WHERE user_id = $1 \
             ORDER BY created_at ASC",
        )
        .bind(user_id)
        .fetch_all(self.db.pool())
        .await?;

        Ok(rows.iter().map(subscription_from_row).collect())
    }

    async fn delete(&self, subscription_id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM push_subscriptions WHERE id = $1")
            .bind(subscription_id)
            .execute(self.db.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_for_user(&self, user_id: Uuid, subscription_id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM push_subscriptions WHERE id = $1 AND user_id = $2")
            .bind(subscription_id)
            .bind(user_id)
            .execute(self.db.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

fn subscription_from_row(row: &PgRow) -> PushSubscription {
    PushSubscription {
        id: row.get("id"),
        user_id: row.get("user_id"),
        endpoint: row.get("endpoint"),
        keys: PushKeys {
            p256dh: row.get("p256dh"),
            auth: row.get("auth"),
        },
        created_at: row.get("created_at"),
    }
}
