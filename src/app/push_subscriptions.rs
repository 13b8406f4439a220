use anyhow::Result;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::push_subscription::{PushKeys, PushSubscription};
use crate::infra::push_subscription_store::PushSubscriptionStore;

#[derive(Clone)]
pub struct PushSubscriptionService {
    store: Arc<dyn PushSubscriptionStore>,
}

impl PushSubscriptionService {
    pub fn new(store: Arc<dyn PushSubscriptionStore>) -> Self {
        Self { store }
    }

    /// Callers validate the endpoint first.
    pub async fn register(
        &self,
        user_id: Uuid,
        endpoint: &str,
        keys: PushKeys,
    ) -> Result<PushSubscription> {
        self.store.upsert(user_id, endpoint, &keys).await
    }

    pub async fn list(&self, user_id: Uuid) -> Result<Vec<PushSubscription>> {
        self.store.list_by_user(user_id).await
    }

    pub async fn remove(&self, user_id: Uuid, subscription_id: Uuid) -> Result<bool> {
        self.store.delete_for_user(user_id, subscription_id).await
    }
}
