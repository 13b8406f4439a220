#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;
use uuid::Uuid;

use courier::app::auth::AuthService;
use courier::app::notifications::NotificationService;
use courier::app::push_subscriptions::PushSubscriptionService;
use courier::app::realtime::SubscriptionRegistry;
use courier::config::RealtimeConfig;
use courier::domain::notification::Notification;
use courier::domain::push_subscription::{PushKeys, PushPayload, PushSubscription};
use courier::infra::notification_store::NotificationStore;
use courier::infra::push::{OfflinePusher, PushError};
use courier::infra::push_subscription_store::PushSubscriptionStore;
use courier::AppState;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

const TEST_ACCESS_KEY: [u8; 32] = *b"0123456789abcdef0123456789abcdef";
pub const TEST_ADMIN_TOKEN: &str = "test-admin-token-12345";

// ---------------------------------------------------------------------------
// In-memory notification store
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryNotificationStore {
    items: Mutex<Vec<Notification>>,
    fail_inserts: AtomicBool,
}

impl MemoryNotificationStore {
    pub fn fail_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::SeqCst);
    }

    pub fn all(&self) -> Vec<Notification> {
        self.items.lock().unwrap().clone()
    }

    pub fn get(&self, id: Uuid) -> Option<Notification> {
        self.items
            .lock()
            .unwrap()
            .iter()
            .find(|notification| notification.id == id)
            .cloned()
    }
}

#[async_trait]
impl NotificationStore for MemoryNotificationStore {
    async fn insert(&self, notification: &Notification) -> Result<()> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(anyhow!("database unavailable"));
        }
        self.items.lock().unwrap().push(notification.clone());
        Ok(())
    }

    async fn list_by_user(
        &self,
        user_id: Uuid,
        cursor: Option<(OffsetDateTime, Uuid)>,
        limit: i64,
    ) -> Result<Vec<Notification>> {
        let mut items: Vec<Notification> = self
            .items
            .lock()
            .unwrap()
            .iter()
            .filter(|notification| notification.user_id == user_id)
            .filter(|notification| match cursor {
                Some(cursor) => (notification.created_at, notification.id) < cursor,
                None => true,
            })
            .cloned()
            .collect();
        items.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        items.truncate(limit as usize);
        Ok(items)
    }

    async fn mark_read_before(&self, user_id: Uuid, cutoff: OffsetDateTime) -> Result<u64> {
        let mut updated = 0;
        for notification in self.items.lock().unwrap().iter_mut() {
            if notification.user_id == user_id && notification.created_at < cutoff && !notification.read {
                notification.read = true;
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// In-memory push subscription store
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryPushStore {
    items: Mutex<Vec<PushSubscription>>,
}

impl MemoryPushStore {
    pub fn all(&self) -> Vec<PushSubscription> {
        self.items.lock().unwrap().clone()
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.items.lock().unwrap().iter().any(|item| item.id == id)
    }
}

#[async_trait]
impl PushSubscriptionStore for MemoryPushStore {
    async fn upsert(
        &self,
        user_id: Uuid,
        endpoint: &str,
        keys: &PushKeys,
    ) -> Result<PushSubscription> {
        let mut items = self.items.lock().unwrap();
        if let Some(existing) = items.iter_mut().find(|item| item.endpoint == endpoint) {
            existing.user_id = user_id;
            existing.keys = keys.clone();
            return Ok(existing.clone());
        }
        let subscription = PushSubscription {
            id: Uuid::new_v4(),
            user_id,
            endpoint: endpoint.to_string(),
            keys: keys.clone(),
            created_at: OffsetDateTime::now_utc(),
        };
        items.push(subscription.clone());
        Ok(subscription)
    }

    async fn list_by_user(&self, user_id: Uuid) -> Result<Vec<PushSubscription>> {
        Ok(self
            .items
            .lock()
            .unwrap()
            .iter()
            .filter(|item| item.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn delete(&self, subscription_id: Uuid) -> Result<bool> {
        let mut items = self.items.lock().unwrap();
        let before = items.len();
        items.retain(|item| item.id != subscription_id);
        Ok(items.len() < before)
    }

    async fn delete_for_user(&self, user_id: Uuid, subscription_id: Uuid) -> Result<bool> {
        let mut items = self.items.lock().unwrap();
        let before = items.len();
        items.retain(|item| !(item.id == subscription_id && item.user_id == user_id));
        Ok(items.len() < before)
    }
}

// ---------------------------------------------------------------------------
// Recording offline pusher
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub enum PushBehavior {
    Accept,
    Gone,
    Unavailable,
}

#[derive(Default)]
pub struct RecordingPusher {
    sent: Mutex<Vec<(PushSubscription, PushPayload)>>,
    behavior: Mutex<HashMap<String, PushBehavior>>,
}

impl RecordingPusher {
    pub fn set_behavior(&self, endpoint: &str, behavior: PushBehavior) {
        self.behavior
            .lock()
            .unwrap()
            .insert(endpoint.to_string(), behavior);
    }

    pub fn calls(&self) -> Vec<(PushSubscription, PushPayload)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl OfflinePusher for RecordingPusher {
    async fn send(
        &self,
        subscription: &PushSubscription,
        payload: &PushPayload,
    ) -> Result<(), PushError> {
        self.sent
            .lock()
            .unwrap()
            .push((subscription.clone(), payload.clone()));
        let behavior = self
            .behavior
            .lock()
            .unwrap()
            .get(&subscription.endpoint)
            .copied()
            .unwrap_or(PushBehavior::Accept);
        match behavior {
            PushBehavior::Accept => Ok(()),
            PushBehavior::Gone => Err(PushError::Gone(410)),
            PushBehavior::Unavailable => Err(PushError::Rejected(503)),
        }
    }
}

// ---------------------------------------------------------------------------
// TestApp: in-memory wiring of the full service
// ---------------------------------------------------------------------------

pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub store: Arc<MemoryNotificationStore>,
    pub push_store: Arc<MemoryPushStore>,
    pub pusher: Arc<RecordingPusher>,
    pub registry: Arc<SubscriptionRegistry>,
    pub shutdown: CancellationToken,
}

pub struct TestResponse {
    pub status: StatusCode,
    body_bytes: bytes::Bytes,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body_bytes).unwrap_or(Value::Null)
    }

    pub fn error_message(&self) -> String {
        self.json()["error"].as_str().unwrap_or("").to_string()
    }
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(RealtimeConfig::default())
    }

    pub fn with_config(config: RealtimeConfig) -> Self {
        let store = Arc::new(MemoryNotificationStore::default());
        let push_store = Arc::new(MemoryPushStore::default());
        let pusher = Arc::new(RecordingPusher::default());
        let registry = Arc::new(SubscriptionRegistry::new(config.queue_capacity));
        let shutdown = CancellationToken::new();

        let notifications = NotificationService::new(
            store.clone(),
            push_store.clone(),
            pusher.clone(),
            Arc::clone(&registry),
            &config,
            shutdown.clone(),
        );

        let state = AppState {
            notifications,
            push_subscriptions: PushSubscriptionService::new(push_store.clone()),
            auth: AuthService::new(TEST_ACCESS_KEY),
            admin_token: Some(TEST_ADMIN_TOKEN.to_string()),
            heartbeat_interval: config.heartbeat_interval,
        };
        let router = courier::http::router(state.clone());

        TestApp {
            router,
            state,
            store,
            push_store,
            pusher,
            registry,
            shutdown,
        }
    }

    pub fn service(&self) -> &NotificationService {
        &self.state.notifications
    }

    pub fn token_for(&self, user_id: Uuid) -> String {
        self.state
            .auth
            .issue_access_token(user_id, Duration::from_secs(900))
            .expect("failed to issue token")
    }

    pub async fn add_push_subscription(&self, user_id: Uuid, endpoint: &str) -> PushSubscription {
        self.push_store
            .upsert(
                user_id,
                endpoint,
                &PushKeys {
                    p256dh: "BNcRdreALRFXTkOOUHK1EtK2wtaz5Ry4YfYCA_0QTpQtUbVlUls0VJXg7A8u-Ts1XbjhazAkj7I99e8QcYP7DkM".into(),
                    auth: "tBHItJI5svbpez7KI4CCXg".into(),
                },
            )
            .await
            .expect("upsert failed")
    }

    // ------------------------------------------------------------------
    // Low-level request helpers
    // ------------------------------------------------------------------
    pub async fn raw_request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        headers: &[(&str, &str)],
    ) -> Response {
        let mut builder = Request::builder()
            .method(method)
            .uri(path)
            .header("host", "localhost");

        for &(key, value) in headers {
            builder = builder.header(key, value);
        }

        let request = if let Some(body) = body {
            builder
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_string(&body).unwrap()))
                .unwrap()
        } else {
            builder.body(Body::empty()).unwrap()
        };

        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("oneshot failed")
    }

    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        headers: &[(&str, &str)],
    ) -> TestResponse {
        let response = self.raw_request(method, path, body, headers).await;
        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("failed to collect body")
            .to_bytes();

        TestResponse { status, body_bytes }
    }

    // ------------------------------------------------------------------
    // Convenience HTTP helpers
    // ------------------------------------------------------------------
    pub async fn get(&self, path: &str, token: Option<&str>) -> TestResponse {
        let auth = token.map(|t| format!("Bearer {}", t));
        let headers: Vec<(&str, &str)> = auth
            .as_deref()
            .map(|value| vec![("Authorization", value)])
            .unwrap_or_default();
        self.request(Method::GET, path, None, &headers).await
    }

    pub async fn post_json(&self, path: &str, body: Value, token: Option<&str>) -> TestResponse {
        let auth = token.map(|t| format!("Bearer {}", t));
        let headers: Vec<(&str, &str)> = auth
            .as_deref()
            .map(|value| vec![("Authorization", value)])
            .unwrap_or_default();
        self.request(Method::POST, path, Some(body), &headers).await
    }

    pub async fn post(&self, path: &str, token: Option<&str>) -> TestResponse {
        let auth = token.map(|t| format!("Bearer {}", t));
        let headers: Vec<(&str, &str)> = auth
            .as_deref()
            .map(|value| vec![("Authorization", value)])
            .unwrap_or_default();
        self.request(Method::POST, path, None, &headers).await
    }

    pub async fn delete(&self, path: &str, token: Option<&str>) -> TestResponse {
        let auth = token.map(|t| format!("Bearer {}", t));
        let headers: Vec<(&str, &str)> = auth
            .as_deref()
            .map(|value| vec![("Authorization", value)])
            .unwrap_or_default();
        self.request(Method::DELETE, path, None, &headers).await
    }

    /// POST with an admin token in the x-admin-token header.
    pub async fn post_admin(&self, path: &str, body: Value) -> TestResponse {
        self.request(
            Method::POST,
            path,
            Some(body),
            &[("x-admin-token", TEST_ADMIN_TOKEN)],
        )
        .await
    }

    pub async fn get_admin(&self, path: &str) -> TestResponse {
        self.request(Method::GET, path, None, &[("x-admin-token", TEST_ADMIN_TOKEN)])
            .await
    }
}
