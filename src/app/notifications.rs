use anyhow::Result;
use serde::Serialize;
use std::sync::Arc;
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::app::realtime::{
    Connection, ConnectionHandle, DispatchReport, Dispatcher, RealtimeError, RegistryStats,
    SubscriptionRegistry,
};
use crate::config::RealtimeConfig;
use crate::domain::notification::{Notification, NotificationCategory};
use crate::domain::push_subscription::PushPayload;
use crate::infra::notification_store::NotificationStore;
use crate::infra::push::OfflinePusher;
use crate::infra::push_subscription_store::PushSubscriptionStore;

const MAX_DEVICE_ID_LEN: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryState {
    /// Every live device accepted the notification.
    Delivered,
    /// Some live devices accepted it, others dropped it.
    PartiallyDelivered,
    /// No live device accepted it; the offline channel was used.
    QueuedOffline,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OfflineReport {
    pub attempted: usize,
    pub sent: usize,
    pub removed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct NotifyOutcome {
    pub notification: Notification,
    pub persisted: bool,
    pub state: DeliveryState,
    pub live: DispatchReport,
    pub offline: OfflineReport,
}

/// Entry point for notification intents and device stream lifecycle.
#[derive(Clone)]
pub struct NotificationService {
    store: Arc<dyn NotificationStore>,
    push_store: Arc<dyn PushSubscriptionStore>,
    pusher: Arc<dyn OfflinePusher>,
    registry: Arc<SubscriptionRegistry>,
    dispatcher: Dispatcher,
    shutdown: CancellationToken,
}

impl NotificationService {
    pub fn new(
        store: Arc<dyn NotificationStore>,
        push_store: Arc<dyn PushSubscriptionStore>,
        pusher: Arc<dyn OfflinePusher>,
        registry: Arc<SubscriptionRegistry>,
        config: &RealtimeConfig,
        shutdown: CancellationToken,
    ) -> Self {
        let dispatcher = Dispatcher::new(Arc::clone(&registry), config.send_timeout);
        Self {
            store,
            push_store,
            pusher,
            registry,
            dispatcher,
            shutdown,
        }
    }

    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }

    /// Persists, fans out to live devices, and falls back to offline push when
    /// no live device took the notification. Never fails: persistence and
    /// delivery problems are logged.
    pub async fn notify(
        &self,
        user_id: Uuid,
        title: impl Into<String>,
        body: impl Into<String>,
        category: NotificationCategory,
    ) -> NotifyOutcome {
        let notification = Notification::new(user_id, title, body, category);

        let persisted = match self.store.insert(&notification).await {
            Ok(()) => true,
            Err(err) => {
                error!(
                    error = ?err,
                    user_id = %user_id,
                    notification_id = %notification.id,
                    "failed to persist notification"
                );
                false
            }
        };

        let notification = Arc::new(notification);
        let (state, live) = match self.dispatcher.dispatch(Arc::clone(&notification)).await {
            Ok(report) if report.delivered == report.targets => (DeliveryState::Delivered, report),
            Ok(report) if report.delivered > 0 => (DeliveryState::PartiallyDelivered, report),
            Ok(report) => (DeliveryState::QueuedOffline, report),
            Err(RealtimeError::NoActiveDevices) => {
                (DeliveryState::QueuedOffline, DispatchReport::default())
            }
            Err(err) => {
                warn!(error = %err, user_id = %user_id, "live dispatch failed");
                (DeliveryState::QueuedOffline, DispatchReport::default())
            }
        };

        let offline = if state == DeliveryState::QueuedOffline {
            self.push_offline(&notification).await
        } else {
            OfflineReport::default()
        };

        info!(
            user_id = %user_id,
            notification_id = %notification.id,
            persisted,
            state = ?state,
            live_delivered = live.delivered,
            offline_sent = offline.sent,
            "notification processed"
        );

        NotifyOutcome {
            notification: Notification::clone(&notification),
            persisted,
            state,
            live,
            offline,
        }
    }

    async fn push_offline(&self, notification: &Notification) -> OfflineReport {
        let mut report = OfflineReport::default();
        let subscriptions = match self.push_store.list_by_user(notification.user_id).await {
            Ok(subscriptions) => subscriptions,
            Err(err) => {
                error!(error = ?err, user_id = %notification.user_id, "failed to load push subscriptions");
                return report;
            }
        };

        let payload = PushPayload::from(notification);
        for subscription in subscriptions {
            report.attempted += 1;
            match self.pusher.send(&subscription, &payload).await {
                Ok(()) => report.sent += 1,
                Err(err) if err.is_permanent() => {
                    warn!(
                        error = %err,
                        subscription_id = %subscription.id,
                        user_id = %notification.user_id,
                        "push subscription is dead, removing"
                    );
                    match self.push_store.delete(subscription.id).await {
                        Ok(_) => report.removed += 1,
                        Err(err) => error!(
                            error = ?err,
                            subscription_id = %subscription.id,
                            "failed to remove push subscription"
                        ),
                    }
                }
                Err(err) => {
                    warn!(
                        error = %err,
                        subscription_id = %subscription.id,
                        user_id = %notification.user_id,
                        "push delivery failed"
                    );
                }
            }
        }

        report
    }

    pub fn subscribe_stream(
        &self,
        user_id: Uuid,
        device_id: &str,
    ) -> Result<ConnectionHandle, RealtimeError> {
        validate_device_id(device_id)?;
        Ok(self.registry.subscribe(&self.shutdown, user_id, device_id))
    }

    pub fn unsubscribe_stream(&self, user_id: Uuid, device_id: &str) -> Result<(), RealtimeError> {
        validate_device_id(device_id)?;
        self.registry.unsubscribe(user_id, device_id)
    }

    /// Called by the transport when a stream ends on its own.
    pub fn release_stream(&self, connection: &Connection) -> bool {
        self.registry.release(connection)
    }

    pub async fn list(
        &self,
        user_id: Uuid,
        cursor: Option<(OffsetDateTime, Uuid)>,
        limit: i64,
    ) -> Result<Vec<Notification>> {
        self.store.list_by_user(user_id, cursor, limit).await
    }

    pub async fn mark_read(&self, user_id: Uuid, cutoff: OffsetDateTime) -> Result<u64> {
        self.store.mark_read_before(user_id, cutoff).await
    }

    pub fn stats(&self) -> RegistryStats {
        self.registry.stats()
    }

    pub async fn ping(&self) -> Result<()> {
        self.store.ping().await
    }

    /// Ends every live stream and stops accepting delivery.
    pub fn shutdown(&self) -> usize {
        self.shutdown.cancel();
        self.registry.close_all()
    }
}

pub fn validate_device_id(device_id: &str) -> Result<(), RealtimeError> {
    if device_id.is_empty() {
        return Err(RealtimeError::InvalidDevice("device_id is required"));
    }
    if device_id.len() > MAX_DEVICE_ID_LEN {
        return Err(RealtimeError::InvalidDevice(
            "device_id must be at most 128 characters",
        ));
    }
    if !device_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':'))
    {
        return Err(RealtimeError::InvalidDevice(
            "device_id may only contain letters, digits, '-', '_', '.', ':'",
        ));
    }
    Ok(())
}
