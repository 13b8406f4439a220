use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::app::realtime::error::{DeliveryError, RealtimeError};
use crate::app::realtime::registry::SubscriptionRegistry;
use crate::domain::notification::Notification;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    pub targets: usize,
    pub delivered: usize,
    pub timed_out: usize,
    pub cancelled: usize,
}

impl DispatchReport {
    pub fn dropped(&self) -> usize {
        self.timed_out + self.cancelled
    }
}

/// Fans a notification out to every live device of its owner.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<SubscriptionRegistry>,
    send_timeout: Duration,
}

impl Dispatcher {
    pub fn new(registry: Arc<SubscriptionRegistry>, send_timeout: Duration) -> Self {
        Self {
            registry,
            send_timeout,
        }
    }

    /// One task per device, all joined before returning. Devices that time out
    /// or are cancelled simply miss this notification.
    pub async fn dispatch(
        &self,
        notification: Arc<Notification>,
    ) -> Result<DispatchReport, RealtimeError> {
        let targets = self.registry.fan_out_targets(notification.user_id);
        if targets.is_empty() {
            return Err(RealtimeError::NoActiveDevices);
        }

        let mut report = DispatchReport {
            targets: targets.len(),
            ..DispatchReport::default()
        };

        let mut sends = JoinSet::new();
        for connection in targets {
            let notification = Arc::clone(&notification);
            let send_timeout = self.send_timeout;
            sends.spawn(async move {
                let outcome = connection.enqueue(notification, send_timeout).await;
                (connection, outcome)
            });
        }

        while let Some(joined) = sends.join_next().await {
            match joined {
                Ok((_, Ok(()))) => report.delivered += 1,
                Ok((connection, Err(DeliveryError::Timeout))) => {
                    report.timed_out += 1;
                    debug!(
                        device_id = connection.device_id(),
                        notification_id = %notification.id,
                        "device send timed out"
                    );
                }
                Ok((_, Err(DeliveryError::Cancelled))) => report.cancelled += 1,
                Err(err) => {
                    report.cancelled += 1;
                    warn!(error = ?err, notification_id = %notification.id, "device send task failed");
                }
            }
        }

        if report.dropped() > 0 {
            warn!(
                user_id = %notification.user_id,
                notification_id = %notification.id,
                targets = report.targets,
                delivered = report.delivered,
                timed_out = report.timed_out,
                cancelled = report.cancelled,
                "notification dropped for some devices"
            );
        } else {
            debug!(
                user_id = %notification.user_id,
                notification_id = %notification.id,
                delivered = report.delivered,
                "notification dispatched"
            );
        }

        Ok(report)
    }
}
