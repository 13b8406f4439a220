use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::app::realtime::error::DeliveryError;
use crate::domain::notification::Notification;

pub type QueuedNotification = Arc<Notification>;

/// One live device stream.
///
/// Identity fields are immutable after construction. The registry owns every
/// `Connection`; everybody else sees it through an `Arc` and may only enqueue,
/// read liveness, or `touch`.
pub struct Connection {
    device_id: String,
    user_id: Uuid,
    generation: u64,
    sender: Mutex<Option<mpsc::Sender<QueuedNotification>>>,
    token: CancellationToken,
    opened_at: Instant,
    /// Milliseconds after `opened_at` of the last confirmed activity.
    last_activity_ms: AtomicU64,
}

impl Connection {
    pub(crate) fn open(
        device_id: String,
        user_id: Uuid,
        generation: u64,
        capacity: usize,
        parent: &CancellationToken,
    ) -> (Arc<Self>, mpsc::Receiver<QueuedNotification>) {
        let (sender, receiver) = mpsc::channel(capacity);
        let connection = Arc::new(Self {
            device_id,
            user_id,
            generation,
            sender: Mutex::new(Some(sender)),
            token: parent.child_token(),
            opened_at: Instant::now(),
            last_activity_ms: AtomicU64::new(0),
        });
        (connection, receiver)
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Places a notification on the device queue, waiting at most `timeout`
    /// for a free slot. Returns `Cancelled` once the lifetime has ended.
    pub async fn enqueue(
        &self,
        notification: QueuedNotification,
        timeout: Duration,
    ) -> Result<(), DeliveryError> {
        if self.token.is_cancelled() {
            return Err(DeliveryError::Cancelled);
        }
        let sender = match self.sender_slot().as_ref() {
            Some(sender) => sender.clone(),
            None => return Err(DeliveryError::Cancelled),
        };

        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(DeliveryError::Cancelled),
            sent = tokio::time::timeout(timeout, sender.send(notification)) => match sent {
                Ok(Ok(())) => Ok(()),
                // receiver dropped: the transport already went away
                Ok(Err(_)) => Err(DeliveryError::Cancelled),
                Err(_) => Err(DeliveryError::Timeout),
            },
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn touch(&self) {
        let elapsed = self.opened_at.elapsed().as_millis() as u64;
        self.last_activity_ms.fetch_max(elapsed, Ordering::Relaxed);
    }

    pub fn last_activity(&self) -> Instant {
        self.opened_at + Duration::from_millis(self.last_activity_ms.load(Ordering::Relaxed))
    }

    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_activity())
    }

    /// Drops the registry's sender. Only the registry eviction path calls this.
    pub(crate) fn close_queue(&self) {
        self.sender_slot().take();
    }

    fn sender_slot(&self) -> MutexGuard<'_, Option<mpsc::Sender<QueuedNotification>>> {
        self.sender
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("device_id", &self.device_id)
            .field("user_id", &self.user_id)
            .field("generation", &self.generation)
            .field("cancelled", &self.token.is_cancelled())
            .finish()
    }
}

/// What the transport layer holds for the lifetime of a stream: the receiving
/// end of the queue plus a lent reference to the connection for liveness.
pub struct ConnectionHandle {
    connection: Arc<Connection>,
    receiver: mpsc::Receiver<QueuedNotification>,
}

impl ConnectionHandle {
    pub(crate) fn new(
        connection: Arc<Connection>,
        receiver: mpsc::Receiver<QueuedNotification>,
    ) -> Self {
        Self {
            connection,
            receiver,
        }
    }

    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    pub fn device_id(&self) -> &str {
        self.connection.device_id()
    }

    pub fn token(&self) -> CancellationToken {
        self.connection.token()
    }

    pub fn touch(&self) {
        self.connection.touch();
    }

    /// Next queued notification, or `None` once the connection is cancelled
    /// or its queue has been closed and drained.
    pub async fn recv(&mut self) -> Option<QueuedNotification> {
        let token = self.connection.token();
        tokio::select! {
            biased;
            _ = token.cancelled() => None,
            item = self.receiver.recv() => item,
        }
    }

    pub fn try_recv(&mut self) -> Option<QueuedNotification> {
        self.receiver.try_recv().ok()
    }
}
