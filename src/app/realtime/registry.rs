use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::app::realtime::connection::{Connection, ConnectionHandle};
use crate::app::realtime::error::RealtimeError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RegistryStats {
    pub users: usize,
    pub devices: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReapReport {
    pub cancelled: usize,
    pub idle: usize,
}

impl ReapReport {
    pub fn total(&self) -> usize {
        self.cancelled + self.idle
    }
}

#[derive(Default)]
struct RegistryState {
    by_device: HashMap<String, Arc<Connection>>,
    by_user: HashMap<Uuid, HashMap<String, Arc<Connection>>>,
}

impl RegistryState {
    fn insert(&mut self, connection: Arc<Connection>) {
        self.by_user
            .entry(connection.user_id())
            .or_default()
            .insert(connection.device_id().to_string(), Arc::clone(&connection));
        self.by_device
            .insert(connection.device_id().to_string(), connection);
    }

    /// Removes a device from both views, ends its lifetime and closes its
    /// queue. Every removal goes through here; reaching it requires the write
    /// guard.
    fn evict(&mut self, device_id: &str) -> Option<Arc<Connection>> {
        let connection = self.by_device.remove(device_id)?;
        if let Some(devices) = self.by_user.get_mut(&connection.user_id()) {
            devices.remove(device_id);
            if devices.is_empty() {
                self.by_user.remove(&connection.user_id());
            }
        }
        connection.cancel();
        connection.close_queue();
        Some(connection)
    }
}

/// Authoritative index of live connections, by device and by user.
pub struct SubscriptionRegistry {
    state: RwLock<RegistryState>,
    queue_capacity: usize,
    next_generation: AtomicU64,
}

impl SubscriptionRegistry {
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
            queue_capacity: queue_capacity.max(1),
            next_generation: AtomicU64::new(1),
        }
    }

    /// Registers a device stream. A device that is already registered is
    /// cancelled and replaced in the same critical section.
    pub fn subscribe(
        &self,
        parent: &CancellationToken,
        user_id: Uuid,
        device_id: &str,
    ) -> ConnectionHandle {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let (connection, receiver) = Connection::open(
            device_id.to_string(),
            user_id,
            generation,
            self.queue_capacity,
            parent,
        );

        let replaced = {
            let mut state = self.write();
            let replaced = state.evict(device_id);
            state.insert(Arc::clone(&connection));
            replaced
        };

        if let Some(previous) = replaced {
            if previous.user_id() != user_id {
                warn!(
                    device_id,
                    previous_user_id = %previous.user_id(),
                    user_id = %user_id,
                    "device re-registered by a different user"
                );
            } else {
                debug!(device_id, user_id = %user_id, "device reconnected, previous stream cancelled");
            }
        }
        info!(device_id, user_id = %user_id, generation, "device subscribed");

        ConnectionHandle::new(connection, receiver)
    }

    pub fn unsubscribe(&self, user_id: Uuid, device_id: &str) -> Result<(), RealtimeError> {
        let mut state = self.write();
        let owner = state
            .by_device
            .get(device_id)
            .map(|connection| connection.user_id())
            .ok_or(RealtimeError::NotFound)?;
        if owner != user_id {
            return Err(RealtimeError::OwnerMismatch);
        }
        state.evict(device_id);
        drop(state);

        info!(device_id, user_id = %user_id, "device unsubscribed");
        Ok(())
    }

    /// Evicts `connection` only if it is still the registered generation for
    /// its device. Returns whether anything was removed.
    pub fn release(&self, connection: &Connection) -> bool {
        let mut state = self.write();
        let current = state
            .by_device
            .get(connection.device_id())
            .map(|registered| registered.generation() == connection.generation())
            .unwrap_or(false);
        if current {
            state.evict(connection.device_id());
        }
        drop(state);

        connection.cancel();
        current
    }

    /// Point-in-time copy of a user's connections. The read guard is released
    /// before this returns, so callers may block on the copies freely.
    pub fn fan_out_targets(&self, user_id: Uuid) -> Vec<Arc<Connection>> {
        self.read()
            .by_user
            .get(&user_id)
            .map(|devices| devices.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn stats(&self) -> RegistryStats {
        let state = self.read();
        RegistryStats {
            users: state.by_user.len(),
            devices: state.by_device.len(),
        }
    }

    pub fn contains(&self, device_id: &str) -> bool {
        self.read().by_device.contains_key(device_id)
    }

    /// Evicts cancelled connections and cancels connections idle for longer
    /// than `idle_timeout`.
    pub fn reap(&self, idle_timeout: Duration) -> ReapReport {
        let now = Instant::now();
        let mut report = ReapReport::default();
        let mut state = self.write();

        let doomed: Vec<(String, bool)> = state
            .by_device
            .values()
            .filter_map(|connection| {
                if connection.is_cancelled() {
                    Some((connection.device_id().to_string(), true))
                } else if connection.idle_for(now) > idle_timeout {
                    Some((connection.device_id().to_string(), false))
                } else {
                    None
                }
            })
            .collect();

        for (device_id, already_cancelled) in doomed {
            if let Some(connection) = state.evict(&device_id) {
                if already_cancelled {
                    report.cancelled += 1;
                } else {
                    report.idle += 1;
                    debug!(
                        device_id = %device_id,
                        user_id = %connection.user_id(),
                        "idle device evicted"
                    );
                }
            }
        }

        report
    }

    /// Evicts every connection. Used on shutdown.
    pub fn close_all(&self) -> usize {
        let mut state = self.write();
        let devices: Vec<String> = state.by_device.keys().cloned().collect();
        devices
            .iter()
            .filter(|device_id| state.evict(device_id).is_some())
            .count()
    }

    fn read(&self) -> RwLockReadGuard<'_, RegistryState> {
        self.state
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, RegistryState> {
        self.state
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
