use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::response::sse::{Event, Sse};
use futures::stream::{self, Stream};
use serde::Deserialize;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, error};

use crate::app::notifications::NotificationService;
use crate::app::realtime::{Connection, ConnectionHandle};
use crate::domain::notification::Notification;
use crate::http::{AppError, AuthUser};
use crate::AppState;

#[derive(Deserialize)]
pub struct StreamQuery {
    pub device_id: String,
}

/// `GET /v1/realtime/stream?device_id=...`: Server-Sent Events feed of the
/// caller's notifications for one device.
pub async fn stream_notifications(
    auth: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<StreamQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let handle = state
        .notifications
        .subscribe_stream(auth.user_id, &query.device_id)?;

    Ok(Sse::new(notification_events(
        state.notifications.clone(),
        handle,
        state.heartbeat_interval,
    )))
}

/// Releases the device when the transport drops the stream.
struct ReleaseOnDrop {
    service: NotificationService,
    connection: Arc<Connection>,
}

impl Drop for ReleaseOnDrop {
    fn drop(&mut self) {
        if self.service.release_stream(&self.connection) {
            debug!(
                device_id = self.connection.device_id(),
                user_id = %self.connection.user_id(),
                "stream closed by client"
            );
        }
    }
}

struct StreamState {
    handle: ConnectionHandle,
    heartbeat: Interval,
    _release: ReleaseOnDrop,
}

fn notification_events(
    service: NotificationService,
    handle: ConnectionHandle,
    heartbeat_every: Duration,
) -> impl Stream<Item = Result<Event, Infallible>> {
    let release = ReleaseOnDrop {
        service,
        connection: Arc::clone(handle.connection()),
    };
    let mut heartbeat = tokio::time::interval_at(Instant::now() + heartbeat_every, heartbeat_every);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let initial = StreamState {
        handle,
        heartbeat,
        _release: release,
    };

    stream::unfold(initial, |mut state| async move {
        // Being polled for the next frame means the previous one was written.
        state.handle.touch();

        let event = tokio::select! {
            item = state.handle.recv() => match item {
                Some(notification) => notification_event(&notification),
                None => return None,
            },
            _ = state.heartbeat.tick() => Event::default().comment("keep-alive"),
        };
        state.heartbeat.reset();

        Some((Ok(event), state))
    })
}

fn notification_event(notification: &Notification) -> Event {
    let event = Event::default()
        .event("notification")
        .id(notification.id.to_string());
    match event.json_data(notification) {
        Ok(event) => event,
        Err(err) => {
            error!(error = ?err, notification_id = %notification.id, "failed to encode notification");
            Event::default().comment("encode-error")
        }
    }
}
