use axum::{routing::delete, routing::get, routing::post, Router};

use crate::http::{handlers, stream};
use crate::AppState;

pub fn health() -> Router<AppState> {
    Router::new().route("/health", get(handlers::health))
}

pub fn notifications() -> Router<AppState> {
    Router::new()
        .route(
            "/notifications",
            get(handlers::list_notifications).post(handlers::create_notification),
        )
        .route(
            "/notifications/read",
            post(handlers::mark_notifications_read),
        )
}

pub fn realtime() -> Router<AppState> {
    Router::new()
        .route("/realtime/stream", get(stream::stream_notifications))
        .route(
            "/realtime/devices/:device_id",
            delete(handlers::unsubscribe_device),
        )
        .route("/realtime/stats", get(handlers::realtime_stats))
}

pub fn push() -> Router<AppState> {
    Router::new()
        .route(
            "/push/subscriptions",
            get(handlers::list_push_subscriptions).post(handlers::register_push_subscription),
        )
        .route(
            "/push/subscriptions/:id",
            delete(handlers::delete_push_subscription),
        )
}
