use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::app::notifications::NotifyOutcome;
use crate::app::realtime::RegistryStats;
use crate::domain::notification::{Notification, NotificationCategory};
use crate::domain::push_subscription::{PushKeys, PushSubscription};
use crate::http::{AdminToken, AppError, AuthUser};
use crate::infra::push::validate_endpoint;
use crate::AppState;

const MAX_TITLE_LEN: usize = 200;
const MAX_BODY_LEN: usize = 2000;

#[derive(Serialize)]
pub(crate) struct HealthResponse {
    status: &'static str,
    devices: usize,
}

#[derive(Deserialize)]
pub struct PaginationQuery {
    pub limit: Option<i64>,
    pub cursor: Option<String>,
}

#[derive(Serialize)]
pub struct ListResponse<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<String>,
}

fn parse_cursor(cursor: Option<String>) -> Result<Option<(OffsetDateTime, Uuid)>, AppError> {
    let Some(cursor) = cursor else {
        return Ok(None);
    };

    let mut parts = cursor.splitn(2, '/');
    let timestamp = parts
        .next()
        .ok_or_else(|| AppError::bad_request("invalid cursor"))?;
    let id = parts
        .next()
        .ok_or_else(|| AppError::bad_request("invalid cursor"))?;

    let timestamp = OffsetDateTime::parse(timestamp, &Rfc3339)
        .map_err(|_| AppError::bad_request("invalid cursor"))?;
    let id = Uuid::parse_str(id).map_err(|_| AppError::bad_request("invalid cursor"))?;

    Ok(Some((timestamp, id)))
}

fn encode_cursor(cursor: Option<(OffsetDateTime, Uuid)>) -> Option<String> {
    let (timestamp, id) = cursor?;
    let timestamp = timestamp.format(&Rfc3339).ok()?;
    Some(format!("{}/{}", timestamp, id))
}

pub(crate) async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let store = state.notifications.ping().await.is_ok();
    let status = if store { "ok" } else { "degraded" };

    Json(HealthResponse {
        status,
        devices: state.notifications.stats().devices,
    })
}

#[derive(Deserialize)]
pub struct NotifyRequest {
    pub user_id: Uuid,
    pub title: String,
    pub body: String,
    pub category: Option<String>,
}

pub async fn create_notification(
    _admin: AdminToken,
    State(state): State<AppState>,
    Json(payload): Json<NotifyRequest>,
) -> Result<(StatusCode, Json<NotifyOutcome>), AppError> {
    let title = payload.title.trim();
    if title.is_empty() {
        return Err(AppError::bad_request("title is required"));
    }
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(AppError::bad_request("title must be at most 200 characters"));
    }
    if payload.body.chars().count() > MAX_BODY_LEN {
        return Err(AppError::bad_request("body must be at most 2000 characters"));
    }
    let category = match payload.category.as_deref() {
        None => NotificationCategory::Info,
        Some(value) => value
            .parse::<NotificationCategory>()
            .map_err(|_| AppError::bad_request("invalid category"))?,
    };

    let outcome = state
        .notifications
        .notify(payload.user_id, title, payload.body, category)
        .await;

    Ok((StatusCode::ACCEPTED, Json(outcome)))
}

pub async fn list_notifications(
    auth: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<PaginationQuery>,
) -> Result<Json<ListResponse<Notification>>, AppError> {
    let limit = query.limit.unwrap_or(30);
    if !(1..=200).contains(&limit) {
        return Err(AppError::bad_request("limit must be between 1 and 200"));
    }
    let cursor = parse_cursor(query.cursor)?;

    let mut notifications = state
        .notifications
        .list(auth.user_id, cursor, limit + 1)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, user_id = %auth.user_id, "failed to list notifications");
            AppError::internal("failed to list notifications")
        })?;

    let next_cursor = if notifications.len() > limit as usize {
        notifications.truncate(limit as usize);
        notifications
            .last()
            .map(|last| (last.created_at, last.id))
    } else {
        None
    };

    Ok(Json(ListResponse {
        items: notifications,
        next_cursor: encode_cursor(next_cursor),
    }))
}

#[derive(Deserialize)]
pub struct MarkReadQuery {
    pub before: Option<String>,
}

#[derive(Serialize)]
pub struct MarkReadResponse {
    pub updated: u64,
}

pub async fn mark_notifications_read(
    auth: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<MarkReadQuery>,
) -> Result<Json<MarkReadResponse>, AppError> {
    let now = OffsetDateTime::now_utc();
    let cutoff = match query.before {
        Some(value) => OffsetDateTime::parse(&value, &Rfc3339)
            .map_err(|_| AppError::bad_request("before must be an RFC 3339 timestamp"))?
            .min(now),
        None => now,
    };

    let updated = state
        .notifications
        .mark_read(auth.user_id, cutoff)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, user_id = %auth.user_id, "failed to mark notifications read");
            AppError::internal("failed to mark notifications read")
        })?;

    Ok(Json(MarkReadResponse { updated }))
}

pub async fn unsubscribe_device(
    auth: AuthUser,
    Path(device_id): Path<String>,
    State(state): State<AppState>,
) -> Result<StatusCode, AppError> {
    state
        .notifications
        .unsubscribe_stream(auth.user_id, &device_id)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn realtime_stats(
    _admin: AdminToken,
    State(state): State<AppState>,
) -> Json<RegistryStats> {
    Json(state.notifications.stats())
}

#[derive(Deserialize)]
pub struct RegisterPushRequest {
    pub endpoint: String,
    pub keys: PushKeys,
}

pub async fn register_push_subscription(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<RegisterPushRequest>,
) -> Result<(StatusCode, Json<PushSubscription>), AppError> {
    validate_endpoint(&payload.endpoint).map_err(|err| AppError::bad_request(err.to_string()))?;
    if payload.keys.p256dh.trim().is_empty() || payload.keys.auth.trim().is_empty() {
        return Err(AppError::bad_request("keys.p256dh and keys.auth are required"));
    }

    let subscription = state
        .push_subscriptions
        .register(auth.user_id, &payload.endpoint, payload.keys)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, user_id = %auth.user_id, "failed to register push subscription");
            AppError::internal("failed to register push subscription")
        })?;

    Ok((StatusCode::CREATED, Json(subscription)))
}

pub async fn list_push_subscriptions(
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<PushSubscription>>, AppError> {
    let subscriptions = state
        .push_subscriptions
        .list(auth.user_id)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, user_id = %auth.user_id, "failed to list push subscriptions");
            AppError::internal("failed to list push subscriptions")
        })?;

    Ok(Json(subscriptions))
}

pub async fn delete_push_subscription(
    auth: AuthUser,
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<StatusCode, AppError> {
    let removed = state
        .push_subscriptions
        .remove(auth.user_id, id)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, subscription_id = %id, user_id = %auth.user_id, "failed to delete push subscription");
            AppError::internal("failed to delete push subscription")
        })?;

    if removed {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::not_found("push subscription not found"))
    }
}
