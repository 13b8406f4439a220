pub mod app;
pub mod config;
pub mod domain;
pub mod http;
pub mod infra;
pub mod jobs;

use std::time::Duration;

use crate::app::auth::AuthService;
use crate::app::notifications::NotificationService;
use crate::app::push_subscriptions::PushSubscriptionService;

#[derive(Clone)]
pub struct AppState {
    pub notifications: NotificationService,
    pub push_subscriptions: PushSubscriptionService,
    pub auth: AuthService,
    pub admin_token: Option<String>,
    pub heartbeat_interval: Duration,
}
