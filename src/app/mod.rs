pub mod auth;
pub mod notifications;
pub mod push_subscriptions;
pub mod realtime;
