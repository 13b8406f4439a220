pub mod db;
pub mod notification_store;
pub mod push;
pub mod push_subscription_store;
