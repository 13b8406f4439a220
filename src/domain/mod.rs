pub mod notification;
pub mod push_subscription;
