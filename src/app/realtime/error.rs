use thiserror::Error;

/// Structural failures returned synchronously to subscribe/unsubscribe callers,
/// plus the empty fan-out signal the orchestrator turns into offline fallback.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RealtimeError {
    #[error("device not found")]
    NotFound,
    #[error("device belongs to another user")]
    OwnerMismatch,
    #[error("user has no active devices")]
    NoActiveDevices,
    #[error("invalid device id: {0}")]
    InvalidDevice(&'static str),
}

/// Outcome of a single device send that did not land in the queue.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("send timed out")]
    Timeout,
    #[error("connection cancelled")]
    Cancelled,
}
