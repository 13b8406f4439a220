//! In-process delivery of notifications to live device streams.
//!
//! The [`SubscriptionRegistry`] owns every [`Connection`]. The transport holds a
//! [`ConnectionHandle`] for the life of a stream, and the [`Dispatcher`] works
//! from point-in-time snapshots taken under the registry's read lock.

pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod registry;

pub use connection::{Connection, ConnectionHandle, QueuedNotification};
pub use dispatcher::{DispatchReport, Dispatcher};
pub use error::{DeliveryError, RealtimeError};
pub use registry::{ReapReport, RegistryStats, SubscriptionRegistry};
