//! Error types for the pub/sub pipeline.

use thiserror::Error;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while publishing or subscribing.
#[derive(Error, Debug)]
pub enum Error {
    /// Couldn't reach or construct a handle to the event store.
    /// Always fatal to construction.
    #[error("connection error: {0}")]
    Connection(String),

    /// A subscribe call failed before its feed started.
    #[error("subscription error: {0}")]
    Subscription(String),

    /// A persistent subscription group already exists.
    ///
    /// Returned by [`EventStore::create_persistent`](crate::store::EventStore)
    /// and treated as success by the subscriber (idempotent creation).
    #[error("subscription group already exists")]
    GroupExists,

    /// Message ↔ record translation failed.
    #[error(transparent)]
    Codec(#[from] sluice_core::Error),

    /// A publish call failed; remaining messages were not appended.
    #[error("publish error: {0}")]
    Publish(String),

    /// A store-side operation failed.
    ///
    /// For per-record ack/nack calls the pipeline absorbs and logs this
    /// variant rather than propagating it.
    #[error("store error: {0}")]
    Store(String),

    /// The subscriber has been closed; no new subscriptions are accepted.
    #[error("subscriber is closed")]
    Closed,
}
