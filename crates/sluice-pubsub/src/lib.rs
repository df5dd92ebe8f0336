//! Event-store publish/subscribe with ack/nack delivery.
//!
//! Bridges an append-only event store and message-channel consumers:
//! the [`Publisher`] marshals messages through a codec and appends them to
//! named streams; the [`Subscriber`] opens catch-up or persistent-group
//! subscriptions and delivers each record as a [`Message`](sluice_core::Message)
//! the consumer must ack or nack, with nacks driving redelivery of a fresh
//! copy.
//!
//! ```text
//!            ┌───────────┐  append   ┌─────────────┐
//! Message ──▶│ Publisher │──────────▶│             │
//!            └───────────┘           │ EventStore  │
//!            ┌───────────┐   feed    │             │
//! Message ◀──│ Subscriber│◀──────────│             │
//!   │ ack    └───────────┘  ack/nack └─────────────┘
//!   └──────────────▲ │ (persistent groups only)
//!                  └─┘ nack → resend
//! ```
//!
//! The store behind the pipeline is anything implementing
//! [`EventStore`](store::EventStore); [`MemoryStore`](store::MemoryStore)
//! is the in-process implementation used throughout the test suites.

pub mod config;
pub mod error;
mod lifecycle;
pub mod publisher;
pub mod store;
pub mod subscriber;

pub use config::{
    AppendOptions, Config, Credentials, PersistentOptions, PersistentSubscribeOptions,
    PublisherConfig, StreamPosition, SubscribeOptions, SubscriberConfig,
};
pub use error::{Error, Result};
pub use publisher::Publisher;
pub use store::{EventStore, Feed, FeedItem, MemoryStore};
pub use subscriber::Subscriber;
