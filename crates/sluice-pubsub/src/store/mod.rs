//! The event-store collaborator seam.
//!
//! The pipeline talks to the external store exclusively through the
//! [`EventStore`] trait: append, catch-up and persistent-group
//! subscriptions, and per-record ack/nack keyed by [`RecordId`].
//!
//! A subscription feed is an unbounded channel of [`FeedItem`]s: store
//! implementations adapt their wire protocol into the channel however they
//! like (typically by spawning their own reader task), and the pipeline's
//! receiver stage drains it. A [`FeedItem::Dropped`] item, or the channel
//! closing, marks the store-initiated end of the feed.

mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use sluice_core::{RecordDraft, RecordId, StoredRecord};
use tokio::sync::mpsc;

use crate::config::{
    AppendOptions, PersistentOptions, PersistentSubscribeOptions, SubscribeOptions,
};
use crate::error::Result;

/// One step of a subscription feed.
#[derive(Debug)]
pub enum FeedItem {
    /// A record appeared on the stream.
    Record(StoredRecord),
    /// The store dropped the subscription; the feed is over.
    Dropped {
        /// Store-supplied reason, for logging only.
        reason: String,
    },
}

/// A subscription feed as handed to the pipeline's receiver stage.
pub type Feed = mpsc::UnboundedReceiver<FeedItem>;

/// Handle to an external event store, safe for concurrent use.
///
/// Shared by the publish path and every active subscription of a
/// subscriber. Implementations surface connection failures from their own
/// constructors; every method here is a steady-state call.
#[async_trait]
pub trait EventStore: Send + Sync + 'static {
    /// Append a record to a stream. Returns the new stream revision.
    async fn append(
        &self,
        stream: &str,
        opts: &AppendOptions,
        draft: RecordDraft,
    ) -> Result<u64>;

    /// Open a catch-up feed over a stream.
    async fn subscribe(&self, stream: &str, opts: &SubscribeOptions) -> Result<Feed>;

    /// Create a persistent subscription group on a stream.
    ///
    /// Returns [`Error::GroupExists`](crate::Error::GroupExists) if the
    /// group was already created; callers treat that as success.
    async fn create_persistent(
        &self,
        stream: &str,
        group: &str,
        opts: &PersistentOptions,
    ) -> Result<()>;

    /// Join a persistent subscription group, opening a feed of the records
    /// the store assigns to this member.
    async fn subscribe_persistent(
        &self,
        stream: &str,
        group: &str,
        opts: &PersistentSubscribeOptions,
    ) -> Result<Feed>;

    /// Acknowledge a record as processed by the group.
    async fn ack(&self, stream: &str, group: &str, id: &RecordId) -> Result<()>;

    /// Negatively acknowledge a record, skipping redelivery.
    async fn nack(&self, stream: &str, group: &str, id: &RecordId, reason: &str) -> Result<()>;

    /// Release the store handle.
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
