//! Publish path: marshal messages and append them to a stream.

use std::sync::Arc;

use metrics::counter;
use sluice_core::{Codec, JsonCodec, Message};
use tracing::{debug, error};

use crate::config::PublisherConfig;
use crate::error::{Error, Result};
use crate::store::EventStore;

/// Appends application messages to named streams through the codec.
///
/// No concurrency of its own: messages are marshaled and appended one at a
/// time, and the first failure stops the batch.
pub struct Publisher<S: EventStore> {
    store: Arc<S>,
    config: PublisherConfig,
    codec: Arc<dyn Codec>,
}

impl<S: EventStore> Publisher<S> {
    /// Create a publisher using the default [`JsonCodec`].
    pub fn new(store: Arc<S>, config: PublisherConfig) -> Self {
        Self::with_codec(store, config, Arc::new(JsonCodec))
    }

    /// Create a publisher with a custom codec.
    pub fn with_codec(store: Arc<S>, config: PublisherConfig, codec: Arc<dyn Codec>) -> Self {
        Self {
            store,
            config,
            codec,
        }
    }

    /// Append the given messages to `stream`, in order.
    ///
    /// Returns on the first marshal or append failure; earlier messages of
    /// the batch stay appended.
    pub async fn publish(&self, stream: &str, messages: Vec<Message>) -> Result<()> {
        for message in &messages {
            let draft = self.codec.marshal(message)?;

            let revision = self
                .store
                .append(stream, &self.config.options, draft)
                .await
                .map_err(|e| {
                    error!(stream, uuid = message.uuid(), error = %e, "could not publish message");
                    Error::Publish(format!("could not publish message {}: {e}", message.uuid()))
                })?;

            counter!("pubsub_published_total").increment(1);
            debug!(stream, uuid = message.uuid(), revision, "published message");
        }

        Ok(())
    }

    /// Release the store handle.
    pub async fn close(&self) -> Result<()> {
        self.store.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{StreamPosition, SubscribeOptions};
    use crate::store::{FeedItem, MemoryStore};
    use sluice_core::{JsonCodec, DEFAULT_EVENT_TYPE};

    #[tokio::test]
    async fn test_publish_appends_marshaled_records() {
        let store = Arc::new(MemoryStore::new());
        let publisher = Publisher::new(Arc::clone(&store), PublisherConfig::default());

        let message = Message::with_random_uuid(b"hello".to_vec());
        let uuid = message.uuid().to_string();
        publisher.publish("orders", vec![message]).await.unwrap();

        let mut feed = store
            .subscribe(
                "orders",
                &SubscribeOptions {
                    from: StreamPosition::Start,
                    ..SubscribeOptions::default()
                },
            )
            .await
            .unwrap();
        let record = match feed.recv().await {
            Some(FeedItem::Record(record)) => record,
            other => panic!("expected a record, got {other:?}"),
        };

        assert_eq!(record.payload, b"hello");
        assert_eq!(record.event_type, DEFAULT_EVENT_TYPE);

        let recovered = JsonCodec.unmarshal(&record).unwrap();
        assert_eq!(recovered.uuid(), uuid);
    }

    #[tokio::test]
    async fn test_publish_keeps_message_order() {
        let store = Arc::new(MemoryStore::new());
        let publisher = Publisher::new(Arc::clone(&store), PublisherConfig::default());

        let batch = vec![
            Message::with_random_uuid(b"first".to_vec()),
            Message::with_random_uuid(b"second".to_vec()),
        ];
        publisher.publish("orders", batch).await.unwrap();

        let mut feed = store
            .subscribe("orders", &SubscribeOptions::default())
            .await
            .unwrap();
        for expected in [b"first".as_slice(), b"second".as_slice()] {
            match feed.recv().await {
                Some(FeedItem::Record(record)) => assert_eq!(record.payload, expected),
                other => panic!("expected a record, got {other:?}"),
            }
        }
    }
}
