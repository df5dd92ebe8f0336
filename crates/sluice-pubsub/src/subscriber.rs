//! Subscription pipelines: catch-up and persistent-group delivery.
//!
//! Each call to [`Subscriber::subscribe`] spawns a two-stage pipeline:
//!
//! ```text
//! store feed → receiver task → internal record channel
//!            → dispatcher task → outbound message channel → caller
//! ```
//!
//! The receiver stage drains the store's feed and forwards records; a
//! store-side drop ends it, and the internal channel closing is how the
//! drop propagates to the dispatcher. The dispatcher translates records
//! through the codec and runs the delivery routine: offer the message,
//! await ack/nack, resend a fresh copy on nack, for as long as the caller
//! keeps nacking. Persistent mode additionally reports the outcome back to
//! the store per record; catch-up mode never talks back to the store.
//!
//! Every blocking wait selects over the subscriber's closing broadcast and
//! the caller's cancellation, so teardown can never deadlock. The outbound
//! channel closing is the only end-of-subscription signal the caller sees,
//! whatever the cause.

use std::sync::Arc;

use metrics::counter;
use sluice_core::{Codec, Completion, JsonCodec, Message, StoredRecord};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::SubscriberConfig;
use crate::error::{Error, Result};
use crate::lifecycle::{closed_signal, Lifecycle};
use crate::store::{EventStore, Feed, FeedItem};

/// Consumes streams from the event store, delivering messages with
/// at-least-once, ack/nack-driven semantics.
pub struct Subscriber<S: EventStore> {
    store: Arc<S>,
    config: SubscriberConfig,
    codec: Arc<dyn Codec>,
    lifecycle: Arc<Lifecycle>,
}

impl<S: EventStore> Subscriber<S> {
    /// Create a subscriber using the default [`JsonCodec`].
    pub fn new(store: Arc<S>, config: SubscriberConfig) -> Self {
        Self::with_codec(store, config, Arc::new(JsonCodec))
    }

    /// Create a subscriber with a custom codec.
    pub fn with_codec(store: Arc<S>, config: SubscriberConfig, codec: Arc<dyn Codec>) -> Self {
        Self {
            store,
            config,
            codec,
            lifecycle: Arc::new(Lifecycle::new()),
        }
    }

    /// Open a subscription on `topic`.
    ///
    /// Runs the persistent pipeline when the configuration names a
    /// subscription group, the catch-up pipeline otherwise. The returned
    /// channel closes when the feed is dropped by the store, `cancel`
    /// fires, or the subscriber is closed; no error value accompanies the
    /// closure.
    pub async fn subscribe(
        &self,
        cancel: CancellationToken,
        topic: &str,
    ) -> Result<mpsc::Receiver<Message>> {
        if self.lifecycle.is_closed() {
            return Err(Error::Closed);
        }

        match self.config.group.clone() {
            Some(group) => self.persistent_pipeline(cancel, topic, group).await,
            None => self.catch_up_pipeline(cancel, topic).await,
        }
    }

    /// Close the subscriber: broadcast closing, wait for every pipeline
    /// task to exit, then release the store handle.
    ///
    /// Safe to call concurrently and repeatedly; one caller performs the
    /// teardown and the others return immediately.
    pub async fn close(&self) -> Result<()> {
        if !self.lifecycle.shutdown().await {
            return Ok(());
        }
        info!("subscriber closed");
        self.store.close().await
    }

    async fn catch_up_pipeline(
        &self,
        cancel: CancellationToken,
        topic: &str,
    ) -> Result<mpsc::Receiver<Message>> {
        let feed = match self.store.subscribe(topic, &self.config.stream).await {
            Ok(feed) => feed,
            Err(e) => {
                error!(topic, error = %e, "can't subscribe to stream");
                return Err(Error::Subscription(format!(
                    "can't subscribe to stream {topic}"
                )));
            }
        };

        self.spawn_pipeline(cancel, topic, feed, None)
    }

    async fn persistent_pipeline(
        &self,
        cancel: CancellationToken,
        topic: &str,
        group: String,
    ) -> Result<mpsc::Receiver<Message>> {
        match self
            .store
            .create_persistent(topic, &group, &self.config.group_create)
            .await
        {
            Ok(()) => {}
            Err(Error::GroupExists) => {
                info!(topic, group, "subscription group already exists");
            }
            Err(e) => {
                error!(topic, group, error = %e, "can't create persistent subscription");
                return Err(Error::Subscription(format!(
                    "can't create persistent subscription {group} on {topic}"
                )));
            }
        }

        let feed = match self
            .store
            .subscribe_persistent(topic, &group, &self.config.group_subscribe)
            .await
        {
            Ok(feed) => feed,
            Err(e) => {
                error!(topic, group, error = %e, "can't subscribe to stream");
                return Err(Error::Subscription(format!(
                    "can't subscribe to stream {topic}"
                )));
            }
        };

        self.spawn_pipeline(cancel, topic, feed, Some(group))
    }

    /// Spawn the receiver and dispatcher stages for one subscription.
    fn spawn_pipeline(
        &self,
        cancel: CancellationToken,
        topic: &str,
        mut feed: Feed,
        group: Option<String>,
    ) -> Result<mpsc::Receiver<Message>> {
        // Both stages register before anything is spawned, so a concurrent
        // close() either refuses the subscription or waits for it.
        let receiver_guard = self.lifecycle.register().ok_or(Error::Closed)?;
        let dispatcher_guard = self.lifecycle.register().ok_or(Error::Closed)?;

        let scope = cancel.child_token();
        let capacity = self.config.channel_capacity.max(1);
        let (record_tx, record_rx) = mpsc::channel::<StoredRecord>(capacity);
        let (out_tx, out_rx) = mpsc::channel::<Message>(capacity);

        // Receiver stage: drain the store feed into the internal channel.
        // Dropping record_tx on exit is the drop-propagation signal.
        let mut closing = self.lifecycle.closing();
        let recv_scope = scope.clone();
        let recv_topic = topic.to_string();
        tokio::spawn(async move {
            let _guard = receiver_guard;
            loop {
                tokio::select! {
                    _ = closed_signal(&mut closing) => break,
                    _ = recv_scope.cancelled() => break,
                    item = feed.recv() => match item {
                        None => {
                            debug!(topic = %recv_topic, "feed closed by store");
                            break;
                        }
                        Some(FeedItem::Dropped { reason }) => {
                            debug!(topic = %recv_topic, %reason, "subscription dropped");
                            counter!("pubsub_feed_dropped_total").increment(1);
                            break;
                        }
                        Some(FeedItem::Record(record)) => {
                            if record_tx.send(record).await.is_err() {
                                break;
                            }
                        }
                    },
                }
            }
        });

        // Dispatcher stage: translate, deliver, and (persistent mode)
        // report outcomes back to the store.
        let dispatcher = Dispatcher {
            store: Arc::clone(&self.store),
            codec: Arc::clone(&self.codec),
            topic: topic.to_string(),
            group,
            closing: self.lifecycle.closing(),
            scope,
        };
        tokio::spawn(async move {
            let _guard = dispatcher_guard;
            dispatcher.run(record_rx, out_tx).await;
        });

        Ok(out_rx)
    }
}

/// The dispatcher stage of one subscription pipeline.
struct Dispatcher<S: EventStore> {
    store: Arc<S>,
    codec: Arc<dyn Codec>,
    topic: String,
    group: Option<String>,
    closing: watch::Receiver<bool>,
    scope: CancellationToken,
}

impl<S: EventStore> Dispatcher<S> {
    async fn run(mut self, mut records: mpsc::Receiver<StoredRecord>, out: mpsc::Sender<Message>) {
        loop {
            let record = tokio::select! {
                _ = closed_signal(&mut self.closing) => break,
                _ = self.scope.cancelled() => break,
                record = records.recv() => match record {
                    // Internal channel closed: the feed was dropped or the
                    // receiver stage exited. Drain the same way.
                    None => break,
                    Some(record) => record,
                },
            };

            let message = match self.codec.unmarshal(&record) {
                Ok(message) => message,
                Err(e) => {
                    // Malformed records are not retryable; drop this one
                    // and keep the pipeline live.
                    warn!(
                        topic = %self.topic,
                        id = %record.id,
                        error = %e,
                        "couldn't decode record, dropping it"
                    );
                    counter!("pubsub_decode_failures_total").increment(1);
                    continue;
                }
            };

            let uuid = message.uuid().to_string();
            let delivered = self.deliver(message, &out).await;

            if let Some(group) = self.group.as_deref() {
                if delivered {
                    if let Err(e) = self.store.ack(&self.topic, group, &record.id).await {
                        error!(
                            topic = %self.topic,
                            group,
                            id = %record.id,
                            error = %e,
                            "couldn't ack record"
                        );
                        counter!("pubsub_store_ack_failures_total").increment(1);
                    }
                } else if let Err(e) = self
                    .store
                    .nack(&self.topic, group, &record.id, &format!("nack message {uuid}"))
                    .await
                {
                    error!(
                        topic = %self.topic,
                        group,
                        id = %record.id,
                        error = %e,
                        "couldn't nack record"
                    );
                    counter!("pubsub_store_ack_failures_total").increment(1);
                }
            }
        }

        // Cancel the local scope so the receiver stage follows, and close
        // the outbound channel by dropping its sender.
        self.scope.cancel();
        debug!(topic = %self.topic, "dispatcher stage exited");
    }

    /// Deliver one message with local at-least-once semantics.
    ///
    /// Offers the message on the outbound channel and waits for its
    /// completion signal; a nack swaps in a fresh copy and repeats, with no
    /// bound and no backoff. Returns `false` when closing, cancellation, or
    /// a dropped outbound receiver abandons the delivery.
    async fn deliver(&mut self, mut message: Message, out: &mpsc::Sender<Message>) -> bool {
        let message_scope = self.scope.child_token();
        // The scope ends when delivery settles, whatever the outcome;
        // consumers holding the message's cancellation see it fire then.
        let _scope_guard = message_scope.clone().drop_guard();
        loop {
            message.set_cancellation(message_scope.clone());
            // Stashed up front: `message` is moved into the channel below.
            let resend = message.copy();
            let mut completion = message.completion();
            let uuid = resend.uuid().to_string();

            tokio::select! {
                sent = out.send(message) => {
                    if sent.is_err() {
                        debug!(topic = %self.topic, %uuid, "outbound channel gone, abandoning delivery");
                        return false;
                    }
                }
                _ = closed_signal(&mut self.closing) => {
                    debug!(topic = %self.topic, %uuid, "closing subscriber");
                    return false;
                }
                _ = self.scope.cancelled() => {
                    debug!(topic = %self.topic, %uuid, "subscription cancelled");
                    return false;
                }
            }

            tokio::select! {
                state = completion.wait_for(|c| *c != Completion::Pending) => {
                    match state.map(|s| *s) {
                        Ok(Completion::Acked) => {
                            counter!("pubsub_delivered_total").increment(1);
                            return true;
                        }
                        // Nacked, or the consumer dropped the message while
                        // it was still pending: resend a fresh copy.
                        Ok(_) | Err(_) => {
                            counter!("pubsub_redelivered_total").increment(1);
                            debug!(topic = %self.topic, %uuid, "message nacked, resending");
                            message = resend;
                        }
                    }
                }
                _ = closed_signal(&mut self.closing) => return false,
                _ = self.scope.cancelled() => return false,
            }
        }
    }
}
