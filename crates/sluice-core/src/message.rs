//! Application messages with one-shot ack/nack completion signals.
//!
//! A [`Message`] is the unit handed to consumers by the subscription
//! pipeline. Consumers signal the outcome of processing by calling
//! [`Message::ack`] or [`Message::nack`] exactly once; the pipeline awaits
//! the resulting [`Completion`] transition through a watch channel obtained
//! from [`Message::completion`].
//!
//! # Completion semantics
//!
//! The completion state transitions at most once, from [`Completion::Pending`]
//! to either [`Completion::Acked`] or [`Completion::Nacked`]. Repeating the
//! same signal is harmless; the opposite signal is refused once the state is
//! settled. [`Message::copy`] produces a fresh message with the same
//! correlation id, metadata, and payload but a fresh pending completion —
//! this is what the delivery routine re-offers after a nack.

use std::collections::HashMap;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// String key/value metadata attached to a message.
///
/// Insertion order is irrelevant for correctness; the codec serializes a
/// stable JSON object regardless of it.
pub type Metadata = HashMap<String, String>;

/// Lifecycle state of a message's completion signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Neither ack nor nack has fired yet.
    Pending,
    /// The consumer acknowledged successful processing.
    Acked,
    /// The consumer rejected the message; the pipeline will resend a copy.
    Nacked,
}

/// A consumer-facing message flowing through the delivery pipeline.
#[derive(Debug)]
pub struct Message {
    /// Correlation id, unique per logical message. Copies share it.
    uuid: String,
    /// Free-form string metadata.
    pub metadata: Metadata,
    /// Opaque payload bytes.
    pub payload: Vec<u8>,
    /// One-shot completion state; the sender side lives in the message so
    /// `ack`/`nack` work wherever the message was moved to.
    completion: watch::Sender<Completion>,
    /// Cancellation scope attached by the delivery routine. Consumers can
    /// watch this to learn the pipeline is tearing down mid-processing.
    cancel: CancellationToken,
}

impl Message {
    /// Create a message with an explicit correlation id.
    pub fn new(uuid: impl Into<String>, payload: Vec<u8>) -> Self {
        let (completion, _) = watch::channel(Completion::Pending);
        Self {
            uuid: uuid.into(),
            metadata: Metadata::new(),
            payload,
            completion,
            cancel: CancellationToken::new(),
        }
    }

    /// Create a message with a random v4 uuid as the correlation id.
    pub fn with_random_uuid(payload: Vec<u8>) -> Self {
        Self::new(Uuid::new_v4().to_string(), payload)
    }

    /// The correlation id.
    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    /// Signal successful processing.
    ///
    /// Returns `true` if the message is now (or was already) acked,
    /// `false` if it had already been nacked.
    pub fn ack(&self) -> bool {
        let mut accepted = false;
        self.completion.send_if_modified(|state| match *state {
            Completion::Pending => {
                *state = Completion::Acked;
                accepted = true;
                true
            }
            Completion::Acked => {
                accepted = true;
                false
            }
            Completion::Nacked => false,
        });
        accepted
    }

    /// Signal failed processing, requesting redelivery.
    ///
    /// Returns `true` if the message is now (or was already) nacked,
    /// `false` if it had already been acked.
    pub fn nack(&self) -> bool {
        let mut accepted = false;
        self.completion.send_if_modified(|state| match *state {
            Completion::Pending => {
                *state = Completion::Nacked;
                accepted = true;
                true
            }
            Completion::Nacked => {
                accepted = true;
                false
            }
            Completion::Acked => false,
        });
        accepted
    }

    /// Current completion state.
    pub fn completion_state(&self) -> Completion {
        *self.completion.borrow()
    }

    /// Subscribe to completion transitions.
    ///
    /// The delivery routine holds one of these across the channel hand-off
    /// so it can await the consumer's ack/nack after the message itself has
    /// been moved away. If the message is dropped while still pending, the
    /// receiver observes the sender closing instead of a transition.
    pub fn completion(&self) -> watch::Receiver<Completion> {
        self.completion.subscribe()
    }

    /// The cancellation scope attached to this message.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Attach a cancellation scope, replacing the default one.
    pub fn set_cancellation(&mut self, cancel: CancellationToken) {
        self.cancel = cancel;
    }

    /// Produce a resend copy: same uuid, metadata, and payload, fresh
    /// pending completion and a fresh default cancellation scope.
    pub fn copy(&self) -> Self {
        let (completion, _) = watch::channel(Completion::Pending);
        Self {
            uuid: self.uuid.clone(),
            metadata: self.metadata.clone(),
            payload: self.payload.clone(),
            completion,
            cancel: CancellationToken::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{timeout, Duration};

    #[test]
    fn test_ack_settles_completion() {
        let msg = Message::with_random_uuid(b"payload".to_vec());
        assert_eq!(msg.completion_state(), Completion::Pending);
        assert!(msg.ack());
        assert_eq!(msg.completion_state(), Completion::Acked);
    }

    #[test]
    fn test_ack_then_nack_refused() {
        let msg = Message::with_random_uuid(vec![]);
        assert!(msg.ack());
        assert!(!msg.nack());
        assert_eq!(msg.completion_state(), Completion::Acked);
    }

    #[test]
    fn test_nack_then_ack_refused() {
        let msg = Message::with_random_uuid(vec![]);
        assert!(msg.nack());
        assert!(!msg.ack());
        assert_eq!(msg.completion_state(), Completion::Nacked);
    }

    #[test]
    fn test_repeated_ack_is_idempotent() {
        let msg = Message::with_random_uuid(vec![]);
        assert!(msg.ack());
        assert!(msg.ack());
    }

    #[test]
    fn test_copy_has_fresh_completion() {
        let mut msg = Message::new("uuid-1", b"data".to_vec());
        msg.metadata.insert("k".to_string(), "v".to_string());
        msg.ack();

        let copy = msg.copy();
        assert_eq!(copy.uuid(), "uuid-1");
        assert_eq!(copy.metadata.get("k").map(String::as_str), Some("v"));
        assert_eq!(copy.payload, b"data");
        assert_eq!(copy.completion_state(), Completion::Pending);
    }

    #[tokio::test]
    async fn test_completion_watch_observes_ack() {
        let msg = Message::with_random_uuid(vec![]);
        let mut rx = msg.completion();

        let waiter = tokio::spawn(async move {
            let state = rx
                .wait_for(|c| *c != Completion::Pending)
                .await
                .expect("sender alive");
            *state
        });

        msg.ack();
        let observed = timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter finished")
            .expect("waiter not panicked");
        assert_eq!(observed, Completion::Acked);
    }

    #[tokio::test]
    async fn test_dropping_pending_message_closes_watch() {
        let msg = Message::with_random_uuid(vec![]);
        let mut rx = msg.completion();
        drop(msg);
        assert!(rx.wait_for(|c| *c != Completion::Pending).await.is_err());
    }
}
