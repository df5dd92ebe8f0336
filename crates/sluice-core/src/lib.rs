//! Core types for the sluice delivery pipeline.
//!
//! This crate provides the leaf types shared by publishers and subscribers:
//!
//! - [`Message`] - consumer-facing messages with one-shot ack/nack signals
//! - [`StoredRecord`] / [`RecordDraft`] - the store-side record model
//! - [`Codec`] - the pluggable message ↔ record translation contract, with
//!   [`JsonCodec`] as the default implementation
//! - Shared error types

mod codec;
mod error;
mod message;
mod record;

pub use codec::{Codec, JsonCodec, DEFAULT_EVENT_TYPE, EVENT_TYPE_KEY, MESSAGE_UUID_KEY};
pub use error::{Error, Result};
pub use message::{Completion, Message, Metadata};
pub use record::{ContentType, RecordDraft, RecordId, StoredRecord};
