//! Stored-record types exchanged with the event store.
//!
//! A [`RecordDraft`] is what the publish path appends; a [`StoredRecord`] is
//! what a subscription feed yields back, carrying the store-assigned
//! [`RecordId`] used for acknowledgment in persistent mode.

use std::fmt;

use uuid::Uuid;

/// Store-assigned identity of a stored record, keyed for ack/nack calls.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordId(String);

impl RecordId {
    /// Generate a fresh random record id.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for RecordId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Content-type marker for a record's payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    /// JSON payload.
    Json,
    /// Opaque binary payload.
    Binary,
}

/// A record draft ready to be appended to a stream.
#[derive(Debug, Clone)]
pub struct RecordDraft {
    /// Content-type marker for the payload.
    pub content_type: ContentType,
    /// Event-type tag, routed from the reserved metadata key by the codec.
    pub event_type: String,
    /// Opaque payload bytes.
    pub payload: Vec<u8>,
    /// Serialized metadata blob.
    pub metadata: Vec<u8>,
}

/// An immutable record read back from a subscription feed.
#[derive(Debug, Clone)]
pub struct StoredRecord {
    /// Store-assigned identity, used for ack/nack in persistent mode.
    pub id: RecordId,
    /// Content-type marker for the payload.
    pub content_type: ContentType,
    /// Event-type tag.
    pub event_type: String,
    /// Opaque payload bytes.
    pub payload: Vec<u8>,
    /// Serialized metadata blob.
    pub metadata: Vec<u8>,
    /// Position of the record within its stream.
    pub revision: u64,
}
