//! Translation between application messages and stored records.
//!
//! The codec is the pure boundary between the pipeline and the store's data
//! model: no side effects beyond error reporting, no state. [`JsonCodec`]
//! is the default implementation; it serializes message metadata as a JSON
//! object and threads the correlation id and event-type tag through two
//! reserved metadata keys.

use crate::error::{Error, Result};
use crate::message::{Message, Metadata};
use crate::record::{ContentType, RecordDraft, StoredRecord};

/// Reserved metadata key carrying the message correlation id.
pub const MESSAGE_UUID_KEY: &str = "_sluice_message_uuid";

/// Reserved metadata key selecting the record's event-type tag.
pub const EVENT_TYPE_KEY: &str = "_sluice_event_type";

/// Event-type tag assigned when a message carries no explicit one.
pub const DEFAULT_EVENT_TYPE: &str = "sluice_event";

/// Translates between a raw stored record and an application message.
pub trait Codec: Send + Sync {
    /// Build a record draft from a message.
    fn marshal(&self, msg: &Message) -> Result<RecordDraft>;

    /// Rebuild a message from a stored record.
    fn unmarshal(&self, record: &StoredRecord) -> Result<Message>;
}

/// Default codec: JSON metadata blob, payload passed through untouched.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn marshal(&self, msg: &Message) -> Result<RecordDraft> {
        let event_type = msg
            .metadata
            .get(EVENT_TYPE_KEY)
            .filter(|t| !t.is_empty())
            .cloned()
            .unwrap_or_else(|| DEFAULT_EVENT_TYPE.to_string());

        let mut metadata = msg.metadata.clone();
        metadata.insert(MESSAGE_UUID_KEY.to_string(), msg.uuid().to_string());

        let blob = serde_json::to_vec(&metadata)
            .map_err(|e| Error::Encoding(format!("metadata not serializable: {e}")))?;

        Ok(RecordDraft {
            content_type: ContentType::Json,
            event_type,
            payload: msg.payload.clone(),
            metadata: blob,
        })
    }

    fn unmarshal(&self, record: &StoredRecord) -> Result<Message> {
        let mut metadata: Metadata = serde_json::from_slice(&record.metadata)
            .map_err(|e| Error::Decoding(format!("malformed metadata blob: {e}")))?;

        let uuid = metadata.get(MESSAGE_UUID_KEY).cloned().unwrap_or_default();
        // Surface the record's event-type tag so consumers can dispatch on
        // it without seeing the record itself.
        metadata
            .entry(EVENT_TYPE_KEY.to_string())
            .or_insert_with(|| record.event_type.clone());

        let mut msg = Message::new(uuid, record.payload.clone());
        msg.metadata = metadata;
        Ok(msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RecordId;

    fn stored(draft: RecordDraft) -> StoredRecord {
        StoredRecord {
            id: RecordId::new(),
            content_type: draft.content_type,
            event_type: draft.event_type,
            payload: draft.payload,
            metadata: draft.metadata,
            revision: 0,
        }
    }

    #[test]
    fn test_marshal_produces_json_record() {
        let msg = Message::with_random_uuid(b"hello".to_vec());
        let draft = JsonCodec.marshal(&msg).unwrap();
        assert_eq!(draft.content_type, ContentType::Json);
        assert_eq!(draft.payload, b"hello");
    }

    #[test]
    fn test_marshal_assigns_default_event_type() {
        let msg = Message::with_random_uuid(vec![]);
        let draft = JsonCodec.marshal(&msg).unwrap();
        assert_eq!(draft.event_type, DEFAULT_EVENT_TYPE);
    }

    #[test]
    fn test_marshal_honors_explicit_event_type() {
        let mut msg = Message::with_random_uuid(vec![]);
        msg.metadata
            .insert(EVENT_TYPE_KEY.to_string(), "order_placed".to_string());
        let draft = JsonCodec.marshal(&msg).unwrap();
        assert_eq!(draft.event_type, "order_placed");
    }

    #[test]
    fn test_marshal_injects_uuid_key() {
        let msg = Message::new("uuid-42", vec![]);
        let draft = JsonCodec.marshal(&msg).unwrap();

        let metadata: Metadata = serde_json::from_slice(&draft.metadata).unwrap();
        assert_eq!(
            metadata.get(MESSAGE_UUID_KEY).map(String::as_str),
            Some("uuid-42")
        );
    }

    #[test]
    fn test_roundtrip_preserves_message() {
        let mut msg = Message::new("uuid-7", b"payload bytes".to_vec());
        msg.metadata
            .insert("tenant".to_string(), "acme".to_string());

        let record = stored(JsonCodec.marshal(&msg).unwrap());
        let recovered = JsonCodec.unmarshal(&record).unwrap();

        assert_eq!(recovered.uuid(), "uuid-7");
        assert_eq!(recovered.payload, b"payload bytes");
        assert_eq!(
            recovered.metadata.get("tenant").map(String::as_str),
            Some("acme")
        );
        assert_eq!(
            recovered.metadata.get(MESSAGE_UUID_KEY).map(String::as_str),
            Some("uuid-7")
        );
    }

    #[test]
    fn test_unmarshal_surfaces_event_type() {
        let msg = Message::with_random_uuid(vec![]);
        let record = stored(JsonCodec.marshal(&msg).unwrap());
        let recovered = JsonCodec.unmarshal(&record).unwrap();
        assert_eq!(
            recovered.metadata.get(EVENT_TYPE_KEY).map(String::as_str),
            Some(DEFAULT_EVENT_TYPE)
        );
    }

    #[test]
    fn test_unmarshal_rejects_malformed_metadata() {
        let record = StoredRecord {
            id: RecordId::new(),
            content_type: ContentType::Json,
            event_type: DEFAULT_EVENT_TYPE.to_string(),
            payload: vec![],
            metadata: b"not json".to_vec(),
            revision: 0,
        };
        let err = JsonCodec.unmarshal(&record).unwrap_err();
        assert!(matches!(err, Error::Decoding(_)));
    }
}
