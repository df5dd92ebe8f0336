//! Error types for the core message and codec layer.

use thiserror::Error;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while translating between messages and records.
#[derive(Error, Debug)]
pub enum Error {
    /// Message metadata could not be serialized into a record.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// Record metadata could not be deserialized into a message.
    #[error("decoding error: {0}")]
    Decoding(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoding_display() {
        let err = Error::Encoding("metadata not serializable".to_string());
        let msg = err.to_string();
        assert!(msg.contains("encoding error"));
        assert!(msg.contains("metadata not serializable"));
    }

    #[test]
    fn test_decoding_display() {
        let err = Error::Decoding("unexpected EOF".to_string());
        let msg = err.to_string();
        assert!(msg.contains("decoding error"));
        assert!(msg.contains("unexpected EOF"));
    }
}
