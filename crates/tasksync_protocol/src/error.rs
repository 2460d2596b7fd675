//! Error types for protocol encoding.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while encoding or decoding protocol messages.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// The message could not be serialized.
    #[error("failed to encode {message}: {source}")]
    Encode {
        /// Message kind.
        message: &'static str,
        /// Underlying serializer error.
        source: serde_json::Error,
    },

    /// The bytes were not a valid message.
    #[error("failed to decode {message}: {source}")]
    Decode {
        /// Message kind.
        message: &'static str,
        /// Underlying deserializer error.
        source: serde_json::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_names_message() {
        let source = serde_json::from_slice::<u32>(b"nope").unwrap_err();
        let err = ProtocolError::Decode {
            message: "batch response",
            source,
        };
        assert!(err.to_string().starts_with("failed to decode batch response"));
    }
}
