//! Error types for the protocol layer.

/// Errors that can occur in the protocol layer.
///
/// Each crate in Tandem defines its own error enum, so a `ProtocolError`
/// always means the problem is in (de)serialization, not in networking or
/// session state.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust type into bytes).
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed (turning bytes into a Rust type).
    ///
    /// Common causes: malformed JSON, an unknown `type` tag, missing
    /// fields, or a truncated frame.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The message decoded but breaks a protocol rule (e.g. an unknown
    /// session kind in a command argument).
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
