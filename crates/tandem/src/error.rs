//! Unified error type for the Tandem client.

use tandem_protocol::{MessageKind, ProtocolError};
use tandem_session::SessionError;
use tandem_transport::TransportError;

use crate::commands::CommandError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attributes let `?` convert sub-crate errors, so client
/// code only ever deals with this one type.
#[derive(Debug, thiserror::Error)]
pub enum NetError {
    /// Dialing or talking to the server failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A frame could not be encoded or decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A trade or battle operation was refused.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The operation needs a live connection and there isn't one.
    #[error("not connected to the server")]
    NotConnected,

    /// A dispatcher already has a handler for this message type.
    #[error("a handler for `{0}` is already registered")]
    DuplicateHandler(MessageKind),

    /// Chat input that could not be carried out.
    #[error(transparent)]
    Command(#[from] CommandError),

    /// The client config file could not be read or parsed.
    #[error("invalid config: {0}")]
    Config(String),
}
