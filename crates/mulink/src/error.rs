//! Unified error type for mulink.

use mulink_protocol::ProtocolError;
use mulink_session::SessionError;
use mulink_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `mulink` meta-crate, you deal with this single error type
/// instead of importing errors from each sub-crate. The `#[from]` attribute
/// on each variant lets `?` convert sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum MulinkError {
    /// A transport-level error (connect, send, cipher).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (malformed frame, field too long).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session-level error (invalid state, bad settings).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A settings file could not be read.
    #[error("could not read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// A settings file is not valid JSON for [`ClientSettings`](mulink_session::ClientSettings).
    #[error("could not parse {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}
