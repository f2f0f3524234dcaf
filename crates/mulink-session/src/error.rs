//! Error types for the session layer.
//!
//! The consumer-facing [`GameClient`](crate::GameClient) methods do not return
//! these. They turn them into [`SessionEvent::Error`](crate::SessionEvent)
//! so every failure reaches the consumer the same way.

use mulink_protocol::ProtocolError;
use mulink_transport::TransportError;

use crate::ConnectionState;

/// Errors that can occur while driving a game session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// An operation was requested in a state that does not allow it.
    /// Nothing was sent and the state did not change.
    #[error("{operation} is not allowed while {state}")]
    InvalidState {
        operation: &'static str,
        state: ConnectionState,
    },

    /// The settings failed validation.
    #[error("invalid settings: {0}")]
    Config(String),

    /// The requested server is not in the cached server list.
    #[error("server {0} is not in the server list")]
    UnknownServer(u16),

    /// No link could be opened to the given address.
    #[error("could not connect to {host}:{port}")]
    ConnectFailed { host: String, port: u16 },

    /// The peer closed the link or reading from it failed.
    #[error("connection lost")]
    ConnectionLost,

    /// The transport layer failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A request could not be encoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}
