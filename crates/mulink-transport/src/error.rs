/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The host name could not be resolved to any address.
    #[error("could not resolve {host}:{port}")]
    Resolve {
        host: String,
        port: u16,
        #[source]
        source: std::io::Error,
    },

    /// The TCP connect itself failed.
    #[error("connect to {addr} failed: {source}")]
    ConnectFailed {
        addr: std::net::SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// A link already exists or a connect is in flight.
    #[error("already connected or connecting")]
    AlreadyConnected,

    /// An operation needed a live link but there is none.
    #[error("not connected")]
    NotConnected,

    /// The connection was closed.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// Sending data failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Receiving data failed.
    ///
    /// Also the `From<io::Error>` target, which the frame decoder needs.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[from] std::io::Error),

    /// The byte stream does not start with a valid frame header.
    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    /// A cipher stage rejected a frame.
    #[error("cipher failure: {0}")]
    Cipher(String),
}
