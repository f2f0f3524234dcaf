//! Error types for the protocol layer.
//!
//! Every decoder and builder in this crate returns `Result<_, ProtocolError>`.
//! A decode error means "this one frame was unusable"; the session layer logs
//! it and moves on to the next frame.

/// Errors that can occur while reading or writing packets.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// The buffer ends before a header or field it must contain.
    #[error("{context}: need {needed} bytes, have {actual}")]
    ShortBuffer {
        context: &'static str,
        needed: usize,
        actual: usize,
    },

    /// The first byte is not a known frame marker.
    #[error("invalid header marker {0:#04X}")]
    InvalidHeader(u8),

    /// A schema lookup asked for a field the schema does not define.
    #[error("{message} has no field `{field}`")]
    UnknownField {
        message: &'static str,
        field: &'static str,
    },

    /// A string does not fit its fixed-width field.
    #[error("{field} is {actual} bytes, the field holds {max}")]
    FieldTooLong {
        field: &'static str,
        max: usize,
        actual: usize,
    },

    /// A walk path that cannot be encoded.
    #[error("invalid walk path: {0}")]
    InvalidPath(String),

    /// The frame parsed but its content makes no sense.
    ///
    /// For example a count that claims more records than the frame holds in
    /// a message that is not allowed to clamp.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
