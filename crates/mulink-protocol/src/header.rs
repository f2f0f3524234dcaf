//! Packet header parsing.
//!
//! The header tells the dispatcher which message a frame carries. The code
//! byte is always the last header byte; the byte after it is the subcode
//! for messages that have one, and the first payload byte for messages that
//! don't. The dispatcher resolves that ambiguity by trying
//! `(code, Some(subcode))` before `(code, None)`.

use mulink_transport::FrameKind;

use crate::ProtocolError;

/// The decoded header of one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub kind: FrameKind,
    /// Total frame size as written in the size field.
    pub declared_len: usize,
    pub code: u8,
    /// The byte after the code, if the frame has one.
    pub subcode: Option<u8>,
}

impl PacketHeader {
    /// Offset of the first byte after the code.
    pub fn body_offset(&self) -> usize {
        self.kind.header_len()
    }
}

/// Reads the header of `frame`.
///
/// `C1`/`C3` frames need 3 bytes, `C2`/`C4` frames need 4.
pub fn parse_header(frame: &[u8]) -> Result<PacketHeader, ProtocolError> {
    let marker = *frame.first().ok_or(ProtocolError::ShortBuffer {
        context: "header",
        needed: 3,
        actual: 0,
    })?;
    let kind =
        FrameKind::from_marker(marker).ok_or(ProtocolError::InvalidHeader(marker))?;

    let header_len = kind.header_len();
    if frame.len() < header_len {
        return Err(ProtocolError::ShortBuffer {
            context: "header",
            needed: header_len,
            actual: frame.len(),
        });
    }

    let declared_len = kind.declared_size(frame).unwrap_or_default();
    let code_offset = kind.code_offset();
    Ok(PacketHeader {
        kind,
        declared_len,
        code: frame[code_offset],
        subcode: frame.get(code_offset + 1).copied(),
    })
}

// =========================================================================
// Tests
// =========================================================================
