//! Frame extraction for the marker-prefixed byte stream.
//!
//! Every frame on the wire starts with one of four marker bytes. The marker
//! decides how wide the size field is and whether the body is encrypted by
//! the block stage:
//!
//! ```text
//! C1 [size:u8]      [code] ...   plain,     3-byte header
//! C3 [size:u8]      [code] ...   encrypted, 3-byte header
//! C2 [size:u16 BE]  [code] ...   plain,     4-byte header
//! C4 [size:u16 BE]  [code] ...   encrypted, 4-byte header
//! ```
//!
//! The size always counts the whole frame, marker included.

use bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;

use crate::TransportError;

// ---------------------------------------------------------------------------
// FrameKind
// ---------------------------------------------------------------------------

/// The four frame markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    /// `C1`: byte-sized length, plain body.
    C1,
    /// `C2`: word-sized length, plain body.
    C2,
    /// `C3`: byte-sized length, block-encrypted body.
    C3,
    /// `C4`: word-sized length, block-encrypted body.
    C4,
}

impl FrameKind {
    /// Maps a marker byte to its kind.
    pub fn from_marker(marker: u8) -> Option<Self> {
        match marker {
            0xC1 => Some(Self::C1),
            0xC2 => Some(Self::C2),
            0xC3 => Some(Self::C3),
            0xC4 => Some(Self::C4),
            _ => None,
        }
    }

    /// The marker byte itself.
    pub fn marker(self) -> u8 {
        match self {
            Self::C1 => 0xC1,
            Self::C2 => 0xC2,
            Self::C3 => 0xC3,
            Self::C4 => 0xC4,
        }
    }

    /// Header length: marker + size field + code byte.
    pub fn header_len(self) -> usize {
        match self {
            Self::C1 | Self::C3 => 3,
            Self::C2 | Self::C4 => 4,
        }
    }

    /// Offset of the code byte (the last header byte).
    pub fn code_offset(self) -> usize {
        self.header_len() - 1
    }

    /// Whether the body goes through the block cipher stage.
    pub fn is_encrypted(self) -> bool {
        matches!(self, Self::C3 | Self::C4)
    }

    /// Reads the declared total size, if enough bytes are present.
    pub fn declared_size(self, buf: &[u8]) -> Option<usize> {
        match self {
            Self::C1 | Self::C3 => buf.get(1).map(|&b| b as usize),
            Self::C2 | Self::C4 => match (buf.get(1), buf.get(2)) {
                (Some(&hi), Some(&lo)) => {
                    Some(u16::from_be_bytes([hi, lo]) as usize)
                }
                _ => None,
            },
        }
    }
}

/// Rewrites the size field of `frame` to match its actual length.
///
/// Builders create frames with a placeholder size; cipher stages that change
/// the body length call this again afterwards.
pub fn write_size(frame: &mut [u8]) -> Result<(), TransportError> {
    let kind = frame
        .first()
        .copied()
        .and_then(FrameKind::from_marker)
        .ok_or_else(|| {
            TransportError::InvalidFrame("missing or unknown marker".into())
        })?;
    let len = frame.len();
    match kind {
        FrameKind::C1 | FrameKind::C3 => {
            if len > u8::MAX as usize || len < kind.header_len() {
                return Err(TransportError::InvalidFrame(format!(
                    "{len} bytes do not fit a {kind:?} frame"
                )));
            }
            frame[1] = len as u8;
        }
        FrameKind::C2 | FrameKind::C4 => {
            if len > u16::MAX as usize || len < kind.header_len() {
                return Err(TransportError::InvalidFrame(format!(
                    "{len} bytes do not fit a {kind:?} frame"
                )));
            }
            frame[1..3].copy_from_slice(&(len as u16).to_be_bytes());
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// FrameCodec
// ---------------------------------------------------------------------------

/// Splits a TCP byte stream into whole frames.
///
/// Used with [`tokio_util::codec::FramedRead`]. Yields each frame as an owned
/// buffer, header included. An unknown marker or a size smaller than the
/// header is unrecoverable: the stream position is lost, so the link ends.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameCodec;

impl Decoder for FrameCodec {
    type Item = Vec<u8>;
    type Error = TransportError;

    fn decode(
        &mut self,
        src: &mut BytesMut,
    ) -> Result<Option<Self::Item>, Self::Error> {
        let Some(&marker) = src.first() else {
            return Ok(None);
        };
        let kind = FrameKind::from_marker(marker).ok_or_else(|| {
            TransportError::InvalidFrame(format!(
                "unknown frame marker {marker:#04X}"
            ))
        })?;
        let Some(size) = kind.declared_size(src) else {
            return Ok(None);
        };
        if size < kind.header_len() {
            return Err(TransportError::InvalidFrame(format!(
                "declared size {size} is smaller than the {kind:?} header"
            )));
        }
        if src.len() < size {
            src.reserve(size - src.len());
            return Ok(None);
        }

        let frame = src[..size].to_vec();
        src.advance(size);
        Ok(Some(frame))
    }
}

// =========================================================================
// Tests
// =========================================================================
