//! Transport layer for mulink.
//!
//! Owns the raw TCP link to a connect server or game server:
//!
//! - [`TransportManager`]: connect / receive / send / disconnect lifecycle
//! - [`FrameCodec`]: splits the byte stream into `C1`..`C4` frames
//! - [`cipher`]: the xor and block cipher stages of encrypted links
//!
//! Nothing here knows what a frame means. Decoding is the protocol layer's
//! job; this crate only hands whole frames to a [`TransportEvents`] sink.

pub mod cipher;
mod error;
pub mod framing;
mod manager;

pub use cipher::{
    BlockCipher, CipherFactory, CipherPair, FrameTransform,
    PassthroughBlockCipher, StandardCipherFactory,
};
pub use error::TransportError;
pub use framing::{FrameCodec, FrameKind};
pub use manager::{TransportEvents, TransportManager};

use std::fmt;

/// Number of one link opened by a [`TransportManager`].
///
/// Numbers start at [`LinkId::FIRST`] and grow by one per successful
/// connect, never reused within a manager. Callers tag callbacks with it to
/// tell the current link from one that has already been replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LinkId(u64);

impl LinkId {
    pub const FIRST: Self = Self(1);

    /// The number handed out after this one.
    pub fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
