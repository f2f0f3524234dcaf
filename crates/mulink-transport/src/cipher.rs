//! Cipher stages applied to whole frames.
//!
//! The game-server leg runs every outbound frame through two stages and
//! every inbound frame through one:
//!
//! ```text
//! outbound:  frame ─▶ Xor32Encryptor ─▶ block encrypt (C3/C4 only) ─▶ socket
//! inbound:   socket ─▶ block decrypt (C3/C4 only) ─▶ frame
//! ```
//!
//! The xor stage is fully specified here. The block-substitution stage is a
//! plug-in behind [`BlockCipher`]; [`PassthroughBlockCipher`] stands in when
//! no key material is available.

use std::fmt;
use std::sync::Arc;

use crate::TransportError;
use crate::framing::{FrameKind, write_size};

/// The fixed 32-byte key of the xor stage.
pub const XOR32_KEY: [u8; 32] = [
    0xAB, 0x11, 0xCD, 0xFE, 0x18, 0x23, 0xC5, 0xA3, 0xCA, 0x33, 0xC1, 0xCC,
    0x66, 0x67, 0x21, 0xF3, 0x32, 0x12, 0x15, 0x35, 0x29, 0xFF, 0xFE, 0x1D,
    0x44, 0xEF, 0xCD, 0x41, 0x26, 0x3C, 0x4E, 0x4D,
];

/// One direction of a cipher: takes a whole frame, returns a whole frame.
///
/// Stages own any rolling state (counters, key schedules), so they are
/// applied strictly in wire order.
pub trait FrameTransform: Send {
    fn apply(&mut self, frame: Vec<u8>) -> Result<Vec<u8>, TransportError>;
}

fn frame_kind(frame: &[u8]) -> Result<FrameKind, TransportError> {
    let kind = frame
        .first()
        .copied()
        .and_then(FrameKind::from_marker)
        .ok_or_else(|| {
            TransportError::Cipher("frame has no valid marker".into())
        })?;
    if frame.len() < kind.header_len() {
        return Err(TransportError::Cipher(format!(
            "{} bytes is shorter than the {kind:?} header",
            frame.len()
        )));
    }
    Ok(kind)
}

// ---------------------------------------------------------------------------
// Xor32
// ---------------------------------------------------------------------------

/// Chained xor over everything after the code byte.
///
/// Each byte is mixed with the already-encrypted byte before it and with
/// the key byte at its absolute position.
#[derive(Debug, Clone, Copy, Default)]
pub struct Xor32Encryptor;

impl FrameTransform for Xor32Encryptor {
    fn apply(&mut self, mut frame: Vec<u8>) -> Result<Vec<u8>, TransportError> {
        let start = frame_kind(&frame)?.code_offset() + 1;
        for i in start..frame.len() {
            frame[i] ^= frame[i - 1] ^ XOR32_KEY[i % XOR32_KEY.len()];
        }
        Ok(frame)
    }
}

/// Inverse of [`Xor32Encryptor`]. Walks backwards so every step still sees
/// the encrypted predecessor.
#[derive(Debug, Clone, Copy, Default)]
pub struct Xor32Decryptor;

impl FrameTransform for Xor32Decryptor {
    fn apply(&mut self, mut frame: Vec<u8>) -> Result<Vec<u8>, TransportError> {
        let start = frame_kind(&frame)?.code_offset() + 1;
        for i in (start..frame.len()).rev() {
            frame[i] ^= frame[i - 1] ^ XOR32_KEY[i % XOR32_KEY.len()];
        }
        Ok(frame)
    }
}

// ---------------------------------------------------------------------------
// Block stage
// ---------------------------------------------------------------------------

/// The block-substitution cipher used on `C3`/`C4` frames.
///
/// Implementations receive the complete frame, header included, and may
/// change its length; the size field is rewritten afterwards.
pub trait BlockCipher: Send {
    fn encrypt(&mut self, frame: Vec<u8>) -> Result<Vec<u8>, TransportError>;
    fn decrypt(&mut self, frame: Vec<u8>) -> Result<Vec<u8>, TransportError>;
}

/// Leaves frames untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughBlockCipher;

impl BlockCipher for PassthroughBlockCipher {
    fn encrypt(&mut self, frame: Vec<u8>) -> Result<Vec<u8>, TransportError> {
        Ok(frame)
    }

    fn decrypt(&mut self, frame: Vec<u8>) -> Result<Vec<u8>, TransportError> {
        Ok(frame)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Encrypt,
    Decrypt,
}

/// Adapts one direction of a [`BlockCipher`] to a [`FrameTransform`].
/// `C1`/`C2` frames pass through unchanged.
pub struct BlockStage {
    cipher: Box<dyn BlockCipher>,
    direction: Direction,
}

impl BlockStage {
    pub fn encrypting(cipher: Box<dyn BlockCipher>) -> Self {
        Self {
            cipher,
            direction: Direction::Encrypt,
        }
    }

    pub fn decrypting(cipher: Box<dyn BlockCipher>) -> Self {
        Self {
            cipher,
            direction: Direction::Decrypt,
        }
    }
}

impl fmt::Debug for BlockStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockStage")
            .field("direction", &self.direction)
            .finish_non_exhaustive()
    }
}

impl FrameTransform for BlockStage {
    fn apply(&mut self, frame: Vec<u8>) -> Result<Vec<u8>, TransportError> {
        if !frame_kind(&frame)?.is_encrypted() {
            return Ok(frame);
        }
        let mut out = match self.direction {
            Direction::Encrypt => self.cipher.encrypt(frame)?,
            Direction::Decrypt => self.cipher.decrypt(frame)?,
        };
        write_size(&mut out)?;
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// Chaining and factories
// ---------------------------------------------------------------------------

/// Several stages applied in order.
#[derive(Default)]
pub struct Chain {
    stages: Vec<Box<dyn FrameTransform>>,
}

impl Chain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a stage; frames visit stages in the order they were added.
    pub fn then(mut self, stage: impl FrameTransform + 'static) -> Self {
        self.stages.push(Box::new(stage));
        self
    }
}

impl FrameTransform for Chain {
    fn apply(&mut self, frame: Vec<u8>) -> Result<Vec<u8>, TransportError> {
        self.stages
            .iter_mut()
            .try_fold(frame, |frame, stage| stage.apply(frame))
    }
}

/// The two directions of one link's cipher.
pub struct CipherPair {
    pub encryptor: Box<dyn FrameTransform>,
    pub decryptor: Box<dyn FrameTransform>,
}

impl fmt::Debug for CipherPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CipherPair").finish_non_exhaustive()
    }
}

/// Builds a fresh [`CipherPair`] for each encrypted link.
///
/// Cipher state never outlives the link it was created for.
pub trait CipherFactory: Send + Sync + 'static {
    fn create(&self) -> CipherPair;
}

type BlockMaker = dyn Fn() -> Box<dyn BlockCipher> + Send + Sync;

/// Outbound: xor32 then block encrypt. Inbound: block decrypt only, since
/// servers do not xor their frames.
#[derive(Clone)]
pub struct StandardCipherFactory {
    make_block: Arc<BlockMaker>,
}

impl StandardCipherFactory {
    /// Uses `make_block` to build one block cipher per direction.
    pub fn with_block_cipher<F>(make_block: F) -> Self
    where
        F: Fn() -> Box<dyn BlockCipher> + Send + Sync + 'static,
    {
        Self {
            make_block: Arc::new(make_block),
        }
    }
}

impl Default for StandardCipherFactory {
    fn default() -> Self {
        Self::with_block_cipher(|| Box::new(PassthroughBlockCipher))
    }
}

impl fmt::Debug for StandardCipherFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StandardCipherFactory").finish_non_exhaustive()
    }
}

impl CipherFactory for StandardCipherFactory {
    fn create(&self) -> CipherPair {
        CipherPair {
            encryptor: Box::new(
                Chain::new()
                    .then(Xor32Encryptor)
                    .then(BlockStage::encrypting((self.make_block)())),
            ),
            decryptor: Box::new(BlockStage::decrypting((self.make_block)())),
        }
    }
}

// =========================================================================
// Tests
// =========================================================================
