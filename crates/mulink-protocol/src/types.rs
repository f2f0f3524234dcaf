//! Shared value types used by decoders, builders and the session layer.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::appearance::{Appearance, AppearanceLayout, decode_appearance};
use crate::class::CharacterClass;
use crate::ProtocolError;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// The identity of an object in the world: player, monster or NPC.
///
/// This is a "newtype wrapper" around the 15 bits that actually identify an
/// object. Servers set bit 15 of the 16-bit wire id as a flag (for example
/// "this is a monster"), so the same object can show up with and without
/// it. Always build one with [`EntityId::from_wire`] so both forms become
/// the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(u16);

impl EntityId {
    /// Mask that removes the flag bit.
    pub const MASK: u16 = 0x7FFF;

    /// Builds an id from a raw wire value, dropping the flag bit.
    pub fn from_wire(raw: u16) -> Self {
        Self(raw & Self::MASK)
    }

    /// Returns the masked 15-bit value.
    pub fn get(self) -> u16 {
        self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Dialect
// ---------------------------------------------------------------------------

/// A wire-format generation.
///
/// The same logical message (say "character information") has different
/// field widths and offsets depending on which server generation sent it.
/// The dialect is configured, never guessed; only the character-list record
/// size is detected from the frame itself.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// The current generation.
    #[default]
    Season6,
    /// Version 0.97 servers.
    V097,
    /// Version 0.75 servers.
    V075,
}

impl Dialect {
    pub const ALL: [Dialect; 3] = [Dialect::Season6, Dialect::V097, Dialect::V075];

    pub fn name(self) -> &'static str {
        match self {
            Dialect::Season6 => "season6",
            Dialect::V097 => "v097",
            Dialect::V075 => "v075",
        }
    }

    /// The code byte of the walk message (both directions).
    pub fn walk_code(self) -> u8 {
        match self {
            Dialect::Season6 => 0xD4,
            Dialect::V097 => 0xD3,
            Dialect::V075 => 0x10,
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Dialect {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Dialect::ALL
            .into_iter()
            .find(|d| d.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                ProtocolError::InvalidMessage(format!("unknown dialect `{s}`"))
            })
    }
}

// ---------------------------------------------------------------------------
// Session data
// ---------------------------------------------------------------------------

/// One entry of the connect server's server list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub server_id: u16,
    pub load_percentage: u8,
}

/// One character slot from the game server's character list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacterInfo {
    pub slot: u8,
    pub name: String,
    pub class: CharacterClass,
    pub level: u16,
    /// Raw appearance bytes, decoded on demand.
    pub appearance: Vec<u8>,
    pub appearance_layout: AppearanceLayout,
}

impl CharacterInfo {
    /// Decodes the equipment visible on this character.
    pub fn decode_appearance(&self) -> Result<Appearance, ProtocolError> {
        decode_appearance(self.appearance_layout, &self.appearance)
    }
}

// =========================================================================
// Tests
// =========================================================================
