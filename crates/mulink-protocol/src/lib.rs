//! Wire protocol for mulink.
//!
//! This crate knows what the bytes inside a frame mean. It never touches a
//! socket; the transport hands it whole, decrypted frames and takes back
//! whole frames to encrypt and send.
//!
//! - **Headers** ([`parse_header`]): frame kind, code and subcode.
//! - **Schemas** ([`schema`]): every layout per message and [`Dialect`],
//!   written down once as data.
//! - **Decoders** ([`messages`], [`charlist`]): frame in, owned struct out.
//! - **Builders** ([`builders`]): request parameters in, frame out.
//! - **Appearance** ([`appearance`], [`class`]): equipment and class
//!   markers packed into a handful of bytes.
//!
//! ```text
//! Transport (frames) → Protocol (typed messages) → Session (state machine)
//! ```
//!
//! Every decoder returns `Result`; a malformed frame is an error value,
//! never a panic.

// ---------------------------------------------------------------------------
// Module declarations
// ---------------------------------------------------------------------------

pub mod appearance;
pub mod builders;
pub mod charlist;
pub mod class;
mod error;
mod header;
pub mod messages;
pub mod schema;
mod types;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

pub use appearance::{Appearance, AppearanceLayout, EquipmentSlot, ItemId, Slot};
pub use class::{CharacterClass, ClassFamily};
pub use error::ProtocolError;
pub use header::{PacketHeader, parse_header};
pub use messages::LoginResult;
pub use schema::{MessageKind, MessageSchema, PacketView, lookup};
pub use types::{CharacterInfo, Dialect, EntityId, ServerInfo};
