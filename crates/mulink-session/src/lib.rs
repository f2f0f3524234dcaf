//! Game session management for mulink.
//!
//! This crate drives one player's way from the connect server into the game
//! world:
//!
//! 1. **State machine**: [`GameClient`] walks the connect and login flow and
//!    rejects requests that make no sense in the current state.
//! 2. **Dispatch**: inbound frames are routed by `(code, subcode)` through a
//!    table per server role ([`dispatch`]).
//! 3. **Event queues**: decoded traffic becomes [`SessionEvent`]s and
//!    [`WorldEvent`]s that the consumer drains on its own tick ([`queue`]).
//!
//! # How it fits in the stack
//!
//! ```text
//! Consumer (above)  ← drains events, calls GameClient requests
//!     ↕
//! Session Layer (this crate)  ← state, routing, hero stats, deferral
//!     ↕
//! Protocol Layer  ← decoders and builders
//! Transport Layer ← framed TCP, ciphers
//! ```

mod client;
pub mod dispatch;
mod error;
mod events;
pub mod queue;
mod settings;

pub use client::GameClient;
pub use error::SessionError;
pub use events::{
    AnimationKind, ConnectionState, EntityKind, HeroStats, SessionEvent, WorldEvent,
};
pub use queue::{DEFAULT_DEFERRAL_CAPACITY, DrainBudget, EventQueues};
pub use settings::{CLIENT_SERIAL_LEN, CLIENT_VERSION_LEN, ClientSettings};
