//! What the client tells its consumers.
//!
//! Two streams leave the client. [`SessionEvent`]s describe the connection
//! and login flow; a menu or login screen reads them. [`WorldEvent`]s
//! describe what happens on the map; the scene reads them. Both are plain
//! owned values, so a consumer on another thread can keep them as long as
//! it likes.

use std::fmt;

use mulink_protocol::{AppearanceLayout, CharacterInfo, EntityId, ServerInfo};

// ---------------------------------------------------------------------------
// ConnectionState
// ---------------------------------------------------------------------------

/// Where the client is in the connect and login flow.
///
/// ```text
/// Initial → ConnectingToConnectServer → ConnectedToConnectServer
///   → RequestingServerList → ReceivedServerList
///   → RequestingConnectionInfo → ReceivedConnectionInfo
///   → ConnectingToGameServer → ConnectedToGameServer
///   → Authenticating → ConnectedToGameServer (again, on any login result)
///   → SelectingCharacter → InGame
///
/// Disconnected is reachable from every state but Initial.
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    #[default]
    Initial,
    ConnectingToConnectServer,
    ConnectedToConnectServer,
    RequestingServerList,
    ReceivedServerList,
    RequestingConnectionInfo,
    ReceivedConnectionInfo,
    ConnectingToGameServer,
    ConnectedToGameServer,
    Authenticating,
    SelectingCharacter,
    InGame,
    Disconnected,
}

impl ConnectionState {
    /// Whether a new connect-server connection may start from here.
    pub fn is_idle(self) -> bool {
        matches!(self, ConnectionState::Initial | ConnectionState::Disconnected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// ---------------------------------------------------------------------------
// SessionEvent
// ---------------------------------------------------------------------------

/// Connection and login progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The state changed. Emitted exactly once per change.
    StateChanged(ConnectionState),
    ServerListReceived(Vec<ServerInfo>),
    LoginSucceeded,
    /// The raw result code; see [`LoginResult`](mulink_protocol::LoginResult).
    LoginFailed(u8),
    CharacterListReceived(Vec<CharacterInfo>),
    EnteredGame,
    /// Something failed. The text is meant for display.
    Error(String),
}

// ---------------------------------------------------------------------------
// HeroStats
// ---------------------------------------------------------------------------

/// One consistent snapshot of the hero's vital numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeroStats {
    pub level: u16,
    pub health: u16,
    pub max_health: u16,
    pub mana: u16,
    pub max_mana: u16,
    pub shield: u16,
    pub max_shield: u16,
    pub ability: u16,
    pub max_ability: u16,
    pub experience: u64,
    pub money: u32,
}

// ---------------------------------------------------------------------------
// WorldEvent
// ---------------------------------------------------------------------------

/// What kind of object a spawn describes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityKind {
    Player {
        name: String,
        /// Packed equipment; decode with
        /// [`decode_appearance`](mulink_protocol::appearance::decode_appearance).
        appearance: Vec<u8>,
        appearance_layout: AppearanceLayout,
    },
    Npc {
        npc_type: u16,
    },
}

/// What an animation shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnimationKind {
    /// A plain action such as an attack swing or an emote.
    Action { animation: u8, direction: u8 },
    /// A skill being cast.
    Skill { skill: u16 },
}

/// Something that happened on the map.
///
/// Ids are always masked (see [`EntityId`]). Coordinates are tile
/// coordinates; directions are 0..=15.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorldEvent {
    /// An object entered view, or its record was refreshed.
    SpawnOrUpdate {
        id: EntityId,
        x: u8,
        y: u8,
        direction: u8,
        kind: EntityKind,
    },
    /// Another object moved. `steps` is empty for an instant move, which
    /// also carries no direction.
    Move {
        id: EntityId,
        x: u8,
        y: u8,
        direction: Option<u8>,
        steps: Vec<u8>,
    },
    Remove {
        id: EntityId,
    },
    Animation {
        id: EntityId,
        target: EntityId,
        kind: AnimationKind,
    },
    Hit {
        id: EntityId,
        health_damage: u16,
        shield_damage: u16,
        kind: u8,
    },
    Kill {
        id: EntityId,
        killer: EntityId,
        skill: u16,
    },
    /// The hero is now on another map. Entity events are held back until
    /// the consumer acknowledges with
    /// [`send_ready_after_map_change`](crate::GameClient::send_ready_after_map_change).
    MapChanged {
        map: u16,
        x: u8,
        y: u8,
        direction: u8,
    },
    /// The hero moved within the current map.
    HeroPosition {
        x: u8,
        y: u8,
        direction: u8,
    },
    HeroStats(HeroStats),
    Chat {
        sender: String,
        text: String,
        whisper: bool,
    },
}

impl WorldEvent {
    /// Whether the event refers to an object in the scene, and so must wait
    /// while the scene is being switched.
    pub fn affects_entities(&self) -> bool {
        matches!(
            self,
            WorldEvent::SpawnOrUpdate { .. }
                | WorldEvent::Move { .. }
                | WorldEvent::Remove { .. }
                | WorldEvent::Animation { .. }
                | WorldEvent::Hit { .. }
                | WorldEvent::Kill { .. }
        )
    }
}
