//! Inbound message decoders.
//!
//! One function per message. Each takes the whole frame (header included)
//! and the active dialect, and returns a plain owned struct. Fields that a
//! dialect does not carry come back as `None` or zero, as documented per
//! struct.
//!
//! List messages clamp: when the declared count promises more records than
//! the frame holds, the decoder returns the records that are there and logs
//! the difference.

use crate::appearance::AppearanceLayout;
use crate::schema::{MessageKind, PacketView, RecordKind, lookup, read_text, record};
use crate::{Dialect, EntityId, ProtocolError, ServerInfo};

fn view(
    frame: &[u8],
    kind: MessageKind,
    dialect: Dialect,
) -> Result<PacketView<'_>, ProtocolError> {
    PacketView::message(frame, lookup(kind, dialect))
}

fn entity(view: &PacketView<'_>, name: &'static str) -> Result<EntityId, ProtocolError> {
    Ok(EntityId::from_wire(view.u16(name)?))
}

fn clamp_count(message: &'static str, declared: usize, available: usize) -> usize {
    if declared > available {
        tracing::warn!(message, declared, available, "record count clamped");
    }
    declared.min(available)
}

// ---------------------------------------------------------------------------
// Connect server
// ---------------------------------------------------------------------------

pub fn decode_server_list(frame: &[u8]) -> Result<Vec<ServerInfo>, ProtocolError> {
    let dialect = Dialect::default();
    let view = view(frame, MessageKind::ServerListResponse, dialect)?;
    let entries = view.slice("entries")?;
    let schema = record(RecordKind::ServerEntry, dialect);
    let count = clamp_count(
        "ServerListResponse",
        usize::from(view.u16("count")?),
        entries.len() / schema.len,
    );

    entries
        .chunks_exact(schema.len)
        .take(count)
        .map(|raw| {
            let entry = PacketView::record(raw, schema)?;
            Ok(ServerInfo {
                server_id: entry.u16("server_id")?,
                load_percentage: entry.u8("load")?,
            })
        })
        .collect()
}

/// Where the chosen game server listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub host: String,
    pub port: u16,
}

pub fn decode_connection_info(frame: &[u8]) -> Result<ConnectionInfo, ProtocolError> {
    let view = view(frame, MessageKind::ConnectionInfo, Dialect::default())?;
    let host = view.text("host")?;
    if host.is_empty() {
        return Err(ProtocolError::InvalidMessage(
            "connection info without a host".into(),
        ));
    }
    Ok(ConnectionInfo {
        host,
        port: view.u16("port")?,
    })
}

// ---------------------------------------------------------------------------
// Game server, session
// ---------------------------------------------------------------------------

/// The game server's greeting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameServerEntered {
    pub success: bool,
    /// The id the server will use for this client's character.
    pub player_id: EntityId,
    pub version: Vec<u8>,
}

pub fn decode_game_server_entered(
    frame: &[u8],
    dialect: Dialect,
) -> Result<GameServerEntered, ProtocolError> {
    let view = view(frame, MessageKind::GameServerEntered, dialect)?;
    Ok(GameServerEntered {
        success: view.u8("success")? != 0,
        player_id: entity(&view, "player_id")?,
        version: view.slice("version")?.to_vec(),
    })
}

/// Outcome of a login request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoginResult {
    InvalidPassword,
    Ok,
    AccountInvalid,
    AccountAlreadyConnected,
    ServerFull,
    AccountBlocked,
    WrongVersion,
    ConnectionError,
    TemporaryBlocked,
    Unknown(u8),
}

impl LoginResult {
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => LoginResult::InvalidPassword,
            1 => LoginResult::Ok,
            2 => LoginResult::AccountInvalid,
            3 => LoginResult::AccountAlreadyConnected,
            4 => LoginResult::ServerFull,
            5 => LoginResult::AccountBlocked,
            6 => LoginResult::WrongVersion,
            7 => LoginResult::ConnectionError,
            8 => LoginResult::TemporaryBlocked,
            other => LoginResult::Unknown(other),
        }
    }

    pub fn is_success(self) -> bool {
        self == LoginResult::Ok
    }
}

/// Returns the raw result code.
pub fn decode_login_response(frame: &[u8], dialect: Dialect) -> Result<u8, ProtocolError> {
    view(frame, MessageKind::LoginResponse, dialect)?.u8("result")
}

/// The hero's full state on entering the game.
///
/// `direction` is 0 in Season 6; `shield`/`max_shield` are 0 before it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CharacterInformation {
    pub x: u8,
    pub y: u8,
    pub map: u16,
    pub direction: u8,
    pub experience: u64,
    pub next_experience: u64,
    pub health: u16,
    pub max_health: u16,
    pub mana: u16,
    pub max_mana: u16,
    pub shield: u16,
    pub max_shield: u16,
    pub ability: u16,
    pub max_ability: u16,
    pub money: u32,
}

fn optional_u16(view: &PacketView<'_>, name: &'static str) -> Result<Option<u16>, ProtocolError> {
    if view.has(name) { view.u16(name).map(Some) } else { Ok(None) }
}

pub fn decode_character_information(
    frame: &[u8],
    dialect: Dialect,
) -> Result<CharacterInformation, ProtocolError> {
    let view = view(frame, MessageKind::CharacterInformation, dialect)?;
    Ok(CharacterInformation {
        x: view.u8("x")?,
        y: view.u8("y")?,
        map: view.u16("map")?,
        direction: if view.has("direction") { view.u8("direction")? } else { 0 },
        experience: view.u64("experience")?,
        next_experience: view.u64("next_experience")?,
        health: view.u16("health")?,
        max_health: view.u16("max_health")?,
        mana: view.u16("mana")?,
        max_mana: view.u16("max_mana")?,
        shield: optional_u16(&view, "shield")?.unwrap_or(0),
        max_shield: optional_u16(&view, "max_shield")?.unwrap_or(0),
        ability: view.u16("ability")?,
        max_ability: view.u16("max_ability")?,
        money: view.u32("money")?,
    })
}

/// The hero came back to life. `shield` is `None` before Season 6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Respawn {
    pub x: u8,
    pub y: u8,
    pub map: u16,
    pub direction: u8,
    pub health: u16,
    pub mana: u16,
    pub shield: Option<u16>,
    pub ability: u16,
    pub experience: u64,
    pub money: u32,
}

pub fn decode_respawn(frame: &[u8], dialect: Dialect) -> Result<Respawn, ProtocolError> {
    let view = view(frame, MessageKind::RespawnAfterDeath, dialect)?;
    Ok(Respawn {
        x: view.u8("x")?,
        y: view.u8("y")?,
        map: view.u16("map")?,
        direction: view.u8("direction")?,
        health: view.u16("health")?,
        mana: view.u16("mana")?,
        shield: optional_u16(&view, "shield")?,
        ability: view.u16("ability")?,
        experience: view.u64("experience")?,
        money: view.u32("money")?,
    })
}

/// A teleport. `is_map_change` is false for moves within the same map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapChange {
    pub is_map_change: bool,
    pub map: u16,
    pub x: u8,
    pub y: u8,
    pub rotation: u8,
}

pub fn decode_map_changed(frame: &[u8], dialect: Dialect) -> Result<MapChange, ProtocolError> {
    let view = view(frame, MessageKind::MapChanged, dialect)?;
    Ok(MapChange {
        is_map_change: view.u8("is_map_change")? != 0,
        map: view.u16("map")?,
        x: view.u8("x")?,
        y: view.u8("y")?,
        rotation: view.u8("rotation")?,
    })
}

/// Current or maximum health, with shield where the dialect has it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthShield {
    pub health: u16,
    pub shield: Option<u16>,
}

/// Decodes either the current or the maximum health message.
pub fn decode_health_shield(
    frame: &[u8],
    kind: MessageKind,
    dialect: Dialect,
) -> Result<HealthShield, ProtocolError> {
    let view = view(frame, kind, dialect)?;
    Ok(HealthShield {
        health: view.u16("health")?,
        shield: optional_u16(&view, "shield")?,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManaAbility {
    pub mana: u16,
    pub ability: u16,
}

/// Decodes either the current or the maximum mana message.
pub fn decode_mana_ability(
    frame: &[u8],
    kind: MessageKind,
    dialect: Dialect,
) -> Result<ManaAbility, ProtocolError> {
    let view = view(frame, kind, dialect)?;
    Ok(ManaAbility {
        mana: view.u16("mana")?,
        ability: view.u16("ability")?,
    })
}

// ---------------------------------------------------------------------------
// Game server, world
// ---------------------------------------------------------------------------

/// A player entering view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopePlayer {
    pub id: EntityId,
    pub name: String,
    pub x: u8,
    pub y: u8,
    pub target_x: u8,
    pub target_y: u8,
    pub direction: u8,
    pub appearance: Vec<u8>,
    pub appearance_layout: AppearanceLayout,
}

/// An NPC or monster entering view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopeNpc {
    pub id: EntityId,
    pub npc_type: u16,
    pub x: u8,
    pub y: u8,
    pub target_x: u8,
    pub target_y: u8,
    pub direction: u8,
}

/// Walks a list of records that may each be followed by `effect_count`
/// effect bytes.
fn scope_records<'a, T>(
    frame: &'a [u8],
    message: MessageKind,
    kind: RecordKind,
    dialect: Dialect,
    mut decode: impl FnMut(&PacketView<'a>) -> Result<T, ProtocolError>,
) -> Result<Vec<T>, ProtocolError> {
    let view = view(frame, message, dialect)?;
    let schema = record(kind, dialect);
    let declared = usize::from(view.u8("count")?);
    let mut rest = view.slice("records")?;

    let mut out = Vec::with_capacity(declared.min(rest.len() / schema.len));
    for _ in 0..declared {
        let Ok(entry) = PacketView::record(rest, schema) else {
            clamp_count(schema.name, declared, out.len());
            break;
        };
        let effects = if entry.has("effect_count") {
            usize::from(entry.u8("effect_count")?)
        } else {
            0
        };
        let len = schema.len + effects;
        if rest.len() < len {
            clamp_count(schema.name, declared, out.len());
            break;
        }
        out.push(decode(&entry)?);
        rest = &rest[len..];
    }
    Ok(out)
}

pub fn decode_add_players(frame: &[u8], dialect: Dialect) -> Result<Vec<ScopePlayer>, ProtocolError> {
    let appearance_layout = match dialect {
        Dialect::Season6 => AppearanceLayout::Extended,
        Dialect::V097 | Dialect::V075 => AppearanceLayout::Legacy,
    };
    scope_records(frame, MessageKind::AddPlayersToScope, RecordKind::ScopePlayer, dialect, |r| {
        Ok(ScopePlayer {
            id: entity(r, "id")?,
            name: r.text("name")?,
            x: r.u8("x")?,
            y: r.u8("y")?,
            target_x: r.u8("target_x")?,
            target_y: r.u8("target_y")?,
            direction: r.u8("rotation")? >> 4,
            appearance: r.slice("appearance")?.to_vec(),
            appearance_layout,
        })
    })
}

pub fn decode_add_npcs(frame: &[u8], dialect: Dialect) -> Result<Vec<ScopeNpc>, ProtocolError> {
    scope_records(frame, MessageKind::AddNpcsToScope, RecordKind::ScopeNpc, dialect, |r| {
        Ok(ScopeNpc {
            id: entity(r, "id")?,
            npc_type: r.u16("npc_type")?,
            x: r.u8("x")?,
            y: r.u8("y")?,
            target_x: r.u8("target_x")?,
            target_y: r.u8("target_y")?,
            direction: r.u8("rotation")? >> 4,
        })
    })
}

pub fn decode_objects_out_of_scope(
    frame: &[u8],
    dialect: Dialect,
) -> Result<Vec<EntityId>, ProtocolError> {
    let view = view(frame, MessageKind::ObjectsOutOfScope, dialect)?;
    let ids = view.slice("ids")?;
    let count = clamp_count("ObjectsOutOfScope", usize::from(view.u8("count")?), ids.len() / 2);
    Ok(ids
        .chunks_exact(2)
        .take(count)
        .map(|raw| EntityId::from_wire(u16::from_be_bytes([raw[0], raw[1]])))
        .collect())
}

/// An instant position change (no walk animation).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectMoved {
    pub id: EntityId,
    pub x: u8,
    pub y: u8,
}

pub fn decode_object_moved(frame: &[u8], dialect: Dialect) -> Result<ObjectMoved, ProtocolError> {
    let view = view(frame, MessageKind::ObjectMoved, dialect)?;
    Ok(ObjectMoved {
        id: entity(&view, "id")?,
        x: view.u8("x")?,
        y: view.u8("y")?,
    })
}

/// A walk along a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectWalked {
    pub id: EntityId,
    pub target_x: u8,
    pub target_y: u8,
    pub direction: u8,
    /// Unpacked step directions, one per step.
    pub steps: Vec<u8>,
}

pub fn decode_object_walked(frame: &[u8], dialect: Dialect) -> Result<ObjectWalked, ProtocolError> {
    let view = view(frame, MessageKind::ObjectWalked, dialect)?;
    let rotation_steps = view.u8("rotation_steps")?;
    let step_count = usize::from(rotation_steps & 0x0F);
    let steps = view
        .slice("steps")?
        .iter()
        .flat_map(|b| [b >> 4, b & 0x0F])
        .take(step_count)
        .collect();
    Ok(ObjectWalked {
        id: entity(&view, "id")?,
        target_x: view.u8("target_x")?,
        target_y: view.u8("target_y")?,
        direction: rotation_steps >> 4,
        steps,
    })
}

/// Damage dealt to an object. `shield_damage` is 0 before Season 6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectHit {
    pub id: EntityId,
    pub health_damage: u16,
    pub shield_damage: u16,
    pub kind: u8,
}

pub fn decode_object_hit(frame: &[u8], dialect: Dialect) -> Result<ObjectHit, ProtocolError> {
    let view = view(frame, MessageKind::ObjectHit, dialect)?;
    Ok(ObjectHit {
        id: entity(&view, "id")?,
        health_damage: view.u16("health_damage")?,
        shield_damage: optional_u16(&view, "shield_damage")?.unwrap_or(0),
        kind: view.u8("kind")?,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectKilled {
    pub killed: EntityId,
    pub killer: EntityId,
    pub skill: u16,
}

pub fn decode_object_killed(frame: &[u8], dialect: Dialect) -> Result<ObjectKilled, ProtocolError> {
    let view = view(frame, MessageKind::ObjectGotKilled, dialect)?;
    Ok(ObjectKilled {
        killed: entity(&view, "killed")?,
        killer: entity(&view, "killer")?,
        skill: view.u16("skill")?,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectAnimation {
    pub id: EntityId,
    pub direction: u8,
    pub animation: u8,
    pub target: EntityId,
}

pub fn decode_object_animation(
    frame: &[u8],
    dialect: Dialect,
) -> Result<ObjectAnimation, ProtocolError> {
    let view = view(frame, MessageKind::ObjectAnimation, dialect)?;
    Ok(ObjectAnimation {
        id: entity(&view, "id")?,
        direction: view.u8("direction")?,
        animation: view.u8("animation")?,
        target: entity(&view, "target")?,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SkillAnimation {
    pub skill: u16,
    pub caster: EntityId,
    pub target: EntityId,
}

pub fn decode_skill_animation(
    frame: &[u8],
    dialect: Dialect,
) -> Result<SkillAnimation, ProtocolError> {
    let view = view(frame, MessageKind::SkillAnimation, dialect)?;
    Ok(SkillAnimation {
        skill: view.u16("skill")?,
        caster: entity(&view, "caster")?,
        target: entity(&view, "target")?,
    })
}

/// A chat or whisper line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatLine {
    pub sender: String,
    pub text: String,
}

/// Decodes a chat (`kind` = [`MessageKind::ChatMessage`]) or whisper
/// (`kind` = [`MessageKind::WhisperMessage`]) line.
pub fn decode_chat(frame: &[u8], kind: MessageKind, dialect: Dialect) -> Result<ChatLine, ProtocolError> {
    let view = view(frame, kind, dialect)?;
    Ok(ChatLine {
        sender: view.text("sender")?,
        text: read_text(view.slice("text")?),
    })
}

// =========================================================================
// Tests
// =========================================================================
