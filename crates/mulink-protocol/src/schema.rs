//! The message schema table and zero-copy views over it.
//!
//! Every wire layout the client reads or writes is written down once, here,
//! as data: a [`MessageSchema`] per (message, dialect) and a [`RecordSchema`]
//! per repeated record. Decoders never index raw bytes directly; they ask a
//! [`PacketView`] for a named field, and builders fill a [`PacketWriter`]
//! the same way. Changing a layout therefore means changing one table entry.
//!
//! ```text
//! lookup(MessageKind::ObjectHit, Dialect::Season6)
//!     ─▶ MessageSchema { code: 0x11, min_len: 10, fields: [id@3 BE16, ...] }
//!     ─▶ PacketView::message(frame, schema)?.u16("id")?
//! ```

use mulink_transport::FrameKind;
use mulink_transport::framing::write_size;

use crate::{Dialect, ProtocolError};

// ---------------------------------------------------------------------------
// Field and message descriptions
// ---------------------------------------------------------------------------

/// Byte order of a multi-byte field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Big,
    Little,
}

/// One named field: where it starts, how wide it is, how to read it.
///
/// A `width` of zero marks a tail field that runs to the end of the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub offset: usize,
    pub width: usize,
    pub endian: Endian,
}

impl FieldSpec {
    pub const fn u8(name: &'static str, offset: usize) -> Self {
        Self { name, offset, width: 1, endian: Endian::Big }
    }

    pub const fn be16(name: &'static str, offset: usize) -> Self {
        Self { name, offset, width: 2, endian: Endian::Big }
    }

    pub const fn le16(name: &'static str, offset: usize) -> Self {
        Self { name, offset, width: 2, endian: Endian::Little }
    }

    pub const fn be32(name: &'static str, offset: usize) -> Self {
        Self { name, offset, width: 4, endian: Endian::Big }
    }

    pub const fn le32(name: &'static str, offset: usize) -> Self {
        Self { name, offset, width: 4, endian: Endian::Little }
    }

    pub const fn be64(name: &'static str, offset: usize) -> Self {
        Self { name, offset, width: 8, endian: Endian::Big }
    }

    /// A fixed-width byte or string field.
    pub const fn bytes(name: &'static str, offset: usize, width: usize) -> Self {
        Self { name, offset, width, endian: Endian::Big }
    }

    /// A field running from `offset` to the end of the buffer.
    pub const fn tail(name: &'static str, offset: usize) -> Self {
        Self { name, offset, width: 0, endian: Endian::Big }
    }

    pub fn is_tail(&self) -> bool {
        self.width == 0
    }
}

/// Layout of one message in one dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageSchema {
    pub name: &'static str,
    pub frame: FrameKind,
    pub code: u8,
    pub subcode: Option<u8>,
    /// Frames shorter than this are rejected. For fixed-size outbound
    /// messages it is also the frame size.
    pub min_len: usize,
    pub fields: &'static [FieldSpec],
}

impl MessageSchema {
    /// The dispatch key of this message.
    pub fn key(&self) -> (u8, Option<u8>) {
        (self.code, self.subcode)
    }
}

/// Layout of one repeated record inside a message.
///
/// `len` is the fixed part; some records are followed by a variable number
/// of extra bytes announced in one of their fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordSchema {
    pub name: &'static str,
    pub len: usize,
    pub fields: &'static [FieldSpec],
}

// ---------------------------------------------------------------------------
// PacketView
// ---------------------------------------------------------------------------

/// A read-only view of a frame or record that reads fields by name.
///
/// Borrowing the buffer means decoding allocates nothing until a caller asks
/// for an owned `String` or `Vec`.
#[derive(Debug, Clone, Copy)]
pub struct PacketView<'a> {
    name: &'static str,
    bytes: &'a [u8],
    fields: &'static [FieldSpec],
}

impl<'a> PacketView<'a> {
    /// Views a whole frame. Fails when it is shorter than `schema.min_len`.
    pub fn message(
        frame: &'a [u8],
        schema: &'static MessageSchema,
    ) -> Result<Self, ProtocolError> {
        if frame.len() < schema.min_len {
            return Err(ProtocolError::ShortBuffer {
                context: schema.name,
                needed: schema.min_len,
                actual: frame.len(),
            });
        }
        Ok(Self {
            name: schema.name,
            bytes: frame,
            fields: schema.fields,
        })
    }

    /// Views one record. Fails when it is shorter than `schema.len`.
    pub fn record(
        bytes: &'a [u8],
        schema: &'static RecordSchema,
    ) -> Result<Self, ProtocolError> {
        if bytes.len() < schema.len {
            return Err(ProtocolError::ShortBuffer {
                context: schema.name,
                needed: schema.len,
                actual: bytes.len(),
            });
        }
        Ok(Self {
            name: schema.name,
            bytes,
            fields: schema.fields,
        })
    }

    /// The whole underlying buffer.
    pub fn bytes(&self) -> &'a [u8] {
        self.bytes
    }

    /// Whether the schema defines `name` and the buffer covers it.
    pub fn has(&self, name: &'static str) -> bool {
        self.slice(name).is_ok()
    }

    /// The bytes of a field.
    pub fn slice(&self, name: &'static str) -> Result<&'a [u8], ProtocolError> {
        let field = find_field(self.name, self.fields, name)?;
        let end = if field.is_tail() {
            self.bytes.len().max(field.offset)
        } else {
            field.offset + field.width
        };
        self.bytes
            .get(field.offset..end)
            .ok_or(ProtocolError::ShortBuffer {
                context: self.name,
                needed: end,
                actual: self.bytes.len(),
            })
    }

    /// Any fixed-width integer field, widened to `u64`.
    pub fn uint(&self, name: &'static str) -> Result<u64, ProtocolError> {
        let field = find_field(self.name, self.fields, name)?;
        let raw = self.slice(name)?;
        if raw.is_empty() || raw.len() > 8 {
            return Err(ProtocolError::InvalidMessage(format!(
                "{}.{name} is not an integer field",
                self.name
            )));
        }
        let fold = |acc: u64, b: &u8| (acc << 8) | u64::from(*b);
        Ok(match field.endian {
            Endian::Big => raw.iter().fold(0, fold),
            Endian::Little => raw.iter().rev().fold(0, fold),
        })
    }

    pub fn u8(&self, name: &'static str) -> Result<u8, ProtocolError> {
        self.narrow(name)
    }

    pub fn u16(&self, name: &'static str) -> Result<u16, ProtocolError> {
        self.narrow(name)
    }

    pub fn u32(&self, name: &'static str) -> Result<u32, ProtocolError> {
        self.narrow(name)
    }

    pub fn u64(&self, name: &'static str) -> Result<u64, ProtocolError> {
        self.uint(name)
    }

    /// A NUL-padded string field. Bytes after the first NUL are ignored.
    pub fn text(&self, name: &'static str) -> Result<String, ProtocolError> {
        Ok(read_text(self.slice(name)?))
    }

    fn narrow<T: TryFrom<u64>>(&self, name: &'static str) -> Result<T, ProtocolError> {
        let value = self.uint(name)?;
        T::try_from(value).map_err(|_| {
            ProtocolError::InvalidMessage(format!(
                "{}.{name} value {value} is too wide",
                self.name
            ))
        })
    }
}

/// Reads a NUL-terminated string out of a fixed field.
pub fn read_text(raw: &[u8]) -> String {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    String::from_utf8_lossy(&raw[..end]).into_owned()
}

fn find_field(
    message: &'static str,
    fields: &'static [FieldSpec],
    name: &'static str,
) -> Result<&'static FieldSpec, ProtocolError> {
    fields
        .iter()
        .find(|f| f.name == name)
        .ok_or(ProtocolError::UnknownField { message, field: name })
}

// ---------------------------------------------------------------------------
// PacketWriter
// ---------------------------------------------------------------------------

/// Builds an outbound frame field by field.
///
/// Starts as a zero-filled buffer of `schema.min_len` bytes with the header
/// already written; tail fields grow it. [`finish`](Self::finish) fixes up
/// the size field.
#[derive(Debug)]
pub struct PacketWriter {
    schema: &'static MessageSchema,
    buf: Vec<u8>,
}

impl PacketWriter {
    pub fn new(schema: &'static MessageSchema) -> Self {
        let mut buf = vec![0u8; schema.min_len.max(schema.frame.header_len())];
        buf[0] = schema.frame.marker();
        let code_offset = schema.frame.code_offset();
        buf[code_offset] = schema.code;
        if let Some(subcode) = schema.subcode {
            if buf.len() <= code_offset + 1 {
                buf.resize(code_offset + 2, 0);
            }
            buf[code_offset + 1] = subcode;
        }
        Self { schema, buf }
    }

    /// Writes an integer field in the field's byte order.
    pub fn put_uint(
        &mut self,
        name: &'static str,
        value: u64,
    ) -> Result<&mut Self, ProtocolError> {
        let field = self.field(name)?;
        if field.is_tail() || field.width > 8 {
            return Err(ProtocolError::InvalidMessage(format!(
                "{}.{name} is not an integer field",
                self.schema.name
            )));
        }
        let be = value.to_be_bytes();
        let mut bytes = be[8 - field.width..].to_vec();
        if field.endian == Endian::Little {
            bytes.reverse();
        }
        self.write_at(field.offset, &bytes);
        Ok(self)
    }

    /// Copies `value` into a fixed field, zero-padding the rest. Tail fields
    /// take `value` as-is and extend the frame.
    pub fn put_bytes(
        &mut self,
        name: &'static str,
        value: &[u8],
    ) -> Result<&mut Self, ProtocolError> {
        let field = self.field(name)?;
        if field.is_tail() {
            self.buf.truncate(field.offset);
            self.write_at(field.offset, value);
            return Ok(self);
        }
        if value.len() > field.width {
            return Err(ProtocolError::FieldTooLong {
                field: name,
                max: field.width,
                actual: value.len(),
            });
        }
        let mut padded = value.to_vec();
        padded.resize(field.width, 0);
        self.write_at(field.offset, &padded);
        Ok(self)
    }

    /// Applies `f` to the bytes of an already-written fixed field.
    pub fn map_field(
        &mut self,
        name: &'static str,
        f: impl FnOnce(&mut [u8]),
    ) -> Result<&mut Self, ProtocolError> {
        let field = self.field(name)?;
        let end = if field.is_tail() {
            self.buf.len()
        } else {
            field.offset + field.width
        };
        if let Some(bytes) = self.buf.get_mut(field.offset..end) {
            f(bytes);
        }
        Ok(self)
    }

    /// Finalises the size field and returns the frame.
    pub fn finish(mut self) -> Result<Vec<u8>, ProtocolError> {
        write_size(&mut self.buf)
            .map_err(|e| ProtocolError::InvalidMessage(e.to_string()))?;
        Ok(self.buf)
    }

    fn field(&self, name: &'static str) -> Result<&'static FieldSpec, ProtocolError> {
        find_field(self.schema.name, self.schema.fields, name)
    }

    fn write_at(&mut self, offset: usize, bytes: &[u8]) {
        let end = offset + bytes.len();
        if self.buf.len() < end {
            self.buf.resize(end, 0);
        }
        self.buf[offset..end].copy_from_slice(bytes);
    }
}

// ---------------------------------------------------------------------------
// Message kinds
// ---------------------------------------------------------------------------

/// Every message the client knows, in either direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    // connect server, inbound
    Hello,
    ServerListResponse,
    ConnectionInfo,
    // connect server, outbound
    ServerListRequest,
    ConnectionInfoRequest,
    // game server session, inbound
    GameServerEntered,
    LoginResponse,
    CharacterList,
    CharacterInformation,
    RespawnAfterDeath,
    MapChanged,
    CurrentHealthShield,
    MaximumHealthShield,
    CurrentManaAbility,
    MaximumManaAbility,
    // game server session, outbound
    Login,
    CharacterListRequest,
    SelectCharacter,
    ReadyAfterMapChange,
    // game server world, inbound
    AddPlayersToScope,
    AddNpcsToScope,
    ObjectsOutOfScope,
    ObjectMoved,
    ObjectWalked,
    ObjectHit,
    ObjectGotKilled,
    ObjectAnimation,
    SkillAnimation,
    ChatMessage,
    WhisperMessage,
    // game server world, outbound
    WalkRequest,
    PublicChat,
}

impl MessageKind {
    /// Messages a connect server sends.
    pub const CONNECT_SERVER_INBOUND: &'static [MessageKind] = &[
        MessageKind::Hello,
        MessageKind::ServerListResponse,
        MessageKind::ConnectionInfo,
    ];

    /// Messages a game server sends.
    pub const GAME_SERVER_INBOUND: &'static [MessageKind] = &[
        MessageKind::GameServerEntered,
        MessageKind::LoginResponse,
        MessageKind::CharacterList,
        MessageKind::CharacterInformation,
        MessageKind::RespawnAfterDeath,
        MessageKind::MapChanged,
        MessageKind::CurrentHealthShield,
        MessageKind::MaximumHealthShield,
        MessageKind::CurrentManaAbility,
        MessageKind::MaximumManaAbility,
        MessageKind::AddPlayersToScope,
        MessageKind::AddNpcsToScope,
        MessageKind::ObjectsOutOfScope,
        MessageKind::ObjectMoved,
        MessageKind::ObjectWalked,
        MessageKind::ObjectHit,
        MessageKind::ObjectGotKilled,
        MessageKind::ObjectAnimation,
        MessageKind::SkillAnimation,
        MessageKind::ChatMessage,
        MessageKind::WhisperMessage,
    ];
}

/// Records that repeat inside list messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    ServerEntry,
    ScopePlayer,
    ScopeNpc,
}

// ---------------------------------------------------------------------------
// The table
// ---------------------------------------------------------------------------

use FieldSpec as F;
use FrameKind::{C1, C2, C3};

const fn msg(
    name: &'static str,
    frame: FrameKind,
    code: u8,
    subcode: Option<u8>,
    min_len: usize,
    fields: &'static [FieldSpec],
) -> MessageSchema {
    MessageSchema { name, frame, code, subcode, min_len, fields }
}

// Connect server.
static HELLO: MessageSchema = msg("Hello", C1, 0x00, Some(0x01), 4, &[]);
static SERVER_LIST_REQUEST: MessageSchema =
    msg("ServerListRequest", C1, 0xF4, Some(0x06), 4, &[]);
static SERVER_LIST_RESPONSE: MessageSchema = msg(
    "ServerListResponse", C2, 0xF4, Some(0x06), 7,
    &[F::be16("count", 5), F::tail("entries", 7)],
);
static CONNECTION_INFO_REQUEST: MessageSchema = msg(
    "ConnectionInfoRequest", C1, 0xF4, Some(0x03), 6,
    &[F::le16("server_id", 4)],
);
static CONNECTION_INFO: MessageSchema = msg(
    "ConnectionInfo", C1, 0xF4, Some(0x03), 22,
    &[F::bytes("host", 4, 16), F::le16("port", 20)],
);

// Game server, session.
static GAME_SERVER_ENTERED: MessageSchema = msg(
    "GameServerEntered", C1, 0xF1, Some(0x00), 12,
    &[F::u8("success", 4), F::be16("player_id", 5), F::bytes("version", 7, 5)],
);
static LOGIN_S6: MessageSchema = msg(
    "Login", C3, 0xF1, Some(0x01), 60,
    &[
        F::bytes("username", 4, 10),
        F::bytes("password", 14, 20),
        F::be32("tick_count", 34),
        F::bytes("client_version", 38, 5),
        F::bytes("client_serial", 43, 16),
    ],
);
static LOGIN_LEGACY: MessageSchema = msg(
    "Login", C3, 0xF1, Some(0x01), 49,
    &[
        F::bytes("username", 4, 10),
        F::bytes("password", 14, 10),
        F::be32("tick_count", 24),
        F::bytes("client_version", 28, 5),
        F::bytes("client_serial", 33, 16),
    ],
);
static LOGIN_RESPONSE: MessageSchema =
    msg("LoginResponse", C1, 0xF1, Some(0x01), 5, &[F::u8("result", 4)]);
static CHARACTER_LIST_REQUEST: MessageSchema =
    msg("CharacterListRequest", C1, 0xF3, Some(0x00), 4, &[]);
static CHARACTER_LIST_S6: MessageSchema = msg(
    "CharacterList", C1, 0xF3, Some(0x00), 8,
    &[F::u8("count", 6), F::tail("records", 8)],
);
static CHARACTER_LIST_LEGACY: MessageSchema = msg(
    "CharacterList", C1, 0xF3, Some(0x00), 6,
    &[F::u8("count", 5), F::tail("records", 6)],
);
static SELECT_CHARACTER: MessageSchema = msg(
    "SelectCharacter", C1, 0xF3, Some(0x03), 14,
    &[F::bytes("name", 4, 10)],
);
static READY_AFTER_MAP_CHANGE: MessageSchema =
    msg("ReadyAfterMapChange", C1, 0xF3, Some(0x12), 4, &[]);

static CHARACTER_INFORMATION_S6: MessageSchema = msg(
    "CharacterInformation", C3, 0xF3, Some(0x03), 72,
    &[
        F::u8("x", 4),
        F::u8("y", 5),
        F::le16("map", 6),
        F::be64("experience", 8),
        F::be64("next_experience", 16),
        F::le16("health", 34),
        F::le16("max_health", 36),
        F::le16("mana", 38),
        F::le16("max_mana", 40),
        F::le16("shield", 42),
        F::le16("max_shield", 44),
        F::le16("ability", 46),
        F::le16("max_ability", 48),
        F::le32("money", 52),
    ],
);
const CHARACTER_INFORMATION_LEGACY_FIELDS: &[FieldSpec] = &[
    F::u8("x", 4),
    F::u8("y", 5),
    F::u8("map", 6),
    F::u8("direction", 7),
    F::be32("experience", 8),
    F::be32("next_experience", 12),
    F::le16("health", 26),
    F::le16("max_health", 28),
    F::le16("mana", 30),
    F::le16("max_mana", 32),
    F::le16("ability", 34),
    F::le16("max_ability", 36),
    F::le32("money", 40),
];
static CHARACTER_INFORMATION_V097: MessageSchema = msg(
    "CharacterInformation", C3, 0xF3, Some(0x03), 52,
    CHARACTER_INFORMATION_LEGACY_FIELDS,
);
static CHARACTER_INFORMATION_V075: MessageSchema = msg(
    "CharacterInformation", C3, 0xF3, Some(0x03), 46,
    CHARACTER_INFORMATION_LEGACY_FIELDS,
);

static RESPAWN_S6: MessageSchema = msg(
    "RespawnAfterDeath", C3, 0xF3, Some(0x04), 28,
    &[
        F::u8("x", 4),
        F::u8("y", 5),
        F::u8("map", 6),
        F::u8("direction", 7),
        F::le16("health", 8),
        F::le16("mana", 10),
        F::le16("shield", 12),
        F::le16("ability", 14),
        F::be64("experience", 16),
        F::le32("money", 24),
    ],
);
static RESPAWN_LEGACY: MessageSchema = msg(
    "RespawnAfterDeath", C3, 0xF3, Some(0x04), 22,
    &[
        F::u8("x", 4),
        F::u8("y", 5),
        F::u8("map", 6),
        F::u8("direction", 7),
        F::le16("health", 8),
        F::le16("mana", 10),
        F::le16("ability", 12),
        F::be32("experience", 14),
        F::le32("money", 18),
    ],
);

static MAP_CHANGED_S6: MessageSchema = msg(
    "MapChanged", C3, 0x1C, Some(0x0F), 10,
    &[
        F::u8("is_map_change", 4),
        F::le16("map", 5),
        F::u8("x", 7),
        F::u8("y", 8),
        F::u8("rotation", 9),
    ],
);
static MAP_CHANGED_LEGACY: MessageSchema = msg(
    "MapChanged", C3, 0x1C, Some(0x0F), 9,
    &[
        F::u8("is_map_change", 4),
        F::u8("map", 5),
        F::u8("x", 6),
        F::u8("y", 7),
        F::u8("rotation", 8),
    ],
);

const HEALTH_SHIELD_FIELDS: &[FieldSpec] =
    &[F::be16("health", 4), F::be16("shield", 6)];
const HEALTH_ONLY_FIELDS: &[FieldSpec] = &[F::be16("health", 4)];
const MANA_ABILITY_FIELDS: &[FieldSpec] =
    &[F::be16("mana", 4), F::be16("ability", 6)];

static CURRENT_HEALTH_SHIELD_S6: MessageSchema = msg(
    "CurrentHealthShield", C1, 0x26, Some(0xFF), 8, HEALTH_SHIELD_FIELDS,
);
static CURRENT_HEALTH_LEGACY: MessageSchema = msg(
    "CurrentHealthShield", C1, 0x26, Some(0xFF), 6, HEALTH_ONLY_FIELDS,
);
static MAXIMUM_HEALTH_SHIELD_S6: MessageSchema = msg(
    "MaximumHealthShield", C1, 0x26, Some(0xFE), 8, HEALTH_SHIELD_FIELDS,
);
static MAXIMUM_HEALTH_LEGACY: MessageSchema = msg(
    "MaximumHealthShield", C1, 0x26, Some(0xFE), 6, HEALTH_ONLY_FIELDS,
);
static CURRENT_MANA_ABILITY: MessageSchema = msg(
    "CurrentManaAbility", C1, 0x27, Some(0xFF), 8, MANA_ABILITY_FIELDS,
);
static MAXIMUM_MANA_ABILITY: MessageSchema = msg(
    "MaximumManaAbility", C1, 0x27, Some(0xFE), 8, MANA_ABILITY_FIELDS,
);

// Game server, world.
const COUNTED_RECORDS: &[FieldSpec] = &[F::u8("count", 4), F::tail("records", 5)];

static ADD_PLAYERS_TO_SCOPE: MessageSchema =
    msg("AddPlayersToScope", C2, 0x12, None, 5, COUNTED_RECORDS);
static ADD_NPCS_TO_SCOPE: MessageSchema =
    msg("AddNpcsToScope", C2, 0x13, None, 5, COUNTED_RECORDS);
static OBJECTS_OUT_OF_SCOPE: MessageSchema = msg(
    "ObjectsOutOfScope", C1, 0x14, None, 4,
    &[F::u8("count", 3), F::tail("ids", 4)],
);
static OBJECT_MOVED: MessageSchema = msg(
    "ObjectMoved", C1, 0x15, None, 7,
    &[F::be16("id", 3), F::u8("x", 5), F::u8("y", 6)],
);

const OBJECT_WALKED_FIELDS: &[FieldSpec] = &[
    F::be16("id", 3),
    F::u8("target_x", 5),
    F::u8("target_y", 6),
    F::u8("rotation_steps", 7),
    F::tail("steps", 8),
];
static OBJECT_WALKED_S6: MessageSchema =
    msg("ObjectWalked", C1, 0xD4, None, 8, OBJECT_WALKED_FIELDS);
static OBJECT_WALKED_V097: MessageSchema =
    msg("ObjectWalked", C1, 0xD3, None, 8, OBJECT_WALKED_FIELDS);
static OBJECT_WALKED_V075: MessageSchema =
    msg("ObjectWalked", C1, 0x10, None, 8, OBJECT_WALKED_FIELDS);

const WALK_REQUEST_FIELDS: &[FieldSpec] = &[
    F::u8("x", 3),
    F::u8("y", 4),
    F::u8("rotation_steps", 5),
    F::tail("directions", 6),
];
static WALK_REQUEST_S6: MessageSchema =
    msg("WalkRequest", C1, 0xD4, None, 6, WALK_REQUEST_FIELDS);
static WALK_REQUEST_V097: MessageSchema =
    msg("WalkRequest", C1, 0xD3, None, 6, WALK_REQUEST_FIELDS);
static WALK_REQUEST_V075: MessageSchema =
    msg("WalkRequest", C1, 0x10, None, 6, WALK_REQUEST_FIELDS);

static OBJECT_HIT_S6: MessageSchema = msg(
    "ObjectHit", C1, 0x11, None, 10,
    &[
        F::be16("id", 3),
        F::be16("health_damage", 5),
        F::u8("kind", 7),
        F::be16("shield_damage", 8),
    ],
);
static OBJECT_HIT_LEGACY: MessageSchema = msg(
    "ObjectHit", C1, 0x11, None, 8,
    &[F::be16("id", 3), F::be16("health_damage", 5), F::u8("kind", 7)],
);
static OBJECT_GOT_KILLED: MessageSchema = msg(
    "ObjectGotKilled", C1, 0x16, None, 9,
    &[F::be16("killed", 3), F::be16("skill", 5), F::be16("killer", 7)],
);
static OBJECT_ANIMATION: MessageSchema = msg(
    "ObjectAnimation", C1, 0x18, None, 9,
    &[
        F::be16("id", 3),
        F::u8("direction", 5),
        F::u8("animation", 6),
        F::be16("target", 7),
    ],
);
static SKILL_ANIMATION: MessageSchema = msg(
    "SkillAnimation", C1, 0x19, None, 9,
    &[F::be16("skill", 3), F::be16("caster", 5), F::be16("target", 7)],
);
static SKILL_ANIMATION_V075: MessageSchema = msg(
    "SkillAnimation", C1, 0x19, None, 8,
    &[F::u8("skill", 3), F::be16("caster", 4), F::be16("target", 6)],
);

const CHAT_FIELDS: &[FieldSpec] = &[F::bytes("sender", 3, 10), F::tail("text", 13)];
static CHAT_MESSAGE: MessageSchema = msg("ChatMessage", C1, 0x00, None, 13, CHAT_FIELDS);
static WHISPER_MESSAGE: MessageSchema =
    msg("WhisperMessage", C1, 0x02, None, 13, CHAT_FIELDS);
static PUBLIC_CHAT: MessageSchema = msg("PublicChat", C1, 0x00, None, 13, CHAT_FIELDS);

// Records.
static SERVER_ENTRY: RecordSchema = RecordSchema {
    name: "ServerEntry",
    len: 4,
    fields: &[F::le16("server_id", 0), F::u8("load", 2)],
};
static SCOPE_PLAYER_S6: RecordSchema = RecordSchema {
    name: "ScopePlayer",
    len: 43,
    fields: &[
        F::be16("id", 0),
        F::u8("x", 2),
        F::u8("y", 3),
        F::bytes("appearance", 4, 25),
        F::bytes("name", 29, 10),
        F::u8("target_x", 39),
        F::u8("target_y", 40),
        F::u8("rotation", 41),
        F::u8("effect_count", 42),
    ],
};
static SCOPE_PLAYER_V097: RecordSchema = RecordSchema {
    name: "ScopePlayer",
    len: 36,
    fields: &[
        F::be16("id", 0),
        F::u8("x", 2),
        F::u8("y", 3),
        F::bytes("appearance", 4, 18),
        F::bytes("name", 22, 10),
        F::u8("target_x", 32),
        F::u8("target_y", 33),
        F::u8("rotation", 34),
        F::u8("effect_count", 35),
    ],
};
static SCOPE_PLAYER_V075: RecordSchema = RecordSchema {
    name: "ScopePlayer",
    len: 35,
    fields: &[
        F::be16("id", 0),
        F::u8("x", 2),
        F::u8("y", 3),
        F::bytes("appearance", 4, 18),
        F::bytes("name", 22, 10),
        F::u8("target_x", 32),
        F::u8("target_y", 33),
        F::u8("rotation", 34),
    ],
};
static SCOPE_NPC: RecordSchema = RecordSchema {
    name: "ScopeNpc",
    len: 10,
    fields: &[
        F::be16("id", 0),
        F::be16("npc_type", 2),
        F::u8("x", 4),
        F::u8("y", 5),
        F::u8("target_x", 6),
        F::u8("target_y", 7),
        F::u8("rotation", 8),
        F::u8("effect_count", 9),
    ],
};
static SCOPE_NPC_V075: RecordSchema = RecordSchema {
    name: "ScopeNpc",
    len: 8,
    fields: &[
        F::be16("id", 0),
        F::u8("npc_type", 2),
        F::u8("x", 3),
        F::u8("y", 4),
        F::u8("target_x", 5),
        F::u8("target_y", 6),
        F::u8("rotation", 7),
    ],
};

/// Returns the layout of `kind` in `dialect`.
pub fn lookup(kind: MessageKind, dialect: Dialect) -> &'static MessageSchema {
    use Dialect::*;
    use MessageKind::*;

    match (kind, dialect) {
        (Hello, _) => &HELLO,
        (ServerListRequest, _) => &SERVER_LIST_REQUEST,
        (ServerListResponse, _) => &SERVER_LIST_RESPONSE,
        (ConnectionInfoRequest, _) => &CONNECTION_INFO_REQUEST,
        (ConnectionInfo, _) => &CONNECTION_INFO,

        (GameServerEntered, _) => &GAME_SERVER_ENTERED,
        (Login, Season6) => &LOGIN_S6,
        (Login, V097 | V075) => &LOGIN_LEGACY,
        (LoginResponse, _) => &LOGIN_RESPONSE,
        (CharacterListRequest, _) => &CHARACTER_LIST_REQUEST,
        (CharacterList, Season6) => &CHARACTER_LIST_S6,
        (CharacterList, V097 | V075) => &CHARACTER_LIST_LEGACY,
        (SelectCharacter, _) => &SELECT_CHARACTER,
        (ReadyAfterMapChange, _) => &READY_AFTER_MAP_CHANGE,
        (CharacterInformation, Season6) => &CHARACTER_INFORMATION_S6,
        (CharacterInformation, V097) => &CHARACTER_INFORMATION_V097,
        (CharacterInformation, V075) => &CHARACTER_INFORMATION_V075,
        (RespawnAfterDeath, Season6) => &RESPAWN_S6,
        (RespawnAfterDeath, V097 | V075) => &RESPAWN_LEGACY,
        (MapChanged, Season6) => &MAP_CHANGED_S6,
        (MapChanged, V097 | V075) => &MAP_CHANGED_LEGACY,
        (CurrentHealthShield, Season6) => &CURRENT_HEALTH_SHIELD_S6,
        (CurrentHealthShield, V097 | V075) => &CURRENT_HEALTH_LEGACY,
        (MaximumHealthShield, Season6) => &MAXIMUM_HEALTH_SHIELD_S6,
        (MaximumHealthShield, V097 | V075) => &MAXIMUM_HEALTH_LEGACY,
        (CurrentManaAbility, _) => &CURRENT_MANA_ABILITY,
        (MaximumManaAbility, _) => &MAXIMUM_MANA_ABILITY,

        (AddPlayersToScope, _) => &ADD_PLAYERS_TO_SCOPE,
        (AddNpcsToScope, _) => &ADD_NPCS_TO_SCOPE,
        (ObjectsOutOfScope, _) => &OBJECTS_OUT_OF_SCOPE,
        (ObjectMoved, _) => &OBJECT_MOVED,
        (ObjectWalked, Season6) => &OBJECT_WALKED_S6,
        (ObjectWalked, V097) => &OBJECT_WALKED_V097,
        (ObjectWalked, V075) => &OBJECT_WALKED_V075,
        (WalkRequest, Season6) => &WALK_REQUEST_S6,
        (WalkRequest, V097) => &WALK_REQUEST_V097,
        (WalkRequest, V075) => &WALK_REQUEST_V075,
        (ObjectHit, Season6) => &OBJECT_HIT_S6,
        (ObjectHit, V097 | V075) => &OBJECT_HIT_LEGACY,
        (ObjectGotKilled, _) => &OBJECT_GOT_KILLED,
        (ObjectAnimation, _) => &OBJECT_ANIMATION,
        (SkillAnimation, Season6 | V097) => &SKILL_ANIMATION,
        (SkillAnimation, V075) => &SKILL_ANIMATION_V075,
        (ChatMessage, _) => &CHAT_MESSAGE,
        (WhisperMessage, _) => &WHISPER_MESSAGE,
        (PublicChat, _) => &PUBLIC_CHAT,
    }
}

/// Returns the layout of a repeated record in `dialect`.
pub fn record(kind: RecordKind, dialect: Dialect) -> &'static RecordSchema {
    match (kind, dialect) {
        (RecordKind::ServerEntry, _) => &SERVER_ENTRY,
        (RecordKind::ScopePlayer, Dialect::Season6) => &SCOPE_PLAYER_S6,
        (RecordKind::ScopePlayer, Dialect::V097) => &SCOPE_PLAYER_V097,
        (RecordKind::ScopePlayer, Dialect::V075) => &SCOPE_PLAYER_V075,
        (RecordKind::ScopeNpc, Dialect::Season6 | Dialect::V097) => &SCOPE_NPC,
        (RecordKind::ScopeNpc, Dialect::V075) => &SCOPE_NPC_V075,
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    // =====================================================================
    // PacketView
    // =====================================================================

    #[test]
    fn test_view_short_frame_rejected() {
        let schema = lookup(MessageKind::ObjectMoved, Dialect::Season6);
        let result = PacketView::message(&[0xC1, 0x06, 0x15, 0x00, 0x01, 0x10], schema);
        assert!(matches!(result, Err(ProtocolError::ShortBuffer { needed: 7, .. })));
    }

    #[test]
    fn test_view_reads_big_and_little_endian() {
        let schema = lookup(MessageKind::ConnectionInfoRequest, Dialect::Season6);
        let frame = [0xC1, 0x06, 0xF4, 0x03, 0x34, 0x12];
        let view = PacketView::message(&frame, schema).unwrap();
        assert_eq!(view.u16("server_id").unwrap(), 0x1234);

        let schema = lookup(MessageKind::ObjectMoved, Dialect::Season6);
        let frame = [0xC1, 0x07, 0x15, 0x12, 0x34, 0x10, 0x20];
        let view = PacketView::message(&frame, schema).unwrap();
        assert_eq!(view.u16("id").unwrap(), 0x1234);
        assert_eq!(view.u8("y").unwrap(), 0x20);
    }

    #[test]
    fn test_view_unknown_field_reported() {
        let schema = lookup(MessageKind::Hello, Dialect::Season6);
        let view = PacketView::message(&[0xC1, 0x04, 0x00, 0x01], schema).unwrap();
        assert_eq!(
            view.u8("nope"),
            Err(ProtocolError::UnknownField { message: "Hello", field: "nope" })
        );
    }

    #[test]
    fn test_view_text_stops_at_nul() {
        let schema = lookup(MessageKind::ChatMessage, Dialect::Season6);
        let mut frame = vec![0xC1, 0x00, 0x00];
        frame.extend_from_slice(b"hero\0\0\0\0\0\0");
        frame.extend_from_slice(b"hi there\0junk");
        let view = PacketView::message(&frame, schema).unwrap();
        assert_eq!(view.text("sender").unwrap(), "hero");
        assert_eq!(view.text("text").unwrap(), "hi there");
    }

    #[test]
    fn test_view_optional_field_absent_in_dialect() {
        let schema = lookup(MessageKind::CharacterInformation, Dialect::Season6);
        let frame = vec![0u8; 72];
        let view = PacketView::message(&frame, schema).unwrap();
        assert!(!view.has("direction"));
        assert!(view.has("shield"));
    }

    // =====================================================================
    // PacketWriter
    // =====================================================================

    #[test]
    fn test_writer_fills_header_and_size() {
        let schema = lookup(MessageKind::ConnectionInfoRequest, Dialect::Season6);
        let mut writer = PacketWriter::new(schema);
        writer.put_uint("server_id", 0x0102).unwrap();
        assert_eq!(
            writer.finish().unwrap(),
            vec![0xC1, 0x06, 0xF4, 0x03, 0x02, 0x01]
        );
    }

    #[test]
    fn test_writer_fixed_field_too_long() {
        let schema = lookup(MessageKind::SelectCharacter, Dialect::Season6);
        let mut writer = PacketWriter::new(schema);
        assert_eq!(
            writer.put_bytes("name", b"ElevenChars").unwrap_err(),
            ProtocolError::FieldTooLong { field: "name", max: 10, actual: 11 }
        );
    }

    #[test]
    fn test_writer_tail_extends_frame() {
        let schema = lookup(MessageKind::WalkRequest, Dialect::V097);
        let mut writer = PacketWriter::new(schema);
        writer.put_bytes("directions", &[0x12, 0x3F]).unwrap();
        let frame = writer.finish().unwrap();
        assert_eq!(frame.len(), 8);
        assert_eq!(frame[1], 8);
        assert_eq!(frame[2], 0xD3);
    }

    // =====================================================================
    // Table
    // =====================================================================

    #[test]
    fn test_lookup_inbound_keys_unique_per_leg() {
        for dialect in Dialect::ALL {
            for set in [MessageKind::CONNECT_SERVER_INBOUND, MessageKind::GAME_SERVER_INBOUND] {
                let mut keys: Vec<_> =
                    set.iter().map(|k| lookup(*k, dialect).key()).collect();
                keys.sort();
                let before = keys.len();
                keys.dedup();
                assert_eq!(keys.len(), before, "{dialect}: duplicate dispatch key");
            }
        }
    }

    #[test]
    fn test_lookup_fields_fit_min_len() {
        let all = MessageKind::CONNECT_SERVER_INBOUND
            .iter()
            .chain(MessageKind::GAME_SERVER_INBOUND);
        for dialect in Dialect::ALL {
            for kind in all.clone() {
                let schema = lookup(*kind, dialect);
                for field in schema.fields {
                    assert!(
                        field.offset + field.width <= schema.min_len,
                        "{}.{} overruns min_len in {dialect}",
                        schema.name,
                        field.name
                    );
                }
            }
        }
    }
}
