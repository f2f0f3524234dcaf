//! Outbound packet builders.
//!
//! Each builder fills the dialect's [`MessageSchema`](crate::schema::MessageSchema)
//! through a [`PacketWriter`] and returns the finished frame, ready for the
//! transport's encrypt stage.

use crate::schema::{MessageKind, PacketWriter, lookup};
use crate::{Dialect, ProtocolError};

/// Key of the rotating xor applied to the login credentials.
pub const XOR3_KEY: [u8; 3] = [0xFC, 0xCF, 0xAB];

/// Longest walk a single request can describe; the step count is a nibble.
pub const MAX_WALK_STEPS: usize = 15;

/// Obfuscates (or restores) a credential field in place.
pub fn xor3(field: &mut [u8]) {
    for (i, byte) in field.iter_mut().enumerate() {
        *byte ^= XOR3_KEY[i % XOR3_KEY.len()];
    }
}

fn fixed(kind: MessageKind, dialect: Dialect) -> Result<Vec<u8>, ProtocolError> {
    PacketWriter::new(lookup(kind, dialect)).finish()
}

// ---------------------------------------------------------------------------
// Connect server
// ---------------------------------------------------------------------------

pub fn server_list_request() -> Result<Vec<u8>, ProtocolError> {
    fixed(MessageKind::ServerListRequest, Dialect::default())
}

pub fn connection_info_request(server_id: u16) -> Result<Vec<u8>, ProtocolError> {
    let mut writer =
        PacketWriter::new(lookup(MessageKind::ConnectionInfoRequest, Dialect::default()));
    writer.put_uint("server_id", u64::from(server_id))?;
    writer.finish()
}

// ---------------------------------------------------------------------------
// Game server, session
// ---------------------------------------------------------------------------

/// What the login request carries besides the credentials.
#[derive(Debug, Clone, Copy)]
pub struct LoginParams<'a> {
    pub username: &'a str,
    pub password: &'a str,
    /// Client uptime in milliseconds; servers only log it.
    pub tick_count: u32,
    pub client_version: &'a [u8],
    pub client_serial: &'a [u8],
}

/// Builds the login request. Both credential fields are xor3-obfuscated,
/// each starting at key index 0.
pub fn login(dialect: Dialect, params: &LoginParams<'_>) -> Result<Vec<u8>, ProtocolError> {
    let mut writer = PacketWriter::new(lookup(MessageKind::Login, dialect));
    writer
        .put_bytes("username", params.username.as_bytes())?
        .map_field("username", xor3)?
        .put_bytes("password", params.password.as_bytes())?
        .map_field("password", xor3)?
        .put_uint("tick_count", u64::from(params.tick_count))?
        .put_bytes("client_version", params.client_version)?
        .put_bytes("client_serial", params.client_serial)?;
    writer.finish()
}

pub fn character_list_request(dialect: Dialect) -> Result<Vec<u8>, ProtocolError> {
    fixed(MessageKind::CharacterListRequest, dialect)
}

pub fn select_character(dialect: Dialect, name: &str) -> Result<Vec<u8>, ProtocolError> {
    let mut writer = PacketWriter::new(lookup(MessageKind::SelectCharacter, dialect));
    writer.put_bytes("name", name.as_bytes())?;
    writer.finish()
}

pub fn ready_after_map_change(dialect: Dialect) -> Result<Vec<u8>, ProtocolError> {
    fixed(MessageKind::ReadyAfterMapChange, dialect)
}

// ---------------------------------------------------------------------------
// Game server, world
// ---------------------------------------------------------------------------

/// A walk path in wire form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkPath {
    pub step_count: u8,
    /// Two directions per byte, high nibble first; an odd final step is
    /// padded with `0xF`.
    pub directions: Vec<u8>,
    /// The last direction of the path.
    pub target_rotation: u8,
}

/// Packs a list of 4-bit directions.
pub fn pack_walk_path(path: &[u8]) -> Result<WalkPath, ProtocolError> {
    let Some(&last) = path.last() else {
        return Err(ProtocolError::InvalidPath("path is empty".into()));
    };
    if path.len() > MAX_WALK_STEPS {
        return Err(ProtocolError::InvalidPath(format!(
            "{} steps, at most {MAX_WALK_STEPS} fit one request",
            path.len()
        )));
    }

    let directions = path
        .chunks(2)
        .map(|pair| {
            let high = pair[0] & 0x0F;
            let low = pair.get(1).map_or(0x0F, |d| d & 0x0F);
            (high << 4) | low
        })
        .collect();

    Ok(WalkPath {
        step_count: path.len() as u8,
        directions,
        target_rotation: last & 0x0F,
    })
}

/// Builds a walk request starting at `(start_x, start_y)`.
pub fn walk_request(
    dialect: Dialect,
    start_x: u8,
    start_y: u8,
    path: &[u8],
) -> Result<Vec<u8>, ProtocolError> {
    let packed = pack_walk_path(path)?;
    let mut writer = PacketWriter::new(lookup(MessageKind::WalkRequest, dialect));
    writer
        .put_uint("x", u64::from(start_x))?
        .put_uint("y", u64::from(start_y))?
        .put_uint(
            "rotation_steps",
            u64::from((packed.target_rotation << 4) | packed.step_count),
        )?
        .put_bytes("directions", &packed.directions)?;
    writer.finish()
}

/// Longest chat line that still fits a `C1` frame with its terminator.
pub const MAX_CHAT_LEN: usize = u8::MAX as usize - 13 - 1;

/// Builds a public chat message from `sender`.
pub fn public_chat(
    dialect: Dialect,
    sender: &str,
    text: &str,
) -> Result<Vec<u8>, ProtocolError> {
    if text.len() > MAX_CHAT_LEN {
        return Err(ProtocolError::FieldTooLong {
            field: "text",
            max: MAX_CHAT_LEN,
            actual: text.len(),
        });
    }
    let mut body = text.as_bytes().to_vec();
    body.push(0);

    let mut writer = PacketWriter::new(lookup(MessageKind::PublicChat, dialect));
    writer
        .put_bytes("sender", sender.as_bytes())?
        .put_bytes("text", &body)?;
    writer.finish()
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    // =====================================================================
    // Walk
    // =====================================================================

    #[test]
    fn test_pack_walk_path_odd_steps_pad_last_nibble() {
        let packed = pack_walk_path(&[1, 3, 5]).unwrap();
        assert_eq!(packed.step_count, 3);
        assert_eq!(packed.directions, vec![(1 << 4) | 3, (5 << 4) | 0x0F]);
        assert_eq!(packed.target_rotation, 5);
    }

    #[test]
    fn test_pack_walk_path_even_steps() {
        let packed = pack_walk_path(&[2, 4]).unwrap();
        assert_eq!(packed.step_count, 2);
        assert_eq!(packed.directions, vec![(2 << 4) | 4]);
        assert_eq!(packed.target_rotation, 4);
    }

    #[test]
    fn test_pack_walk_path_masks_to_nibbles() {
        let packed = pack_walk_path(&[0x17]).unwrap();
        assert_eq!(packed.directions, vec![0x7F]);
        assert_eq!(packed.target_rotation, 7);
    }

    #[test]
    fn test_pack_walk_path_empty_or_long_rejected() {
        assert!(matches!(pack_walk_path(&[]), Err(ProtocolError::InvalidPath(_))));
        assert!(matches!(
            pack_walk_path(&[0; MAX_WALK_STEPS + 1]),
            Err(ProtocolError::InvalidPath(_))
        ));
    }

    #[test]
    fn test_walk_request_layout_per_dialect() {
        let frame = walk_request(Dialect::Season6, 130, 120, &[1, 3, 5]).unwrap();
        assert_eq!(frame, vec![0xC1, 0x08, 0xD4, 130, 120, 0x53, 0x13, 0x5F]);

        let frame = walk_request(Dialect::V075, 10, 20, &[2, 4]).unwrap();
        assert_eq!(frame, vec![0xC1, 0x07, 0x10, 10, 20, 0x42, 0x24]);
    }

    // =====================================================================
    // Login
    // =====================================================================

    fn params<'a>() -> LoginParams<'a> {
        LoginParams {
            username: "user",
            password: "pass",
            tick_count: 0x01020304,
            client_version: b"10404",
            client_serial: b"k1Pk2jcET48mxL3b",
        }
    }

    #[test]
    fn test_login_season6_layout() {
        let frame = login(Dialect::Season6, &params()).unwrap();
        assert_eq!(frame.len(), 60);
        assert_eq!(&frame[..4], &[0xC3, 60, 0xF1, 0x01]);
        assert_eq!(&frame[4..8], &[b'u' ^ 0xFC, b's' ^ 0xCF, b'e' ^ 0xAB, b'r' ^ 0xFC]);
        // Padding is obfuscated too.
        assert_eq!(frame[8], 0xCF);
        // The password key restarts at index 0.
        assert_eq!(frame[14], b'p' ^ 0xFC);
        assert_eq!(&frame[34..38], &[1, 2, 3, 4]);
        assert_eq!(&frame[38..43], b"10404");
        assert_eq!(&frame[43..59], b"k1Pk2jcET48mxL3b");
    }

    #[test]
    fn test_login_legacy_layout() {
        let frame = login(Dialect::V097, &params()).unwrap();
        assert_eq!(frame.len(), 49);
        assert_eq!(frame[14], b'p' ^ 0xFC);
        assert_eq!(&frame[24..28], &[1, 2, 3, 4]);
        assert_eq!(&frame[28..33], b"10404");
        assert_eq!(&frame[33..49], b"k1Pk2jcET48mxL3b");
    }

    #[test]
    fn test_login_long_password_rejected() {
        let mut p = params();
        p.password = "this-password-is-too-long";
        assert!(matches!(
            login(Dialect::V075, &p),
            Err(ProtocolError::FieldTooLong { field: "password", max: 10, .. })
        ));
        // Season 6 allows 20.
        p.password = "twenty-chars-exactly";
        assert!(login(Dialect::Season6, &p).is_ok());
    }

    #[test]
    fn test_xor3_is_its_own_inverse() {
        let mut field = *b"secret";
        xor3(&mut field);
        assert_ne!(&field, b"secret");
        xor3(&mut field);
        assert_eq!(&field, b"secret");
    }

    // =====================================================================
    // Fixed messages
    // =====================================================================

    #[test]
    fn test_fixed_requests() {
        assert_eq!(server_list_request().unwrap(), vec![0xC1, 0x04, 0xF4, 0x06]);
        assert_eq!(
            connection_info_request(3).unwrap(),
            vec![0xC1, 0x06, 0xF4, 0x03, 0x03, 0x00]
        );
        assert_eq!(
            character_list_request(Dialect::Season6).unwrap(),
            vec![0xC1, 0x04, 0xF3, 0x00]
        );
        assert_eq!(
            ready_after_map_change(Dialect::V097).unwrap(),
            vec![0xC1, 0x04, 0xF3, 0x12]
        );
    }

    #[test]
    fn test_select_character_pads_name() {
        let frame = select_character(Dialect::Season6, "Hero").unwrap();
        assert_eq!(frame.len(), 14);
        assert_eq!(&frame[..4], &[0xC1, 0x0E, 0xF3, 0x03]);
        assert_eq!(&frame[4..14], b"Hero\0\0\0\0\0\0");
    }

    #[test]
    fn test_public_chat_nul_terminated() {
        let frame = public_chat(Dialect::Season6, "Hero", "hi").unwrap();
        assert_eq!(frame.len(), 16);
        assert_eq!(frame[1], 16);
        assert_eq!(frame[2], 0x00);
        assert_eq!(&frame[13..], b"hi\0");
    }
}
