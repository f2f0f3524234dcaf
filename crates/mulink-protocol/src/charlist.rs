//! Character list decoding.
//!
//! The character list is the one message whose record size is detected from
//! the frame instead of taken from the configured dialect, because servers of
//! the same generation disagree on it. Three record sizes are known:
//!
//! | Size | Name        | Appearance          | Class marker       |
//! |------|-------------|---------------------|--------------------|
//! | 44   | extended    | extended, 25 @ 19   | byte 15            |
//! | 42   | legacy-long | legacy, 27 @ 15     | appearance byte 0  |
//! | 34   | standard    | legacy, 18 @ 15     | appearance byte 0  |
//!
//! # Choosing the size
//!
//! With `remaining` = bytes after the record offset:
//!
//! 1. `count > 0` and `remaining == count * L` for one size: use it.
//! 2. Sizes dividing `remaining` evenly: a single one wins; 44 wins among
//!    several; a tie between 42 and 34 goes to the guild-flags test below.
//! 3. Otherwise the largest size with `count * L <= remaining`, else 34.
//! 4. `count` is clamped to the number of whole records present.
//!
//! The guild-flags test reads byte 33 of the first record, which is the
//! guild-role byte in a 34-byte record: `FF` (no guild) or a rank of `00`,
//! `20`, `40` or `80`. Any of those means 34, anything else 42. A 42-byte
//! record whose appearance byte 18 holds one of those values is misread as
//! 34-byte records. That ambiguity is known and kept.

use crate::appearance::{AppearanceLayout, EXTENDED_LEN, LEGACY_LEN};
use crate::class::decode_class;
use crate::schema::{FieldSpec as F, MessageKind, PacketView, RecordSchema, lookup};
use crate::{CharacterInfo, Dialect, ProtocolError};

/// One of the three known character record sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordLayout {
    /// 34 bytes.
    Standard,
    /// 42 bytes.
    LegacyLong,
    /// 44 bytes.
    Extended,
}

impl RecordLayout {
    /// Largest first.
    pub const ALL: [RecordLayout; 3] = [
        RecordLayout::Extended,
        RecordLayout::LegacyLong,
        RecordLayout::Standard,
    ];

    pub fn len(self) -> usize {
        self.schema().len
    }

    fn schema(self) -> &'static RecordSchema {
        match self {
            RecordLayout::Standard => &STANDARD,
            RecordLayout::LegacyLong => &LEGACY_LONG,
            RecordLayout::Extended => &EXTENDED,
        }
    }
}

static STANDARD: RecordSchema = RecordSchema {
    name: "CharacterRecord34",
    len: 34,
    fields: &[
        F::u8("slot", 0),
        F::bytes("name", 1, 10),
        F::le16("level", 12),
        F::u8("status", 14),
        F::bytes("appearance", 15, LEGACY_LEN),
        F::u8("guild_flags", 33),
    ],
};
static LEGACY_LONG: RecordSchema = RecordSchema {
    name: "CharacterRecord42",
    len: 42,
    fields: &[
        F::u8("slot", 0),
        F::bytes("name", 1, 10),
        F::le16("level", 12),
        F::u8("status", 14),
        F::bytes("appearance", 15, 27),
    ],
};
static EXTENDED: RecordSchema = RecordSchema {
    name: "CharacterRecord44",
    len: 44,
    fields: &[
        F::u8("slot", 0),
        F::bytes("name", 1, 10),
        F::le16("level", 12),
        F::u8("status", 14),
        F::u8("class", 15),
        F::u8("guild_flags", 16),
        F::bytes("appearance", 19, EXTENDED_LEN),
    ],
};

/// Guild-role values that mark byte 33 as a 34-byte record's flags byte.
const GUILD_FLAG_VALUES: [u8; 5] = [0xFF, 0x00, 0x20, 0x40, 0x80];

/// Whether the first record looks like a 34-byte one.
pub fn looks_like_standard(records: &[u8]) -> bool {
    records
        .get(33)
        .is_some_and(|flags| GUILD_FLAG_VALUES.contains(flags))
}

/// Picks the record layout and the usable record count.
///
/// `records` is everything after the record offset; its first bytes feed the
/// guild-flags test.
pub fn infer_record_layout(count: usize, records: &[u8]) -> (RecordLayout, usize) {
    let remaining = records.len();

    let exact = (count > 0)
        .then(|| RecordLayout::ALL.into_iter().find(|l| count * l.len() == remaining))
        .flatten();

    let layout = exact.unwrap_or_else(|| {
        let dividing: Vec<RecordLayout> = RecordLayout::ALL
            .into_iter()
            .filter(|l| remaining % l.len() == 0)
            .collect();
        match dividing.as_slice() {
            [only] => *only,
            several if several.contains(&RecordLayout::Extended) => RecordLayout::Extended,
            [_, _] => {
                if looks_like_standard(records) {
                    RecordLayout::Standard
                } else {
                    RecordLayout::LegacyLong
                }
            }
            _ => RecordLayout::ALL
                .into_iter()
                .find(|l| count * l.len() <= remaining)
                .unwrap_or(RecordLayout::Standard),
        }
    });

    (layout, count.min(remaining / layout.len()))
}

/// Decodes one record in the given layout.
pub fn decode_record(
    layout: RecordLayout,
    record: &[u8],
) -> Result<CharacterInfo, ProtocolError> {
    let view = PacketView::record(record, layout.schema())?;
    let appearance = view.slice("appearance")?.to_vec();
    let (class_marker, appearance_layout) = match layout {
        RecordLayout::Extended => (view.u8("class")?, AppearanceLayout::Extended),
        RecordLayout::Standard | RecordLayout::LegacyLong => {
            (appearance[0], AppearanceLayout::Legacy)
        }
    };
    Ok(CharacterInfo {
        slot: view.u8("slot")?,
        name: view.text("name")?,
        class: decode_class(class_marker),
        level: view.u16("level")?,
        appearance,
        appearance_layout,
    })
}

/// Decodes a whole character list frame.
pub fn decode_character_list(
    frame: &[u8],
    dialect: Dialect,
) -> Result<Vec<CharacterInfo>, ProtocolError> {
    let view = PacketView::message(frame, lookup(MessageKind::CharacterList, dialect))?;
    let declared = usize::from(view.u8("count")?);
    let records = view.slice("records")?;

    let (layout, count) = infer_record_layout(declared, records);
    if count < declared {
        tracing::warn!(declared, count, ?layout, "character list count clamped");
    }
    tracing::debug!(count, ?layout, "character list layout");

    records
        .chunks_exact(layout.len())
        .take(count)
        .map(|record| decode_record(layout, record))
        .collect()
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::CharacterClass;

    fn standard_record(name: &str, level: u16, class_byte: u8) -> Vec<u8> {
        let mut r = vec![0u8; 34];
        r[1..1 + name.len()].copy_from_slice(name.as_bytes());
        r[12..14].copy_from_slice(&level.to_le_bytes());
        r[15] = class_byte;
        r[33] = 0xFF;
        r
    }

    fn extended_record(name: &str, level: u16, class_byte: u8) -> Vec<u8> {
        let mut r = vec![0u8; 44];
        r[1..1 + name.len()].copy_from_slice(name.as_bytes());
        r[12..14].copy_from_slice(&level.to_le_bytes());
        r[15] = class_byte;
        r[19] = class_byte;
        r
    }

    fn season6_frame(count: u8, records: &[u8]) -> Vec<u8> {
        let mut frame = vec![0xC1, 0x00, 0xF3, 0x00, 0x00, 0x00, count, 0x00];
        frame.extend_from_slice(records);
        frame[1] = frame.len() as u8;
        frame
    }

    // =====================================================================
    // Inference
    // =====================================================================

    #[test]
    fn test_infer_exact_match_for_each_size() {
        assert_eq!(infer_record_layout(5, &[0u8; 220]), (RecordLayout::Extended, 5));
        assert_eq!(infer_record_layout(5, &[0u8; 210]), (RecordLayout::LegacyLong, 5));
        assert_eq!(infer_record_layout(5, &[0u8; 170]), (RecordLayout::Standard, 5));
    }

    #[test]
    fn test_infer_single_divisor_with_wrong_count() {
        // 88 is only divisible by 44; the count claims 3 but 2 fit.
        assert_eq!(infer_record_layout(3, &[0u8; 88]), (RecordLayout::Extended, 2));
    }

    #[test]
    fn test_infer_42_or_34_tie_uses_guild_flags() {
        // 714 = 17 * 42 = 21 * 34.
        let mut records = vec![0u8; 714];
        records[33] = 0x20;
        assert_eq!(infer_record_layout(1, &records).0, RecordLayout::Standard);

        records[33] = 0x13;
        assert_eq!(infer_record_layout(1, &records).0, RecordLayout::LegacyLong);
    }

    #[test]
    fn test_infer_tie_misclassifies_colliding_legacy_long_record() {
        // 17 genuine 42-byte records under a count that matches no size.
        // Record byte 33 is appearance byte 18, here 0x00, which passes the
        // guild-flags test, so the list is read as 34-byte records.
        let records = vec![0u8; 714];
        assert_eq!(infer_record_layout(16, &records), (RecordLayout::Standard, 16));
    }

    #[test]
    fn test_infer_no_divisor_clamps_count() {
        // 100 bytes: nothing divides; 2 * 44 fits.
        assert_eq!(infer_record_layout(2, &[0u8; 100]), (RecordLayout::Extended, 2));
        // 3 * 34 = 102 does not fit in 100 either; fall back to 34, clamp to 2.
        assert_eq!(infer_record_layout(3, &[0u8; 100]), (RecordLayout::Standard, 2));
    }

    #[test]
    fn test_infer_empty_list() {
        assert_eq!(infer_record_layout(0, &[]).1, 0);
    }

    // =====================================================================
    // Decoding
    // =====================================================================

    #[test]
    fn test_decode_character_list_standard_records() {
        let mut records = standard_record("Alice", 150, 0x20);
        records.extend(standard_record("Bob", 7, 0x00));
        let frame = season6_frame(2, &records);

        let list = decode_character_list(&frame, Dialect::Season6).unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].name, "Alice");
        assert_eq!(list[0].level, 150);
        assert_eq!(list[0].class, CharacterClass::DarkKnight);
        assert_eq!(list[0].appearance.len(), 18);
        assert_eq!(list[0].appearance_layout, AppearanceLayout::Legacy);
        assert_eq!(list[1].name, "Bob");
        assert_eq!(list[1].class, CharacterClass::DarkWizard);
    }

    #[test]
    fn test_decode_character_list_extended_record() {
        let frame = season6_frame(1, &extended_record("Lord", 400, 16));
        let list = decode_character_list(&frame, Dialect::Season6).unwrap();
        assert_eq!(list[0].class, CharacterClass::DarkLord);
        assert_eq!(list[0].appearance_layout, AppearanceLayout::Extended);
        assert_eq!(list[0].appearance.len(), 25);
        assert!(list[0].decode_appearance().is_ok());
    }

    #[test]
    fn test_decode_character_list_legacy_dialect_offsets() {
        let mut frame = vec![0xC1, 0x00, 0xF3, 0x00, 0x00, 0x01];
        frame.extend(standard_record("Old", 3, 0x40));
        frame[1] = frame.len() as u8;
        let list = decode_character_list(&frame, Dialect::V097).unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].name, "Old");
        assert_eq!(list[0].class, CharacterClass::FairyElf);
    }

    #[test]
    fn test_decode_character_list_overrun_count_clamped() {
        let frame = season6_frame(4, &standard_record("Solo", 1, 0));
        let list = decode_character_list(&frame, Dialect::Season6).unwrap();
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_decode_character_list_short_frame_rejected() {
        assert!(decode_character_list(&[0xC1, 0x05, 0xF3, 0x00, 0x00], Dialect::Season6).is_err());
    }
}
