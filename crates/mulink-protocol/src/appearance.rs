//! Equipment appearance decoding.
//!
//! Servers describe what a character visibly wears in one of two packed
//! layouts:
//!
//! - **Legacy** (18 bytes, sometimes padded to 27): item indices are spread
//!   bit by bit over several bytes, levels share a 24-bit glow word, and
//!   wings are a (level, type) pair looked up in tier tables.
//! - **Extended** (25 bytes): three bytes per slot, each carrying its own
//!   group, index, glow and flags; wings and pet are ordinary items.
//!
//! Both decode to the same [`Appearance`].

use crate::class::{CharacterClass, ClassFamily, decode_class};
use crate::ProtocolError;

/// Which packed layout a byte string uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AppearanceLayout {
    Legacy,
    Extended,
}

impl AppearanceLayout {
    /// Minimum number of bytes the decoder reads.
    pub fn min_len(self) -> usize {
        match self {
            AppearanceLayout::Legacy => LEGACY_LEN,
            AppearanceLayout::Extended => EXTENDED_LEN,
        }
    }
}

pub const LEGACY_LEN: usize = 18;
pub const EXTENDED_LEN: usize = 25;

/// Display level for each of the eight glow steps.
pub const GLOW_LEVELS: [u8; 8] = [0, 3, 5, 7, 9, 11, 13, 15];

/// Equipment slots in wire order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    RightHand,
    LeftHand,
    Helm,
    Armor,
    Pants,
    Gloves,
    Boots,
    Wings,
    Pet,
}

impl Slot {
    pub const ALL: [Slot; 9] = [
        Slot::RightHand,
        Slot::LeftHand,
        Slot::Helm,
        Slot::Armor,
        Slot::Pants,
        Slot::Gloves,
        Slot::Boots,
        Slot::Wings,
        Slot::Pet,
    ];
}

/// An item definition: its group and its index inside the group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ItemId {
    pub group: u8,
    pub index: u16,
}

/// One decoded slot. `item` is `None` for an empty slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EquipmentSlot {
    pub item: Option<ItemId>,
    /// Display level, 0 to 15.
    pub level: u8,
    pub excellent: bool,
    pub ancient: bool,
}

impl EquipmentSlot {
    /// The item index, or `-1` for an empty slot.
    pub fn index(&self) -> i32 {
        self.item.map_or(-1, |item| i32::from(item.index))
    }

    pub fn is_empty(&self) -> bool {
        self.item.is_none()
    }
}

/// Everything a renderer needs to dress a character.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Appearance {
    pub class: CharacterClass,
    pub slots: [EquipmentSlot; 9],
    /// Highest level over all slots.
    pub item_level: u8,
    /// Whether any slot is excellent.
    pub excellent: bool,
    /// Whether any slot is ancient.
    pub ancient: bool,
}

impl Appearance {
    pub fn slot(&self, slot: Slot) -> &EquipmentSlot {
        &self.slots[slot as usize]
    }

    fn new(class: CharacterClass, slots: [EquipmentSlot; 9]) -> Self {
        Self {
            class,
            item_level: slots.iter().map(|s| s.level).max().unwrap_or(0),
            excellent: slots.iter().any(|s| s.excellent),
            ancient: slots.iter().any(|s| s.ancient),
            slots,
        }
    }
}

/// Decodes `bytes` in the given layout.
pub fn decode_appearance(
    layout: AppearanceLayout,
    bytes: &[u8],
) -> Result<Appearance, ProtocolError> {
    if bytes.len() < layout.min_len() {
        return Err(ProtocolError::ShortBuffer {
            context: "appearance",
            needed: layout.min_len(),
            actual: bytes.len(),
        });
    }
    Ok(match layout {
        AppearanceLayout::Legacy => decode_legacy(bytes),
        AppearanceLayout::Extended => decode_extended(bytes),
    })
}

fn glow_to_level(glow: u8) -> u8 {
    GLOW_LEVELS[usize::from(glow.min(7))]
}

// ---------------------------------------------------------------------------
// Legacy layout
// ---------------------------------------------------------------------------

const HAND_EMPTY: u16 = 0xFF;
const ARMOR_EMPTY: u16 = 0x1FF;
const WING_GROUP: u8 = 12;
const PET_GROUP: u8 = 13;
const CAPE_OF_LORD: u16 = 30;

/// Excellent/ancient flag bit per slot, for the legacy flag bytes.
fn legacy_flag_bit(slot: Slot) -> u8 {
    match slot {
        Slot::RightHand => 0x02,
        Slot::LeftHand => 0x04,
        Slot::Boots => 0x08,
        Slot::Gloves => 0x10,
        Slot::Pants => 0x20,
        Slot::Armor => 0x40,
        Slot::Helm => 0x80,
        Slot::Wings | Slot::Pet => 0x00,
    }
}

/// Wing item index for a legacy (level, type) pair.
fn legacy_wing_index(level: u8, kind: u8, family: ClassFamily) -> Option<u16> {
    match (level, kind) {
        (1, 1) => Some(0),
        (1, 2) => Some(1),
        (1, 3) => Some(2),
        (1, 4) => Some(41),
        (2, 1) => Some(3),
        (2, 2) => Some(4),
        (2, 3) => Some(5),
        (2, 4) if family == ClassFamily::Lord => Some(CAPE_OF_LORD),
        (2, 4) => Some(6),
        (2, 5) => Some(42),
        (2, 6) => Some(49),
        (3, 1) => Some(36),
        (3, 2) => Some(37),
        (3, 3) => Some(38),
        (3, 4) => Some(39),
        (3, 5) => Some(40),
        (3, 6) => Some(43),
        (3, 7) => Some(50),
        _ => None,
    }
}

fn decode_legacy(b: &[u8]) -> Appearance {
    let class = decode_class(b[0]);
    let wide = |byte: u8| u16::from(byte);

    let right = wide(b[1]) | (wide(b[12] & 0xF0) << 4);
    let left = wide(b[2]) | (wide(b[13] & 0xF0) << 4);
    let helm = (wide(b[3]) >> 4) | (wide(b[9] & 0x80) >> 3) | (wide(b[13] & 0x0F) << 5);
    let armor = wide(b[3] & 0x0F) | (wide(b[9] & 0x40) >> 2) | (wide(b[14] & 0xF0) << 1);
    let pants = (wide(b[4]) >> 4) | (wide(b[9] & 0x20) >> 1) | (wide(b[14] & 0x0F) << 5);
    let gloves = wide(b[4] & 0x0F) | wide(b[9] & 0x10) | (wide(b[15] & 0xF0) << 1);
    let boots = (wide(b[5]) >> 4) | (wide(b[9] & 0x08) << 1) | (wide(b[15] & 0x0F) << 5);

    let glow_word =
        (u32::from(b[6]) << 16) | (u32::from(b[7]) << 8) | u32::from(b[8]);
    let glow = |shift: u32| ((glow_word >> shift) & 0x07) as u8;

    let excellent_flags = b[10];
    let ancient_flags = b[11];
    let item = |slot: Slot, group: u8, index: u16, empty: bool, shift: u32| {
        if empty {
            return EquipmentSlot::default();
        }
        let bit = legacy_flag_bit(slot);
        EquipmentSlot {
            item: Some(ItemId { group, index }),
            level: glow_to_level(glow(shift)),
            excellent: excellent_flags & bit != 0,
            ancient: ancient_flags & bit != 0,
        }
    };

    // Low byte 0xFF marks an empty hand, whatever the high bits say.
    let right_slot = item(
        Slot::RightHand,
        (b[16] >> 5) & 0x07,
        right,
        right & 0xFF == HAND_EMPTY,
        21,
    );
    let left_slot = item(
        Slot::LeftHand,
        (b[16] >> 2) & 0x07,
        left,
        left & 0xFF == HAND_EMPTY,
        18,
    );

    let wing_level = (b[5] >> 2) & 0x03;
    let wing_kind = b[9] & 0x07;
    let wings = EquipmentSlot {
        item: legacy_wing_index(wing_level, wing_kind, class.family())
            .map(|index| ItemId { group: WING_GROUP, index }),
        ..EquipmentSlot::default()
    };

    let pet_index = b[5] & 0x03;
    let pet = EquipmentSlot {
        item: (pet_index != 3).then_some(ItemId {
            group: PET_GROUP,
            index: u16::from(pet_index),
        }),
        ..EquipmentSlot::default()
    };

    Appearance::new(
        class,
        [
            right_slot,
            left_slot,
            item(Slot::Helm, 7, helm, helm == ARMOR_EMPTY, 15),
            item(Slot::Armor, 8, armor, armor == ARMOR_EMPTY, 12),
            item(Slot::Pants, 9, pants, pants == ARMOR_EMPTY, 9),
            item(Slot::Gloves, 10, gloves, gloves == ARMOR_EMPTY, 6),
            item(Slot::Boots, 11, boots, boots == ARMOR_EMPTY, 3),
            wings,
            pet,
        ],
    )
}

// ---------------------------------------------------------------------------
// Extended layout
// ---------------------------------------------------------------------------

/// Start of each three-byte slot, right hand through boots.
const EXTENDED_TRIPLES: [usize; 7] = [1, 4, 7, 10, 13, 16, 19];
const EXTENDED_WINGS: usize = 22;
const EXTENDED_PET: usize = 24;

/// Group and 9-bit index from a `(t0, t1)` pair. `None` when empty.
fn extended_item(t0: u8, t1: u8) -> Option<ItemId> {
    let index = u16::from(t1) | (u16::from(t0 & 0x01) << 8);
    if index == 0xFF || index == 0x1FF {
        return None;
    }
    Some(ItemId { group: t0 >> 4, index })
}

fn decode_extended_triple(t: &[u8]) -> EquipmentSlot {
    let Some(item) = extended_item(t[0], t[1]) else {
        return EquipmentSlot::default();
    };
    EquipmentSlot {
        item: Some(item),
        level: glow_to_level(t[2] >> 4),
        excellent: t[2] & 0x02 != 0,
        ancient: t[2] & 0x04 != 0,
    }
}

fn decode_extended(b: &[u8]) -> Appearance {
    let mut slots = [EquipmentSlot::default(); 9];
    for (slot, &offset) in slots.iter_mut().zip(EXTENDED_TRIPLES.iter()) {
        *slot = decode_extended_triple(&b[offset..offset + 3]);
    }
    slots[Slot::Wings as usize].item =
        extended_item(b[EXTENDED_WINGS], b[EXTENDED_WINGS + 1]);
    slots[Slot::Pet as usize].item = (b[EXTENDED_PET] != 0xFF).then_some(ItemId {
        group: PET_GROUP,
        index: u16::from(b[EXTENDED_PET]),
    });

    Appearance::new(decode_class(b[0]), slots)
}

// =========================================================================
// Tests
// =========================================================================
