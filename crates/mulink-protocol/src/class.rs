//! Character class decoding.
//!
//! Servers put a class marker in several different places and shapes: a
//! plain server class number, the same number shifted into the top bits of
//! an appearance byte, or a 4-bit/3-bit "rendered" class. [`decode_class`]
//! tries each reading in a fixed order and takes the first that matches.

use std::fmt;

/// A character class, by its server class number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CharacterClass {
    DarkWizard,
    SoulMaster,
    GrandMaster,
    DarkKnight,
    BladeKnight,
    BladeMaster,
    FairyElf,
    MuseElf,
    HighElf,
    MagicGladiator,
    DuelMaster,
    DarkLord,
    LordEmperor,
    Summoner,
    BloodySummoner,
    DimensionMaster,
    RageFighter,
    FistMaster,
}

/// The base line a class evolves along.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClassFamily {
    Wizard,
    Knight,
    Elf,
    Gladiator,
    Lord,
    Summoner,
    Fighter,
}

impl CharacterClass {
    /// The starting class every unknown marker falls back to.
    pub const DEFAULT: CharacterClass = CharacterClass::DarkWizard;

    /// Looks up a server class number.
    pub fn from_server_value(value: u8) -> Option<Self> {
        use CharacterClass::*;
        Some(match value {
            0 => DarkWizard,
            2 => SoulMaster,
            3 => GrandMaster,
            4 => DarkKnight,
            6 => BladeKnight,
            7 => BladeMaster,
            8 => FairyElf,
            10 => MuseElf,
            11 => HighElf,
            12 => MagicGladiator,
            13 => DuelMaster,
            16 => DarkLord,
            17 => LordEmperor,
            20 => Summoner,
            22 => BloodySummoner,
            23 => DimensionMaster,
            24 => RageFighter,
            25 => FistMaster,
            _ => return None,
        })
    }

    /// The server class number.
    pub fn server_value(self) -> u8 {
        use CharacterClass::*;
        match self {
            DarkWizard => 0,
            SoulMaster => 2,
            GrandMaster => 3,
            DarkKnight => 4,
            BladeKnight => 6,
            BladeMaster => 7,
            FairyElf => 8,
            MuseElf => 10,
            HighElf => 11,
            MagicGladiator => 12,
            DuelMaster => 13,
            DarkLord => 16,
            LordEmperor => 17,
            Summoner => 20,
            BloodySummoner => 22,
            DimensionMaster => 23,
            RageFighter => 24,
            FistMaster => 25,
        }
    }

    /// Looks up a rendered (base) class number, 0 through 6.
    pub fn from_rendered(value: u8) -> Option<Self> {
        use CharacterClass::*;
        Some(match value {
            0 => DarkWizard,
            1 => DarkKnight,
            2 => FairyElf,
            3 => MagicGladiator,
            4 => DarkLord,
            5 => Summoner,
            6 => RageFighter,
            _ => return None,
        })
    }

    pub fn family(self) -> ClassFamily {
        use CharacterClass::*;
        match self {
            DarkWizard | SoulMaster | GrandMaster => ClassFamily::Wizard,
            DarkKnight | BladeKnight | BladeMaster => ClassFamily::Knight,
            FairyElf | MuseElf | HighElf => ClassFamily::Elf,
            MagicGladiator | DuelMaster => ClassFamily::Gladiator,
            DarkLord | LordEmperor => ClassFamily::Lord,
            Summoner | BloodySummoner | DimensionMaster => ClassFamily::Summoner,
            RageFighter | FistMaster => ClassFamily::Fighter,
        }
    }
}

impl fmt::Display for CharacterClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Decodes a raw class marker byte.
///
/// Order matters and is part of the wire contract:
///
/// 1. the byte as a server class number
/// 2. `(byte >> 3) & 0x1F` as a server class number
/// 3. `(byte >> 4) & 0x0F` as a rendered class
/// 4. `(byte >> 5) & 0x07` as a rendered class
///
/// Anything else is a Dark Wizard.
pub fn decode_class(raw: u8) -> CharacterClass {
    CharacterClass::from_server_value(raw)
        .or_else(|| CharacterClass::from_server_value((raw >> 3) & 0x1F))
        .or_else(|| CharacterClass::from_rendered((raw >> 4) & 0x0F))
        .or_else(|| CharacterClass::from_rendered((raw >> 5) & 0x07))
        .unwrap_or(CharacterClass::DEFAULT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_class_direct_value_wins() {
        assert_eq!(decode_class(16), CharacterClass::DarkLord);
        assert_eq!(decode_class(25), CharacterClass::FistMaster);
    }

    #[test]
    fn test_decode_class_shifted_server_value() {
        // 0x20 is not a class number; 0x20 >> 3 == 4 is Dark Knight.
        assert_eq!(decode_class(0x20), CharacterClass::DarkKnight);
        // 0x80 >> 3 == 16 is Dark Lord.
        assert_eq!(decode_class(0x80), CharacterClass::DarkLord);
    }

    #[test]
    fn test_decode_class_rendered_nibble() {
        // 0x38: direct 56 no, >> 3 == 7 is Blade Master.
        assert_eq!(decode_class(0x38), CharacterClass::BladeMaster);
        // 0x2F: 47 no, >> 3 == 5 no, >> 4 == 2 is Fairy Elf.
        assert_eq!(decode_class(0x2F), CharacterClass::FairyElf);
    }

    #[test]
    fn test_decode_class_base_bits() {
        // 0xE7: 231 no, >>3 == 28 no, >>4 == 14 no, >>5 == 7 no -> default.
        assert_eq!(decode_class(0xE7), CharacterClass::DarkWizard);
        // 0xAF: 175 no, >>3 == 21 no, >>4 == 10 no, >>5 == 5 is Summoner.
        assert_eq!(decode_class(0xAF), CharacterClass::Summoner);
    }

    #[test]
    fn test_family_groups_evolutions() {
        assert_eq!(CharacterClass::LordEmperor.family(), ClassFamily::Lord);
        assert_eq!(CharacterClass::HighElf.family(), ClassFamily::Elf);
        assert_eq!(CharacterClass::DuelMaster.family(), ClassFamily::Gladiator);
    }

    #[test]
    fn test_server_value_round_trips_through_table() {
        for value in 0..=u8::MAX {
            if let Some(class) = CharacterClass::from_server_value(value) {
                assert_eq!(class.server_value(), value);
            }
        }
    }
}
