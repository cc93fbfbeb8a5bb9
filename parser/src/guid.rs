use serde::{Deserialize, Serialize};
use std::fmt;
use strum_macros::Display;

use crate::error::ReadError;
use crate::reader::PacketReader;

const TYPE_SHIFT: u32 = 58;
const ENTRY_SHIFT: u32 = 6;
const ENTRY_MASK: u64 = 0x7F_FFFF;
const REALM_SHIFT: u32 = 42;
const REALM_MASK: u64 = 0x1FFF;
const COUNTER_MASK: u64 = 0xFF_FFFF_FFFF;

/// The object class an identifier refers to, taken from the top six bits of its high half.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
pub enum GuidType {
    Null,
    Uniq,
    Player,
    Item,
    StaticDoor,
    Transport,
    Conversation,
    Creature,
    Vehicle,
    Pet,
    GameObject,
    DynamicObject,
    AreaTrigger,
    Corpse,
    LootObject,
    SceneObject,
    Scenario,
    AIGroup,
    DynamicDoor,
    ClientActor,
    Vignette,
    CallForHelp,
    AIResource,
    AILock,
    AILockTicket,
    ChatChannel,
    Party,
    Guild,
    WowAccount,
    BNetAccount,
    GMTask,
    MobileSession,
    RaidGroup,
    Spell,
    Mail,
    Unknown(u8),
}

impl GuidType {
    const ORDERED: [GuidType; 35] = [
        GuidType::Null,
        GuidType::Uniq,
        GuidType::Player,
        GuidType::Item,
        GuidType::StaticDoor,
        GuidType::Transport,
        GuidType::Conversation,
        GuidType::Creature,
        GuidType::Vehicle,
        GuidType::Pet,
        GuidType::GameObject,
        GuidType::DynamicObject,
        GuidType::AreaTrigger,
        GuidType::Corpse,
        GuidType::LootObject,
        GuidType::SceneObject,
        GuidType::Scenario,
        GuidType::AIGroup,
        GuidType::DynamicDoor,
        GuidType::ClientActor,
        GuidType::Vignette,
        GuidType::CallForHelp,
        GuidType::AIResource,
        GuidType::AILock,
        GuidType::AILockTicket,
        GuidType::ChatChannel,
        GuidType::Party,
        GuidType::Guild,
        GuidType::WowAccount,
        GuidType::BNetAccount,
        GuidType::GMTask,
        GuidType::MobileSession,
        GuidType::RaidGroup,
        GuidType::Spell,
        GuidType::Mail,
    ];

    pub fn from_raw(raw: u8) -> GuidType {
        Self::ORDERED
            .get(raw as usize)
            .copied()
            .unwrap_or(GuidType::Unknown(raw))
    }

    pub fn raw(self) -> u8 {
        match self {
            GuidType::Unknown(raw) => raw,
            known => Self::ORDERED
                .iter()
                .position(|t| *t == known)
                .map(|idx| idx as u8)
                .unwrap_or_default(),
        }
    }
}

/// 128-bit entity identifier.
///
/// Two identifiers are the same entity only when both halves match; creatures spawned from the
/// same template share a type and entry id but differ in their counter.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Guid128 {
    low: u64,
    high: u64,
}

impl Guid128 {
    pub const EMPTY: Guid128 = Guid128 { low: 0, high: 0 };

    pub fn new(low: u64, high: u64) -> Self {
        Self { low, high }
    }

    pub fn player(realm: u16, counter: u64) -> Self {
        Self {
            low: counter & COUNTER_MASK,
            high: (u64::from(GuidType::Player.raw()) << TYPE_SHIFT)
                | ((u64::from(realm) & REALM_MASK) << REALM_SHIFT),
        }
    }

    pub fn creature(entry: u32, counter: u64) -> Self {
        Self::with_entry(GuidType::Creature, entry, counter)
    }

    pub fn with_entry(guid_type: GuidType, entry: u32, counter: u64) -> Self {
        Self {
            low: counter & COUNTER_MASK,
            high: (u64::from(guid_type.raw()) << TYPE_SHIFT)
                | ((u64::from(entry) & ENTRY_MASK) << ENTRY_SHIFT),
        }
    }

    pub fn low(&self) -> u64 {
        self.low
    }

    pub fn high(&self) -> u64 {
        self.high
    }

    pub fn is_empty(&self) -> bool {
        self.low == 0 && self.high == 0
    }

    pub fn guid_type(&self) -> GuidType {
        GuidType::from_raw((self.high >> TYPE_SHIFT) as u8)
    }

    pub fn is_player(&self) -> bool {
        self.guid_type() == GuidType::Player
    }

    pub fn is_creature(&self) -> bool {
        self.guid_type() == GuidType::Creature
    }

    /// Template id for non-player objects.
    pub fn entry_id(&self) -> Option<u32> {
        match self.guid_type() {
            GuidType::Player | GuidType::Null => None,
            _ => Some(((self.high >> ENTRY_SHIFT) & ENTRY_MASK) as u32),
        }
    }

    pub fn realm_id(&self) -> u16 {
        ((self.high >> REALM_SHIFT) & REALM_MASK) as u16
    }

    pub fn counter(&self) -> u64 {
        self.low & COUNTER_MASK
    }

    /// Appends the packed form: two presence masks, then every non-zero byte of each half.
    pub fn write_packed(&self, out: &mut Vec<u8>) {
        let (low_mask, low_bytes) = pack_half(self.low);
        let (high_mask, high_bytes) = pack_half(self.high);
        out.push(low_mask);
        out.push(high_mask);
        out.extend_from_slice(&low_bytes);
        out.extend_from_slice(&high_bytes);
    }

    pub fn to_packed(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(18);
        self.write_packed(&mut out);
        out
    }
}

fn pack_half(value: u64) -> (u8, Vec<u8>) {
    let mut mask = 0u8;
    let mut bytes = Vec::with_capacity(8);
    for (i, byte) in value.to_le_bytes().iter().enumerate() {
        if *byte != 0 {
            mask |= 1 << i;
            bytes.push(*byte);
        }
    }
    (mask, bytes)
}

fn read_half(reader: &mut PacketReader<'_>, mask: u8) -> Result<u64, ReadError> {
    let mut value = 0u64;
    for i in 0..8 {
        if mask & (1 << i) != 0 {
            value |= u64::from(reader.read_u8()?) << (i * 8);
        }
    }
    Ok(value)
}

impl<'a> PacketReader<'a> {
    pub fn read_packed_guid128(&mut self) -> Result<Guid128, ReadError> {
        let low_mask = self.read_u8()?;
        let high_mask = self.read_u8()?;
        let low = read_half(self, low_mask)?;
        let high = read_half(self, high_mask)?;
        Ok(Guid128 { low, high })
    }

    /// Unpacked form used by fixed-width update fields.
    pub fn read_guid128(&mut self) -> Result<Guid128, ReadError> {
        let low = self.read_u64()?;
        let high = self.read_u64()?;
        Ok(Guid128 { low, high })
    }
}

impl fmt::Display for Guid128 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.guid_type() {
            GuidType::Null if self.is_empty() => write!(f, "Null"),
            GuidType::Player => write!(f, "Player-{}-{:08X}", self.realm_id(), self.counter()),
            other => write!(
                f,
                "{}-{}-{:010X}",
                other,
                self.entry_id().unwrap_or_default(),
                self.counter()
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn zero_bytes_are_omitted() {
        let guid = Guid128::creature(1234, 5);
        let packed = guid.to_packed();
        // low: one byte (5); high: entry spread over two bytes plus the type byte
        assert_eq!(packed[0], 0b0000_0001);
        assert_eq!(packed.len(), 2 + 1 + packed[1].count_ones() as usize);

        let mut reader = PacketReader::new(&packed);
        assert_eq!(reader.read_packed_guid128().unwrap(), guid);
        assert!(reader.is_empty());
    }

    #[test]
    fn empty_guid_is_two_zero_masks() {
        assert_eq!(Guid128::EMPTY.to_packed(), vec![0, 0]);
    }

    #[test]
    fn type_and_entry_queries() {
        let creature = Guid128::creature(5678, 42);
        assert!(creature.is_creature());
        assert!(!creature.is_player());
        assert_eq!(creature.entry_id(), Some(5678));
        assert_eq!(creature.counter(), 42);

        let player = Guid128::player(1, 99);
        assert!(player.is_player());
        assert_eq!(player.entry_id(), None);
        assert_eq!(player.realm_id(), 1);
    }

    #[test]
    fn same_template_different_counter_is_distinct() {
        assert_ne!(Guid128::creature(1234, 1), Guid128::creature(1234, 2));
    }

    #[test]
    fn truncated_guid_fails() {
        let packed = Guid128::creature(1234, 5).to_packed();
        let mut reader = PacketReader::new(&packed[..packed.len() - 1]);
        assert!(reader.read_packed_guid128().is_err());
    }

    #[test]
    fn unknown_type_tags_survive() {
        assert_eq!(GuidType::from_raw(60), GuidType::Unknown(60));
        assert_eq!(GuidType::Unknown(60).raw(), 60);
        assert_eq!(GuidType::from_raw(7), GuidType::Creature);
    }

    proptest! {
        #[test]
        fn packed_round_trip(low: u64, high: u64) {
            let guid = Guid128::new(low, high);
            let packed = guid.to_packed();
            let mut reader = PacketReader::new(&packed);
            let decoded = reader.read_packed_guid128().unwrap();
            prop_assert_eq!(decoded, guid);
            prop_assert!(reader.is_empty());
            prop_assert_eq!(decoded.to_packed(), packed);
        }
    }
}
