//! Server to client payloads.

use serde::Serialize;
use tracing::trace;

use crate::error::ReadError;
use crate::guid::Guid128;
use crate::reader::PacketReader;
use crate::state::{LootSummary, ReplayContext};
use crate::types::{FrameStamp, Position};

/// Facing type of a monster move that carries an explicit angle.
const FACING_ANGLE: u8 = 4;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttackStart {
    pub attacker: Guid128,
    pub victim: Guid128,
}

impl AttackStart {
    pub fn parse(reader: &mut PacketReader<'_>) -> Result<Self, ReadError> {
        Ok(Self {
            attacker: reader.read_packed_guid128()?,
            victim: reader.read_packed_guid128()?,
        })
    }

    pub fn update_state(&self, stamp: FrameStamp, ctx: &mut ReplayContext) {
        if let Some(attacker) = ctx.entities.find_or_create(self.attacker) {
            attacker.attack_start(stamp, self.victim);
        }
        if let Some(victim) = ctx.entities.find_or_create(self.victim) {
            victim.attacked_by(stamp, self.attacker);
        }
        ctx.combat.attack_start(self.attacker, self.victim, stamp);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttackStop {
    pub attacker: Guid128,
    pub victim: Guid128,
    /// The attacker died, which is why the attack stopped.
    pub attacker_dead: bool,
}

impl AttackStop {
    pub fn parse(reader: &mut PacketReader<'_>) -> Result<Self, ReadError> {
        Ok(Self {
            attacker: reader.read_packed_guid128()?,
            victim: reader.read_packed_guid128()?,
            attacker_dead: reader.read_bit()?,
        })
    }

    pub fn update_state(&self, stamp: FrameStamp, ctx: &mut ReplayContext) {
        if let Some(attacker) = ctx.entities.find_or_create(self.attacker) {
            if self.attacker_dead {
                attacker.died(stamp, Some(self.victim));
            } else {
                attacker.attack_stop(stamp, Some(self.victim));
            }
        }
        if let Some(victim) = ctx.entities.find_or_create(self.victim) {
            victim.released_by(stamp, self.attacker);
        }
        ctx.combat.attack_stop(self.attacker, self.victim, stamp);

        if self.attacker_dead {
            // A dead attacker is out of every fight, not only the one this frame names.
            for other in ctx.combat.open_victims(&self.attacker) {
                if let Some(entity) = ctx.entities.find_or_create(other) {
                    entity.released_by(stamp, self.attacker);
                }
                ctx.combat.attack_stop(self.attacker, other, stamp);
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthChallenge {
    pub challenge: Vec<u8>,
    pub dos_zero_bits: u8,
}

impl AuthChallenge {
    pub fn parse(reader: &mut PacketReader<'_>) -> Result<Self, ReadError> {
        Ok(Self {
            challenge: reader.read_bytes(16)?.to_vec(),
            dos_zero_bits: reader.read_u8()?,
        })
    }

    pub fn update_state(&self, _stamp: FrameStamp, ctx: &mut ReplayContext) {
        ctx.session.auth_challenge_seen = true;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub chat_type: u8,
    pub language: u8,
    pub sender: Guid128,
    pub target: Guid128,
    pub sender_name: String,
    pub channel: Option<String>,
    pub message: String,
}

impl ChatMessage {
    pub fn parse(reader: &mut PacketReader<'_>) -> Result<Self, ReadError> {
        let chat_type = reader.read_u8()?;
        let language = reader.read_u8()?;
        let sender = reader.read_packed_guid128()?;
        let target = reader.read_packed_guid128()?;
        let sender_name_len = reader.read_bits(11)? as usize;
        let channel_len = reader.read_bits(7)? as usize;
        let message_len = reader.read_bits(12)? as usize;

        let sender_name = reader.read_string(sender_name_len)?;
        let channel = reader.read_string(channel_len)?;
        let message = reader.read_string(message_len)?;

        Ok(Self {
            chat_type,
            language,
            sender,
            target,
            sender_name,
            channel: (!channel.is_empty()).then_some(channel),
            message,
        })
    }

    pub fn update_state(&self, stamp: FrameStamp, ctx: &mut ReplayContext) {
        if let Some(sender) = ctx.entities.find_or_create(self.sender) {
            sender.chat(
                stamp,
                self.chat_type,
                self.channel.clone(),
                self.message.clone(),
            );
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Emote {
    pub guid: Guid128,
    pub emote_id: u32,
}

impl Emote {
    pub fn parse(reader: &mut PacketReader<'_>) -> Result<Self, ReadError> {
        Ok(Self {
            guid: reader.read_packed_guid128()?,
            emote_id: reader.read_u32()?,
        })
    }

    pub fn update_state(&self, stamp: FrameStamp, ctx: &mut ReplayContext) {
        if let Some(entity) = ctx.entities.find_or_create(self.guid) {
            entity.emote(stamp, self.emote_id);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextEmote {
    pub source: Guid128,
    pub source_account: Guid128,
    pub text_emote_id: u32,
    pub sound_index: u32,
    pub target: Guid128,
}

impl TextEmote {
    pub fn parse(reader: &mut PacketReader<'_>) -> Result<Self, ReadError> {
        Ok(Self {
            source: reader.read_packed_guid128()?,
            source_account: reader.read_packed_guid128()?,
            text_emote_id: reader.read_u32()?,
            sound_index: reader.read_u32()?,
            target: reader.read_packed_guid128()?,
        })
    }

    pub fn update_state(&self, stamp: FrameStamp, ctx: &mut ReplayContext) {
        let target = (!self.target.is_empty()).then_some(self.target);
        if let Some(entity) = ctx.entities.find_or_create(self.source) {
            entity.text_emote(stamp, self.text_emote_id, target);
        }
    }
}

/// Shared layout of spell-start and spell-go.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpellCast {
    pub caster: Guid128,
    pub caster_unit: Guid128,
    pub cast_id: u8,
    pub spell_id: u32,
    pub cast_flags: u32,
}

impl SpellCast {
    pub fn parse(reader: &mut PacketReader<'_>) -> Result<Self, ReadError> {
        Ok(Self {
            caster: reader.read_packed_guid128()?,
            caster_unit: reader.read_packed_guid128()?,
            cast_id: reader.read_u8()?,
            spell_id: reader.read_u32()?,
            cast_flags: reader.read_u32()?,
        })
    }

    /// Items cast on behalf of a unit; the unit is the one that acts.
    pub fn acting_unit(&self) -> Guid128 {
        if self.caster_unit.is_empty() {
            self.caster
        } else {
            self.caster_unit
        }
    }

    pub fn update_start(&self, stamp: FrameStamp, ctx: &mut ReplayContext) {
        if let Some(entity) = ctx.entities.find_or_create(self.acting_unit()) {
            entity.spell_start(stamp, self.spell_id, self.cast_id);
        }
    }

    pub fn update_go(&self, stamp: FrameStamp, ctx: &mut ReplayContext) {
        if let Some(entity) = ctx.entities.find_or_create(self.acting_unit()) {
            entity.spell_go(stamp, self.spell_id, self.cast_id);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LootResponse {
    pub owner: Guid128,
    pub loot_object: Guid128,
    pub failure_reason: u8,
    pub acquire_reason: u8,
    pub loot_method: u8,
    pub threshold: u8,
    pub coins: u32,
}

impl LootResponse {
    pub fn parse(reader: &mut PacketReader<'_>) -> Result<Self, ReadError> {
        Ok(Self {
            owner: reader.read_packed_guid128()?,
            loot_object: reader.read_packed_guid128()?,
            failure_reason: reader.read_u8()?,
            acquire_reason: reader.read_u8()?,
            loot_method: reader.read_u8()?,
            threshold: reader.read_u8()?,
            coins: reader.read_u32()?,
        })
    }

    pub fn update_state(&self, stamp: FrameStamp, ctx: &mut ReplayContext) {
        if let Some(entity) = ctx.entities.find_or_create(self.owner) {
            entity.loot_response(
                stamp,
                LootSummary {
                    loot_object: self.loot_object,
                    failure_reason: self.failure_reason,
                    acquire_reason: self.acquire_reason,
                    loot_method: self.loot_method,
                    threshold: self.threshold,
                    coins: self.coins,
                },
            );
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonsterMove {
    pub mover: Guid128,
    pub position: Position,
    pub spline_id: u32,
    pub face: u8,
    pub orientation: Option<f32>,
}

impl MonsterMove {
    pub fn parse(reader: &mut PacketReader<'_>) -> Result<Self, ReadError> {
        let mover = reader.read_packed_guid128()?;
        let position = Position::new(reader.read_f32()?, reader.read_f32()?, reader.read_f32()?);
        let spline_id = reader.read_u32()?;
        let face = reader.read_u8()?;
        let orientation = if face == FACING_ANGLE {
            Some(reader.read_f32()?)
        } else {
            None
        };

        Ok(Self {
            mover,
            position,
            spline_id,
            face,
            orientation,
        })
    }

    pub fn update_state(&self, stamp: FrameStamp, ctx: &mut ReplayContext) {
        if let Some(entity) = ctx.entities.find_or_create(self.mover) {
            let flags = entity.state().movement_flags_raw();
            entity.move_to(stamp, self.position, self.orientation, flags);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryCreatureResponse {
    pub entry: u32,
    pub name: Option<String>,
}

impl QueryCreatureResponse {
    pub fn parse(reader: &mut PacketReader<'_>) -> Result<Self, ReadError> {
        let entry = reader.read_u32()?;
        let name = if reader.read_bit()? {
            let len = reader.read_bits(11)? as usize;
            Some(reader.read_string(len)?)
        } else {
            None
        };
        Ok(Self { entry, name })
    }

    pub fn update_state(&self, _stamp: FrameStamp, ctx: &mut ReplayContext) {
        match &self.name {
            Some(name) => ctx.entities.set_creature_name(self.entry, name),
            None => trace!("no creature data for entry {}", self.entry),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryPlayerNameResponse {
    pub result: u8,
    pub guid: Guid128,
    pub name: Option<String>,
}

impl QueryPlayerNameResponse {
    pub fn parse(reader: &mut PacketReader<'_>) -> Result<Self, ReadError> {
        let result = reader.read_u8()?;
        let guid = reader.read_packed_guid128()?;
        let name = if result == 0 {
            let len = reader.read_bits(6)? as usize;
            Some(reader.read_string(len)?)
        } else {
            None
        };
        Ok(Self { result, guid, name })
    }

    pub fn update_state(&self, _stamp: FrameStamp, ctx: &mut ReplayContext) {
        if let Some(name) = &self.name {
            ctx.entities.set_player_name(self.guid, name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{CombatRole, LogEntry, LogEntryKind};
    use crate::types::CaptureTime;

    fn stamp(index: u64, seconds: f64) -> FrameStamp {
        FrameStamp {
            index,
            time: CaptureTime(seconds),
        }
    }

    #[test]
    fn attack_stop_with_death() {
        let a = Guid128::creature(1234, 1);
        let b = Guid128::player(1, 77);
        let mut data = a.to_packed();
        data.extend(b.to_packed());
        data.push(0x80);

        let mut reader = PacketReader::new(&data);
        let stop = AttackStop::parse(&mut reader).unwrap();
        assert!(stop.attacker_dead);

        let mut ctx = ReplayContext::new();
        stop.update_state(stamp(0, 1.0), &mut ctx);

        let attacker = ctx.entities().find(&a).unwrap();
        assert!(attacker.state().is_dead());
        assert_eq!(attacker.log().of_kind(LogEntryKind::AttackStop).count(), 1);
        let victim = ctx.entities().find(&b).unwrap();
        assert_eq!(
            victim.log().last().unwrap().entry,
            LogEntry::AttackStop {
                role: CombatRole::Victim,
                opponent: Some(a)
            }
        );
        assert!(ctx.combat().sessions().iter().all(|s| !s.is_open()));
    }

    #[test]
    fn chat_strings_follow_bit_lengths() {
        let sender = Guid128::player(1, 5);
        let mut data = vec![1, 0];
        data.extend(sender.to_packed());
        data.extend(Guid128::EMPTY.to_packed());
        // 11 bits = 3, 7 bits = 0, 12 bits = 2, then 2 pad bits
        let bits: u32 = (3 << 21) | (2 << 2);
        data.extend_from_slice(&bits.to_be_bytes());
        data.extend_from_slice(b"Bobhi");

        let mut reader = PacketReader::new(&data);
        let chat = ChatMessage::parse(&mut reader).unwrap();
        assert_eq!(chat.sender_name, "Bob");
        assert_eq!(chat.channel, None);
        assert_eq!(chat.message, "hi");
        assert!(reader.is_empty());
    }

    #[test]
    fn monster_move_reads_angle_only_for_facing_angle() {
        let mover = Guid128::creature(3, 3);
        let mut data = mover.to_packed();
        for v in [1.0f32, 2.0, 3.0] {
            data.extend_from_slice(&v.to_le_bytes());
        }
        data.extend_from_slice(&9u32.to_le_bytes());
        data.push(FACING_ANGLE);
        data.extend_from_slice(&1.5f32.to_le_bytes());

        let mut reader = PacketReader::new(&data);
        let mv = MonsterMove::parse(&mut reader).unwrap();
        assert_eq!(mv.orientation, Some(1.5));

        let mut ctx = ReplayContext::new();
        mv.update_state(stamp(0, 0.0), &mut ctx);
        let state = ctx.entities().find(&mover).unwrap().state();
        assert_eq!(state.position(), Some(Position::new(1.0, 2.0, 3.0)));
    }

    #[test]
    fn truncated_emote_fails() {
        let mut data = Guid128::creature(1, 1).to_packed();
        data.push(1);
        let mut reader = PacketReader::new(&data);
        assert!(Emote::parse(&mut reader).is_err());
    }
}
