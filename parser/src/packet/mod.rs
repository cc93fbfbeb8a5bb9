//! Decoded frames and their payloads.

mod cmsg;
mod smsg;

pub use cmsg::*;
pub use smsg::*;

use kinded::Kinded;
use serde::Serialize;
use tracing::trace;

use crate::definitions::Definitions;
use crate::error::ReadError;
use crate::guid::Guid128;
use crate::opcodes::{Decoder, Opcode};
use crate::reader::PacketReader;
use crate::state::ReplayContext;
use crate::types::{CaptureTime, ClientBuild, Direction, FrameStamp};
use crate::update::UpdateObjectPacket;

#[derive(Debug, Clone, Serialize, Kinded)]
#[kinded(derive(Serialize))]
pub enum FramePayload {
    AttackStart(AttackStart),
    AttackStop(AttackStop),
    AuthChallenge(AuthChallenge),
    Chat(ChatMessage),
    Emote(Emote),
    LootResponse(LootResponse),
    OnMonsterMove(MonsterMove),
    QueryCreatureResponse(QueryCreatureResponse),
    QueryPlayerNameResponse(QueryPlayerNameResponse),
    SpellGo(SpellCast),
    SpellStart(SpellCast),
    TextEmote(TextEmote),
    UpdateObject(UpdateObjectPacket),
    AuthSession(AuthSession),
    PlayerLogin(PlayerLogin),
    /// No decoder for this opcode. The raw bytes are on the frame.
    Unhandled,
    /// The frame had no valid direction.
    Invalid,
}

/// An identifier a payload mentions, and in what capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Reference {
    pub role: &'static str,
    pub guid: Guid128,
}

impl FramePayload {
    pub fn decode<D: Definitions + ?Sized>(
        decoder: Decoder,
        data: &[u8],
        build: ClientBuild,
        definitions: &D,
    ) -> Result<FramePayload, ReadError> {
        let opcode = match decoder {
            Decoder::Known { opcode, .. } => opcode,
            Decoder::Unhandled => return Ok(FramePayload::Unhandled),
            Decoder::Invalid => return Ok(FramePayload::Invalid),
        };

        let reader = &mut PacketReader::new(data);
        let payload = match opcode {
            Opcode::AttackStart => FramePayload::AttackStart(AttackStart::parse(reader)?),
            Opcode::AttackStop => FramePayload::AttackStop(AttackStop::parse(reader)?),
            Opcode::AuthChallenge => FramePayload::AuthChallenge(AuthChallenge::parse(reader)?),
            Opcode::Chat => FramePayload::Chat(ChatMessage::parse(reader)?),
            Opcode::Emote => FramePayload::Emote(Emote::parse(reader)?),
            Opcode::LootResponse => FramePayload::LootResponse(LootResponse::parse(reader)?),
            Opcode::OnMonsterMove => FramePayload::OnMonsterMove(MonsterMove::parse(reader)?),
            Opcode::QueryCreatureResponse => {
                FramePayload::QueryCreatureResponse(QueryCreatureResponse::parse(reader)?)
            }
            Opcode::QueryPlayerNameResponse => {
                FramePayload::QueryPlayerNameResponse(QueryPlayerNameResponse::parse(reader)?)
            }
            Opcode::SpellGo => FramePayload::SpellGo(SpellCast::parse(reader)?),
            Opcode::SpellStart => FramePayload::SpellStart(SpellCast::parse(reader)?),
            Opcode::TextEmote => FramePayload::TextEmote(TextEmote::parse(reader)?),
            Opcode::UpdateObject => {
                FramePayload::UpdateObject(UpdateObjectPacket::parse(reader, build, definitions)?)
            }
            Opcode::AuthSession => FramePayload::AuthSession(AuthSession::parse(reader)?),
            Opcode::PlayerLogin => FramePayload::PlayerLogin(PlayerLogin::parse(reader)?),
            Opcode::Unhandled => FramePayload::Unhandled,
        };

        if !reader.is_empty() {
            trace!("{} left {} trailing bytes", opcode, reader.remaining());
        }
        Ok(payload)
    }

    /// Applies the payload's state transitions. Runs exactly once per decoded frame.
    pub fn update_state(&self, stamp: FrameStamp, ctx: &mut ReplayContext) {
        match self {
            FramePayload::AttackStart(p) => p.update_state(stamp, ctx),
            FramePayload::AttackStop(p) => p.update_state(stamp, ctx),
            FramePayload::AuthChallenge(p) => p.update_state(stamp, ctx),
            FramePayload::Chat(p) => p.update_state(stamp, ctx),
            FramePayload::Emote(p) => p.update_state(stamp, ctx),
            FramePayload::LootResponse(p) => p.update_state(stamp, ctx),
            FramePayload::OnMonsterMove(p) => p.update_state(stamp, ctx),
            FramePayload::QueryCreatureResponse(p) => p.update_state(stamp, ctx),
            FramePayload::QueryPlayerNameResponse(p) => p.update_state(stamp, ctx),
            FramePayload::SpellGo(p) => p.update_go(stamp, ctx),
            FramePayload::SpellStart(p) => p.update_start(stamp, ctx),
            FramePayload::TextEmote(p) => p.update_state(stamp, ctx),
            FramePayload::UpdateObject(p) => p.update_state(stamp, ctx),
            FramePayload::AuthSession(p) => p.update_state(stamp, ctx),
            FramePayload::PlayerLogin(p) => p.update_state(stamp, ctx),
            FramePayload::Unhandled | FramePayload::Invalid => {}
        }
    }

    /// Every non-empty identifier the payload mentions.
    pub fn references(&self) -> Vec<Reference> {
        let refs: Vec<(&'static str, Guid128)> = match self {
            FramePayload::AttackStart(p) => vec![("attacker", p.attacker), ("victim", p.victim)],
            FramePayload::AttackStop(p) => vec![("attacker", p.attacker), ("victim", p.victim)],
            FramePayload::Chat(p) => vec![("sender", p.sender), ("target", p.target)],
            FramePayload::Emote(p) => vec![("source", p.guid)],
            FramePayload::LootResponse(p) => {
                vec![("owner", p.owner), ("loot_object", p.loot_object)]
            }
            FramePayload::OnMonsterMove(p) => vec![("mover", p.mover)],
            FramePayload::QueryPlayerNameResponse(p) => vec![("player", p.guid)],
            FramePayload::SpellGo(p) | FramePayload::SpellStart(p) => {
                vec![("caster", p.caster), ("caster_unit", p.caster_unit)]
            }
            FramePayload::TextEmote(p) => vec![("source", p.source), ("target", p.target)],
            FramePayload::UpdateObject(p) => p.guids().into_iter().map(|g| ("object", g)).collect(),
            FramePayload::PlayerLogin(p) => vec![("player", p.guid)],
            FramePayload::AuthChallenge(_)
            | FramePayload::QueryCreatureResponse(_)
            | FramePayload::AuthSession(_)
            | FramePayload::Unhandled
            | FramePayload::Invalid => vec![],
        };
        refs.into_iter()
            .filter(|(_, guid)| !guid.is_empty())
            .map(|(role, guid)| Reference { role, guid })
            .collect()
    }
}

/// One decoded frame. Immutable once handed out by the capture.
#[derive(Debug, Clone, Serialize)]
pub struct Frame {
    /// Position in the stream, starting at 0 after open or rewind.
    pub index: u64,
    pub direction: Option<Direction>,
    pub opcode: u32,
    pub decoder: Decoder,
    pub time: CaptureTime,
    /// Seconds since the capture's start tick, for formats that carry ticks.
    pub elapsed: Option<f64>,
    pub connection_index: Option<i32>,
    pub tick: Option<u32>,
    #[serde(skip)]
    pub data: Vec<u8>,
    pub payload: FramePayload,
}

impl Frame {
    pub fn stamp(&self) -> FrameStamp {
        FrameStamp {
            index: self.index,
            time: self.time,
        }
    }

    /// Decoder name, e.g. `AttackStop`, `Unhandled` or `Invalid`.
    pub fn name(&self) -> &'static str {
        self.decoder.name()
    }

    pub fn is_unhandled(&self) -> bool {
        matches!(self.payload, FramePayload::Unhandled)
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self.payload, FramePayload::Invalid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definitions::BuiltinDefinitions;

    const BUILD: ClientBuild = ClientBuild(20253);

    fn known(opcode: Opcode) -> Decoder {
        Decoder::Known {
            direction: Direction::Smsg,
            opcode,
        }
    }

    #[test]
    fn placeholders_skip_the_payload() {
        let defs = BuiltinDefinitions::load().unwrap();
        let payload = FramePayload::decode(Decoder::Unhandled, &[1, 2, 3], BUILD, &defs).unwrap();
        assert_eq!(payload.kind(), FramePayloadKind::Unhandled);
        let payload = FramePayload::decode(Decoder::Invalid, &[], BUILD, &defs).unwrap();
        assert_eq!(payload.kind(), FramePayloadKind::Invalid);
    }

    #[test]
    fn short_payload_is_an_error() {
        let defs = BuiltinDefinitions::load().unwrap();
        assert!(FramePayload::decode(known(Opcode::Emote), &[0, 0], BUILD, &defs).is_err());
    }

    #[test]
    fn references_skip_empty_identifiers() {
        let defs = BuiltinDefinitions::load().unwrap();
        let source = Guid128::creature(12, 1);
        let mut data = source.to_packed();
        data.extend(Guid128::EMPTY.to_packed());
        data.extend_from_slice(&[0; 8]);
        data.extend(Guid128::EMPTY.to_packed());

        let payload = FramePayload::decode(known(Opcode::TextEmote), &data, BUILD, &defs).unwrap();
        assert_eq!(
            payload.references(),
            vec![Reference {
                role: "source",
                guid: source
            }]
        );
    }
}
