//! Resolution of raw opcodes to decoders.
//!
//! Protocol differences between builds live entirely in [`Definitions`]; this table only
//! decides between a concrete decoder and the `Unhandled`/`Invalid` placeholders.

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString, IntoStaticStr};
use tracing::trace;

use crate::definitions::Definitions;
use crate::types::{ClientBuild, Direction};

/// Symbolic opcode names known to the definitions tables.
///
/// `Unhandled` is the explicit marker a table uses for opcodes that exist in a build but have no
/// decoder.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    IntoStaticStr,
)]
pub enum Opcode {
    // Server to client
    AttackStart,
    AttackStop,
    AuthChallenge,
    Chat,
    Emote,
    LootResponse,
    OnMonsterMove,
    QueryCreatureResponse,
    QueryPlayerNameResponse,
    SpellGo,
    SpellStart,
    TextEmote,
    UpdateObject,
    // Client to server
    AuthSession,
    PlayerLogin,

    Unhandled,
}

/// The decoder chosen for a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "decoder")]
pub enum Decoder {
    /// A concrete decoder, scoped to the direction it was looked up under.
    Known {
        direction: Direction,
        opcode: Opcode,
    },
    /// The payload is kept verbatim.
    Unhandled,
    /// The framing is visibly corrupt (no valid direction).
    Invalid,
}

impl Decoder {
    /// Name used for event filtering, e.g. `AttackStop`, `Unhandled` or `Invalid`.
    pub fn name(&self) -> &'static str {
        match self {
            Decoder::Known { opcode, .. } => (*opcode).into(),
            Decoder::Unhandled => "Unhandled",
            Decoder::Invalid => "Invalid",
        }
    }

    pub fn opcode(&self) -> Option<Opcode> {
        match self {
            Decoder::Known { opcode, .. } => Some(*opcode),
            _ => None,
        }
    }
}

pub fn resolve<D: Definitions + ?Sized>(
    definitions: &D,
    build: Option<ClientBuild>,
    direction: Option<Direction>,
    opcode: u32,
) -> Decoder {
    let Some(direction) = direction else {
        return Decoder::Invalid;
    };
    let Some(build) = build else {
        return Decoder::Unhandled;
    };

    match definitions.lookup(build, direction, opcode) {
        None | Some(Opcode::Unhandled) => {
            trace!("no decoder for {direction} opcode {opcode:#06x} in build {build}");
            Decoder::Unhandled
        }
        Some(opcode) => Decoder::Known { direction, opcode },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definitions::BuiltinDefinitions;
    use std::str::FromStr;

    #[test]
    fn names_round_trip_through_strum() {
        assert_eq!(Opcode::from_str("AttackStop").unwrap(), Opcode::AttackStop);
        assert_eq!(Opcode::UpdateObject.to_string(), "UpdateObject");
    }

    #[test]
    fn missing_direction_is_invalid() {
        let defs = BuiltinDefinitions::load().unwrap();
        assert_eq!(
            resolve(&defs, Some(ClientBuild(20253)), None, 1),
            Decoder::Invalid
        );
    }

    #[test]
    fn missing_build_or_opcode_is_unhandled() {
        let defs = BuiltinDefinitions::load().unwrap();
        assert_eq!(
            resolve(&defs, None, Some(Direction::Smsg), 1),
            Decoder::Unhandled
        );
        assert_eq!(
            resolve(&defs, Some(ClientBuild(20253)), Some(Direction::Smsg), 0xFFFF_FFF0),
            Decoder::Unhandled
        );
    }

    #[test]
    fn known_opcode_is_scoped_to_direction() {
        let defs = BuiltinDefinitions::load().unwrap();
        let build = ClientBuild(20253);
        let raw = defs
            .opcode_number(build, Direction::Smsg, Opcode::AttackStop)
            .unwrap();
        assert_eq!(
            resolve(&defs, Some(build), Some(Direction::Smsg), raw),
            Decoder::Known {
                direction: Direction::Smsg,
                opcode: Opcode::AttackStop
            }
        );
        assert_eq!(Decoder::Invalid.name(), "Invalid");
    }
}
