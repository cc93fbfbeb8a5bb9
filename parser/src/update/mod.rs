//! Reconstruction of object state from update-object frames.
//!
//! An update-object payload is a list of length-delimited blocks. A block that cannot be
//! reconstructed (unknown field, truncated body) is recorded with its error and skipped as a
//! whole; the remaining blocks of the frame are still applied.

mod fields;
mod movement;

pub use fields::*;
pub use movement::*;

use serde::{Serialize, Serializer};
use std::fmt::Display;
use tracing::{debug, trace, warn};

use crate::definitions::{Definitions, FieldSchema};
use crate::error::{ReadError, UpdateBlockError};
use crate::guid::Guid128;
use crate::reader::PacketReader;
use crate::state::{EntityKind, ReplayContext};
use crate::types::{ClientBuild, FrameStamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UpdateType {
    Values,
    Movement,
    CreateObject,
    CreateObject2,
    OutOfRange,
}

impl UpdateType {
    pub fn from_raw(raw: u8) -> Option<UpdateType> {
        match raw {
            0 => Some(UpdateType::Values),
            1 => Some(UpdateType::Movement),
            2 => Some(UpdateType::CreateObject),
            3 => Some(UpdateType::CreateObject2),
            4 => Some(UpdateType::OutOfRange),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum BlockBody {
    Values {
        guid: Guid128,
        #[serde(flatten)]
        values: MaskedValues,
    },
    Movement {
        guid: Guid128,
        movement: MovementInfo,
    },
    Create {
        guid: Guid128,
        object_type: u8,
        movement: MovementInfo,
        #[serde(flatten)]
        values: MaskedValues,
    },
    OutOfRange {
        guids: Vec<Guid128>,
    },
}

fn serialize_display<T: Display, S: Serializer>(value: &T, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome")]
pub enum BlockOutcome {
    Decoded(BlockBody),
    Failed {
        guid: Option<Guid128>,
        #[serde(serialize_with = "serialize_display")]
        error: UpdateBlockError,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdateBlock {
    pub index: usize,
    pub raw_type: u8,
    pub outcome: BlockOutcome,
}

impl UpdateBlock {
    pub fn error(&self) -> Option<&UpdateBlockError> {
        match &self.outcome {
            BlockOutcome::Failed { error, .. } => Some(error),
            BlockOutcome::Decoded(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdateObjectPacket {
    pub map_id: u16,
    pub blocks: Vec<UpdateBlock>,
}

struct BlockFailure {
    guid: Option<Guid128>,
    error: UpdateBlockError,
}

fn schema_for<'d, D: Definitions + ?Sized>(
    definitions: &'d D,
    build: ClientBuild,
    guid: &Guid128,
) -> Result<&'d FieldSchema, UpdateBlockError> {
    let kind = EntityKind::of(guid).ok_or(UpdateBlockError::UntrackedObject {
        guid_type: guid.guid_type(),
    })?;
    definitions
        .schema_for(build, kind)
        .ok_or(UpdateBlockError::MissingSchema { kind })
}

fn failure(guid: Option<Guid128>, error: impl Into<UpdateBlockError>) -> BlockFailure {
    BlockFailure {
        guid,
        error: error.into(),
    }
}

fn read_object_body<D: Definitions + ?Sized>(
    reader: &mut PacketReader<'_>,
    update_type: UpdateType,
    guid: Guid128,
    build: ClientBuild,
    definitions: &D,
) -> Result<BlockBody, UpdateBlockError> {
    let speed_count = definitions.movement_speed_count(build);
    let body = match update_type {
        UpdateType::Values => {
            let schema = schema_for(definitions, build, &guid)?;
            BlockBody::Values {
                guid,
                values: read_masked_values(reader, schema, build, definitions)?,
            }
        }
        UpdateType::Movement => BlockBody::Movement {
            guid,
            movement: MovementInfo::read(reader, speed_count)?,
        },
        _ => {
            let object_type = reader.read_u8()?;
            let movement = MovementInfo::read(reader, speed_count)?;
            let schema = schema_for(definitions, build, &guid)?;
            BlockBody::Create {
                guid,
                object_type,
                movement,
                values: read_masked_values(reader, schema, build, definitions)?,
            }
        }
    };
    Ok(body)
}

fn read_out_of_range(reader: &mut PacketReader<'_>) -> Result<BlockBody, ReadError> {
    let count = reader.read_u32()?;
    let guids = (0..count)
        .map(|_| reader.read_packed_guid128())
        .collect::<Result<Vec<_>, _>>()?;
    Ok(BlockBody::OutOfRange { guids })
}

fn parse_block<D: Definitions + ?Sized>(
    raw_type: u8,
    body: &[u8],
    build: ClientBuild,
    definitions: &D,
) -> Result<BlockBody, BlockFailure> {
    let update_type = UpdateType::from_raw(raw_type)
        .ok_or_else(|| failure(None, UpdateBlockError::UnknownUpdateType(raw_type)))?;
    let mut reader = PacketReader::new(body);

    match update_type {
        UpdateType::OutOfRange => read_out_of_range(&mut reader).map_err(|e| failure(None, e)),
        update_type => {
            let guid = reader
                .read_packed_guid128()
                .map_err(|e| failure(None, e))?;
            read_object_body(&mut reader, update_type, guid, build, definitions)
                .map_err(|error| failure(Some(guid), error))
        }
    }
}

impl UpdateObjectPacket {
    /// Only a truncated block envelope fails the whole packet. Errors inside a block body are
    /// recorded on that block.
    pub fn parse<D: Definitions + ?Sized>(
        reader: &mut PacketReader<'_>,
        build: ClientBuild,
        definitions: &D,
    ) -> Result<Self, ReadError> {
        let block_count = reader.read_u32()?;
        let map_id = reader.read_u16()?;

        let mut blocks = Vec::with_capacity(block_count.min(64) as usize);
        for index in 0..block_count as usize {
            let raw_type = reader.read_u8()?;
            let len = reader.read_u32()? as usize;
            let body = reader.read_bytes(len)?;

            let outcome = match parse_block(raw_type, body, build, definitions) {
                Ok(body) => BlockOutcome::Decoded(body),
                Err(BlockFailure { guid, error }) => {
                    match &error {
                        UpdateBlockError::UntrackedObject { .. } => {
                            debug!("update block {index} skipped: {error}")
                        }
                        _ => warn!("update block {index} could not be reconstructed: {error}"),
                    }
                    BlockOutcome::Failed { guid, error }
                }
            };
            blocks.push(UpdateBlock {
                index,
                raw_type,
                outcome,
            });
        }

        Ok(UpdateObjectPacket { map_id, blocks })
    }

    pub fn failed_blocks(&self) -> impl Iterator<Item = &UpdateBlock> + '_ {
        self.blocks.iter().filter(|block| block.error().is_some())
    }

    /// Identifiers of every block, decoded or not.
    pub fn guids(&self) -> Vec<Guid128> {
        let mut out = Vec::new();
        for block in &self.blocks {
            match &block.outcome {
                BlockOutcome::Decoded(BlockBody::OutOfRange { guids }) => out.extend(guids),
                BlockOutcome::Decoded(
                    BlockBody::Values { guid, .. }
                    | BlockBody::Movement { guid, .. }
                    | BlockBody::Create { guid, .. },
                ) => out.push(*guid),
                BlockOutcome::Failed {
                    guid: Some(guid), ..
                } => out.push(*guid),
                BlockOutcome::Failed { guid: None, .. } => {}
            }
        }
        out
    }

    pub fn update_state(&self, stamp: FrameStamp, ctx: &mut ReplayContext) {
        ctx.session.map_id = Some(self.map_id);

        for block in &self.blocks {
            let BlockOutcome::Decoded(body) = &block.outcome else {
                continue;
            };
            match body {
                BlockBody::Values { guid, values } => {
                    if let Some(entity) = ctx.entities.find_or_create(*guid) {
                        for update in &values.values {
                            entity.apply_field_update(stamp, &update.name, update.value.clone());
                        }
                    }
                }
                BlockBody::Movement { guid, movement } => {
                    if let Some(entity) = ctx.entities.find_or_create(*guid) {
                        entity.move_to(
                            stamp,
                            movement.position,
                            movement.orientation,
                            movement.flags,
                        );
                    }
                }
                BlockBody::Create {
                    guid,
                    movement,
                    values,
                    ..
                } => {
                    if let Some(entity) = ctx.entities.find_or_create(*guid) {
                        entity.spawn(stamp);
                        entity.move_to(
                            stamp,
                            movement.position,
                            movement.orientation,
                            movement.flags,
                        );
                        for update in &values.values {
                            entity.apply_field_update(stamp, &update.name, update.value.clone());
                        }
                    }
                }
                BlockBody::OutOfRange { guids } => {
                    for guid in guids {
                        if let Some(entity) = ctx.entities.find_or_create(*guid) {
                            entity.despawn(stamp);
                        }
                    }
                }
            }
        }
        trace!("applied {} update blocks", self.blocks.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definitions::BuiltinDefinitions;

    const BUILD: ClientBuild = ClientBuild(20253);

    fn block(raw_type: u8, body: &[u8]) -> Vec<u8> {
        let mut out = vec![raw_type];
        out.extend_from_slice(&(body.len() as u32).to_le_bytes());
        out.extend_from_slice(body);
        out
    }

    fn packet(blocks: &[Vec<u8>]) -> Vec<u8> {
        let mut out = (blocks.len() as u32).to_le_bytes().to_vec();
        out.extend_from_slice(&1u16.to_le_bytes());
        for b in blocks {
            out.extend_from_slice(b);
        }
        out
    }

    fn health_values(guid: Guid128, health: u32) -> Vec<u8> {
        let mut body = guid.to_packed();
        // 11 mask bits, only bit 10 (UNIT_FIELD_HEALTH) set
        body.extend_from_slice(&[11, 0, 0b0000_0100]);
        body.extend_from_slice(&health.to_le_bytes());
        body
    }

    #[test]
    fn values_block_resolves_field_names() {
        let defs = BuiltinDefinitions::load().unwrap();
        let guid = Guid128::creature(1234, 1);
        let data = packet(&[block(0, &health_values(guid, 500))]);

        let mut reader = PacketReader::new(&data);
        let update = UpdateObjectPacket::parse(&mut reader, BUILD, &defs).unwrap();
        assert_eq!(update.map_id, 1);
        let BlockOutcome::Decoded(BlockBody::Values { values, .. }) = &update.blocks[0].outcome
        else {
            panic!("unexpected outcome {:?}", update.blocks[0].outcome);
        };
        assert_eq!(values.values[0].name, "UNIT_FIELD_HEALTH");
        assert_eq!(values.values[0].value, FieldValue::Uint(500));
    }

    #[test]
    fn bad_block_does_not_poison_the_next() {
        let defs = BuiltinDefinitions::load().unwrap();
        let guid = Guid128::creature(1234, 1);

        // index 200 is in no table
        let mut bad = guid.to_packed();
        let mut mask = vec![201u8];
        mask.extend(std::iter::repeat_n(0u8, 26));
        mask[1 + 200 / 8] |= 1 << (200 % 8);
        bad.extend_from_slice(&mask);
        bad.extend_from_slice(&[0xAA; 4]);

        let data = packet(&[block(0, &bad), block(0, &health_values(guid, 7))]);
        let mut reader = PacketReader::new(&data);
        let update = UpdateObjectPacket::parse(&mut reader, BUILD, &defs).unwrap();

        assert_eq!(
            update.blocks[0].error(),
            Some(&UpdateBlockError::UnknownField { index: 200 })
        );
        assert!(update.blocks[1].error().is_none());
        assert_eq!(update.failed_blocks().count(), 1);
        assert_eq!(update.guids(), vec![guid, guid]);
    }

    #[test]
    fn fallback_width_skips_foreign_fields() {
        let defs = BuiltinDefinitions::load().unwrap();
        let guid = Guid128::creature(1234, 1);
        let mut body = guid.to_packed();
        // bits 10 (health) and 28 (PLAYER_XP, not a creature field)
        body.extend_from_slice(&[29, 0, 0b0000_0100, 0, 0b0001_0000]);
        body.extend_from_slice(&9u32.to_le_bytes());
        body.extend_from_slice(&[0xFF; 4]);

        let data = packet(&[block(0, &body)]);
        let mut reader = PacketReader::new(&data);
        let update = UpdateObjectPacket::parse(&mut reader, BUILD, &defs).unwrap();
        let BlockOutcome::Decoded(BlockBody::Values { values, .. }) = &update.blocks[0].outcome
        else {
            panic!("unexpected outcome");
        };
        assert_eq!(values.values.len(), 1);
        assert_eq!(values.skipped, vec![28]);
    }

    #[test]
    fn unknown_update_type_is_block_scoped() {
        let defs = BuiltinDefinitions::load().unwrap();
        let data = packet(&[block(9, &[1, 2, 3]), block(4, &0u32.to_le_bytes())]);
        let mut reader = PacketReader::new(&data);
        let update = UpdateObjectPacket::parse(&mut reader, BUILD, &defs).unwrap();
        assert_eq!(
            update.blocks[0].error(),
            Some(&UpdateBlockError::UnknownUpdateType(9))
        );
        assert_eq!(
            update.blocks[1].outcome,
            BlockOutcome::Decoded(BlockBody::OutOfRange { guids: vec![] })
        );
    }

    #[test]
    fn truncated_envelope_fails_the_packet() {
        let defs = BuiltinDefinitions::load().unwrap();
        let mut data = packet(&[]);
        data[0] = 1;
        data.extend_from_slice(&[0, 10, 0, 0, 0, 1]);
        let mut reader = PacketReader::new(&data);
        assert!(UpdateObjectPacket::parse(&mut reader, BUILD, &defs).is_err());
    }
}
