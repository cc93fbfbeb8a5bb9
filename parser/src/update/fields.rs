use serde::Serialize;
use std::fmt;
use tracing::warn;

use crate::definitions::{Definitions, FieldDef, FieldSchema, FieldType};
use crate::error::{ReadError, UpdateBlockError};
use crate::guid::Guid128;
use crate::reader::PacketReader;
use crate::types::ClientBuild;

/// A decoded update field value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Int(i64),
    Uint(u64),
    Float(f32),
    Guid(Guid128),
    Bits(u32),
}

impl FieldValue {
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            FieldValue::Int(v) => u64::try_from(*v).ok(),
            FieldValue::Uint(v) => Some(*v),
            FieldValue::Bits(v) => Some(u64::from(*v)),
            FieldValue::Float(_) | FieldValue::Guid(_) => None,
        }
    }

    /// `None` when the value does not fit.
    pub fn as_u32(&self) -> Option<u32> {
        self.as_u64().and_then(|v| u32::try_from(v).ok())
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Int(v) => Some(*v),
            FieldValue::Uint(v) => i64::try_from(*v).ok(),
            FieldValue::Bits(v) => Some(i64::from(*v)),
            FieldValue::Float(_) | FieldValue::Guid(_) => None,
        }
    }

    pub fn as_f32(&self) -> Option<f32> {
        match self {
            FieldValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_guid(&self) -> Option<Guid128> {
        match self {
            FieldValue::Guid(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Int(v) => write!(f, "{v}"),
            FieldValue::Uint(v) => write!(f, "{v}"),
            FieldValue::Float(v) => write!(f, "{v}"),
            FieldValue::Guid(v) => write!(f, "{v}"),
            FieldValue::Bits(v) => write!(f, "{v:#010x}"),
        }
    }
}

/// One field of an update block, resolved through the schema.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldUpdate {
    pub index: u16,
    pub name: String,
    pub value: FieldValue,
}

/// Field values of one block plus the indices that were skipped via the fallback table.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MaskedValues {
    pub values: Vec<FieldUpdate>,
    pub skipped: Vec<u16>,
}

/// Reads the `u8` bit count and mask bytes, returning the set bit indices in ascending order.
pub fn read_update_mask(reader: &mut PacketReader<'_>) -> Result<Vec<u16>, ReadError> {
    let bit_count = reader.read_u8()? as usize;
    let mask = reader.read_bytes(bit_count.div_ceil(8))?;
    Ok((0..bit_count)
        .filter(|bit| mask[bit / 8] & (1 << (bit % 8)) != 0)
        .map(|bit| bit as u16)
        .collect())
}

pub fn read_field_value(
    reader: &mut PacketReader<'_>,
    field: &FieldDef,
) -> Result<FieldValue, UpdateBlockError> {
    let value = match (field.ty, field.width) {
        (FieldType::Int, 1) => FieldValue::Int(i64::from(reader.read_i8()?)),
        (FieldType::Int, 2) => FieldValue::Int(i64::from(reader.read_i16()?)),
        (FieldType::Int, 4) => FieldValue::Int(i64::from(reader.read_i32()?)),
        (FieldType::Int, 8) => FieldValue::Int(reader.read_i64()?),
        (FieldType::Uint, 1) => FieldValue::Uint(u64::from(reader.read_u8()?)),
        (FieldType::Uint, 2) => FieldValue::Uint(u64::from(reader.read_u16()?)),
        (FieldType::Uint, 4) => FieldValue::Uint(u64::from(reader.read_u32()?)),
        (FieldType::Uint, 8) => FieldValue::Uint(reader.read_u64()?),
        (FieldType::Float, 4) => FieldValue::Float(reader.read_f32()?),
        (FieldType::Guid, 16) => FieldValue::Guid(reader.read_guid128()?),
        (FieldType::Bitfield, 1) => FieldValue::Bits(u32::from(reader.read_u8()?)),
        (FieldType::Bitfield, 2) => FieldValue::Bits(u32::from(reader.read_u16()?)),
        (FieldType::Bitfield, 4) => FieldValue::Bits(reader.read_u32()?),
        (_, width) => {
            return Err(UpdateBlockError::UnsupportedFieldWidth {
                name: field.name.clone(),
                width,
            });
        }
    };
    Ok(value)
}

/// Decodes every field marked in the update mask.
///
/// An index missing from `schema` is skipped using the fallback table when the fallback knows
/// its width. Otherwise the block cannot be resynchronized and the whole block fails.
pub fn read_masked_values<D: Definitions + ?Sized>(
    reader: &mut PacketReader<'_>,
    schema: &FieldSchema,
    build: ClientBuild,
    definitions: &D,
) -> Result<MaskedValues, UpdateBlockError> {
    let indices = read_update_mask(reader)?;
    let mut out = MaskedValues {
        values: Vec::with_capacity(indices.len()),
        skipped: Vec::new(),
    };

    for index in indices {
        if let Some(field) = schema.field(index) {
            let value = read_field_value(reader, field)?;
            out.values.push(FieldUpdate {
                index,
                name: field.name.clone(),
                value,
            });
        } else if let Some(fallback) = definitions.fallback_field(build, index) {
            warn!(
                "field {index} ({}) is not valid for this object, skipping {} bytes",
                fallback.name, fallback.width
            );
            reader.skip(fallback.width as usize)?;
            out.skipped.push(index);
        } else {
            return Err(UpdateBlockError::UnknownField { index });
        }
    }

    Ok(out)
}
