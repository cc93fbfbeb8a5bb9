use serde::Serialize;

use crate::error::ReadError;
use crate::guid::Guid128;
use crate::reader::PacketReader;
use crate::types::Position;

#[allow(dead_code)]
mod flags {
    use modular_bitfield::prelude::*;

    /// The client's 32-bit movement state word.
    #[bitfield]
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MovementFlags {
        pub forward: bool,
        pub backward: bool,
        pub strafe_left: bool,
        pub strafe_right: bool,
        pub left: bool,
        pub right: bool,
        pub pitch_up: bool,
        pub pitch_down: bool,
        pub walking: bool,
        pub disable_gravity: bool,
        pub root: bool,
        pub falling: bool,
        pub falling_far: bool,
        pub pending_stop: bool,
        pub pending_strafe_stop: bool,
        pub pending_forward: bool,
        pub pending_backward: bool,
        pub pending_strafe_left: bool,
        pub pending_strafe_right: bool,
        pub pending_root: bool,
        pub swimming: bool,
        pub ascending: bool,
        pub descending: bool,
        pub can_fly: bool,
        pub flying: bool,
        pub spline_elevation: bool,
        pub water_walking: bool,
        pub falling_slow: bool,
        pub hover: bool,
        pub disable_collision: bool,
        #[skip]
        __: B2,
    }
}
pub use flags::MovementFlags;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransportInfo {
    pub guid: Guid128,
    pub offset: Position,
    pub orientation: f32,
    pub seat: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FallDirection {
    pub sin: f32,
    pub cos: f32,
    pub horizontal_speed: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FallInfo {
    pub time: u32,
    pub vertical_speed: f32,
    pub direction: Option<FallDirection>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SplineInfo {
    pub id: u32,
    pub destination: Position,
}

/// Movement section of a create or movement update block.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MovementInfo {
    pub flags: u32,
    pub position: Position,
    pub orientation: Option<f32>,
    pub transport: Option<TransportInfo>,
    pub fall: Option<FallInfo>,
    pub spline: Option<SplineInfo>,
    pub speeds: Vec<f32>,
}

fn read_position(reader: &mut PacketReader<'_>) -> Result<Position, ReadError> {
    Ok(Position::new(
        reader.read_f32()?,
        reader.read_f32()?,
        reader.read_f32()?,
    ))
}

impl MovementInfo {
    pub fn movement_flags(&self) -> MovementFlags {
        MovementFlags::from_bytes(self.flags.to_le_bytes())
    }

    /// `speed_count` is build-specific and comes from the definitions.
    pub fn read(reader: &mut PacketReader<'_>, speed_count: usize) -> Result<Self, ReadError> {
        let has_transport = reader.read_bit()?;
        let has_fall = reader.read_bit()?;
        let has_spline = reader.read_bit()?;
        let has_orientation = reader.read_bit()?;
        let has_speeds = reader.read_bit()?;

        let flags = reader.read_u32()?;
        let position = read_position(reader)?;

        let orientation = if has_orientation {
            Some(reader.read_f32()?)
        } else {
            None
        };

        let transport = if has_transport {
            Some(TransportInfo {
                guid: reader.read_packed_guid128()?,
                offset: read_position(reader)?,
                orientation: reader.read_f32()?,
                seat: reader.read_u8()?,
            })
        } else {
            None
        };

        let fall = if has_fall {
            let time = reader.read_u32()?;
            let vertical_speed = reader.read_f32()?;
            let direction = if reader.read_bit()? {
                Some(FallDirection {
                    sin: reader.read_f32()?,
                    cos: reader.read_f32()?,
                    horizontal_speed: reader.read_f32()?,
                })
            } else {
                None
            };
            Some(FallInfo {
                time,
                vertical_speed,
                direction,
            })
        } else {
            None
        };

        let spline = if has_spline {
            Some(SplineInfo {
                id: reader.read_u32()?,
                destination: read_position(reader)?,
            })
        } else {
            None
        };

        let speeds = if has_speeds {
            (0..speed_count)
                .map(|_| reader.read_f32())
                .collect::<Result<Vec<_>, _>>()?
        } else {
            Vec::new()
        };

        Ok(MovementInfo {
            flags,
            position,
            orientation,
            transport,
            fall,
            spline,
            speeds,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_f32s(out: &mut Vec<u8>, values: &[f32]) {
        for v in values {
            out.extend_from_slice(&v.to_le_bytes());
        }
    }

    #[test]
    fn orientation_and_speeds() {
        // orientation + speeds bits
        let mut data = vec![0b0001_1000];
        data.extend_from_slice(&0x0000_0101u32.to_le_bytes());
        push_f32s(&mut data, &[1.0, 2.0, 3.0, 0.5, 7.0, 4.5]);

        let mut reader = PacketReader::new(&data);
        let info = MovementInfo::read(&mut reader, 2).unwrap();
        assert_eq!(info.position, Position::new(1.0, 2.0, 3.0));
        assert_eq!(info.orientation, Some(0.5));
        assert_eq!(info.speeds, vec![7.0, 4.5]);
        assert!(info.transport.is_none());
        assert!(reader.is_empty());

        let flags = info.movement_flags();
        assert!(flags.forward());
        assert!(flags.walking());
        assert!(!flags.backward());
    }

    #[test]
    fn fall_without_direction() {
        let mut data = vec![0b0100_0000];
        data.extend_from_slice(&0u32.to_le_bytes());
        push_f32s(&mut data, &[0.0, 0.0, 0.0]);
        data.extend_from_slice(&250u32.to_le_bytes());
        push_f32s(&mut data, &[-9.5]);
        data.push(0);

        let mut reader = PacketReader::new(&data);
        let info = MovementInfo::read(&mut reader, 9).unwrap();
        assert_eq!(
            info.fall,
            Some(FallInfo {
                time: 250,
                vertical_speed: -9.5,
                direction: None
            })
        );
    }

    #[test]
    fn truncated_block_fails() {
        let data = [0u8, 1, 0];
        let mut reader = PacketReader::new(&data);
        assert!(MovementInfo::read(&mut reader, 9).is_err());
    }
}
