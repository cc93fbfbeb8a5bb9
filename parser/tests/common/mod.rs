#![allow(dead_code)]

use pkt_replays::Guid128;
use pkt_replays::capture::PKT_MAGIC;
use pkt_replays::definitions::BuiltinDefinitions;
use pkt_replays::opcodes::Opcode;
use pkt_replays::types::{ClientBuild, Direction, Position};

pub const BUILD: u32 = 20490;
/// 2015-09-15, while 20490 was live
pub const START_TIME: u32 = 1_442_300_000;
/// 2015-07-10, while 20253 was live
pub const HEADERLESS_TIME: i64 = 1_436_486_400;

pub fn opcode(direction: Direction, opcode: Opcode) -> u32 {
    BuiltinDefinitions::load()
        .unwrap()
        .opcode_number(ClientBuild(BUILD), direction, opcode)
        .unwrap()
}

pub fn smsg(op: Opcode) -> u32 {
    opcode(Direction::Smsg, op)
}

/// Assembles capture files byte by byte.
pub struct CaptureBuilder {
    bytes: Vec<u8>,
}

impl CaptureBuilder {
    pub fn v3(version: u16, build: u32, start_time: u32, start_tick: u32) -> Self {
        let mut bytes = PKT_MAGIC.to_vec();
        bytes.extend_from_slice(&version.to_le_bytes());
        bytes.push(b'S');
        bytes.extend_from_slice(&build.to_le_bytes());
        bytes.extend_from_slice(b"enUS");
        bytes.extend_from_slice(&[0x11; 40]);
        bytes.extend_from_slice(&start_time.to_le_bytes());
        bytes.extend_from_slice(&start_tick.to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes());
        Self { bytes }
    }

    pub fn v3_1() -> Self {
        Self::v3(0x301, BUILD, START_TIME, 0)
    }

    pub fn headerless() -> Self {
        Self { bytes: vec![] }
    }

    /// v3.1 frame with no extra header bytes.
    pub fn tagged(mut self, tag: &[u8; 4], tick: u32, opcode: u32, payload: &[u8]) -> Self {
        self.bytes.extend_from_slice(tag);
        self.bytes.extend_from_slice(&0i32.to_le_bytes());
        self.bytes.extend_from_slice(&tick.to_le_bytes());
        self.bytes.extend_from_slice(&0i32.to_le_bytes());
        self.bytes
            .extend_from_slice(&(payload.len() as i32 + 4).to_le_bytes());
        self.bytes.extend_from_slice(&(opcode as i32).to_le_bytes());
        self.bytes.extend_from_slice(payload);
        self
    }

    /// v3.0 frame: tag, unix time and tick, then the tagged tail.
    pub fn timed(
        mut self,
        tag: &[u8; 4],
        unix_time: u32,
        tick: u32,
        opcode: u32,
        payload: &[u8],
    ) -> Self {
        self.bytes.extend_from_slice(tag);
        self.bytes.extend_from_slice(&unix_time.to_le_bytes());
        self.bytes.extend_from_slice(&tick.to_le_bytes());
        self.bytes.extend_from_slice(&0i32.to_le_bytes());
        self.bytes
            .extend_from_slice(&(payload.len() as i32 + 4).to_le_bytes());
        self.bytes.extend_from_slice(&(opcode as i32).to_le_bytes());
        self.bytes.extend_from_slice(payload);
        self
    }

    pub fn server(self, tick: u32, op: Opcode, payload: &[u8]) -> Self {
        self.tagged(b"SMSG", tick, smsg(op), payload)
    }

    pub fn legacy(mut self, opcode: u16, direction: u8, time: i64, payload: &[u8]) -> Self {
        self.bytes.extend_from_slice(&opcode.to_le_bytes());
        self.bytes
            .extend_from_slice(&(payload.len() as i32).to_le_bytes());
        self.bytes.push(direction);
        self.bytes.extend_from_slice(&time.to_le_bytes());
        self.bytes.extend_from_slice(payload);
        self
    }

    pub fn v2(mut self, opcode: u32, time: u32, direction: u8, payload: &[u8]) -> Self {
        self.bytes.extend_from_slice(&opcode.to_le_bytes());
        self.bytes
            .extend_from_slice(&(payload.len() as i32).to_le_bytes());
        self.bytes.extend_from_slice(&time.to_le_bytes());
        self.bytes.push(direction);
        self.bytes.extend_from_slice(payload);
        self
    }

    pub fn bytes(self) -> Vec<u8> {
        self.bytes
    }
}

pub fn attack_start(attacker: Guid128, victim: Guid128) -> Vec<u8> {
    let mut out = attacker.to_packed();
    out.extend(victim.to_packed());
    out
}

pub fn attack_stop(attacker: Guid128, victim: Guid128, dead: bool) -> Vec<u8> {
    let mut out = attack_start(attacker, victim);
    out.push(if dead { 0x80 } else { 0 });
    out
}

pub fn emote(guid: Guid128, emote_id: u32) -> Vec<u8> {
    let mut out = guid.to_packed();
    out.extend_from_slice(&emote_id.to_le_bytes());
    out
}

pub fn query_creature(entry: u32, name: &str) -> Vec<u8> {
    let mut out = entry.to_le_bytes().to_vec();
    // has-data bit, then an 11 bit name length
    let bits: u16 = (1 << 15) | ((name.len() as u16) << 4);
    out.extend_from_slice(&bits.to_be_bytes());
    out.extend_from_slice(name.as_bytes());
    out
}

pub fn movement(position: Position) -> Vec<u8> {
    let mut out = vec![0];
    out.extend_from_slice(&0u32.to_le_bytes());
    for v in [position.x, position.y, position.z] {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

/// `u8 bit count` plus LSB-first mask bytes.
pub fn mask(bit_count: u8, set: &[usize]) -> Vec<u8> {
    let mut out = vec![bit_count];
    let mut bytes = vec![0u8; (bit_count as usize).div_ceil(8)];
    for bit in set {
        bytes[bit / 8] |= 1 << (bit % 8);
    }
    out.extend(bytes);
    out
}

pub fn block(update_type: u8, body: &[u8]) -> Vec<u8> {
    let mut out = vec![update_type];
    out.extend_from_slice(&(body.len() as u32).to_le_bytes());
    out.extend_from_slice(body);
    out
}

/// Create block body: guid, object type, movement, then masked values.
pub fn create(guid: Guid128, object_type: u8, position: Position, values: &[u8]) -> Vec<u8> {
    let mut out = guid.to_packed();
    out.push(object_type);
    out.extend(movement(position));
    out.extend_from_slice(values);
    out
}

pub fn out_of_range(guids: &[Guid128]) -> Vec<u8> {
    let mut out = (guids.len() as u32).to_le_bytes().to_vec();
    for guid in guids {
        out.extend(guid.to_packed());
    }
    out
}

pub fn update_object(map_id: u16, blocks: &[Vec<u8>]) -> Vec<u8> {
    let mut out = (blocks.len() as u32).to_le_bytes().to_vec();
    out.extend_from_slice(&map_id.to_le_bytes());
    for b in blocks {
        out.extend_from_slice(b);
    }
    out
}
