//! Capture bytes and output sinks for analyzer tests.

use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::Rc;

use crate::capture::PKT_MAGIC;
use crate::config::CaptureOptions;
use crate::definitions::BuiltinDefinitions;
use crate::guid::Guid128;
use crate::opcodes::Opcode;
use crate::types::{ClientBuild, Direction};
use crate::Capture;

pub(crate) const BUILD: u32 = 20490;
pub(crate) const START_TIME: u32 = 1_442_300_000;

/// A writer that can still be read after the analyzer owning a clone of it is gone.
#[derive(Clone, Default)]
pub(crate) struct SharedBuffer(Rc<RefCell<Vec<u8>>>);

impl SharedBuffer {
    pub(crate) fn lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.0.borrow())
            .lines()
            .map(str::to_string)
            .collect()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub(crate) fn smsg(opcode: Opcode) -> u32 {
    BuiltinDefinitions::load()
        .unwrap()
        .opcode_number(ClientBuild(BUILD), Direction::Smsg, opcode)
        .unwrap()
}

/// A v3.1 capture, one frame per `(tag, tick, opcode, payload)`.
pub(crate) fn capture(frames: &[(&[u8; 4], u32, u32, Vec<u8>)]) -> Capture {
    let mut bytes = PKT_MAGIC.to_vec();
    bytes.extend_from_slice(&0x301u16.to_le_bytes());
    bytes.push(b'S');
    bytes.extend_from_slice(&BUILD.to_le_bytes());
    bytes.extend_from_slice(b"enUS");
    bytes.extend_from_slice(&[0; 40]);
    bytes.extend_from_slice(&START_TIME.to_le_bytes());
    bytes.extend_from_slice(&0u32.to_le_bytes());
    bytes.extend_from_slice(&0u32.to_le_bytes());

    for (tag, tick, opcode, payload) in frames {
        bytes.extend_from_slice(*tag);
        bytes.extend_from_slice(&0i32.to_le_bytes());
        bytes.extend_from_slice(&tick.to_le_bytes());
        bytes.extend_from_slice(&0i32.to_le_bytes());
        bytes.extend_from_slice(&(payload.len() as i32 + 4).to_le_bytes());
        bytes.extend_from_slice(&opcode.to_le_bytes());
        bytes.extend_from_slice(payload);
    }

    Capture::from_bytes(bytes, CaptureOptions::default()).unwrap()
}

pub(crate) fn emote(guid: Guid128, emote_id: u32) -> Vec<u8> {
    let mut out = guid.to_packed();
    out.extend_from_slice(&emote_id.to_le_bytes());
    out
}

pub(crate) fn text_emote(source: Guid128, text_emote_id: u32, target: Guid128) -> Vec<u8> {
    let mut out = source.to_packed();
    out.extend(Guid128::EMPTY.to_packed());
    out.extend_from_slice(&text_emote_id.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend(target.to_packed());
    out
}

/// Say-type chat without a channel.
pub(crate) fn chat(sender: Guid128, sender_name: &str, message: &str) -> Vec<u8> {
    let mut out = vec![1, 0];
    out.extend(sender.to_packed());
    out.extend(Guid128::EMPTY.to_packed());
    // 11 bit name length, 7 bit channel length, 12 bit message length, 2 pad bits
    let bits: u32 = ((sender_name.len() as u32) << 21) | ((message.len() as u32) << 2);
    out.extend_from_slice(&bits.to_be_bytes());
    out.extend_from_slice(sender_name.as_bytes());
    out.extend_from_slice(message.as_bytes());
    out
}

pub(crate) fn query_creature(entry: u32, name: &str) -> Vec<u8> {
    let mut out = entry.to_le_bytes().to_vec();
    let bits: u16 = (1 << 15) | ((name.len() as u16) << 4);
    out.extend_from_slice(&bits.to_be_bytes());
    out.extend_from_slice(name.as_bytes());
    out
}
