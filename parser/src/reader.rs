//! Sequential cursor over capture bytes.
//!
//! Byte-aligned reads are little-endian. Bit reads are MSB-first out of a buffered byte; any
//! byte-aligned read discards whatever is left of that buffered byte.

use nom::bytes::complete::{take, take_till};
use nom::number::complete::{
    le_f32, le_i8, le_i16, le_i32, le_i64, le_u8, le_u16, le_u32, le_u64,
};

use crate::error::{IResult, ReadError};

#[derive(Debug, Clone)]
pub struct PacketReader<'a> {
    data: &'a [u8],
    pos: usize,
    bit_buffer: u8,
    bits_left: u8,
}

impl<'a> PacketReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            bit_buffer: 0,
            bits_left: 0,
        }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    /// Absolute seek. Only used for rewinding, clamps to the end of the data.
    pub fn seek(&mut self, pos: usize) {
        self.pos = pos.min(self.data.len());
        self.reset_bits();
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn reset_bits(&mut self) {
        self.bit_buffer = 0;
        self.bits_left = 0;
    }

    fn end_of_stream(&self, wanted: usize) -> ReadError {
        ReadError::UnexpectedEndOfStream {
            offset: self.pos,
            wanted,
            available: self.remaining(),
        }
    }

    fn parse<O>(
        &mut self,
        wanted: usize,
        mut parser: impl FnMut(&'a [u8]) -> IResult<'a, O>,
    ) -> Result<O, ReadError> {
        self.reset_bits();
        let data: &'a [u8] = self.data;
        match parser(&data[self.pos..]) {
            Ok((rest, value)) => {
                self.pos = data.len() - rest.len();
                Ok(value)
            }
            Err(_) => Err(self.end_of_stream(wanted)),
        }
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], ReadError> {
        self.parse(len, take(len))
    }

    pub fn skip(&mut self, len: usize) -> Result<(), ReadError> {
        self.read_bytes(len).map(|_| ())
    }

    pub fn read_u8(&mut self) -> Result<u8, ReadError> {
        self.parse(1, le_u8)
    }

    pub fn read_i8(&mut self) -> Result<i8, ReadError> {
        self.parse(1, le_i8)
    }

    pub fn read_u16(&mut self) -> Result<u16, ReadError> {
        self.parse(2, le_u16)
    }

    pub fn read_i16(&mut self) -> Result<i16, ReadError> {
        self.parse(2, le_i16)
    }

    pub fn read_u32(&mut self) -> Result<u32, ReadError> {
        self.parse(4, le_u32)
    }

    pub fn read_i32(&mut self) -> Result<i32, ReadError> {
        self.parse(4, le_i32)
    }

    pub fn read_u64(&mut self) -> Result<u64, ReadError> {
        self.parse(8, le_u64)
    }

    pub fn read_i64(&mut self) -> Result<i64, ReadError> {
        self.parse(8, le_i64)
    }

    pub fn read_f32(&mut self) -> Result<f32, ReadError> {
        self.parse(4, le_f32)
    }

    /// Reads a single bit, pulling a new byte into the bit buffer when it is empty.
    pub fn read_bit(&mut self) -> Result<bool, ReadError> {
        if self.bits_left == 0 {
            let byte = self.read_u8()?;
            self.bit_buffer = byte;
            self.bits_left = 8;
        }
        self.bits_left -= 1;
        Ok((self.bit_buffer >> self.bits_left) & 1 == 1)
    }

    /// Reads `count` bits (at most 32) as an unsigned integer, most significant bit first.
    pub fn read_bits(&mut self, count: u8) -> Result<u32, ReadError> {
        debug_assert!(count <= 32);
        let mut value = 0u32;
        for _ in 0..count {
            value = (value << 1) | u32::from(self.read_bit()?);
        }
        Ok(value)
    }

    /// Accumulates bytes until a zero byte or the end of the stream.
    pub fn read_cstring(&mut self) -> Result<String, ReadError> {
        let bytes = self.parse(0, take_till(|b| b == 0))?;
        if !self.is_empty() {
            self.pos += 1;
        }
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }

    /// Reads a string of a known byte length.
    pub fn read_string(&mut self, len: usize) -> Result<String, ReadError> {
        let bytes = self.read_bytes(len)?;
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }
}
