use thiserror::Error;

use crate::guid::GuidType;
use crate::state::EntityKind;

pub type IResult<'a, O> = nom::IResult<&'a [u8], O>;

/// Errors raised by [`crate::reader::PacketReader`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReadError {
    #[error("unexpected end of stream at offset {offset}: wanted {wanted} bytes, {available} available")]
    UnexpectedEndOfStream {
        offset: usize,
        wanted: usize,
        available: usize,
    },
}

/// The capture itself is malformed. Always fatal for the capture.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FormatError {
    #[error("capture is truncated")]
    Truncated(#[from] ReadError),
    #[error("capture has packet timestamp outside of expected range: {start_time}")]
    StartTimeOutOfRange { start_time: f64 },
    #[error("invalid direction byte {value:#x}")]
    InvalidDirection { value: u8 },
    #[error("negative frame length {length}")]
    NegativeLength { length: i64 },
    #[error("capture declares no start time and contains no frames to take one from")]
    EmptyCapture,
}

#[derive(Debug, Error)]
pub enum DefinitionsError {
    #[error("embedded definitions file {0} is missing")]
    MissingFile(String),
    #[error("failed to parse definitions file {file}")]
    Parse {
        file: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("no definitions available for client build {0}")]
    NoDefinitions(u32),
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error(transparent)]
    Format(#[from] FormatError),
    #[error("unsupported client build: {build}")]
    UnsupportedClient { build: u32 },
    #[error("failed to decode {opcode} payload of frame {index}")]
    Payload {
        index: u64,
        opcode: String,
        #[source]
        source: ReadError,
    },
    #[error(transparent)]
    Definitions(#[from] DefinitionsError),
    #[error("I/O error")]
    Io(#[from] std::io::Error),
    #[error("capture is closed")]
    Closed,
}

impl From<ReadError> for CaptureError {
    fn from(e: ReadError) -> Self {
        CaptureError::Format(FormatError::Truncated(e))
    }
}

/// A single update block could not be reconstructed. Scoped to that block.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpdateBlockError {
    #[error("field index {index} is not in the schema and has no fallback width")]
    UnknownField { index: u16 },
    #[error("field {name} declares unsupported width {width}")]
    UnsupportedFieldWidth { name: String, width: u8 },
    #[error("no field schema for {kind:?}")]
    MissingSchema { kind: EntityKind },
    #[error("{guid_type} objects carry no tracked field schema")]
    UntrackedObject { guid_type: GuidType },
    #[error("unknown update type {0}")]
    UnknownUpdateType(u8),
    #[error("block payload truncated")]
    Read(#[from] ReadError),
}
