//! Capture files: header parsing, version-specific framing and the replay loop.
//!
//! A capture is loaded into memory once. Frames are decoded lazily, one per
//! [`Capture::next_frame`] call, and every decoded frame is applied to the replay context before
//! the call returns.

use flate2::read::GzDecoder;
use serde::Serialize;
use sha1::{Digest, Sha1};
use std::io::Read;
use std::path::Path;
use tracing::{Level, debug, span, trace, warn};

use crate::analyzer::Analyzer;
use crate::config::CaptureOptions;
use crate::definitions::{BuiltinDefinitions, Definitions};
use crate::error::{CaptureError, FormatError, ReadError};
use crate::events::{Event, EventBus, EventFilter, EventName, SubscriptionId};
use crate::opcodes;
use crate::packet::{Frame, FramePayload};
use crate::reader::PacketReader;
use crate::state::{
    CombatSessions, EntityRegistry, ReplayContext, ReplayState, SessionInfo, StateNotice,
};
use crate::types::{CaptureTime, ClientBuild, Direction};

pub const PKT_MAGIC: &[u8; 3] = b"PKT";
const GZIP_MAGIC: &[u8; 2] = &[0x1f, 0x8b];
const SESSION_KEY_LEN: usize = 40;
const LOCALE_LEN: usize = 4;
/// v2 frames mark server traffic with this direction byte.
const V2_SMSG: u8 = 0xFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FormatVersion {
    V2_1,
    V2_2,
    V3_0,
    V3_1,
    /// Any other version: legacy frames.
    Other(u16),
}

impl FormatVersion {
    pub fn from_raw(raw: u16) -> FormatVersion {
        match raw {
            0x201 => FormatVersion::V2_1,
            0x202 => FormatVersion::V2_2,
            0x300 => FormatVersion::V3_0,
            0x301 => FormatVersion::V3_1,
            other => FormatVersion::Other(other),
        }
    }

    pub fn raw(self) -> u16 {
        match self {
            FormatVersion::V2_1 => 0x201,
            FormatVersion::V2_2 => 0x202,
            FormatVersion::V3_0 => 0x300,
            FormatVersion::V3_1 => 0x301,
            FormatVersion::Other(raw) => raw,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CaptureStatus {
    HeaderRead,
    Streaming,
    Rewound,
    Closed,
}

/// Everything the capture header declares. Headerless captures leave it empty.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CaptureHeader {
    pub version: Option<FormatVersion>,
    pub sniffer_id: Option<u8>,
    pub build: Option<ClientBuild>,
    pub locale: Option<String>,
    #[serde(skip)]
    pub session_key: Vec<u8>,
    pub start_time: Option<CaptureTime>,
    pub start_tick: Option<u32>,
    #[serde(skip)]
    pub sniffer_hello: Vec<u8>,
}

impl CaptureHeader {
    pub fn is_headerless(&self) -> bool {
        self.version.is_none()
    }

    fn parse(reader: &mut PacketReader<'_>) -> Result<CaptureHeader, ReadError> {
        reader.skip(PKT_MAGIC.len())?;
        let version = FormatVersion::from_raw(reader.read_u16()?);
        let sniffer_id = reader.read_u8()?;
        let build = ClientBuild(reader.read_u32()?);
        let locale = read_locale(reader)?;
        let session_key = reader.read_bytes(SESSION_KEY_LEN)?.to_vec();
        let start_time = CaptureTime::from_unix(i64::from(reader.read_u32()?));
        let start_tick = reader.read_u32()?;
        let hello_len = reader.read_u32()? as usize;
        let sniffer_hello = reader.read_bytes(hello_len)?.to_vec();

        Ok(CaptureHeader {
            version: Some(version),
            sniffer_id: Some(sniffer_id),
            build: Some(build),
            locale: Some(locale),
            session_key,
            start_time: Some(start_time),
            start_tick: Some(start_tick),
            sniffer_hello,
        })
    }
}

fn read_locale(reader: &mut PacketReader<'_>) -> Result<String, ReadError> {
    let raw = reader.read_string(LOCALE_LEN)?;
    Ok(raw.trim_end_matches('\0').to_string())
}

/// A frame as laid out on the wire, before opcode resolution.
struct RawFrame<'a> {
    direction: Option<Direction>,
    opcode: u32,
    time: CaptureTime,
    elapsed: Option<f64>,
    connection_index: Option<i32>,
    tick: Option<u32>,
    data: &'a [u8],
}

fn frame_length(length: i64) -> Result<usize, FormatError> {
    usize::try_from(length).map_err(|_| FormatError::NegativeLength { length })
}

/// Per-version frame decoder.
#[derive(Debug, Clone, Copy)]
struct Framing {
    version: Option<FormatVersion>,
    start_time: CaptureTime,
    start_tick: u32,
    strict_direction: bool,
}

impl Framing {
    /// `None` on a clean end of stream. A partial frame is an error.
    fn read_frame<'a>(
        &self,
        reader: &mut PacketReader<'a>,
    ) -> Result<Option<RawFrame<'a>>, FormatError> {
        if reader.is_empty() {
            return Ok(None);
        }

        let frame = match self.version {
            Some(FormatVersion::V3_1) => self.read_v3_1(reader)?,
            Some(FormatVersion::V3_0) => self.read_v3_0(reader)?,
            Some(FormatVersion::V2_1 | FormatVersion::V2_2) => Self::read_v2(reader)?,
            Some(FormatVersion::Other(_)) | None => self.read_legacy(reader)?,
        };
        Ok(Some(frame))
    }

    fn elapsed(&self, tick: u32) -> f64 {
        (i64::from(tick) - i64::from(self.start_tick)) as f64 / 1000.0
    }

    /// Shared tail of tagged frames: extra header bytes, length, opcode and payload.
    fn read_tagged_tail<'a>(
        reader: &mut PacketReader<'a>,
    ) -> Result<(u32, &'a [u8]), FormatError> {
        let extra_len = frame_length(i64::from(reader.read_i32()?))?;
        let length = i64::from(reader.read_i32()?);
        reader.skip(extra_len)?;
        let opcode = reader.read_i32()? as u32;
        let data = reader.read_bytes(frame_length(length - 4)?)?;
        Ok((opcode, data))
    }

    fn read_v3_1<'a>(&self, reader: &mut PacketReader<'a>) -> Result<RawFrame<'a>, FormatError> {
        let direction = Direction::from_tag(reader.read_bytes(4)?);
        let connection_index = reader.read_i32()?;
        let tick = reader.read_u32()?;
        let elapsed = self.elapsed(tick);
        let (opcode, data) = Self::read_tagged_tail(reader)?;

        Ok(RawFrame {
            direction,
            opcode,
            time: self.start_time + elapsed,
            elapsed: Some(elapsed),
            connection_index: Some(connection_index),
            tick: Some(tick),
            data,
        })
    }

    fn read_v3_0<'a>(&self, reader: &mut PacketReader<'a>) -> Result<RawFrame<'a>, FormatError> {
        let direction = Direction::from_tag(reader.read_bytes(4)?);
        let unix_time = reader.read_u32()?;
        let tick = reader.read_u32()?;
        let (opcode, data) = Self::read_tagged_tail(reader)?;

        let (time, elapsed) = if self.start_tick != 0 {
            let elapsed = self.elapsed(tick);
            (self.start_time + elapsed, Some(elapsed))
        } else {
            (CaptureTime::from_unix(i64::from(unix_time)), None)
        };

        Ok(RawFrame {
            direction,
            opcode,
            time,
            elapsed,
            connection_index: None,
            tick: Some(tick),
            data,
        })
    }

    fn read_v2<'a>(reader: &mut PacketReader<'a>) -> Result<RawFrame<'a>, FormatError> {
        let opcode = reader.read_u32()?;
        let length = frame_length(i64::from(reader.read_i32()?))?;
        let time = CaptureTime::from_unix(i64::from(reader.read_u32()?));
        let direction = if reader.read_u8()? == V2_SMSG {
            Direction::Smsg
        } else {
            Direction::Cmsg
        };
        let data = reader.read_bytes(length)?;

        Ok(RawFrame {
            direction: Some(direction),
            opcode,
            time,
            elapsed: None,
            connection_index: None,
            tick: None,
            data,
        })
    }

    fn read_legacy<'a>(&self, reader: &mut PacketReader<'a>) -> Result<RawFrame<'a>, FormatError> {
        let opcode = u32::from(reader.read_u16()?);
        let length = frame_length(i64::from(reader.read_i32()?))?;
        let raw_direction = reader.read_u8()?;
        let direction = Direction::from_legacy_index(raw_direction);
        if direction.is_none() && self.strict_direction {
            return Err(FormatError::InvalidDirection {
                value: raw_direction,
            });
        }
        let time = CaptureTime::from_unix(reader.read_i64()?);
        let data = reader.read_bytes(length)?;

        Ok(RawFrame {
            direction,
            opcode,
            time,
            elapsed: None,
            connection_index: None,
            tick: None,
            data,
        })
    }
}

fn inflate(data: Vec<u8>) -> Result<Vec<u8>, std::io::Error> {
    if !data.starts_with(GZIP_MAGIC) {
        return Ok(data);
    }
    let mut out = Vec::new();
    GzDecoder::new(data.as_slice()).read_to_end(&mut out)?;
    debug!("inflated compressed capture: {} -> {} bytes", data.len(), out.len());
    Ok(out)
}

/// An open capture together with the replay state built from it.
pub struct Capture<D = BuiltinDefinitions> {
    data: Vec<u8>,
    pos: usize,
    frames_start: usize,
    header: CaptureHeader,
    framing: Framing,
    build: ClientBuild,
    frame_index: u64,
    status: CaptureStatus,
    definitions: D,
    options: CaptureOptions,
    context: ReplayContext,
    bus: EventBus,
}

impl<D> std::fmt::Debug for Capture<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Capture")
            .field("len", &self.data.len())
            .field("pos", &self.pos)
            .field("header", &self.header)
            .field("build", &self.build)
            .field("frame_index", &self.frame_index)
            .field("status", &self.status)
            .finish()
    }
}

impl Capture<BuiltinDefinitions> {
    /// Opens a capture file with the bundled definitions.
    pub fn open<P: AsRef<Path>>(path: P, options: CaptureOptions) -> Result<Self, CaptureError> {
        let data = std::fs::read(path.as_ref())?;
        debug!("read {} bytes from {}", data.len(), path.as_ref().display());
        Self::from_bytes(data, options)
    }

    pub fn from_bytes(data: Vec<u8>, options: CaptureOptions) -> Result<Self, CaptureError> {
        Self::with_definitions(data, BuiltinDefinitions::load()?, options)
    }
}

impl<D: Definitions> Capture<D> {
    /// Reads the header, settles the start time and client build, and leaves the stream at the
    /// first frame.
    pub fn with_definitions(
        data: Vec<u8>,
        definitions: D,
        options: CaptureOptions,
    ) -> Result<Self, CaptureError> {
        let data = inflate(data)?;
        let mut reader = PacketReader::new(&data);

        let header = if data.starts_with(PKT_MAGIC) {
            CaptureHeader::parse(&mut reader)?
        } else {
            CaptureHeader::default()
        };
        let frames_start = reader.position();

        let mut framing = Framing {
            version: header.version,
            start_time: header.start_time.unwrap_or_default(),
            start_tick: header.start_tick.unwrap_or_default(),
            strict_direction: options.strict_legacy_direction,
        };

        // Headerless captures take their start time from the first frame and their build from
        // that frame's date.
        let (start_time, inferred_build) = match header.start_time {
            Some(start_time) => (start_time, None),
            None => {
                let specimen = framing
                    .read_frame(&mut reader)?
                    .ok_or(FormatError::EmptyCapture)?;
                reader.seek(frames_start);

                let inferred = definitions.build_in_use_at(specimen.time);
                if let Some(build) = inferred {
                    debug!("inferred client build {build} from first frame at {}", specimen.time);
                }
                (specimen.time, inferred)
            }
        };
        framing.start_time = start_time;

        if !options.accepts_start_time(start_time) {
            return Err(FormatError::StartTimeOutOfRange {
                start_time: start_time.seconds(),
            }
            .into());
        }

        let build = match options.force_build.or(header.build).or(inferred_build) {
            Some(build) if definitions.is_supported(build) => build,
            other => {
                return Err(CaptureError::UnsupportedClient {
                    build: other.map(ClientBuild::raw).unwrap_or_default(),
                });
            }
        };

        debug!(
            "opened capture: format {:?}, build {build}, locale {:?}, start {start_time}",
            header.version, header.locale
        );

        Ok(Capture {
            data,
            pos: frames_start,
            frames_start,
            header,
            framing,
            build,
            frame_index: 0,
            status: CaptureStatus::HeaderRead,
            definitions,
            options,
            context: ReplayContext::new(),
            bus: EventBus::new(),
        })
    }

    /// Decodes the next frame and applies it to the replay state.
    ///
    /// Returns `Ok(None)` at the end of the stream. A [`CaptureError::Payload`] error leaves the
    /// stream at the following frame, so the caller may keep going.
    pub fn next_frame(&mut self) -> Result<Option<Frame>, CaptureError> {
        if self.status == CaptureStatus::Closed {
            return Err(CaptureError::Closed);
        }

        let span = span!(Level::TRACE, "frame", index = self.frame_index);
        let _enter = span.enter();

        let mut reader = PacketReader::new(&self.data);
        reader.seek(self.pos);
        let Some(raw) = self.framing.read_frame(&mut reader)? else {
            return Ok(None);
        };

        let decoder = opcodes::resolve(
            &self.definitions,
            Some(self.build),
            raw.direction,
            raw.opcode,
        );
        let index = self.frame_index;
        let decoded = FramePayload::decode(decoder, raw.data, self.build, &self.definitions);

        self.pos = reader.position();
        self.frame_index += 1;
        self.status = CaptureStatus::Streaming;

        let payload = decoded.map_err(|source| {
            warn!("frame {index}: {} payload is malformed: {source}", decoder.name());
            CaptureError::Payload {
                index,
                opcode: decoder.name().to_string(),
                source,
            }
        })?;

        let frame = Frame {
            index,
            direction: raw.direction,
            opcode: raw.opcode,
            decoder,
            time: raw.time,
            elapsed: raw.elapsed,
            connection_index: raw.connection_index,
            tick: raw.tick,
            data: raw.data.to_vec(),
            payload,
        };
        trace!(
            "{:?} {} ({:#06x}) at {}, {} bytes",
            frame.direction,
            frame.name(),
            frame.opcode,
            frame.time,
            frame.data.len()
        );

        frame.payload.update_state(frame.stamp(), &mut self.context);
        self.publish(&frame);

        Ok(Some(frame))
    }

    fn publish(&mut self, frame: &Frame) {
        for notice in self.context.take_notices() {
            match notice {
                StateNotice::EntityCreated { guid, kind } => {
                    self.bus.publish(&Event::EntityCreated { guid, kind })
                }
                StateNotice::SessionOpened(id) => {
                    if let Some(session) = self.context.combat.get(id) {
                        self.bus.publish(&Event::CombatSessionOpened(session));
                    }
                }
                StateNotice::SessionClosed(id) => {
                    if let Some(session) = self.context.combat.get(id) {
                        self.bus.publish(&Event::CombatSessionClosed(session));
                    }
                }
            }
        }
        self.bus.publish(&Event::FrameDecoded(frame));
    }

    /// Drives the capture to the end of the stream. Returns the number of frames decoded.
    pub fn replay(&mut self) -> Result<u64, CaptureError> {
        let mut count = 0;
        while self.next_frame()?.is_some() {
            count += 1;
        }
        Ok(count)
    }

    /// Feeds every frame to `analyzer`. Malformed payloads are logged and skipped.
    pub fn run(&mut self, analyzer: &mut dyn Analyzer) -> Result<u64, CaptureError> {
        let mut count = 0;
        loop {
            match self.next_frame() {
                Ok(Some(frame)) => {
                    analyzer.process(&frame, &*self);
                    count += 1;
                }
                Ok(None) => break,
                Err(CaptureError::Payload { index, opcode, .. }) => {
                    warn!("skipping frame {index}: malformed {opcode} payload");
                }
                Err(e) => return Err(e),
            }
        }
        analyzer.finish();
        Ok(count)
    }

    /// Seeks back to the first frame and discards all replay state.
    pub fn rewind(&mut self) -> Result<(), CaptureError> {
        if self.status == CaptureStatus::Closed {
            return Err(CaptureError::Closed);
        }
        self.pos = self.frames_start;
        self.frame_index = 0;
        self.context = ReplayContext::new();
        self.status = CaptureStatus::Rewound;
        debug!("rewound capture to offset {}", self.frames_start);
        Ok(())
    }

    pub fn close(&mut self) {
        self.data = Vec::new();
        self.pos = 0;
        self.status = CaptureStatus::Closed;
    }

    pub fn eof(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// SHA-1 of the (decompressed) capture bytes, lowercase hex.
    pub fn digest(&self) -> Result<String, CaptureError> {
        if self.status == CaptureStatus::Closed {
            return Err(CaptureError::Closed);
        }
        let mut hasher = Sha1::new();
        hasher.update(&self.data);
        Ok(format!("{:x}", hasher.finalize()))
    }

    pub fn subscribe<F>(&mut self, event: EventName, filter: EventFilter, callback: F) -> SubscriptionId
    where
        F: FnMut(&Event<'_>) + 'static,
    {
        self.bus.subscribe(event, filter, callback)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.bus.unsubscribe(id)
    }

    pub fn header(&self) -> &CaptureHeader {
        &self.header
    }

    pub fn format_version(&self) -> Option<FormatVersion> {
        self.header.version
    }

    pub fn is_headerless(&self) -> bool {
        self.header.is_headerless()
    }

    pub fn locale(&self) -> Option<&str> {
        self.header.locale.as_deref()
    }

    pub fn start_time(&self) -> CaptureTime {
        self.framing.start_time
    }

    pub fn status(&self) -> CaptureStatus {
        self.status
    }

    /// Byte offset of the next frame.
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn context(&self) -> &ReplayContext {
        &self.context
    }

    pub fn definitions(&self) -> &D {
        &self.definitions
    }

    pub fn options(&self) -> &CaptureOptions {
        &self.options
    }
}

impl<D: Definitions> ReplayState for Capture<D> {
    fn frame_index(&self) -> u64 {
        self.frame_index
    }

    fn build(&self) -> ClientBuild {
        self.build
    }

    fn entities(&self) -> &EntityRegistry {
        self.context.entities()
    }

    fn combat_sessions(&self) -> &CombatSessions {
        self.context.combat()
    }

    fn session(&self) -> &SessionInfo {
        self.context.session()
    }
}
