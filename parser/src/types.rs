use serde::{Deserialize, Serialize};
use std::fmt;
use strum_macros::{Display, EnumString, IntoStaticStr};

/// A client build number, e.g. 20253.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientBuild(pub u32);

impl ClientBuild {
    pub fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ClientBuild {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for ClientBuild {
    fn from(v: u32) -> Self {
        ClientBuild(v)
    }
}

impl From<u16> for ClientBuild {
    fn from(v: u16) -> Self {
        ClientBuild(v as u32)
    }
}

/// Which side of the connection sent a frame.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, IntoStaticStr,
)]
pub enum Direction {
    /// Client to server
    #[strum(serialize = "CMSG")]
    #[serde(rename = "CMSG")]
    Cmsg,
    /// Server to client
    #[strum(serialize = "SMSG")]
    #[serde(rename = "SMSG")]
    Smsg,
}

impl Direction {
    /// Legacy frames index a two-element table with a single byte.
    pub fn from_legacy_index(index: u8) -> Option<Direction> {
        match index {
            0 => Some(Direction::Cmsg),
            1 => Some(Direction::Smsg),
            _ => None,
        }
    }

    /// Newer frames carry the direction as a four byte ASCII tag.
    pub fn from_tag(tag: &[u8]) -> Option<Direction> {
        match tag {
            b"CMSG" => Some(Direction::Cmsg),
            b"SMSG" => Some(Direction::Smsg),
            _ => None,
        }
    }
}

/// Wall-clock time of a frame in seconds since the unix epoch.
#[derive(Debug, Default, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CaptureTime(pub f64);

impl CaptureTime {
    pub fn seconds(self) -> f64 {
        self.0
    }

    pub fn from_unix(seconds: i64) -> CaptureTime {
        CaptureTime(seconds as f64)
    }
}

impl fmt::Display for CaptureTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}s", self.0)
    }
}

impl std::ops::Add<f64> for CaptureTime {
    type Output = CaptureTime;
    fn add(self, rhs: f64) -> CaptureTime {
        CaptureTime(self.0 + rhs)
    }
}

impl std::ops::Sub for CaptureTime {
    type Output = f64;
    fn sub(self, rhs: CaptureTime) -> f64 {
        self.0 - rhs.0
    }
}

/// World-space position.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Position {
    pub fn new(x: f32, y: f32, z: f32) -> Position {
        Position { x, y, z }
    }

    pub fn distance(self, other: Position) -> f32 {
        let (dx, dy, dz) = (self.x - other.x, self.y - other.y, self.z - other.z);
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

/// Where in the capture a state transition came from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FrameStamp {
    pub index: u64,
    pub time: CaptureTime,
}
