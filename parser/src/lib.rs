pub mod analyzer;
pub mod capture;
pub mod config;
pub mod definitions;
mod error;
pub mod events;
pub mod guid;
pub mod opcodes;
pub mod packet;
pub mod reader;
pub mod state;
pub mod types;
pub mod update;

pub use capture::{Capture, CaptureHeader, CaptureStatus, FormatVersion};
pub use config::CaptureOptions;
pub use error::*;
pub use guid::{Guid128, GuidType};
pub use strum;
