use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use crate::types::{CaptureTime, ClientBuild};

/// 2005-01-01T00:00:00Z
pub const DEFAULT_MIN_START_TIME: i64 = 1_104_537_600;
/// 2020-12-31T23:59:59Z
pub const DEFAULT_MAX_START_TIME: i64 = 1_609_459_199;

/// How a capture is opened and replayed.
///
/// All fields default to their standard values, so a partial TOML table deserializes cleanly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Builder)]
#[builder(default)]
#[serde(default)]
pub struct CaptureOptions {
    /// Earliest accepted capture start, unix seconds (inclusive).
    pub min_start_time: i64,
    /// Latest accepted capture start, unix seconds (inclusive).
    pub max_start_time: i64,
    /// Replay with this build regardless of what the header says or what the date implies.
    #[builder(setter(strip_option))]
    pub force_build: Option<ClientBuild>,
    /// Reject legacy frames whose direction byte is out of range instead of marking them invalid.
    pub strict_legacy_direction: bool,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            min_start_time: DEFAULT_MIN_START_TIME,
            max_start_time: DEFAULT_MAX_START_TIME,
            force_build: None,
            strict_legacy_direction: true,
        }
    }
}

impl CaptureOptions {
    pub fn builder() -> CaptureOptionsBuilder {
        CaptureOptionsBuilder::default()
    }

    pub fn accepts_start_time(&self, time: CaptureTime) -> bool {
        let seconds = time.seconds();
        seconds >= self.min_start_time as f64 && seconds <= self.max_start_time as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_window() {
        let options = CaptureOptions::default();
        assert!(options.accepts_start_time(CaptureTime::from_unix(1_436_486_400)));
        assert!(options.accepts_start_time(CaptureTime::from_unix(DEFAULT_MAX_START_TIME)));
        assert!(!options.accepts_start_time(CaptureTime::from_unix(0)));
        assert!(!options.accepts_start_time(CaptureTime::from_unix(1_700_000_000)));
    }

    #[test]
    fn builder_keeps_unset_defaults() {
        let options = CaptureOptions::builder()
            .force_build(ClientBuild(20490))
            .build()
            .unwrap();
        assert_eq!(options.force_build, Some(ClientBuild(20490)));
        assert_eq!(options.min_start_time, DEFAULT_MIN_START_TIME);
        assert!(options.strict_legacy_direction);
    }

    #[test]
    fn partial_json_uses_defaults() {
        let options: CaptureOptions =
            serde_json::from_str(r#"{ "strict_legacy_direction": false }"#).unwrap();
        assert!(!options.strict_legacy_direction);
        assert_eq!(options.max_start_time, DEFAULT_MAX_START_TIME);
    }
}
