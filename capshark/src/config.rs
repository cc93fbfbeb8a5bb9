use anyhow::Context;
use serde::{Deserialize, Serialize};

use pkt_replays::CaptureOptions;

/// CLI configuration, loadable from a TOML file.
///
/// Every field has a default, so the file only needs the keys it changes. Flags on the command
/// line win over the file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// `tracing` filter directive used when `RUST_LOG` is unset, e.g. `pkt_replays=debug`.
    pub log_filter: Option<String>,
    /// Hexdump payloads of undecoded frames in `dump`.
    pub hex: bool,
    /// File extension `survey` looks for when walking directories.
    pub extension: Option<String>,
    pub capture: CaptureOptions,
}

impl CliConfig {
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: Self = toml::from_str(&contents).context("failed to parse config file")?;
        Ok(config)
    }

    pub fn extension(&self) -> &str {
        self.extension.as_deref().unwrap_or("pkt")
    }

    pub fn generate_default_toml() -> String {
        r#"# capshark configuration
# Pass with --config <path>.

# Log filter used when RUST_LOG is unset
# log_filter = "pkt_replays=debug"

# Hexdump payloads of undecoded frames when dumping
hex = false

# File extension picked up when surveying a directory
extension = "pkt"

[capture]
# Accepted capture start window, unix seconds
min_start_time = 1104537600
max_start_time = 1609459199

# Replay every capture as this client build
# force_build = 20490

# Fail on legacy frames with a bad direction byte instead of marking them invalid
strict_legacy_direction = true
"#
        .to_string()
    }
}
