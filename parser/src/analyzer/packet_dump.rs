use std::io::Write;
use tracing::warn;

use crate::analyzer::Analyzer;
use crate::packet::Frame;
use crate::state::ReplayState;

pub struct PacketDumpBuilder {
    hex: bool,
    output: Option<Box<dyn Write>>,
}

impl Default for PacketDumpBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PacketDumpBuilder {
    pub fn new() -> Self {
        Self {
            hex: false,
            output: None,
        }
    }

    /// Also hexdump the raw payload of frames without a decoder.
    pub fn hex(mut self, hex: bool) -> Self {
        self.hex = hex;
        self
    }

    /// Writes to `output` instead of stdout.
    pub fn output(mut self, output: Box<dyn Write>) -> Self {
        self.output = Some(output);
        self
    }

    pub fn build(self) -> Box<dyn Analyzer> {
        Box::new(PacketDump {
            hex: self.hex,
            output: self.output.unwrap_or_else(|| Box::new(std::io::stdout())),
        })
    }
}

struct PacketDump {
    hex: bool,
    output: Box<dyn Write>,
}

impl PacketDump {
    fn write_frame(&mut self, frame: &Frame, state: &dyn ReplayState) -> std::io::Result<()> {
        let line = serde_json::json!({
            "frame": frame,
            "references": frame
                .payload
                .references()
                .iter()
                .map(|r| serde_json::json!({
                    "role": r.role,
                    "guid": r.guid.to_string(),
                    "name": state.entity(&r.guid).and_then(|e| e.name()),
                }))
                .collect::<Vec<_>>(),
        });
        writeln!(self.output, "{line}")?;

        if self.hex && frame.is_unhandled() && !frame.data.is_empty() {
            for row in hexdump::hexdump_iter(&frame.data) {
                writeln!(self.output, "{}", &*row)?;
            }
        }
        Ok(())
    }
}

impl Analyzer for PacketDump {
    fn finish(&mut self) {
        if let Err(e) = self.output.flush() {
            warn!("failed to flush packet dump: {e}");
        }
    }

    fn process(&mut self, frame: &Frame, state: &dyn ReplayState) {
        if let Err(e) = self.write_frame(frame, state) {
            warn!("failed to write frame {}: {e}", frame.index);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::testing::{SharedBuffer, capture, emote, smsg};
    use crate::guid::Guid128;
    use crate::opcodes::Opcode;

    /// Present in every build's table as an explicitly undecoded opcode.
    const UNDECODED: u32 = 0x0A07;

    fn dump(hex: bool) -> Vec<String> {
        let wolf = Guid128::creature(299, 7);
        let mut capture = capture(&[
            (b"SMSG", 100, smsg(Opcode::Emote), emote(wolf, 10)),
            (b"SMSG", 200, UNDECODED, vec![0xde, 0xad, 0xbe, 0xef]),
        ]);
        let buffer = SharedBuffer::default();
        let mut analyzer = PacketDumpBuilder::new()
            .hex(hex)
            .output(Box::new(buffer.clone()))
            .build();
        assert_eq!(capture.run(analyzer.as_mut()).unwrap(), 2);
        buffer.lines()
    }

    #[test]
    fn one_json_line_per_frame() {
        let lines = dump(false);
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(&lines[0]).unwrap();
        assert_eq!(first["frame"]["index"], 0);
        assert_eq!(first["references"][0]["role"], "source");
        assert_eq!(
            first["references"][0]["guid"],
            Guid128::creature(299, 7).to_string()
        );
        assert!(first["references"][0]["name"].is_null());

        let second: serde_json::Value = serde_json::from_str(&lines[1]).unwrap();
        assert_eq!(second["frame"]["index"], 1);
        assert_eq!(second["references"], serde_json::json!([]));
    }

    #[test]
    fn hex_rows_follow_undecoded_frames() {
        let lines = dump(true);
        assert!(lines.len() > 2);
        assert!(serde_json::from_str::<serde_json::Value>(&lines[1]).is_ok());
        for row in &lines[2..] {
            assert!(serde_json::from_str::<serde_json::Value>(row).is_err(), "{row}");
        }
    }
}
