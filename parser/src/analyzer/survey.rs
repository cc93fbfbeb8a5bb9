use serde::Serialize;
use std::cell::{RefCell, RefMut};
use std::collections::BTreeMap;
use std::rc::Rc;

use super::analyzer::Analyzer;
use crate::packet::{Frame, FramePayload};
use crate::state::ReplayState;
use crate::types::ClientBuild;

/// Counts collected over one or more captures.
#[derive(Debug, Default, Clone, Serialize)]
pub struct SurveyStats {
    pub total_frames: usize,
    pub unhandled_frames: usize,
    pub invalid_frames: usize,
    pub malformed_blocks: usize,
    /// Frames per decoder name.
    pub by_decoder: BTreeMap<String, usize>,
    pub audits: Vec<String>,
    pub builds: Vec<ClientBuild>,
}

impl SurveyStats {
    pub fn new() -> Self {
        Self::default()
    }
}

pub struct SurveyBuilder {
    stats: Rc<RefCell<SurveyStats>>,
}

impl SurveyBuilder {
    pub fn new(stats: Rc<RefCell<SurveyStats>>) -> Self {
        Self { stats }
    }

    pub fn build(&self) -> Box<dyn Analyzer> {
        Box::new(Survey {
            stats: self.stats.clone(),
            build: None,
        })
    }
}

struct Survey {
    stats: Rc<RefCell<SurveyStats>>,
    build: Option<ClientBuild>,
}

impl Analyzer for Survey {
    fn finish(&mut self) {
        if let Some(build) = self.build {
            self.stats.borrow_mut().builds.push(build);
        }
    }

    fn process(&mut self, frame: &Frame, state: &dyn ReplayState) {
        self.build.get_or_insert(state.build());

        let mut stats: RefMut<_> = self.stats.borrow_mut();
        stats.total_frames += 1;
        *stats.by_decoder.entry(frame.name().to_string()).or_default() += 1;

        match &frame.payload {
            FramePayload::Unhandled => stats.unhandled_frames += 1,
            FramePayload::Invalid => stats.invalid_frames += 1,
            FramePayload::UpdateObject(update) => {
                for block in update.failed_blocks() {
                    stats.malformed_blocks += 1;
                    if let Some(error) = block.error() {
                        stats
                            .audits
                            .push(format!("frame {} block {}: {error}", frame.index, block.index));
                    }
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::testing::{BUILD, capture, emote, smsg};
    use crate::guid::Guid128;
    use crate::opcodes::Opcode;

    /// Update packet whose only block has an unknown update type.
    fn broken_update() -> Vec<u8> {
        let mut out = 1u32.to_le_bytes().to_vec();
        out.extend_from_slice(&0u16.to_le_bytes());
        out.push(9);
        out.extend_from_slice(&2u32.to_le_bytes());
        out.extend_from_slice(&[0, 0]);
        out
    }

    #[test]
    fn counts_accumulate_across_captures() {
        let stats = Rc::new(RefCell::new(SurveyStats::new()));
        let builder = SurveyBuilder::new(stats.clone());
        let wolf = Guid128::creature(299, 7);

        let mut first = capture(&[
            (b"SMSG", 100, smsg(Opcode::Emote), emote(wolf, 10)),
            (b"SMSG", 200, 0x0A07, vec![1, 2, 3]),
            (b"XXXX", 300, 0x0001, vec![]),
            (b"SMSG", 400, smsg(Opcode::UpdateObject), broken_update()),
        ]);
        first.run(builder.build().as_mut()).unwrap();

        let mut second = capture(&[(b"SMSG", 100, smsg(Opcode::Emote), emote(wolf, 11))]);
        second.run(builder.build().as_mut()).unwrap();

        let stats = stats.borrow();
        assert_eq!(stats.total_frames, 5);
        assert_eq!(stats.unhandled_frames, 1);
        assert_eq!(stats.invalid_frames, 1);
        assert_eq!(stats.malformed_blocks, 1);
        assert_eq!(stats.by_decoder.get("Emote"), Some(&2));
        assert_eq!(stats.by_decoder.get("UpdateObject"), Some(&1));
        assert_eq!(stats.by_decoder.get("Invalid"), Some(&1));
        assert_eq!(stats.audits.len(), 1);
        assert!(stats.audits[0].starts_with("frame 3 block 0: "), "{}", stats.audits[0]);
        assert_eq!(stats.builds, vec![ClientBuild(BUILD), ClientBuild(BUILD)]);
    }
}
