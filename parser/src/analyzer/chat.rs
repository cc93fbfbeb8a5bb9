use std::io::Write;
use tracing::warn;

use crate::packet::{Frame, FramePayload};
use crate::state::ReplayState;

use super::analyzer::Analyzer;

pub struct ChatLoggerBuilder;

impl Default for ChatLoggerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatLoggerBuilder {
    pub fn new() -> ChatLoggerBuilder {
        ChatLoggerBuilder
    }

    pub fn build(self) -> Box<dyn Analyzer> {
        Box::new(ChatLogger {
            output: Box::new(std::io::stdout()),
        })
    }

    pub fn build_with_output(self, output: Box<dyn Write>) -> Box<dyn Analyzer> {
        Box::new(ChatLogger { output })
    }
}

pub struct ChatLogger {
    output: Box<dyn Write>,
}

impl Analyzer for ChatLogger {
    fn finish(&mut self) {}

    fn process(&mut self, frame: &Frame, state: &dyn ReplayState) {
        let line = match &frame.payload {
            FramePayload::Chat(chat) => {
                let sender = if chat.sender_name.is_empty() {
                    state.display_name(&chat.sender)
                } else {
                    chat.sender_name.clone()
                };
                format!(
                    "{}: {}: {} {}",
                    frame.time,
                    sender,
                    chat.channel.as_deref().unwrap_or("say"),
                    chat.message
                )
            }
            FramePayload::TextEmote(emote) => format!(
                "{}: {}: text emote {} at {}",
                frame.time,
                state.display_name(&emote.source),
                emote.text_emote_id,
                state.display_name(&emote.target)
            ),
            _ => return,
        };

        if let Err(e) = writeln!(self.output, "{line}") {
            warn!("failed to write chat line: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::testing::{
        SharedBuffer, capture, chat, emote, query_creature, smsg, text_emote,
    };
    use crate::guid::Guid128;
    use crate::opcodes::Opcode;

    #[test]
    fn prints_chat_and_text_emotes_only() {
        let wolf = Guid128::creature(299, 7);
        let hero = Guid128::player(1, 42);
        let mut capture = capture(&[
            (
                b"SMSG",
                100,
                smsg(Opcode::QueryCreatureResponse),
                query_creature(299, "Mangy Wolf"),
            ),
            (b"SMSG", 200, smsg(Opcode::Chat), chat(hero, "Bob", "hello")),
            (b"SMSG", 300, smsg(Opcode::Emote), emote(wolf, 10)),
            (b"SMSG", 400, smsg(Opcode::TextEmote), text_emote(wolf, 101, hero)),
        ]);
        let buffer = SharedBuffer::default();
        let mut analyzer = ChatLoggerBuilder::new().build_with_output(Box::new(buffer.clone()));
        assert_eq!(capture.run(analyzer.as_mut()).unwrap(), 4);

        let lines = buffer.lines();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with(": Bob: say hello"), "{}", lines[0]);
        assert!(
            lines[1].ends_with(&format!(": Mangy Wolf: text emote 101 at {hero}")),
            "{}",
            lines[1]
        );
    }
}
