use kinded::Kinded;
use serde::Serialize;

use crate::guid::Guid128;
use crate::types::{CaptureTime, FrameStamp, Position};
use crate::update::FieldValue;

/// Which side of an attack an entity was on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CombatRole {
    Attacker,
    Victim,
}

/// What the loot window showed when an entity was looted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LootSummary {
    pub loot_object: Guid128,
    pub failure_reason: u8,
    pub acquire_reason: u8,
    pub loot_method: u8,
    pub threshold: u8,
    pub coins: u32,
}

/// A single state transition recorded on an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Kinded)]
#[kinded(derive(Serialize, Hash))]
#[serde(tag = "type")]
pub enum LogEntry {
    Spawn,
    Despawn,
    Move {
        position: Position,
        orientation: Option<f32>,
        movement_flags: u32,
    },
    Emote {
        emote_id: u32,
    },
    TextEmote {
        text_emote_id: u32,
        target: Option<Guid128>,
    },
    Chat {
        chat_type: u8,
        channel: Option<String>,
        message: String,
    },
    AttackStart {
        role: CombatRole,
        opponent: Guid128,
    },
    AttackStop {
        role: CombatRole,
        opponent: Option<Guid128>,
    },
    Died,
    SpellStart {
        spell_id: u32,
        cast_id: u8,
    },
    SpellGo {
        spell_id: u32,
        cast_id: u8,
    },
    LootResponse(LootSummary),
    Update {
        field: String,
        value: FieldValue,
    },
}

/// A log entry together with the frame that caused it.
#[derive(Debug, Clone, Serialize)]
pub struct LogItem {
    pub frame: u64,
    pub time: CaptureTime,
    pub entry: LogEntry,
}

/// Append-only per-entity history. Items are pushed in frame order, which is monotonically
/// increasing in time.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EntityLog {
    items: Vec<LogItem>,
}

impl EntityLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, stamp: FrameStamp, entry: LogEntry) {
        self.items.push(LogItem {
            frame: stamp.index,
            time: stamp.time,
            entry,
        });
    }

    pub fn items(&self) -> &[LogItem] {
        &self.items
    }

    /// Items within a time window [start, end).
    pub fn items_in_range(&self, start: CaptureTime, end: CaptureTime) -> &[LogItem] {
        let start_idx = self.items.partition_point(|e| e.time < start);
        let end_idx = self.items.partition_point(|e| e.time < end);
        &self.items[start_idx..end_idx]
    }

    pub fn of_kind(&self, kind: LogEntryKind) -> impl Iterator<Item = &LogItem> + '_ {
        self.items.iter().filter(move |item| item.entry.kind() == kind)
    }

    pub fn last(&self) -> Option<&LogItem> {
        self.items.last()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
