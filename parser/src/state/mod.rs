//! Replay state: the entity registry, per-entity state machines and their logs, and the combat
//! session aggregator.

mod combat;
mod context;
mod entity;
mod listener;
mod log;
mod registry;

pub use combat::{CombatSession, CombatSessions};
pub use context::{ReplayContext, SessionInfo};
pub(crate) use context::StateNotice;
pub use entity::{CreatureData, Entity, EntityData, EntityKind, PlayerData, UnitState};
pub use listener::ReplayState;
pub use log::{CombatRole, EntityLog, LogEntry, LogEntryKind, LogItem, LootSummary};
pub use registry::EntityRegistry;
