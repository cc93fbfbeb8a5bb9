use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strum_macros::Display;
use tracing::trace;
use variantly::Variantly;

use super::log::{CombatRole, EntityLog, LogEntry, LootSummary};
use crate::guid::{Guid128, GuidType};
use crate::types::{FrameStamp, Position};
use crate::update::{FieldValue, MovementFlags};

const UNIT_FLAG_IN_COMBAT: u32 = 0x0008_0000;

/// The closed set of entity kinds the registry tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
pub enum EntityKind {
    Player,
    Creature,
}

impl EntityKind {
    /// Kind of entity an identifier denotes, if it is one the registry tracks.
    pub fn of(guid: &Guid128) -> Option<EntityKind> {
        match guid.guid_type() {
            GuidType::Player => Some(EntityKind::Player),
            GuidType::Creature | GuidType::Vehicle | GuidType::Pet => Some(EntityKind::Creature),
            _ => None,
        }
    }
}

/// State shared by every kind of unit.
#[derive(Debug, Clone, Default, Serialize)]
pub struct UnitState {
    position: Option<Position>,
    orientation: Option<f32>,
    movement_flags: u32,
    health: Option<u64>,
    max_health: Option<u64>,
    power: Option<u64>,
    max_power: Option<u64>,
    level: Option<u32>,
    unit_flags: u32,
    display_id: Option<u32>,
    scale: Option<f32>,
    target: Option<Guid128>,
    emote: Option<u32>,
    spawned: bool,
    despawned: bool,
    dead: bool,
    combat_target: Option<Guid128>,
    attacking: bool,
    /// Every update field seen so far, by name.
    fields: BTreeMap<String, FieldValue>,
}

impl UnitState {
    pub fn position(&self) -> Option<Position> {
        self.position
    }

    pub fn orientation(&self) -> Option<f32> {
        self.orientation
    }

    pub fn movement_flags(&self) -> MovementFlags {
        MovementFlags::from_bytes(self.movement_flags.to_le_bytes())
    }

    pub fn movement_flags_raw(&self) -> u32 {
        self.movement_flags
    }

    pub fn health(&self) -> Option<u64> {
        self.health
    }

    pub fn max_health(&self) -> Option<u64> {
        self.max_health
    }

    pub fn power(&self) -> Option<u64> {
        self.power
    }

    pub fn max_power(&self) -> Option<u64> {
        self.max_power
    }

    pub fn level(&self) -> Option<u32> {
        self.level
    }

    pub fn unit_flags(&self) -> u32 {
        self.unit_flags
    }

    pub fn display_id(&self) -> Option<u32> {
        self.display_id
    }

    pub fn scale(&self) -> Option<f32> {
        self.scale
    }

    /// Current selection as reported by update fields.
    pub fn target(&self) -> Option<Guid128> {
        self.target
    }

    pub fn emote(&self) -> Option<u32> {
        self.emote
    }

    pub fn is_spawned(&self) -> bool {
        self.spawned
    }

    pub fn is_despawned(&self) -> bool {
        self.despawned
    }

    pub fn is_dead(&self) -> bool {
        self.dead
    }

    /// Who this unit is swinging at, from attack-start frames.
    pub fn combat_target(&self) -> Option<Guid128> {
        self.combat_target
    }

    pub fn is_attacking(&self) -> bool {
        self.attacking
    }

    pub fn in_combat(&self) -> bool {
        self.attacking || self.unit_flags & UNIT_FLAG_IN_COMBAT != 0
    }

    pub fn fields(&self) -> &BTreeMap<String, FieldValue> {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PlayerData {
    name: Option<String>,
    xp: Option<u64>,
    guild_rank: Option<u32>,
}

impl PlayerData {
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn xp(&self) -> Option<u64> {
        self.xp
    }

    pub fn guild_rank(&self) -> Option<u32> {
        self.guild_rank
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CreatureData {
    entry: u32,
    name: Option<String>,
    npc_flags: u32,
}

impl CreatureData {
    pub fn entry(&self) -> u32 {
        self.entry
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn npc_flags(&self) -> u32 {
        self.npc_flags
    }
}

/// Kind-specific part of an entity.
#[derive(Debug, Clone, Serialize, Variantly)]
#[serde(tag = "kind")]
pub enum EntityData {
    Player(PlayerData),
    Creature(CreatureData),
}

/// One tracked in-world object.
///
/// Only mutated through the transition methods below. None of them fail: odd input (a second
/// death, a stop without a start) leaves the flags as they are and is still logged.
#[derive(Debug, Clone, Serialize)]
pub struct Entity {
    guid: Guid128,
    state: UnitState,
    data: EntityData,
    log: EntityLog,
}

impl Entity {
    pub fn new(guid: Guid128, kind: EntityKind) -> Self {
        let data = match kind {
            EntityKind::Player => EntityData::Player(PlayerData::default()),
            EntityKind::Creature => EntityData::Creature(CreatureData {
                entry: guid.entry_id().unwrap_or_default(),
                ..Default::default()
            }),
        };

        Self {
            guid,
            state: UnitState::default(),
            data,
            log: EntityLog::new(),
        }
    }

    pub fn guid(&self) -> Guid128 {
        self.guid
    }

    pub fn kind(&self) -> EntityKind {
        match self.data {
            EntityData::Player(_) => EntityKind::Player,
            EntityData::Creature(_) => EntityKind::Creature,
        }
    }

    pub fn state(&self) -> &UnitState {
        &self.state
    }

    pub fn data(&self) -> &EntityData {
        &self.data
    }

    pub fn log(&self) -> &EntityLog {
        &self.log
    }

    /// Player or creature name, when a query response has been seen.
    pub fn name(&self) -> Option<&str> {
        match &self.data {
            EntityData::Player(player) => player.name(),
            EntityData::Creature(creature) => creature.name(),
        }
    }

    pub fn spawn(&mut self, stamp: FrameStamp) {
        self.state.spawned = true;
        self.state.despawned = false;
        self.log.push(stamp, LogEntry::Spawn);
    }

    /// Marks the entity as gone. The record and its history stay in the registry.
    pub fn despawn(&mut self, stamp: FrameStamp) {
        self.state.despawned = true;
        self.log.push(stamp, LogEntry::Despawn);
    }

    pub fn move_to(
        &mut self,
        stamp: FrameStamp,
        position: Position,
        orientation: Option<f32>,
        movement_flags: u32,
    ) {
        self.state.position = Some(position);
        if orientation.is_some() {
            self.state.orientation = orientation;
        }
        self.state.movement_flags = movement_flags;
        self.log.push(
            stamp,
            LogEntry::Move {
                position,
                orientation,
                movement_flags,
            },
        );
    }

    pub fn emote(&mut self, stamp: FrameStamp, emote_id: u32) {
        self.state.emote = Some(emote_id);
        self.log.push(stamp, LogEntry::Emote { emote_id });
    }

    pub fn text_emote(&mut self, stamp: FrameStamp, text_emote_id: u32, target: Option<Guid128>) {
        self.log.push(
            stamp,
            LogEntry::TextEmote {
                text_emote_id,
                target,
            },
        );
    }

    pub fn chat(
        &mut self,
        stamp: FrameStamp,
        chat_type: u8,
        channel: Option<String>,
        message: String,
    ) {
        self.log.push(
            stamp,
            LogEntry::Chat {
                chat_type,
                channel,
                message,
            },
        );
    }

    pub fn attack_start(&mut self, stamp: FrameStamp, victim: Guid128) {
        self.state.attacking = true;
        self.state.combat_target = Some(victim);
        self.log.push(
            stamp,
            LogEntry::AttackStart {
                role: CombatRole::Attacker,
                opponent: victim,
            },
        );
    }

    /// Victim side of [`Entity::attack_start`].
    pub fn attacked_by(&mut self, stamp: FrameStamp, attacker: Guid128) {
        self.log.push(
            stamp,
            LogEntry::AttackStart {
                role: CombatRole::Victim,
                opponent: attacker,
            },
        );
    }

    /// Stops swinging. Without an explicit victim the last known combat target is used.
    pub fn attack_stop(&mut self, stamp: FrameStamp, victim: Option<Guid128>) {
        if !self.state.attacking {
            trace!("{} stopped attacking while not attacking", self.guid);
        }
        let opponent = victim.or(self.state.combat_target);
        self.state.attacking = false;
        self.state.combat_target = None;
        self.log.push(
            stamp,
            LogEntry::AttackStop {
                role: CombatRole::Attacker,
                opponent,
            },
        );
    }

    /// Victim side of [`Entity::attack_stop`].
    pub fn released_by(&mut self, stamp: FrameStamp, attacker: Guid128) {
        self.log.push(
            stamp,
            LogEntry::AttackStop {
                role: CombatRole::Victim,
                opponent: Some(attacker),
            },
        );
    }

    /// Death always ends active combat, so this also stops the attack on `victim`, or on the
    /// current combat target when none is given.
    pub fn died(&mut self, stamp: FrameStamp, victim: Option<Guid128>) {
        self.state.dead = true;
        self.log.push(stamp, LogEntry::Died);
        self.attack_stop(stamp, victim);
    }

    pub fn spell_start(&mut self, stamp: FrameStamp, spell_id: u32, cast_id: u8) {
        self.log
            .push(stamp, LogEntry::SpellStart { spell_id, cast_id });
    }

    pub fn spell_go(&mut self, stamp: FrameStamp, spell_id: u32, cast_id: u8) {
        self.log.push(stamp, LogEntry::SpellGo { spell_id, cast_id });
    }

    pub fn loot_response(&mut self, stamp: FrameStamp, loot: LootSummary) {
        self.log.push(stamp, LogEntry::LootResponse(loot));
    }

    pub(crate) fn set_name(&mut self, name: String) {
        match &mut self.data {
            EntityData::Player(player) => player.name = Some(name),
            EntityData::Creature(creature) => creature.name = Some(name),
        }
    }

    /// Applies one reconstructed update field. Well-known fields also update the typed state.
    pub fn apply_field_update(&mut self, stamp: FrameStamp, field: &str, value: FieldValue) {
        match field {
            "OBJECT_FIELD_SCALE_X" => self.state.scale = value.as_f32(),
            "UNIT_FIELD_TARGET" => {
                self.state.target = value.as_guid().filter(|guid| !guid.is_empty())
            }
            "UNIT_FIELD_HEALTH" => self.state.health = value.as_u64(),
            "UNIT_FIELD_MAXHEALTH" => self.state.max_health = value.as_u64(),
            "UNIT_FIELD_POWER" => self.state.power = value.as_u64(),
            "UNIT_FIELD_MAXPOWER" => self.state.max_power = value.as_u64(),
            "UNIT_FIELD_LEVEL" => self.state.level = value.as_u32(),
            "UNIT_FIELD_FLAGS" => self.state.unit_flags = value.as_u32().unwrap_or_default(),
            "UNIT_FIELD_DISPLAYID" => self.state.display_id = value.as_u32(),
            "UNIT_FIELD_EMOTE_STATE" => self.state.emote = value.as_u32(),
            _ => match &mut self.data {
                EntityData::Creature(creature) => match field {
                    "OBJECT_FIELD_ENTRY_ID" => {
                        if let Some(entry) = value.as_u32() {
                            creature.entry = entry;
                        }
                    }
                    "UNIT_NPC_FLAGS" => creature.npc_flags = value.as_u32().unwrap_or_default(),
                    _ => {}
                },
                EntityData::Player(player) => match field {
                    "PLAYER_XP" => player.xp = value.as_u64(),
                    "PLAYER_GUILD_RANK_ID" => player.guild_rank = value.as_u32(),
                    _ => {}
                },
            },
        }

        self.state.fields.insert(field.to_string(), value.clone());
        self.log.push(
            stamp,
            LogEntry::Update {
                field: field.to_string(),
                value,
            },
        );
    }
}
