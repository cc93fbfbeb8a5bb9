//! Build-specific protocol data: opcode tables, update field schemas and the historical
//! build table used for headerless captures.
//!
//! The bundled tables are embedded JSON. Callers with their own tables implement
//! [`Definitions`] directly.

use rust_embed::RustEmbed;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use crate::error::DefinitionsError;
use crate::opcodes::Opcode;
use crate::state::EntityKind;
use crate::types::{CaptureTime, ClientBuild, Direction};

/// Semantic type of an update field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Int,
    Uint,
    Float,
    Guid,
    Bitfield,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    pub index: u16,
    pub name: String,
    #[serde(rename = "type")]
    pub ty: FieldType,
    /// Width in bytes on the wire.
    pub width: u8,
}

/// Ordered catalog of update fields for one entity kind in one build.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FieldSchema {
    fields: Vec<FieldDef>,
}

impl FieldSchema {
    pub fn new(mut fields: Vec<FieldDef>) -> Self {
        fields.sort_by_key(|f| f.index);
        Self { fields }
    }

    pub fn field(&self, index: u16) -> Option<&FieldDef> {
        self.fields
            .binary_search_by_key(&index, |f| f.index)
            .ok()
            .map(|pos| &self.fields[pos])
    }

    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Everything the core needs to know about a specific client build.
pub trait Definitions {
    /// Builds the core knows how to replay.
    fn supported_builds(&self) -> &[ClientBuild];

    /// The client build that was live at `time`.
    fn build_in_use_at(&self, time: CaptureTime) -> Option<ClientBuild>;

    fn lookup(&self, build: ClientBuild, direction: Direction, opcode: u32) -> Option<Opcode>;

    fn schema_for(&self, build: ClientBuild, kind: EntityKind) -> Option<&FieldSchema>;

    /// Type-only fallback for a field index that is missing from a kind's schema.
    fn fallback_field(&self, build: ClientBuild, index: u16) -> Option<&FieldDef>;

    /// Number of speed values in a movement block.
    fn movement_speed_count(&self, build: ClientBuild) -> usize;

    fn is_supported(&self, build: ClientBuild) -> bool {
        self.supported_builds().contains(&build)
    }
}

#[derive(RustEmbed)]
#[folder = "definitions/"]
struct Asset;

#[derive(Debug, Deserialize)]
struct BuildsFile {
    supported: Vec<ClientBuild>,
    history: Vec<BuildRelease>,
    tables: Vec<String>,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct BuildRelease {
    pub build: ClientBuild,
    /// Unix seconds
    pub released: i64,
}

#[derive(Debug, Deserialize)]
struct OpcodeEntry {
    opcode: u32,
    name: Opcode,
}

#[derive(Debug, Deserialize)]
struct FieldGroups {
    object: Vec<FieldDef>,
    unit: Vec<FieldDef>,
    player: Vec<FieldDef>,
    creature: Vec<FieldDef>,
}

#[derive(Debug, Deserialize)]
struct TableFile {
    builds: Vec<ClientBuild>,
    opcodes: HashMap<Direction, Vec<OpcodeEntry>>,
    movement_speed_count: usize,
    fields: FieldGroups,
}

#[derive(Debug)]
struct BuildTable {
    builds: Vec<ClientBuild>,
    opcodes: HashMap<(Direction, u32), Opcode>,
    schemas: HashMap<EntityKind, FieldSchema>,
    fallback: HashMap<u16, FieldDef>,
    movement_speed_count: usize,
}

impl From<TableFile> for BuildTable {
    fn from(file: TableFile) -> Self {
        let mut opcodes = HashMap::new();
        for (direction, entries) in file.opcodes {
            for entry in entries {
                opcodes.insert((direction, entry.opcode), entry.name);
            }
        }

        let base: Vec<FieldDef> = file
            .fields
            .object
            .into_iter()
            .chain(file.fields.unit)
            .collect();
        let player: Vec<FieldDef> = base.iter().cloned().chain(file.fields.player).collect();
        let creature: Vec<FieldDef> = base.into_iter().chain(file.fields.creature).collect();

        let mut fallback = HashMap::new();
        for field in player.iter().chain(creature.iter()) {
            fallback.entry(field.index).or_insert_with(|| field.clone());
        }

        let mut schemas = HashMap::new();
        schemas.insert(EntityKind::Player, FieldSchema::new(player));
        schemas.insert(EntityKind::Creature, FieldSchema::new(creature));

        BuildTable {
            builds: file.builds,
            opcodes,
            schemas,
            fallback,
            movement_speed_count: file.movement_speed_count,
        }
    }
}

/// Definitions bundled with the crate.
#[derive(Debug)]
pub struct BuiltinDefinitions {
    supported: Vec<ClientBuild>,
    history: Vec<BuildRelease>,
    tables: Vec<BuildTable>,
}

fn load_json<T: serde::de::DeserializeOwned>(name: &str) -> Result<T, DefinitionsError> {
    let file = Asset::get(name).ok_or_else(|| DefinitionsError::MissingFile(name.to_string()))?;
    serde_json::from_slice(&file.data).map_err(|source| DefinitionsError::Parse {
        file: name.to_string(),
        source,
    })
}

impl BuiltinDefinitions {
    pub fn load() -> Result<Self, DefinitionsError> {
        let builds: BuildsFile = load_json("builds.json")?;
        let mut tables = Vec::with_capacity(builds.tables.len());
        for name in &builds.tables {
            let table: TableFile = load_json(name)?;
            tables.push(BuildTable::from(table));
        }

        if let Some(build) = builds
            .supported
            .iter()
            .find(|build| !tables.iter().any(|t| t.builds.contains(build)))
        {
            return Err(DefinitionsError::NoDefinitions(build.raw()));
        }

        let mut history = builds.history;
        history.sort_by_key(|release| release.released);

        debug!(
            "loaded definitions for {} builds from {} tables",
            builds.supported.len(),
            tables.len()
        );

        Ok(Self {
            supported: builds.supported,
            history,
            tables,
        })
    }

    fn table(&self, build: ClientBuild) -> Option<&BuildTable> {
        self.tables.iter().find(|t| t.builds.contains(&build))
    }

    /// Reverse lookup, mostly useful for building synthetic captures.
    pub fn opcode_number(
        &self,
        build: ClientBuild,
        direction: Direction,
        opcode: Opcode,
    ) -> Option<u32> {
        self.table(build)?
            .opcodes
            .iter()
            .find(|((dir, _), name)| *dir == direction && **name == opcode)
            .map(|((_, number), _)| *number)
    }

    pub fn history(&self) -> &[BuildRelease] {
        &self.history
    }
}

impl Definitions for BuiltinDefinitions {
    fn supported_builds(&self) -> &[ClientBuild] {
        &self.supported
    }

    fn build_in_use_at(&self, time: CaptureTime) -> Option<ClientBuild> {
        self.history
            .iter()
            .take_while(|release| (release.released as f64) <= time.seconds())
            .last()
            .map(|release| release.build)
    }

    fn lookup(&self, build: ClientBuild, direction: Direction, opcode: u32) -> Option<Opcode> {
        self.table(build)?.opcodes.get(&(direction, opcode)).copied()
    }

    fn schema_for(&self, build: ClientBuild, kind: EntityKind) -> Option<&FieldSchema> {
        self.table(build)?.schemas.get(&kind)
    }

    fn fallback_field(&self, build: ClientBuild, index: u16) -> Option<&FieldDef> {
        self.table(build)?.fallback.get(&index)
    }

    fn movement_speed_count(&self, build: ClientBuild) -> usize {
        self.table(build)
            .map(|t| t.movement_speed_count)
            .unwrap_or_default()
    }
}
