use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

use super::entity::{Entity, EntityKind};
use crate::guid::Guid128;

/// Every entity the replay has seen, keyed by its full identifier.
///
/// Entities are created lazily the first time a frame references them and are never removed;
/// leaving the world only flips their despawned flag.
#[derive(Debug, Default)]
pub struct EntityRegistry {
    entities: BTreeMap<Guid128, Entity>,
    /// Template names from query responses, applied to creatures created later.
    creature_names: HashMap<u32, String>,
    created: Vec<(Guid128, EntityKind)>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the entity for `guid`, creating it on first reference.
    ///
    /// Identifiers that do not denote a tracked kind yield `None`.
    pub fn find_or_create(&mut self, guid: Guid128) -> Option<&mut Entity> {
        let kind = EntityKind::of(&guid)?;
        let entity = match self.entities.entry(guid) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                debug!("tracking new {kind} {guid}");
                let mut entity = Entity::new(guid, kind);
                if kind == EntityKind::Creature {
                    if let Some(name) = guid.entry_id().and_then(|e| self.creature_names.get(&e)) {
                        entity.set_name(name.clone());
                    }
                }
                self.created.push((guid, kind));
                entry.insert(entity)
            }
        };
        Some(entity)
    }

    /// Lookup without creation.
    pub fn find(&self, guid: &Guid128) -> Option<&Entity> {
        self.entities.get(guid)
    }

    pub fn contains(&self, guid: &Guid128) -> bool {
        self.entities.contains_key(guid)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entity> + '_ {
        self.entities.values()
    }

    pub fn of_kind(&self, kind: EntityKind) -> impl Iterator<Item = &Entity> + '_ {
        self.iter().filter(move |entity| entity.kind() == kind)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn creature_name(&self, entry: u32) -> Option<&str> {
        self.creature_names.get(&entry).map(String::as_str)
    }

    /// Names every known creature of this template and remembers it for later ones.
    pub fn set_creature_name(&mut self, entry: u32, name: &str) {
        for entity in self.entities.values_mut() {
            let matches = entity
                .data()
                .creature_ref()
                .is_some_and(|creature| creature.entry() == entry);
            if matches {
                entity.set_name(name.to_string());
            }
        }
        self.creature_names.insert(entry, name.to_string());
    }

    pub fn set_player_name(&mut self, guid: Guid128, name: &str) {
        if let Some(entity) = self.find_or_create(guid) {
            entity.set_name(name.to_string());
        }
    }

    /// Entities created since the last call, in creation order.
    pub(crate) fn take_created(&mut self) -> Vec<(Guid128, EntityKind)> {
        std::mem::take(&mut self.created)
    }
}
