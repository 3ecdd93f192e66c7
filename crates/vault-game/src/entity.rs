// entity.rs — the persistable entity surface and the live entity list

use std::any::Any;
use std::collections::HashMap;

use vault_common::error::SaveResult;
use vault_common::types::{EntityIndex, Vec3};

use crate::reader::SaveReader;
use crate::writer::SaveWriter;

/// What the save/restore machinery needs from a game entity. Implementors
/// route `save` and `restore` through their static datamap.
pub trait Entity {
    fn classname(&self) -> &str;

    /// Cross-level identity; empty for ordinary entities.
    fn global_name(&self) -> &str {
        ""
    }

    fn model_name(&self) -> &str {
        ""
    }

    fn origin(&self) -> Vec3;
    fn set_origin(&mut self, origin: Vec3);

    fn is_player(&self) -> bool {
        false
    }

    /// Entity may cross level transitions.
    fn is_moveable(&self) -> bool {
        false
    }

    fn should_save(&self) -> bool {
        true
    }

    /// Called once before the entity table is built.
    fn on_save(&mut self) {}

    /// Called once after every entity's data has been applied.
    fn on_restore(&mut self) {}

    /// Entities can veto their own existence after restore; a false return
    /// removes the entity from the list.
    fn is_valid_after_restore(&self) -> bool {
        true
    }

    fn save(&self, writer: &mut SaveWriter<'_>) -> SaveResult<()>;
    fn restore(&mut self, reader: &mut SaveReader<'_>) -> SaveResult<()>;

    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Slot-addressed list of live entities. Slot 0 is reserved for the world;
/// player slots follow. Slots are stable for an entity's lifetime, which is
/// what makes the save-time slot usable as an identity.
#[derive(Default)]
pub struct EntityList {
    slots: Vec<Option<Box<dyn Entity>>>,
}

impl EntityList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Place an entity in the first free slot.
    pub fn spawn(&mut self, ent: Box<dyn Entity>) -> EntityIndex {
        for (i, slot) in self.slots.iter_mut().enumerate() {
            if slot.is_none() {
                *slot = Some(ent);
                return i as EntityIndex;
            }
        }
        self.slots.push(Some(ent));
        (self.slots.len() - 1) as EntityIndex
    }

    /// Place an entity in a specific slot, growing the list as needed. Used
    /// to put the world and players back where they were saved from.
    pub fn spawn_at(&mut self, index: EntityIndex, ent: Box<dyn Entity>) -> EntityIndex {
        let idx = index.max(0) as usize;
        if idx >= self.slots.len() {
            self.slots.resize_with(idx + 1, || None);
        }
        self.slots[idx] = Some(ent);
        idx as EntityIndex
    }

    pub fn remove(&mut self, index: EntityIndex) {
        if index >= 0 {
            if let Some(slot) = self.slots.get_mut(index as usize) {
                *slot = None;
            }
        }
    }

    pub fn get(&self, index: EntityIndex) -> Option<&dyn Entity> {
        if index < 0 {
            return None;
        }
        match self.slots.get(index as usize) {
            Some(Some(ent)) => Some(ent.as_ref()),
            _ => None,
        }
    }

    pub fn get_mut(&mut self, index: EntityIndex) -> Option<&mut dyn Entity> {
        if index < 0 {
            return None;
        }
        match self.slots.get_mut(index as usize) {
            Some(Some(ent)) => Some(ent.as_mut()),
            _ => None,
        }
    }

    pub fn iter_live(&self) -> impl Iterator<Item = (EntityIndex, &dyn Entity)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_deref().map(|e| (i as EntityIndex, e)))
    }

    pub fn find_by_global_name(&self, name: &str) -> Option<EntityIndex> {
        if name.is_empty() {
            return None;
        }
        self.iter_live()
            .find(|(_, e)| e.global_name() == name)
            .map(|(i, _)| i)
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn live_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }
}

/// Creates entities by classname during restore.
#[derive(Default)]
pub struct EntityFactory {
    ctors: HashMap<&'static str, fn() -> Box<dyn Entity>>,
}

impl EntityFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, classname: &'static str, ctor: fn() -> Box<dyn Entity>) {
        self.ctors.insert(classname, ctor);
    }

    pub fn create(&self, classname: &str) -> Option<Box<dyn Entity>> {
        self.ctors.get(classname).map(|ctor| ctor())
    }
}
