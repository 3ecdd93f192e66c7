// game_info.rs — per-save bookkeeping: entity table, rebase context
//
// One GameSaveRestoreInfo lives for the duration of a save or restore. It
// carries the entity table (one entry per saved entity, in save order), the
// time/tick/landmark rebase context, and the entity currently being
// serialized for diagnostics.

use std::collections::HashMap;

use bitflags::bitflags;
use vault_common::segment::{Segment, SymbolTable, DEFAULT_SYMBOL_SLOTS};
use vault_common::types::{EntityIndex, Vec3};

use crate::fields::{Accessor, DataMap, FieldDesc};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct EntFlags: u32 {
        /// Player entity; must land back in the same slot on restore.
        const PLAYER = 0x8000_0000;
        /// Entity was removed or refused to save; entry kept for ordinal
        /// stability but carries no data.
        const REMOVED = 0x4000_0000;
        /// Entity can cross level transitions.
        const MOVEABLE = 0x2000_0000;
        /// Entity has a global name and persists across levels.
        const GLOBAL = 0x1000_0000;
        /// Entity is carried across a transition because its owner player is.
        const PLAYERCHILD = 0x0800_0000;
        /// Low bits hold which transition volumes the entity touched.
        const LEVELMASK = 0x0000_FFFF;
    }
}

/// One entry in the saved entity table.
#[derive(Debug, Clone)]
pub struct EntityTableEntry {
    /// Ordinal of this entry in the table.
    pub id: i32,
    /// Entity list slot at save time.
    pub save_index: i32,
    /// Entity list slot at restore time. Not persisted; -1 until the
    /// creation pass assigns it.
    pub restore_index: EntityIndex,
    /// Byte offset of the entity's data, relative to the body base.
    pub location: i32,
    /// Byte length of the entity's data.
    pub size: i32,
    pub flags: EntFlags,
    pub classname: String,
    pub globalname: String,
    /// Entity position in landmark space, recorded for global overlay.
    pub landmark_model_space: Vec3,
    pub model_name: String,
}

impl Default for EntityTableEntry {
    fn default() -> Self {
        Self {
            id: 0,
            save_index: -1,
            restore_index: -1,
            location: 0,
            size: 0,
            flags: EntFlags::empty(),
            classname: String::new(),
            globalname: String::new(),
            landmark_model_space: [0.0; 3],
            model_name: String::new(),
        }
    }
}

static ENTITY_TABLE_FIELDS: &[FieldDesc<EntityTableEntry>] = &[
    FieldDesc::integer(
        "id",
        Accessor {
            get: |e: &EntityTableEntry, _| e.id,
            set: |e: &mut EntityTableEntry, _, v| e.id = v,
        },
    ),
    FieldDesc::integer(
        "edictindex",
        Accessor {
            get: |e: &EntityTableEntry, _| e.save_index,
            set: |e: &mut EntityTableEntry, _, v| e.save_index = v,
        },
    ),
    FieldDesc::integer(
        "location",
        Accessor {
            get: |e: &EntityTableEntry, _| e.location,
            set: |e: &mut EntityTableEntry, _, v| e.location = v,
        },
    ),
    FieldDesc::integer(
        "size",
        Accessor {
            get: |e: &EntityTableEntry, _| e.size,
            set: |e: &mut EntityTableEntry, _, v| e.size = v,
        },
    ),
    FieldDesc::integer(
        "flags",
        Accessor {
            get: |e: &EntityTableEntry, _| e.flags.bits() as i32,
            set: |e: &mut EntityTableEntry, _, v| e.flags = EntFlags::from_bits_retain(v as u32),
        },
    ),
    FieldDesc::string(
        "classname",
        Accessor {
            get: |e: &EntityTableEntry, _| e.classname.clone(),
            set: |e: &mut EntityTableEntry, _, v| e.classname = v,
        },
    ),
    FieldDesc::string(
        "globalname",
        Accessor {
            get: |e: &EntityTableEntry, _| e.globalname.clone(),
            set: |e: &mut EntityTableEntry, _, v| e.globalname = v,
        },
    ),
    FieldDesc::vector(
        "landmarkModelSpace",
        Accessor {
            get: |e: &EntityTableEntry, _| e.landmark_model_space,
            set: |e: &mut EntityTableEntry, _, v| e.landmark_model_space = v,
        },
    ),
    FieldDesc::string(
        "modelname",
        Accessor {
            get: |e: &EntityTableEntry, _| e.model_name.clone(),
            set: |e: &mut EntityTableEntry, _, v| e.model_name = v,
        },
    ),
];

/// Datamap for entity table entries; the table self-hosts through the same
/// field machinery as entity data.
pub static ENTITY_TABLE_MAP: DataMap<EntityTableEntry> = DataMap {
    class_name: "ETABLE",
    base: None,
    fields: ENTITY_TABLE_FIELDS,
};

/// Save-wide entity table and rebase context.
#[derive(Default)]
pub struct GameSaveRestoreInfo {
    pub table: Vec<EntityTableEntry>,
    /// Entity list slot -> table ordinal, built once before writing data.
    entity_to_index: HashMap<EntityIndex, usize>,
    /// Level time at save; time fields are written relative to it.
    pub base_time: f32,
    /// Tick count at save; tick fields are written relative to it.
    pub base_tick: i32,
    /// Landmark position; world positions are written relative to it when
    /// saving for a level transition, otherwise zero.
    pub landmark_offset: Vec3,
    pub current_map_name: String,
    /// Entity being serialized right now, for warnings.
    pub current_entity: Option<EntityIndex>,
}

impl GameSaveRestoreInfo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map an entity slot to its table ordinal for pointer serialization.
    /// Entities outside the table write as -1 and restore as no reference.
    pub fn entity_index(&self, ent: EntityIndex) -> i32 {
        match self.entity_to_index.get(&ent) {
            Some(&ordinal) => ordinal as i32,
            None => -1,
        }
    }

    /// Map a saved table ordinal back to the restored entity slot.
    pub fn entity_from_index(&self, ordinal: i32) -> Option<EntityIndex> {
        if ordinal < 0 {
            return None;
        }
        match self.table.get(ordinal as usize) {
            Some(entry) if entry.restore_index >= 0 => Some(entry.restore_index),
            _ => None,
        }
    }

    /// Build the slot-to-ordinal hash from the current table.
    pub fn build_entity_hash(&mut self) {
        self.entity_to_index.clear();
        for (ordinal, entry) in self.table.iter().enumerate() {
            if entry.save_index >= 0 {
                self.entity_to_index.insert(entry.save_index, ordinal);
            }
        }
    }

    pub fn clear_entity_hash(&mut self) {
        self.entity_to_index.clear();
    }
}

/// The buffer, symbol table and bookkeeping for one save or restore pass.
pub struct SaveRestoreData {
    pub segment: Segment,
    pub symbols: SymbolTable,
    pub game_info: GameSaveRestoreInfo,
}

impl SaveRestoreData {
    pub fn new(capacity: usize) -> Self {
        Self {
            segment: Segment::new(capacity),
            symbols: SymbolTable::new(DEFAULT_SYMBOL_SLOTS),
            game_info: GameSaveRestoreInfo::new(),
        }
    }

    /// Wrap a loaded payload and its symbol table for restoring.
    pub fn from_parts(bytes: Vec<u8>, symbols: SymbolTable) -> Self {
        Self {
            segment: Segment::from_bytes(bytes),
            symbols,
            game_info: GameSaveRestoreInfo::new(),
        }
    }
}
