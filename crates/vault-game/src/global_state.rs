// global_state.rs — cross-level identity of global entities
//
// A global entity (a door shared between two adjacent levels, say) exists in
// several maps at once; the registry remembers which level last updated it
// and whether it is still alive. On a transition, the saved copy of a global
// entity overlays the destination level's resident copy instead of spawning
// a duplicate.

use vault_common::error::{SaveError, SaveResult};

use crate::blocks::{RestoreParams, SaveRestoreBlockHandler};
use crate::fields::{Accessor, FieldDesc};
use crate::level::GameState;
use crate::reader::SaveReader;
use crate::writer::SaveWriter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GlobalEntState {
    #[default]
    Off,
    On,
    Dead,
}

impl GlobalEntState {
    fn to_int(self) -> i32 {
        match self {
            Self::Off => 0,
            Self::On => 1,
            Self::Dead => 2,
        }
    }

    fn from_int(v: i32) -> Self {
        match v {
            1 => Self::On,
            2 => Self::Dead,
            _ => Self::Off,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct GlobalEntity {
    pub name: String,
    /// Level that owns the authoritative copy.
    pub level_name: String,
    pub state: GlobalEntState,
}

static GLOBAL_ENTITY_FIELDS: &[FieldDesc<GlobalEntity>] = &[
    FieldDesc::string(
        "name",
        Accessor {
            get: |g: &GlobalEntity, _| g.name.clone(),
            set: |g: &mut GlobalEntity, _, v| g.name = v,
        },
    ),
    FieldDesc::string(
        "levelName",
        Accessor {
            get: |g: &GlobalEntity, _| g.level_name.clone(),
            set: |g: &mut GlobalEntity, _, v| g.level_name = v,
        },
    ),
    FieldDesc::integer(
        "state",
        Accessor {
            get: |g: &GlobalEntity, _| g.state.to_int(),
            set: |g: &mut GlobalEntity, _, v| g.state = GlobalEntState::from_int(v),
        },
    ),
];

#[derive(Debug, Clone, Default)]
pub struct GlobalEntityRegistry {
    entries: Vec<GlobalEntity>,
}

impl GlobalEntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn find(&self, name: &str) -> Option<&GlobalEntity> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn add(&mut self, name: &str, level_name: &str, state: GlobalEntState) {
        if let Some(existing) = self.entries.iter_mut().find(|e| e.name == name) {
            existing.level_name = level_name.to_string();
            existing.state = state;
            return;
        }
        self.entries.push(GlobalEntity {
            name: name.to_string(),
            level_name: level_name.to_string(),
            state,
        });
    }

    pub fn set_state(&mut self, name: &str, state: GlobalEntState) {
        if let Some(e) = self.entries.iter_mut().find(|e| e.name == name) {
            e.state = state;
        }
    }

    /// Move ownership of a global entity to a new level after its saved copy
    /// has been overlaid there.
    pub fn update_level(&mut self, name: &str, level_name: &str) {
        if let Some(e) = self.entries.iter_mut().find(|e| e.name == name) {
            e.level_name = level_name.to_string();
        }
    }

    pub fn state(&self, name: &str) -> Option<GlobalEntState> {
        self.find(name).map(|e| e.state)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &GlobalEntity> {
        self.entries.iter()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Persists the global entity registry as its own block.
#[derive(Default)]
pub struct GlobalEntityBlockHandler;

pub const GLOBAL_BLOCK_NAME: &str = "Globals";

impl SaveRestoreBlockHandler for GlobalEntityBlockHandler {
    fn block_name(&self) -> &'static str {
        GLOBAL_BLOCK_NAME
    }

    fn save(&mut self, gs: &mut GameState, writer: &mut SaveWriter<'_>) -> SaveResult<()> {
        writer.write_int(gs.globals.len() as i32)?;
        for entry in gs.globals.iter() {
            writer.write_fields("GENT", entry, GLOBAL_ENTITY_FIELDS)?;
        }
        Ok(())
    }

    fn restore(
        &mut self,
        gs: &mut GameState,
        reader: &mut SaveReader<'_>,
        params: &RestoreParams,
    ) -> SaveResult<()> {
        // mid-transition the in-memory registry is authoritative; the saved
        // copy is only read back on a full load
        if params.is_transition {
            return Ok(());
        }
        let count = reader.read_int()?;
        if count < 0 {
            return Err(SaveError::Corrupt(format!("bad global count {}", count)));
        }
        gs.globals.clear();
        for _ in 0..count {
            let mut entry = GlobalEntity::default();
            reader.read_fields("GENT", &mut entry, GLOBAL_ENTITY_FIELDS)?;
            gs.globals.add(&entry.name, &entry.level_name, entry.state);
        }
        Ok(())
    }
}
