// entity_block.rs — the entity block: table construction, per-entity data,
// two-pass restore
//
// Saving walks the live entity list, builds one table entry per saveable
// entity, then writes each entity's field data and records its location and
// size back into the entry. The table itself goes into the block's header
// blob so restore can rebuild it before touching any body data.
//
// Restoring is two passes over the table. Pass one creates every entity by
// classname (the world back into slot 0, players back into their saved
// slots) so that entity references in field data can resolve to final slots.
// Pass two seeks to each entity's data and applies it. A transitioned global
// entity is not created; its data overlays the destination level's resident
// copy with GLOBAL-flagged fields left alone, and its position is rebuilt
// from the destination landmark.

use vault_common::console::{con_dprintf, con_warning};
use vault_common::error::SaveResult;
use vault_common::types::vec3_sub;

use crate::blocks::{RestoreParams, SaveRestoreBlockHandler};
use crate::game_info::{EntFlags, EntityTableEntry, SaveRestoreData, ENTITY_TABLE_MAP};
use crate::global_state::GlobalEntState;
use crate::level::GameState;
use crate::reader::SaveReader;
use crate::writer::SaveWriter;

pub const ENTITY_BLOCK_NAME: &str = "Entities";

/// Classname that always restores into slot 0.
pub const WORLD_CLASSNAME: &str = "worldspawn";

#[derive(Default)]
pub struct EntitySaveRestoreBlockHandler;

impl EntitySaveRestoreBlockHandler {
    /// Build the entity table from the live entity list.
    fn save_init_entities(&self, gs: &mut GameState, data: &mut SaveRestoreData) {
        let landmark = gs.level.landmark;
        let mut table = Vec::new();

        for (slot, ent) in gs.entities.iter_live() {
            if !ent.should_save() {
                continue;
            }
            let mut flags = EntFlags::empty();
            if ent.is_player() {
                flags |= EntFlags::PLAYER;
            }
            if ent.is_moveable() {
                flags |= EntFlags::MOVEABLE;
            }

            let mut entry = EntityTableEntry {
                id: table.len() as i32,
                save_index: slot,
                classname: ent.classname().to_string(),
                model_name: ent.model_name().to_string(),
                flags,
                ..Default::default()
            };
            if !ent.global_name().is_empty() {
                entry.flags |= EntFlags::GLOBAL;
                entry.globalname = ent.global_name().to_string();
                entry.landmark_model_space = vec3_sub(landmark, ent.origin());
            }
            table.push(entry);
        }

        con_dprintf(&format!("saving {} entities\n", table.len()));
        data.game_info.table = table;
        data.game_info.build_entity_hash();
        data.game_info.current_map_name = gs.level.map_name.clone();
    }
}

impl SaveRestoreBlockHandler for EntitySaveRestoreBlockHandler {
    fn block_name(&self) -> &'static str {
        ENTITY_BLOCK_NAME
    }

    fn pre_save(&mut self, gs: &mut GameState, data: &mut SaveRestoreData) {
        for slot in 0..gs.entities.slot_count() {
            if let Some(ent) = gs.entities.get_mut(slot as i32) {
                ent.on_save();
            }
        }
        self.save_init_entities(gs, data);
    }

    fn save(&mut self, gs: &mut GameState, writer: &mut SaveWriter<'_>) -> SaveResult<()> {
        let body_base = writer.tell();
        let count = writer.data.game_info.table.len();

        for i in 0..count {
            let slot = writer.data.game_info.table[i].save_index;
            let ent = match gs.entities.get(slot) {
                Some(ent) => ent,
                None => {
                    // vanished between table build and write
                    writer.data.game_info.table[i].flags |= EntFlags::REMOVED;
                    continue;
                }
            };

            writer.data.game_info.current_entity = Some(slot);
            let start = writer.tell();
            ent.save(writer)?;
            let end = writer.tell();
            let entry = &mut writer.data.game_info.table[i];
            entry.location = (start - body_base) as i32;
            entry.size = (end - start) as i32;
        }
        writer.data.game_info.current_entity = None;
        Ok(())
    }

    fn write_save_headers(
        &mut self,
        _gs: &mut GameState,
        writer: &mut SaveWriter<'_>,
    ) -> SaveResult<()> {
        let count = writer.data.game_info.table.len();
        writer.write_int(count as i32)?;
        for i in 0..count {
            // clone the entry out of the bookkeeping the writer borrows
            let entry = writer.data.game_info.table[i].clone();
            writer.write_fields(ENTITY_TABLE_MAP.class_name, &entry, ENTITY_TABLE_MAP.fields)?;
        }
        Ok(())
    }

    fn post_save(&mut self, _gs: &mut GameState, data: &mut SaveRestoreData) {
        data.game_info.clear_entity_hash();
    }

    fn read_restore_headers(
        &mut self,
        _gs: &mut GameState,
        reader: &mut SaveReader<'_>,
    ) -> SaveResult<()> {
        let count = reader.read_int()?.max(0);
        let mut table = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let mut entry = EntityTableEntry::default();
            reader.read_fields(ENTITY_TABLE_MAP.class_name, &mut entry, ENTITY_TABLE_MAP.fields)?;
            entry.restore_index = -1;
            table.push(entry);
        }
        reader.data.game_info.table = table;
        Ok(())
    }

    fn restore(
        &mut self,
        gs: &mut GameState,
        reader: &mut SaveReader<'_>,
        params: &RestoreParams,
    ) -> SaveResult<()> {
        let body_base = reader.tell();
        let count = reader.data.game_info.table.len();
        let mut overlay = vec![false; count];

        // pass one: create every entity so references resolve in pass two
        for i in 0..count {
            let (classname, globalname, flags, save_index) = {
                let entry = &reader.data.game_info.table[i];
                (
                    entry.classname.clone(),
                    entry.globalname.clone(),
                    entry.flags,
                    entry.save_index,
                )
            };
            if classname.is_empty() || flags.contains(EntFlags::REMOVED) {
                continue;
            }

            if params.is_transition && !globalname.is_empty() {
                if gs.globals.state(&globalname) == Some(GlobalEntState::Dead) {
                    continue;
                }
                if let Some(resident) = gs.entities.find_by_global_name(&globalname) {
                    reader.data.game_info.table[i].restore_index = resident;
                    overlay[i] = true;
                } else {
                    con_dprintf(&format!(
                        "global entity {} has no copy in this level\n",
                        globalname
                    ));
                }
                continue;
            }

            let ent = match gs.factory.create(&classname) {
                Some(ent) => ent,
                None => {
                    con_warning(&format!("can't create entity {}\n", classname));
                    continue;
                }
            };
            let restored_at = if classname == WORLD_CLASSNAME {
                gs.entities.spawn_at(0, ent)
            } else if flags.contains(EntFlags::PLAYER) {
                gs.entities.spawn_at(save_index, ent)
            } else {
                gs.entities.spawn(ent)
            };
            reader.data.game_info.table[i].restore_index = restored_at;
        }

        // pass two: apply each entity's data
        for i in 0..count {
            let (slot, location, globalname, landmark_model_space) = {
                let entry = &reader.data.game_info.table[i];
                (
                    entry.restore_index,
                    entry.location,
                    entry.globalname.clone(),
                    entry.landmark_model_space,
                )
            };
            if slot < 0 {
                continue;
            }

            reader.seek(body_base + location as usize)?;
            reader.data.game_info.current_entity = Some(slot);
            reader.global_mode = overlay[i];

            let keep = match gs.entities.get_mut(slot) {
                Some(ent) => match ent.restore(reader) {
                    Ok(()) => ent.is_valid_after_restore(),
                    Err(e) => {
                        con_warning(&format!("entity restore failed: {}\n", e));
                        false
                    }
                },
                None => false,
            };
            reader.global_mode = false;

            if !keep {
                gs.entities.remove(slot);
                reader.data.game_info.table[i].restore_index = -1;
                continue;
            }

            if overlay[i] {
                // re-anchor to this level's landmark
                let origin = vec3_sub(gs.level.landmark, landmark_model_space);
                if let Some(ent) = gs.entities.get_mut(slot) {
                    ent.set_origin(origin);
                }
                gs.globals.update_level(&globalname, &gs.level.map_name);
            }
        }
        reader.data.game_info.current_entity = None;
        Ok(())
    }

    fn post_restore(&mut self, gs: &mut GameState, data: &mut SaveRestoreData) {
        data.game_info.clear_entity_hash();
        for slot in 0..gs.entities.slot_count() {
            if let Some(ent) = gs.entities.get_mut(slot as i32) {
                ent.on_restore();
            }
        }
    }
}
