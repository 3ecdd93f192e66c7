// saverestore.rs — top-level save and restore entry points
//
// Stamps the rebase context from the current level, then hands the work to
// the block set. Positions are only landmark-relative when the save is made
// for a level transition; a full save keeps world coordinates as-is.

use vault_common::assets::AssetServices;
use vault_common::console::con_dprintf;
use vault_common::error::SaveResult;

use crate::blocks::{BlockSetOffsets, RestoreParams, SaveRestoreBlockSet};
use crate::entity_block::EntitySaveRestoreBlockHandler;
use crate::game_info::SaveRestoreData;
use crate::global_state::GlobalEntityBlockHandler;
use crate::level::GameState;

/// The block set every save uses: entities first (later blocks may carry
/// entity references, which only resolve once the table exists), then the
/// global entity registry.
pub fn standard_block_set() -> SaveRestoreBlockSet {
    let mut blocks = SaveRestoreBlockSet::new();
    blocks.add(Box::new(EntitySaveRestoreBlockHandler));
    blocks.add(Box::new(GlobalEntityBlockHandler));
    blocks
}

/// Serialize the game state into `data`. `for_transition` saves are rebased
/// against the level's landmark so they can be resumed in an adjacent level.
pub fn save_game_state(
    gs: &mut GameState,
    data: &mut SaveRestoreData,
    assets: &mut dyn AssetServices,
    blocks: &mut SaveRestoreBlockSet,
    for_transition: bool,
) -> SaveResult<BlockSetOffsets> {
    con_dprintf(&format!("saving level {}\n", gs.level.map_name));

    data.game_info.base_time = gs.level.time;
    data.game_info.base_tick = gs.level.tick_count;
    data.game_info.landmark_offset = if for_transition {
        gs.level.landmark
    } else {
        [0.0; 3]
    };
    data.game_info.current_map_name = gs.level.map_name.clone();

    blocks.save(gs, data, assets)
}

/// Rebuild the game state from `data`. The level's current time, tick and
/// landmark become the new anchors for every rebased field.
pub fn restore_game_state(
    gs: &mut GameState,
    data: &mut SaveRestoreData,
    assets: &mut dyn AssetServices,
    blocks: &mut SaveRestoreBlockSet,
    offsets: &BlockSetOffsets,
    is_transition: bool,
) -> SaveResult<()> {
    con_dprintf(&format!("restoring level {}\n", gs.level.map_name));

    data.game_info.base_time = gs.level.time;
    data.game_info.base_tick = gs.level.tick_count;
    data.game_info.landmark_offset = if is_transition {
        gs.level.landmark
    } else {
        [0.0; 3]
    };

    blocks.restore(gs, data, assets, offsets, &RestoreParams { is_transition })
}
