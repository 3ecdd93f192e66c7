// level.rs — current level context and the top-level game state

use vault_common::types::Vec3;

use crate::entity::{EntityFactory, EntityList};
use crate::global_state::GlobalEntityRegistry;

/// Clock and landmark context of the level being saved or restored.
#[derive(Debug, Clone, Default)]
pub struct LevelState {
    /// Current game time in seconds.
    pub time: f32,
    /// Current simulation tick.
    pub tick_count: i32,
    pub map_name: String,
    /// Name of the transition landmark, empty outside transitions.
    pub landmark_name: String,
    /// World position of the transition landmark in this level.
    pub landmark: Vec3,
}

/// Everything a save or restore operates on.
#[derive(Default)]
pub struct GameState {
    pub entities: EntityList,
    pub factory: EntityFactory,
    pub globals: GlobalEntityRegistry,
    pub level: LevelState,
}

impl GameState {
    pub fn new() -> Self {
        Self::default()
    }
}
