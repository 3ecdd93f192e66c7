// test_entities.rs — entity types and scenarios used by the test suite

use std::any::Any;

use vault_common::assets::TableAssets;
use vault_common::error::{SaveError, SaveResult};
use vault_common::types::{
    Color32, EntityIndex, Interval, Matrix3x4, Quaternion, VMatrix, Vec3, TICK_NEVER_THINK,
};

use crate::entity::{Entity, EntityFactory};
use crate::fields::{Accessor, DataMap, FieldDesc, FieldOps, Nested};
use crate::reader::SaveReader;
use crate::writer::SaveWriter;

// ============================================================
// Shared base data
// ============================================================

#[derive(Debug, Default, Clone, PartialEq)]
pub struct BaseData {
    pub origin: Vec3,
    pub health: i32,
    pub next_think: f32,
}

static BASE_DATA_FIELDS: &[FieldDesc<BaseData>] = &[
    FieldDesc::position(
        "origin",
        Accessor {
            get: |b: &BaseData, _| b.origin,
            set: |b: &mut BaseData, _, v| b.origin = v,
        },
    ),
    FieldDesc::integer(
        "health",
        Accessor {
            get: |b: &BaseData, _| b.health,
            set: |b: &mut BaseData, _, v| b.health = v,
        },
    ),
    FieldDesc::time(
        "nextThink",
        Accessor {
            get: |b: &BaseData, _| b.next_think,
            set: |b: &mut BaseData, _, v| b.next_think = v,
        },
    ),
];

pub static BASE_DATA_MAP: DataMap<BaseData> = DataMap {
    class_name: "BaseData",
    base: None,
    fields: BASE_DATA_FIELDS,
};

// ============================================================
// World
// ============================================================

#[derive(Default)]
pub struct World {
    pub skyname: String,
}

static WORLD_FIELDS: &[FieldDesc<World>] = &[FieldDesc::string(
    "skyname",
    Accessor {
        get: |w: &World, _| w.skyname.clone(),
        set: |w: &mut World, _, v| w.skyname = v,
    },
)];

pub static WORLD_MAP: DataMap<World> = DataMap {
    class_name: "World",
    base: None,
    fields: WORLD_FIELDS,
};

impl Entity for World {
    fn classname(&self) -> &str {
        "worldspawn"
    }
    fn origin(&self) -> Vec3 {
        [0.0; 3]
    }
    fn set_origin(&mut self, _origin: Vec3) {}
    fn save(&self, writer: &mut SaveWriter<'_>) -> SaveResult<()> {
        writer.write_all(self, &WORLD_MAP)
    }
    fn restore(&mut self, reader: &mut SaveReader<'_>) -> SaveResult<()> {
        reader.read_all(self, &WORLD_MAP)
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

// ============================================================
// Player
// ============================================================

#[derive(Default)]
pub struct Player {
    pub base: BaseData,
    pub items: [i32; 4],
}

static PLAYER_BASE: Nested<Player, BaseData> = Nested {
    map: &BASE_DATA_MAP,
    get: |p: &Player| &p.base,
    get_mut: |p: &mut Player| &mut p.base,
};

static PLAYER_FIELDS: &[FieldDesc<Player>] = &[FieldDesc::integer(
    "items",
    Accessor {
        get: |p: &Player, i| p.items[i],
        set: |p: &mut Player, i, v| p.items[i] = v,
    },
)
.array(4)];

pub static PLAYER_MAP: DataMap<Player> = DataMap {
    class_name: "Player",
    base: Some(&PLAYER_BASE),
    fields: PLAYER_FIELDS,
};

impl Entity for Player {
    fn classname(&self) -> &str {
        "player"
    }
    fn origin(&self) -> Vec3 {
        self.base.origin
    }
    fn set_origin(&mut self, origin: Vec3) {
        self.base.origin = origin;
    }
    fn is_player(&self) -> bool {
        true
    }
    fn is_moveable(&self) -> bool {
        true
    }
    fn save(&self, writer: &mut SaveWriter<'_>) -> SaveResult<()> {
        writer.write_all(self, &PLAYER_MAP)
    }
    fn restore(&mut self, reader: &mut SaveReader<'_>) -> SaveResult<()> {
        reader.read_all(self, &PLAYER_MAP)
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

// ============================================================
// Door, optionally global
// ============================================================

#[derive(Default)]
pub struct Door {
    pub base: BaseData,
    pub global: String,
    pub locked: bool,
    /// Level-local decoration; kept when a transitioned copy overlays this one.
    pub paint: i32,
    pub spawn_tick: i32,
}

static DOOR_BASE: Nested<Door, BaseData> = Nested {
    map: &BASE_DATA_MAP,
    get: |d: &Door| &d.base,
    get_mut: |d: &mut Door| &mut d.base,
};

static DOOR_FIELDS: &[FieldDesc<Door>] = &[
    FieldDesc::boolean(
        "locked",
        Accessor {
            get: |d: &Door, _| d.locked,
            set: |d: &mut Door, _, v| d.locked = v,
        },
    ),
    FieldDesc::integer(
        "paint",
        Accessor {
            get: |d: &Door, _| d.paint,
            set: |d: &mut Door, _, v| d.paint = v,
        },
    )
    .global(),
    FieldDesc::tick(
        "spawnTick",
        Accessor {
            get: |d: &Door, _| d.spawn_tick,
            set: |d: &mut Door, _, v| d.spawn_tick = v,
        },
    ),
];

pub static DOOR_MAP: DataMap<Door> = DataMap {
    class_name: "Door",
    base: Some(&DOOR_BASE),
    fields: DOOR_FIELDS,
};

impl Entity for Door {
    fn classname(&self) -> &str {
        "prop_door"
    }
    fn global_name(&self) -> &str {
        &self.global
    }
    fn origin(&self) -> Vec3 {
        self.base.origin
    }
    fn set_origin(&mut self, origin: Vec3) {
        self.base.origin = origin;
    }
    fn save(&self, writer: &mut SaveWriter<'_>) -> SaveResult<()> {
        writer.write_all(self, &DOOR_MAP)
    }
    fn restore(&mut self, reader: &mut SaveReader<'_>) -> SaveResult<()> {
        reader.read_all(self, &DOOR_MAP)
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

// ============================================================
// Info target, for entity reference fixup
// ============================================================

#[derive(Default)]
pub struct InfoTarget {
    pub base: BaseData,
    pub label: String,
    pub partner: Option<EntityIndex>,
    /// Not persisted; set by the post-restore notification.
    pub restored: bool,
}

static TARGET_BASE: Nested<InfoTarget, BaseData> = Nested {
    map: &BASE_DATA_MAP,
    get: |t: &InfoTarget| &t.base,
    get_mut: |t: &mut InfoTarget| &mut t.base,
};

static TARGET_FIELDS: &[FieldDesc<InfoTarget>] = &[
    FieldDesc::string(
        "label",
        Accessor {
            get: |t: &InfoTarget, _| t.label.clone(),
            set: |t: &mut InfoTarget, _, v| t.label = v,
        },
    ),
    FieldDesc::entity(
        "partner",
        Accessor {
            get: |t: &InfoTarget, _| t.partner,
            set: |t: &mut InfoTarget, _, v| t.partner = v,
        },
    ),
];

pub static TARGET_MAP: DataMap<InfoTarget> = DataMap {
    class_name: "InfoTarget",
    base: Some(&TARGET_BASE),
    fields: TARGET_FIELDS,
};

impl Entity for InfoTarget {
    fn classname(&self) -> &str {
        "info_target"
    }
    fn origin(&self) -> Vec3 {
        self.base.origin
    }
    fn set_origin(&mut self, origin: Vec3) {
        self.base.origin = origin;
    }
    fn on_restore(&mut self) {
        self.restored = true;
    }
    fn save(&self, writer: &mut SaveWriter<'_>) -> SaveResult<()> {
        writer.write_all(self, &TARGET_MAP)
    }
    fn restore(&mut self, reader: &mut SaveReader<'_>) -> SaveResult<()> {
        reader.read_all(self, &TARGET_MAP)
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

// ============================================================
// Entities with awkward restore behavior
// ============================================================

/// Never saved; occupies a slot so restored slot assignment shifts.
#[derive(Default)]
pub struct Ephemeral;

impl Entity for Ephemeral {
    fn classname(&self) -> &str {
        "env_ephemeral"
    }
    fn origin(&self) -> Vec3 {
        [0.0; 3]
    }
    fn set_origin(&mut self, _origin: Vec3) {}
    fn should_save(&self) -> bool {
        false
    }
    fn save(&self, _writer: &mut SaveWriter<'_>) -> SaveResult<()> {
        Ok(())
    }
    fn restore(&mut self, _reader: &mut SaveReader<'_>) -> SaveResult<()> {
        Ok(())
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Saves fine, always fails to restore.
#[derive(Default)]
pub struct Brittle {
    pub value: i32,
}

static BRITTLE_FIELDS: &[FieldDesc<Brittle>] = &[FieldDesc::integer(
    "value",
    Accessor {
        get: |b: &Brittle, _| b.value,
        set: |b: &mut Brittle, _, v| b.value = v,
    },
)];

pub static BRITTLE_MAP: DataMap<Brittle> = DataMap {
    class_name: "Brittle",
    base: None,
    fields: BRITTLE_FIELDS,
};

impl Entity for Brittle {
    fn classname(&self) -> &str {
        "brittle"
    }
    fn origin(&self) -> Vec3 {
        [0.0; 3]
    }
    fn set_origin(&mut self, _origin: Vec3) {}
    fn save(&self, writer: &mut SaveWriter<'_>) -> SaveResult<()> {
        writer.write_all(self, &BRITTLE_MAP)
    }
    fn restore(&mut self, _reader: &mut SaveReader<'_>) -> SaveResult<()> {
        Err(SaveError::Corrupt("brittle entity refused to load".to_string()))
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Restores, then vetoes its own existence.
#[derive(Default)]
pub struct Transient {
    pub value: i32,
}

static TRANSIENT_FIELDS: &[FieldDesc<Transient>] = &[FieldDesc::integer(
    "value",
    Accessor {
        get: |t: &Transient, _| t.value,
        set: |t: &mut Transient, _, v| t.value = v,
    },
)];

pub static TRANSIENT_MAP: DataMap<Transient> = DataMap {
    class_name: "Transient",
    base: None,
    fields: TRANSIENT_FIELDS,
};

impl Entity for Transient {
    fn classname(&self) -> &str {
        "transient"
    }
    fn origin(&self) -> Vec3 {
        [0.0; 3]
    }
    fn set_origin(&mut self, _origin: Vec3) {}
    fn is_valid_after_restore(&self) -> bool {
        false
    }
    fn save(&self, writer: &mut SaveWriter<'_>) -> SaveResult<()> {
        writer.write_all(self, &TRANSIENT_MAP)
    }
    fn restore(&mut self, reader: &mut SaveReader<'_>) -> SaveResult<()> {
        reader.read_all(self, &TRANSIENT_MAP)
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

pub fn test_factory() -> EntityFactory {
    let mut factory = EntityFactory::new();
    factory.register("worldspawn", || Box::<World>::default());
    factory.register("player", || Box::<Player>::default());
    factory.register("prop_door", || Box::<Door>::default());
    factory.register("info_target", || Box::<InfoTarget>::default());
    factory.register("brittle", || Box::<Brittle>::default());
    factory.register("transient", || Box::<Transient>::default());
    factory
}

// ============================================================
// One struct exercising every field kind
// ============================================================

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Inner {
    pub a: i32,
    pub b: f32,
}

static INNER_FIELDS: &[FieldDesc<Inner>] = &[
    FieldDesc::integer(
        "a",
        Accessor {
            get: |x: &Inner, _| x.a,
            set: |x: &mut Inner, _, v| x.a = v,
        },
    ),
    FieldDesc::float(
        "b",
        Accessor {
            get: |x: &Inner, _| x.b,
            set: |x: &mut Inner, _, v| x.b = v,
        },
    ),
];

pub static INNER_MAP: DataMap<Inner> = DataMap {
    class_name: "Inner",
    base: None,
    fields: INNER_FIELDS,
};

#[derive(Debug, Default, Clone, PartialEq)]
pub struct AllKinds {
    pub f: f32,
    pub times: [f32; 2],
    pub tick: i32,
    pub never_tick: i32,
    pub n: i32,
    pub s: i16,
    pub c: u8,
    pub flag: bool,
    pub text: String,
    pub model: String,
    pub sound: String,
    pub model_idx: i32,
    pub material_idx: i32,
    pub think: Option<String>,
    pub dir: Vec3,
    pub pos: Vec3,
    pub rot: Quaternion,
    pub tint: Color32,
    pub xform: Matrix3x4,
    pub world_xform: Matrix3x4,
    pub vmat: VMatrix,
    pub world_vmat: VMatrix,
    pub window: Interval,
    pub target: Option<EntityIndex>,
    pub inner: Inner,
    pub list: Vec<i32>,
}

static ALL_KINDS_INNER: Nested<AllKinds, Inner> = Nested {
    map: &INNER_MAP,
    get: |x: &AllKinds| &x.inner,
    get_mut: |x: &mut AllKinds| &mut x.inner,
};

struct ListOps;

impl FieldOps<AllKinds> for ListOps {
    fn save(&self, writer: &mut SaveWriter<'_>, obj: &AllKinds) -> SaveResult<()> {
        writer.write_int(obj.list.len() as i32)?;
        for v in &obj.list {
            writer.write_int(*v)?;
        }
        Ok(())
    }

    fn restore(&self, reader: &mut SaveReader<'_>, obj: &mut AllKinds) -> SaveResult<()> {
        let count = reader.read_int()?.max(0);
        obj.list.clear();
        for _ in 0..count {
            obj.list.push(reader.read_int()?);
        }
        Ok(())
    }

    fn is_empty(&self, obj: &AllKinds) -> bool {
        obj.list.is_empty()
    }

    fn make_empty(&self, obj: &mut AllKinds) {
        obj.list.clear();
    }
}

static LIST_OPS: ListOps = ListOps;

static ALL_KINDS_FIELDS: &[FieldDesc<AllKinds>] = &[
    FieldDesc::float(
        "f",
        Accessor {
            get: |x: &AllKinds, _| x.f,
            set: |x: &mut AllKinds, _, v| x.f = v,
        },
    ),
    FieldDesc::time(
        "times",
        Accessor {
            get: |x: &AllKinds, i| x.times[i],
            set: |x: &mut AllKinds, i, v| x.times[i] = v,
        },
    )
    .array(2),
    FieldDesc::tick(
        "tick",
        Accessor {
            get: |x: &AllKinds, _| x.tick,
            set: |x: &mut AllKinds, _, v| x.tick = v,
        },
    ),
    FieldDesc::tick(
        "neverTick",
        Accessor {
            get: |x: &AllKinds, _| x.never_tick,
            set: |x: &mut AllKinds, _, v| x.never_tick = v,
        },
    ),
    FieldDesc::integer(
        "n",
        Accessor {
            get: |x: &AllKinds, _| x.n,
            set: |x: &mut AllKinds, _, v| x.n = v,
        },
    ),
    FieldDesc::short(
        "s",
        Accessor {
            get: |x: &AllKinds, _| x.s,
            set: |x: &mut AllKinds, _, v| x.s = v,
        },
    ),
    FieldDesc::character(
        "c",
        Accessor {
            get: |x: &AllKinds, _| x.c,
            set: |x: &mut AllKinds, _, v| x.c = v,
        },
    ),
    FieldDesc::boolean(
        "flag",
        Accessor {
            get: |x: &AllKinds, _| x.flag,
            set: |x: &mut AllKinds, _, v| x.flag = v,
        },
    ),
    FieldDesc::string(
        "text",
        Accessor {
            get: |x: &AllKinds, _| x.text.clone(),
            set: |x: &mut AllKinds, _, v| x.text = v,
        },
    ),
    FieldDesc::model_name(
        "model",
        Accessor {
            get: |x: &AllKinds, _| x.model.clone(),
            set: |x: &mut AllKinds, _, v| x.model = v,
        },
    ),
    FieldDesc::sound_name(
        "sound",
        Accessor {
            get: |x: &AllKinds, _| x.sound.clone(),
            set: |x: &mut AllKinds, _, v| x.sound = v,
        },
    ),
    FieldDesc::model_index(
        "modelIdx",
        Accessor {
            get: |x: &AllKinds, _| x.model_idx,
            set: |x: &mut AllKinds, _, v| x.model_idx = v,
        },
    ),
    FieldDesc::material_index(
        "materialIdx",
        Accessor {
            get: |x: &AllKinds, _| x.material_idx,
            set: |x: &mut AllKinds, _, v| x.material_idx = v,
        },
    ),
    FieldDesc::function(
        "think",
        Accessor {
            get: |x: &AllKinds, _| x.think.clone(),
            set: |x: &mut AllKinds, _, v| x.think = v,
        },
    ),
    FieldDesc::vector(
        "dir",
        Accessor {
            get: |x: &AllKinds, _| x.dir,
            set: |x: &mut AllKinds, _, v| x.dir = v,
        },
    ),
    FieldDesc::position(
        "pos",
        Accessor {
            get: |x: &AllKinds, _| x.pos,
            set: |x: &mut AllKinds, _, v| x.pos = v,
        },
    ),
    FieldDesc::quaternion(
        "rot",
        Accessor {
            get: |x: &AllKinds, _| x.rot,
            set: |x: &mut AllKinds, _, v| x.rot = v,
        },
    ),
    FieldDesc::color(
        "tint",
        Accessor {
            get: |x: &AllKinds, _| x.tint,
            set: |x: &mut AllKinds, _, v| x.tint = v,
        },
    ),
    FieldDesc::matrix3x4(
        "xform",
        Accessor {
            get: |x: &AllKinds, _| x.xform,
            set: |x: &mut AllKinds, _, v| x.xform = v,
        },
    ),
    FieldDesc::matrix3x4_worldspace(
        "worldXform",
        Accessor {
            get: |x: &AllKinds, _| x.world_xform,
            set: |x: &mut AllKinds, _, v| x.world_xform = v,
        },
    ),
    FieldDesc::vmatrix(
        "vmat",
        Accessor {
            get: |x: &AllKinds, _| x.vmat,
            set: |x: &mut AllKinds, _, v| x.vmat = v,
        },
    ),
    FieldDesc::vmatrix_worldspace(
        "worldVmat",
        Accessor {
            get: |x: &AllKinds, _| x.world_vmat,
            set: |x: &mut AllKinds, _, v| x.world_vmat = v,
        },
    ),
    FieldDesc::interval(
        "window",
        Accessor {
            get: |x: &AllKinds, _| x.window,
            set: |x: &mut AllKinds, _, v| x.window = v,
        },
    ),
    FieldDesc::entity(
        "target",
        Accessor {
            get: |x: &AllKinds, _| x.target,
            set: |x: &mut AllKinds, _, v| x.target = v,
        },
    ),
    FieldDesc::embedded("inner", &ALL_KINDS_INNER),
    FieldDesc::custom("list", &LIST_OPS),
];

pub static ALL_KINDS_MAP: DataMap<AllKinds> = DataMap {
    class_name: "AllKinds",
    base: None,
    fields: ALL_KINDS_FIELDS,
};

/// Asset table with the names the tests use, pre-registered so index fields
/// resolve on both sides.
pub fn test_assets() -> TableAssets {
    let mut assets = TableAssets::new();
    assets.register_model("models/props/vault.mdl");
    assets.register_material("metal/vaultdoor");
    assets
}

// ============================================================
// Tests
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::{RestoreParams, SaveRestoreBlockHandler};
    use crate::game_info::{EntityTableEntry, SaveRestoreData};
    use crate::global_state::GlobalEntState;
    use crate::level::GameState;
    use crate::saverestore::{restore_game_state, save_game_state, standard_block_set};
    use vault_common::types::ZERO_TIME;

    fn fresh_data() -> SaveRestoreData {
        SaveRestoreData::new(256 * 1024)
    }

    /// Writer/reader pair over a table that maps slot 7 to ordinal 0 and
    /// back, so entity reference fields have something to resolve.
    fn data_with_entity_7() -> SaveRestoreData {
        let mut data = fresh_data();
        data.game_info.table.push(EntityTableEntry {
            id: 0,
            save_index: 7,
            restore_index: 7,
            ..Default::default()
        });
        data.game_info.build_entity_hash();
        data
    }

    fn filled_all_kinds(assets: &TableAssets) -> AllKinds {
        use vault_common::assets::AssetServices;
        AllKinds {
            f: 3.5,
            times: [0.0, 5.0],
            tick: 50,
            never_tick: TICK_NEVER_THINK,
            n: 1234,
            s: -12,
            c: 200,
            flag: true,
            text: "hello".to_string(),
            model: "models/props/vault.mdl".to_string(),
            sound: "doors/clang.wav".to_string(),
            model_idx: assets.model_index("models/props/vault.mdl"),
            material_idx: assets.material_index("metal/vaultdoor"),
            think: Some("DoorThink".to_string()),
            dir: [0.0, 1.0, 0.0],
            pos: [100.0, 200.0, 300.0],
            rot: [0.0, 0.0, 0.707, 0.707],
            tint: [255, 128, 0, 255],
            xform: [[1.0, 0.0, 0.0, 4.0], [0.0, 1.0, 0.0, 5.0], [0.0, 0.0, 1.0, 6.0]],
            world_xform: [
                [1.0, 0.0, 0.0, 10.0],
                [0.0, 1.0, 0.0, 20.0],
                [0.0, 0.0, 1.0, 30.0],
            ],
            vmat: [
                [1.0, 0.0, 0.0, 1.0],
                [0.0, 1.0, 0.0, 2.0],
                [0.0, 0.0, 1.0, 3.0],
                [0.0, 0.0, 0.0, 1.0],
            ],
            world_vmat: [
                [1.0, 0.0, 0.0, 40.0],
                [0.0, 1.0, 0.0, 50.0],
                [0.0, 0.0, 1.0, 60.0],
                [0.0, 0.0, 0.0, 1.0],
            ],
            window: Interval { start: 1.0, range: 2.0 },
            target: Some(7),
            inner: Inner { a: 9, b: 4.25 },
            list: vec![3, 1, 4, 1, 5],
        }
    }

    #[test]
    fn test_roundtrip_every_field_kind() {
        let mut assets = test_assets();
        let mut data = data_with_entity_7();
        let original = filled_all_kinds(&assets);

        {
            let mut writer = crate::writer::SaveWriter::new(&mut data, &mut assets);
            writer.write_all(&original, &ALL_KINDS_MAP).unwrap();
        }

        data.segment.rewind();
        let mut restored = AllKinds::default();
        {
            let mut reader = crate::reader::SaveReader::new(&mut data, &mut assets);
            reader.read_all(&mut restored, &ALL_KINDS_MAP).unwrap();
        }
        assert_eq!(original, restored);
    }

    #[test]
    fn test_time_and_tick_rebase() {
        let mut assets = test_assets();
        let mut data = data_with_entity_7();
        data.game_info.base_time = 10.0;
        data.game_info.base_tick = 20;

        let original = filled_all_kinds(&assets);
        {
            let mut writer = crate::writer::SaveWriter::new(&mut data, &mut assets);
            writer.write_all(&original, &ALL_KINDS_MAP).unwrap();
        }

        // resume at a later clock
        data.segment.rewind();
        data.game_info.base_time = 100.0;
        data.game_info.base_tick = 220;
        let mut restored = AllKinds::default();
        {
            let mut reader = crate::reader::SaveReader::new(&mut data, &mut assets);
            reader.read_all(&mut restored, &ALL_KINDS_MAP).unwrap();
        }

        // a zero time stays exactly zero; a live one shifts with the clock
        assert_eq!(restored.times[0], 0.0);
        assert_eq!(restored.times[1], 5.0 - 10.0 + 100.0);
        assert_eq!(restored.tick, 50 - 20 + 220);
        assert_eq!(restored.never_tick, TICK_NEVER_THINK);
    }

    #[test]
    fn test_landmark_rebase() {
        let mut assets = test_assets();
        let mut data = data_with_entity_7();
        data.game_info.landmark_offset = [10.0, 0.0, -5.0];

        let original = filled_all_kinds(&assets);
        {
            let mut writer = crate::writer::SaveWriter::new(&mut data, &mut assets);
            writer.write_all(&original, &ALL_KINDS_MAP).unwrap();
        }

        data.segment.rewind();
        data.game_info.landmark_offset = [110.0, 50.0, -5.0];
        let mut restored = AllKinds::default();
        {
            let mut reader = crate::reader::SaveReader::new(&mut data, &mut assets);
            reader.read_all(&mut restored, &ALL_KINDS_MAP).unwrap();
        }

        // positions shift by the landmark delta, direction vectors do not
        assert_eq!(restored.pos, [200.0, 250.0, 300.0]);
        assert_eq!(restored.dir, original.dir);
        assert_eq!(restored.world_xform[0][3], 110.0);
        assert_eq!(restored.world_xform[1][3], 70.0);
        assert_eq!(restored.world_vmat[2][3], 60.0);
        // non-worldspace transforms are untouched
        assert_eq!(restored.xform, original.xform);
        assert_eq!(restored.vmat, original.vmat);
    }

    #[test]
    fn test_position_at_landmark_rebases() {
        let mut assets = test_assets();
        let mut data = fresh_data();
        data.game_info.landmark_offset = [100.0, 0.0, 0.0];

        // an entity sitting exactly on the landmark goes over the wire as a
        // zero delta, which must still pick up the destination landmark
        let mut original = AllKinds::default();
        original.pos = [100.0, 0.0, 0.0];
        {
            let mut writer = crate::writer::SaveWriter::new(&mut data, &mut assets);
            writer.write_all(&original, &ALL_KINDS_MAP).unwrap();
        }

        data.segment.rewind();
        data.game_info.landmark_offset = [250.0, 40.0, 8.0];
        let mut restored = AllKinds::default();
        {
            let mut reader = crate::reader::SaveReader::new(&mut data, &mut assets);
            reader.read_all(&mut restored, &ALL_KINDS_MAP).unwrap();
        }
        assert_eq!(restored.pos, [250.0, 40.0, 8.0]);
    }

    #[test]
    fn test_default_fields_are_omitted() {
        let mut assets = test_assets();
        let mut data = fresh_data();

        // all defaults: the field set is just the 8-byte header record
        let empty = AllKinds::default();
        {
            let mut writer = crate::writer::SaveWriter::new(&mut data, &mut assets);
            writer.write_fields("AllKinds", &empty, ALL_KINDS_FIELDS).unwrap();
        }
        assert_eq!(data.segment.written(), 8);

        // absent records reset previously-held values
        data.segment.rewind();
        let mut assets2 = test_assets();
        let mut restored = filled_all_kinds(&assets2);
        {
            let mut reader = crate::reader::SaveReader::new(&mut data, &mut assets2);
            reader
                .read_fields("AllKinds", &mut restored, ALL_KINDS_FIELDS)
                .unwrap();
        }
        assert_eq!(restored, AllKinds::default());
    }

    #[test]
    fn test_single_nondefault_field_record() {
        let mut assets = test_assets();
        let mut data = fresh_data();

        let mut one = AllKinds::default();
        one.n = 42;
        {
            let mut writer = crate::writer::SaveWriter::new(&mut data, &mut assets);
            writer.write_fields("AllKinds", &one, ALL_KINDS_FIELDS).unwrap();
        }
        // header record (8) + one field record (4 + 4 payload)
        assert_eq!(data.segment.written(), 16);
    }

    #[test]
    fn test_unknown_field_is_skipped() {
        // reader's table lacks "n"; its record must be skipped cleanly
        static NARROW_FIELDS: &[FieldDesc<AllKinds>] = &[
            FieldDesc::float(
                "f",
                Accessor {
                    get: |x: &AllKinds, _| x.f,
                    set: |x: &mut AllKinds, _, v| x.f = v,
                },
            ),
            FieldDesc::boolean(
                "flag",
                Accessor {
                    get: |x: &AllKinds, _| x.flag,
                    set: |x: &mut AllKinds, _, v| x.flag = v,
                },
            ),
        ];

        let mut assets = test_assets();
        let mut data = fresh_data();
        let mut obj = AllKinds::default();
        obj.f = 1.5;
        obj.n = 99;
        obj.flag = true;
        {
            let mut writer = crate::writer::SaveWriter::new(&mut data, &mut assets);
            writer.write_fields("AllKinds", &obj, ALL_KINDS_FIELDS).unwrap();
        }

        data.segment.rewind();
        let mut restored = AllKinds::default();
        {
            let mut reader = crate::reader::SaveReader::new(&mut data, &mut assets);
            reader
                .read_fields("AllKinds", &mut restored, NARROW_FIELDS)
                .unwrap();
        }
        assert_eq!(restored.f, 1.5);
        assert!(restored.flag);
        assert_eq!(restored.n, 0);
    }

    #[test]
    fn test_struct_name_mismatch_rejected() {
        let mut assets = test_assets();
        let mut data = fresh_data();
        let obj = Inner { a: 1, b: 2.0 };
        {
            let mut writer = crate::writer::SaveWriter::new(&mut data, &mut assets);
            writer.write_fields("Inner", &obj, INNER_FIELDS).unwrap();
        }

        data.segment.rewind();
        let mut restored = Inner::default();
        let result = {
            let mut reader = crate::reader::SaveReader::new(&mut data, &mut assets);
            reader.read_fields("Outer", &mut restored, INNER_FIELDS)
        };
        assert!(matches!(result, Err(SaveError::StructMismatch { .. })));
    }

    #[test]
    fn test_base_fields_written_before_derived() {
        let mut assets = test_assets();
        let mut data = fresh_data();
        let mut door = Door::default();
        door.base.health = 75;
        door.locked = true;
        {
            let mut writer = crate::writer::SaveWriter::new(&mut data, &mut assets);
            writer.write_all(&door, &DOOR_MAP).unwrap();
        }

        // the first field set on the wire is the base struct's
        data.segment.rewind();
        let size = data.segment.read_u16().unwrap();
        let symbol = data.segment.read_u16().unwrap();
        assert_eq!(size, 4);
        assert_eq!(data.symbols.string_from_symbol(symbol), "BaseData");

        data.segment.rewind();
        let mut restored = Door::default();
        {
            let mut reader = crate::reader::SaveReader::new(&mut data, &mut assets);
            reader.read_all(&mut restored, &DOOR_MAP).unwrap();
        }
        assert_eq!(restored.base.health, 75);
        assert!(restored.locked);
    }

    #[test]
    fn test_zero_time_sentinel_on_wire() {
        let mut assets = test_assets();
        let mut data = fresh_data();
        data.game_info.base_time = 33.0;

        let mut b = BaseData::default();
        b.next_think = 0.0;
        b.health = 1; // keep the set non-empty
        {
            let mut writer = crate::writer::SaveWriter::new(&mut data, &mut assets);
            writer.write_fields("BaseData", &b, BASE_DATA_FIELDS).unwrap();
        }
        // nextThink is empty at zero, so it was omitted entirely
        data.segment.rewind();
        let count = {
            data.segment.skip(4).unwrap();
            data.segment.read_i32().unwrap()
        };
        assert_eq!(count, 1);

        // an array with a zero element carries the sentinel instead
        let mut data = fresh_data();
        data.game_info.base_time = 33.0;
        let obj = AllKinds {
            times: [0.0, 5.0],
            ..Default::default()
        };
        {
            let mut writer = crate::writer::SaveWriter::new(&mut data, &mut assets);
            writer.write_fields("AllKinds", &obj, ALL_KINDS_FIELDS).unwrap();
        }
        data.segment.rewind();
        data.segment.skip(8).unwrap(); // header record
        data.segment.skip(4).unwrap(); // field record header
        assert_eq!(data.segment.read_f32().unwrap(), ZERO_TIME);
        assert_eq!(data.segment.read_f32().unwrap(), 5.0 - 33.0);
    }

    // ------------------------------------------------------------
    // Whole-game scenarios
    // ------------------------------------------------------------

    fn build_level(map_name: &str) -> GameState {
        let mut gs = GameState::new();
        gs.factory = test_factory();
        gs.level.map_name = map_name.to_string();
        gs
    }

    #[test]
    fn test_full_save_restore() {
        let mut assets = test_assets();
        let mut gs = build_level("vault01");
        gs.level.time = 12.0;
        gs.level.tick_count = 720;

        gs.entities.spawn(Box::new(World {
            skyname: "sky_day01".to_string(),
        }));
        // slot 1 never saves, shifting restored slot assignment
        gs.entities.spawn(Box::new(Ephemeral));
        let player_slot = gs.entities.spawn(Box::new(Player {
            base: BaseData {
                origin: [16.0, 32.0, 64.0],
                health: 88,
                next_think: 12.5,
            },
            items: [1, 0, 3, 0],
        }));
        let a = gs.entities.spawn(Box::new(InfoTarget {
            label: "alpha".to_string(),
            ..Default::default()
        }));
        let b = gs.entities.spawn(Box::new(InfoTarget {
            label: "beta".to_string(),
            partner: Some(a),
            ..Default::default()
        }));
        if let Some(t) = gs.entities.get_mut(a) {
            t.as_any_mut().downcast_mut::<InfoTarget>().unwrap().partner = Some(b);
        }
        gs.globals.add("valve_main", "vault01", GlobalEntState::On);

        let mut data = fresh_data();
        let mut blocks = standard_block_set();
        let offsets =
            save_game_state(&mut gs, &mut data, &mut assets, &mut blocks, false).unwrap();

        let mut gs2 = build_level("vault01");
        gs2.level.time = 12.0;
        gs2.level.tick_count = 720;
        let mut blocks2 = standard_block_set();
        restore_game_state(&mut gs2, &mut data, &mut assets, &mut blocks2, &offsets, false)
            .unwrap();

        // world back at slot 0, player back in its exact slot
        assert!(gs2.entities.get(0).unwrap().as_any().downcast_ref::<World>().is_some());
        assert_eq!(
            gs2.entities
                .get(0)
                .unwrap()
                .as_any()
                .downcast_ref::<World>()
                .unwrap()
                .skyname,
            "sky_day01"
        );
        let player = gs2
            .entities
            .get(player_slot)
            .unwrap()
            .as_any()
            .downcast_ref::<Player>()
            .unwrap();
        assert_eq!(player.base.health, 88);
        assert_eq!(player.base.origin, [16.0, 32.0, 64.0]);
        assert_eq!(player.base.next_think, 12.5);
        assert_eq!(player.items, [1, 0, 3, 0]);

        // the unsaved entity is gone
        assert_eq!(gs2.entities.live_count(), 4);

        // partner references point at each other's restored slots
        let targets: Vec<(i32, &InfoTarget)> = gs2
            .entities
            .iter_live()
            .filter_map(|(i, e)| e.as_any().downcast_ref::<InfoTarget>().map(|t| (i, t)))
            .collect();
        assert_eq!(targets.len(), 2);
        let alpha = targets.iter().find(|(_, t)| t.label == "alpha").unwrap();
        let beta = targets.iter().find(|(_, t)| t.label == "beta").unwrap();
        assert_eq!(alpha.1.partner, Some(beta.0));
        assert_eq!(beta.1.partner, Some(alpha.0));
        assert!(alpha.1.restored && beta.1.restored);

        // globals block came along
        assert_eq!(gs2.globals.state("valve_main"), Some(GlobalEntState::On));
    }

    #[test]
    fn test_failed_entity_restore_is_removed() {
        let mut assets = test_assets();
        let mut gs = build_level("vault02");
        gs.entities.spawn(Box::new(World::default()));
        gs.entities.spawn(Box::new(Brittle { value: 5 }));
        gs.entities.spawn(Box::new(Transient { value: 6 }));
        gs.entities.spawn(Box::new(InfoTarget {
            label: "survivor".to_string(),
            ..Default::default()
        }));

        let mut data = fresh_data();
        let mut blocks = standard_block_set();
        let offsets =
            save_game_state(&mut gs, &mut data, &mut assets, &mut blocks, false).unwrap();

        let mut gs2 = build_level("vault02");
        let mut blocks2 = standard_block_set();
        restore_game_state(&mut gs2, &mut data, &mut assets, &mut blocks2, &offsets, false)
            .unwrap();

        // the failing and self-vetoing entities are gone, the rest loaded
        assert_eq!(gs2.entities.live_count(), 2);
        assert!(gs2
            .entities
            .iter_live()
            .all(|(_, e)| e.classname() != "brittle" && e.classname() != "transient"));
        assert!(gs2
            .entities
            .iter_live()
            .any(|(_, e)| e.classname() == "info_target"));
    }

    #[test]
    fn test_global_entity_overlay_on_transition() {
        let mut assets = test_assets();

        // level one: the door is locked, painted red, near landmark L1
        let mut gs1 = build_level("vault01");
        gs1.level.landmark_name = "transit_a".to_string();
        gs1.level.landmark = [100.0, 0.0, 0.0];
        gs1.entities.spawn(Box::new(World::default()));
        gs1.entities.spawn(Box::new(Door {
            base: BaseData {
                origin: [130.0, 10.0, 0.0],
                health: 40,
                next_think: 0.0,
            },
            global: "lab_door".to_string(),
            locked: true,
            paint: 1,
            spawn_tick: 0,
        }));
        gs1.globals.add("lab_door", "vault01", GlobalEntState::On);

        let mut data = fresh_data();
        let mut blocks = standard_block_set();
        let offsets =
            save_game_state(&mut gs1, &mut data, &mut assets, &mut blocks, true).unwrap();

        // level two already has its own copy, unlocked and painted blue
        let mut gs2 = build_level("vault02");
        // the registry rides along in memory across a transition
        gs2.globals = gs1.globals.clone();
        gs2.level.landmark_name = "transit_a".to_string();
        gs2.level.landmark = [-50.0, 20.0, 8.0];
        gs2.entities.spawn(Box::new(World::default()));
        let resident = gs2.entities.spawn(Box::new(Door {
            base: BaseData {
                origin: [0.0, 0.0, 0.0],
                health: 100,
                next_think: 0.0,
            },
            global: "lab_door".to_string(),
            locked: false,
            paint: 7,
            spawn_tick: 0,
        }));

        let mut blocks2 = standard_block_set();
        restore_game_state(&mut gs2, &mut data, &mut assets, &mut blocks2, &offsets, true)
            .unwrap();

        let door = gs2
            .entities
            .get(resident)
            .unwrap()
            .as_any()
            .downcast_ref::<Door>()
            .unwrap();
        // saved state overlaid the resident copy
        assert!(door.locked);
        assert_eq!(door.base.health, 40);
        // the GLOBAL-flagged field kept the resident value
        assert_eq!(door.paint, 7);
        // position re-anchored: L2 - (L1 - origin1)
        assert_eq!(door.base.origin, [-20.0, 30.0, 8.0]);
        // no duplicate door spawned
        assert_eq!(
            gs2.entities
                .iter_live()
                .filter(|(_, e)| e.classname() == "prop_door")
                .count(),
            1
        );
        // ownership moved to the new level
        assert_eq!(
            gs2.globals.find("lab_door").map(|g| g.level_name.as_str()),
            Some("vault02")
        );
    }

    #[test]
    fn test_dead_global_entity_not_restored() {
        let mut assets = test_assets();
        let mut gs1 = build_level("vault01");
        gs1.entities.spawn(Box::new(World::default()));
        gs1.entities.spawn(Box::new(Door {
            global: "lab_door".to_string(),
            locked: true,
            ..Default::default()
        }));
        gs1.globals.add("lab_door", "vault01", GlobalEntState::Dead);

        let mut data = fresh_data();
        let mut blocks = standard_block_set();
        let offsets =
            save_game_state(&mut gs1, &mut data, &mut assets, &mut blocks, true).unwrap();

        let mut gs2 = build_level("vault02");
        gs2.globals = gs1.globals.clone();
        gs2.entities.spawn(Box::new(World::default()));
        let resident = gs2.entities.spawn(Box::new(Door {
            global: "lab_door".to_string(),
            locked: false,
            ..Default::default()
        }));

        let mut blocks2 = standard_block_set();
        restore_game_state(&mut gs2, &mut data, &mut assets, &mut blocks2, &offsets, true)
            .unwrap();

        // the dead global's saved data never touched the resident copy
        let door = gs2
            .entities
            .get(resident)
            .unwrap()
            .as_any()
            .downcast_ref::<Door>()
            .unwrap();
        assert!(!door.locked);
    }

    #[test]
    fn test_blocks_fail_independently() {
        struct BogusHandler;
        impl SaveRestoreBlockHandler for BogusHandler {
            fn block_name(&self) -> &'static str {
                "Bogus"
            }
            fn save(
                &mut self,
                _gs: &mut GameState,
                writer: &mut crate::writer::SaveWriter<'_>,
            ) -> SaveResult<()> {
                writer.write_int(0xB06)
            }
            fn restore(
                &mut self,
                _gs: &mut GameState,
                _reader: &mut crate::reader::SaveReader<'_>,
                _params: &RestoreParams,
            ) -> SaveResult<()> {
                Err(SaveError::Corrupt("bogus block".to_string()))
            }
        }

        let mut assets = test_assets();
        let mut gs = build_level("vault03");
        gs.entities.spawn(Box::new(World {
            skyname: "sky_night".to_string(),
        }));
        gs.globals.add("g", "vault03", GlobalEntState::On);

        let mut blocks = standard_block_set();
        blocks.add(Box::new(BogusHandler));
        let mut data = fresh_data();
        let offsets =
            save_game_state(&mut gs, &mut data, &mut assets, &mut blocks, false).unwrap();

        let mut gs2 = build_level("vault03");
        let mut blocks2 = standard_block_set();
        blocks2.add(Box::new(BogusHandler));
        // the failing block is reported but the rest still load
        restore_game_state(&mut gs2, &mut data, &mut assets, &mut blocks2, &offsets, false)
            .unwrap();
        assert_eq!(
            gs2.entities
                .get(0)
                .unwrap()
                .as_any()
                .downcast_ref::<World>()
                .unwrap()
                .skyname,
            "sky_night"
        );
        assert_eq!(gs2.globals.state("g"), Some(GlobalEntState::On));
    }
}
