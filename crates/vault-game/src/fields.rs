// fields.rs — field descriptors and datamaps
//
// Every persistable struct carries a static table of field descriptors, one
// per saved member. A descriptor names the field, says how many elements it
// holds, and carries typed accessor functions into the owning struct. The
// writer and reader walk these tables instead of knowing any concrete type.

use bitflags::bitflags;
use vault_common::types::{Color32, EntityIndex, Interval, Matrix3x4, Quaternion, VMatrix, Vec3};

use crate::reader::SaveReader;
use crate::writer::SaveWriter;
use vault_common::error::SaveResult;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FieldFlags: u16 {
        /// Field is part of cross-level global entity identity; skipped when
        /// overlaying a transitioned global entity onto a resident one.
        const GLOBAL = 0x0001;
        /// Field participates in save/restore. All descriptor constructors
        /// set this.
        const SAVE = 0x0002;
        /// Field can also be set from map keyvalues.
        const KEY = 0x0004;
        /// Field refers to a registered function by name.
        const FUNCTIONTABLE = 0x0008;
    }
}

/// Typed element accessor pair. The index selects the element for array
/// fields; scalar fields are always accessed with index 0.
pub struct Accessor<T: 'static, V> {
    pub get: fn(&T, usize) -> V,
    pub set: fn(&mut T, usize, V),
}

impl<T: 'static, V> Clone for Accessor<T, V> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T: 'static, V> Copy for Accessor<T, V> {}

/// How a field is read from and written to its owning struct.
pub enum FieldAccess<T: 'static> {
    Float(Accessor<T, f32>),
    /// Absolute game time; rebased against the save's base time on the wire.
    Time(Accessor<T, f32>),
    /// Absolute tick count; rebased against the save's base tick.
    Tick(Accessor<T, i32>),
    Integer(Accessor<T, i32>),
    Short(Accessor<T, i16>),
    Character(Accessor<T, u8>),
    Boolean(Accessor<T, bool>),
    String(Accessor<T, String>),
    /// Model path; precached on restore.
    ModelName(Accessor<T, String>),
    /// Sound path; precached on restore.
    SoundName(Accessor<T, String>),
    /// Per-level model index; persisted by name.
    ModelIndex(Accessor<T, i32>),
    /// Per-level material index; persisted by name.
    MaterialIndex(Accessor<T, i32>),
    /// Think/touch/use callback, persisted as its registered name.
    Function(Accessor<T, Option<String>>),
    Vector(Accessor<T, Vec3>),
    /// World position; rebased against the transition landmark.
    PositionVector(Accessor<T, Vec3>),
    Quaternion(Accessor<T, Quaternion>),
    Color(Accessor<T, Color32>),
    Matrix3x4(Accessor<T, Matrix3x4>),
    /// Transform whose translation is a world position.
    Matrix3x4Worldspace(Accessor<T, Matrix3x4>),
    VMatrix(Accessor<T, VMatrix>),
    VMatrixWorldspace(Accessor<T, VMatrix>),
    Interval(Accessor<T, Interval>),
    /// Reference to another entity, persisted as its save-table ordinal.
    Entity(Accessor<T, Option<EntityIndex>>),
    /// A struct member with its own datamap, written as a nested field set.
    Embedded(&'static dyn NestedMap<T>),
    /// Field with bespoke wire format.
    Custom(&'static dyn FieldOps<T>),
}

/// Field kind for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Float,
    Time,
    Tick,
    Integer,
    Short,
    Character,
    Boolean,
    String,
    ModelName,
    SoundName,
    ModelIndex,
    MaterialIndex,
    Function,
    Vector,
    PositionVector,
    Quaternion,
    Color,
    Matrix3x4,
    Matrix3x4Worldspace,
    VMatrix,
    VMatrixWorldspace,
    Interval,
    Entity,
    Embedded,
    Custom,
}

pub struct FieldDesc<T: 'static> {
    pub name: &'static str,
    pub flags: FieldFlags,
    pub count: usize,
    pub access: FieldAccess<T>,
}

/// Generates a descriptor constructor for one plain field kind.
macro_rules! field_ctor {
    ($fn_name:ident, $variant:ident, $value:ty) => {
        pub const fn $fn_name(name: &'static str, access: Accessor<T, $value>) -> Self {
            Self {
                name,
                flags: FieldFlags::SAVE,
                count: 1,
                access: FieldAccess::$variant(access),
            }
        }
    };
}

impl<T: 'static> FieldDesc<T> {
    field_ctor!(float, Float, f32);
    field_ctor!(time, Time, f32);
    field_ctor!(tick, Tick, i32);
    field_ctor!(integer, Integer, i32);
    field_ctor!(short, Short, i16);
    field_ctor!(character, Character, u8);
    field_ctor!(boolean, Boolean, bool);
    field_ctor!(string, String, String);
    field_ctor!(model_name, ModelName, String);
    field_ctor!(sound_name, SoundName, String);
    field_ctor!(model_index, ModelIndex, i32);
    field_ctor!(material_index, MaterialIndex, i32);
    field_ctor!(vector, Vector, Vec3);
    field_ctor!(position, PositionVector, Vec3);
    field_ctor!(quaternion, Quaternion, Quaternion);
    field_ctor!(color, Color, Color32);
    field_ctor!(matrix3x4, Matrix3x4, Matrix3x4);
    field_ctor!(matrix3x4_worldspace, Matrix3x4Worldspace, Matrix3x4);
    field_ctor!(vmatrix, VMatrix, VMatrix);
    field_ctor!(vmatrix_worldspace, VMatrixWorldspace, VMatrix);
    field_ctor!(interval, Interval, Interval);
    field_ctor!(entity, Entity, Option<EntityIndex>);

    pub const fn function(name: &'static str, access: Accessor<T, Option<String>>) -> Self {
        Self {
            name,
            flags: FieldFlags::from_bits_retain(
                FieldFlags::SAVE.bits() | FieldFlags::FUNCTIONTABLE.bits(),
            ),
            count: 1,
            access: FieldAccess::Function(access),
        }
    }

    pub const fn embedded(name: &'static str, nested: &'static dyn NestedMap<T>) -> Self {
        Self {
            name,
            flags: FieldFlags::SAVE,
            count: 1,
            access: FieldAccess::Embedded(nested),
        }
    }

    pub const fn custom(name: &'static str, ops: &'static dyn FieldOps<T>) -> Self {
        Self {
            name,
            flags: FieldFlags::SAVE,
            count: 1,
            access: FieldAccess::Custom(ops),
        }
    }

    /// Make this an array field of `count` elements.
    pub const fn array(mut self, count: usize) -> Self {
        self.count = count;
        self
    }

    /// Mark this field as part of global entity identity.
    pub const fn global(mut self) -> Self {
        self.flags = FieldFlags::from_bits_retain(self.flags.bits() | FieldFlags::GLOBAL.bits());
        self
    }

    /// Mark this field as also settable from map keyvalues.
    pub const fn keyfield(mut self) -> Self {
        self.flags = FieldFlags::from_bits_retain(self.flags.bits() | FieldFlags::KEY.bits());
        self
    }

    pub fn field_type(&self) -> FieldType {
        match self.access {
            FieldAccess::Float(_) => FieldType::Float,
            FieldAccess::Time(_) => FieldType::Time,
            FieldAccess::Tick(_) => FieldType::Tick,
            FieldAccess::Integer(_) => FieldType::Integer,
            FieldAccess::Short(_) => FieldType::Short,
            FieldAccess::Character(_) => FieldType::Character,
            FieldAccess::Boolean(_) => FieldType::Boolean,
            FieldAccess::String(_) => FieldType::String,
            FieldAccess::ModelName(_) => FieldType::ModelName,
            FieldAccess::SoundName(_) => FieldType::SoundName,
            FieldAccess::ModelIndex(_) => FieldType::ModelIndex,
            FieldAccess::MaterialIndex(_) => FieldType::MaterialIndex,
            FieldAccess::Function(_) => FieldType::Function,
            FieldAccess::Vector(_) => FieldType::Vector,
            FieldAccess::PositionVector(_) => FieldType::PositionVector,
            FieldAccess::Quaternion(_) => FieldType::Quaternion,
            FieldAccess::Color(_) => FieldType::Color,
            FieldAccess::Matrix3x4(_) => FieldType::Matrix3x4,
            FieldAccess::Matrix3x4Worldspace(_) => FieldType::Matrix3x4Worldspace,
            FieldAccess::VMatrix(_) => FieldType::VMatrix,
            FieldAccess::VMatrixWorldspace(_) => FieldType::VMatrixWorldspace,
            FieldAccess::Interval(_) => FieldType::Interval,
            FieldAccess::Entity(_) => FieldType::Entity,
            FieldAccess::Embedded(_) => FieldType::Embedded,
            FieldAccess::Custom(_) => FieldType::Custom,
        }
    }
}

/// Static description of a persistable struct: its saved name, optional base
/// struct, and field table. Base fields are written before derived fields.
pub struct DataMap<T: 'static> {
    pub class_name: &'static str,
    pub base: Option<&'static dyn NestedMap<T>>,
    pub fields: &'static [FieldDesc<T>],
}

/// A datamap viewed through a projection: either a base struct embedded in a
/// derived one, or an embedded member field. Erases the inner type so field
/// tables stay homogeneous in the outer type.
pub trait NestedMap<T>: Sync {
    fn class_name(&self) -> &'static str;
    fn write_all(&self, writer: &mut SaveWriter<'_>, obj: &T) -> SaveResult<()>;
    fn read_all(&self, reader: &mut SaveReader<'_>, obj: &mut T) -> SaveResult<()>;
    fn make_empty(&self, obj: &mut T);
    fn is_empty(&self, _obj: &T) -> bool {
        false
    }
}

/// Concrete projection from an outer struct `T` to an inner struct `B` with
/// its own datamap.
pub struct Nested<T: 'static, B: 'static> {
    pub map: &'static DataMap<B>,
    pub get: fn(&T) -> &B,
    pub get_mut: fn(&mut T) -> &mut B,
}

impl<T: 'static, B: 'static> NestedMap<T> for Nested<T, B> {
    fn class_name(&self) -> &'static str {
        self.map.class_name
    }

    fn write_all(&self, writer: &mut SaveWriter<'_>, obj: &T) -> SaveResult<()> {
        writer.write_all((self.get)(obj), self.map)
    }

    fn read_all(&self, reader: &mut SaveReader<'_>, obj: &mut T) -> SaveResult<()> {
        reader.read_all((self.get_mut)(obj), self.map)
    }

    fn make_empty(&self, obj: &mut T) {
        empty_all((self.get_mut)(obj), self.map);
    }

    fn is_empty(&self, obj: &T) -> bool {
        map_is_empty((self.get)(obj), self.map)
    }
}

/// Custom wire format for a single field.
pub trait FieldOps<T>: Sync {
    fn save(&self, writer: &mut SaveWriter<'_>, obj: &T) -> SaveResult<()>;
    fn restore(&self, reader: &mut SaveReader<'_>, obj: &mut T) -> SaveResult<()>;
    fn is_empty(&self, _obj: &T) -> bool {
        false
    }
    fn make_empty(&self, _obj: &mut T) {}
}

// ============================================================
// Default-value handling
// ============================================================

fn zero_mat3x4(m: Matrix3x4) -> bool {
    m.iter().all(|row| row.iter().all(|&v| v == 0.0))
}

fn zero_mat4x4(m: VMatrix) -> bool {
    m.iter().all(|row| row.iter().all(|&v| v == 0.0))
}

/// True when element `i` of the field holds its default value and can be
/// omitted from the save.
pub fn element_is_empty<T>(obj: &T, desc: &FieldDesc<T>, i: usize) -> bool {
    match &desc.access {
        FieldAccess::Float(a) | FieldAccess::Time(a) => (a.get)(obj, i) == 0.0,
        FieldAccess::Tick(a) | FieldAccess::Integer(a) => (a.get)(obj, i) == 0,
        FieldAccess::ModelIndex(a) | FieldAccess::MaterialIndex(a) => (a.get)(obj, i) == 0,
        FieldAccess::Short(a) => (a.get)(obj, i) == 0,
        FieldAccess::Character(a) => (a.get)(obj, i) == 0,
        FieldAccess::Boolean(a) => !(a.get)(obj, i),
        FieldAccess::String(a) | FieldAccess::ModelName(a) | FieldAccess::SoundName(a) => {
            (a.get)(obj, i).is_empty()
        }
        FieldAccess::Function(a) => (a.get)(obj, i).is_none(),
        FieldAccess::Vector(a) | FieldAccess::PositionVector(a) => {
            let v = (a.get)(obj, i);
            v == [0.0; 3]
        }
        FieldAccess::Quaternion(a) => (a.get)(obj, i) == [0.0; 4],
        FieldAccess::Color(a) => (a.get)(obj, i) == [0; 4],
        FieldAccess::Matrix3x4(a) | FieldAccess::Matrix3x4Worldspace(a) => {
            zero_mat3x4((a.get)(obj, i))
        }
        FieldAccess::VMatrix(a) | FieldAccess::VMatrixWorldspace(a) => {
            zero_mat4x4((a.get)(obj, i))
        }
        FieldAccess::Interval(a) => {
            let iv = (a.get)(obj, i);
            iv.start == 0.0 && iv.range == 0.0
        }
        FieldAccess::Entity(a) => (a.get)(obj, i).is_none(),
        FieldAccess::Embedded(nested) => nested.is_empty(obj),
        FieldAccess::Custom(ops) => ops.is_empty(obj),
    }
}

/// True when every element of the field holds its default value.
pub fn field_is_empty<T>(obj: &T, desc: &FieldDesc<T>) -> bool {
    (0..desc.count).all(|i| element_is_empty(obj, desc, i))
}

/// Reset one field to its default in every element.
pub fn empty_field<T>(obj: &mut T, desc: &FieldDesc<T>) {
    for i in 0..desc.count {
        match &desc.access {
            FieldAccess::Float(a) | FieldAccess::Time(a) => (a.set)(obj, i, 0.0),
            FieldAccess::Tick(a) | FieldAccess::Integer(a) => (a.set)(obj, i, 0),
            FieldAccess::ModelIndex(a) | FieldAccess::MaterialIndex(a) => (a.set)(obj, i, 0),
            FieldAccess::Short(a) => (a.set)(obj, i, 0),
            FieldAccess::Character(a) => (a.set)(obj, i, 0),
            FieldAccess::Boolean(a) => (a.set)(obj, i, false),
            FieldAccess::String(a) | FieldAccess::ModelName(a) | FieldAccess::SoundName(a) => {
                (a.set)(obj, i, String::new())
            }
            FieldAccess::Function(a) => (a.set)(obj, i, None),
            FieldAccess::Vector(a) | FieldAccess::PositionVector(a) => (a.set)(obj, i, [0.0; 3]),
            FieldAccess::Quaternion(a) => (a.set)(obj, i, [0.0; 4]),
            FieldAccess::Color(a) => (a.set)(obj, i, [0; 4]),
            FieldAccess::Matrix3x4(a) | FieldAccess::Matrix3x4Worldspace(a) => {
                (a.set)(obj, i, [[0.0; 4]; 3])
            }
            FieldAccess::VMatrix(a) | FieldAccess::VMatrixWorldspace(a) => {
                (a.set)(obj, i, [[0.0; 4]; 4])
            }
            FieldAccess::Interval(a) => (a.set)(obj, i, Interval::default()),
            FieldAccess::Entity(a) => (a.set)(obj, i, None),
            FieldAccess::Embedded(nested) => nested.make_empty(obj),
            FieldAccess::Custom(ops) => ops.make_empty(obj),
        }
    }
}

/// Reset a field table to defaults. When `skip_global` is set, fields flagged
/// GLOBAL keep their current values; used when overlaying a transitioned
/// global entity onto the resident copy.
pub fn empty_fields<T>(obj: &mut T, fields: &[FieldDesc<T>], skip_global: bool) {
    for desc in fields {
        if skip_global && desc.flags.contains(FieldFlags::GLOBAL) {
            continue;
        }
        empty_field(obj, desc);
    }
}

/// True when every field in the datamap chain holds its default value.
pub fn map_is_empty<T>(obj: &T, map: &DataMap<T>) -> bool {
    if let Some(base) = map.base {
        if !base.is_empty(obj) {
            return false;
        }
    }
    map.fields.iter().all(|d| field_is_empty(obj, d))
}

/// Reset an entire datamap chain to defaults, base structs included.
pub fn empty_all<T>(obj: &mut T, map: &DataMap<T>) {
    if let Some(base) = map.base {
        base.make_empty(obj);
    }
    empty_fields(obj, map.fields, false);
}

/// Locate a field by name, starting just past the previous hit. Saved field
/// order almost always matches table order, so the common case is one probe.
/// Names compare case-insensitively.
pub fn find_field<T>(fields: &[FieldDesc<T>], name: &str, last: usize) -> Option<usize> {
    let len = fields.len();
    if len == 0 {
        return None;
    }
    let start = if last + 1 >= len { 0 } else { last + 1 };
    for probe in 0..len {
        let idx = (start + probe) % len;
        if fields[idx].name.eq_ignore_ascii_case(name) {
            return Some(idx);
        }
    }
    None
}
