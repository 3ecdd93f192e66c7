// reader.rs — restores datamap-described structs from a save segment
//
// The reader is the forgiving half of the pair: unknown field names are
// skipped by their recorded size, short payloads apply as many elements as
// they hold, and a field set whose struct name does not match the datamap is
// rejected rather than misapplied. This keeps old saves loadable after
// fields are added, removed or reordered.

use vault_common::assets::AssetServices;
use vault_common::console::con_warning;
use vault_common::error::{SaveError, SaveResult};
use vault_common::types::{vec3_add, Vec3, TICK_NEVER_THINK, TICK_NEVER_THINK_ENCODE, ZERO_TIME};

use crate::fields::{empty_fields, find_field, DataMap, FieldAccess, FieldDesc, FieldFlags};
use crate::game_info::SaveRestoreData;

pub struct SaveReader<'a> {
    pub data: &'a mut SaveRestoreData,
    pub assets: &'a mut dyn AssetServices,
    /// Precache model/sound assets as their names are read.
    pub precache: bool,
    /// Restoring a transitioned global entity onto a resident copy; fields
    /// flagged GLOBAL keep the resident entity's values.
    pub global_mode: bool,
    block_stack: Vec<usize>,
}

impl<'a> SaveReader<'a> {
    pub fn new(data: &'a mut SaveRestoreData, assets: &'a mut dyn AssetServices) -> Self {
        Self {
            data,
            assets,
            precache: true,
            global_mode: false,
            block_stack: Vec::new(),
        }
    }

    /// Read a struct and its whole base chain, base fields first, mirroring
    /// the write order.
    pub fn read_all<T>(&mut self, obj: &mut T, map: &DataMap<T>) -> SaveResult<()> {
        if let Some(base) = map.base {
            base.read_all(self, obj)?;
        }
        self.read_fields(map.class_name, obj, map.fields)
    }

    /// Read one field set into `obj`. Every field is reset to its default
    /// first, so omitted records land on the default value.
    pub fn read_fields<T>(
        &mut self,
        name: &str,
        obj: &mut T,
        fields: &[FieldDesc<T>],
    ) -> SaveResult<()> {
        let header_size = self.data.segment.read_u16()?;
        let header_symbol = self.data.segment.read_u16()?;
        if header_size != 4 {
            return Err(SaveError::Corrupt(format!(
                "bad field set header size {}",
                header_size
            )));
        }
        let stored_name = self.data.symbols.string_from_symbol(header_symbol);
        if !stored_name.eq_ignore_ascii_case(name) {
            con_warning(&format!(
                "suspect save file: expected {}, found {}\n",
                name, stored_name
            ));
            return Err(SaveError::StructMismatch {
                expected: name.to_string(),
                found: stored_name.to_string(),
            });
        }
        let count = self.data.segment.read_i32()?;
        if count < 0 {
            return Err(SaveError::Corrupt(format!("bad field count {}", count)));
        }

        empty_fields(obj, fields, self.global_mode);

        // saved order usually matches table order; seed the search so the
        // first record hits table index 0 on the first probe
        let mut last_field = fields.len().saturating_sub(1);

        for _ in 0..count {
            let size = self.data.segment.read_u16()? as usize;
            let symbol = self.data.segment.read_u16()?;
            let field_name = self.data.symbols.string_from_symbol(symbol).to_string();

            match find_field(fields, &field_name, last_field) {
                Some(idx) => {
                    last_field = idx;
                    let desc = &fields[idx];
                    if self.global_mode && desc.flags.contains(FieldFlags::GLOBAL) {
                        self.data.segment.skip(size)?;
                        continue;
                    }
                    let start = self.data.segment.tell();
                    self.read_field(obj, desc, size)?;
                    let consumed = self.data.segment.tell() - start;
                    if consumed != size {
                        con_warning(&format!(
                            "field {} consumed {} of {} bytes\n",
                            field_name, consumed, size
                        ));
                        self.data.segment.seek(start + size)?;
                    }
                }
                None => {
                    // field no longer exists; ignore its data
                    self.data.segment.skip(size)?;
                }
            }
        }
        Ok(())
    }

    fn read_field<T>(&mut self, obj: &mut T, desc: &FieldDesc<T>, size: usize) -> SaveResult<()> {
        let end = self.data.segment.tell() + size;
        let base_time = self.data.game_info.base_time;
        let base_tick = self.data.game_info.base_tick;
        let landmark = self.data.game_info.landmark_offset;

        match &desc.access {
            FieldAccess::Float(a) => {
                for i in 0..desc.count.min(size / 4) {
                    let v = self.data.segment.read_f32()?;
                    (a.set)(obj, i, v);
                }
                Ok(())
            }
            FieldAccess::Time(a) => {
                for i in 0..desc.count.min(size / 4) {
                    let v = self.data.segment.read_f32()?;
                    let decoded = if v == ZERO_TIME { 0.0 } else { v + base_time };
                    (a.set)(obj, i, decoded);
                }
                Ok(())
            }
            FieldAccess::Tick(a) => {
                for i in 0..desc.count.min(size / 4) {
                    let v = self.data.segment.read_i32()?;
                    let decoded = if v == TICK_NEVER_THINK_ENCODE {
                        TICK_NEVER_THINK
                    } else {
                        v + base_tick
                    };
                    (a.set)(obj, i, decoded);
                }
                Ok(())
            }
            FieldAccess::Integer(a) => {
                for i in 0..desc.count.min(size / 4) {
                    let v = self.data.segment.read_i32()?;
                    (a.set)(obj, i, v);
                }
                Ok(())
            }
            FieldAccess::Short(a) => {
                for i in 0..desc.count.min(size / 2) {
                    let v = self.data.segment.read_i16()?;
                    (a.set)(obj, i, v);
                }
                Ok(())
            }
            FieldAccess::Character(a) => {
                for i in 0..desc.count.min(size) {
                    let v = self.data.segment.read_u8()?;
                    (a.set)(obj, i, v);
                }
                Ok(())
            }
            FieldAccess::Boolean(a) => {
                for i in 0..desc.count.min(size) {
                    let v = self.data.segment.read_u8()?;
                    (a.set)(obj, i, v != 0);
                }
                Ok(())
            }
            FieldAccess::String(a) => {
                for i in 0..desc.count {
                    if self.data.segment.tell() >= end {
                        break;
                    }
                    let s = self.read_cstr_bounded(end)?;
                    (a.set)(obj, i, s);
                }
                Ok(())
            }
            FieldAccess::ModelName(a) => {
                for i in 0..desc.count {
                    if self.data.segment.tell() >= end {
                        break;
                    }
                    let s = self.read_cstr_bounded(end)?;
                    if self.precache && !s.is_empty() {
                        self.assets.precache_model(&s);
                    }
                    (a.set)(obj, i, s);
                }
                Ok(())
            }
            FieldAccess::SoundName(a) => {
                for i in 0..desc.count {
                    if self.data.segment.tell() >= end {
                        break;
                    }
                    let s = self.read_cstr_bounded(end)?;
                    if self.precache && !s.is_empty() {
                        self.assets.precache_sound(&s);
                    }
                    (a.set)(obj, i, s);
                }
                Ok(())
            }
            FieldAccess::ModelIndex(a) => {
                for i in 0..desc.count {
                    if self.data.segment.tell() >= end {
                        break;
                    }
                    let s = self.read_cstr_bounded(end)?;
                    let idx = if s.is_empty() {
                        0
                    } else {
                        if self.precache {
                            self.assets.precache_model(&s);
                        }
                        self.assets.model_index(&s)
                    };
                    (a.set)(obj, i, idx);
                }
                Ok(())
            }
            FieldAccess::MaterialIndex(a) => {
                for i in 0..desc.count {
                    if self.data.segment.tell() >= end {
                        break;
                    }
                    let s = self.read_cstr_bounded(end)?;
                    let idx = if s.is_empty() {
                        0
                    } else {
                        if self.precache {
                            self.assets.precache_material(&s);
                        }
                        self.assets.material_index(&s)
                    };
                    (a.set)(obj, i, idx);
                }
                Ok(())
            }
            FieldAccess::Function(a) => {
                for i in 0..desc.count {
                    if self.data.segment.tell() >= end {
                        break;
                    }
                    let s = self.read_cstr_bounded(end)?;
                    (a.set)(obj, i, if s.is_empty() { None } else { Some(s) });
                }
                Ok(())
            }
            FieldAccess::Vector(a) => {
                for i in 0..desc.count.min(size / 12) {
                    let v = self.read_vec3()?;
                    (a.set)(obj, i, v);
                }
                Ok(())
            }
            FieldAccess::PositionVector(a) => {
                for i in 0..desc.count.min(size / 12) {
                    let v = self.read_vec3()?;
                    (a.set)(obj, i, vec3_add(v, landmark));
                }
                Ok(())
            }
            FieldAccess::Quaternion(a) => {
                for i in 0..desc.count.min(size / 16) {
                    let mut q = [0.0f32; 4];
                    for c in q.iter_mut() {
                        *c = self.data.segment.read_f32()?;
                    }
                    (a.set)(obj, i, q);
                }
                Ok(())
            }
            FieldAccess::Color(a) => {
                for i in 0..desc.count.min(size / 4) {
                    let mut c = [0u8; 4];
                    self.data.segment.read(&mut c)?;
                    (a.set)(obj, i, c);
                }
                Ok(())
            }
            FieldAccess::Matrix3x4(a) => {
                for i in 0..desc.count.min(size / 48) {
                    let m = self.read_mat3x4()?;
                    (a.set)(obj, i, m);
                }
                Ok(())
            }
            FieldAccess::Matrix3x4Worldspace(a) => {
                for i in 0..desc.count.min(size / 48) {
                    let mut m = self.read_mat3x4()?;
                    for row in 0..3 {
                        m[row][3] += landmark[row];
                    }
                    (a.set)(obj, i, m);
                }
                Ok(())
            }
            FieldAccess::VMatrix(a) => {
                for i in 0..desc.count.min(size / 64) {
                    let m = self.read_mat4x4()?;
                    (a.set)(obj, i, m);
                }
                Ok(())
            }
            FieldAccess::VMatrixWorldspace(a) => {
                for i in 0..desc.count.min(size / 64) {
                    let mut m = self.read_mat4x4()?;
                    for row in 0..3 {
                        m[row][3] += landmark[row];
                    }
                    (a.set)(obj, i, m);
                }
                Ok(())
            }
            FieldAccess::Interval(a) => {
                for i in 0..desc.count.min(size / 8) {
                    let start = self.data.segment.read_f32()?;
                    let range = self.data.segment.read_f32()?;
                    (a.set)(obj, i, vault_common::types::Interval { start, range });
                }
                Ok(())
            }
            FieldAccess::Entity(a) => {
                for i in 0..desc.count.min(size / 4) {
                    let ordinal = self.data.segment.read_i32()?;
                    (a.set)(obj, i, self.data.game_info.entity_from_index(ordinal));
                }
                Ok(())
            }
            FieldAccess::Embedded(nested) => nested.read_all(self, obj),
            FieldAccess::Custom(ops) => ops.restore(self, obj),
        }
    }

    fn read_cstr_bounded(&mut self, end: usize) -> SaveResult<String> {
        let mut bytes = Vec::new();
        while self.data.segment.tell() < end {
            let b = self.data.segment.read_u8()?;
            if b == 0 {
                break;
            }
            bytes.push(b);
        }
        match String::from_utf8(bytes) {
            Ok(s) => Ok(s),
            Err(_) => Err(SaveError::Corrupt("invalid utf-8 in string field".to_string())),
        }
    }

    fn read_vec3(&mut self) -> SaveResult<Vec3> {
        let mut v = [0.0f32; 3];
        for c in v.iter_mut() {
            *c = self.data.segment.read_f32()?;
        }
        Ok(v)
    }

    fn read_mat3x4(&mut self) -> SaveResult<[[f32; 4]; 3]> {
        let mut m = [[0.0f32; 4]; 3];
        for row in m.iter_mut() {
            for v in row.iter_mut() {
                *v = self.data.segment.read_f32()?;
            }
        }
        Ok(m)
    }

    fn read_mat4x4(&mut self) -> SaveResult<[[f32; 4]; 4]> {
        let mut m = [[0.0f32; 4]; 4];
        for row in m.iter_mut() {
            for v in row.iter_mut() {
                *v = self.data.segment.read_f32()?;
            }
        }
        Ok(m)
    }

    // ------------------------------------------------------------
    // Raw helpers for block handlers
    // ------------------------------------------------------------

    pub fn read_int(&mut self) -> SaveResult<i32> {
        self.data.segment.read_i32()
    }

    pub fn read_short(&mut self) -> SaveResult<i16> {
        self.data.segment.read_i16()
    }

    /// Enter a size-framed region written with the writer's `start_block`.
    /// Returns the block's name so callers can verify it.
    pub fn start_block(&mut self) -> SaveResult<String> {
        let size = self.data.segment.read_u16()? as usize;
        let symbol = self.data.segment.read_u16()?;
        let name = self.data.symbols.string_from_symbol(symbol).to_string();
        self.block_stack.push(self.data.segment.tell() + size);
        Ok(name)
    }

    /// Leave the current block, skipping whatever the reader did not consume.
    pub fn end_block(&mut self) -> SaveResult<()> {
        let end = match self.block_stack.pop() {
            Some(p) => p,
            None => return Err(SaveError::Corrupt("end_block without start_block".to_string())),
        };
        self.data.segment.seek(end)
    }

    pub fn tell(&self) -> usize {
        self.data.segment.tell()
    }

    pub fn seek(&mut self, pos: usize) -> SaveResult<()> {
        self.data.segment.seek(pos)
    }
}
