// writer.rs — serializes datamap-described structs into a save segment
//
// Wire format, all little-endian:
//   field set:  [header record][field record]*
//   header:     u16 size (always 4), u16 symbol of the struct name,
//               i32 count of field records that follow
//   field:      u16 payload size, u16 symbol of the field name, payload
//
// Fields holding their default value are omitted entirely; the reader resets
// every field to its default before applying records, so absence means
// default. Time, tick and world-position fields are rebased against the
// save's base time, base tick and landmark so they stay meaningful when the
// save is resumed at a different clock or in an adjacent level.

use vault_common::assets::AssetServices;
use vault_common::error::{SaveError, SaveResult};
use vault_common::types::{vec3_sub, Vec3, TICK_NEVER_THINK, TICK_NEVER_THINK_ENCODE, ZERO_TIME};

use crate::fields::{field_is_empty, DataMap, FieldAccess, FieldDesc, FieldFlags};
use crate::game_info::SaveRestoreData;

pub struct SaveWriter<'a> {
    pub data: &'a mut SaveRestoreData,
    pub assets: &'a mut dyn AssetServices,
    block_stack: Vec<usize>,
}

impl<'a> SaveWriter<'a> {
    pub fn new(data: &'a mut SaveRestoreData, assets: &'a mut dyn AssetServices) -> Self {
        Self {
            data,
            assets,
            block_stack: Vec::new(),
        }
    }

    /// Write a struct and its whole base chain, base fields first.
    pub fn write_all<T>(&mut self, obj: &T, map: &DataMap<T>) -> SaveResult<()> {
        if let Some(base) = map.base {
            base.write_all(self, obj)?;
        }
        self.write_fields(map.class_name, obj, map.fields)
    }

    /// Write one field set: header record plus one record per non-default
    /// field.
    pub fn write_fields<T>(
        &mut self,
        name: &str,
        obj: &T,
        fields: &[FieldDesc<T>],
    ) -> SaveResult<()> {
        // header record framing an i32 field count, backpatched once the
        // empty-field skips have played out
        let symbol = self.data.symbols.find_create_symbol(name)?;
        self.data.segment.write_u16(4)?;
        self.data.segment.write_u16(symbol)?;
        let count_pos = self.data.segment.tell();
        self.data.segment.write_i32(0)?;

        let mut count = 0i32;
        for desc in fields {
            if !desc.flags.contains(FieldFlags::SAVE) || field_is_empty(obj, desc) {
                continue;
            }
            self.write_field(obj, desc)?;
            count += 1;
        }
        self.data.segment.patch(count_pos, |seg| seg.write_i32(count))
    }

    fn write_field<T>(&mut self, obj: &T, desc: &FieldDesc<T>) -> SaveResult<()> {
        self.write_record(desc.name, |w| {
            for i in 0..desc.count {
                w.write_element(obj, desc, i)?;
            }
            Ok(())
        })
    }

    /// Frame a payload with the u16-size/u16-symbol record header. The size
    /// is backpatched once the payload length is known.
    fn write_record<F>(&mut self, name: &str, payload: F) -> SaveResult<()>
    where
        F: FnOnce(&mut Self) -> SaveResult<()>,
    {
        let symbol = self.data.symbols.find_create_symbol(name)?;
        let size_pos = self.data.segment.tell();
        self.data.segment.write_u16(0)?;
        self.data.segment.write_u16(symbol)?;
        let payload_start = self.data.segment.tell();

        payload(self)?;

        let size = self.data.segment.tell() - payload_start;
        let size = u16::try_from(size).map_err(|_| SaveError::SizeOverflow)?;
        self.data.segment.patch(size_pos, |seg| seg.write_u16(size))
    }

    fn write_element<T>(&mut self, obj: &T, desc: &FieldDesc<T>, i: usize) -> SaveResult<()> {
        let base_time = self.data.game_info.base_time;
        let base_tick = self.data.game_info.base_tick;
        let landmark = self.data.game_info.landmark_offset;

        match &desc.access {
            FieldAccess::Float(a) => self.data.segment.write_f32((a.get)(obj, i)),
            FieldAccess::Time(a) => {
                let v = (a.get)(obj, i);
                // zero means "unset"; keep it distinguishable after rebasing
                let encoded = if v == 0.0 { ZERO_TIME } else { v - base_time };
                self.data.segment.write_f32(encoded)
            }
            FieldAccess::Tick(a) => {
                let v = (a.get)(obj, i);
                let encoded = if v == TICK_NEVER_THINK {
                    TICK_NEVER_THINK_ENCODE
                } else {
                    v - base_tick
                };
                self.data.segment.write_i32(encoded)
            }
            FieldAccess::Integer(a) => self.data.segment.write_i32((a.get)(obj, i)),
            FieldAccess::Short(a) => self.data.segment.write_i16((a.get)(obj, i)),
            FieldAccess::Character(a) => self.data.segment.write_u8((a.get)(obj, i)),
            FieldAccess::Boolean(a) => self.data.segment.write_u8((a.get)(obj, i) as u8),
            FieldAccess::String(a)
            | FieldAccess::ModelName(a)
            | FieldAccess::SoundName(a) => self.write_cstr(&(a.get)(obj, i)),
            FieldAccess::ModelIndex(a) => {
                let name = self.assets.model_name((a.get)(obj, i));
                self.write_cstr(&name)
            }
            FieldAccess::MaterialIndex(a) => {
                let name = self.assets.material_name((a.get)(obj, i));
                self.write_cstr(&name)
            }
            FieldAccess::Function(a) => {
                let name = (a.get)(obj, i).unwrap_or_default();
                self.write_cstr(&name)
            }
            FieldAccess::Vector(a) => self.write_vec3((a.get)(obj, i)),
            FieldAccess::PositionVector(a) => {
                self.write_vec3(vec3_sub((a.get)(obj, i), landmark))
            }
            FieldAccess::Quaternion(a) => {
                let q = (a.get)(obj, i);
                for c in q {
                    self.data.segment.write_f32(c)?;
                }
                Ok(())
            }
            FieldAccess::Color(a) => self.data.segment.write(&(a.get)(obj, i)),
            FieldAccess::Matrix3x4(a) => self.write_mat3x4((a.get)(obj, i)),
            FieldAccess::Matrix3x4Worldspace(a) => {
                let mut m = (a.get)(obj, i);
                for row in 0..3 {
                    m[row][3] -= landmark[row];
                }
                self.write_mat3x4(m)
            }
            FieldAccess::VMatrix(a) => self.write_mat4x4((a.get)(obj, i)),
            FieldAccess::VMatrixWorldspace(a) => {
                let mut m = (a.get)(obj, i);
                for row in 0..3 {
                    m[row][3] -= landmark[row];
                }
                self.write_mat4x4(m)
            }
            FieldAccess::Interval(a) => {
                let iv = (a.get)(obj, i);
                self.data.segment.write_f32(iv.start)?;
                self.data.segment.write_f32(iv.range)
            }
            FieldAccess::Entity(a) => {
                let ordinal = match (a.get)(obj, i) {
                    Some(ent) => self.data.game_info.entity_index(ent),
                    None => -1,
                };
                self.data.segment.write_i32(ordinal)
            }
            FieldAccess::Embedded(nested) => nested.write_all(self, obj),
            FieldAccess::Custom(ops) => ops.save(self, obj),
        }
    }

    fn write_cstr(&mut self, s: &str) -> SaveResult<()> {
        self.data.segment.write(s.as_bytes())?;
        self.data.segment.write_u8(0)
    }

    fn write_vec3(&mut self, v: Vec3) -> SaveResult<()> {
        for c in v {
            self.data.segment.write_f32(c)?;
        }
        Ok(())
    }

    fn write_mat3x4(&mut self, m: [[f32; 4]; 3]) -> SaveResult<()> {
        for row in m {
            for v in row {
                self.data.segment.write_f32(v)?;
            }
        }
        Ok(())
    }

    fn write_mat4x4(&mut self, m: [[f32; 4]; 4]) -> SaveResult<()> {
        for row in m {
            for v in row {
                self.data.segment.write_f32(v)?;
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------
    // Raw helpers for block handlers
    // ------------------------------------------------------------

    pub fn write_int(&mut self, v: i32) -> SaveResult<()> {
        self.data.segment.write_i32(v)
    }

    pub fn write_short(&mut self, v: i16) -> SaveResult<()> {
        self.data.segment.write_i16(v)
    }

    /// Open a named, size-framed region. Readers that do not understand the
    /// block name can skip it wholesale.
    pub fn start_block(&mut self, name: &str) -> SaveResult<()> {
        let symbol = self.data.symbols.find_create_symbol(name)?;
        let size_pos = self.data.segment.tell();
        self.data.segment.write_u16(0)?;
        self.data.segment.write_u16(symbol)?;
        self.block_stack.push(size_pos);
        Ok(())
    }

    pub fn end_block(&mut self) -> SaveResult<()> {
        let size_pos = match self.block_stack.pop() {
            Some(p) => p,
            None => return Err(SaveError::Corrupt("end_block without start_block".to_string())),
        };
        let size = self.data.segment.tell() - (size_pos + 4);
        let size = u16::try_from(size).map_err(|_| SaveError::SizeOverflow)?;
        self.data.segment.patch(size_pos, |seg| seg.write_u16(size))
    }

    pub fn tell(&self) -> usize {
        self.data.segment.tell()
    }
}
