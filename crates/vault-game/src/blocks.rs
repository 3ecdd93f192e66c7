// blocks.rs — save file organized as independent named blocks
//
// A save is a sequence of block bodies, then a region of per-block header
// blobs, then a trailing array describing both. Each block is written and
// restored by its registered handler. Blocks fail independently: a handler
// that errors on restore is skipped with a warning and the remaining blocks
// still load.

use vault_common::assets::AssetServices;
use vault_common::console::con_warning;
use vault_common::error::SaveResult;

use crate::fields::{Accessor, FieldDesc};
use crate::game_info::SaveRestoreData;
use crate::level::GameState;
use crate::reader::SaveReader;
use crate::writer::SaveWriter;

/// Where one block's data lives, relative to the block set's base offsets.
#[derive(Debug, Clone, Default)]
pub struct BlockHeader {
    pub name: String,
    /// Offset of the header blob, -1 when the block wrote none.
    pub loc_header: i32,
    /// Offset of the body.
    pub loc_body: i32,
}

pub static BLOCK_HEADER_FIELDS: &[FieldDesc<BlockHeader>] = &[
    FieldDesc::string(
        "name",
        Accessor {
            get: |h: &BlockHeader, _| h.name.clone(),
            set: |h: &mut BlockHeader, _, v| h.name = v,
        },
    ),
    FieldDesc::integer(
        "locHeader",
        Accessor {
            get: |h: &BlockHeader, _| h.loc_header,
            set: |h: &mut BlockHeader, _, v| h.loc_header = v,
        },
    ),
    FieldDesc::integer(
        "locBody",
        Accessor {
            get: |h: &BlockHeader, _| h.loc_body,
            set: |h: &mut BlockHeader, _, v| h.loc_body = v,
        },
    ),
];

#[derive(Debug, Clone, Copy, Default)]
pub struct RestoreParams {
    /// Restoring across a level transition rather than from a full save.
    pub is_transition: bool,
}

/// Segment offsets a loader needs to drive `SaveRestoreBlockSet::restore`.
/// Stored in the save file header.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlockSetOffsets {
    pub body_base: usize,
    pub header_base: usize,
    pub array_pos: usize,
}

/// One subsystem's hooks into the save file. Save order per handler:
/// pre_save, save, write_save_headers, post_save. Restore order mirrors it.
pub trait SaveRestoreBlockHandler {
    fn block_name(&self) -> &'static str;

    fn pre_save(&mut self, _gs: &mut GameState, _data: &mut SaveRestoreData) {}

    /// Write the block body.
    fn save(&mut self, gs: &mut GameState, writer: &mut SaveWriter<'_>) -> SaveResult<()>;

    /// Write the block's header blob, read back before any body on restore.
    fn write_save_headers(
        &mut self,
        _gs: &mut GameState,
        _writer: &mut SaveWriter<'_>,
    ) -> SaveResult<()> {
        Ok(())
    }

    fn post_save(&mut self, _gs: &mut GameState, _data: &mut SaveRestoreData) {}

    fn pre_restore(&mut self, _gs: &mut GameState, _data: &mut SaveRestoreData) {}

    fn read_restore_headers(
        &mut self,
        _gs: &mut GameState,
        _reader: &mut SaveReader<'_>,
    ) -> SaveResult<()> {
        Ok(())
    }

    /// Read the block body.
    fn restore(
        &mut self,
        gs: &mut GameState,
        reader: &mut SaveReader<'_>,
        params: &RestoreParams,
    ) -> SaveResult<()>;

    fn post_restore(&mut self, _gs: &mut GameState, _data: &mut SaveRestoreData) {}
}

/// Ordered collection of block handlers.
///
/// Handlers run in registration order on both sides. The entity block must
/// be registered first: any other block may hold entity references, and
/// those only resolve once the entity table is in place.
#[derive(Default)]
pub struct SaveRestoreBlockSet {
    handlers: Vec<Box<dyn SaveRestoreBlockHandler>>,
}

impl SaveRestoreBlockSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, handler: Box<dyn SaveRestoreBlockHandler>) {
        debug_assert!(
            !self.handlers.is_empty()
                || handler.block_name() == crate::entity_block::ENTITY_BLOCK_NAME
        );
        self.handlers.push(handler);
    }

    /// Write every block into the segment. Returns the offsets the loader
    /// must persist to restore later.
    pub fn save(
        &mut self,
        gs: &mut GameState,
        data: &mut SaveRestoreData,
        assets: &mut dyn AssetServices,
    ) -> SaveResult<BlockSetOffsets> {
        for h in self.handlers.iter_mut() {
            h.pre_save(gs, data);
        }

        let mut headers: Vec<BlockHeader> = Vec::with_capacity(self.handlers.len());
        let offsets;
        {
            let mut writer = SaveWriter::new(data, assets);

            let body_base = writer.tell();
            for h in self.handlers.iter_mut() {
                let loc_body = (writer.tell() - body_base) as i32;
                h.save(gs, &mut writer)?;
                headers.push(BlockHeader {
                    name: h.block_name().to_string(),
                    loc_header: -1,
                    loc_body,
                });
            }

            let header_base = writer.tell();
            for (i, h) in self.handlers.iter_mut().enumerate() {
                let start = writer.tell();
                h.write_save_headers(gs, &mut writer)?;
                if writer.tell() > start {
                    headers[i].loc_header = (start - header_base) as i32;
                }
            }

            let array_pos = writer.tell();
            writer.write_int((array_pos - header_base) as i32)?;
            writer.write_int((header_base - body_base) as i32)?;
            writer.write_int(headers.len() as i32)?;
            for hdr in &headers {
                writer.write_fields("BlockHdr", hdr, BLOCK_HEADER_FIELDS)?;
            }

            offsets = BlockSetOffsets {
                body_base,
                header_base,
                array_pos,
            };
        }

        for h in self.handlers.iter_mut() {
            h.post_save(gs, data);
        }
        Ok(offsets)
    }

    /// Restore every block the save holds. Handlers with no matching block
    /// in the file, and blocks whose handler errors, are skipped with a
    /// warning; the rest still load.
    pub fn restore(
        &mut self,
        gs: &mut GameState,
        data: &mut SaveRestoreData,
        assets: &mut dyn AssetServices,
        offsets: &BlockSetOffsets,
        params: &RestoreParams,
    ) -> SaveResult<()> {
        for h in self.handlers.iter_mut() {
            h.pre_restore(gs, data);
        }

        {
            let mut reader = SaveReader::new(data, assets);

            reader.seek(offsets.array_pos)?;
            let _size_headers = reader.read_int()?;
            let _size_bodies = reader.read_int()?;
            let count = reader.read_int()?;
            let mut headers: Vec<BlockHeader> = Vec::with_capacity(count.max(0) as usize);
            for _ in 0..count {
                let mut hdr = BlockHeader::default();
                reader.read_fields("BlockHdr", &mut hdr, BLOCK_HEADER_FIELDS)?;
                headers.push(hdr);
            }

            for i in 0..self.handlers.len() {
                let name = self.handlers[i].block_name();
                let hdr = match headers.iter().find(|h| h.name.eq_ignore_ascii_case(name)) {
                    Some(h) => h.clone(),
                    None => {
                        con_warning(&format!("save has no {} block\n", name));
                        continue;
                    }
                };

                if hdr.loc_header >= 0 {
                    reader.seek(offsets.header_base + hdr.loc_header as usize)?;
                    if let Err(e) = self.handlers[i].read_restore_headers(gs, &mut reader) {
                        con_warning(&format!("block {} header failed: {}\n", name, e));
                        continue;
                    }
                }

                reader.seek(offsets.body_base + hdr.loc_body as usize)?;
                if let Err(e) = self.handlers[i].restore(gs, &mut reader, params) {
                    con_warning(&format!("block {} failed to restore: {}\n", name, e));
                }
            }
        }

        for h in self.handlers.iter_mut() {
            h.post_restore(gs, data);
        }
        Ok(())
    }
}
