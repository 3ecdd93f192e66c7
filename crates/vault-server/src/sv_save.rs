// sv_save.rs — Save game files: header, symbol table, checksummed payload
//
// File layout, all little-endian:
//   magic "VSAV", version u32, flags u32 (bit 0: payload deflated),
//   raw payload size u32, stored payload size u32, CRC-32 of the raw
//   payload, the three block set offsets, then the symbol table (slot count
//   u32, per slot a u16 length or 0xFFFF for vacant, then that many bytes),
//   then the payload.
//
// The symbol table is stored slot-for-slot because every record in the
// payload references symbols by slot index.

use std::fs;
use std::path::Path;

use crc::{Crc, CRC_32_ISO_HDLC};

use vault_common::assets::AssetServices;
use vault_common::compression::{compress_save_data, decompress_save_data};
use vault_common::console::{con_dprintf, con_printf};
use vault_common::error::{SaveError, SaveResult};
use vault_common::segment::SymbolTable;
use vault_game::blocks::BlockSetOffsets;
use vault_game::game_info::SaveRestoreData;
use vault_game::level::GameState;
use vault_game::saverestore::{restore_game_state, save_game_state, standard_block_set};

pub const SAVE_MAGIC: [u8; 4] = *b"VSAV";
pub const SAVE_VERSION: u32 = 1;

/// Working buffer for a full game save.
pub const SAVE_BUFFER_SIZE: usize = 3 * 1024 * 1024;

const FLAG_DEFLATED: u32 = 0x0000_0001;
const VACANT_SLOT: u16 = u16::MAX;

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

// ============================================================
// Encoding
// ============================================================

fn encode_symbols(out: &mut Vec<u8>, symbols: &SymbolTable) -> SaveResult<()> {
    out.extend_from_slice(&(symbols.slot_count() as u32).to_le_bytes());
    for slot in symbols.slots() {
        match slot {
            Some(s) => {
                let len = u16::try_from(s.len()).map_err(|_| SaveError::SizeOverflow)?;
                if len == VACANT_SLOT {
                    return Err(SaveError::SizeOverflow);
                }
                out.extend_from_slice(&len.to_le_bytes());
                out.extend_from_slice(s.as_bytes());
            }
            None => out.extend_from_slice(&VACANT_SLOT.to_le_bytes()),
        }
    }
    Ok(())
}

/// Serialize a finished save into its file bytes.
pub fn encode_save_file(
    data: &SaveRestoreData,
    offsets: &BlockSetOffsets,
) -> SaveResult<Vec<u8>> {
    let payload = data.segment.as_written();
    let crc = CRC32.checksum(payload);

    let (stored, flags): (&[u8], u32);
    let compressed = compress_save_data(payload);
    match &compressed {
        Some(bytes) => {
            con_dprintf(&format!(
                "save payload deflated {} -> {}\n",
                payload.len(),
                bytes.len()
            ));
            stored = bytes;
            flags = FLAG_DEFLATED;
        }
        None => {
            stored = payload;
            flags = 0;
        }
    }

    let mut out = Vec::with_capacity(stored.len() + 4096);
    out.extend_from_slice(&SAVE_MAGIC);
    out.extend_from_slice(&SAVE_VERSION.to_le_bytes());
    out.extend_from_slice(&flags.to_le_bytes());
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(&(stored.len() as u32).to_le_bytes());
    out.extend_from_slice(&crc.to_le_bytes());
    out.extend_from_slice(&(offsets.body_base as u32).to_le_bytes());
    out.extend_from_slice(&(offsets.header_base as u32).to_le_bytes());
    out.extend_from_slice(&(offsets.array_pos as u32).to_le_bytes());
    encode_symbols(&mut out, &data.symbols)?;
    out.extend_from_slice(stored);
    Ok(out)
}

// ============================================================
// Decoding
// ============================================================

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize) -> SaveResult<&'a [u8]> {
        if self.pos + n > self.bytes.len() {
            return Err(SaveError::Corrupt("save file truncated".to_string()));
        }
        let s = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(s)
    }

    fn u16(&mut self) -> SaveResult<u16> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> SaveResult<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }
}

/// Parse file bytes back into a restorable save.
pub fn decode_save_file(bytes: &[u8]) -> SaveResult<(SaveRestoreData, BlockSetOffsets)> {
    let mut cur = Cursor { bytes, pos: 0 };

    if cur.take(4)? != SAVE_MAGIC {
        return Err(SaveError::BadMagic);
    }
    let version = cur.u32()?;
    if version != SAVE_VERSION {
        return Err(SaveError::BadVersion(version));
    }
    let flags = cur.u32()?;
    let raw_size = cur.u32()? as usize;
    let stored_size = cur.u32()? as usize;
    let crc = cur.u32()?;
    let offsets = BlockSetOffsets {
        body_base: cur.u32()? as usize,
        header_base: cur.u32()? as usize,
        array_pos: cur.u32()? as usize,
    };

    let slot_count = cur.u32()? as usize;
    // every slot occupies at least its u16 length prefix; a count past that
    // bound is forged, not merely truncated
    if slot_count > (bytes.len() - cur.pos) / 2 {
        return Err(SaveError::Corrupt(format!(
            "symbol slot count {} exceeds file size",
            slot_count
        )));
    }
    let mut slots: Vec<Option<String>> = Vec::with_capacity(slot_count);
    for _ in 0..slot_count {
        let len = cur.u16()?;
        if len == VACANT_SLOT {
            slots.push(None);
            continue;
        }
        let raw = cur.take(len as usize)?;
        match std::str::from_utf8(raw) {
            Ok(s) => slots.push(Some(s.to_string())),
            Err(_) => {
                return Err(SaveError::Corrupt("invalid utf-8 in symbol table".to_string()))
            }
        }
    }

    let stored = cur.take(stored_size)?;
    let payload = if flags & FLAG_DEFLATED != 0 {
        decompress_save_data(stored, raw_size).map_err(SaveError::Corrupt)?
    } else {
        if stored.len() != raw_size {
            return Err(SaveError::Corrupt("payload size mismatch".to_string()));
        }
        stored.to_vec()
    };

    if CRC32.checksum(&payload) != crc {
        return Err(SaveError::BadChecksum);
    }

    Ok((
        SaveRestoreData::from_parts(payload, SymbolTable::from_slots(slots)),
        offsets,
    ))
}

pub fn write_save_file(
    path: &Path,
    data: &SaveRestoreData,
    offsets: &BlockSetOffsets,
) -> SaveResult<()> {
    let bytes = encode_save_file(data, offsets)?;
    fs::write(path, &bytes).map_err(|e| SaveError::Io(e.to_string()))?;
    Ok(())
}

pub fn read_save_file(path: &Path) -> SaveResult<(SaveRestoreData, BlockSetOffsets)> {
    let bytes = fs::read(path).map_err(|e| SaveError::Io(e.to_string()))?;
    decode_save_file(&bytes)
}

// ============================================================
// Commands
// ============================================================

/// Save the current game to `path`.
pub fn sv_save_game(
    gs: &mut GameState,
    assets: &mut dyn AssetServices,
    path: &Path,
) -> SaveResult<()> {
    let mut data = SaveRestoreData::new(SAVE_BUFFER_SIZE);
    let mut blocks = standard_block_set();
    let offsets = save_game_state(gs, &mut data, assets, &mut blocks, false)?;
    write_save_file(path, &data, &offsets)?;
    con_printf(&format!("Saved game to {}\n", path.display()));
    Ok(())
}

/// Load a saved game from `path` into `gs`, which supplies the entity
/// factory and the level context to restore into.
pub fn sv_load_game(
    gs: &mut GameState,
    assets: &mut dyn AssetServices,
    path: &Path,
) -> SaveResult<()> {
    let (mut data, offsets) = read_save_file(path)?;
    let mut blocks = standard_block_set();
    restore_game_state(gs, &mut data, assets, &mut blocks, &offsets, false)?;
    con_printf(&format!("Loaded game from {}\n", path.display()));
    Ok(())
}
