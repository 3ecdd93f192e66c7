// segment.rs — save buffer and string symbol table
//
// The segment is a fixed-capacity byte buffer with a read/write cursor and a
// high-water mark, plus a table of interned strings. Field names, classnames
// and every other repeated string in a save are written as a 16-bit symbol
// index into that table; the table itself is stored once in the file header.

use crate::error::{SaveError, SaveResult};
use crc::{Crc, CRC_32_ISO_HDLC};

/// Default number of symbol slots for a full game save.
pub const DEFAULT_SYMBOL_SLOTS: usize = 4095;

/// String returned for a symbol index that maps to no interned string.
pub const ILLEGAL_SYMBOL: &str = "<<illegal>>";

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

// ============================================================
// Symbol table
// ============================================================

/// Open-addressing probe table of interned strings. Lookup hashes the string
/// with CRC-32 and probes linearly; a slot is never vacated, so indices stay
/// stable for the lifetime of the save operation.
pub struct SymbolTable {
    slots: Vec<Option<String>>,
}

impl SymbolTable {
    pub fn new(slot_count: usize) -> Self {
        Self {
            slots: vec![None; slot_count.max(1)],
        }
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Rebuild the table from stored slots, e.g. when loading a save file.
    /// Slot positions must be preserved exactly or every symbol reference in
    /// the data would dangle.
    pub fn from_slots(slots: Vec<Option<String>>) -> Self {
        Self { slots }
    }

    pub fn slots(&self) -> &[Option<String>] {
        &self.slots
    }

    /// Intern `name`, returning its slot index. Existing entries are matched
    /// case-sensitively; the save and restore sides intern the same literal
    /// strings so case never differs in practice.
    pub fn find_create_symbol(&mut self, name: &str) -> SaveResult<u16> {
        let len = self.slots.len();
        let hash = CRC32.checksum(name.as_bytes()) as usize % len;

        for probe in 0..len {
            let idx = (hash + probe) % len;
            match &self.slots[idx] {
                Some(existing) if existing == name => return Ok(idx as u16),
                Some(_) => continue,
                None => {
                    self.slots[idx] = Some(name.to_string());
                    return Ok(idx as u16);
                }
            }
        }
        Err(SaveError::SymbolTableFull)
    }

    /// Resolve a symbol index back to its string. Unmapped indices resolve to
    /// the `<<illegal>>` sentinel rather than failing; callers treat it as a
    /// name that matches nothing.
    pub fn string_from_symbol(&self, symbol: u16) -> &str {
        match self.slots.get(symbol as usize) {
            Some(Some(s)) => s,
            _ => ILLEGAL_SYMBOL,
        }
    }
}

// ============================================================
// Segment
// ============================================================

/// Fixed-capacity byte buffer with explicit cursor control.
///
/// `base` marks the start of the region the current consumer cares about
/// (rebased when handing a sub-range to block code), `cur` is the read/write
/// cursor relative to base, and `high` tracks the furthest byte ever written
/// so `written()` stays correct across rewinds.
pub struct Segment {
    data: Vec<u8>,
    base: usize,
    cur: usize,
    high: usize,
}

impl Segment {
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![0; capacity],
            base: 0,
            cur: 0,
            high: 0,
        }
    }

    /// Wrap an existing byte blob for reading, e.g. a loaded save file body.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        let high = bytes.len();
        Self {
            data: bytes,
            base: 0,
            cur: 0,
            high,
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len() - self.base
    }

    /// Current cursor position relative to base.
    pub fn tell(&self) -> usize {
        self.cur
    }

    /// Total bytes ever written past base, regardless of the current cursor.
    pub fn written(&self) -> usize {
        self.high.saturating_sub(self.base)
    }

    /// Everything written so far, from base to the high-water mark.
    pub fn as_written(&self) -> &[u8] {
        &self.data[self.base..self.high]
    }

    /// Move base forward to the current cursor, narrowing the segment.
    /// Returns the old base so the caller can restore it.
    pub fn rebase(&mut self) -> usize {
        let old = self.base;
        self.base += self.cur;
        self.cur = 0;
        old
    }

    pub fn set_base(&mut self, base: usize) {
        self.base = base;
    }

    pub fn seek(&mut self, pos: usize) -> SaveResult<()> {
        if self.base + pos > self.data.len() {
            return Err(SaveError::BadSeek(pos));
        }
        self.cur = pos;
        Ok(())
    }

    pub fn rewind(&mut self) {
        self.cur = 0;
    }

    /// Relative cursor move; negative rewinds.
    pub fn move_cur(&mut self, delta: isize) -> SaveResult<()> {
        let target = self.cur as isize + delta;
        if target < 0 {
            return Err(SaveError::BadSeek(0));
        }
        self.seek(target as usize)
    }

    // ------------------------------------------------------------
    // Writing
    // ------------------------------------------------------------

    pub fn write(&mut self, bytes: &[u8]) -> SaveResult<()> {
        let start = self.base + self.cur;
        let end = start + bytes.len();
        if end > self.data.len() {
            // clamp so the overflow is visible in written(), then fail
            self.cur = self.data.len() - self.base;
            self.high = self.data.len();
            return Err(SaveError::BufferOverflow);
        }
        self.data[start..end].copy_from_slice(bytes);
        self.cur += bytes.len();
        if self.base + self.cur > self.high {
            self.high = self.base + self.cur;
        }
        Ok(())
    }

    pub fn write_u8(&mut self, v: u8) -> SaveResult<()> {
        self.write(&[v])
    }

    pub fn write_u16(&mut self, v: u16) -> SaveResult<()> {
        self.write(&v.to_le_bytes())
    }

    pub fn write_i16(&mut self, v: i16) -> SaveResult<()> {
        self.write(&v.to_le_bytes())
    }

    pub fn write_i32(&mut self, v: i32) -> SaveResult<()> {
        self.write(&v.to_le_bytes())
    }

    pub fn write_f32(&mut self, v: f32) -> SaveResult<()> {
        self.write(&v.to_le_bytes())
    }

    /// Overwrite bytes at an absolute (base-relative) position without moving
    /// the cursor. Used to backpatch size and count placeholders.
    pub fn patch<F>(&mut self, pos: usize, f: F) -> SaveResult<()>
    where
        F: FnOnce(&mut Segment) -> SaveResult<()>,
    {
        let saved = self.cur;
        self.seek(pos)?;
        let r = f(self);
        self.cur = saved;
        r
    }

    // ------------------------------------------------------------
    // Reading
    // ------------------------------------------------------------

    pub fn read(&mut self, out: &mut [u8]) -> SaveResult<()> {
        let start = self.base + self.cur;
        let end = start + out.len();
        if end > self.high {
            return Err(SaveError::BufferUnderflow);
        }
        out.copy_from_slice(&self.data[start..end]);
        self.cur += out.len();
        Ok(())
    }

    pub fn skip(&mut self, count: usize) -> SaveResult<()> {
        if self.base + self.cur + count > self.high {
            return Err(SaveError::BufferUnderflow);
        }
        self.cur += count;
        Ok(())
    }

    pub fn read_u8(&mut self) -> SaveResult<u8> {
        let mut b = [0u8; 1];
        self.read(&mut b)?;
        Ok(b[0])
    }

    pub fn read_u16(&mut self) -> SaveResult<u16> {
        let mut b = [0u8; 2];
        self.read(&mut b)?;
        Ok(u16::from_le_bytes(b))
    }

    pub fn read_i16(&mut self) -> SaveResult<i16> {
        let mut b = [0u8; 2];
        self.read(&mut b)?;
        Ok(i16::from_le_bytes(b))
    }

    pub fn read_i32(&mut self) -> SaveResult<i32> {
        let mut b = [0u8; 4];
        self.read(&mut b)?;
        Ok(i32::from_le_bytes(b))
    }

    pub fn read_f32(&mut self) -> SaveResult<f32> {
        let mut b = [0u8; 4];
        self.read(&mut b)?;
        Ok(f32::from_le_bytes(b))
    }

    /// Read a NUL-terminated string of exactly `len` bytes (terminator
    /// included in `len`).
    pub fn read_cstr(&mut self, len: usize) -> SaveResult<String> {
        let mut buf = vec![0u8; len];
        self.read(&mut buf)?;
        let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
        match std::str::from_utf8(&buf[..end]) {
            Ok(s) => Ok(s.to_string()),
            Err(_) => Err(SaveError::Corrupt("invalid utf-8 in string field".to_string())),
        }
    }
}
