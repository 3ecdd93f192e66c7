// error.rs — error type shared by the whole save/restore stack

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveError {
    /// A write would run past the end of the save buffer. Unrecoverable for
    /// the remainder of the write; the buffer contents past the clamp point
    /// are undefined.
    BufferOverflow,
    /// A read would run past the end of the valid data.
    BufferUnderflow,
    /// Seek target outside the buffer.
    BadSeek(usize),
    /// The symbol table has no free slot left. The table must be sized
    /// generously up front; this is fatal for the save.
    SymbolTableFull,
    /// A single field's payload exceeded the u16 size header.
    SizeOverflow,
    /// The stored struct name does not match the datamap being restored.
    /// Recoverable: the field set is abandoned, the caller decides.
    StructMismatch { expected: String, found: String },
    /// Malformed record or header while reading.
    Corrupt(String),
    /// Save-file magic bytes did not match.
    BadMagic,
    /// Save-file version not understood by this build.
    BadVersion(u32),
    /// Payload checksum mismatch.
    BadChecksum,
    /// Underlying file I/O failure.
    Io(String),
}

impl fmt::Display for SaveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BufferOverflow => write!(f, "save buffer overflow"),
            Self::BufferUnderflow => write!(f, "save buffer underflow"),
            Self::BadSeek(pos) => write!(f, "seek out of range: {}", pos),
            Self::SymbolTableFull => write!(f, "symbol table overflow"),
            Self::SizeOverflow => write!(f, "field data too large for size header"),
            Self::StructMismatch { expected, found } => {
                write!(f, "struct mismatch: expected {}, found {}", expected, found)
            }
            Self::Corrupt(what) => write!(f, "corrupt save data: {}", what),
            Self::BadMagic => write!(f, "not a save file"),
            Self::BadVersion(v) => write!(f, "unsupported save version {}", v),
            Self::BadChecksum => write!(f, "save payload checksum mismatch"),
            Self::Io(e) => write!(f, "save file i/o error: {}", e),
        }
    }
}

impl std::error::Error for SaveError {}

pub type SaveResult<T> = Result<T, SaveError>;
