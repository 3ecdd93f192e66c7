// compression.rs -- Deflate compression for save file payloads
//
// Save payloads are compressed with raw deflate (no zlib header). The
// uncompressed size is stored in the file header, so the read side always
// knows exactly how many bytes to expect back.

use flate2::read::{DeflateDecoder, DeflateEncoder};
use flate2::Compression;
use std::io::Read;

/// Minimum payload size to consider for compression.
pub const MIN_COMPRESS_SIZE: usize = 1024;

/// Compression threshold - only compress if we save at least this percentage.
pub const COMPRESS_THRESHOLD_PERCENT: usize = 10;

/// Compress a save payload using raw deflate.
///
/// Returns `Some(compressed)` if compression is worthwhile, `None` if the
/// payload is too small or barely shrinks; in that case the payload is
/// stored uncompressed and the header flag left clear.
pub fn compress_save_data(data: &[u8]) -> Option<Vec<u8>> {
    if data.len() < MIN_COMPRESS_SIZE {
        return None;
    }

    let mut encoder = DeflateEncoder::new(data, Compression::default());
    let mut compressed = Vec::with_capacity(data.len());

    if encoder.read_to_end(&mut compressed).is_err() {
        return None;
    }

    let threshold = data.len() * (100 - COMPRESS_THRESHOLD_PERCENT) / 100;
    if compressed.len() < threshold {
        Some(compressed)
    } else {
        None
    }
}

/// Decompress a save payload with known uncompressed size.
pub fn decompress_save_data(data: &[u8], uncompressed_size: usize) -> Result<Vec<u8>, String> {
    let mut decoder = DeflateDecoder::new(data);
    let mut decompressed = Vec::with_capacity(uncompressed_size);

    // read in chunks so a corrupt stream cannot balloon past the stated size
    let mut buffer = [0u8; 4096];
    loop {
        match decoder.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => {
                if decompressed.len() + n > uncompressed_size {
                    return Err(format!(
                        "Decompressed data exceeds stated size {}",
                        uncompressed_size
                    ));
                }
                decompressed.extend_from_slice(&buffer[..n]);
            }
            Err(e) => return Err(format!("Decompression failed: {}", e)),
        }
    }

    if decompressed.len() != uncompressed_size {
        return Err(format!(
            "Size mismatch: expected {}, got {}",
            uncompressed_size,
            decompressed.len()
        ));
    }

    Ok(decompressed)
}
