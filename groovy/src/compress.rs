//! LZ4 block compression
//!
//! Fields are compressed as bare LZ4 blocks without a size prefix; the
//! device knows the decompressed size from the active mode.

use crate::options::Compressor;
use lz4::block::{self, CompressionMode};
use std::io;

/// Acceleration used by the fast compressor
const FAST_ACCELERATION: i32 = 1;

/// Level used by the high ratio compressor
const HC_LEVEL: i32 = 9;

impl Compressor {
    fn mode(self) -> CompressionMode {
        match self {
            Compressor::Fast => CompressionMode::FAST(FAST_ACCELERATION),
            Compressor::High => CompressionMode::HIGHCOMPRESSION(HC_LEVEL),
        }
    }

    /// Compress `src` into `dst`
    ///
    /// Returns the compressed length, or None when the block would not be
    /// smaller than `src` (the field is then sent raw).
    pub fn compress(self, src: &[u8], dst: &mut Vec<u8>) -> Option<usize> {
        if src.is_empty() {
            return None;
        }

        let bound = block::compress_bound(src.len()).ok()?;
        if dst.len() < bound {
            dst.resize(bound, 0);
        }

        match block::compress_to_buffer(src, Some(self.mode()), false, dst) {
            Ok(len) if len > 0 && len < src.len() => Some(len),
            Ok(_) => None,
            Err(e) => {
                tracing::trace!("lz4 compression failed: {}", e);
                None
            }
        }
    }
}

/// Decompress one block of known decompressed size
pub fn decompress_block(src: &[u8], size: usize) -> io::Result<Vec<u8>> {
    let size = i32::try_from(size)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "block too large"))?;
    block::decompress(src, Some(size))
}

/// Rebuild a field from the previous one and a delta
pub fn apply_delta(previous: &mut [u8], delta: &[u8]) {
    for (old, d) in previous.iter_mut().zip(delta) {
        *old = old.wrapping_add(*d);
    }
}
