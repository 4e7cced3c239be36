//! Codec backend seam
//!
//! The pipeline never implements DEFLATE itself. It needs four things from
//! the backend: a CRC32, the CRC32 combination formula, and a raw-deflate
//! block compressor that accepts a preset dictionary and ends every block on
//! a byte boundary. CRCs come from crc32fast, deflate from flate2's zlib
//! family backend.

use flate2::{Compress, Compression, FlushCompress};
use thiserror::Error;

/// CRC32 of `data`, continuing from `init` (0 for a fresh checksum).
#[inline]
pub fn crc32(data: &[u8], init: u32) -> u32 {
    let mut hasher = crc32fast::Hasher::new_with_initial(init);
    hasher.update(data);
    hasher.finalize()
}

/// CRC32 of `A || B` from `crc32(A)`, `crc32(B)` and `len(B)`.
#[inline]
pub fn crc32_combine(crc_a: u32, crc_b: u32, len_b: u64) -> u32 {
    let mut combined = crc32fast::Hasher::new_with_initial(crc_a);
    combined.combine(&crc32fast::Hasher::new_with_initial_len(crc_b, len_b));
    combined.finalize()
}

/// Level handed to the zlib-ng family backend.
///
/// Level 1 in zlib-ng uses the "quick" strategy that produces much larger
/// output on repetitive data, so it is mapped to 2.
#[inline]
pub fn backend_level(level: u32) -> u32 {
    if level == 1 {
        2
    } else {
        level
    }
}

/// One compressed block, ready for the sequencer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressedBlock {
    /// Raw deflate data, byte aligned and not marked final.
    pub data: Vec<u8>,
    /// CRC32 of the uncompressed block.
    pub crc: u32,
    /// Uncompressed length.
    pub len: usize,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("compressed output exceeds buffer size of {capacity} bytes")]
    Overflow { capacity: usize },

    #[error("{0}")]
    Backend(String),
}

/// Compresses independent blocks for the threaded writer.
///
/// Each worker thread owns one instance, so implementations may keep
/// internal state (stream objects, scratch buffers) between calls.
pub trait BlockCompressor: Send {
    /// Compress `raw` as a non-final raw deflate block seeded with
    /// `dictionary` (the tail of the previous block, possibly empty).
    fn compress_block(
        &mut self,
        raw: &[u8],
        dictionary: &[u8],
    ) -> Result<CompressedBlock, CodecError>;
}

/// flate2 raw deflate with a statically sized output buffer.
pub struct DeflateBlockCompressor {
    compress: Compress,
    buffer: Vec<u8>,
}

impl DeflateBlockCompressor {
    pub fn new(level: u32, buffer_size: usize) -> Self {
        Self {
            compress: Compress::new(Compression::new(backend_level(level)), false),
            buffer: vec![0u8; buffer_size],
        }
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer.len()
    }
}

impl BlockCompressor for DeflateBlockCompressor {
    fn compress_block(
        &mut self,
        raw: &[u8],
        dictionary: &[u8],
    ) -> Result<CompressedBlock, CodecError> {
        self.compress.reset();
        if !dictionary.is_empty() {
            self.compress
                .set_dictionary(dictionary)
                .map_err(|e| CodecError::Backend(format!("set_dictionary failed: {}", e)))?;
        }

        let before_in = self.compress.total_in();
        let before_out = self.compress.total_out();

        // Sync flush ends the block on a byte boundary without setting the
        // final bit, so blocks can be concatenated into one deflate stream.
        self.compress
            .compress(raw, &mut self.buffer, FlushCompress::Sync)
            .map_err(|e| CodecError::Backend(e.to_string()))?;

        let consumed = (self.compress.total_in() - before_in) as usize;
        let produced = (self.compress.total_out() - before_out) as usize;

        // A full buffer means the flush may not have completed.
        if produced >= self.buffer.len() {
            return Err(CodecError::Overflow {
                capacity: self.buffer.len(),
            });
        }
        if consumed != raw.len() {
            return Err(CodecError::Backend(format!(
                "{} input bytes left unconsumed",
                raw.len() - consumed
            )));
        }

        Ok(CompressedBlock {
            data: self.buffer[..produced].to_vec(),
            crc: crc32(raw, 0),
            len: raw.len(),
        })
    }
}
