//! In-memory helpers for callers that hold the whole payload.

use std::io::{Read, Write};

use flate2::{Compression, GzBuilder};

use crate::decode::GzipMembers;
use crate::error::{GzpipeError, GzpipeResult};
use crate::options::{validate_level, WriterOptions};
use crate::writer::ThreadedGzipWriter;

/// Gzip `data` on the calling thread (mtime 0, single member).
pub fn compress(data: &[u8], level: u32) -> GzpipeResult<Vec<u8>> {
    let level = validate_level(level)?;
    let mut encoder = GzBuilder::new()
        .mtime(0)
        .write(Vec::with_capacity(data.len() / 2 + 64), Compression::new(level));
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// Gzip `data` with a [`ThreadedGzipWriter`].
pub fn compress_threaded(data: &[u8], options: &WriterOptions) -> GzpipeResult<Vec<u8>> {
    let mut writer = ThreadedGzipWriter::new(Vec::with_capacity(data.len() / 2 + 64), options)?;
    writer.submit(data)?;
    writer.finish()
}

/// Decompress every member of a gzip stream. Empty input decompresses to
/// nothing, and trailing NUL padding is ignored.
pub fn decompress(data: &[u8]) -> GzpipeResult<Vec<u8>> {
    let mut out = Vec::with_capacity(data.len().saturating_mul(3));
    GzipMembers::new(data)
        .read_to_end(&mut out)
        .map_err(GzpipeError::from_decoder)?;
    Ok(out)
}
