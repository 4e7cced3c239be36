//! Configuration for threaded readers and writers
//!
//! Levels follow the zlib scale used by the flate2 backend. Block size and
//! queue depth bound how much data is in flight: at most
//! `threads * (queue_size + 1)` raw blocks wait for compression, plus the
//! same number of compressed blocks waiting for the sequencer.

use std::num::NonZeroUsize;
use std::str::FromStr;

use crate::error::{GzpipeError, GzpipeResult};

pub const MIN_COMPRESSION_LEVEL: u32 = 0;
pub const MAX_COMPRESSION_LEVEL: u32 = 9;
pub const DEFAULT_COMPRESSION_LEVEL: u32 = 6;

/// Levels at or below this are announced as "fastest" in the gzip header.
pub const FASTEST_COMPRESSION_LEVEL: u32 = 1;

/// Raw bytes handed to a single compression worker at a time.
pub const DEFAULT_BLOCK_SIZE: usize = 1024 * 1024;

/// DEFLATE back-reference window (the dictionary handed to each block).
pub const WINDOW_SIZE: usize = 32 * 1024;

const DEFAULT_WRITE_QUEUE_SIZE: usize = 1;
const DEFAULT_READ_QUEUE_SIZE: usize = 2;

/// Block sizes are bounded so the compressor buffer length fits in a u32,
/// which is what the zlib stream counters can address.
const MAX_BLOCK_SIZE: usize = (u32::MAX / 2) as usize;

/// Number of worker threads requested by the caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Threads {
    /// One thread per available core.
    Auto,
    /// Exactly this many. Zero means "do not use threads" for the `open`
    /// entry points and is rejected by the threaded writer itself.
    Fixed(usize),
}

impl Threads {
    /// Resolve to a concrete count.
    pub fn resolve(self) -> usize {
        match self {
            Threads::Fixed(n) => n,
            Threads::Auto => std::thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(1),
        }
    }

    pub fn is_disabled(self) -> bool {
        self == Threads::Fixed(0)
    }
}

impl Default for Threads {
    fn default() -> Self {
        Threads::Fixed(1)
    }
}

impl From<usize> for Threads {
    fn from(n: usize) -> Self {
        Threads::Fixed(n)
    }
}

impl FromStr for Threads {
    type Err = GzpipeError;

    /// Accepts `auto`, a non-negative count, or a negative count (which, as
    /// in the `-p -1` convention, means every available core).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("auto") {
            return Ok(Threads::Auto);
        }
        match s.parse::<i64>() {
            Ok(n) if n < 0 => Ok(Threads::Auto),
            Ok(n) => usize::try_from(n)
                .map(Threads::Fixed)
                .map_err(|_| GzpipeError::InvalidThreads(usize::MAX)),
            Err(_) => Err(GzpipeError::InvalidMode(format!(
                "thread count must be a number or 'auto', got {:?}",
                s
            ))),
        }
    }
}

/// Check a compression level against the backend's range.
pub fn validate_level(level: u32) -> GzpipeResult<u32> {
    if (MIN_COMPRESSION_LEVEL..=MAX_COMPRESSION_LEVEL).contains(&level) {
        Ok(level)
    } else {
        Err(GzpipeError::InvalidLevel(level))
    }
}

fn validate_block_size(block_size: usize) -> GzpipeResult<usize> {
    if block_size == 0 {
        return Err(GzpipeError::InvalidBlockSize(
            "block size must be at least 1 byte".to_string(),
        ));
    }
    if block_size > MAX_BLOCK_SIZE {
        return Err(GzpipeError::InvalidBlockSize(format!(
            "block size {} exceeds the maximum of {}",
            block_size, MAX_BLOCK_SIZE
        )));
    }
    Ok(block_size)
}

fn validate_queue_size(queue_size: usize) -> GzpipeResult<usize> {
    if queue_size == 0 {
        return Err(GzpipeError::InvalidBlockSize(
            "queue size must be at least 1".to_string(),
        ));
    }
    Ok(queue_size)
}

/// Output buffer for one compressed block.
///
/// Deflating random data gives an output a little larger than the input;
/// 10% (at least 500 bytes) of headroom is far more than deflate's stored
/// block overhead of 5 bytes per 64 KiB.
pub fn compress_buffer_size(block_size: usize) -> usize {
    block_size + (block_size / 10).max(500)
}

/// Settings for [`ThreadedGzipWriter`](crate::ThreadedGzipWriter).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WriterOptions {
    pub level: u32,
    pub threads: Threads,
    pub block_size: usize,
    /// Depth of each per-worker input and output queue.
    pub queue_size: usize,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            level: DEFAULT_COMPRESSION_LEVEL,
            threads: Threads::default(),
            block_size: DEFAULT_BLOCK_SIZE,
            queue_size: DEFAULT_WRITE_QUEUE_SIZE,
        }
    }
}

impl WriterOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn level(mut self, level: u32) -> Self {
        self.level = level;
        self
    }

    pub fn threads(mut self, threads: impl Into<Threads>) -> Self {
        self.threads = threads.into();
        self
    }

    pub fn block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    pub fn queue_size(mut self, queue_size: usize) -> Self {
        self.queue_size = queue_size;
        self
    }

    /// Validate every field and return the resolved worker count.
    pub fn validate(&self) -> GzpipeResult<usize> {
        validate_level(self.level)?;
        validate_block_size(self.block_size)?;
        validate_queue_size(self.queue_size)?;
        match self.threads.resolve() {
            0 => Err(GzpipeError::InvalidThreads(0)),
            n => Ok(n),
        }
    }
}

/// Settings for [`ThreadedGzipReader`](crate::ThreadedGzipReader).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReaderOptions {
    /// Only consulted by [`open_reader`](crate::open_reader): zero selects
    /// the single-threaded decoder. Decompression itself always runs on one
    /// worker, since a plain gzip stream has no recorded block boundaries.
    pub threads: Threads,
    /// Size of the decompressed chunks handed from the worker to the caller.
    pub block_size: usize,
    /// Number of decompressed chunks the worker may run ahead.
    pub queue_size: usize,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            threads: Threads::default(),
            block_size: DEFAULT_BLOCK_SIZE,
            queue_size: DEFAULT_READ_QUEUE_SIZE,
        }
    }
}

impl ReaderOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn threads(mut self, threads: impl Into<Threads>) -> Self {
        self.threads = threads.into();
        self
    }

    pub fn block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    pub fn queue_size(mut self, queue_size: usize) -> Self {
        self.queue_size = queue_size;
        self
    }

    pub fn validate(&self) -> GzpipeResult<()> {
        validate_block_size(self.block_size)?;
        validate_queue_size(self.queue_size)?;
        Ok(())
    }
}
