//! gzpipe: multithreaded gzip with single-stream semantics
//!
//! Compression follows the pigz model. Input is cut into fixed-size blocks,
//! each block is deflated on a worker thread with the previous block's tail
//! as a preset dictionary, and a sequencer thread writes the blocks in
//! order while combining their CRC32s. The output is one ordinary gzip
//! member (or one member per `flush`), readable by any gzip decoder.
//!
//! Decompression of plain gzip cannot be split across threads, so the
//! reader runs one decode-ahead thread that keeps a bounded queue of
//! decompressed chunks ready for the caller.
//!
//! ```no_run
//! use gzpipe::{open_reader, open_writer, OpenMode, ReaderOptions, WriterOptions};
//! use std::io::{Read, Write};
//!
//! let mut w = open_writer("data.gz", OpenMode::Write, &WriterOptions::new().threads(8))?;
//! w.write_all(b"hello world")?;
//! w.close()?;
//!
//! let mut text = String::new();
//! open_reader("data.gz", &ReaderOptions::new())?.read_to_string(&mut text)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod codec;
pub mod decode;
pub mod error;
pub mod format;
pub mod oneshot;
pub mod open;
pub mod options;
pub mod reader;
mod scheduler;
mod sync;
pub mod writer;

#[cfg(test)]
mod roundtrip_tests;
#[cfg(test)]
mod test_utils;

pub use codec::{BlockCompressor, CodecError, CompressedBlock, DeflateBlockCompressor};
pub use decode::GzipMembers;
pub use error::{GzpipeError, GzpipeResult};
pub use oneshot::{compress, compress_threaded, decompress};
pub use open::{open_reader, open_writer, GzReader, GzWriter, OpenMode, Sink, Source};
pub use options::{ReaderOptions, Threads, WriterOptions};
pub use reader::ThreadedGzipReader;
pub use writer::ThreadedGzipWriter;
