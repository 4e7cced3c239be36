//! Threaded gzip writer
//!
//! Raw input is cut into `block_size` blocks. Each block is compressed as an
//! independent raw deflate block seeded with the last 32 KiB of the block
//! before it, then the sequencer stitches the blocks into one gzip member
//! with a combined CRC32. The result is ordinary gzip that any decoder reads.
//!
//! States are `Open` and `Closed`. A failure on a pipeline thread is raised
//! by the next `write`, `flush` or `close` on the owning thread, after which
//! the writer is closed.

use std::io::{self, Write};
use std::mem;
use std::sync::Arc;

use crate::codec::{BlockCompressor, DeflateBlockCompressor};
use crate::error::{GzpipeError, GzpipeResult};
use crate::format::gzip_header;
use crate::options::{compress_buffer_size, WriterOptions};
use crate::scheduler::{Dictionary, Job, Pipeline};
use crate::sync::Progress;

enum WriterState<W> {
    Open(Pipeline<W>),
    Closed,
}

/// Gzip writer that compresses blocks on a pool of worker threads.
///
/// ```no_run
/// use gzpipe::{ThreadedGzipWriter, WriterOptions};
/// use std::io::Write;
///
/// let file = std::fs::File::create("out.gz")?;
/// let mut writer = ThreadedGzipWriter::new(file, &WriterOptions::new().threads(4))?;
/// writer.write_all(b"hello")?;
/// writer.close()?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct ThreadedGzipWriter<W: Write + Send + 'static> {
    state: WriterState<W>,
    progress: Arc<Progress>,
    level: u32,
    block_size: usize,
    threads: usize,
    /// Last submitted block of the current member; source of the next
    /// block's dictionary.
    previous: Option<Arc<[u8]>>,
    blocks: u64,
    bytes_in: u64,
}

impl<W: Write + Send + 'static> ThreadedGzipWriter<W> {
    /// Validate `options`, write the gzip header to `sink` and start the
    /// worker and sequencer threads.
    pub fn new(sink: W, options: &WriterOptions) -> GzpipeResult<Self> {
        let level = options.level;
        let buffer_size = compress_buffer_size(options.block_size);
        Self::with_compressors(sink, options, |_| {
            Box::new(DeflateBlockCompressor::new(level, buffer_size))
        })
    }

    /// Like [`new`](Self::new), but each worker gets the compressor built by
    /// `make_compressor(worker_index)`.
    pub fn with_compressors<F>(
        mut sink: W,
        options: &WriterOptions,
        make_compressor: F,
    ) -> GzpipeResult<Self>
    where
        F: FnMut(usize) -> Box<dyn BlockCompressor>,
    {
        let threads = options.validate()?;
        sink.write_all(&gzip_header(options.level))?;

        let compressors = (0..threads).map(make_compressor).collect();
        let progress = Arc::new(Progress::new());
        let pipeline = Pipeline::start(
            sink,
            compressors,
            options.queue_size,
            Arc::clone(&progress),
        )?;

        tracing::debug!(
            level = options.level,
            threads,
            block_size = options.block_size,
            "threaded gzip writer started"
        );

        Ok(Self {
            state: WriterState::Open(pipeline),
            progress,
            level: options.level,
            block_size: options.block_size,
            threads,
            previous: None,
            blocks: 0,
            bytes_in: 0,
        })
    }

    pub fn level(&self) -> u32 {
        self.level
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.state, WriterState::Closed)
    }

    /// Uncompressed bytes accepted so far, across all members.
    pub fn total_in(&self) -> u64 {
        self.bytes_in
    }

    /// Accept `data` for compression and return how many bytes were taken
    /// (always all of them).
    ///
    /// May block while the target worker's queue is full.
    pub fn submit(&mut self, data: &[u8]) -> GzpipeResult<usize> {
        self.ensure_open()?;
        self.raise_pending()?;

        if data.len() > self.block_size {
            for chunk in data.chunks(self.block_size) {
                self.submit_block(chunk)?;
            }
            return Ok(data.len());
        }
        if data.is_empty() {
            return Ok(0);
        }
        self.submit_block(data)?;
        Ok(data.len())
    }

    fn submit_block(&mut self, data: &[u8]) -> GzpipeResult<()> {
        let block: Arc<[u8]> = Arc::from(data);
        let dictionary = Dictionary::tail_of(self.previous.replace(Arc::clone(&block)));
        self.dispatch(Job::Block {
            number: self.blocks,
            data: block,
            dictionary,
        })?;
        self.blocks += 1;
        self.bytes_in += data.len() as u64;
        Ok(())
    }

    /// Wait until every submitted block is in the sink, then end the current
    /// gzip member and open a new one.
    ///
    /// Everything written before the flush can be decompressed from the
    /// sink's contents alone. Each flush therefore starts a new member, and
    /// the output becomes a sequence of concatenated members.
    pub fn flush_member(&mut self) -> GzpipeResult<()> {
        self.end_member(Some(self.level))
    }

    /// Drain the pipeline, write the final trailer and stop every thread.
    ///
    /// Closing a closed writer does nothing. The sink is dropped; use
    /// [`finish`](Self::finish) to get it back.
    pub fn close(&mut self) -> GzpipeResult<()> {
        if self.is_closed() {
            return Ok(());
        }
        self.shutdown().map(drop)
    }

    /// Close the writer and return the sink.
    pub fn finish(mut self) -> GzpipeResult<W> {
        self.ensure_open()?;
        self.shutdown()
    }

    fn ensure_open(&self) -> GzpipeResult<()> {
        if self.is_closed() {
            Err(GzpipeError::Closed)
        } else {
            Ok(())
        }
    }

    /// Raise an error a pipeline thread left behind.
    fn raise_pending(&mut self) -> GzpipeResult<()> {
        if self.progress.has_error() {
            return Err(self.abort());
        }
        Ok(())
    }

    fn dispatch(&mut self, job: Job) -> GzpipeResult<u64> {
        let pipeline = match &mut self.state {
            WriterState::Open(pipeline) => pipeline,
            WriterState::Closed => return Err(GzpipeError::Closed),
        };
        match pipeline.submit(job) {
            Some(index) => Ok(index),
            None => Err(self.abort()),
        }
    }

    fn end_member(&mut self, next_header: Option<u32>) -> GzpipeResult<()> {
        self.ensure_open()?;
        self.raise_pending()?;

        // A new member is a new deflate stream; it cannot refer back into
        // the previous one.
        self.previous = None;
        let index = self.dispatch(Job::EndMember { next_header })?;
        if !self.progress.wait_for(index + 1) {
            return Err(self.abort());
        }
        Ok(())
    }

    fn shutdown(&mut self) -> GzpipeResult<W> {
        self.end_member(None)?;

        let pipeline = match mem::replace(&mut self.state, WriterState::Closed) {
            WriterState::Open(pipeline) => pipeline,
            WriterState::Closed => return Err(GzpipeError::Closed),
        };
        let sink = pipeline.shutdown();
        if let Some(err) = self.progress.take_error() {
            return Err(err);
        }
        tracing::debug!(
            blocks = self.blocks,
            bytes_in = self.bytes_in,
            "threaded gzip writer closed"
        );
        sink.ok_or_else(|| GzpipeError::thread("sequencer exited without returning the sink"))
    }

    /// Stop every thread after a failure and report what went wrong.
    fn abort(&mut self) -> GzpipeError {
        self.progress.cancel();
        if let WriterState::Open(pipeline) = mem::replace(&mut self.state, WriterState::Closed) {
            // The sink goes down with the pipeline; partial output is kept.
            drop(pipeline.shutdown());
        }
        let err = self
            .progress
            .take_error()
            .unwrap_or_else(|| GzpipeError::thread("compression pipeline stopped unexpectedly"));
        tracing::debug!(error = %err, "threaded gzip writer aborted");
        err
    }
}

impl<W: Write + Send + 'static> Write for ThreadedGzipWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(self.submit(buf)?)
    }

    /// Ends the current gzip member; see [`flush_member`](Self::flush_member).
    fn flush(&mut self) -> io::Result<()> {
        Ok(self.flush_member()?)
    }
}

impl<W: Write + Send + 'static> Drop for ThreadedGzipWriter<W> {
    fn drop(&mut self) {
        if self.is_closed() {
            return;
        }
        if let Err(err) = self.close() {
            tracing::warn!(error = %err, "closing gzip writer on drop failed");
        }
    }
}
