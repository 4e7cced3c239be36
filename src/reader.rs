//! Threaded gzip reader
//!
//! A plain gzip stream does not record where its deflate blocks start, so
//! decoding cannot be split across threads. What can be overlapped is the
//! decoding itself with the caller's processing: one worker thread decodes
//! ahead into a bounded queue of chunks and the caller pulls from it.

use std::io::{self, BufRead, BufReader, Read};
use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::decode::GzipMembers;
use crate::error::{GzpipeError, GzpipeResult};
use crate::options::ReaderOptions;
use crate::sync::{ErrorSlot, PanicGuard};

/// Input buffer between the raw source and the decoder.
const SOURCE_BUFFER_SIZE: usize = 128 * 1024;

enum ReaderState {
    Open {
        chunks: Receiver<Vec<u8>>,
        stop: Arc<AtomicBool>,
        worker: JoinHandle<()>,
    },
    Closed,
}

/// Forward-only gzip reader with a decode-ahead thread.
///
/// Handles concatenated members. An empty source is an empty stream, and
/// NUL padding after the last member is ignored. Decode errors (bad magic, truncation,
/// checksum or length mismatch) are returned by the first read that reaches
/// the damaged part, and by every read after it.
pub struct ThreadedGzipReader {
    state: ReaderState,
    errors: Arc<ErrorSlot>,
    chunk: Vec<u8>,
    consumed: usize,
    position: u64,
}

impl ThreadedGzipReader {
    /// Start decoding `source` in the background.
    pub fn new<R: Read + Send + 'static>(source: R, options: &ReaderOptions) -> GzpipeResult<Self> {
        options.validate()?;

        let (tx, rx) = mpsc::sync_channel(options.queue_size);
        let stop = Arc::new(AtomicBool::new(false));
        let errors = Arc::new(ErrorSlot::new());

        let decoder = GzipMembers::new(BufReader::with_capacity(SOURCE_BUFFER_SIZE, source));
        let worker = {
            let stop = Arc::clone(&stop);
            let errors = Arc::clone(&errors);
            let chunk_size = options.block_size;
            thread::Builder::new()
                .name("gzpipe-decompress".to_string())
                .spawn(move || decode_ahead(decoder, tx, &stop, &errors, chunk_size))
                .map_err(|e| GzpipeError::thread(format!("failed to spawn worker: {}", e)))?
        };

        tracing::debug!(
            chunk_size = options.block_size,
            queue_size = options.queue_size,
            "threaded gzip reader started"
        );

        Ok(Self {
            state: ReaderState::Open {
                chunks: rx,
                stop,
                worker,
            },
            errors,
            chunk: Vec::new(),
            consumed: 0,
            position: 0,
        })
    }

    /// Decompressed bytes handed to the caller so far.
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.state, ReaderState::Closed)
    }

    /// Copy up to `buf.len()` decompressed bytes into `buf`. Returns 0 at the
    /// end of the stream.
    pub fn read_into(&mut self, buf: &mut [u8]) -> GzpipeResult<usize> {
        if buf.is_empty() {
            return if self.is_closed() {
                Err(GzpipeError::Closed)
            } else {
                Ok(0)
            };
        }
        let available = self.fill()?;
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.advance(n);
        Ok(n)
    }

    /// Stop the worker and release the source. Closing twice does nothing.
    pub fn close(&mut self) {
        if let ReaderState::Open {
            chunks,
            stop,
            worker,
        } = mem::replace(&mut self.state, ReaderState::Closed)
        {
            stop.store(true, Ordering::Release);
            // Unblocks a worker waiting for queue space.
            drop(chunks);
            // A panic has already been recorded by the worker's guard.
            let _ = worker.join();
            self.chunk = Vec::new();
            self.consumed = 0;
            tracing::debug!(position = self.position, "threaded gzip reader closed");
        }
    }

    /// Unread part of the current chunk, pulling the next chunk if needed.
    /// Empty at the end of the stream.
    fn fill(&mut self) -> GzpipeResult<&[u8]> {
        let chunks = match &self.state {
            ReaderState::Open { chunks, .. } => chunks,
            ReaderState::Closed => return Err(GzpipeError::Closed),
        };
        while self.consumed >= self.chunk.len() {
            match chunks.recv() {
                Ok(chunk) => {
                    self.chunk = chunk;
                    self.consumed = 0;
                }
                // The worker is done; it records any failure before letting
                // go of the queue.
                Err(_) => {
                    return match self.errors.get() {
                        Some(err) => Err(err),
                        None => Ok(&[]),
                    };
                }
            }
        }
        Ok(&self.chunk[self.consumed..])
    }

    fn advance(&mut self, amt: usize) {
        let amt = amt.min(self.chunk.len() - self.consumed);
        self.consumed += amt;
        self.position += amt as u64;
    }
}

fn decode_ahead<R: BufRead>(
    mut decoder: GzipMembers<R>,
    chunks: SyncSender<Vec<u8>>,
    stop: &AtomicBool,
    errors: &ErrorSlot,
    chunk_size: usize,
) {
    let _guard = PanicGuard::new(errors, "decompress worker");

    loop {
        if stop.load(Ordering::Acquire) {
            return;
        }
        let mut chunk = vec![0u8; chunk_size];
        let (filled, failure) = read_chunk(&mut decoder, &mut chunk);
        chunk.truncate(filled);

        // Data decoded before a failure is still delivered, then the error.
        if filled > 0 && chunks.send(chunk).is_err() {
            return;
        }
        if let Some(err) = failure {
            errors.record(GzpipeError::from_decoder(err));
            return;
        }
        if filled == 0 {
            return;
        }
    }
}

/// Fill `buf` from `reader` until it is full, the stream ends or an error
/// occurs.
fn read_chunk<R: Read>(reader: &mut R, buf: &mut [u8]) -> (usize, Option<io::Error>) {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return (filled, Some(e)),
        }
    }
    (filled, None)
}

impl Read for ThreadedGzipReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.read_into(buf)?)
    }
}

impl BufRead for ThreadedGzipReader {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        Ok(self.fill()?)
    }

    fn consume(&mut self, amt: usize) {
        self.advance(amt);
    }
}

impl Drop for ThreadedGzipReader {
    fn drop(&mut self) {
        self.close();
    }
}
