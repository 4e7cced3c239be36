//! Pigz-style compression pipeline with a dedicated sequencer thread
//!
//! 1. N compress worker threads, each with its own bounded input queue and
//!    bounded output queue
//! 2. 1 sequencer thread that owns the sink, the running CRC32 and the
//!    running size
//! 3. Pipeline entry `i` always goes to worker `i % N`
//!
//! Because every worker handles its entries in FIFO order, entry `i` is the
//! next item on output queue `i % N` once entries `0..i` have been taken.
//! Draining the output queues round-robin therefore yields submission order
//! without a reorder buffer, even when workers finish out of order.
//!
//! Ending a gzip member is itself a pipeline entry. The marker travels
//! through a worker untouched and reaches the sequencer in order, so the
//! sink, CRC and size are only ever touched by the sequencer.

use std::io::Write;
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::codec::{crc32_combine, BlockCompressor, CodecError, CompressedBlock};
use crate::error::{GzpipeError, GzpipeResult};
use crate::format::member_end;
use crate::options::WINDOW_SIZE;
use crate::sync::{PanicGuard, Progress};

/// Read-only view of the last `WINDOW_SIZE` bytes of the previous block.
///
/// Holds a reference to the previous block rather than a copy; the block is
/// released as soon as the compression job using it finishes.
#[derive(Clone, Debug, Default)]
pub struct Dictionary {
    source: Option<Arc<[u8]>>,
}

impl Dictionary {
    pub fn tail_of(previous: Option<Arc<[u8]>>) -> Self {
        Self { source: previous }
    }

    pub fn as_slice(&self) -> &[u8] {
        match &self.source {
            Some(block) => &block[block.len().saturating_sub(WINDOW_SIZE)..],
            None => &[],
        }
    }
}

/// Work handed to a compress worker.
pub enum Job {
    Block {
        /// Sequence number among blocks (markers excluded), for error reports.
        number: u64,
        data: Arc<[u8]>,
        dictionary: Dictionary,
    },
    /// Close the current member; `next_header` carries the level for the
    /// header of the member that follows, if any.
    EndMember { next_header: Option<u32> },
}

/// Work handed from a compress worker to the sequencer.
enum Finished {
    Block {
        number: u64,
        compressed: CompressedBlock,
    },
    EndMember {
        next_header: Option<u32>,
    },
}

fn codec_failure(block: u64, err: CodecError) -> GzpipeError {
    match err {
        CodecError::Overflow { capacity } => GzpipeError::BufferOverflow { block, capacity },
        CodecError::Backend(message) => GzpipeError::Compression { block, message },
    }
}

/// Running threads of one writer.
pub struct Pipeline<W> {
    inputs: Vec<SyncSender<Job>>,
    workers: Vec<JoinHandle<()>>,
    sequencer: JoinHandle<W>,
    submitted: u64,
}

impl<W: Write + Send + 'static> Pipeline<W> {
    /// Spawn one worker per compressor plus the sequencer.
    pub fn start(
        sink: W,
        compressors: Vec<Box<dyn BlockCompressor>>,
        queue_size: usize,
        progress: Arc<Progress>,
    ) -> GzpipeResult<Self> {
        if compressors.is_empty() {
            return Err(GzpipeError::InvalidThreads(0));
        }

        let mut inputs = Vec::with_capacity(compressors.len());
        let mut outputs = Vec::with_capacity(compressors.len());
        let mut workers = Vec::with_capacity(compressors.len());

        for (id, compressor) in compressors.into_iter().enumerate() {
            let (job_tx, job_rx) = mpsc::sync_channel::<Job>(queue_size);
            let (done_tx, done_rx) = mpsc::sync_channel::<Finished>(queue_size);
            let progress = Arc::clone(&progress);
            let handle = thread::Builder::new()
                .name(format!("gzpipe-compress-{}", id))
                .spawn(move || compress_worker(job_rx, done_tx, compressor, &progress))
                .map_err(|e| GzpipeError::thread(format!("failed to spawn worker: {}", e)))?;
            inputs.push(job_tx);
            outputs.push(done_rx);
            workers.push(handle);
        }

        let sequencer = thread::Builder::new()
            .name("gzpipe-sequencer".to_string())
            .spawn(move || sequence(sink, outputs, &progress))
            .map_err(|e| GzpipeError::thread(format!("failed to spawn sequencer: {}", e)))?;

        Ok(Self {
            inputs,
            workers,
            sequencer,
            submitted: 0,
        })
    }

    /// Queue `job` on its round-robin worker and return its pipeline index.
    /// Blocks while that worker's queue is full. Returns `None` if the worker
    /// has already stopped.
    pub fn submit(&mut self, job: Job) -> Option<u64> {
        let index = self.submitted;
        let lane = (index % self.inputs.len() as u64) as usize;
        self.inputs[lane].send(job).ok()?;
        self.submitted += 1;
        Some(index)
    }

    /// Stop accepting work, let the threads drain and exit, and hand back
    /// the sink (`None` if the sequencer panicked).
    pub fn shutdown(self) -> Option<W> {
        // Disconnecting the input queues is the stop signal: each worker
        // finishes what is queued, then drops its output queue, which in turn
        // ends the sequencer.
        drop(self.inputs);
        for worker in self.workers {
            // A panic has already been recorded by the worker's guard.
            let _ = worker.join();
        }
        self.sequencer.join().ok()
    }
}

fn compress_worker(
    jobs: Receiver<Job>,
    finished: SyncSender<Finished>,
    mut compressor: Box<dyn BlockCompressor>,
    progress: &Progress,
) {
    let _guard = PanicGuard::new(progress, "compress worker");

    for job in jobs.iter() {
        if progress.is_cancelled() {
            // Returning drops the queue, discarding whatever is still in it.
            return;
        }
        let out = match job {
            Job::Block {
                number,
                data,
                dictionary,
            } => match compressor.compress_block(&data, dictionary.as_slice()) {
                Ok(compressed) => Finished::Block { number, compressed },
                Err(err) => {
                    progress.fail(codec_failure(number, err));
                    return;
                }
            },
            Job::EndMember { next_header } => Finished::EndMember { next_header },
        };
        if finished.send(out).is_err() {
            return;
        }
    }
}

fn sequence<W: Write>(mut sink: W, outputs: Vec<Receiver<Finished>>, progress: &Progress) -> W {
    let _guard = PanicGuard::new(progress, "sequencer");

    let lanes = outputs.len() as u64;
    let mut index = 0u64;
    let mut crc = 0u32;
    let mut size = 0u64;

    loop {
        let lane = &outputs[(index % lanes) as usize];
        let finished = match lane.recv() {
            Ok(finished) => finished,
            // The worker for this lane is gone: shutdown or failure.
            Err(_) => break,
        };
        if progress.is_cancelled() {
            break;
        }

        let written = match finished {
            Finished::Block { number, compressed } => {
                crc = crc32_combine(crc, compressed.crc, compressed.len as u64);
                size += compressed.len as u64;
                tracing::trace!(
                    block = number,
                    raw = compressed.len,
                    compressed = compressed.data.len(),
                    "sequenced block"
                );
                sink.write_all(&compressed.data)
            }
            Finished::EndMember { next_header } => {
                tracing::debug!(crc, size, reopen = next_header.is_some(), "gzip member end");
                let tail = member_end(crc, size, next_header);
                crc = 0;
                size = 0;
                sink.write_all(&tail).and_then(|_| sink.flush())
            }
        };

        if let Err(err) = written {
            progress.fail(err.into());
            break;
        }
        index += 1;
        progress.advance(index);
    }

    sink
}
