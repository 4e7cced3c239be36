use std::fmt;
use std::io;
use std::sync::Arc;
use thiserror::Error;

/// Every failure the pipeline can report.
///
/// The error is `Clone` so a failure captured on a worker thread can be
/// handed to the owning thread more than once (the reader re-raises it on
/// every read after the decoder died).
#[derive(Error, Debug, Clone)]
pub enum GzpipeError {
    #[error("IO error: {0}")]
    Io(#[source] Arc<io::Error>),

    #[error("Invalid compression level: {0} (supported levels are 0-9)")]
    InvalidLevel(u32),

    #[error("Invalid thread count: {0} (at least one thread is required)")]
    InvalidThreads(usize),

    #[error("Invalid block size: {0}")]
    InvalidBlockSize(String),

    #[error("Invalid mode: {0}")]
    InvalidMode(String),

    #[error("I/O operation on closed file")]
    Closed,

    #[error("Compression error in block {block}: {message}")]
    Compression { block: u64, message: String },

    #[error("Compressed output of block {block} exceeds buffer size of {capacity} bytes")]
    BufferOverflow { block: u64, capacity: usize },

    #[error("Decompression error: {0}")]
    Decompression(String),

    #[error("Compressed file ended before the end-of-stream marker was reached: {0}")]
    UnexpectedEof(String),

    #[error("Thread error: {0}")]
    Thread(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl GzpipeError {
    pub fn decompression<T: fmt::Display>(msg: T) -> Self {
        GzpipeError::Decompression(msg.to_string())
    }

    pub fn thread<T: fmt::Display>(msg: T) -> Self {
        GzpipeError::Thread(msg.to_string())
    }

    pub fn internal<T: fmt::Display>(msg: T) -> Self {
        GzpipeError::Internal(msg.to_string())
    }

    /// Classify an error raised by the gzip decoder.
    ///
    /// flate2 reports a short trailer or header as `UnexpectedEof` and a bad
    /// magic, corrupt deflate data or checksum mismatch as `InvalidInput` /
    /// `InvalidData`.
    pub fn from_decoder(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::UnexpectedEof => GzpipeError::UnexpectedEof(err.to_string()),
            io::ErrorKind::InvalidInput | io::ErrorKind::InvalidData => {
                GzpipeError::Decompression(err.to_string())
            }
            _ => GzpipeError::from(err),
        }
    }

    /// True for errors raised synchronously because of bad options.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            GzpipeError::InvalidLevel(_)
                | GzpipeError::InvalidThreads(_)
                | GzpipeError::InvalidBlockSize(_)
                | GzpipeError::InvalidMode(_)
        )
    }

    /// True for errors describing damaged or truncated compressed input.
    pub fn is_corrupt_input(&self) -> bool {
        matches!(
            self,
            GzpipeError::Decompression(_) | GzpipeError::UnexpectedEof(_)
        )
    }
}

impl From<io::Error> for GzpipeError {
    fn from(err: io::Error) -> Self {
        // Errors that already carry a GzpipeError (e.g. bubbled up through a
        // Write adapter) are unwrapped instead of being nested.
        if err.get_ref().is_some_and(|inner| inner.is::<GzpipeError>()) {
            if let Some(inner) = err.into_inner() {
                if let Ok(ours) = inner.downcast::<GzpipeError>() {
                    return *ours;
                }
            }
            return GzpipeError::internal("lost wrapped error");
        }
        GzpipeError::Io(Arc::new(err))
    }
}

impl From<GzpipeError> for io::Error {
    fn from(err: GzpipeError) -> Self {
        let err = match err {
            GzpipeError::Io(inner) => {
                return match Arc::try_unwrap(inner) {
                    Ok(io_err) => io_err,
                    Err(shared) => io::Error::new(shared.kind(), GzpipeError::Io(shared)),
                };
            }
            other => other,
        };
        let kind = match &err {
            e if e.is_config() => io::ErrorKind::InvalidInput,
            GzpipeError::Decompression(_) => io::ErrorKind::InvalidData,
            GzpipeError::UnexpectedEof(_) => io::ErrorKind::UnexpectedEof,
            _ => io::ErrorKind::Other,
        };
        io::Error::new(kind, err)
    }
}

pub type GzpipeResult<T> = Result<T, GzpipeError>;
