//! File and stream entry points
//!
//! `open_reader` and `open_writer` take either a path or an already open
//! stream and pick the threaded or the single-threaded implementation from
//! the requested thread count.

use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use flate2::write::GzEncoder;
use flate2::{Compression, GzBuilder};

use crate::decode::GzipMembers;
use crate::error::{GzpipeError, GzpipeResult};
use crate::options::{validate_level, ReaderOptions, WriterOptions};
use crate::reader::ThreadedGzipReader;
use crate::writer::ThreadedGzipWriter;

/// How a path is opened. Parsed from the usual mode strings (`"rb"`, `"w"`,
/// `"ab"`, `"x"`, ...).
///
/// Streams are always bytes. A mode containing `t` (`"rt"`, `"wt"`) is
/// rejected with [`GzpipeError::InvalidMode`]; for text, open in binary mode
/// and wrap the reader in `BufRead::lines` or the writer in a formatter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    /// Create or truncate.
    Write,
    /// Create or append a new gzip member at the end.
    Append,
    /// Create; fail if the file exists.
    Exclusive,
}

impl OpenMode {
    pub fn is_write(self) -> bool {
        self != OpenMode::Read
    }

    fn open(self, path: &Path) -> io::Result<File> {
        match self {
            OpenMode::Read => File::open(path),
            OpenMode::Write => File::create(path),
            OpenMode::Append => OpenOptions::new().append(true).create(true).open(path),
            OpenMode::Exclusive => OpenOptions::new().write(true).create_new(true).open(path),
        }
    }
}

impl FromStr for OpenMode {
    type Err = GzpipeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut mode = None;
        for c in s.chars() {
            let next = match c {
                'r' => OpenMode::Read,
                'w' => OpenMode::Write,
                'a' => OpenMode::Append,
                'x' => OpenMode::Exclusive,
                'b' => continue,
                't' => {
                    return Err(GzpipeError::InvalidMode(format!(
                        "text mode is not supported: {:?}",
                        s
                    )))
                }
                _ => return Err(GzpipeError::InvalidMode(format!("{:?}", s))),
            };
            if mode.replace(next).is_some() {
                return Err(GzpipeError::InvalidMode(format!(
                    "more than one of r/w/a/x in {:?}",
                    s
                )));
            }
        }
        mode.ok_or_else(|| GzpipeError::InvalidMode(format!("no r/w/a/x in {:?}", s)))
    }
}

/// Where compressed input comes from.
pub enum Source {
    Path(PathBuf),
    Stream(Box<dyn Read + Send>),
}

impl Source {
    pub fn stream<R: Read + Send + 'static>(reader: R) -> Self {
        Source::Stream(Box::new(reader))
    }
}

impl From<PathBuf> for Source {
    fn from(path: PathBuf) -> Self {
        Source::Path(path)
    }
}

impl From<&Path> for Source {
    fn from(path: &Path) -> Self {
        Source::Path(path.to_path_buf())
    }
}

impl From<&str> for Source {
    fn from(path: &str) -> Self {
        Source::Path(PathBuf::from(path))
    }
}

/// Where compressed output goes.
pub enum Sink {
    Path(PathBuf),
    Stream(Box<dyn Write + Send>),
}

impl Sink {
    pub fn stream<W: Write + Send + 'static>(writer: W) -> Self {
        Sink::Stream(Box::new(writer))
    }
}

impl From<PathBuf> for Sink {
    fn from(path: PathBuf) -> Self {
        Sink::Path(path)
    }
}

impl From<&Path> for Sink {
    fn from(path: &Path) -> Self {
        Sink::Path(path.to_path_buf())
    }
}

impl From<&str> for Sink {
    fn from(path: &str) -> Self {
        Sink::Path(PathBuf::from(path))
    }
}

type SingleDecoder = BufReader<GzipMembers<BufReader<Box<dyn Read + Send>>>>;

/// Reader returned by [`open_reader`].
pub enum GzReader {
    Threaded(ThreadedGzipReader),
    Single(SingleDecoder),
}

impl GzReader {
    pub fn is_threaded(&self) -> bool {
        matches!(self, GzReader::Threaded(_))
    }
}

impl Read for GzReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            GzReader::Threaded(r) => r.read(buf),
            GzReader::Single(r) => r.read(buf),
        }
    }
}

impl BufRead for GzReader {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        match self {
            GzReader::Threaded(r) => r.fill_buf(),
            GzReader::Single(r) => r.fill_buf(),
        }
    }

    fn consume(&mut self, amt: usize) {
        match self {
            GzReader::Threaded(r) => r.consume(amt),
            GzReader::Single(r) => r.consume(amt),
        }
    }
}

/// Writer returned by [`open_writer`].
///
/// The threaded variant sits behind a `BufWriter` of one block, so small
/// writes are gathered into full blocks. `flush` pushes out the buffer and
/// then ends the current gzip member.
pub enum GzWriter {
    Threaded(BufWriter<ThreadedGzipWriter<Box<dyn Write + Send>>>),
    Single(GzEncoder<Box<dyn Write + Send>>),
}

impl GzWriter {
    pub fn is_threaded(&self) -> bool {
        matches!(self, GzWriter::Threaded(_))
    }

    /// Write out buffered data, finish the stream and flush the sink.
    pub fn close(self) -> GzpipeResult<()> {
        match self {
            GzWriter::Threaded(buffered) => {
                let mut writer = buffered
                    .into_inner()
                    .map_err(|e| GzpipeError::from(e.into_error()))?;
                writer.close()
            }
            GzWriter::Single(encoder) => {
                let mut sink = encoder.finish()?;
                sink.flush()?;
                Ok(())
            }
        }
    }
}

impl Write for GzWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            GzWriter::Threaded(w) => w.write(buf),
            GzWriter::Single(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            GzWriter::Threaded(w) => w.flush(),
            GzWriter::Single(w) => w.flush(),
        }
    }
}

/// Open a gzip stream for reading.
///
/// `options.threads == Threads::Fixed(0)` selects flate2's single-threaded
/// decoder; any other count uses [`ThreadedGzipReader`].
pub fn open_reader(source: impl Into<Source>, options: &ReaderOptions) -> GzpipeResult<GzReader> {
    options.validate()?;
    let input: Box<dyn Read + Send> = match source.into() {
        Source::Path(path) => Box::new(OpenMode::Read.open(&path)?),
        Source::Stream(stream) => stream,
    };

    if options.threads.is_disabled() {
        let decoder = GzipMembers::new(BufReader::new(input));
        return Ok(GzReader::Single(BufReader::with_capacity(
            options.block_size,
            decoder,
        )));
    }
    Ok(GzReader::Threaded(ThreadedGzipReader::new(input, options)?))
}

/// Open a gzip stream for writing.
///
/// Options are validated before a path is touched, so a bad level never
/// creates or truncates a file.
pub fn open_writer(
    sink: impl Into<Sink>,
    mode: OpenMode,
    options: &WriterOptions,
) -> GzpipeResult<GzWriter> {
    if !mode.is_write() {
        return Err(GzpipeError::InvalidMode(format!(
            "{:?} cannot be used for writing",
            mode
        )));
    }
    let threaded = !options.threads.is_disabled();
    if threaded {
        options.validate()?;
    } else {
        validate_level(options.level)?;
    }

    let output: Box<dyn Write + Send> = match sink.into() {
        Sink::Path(path) => Box::new(BufWriter::new(mode.open(&path)?)),
        Sink::Stream(stream) => stream,
    };

    if !threaded {
        let encoder = GzBuilder::new()
            .mtime(0)
            .write(output, Compression::new(options.level));
        return Ok(GzWriter::Single(encoder));
    }
    let writer = ThreadedGzipWriter::new(output, options)?;
    Ok(GzWriter::Threaded(BufWriter::with_capacity(
        options.block_size,
        writer,
    )))
}
