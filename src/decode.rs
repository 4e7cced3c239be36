//! Multi-member gzip decoding with lenient end-of-stream rules
//!
//! Members are decoded one at a time with flate2's `bufread::GzDecoder`.
//! An empty input is an empty stream, and NUL bytes after a complete member
//! are padding: they are skipped, and the stream ends if nothing else
//! follows. Anything else after a member must be another member.

use std::io::{self, BufRead, Read};

use flate2::bufread::GzDecoder;

/// Decoder for a sequence of concatenated gzip members.
pub struct GzipMembers<R> {
    source: Option<R>,
    member: Option<GzDecoder<R>>,
    members: u64,
    finished: bool,
}

impl<R: BufRead> GzipMembers<R> {
    pub fn new(source: R) -> Self {
        Self {
            source: Some(source),
            member: None,
            members: 0,
            finished: false,
        }
    }

    /// Members started so far.
    pub fn members(&self) -> u64 {
        self.members
    }

    /// Start the next member if the input holds one.
    fn next_member(&mut self) -> io::Result<bool> {
        let source = match self.source.as_mut() {
            Some(source) => source,
            None => return Ok(false),
        };
        let more = if self.members == 0 {
            !source.fill_buf()?.is_empty()
        } else {
            skip_padding(source)?
        };
        if !more {
            self.finished = true;
            return Ok(false);
        }
        if let Some(source) = self.source.take() {
            self.member = Some(GzDecoder::new(source));
            self.members += 1;
        }
        Ok(true)
    }
}

/// Consume NUL bytes. Returns whether non-padding input follows.
fn skip_padding<R: BufRead>(source: &mut R) -> io::Result<bool> {
    loop {
        let buf = source.fill_buf()?;
        if buf.is_empty() {
            return Ok(false);
        }
        let zeros = buf.iter().take_while(|&&b| b == 0).count();
        let more = zeros < buf.len();
        source.consume(zeros);
        if more {
            return Ok(true);
        }
    }
}

impl<R: BufRead> Read for GzipMembers<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            if let Some(member) = self.member.as_mut() {
                let n = member.read(buf)?;
                if n > 0 {
                    return Ok(n);
                }
                // Trailer verified; hand the input back for the next member.
                if let Some(done) = self.member.take() {
                    self.source = Some(done.into_inner());
                }
            }
            if self.finished || !self.next_member()? {
                return Ok(0);
            }
        }
    }
}
