//! Shared fixtures for unit and oracle tests.

use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex};

/// Compressible text mixed with ~40% random bytes, deterministic per size.
pub fn make_test_data(size: usize) -> Vec<u8> {
    let mut data = Vec::with_capacity(size);
    let mut rng: u64 = 0xdeadbeef;
    let phrases: &[&[u8]] = &[
        b"the quick brown fox jumps over the lazy dog. ",
        b"pack my box with five dozen liquor jugs! ",
        b"0123456789 abcdefghijklmnopqrstuvwxyz ABCDEFGHIJKLMNOP\n",
        b"how vexingly quick daft zebras jump. ",
        b"the five boxing wizards jump quickly. ",
    ];
    while data.len() < size {
        rng = rng.wrapping_mul(6364136223846793005).wrapping_add(1);
        if (rng >> 32) % 5 < 2 {
            data.push((rng >> 16) as u8);
        } else {
            let phrase = phrases[((rng >> 24) as usize) % phrases.len()];
            let remaining = size - data.len();
            data.extend_from_slice(&phrase[..remaining.min(phrase.len())]);
        }
    }
    data.truncate(size);
    data
}

/// Incompressible bytes.
pub fn make_random_data(size: usize, seed: u64) -> Vec<u8> {
    let mut rng = seed ^ 0x9e3779b97f4a7c15;
    (0..size)
        .map(|_| {
            rng = rng.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            (rng >> 33) as u8
        })
        .collect()
}

/// Decode with flate2 (multi-member aware) as the reference decoder.
pub fn gunzip(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    flate2::read::MultiGzDecoder::new(data)
        .read_to_end(&mut out)
        .unwrap();
    out
}

/// Number of gzip members in a stream, counted by decoding one at a time.
pub fn count_members(mut data: &[u8]) -> usize {
    let mut members = 0;
    while !data.is_empty() {
        let mut decoder = flate2::bufread::GzDecoder::new(data);
        io::copy(&mut decoder, &mut io::sink()).unwrap();
        data = decoder.into_inner();
        members += 1;
    }
    members
}

/// A sink whose contents stay readable after it is moved into a writer.
#[derive(Clone, Default)]
pub struct SharedSink(Arc<Mutex<Vec<u8>>>);

impl SharedSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> Vec<u8> {
        self.0.lock().unwrap().clone()
    }
}

impl Write for SharedSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
