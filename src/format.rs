//! Gzip member framing written by the threaded writer
//!
//! Only the minimal RFC 1952 member is emitted: no FNAME, FEXTRA or FCOMMENT,
//! mtime 0 and OS "unknown". Parsing headers on the read side is left to the
//! flate2 decoder.

use crate::options::FASTEST_COMPRESSION_LEVEL;

pub const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
pub const METHOD_DEFLATE: u8 = 0x08;
pub const OS_UNKNOWN: u8 = 0xff;

/// XFL value announcing the fastest compression method.
pub const XFL_FASTEST: u8 = 4;

pub const HEADER_LEN: usize = 10;
pub const TRAILER_LEN: usize = 8;

/// An empty fixed-Huffman block with BFINAL set: `1` (final), `01` (fixed),
/// then end-of-block code 0000000, padded to a byte boundary.
pub const EMPTY_FINAL_BLOCK: [u8; 2] = [0x03, 0x00];

/// The 10-byte header opening every member.
pub fn gzip_header(level: u32) -> [u8; HEADER_LEN] {
    let xfl = if level <= FASTEST_COMPRESSION_LEVEL {
        XFL_FASTEST
    } else {
        0
    };
    let mtime = 0u32.to_le_bytes();
    [
        GZIP_MAGIC[0],
        GZIP_MAGIC[1],
        METHOD_DEFLATE,
        0x00, // FLG: no optional fields
        mtime[0],
        mtime[1],
        mtime[2],
        mtime[3],
        xfl,
        OS_UNKNOWN,
    ]
}

/// CRC32 and ISIZE (uncompressed size modulo 2^32), both little endian.
pub fn gzip_trailer(crc: u32, size: u64) -> [u8; TRAILER_LEN] {
    let mut trailer = [0u8; TRAILER_LEN];
    trailer[..4].copy_from_slice(&crc.to_le_bytes());
    trailer[4..].copy_from_slice(&(size as u32).to_le_bytes());
    trailer
}

/// Everything written after the last compressed block of a member, and,
/// when the stream continues, the header of the next member.
pub fn member_end(crc: u32, size: u64, next_header: Option<u32>) -> Vec<u8> {
    let mut out = Vec::with_capacity(EMPTY_FINAL_BLOCK.len() + TRAILER_LEN + HEADER_LEN);
    out.extend_from_slice(&EMPTY_FINAL_BLOCK);
    out.extend_from_slice(&gzip_trailer(crc, size));
    if let Some(level) = next_header {
        out.extend_from_slice(&gzip_header(level));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn test_header_layout() {
        assert_eq!(
            gzip_header(6),
            [0x1f, 0x8b, 0x08, 0x00, 0, 0, 0, 0, 0x00, 0xff]
        );
        assert_eq!(gzip_header(1)[8], XFL_FASTEST);
        assert_eq!(gzip_header(0)[8], XFL_FASTEST);
        assert_eq!(gzip_header(9)[8], 0);
    }

    #[test]
    fn test_trailer_wraps_size() {
        let t = gzip_trailer(0xdeadbeef, (1u64 << 32) + 5);
        assert_eq!(&t[..4], &[0xef, 0xbe, 0xad, 0xde]);
        assert_eq!(&t[4..], &[5, 0, 0, 0]);
    }

    #[test]
    fn test_empty_member_is_valid_gzip() {
        let mut member = gzip_header(6).to_vec();
        member.extend_from_slice(&member_end(0, 0, None));

        let mut decoder = flate2::read::GzDecoder::new(&member[..]);
        let mut out = Vec::new();
        decoder.read_to_end(&mut out).unwrap();
        assert!(out.is_empty());
        let header = decoder.header().unwrap();
        assert_eq!(header.mtime(), 0);
        assert_eq!(header.operating_system(), OS_UNKNOWN);
    }

    #[test]
    fn test_empty_final_block_matches_backend() {
        let encoder =
            flate2::write::DeflateEncoder::new(Vec::new(), flate2::Compression::default());
        let produced = encoder.finish().unwrap();
        assert_eq!(produced, EMPTY_FINAL_BLOCK);
    }

    #[test]
    fn test_member_end_reheaders() {
        let tail = member_end(1, 2, Some(9));
        assert_eq!(tail.len(), 2 + TRAILER_LEN + HEADER_LEN);
        assert_eq!(&tail[10..12], &GZIP_MAGIC);
    }
}
