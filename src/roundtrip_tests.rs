//! Layered round-trip tests for the threaded pipeline.
//!
//! flate2 and crc32fast act as ground truth, so every layer is checked
//! against an independent implementation before the layers are composed.
//!
//! Layer 0: Oracle: reference gzip, CRC32 and member parsing
//! Layer 1: Block chain: dictionary-seeded blocks form one deflate stream
//! Layer 2: Framing: header and trailer of writer output
//! Layer 3: Pipeline: writer and reader together, under varied chunking
//! Layer 4: Scenarios: flush points, failures, mixed implementations

#[cfg(test)]
mod tests {
    use crate::codec::{BlockCompressor, DeflateBlockCompressor};
    use crate::format::{EMPTY_FINAL_BLOCK, HEADER_LEN, TRAILER_LEN};
    use crate::options::{compress_buffer_size, ReaderOptions, WriterOptions, WINDOW_SIZE};
    use crate::test_utils::{count_members, make_random_data, make_test_data, SharedSink};
    use crate::{ThreadedGzipReader, ThreadedGzipWriter};
    use proptest::prelude::*;
    use std::io::{Cursor, Read, Write};

    // =========================================================================
    // Layer 0: Oracle
    // =========================================================================

    /// Decode one member with flate2, returning its payload and the bytes
    /// that follow it.
    fn decode_member(data: &[u8]) -> (Vec<u8>, &[u8]) {
        let mut decoder = flate2::bufread::GzDecoder::new(data);
        let mut out = Vec::new();
        decoder.read_to_end(&mut out).unwrap();
        (out, decoder.into_inner())
    }

    fn oracle_decode(data: &[u8]) -> Vec<u8> {
        let mut rest = data;
        let mut out = Vec::new();
        while !rest.is_empty() {
            let (payload, tail) = decode_member(rest);
            out.extend_from_slice(&payload);
            rest = tail;
        }
        out
    }

    fn threaded_compress(data: &[u8], threads: usize, block_size: usize, piece: usize) -> Vec<u8> {
        let opts = WriterOptions::new().threads(threads).block_size(block_size);
        let mut w = ThreadedGzipWriter::new(Vec::new(), &opts).unwrap();
        for chunk in data.chunks(piece.max(1)) {
            w.write_all(chunk).unwrap();
        }
        w.finish().unwrap()
    }

    fn threaded_decompress(data: Vec<u8>, block_size: usize) -> Vec<u8> {
        let opts = ReaderOptions::new().block_size(block_size);
        let mut r = ThreadedGzipReader::new(Cursor::new(data), &opts).unwrap();
        let mut out = Vec::new();
        r.read_to_end(&mut out).unwrap();
        out
    }

    #[test]
    fn test_oracle_splits_members() {
        let mut stream = crate::oneshot::compress(b"one", 6).unwrap();
        stream.extend_from_slice(&crate::oneshot::compress(b"two", 6).unwrap());
        let (first, rest) = decode_member(&stream);
        assert_eq!(first, b"one");
        assert_eq!(oracle_decode(rest), b"two");
        assert_eq!(count_members(&stream), 2);
    }

    // =========================================================================
    // Layer 1: Block chain
    // =========================================================================

    /// Compress `data` block by block on one thread exactly as the pipeline
    /// would, returning the raw deflate stream.
    fn chain_blocks(data: &[u8], block_size: usize) -> Vec<u8> {
        let mut compressor = DeflateBlockCompressor::new(6, compress_buffer_size(block_size));
        let mut stream = Vec::new();
        let mut previous: &[u8] = &[];
        for block in data.chunks(block_size) {
            let dictionary = &previous[previous.len().saturating_sub(WINDOW_SIZE)..];
            stream.extend_from_slice(&compressor.compress_block(block, dictionary).unwrap().data);
            previous = block;
        }
        stream.extend_from_slice(&EMPTY_FINAL_BLOCK);
        stream
    }

    #[test]
    fn test_chain_with_blocks_smaller_than_window() {
        let data = make_test_data(100_000);
        let stream = chain_blocks(&data, 4096);
        let mut out = Vec::new();
        flate2::read::DeflateDecoder::new(&stream[..])
            .read_to_end(&mut out)
            .unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn test_chain_with_blocks_larger_than_window() {
        let data = make_test_data(400_000);
        let stream = chain_blocks(&data, 100_000);
        let mut out = Vec::new();
        flate2::read::DeflateDecoder::new(&stream[..])
            .read_to_end(&mut out)
            .unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn test_pipeline_bytes_match_single_thread_chain() {
        // Each write of exactly one block becomes one block, and blocks are
        // compressed deterministically, so the thread count must not change
        // a single output byte.
        let data = make_test_data(200_000);
        let reference = threaded_compress(&data, 1, 16 * 1024, 16 * 1024);
        for threads in [2, 3, 8] {
            assert_eq!(
                threaded_compress(&data, threads, 16 * 1024, 16 * 1024),
                reference,
                "threads={}",
                threads
            );
        }
        let body = &reference[HEADER_LEN..reference.len() - TRAILER_LEN];
        assert_eq!(body, &chain_blocks(&data, 16 * 1024)[..]);
    }

    // =========================================================================
    // Layer 2: Framing
    // =========================================================================

    #[test]
    fn test_framing_fields() {
        let data = make_random_data(70_000, 4);
        let out = threaded_compress(&data, 2, 8192, 8192);

        let mut decoder = flate2::read::GzDecoder::new(&out[..]);
        let mut payload = Vec::new();
        decoder.read_to_end(&mut payload).unwrap();
        let header = decoder.header().unwrap();
        assert_eq!(header.mtime(), 0);
        assert_eq!(header.operating_system(), 0xff);
        assert!(header.filename().is_none());
        assert_eq!(payload, data);

        let trailer = &out[out.len() - TRAILER_LEN..];
        assert_eq!(&trailer[..4], &crc32fast::hash(&data).to_le_bytes());
        assert_eq!(&trailer[4..], &(data.len() as u32).to_le_bytes());
    }

    // =========================================================================
    // Layer 3: Pipeline
    // =========================================================================

    #[test]
    fn test_writer_to_reader_sizes() {
        let block_size = 4096;
        for threads in [1, 2, 8] {
            for size in [0, 1, block_size - 1, block_size, block_size + 1, 10 * block_size + 3] {
                let data = make_test_data(size);
                let compressed = threaded_compress(&data, threads, block_size, 1500);
                assert_eq!(oracle_decode(&compressed), data);
                assert_eq!(threaded_decompress(compressed, 1000), data);
            }
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn prop_chunking_never_changes_payload(
            data in proptest::collection::vec(any::<u8>(), 0..20_000),
            threads in 1usize..5,
            block_size in 64usize..4096,
            piece in 1usize..3000,
        ) {
            let compressed = threaded_compress(&data, threads, block_size, piece);
            prop_assert_eq!(oracle_decode(&compressed), data.clone());
            prop_assert_eq!(threaded_decompress(compressed, 777), data);
        }

        #[test]
        fn prop_writes_arrive_in_order(
            parts in proptest::collection::vec(proptest::collection::vec(any::<u8>(), 0..600), 1..40),
            threads in 1usize..6,
        ) {
            let opts = WriterOptions::new().threads(threads).block_size(256);
            let mut w = ThreadedGzipWriter::new(Vec::new(), &opts).unwrap();
            for part in &parts {
                w.write_all(part).unwrap();
            }
            let expected: Vec<u8> = parts.concat();
            prop_assert_eq!(oracle_decode(&w.finish().unwrap()), expected);
        }
    }

    // =========================================================================
    // Layer 4: Scenarios
    // =========================================================================

    #[test]
    fn test_one_two_three_flush_scenario() {
        for threads in [1, 2] {
            let sink = SharedSink::new();
            let opts = WriterOptions::new().threads(threads);
            let mut w = ThreadedGzipWriter::new(sink.clone(), &opts).unwrap();

            w.write_all(b"1").unwrap();
            w.flush().unwrap();
            let first = sink.contents();
            assert_eq!(oracle_decode(&first[..first.len() - HEADER_LEN]), b"1");

            w.write_all(b"2").unwrap();
            w.flush().unwrap();
            let second = sink.contents();
            assert_eq!(oracle_decode(&second[..second.len() - HEADER_LEN]), b"12");

            w.write_all(b"3").unwrap();
            w.close().unwrap();
            let all = sink.contents();
            assert_eq!(oracle_decode(&all), b"123");
            assert_eq!(threaded_decompress(all, 4), b"123");
        }
    }

    #[test]
    fn test_flush_between_large_writes() {
        let data = make_test_data(500_000);
        let sink = SharedSink::new();
        let opts = WriterOptions::new().threads(4).block_size(32 * 1024);
        let mut w = ThreadedGzipWriter::new(sink.clone(), &opts).unwrap();
        for (i, chunk) in data.chunks(60_000).enumerate() {
            w.write_all(chunk).unwrap();
            if i % 3 == 2 {
                w.flush().unwrap();
            }
        }
        w.close().unwrap();
        let out = sink.contents();
        assert!(count_members(&out) > 1);
        assert_eq!(oracle_decode(&out), data);
    }

    #[test]
    fn test_reader_catches_damage_in_threaded_output() {
        let data = make_test_data(100_000);
        let mut compressed = threaded_compress(&data, 4, 8192, 8192);
        compressed.truncate(compressed.len() - TRAILER_LEN);

        let opts = ReaderOptions::new().block_size(4096);
        let mut r = ThreadedGzipReader::new(Cursor::new(compressed), &opts).unwrap();
        let mut out = Vec::new();
        let err = crate::GzpipeError::from(r.read_to_end(&mut out).unwrap_err());
        assert!(err.is_corrupt_input(), "{}", err);
    }

    #[test]
    fn test_custom_compressor_factory_sees_every_worker() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let built = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&built);
        let opts = WriterOptions::new().threads(5).block_size(1024);
        let w = ThreadedGzipWriter::with_compressors(Vec::new(), &opts, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Box::new(DeflateBlockCompressor::new(6, compress_buffer_size(1024)))
                as Box<dyn BlockCompressor>
        })
        .unwrap();
        assert_eq!(built.load(Ordering::SeqCst), 5);
        assert!(oracle_decode(&w.finish().unwrap()).is_empty());
    }
}
