//! Streaming behaviour: tiny buffers, flush modes, dictionaries and
//! resynchronization.

use oxizip_core::traits::{Compressor, Decompressor, FlushMode, Status};
use oxizip_deflate::{DeflateOptions, Deflater, Format, Inflater, deflate, inflate};

fn sample(size: usize) -> Vec<u8> {
    let words: [&[u8]; 6] = [b"zip ", b"deflate ", b"stream ", b"window ", b"huffman ", b"crc "];
    let mut data = Vec::with_capacity(size);
    let mut i = 0usize;
    while data.len() < size {
        data.extend_from_slice(words[(i * 7 + i / 3) % words.len()]);
        data.push((i % 251) as u8);
        i += 1;
    }
    data.truncate(size);
    data
}

/// Compress with the given input and output chunk sizes.
fn compress_chunked(deflater: &mut Deflater, data: &[u8], in_chunk: usize, out_chunk: usize) -> Vec<u8> {
    let mut compressed = Vec::new();
    let mut out = vec![0u8; out_chunk];
    let mut pos = 0;
    loop {
        let end = (pos + in_chunk).min(data.len());
        let flush = if end == data.len() { FlushMode::Finish } else { FlushMode::None };
        let (consumed, produced, status) = deflater.compress(&data[pos..end], &mut out, flush).unwrap();
        pos += consumed;
        compressed.extend_from_slice(&out[..produced]);
        if status == Status::StreamEnd {
            break;
        }
    }
    assert_eq!(pos, data.len());
    compressed
}

/// Decompress with the given input and output chunk sizes.
fn decompress_chunked(inflater: &mut Inflater, data: &[u8], in_chunk: usize, out_chunk: usize) -> Vec<u8> {
    let mut output = Vec::new();
    let mut out = vec![0u8; out_chunk];
    let mut pos = 0;
    loop {
        let end = (pos + in_chunk).min(data.len());
        let (consumed, produced, status) =
            inflater.decompress(&data[pos..end], &mut out, FlushMode::None).unwrap();
        pos += consumed;
        output.extend_from_slice(&out[..produced]);
        match status {
            Status::StreamEnd => break,
            Status::BufError => assert!(pos < data.len(), "stream ended early"),
            _ => {}
        }
    }
    output
}

#[test]
fn test_one_byte_buffers_both_directions() {
    let data = sample(20_000);
    for level in [0, 1, 6, 9] {
        let mut deflater = Deflater::new(level);
        let compressed = compress_chunked(&mut deflater, &data, 1, 1);
        assert_eq!(deflater.total_in(), data.len() as u64);
        assert_eq!(deflater.total_out(), compressed.len() as u64);

        let mut inflater = Inflater::new();
        let output = decompress_chunked(&mut inflater, &compressed, 1, 1);
        assert_eq!(output, data, "level {}", level);
        assert_eq!(inflater.total_in(), compressed.len() as u64);
        assert_eq!(inflater.total_out(), data.len() as u64);
    }
}

#[test]
fn test_chunking_does_not_change_output() {
    let data = sample(70_000);
    let one_shot = deflate(&data, 6).unwrap();
    for (in_chunk, out_chunk) in [(1, 7), (13, 1), (4096, 3), (65536, 65536)] {
        let mut deflater = Deflater::new(6);
        assert_eq!(compress_chunked(&mut deflater, &data, in_chunk, out_chunk), one_shot);
    }
}

#[test]
fn test_zlib_one_byte_buffers() {
    let data = sample(5_000);
    let options = DeflateOptions::new(6).with_format(Format::Zlib);
    let mut deflater = Deflater::with_options(options);
    let compressed = compress_chunked(&mut deflater, &data, 1, 1);
    assert_eq!(&compressed[..2], &[0x78, 0x9C]);

    let mut inflater = Inflater::with_format(Format::Zlib);
    assert_eq!(decompress_chunked(&mut inflater, &compressed, 1, 1), data);
    assert_eq!(inflater.adler(), deflater.adler());
}

#[test]
fn test_finish_drains_over_many_calls() {
    let data = sample(10_000);
    let mut deflater = Deflater::new(9);
    let mut out = [0u8; 16];
    let (consumed, _, status) = deflater.compress(&data, &mut out, FlushMode::Finish).unwrap();
    assert_eq!(consumed, data.len());
    assert_eq!(status, Status::Ok);

    let mut compressed = out.to_vec();
    let mut calls = 1;
    loop {
        let (consumed, produced, status) = deflater.compress(&[], &mut out, FlushMode::Finish).unwrap();
        assert_eq!(consumed, 0);
        compressed.extend_from_slice(&out[..produced]);
        calls += 1;
        if status == Status::StreamEnd {
            break;
        }
        assert_eq!(produced, out.len());
    }
    assert!(calls > 2);
    assert!(deflater.is_finished());
    assert_eq!(inflate(&compressed).unwrap(), data);
    deflater.end().unwrap();
}

#[test]
fn test_sync_flush_lets_decoder_catch_up() {
    let mut deflater = Deflater::new(6);
    let mut inflater = Inflater::new();
    let mut out = vec![0u8; 4096];
    let mut plain = vec![0u8; 4096];

    for message in [&b"first message "[..], b"second message ", b"first message again"] {
        let (consumed, produced, _) = deflater.compress(message, &mut out, FlushMode::Sync).unwrap();
        assert_eq!(consumed, message.len());
        assert_eq!(&out[produced - 4..produced], &[0x00, 0x00, 0xFF, 0xFF]);

        let (_, decoded, status) = inflater
            .decompress(&out[..produced], &mut plain, FlushMode::None)
            .unwrap();
        assert_eq!(status, Status::Ok);
        assert_eq!(&plain[..decoded], message);
    }
}

#[test]
fn test_full_flush_then_resync() {
    let hello = b"hello, hello!";
    let options = DeflateOptions::new(6).with_format(Format::Zlib);
    let mut deflater = Deflater::with_options(options);
    let mut compressed = vec![0u8; 256];
    let (_, first, _) = deflater
        .compress(&hello[..3], &mut compressed, FlushMode::Full)
        .unwrap();
    let (_, second, status) = deflater
        .compress(&hello[3..], &mut compressed[first..], FlushMode::Finish)
        .unwrap();
    assert_eq!(status, Status::StreamEnd);
    compressed.truncate(first + second);

    // Damage the first block.
    compressed[3] = compressed[3].wrapping_add(1);

    let mut inflater = Inflater::with_format(Format::Zlib);
    let mut out = [0u8; 64];
    inflater.decompress(&compressed[..2], &mut out, FlushMode::None).unwrap();

    let (skipped, status) = inflater.sync(&compressed[2..]).unwrap();
    assert_eq!(status, Status::Ok);
    assert_eq!(2 + skipped, first);

    let (_, produced, status) = inflater
        .decompress(&compressed[first..], &mut out, FlushMode::Finish)
        .unwrap();
    assert_eq!(status, Status::StreamEnd);
    assert_eq!(&out[..produced], b"lo, hello!");
}

#[test]
fn test_sync_without_marker_needs_more_input() {
    let mut inflater = Inflater::new();
    let (consumed, status) = inflater.sync(&[0x12, 0x34, 0x00, 0x00]).unwrap();
    assert_eq!((consumed, status), (4, Status::BufError));
    let (consumed, status) = inflater.sync(&[0xFF, 0xFF, 0x03, 0x00]).unwrap();
    assert_eq!((consumed, status), (2, Status::Ok));
    let mut out = [0u8; 8];
    let (_, _, status) = inflater.decompress(&[0x03, 0x00], &mut out, FlushMode::None).unwrap();
    assert_eq!(status, Status::StreamEnd);
}

#[test]
fn test_need_dictionary_round_trip() {
    let dictionary = b"shared vocabulary: archive entry header directory";
    let data = b"archive entry header, directory entry header, archive";
    let options = DeflateOptions::new(9).with_format(Format::Zlib);

    let mut deflater = Deflater::with_options(options);
    deflater.set_dictionary(dictionary).unwrap();
    let compressed = deflater.compress_all(data).unwrap();

    let mut inflater = Inflater::with_format(Format::Zlib);
    let mut out = [0u8; 256];
    let (consumed, produced, status) = inflater.decompress(&compressed, &mut out, FlushMode::None).unwrap();
    assert_eq!((produced, status), (0, Status::NeedDictionary));
    assert_eq!(consumed, 6);
    assert_eq!(inflater.adler(), oxizip_deflate::Adler32::checksum(dictionary));

    assert!(inflater.set_dictionary(b"wrong dictionary").is_err());
    inflater.set_dictionary(dictionary).unwrap();
    let (_, produced, status) = inflater
        .decompress(&compressed[consumed..], &mut out, FlushMode::None)
        .unwrap();
    assert_eq!(status, Status::StreamEnd);
    assert_eq!(&out[..produced], data);
}

#[test]
fn test_raw_dictionary_round_trip() {
    let dictionary = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let data = b"abcdefghij0123456789abcdefghij";
    let mut deflater = Deflater::new(6);
    deflater.set_dictionary(dictionary).unwrap();
    let compressed = deflater.compress_all(data).unwrap();

    let mut inflater = Inflater::new();
    inflater.set_dictionary(dictionary).unwrap();
    assert_eq!(inflater.decompress_all(&compressed).unwrap(), data);

    // Without the dictionary the back-references point nowhere.
    assert!(inflate(&compressed).is_err());
}

#[test]
fn test_corruption_reports_message() {
    let data = sample(2_000);
    let mut compressed = deflate(&data, 6).unwrap();
    // A dynamic block header with an impossible code count.
    compressed[0] = 0b1111_1101;
    compressed[1] = 0xFF;
    let mut inflater = Inflater::new();
    let err = inflater.decompress_all(&compressed).unwrap_err();
    assert!(err.is_corruption());
    assert_eq!(
        inflater.last_error(),
        Some("too many length or distance symbols")
    );
}

#[test]
fn test_finish_before_end_is_buf_error() {
    let compressed = deflate(&sample(1_000), 6).unwrap();
    let mut inflater = Inflater::new();
    let mut out = vec![0u8; 4096];
    let half = compressed.len() / 2;
    let (_, _, status) = inflater.decompress(&compressed[..half], &mut out, FlushMode::Finish).unwrap();
    assert_eq!(status, Status::BufError);
}

#[test]
fn test_reset_reuses_session() {
    let mut deflater = Deflater::new(6);
    let a = deflater.compress_all(b"first stream").unwrap();
    deflater.reset();
    let b = deflater.compress_all(b"first stream").unwrap();
    assert_eq!(a, b);

    let mut inflater = Inflater::new();
    assert_eq!(inflater.decompress_all(&a).unwrap(), b"first stream");
    inflater.reset();
    assert_eq!(inflater.decompress_all(&b).unwrap(), b"first stream");
}
