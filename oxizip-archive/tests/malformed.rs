//! Damaged and hostile archives.

use oxizip_archive::zip::{ExtractOptions, ReadOptions, WriteOptions, ZipArchive};
use oxizip_core::error::OxiZipError;
use std::io::Cursor;

type TestResult = Result<(), Box<dyn std::error::Error>>;

fn streamed(archive: &mut ZipArchive) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    let mut bytes = Vec::new();
    archive.save_to_stream(&mut bytes)?;
    Ok(bytes)
}

fn replace_all(bytes: &mut [u8], from: &[u8], to: &[u8]) -> usize {
    assert_eq!(from.len(), to.len());
    let mut count = 0;
    let mut pos = 0;
    while let Some(found) = bytes[pos..].windows(from.len()).position(|w| w == from) {
        let at = pos + found;
        bytes[at..at + to.len()].copy_from_slice(to);
        pos = at + to.len();
        count += 1;
    }
    count
}

#[test]
fn test_descriptor_signature_inside_payload() -> TestResult {
    let mut payload = b"header bytes ".to_vec();
    payload.extend_from_slice(b"PK\x07\x08");
    payload.extend_from_slice(&[0x11; 40]);

    let mut archive = ZipArchive::with_options(WriteOptions::new().with_force_no_compression(true));
    archive.add_bytes("tricky.bin", payload)?;
    let bytes = streamed(&mut archive)?;

    let err = ZipArchive::read(Cursor::new(bytes), ReadOptions::default()).unwrap_err();
    assert!(err.is_corruption(), "{}", err);
    Ok(())
}

#[test]
fn test_central_record_without_local_header() -> TestResult {
    let mut archive = ZipArchive::new();
    archive.add_bytes("alpha.txt", b"alpha".to_vec())?;
    archive.add_bytes("beta.txt", b"beta".to_vec())?;
    let mut bytes = streamed(&mut archive)?;

    let central = bytes
        .windows(9)
        .rposition(|w| w == b"alpha.txt")
        .ok_or("name not found")?;
    bytes[central + 4] = b'A';

    let err = ZipArchive::read(Cursor::new(bytes), ReadOptions::default()).unwrap_err();
    assert!(matches!(err, OxiZipError::OrphanedEntry { .. }), "{}", err);
    assert!(err.is_corruption());
    Ok(())
}

#[test]
fn test_local_header_without_central_record() -> TestResult {
    let mut archive = ZipArchive::new();
    archive.add_bytes("alpha.txt", b"alpha".to_vec())?;
    let mut bytes = streamed(&mut archive)?;

    let local = bytes
        .windows(9)
        .position(|w| w == b"alpha.txt")
        .ok_or("name not found")?;
    bytes[local] = b'A';

    let err = ZipArchive::read(Cursor::new(bytes), ReadOptions::default()).unwrap_err();
    assert!(matches!(err, OxiZipError::OrphanedEntry { .. }), "{}", err);
    Ok(())
}

#[test]
fn test_truncated_archive() -> TestResult {
    let mut archive = ZipArchive::new();
    archive.add_bytes("data.txt", "data ".repeat(100))?;
    let bytes = streamed(&mut archive)?;

    for cut in [10, bytes.len() / 2, bytes.len() - 5] {
        let err = ZipArchive::read(Cursor::new(bytes[..cut].to_vec()), ReadOptions::default()).unwrap_err();
        assert!(err.is_corruption(), "cut at {}: {}", cut, err);
    }
    Ok(())
}

#[test]
fn test_flipped_payload_byte_fails_crc() -> TestResult {
    let mut archive = ZipArchive::with_options(WriteOptions::new().with_force_no_compression(true));
    archive.add_bytes("plain.txt", b"0123456789abcdef".to_vec())?;
    let mut bytes = Vec::new();
    archive.save_to_stream(&mut bytes)?;
    assert_eq!(replace_all(&mut bytes, b"0123456789", b"0123456780"), 1);

    let mut read = ZipArchive::read(Cursor::new(bytes), ReadOptions::default())?;
    let err = read.test_entry("plain.txt", None).unwrap_err();
    assert!(matches!(err, OxiZipError::CrcMismatch { .. }), "{}", err);
    Ok(())
}

#[test]
fn test_traversal_names_are_not_extracted() -> TestResult {
    let mut archive = ZipArchive::new();
    archive.add_bytes("safe.txt", b"safe".to_vec())?;
    archive.add_bytes("xx/evil.txt", b"evil".to_vec())?;
    let mut bytes = streamed(&mut archive)?;
    assert_eq!(replace_all(&mut bytes, b"xx/evil.txt", b"../evil.txt"), 2);

    let mut read = ZipArchive::read(Cursor::new(bytes), ReadOptions::default())?;
    let dir = tempfile::tempdir()?;
    let out = dir.path().join("out");
    let err = read.extract_all(&out, &ExtractOptions::new()).unwrap_err();
    assert!(matches!(err, OxiZipError::PathTraversal { .. }), "{}", err);
    assert!(!out.join("safe.txt").exists());
    assert!(!dir.path().join("evil.txt").exists());
    Ok(())
}

#[test]
fn test_not_a_zip() {
    let err = ZipArchive::read(Cursor::new(b"definitely not an archive".to_vec()), ReadOptions::default())
        .unwrap_err();
    assert!(err.is_corruption(), "{}", err);
}
