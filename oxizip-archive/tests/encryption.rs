//! Traditional encryption through the archive model.

use oxizip_archive::zip::{CompressionMethod, Encryption, ExtractOptions, ReadOptions, ZipArchive};
use oxizip_core::error::OxiZipError;
use std::io::Cursor;

type TestResult = Result<(), Box<dyn std::error::Error>>;

#[test]
fn test_wrong_password_is_distinguished() -> TestResult {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("secret.zip");

    let mut archive = ZipArchive::new();
    archive.add_bytes("secret.txt", b"hello world".to_vec())?.set_password(Some("p@ss"))?;
    archive.save(&path)?;

    let mut archive = ZipArchive::open(&path, ReadOptions::default())?;
    let entry = archive.entry("secret.txt").ok_or("secret.txt missing")?;
    assert_eq!(entry.encryption(), Encryption::Traditional);
    assert_eq!(entry.compressed_size(), 11 + 12);

    // The check byte lets one wrong password in 256 through to the CRC.
    let err = archive.extract("secret.txt", Some("wrong")).unwrap_err();
    assert!(err.is_bad_password() || err.is_corruption(), "{}", err);
    assert!(!matches!(err, OxiZipError::PasswordRequired { .. }));

    let err = archive.extract("secret.txt", None).unwrap_err();
    assert!(matches!(err, OxiZipError::PasswordRequired { .. }));

    assert_eq!(archive.extract("secret.txt", Some("p@ss"))?, b"hello world");
    Ok(())
}

#[test]
fn test_every_entry_rejects_wrong_password() -> TestResult {
    let mut archive = ZipArchive::new();
    for i in 0..8 {
        let body = format!("entry {} ", i).repeat(40 * (i + 1));
        archive.add_bytes(&format!("file{}.txt", i), body)?.set_password(Some("correct horse"))?;
    }
    let mut bytes = Vec::new();
    archive.save_to_stream(&mut bytes)?;

    let mut read = ZipArchive::read(Cursor::new(bytes), ReadOptions::default())?;
    for i in 0..8 {
        let name = format!("file{}.txt", i);
        let err = read.extract(&name, Some("battery staple")).unwrap_err();
        assert!(err.is_bad_password() || err.is_corruption(), "{}: {}", name, err);
        let data = read.extract(&name, Some("correct horse"))?;
        assert_eq!(data, format!("entry {} ", i).repeat(40 * (i + 1)).as_bytes());
    }
    Ok(())
}

#[test]
fn test_extract_all_with_password() -> TestResult {
    let dir = tempfile::tempdir()?;
    let mut archive = ZipArchive::new();
    archive.add_bytes("plain.txt", b"plain".to_vec())?;
    archive.add_bytes("locked.txt", b"locked".to_vec())?.set_password(Some("key"))?;
    let mut bytes = Vec::new();
    archive.save_to_stream(&mut bytes)?;
    let mut read = ZipArchive::read(Cursor::new(bytes), ReadOptions::default())?;

    let err = read
        .extract_all(dir.path().join("bad"), &ExtractOptions::new().with_password("nope"))
        .unwrap_err();
    assert!(err.is_bad_password() || err.is_corruption(), "{}", err);
    // The partially written file is removed.
    assert!(!dir.path().join("bad/locked.txt").exists());

    let out = dir.path().join("good");
    read.extract_all(&out, &ExtractOptions::new().with_password("key"))?;
    assert_eq!(std::fs::read(out.join("locked.txt"))?, b"locked");
    assert_eq!(std::fs::read(out.join("plain.txt"))?, b"plain");
    Ok(())
}

#[test]
fn test_damaged_payload_with_correct_password_is_corruption() -> TestResult {
    let name = "ledger.txt";
    let body = b"credit 100 debit 40 ".repeat(20);
    let mut archive = ZipArchive::new();
    let entry = archive.add_bytes(name, body.clone())?;
    entry.set_method(CompressionMethod::Stored)?;
    entry.set_password(Some("right"))?;
    let mut bytes = Vec::new();
    archive.save_to_stream(&mut bytes)?;

    // The local header ends with the name and its extra field.
    let name_at = bytes
        .windows(name.len())
        .position(|w| w == name.as_bytes())
        .ok_or("local header name missing")?;
    let extra_len = u16::from_le_bytes([bytes[name_at - 2], bytes[name_at - 1]]) as usize;
    let payload_at = name_at + name.len() + extra_len;
    bytes[payload_at + 12 + 5] ^= 0x5A;

    let mut read = ZipArchive::read(Cursor::new(bytes), ReadOptions::default())?;
    let err = read.extract(name, Some("right")).unwrap_err();
    assert!(!err.is_bad_password(), "{}", err);
    assert!(err.is_corruption(), "{}", err);
    assert!(matches!(err, OxiZipError::CrcMismatch { .. }), "{}", err);
    Ok(())
}
