//! Zip64 policy is re-evaluated on every save.

use oxizip_archive::zip::{ReadOptions, WriteOptions, Zip64Policy, ZipArchive};
use std::io::Cursor;

type TestResult = Result<(), Box<dyn std::error::Error>>;

fn sample_archive() -> Result<ZipArchive, Box<dyn std::error::Error>> {
    let mut archive = ZipArchive::new();
    archive.add_bytes("small.txt", b"small".to_vec())?;
    archive.add_bytes("words.txt", "zip sixty four ".repeat(300))?;
    archive.add_directory("dir")?;
    Ok(archive)
}

fn save_with(archive: &mut ZipArchive, policy: Zip64Policy) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    archive.set_options(WriteOptions::new().with_zip64(policy));
    let mut bytes = Vec::new();
    archive.save_to_stream(&mut bytes)?;
    Ok(bytes)
}

#[test]
fn test_small_archive_never_equals_as_necessary() -> TestResult {
    let mut archive = sample_archive()?;
    let never = save_with(&mut archive, Zip64Policy::Never)?;
    let as_necessary = save_with(&mut archive, Zip64Policy::AsNecessary)?;
    assert_eq!(never, as_necessary);
    Ok(())
}

#[test]
fn test_always_adds_records_and_reads_back() -> TestResult {
    let mut archive = sample_archive()?;
    let plain = save_with(&mut archive, Zip64Policy::AsNecessary)?;
    let forced = save_with(&mut archive, Zip64Policy::Always)?;
    assert!(forced.len() > plain.len());
    // Zip64 end of central directory record and locator.
    assert!(forced.windows(4).any(|w| w == b"PK\x06\x06"));
    assert!(forced.windows(4).any(|w| w == b"PK\x06\x07"));
    assert!(!plain.windows(4).any(|w| w == b"PK\x06\x06"));

    let mut read = ZipArchive::read(Cursor::new(forced), ReadOptions::default())?;
    assert_eq!(read.len(), 3);
    assert_eq!(read.extract("words.txt", None)?, "zip sixty four ".repeat(300).as_bytes());
    let record = read.directory_record("small.txt").ok_or("record missing")?;
    assert!(record.needs_zip64() || record.version_needed >= 45);
    Ok(())
}

#[test]
fn test_policy_is_not_sticky() -> TestResult {
    let mut archive = sample_archive()?;
    let first = save_with(&mut archive, Zip64Policy::AsNecessary)?;
    save_with(&mut archive, Zip64Policy::Always)?;
    let again = save_with(&mut archive, Zip64Policy::AsNecessary)?;
    assert_eq!(first, again);
    Ok(())
}

#[test]
fn test_resave_of_zip64_archive_drops_records() -> TestResult {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("z64.zip");
    let mut archive = sample_archive()?;
    archive.set_options(WriteOptions::new().with_zip64(Zip64Policy::Always));
    archive.save(&path)?;

    let mut reopened = ZipArchive::open(&path, ReadOptions::default())?;
    reopened.set_options(WriteOptions::new().with_zip64(Zip64Policy::AsNecessary));
    reopened.save(&path)?;

    let bytes = std::fs::read(&path)?;
    assert!(!bytes.windows(4).any(|w| w == b"PK\x06\x06"));
    let mut read = ZipArchive::read(Cursor::new(bytes), ReadOptions::default())?;
    assert_eq!(read.extract("small.txt", None)?, b"small");
    Ok(())
}
