//! List command implementation.

use crate::utils::{matches_filters, print_entries, read_options};
use oxizip_archive::zip::{ZipArchive, ZipEntry};
use serde::Serialize;
use std::path::Path;
use std::time::UNIX_EPOCH;

/// JSON serializable entry data for archive listings.
#[derive(Debug, Serialize)]
struct EntryJson<'a> {
    name: &'a str,
    size: u64,
    compressed_size: u64,
    ratio: f64,
    method: String,
    crc: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    mtime: Option<u64>,
    is_dir: bool,
    encrypted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    comment: Option<&'a str>,
}

impl<'a> EntryJson<'a> {
    fn from_entry(entry: &'a ZipEntry) -> Self {
        let mtime = entry
            .modified()
            .to_system_time()
            .duration_since(UNIX_EPOCH)
            .ok()
            .map(|d| d.as_secs());

        Self {
            name: entry.name(),
            size: entry.uncompressed_size(),
            compressed_size: entry.compressed_size(),
            ratio: entry.compression_ratio(),
            method: entry.method().to_string(),
            crc: entry.crc32(),
            mtime,
            is_dir: entry.is_directory(),
            encrypted: entry.is_encrypted(),
            comment: entry.comment(),
        }
    }
}

/// JSON output for archive listing.
#[derive(Debug, Serialize)]
struct ArchiveListJson<'a> {
    archive: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    comment: Option<&'a str>,
    entries: Vec<EntryJson<'a>>,
}

/// Options for listing archive contents.
pub struct ListOptions<'a> {
    pub verbose: bool,
    pub json: bool,
    pub include: &'a [String],
    pub exclude: &'a [String],
    pub code_page: Option<&'a str>,
}

pub fn cmd_list(archive: &Path, options: &ListOptions) -> Result<(), Box<dyn std::error::Error>> {
    let zip = ZipArchive::open(archive, read_options(options.code_page)?)?;
    let filtered: Vec<&ZipEntry> = zip
        .entries()
        .iter()
        .filter(|e| matches_filters(e.name(), options.include, options.exclude))
        .collect();

    if options.json {
        let output = ArchiveListJson {
            archive: archive.display().to_string(),
            comment: zip.comment(),
            entries: filtered.iter().copied().map(EntryJson::from_entry).collect(),
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("Archive: {}", archive.display());
    if let Some(comment) = zip.comment() {
        println!("Comment: {}", comment);
    }
    println!();
    print_entries(&filtered, options.verbose);
    Ok(())
}
