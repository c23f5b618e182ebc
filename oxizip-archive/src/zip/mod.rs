//! ZIP archive format support.
//!
//! [`ZipArchive`] is the entry point: it reads archives, tracks edits and
//! saves them. The record types in [`header`] are public for tools that
//! need to inspect an archive byte by byte.

pub mod archive;
pub mod crypto;
pub mod datetime;
pub mod encoding;
pub mod entry;
pub mod header;
pub mod options;

pub use archive::{ArchiveState, ZipArchive, normalize_name, sanitize_entry_path};
pub use datetime::DosDateTime;
pub use encoding::TextEncoding;
pub use entry::{Encryption, EntryPhase, ZipEntry};
pub use header::CompressionMethod;
pub use options::{ExtractOptions, ReadOptions, SaveProgress, WriteOptions, Zip64Policy};

use oxizip_core::error::Result;
use std::io::{Read, Seek};
use std::path::Path;

/// Read a ZIP archive from a seekable stream.
pub fn read_zip<R: Read + Seek + 'static>(reader: R) -> Result<ZipArchive> {
    ZipArchive::read(reader, ReadOptions::default())
}

/// Open a ZIP archive file.
pub fn open_zip(path: impl AsRef<Path>) -> Result<ZipArchive> {
    ZipArchive::open(path, ReadOptions::default())
}
