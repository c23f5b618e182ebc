//! # OxiZip Archive
//!
//! ZIP container support for OxiZip.
//!
//! - **Records**: local headers, central directory, data descriptors and
//!   the Zip64 extensions
//! - **Archive model**: add, update and remove entries, then save
//!   atomically through a temporary file
//! - **ZipCrypto**: traditional PKWARE encryption with password checking
//! - **Text encoding**: code page 437, UTF-8 and any code page
//!   `encoding_rs` knows
//!
//! ## Example
//!
//! ```rust,no_run
//! use oxizip_archive::zip::{ExtractOptions, ZipArchive};
//!
//! let mut archive = oxizip_archive::zip::open_zip("archive.zip")?;
//! for entry in archive.entries() {
//!     println!("{} ({} bytes)", entry.name(), entry.uncompressed_size());
//! }
//! archive.extract_all("out", &ExtractOptions::new())?;
//!
//! let mut fresh = ZipArchive::new();
//! fresh.add_bytes("notes.txt", b"remember".to_vec())?;
//! fresh.save("notes.zip")?;
//! # Ok::<(), oxizip_core::error::OxiZipError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod zip;

// Re-exports
pub use zip::{
    ArchiveState, CompressionMethod, DosDateTime, EntryPhase, ExtractOptions, ReadOptions, TextEncoding,
    WriteOptions, Zip64Policy, ZipArchive, ZipEntry,
};
