//! Options for reading, saving and extracting archives.

use crate::zip::encoding::TextEncoding;
use oxizip_core::traits::CompressionLevel;
use std::path::PathBuf;

/// When Zip64 records are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Zip64Policy {
    /// Never. A save that would need them fails.
    Never,
    /// On every entry and on the trailer.
    Always,
    /// Only on the records whose values do not fit 32 bits.
    #[default]
    AsNecessary,
}

/// Options applied when an archive is saved.
///
/// They are read at save time, so changing them and saving again
/// re-evaluates every entry.
#[derive(Debug, Clone)]
pub struct WriteOptions {
    /// Store every entry, skipping the deflate attempt.
    pub force_no_compression: bool,
    /// Zip64 policy.
    pub zip64: Zip64Policy,
    /// Encoding for names and comments.
    pub encoding: TextEncoding,
    /// Drop a leading `C:` from names derived from file paths.
    pub trim_volume_letter: bool,
    /// Deflate level.
    pub level: CompressionLevel,
    /// Directory for the temporary file; defaults to the target's directory.
    pub temp_dir: Option<PathBuf>,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            force_no_compression: false,
            zip64: Zip64Policy::AsNecessary,
            encoding: TextEncoding::default(),
            trim_volume_letter: true,
            level: CompressionLevel::DEFAULT,
            temp_dir: None,
        }
    }
}

impl WriteOptions {
    /// Create default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the Zip64 policy.
    pub fn with_zip64(mut self, policy: Zip64Policy) -> Self {
        self.zip64 = policy;
        self
    }

    /// Store every entry.
    pub fn with_force_no_compression(mut self, force: bool) -> Self {
        self.force_no_compression = force;
        self
    }

    /// Set the name encoding.
    pub fn with_encoding(mut self, encoding: TextEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Set volume letter trimming.
    pub fn with_trim_volume_letter(mut self, trim: bool) -> Self {
        self.trim_volume_letter = trim;
        self
    }

    /// Set the deflate level.
    pub fn with_level(mut self, level: impl Into<CompressionLevel>) -> Self {
        self.level = level.into();
        self
    }

    /// Set the temporary directory.
    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }
}

/// Options applied when an archive is read.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadOptions {
    /// Encoding for names and comments without the UTF-8 flag.
    pub encoding: TextEncoding,
}

impl ReadOptions {
    /// Create default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the fallback encoding.
    pub fn with_encoding(mut self, encoding: TextEncoding) -> Self {
        self.encoding = encoding;
        self
    }
}

/// Options for [`ZipArchive::extract_all`](crate::zip::ZipArchive::extract_all).
#[derive(Debug, Clone, Default)]
pub struct ExtractOptions {
    /// Replace files that already exist.
    pub overwrite: bool,
    /// Password for encrypted entries.
    pub password: Option<String>,
}

impl ExtractOptions {
    /// Create default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow replacing existing files.
    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Set the password.
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }
}

/// Progress reported before each entry is written.
#[derive(Debug, Clone, Copy)]
pub struct SaveProgress<'a> {
    /// Index of the entry about to be written.
    pub index: usize,
    /// Number of entries being saved.
    pub total: usize,
    /// Name of the entry about to be written.
    pub name: &'a str,
    /// Bytes written so far.
    pub bytes_written: u64,
}
