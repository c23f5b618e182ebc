//! Error types for OxiZip operations.
//!
//! One enum covers every failure the codec, the record parser and the
//! archive model can raise. The variants are grouped the way callers need
//! to branch on them: malformed data, password problems, consistency
//! violations in the archive model, and environment (filesystem) errors.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// The main error type for OxiZip operations.
#[derive(Debug, Error)]
pub enum OxiZipError {
    /// I/O error from underlying reader/writer.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A record signature did not match what the parser expected.
    #[error("Invalid signature: expected {expected:#010x}, found {found:#010x}")]
    InvalidSignature {
        /// Expected signature value.
        expected: u32,
        /// Signature value actually read.
        found: u32,
    },

    /// Invalid header format.
    #[error("Invalid header: {message}")]
    InvalidHeader {
        /// Description of the header error.
        message: String,
    },

    /// Unexpected end of file.
    #[error("Unexpected end of file: expected {expected} more bytes")]
    UnexpectedEof {
        /// Number of bytes that were expected but not available.
        expected: usize,
    },

    /// Unsupported compression method.
    #[error("Unsupported compression method: {method}")]
    UnsupportedMethod {
        /// The compression method identifier.
        method: String,
    },

    /// Corrupted data (compressed stream or record payload).
    #[error("Corrupted data at offset {offset}: {message}")]
    CorruptedData {
        /// Byte offset where corruption was detected.
        offset: u64,
        /// Description of the corruption.
        message: String,
    },

    /// CRC checksum mismatch.
    #[error("CRC mismatch: expected {expected:#x}, computed {computed:#x}")]
    CrcMismatch {
        /// Expected CRC value from archive.
        expected: u32,
        /// Computed CRC value from data.
        computed: u32,
    },

    /// The password check byte of an encrypted entry did not match.
    #[error("Bad password for entry: {entry}")]
    BadPassword {
        /// Name of the entry being decrypted.
        entry: String,
    },

    /// An encrypted entry was accessed without a password.
    #[error("Password required for entry: {entry}")]
    PasswordRequired {
        /// Name of the encrypted entry.
        entry: String,
    },

    /// An entry with the same archive path already exists.
    #[error("Duplicate entry: {name}")]
    DuplicateEntry {
        /// The colliding archive path.
        name: String,
    },

    /// Entry not found in archive.
    #[error("Entry not found: {name}")]
    EntryNotFound {
        /// Name of the missing entry.
        name: String,
    },

    /// Internal bookkeeping of the archive model is out of sync, or an
    /// operation is illegal for the current state.
    #[error("Inconsistent archive state: {message}")]
    Inconsistent {
        /// Description of the violation.
        message: String,
    },

    /// A central directory record without a local header, or the reverse.
    #[error("Orphaned entry '{name}': present in {location} only")]
    OrphanedEntry {
        /// Name of the orphaned entry.
        name: String,
        /// Which region the entry was found in.
        location: &'static str,
    },

    /// Path traversal detected while extracting (e.g. "../" in a name).
    #[error("Path traversal detected in entry: {path}")]
    PathTraversal {
        /// The suspicious path.
        path: String,
    },

    /// A source file handed to the archive does not exist.
    #[error("Source file not found: {}", path.display())]
    SourceNotFound {
        /// Path that was looked up.
        path: PathBuf,
    },

    /// The configured temporary directory does not exist.
    #[error("Temporary directory does not exist: {}", path.display())]
    TempDirMissing {
        /// The configured directory.
        path: PathBuf,
    },

    /// The save destination is an existing directory.
    #[error("Destination is a directory: {}", path.display())]
    DestinationIsDirectory {
        /// The destination path.
        path: PathBuf,
    },

    /// A codec session was driven in a way its state does not allow.
    #[error("Stream error: {message}")]
    StreamState {
        /// Description of the misuse.
        message: String,
    },

    /// Text could not be represented in the requested encoding.
    #[error("Encoding error: {message}")]
    EncodingError {
        /// Description of the encoding error.
        message: String,
    },

    /// A save was cancelled by the progress callback.
    #[error("Operation cancelled")]
    Cancelled,
}

/// Result type alias for OxiZip operations.
pub type Result<T> = std::result::Result<T, OxiZipError>;

impl OxiZipError {
    /// Create an invalid signature error.
    pub fn invalid_signature(expected: u32, found: u32) -> Self {
        Self::InvalidSignature { expected, found }
    }

    /// Create an invalid header error.
    pub fn invalid_header(message: impl Into<String>) -> Self {
        Self::InvalidHeader {
            message: message.into(),
        }
    }

    /// Create an unexpected EOF error.
    pub fn unexpected_eof(expected: usize) -> Self {
        Self::UnexpectedEof { expected }
    }

    /// Create an unsupported method error.
    pub fn unsupported_method(method: impl Into<String>) -> Self {
        Self::UnsupportedMethod {
            method: method.into(),
        }
    }

    /// Create a corrupted data error.
    pub fn corrupted(offset: u64, message: impl Into<String>) -> Self {
        Self::CorruptedData {
            offset,
            message: message.into(),
        }
    }

    /// Create a CRC mismatch error.
    pub fn crc_mismatch(expected: u32, computed: u32) -> Self {
        Self::CrcMismatch { expected, computed }
    }

    /// Create a bad password error.
    pub fn bad_password(entry: impl Into<String>) -> Self {
        Self::BadPassword {
            entry: entry.into(),
        }
    }

    /// Create a password required error.
    pub fn password_required(entry: impl Into<String>) -> Self {
        Self::PasswordRequired {
            entry: entry.into(),
        }
    }

    /// Create a duplicate entry error.
    pub fn duplicate_entry(name: impl Into<String>) -> Self {
        Self::DuplicateEntry { name: name.into() }
    }

    /// Create an entry not found error.
    pub fn entry_not_found(name: impl Into<String>) -> Self {
        Self::EntryNotFound { name: name.into() }
    }

    /// Create an inconsistent state error.
    pub fn inconsistent(message: impl Into<String>) -> Self {
        Self::Inconsistent {
            message: message.into(),
        }
    }

    /// Create an orphaned entry error.
    pub fn orphaned(name: impl Into<String>, location: &'static str) -> Self {
        Self::OrphanedEntry {
            name: name.into(),
            location,
        }
    }

    /// Create a path traversal error.
    pub fn path_traversal(path: impl Into<String>) -> Self {
        Self::PathTraversal { path: path.into() }
    }

    /// Create a stream state error.
    pub fn stream_state(message: impl Into<String>) -> Self {
        Self::StreamState {
            message: message.into(),
        }
    }

    /// Create an encoding error.
    pub fn encoding_error(message: impl Into<String>) -> Self {
        Self::EncodingError {
            message: message.into(),
        }
    }

    /// True for a wrong-password failure.
    pub fn is_bad_password(&self) -> bool {
        matches!(self, Self::BadPassword { .. })
    }

    /// True for errors caused by malformed archive or stream bytes.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            Self::InvalidSignature { .. }
                | Self::InvalidHeader { .. }
                | Self::UnexpectedEof { .. }
                | Self::CorruptedData { .. }
                | Self::CrcMismatch { .. }
                | Self::OrphanedEntry { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = OxiZipError::invalid_signature(0x04034b50, 0x02014b50);
        assert!(err.to_string().contains("0x04034b50"));

        let err = OxiZipError::crc_mismatch(0x12345678, 0xDEADBEEF);
        assert!(err.to_string().contains("CRC mismatch"));

        let err = OxiZipError::orphaned("a.txt", "central directory");
        assert_eq!(
            err.to_string(),
            "Orphaned entry 'a.txt': present in central directory only"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err: OxiZipError = io_err.into();
        assert!(matches!(err, OxiZipError::Io(_)));
    }

    #[test]
    fn test_categories() {
        assert!(OxiZipError::bad_password("x").is_bad_password());
        assert!(!OxiZipError::bad_password("x").is_corruption());
        assert!(OxiZipError::corrupted(3, "bad block").is_corruption());
        assert!(!OxiZipError::duplicate_entry("x").is_corruption());
    }
}
