//! # OxiZip Core
//!
//! Core components for the OxiZip archive library.
//!
//! - [`bitstream`]: Push-fed bit accumulators for resumable codecs
//! - [`crc`]: CRC-32 checksum
//! - [`traits`]: Streaming codec traits, flush modes and status
//! - [`error`]: Error types
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │ L4: Front end                                           │
//! │     oxizip CLI                                          │
//! ├─────────────────────────────────────────────────────────┤
//! │ L3: Container                                           │
//! │     ZIP records, ZipCrypto, archive model               │
//! ├─────────────────────────────────────────────────────────┤
//! │ L2: Codec                                               │
//! │     Streaming DEFLATE (LZ77 + Huffman), zlib wrapper    │
//! ├─────────────────────────────────────────────────────────┤
//! │ L1: Primitives (this crate)                             │
//! │     BitReader/BitWriter, CRC-32, traits, errors         │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust
//! use oxizip_core::crc::Crc32;
//!
//! let crc = Crc32::compute(b"Hello, World!");
//! assert_eq!(crc, 0xEC4AC3D0);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod bitstream;
pub mod crc;
pub mod error;
pub mod traits;

// Re-exports for convenience
pub use bitstream::{BitReader, BitWriter};
pub use crc::{Crc32, crc32_update};
pub use error::{OxiZipError, Result};
pub use traits::{CompressionLevel, Compressor, Decompressor, FlushMode, Status, Strategy};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::crc::Crc32;
    pub use crate::error::{OxiZipError, Result};
    pub use crate::traits::{
        CompressionLevel, Compressor, Decompressor, FlushMode, Status, Strategy,
    };
}
