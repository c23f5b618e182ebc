//! # OxiZip Deflate
//!
//! Pure Rust streaming implementation of DEFLATE (RFC 1951) and its zlib
//! wrapper (RFC 1950).
//!
//! Both directions are resumable sessions: [`Deflater`] and [`Inflater`]
//! accept input and output slices of any size, down to one byte, and
//! report how much of each they used. This is what lets the ZIP layer
//! stream entries through small buffers.
//!
//! ## Features
//!
//! - **Decompression**: stored, fixed and dynamic blocks; preset
//!   dictionaries; resynchronization after a full flush
//! - **Compression**: levels 0-9, five strategies, sync/full/finish
//!   flushes, per-block choice of the cheapest encoding
//! - **Framing**: raw DEFLATE (ZIP entries) or zlib with Adler-32
//!
//! ## Example
//!
//! ```rust
//! use oxizip_deflate::{deflate, inflate};
//!
//! let original = b"Hello, World! Hello, World!";
//! let compressed = deflate(original, 6).unwrap();
//! let decompressed = inflate(&compressed).unwrap();
//! assert_eq!(&decompressed, original);
//! ```
//!
//! ## Streaming
//!
//! ```rust
//! use oxizip_core::traits::{Compressor, FlushMode, Status};
//! use oxizip_deflate::Deflater;
//!
//! let mut deflater = Deflater::new(6);
//! let mut out = [0u8; 1];
//! let mut compressed = Vec::new();
//! loop {
//!     let (_, produced, status) = deflater.compress(&[], &mut out, FlushMode::Finish).unwrap();
//!     compressed.extend_from_slice(&out[..produced]);
//!     if status == Status::StreamEnd {
//!         break;
//!     }
//! }
//! assert_eq!(compressed, [0x03, 0x00]);
//! ```
//!
//! ## Compression Levels
//!
//! - Level 0: No compression (stored blocks)
//! - Level 1-3: Fast compression (greedy matching)
//! - Level 4-6: Balanced (default is 6)
//! - Level 7-9: Best compression (slower)

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod block;
pub mod deflate;
pub mod huffman;
pub mod inflate;
pub mod lz77;
pub mod stream;
pub mod tables;
pub mod zlib;

// Re-exports
pub use deflate::{DeflateOptions, Deflater, Format, deflate};
pub use huffman::HuffmanTree;
pub use inflate::{Inflater, inflate};
pub use lz77::Lz77Token;
pub use stream::{DeflateWriter, InflateReader};
pub use zlib::{Adler32, zlib_compress, zlib_compress_with_dict, zlib_decompress, zlib_decompress_with_dict};
