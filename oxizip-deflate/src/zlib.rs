//! Zlib format wrapper for DEFLATE compression.
//!
//! The zlib format (RFC 1950) wraps raw DEFLATE data with a header and
//! an Adler-32 checksum. The streaming sessions produce and consume it
//! directly when created with [`Format::Zlib`](crate::Format::Zlib); the
//! functions here are one-shot conveniences on top of them.
//!
//! # Format
//!
//! ```text
//! +---+---+=========+============+---+---+---+---+
//! |CMF|FLG|[DICTID] | compressed |    ADLER32    |
//! +---+---+=========+============+---+---+---+---+
//! ```
//!
//! - CMF: Compression Method and Flags
//!   - Bits 0-3: CM (Compression Method) - must be 8 for DEFLATE
//!   - Bits 4-7: CINFO (Compression Info) - log2(window size) - 8
//! - FLG: Flags
//!   - Bits 0-4: FCHECK - check bits so (CMF*256 + FLG) mod 31 == 0
//!   - Bit 5: FDICT - preset dictionary present
//!   - Bits 6-7: FLEVEL - compression level (0-3)
//! - DICTID: Adler-32 of the preset dictionary (big-endian), if FDICT
//! - Compressed data (DEFLATE format)
//! - ADLER32: Adler-32 checksum of uncompressed data (big-endian)

use crate::deflate::{DeflateOptions, Deflater, Format};
use crate::inflate::Inflater;
use oxizip_core::error::{OxiZipError, Result};
use oxizip_core::traits::{Compressor, Decompressor, FlushMode, Status, Strategy};

/// Maximum dictionary size for zlib (32KB).
pub const MAX_DICTIONARY_SIZE: usize = 32768;

/// FDICT bit of the FLG byte.
pub(crate) const PRESET_DICT: u8 = 0x20;

/// Zlib compression level indicator in header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ZlibLevel {
    /// Fastest compression.
    Fastest = 0,
    /// Fast compression.
    Fast = 1,
    /// Default compression.
    Default = 2,
    /// Maximum compression.
    Maximum = 3,
}

impl ZlibLevel {
    /// Header level indicator for a compression level and strategy.
    pub fn from_level(level: u8, strategy: Strategy) -> Self {
        let literal_biased = matches!(
            strategy,
            Strategy::HuffmanOnly | Strategy::Rle | Strategy::Fixed
        );
        match level {
            _ if literal_biased => Self::Fastest,
            0..=1 => Self::Fastest,
            2..=5 => Self::Fast,
            6 => Self::Default,
            _ => Self::Maximum,
        }
    }
}

/// Build the two header bytes.
pub(crate) fn header_bytes(level: u8, strategy: Strategy, has_dictionary: bool) -> [u8; 2] {
    let cmf: u8 = 0x78; // CINFO=7 (32KB window), CM=8
    let mut flg = (ZlibLevel::from_level(level, strategy) as u8) << 6;
    if has_dictionary {
        flg |= PRESET_DICT;
    }
    let base = (cmf as u16) * 256 + flg as u16;
    flg += (31 - base % 31) as u8 % 31;
    [cmf, flg]
}

/// Adler-32 checksum calculator.
///
/// Adler-32 is a checksum algorithm designed by Mark Adler.
/// It is faster than CRC-32 but provides less protection against random errors.
#[derive(Clone, Debug)]
pub struct Adler32 {
    a: u32,
    b: u32,
}

/// Largest prime smaller than 65536.
const ADLER_MOD: u32 = 65521;

/// Number of bytes to process before reducing.
const NMAX: usize = 5552;

impl Adler32 {
    /// Create a new Adler-32 calculator.
    pub fn new() -> Self {
        Self { a: 1, b: 0 }
    }

    /// Update the checksum with more data.
    pub fn update(&mut self, data: &[u8]) {
        let mut a = self.a;
        let mut b = self.b;

        for chunk in data.chunks(NMAX) {
            for &byte in chunk {
                a += byte as u32;
                b += a;
            }
            a %= ADLER_MOD;
            b %= ADLER_MOD;
        }

        self.a = a;
        self.b = b;
    }

    /// Current checksum value.
    pub fn finish(&self) -> u32 {
        (self.b << 16) | self.a
    }

    /// Compute Adler-32 checksum of data in one shot.
    pub fn checksum(data: &[u8]) -> u32 {
        let mut adler = Self::new();
        adler.update(data);
        adler.finish()
    }
}

impl Default for Adler32 {
    fn default() -> Self {
        Self::new()
    }
}

/// Compress data using zlib format.
///
/// # Example
///
/// ```
/// use oxizip_deflate::zlib::{zlib_compress, zlib_decompress};
///
/// let data = b"Hello, World! Hello, World!";
/// let compressed = zlib_compress(data, 6).unwrap();
/// let decompressed = zlib_decompress(&compressed).unwrap();
/// assert_eq!(decompressed, data);
/// ```
pub fn zlib_compress(input: &[u8], level: u8) -> Result<Vec<u8>> {
    let mut deflater = Deflater::with_options(DeflateOptions::new(level).with_format(Format::Zlib));
    let output = deflater.compress_all(input)?;
    deflater.end()?;
    Ok(output)
}

/// Compress data using zlib format with a preset dictionary.
///
/// The dictionary checksum is stored in the header (FDICT=1) so the
/// decompressor knows which dictionary to supply.
///
/// ```
/// use oxizip_deflate::zlib::{zlib_compress_with_dict, zlib_decompress_with_dict};
///
/// let dict = b"common patterns and shared content";
/// let data = b"This text has common patterns that match the dictionary";
/// let compressed = zlib_compress_with_dict(data, 6, dict).unwrap();
/// let decompressed = zlib_decompress_with_dict(&compressed, dict).unwrap();
/// assert_eq!(decompressed, data);
/// ```
pub fn zlib_compress_with_dict(input: &[u8], level: u8, dictionary: &[u8]) -> Result<Vec<u8>> {
    let mut deflater = Deflater::with_options(DeflateOptions::new(level).with_format(Format::Zlib));
    deflater.set_dictionary(dictionary)?;
    let output = deflater.compress_all(input)?;
    deflater.end()?;
    Ok(output)
}

/// Decompress zlib format data.
///
/// Streams that announce a preset dictionary are rejected; use
/// [`zlib_decompress_with_dict`] for those.
pub fn zlib_decompress(input: &[u8]) -> Result<Vec<u8>> {
    let mut inflater = Inflater::with_format(Format::Zlib);
    inflater.decompress_all(input)
}

/// Decompress zlib format data with a preset dictionary.
///
/// The dictionary is supplied when the stream asks for it; its Adler-32
/// must match the identifier in the header.
pub fn zlib_decompress_with_dict(input: &[u8], dictionary: &[u8]) -> Result<Vec<u8>> {
    let mut inflater = Inflater::with_format(Format::Zlib);
    let mut output = Vec::new();
    let mut buffer = vec![0u8; 32768];
    let mut pos = 0;

    loop {
        let (consumed, produced, status) =
            inflater.decompress(&input[pos..], &mut buffer, FlushMode::None)?;
        pos += consumed;
        output.extend_from_slice(&buffer[..produced]);

        match status {
            Status::StreamEnd => break,
            Status::NeedDictionary => inflater.set_dictionary(dictionary)?,
            Status::Ok | Status::BufError => {
                if consumed == 0 && produced == 0 && pos >= input.len() {
                    return Err(OxiZipError::corrupted(
                        pos as u64,
                        "truncated compressed stream",
                    ));
                }
            }
        }
    }

    Ok(output)
}

/// Check if zlib data requires a preset dictionary.
///
/// Returns the Adler-32 of the expected dictionary, or `None`.
///
/// ```
/// use oxizip_deflate::zlib::{zlib_compress_with_dict, zlib_requires_dictionary};
///
/// let dict = b"test dictionary";
/// let compressed = zlib_compress_with_dict(b"test data", 6, dict).unwrap();
/// assert!(zlib_requires_dictionary(&compressed).is_some());
/// ```
pub fn zlib_requires_dictionary(input: &[u8]) -> Option<u32> {
    if input.len() < 6 || input[1] & PRESET_DICT == 0 {
        return None;
    }
    Some(u32::from_be_bytes([input[2], input[3], input[4], input[5]]))
}
