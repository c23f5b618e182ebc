//! Core traits for streaming compression.
//!
//! The codec sessions in `oxizip-deflate` implement these traits; the
//! archive model only talks to them through this interface.

use crate::error::{OxiZipError, Result};

/// Outcome of one step of a streaming codec.
///
/// Errors are reported through the `Err` arm of the step result; the
/// session also keeps the message for [`Compressor::last_error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Progress was made; call again with more input or output space.
    Ok,
    /// The stream is complete and all output has been produced.
    StreamEnd,
    /// The stream announces a preset dictionary; supply it and call again.
    NeedDictionary,
    /// No progress was possible with the buffers given.
    BufError,
}

/// Flush mode for a compression step.
///
/// Modes are ordered by strength; a repeated request with no new input and
/// no stronger mode has nothing to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum FlushMode {
    /// No flush - buffer data for best compression.
    #[default]
    None,
    /// Sync flush - emit all pending output, ending on a byte boundary.
    Sync,
    /// Full flush - like sync, and the history is reset so decoding can
    /// restart at this point.
    Full,
    /// Finish - complete the stream.
    Finish,
}

/// Match-finder bias for the compressor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Strategy {
    /// Normal LZ77 matching.
    #[default]
    Default,
    /// Drop short matches; suited to data from filters or predictors.
    Filtered,
    /// Literals only.
    HuffmanOnly,
    /// Run-length matching (distance one only).
    Rle,
    /// Never build dynamic trees.
    Fixed,
}

/// A streaming decompressor (decoder).
pub trait Decompressor {
    /// Decompress from `input` into `output`.
    ///
    /// Returns (bytes consumed from input, bytes written to output, status).
    fn decompress(
        &mut self,
        input: &[u8],
        output: &mut [u8],
        flush: FlushMode,
    ) -> Result<(usize, usize, Status)>;

    /// Reset the decompressor to its initial state.
    fn reset(&mut self);

    /// Check if the decompressor has reached the end of the stream.
    fn is_finished(&self) -> bool;

    /// Message of the last error, if any.
    fn last_error(&self) -> Option<&str>;

    /// Decompress a complete stream at once (convenience method).
    fn decompress_all(&mut self, input: &[u8]) -> Result<Vec<u8>> {
        let mut output = Vec::new();
        let mut input_pos = 0;
        let mut buffer = vec![0u8; 32768];

        loop {
            let (consumed, produced, status) =
                self.decompress(&input[input_pos..], &mut buffer, FlushMode::None)?;

            input_pos += consumed;
            output.extend_from_slice(&buffer[..produced]);

            match status {
                Status::StreamEnd => break,
                Status::NeedDictionary => {
                    return Err(OxiZipError::stream_state("preset dictionary required"));
                }
                Status::Ok | Status::BufError => {
                    if consumed == 0 && produced == 0 && input_pos >= input.len() {
                        return Err(OxiZipError::corrupted(
                            input_pos as u64,
                            "truncated compressed stream",
                        ));
                    }
                }
            }
        }

        Ok(output)
    }
}

/// A streaming compressor (encoder).
pub trait Compressor {
    /// Compress from `input` into `output`.
    ///
    /// Returns (bytes consumed from input, bytes written to output, status).
    fn compress(
        &mut self,
        input: &[u8],
        output: &mut [u8],
        flush: FlushMode,
    ) -> Result<(usize, usize, Status)>;

    /// Reset the compressor to its initial state.
    fn reset(&mut self);

    /// Check if the compressor has produced the complete stream.
    fn is_finished(&self) -> bool;

    /// Message of the last error, if any.
    fn last_error(&self) -> Option<&str>;

    /// Compress all data at once (convenience method).
    fn compress_all(&mut self, input: &[u8]) -> Result<Vec<u8>> {
        let mut output = Vec::new();
        let mut input_pos = 0;
        let mut buffer = vec![0u8; 32768];

        loop {
            let (consumed, produced, status) =
                self.compress(&input[input_pos..], &mut buffer, FlushMode::Finish)?;

            input_pos += consumed;
            output.extend_from_slice(&buffer[..produced]);

            match status {
                Status::StreamEnd => break,
                _ if consumed == 0 && produced == 0 => {
                    return Err(OxiZipError::stream_state("compressor made no progress"));
                }
                _ => continue,
            }
        }

        Ok(output)
    }
}

/// Compression level (0-9).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressionLevel(u8);

impl CompressionLevel {
    /// No compression (stored blocks).
    pub const NONE: Self = Self(0);
    /// Fastest compression.
    pub const FAST: Self = Self(1);
    /// Default compression (balanced).
    pub const DEFAULT: Self = Self(6);
    /// Best compression (slowest).
    pub const BEST: Self = Self(9);

    /// Create a compression level, clamped to 0-9.
    pub fn new(level: u8) -> Self {
        Self(level.min(9))
    }

    /// Get the level value.
    pub fn level(&self) -> u8 {
        self.0
    }
}

impl Default for CompressionLevel {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl From<u8> for CompressionLevel {
    fn from(level: u8) -> Self {
        Self::new(level)
    }
}
