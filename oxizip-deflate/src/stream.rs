//! `std::io` adapters over the streaming sessions.
//!
//! [`DeflateWriter`] compresses everything written to it into an inner
//! writer; [`InflateReader`] decompresses from an inner reader. Both move
//! data through a fixed 32KB buffer.

use crate::deflate::{DeflateOptions, Deflater, Format};
use crate::inflate::Inflater;
use oxizip_core::error::{OxiZipError, Result};
use oxizip_core::traits::{Compressor, Decompressor, FlushMode, Status};
use std::io::{self, Read, Write};

const BUFFER_SIZE: usize = 32 * 1024;

fn to_io(err: OxiZipError) -> io::Error {
    match err {
        OxiZipError::Io(err) => err,
        other if other.is_corruption() => io::Error::new(io::ErrorKind::InvalidData, other),
        other => io::Error::other(other),
    }
}

/// Compressing writer.
#[derive(Debug)]
pub struct DeflateWriter<W: Write> {
    inner: W,
    deflater: Deflater,
    buffer: Vec<u8>,
}

impl<W: Write> DeflateWriter<W> {
    /// Wrap `inner` with a compressor configured by `options`.
    pub fn new(inner: W, options: DeflateOptions) -> Self {
        Self {
            inner,
            deflater: Deflater::with_options(options),
            buffer: vec![0; BUFFER_SIZE],
        }
    }

    /// Total uncompressed bytes accepted.
    pub fn total_in(&self) -> u64 {
        self.deflater.total_in()
    }

    /// Total compressed bytes produced.
    pub fn total_out(&self) -> u64 {
        self.deflater.total_out()
    }

    /// Access the inner writer.
    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    fn pump(&mut self, mut input: &[u8], flush: FlushMode) -> Result<()> {
        loop {
            let (consumed, produced, status) =
                self.deflater.compress(input, &mut self.buffer, flush)?;
            input = &input[consumed..];
            self.inner.write_all(&self.buffer[..produced])?;

            let drained = produced < self.buffer.len();
            match status {
                Status::StreamEnd => return Ok(()),
                Status::BufError => return Ok(()),
                _ if input.is_empty() && drained && flush != FlushMode::Finish => return Ok(()),
                _ => {}
            }
        }
    }

    /// Complete the stream and return the inner writer.
    pub fn finish(mut self) -> Result<W> {
        self.pump(&[], FlushMode::Finish)?;
        self.inner.flush()?;
        self.deflater.end()?;
        Ok(self.inner)
    }
}

impl<W: Write> Write for DeflateWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.pump(buf, FlushMode::None).map_err(to_io)?;
        Ok(buf.len())
    }

    /// Sync-flush: everything written so far becomes decodable.
    fn flush(&mut self) -> io::Result<()> {
        self.pump(&[], FlushMode::Sync).map_err(to_io)?;
        self.inner.flush()
    }
}

/// Decompressing reader.
#[derive(Debug)]
pub struct InflateReader<R: Read> {
    inner: R,
    inflater: Inflater,
    buffer: Vec<u8>,
    pos: usize,
    len: usize,
    eof: bool,
}

impl<R: Read> InflateReader<R> {
    /// Wrap `inner`, expecting the given framing.
    pub fn new(inner: R, format: Format) -> Self {
        Self {
            inner,
            inflater: Inflater::with_format(format),
            buffer: vec![0; BUFFER_SIZE],
            pos: 0,
            len: 0,
            eof: false,
        }
    }

    /// Total decompressed bytes returned.
    pub fn total_out(&self) -> u64 {
        self.inflater.total_out()
    }

    /// True once the end of the compressed stream has been decoded.
    pub fn is_finished(&self) -> bool {
        self.inflater.is_finished()
    }

    /// Unwrap the inner reader. Input buffered past the end of the
    /// compressed stream is lost.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> Read for InflateReader<R> {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if out.is_empty() || self.inflater.is_finished() {
            return Ok(0);
        }
        loop {
            if self.pos == self.len && !self.eof {
                self.len = self.inner.read(&mut self.buffer)?;
                self.pos = 0;
                self.eof = self.len == 0;
            }

            let (consumed, produced, status) = self
                .inflater
                .decompress(&self.buffer[self.pos..self.len], out, FlushMode::None)
                .map_err(to_io)?;
            self.pos += consumed;

            if produced > 0 || status == Status::StreamEnd {
                return Ok(produced);
            }
            if status == Status::NeedDictionary {
                return Err(io::Error::other("preset dictionary required"));
            }
            if self.eof && self.pos == self.len {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "truncated compressed stream",
                ));
            }
        }
    }
}
