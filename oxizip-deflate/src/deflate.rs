//! DEFLATE compression.
//!
//! [`Deflater`] is a resumable compression session. Each call to
//! [`compress`](Compressor::compress) consumes as much input and fills as
//! much output as the given slices allow, so the caller can drive it with
//! buffers of any size, down to a single byte in each direction.
//!
//! Internally the session runs one of five block loops depending on level
//! and strategy:
//! - level 0: stored blocks only
//! - levels 1-3: greedy matching (insert short matches into the hash)
//! - levels 4-9: lazy matching (defer a match by one byte if the next one
//!   is longer)
//! - [`Strategy::HuffmanOnly`]: literals only
//! - [`Strategy::Rle`]: distance-one matches only
//!
//! Every block is costed as stored, fixed and dynamic and the cheapest
//! encoding is emitted.

use crate::block::{BlockBuilder, BlockPolicy, MAX_STORED_BLOCK, write_stored_block};
use crate::lz77::{MAX_DIST, MAX_MATCH, MIN_LOOKAHEAD, MIN_MATCH, MatchParams, TOO_FAR, Window};
use crate::zlib::{Adler32, header_bytes};
use oxizip_core::BitWriter;
use oxizip_core::error::{OxiZipError, Result};
use oxizip_core::traits::{Compressor, FlushMode, Status, Strategy};

/// Stream framing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    /// Bare DEFLATE data, as stored in ZIP entries.
    #[default]
    Raw,
    /// RFC 1950 zlib framing with header and Adler-32 trailer.
    Zlib,
}

/// Compression session settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeflateOptions {
    /// Stream framing.
    pub format: Format,
    /// Compression level (0-9).
    pub level: u8,
    /// Match-finder strategy.
    pub strategy: Strategy,
}

impl Default for DeflateOptions {
    fn default() -> Self {
        Self::new(6)
    }
}

impl DeflateOptions {
    /// Raw DEFLATE at the given level with the default strategy.
    pub fn new(level: u8) -> Self {
        Self {
            format: Format::Raw,
            level: level.min(9),
            strategy: Strategy::Default,
        }
    }

    /// Set the stream framing.
    pub fn with_format(mut self, format: Format) -> Self {
        self.format = format;
        self
    }

    /// Set the match-finder strategy.
    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Init,
    Busy,
    Finished,
}

/// Result of one pass of a block loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockState {
    /// Out of input or output space.
    NeedMore,
    /// A flush point was reached.
    BlockDone,
    /// The last block is written but not yet fully drained.
    FinishStarted,
    /// The last block is written and drained.
    FinishDone,
}

/// Input and output cursors for one step.
struct Io<'a> {
    input: &'a [u8],
    in_pos: usize,
    output: &'a mut [u8],
    out_pos: usize,
}

impl Io<'_> {
    fn avail_in(&self) -> usize {
        self.input.len() - self.in_pos
    }

    fn avail_out(&self) -> usize {
        self.output.len() - self.out_pos
    }
}

/// DEFLATE compressor.
#[derive(Debug, Clone)]
pub struct Deflater {
    options: DeflateOptions,
    window: Window,
    block: BlockBuilder,
    out: BitWriter,
    state: State,
    /// Flush mode of the previous step; `None` forces the next step to
    /// run even without new input.
    last_flush: Option<FlushMode>,
    adler: Adler32,
    dict_id: Option<u32>,
    trailer_written: bool,
    total_in: u64,
    total_out: u64,
    msg: Option<String>,
}

impl Default for Deflater {
    fn default() -> Self {
        Self::new(6)
    }
}

impl Deflater {
    /// Create a raw DEFLATE compressor with the specified level (0-9).
    pub fn new(level: u8) -> Self {
        Self::with_options(DeflateOptions::new(level))
    }

    /// Create a compressor from full options.
    pub fn with_options(options: DeflateOptions) -> Self {
        let options = DeflateOptions {
            level: options.level.min(9),
            ..options
        };
        Self {
            window: Window::new(MatchParams::for_level(options.level)),
            block: BlockBuilder::new(),
            out: BitWriter::new(),
            state: State::Init,
            last_flush: Some(FlushMode::None),
            adler: Adler32::new(),
            dict_id: None,
            trailer_written: false,
            total_in: 0,
            total_out: 0,
            msg: None,
            options,
        }
    }

    /// Session settings.
    pub fn options(&self) -> DeflateOptions {
        self.options
    }

    /// Total bytes consumed.
    pub fn total_in(&self) -> u64 {
        self.total_in
    }

    /// Total bytes produced.
    pub fn total_out(&self) -> u64 {
        self.total_out
    }

    /// Adler-32 of the input consumed so far (zlib framing only; stays 1
    /// for raw streams).
    pub fn adler(&self) -> u32 {
        self.adler.finish()
    }

    /// Preload history with a preset dictionary.
    ///
    /// Only allowed before any data has been compressed. For zlib framing
    /// the dictionary identifier is written into the header.
    pub fn set_dictionary(&mut self, dictionary: &[u8]) -> Result<()> {
        if self.state != State::Init || self.total_in != 0 || self.window.lookahead != 0 {
            return Err(self.fail("dictionary must be set before compressing"));
        }
        if self.options.format == Format::Zlib {
            self.dict_id = Some(Adler32::checksum(dictionary));
        }
        self.window.load_dictionary(dictionary);
        log::trace!("deflate dictionary loaded: {} bytes", dictionary.len());
        Ok(())
    }

    /// Tear down the session.
    ///
    /// Fails when the stream was started but never finished, which means
    /// the produced output is incomplete.
    pub fn end(self) -> Result<()> {
        match self.state {
            State::Busy => Err(OxiZipError::stream_state(
                "deflate stream ended before finish",
            )),
            State::Finished if !self.trailer_done() => Err(OxiZipError::stream_state(
                "deflate stream ended with output pending",
            )),
            _ => Ok(()),
        }
    }

    fn trailer_done(&self) -> bool {
        self.out.pending() == 0 && (self.options.format == Format::Raw || self.trailer_written)
    }

    fn fail(&mut self, message: &str) -> OxiZipError {
        self.msg = Some(message.to_string());
        OxiZipError::stream_state(message)
    }

    fn policy(&self) -> BlockPolicy {
        if self.options.level == 0 {
            BlockPolicy::StoredOnly
        } else if self.options.strategy == Strategy::Fixed {
            BlockPolicy::FixedOnly
        } else {
            BlockPolicy::Best
        }
    }

    fn step(&mut self, io: &mut Io<'_>, flush: FlushMode) -> Result<Status> {
        if self.state == State::Finished && flush != FlushMode::Finish {
            return Err(self.fail("stream already finished"));
        }
        if io.avail_out() == 0 {
            return Ok(Status::BufError);
        }

        let old_flush = self.last_flush;
        self.last_flush = Some(flush);

        if self.state == State::Init {
            if self.options.format == Format::Zlib {
                let header =
                    header_bytes(self.options.level, self.options.strategy, self.dict_id.is_some());
                self.out.write_bytes(&header);
                if let Some(id) = self.dict_id {
                    self.out.write_u32_be(id);
                }
            }
            self.state = State::Busy;
        }

        if self.out.pending() != 0 {
            self.flush_pending(io);
            if io.avail_out() == 0 {
                self.last_flush = None;
                return Ok(Status::Ok);
            }
        } else if io.avail_in() == 0
            && old_flush.is_some_and(|old| flush <= old)
            && flush != FlushMode::Finish
        {
            return Ok(Status::BufError);
        }

        if self.state == State::Finished && io.avail_in() != 0 {
            return Ok(Status::BufError);
        }

        if io.avail_in() != 0
            || self.window.lookahead != 0
            || (flush != FlushMode::None && self.state != State::Finished)
        {
            let bstate = if self.options.level == 0 {
                self.deflate_stored(io, flush)
            } else {
                match self.options.strategy {
                    Strategy::HuffmanOnly => self.deflate_huff(io, flush),
                    Strategy::Rle => self.deflate_rle(io, flush),
                    _ if self.window.params.lazy => self.deflate_slow(io, flush),
                    _ => self.deflate_fast(io, flush),
                }
            };

            if matches!(bstate, BlockState::FinishStarted | BlockState::FinishDone) {
                self.state = State::Finished;
            }
            match bstate {
                BlockState::NeedMore | BlockState::FinishStarted => {
                    if io.avail_out() == 0 {
                        self.last_flush = None;
                    }
                    return Ok(Status::Ok);
                }
                BlockState::BlockDone => {
                    if flush != FlushMode::Finish {
                        write_stored_block(&mut self.out, &[], false);
                        if flush == FlushMode::Full {
                            self.window.clear_hash();
                            if self.window.lookahead == 0 {
                                self.window.strstart = 0;
                                self.window.block_start = 0;
                                self.window.insert = 0;
                            }
                        }
                    }
                    self.flush_pending(io);
                    if io.avail_out() == 0 {
                        self.last_flush = None;
                        return Ok(Status::Ok);
                    }
                }
                BlockState::FinishDone => {}
            }
        }

        if flush != FlushMode::Finish {
            return Ok(Status::Ok);
        }
        if self.options.format == Format::Raw {
            return Ok(Status::StreamEnd);
        }

        if !self.trailer_written {
            self.out.write_u32_be(self.adler.finish());
            self.trailer_written = true;
        }
        self.flush_pending(io);
        Ok(if self.out.pending() != 0 {
            Status::Ok
        } else {
            Status::StreamEnd
        })
    }

    /// Move input into the window, tracking totals and the checksum.
    fn fill_window(&mut self, io: &mut Io<'_>) {
        let input = &io.input[io.in_pos..];
        let n = self.window.fill(input);
        if self.options.format == Format::Zlib {
            self.adler.update(&input[..n]);
        }
        io.in_pos += n;
        self.total_in += n as u64;
    }

    fn flush_pending(&mut self, io: &mut Io<'_>) {
        let n = self.out.drain_into(&mut io.output[io.out_pos..]);
        io.out_pos += n;
        self.total_out += n as u64;
    }

    /// Emit the current block and drain what fits. Returns false when
    /// the output buffer is full.
    fn flush_block(&mut self, io: &mut Io<'_>, last: bool) -> bool {
        let policy = self.policy();
        self.block
            .flush(&mut self.out, self.window.block_bytes(), last, policy);
        self.window.block_start = self.window.strstart as isize;
        self.flush_pending(io);
        io.avail_out() != 0
    }

    /// Common tail of the block loops once input is exhausted.
    fn finish_pass(&mut self, io: &mut Io<'_>, flush: FlushMode, pending: bool) -> BlockState {
        if flush == FlushMode::Finish {
            return if self.flush_block(io, true) {
                BlockState::FinishDone
            } else {
                BlockState::FinishStarted
            };
        }
        if pending && !self.flush_block(io, false) {
            return BlockState::NeedMore;
        }
        BlockState::BlockDone
    }

    fn hash_insert_tail(&mut self) {
        self.window.insert = self.window.strstart.min(MIN_MATCH - 1);
    }

    /// Level 0: copy input into stored blocks of at most 64KB.
    fn deflate_stored(&mut self, io: &mut Io<'_>, flush: FlushMode) -> BlockState {
        loop {
            if self.window.lookahead <= 1 {
                self.fill_window(io);
                if self.window.lookahead == 0 {
                    if flush == FlushMode::None {
                        return BlockState::NeedMore;
                    }
                    break;
                }
            }

            let w = &mut self.window;
            w.strstart += w.lookahead;
            w.lookahead = 0;

            let max_start = w.block_start + MAX_STORED_BLOCK as isize;
            if w.strstart as isize >= max_start {
                w.lookahead = (w.strstart as isize - max_start) as usize;
                w.strstart = max_start as usize;
                if !self.flush_block(io, false) {
                    return BlockState::NeedMore;
                }
            }
            // Flush before the block could slide out of the window.
            let w = &self.window;
            if w.strstart as isize - w.block_start >= MAX_DIST as isize
                && !self.flush_block(io, false)
            {
                return BlockState::NeedMore;
            }
        }
        self.window.insert = 0;
        let pending = self.window.strstart as isize > self.window.block_start;
        self.finish_pass(io, flush, pending)
    }

    /// Levels 1-3: take the first acceptable match, no lazy evaluation.
    fn deflate_fast(&mut self, io: &mut Io<'_>, flush: FlushMode) -> BlockState {
        loop {
            if self.window.lookahead < MIN_LOOKAHEAD {
                self.fill_window(io);
                if self.window.lookahead < MIN_LOOKAHEAD && flush == FlushMode::None {
                    return BlockState::NeedMore;
                }
                if self.window.lookahead == 0 {
                    break;
                }
            }

            let w = &mut self.window;
            let mut hash_head = 0;
            if w.lookahead >= MIN_MATCH {
                hash_head = w.insert_string(w.strstart);
            }
            if hash_head != 0 && w.strstart - hash_head <= MAX_DIST {
                w.match_length = w.longest_match(hash_head);
            }

            let full = if w.match_length >= MIN_MATCH {
                let full = self
                    .block
                    .tally_match(w.strstart - w.match_start, w.match_length);
                w.lookahead -= w.match_length;

                if w.match_length <= w.params.max_lazy && w.lookahead >= MIN_MATCH {
                    // Insert every string of the match into the hash.
                    w.match_length -= 1;
                    while w.match_length != 0 {
                        w.strstart += 1;
                        w.insert_string(w.strstart);
                        w.match_length -= 1;
                    }
                    w.strstart += 1;
                } else {
                    w.strstart += w.match_length;
                    w.match_length = 0;
                    w.rehash_at(w.strstart);
                }
                full
            } else {
                let full = self.block.tally_literal(w.buf[w.strstart]);
                w.lookahead -= 1;
                w.strstart += 1;
                full
            };

            if full && !self.flush_block(io, false) {
                return BlockState::NeedMore;
            }
        }
        self.hash_insert_tail();
        let pending = !self.block.is_empty();
        self.finish_pass(io, flush, pending)
    }

    /// Levels 4-9: emit a match only if the match at the next byte is not
    /// longer.
    fn deflate_slow(&mut self, io: &mut Io<'_>, flush: FlushMode) -> BlockState {
        loop {
            if self.window.lookahead < MIN_LOOKAHEAD {
                self.fill_window(io);
                if self.window.lookahead < MIN_LOOKAHEAD && flush == FlushMode::None {
                    return BlockState::NeedMore;
                }
                if self.window.lookahead == 0 {
                    break;
                }
            }

            let filtered = self.options.strategy == Strategy::Filtered;
            let w = &mut self.window;
            let mut hash_head = 0;
            if w.lookahead >= MIN_MATCH {
                hash_head = w.insert_string(w.strstart);
            }

            w.prev_length = w.match_length;
            w.prev_match = w.match_start;
            w.match_length = MIN_MATCH - 1;

            if hash_head != 0
                && w.prev_length < w.params.max_lazy
                && w.strstart - hash_head <= MAX_DIST
            {
                w.match_length = w.longest_match(hash_head);
                if w.match_length <= 5
                    && (filtered
                        || (w.match_length == MIN_MATCH && w.strstart - w.match_start > TOO_FAR))
                {
                    w.match_length = MIN_MATCH - 1;
                }
            }

            if w.prev_length >= MIN_MATCH && w.match_length <= w.prev_length {
                let max_insert = w.strstart + w.lookahead - MIN_MATCH;
                let full = self
                    .block
                    .tally_match(w.strstart - 1 - w.prev_match, w.prev_length);

                // Skip the rest of the previous match, hashing as we go.
                w.lookahead -= w.prev_length - 1;
                let mut remaining = w.prev_length - 2;
                while remaining != 0 {
                    w.strstart += 1;
                    if w.strstart <= max_insert {
                        w.insert_string(w.strstart);
                    }
                    remaining -= 1;
                }
                w.prev_length = MIN_MATCH - 1;
                w.match_available = false;
                w.match_length = MIN_MATCH - 1;
                w.strstart += 1;

                if full && !self.flush_block(io, false) {
                    return BlockState::NeedMore;
                }
            } else if w.match_available {
                let full = self.block.tally_literal(w.buf[w.strstart - 1]);
                if full {
                    self.flush_block(io, false);
                }
                let w = &mut self.window;
                w.strstart += 1;
                w.lookahead -= 1;
                if io.avail_out() == 0 {
                    return BlockState::NeedMore;
                }
            } else {
                w.match_available = true;
                w.strstart += 1;
                w.lookahead -= 1;
            }
        }

        if self.window.match_available {
            self.block.tally_literal(self.window.buf[self.window.strstart - 1]);
            self.window.match_available = false;
        }
        self.hash_insert_tail();
        let pending = !self.block.is_empty();
        self.finish_pass(io, flush, pending)
    }

    /// Run-length matching: only distance-one matches are considered.
    fn deflate_rle(&mut self, io: &mut Io<'_>, flush: FlushMode) -> BlockState {
        loop {
            if self.window.lookahead <= MAX_MATCH {
                self.fill_window(io);
                if self.window.lookahead <= MAX_MATCH && flush == FlushMode::None {
                    return BlockState::NeedMore;
                }
                if self.window.lookahead == 0 {
                    break;
                }
            }

            let w = &mut self.window;
            let run = w.run_length();
            let full = if run >= MIN_MATCH {
                let full = self.block.tally_match(1, run);
                w.lookahead -= run;
                w.strstart += run;
                full
            } else {
                let full = self.block.tally_literal(w.buf[w.strstart]);
                w.lookahead -= 1;
                w.strstart += 1;
                full
            };

            if full && !self.flush_block(io, false) {
                return BlockState::NeedMore;
            }
        }
        self.window.insert = 0;
        let pending = !self.block.is_empty();
        self.finish_pass(io, flush, pending)
    }

    /// Literals only; the Huffman trees do all the work.
    fn deflate_huff(&mut self, io: &mut Io<'_>, flush: FlushMode) -> BlockState {
        loop {
            if self.window.lookahead == 0 {
                self.fill_window(io);
                if self.window.lookahead == 0 {
                    if flush == FlushMode::None {
                        return BlockState::NeedMore;
                    }
                    break;
                }
            }

            let w = &mut self.window;
            let full = self.block.tally_literal(w.buf[w.strstart]);
            w.lookahead -= 1;
            w.strstart += 1;

            if full && !self.flush_block(io, false) {
                return BlockState::NeedMore;
            }
        }
        self.window.insert = 0;
        let pending = !self.block.is_empty();
        self.finish_pass(io, flush, pending)
    }
}

impl Compressor for Deflater {
    fn compress(
        &mut self,
        input: &[u8],
        output: &mut [u8],
        flush: FlushMode,
    ) -> Result<(usize, usize, Status)> {
        let mut io = Io {
            input,
            in_pos: 0,
            output,
            out_pos: 0,
        };
        let status = self.step(&mut io, flush)?;
        if status == Status::StreamEnd {
            log::trace!(
                "deflate stream end: {} -> {} bytes",
                self.total_in,
                self.total_out
            );
        }
        Ok((io.in_pos, io.out_pos, status))
    }

    fn reset(&mut self) {
        *self = Self::with_options(self.options);
    }

    fn is_finished(&self) -> bool {
        self.state == State::Finished && self.trailer_done()
    }

    fn last_error(&self) -> Option<&str> {
        self.msg.as_deref()
    }
}

/// Compress data as raw DEFLATE in one call.
///
/// # Example
///
/// ```
/// use oxizip_deflate::{deflate, inflate};
///
/// let data = b"Hello, World! Hello, World!";
/// let compressed = deflate(data, 6).unwrap();
/// assert_eq!(inflate(&compressed).unwrap(), data);
/// ```
pub fn deflate(data: &[u8], level: u8) -> Result<Vec<u8>> {
    let mut deflater = Deflater::new(level);
    let output = deflater.compress_all(data)?;
    deflater.end()?;
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inflate::inflate;

    #[test]
    fn test_empty_input_levels() {
        for level in 0..=9 {
            let compressed = deflate(&[], level).unwrap();
            assert!(!compressed.is_empty());
            assert_eq!(inflate(&compressed).unwrap(), Vec::<u8>::new());
        }
    }

    #[test]
    fn test_level_zero_is_stored() {
        let data = b"stored blocks keep bytes verbatim";
        let compressed = deflate(data, 0).unwrap();
        assert_eq!(compressed[0] & 0x07, 0x01);
        assert_eq!(&compressed[5..], data);
    }

    #[test]
    fn test_repetitive_data_shrinks() {
        let data = b"abcabcabcabcabcabcabcabcabcabcabcabcabcabcabcabc".repeat(50);
        for level in 1..=9 {
            let compressed = deflate(&data, level).unwrap();
            assert!(compressed.len() < data.len() / 10, "level {}", level);
            assert_eq!(inflate(&compressed).unwrap(), data);
        }
    }

    #[test]
    fn test_strategies_roundtrip() {
        let data: Vec<u8> = b"aaaaaaaabbbbbbbbccccccccabcabcabc"
            .iter()
            .cycle()
            .take(10_000)
            .copied()
            .collect();
        for strategy in [
            Strategy::Default,
            Strategy::Filtered,
            Strategy::HuffmanOnly,
            Strategy::Rle,
            Strategy::Fixed,
        ] {
            let mut deflater = Deflater::with_options(DeflateOptions::new(6).with_strategy(strategy));
            let compressed = deflater.compress_all(&data).unwrap();
            assert_eq!(inflate(&compressed).unwrap(), data, "{:?}", strategy);
        }
    }

    #[test]
    fn test_zero_output_space_is_buf_error() {
        let mut deflater = Deflater::new(6);
        let (consumed, produced, status) =
            deflater.compress(b"abc", &mut [], FlushMode::None).unwrap();
        assert_eq!((consumed, produced, status), (0, 0, Status::BufError));
    }

    #[test]
    fn test_repeated_flush_without_input_is_buf_error() {
        let mut deflater = Deflater::new(6);
        let mut out = [0u8; 64];
        let (_, _, status) = deflater.compress(b"abc", &mut out, FlushMode::Sync).unwrap();
        assert_eq!(status, Status::Ok);
        let (_, produced, status) = deflater.compress(&[], &mut out, FlushMode::Sync).unwrap();
        assert_eq!((produced, status), (0, Status::BufError));
    }

    #[test]
    fn test_sync_flush_ends_with_marker() {
        let mut deflater = Deflater::new(6);
        let mut out = [0u8; 256];
        let (_, produced, _) = deflater
            .compress(b"hello hello hello", &mut out, FlushMode::Sync)
            .unwrap();
        assert_eq!(&out[produced - 4..produced], &[0x00, 0x00, 0xFF, 0xFF]);
    }

    #[test]
    fn test_input_after_finish_is_rejected() {
        let mut deflater = Deflater::new(6);
        let mut out = [0u8; 256];
        let (_, _, status) = deflater.compress(b"data", &mut out, FlushMode::Finish).unwrap();
        assert_eq!(status, Status::StreamEnd);
        assert!(deflater.is_finished());
        assert!(deflater.compress(b"more", &mut out, FlushMode::None).is_err());
        assert_eq!(deflater.last_error(), Some("stream already finished"));
    }

    #[test]
    fn test_end_before_finish_fails() {
        let mut deflater = Deflater::new(6);
        let mut out = [0u8; 64];
        deflater.compress(b"partial", &mut out, FlushMode::None).unwrap();
        assert!(deflater.end().is_err());
        assert!(Deflater::new(6).end().is_ok());
    }

    #[test]
    fn test_dictionary_after_data_is_rejected() {
        let mut deflater = Deflater::new(6);
        let mut out = [0u8; 64];
        deflater.compress(b"x", &mut out, FlushMode::None).unwrap();
        assert!(deflater.set_dictionary(b"dict").is_err());
        assert!(deflater.last_error().is_some());
    }

    #[test]
    fn test_totals() {
        let data = vec![42u8; 5000];
        let mut deflater = Deflater::new(9);
        let compressed = deflater.compress_all(&data).unwrap();
        assert_eq!(deflater.total_in(), 5000);
        assert_eq!(deflater.total_out(), compressed.len() as u64);
    }
}
