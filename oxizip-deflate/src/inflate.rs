//! DEFLATE decompression.
//!
//! [`Inflater`] is a resumable mode machine: every field of the stream
//! (block header, code lengths, each symbol and its extra bits) is a
//! separate mode, so decoding can stop whenever input or output runs out
//! and pick up at exactly the same point on the next call. The last 32KB
//! of output is mirrored into a circular window to resolve back-references
//! that reach into data returned by earlier calls.
//!
//! After a full flush on the compressing side, [`Inflater::sync`] can skip
//! damaged input up to the next flush marker and resume decoding there.

use crate::deflate::Format;
use crate::huffman::{Decoded, HuffmanTree, END_OF_BLOCK};
use crate::tables::{
    CODE_LENGTH_ORDER, DISTANCE_BASE, DISTANCE_EXTRA_BITS, LENGTH_BASE, LENGTH_EXTRA_BITS,
    fixed_distance_tree, fixed_litlen_tree,
};
use crate::zlib::{Adler32, PRESET_DICT};
use oxizip_core::BitReader;
use oxizip_core::error::{OxiZipError, Result};
use oxizip_core::traits::{Decompressor, FlushMode, Status};

const WINDOW_SIZE: usize = 32768;
const WINDOW_MASK: usize = WINDOW_SIZE - 1;

/// Decoder position within the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// zlib header.
    Head,
    /// zlib dictionary identifier.
    DictId,
    /// Waiting for the preset dictionary.
    Dict,
    /// Block header.
    Type,
    /// Stored block LEN/NLEN.
    Stored,
    /// Stored block payload.
    Copy,
    /// Dynamic block counts.
    Table,
    /// Code-length code lengths.
    LenLens,
    /// Literal/length and distance code lengths.
    CodeLens,
    /// Literal/length symbol.
    Len,
    /// Length extra bits.
    LenExt,
    /// Distance symbol.
    Dist,
    /// Distance extra bits.
    DistExt,
    /// Copying a match.
    Match,
    /// Emitting a literal.
    Lit,
    /// zlib Adler-32 trailer.
    Check,
    /// Stream complete.
    Done,
    /// Unrecoverable data error.
    Bad,
    /// Searching for a flush marker.
    Sync,
}

/// Input and output cursors for one step.
struct Io<'a> {
    input: &'a [u8],
    in_pos: usize,
    output: &'a mut [u8],
    out_pos: usize,
    /// Output already folded into the checksum.
    summed: usize,
}

impl Io<'_> {
    fn avail_in(&self) -> usize {
        self.input.len() - self.in_pos
    }

    fn avail_out(&self) -> usize {
        self.output.len() - self.out_pos
    }
}

/// Feed one input byte into the bit accumulator.
fn pull(bits: &mut BitReader, io: &mut Io<'_>) -> bool {
    match io.input.get(io.in_pos) {
        Some(&byte) => {
            bits.push_byte(byte);
            io.in_pos += 1;
            true
        }
        None => false,
    }
}

/// Make at least `count` bits available, or report that input ran out.
fn need_bits(bits: &mut BitReader, io: &mut Io<'_>, count: u32) -> bool {
    while bits.available() < count {
        if !pull(bits, io) {
            return false;
        }
    }
    true
}

enum Fetch {
    Symbol(u16),
    NeedInput,
    Invalid,
}

/// Decode one symbol, pulling bytes only as the code requires.
fn fetch(tree: &HuffmanTree, bits: &mut BitReader, io: &mut Io<'_>) -> Fetch {
    loop {
        match tree.decode(bits) {
            Decoded::Symbol { symbol, length } => {
                bits.consume(length);
                return Fetch::Symbol(symbol);
            }
            Decoded::NeedMore => {
                if !pull(bits, io) {
                    return Fetch::NeedInput;
                }
            }
            Decoded::Invalid => return Fetch::Invalid,
        }
    }
}

/// Scan for the 00 00 FF FF marker left by a sync or full flush.
/// `have` carries the match state across calls; returns bytes scanned.
fn sync_search(have: &mut u32, buf: &[u8]) -> usize {
    let mut got = *have;
    let mut next = 0;
    while next < buf.len() && got < 4 {
        let expected = if got < 2 { 0x00 } else { 0xFF };
        if buf[next] == expected {
            got += 1;
        } else if buf[next] != 0 {
            got = 0;
        } else {
            got = 4 - got;
        }
        next += 1;
    }
    *have = got;
    next
}

/// DEFLATE decompressor.
#[derive(Debug, Clone)]
pub struct Inflater {
    format: Format,
    mode: Mode,
    bits: BitReader,
    last: bool,
    /// Dynamic trees of the current block; `None` selects the fixed code.
    lencode: Option<HuffmanTree>,
    distcode: Option<HuffmanTree>,
    codelen: Option<HuffmanTree>,
    /// Code-length repeat symbol waiting for its extra bits.
    repeat: Option<u16>,
    length: usize,
    offset: usize,
    extra: u32,
    nlen: usize,
    ndist: usize,
    ncode: usize,
    have: usize,
    lens: [u8; 320],
    window: Vec<u8>,
    wnext: usize,
    whave: usize,
    adler: Adler32,
    verify_check: bool,
    dict_id: u32,
    have_dict: bool,
    sync_have: u32,
    total_in: u64,
    total_out: u64,
    msg: Option<&'static str>,
}

impl Default for Inflater {
    fn default() -> Self {
        Self::new()
    }
}

impl Inflater {
    /// Create a raw DEFLATE decompressor.
    pub fn new() -> Self {
        Self::with_format(Format::Raw)
    }

    /// Create a decompressor for the given framing.
    pub fn with_format(format: Format) -> Self {
        Self {
            format,
            mode: match format {
                Format::Raw => Mode::Type,
                Format::Zlib => Mode::Head,
            },
            bits: BitReader::new(),
            last: false,
            lencode: None,
            distcode: None,
            codelen: None,
            repeat: None,
            length: 0,
            offset: 0,
            extra: 0,
            nlen: 0,
            ndist: 0,
            ncode: 0,
            have: 0,
            lens: [0; 320],
            window: vec![0; WINDOW_SIZE],
            wnext: 0,
            whave: 0,
            adler: Adler32::new(),
            verify_check: true,
            dict_id: 0,
            have_dict: false,
            sync_have: 0,
            total_in: 0,
            total_out: 0,
            msg: None,
        }
    }

    /// Total bytes consumed.
    pub fn total_in(&self) -> u64 {
        self.total_in
    }

    /// Total bytes produced.
    pub fn total_out(&self) -> u64 {
        self.total_out
    }

    /// Adler-32 of the output so far (zlib framing), or the identifier of
    /// the requested dictionary while waiting for it.
    pub fn adler(&self) -> u32 {
        if self.mode == Mode::Dict {
            self.dict_id
        } else {
            self.adler.finish()
        }
    }

    /// Supply a preset dictionary.
    ///
    /// For zlib streams this is only valid right after
    /// [`Status::NeedDictionary`], and the dictionary must match the
    /// identifier in the header. Raw streams accept a dictionary at any
    /// point; it is appended to the history.
    pub fn set_dictionary(&mut self, dictionary: &[u8]) -> Result<()> {
        if self.format == Format::Zlib {
            if self.mode != Mode::Dict {
                self.msg = Some("dictionary not requested");
                return Err(OxiZipError::stream_state("dictionary not requested"));
            }
            if Adler32::checksum(dictionary) != self.dict_id {
                self.msg = Some("incorrect dictionary");
                return Err(OxiZipError::corrupted(self.total_in, "incorrect dictionary"));
            }
        }
        self.update_window(dictionary);
        self.have_dict = true;
        log::trace!("inflate dictionary set: {} bytes", dictionary.len());
        Ok(())
    }

    /// Skip input up to the next full-flush point.
    ///
    /// Returns the number of input bytes skipped and `Status::Ok` once the
    /// 00 00 FF FF marker has been found; decoding then continues with the
    /// next block and an empty history. `Status::BufError` means the
    /// marker was not found yet; call again with more input.
    ///
    /// A resynchronized zlib stream no longer checks its trailer, since
    /// the checksum covers output that was skipped.
    pub fn sync(&mut self, input: &[u8]) -> Result<(usize, Status)> {
        if input.is_empty() && self.bits.available() < 8 {
            return Ok((0, Status::BufError));
        }

        if self.mode != Mode::Sync {
            self.mode = Mode::Sync;
            self.bits.align_to_byte();
            let mut held = [0u8; 8];
            let mut count = 0;
            while let Some(byte) = self.bits.pop_byte() {
                held[count] = byte;
                count += 1;
            }
            self.sync_have = 0;
            sync_search(&mut self.sync_have, &held[..count]);
        }

        let consumed = sync_search(&mut self.sync_have, input);
        self.total_in += consumed as u64;
        if self.sync_have != 4 {
            return Ok((consumed, Status::BufError));
        }

        log::debug!("inflate resynchronized at input offset {}", self.total_in);
        self.bits.clear();
        self.sync_have = 0;
        self.last = false;
        self.repeat = None;
        self.wnext = 0;
        self.whave = 0;
        self.verify_check = false;
        self.mode = Mode::Type;
        self.msg = None;
        Ok((consumed, Status::Ok))
    }

    /// Tear down the session.
    ///
    /// Fails when decoding started but the stream did not reach its end.
    pub fn end(self) -> Result<()> {
        let fresh = self.total_in == 0 && self.total_out == 0;
        if self.mode == Mode::Done || fresh {
            Ok(())
        } else {
            Err(OxiZipError::stream_state("inflate stream ended before completion"))
        }
    }

    fn bad(&mut self, io: &Io<'_>, message: &'static str) -> OxiZipError {
        self.mode = Mode::Bad;
        self.msg = Some(message);
        OxiZipError::corrupted(self.total_in + io.in_pos as u64, message)
    }

    fn put(&mut self, io: &mut Io<'_>, byte: u8) {
        io.output[io.out_pos] = byte;
        io.out_pos += 1;
        self.window[self.wnext] = byte;
        self.wnext = (self.wnext + 1) & WINDOW_MASK;
        if self.whave < WINDOW_SIZE {
            self.whave += 1;
        }
    }

    fn update_window(&mut self, data: &[u8]) {
        let data = if data.len() > WINDOW_SIZE {
            &data[data.len() - WINDOW_SIZE..]
        } else {
            data
        };
        let first = (WINDOW_SIZE - self.wnext).min(data.len());
        self.window[self.wnext..self.wnext + first].copy_from_slice(&data[..first]);
        let rest = &data[first..];
        self.window[..rest.len()].copy_from_slice(rest);
        self.wnext = (self.wnext + data.len()) & WINDOW_MASK;
        self.whave = (self.whave + data.len()).min(WINDOW_SIZE);
    }

    /// Fold newly produced output into the running checksum.
    fn sum_output(&mut self, io: &mut Io<'_>) {
        if self.format == Format::Zlib {
            self.adler.update(&io.output[io.summed..io.out_pos]);
        }
        io.summed = io.out_pos;
    }

    /// Run modes until input or output runs out or the stream ends.
    fn run(&mut self, io: &mut Io<'_>) -> Result<()> {
        loop {
            let progressed = match self.mode {
                Mode::Head => self.head(io)?,
                Mode::DictId => {
                    if !need_bits(&mut self.bits, io, 32) {
                        return Ok(());
                    }
                    self.dict_id = self.take_be32();
                    self.mode = Mode::Dict;
                    true
                }
                Mode::Dict => {
                    if !self.have_dict {
                        return Ok(());
                    }
                    self.adler = Adler32::new();
                    self.mode = Mode::Type;
                    true
                }
                Mode::Type => self.block_type(io)?,
                Mode::Stored => self.stored(io)?,
                Mode::Copy => self.copy(io),
                Mode::Table => self.table(io)?,
                Mode::LenLens => self.len_lens(io)?,
                Mode::CodeLens => self.code_lens(io)?,
                Mode::Len => self.len(io)?,
                Mode::LenExt => {
                    if !need_bits(&mut self.bits, io, self.extra) {
                        return Ok(());
                    }
                    self.length += self.bits.take(self.extra) as usize;
                    self.mode = Mode::Dist;
                    true
                }
                Mode::Dist => self.dist(io)?,
                Mode::DistExt => {
                    if !need_bits(&mut self.bits, io, self.extra) {
                        return Ok(());
                    }
                    self.offset += self.bits.take(self.extra) as usize;
                    if self.offset > self.whave {
                        return Err(self.bad(io, "invalid distance too far back"));
                    }
                    self.mode = Mode::Match;
                    true
                }
                Mode::Match => self.copy_match(io),
                Mode::Lit => {
                    if io.avail_out() == 0 {
                        return Ok(());
                    }
                    self.put(io, self.length as u8);
                    self.mode = Mode::Len;
                    true
                }
                Mode::Check => self.check(io)?,
                Mode::Done => return Ok(()),
                Mode::Bad => {
                    let message = self.msg.unwrap_or("invalid stream");
                    return Err(OxiZipError::corrupted(self.total_in, message));
                }
                Mode::Sync => {
                    return Err(OxiZipError::stream_state(
                        "resynchronization in progress; call sync",
                    ));
                }
            };
            if !progressed {
                return Ok(());
            }
        }
    }

    fn take_be32(&mut self) -> u32 {
        let mut value = 0u32;
        for _ in 0..4 {
            value = (value << 8) | self.bits.take(8);
        }
        value
    }

    fn head(&mut self, io: &mut Io<'_>) -> Result<bool> {
        if !need_bits(&mut self.bits, io, 16) {
            return Ok(false);
        }
        let cmf = self.bits.take(8);
        let flg = self.bits.take(8);
        if ((cmf << 8) | flg) % 31 != 0 {
            return Err(self.bad(io, "incorrect header check"));
        }
        if cmf & 0x0F != 8 {
            return Err(self.bad(io, "unknown compression method"));
        }
        if (cmf >> 4) + 8 > 15 {
            return Err(self.bad(io, "invalid window size"));
        }
        self.adler = Adler32::new();
        self.mode = if flg & PRESET_DICT as u32 != 0 {
            Mode::DictId
        } else {
            Mode::Type
        };
        Ok(true)
    }

    fn block_type(&mut self, io: &mut Io<'_>) -> Result<bool> {
        if self.last {
            self.bits.align_to_byte();
            self.mode = match self.format {
                Format::Raw => Mode::Done,
                Format::Zlib => Mode::Check,
            };
            return Ok(true);
        }
        if !need_bits(&mut self.bits, io, 3) {
            return Ok(false);
        }
        self.last = self.bits.take(1) == 1;
        match self.bits.take(2) {
            0 => self.mode = Mode::Stored,
            1 => {
                self.lencode = None;
                self.distcode = None;
                self.mode = Mode::Len;
            }
            2 => self.mode = Mode::Table,
            _ => return Err(self.bad(io, "invalid block type")),
        }
        Ok(true)
    }

    fn stored(&mut self, io: &mut Io<'_>) -> Result<bool> {
        self.bits.align_to_byte();
        if !need_bits(&mut self.bits, io, 32) {
            return Ok(false);
        }
        let len = self.bits.take(16);
        let nlen = self.bits.take(16);
        if len != (!nlen & 0xFFFF) {
            return Err(self.bad(io, "invalid stored block lengths"));
        }
        self.length = len as usize;
        self.mode = Mode::Copy;
        Ok(true)
    }

    fn copy(&mut self, io: &mut Io<'_>) -> bool {
        while self.length > 0 && io.avail_out() > 0 {
            match self.bits.pop_byte() {
                Some(byte) => {
                    self.put(io, byte);
                    self.length -= 1;
                }
                None => break,
            }
        }

        let n = self.length.min(io.avail_in()).min(io.avail_out());
        if n > 0 {
            let chunk = &io.input[io.in_pos..io.in_pos + n];
            io.output[io.out_pos..io.out_pos + n].copy_from_slice(chunk);
            self.update_window(chunk);
            io.in_pos += n;
            io.out_pos += n;
            self.length -= n;
        }

        if self.length == 0 {
            self.mode = Mode::Type;
            true
        } else {
            false
        }
    }

    fn table(&mut self, io: &mut Io<'_>) -> Result<bool> {
        if !need_bits(&mut self.bits, io, 14) {
            return Ok(false);
        }
        self.nlen = self.bits.take(5) as usize + 257;
        self.ndist = self.bits.take(5) as usize + 1;
        self.ncode = self.bits.take(4) as usize + 4;
        if self.nlen > 286 || self.ndist > 30 {
            return Err(self.bad(io, "too many length or distance symbols"));
        }
        self.have = 0;
        self.mode = Mode::LenLens;
        Ok(true)
    }

    fn len_lens(&mut self, io: &mut Io<'_>) -> Result<bool> {
        while self.have < self.ncode {
            if !need_bits(&mut self.bits, io, 3) {
                return Ok(false);
            }
            self.lens[CODE_LENGTH_ORDER[self.have]] = self.bits.take(3) as u8;
            self.have += 1;
        }
        for &symbol in &CODE_LENGTH_ORDER[self.ncode..] {
            self.lens[symbol] = 0;
        }
        match HuffmanTree::from_code_lengths(&self.lens[..19]) {
            Ok(tree) => self.codelen = Some(tree),
            Err(_) => return Err(self.bad(io, "invalid code lengths set")),
        }
        self.have = 0;
        self.repeat = None;
        self.mode = Mode::CodeLens;
        Ok(true)
    }

    fn code_lens(&mut self, io: &mut Io<'_>) -> Result<bool> {
        let total = self.nlen + self.ndist;
        while self.have < total {
            let symbol = match self.repeat {
                Some(symbol) => symbol,
                None => {
                    let Some(tree) = self.codelen.as_ref() else {
                        return Err(self.bad(io, "invalid code lengths set"));
                    };
                    match fetch(tree, &mut self.bits, io) {
                        Fetch::Symbol(symbol) => symbol,
                        Fetch::NeedInput => return Ok(false),
                        Fetch::Invalid => return Err(self.bad(io, "invalid code lengths set")),
                    }
                }
            };

            if symbol < 16 {
                self.lens[self.have] = symbol as u8;
                self.have += 1;
                continue;
            }

            let (extra_bits, base) = match symbol {
                16 => (2, 3),
                17 => (3, 3),
                _ => (7, 11),
            };
            if !need_bits(&mut self.bits, io, extra_bits) {
                self.repeat = Some(symbol);
                return Ok(false);
            }
            self.repeat = None;

            let value = if symbol == 16 {
                if self.have == 0 {
                    return Err(self.bad(io, "invalid bit length repeat"));
                }
                self.lens[self.have - 1]
            } else {
                0
            };
            let count = base + self.bits.take(extra_bits) as usize;
            if self.have + count > total {
                return Err(self.bad(io, "invalid bit length repeat"));
            }
            self.lens[self.have..self.have + count].fill(value);
            self.have += count;
        }

        if self.lens[END_OF_BLOCK as usize] == 0 {
            return Err(self.bad(io, "invalid code -- missing end-of-block"));
        }
        match HuffmanTree::from_code_lengths(&self.lens[..self.nlen]) {
            Ok(tree) => self.lencode = Some(tree),
            Err(_) => return Err(self.bad(io, "invalid literal/lengths set")),
        }
        match HuffmanTree::from_code_lengths(&self.lens[self.nlen..total]) {
            Ok(tree) => self.distcode = Some(tree),
            Err(_) => return Err(self.bad(io, "invalid distances set")),
        }
        self.codelen = None;
        self.mode = Mode::Len;
        Ok(true)
    }

    fn len(&mut self, io: &mut Io<'_>) -> Result<bool> {
        let tree = self.lencode.as_ref().unwrap_or_else(|| fixed_litlen_tree());
        let symbol = match fetch(tree, &mut self.bits, io) {
            Fetch::Symbol(symbol) => symbol,
            Fetch::NeedInput => return Ok(false),
            Fetch::Invalid => return Err(self.bad(io, "invalid literal/length code")),
        };

        match symbol {
            0..=255 => {
                self.length = symbol as usize;
                self.mode = Mode::Lit;
            }
            END_OF_BLOCK => self.mode = Mode::Type,
            257..=285 => {
                let index = (symbol - 257) as usize;
                self.length = LENGTH_BASE[index] as usize;
                self.extra = LENGTH_EXTRA_BITS[index] as u32;
                self.mode = Mode::LenExt;
            }
            _ => return Err(self.bad(io, "invalid literal/length code")),
        }
        Ok(true)
    }

    fn dist(&mut self, io: &mut Io<'_>) -> Result<bool> {
        let tree = self.distcode.as_ref().unwrap_or_else(|| fixed_distance_tree());
        let symbol = match fetch(tree, &mut self.bits, io) {
            Fetch::Symbol(symbol) => symbol as usize,
            Fetch::NeedInput => return Ok(false),
            Fetch::Invalid => return Err(self.bad(io, "invalid distance code")),
        };
        if symbol >= DISTANCE_BASE.len() {
            return Err(self.bad(io, "invalid distance code"));
        }
        self.offset = DISTANCE_BASE[symbol] as usize;
        self.extra = DISTANCE_EXTRA_BITS[symbol] as u32;
        self.mode = Mode::DistExt;
        Ok(true)
    }

    fn copy_match(&mut self, io: &mut Io<'_>) -> bool {
        while self.length > 0 && io.avail_out() > 0 {
            let byte = self.window[(self.wnext + WINDOW_SIZE - self.offset) & WINDOW_MASK];
            self.put(io, byte);
            self.length -= 1;
        }
        if self.length == 0 {
            self.mode = Mode::Len;
            true
        } else {
            false
        }
    }

    fn check(&mut self, io: &mut Io<'_>) -> Result<bool> {
        if !need_bits(&mut self.bits, io, 32) {
            return Ok(false);
        }
        self.sum_output(io);
        let expected = self.take_be32();
        if self.verify_check && expected != self.adler.finish() {
            return Err(self.bad(io, "incorrect data check"));
        }
        self.mode = Mode::Done;
        Ok(true)
    }
}

impl Decompressor for Inflater {
    fn decompress(
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
            summed: 0,
        };

        let result = self.run(&mut io);
        self.sum_output(&mut io);
        self.total_in += io.in_pos as u64;
        self.total_out += io.out_pos as u64;
        if let Err(err) = result {
            log::debug!("inflate failed after {} input bytes: {}", self.total_in, err);
            return Err(err);
        }

        let status = match self.mode {
            Mode::Done => Status::StreamEnd,
            Mode::Dict if !self.have_dict => Status::NeedDictionary,
            _ if (io.in_pos == 0 && io.out_pos == 0) || flush == FlushMode::Finish => {
                Status::BufError
            }
            _ => Status::Ok,
        };
        Ok((io.in_pos, io.out_pos, status))
    }

    fn reset(&mut self) {
        *self = Self::with_format(self.format);
    }

    fn is_finished(&self) -> bool {
        self.mode == Mode::Done
    }

    fn last_error(&self) -> Option<&str> {
        self.msg
    }
}

/// Decompress raw DEFLATE data in one call.
pub fn inflate(data: &[u8]) -> Result<Vec<u8>> {
    let mut inflater = Inflater::new();
    inflater.decompress_all(data)
}
