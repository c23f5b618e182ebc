//! LZ77 sliding window and hash-chain match finder.
//!
//! The window holds two 32KB halves. New input is appended after the
//! lookahead; once the scan position reaches the upper half the window
//! slides down by 32KB and every hash entry is rebased. Positions are kept
//! as `u16` with 0 reserved as the empty-chain marker, so the byte at
//! window position 0 is never offered as a match candidate.
//!
//! # Tokens
//!
//! The match finder hands the block builder either a literal byte or a
//! (length, distance) back-reference, see [`Lz77Token`].

/// History window size for DEFLATE (32KB).
pub const WINDOW_SIZE: usize = 32768;

/// Minimum match length.
pub const MIN_MATCH: usize = 3;

/// Maximum match length.
pub const MAX_MATCH: usize = 258;

/// Lookahead that guarantees a full-length match can be evaluated.
pub const MIN_LOOKAHEAD: usize = MAX_MATCH + MIN_MATCH + 1;

/// Farthest distance the match finder will reach back.
pub const MAX_DIST: usize = WINDOW_SIZE - MIN_LOOKAHEAD;

/// Three-byte matches farther than this are not worth their distance code.
pub const TOO_FAR: usize = 4096;

const WINDOW_MASK: usize = WINDOW_SIZE - 1;
const HASH_BITS: u32 = 15;
const HASH_SIZE: usize = 1 << HASH_BITS;
const HASH_MASK: usize = HASH_SIZE - 1;
const HASH_SHIFT: u32 = HASH_BITS.div_ceil(MIN_MATCH as u32);
const NIL: u16 = 0;

/// A token produced by the match finder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lz77Token {
    /// A literal byte.
    Literal(u8),
    /// A back-reference to previously seen data.
    Match {
        /// Number of bytes to copy (3-258).
        length: u16,
        /// Distance back into the window (1-32768).
        distance: u16,
    },
}

/// Per-level search effort.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchParams {
    /// Reduce the chain search once a match this long is in hand.
    pub good_length: usize,
    /// Lazy evaluation stops when the previous match is at least this long
    /// (greedy levels: insert hashes for matches up to this length).
    pub max_lazy: usize,
    /// Stop searching once a match this long is found.
    pub nice_length: usize,
    /// Maximum number of chain links to follow.
    pub max_chain: usize,
    /// Use lazy evaluation (levels 4-9).
    pub lazy: bool,
}

impl MatchParams {
    /// Search parameters for a compression level (0-9).
    pub fn for_level(level: u8) -> Self {
        let (good_length, max_lazy, nice_length, max_chain, lazy) = match level {
            0 => (0, 0, 0, 0, false),
            1 => (4, 4, 8, 4, false),
            2 => (4, 5, 16, 8, false),
            3 => (4, 6, 32, 32, false),
            4 => (4, 4, 16, 16, true),
            5 => (8, 16, 32, 32, true),
            6 => (8, 16, 128, 128, true),
            7 => (8, 32, 128, 256, true),
            8 => (32, 128, 258, 1024, true),
            _ => (32, 258, 258, 4096, true),
        };
        Self {
            good_length,
            max_lazy,
            nice_length,
            max_chain,
            lazy,
        }
    }
}

/// Sliding window with hash chains and the scan cursor of the compressor.
#[derive(Debug, Clone)]
pub struct Window {
    /// Window bytes; slack past `2 * WINDOW_SIZE` keeps look-ahead reads
    /// in bounds near the top.
    pub(crate) buf: Vec<u8>,
    head: Vec<u16>,
    prev: Vec<u16>,
    ins_h: usize,
    /// Scan position.
    pub(crate) strstart: usize,
    /// Start of the block being built; negative once slid out of the window.
    pub(crate) block_start: isize,
    /// Valid bytes at and after `strstart`.
    pub(crate) lookahead: usize,
    /// Bytes before `strstart` still waiting for hash insertion.
    pub(crate) insert: usize,
    pub(crate) match_start: usize,
    pub(crate) match_length: usize,
    pub(crate) prev_length: usize,
    pub(crate) prev_match: usize,
    pub(crate) match_available: bool,
    pub(crate) params: MatchParams,
}

impl Window {
    /// Create an empty window for the given search parameters.
    pub fn new(params: MatchParams) -> Self {
        Self {
            buf: vec![0; 2 * WINDOW_SIZE + MIN_LOOKAHEAD],
            head: vec![NIL; HASH_SIZE],
            prev: vec![NIL; WINDOW_SIZE],
            ins_h: 0,
            strstart: 0,
            block_start: 0,
            lookahead: 0,
            insert: 0,
            match_start: 0,
            match_length: MIN_MATCH - 1,
            prev_length: MIN_MATCH - 1,
            prev_match: 0,
            match_available: false,
            params,
        }
    }

    /// Forget all history.
    pub fn reset(&mut self) {
        self.head.fill(NIL);
        self.prev.fill(NIL);
        self.ins_h = 0;
        self.strstart = 0;
        self.block_start = 0;
        self.lookahead = 0;
        self.insert = 0;
        self.match_start = 0;
        self.match_length = MIN_MATCH - 1;
        self.prev_length = MIN_MATCH - 1;
        self.prev_match = 0;
        self.match_available = false;
    }

    /// Empty the hash heads so no later string can match earlier data.
    pub fn clear_hash(&mut self) {
        self.head.fill(NIL);
    }

    /// Bytes of the current block, if it is still inside the window.
    pub fn block_bytes(&self) -> Option<&[u8]> {
        if self.block_start >= 0 {
            Some(&self.buf[self.block_start as usize..self.strstart])
        } else {
            None
        }
    }

    /// Slide if needed and append input until the lookahead is large
    /// enough or the input is exhausted. Returns the bytes consumed.
    pub fn fill(&mut self, input: &[u8]) -> usize {
        let mut consumed = 0;
        loop {
            let mut more = 2 * WINDOW_SIZE - self.lookahead - self.strstart;

            if self.strstart >= WINDOW_SIZE + MAX_DIST {
                self.buf.copy_within(WINDOW_SIZE..2 * WINDOW_SIZE, 0);
                self.match_start = self.match_start.saturating_sub(WINDOW_SIZE);
                self.strstart -= WINDOW_SIZE;
                self.block_start -= WINDOW_SIZE as isize;
                if self.insert > self.strstart {
                    self.insert = self.strstart;
                }
                self.slide_hash();
                more += WINDOW_SIZE;
            }

            if consumed == input.len() {
                break;
            }

            let n = more.min(input.len() - consumed);
            let dst = self.strstart + self.lookahead;
            self.buf[dst..dst + n].copy_from_slice(&input[consumed..consumed + n]);
            consumed += n;
            self.lookahead += n;

            // Hash the strings that straddled the previous end of input.
            if self.lookahead + self.insert >= MIN_MATCH {
                let mut pos = self.strstart - self.insert;
                self.ins_h = self.buf[pos] as usize;
                self.update_hash(self.buf[pos + 1]);
                while self.insert > 0 {
                    self.update_hash(self.buf[pos + MIN_MATCH - 1]);
                    self.prev[pos & WINDOW_MASK] = self.head[self.ins_h];
                    self.head[self.ins_h] = pos as u16;
                    pos += 1;
                    self.insert -= 1;
                    if self.lookahead + self.insert < MIN_MATCH {
                        break;
                    }
                }
            }

            if self.lookahead >= MIN_LOOKAHEAD {
                break;
            }
        }
        consumed
    }

    /// Preload a preset dictionary (its last 32KB) into empty history.
    pub fn load_dictionary(&mut self, dictionary: &[u8]) {
        let dictionary = if dictionary.len() > WINDOW_SIZE {
            &dictionary[dictionary.len() - WINDOW_SIZE..]
        } else {
            dictionary
        };

        let mut pos = 0;
        pos += self.fill(&dictionary[pos..]);
        while self.lookahead >= MIN_MATCH {
            let mut s = self.strstart;
            for _ in 0..self.lookahead - (MIN_MATCH - 1) {
                self.insert_string(s);
                s += 1;
            }
            self.strstart = s;
            self.lookahead = MIN_MATCH - 1;
            pos += self.fill(&dictionary[pos..]);
        }
        self.strstart += self.lookahead;
        self.block_start = self.strstart as isize;
        self.insert = self.lookahead;
        self.lookahead = 0;
        self.match_length = MIN_MATCH - 1;
        self.prev_length = MIN_MATCH - 1;
        self.match_available = false;
    }

    #[inline(always)]
    fn update_hash(&mut self, byte: u8) {
        self.ins_h = ((self.ins_h << HASH_SHIFT) ^ byte as usize) & HASH_MASK;
    }

    /// Restart the rolling hash at `pos` (after skipping a long match).
    pub fn rehash_at(&mut self, pos: usize) {
        self.ins_h = self.buf[pos] as usize;
        self.update_hash(self.buf[pos + 1]);
    }

    /// Insert the string at `pos` and return the previous chain head
    /// (0 when the chain was empty).
    #[inline]
    pub fn insert_string(&mut self, pos: usize) -> usize {
        self.update_hash(self.buf[pos + MIN_MATCH - 1]);
        let head = self.head[self.ins_h];
        self.prev[pos & WINDOW_MASK] = head;
        self.head[self.ins_h] = pos as u16;
        head as usize
    }

    fn slide_hash(&mut self) {
        let rebase = |p: &mut u16| {
            *p = if *p as usize >= WINDOW_SIZE {
                *p - WINDOW_SIZE as u16
            } else {
                NIL
            };
        };
        self.head.iter_mut().for_each(rebase);
        self.prev.iter_mut().for_each(rebase);
    }

    /// Follow the hash chain from `cur_match` and return the best match
    /// length found (capped at the lookahead); sets `match_start`.
    pub fn longest_match(&mut self, mut cur_match: usize) -> usize {
        let scan = self.strstart;
        let mut chain_length = self.params.max_chain;
        let mut best_len = self.prev_length;
        let mut nice_match = self.params.nice_length;
        let limit = self.strstart.saturating_sub(MAX_DIST);

        if self.prev_length >= self.params.good_length {
            chain_length >>= 2;
        }
        if nice_match > self.lookahead {
            nice_match = self.lookahead;
        }

        let buf = &self.buf;
        loop {
            let m = cur_match;
            if buf[m + best_len] == buf[scan + best_len]
                && buf[m + best_len - 1] == buf[scan + best_len - 1]
                && buf[m] == buf[scan]
                && buf[m + 1] == buf[scan + 1]
            {
                let mut len = 2;
                while len < MAX_MATCH && buf[scan + len] == buf[m + len] {
                    len += 1;
                }
                if len > best_len {
                    self.match_start = cur_match;
                    best_len = len;
                    if len >= nice_match {
                        break;
                    }
                }
            }

            cur_match = self.prev[cur_match & WINDOW_MASK] as usize;
            chain_length = chain_length.saturating_sub(1);
            if cur_match <= limit || chain_length == 0 {
                break;
            }
        }

        best_len.min(self.lookahead)
    }

    /// Length of the run of the byte before `strstart` continuing at
    /// `strstart` (for run-length matching), capped at the lookahead.
    pub fn run_length(&self) -> usize {
        if self.strstart == 0 || self.lookahead < MIN_MATCH {
            return 0;
        }
        let byte = self.buf[self.strstart - 1];
        let run = self.buf[self.strstart..self.strstart + MAX_MATCH]
            .iter()
            .take_while(|&&b| b == byte)
            .count();
        run.min(self.lookahead)
    }
}
