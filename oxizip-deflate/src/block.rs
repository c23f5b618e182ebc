//! Block builder: token buffer, symbol statistics and block emission.
//!
//! Tokens from the match finder accumulate here until the buffer is full
//! or the compressor asks for a block boundary. At that point the three
//! possible encodings (stored, fixed Huffman, dynamic Huffman) are costed
//! and the cheapest one is written.

use crate::huffman::{self, CODELEN_SYMBOLS, DISTANCE_SYMBOLS, END_OF_BLOCK, LITLEN_SYMBOLS};
use crate::huffman::{MAX_CODE_LENGTH, MAX_CODELEN_LENGTH};
use crate::lz77::Lz77Token;
use crate::tables::{
    CODE_LENGTH_ORDER, DISTANCE_EXTRA_BITS, LENGTH_EXTRA_BITS, distance_to_code,
    fixed_distance_codes, fixed_distance_lengths, fixed_litlen_codes, fixed_litlen_lengths,
    length_to_code,
};
use oxizip_core::BitWriter;

/// Tokens per block before a flush is forced.
pub const TOKEN_BUFFER_SIZE: usize = (1 << 14) - 1;

/// Largest payload of one stored block.
pub const MAX_STORED_BLOCK: usize = 65535;

const STORED_BLOCK: u32 = 0;
const FIXED_BLOCK: u32 = 1;
const DYNAMIC_BLOCK: u32 = 2;

/// How the caller wants the next block encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockPolicy {
    /// Pick the cheapest of stored, fixed and dynamic.
    Best,
    /// Stored blocks only (level 0).
    StoredOnly,
    /// Never build dynamic trees.
    FixedOnly,
}

/// Token buffer with running symbol frequencies.
#[derive(Debug, Clone)]
pub struct BlockBuilder {
    tokens: Vec<Lz77Token>,
    lit_freq: [u32; LITLEN_SYMBOLS],
    dist_freq: [u32; DISTANCE_SYMBOLS],
}

impl Default for BlockBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self {
            tokens: Vec::with_capacity(TOKEN_BUFFER_SIZE),
            lit_freq: [0; LITLEN_SYMBOLS],
            dist_freq: [0; DISTANCE_SYMBOLS],
        }
    }

    /// True when no tokens are buffered.
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Discard buffered tokens and statistics.
    pub fn reset(&mut self) {
        self.tokens.clear();
        self.lit_freq = [0; LITLEN_SYMBOLS];
        self.dist_freq = [0; DISTANCE_SYMBOLS];
    }

    /// Record a literal. Returns true when the buffer is full.
    #[inline]
    pub fn tally_literal(&mut self, byte: u8) -> bool {
        self.tokens.push(Lz77Token::Literal(byte));
        self.lit_freq[byte as usize] += 1;
        self.tokens.len() == TOKEN_BUFFER_SIZE
    }

    /// Record a match. Returns true when the buffer is full.
    #[inline]
    pub fn tally_match(&mut self, distance: usize, length: usize) -> bool {
        let (length, distance) = (length as u16, distance as u16);
        self.tokens.push(Lz77Token::Match { length, distance });
        self.lit_freq[length_to_code(length).0 as usize] += 1;
        self.dist_freq[distance_to_code(distance).0 as usize] += 1;
        self.tokens.len() == TOKEN_BUFFER_SIZE
    }

    /// Encode the buffered tokens as one block.
    ///
    /// `stored` is the raw input the tokens cover, when it is still
    /// available; without it a stored block cannot be chosen.
    pub fn flush(
        &mut self,
        out: &mut BitWriter,
        stored: Option<&[u8]>,
        last: bool,
        policy: BlockPolicy,
    ) {
        self.lit_freq[END_OF_BLOCK as usize] += 1;

        let mut dynamic = None;
        let (opt_bytes, static_bytes) = if policy == BlockPolicy::StoredOnly {
            let len = stored.map_or(0, <[u8]>::len) as u64;
            (len + 5, len + 5)
        } else {
            let fixed_lit = fixed_litlen_lengths();
            let fixed_dist = fixed_distance_lengths();
            let static_bytes = (3 + self.data_bits(&fixed_lit, &fixed_dist)).div_ceil(8);

            let mut opt_bytes = static_bytes;
            if policy == BlockPolicy::Best {
                let trees = DynamicTrees::build(&self.lit_freq, &self.dist_freq);
                let dyn_bytes =
                    (3 + trees.header_bits() + self.data_bits(&trees.lit_lengths, &trees.dist_lengths))
                        .div_ceil(8);
                if dyn_bytes < static_bytes {
                    opt_bytes = dyn_bytes;
                    dynamic = Some(trees);
                }
            }
            (opt_bytes, static_bytes)
        };

        match stored {
            Some(data) if data.len() as u64 + 4 <= opt_bytes => {
                write_stored_block(out, data, last);
            }
            _ if opt_bytes == static_bytes || dynamic.is_none() => {
                out.write_bits((FIXED_BLOCK << 1) | last as u32, 3);
                self.write_tokens(
                    out,
                    &fixed_litlen_lengths(),
                    fixed_litlen_codes(),
                    &fixed_distance_lengths(),
                    fixed_distance_codes(),
                );
            }
            _ => {
                if let Some(trees) = dynamic {
                    out.write_bits((DYNAMIC_BLOCK << 1) | last as u32, 3);
                    trees.write_header(out);
                    let lit_codes = huffman::canonical_codes(&trees.lit_lengths);
                    let dist_codes = huffman::canonical_codes(&trees.dist_lengths);
                    self.write_tokens(
                        out,
                        &trees.lit_lengths,
                        &lit_codes,
                        &trees.dist_lengths,
                        &dist_codes,
                    );
                }
            }
        }

        if last {
            out.align_to_byte();
        }
        self.reset();
    }

    /// Total payload bits for the buffered tokens under the given code.
    fn data_bits(&self, lit_lengths: &[u8], dist_lengths: &[u8]) -> u64 {
        let mut bits = 0u64;
        for (symbol, &freq) in self.lit_freq.iter().enumerate() {
            if freq == 0 {
                continue;
            }
            let mut cost = lit_lengths[symbol] as u64;
            if symbol > END_OF_BLOCK as usize {
                cost += LENGTH_EXTRA_BITS[symbol - 257] as u64;
            }
            bits += freq as u64 * cost;
        }
        for (symbol, &freq) in self.dist_freq.iter().enumerate() {
            if freq > 0 {
                bits += freq as u64 * (dist_lengths[symbol] as u64 + DISTANCE_EXTRA_BITS[symbol] as u64);
            }
        }
        bits
    }

    fn write_tokens(
        &self,
        out: &mut BitWriter,
        lit_lengths: &[u8],
        lit_codes: &[u16],
        dist_lengths: &[u8],
        dist_codes: &[u16],
    ) {
        for token in &self.tokens {
            match *token {
                Lz77Token::Literal(byte) => {
                    let s = byte as usize;
                    out.write_bits(lit_codes[s] as u32, lit_lengths[s] as u32);
                }
                Lz77Token::Match { length, distance } => {
                    let (code, extra_bits, extra) = length_to_code(length);
                    let s = code as usize;
                    out.write_bits(lit_codes[s] as u32, lit_lengths[s] as u32);
                    out.write_bits(extra as u32, extra_bits as u32);

                    let (code, extra_bits, extra) = distance_to_code(distance);
                    let s = code as usize;
                    out.write_bits(dist_codes[s] as u32, dist_lengths[s] as u32);
                    out.write_bits(extra as u32, extra_bits as u32);
                }
            }
        }
        let eob = END_OF_BLOCK as usize;
        out.write_bits(lit_codes[eob] as u32, lit_lengths[eob] as u32);
    }
}

/// Write `data` as stored blocks (header, LEN, NLEN and the raw bytes).
///
/// Data longer than one block is split; only the final piece carries the
/// `last` bit. Empty data yields a single empty block.
pub fn write_stored_block(out: &mut BitWriter, data: &[u8], last: bool) {
    let mut pieces = data.chunks(MAX_STORED_BLOCK).peekable();
    if pieces.peek().is_none() {
        write_stored_piece(out, &[], last);
        return;
    }
    while let Some(piece) = pieces.next() {
        write_stored_piece(out, piece, last && pieces.peek().is_none());
    }
}

fn write_stored_piece(out: &mut BitWriter, data: &[u8], last: bool) {
    out.write_bits((STORED_BLOCK << 1) | last as u32, 3);
    out.align_to_byte();
    let len = data.len() as u16;
    out.write_u16_le(len);
    out.write_u16_le(!len);
    out.write_bytes(data);
}

/// Code lengths and run-length coded header of a dynamic block.
#[derive(Debug, Clone)]
struct DynamicTrees {
    lit_lengths: Vec<u8>,
    dist_lengths: Vec<u8>,
    lit_count: usize,
    dist_count: usize,
    /// (code-length symbol, repeat extra value)
    runs: Vec<(u8, u8)>,
    cl_lengths: Vec<u8>,
    cl_count: usize,
}

impl DynamicTrees {
    fn build(lit_freq: &[u32], dist_freq: &[u32]) -> Self {
        let lit_lengths = huffman::build_lengths(lit_freq, MAX_CODE_LENGTH);
        let mut dist_lengths = huffman::build_lengths(dist_freq, MAX_CODE_LENGTH);
        // Keep two distance codes even for literal-only blocks; some
        // decoders reject an empty distance tree.
        if dist_lengths.iter().all(|&l| l == 0) {
            dist_lengths[0] = 1;
            dist_lengths[1] = 1;
        }

        let lit_count = last_used(&lit_lengths).max(257);
        let dist_count = last_used(&dist_lengths).max(1);

        let mut runs = Vec::new();
        run_length_encode(&lit_lengths[..lit_count], &mut runs);
        run_length_encode(&dist_lengths[..dist_count], &mut runs);

        let mut cl_freq = [0u32; CODELEN_SYMBOLS];
        for &(symbol, _) in &runs {
            cl_freq[symbol as usize] += 1;
        }
        let cl_lengths = huffman::build_lengths(&cl_freq, MAX_CODELEN_LENGTH);
        let cl_count = CODE_LENGTH_ORDER
            .iter()
            .rposition(|&s| cl_lengths[s] != 0)
            .map_or(4, |p| (p + 1).max(4));

        Self {
            lit_lengths,
            dist_lengths,
            lit_count,
            dist_count,
            runs,
            cl_lengths,
            cl_count,
        }
    }

    fn header_bits(&self) -> u64 {
        let runs: u64 = self
            .runs
            .iter()
            .map(|&(symbol, _)| self.cl_lengths[symbol as usize] as u64 + repeat_extra_bits(symbol) as u64)
            .sum();
        5 + 5 + 4 + 3 * self.cl_count as u64 + runs
    }

    fn write_header(&self, out: &mut BitWriter) {
        out.write_bits((self.lit_count - 257) as u32, 5);
        out.write_bits((self.dist_count - 1) as u32, 5);
        out.write_bits((self.cl_count - 4) as u32, 4);
        for &symbol in CODE_LENGTH_ORDER.iter().take(self.cl_count) {
            out.write_bits(self.cl_lengths[symbol] as u32, 3);
        }

        let cl_codes = huffman::canonical_codes(&self.cl_lengths);
        for &(symbol, extra) in &self.runs {
            let s = symbol as usize;
            out.write_bits(cl_codes[s] as u32, self.cl_lengths[s] as u32);
            out.write_bits(extra as u32, repeat_extra_bits(symbol));
        }
    }
}

fn last_used(lengths: &[u8]) -> usize {
    lengths.iter().rposition(|&l| l != 0).map_or(0, |p| p + 1)
}

fn repeat_extra_bits(symbol: u8) -> u32 {
    match symbol {
        16 => 2,
        17 => 3,
        18 => 7,
        _ => 0,
    }
}

/// Run-length code a list of code lengths with symbols 16 (repeat the
/// previous length 3-6 times), 17 (3-10 zeros) and 18 (11-138 zeros).
fn run_length_encode(lengths: &[u8], runs: &mut Vec<(u8, u8)>) {
    let mut prev_len: i32 = -1;
    let mut next_len = lengths.first().map_or(-1, |&l| l as i32);
    let (mut max_count, mut min_count) = if next_len == 0 { (138, 3) } else { (7, 4) };
    let mut count = 0;

    for i in 0..lengths.len() {
        let cur_len = next_len;
        next_len = lengths.get(i + 1).map_or(-1, |&l| l as i32);
        count += 1;
        if count < max_count && cur_len == next_len {
            continue;
        }

        if count < min_count {
            for _ in 0..count {
                runs.push((cur_len as u8, 0));
            }
        } else if cur_len != 0 {
            if cur_len != prev_len {
                runs.push((cur_len as u8, 0));
                count -= 1;
            }
            runs.push((16, (count - 3) as u8));
        } else if count <= 10 {
            runs.push((17, (count - 3) as u8));
        } else {
            runs.push((18, (count - 11) as u8));
        }

        count = 0;
        prev_len = cur_len;
        (max_count, min_count) = if next_len == 0 {
            (138, 3)
        } else if cur_len == next_len {
            (6, 3)
        } else {
            (7, 4)
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expand_runs(runs: &[(u8, u8)]) -> Vec<u8> {
        let mut out: Vec<u8> = Vec::new();
        for &(symbol, extra) in runs {
            match symbol {
                16 => {
                    let prev = *out.last().unwrap();
                    out.extend(std::iter::repeat_n(prev, 3 + extra as usize));
                }
                17 => out.extend(std::iter::repeat_n(0, 3 + extra as usize)),
                18 => out.extend(std::iter::repeat_n(0, 11 + extra as usize)),
                len => out.push(len),
            }
        }
        out
    }

    #[test]
    fn test_run_length_encode_expands_back() {
        let mut lengths = vec![8u8; 144];
        lengths.extend(vec![0u8; 100]);
        lengths.extend([5, 5, 5, 5, 5, 5, 5, 5, 5, 3, 0, 0, 7]);
        let mut runs = Vec::new();
        run_length_encode(&lengths, &mut runs);
        assert_eq!(expand_runs(&runs), lengths);
        assert!(runs.iter().any(|&(s, _)| s == 16));
        assert!(runs.iter().any(|&(s, _)| s == 18));
    }

    #[test]
    fn test_stored_block_layout() {
        let mut out = BitWriter::new();
        write_stored_block(&mut out, b"abc", true);
        let mut bytes = vec![0u8; out.pending()];
        out.drain_into(&mut bytes);
        assert_eq!(bytes, vec![0x01, 0x03, 0x00, 0xFC, 0xFF, b'a', b'b', b'c']);
    }

    #[test]
    fn test_incompressible_block_goes_stored() {
        let data: Vec<u8> = (0..4000u32)
            .map(|i| (i.wrapping_mul(2654435761) >> 13) as u8)
            .collect();
        let mut builder = BlockBuilder::new();
        for &b in &data {
            builder.tally_literal(b);
        }
        let mut out = BitWriter::new();
        builder.flush(&mut out, Some(&data), true, BlockPolicy::Best);
        assert!(out.pending() <= data.len() + 5);
        assert!(builder.is_empty());
    }
}
