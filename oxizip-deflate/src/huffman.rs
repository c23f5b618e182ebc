//! Canonical Huffman coding for DEFLATE (RFC 1951 section 3.2.2).
//!
//! Decoding works directly on a [`BitReader`] that may not yet hold a whole
//! code: [`HuffmanTree::decode`] answers `NeedMore` instead of failing, so
//! the inflater can suspend mid-symbol when its input runs dry.
//!
//! # Alphabets
//!
//! DEFLATE uses three Huffman alphabets:
//! - **Literal/Length**: 0-285 (0-255 literals, 256 EOB, 257-285 lengths)
//! - **Distance**: 0-29
//! - **Code Length**: 0-18 (for transmitting dynamic trees)

use oxizip_core::BitReader;
use oxizip_core::error::{OxiZipError, Result};
use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// Maximum code length in DEFLATE (15 bits).
pub const MAX_CODE_LENGTH: usize = 15;

/// Maximum code length of the code-length alphabet.
pub const MAX_CODELEN_LENGTH: usize = 7;

/// Size of the literal/length alphabet (0-285).
pub const LITLEN_SYMBOLS: usize = 286;

/// Size of the distance alphabet (0-29).
pub const DISTANCE_SYMBOLS: usize = 30;

/// Size of the code length alphabet (0-18).
pub const CODELEN_SYMBOLS: usize = 19;

/// End of block symbol.
pub const END_OF_BLOCK: u16 = 256;

/// Result of one decode attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decoded {
    /// A complete code was found; `length` bits should be consumed.
    Symbol {
        /// Decoded symbol.
        symbol: u16,
        /// Code length in bits.
        length: u32,
    },
    /// The buffered bits are a prefix of a valid code; push another byte.
    NeedMore,
    /// The buffered bits match no code.
    Invalid,
}

/// A Huffman decoding table.
///
/// Codes up to `FAST_BITS` long resolve with one table lookup; longer
/// codes fall back to a canonical walk over the per-length counts.
#[derive(Debug, Clone)]
pub struct HuffmanTree {
    /// (symbol, code length) indexed by the low `FAST_BITS` stream bits.
    /// A length of zero sends the lookup to the slow path.
    fast_table: Vec<(u16, u8)>,
    /// Number of codes of each length.
    counts: [u16; MAX_CODE_LENGTH + 1],
    /// Symbols ordered by (code length, symbol value).
    symbols: Vec<u16>,
    max_length: u32,
}

impl HuffmanTree {
    const FAST_BITS: u32 = 9;

    /// Build a decoding table, rejecting over-subscribed and incomplete
    /// codes. A single one-bit code and the empty code are accepted.
    pub fn from_code_lengths(lengths: &[u8]) -> Result<Self> {
        let mut counts = [0u16; MAX_CODE_LENGTH + 1];
        for &len in lengths {
            if len as usize > MAX_CODE_LENGTH {
                return Err(OxiZipError::invalid_header(format!(
                    "code length {} exceeds maximum {}",
                    len, MAX_CODE_LENGTH
                )));
            }
            counts[len as usize] += 1;
        }

        let mut left: i32 = 1;
        for &count in counts.iter().skip(1) {
            left <<= 1;
            left -= count as i32;
            if left < 0 {
                return Err(OxiZipError::invalid_header("over-subscribed code"));
            }
        }

        let total: u16 = counts.iter().skip(1).sum();
        let single = total == 1 && counts[1] == 1;
        if left > 0 && total > 0 && !single {
            return Err(OxiZipError::invalid_header("incomplete code"));
        }

        Ok(Self::build(lengths))
    }

    /// Build a decoding table without validating completeness.
    pub(crate) fn build(lengths: &[u8]) -> Self {
        let mut counts = [0u16; MAX_CODE_LENGTH + 1];
        let mut max_length = 0u32;
        for &len in lengths {
            let len = (len as usize).min(MAX_CODE_LENGTH);
            counts[len] += 1;
            if len > 0 {
                max_length = max_length.max(len as u32);
            }
        }
        counts[0] = 0;

        let mut offsets = [0u16; MAX_CODE_LENGTH + 2];
        for len in 1..=MAX_CODE_LENGTH {
            offsets[len + 1] = offsets[len] + counts[len];
        }
        let mut symbols = vec![0u16; offsets[MAX_CODE_LENGTH + 1] as usize];
        for (symbol, &len) in lengths.iter().enumerate() {
            let len = (len as usize).min(MAX_CODE_LENGTH);
            if len > 0 {
                symbols[offsets[len] as usize] = symbol as u16;
                offsets[len] += 1;
            }
        }

        let mut fast_table = vec![(0u16, 0u8); 1 << Self::FAST_BITS];
        let codes = canonical_codes(lengths);
        for (symbol, &len) in lengths.iter().enumerate() {
            let len = len as u32;
            if len == 0 || len > Self::FAST_BITS {
                continue;
            }
            let mut index = codes[symbol] as usize;
            while index < fast_table.len() {
                fast_table[index] = (symbol as u16, len as u8);
                index += 1 << len;
            }
        }

        Self {
            fast_table,
            counts,
            symbols,
            max_length,
        }
    }

    /// Longest code length in the table.
    pub fn max_length(&self) -> u32 {
        self.max_length
    }

    /// Try to decode one symbol from the buffered bits without consuming.
    pub fn decode(&self, bits: &BitReader) -> Decoded {
        let hold = bits.hold();
        let available = bits.available();

        let (symbol, len) = self.fast_table[(hold & ((1 << Self::FAST_BITS) - 1)) as usize];
        if len != 0 && len as u32 <= available {
            return Decoded::Symbol {
                symbol,
                length: len as u32,
            };
        }

        let mut code: i32 = 0;
        let mut first: i32 = 0;
        let mut index: i32 = 0;
        for len in 1..=self.max_length {
            if len > available {
                return Decoded::NeedMore;
            }
            code |= ((hold >> (len - 1)) & 1) as i32;
            let count = self.counts[len as usize] as i32;
            if code - count < first {
                return Decoded::Symbol {
                    symbol: self.symbols[(index + code - first) as usize],
                    length: len,
                };
            }
            index += count;
            first += count;
            first <<= 1;
            code <<= 1;
        }

        Decoded::Invalid
    }
}

/// Reverse the low `length` bits of `code`.
#[inline]
pub fn reverse_bits(code: u16, length: u32) -> u16 {
    if length == 0 {
        return 0;
    }
    code.reverse_bits() >> (16 - length)
}

/// Canonical codes for a set of code lengths, bit-reversed so they can be
/// written LSB-first. Unused symbols get code 0.
pub fn canonical_codes(lengths: &[u8]) -> Vec<u16> {
    let mut bl_count = [0u16; MAX_CODE_LENGTH + 1];
    for &len in lengths {
        bl_count[(len as usize).min(MAX_CODE_LENGTH)] += 1;
    }
    bl_count[0] = 0;

    let mut next_code = [0u16; MAX_CODE_LENGTH + 1];
    let mut code = 0u16;
    for bits in 1..=MAX_CODE_LENGTH {
        code = (code + bl_count[bits - 1]) << 1;
        next_code[bits] = code;
    }

    lengths
        .iter()
        .map(|&len| {
            if len == 0 {
                0
            } else {
                let len = len as usize;
                let c = next_code[len];
                next_code[len] += 1;
                reverse_bits(c, len as u32)
            }
        })
        .collect()
}

/// Build length-limited Huffman code lengths for the given frequencies.
///
/// Symbols with zero frequency get length 0. At least two symbols always
/// receive a code so the result is a complete prefix code; a lone used
/// symbol is paired with a dummy neighbour.
pub fn build_lengths(freqs: &[u32], max_length: usize) -> Vec<u8> {
    let mut lengths = vec![0u8; freqs.len()];
    let mut used: Vec<usize> = (0..freqs.len()).filter(|&s| freqs[s] > 0).collect();

    match used.len() {
        0 => return lengths,
        1 => {
            let dummy = if used[0] == 0 { 1 } else { 0 };
            if dummy < lengths.len() {
                lengths[dummy] = 1;
            }
            lengths[used[0]] = 1;
            return lengths;
        }
        _ => {}
    }

    // Plain Huffman construction; node indices break frequency ties so
    // the result is deterministic.
    let leaves = used.len();
    let mut parent = vec![usize::MAX; 2 * leaves - 1];
    let mut heap: BinaryHeap<Reverse<(u64, usize)>> = used
        .iter()
        .enumerate()
        .map(|(node, &symbol)| Reverse((freqs[symbol] as u64, node)))
        .collect();
    let mut next = leaves;
    while heap.len() > 1 {
        let (Some(Reverse((fa, a))), Some(Reverse((fb, b)))) = (heap.pop(), heap.pop()) else {
            break;
        };
        parent[a] = next;
        parent[b] = next;
        heap.push(Reverse((fa + fb, next)));
        next += 1;
    }

    // Parents always have larger indices than their children, so one
    // reverse pass settles every depth.
    let mut depth = vec![0usize; next];
    for node in (0..next.saturating_sub(1)).rev() {
        depth[node] = depth[parent[node]] + 1;
    }

    let mut num_codes = vec![0u32; max_length + 1];
    for &d in depth.iter().take(leaves) {
        num_codes[d.min(max_length)] += 1;
    }

    // Shorten the tree: every code clamped to max_length over-subscribes
    // the Kraft sum; move leaves down until it balances again.
    let mut total: u64 = (1..=max_length)
        .map(|len| (num_codes[len] as u64) << (max_length - len))
        .sum();
    while total > (1u64 << max_length) {
        num_codes[max_length] -= 1;
        for len in (1..max_length).rev() {
            if num_codes[len] > 0 {
                num_codes[len] -= 1;
                num_codes[len + 1] += 2;
                break;
            }
        }
        total -= 1;
    }

    // Most frequent symbols take the shortest codes.
    used.sort_by(|&a, &b| freqs[b].cmp(&freqs[a]).then(a.cmp(&b)));
    let mut symbols = used.into_iter();
    for len in 1..=max_length {
        for _ in 0..num_codes[len] {
            if let Some(symbol) = symbols.next() {
                lengths[symbol] = len as u8;
            }
        }
    }

    lengths
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kraft_sum(lengths: &[u8]) -> f64 {
        lengths
            .iter()
            .filter(|&&l| l > 0)
            .map(|&l| 1.0 / (1u64 << l) as f64)
            .sum()
    }

    fn reader_with(bytes: &[u8]) -> BitReader {
        let mut reader = BitReader::new();
        for &b in bytes {
            reader.push_byte(b);
        }
        reader
    }

    #[test]
    fn test_reverse_bits() {
        assert_eq!(reverse_bits(0b1, 1), 0b1);
        assert_eq!(reverse_bits(0b10, 2), 0b01);
        assert_eq!(reverse_bits(0b110, 3), 0b011);
        assert_eq!(reverse_bits(0b0011_0000, 8), 0b0000_1100);
    }

    #[test]
    fn test_decode_simple_tree() {
        // A=0, B=10, C=110, D=111
        let tree = HuffmanTree::from_code_lengths(&[1, 2, 3, 3]).unwrap();
        // Stream (LSB first): A, B, C, D -> bits 0 | 1 0 | 1 1 0 | 1 1 1
        let reader = reader_with(&[0b1101_1010, 0b0000_0011]);
        let mut reader = reader;
        let mut decoded = Vec::new();
        for _ in 0..4 {
            match tree.decode(&reader) {
                Decoded::Symbol { symbol, length } => {
                    decoded.push(symbol);
                    reader.consume(length);
                }
                other => panic!("unexpected {:?}", other),
            }
        }
        assert_eq!(decoded, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_decode_needs_more_on_partial_code() {
        let lengths = crate::tables::fixed_litlen_lengths();
        let tree = HuffmanTree::from_code_lengths(&lengths).unwrap();
        let mut reader = BitReader::new();
        assert_eq!(tree.decode(&reader), Decoded::NeedMore);
        reader.push_byte(0);
        // Eight zero bits resolve to the seven-bit end-of-block code.
        assert_eq!(
            tree.decode(&reader),
            Decoded::Symbol {
                symbol: 256,
                length: 7
            }
        );
    }

    #[test]
    fn test_rejects_bad_codes() {
        assert!(HuffmanTree::from_code_lengths(&[1, 1, 1]).is_err());
        assert!(HuffmanTree::from_code_lengths(&[1, 2]).is_err());
        assert!(HuffmanTree::from_code_lengths(&[0, 1, 0]).is_ok());
        assert!(HuffmanTree::from_code_lengths(&[0, 0, 0]).is_ok());
    }

    #[test]
    fn test_empty_tree_is_invalid_on_decode() {
        let tree = HuffmanTree::from_code_lengths(&[0; 30]).unwrap();
        let reader = reader_with(&[0xFF, 0xFF]);
        assert_eq!(tree.decode(&reader), Decoded::Invalid);
    }

    #[test]
    fn test_build_lengths_complete_and_limited() {
        // Fibonacci frequencies force a deep tree.
        let mut freqs = vec![0u32; 30];
        let (mut a, mut b) = (1u32, 1u32);
        for f in freqs.iter_mut() {
            *f = a;
            let c = a.saturating_add(b);
            a = b;
            b = c;
        }
        for limit in [7usize, 15] {
            let lengths = build_lengths(&freqs, limit);
            assert!(lengths.iter().all(|&l| l as usize <= limit && l > 0));
            assert!((kraft_sum(&lengths) - 1.0).abs() < 1e-9);
            assert!(HuffmanTree::from_code_lengths(&lengths).is_ok());
        }
    }

    #[test]
    fn test_build_lengths_prefers_frequent() {
        let freqs = [100, 1, 1, 50, 0, 1];
        let lengths = build_lengths(&freqs, 15);
        assert_eq!(lengths[4], 0);
        assert!(lengths[0] <= lengths[3]);
        assert!(lengths[3] <= lengths[1]);
        assert!((kraft_sum(&lengths) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_build_lengths_single_symbol() {
        let lengths = build_lengths(&[0, 0, 7, 0], 15);
        assert_eq!(lengths, vec![1, 0, 1, 0]);
        let lengths = build_lengths(&[9, 0, 0], 15);
        assert_eq!(lengths, vec![1, 1, 0]);
    }
}
